use std::sync::Arc;

use bevy::{
    log::{debug, error, warn},
    math::{Quat, Vec2},
    platform::collections::HashMap,
};
use rand::rngs::StdRng;

use crate::{
    clip::Clip,
    config::{AvatarConfig, ModelSettings},
    errors::LoadResult,
    expression::ExpressionDriver,
    id::InstanceId,
    idle::{GesturePlan, GestureSource, IdleContext, IdleDecision, IdleScheduler, YawSway, is_idle_class},
    lip_sync::LipSyncAnalyzer,
    mixer::{ActionId, AnimationMixer, Transition},
    motion::{CurrentMotion, MotionCatalog, NO_MOTION},
    overlay::CursorOverlay,
    procedural::{ProceduralGenerator, catalog::builtin_movements},
    retarget::RetargetOptions,
    rig::HumanoidRig,
    scheduler::{Scheduler, TimerSlot},
    sequence::{SequencePlayer, SequenceStep, StepTiming, parse_sequence},
};

/// Payload of the avatar's timers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuntimeEvent {
    IdleTick,
    IdleComplete,
    /// A one-shot motion is about to end
    MotionFallback(ActionId),
    SequenceFadeOut(ActionId),
    SequenceAdvance,
}

/// What a requested clip is for once it arrives
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadPurpose {
    Motion { looping: bool },
    SequenceStep { generation: u64, index: usize },
    /// Authored idle clip, kept for later gestures
    IdleClip,
}

/// A motion file the avatar needs, to be fetched, decoded and retargeted by the host
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadRequest {
    pub owner: InstanceId,
    pub ticket: u64,
    pub file: String,
    pub purpose: LoadPurpose,
}

#[derive(Clone, Debug)]
struct PendingMotion {
    ticket: u64,
    previous: String,
}

/// Everything needed to bring up an avatar for a model
pub struct AvatarSetup {
    pub model: String,
    pub rig: HumanoidRig,
    pub settings: ModelSettings,
    /// Expression names the model exposes
    pub expressions: Vec<String>,
}

/// The animation state of one character's avatar.
///
/// Timers and asynchronous loads are tagged with the runtime's [`InstanceId`], so anything
/// scheduled for a torn down avatar is dropped instead of applied.
pub struct AvatarRuntime {
    id: InstanceId,
    model: String,
    settings: ModelSettings,
    config: AvatarConfig,
    rig: HumanoidRig,
    mixer: AnimationMixer,
    scheduler: Scheduler<RuntimeEvent>,
    motion: CurrentMotion,
    pending_motion: Option<PendingMotion>,
    catalog: MotionCatalog,
    generator: ProceduralGenerator,
    idle: IdleScheduler,
    gesture: Option<ActionId>,
    sway: Option<YawSway>,
    sway_base: Quat,
    overlay: CursorOverlay,
    sequence: Option<SequencePlayer>,
    sequence_generation: u64,
    expressions: ExpressionDriver,
    lip_sync: LipSyncAnalyzer,
    spectrum: Option<Vec<u8>>,
    clips: HashMap<String, Arc<Clip>>,
    requests: Vec<LoadRequest>,
    next_ticket: u64,
    rng: StdRng,
}

impl AvatarRuntime {
    /// Builds the runtime and starts it: default expression, default motion looped,
    /// blinking and the first idle tick.
    pub fn new(
        setup: AvatarSetup,
        config: &AvatarConfig,
        catalog: MotionCatalog,
        rng: StdRng,
    ) -> Self {
        let AvatarSetup {
            model,
            mut rig,
            settings,
            expressions,
        } = setup;
        *rig.root_mut() = settings.root_transform();

        let id = InstanceId::new();
        let mut overlay = CursorOverlay::new(config.overlay);
        overlay.set_tracking(config.features.follow_cursor);

        let mut runtime = Self {
            id,
            model,
            expressions: ExpressionDriver::new(
                config.expression,
                expressions,
                settings.blend_shape_mapping.clone(),
            ),
            settings,
            config: config.clone(),
            rig,
            mixer: AnimationMixer::new(),
            scheduler: Scheduler::new(id),
            motion: CurrentMotion::default(),
            pending_motion: None,
            catalog,
            generator: ProceduralGenerator::new(config.procedural),
            idle: IdleScheduler::new(config.idle.clone(), builtin_movements()),
            gesture: None,
            sway: None,
            sway_base: Quat::IDENTITY,
            overlay,
            sequence: None,
            sequence_generation: 0,
            lip_sync: LipSyncAnalyzer::new(config.lip_sync),
            spectrum: None,
            clips: HashMap::new(),
            requests: Vec::new(),
            next_ticket: 0,
            rng,
        };
        runtime.start();
        runtime
    }

    fn start(&mut self) {
        let expression = self.settings.default_expression.clone();
        self.expressions.set_expression(&expression);

        for file in self.settings.idle_clips.clone() {
            self.request(file, LoadPurpose::IdleClip);
        }

        let motion = self.settings.default_motion.clone();
        self.change_motion(&motion, true, false, false);

        self.expressions
            .set_blinking(self.config.features.blink, &mut self.rng);
        debug!("Avatar {} started for {}", self.id, self.model);
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    pub fn rig(&self) -> &HumanoidRig {
        &self.rig
    }

    pub fn mixer(&self) -> &AnimationMixer {
        &self.mixer
    }

    pub fn expressions(&self) -> &ExpressionDriver {
        &self.expressions
    }

    pub fn overlay(&self) -> &CursorOverlay {
        &self.overlay
    }

    pub fn current_motion(&self) -> &CurrentMotion {
        &self.motion
    }

    pub fn sequence(&self) -> Option<&SequencePlayer> {
        self.sequence.as_ref()
    }

    pub fn scheduler(&self) -> &Scheduler<RuntimeEvent> {
        &self.scheduler
    }

    pub fn is_gesture_playing(&self) -> bool {
        self.gesture.is_some()
    }

    pub fn retarget_options(&self) -> RetargetOptions {
        self.settings.retarget_options()
    }

    pub fn set_catalog(&mut self, catalog: MotionCatalog) {
        self.catalog = catalog;
    }

    pub fn has_clip(&self, file: &str) -> bool {
        self.clips.contains_key(file)
    }

    /// Hands over a clip retargeted for this model earlier, e.g. from a cache
    pub fn insert_clip(&mut self, file: impl Into<String>, clip: Arc<Clip>) {
        self.clips.insert(file.into(), clip);
    }

    fn fade(&self) -> f32 {
        self.config.mixer.crossfade_secs
    }

    fn request(&mut self, file: String, purpose: LoadPurpose) -> u64 {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        debug!("Requesting {file} for {purpose:?}");
        self.requests.push(LoadRequest {
            owner: self.id,
            ticket,
            file,
            purpose,
        });
        ticket
    }

    /// Motion files the host should load for this avatar
    pub fn take_load_requests(&mut self) -> Vec<LoadRequest> {
        std::mem::take(&mut self.requests)
    }

    /// Applies the outcome of a load requested through [`AvatarRuntime::take_load_requests`]
    pub fn on_clip_loaded(&mut self, request: &LoadRequest, result: LoadResult<Arc<Clip>>) {
        if request.owner != self.id {
            debug!("Dropping {} loaded for a previous avatar", request.file);
            return;
        }

        let clip = match result {
            Ok(clip) => {
                self.clips.insert(request.file.clone(), clip.clone());
                Some(clip)
            }
            Err(err) => {
                error!("Failed to load {}: {err}", request.file);
                None
            }
        };

        match request.purpose {
            LoadPurpose::Motion { looping } => {
                if self
                    .pending_motion
                    .as_ref()
                    .is_none_or(|pending| pending.ticket != request.ticket)
                {
                    debug!("Motion {} was superseded while loading", request.file);
                    return;
                }
                let Some(pending) = self.pending_motion.take() else {
                    return;
                };
                match clip {
                    Some(clip) => self.play_motion_clip(&request.file, clip, looping),
                    None => self.motion.name = pending.previous,
                }
            }
            LoadPurpose::SequenceStep { generation, index } => {
                if generation != self.sequence_generation {
                    debug!("Sequence step {} belongs to a cleared sequence", request.file);
                    return;
                }
                let Some(step) = self
                    .sequence
                    .as_ref()
                    .filter(|player| player.index() == Some(index))
                    .and_then(SequencePlayer::current)
                    .cloned()
                else {
                    return;
                };
                match clip {
                    Some(clip) => self.play_step_clip(&step, &request.file, clip),
                    None => self.schedule_advance(step.wait_ms as f32 / 1000.),
                }
            }
            LoadPurpose::IdleClip => {}
        }
    }

    pub fn set_expression(&mut self, name: &str) {
        self.expressions.set_expression(name);
    }

    /// Explicit motion request. Clears any running sequence and idle gesture.
    ///
    /// With `random`, a file is picked uniformly among the ones sharing its base name.
    pub fn set_motion(&mut self, file: &str, looping: bool, force: bool, random: bool) {
        self.reset_sequence();
        self.interrupt_idle();
        self.change_motion(file, looping, force, random);
    }

    fn change_motion(&mut self, file: &str, looping: bool, force: bool, random: bool) {
        let file = if random {
            self.catalog
                .pick_random(file, &mut self.rng)
                .unwrap_or(file)
                .to_string()
        } else {
            file.to_string()
        };

        if file == self.motion.name && !looping && !force {
            debug!("Already playing {file}");
            self.sync_idle_timer();
            return;
        }

        if file == NO_MOTION {
            if let Some(action) = self.motion.action.take() {
                self.mixer.fade_out(action, self.fade());
            }
            self.scheduler.cancel(TimerSlot::MotionFallback);
            self.pending_motion = None;
            self.motion = CurrentMotion::default();
        } else if let Some(clip) = self.clips.get(&file).cloned() {
            self.pending_motion = None;
            self.play_motion_clip(&file, clip, looping);
        } else {
            let previous = std::mem::replace(&mut self.motion.name, file.clone());
            self.motion.looping = looping;
            let ticket = self.request(file, LoadPurpose::Motion { looping });
            self.pending_motion = Some(PendingMotion { ticket, previous });
        }

        self.sync_idle_timer();
    }

    fn play_motion_clip(&mut self, file: &str, clip: Arc<Clip>, looping: bool) {
        let fade = self.fade();
        let duration = clip.duration();
        let action = self.mixer.play(clip, Transition::Crossfade, fade);
        self.motion = CurrentMotion {
            name: file.to_string(),
            action: Some(action),
            looping,
        };

        if looping {
            self.scheduler.cancel(TimerSlot::MotionFallback);
        } else {
            self.scheduler.schedule(
                TimerSlot::MotionFallback,
                (duration - fade).max(0.),
                RuntimeEvent::MotionFallback(action),
            );
        }
    }

    fn fall_back_to_default(&mut self) {
        self.overlay.resnapshot(&self.rig);
        let motion = self.settings.default_motion.clone();
        self.change_motion(&motion, true, false, false);
    }

    pub fn set_motion_sequence(&mut self, source: &str, looping: bool) {
        let steps = parse_sequence(source, &self.config.sequence);
        if steps.is_empty() {
            warn!("Ignoring empty motion sequence {source:?}");
            return;
        }

        self.reset_sequence();
        self.interrupt_idle();
        debug!("Starting a sequence of {} steps", steps.len());
        self.sequence = Some(SequencePlayer::new(steps, looping));
        self.play_next_step();
    }

    /// Stops the running sequence, leaving the current motion playing
    pub fn clear_sequence(&mut self) {
        self.reset_sequence();
        self.sync_idle_timer();
    }

    fn reset_sequence(&mut self) {
        self.scheduler.cancel(TimerSlot::Sequence);
        self.scheduler.cancel(TimerSlot::SequenceFadeOut);
        self.sequence_generation += 1;
        self.sequence = None;
    }

    fn schedule_advance(&mut self, secs: f32) {
        self.scheduler
            .schedule(TimerSlot::Sequence, secs, RuntimeEvent::SequenceAdvance);
    }

    fn play_next_step(&mut self) {
        let Some(player) = &mut self.sequence else {
            return;
        };
        let Some(step) = player.advance().cloned() else {
            debug!("Sequence finished");
            self.sequence = None;
            self.fall_back_to_default();
            return;
        };
        let index = player.index().unwrap_or_default();

        if let Some(expression) = step.expression.as_deref().filter(|e| *e != "none") {
            self.expressions.set_expression(expression);
        }

        let wait = step.wait_ms as f32 / 1000.;
        if step.is_wait() {
            self.schedule_advance(wait);
            return;
        }

        let Some(file) = self.catalog.resolve(&step.motion) else {
            debug!("No motion matches {}, skipping the step", step.motion);
            self.schedule_advance(wait);
            return;
        };

        match self.clips.get(&file).cloned() {
            Some(clip) => self.play_step_clip(&step, &file, clip),
            None => {
                let generation = self.sequence_generation;
                self.request(file, LoadPurpose::SequenceStep { generation, index });
            }
        }
    }

    fn play_step_clip(&mut self, step: &SequenceStep, file: &str, clip: Arc<Clip>) {
        let fade = self.fade();
        let timing = StepTiming::compute(step, Some(clip.duration()), fade, &self.config.sequence);
        let action = self.mixer.play(clip, step.transition, fade);
        self.scheduler.cancel(TimerSlot::MotionFallback);
        self.motion = CurrentMotion {
            name: file.to_string(),
            action: Some(action),
            looping: step.looping,
        };

        match timing.fade_out_after {
            Some(secs) => self.scheduler.schedule(
                TimerSlot::SequenceFadeOut,
                secs,
                RuntimeEvent::SequenceFadeOut(action),
            ),
            None => {
                self.scheduler.cancel(TimerSlot::SequenceFadeOut);
            }
        }
        self.schedule_advance(timing.advance_after);
    }

    /// Moves the mouth for `text`. Ignored while audio drives the mouth.
    pub fn talk(&mut self, text: &str) {
        if self.config.features.tts_lips_sync {
            return;
        }
        self.expressions.talk(text);
    }

    /// Reacts to a classified chat message with the model's mapped expression and motion
    /// or sequence
    pub fn on_message(&mut self, label: &str) {
        let Some(mapping) = self.settings.classify.get(label).cloned() else {
            warn!("No classification mapping for {label} on {}", self.model);
            return;
        };

        let expression = match mapping.expression.as_str() {
            "none" => self.settings.default_expression.clone(),
            _ => mapping.expression,
        };
        self.expressions.set_expression(&expression);

        if !mapping.sequence.trim().is_empty() {
            self.set_motion_sequence(&mapping.sequence, false);
            return;
        }

        let motion = match mapping.motion.as_str() {
            NO_MOTION => self.settings.default_motion.clone(),
            _ => mapping.motion,
        };
        self.set_motion(&motion, false, false, true);
    }

    /// Normalized cursor position, see [`crate::overlay::normalized_cursor`]
    pub fn set_cursor(&mut self, cursor: Vec2) {
        self.overlay.set_cursor(cursor);
    }

    pub fn set_cursor_tracking(&mut self, enabled: bool) {
        self.overlay.set_tracking(enabled);
    }

    pub fn set_blinking(&mut self, enabled: bool) {
        self.expressions.set_blinking(enabled, &mut self.rng);
    }

    /// Frequency bins of the voice currently playing, consumed by the next update
    pub fn set_audio_spectrum(&mut self, bins: Vec<u8>) {
        self.spectrum = Some(bins);
    }

    fn interrupt_idle(&mut self) {
        self.scheduler.cancel(TimerSlot::Idle);
        self.scheduler.cancel(TimerSlot::IdleComplete);
        if let Some(gesture) = self.gesture.take() {
            debug!("Interrupting the idle gesture");
            self.mixer.fade_out(gesture, self.fade());
        }
        self.idle.interrupt();
    }

    /// Keeps the idle tick running exactly while an idle-class motion plays
    fn sync_idle_timer(&mut self) {
        let idle_class = is_idle_class(
            &self.motion.name,
            &self.settings.default_motion,
            &self.config.idle.idle_motions,
        );
        if !idle_class || self.sequence.is_some() {
            self.interrupt_idle();
            return;
        }
        if !self.scheduler.is_pending(TimerSlot::Idle) && self.gesture.is_none() {
            let delay = self.idle.reschedule_delay(&mut self.rng);
            self.scheduler
                .schedule(TimerSlot::Idle, delay, RuntimeEvent::IdleTick);
        }
    }

    fn idle_tick(&mut self) {
        let authored: Vec<String> = self
            .settings
            .idle_clips
            .iter()
            .filter(|file| self.clips.contains_key(*file))
            .cloned()
            .collect();
        let context = IdleContext {
            now: self.scheduler.now(),
            current_motion: &self.motion.name,
            default_motion: &self.settings.default_motion,
            enabled: self.config.features.natural_idle && self.sequence.is_none(),
            authored_clips: &authored,
        };

        match self.idle.tick(context, &mut self.rng) {
            IdleDecision::Reschedule(secs) | IdleDecision::Defer(secs) => {
                self.scheduler
                    .schedule(TimerSlot::Idle, secs, RuntimeEvent::IdleTick);
            }
            IdleDecision::Play(plan) => self.play_gesture(plan),
        }
    }

    fn play_gesture(&mut self, plan: GesturePlan) {
        let fade = self.fade();
        let (clip, tail) = match &plan.source {
            GestureSource::Procedural { key, movement } => (
                self.generator
                    .generate(key, &self.rig, &movement.descriptor)
                    .map(Arc::new),
                0.,
            ),
            GestureSource::Authored { file } => (self.clips.get(file).cloned(), fade),
        };

        let Some(clip) = clip else {
            self.idle.interrupt();
            let delay = self.idle.reschedule_delay(&mut self.rng);
            self.scheduler
                .schedule(TimerSlot::Idle, delay, RuntimeEvent::IdleTick);
            return;
        };

        debug!(
            "Playing idle gesture {} for {:.1}s",
            clip.name(),
            clip.duration()
        );
        let duration = clip.duration();
        self.gesture = Some(self.mixer.play_layer(clip, fade));
        self.scheduler.schedule(
            TimerSlot::IdleComplete,
            duration + tail,
            RuntimeEvent::IdleComplete,
        );

        let yaw = plan.model_yaw();
        if yaw != 0. {
            self.sway_base = self
                .overlay
                .root_base()
                .unwrap_or(self.rig.root().rotation);
            self.sway = Some(YawSway::new(yaw, &self.config.idle));
        }

        if let Some(expression) = plan.expression {
            let name = self
                .settings
                .classify
                .get(&expression)
                .map(|mapping| mapping.expression.clone())
                .filter(|mapped| mapped != "none")
                .unwrap_or(expression);
            let tuning = &self.config.idle;
            self.expressions.pulse(
                &name,
                tuning.expression_intensity,
                tuning.expression_secs,
                tuning.envelope_ramp,
                tuning.envelope_hold,
            );
        }
    }

    fn complete_gesture(&mut self) {
        if let Some(gesture) = self.gesture.take() {
            self.mixer.fade_out(gesture, self.fade());
        }
        let now = self.scheduler.now();
        self.idle.complete(now, &mut self.rng);
        self.overlay.resnapshot(&self.rig);
        self.idle_tick();
    }

    fn handle(&mut self, event: RuntimeEvent) {
        match event {
            RuntimeEvent::IdleTick => self.idle_tick(),
            RuntimeEvent::IdleComplete => self.complete_gesture(),
            RuntimeEvent::MotionFallback(action) => {
                if self.mixer.is_terminated(action) || self.motion.action != Some(action) {
                    debug!("Skipping fallback of a superseded motion");
                    return;
                }
                self.fall_back_to_default();
            }
            RuntimeEvent::SequenceFadeOut(action) => {
                self.mixer.fade_out(action, self.fade());
            }
            RuntimeEvent::SequenceAdvance => {
                self.overlay.resnapshot(&self.rig);
                self.play_next_step();
            }
        }
    }

    fn update_sway(&mut self, delta: f32) {
        let Some(sway) = &mut self.sway else {
            return;
        };
        let offset = sway.update(delta);
        let finished = sway.is_finished();

        let rotation = self.sway_base * Quat::from_rotation_y(offset);
        if self.overlay.is_active() {
            self.overlay.set_root_base(rotation);
        } else {
            self.rig.root_mut().rotation = rotation;
        }
        if finished {
            self.sway = None;
        }
    }

    /// Advances the avatar by one frame: timers, face, body sway, the mixer and finally the
    /// cursor overlay on top of the mixed pose.
    pub fn update(&mut self, delta: f32) {
        self.overlay.restore_base(&mut self.rig);

        for fired in self.scheduler.advance(delta) {
            if fired.owner != self.id {
                debug!("Dropping {:?} fired for avatar {}", fired.slot, fired.owner);
                continue;
            }
            self.handle(fired.event);
        }

        let audio_mouth = self.config.features.tts_lips_sync;
        if audio_mouth {
            let spectrum = self.spectrum.take();
            let frame = self
                .lip_sync
                .analyze(spectrum.as_deref().unwrap_or_default(), delta);
            self.expressions.apply_visemes(frame.visemes, frame.speaking);
        }
        self.expressions.update(delta, !audio_mouth, &mut self.rng);

        self.update_sway(delta);
        self.mixer.update(delta, &mut self.rig);
        self.overlay.apply(delta, &mut self.rig);
    }

    /// Cancels every timer and stops every action
    pub fn teardown(&mut self) {
        self.scheduler.cancel_all();
        self.mixer.stop_all();
        self.sequence = None;
        self.sequence_generation += 1;
        self.pending_motion = None;
        self.gesture = None;
        self.sway = None;
        self.requests.clear();
        debug!("Avatar {} torn down", self.id);
    }
}

#[cfg(test)]
pub(crate) mod test {
    use bevy::math::EulerRot;
    use rand::SeedableRng;

    use super::*;
    use crate::{
        clip::{ClipProvenance, ClipTrack},
        config::ClassifyMapping,
        errors::LoadError,
        humanoid::HumanoidBone,
        rig::test::test_rig,
    };

    pub(crate) fn head_clip(rig: &HumanoidRig, name: &str, angle: f32, duration: f32) -> Arc<Clip> {
        let head = rig.node(HumanoidBone::Head).unwrap();
        Arc::new(Clip::new(
            name,
            ClipProvenance::Procedural,
            vec![ClipTrack::rotation(
                head,
                vec![0., duration],
                vec![Quat::from_rotation_y(angle); 2],
            )],
        ))
    }

    pub(crate) fn setup(settings: ModelSettings) -> AvatarSetup {
        AvatarSetup {
            model: "alice.vrm".into(),
            rig: test_rig(),
            settings,
            expressions: crate::expression::PRESET_EXPRESSIONS
                .iter()
                .map(|name| name.to_string())
                .collect(),
        }
    }

    fn runtime(settings: ModelSettings) -> AvatarRuntime {
        AvatarRuntime::new(
            setup(settings),
            &AvatarConfig::default(),
            MotionCatalog::new(["Idle.bvh", "Wave.fbx", "Point.bvh"]),
            StdRng::seed_from_u64(11),
        )
    }

    /// Answers every pending request with a 2 s head turn
    fn serve_loads(runtime: &mut AvatarRuntime) -> usize {
        let requests = runtime.take_load_requests();
        for request in &requests {
            let clip = head_clip(runtime.rig(), &request.file, 0.5, 2.);
            runtime.on_clip_loaded(request, Ok(clip));
        }
        requests.len()
    }

    fn run_until_gesture(runtime: &mut AvatarRuntime) {
        let mut frames = 0;
        while !runtime.is_gesture_playing() {
            runtime.update(1. / 60.);
            frames += 1;
            assert!(frames < 60 * 31, "no idle gesture started");
        }
    }

    fn run(runtime: &mut AvatarRuntime, secs: f32) {
        let frames = (secs * 60.).round() as usize;
        for _ in 0..frames {
            runtime.update(1. / 60.);
        }
    }

    #[test]
    fn starts_with_defaults() {
        let mut runtime = runtime(ModelSettings {
            default_expression: "happy".into(),
            default_motion: "Idle.bvh".into(),
            ..Default::default()
        });

        assert_eq!(runtime.expressions().current(), "happy");
        assert_eq!(runtime.current_motion().name, "Idle.bvh");
        assert_eq!(serve_loads(&mut runtime), 1);
        assert!(runtime.current_motion().action.is_some());
        assert!(runtime.current_motion().looping);

        let first_tick = runtime.scheduler().remaining(TimerSlot::Idle).unwrap();
        assert!((10. ..30.).contains(&first_tick));
    }

    #[test]
    fn repeated_motion_is_a_noop() {
        let mut runtime = runtime(ModelSettings::default());

        runtime.set_motion("Wave.fbx", false, false, false);
        assert_eq!(serve_loads(&mut runtime), 1);
        let actions = runtime.mixer().actions().count();

        runtime.set_motion("Wave.fbx", false, false, false);
        assert_eq!(serve_loads(&mut runtime), 0);
        assert_eq!(runtime.mixer().actions().count(), actions);
    }

    #[test]
    fn requesting_the_current_idle_motion_keeps_idle_running() {
        let mut runtime = runtime(ModelSettings {
            default_motion: "Idle.bvh".into(),
            ..Default::default()
        });
        serve_loads(&mut runtime);

        runtime.set_motion("Idle.bvh", false, false, false);
        assert_eq!(serve_loads(&mut runtime), 0);
        assert!(runtime.scheduler().is_pending(TimerSlot::Idle));

        run_until_gesture(&mut runtime);
    }

    #[test]
    fn one_shot_motions_fall_back_to_default() {
        let mut runtime = runtime(ModelSettings {
            default_motion: "Idle.bvh".into(),
            ..Default::default()
        });
        serve_loads(&mut runtime);

        runtime.set_motion("Wave.fbx", false, false, false);
        serve_loads(&mut runtime);
        assert!(!runtime.scheduler().is_pending(TimerSlot::Idle));

        run(&mut runtime, 1.8);
        assert_eq!(runtime.current_motion().name, "Idle.bvh");
        assert!(runtime.current_motion().looping);
        assert!(runtime.scheduler().is_pending(TimerSlot::Idle));
    }

    #[test]
    fn superseded_and_stale_loads_are_dropped() {
        let mut runtime = runtime(ModelSettings::default());

        runtime.set_motion("Wave.fbx", true, false, false);
        runtime.set_motion("Point.bvh", true, false, false);
        let requests = runtime.take_load_requests();
        assert_eq!(requests.len(), 2);

        let wave = head_clip(runtime.rig(), "wave", 0.5, 2.);
        runtime.on_clip_loaded(&requests[0], Ok(wave));
        assert_eq!(runtime.current_motion().action, None);

        let stale = LoadRequest {
            owner: InstanceId::new(),
            ..requests[1].clone()
        };
        let point = head_clip(runtime.rig(), "point", 0.5, 2.);
        runtime.on_clip_loaded(&stale, Ok(point.clone()));
        assert_eq!(runtime.current_motion().action, None);

        runtime.on_clip_loaded(&requests[1], Ok(point));
        assert_eq!(runtime.current_motion().name, "Point.bvh");
        assert!(runtime.current_motion().action.is_some());
    }

    #[test]
    fn failed_loads_keep_the_previous_motion() {
        let mut runtime = runtime(ModelSettings::default());
        runtime.set_motion("Wave.fbx", true, false, false);
        let requests = runtime.take_load_requests();

        runtime.on_clip_loaded(
            &requests[0],
            Err(LoadError::Fetch {
                path: "Wave.fbx".into(),
                reason: "gone".into(),
            }),
        );
        assert_eq!(runtime.current_motion().name, NO_MOTION);
    }

    #[test]
    fn sequences_play_through_and_fall_back() {
        let mut runtime = runtime(ModelSettings {
            default_motion: "Idle.bvh".into(),
            ..Default::default()
        });
        serve_loads(&mut runtime);

        runtime.set_motion_sequence("wave,expression:happy,wait:500,point", false);
        assert_eq!(runtime.sequence().map(SequencePlayer::len), Some(3));
        serve_loads(&mut runtime);
        assert_eq!(runtime.current_motion().name, "Wave.fbx");
        assert_eq!(runtime.expressions().current(), "happy");

        // wave: fade out at 1.7 s, next step at 2.0 s; the wait step lasts 0.5 s
        run(&mut runtime, 2.6);
        assert_eq!(runtime.sequence().and_then(SequencePlayer::index), Some(2));
        serve_loads(&mut runtime);
        assert_eq!(runtime.current_motion().name, "Point.bvh");

        run(&mut runtime, 2.2);
        assert!(runtime.sequence().is_none());
        assert_eq!(runtime.current_motion().name, "Idle.bvh");
    }

    #[test]
    fn clearing_a_sequence_cancels_its_timer() {
        let mut runtime = runtime(ModelSettings::default());
        runtime.set_motion_sequence("wait:500,wave", false);
        assert!(runtime.scheduler().is_pending(TimerSlot::Sequence));

        runtime.clear_sequence();
        assert!(!runtime.scheduler().is_pending(TimerSlot::Sequence));
        run(&mut runtime, 1.);
        assert_eq!(runtime.current_motion().name, NO_MOTION);
        assert!(runtime.take_load_requests().is_empty());
    }

    #[test]
    fn idle_gestures_play_and_cool_down() {
        let mut runtime = runtime(ModelSettings::default());
        assert_eq!(runtime.current_motion().name, NO_MOTION);

        run_until_gesture(&mut runtime);
        let completes_in = runtime.scheduler().remaining(TimerSlot::IdleComplete).unwrap();

        run(&mut runtime, completes_in - 0.1);
        while runtime.is_gesture_playing() {
            runtime.update(1. / 60.);
        }
        let next = runtime.scheduler().remaining(TimerSlot::Idle).unwrap();
        assert!((7. ..21.).contains(&next), "{next}");

        run(&mut runtime, 3.);
        assert!(!runtime.is_gesture_playing());
    }

    #[test]
    fn explicit_motion_interrupts_idle() {
        let mut runtime = runtime(ModelSettings::default());
        run_until_gesture(&mut runtime);

        runtime.set_motion("Wave.fbx", true, false, false);
        assert!(!runtime.is_gesture_playing());
        assert!(!runtime.scheduler().is_pending(TimerSlot::Idle));
        assert!(!runtime.scheduler().is_pending(TimerSlot::IdleComplete));
    }

    #[test]
    fn messages_follow_the_classification_table() {
        let mut settings = ModelSettings {
            default_expression: "relaxed".into(),
            default_motion: "Idle.bvh".into(),
            ..Default::default()
        };
        settings.classify.insert(
            "joy".into(),
            ClassifyMapping {
                expression: "happy".into(),
                motion: "Wave.fbx".into(),
                sequence: String::new(),
            },
        );
        settings.classify.insert(
            "neutral".into(),
            ClassifyMapping {
                expression: "none".into(),
                motion: "none".into(),
                sequence: String::new(),
            },
        );
        settings.classify.insert(
            "curiosity".into(),
            ClassifyMapping {
                sequence: "point:loop:true".into(),
                ..Default::default()
            },
        );
        let mut runtime = runtime(settings);
        serve_loads(&mut runtime);

        runtime.on_message("joy");
        assert_eq!(runtime.expressions().current(), "happy");
        assert_eq!(runtime.current_motion().name, "Wave.fbx");

        runtime.on_message("neutral");
        assert_eq!(runtime.expressions().current(), "relaxed");
        assert_eq!(runtime.current_motion().name, "Idle.bvh");

        runtime.on_message("curiosity");
        assert!(runtime.sequence().is_some());
        serve_loads(&mut runtime);
        assert_eq!(runtime.current_motion().name, "Point.bvh");

        runtime.on_message("anger");
        assert!(runtime.sequence().is_some());
    }

    #[test]
    fn cursor_tracking_moves_the_head_chain_and_restores() {
        let mut runtime = runtime(ModelSettings::default());
        let neck_rest = runtime.rig().bone_rotation(HumanoidBone::Neck).unwrap();

        runtime.set_cursor_tracking(true);
        runtime.set_cursor(Vec2::new(1., 0.));
        run(&mut runtime, 2.);
        let neck = runtime.rig().bone_rotation(HumanoidBone::Neck).unwrap();
        assert!(neck.to_euler(EulerRot::YXZ).0 > 0.05);

        runtime.set_cursor_tracking(false);
        run(&mut runtime, 5.);
        assert!(!runtime.overlay().is_active());
        let neck = runtime.rig().bone_rotation(HumanoidBone::Neck).unwrap();
        assert!(neck.angle_between(neck_rest) < 1e-4);
    }

    #[test]
    fn cursor_offsets_do_not_build_up_across_gestures() {
        let mut runtime = runtime(ModelSettings::default());
        let bones = [HumanoidBone::UpperChest, HumanoidBone::Neck, HumanoidBone::Head];
        let rest: Vec<Quat> = bones
            .iter()
            .map(|bone| runtime.rig().bone_rotation(*bone).unwrap())
            .collect();

        runtime.set_cursor_tracking(true);
        runtime.set_cursor(Vec2::new(1., 0.));
        for _ in 0..5 {
            run_until_gesture(&mut runtime);
            while runtime.is_gesture_playing() {
                runtime.update(1. / 60.);
            }
        }

        runtime.set_cursor_tracking(false);
        run(&mut runtime, 5.);
        assert!(!runtime.overlay().is_active());
        for (bone, rest) in bones.iter().zip(rest) {
            let settled = runtime.rig().bone_rotation(*bone).unwrap();
            assert!(settled.angle_between(rest) < 1e-4, "{bone} drifted");
        }
    }

    #[test]
    fn teardown_drops_everything() {
        let mut runtime = runtime(ModelSettings {
            default_motion: "Idle.bvh".into(),
            ..Default::default()
        });
        serve_loads(&mut runtime);

        runtime.teardown();
        assert!(runtime.mixer().is_empty());
        assert!(!runtime.scheduler().is_pending(TimerSlot::Idle));
    }
}
