use std::sync::Arc;

use bevy::{
    log::debug,
    math::{Quat, Vec3},
    platform::collections::HashMap,
    transform::components::Transform,
};

use crate::{
    clip::{Clip, TrackSample},
    id::RigId,
    interpolation::linear::InterpolateLinear,
    rig::HumanoidRig,
    skeleton::NodeId,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionId(u64);

/// How an incoming action replaces the ones already playing
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Transition {
    /// Stop the previous action at once, no fade in
    Cut,
    /// Fade the previous action out while the new one fades in
    Crossfade,
    /// Fade the previous action out, then fade the new one in
    #[default]
    Fade,
}

impl Transition {
    /// Unknown names fall back to [`Transition::Fade`]
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "cut" => Self::Cut,
            "crossfade" => Self::Crossfade,
            _ => Self::Fade,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionBlend {
    /// Weighted together with the other accumulating actions
    Accumulate,
    /// Slerped by its own weight over the accumulated result. Used for gestures layered
    /// on top of whatever motion is playing.
    Override,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Playback {
    Loop,
    /// Hold the last frame once the clip has played through
    Once,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct WeightRamp {
    from: f32,
    to: f32,
    elapsed: f32,
    duration: f32,
}

/// One clip being played by the mixer
#[derive(Clone, Debug)]
pub struct Action {
    id: ActionId,
    clip: Arc<Clip>,
    time: f32,
    weight: f32,
    ramp: Option<WeightRamp>,
    /// Time left before the action starts advancing
    delay: f32,
    blend: ActionBlend,
    playback: Playback,
    terminated: bool,
    finished: bool,
}

impl Action {
    fn new(id: ActionId, clip: Arc<Clip>, blend: ActionBlend, playback: Playback) -> Self {
        Self {
            id,
            clip,
            time: 0.,
            weight: 1.,
            ramp: None,
            delay: 0.,
            blend,
            playback,
            terminated: false,
            finished: false,
        }
    }

    pub fn id(&self) -> ActionId {
        self.id
    }

    pub fn clip(&self) -> &Arc<Clip> {
        &self.clip
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn weight(&self) -> f32 {
        self.weight
    }

    /// Superseded actions keep playing until their fade out completes
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    fn fade_to(&mut self, to: f32, duration: f32) {
        if duration <= 0. {
            self.weight = to;
            self.ramp = None;
            self.finished = to <= 0.;
            return;
        }
        self.ramp = Some(WeightRamp {
            from: self.weight,
            to,
            elapsed: 0.,
            duration,
        });
    }

    fn advance(&mut self, mut delta: f32) {
        if self.delay > 0. {
            self.delay -= delta;
            if self.delay > 0. {
                return;
            }
            delta = -self.delay;
            self.delay = 0.;
        }

        let duration = self.clip.duration();
        self.time = match self.playback {
            _ if duration <= 0. => 0.,
            Playback::Loop => (self.time + delta).rem_euclid(duration),
            Playback::Once => (self.time + delta).min(duration),
        };

        if let Some(ramp) = &mut self.ramp {
            ramp.elapsed += delta;
            let progress = (ramp.elapsed / ramp.duration).min(1.);
            self.weight = ramp.from.interpolate_linear(&ramp.to, progress);
            if progress >= 1. {
                self.finished = ramp.to <= 0.;
                self.ramp = None;
            }
        }
    }

    fn is_active(&self) -> bool {
        self.delay <= 0. && self.weight > 0.
    }
}

#[derive(Default, Clone, Copy)]
struct Accumulator<T> {
    value: T,
    weight: f32,
}

impl<T: InterpolateLinear + Copy> Accumulator<T> {
    fn add(slot: &mut Option<Self>, value: T, weight: f32) {
        match slot {
            None => {
                *slot = Some(Self { value, weight });
            }
            Some(acc) => {
                acc.weight += weight;
                acc.value = acc.value.interpolate_linear(&value, weight / acc.weight);
            }
        }
    }

    /// Blends toward `original` for whatever weight is missing up to 1
    fn resolve(slot: Option<Self>, original: T) -> T {
        match slot {
            Some(acc) if acc.weight < 1. => original.interpolate_linear(&acc.value, acc.weight),
            Some(acc) => acc.value,
            None => original,
        }
    }
}

#[derive(Default)]
struct NodeMix {
    rotation: Option<Accumulator<Quat>>,
    translation: Option<Accumulator<Vec3>>,
    overrides: Vec<(TrackSample, f32)>,
}

/// Blends the actions of one avatar into its rig, once per frame.
///
/// The first time an action touches a node, the node's local transform is captured. Actions
/// with too little combined weight blend toward that captured value, and a node no action
/// uses anymore is restored to it.
#[derive(Default)]
pub struct AnimationMixer {
    rig: Option<RigId>,
    actions: Vec<Action>,
    bindings: HashMap<NodeId, Transform>,
    next_id: u64,
}

impl AnimationMixer {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> ActionId {
        let id = ActionId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Plays `clip` looped, replacing the accumulating actions according to `transition`.
    /// Superseded actions are marked terminated.
    pub fn play(&mut self, clip: Arc<Clip>, transition: Transition, fade_secs: f32) -> ActionId {
        let id = self.next_id();
        let mut action = Action::new(id, clip, ActionBlend::Accumulate, Playback::Loop);

        let mut replaced_any = false;
        for previous in self
            .actions
            .iter_mut()
            .filter(|a| a.blend == ActionBlend::Accumulate && !a.terminated)
        {
            previous.terminated = true;
            replaced_any = true;
            match transition {
                Transition::Cut => previous.finished = true,
                Transition::Crossfade | Transition::Fade => previous.fade_to(0., fade_secs),
            }
        }
        self.actions.retain(|a| !a.finished);

        match transition {
            Transition::Cut => {}
            Transition::Crossfade => {
                action.weight = 0.;
                action.fade_to(1., fade_secs);
            }
            Transition::Fade => {
                action.weight = 0.;
                action.fade_to(1., fade_secs);
                if replaced_any {
                    action.delay = fade_secs.max(0.);
                }
            }
        }
        if fade_secs <= 0. {
            action.weight = 1.;
        }

        self.actions.push(action);
        id
    }

    /// Plays `clip` once on top of the current motion, fading it in
    pub fn play_layer(&mut self, clip: Arc<Clip>, fade_secs: f32) -> ActionId {
        let id = self.next_id();
        let mut action = Action::new(id, clip, ActionBlend::Override, Playback::Once);
        action.weight = 0.;
        action.fade_to(1., fade_secs);
        self.actions.push(action);
        id
    }

    /// Fades an action out and marks it terminated. It is removed once its weight reaches 0.
    pub fn fade_out(&mut self, id: ActionId, fade_secs: f32) {
        if let Some(action) = self.action_mut(id) {
            action.terminated = true;
            action.fade_to(0., fade_secs);
        }
        self.actions.retain(|a| !a.finished);
    }

    /// Fades out every accumulating action, leaving layered ones alone
    pub fn fade_out_all(&mut self, fade_secs: f32) {
        for action in self
            .actions
            .iter_mut()
            .filter(|a| a.blend == ActionBlend::Accumulate && !a.terminated)
        {
            action.terminated = true;
            action.fade_to(0., fade_secs);
        }
        self.actions.retain(|a| !a.finished);
    }

    pub fn stop(&mut self, id: ActionId) {
        self.actions.retain(|a| a.id != id);
    }

    pub fn stop_all(&mut self) {
        self.actions.clear();
    }

    pub fn set_terminated(&mut self, id: ActionId) {
        if let Some(action) = self.action_mut(id) {
            action.terminated = true;
        }
    }

    /// Actions that are gone count as terminated
    pub fn is_terminated(&self, id: ActionId) -> bool {
        self.action(id).is_none_or(Action::is_terminated)
    }

    pub fn action(&self, id: ActionId) -> Option<&Action> {
        self.actions.iter().find(|a| a.id == id)
    }

    fn action_mut(&mut self, id: ActionId) -> Option<&mut Action> {
        self.actions.iter_mut().find(|a| a.id == id)
    }

    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Advances every action by `delta` seconds and writes the blended pose into `rig`
    pub fn update(&mut self, delta: f32, rig: &mut HumanoidRig) {
        if self.rig != Some(rig.id()) {
            if self.rig.is_some() {
                debug!("Animation mixer bound to a replaced rig, rebinding");
            }
            self.bindings.clear();
            self.rig = Some(rig.id());
        }

        for action in &mut self.actions {
            action.advance(delta);
        }
        self.actions.retain(|a| !a.finished);

        let mut mixes: HashMap<NodeId, NodeMix> = HashMap::new();
        for action in self.actions.iter().filter(|a| a.is_active()) {
            for (node, sample) in action.clip.sample(action.time) {
                let mix = mixes.entry(node).or_default();
                match (action.blend, sample) {
                    (ActionBlend::Accumulate, TrackSample::Rotation(value)) => {
                        Accumulator::add(&mut mix.rotation, value, action.weight);
                    }
                    (ActionBlend::Accumulate, TrackSample::Translation(value)) => {
                        Accumulator::add(&mut mix.translation, value, action.weight);
                    }
                    (ActionBlend::Override, sample) => {
                        mix.overrides.push((sample, action.weight));
                    }
                }
            }
        }

        let skeleton = rig.skeleton_mut();
        for (node, mix) in mixes.iter() {
            let original = match self.bindings.get(node) {
                Some(original) => *original,
                None => {
                    let Some(current) = skeleton.local(*node).copied() else {
                        continue;
                    };
                    self.bindings.insert(*node, current);
                    current
                }
            };

            let mut rotation = Accumulator::resolve(mix.rotation, original.rotation);
            let mut translation = Accumulator::resolve(mix.translation, original.translation);
            for (sample, weight) in &mix.overrides {
                match sample {
                    TrackSample::Rotation(value) => {
                        rotation = rotation.interpolate_linear(value, *weight);
                    }
                    TrackSample::Translation(value) => {
                        translation = translation.interpolate_linear(value, *weight);
                    }
                }
            }

            if let Some(local) = skeleton.local_mut(*node) {
                local.rotation = rotation;
                local.translation = translation;
            }
        }

        self.bindings.retain(|node, original| {
            if mixes.contains_key(node) {
                return true;
            }
            if let Some(local) = skeleton.local_mut(*node) {
                *local = *original;
            }
            false
        });
    }
}
