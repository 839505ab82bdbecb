use bevy::{log::debug, reflect::Reflect};
use indexmap::IndexMap;
use rand::{Rng, seq::IndexedRandom};

use crate::{
    config::IdleTuning,
    interpolation::easing::pulse_envelope,
    motion::{NO_MOTION, motion_base_name},
    overlay::frame_smoothing,
    procedural::{MovementDescriptor, RandomizedMovement},
};

/// Uniform draw in `[min, max)`, or `min` for an empty range
pub fn random_secs(rng: &mut impl Rng, (min, max): (f32, f32)) -> f32 {
    if max > min {
        rng.random_range(min..max)
    } else {
        min
    }
}

/// Whether `motion` counts as idle: a known idle name, no motion at all, or the model's
/// default motion, compared by base name.
pub fn is_idle_class(motion: &str, default_motion: &str, idle_motions: &[String]) -> bool {
    if motion == NO_MOTION {
        return true;
    }
    let base = motion_base_name(motion);
    idle_motions.iter().any(|idle| idle == base) || base == motion_base_name(default_motion)
}

#[derive(Clone, Debug, PartialEq)]
pub enum GestureSource {
    Procedural {
        key: String,
        movement: RandomizedMovement,
    },
    /// A pre-authored idle clip file
    Authored { file: String },
}

#[derive(Clone, Debug, PartialEq)]
pub struct GesturePlan {
    pub source: GestureSource,
    pub expression: Option<String>,
}

impl GesturePlan {
    pub fn model_yaw(&self) -> f32 {
        match &self.source {
            GestureSource::Procedural { movement, .. } => movement.model_yaw,
            GestureSource::Authored { .. } => 0.,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum IdleDecision {
    /// The avatar is busy or idle motion is off: tick again later
    Reschedule(f32),
    /// Still cooling down from the previous gesture
    Defer(f32),
    Play(GesturePlan),
}

/// Inputs of one idle tick
pub struct IdleContext<'a> {
    pub now: f32,
    pub current_motion: &'a str,
    pub default_motion: &'a str,
    pub enabled: bool,
    pub authored_clips: &'a [String],
}

/// Decides, on every tick, whether an idle gesture should play.
#[derive(Clone, Debug)]
pub struct IdleScheduler {
    tuning: IdleTuning,
    movements: IndexMap<String, MovementDescriptor>,
    last_completed: Option<f32>,
    cooldown: f32,
    playing: bool,
}

impl IdleScheduler {
    pub fn new(tuning: IdleTuning, movements: IndexMap<String, MovementDescriptor>) -> Self {
        Self {
            tuning,
            movements,
            last_completed: None,
            cooldown: 0.,
            playing: false,
        }
    }

    pub fn tuning(&self) -> &IdleTuning {
        &self.tuning
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Delay before the next tick while nothing idle can happen
    pub fn reschedule_delay(&self, rng: &mut impl Rng) -> f32 {
        random_secs(rng, self.tuning.reschedule_secs)
    }

    /// Forgets the gesture in progress, e.g. when an explicit motion takes over
    pub fn interrupt(&mut self) {
        self.playing = false;
    }

    pub fn tick(&mut self, context: IdleContext<'_>, rng: &mut impl Rng) -> IdleDecision {
        let idle = is_idle_class(
            context.current_motion,
            context.default_motion,
            &self.tuning.idle_motions,
        );
        if !idle || !context.enabled {
            self.playing = false;
            return IdleDecision::Reschedule(self.reschedule_delay(rng));
        }

        if let Some(completed) = self.last_completed {
            let remaining = completed + self.cooldown - context.now;
            if remaining > 0. {
                debug!("Idle gesture cooling down, {remaining:.1}s left");
                return IdleDecision::Defer(remaining);
            }
        }

        let authored = context.authored_clips.choose(rng).filter(|_| {
            rng.random::<f32>() >= self.tuning.procedural_weight
        });

        let plan = match authored {
            Some(file) => GesturePlan {
                source: GestureSource::Authored { file: file.clone() },
                expression: None,
            },
            None => {
                let Some((key, descriptor)) = self
                    .movements
                    .get_index(rng.random_range(0..self.movements.len().max(1)))
                else {
                    return IdleDecision::Reschedule(self.reschedule_delay(rng));
                };

                let expression = descriptor.expression.as_ref().and_then(|trigger| {
                    (rng.random::<f32>() < trigger.chance)
                        .then(|| trigger.candidates.choose(rng).cloned())
                        .flatten()
                });

                GesturePlan {
                    source: GestureSource::Procedural {
                        key: key.clone(),
                        movement: descriptor.randomized(rng),
                    },
                    expression,
                }
            }
        };

        self.playing = true;
        IdleDecision::Play(plan)
    }

    /// Records the end of the current gesture and draws the next cooldown
    pub fn complete(&mut self, now: f32, rng: &mut impl Rng) {
        self.playing = false;
        self.last_completed = Some(now);
        self.cooldown = random_secs(rng, self.tuning.cooldown_secs);
    }
}

/// Whole-body yaw that eases toward `offset`, holds and eases back.
#[derive(Reflect, Clone, Copy, Debug, PartialEq)]
pub struct YawSway {
    offset: f32,
    current: f32,
    elapsed: f32,
    duration: f32,
    approach: f32,
    release: f32,
    ramp: f32,
    hold: f32,
    epsilon: f32,
}

impl YawSway {
    pub fn new(offset: f32, tuning: &IdleTuning) -> Self {
        Self {
            offset,
            current: 0.,
            elapsed: 0.,
            duration: tuning.sway_secs,
            approach: tuning.sway_approach,
            release: tuning.sway_return,
            ramp: tuning.envelope_ramp,
            hold: tuning.envelope_hold,
            epsilon: 0.001,
        }
    }

    /// Advances the sway and returns the yaw to add to the base
    pub fn update(&mut self, delta: f32) -> f32 {
        self.elapsed += delta;
        if self.elapsed >= self.duration {
            self.current += -self.current * frame_smoothing(self.release, delta);
        } else {
            let progress = self.elapsed / self.duration.max(f32::EPSILON);
            let target = self.offset * pulse_envelope(progress, self.ramp, self.hold);
            self.current += (target - self.current) * frame_smoothing(self.approach, delta);
        }
        if self.is_finished() {
            self.current = 0.;
        }
        self.current
    }

    pub fn is_finished(&self) -> bool {
        self.elapsed >= self.duration && self.current.abs() <= self.epsilon
    }
}
