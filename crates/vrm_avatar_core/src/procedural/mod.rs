//! Keyframed idle gestures synthesized from declarative movement descriptors.

pub mod catalog;

use bevy::{
    log::warn,
    math::{EulerRot, Quat},
    reflect::Reflect,
};
use indexmap::{IndexMap, IndexSet};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    clip::{Clip, ClipProvenance, ClipTrack},
    config::ProceduralTuning,
    humanoid::HumanoidBone,
    rig::HumanoidRig,
};

/// Relative Euler rotation (XYZ order, radians) added to a bone's base pose
#[derive(Reflect, Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EulerDelta {
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl EulerDelta {
    pub const ZERO: Self = Self::new(0., 0., 0.);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn apply_to(&self, base: Quat) -> Quat {
        let (x, y, z) = base.to_euler(EulerRot::XYZ);
        Quat::from_euler(EulerRot::XYZ, x + self.x, y + self.y, z + self.z)
    }

    /// Flips the sign and scales the magnitude (80% to 120%) of every axis independently
    pub fn randomized(&self, rng: &mut impl Rng) -> Self {
        let mut axis = |value: f32| {
            let direction = if rng.random::<f32>() > 0.5 { 1. } else { -1. };
            value * direction * (0.8 + rng.random::<f32>() * 0.4)
        };
        Self::new(axis(self.x), axis(self.y), axis(self.z))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MovementStage {
    pub duration_ms: f32,
    pub rotations: IndexMap<HumanoidBone, EulerDelta>,
}

#[derive(Reflect, Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct YawRange {
    pub min: f32,
    pub max: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExpressionTrigger {
    /// Probability of showing an expression while the gesture plays
    pub chance: f32,
    pub candidates: Vec<String>,
}

/// A declarative idle gesture.
///
/// Every generated clip ends on the pose it started from, so gestures can be chained
/// without drifting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MovementDescriptor {
    pub description: String,
    pub duration_ms: f32,
    #[serde(default)]
    pub rotations: IndexMap<HumanoidBone, EulerDelta>,
    /// Waypoints visited one after the other. When present they replace `rotations` for
    /// clip generation.
    #[serde(default)]
    pub stages: Vec<MovementStage>,
    /// Whole-body yaw accompanying the gesture
    #[serde(default)]
    pub model_rotation: Option<YawRange>,
    #[serde(default)]
    pub expression: Option<ExpressionTrigger>,
}

impl MovementDescriptor {
    pub fn is_multi_stage(&self) -> bool {
        !self.stages.is_empty()
    }

    /// A variation of this gesture: randomized bone deltas plus a signed root yaw drawn
    /// from `model_rotation` (0 when the gesture has none).
    pub fn randomized(&self, rng: &mut impl Rng) -> RandomizedMovement {
        let mut descriptor = self.clone();
        for delta in descriptor.rotations.values_mut() {
            *delta = delta.randomized(rng);
        }

        let model_yaw = match self.model_rotation {
            Some(range) => {
                let magnitude = range.min + rng.random::<f32>() * (range.max - range.min);
                if rng.random::<f32>() > 0.5 {
                    magnitude
                } else {
                    -magnitude
                }
            }
            None => 0.,
        };

        RandomizedMovement {
            descriptor,
            model_yaw,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RandomizedMovement {
    pub descriptor: MovementDescriptor,
    pub model_yaw: f32,
}

/// Turns movement descriptors into clips, reading base poses from the rig at generation
/// time.
#[derive(Clone, Copy, Debug)]
pub struct ProceduralGenerator {
    tuning: ProceduralTuning,
}

impl ProceduralGenerator {
    pub fn new(tuning: ProceduralTuning) -> Self {
        Self { tuning }
    }

    /// Returns `None` (and logs a warning) when none of the descriptor's bones exist on the
    /// rig.
    pub fn generate(
        &self,
        name: &str,
        rig: &HumanoidRig,
        descriptor: &MovementDescriptor,
    ) -> Option<Clip> {
        let tracks = if descriptor.is_multi_stage() {
            self.multi_stage_tracks(rig, descriptor)
        } else {
            self.ramp_tracks(rig, descriptor)
        };

        if tracks.is_empty() {
            warn!("No valid bone tracks generated for idle movement {name}");
            return None;
        }

        Some(Clip::new(name, ClipProvenance::Procedural, tracks))
    }

    /// base -> target (ramp) -> target (hold) -> base (ramp)
    fn ramp_tracks(&self, rig: &HumanoidRig, descriptor: &MovementDescriptor) -> Vec<ClipTrack> {
        let ramp = self.tuning.ramp_secs;
        let duration = descriptor.duration_ms / 1000.;
        let hold = (duration - ramp * 2.).max(0.);
        let times = vec![0., ramp, ramp + hold, ramp * 2. + hold];

        descriptor
            .rotations
            .iter()
            .filter_map(|(bone, delta)| {
                let node = rig.node(*bone)?;
                let base = rig.skeleton().local(node)?.rotation;
                let target = delta.apply_to(base);
                Some(ClipTrack::rotation(
                    node,
                    times.clone(),
                    vec![base, target, target, base],
                ))
            })
            .collect()
    }

    /// One keyframe per stage on a shared time axis, then back to base
    fn multi_stage_tracks(
        &self,
        rig: &HumanoidRig,
        descriptor: &MovementDescriptor,
    ) -> Vec<ClipTrack> {
        let bones: IndexSet<HumanoidBone> = descriptor
            .stages
            .iter()
            .flat_map(|stage| stage.rotations.keys().copied())
            .collect();

        bones
            .into_iter()
            .filter_map(|bone| {
                let node = rig.node(bone)?;
                let base = rig.skeleton().local(node)?.rotation;

                let mut time = 0.;
                let mut times = vec![time];
                let mut values = vec![base];
                for stage in &descriptor.stages {
                    let delta = stage.rotations.get(&bone).copied().unwrap_or(EulerDelta::ZERO);
                    time += stage.duration_ms / 1000.;
                    times.push(time);
                    values.push(delta.apply_to(base));
                }
                time += self.tuning.return_secs;
                times.push(time);
                values.push(base);

                Some(ClipTrack::rotation(node, times, values))
            })
            .collect()
    }
}
