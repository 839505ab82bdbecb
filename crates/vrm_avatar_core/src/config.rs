//! Tuning knobs and per-model settings.
//!
//! Everything here deserializes from RON with every field optional; missing fields take
//! the defaults below.

use bevy::{
    math::{EulerRot, Quat, Vec3},
    platform::collections::HashMap,
    reflect::Reflect,
    transform::components::Transform,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{humanoid::HumanoidBone, retarget::RetargetOptions};

/// Global runtime configuration shared by every avatar
#[derive(Reflect, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvatarConfig {
    pub features: FeatureToggles,
    pub mixer: MixerTuning,
    pub procedural: ProceduralTuning,
    pub idle: IdleTuning,
    pub overlay: OverlayTuning,
    pub expression: ExpressionTuning,
    pub lip_sync: LipSyncTuning,
    pub sequence: SequenceTuning,
}

impl AvatarConfig {
    pub fn from_ron(source: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(source)
    }
}

/// Host-facing on/off switches
#[derive(Reflect, Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureToggles {
    pub natural_idle: bool,
    pub blink: bool,
    pub follow_cursor: bool,
    /// Keep loaded models around after they are unassigned
    pub models_cache: bool,
    /// Keep retargeted clips around, per model and motion file
    pub animations_cache: bool,
    /// Drive the mouth from audio instead of from message text
    pub tts_lips_sync: bool,
}

impl Default for FeatureToggles {
    fn default() -> Self {
        Self {
            natural_idle: true,
            blink: false,
            follow_cursor: false,
            models_cache: false,
            animations_cache: false,
            tts_lips_sync: false,
        }
    }
}

#[derive(Reflect, Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerTuning {
    /// Fade-in, fade-out and crossfade duration
    pub crossfade_secs: f32,
}

impl Default for MixerTuning {
    fn default() -> Self {
        Self {
            crossfade_secs: 0.3,
        }
    }
}

#[derive(Reflect, Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProceduralTuning {
    /// Time to reach, and to leave, the target pose of a single-stage gesture
    pub ramp_secs: f32,
    /// Final segment of a multi-stage gesture, back to the base pose
    pub return_secs: f32,
}

impl Default for ProceduralTuning {
    fn default() -> Self {
        Self {
            ramp_secs: 3.5,
            return_secs: 2.5,
        }
    }
}

#[derive(Reflect, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleTuning {
    /// Base names of motions that count as idle
    pub idle_motions: Vec<String>,
    /// Delay range of the scheduler's tick while an explicit motion plays
    pub reschedule_secs: (f32, f32),
    /// Quiet time after a gesture completes, before the next one may start
    pub cooldown_secs: (f32, f32),
    /// Chance of a procedural gesture over an authored idle clip
    pub procedural_weight: f32,
    pub expression_intensity: f32,
    pub expression_secs: f32,
    /// Whole-body yaw sway envelope
    pub sway_secs: f32,
    /// Per 60 Hz frame approach factor toward the sway target
    pub sway_approach: f32,
    /// Per 60 Hz frame factor used while returning to the base yaw
    pub sway_return: f32,
    /// Ramp and hold fractions of expression and sway envelopes
    pub envelope_ramp: f32,
    pub envelope_hold: f32,
}

impl Default for IdleTuning {
    fn default() -> Self {
        Self {
            idle_motions: ["idle", "breathe", "nod", "shrug", "think", "relax", "glance"]
                .into_iter()
                .map(String::from)
                .collect(),
            reschedule_secs: (10., 30.),
            cooldown_secs: (7., 21.),
            procedural_weight: 0.7,
            expression_intensity: 0.7,
            expression_secs: 2.,
            sway_secs: 7.,
            sway_approach: 0.04,
            sway_return: 0.03,
            envelope_ramp: 0.3,
            envelope_hold: 0.4,
        }
    }
}

/// Cursor tracking gains (radians per unit of normalized cursor offset), clamps and per
/// 60 Hz frame smoothing factors. Eyes move most, the root least.
#[derive(Reflect, Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayTuning {
    pub root_yaw_gain: f32,
    pub root_yaw_smoothing: f32,
    pub root_pitch_gain: f32,
    pub root_pitch_smoothing: f32,
    pub chest_gain: f32,
    pub chest_smoothing: f32,
    /// Roll added to the upper chest, as a fraction of its yaw
    pub chest_roll_factor: f32,
    pub neck_gain: f32,
    pub neck_max: f32,
    pub neck_smoothing: f32,
    pub eye_yaw_gain: f32,
    pub eye_yaw_max: f32,
    pub eye_pitch_gain: f32,
    pub eye_pitch_max: f32,
    pub eye_smoothing: f32,
    pub eye_convergence_yaw: f32,
    pub eye_convergence_pitch: f32,
    /// Per frame decay toward the base pose once tracking stops
    pub decay: f32,
    /// Offsets below this are considered settled
    pub settle_epsilon: f32,
}

impl Default for OverlayTuning {
    fn default() -> Self {
        Self {
            root_yaw_gain: 0.12,
            root_yaw_smoothing: 0.03,
            root_pitch_gain: 0.04,
            root_pitch_smoothing: 0.025,
            chest_gain: 0.06,
            chest_smoothing: 0.05,
            chest_roll_factor: 0.15,
            neck_gain: 0.1,
            neck_max: 0.15,
            neck_smoothing: 0.07,
            eye_yaw_gain: 0.65,
            eye_yaw_max: 0.52,
            eye_pitch_gain: 0.55,
            eye_pitch_max: 0.35,
            eye_smoothing: 0.12,
            eye_convergence_yaw: 0.03,
            eye_convergence_pitch: 0.02,
            decay: 0.05,
            settle_epsilon: 0.001,
        }
    }
}

#[derive(Reflect, Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpressionTuning {
    /// How long the eyes stay closed
    pub blink_secs: (f32, f32),
    /// Time between blinks
    pub blink_interval_secs: (f32, f32),
    pub talk_secs_per_char: f32,
    /// Other expressions are capped at this while the mouth moves
    pub talk_expression_cap: f32,
}

impl Default for ExpressionTuning {
    fn default() -> Self {
        Self {
            blink_secs: (0.05, 0.3),
            blink_interval_secs: (2., 12.),
            talk_secs_per_char: 0.05,
            talk_expression_cap: 0.25,
        }
    }
}

#[derive(Reflect, Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LipSyncTuning {
    pub sample_rate: f32,
    /// Mean band level the signal must exceed, before doubling
    pub threshold: f32,
    pub boost: f32,
    pub vowel_damp: f32,
    pub vowel_min: f32,
    /// Decayed visemes below this snap to zero
    pub cutoff: f32,
    pub decay: VisemeWeights,
}

impl Default for LipSyncTuning {
    fn default() -> Self {
        Self {
            sample_rate: 48000.,
            threshold: 22.,
            boost: 8.,
            vowel_damp: 60.,
            vowel_min: 18.,
            cutoff: 0.1,
            decay: VisemeWeights {
                aa: 0.5,
                ee: 0.45,
                ih: 0.45,
                oh: 0.55,
                ou: 0.5,
            },
        }
    }
}

/// One value per mouth shape
#[derive(Reflect, Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VisemeWeights {
    pub aa: f32,
    pub ee: f32,
    pub ih: f32,
    pub oh: f32,
    pub ou: f32,
}

#[derive(Reflect, Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceTuning {
    /// Play time of looping steps without an explicit duration
    pub loop_step_secs: f32,
    /// Used by `wait:` tokens whose value is not a number
    pub default_wait_ms: u32,
}

impl Default for SequenceTuning {
    fn default() -> Self {
        Self {
            loop_step_secs: 10.,
            default_wait_ms: 500,
        }
    }
}

/// What to do when a message is classified with a given label
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifyMapping {
    pub expression: String,
    pub motion: String,
    /// A sequence script; preferred over `motion` when not empty
    pub sequence: String,
}

impl Default for ClassifyMapping {
    fn default() -> Self {
        Self {
            expression: "none".into(),
            motion: "none".into(),
            sequence: String::new(),
        }
    }
}

/// Custom expression made of several weighted blend shapes
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BlendShapeGroup {
    pub blend_shapes: IndexMap<String, f32>,
}

/// Settings of one model file
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub scale: f32,
    pub position: [f32; 3],
    /// Euler angles (XYZ)
    pub rotation: [f32; 3],
    pub default_expression: String,
    pub default_motion: String,
    pub classify: IndexMap<String, ClassifyMapping>,
    pub blend_shape_mapping: IndexMap<String, BlendShapeGroup>,
    /// Authored clips the idle scheduler may pick instead of a procedural gesture
    pub idle_clips: Vec<String>,
    /// Source bone name overrides applied when retargeting motions for this model
    pub bone_overrides: IndexMap<String, HumanoidBone>,
    /// Euler (XYZ) corrections right-multiplied onto retargeted rotations
    pub bone_rotation_offsets: IndexMap<HumanoidBone, [f32; 3]>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            scale: 1.,
            position: [0.; 3],
            rotation: [0.; 3],
            default_expression: "neutral".into(),
            default_motion: "none".into(),
            classify: IndexMap::new(),
            blend_shape_mapping: IndexMap::new(),
            idle_clips: Vec::new(),
            bone_overrides: IndexMap::new(),
            bone_rotation_offsets: IndexMap::new(),
        }
    }
}

impl ModelSettings {
    pub fn from_ron(source: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(source)
    }

    /// Transform of the container the model is placed in
    pub fn root_transform(&self) -> Transform {
        let [x, y, z] = self.rotation;
        Transform::from_translation(Vec3::from_array(self.position))
            .with_rotation(Quat::from_euler(EulerRot::XYZ, x, y, z))
            .with_scale(Vec3::splat(self.scale))
    }

    pub fn retarget_options(&self) -> RetargetOptions {
        RetargetOptions {
            bone_overrides: self
                .bone_overrides
                .iter()
                .map(|(name, bone)| (name.clone(), *bone))
                .collect::<HashMap<_, _>>(),
            rotation_offsets: self
                .bone_rotation_offsets
                .iter()
                .map(|(bone, [x, y, z])| (*bone, Quat::from_euler(EulerRot::XYZ, *x, *y, *z)))
                .collect::<HashMap<_, _>>(),
            source_hips_height: None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config = AvatarConfig::from_ron(
            "(features: (blink: true), mixer: (crossfade_secs: 0.5), idle: (cooldown_secs: (1., 2.)))",
        )
        .unwrap();

        assert!(config.features.blink);
        assert!(config.features.natural_idle);
        assert_eq!(config.mixer.crossfade_secs, 0.5);
        assert_eq!(config.idle.cooldown_secs, (1., 2.));
        assert_eq!(config.idle.reschedule_secs, (10., 30.));
        assert_eq!(config.overlay, OverlayTuning::default());
    }

    #[test]
    fn model_settings_from_ron() {
        let settings = ModelSettings::from_ron(
            r#"(
                scale: 2.,
                default_motion: "Idle.bvh",
                classify: {
                    "joy": (expression: "happy", sequence: "wave,wait:500"),
                },
                blend_shape_mapping: {
                    "smug": (blend_shapes: {"happy": 0.5, "blinkLeft": 1.0}),
                },
            )"#,
        )
        .unwrap();

        assert_eq!(settings.default_expression, "neutral");
        assert_eq!(settings.classify["joy"].motion, "none");
        assert_eq!(settings.classify["joy"].sequence, "wave,wait:500");
        assert_eq!(settings.blend_shape_mapping["smug"].blend_shapes.len(), 2);
        assert_eq!(settings.root_transform().scale, Vec3::splat(2.));
    }
}
