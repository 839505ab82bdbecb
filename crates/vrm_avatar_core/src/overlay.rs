//! Cursor tracking, applied on top of the mixer's output.
//!
//! The overlay never accumulates onto the live pose. It keeps a snapshot of the base
//! rotation of every bone it touches and writes `base * offset` each frame. When the live
//! rotation of a bone differs from what the overlay wrote last frame, something else (the
//! mixer) animated it and the live value becomes the new base.

use bevy::{
    math::{EulerRot, Quat, Vec2, Vec3},
    reflect::Reflect,
};

use crate::{config::OverlayTuning, humanoid::HumanoidBone, rig::HumanoidRig};

/// Converts a per-frame smoothing factor tuned at 60 Hz into one for a `delta` second frame
pub fn frame_smoothing(factor: f32, delta: f32) -> f32 {
    1. - (1. - factor.clamp(0., 1.)).powf(delta.max(0.) * 60.)
}

/// Normalizes a viewport position to `[-1, 1]` on both axes, Y pointing up
pub fn normalized_cursor(position: Vec2, viewport: Vec2) -> Vec2 {
    if viewport.x <= 0. || viewport.y <= 0. {
        return Vec2::ZERO;
    }
    Vec2::new(
        position.x / viewport.x * 2. - 1.,
        -(position.y / viewport.y) * 2. + 1.,
    )
    .clamp(Vec2::NEG_ONE, Vec2::ONE)
}

const TRACKED_BONES: [HumanoidBone; 4] = [
    HumanoidBone::UpperChest,
    HumanoidBone::Neck,
    HumanoidBone::LeftEye,
    HumanoidBone::RightEye,
];

#[derive(Clone, Debug, PartialEq)]
struct TrackedBone {
    bone: HumanoidBone,
    base: Quat,
    applied: Quat,
    /// Euler XYZ offset
    offset: Vec3,
}

#[derive(Clone, Debug, PartialEq)]
struct OverlaySnapshot {
    bones: Vec<TrackedBone>,
    root_base: Quat,
    root_applied: Quat,
    /// (pitch, yaw)
    root_offset: Vec2,
}

#[derive(Clone, Debug, Default, PartialEq, Reflect)]
pub struct CursorOverlay {
    tuning: OverlayTuning,
    tracking: bool,
    cursor: Vec2,
    #[reflect(ignore)]
    snapshot: Option<OverlaySnapshot>,
}

impl CursorOverlay {
    pub fn new(tuning: OverlayTuning) -> Self {
        Self {
            tuning,
            ..Default::default()
        }
    }

    pub fn set_tracking(&mut self, tracking: bool) {
        self.tracking = tracking;
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    /// Normalized cursor position, see [`normalized_cursor`]
    pub fn set_cursor(&mut self, cursor: Vec2) {
        self.cursor = cursor.clamp(Vec2::NEG_ONE, Vec2::ONE);
    }

    /// Whether a base pose snapshot is held, i.e. tracking is on or still decaying
    pub fn is_active(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Root rotation the overlay offsets from, if it is active
    pub fn root_base(&self) -> Option<Quat> {
        self.snapshot.as_ref().map(|s| s.root_base)
    }

    /// Moves the root base, e.g. for a whole-body sway that runs under the overlay
    pub fn set_root_base(&mut self, rotation: Quat) {
        if let Some(snapshot) = &mut self.snapshot {
            snapshot.root_base = rotation;
        }
    }

    /// Adopts the live pose as the new base for every bone the overlay did not write last.
    /// Called when an animation completes.
    pub fn resnapshot(&mut self, rig: &HumanoidRig) {
        let Some(snapshot) = &mut self.snapshot else {
            return;
        };
        for tracked in &mut snapshot.bones {
            if let Some(live) = rig.bone_rotation(tracked.bone)
                && live != tracked.applied
            {
                tracked.base = live;
                tracked.applied = live;
            }
        }
    }

    /// Puts the base pose back under the overlay's offsets. Runs at the start of a frame so
    /// the mixer and the gesture generator only ever see the pose without cursor offsets;
    /// [`apply`](Self::apply) adds them again at the end of the frame.
    pub fn restore_base(&mut self, rig: &mut HumanoidRig) {
        let Some(snapshot) = &mut self.snapshot else {
            return;
        };
        for tracked in &mut snapshot.bones {
            let Some(live) = rig.bone_rotation(tracked.bone) else {
                continue;
            };
            if live != tracked.applied {
                tracked.base = live;
            }
            tracked.applied = tracked.base;
            rig.set_bone_rotation(tracked.bone, tracked.base);
        }

        let root = rig.root().rotation;
        if root != snapshot.root_applied {
            snapshot.root_base = root;
        }
        snapshot.root_applied = snapshot.root_base;
        rig.root_mut().rotation = snapshot.root_base;
    }

    fn take_snapshot(rig: &HumanoidRig) -> OverlaySnapshot {
        let bones = TRACKED_BONES
            .iter()
            .filter_map(|bone| {
                let rotation = rig.bone_rotation(*bone)?;
                Some(TrackedBone {
                    bone: *bone,
                    base: rotation,
                    applied: rotation,
                    offset: Vec3::ZERO,
                })
            })
            .collect();
        let root = rig.root().rotation;

        OverlaySnapshot {
            bones,
            root_base: root,
            root_applied: root,
            root_offset: Vec2::ZERO,
        }
    }

    fn bone_target(&self, bone: HumanoidBone) -> Vec3 {
        let t = &self.tuning;
        let Vec2 { x, y } = self.cursor;
        match bone {
            HumanoidBone::UpperChest => {
                let yaw = x * t.chest_gain;
                Vec3::new(y * t.chest_gain, yaw, -yaw * t.chest_roll_factor)
            }
            HumanoidBone::Neck => Vec3::new(
                (y * t.neck_gain).clamp(-t.neck_max, t.neck_max),
                (x * t.neck_gain).clamp(-t.neck_max, t.neck_max),
                0.,
            ),
            HumanoidBone::LeftEye | HumanoidBone::RightEye => {
                let yaw = (x * t.eye_yaw_gain).clamp(-t.eye_yaw_max, t.eye_yaw_max);
                let pitch = (-y * t.eye_pitch_gain).clamp(-t.eye_pitch_max, t.eye_pitch_max);
                let outward = if bone == HumanoidBone::LeftEye {
                    t.eye_convergence_yaw
                } else {
                    -t.eye_convergence_yaw
                };
                Vec3::new(pitch + t.eye_convergence_pitch, yaw + outward, 0.)
            }
            _ => Vec3::ZERO,
        }
    }

    fn bone_smoothing(&self, bone: HumanoidBone) -> f32 {
        match bone {
            HumanoidBone::UpperChest => self.tuning.chest_smoothing,
            HumanoidBone::Neck => self.tuning.neck_smoothing,
            _ => self.tuning.eye_smoothing,
        }
    }

    /// Applies the overlay for one frame. Runs after the mixer.
    pub fn apply(&mut self, delta: f32, rig: &mut HumanoidRig) {
        if self.snapshot.is_none() {
            if !self.tracking {
                return;
            }
            self.snapshot = Some(Self::take_snapshot(rig));
        }

        let tracking = self.tracking;
        let targets: Vec<Vec3> = TRACKED_BONES
            .iter()
            .map(|bone| {
                if tracking {
                    self.bone_target(*bone)
                } else {
                    Vec3::ZERO
                }
            })
            .collect();
        let smoothing: Vec<f32> = TRACKED_BONES
            .iter()
            .map(|bone| {
                frame_smoothing(
                    if tracking {
                        self.bone_smoothing(*bone)
                    } else {
                        self.tuning.decay
                    },
                    delta,
                )
            })
            .collect();
        let root_target = if tracking {
            Vec2::new(
                self.cursor.y * self.tuning.root_pitch_gain,
                self.cursor.x * self.tuning.root_yaw_gain,
            )
        } else {
            Vec2::ZERO
        };
        let root_smoothing = if tracking {
            Vec2::new(
                frame_smoothing(self.tuning.root_pitch_smoothing, delta),
                frame_smoothing(self.tuning.root_yaw_smoothing, delta),
            )
        } else {
            Vec2::splat(frame_smoothing(self.tuning.decay, delta))
        };
        let epsilon = self.tuning.settle_epsilon;

        let Some(snapshot) = &mut self.snapshot else {
            return;
        };

        let mut settled = true;
        for tracked in &mut snapshot.bones {
            let Some(live) = rig.bone_rotation(tracked.bone) else {
                continue;
            };
            if live != tracked.applied {
                tracked.base = live;
            }

            let index = TRACKED_BONES
                .iter()
                .position(|bone| *bone == tracked.bone)
                .unwrap_or_default();
            tracked.offset += (targets[index] - tracked.offset) * smoothing[index];
            settled &= tracked.offset.abs().max_element() <= epsilon;

            tracked.applied = tracked.base * euler_quat(tracked.offset);
            rig.set_bone_rotation(tracked.bone, tracked.applied);
        }

        let root = rig.root().rotation;
        if root != snapshot.root_applied {
            snapshot.root_base = root;
        }
        snapshot.root_offset += (root_target - snapshot.root_offset) * root_smoothing;
        settled &= snapshot.root_offset.abs().max_element() <= epsilon;

        let (x, y, z) = snapshot.root_base.to_euler(EulerRot::XYZ);
        snapshot.root_applied = Quat::from_euler(
            EulerRot::XYZ,
            x + snapshot.root_offset.x,
            y + snapshot.root_offset.y,
            z,
        );
        rig.root_mut().rotation = snapshot.root_applied;

        if !tracking && settled {
            for tracked in &snapshot.bones {
                rig.set_bone_rotation(tracked.bone, tracked.base);
            }
            rig.root_mut().rotation = snapshot.root_base;
            self.snapshot = None;
        }
    }
}

fn euler_quat(offset: Vec3) -> Quat {
    Quat::from_euler(EulerRot::XYZ, offset.x, offset.y, offset.z)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::rig::test::test_rig;

    #[test]
    fn smoothing_is_frame_rate_independent() {
        let one = frame_smoothing(0.1, 1. / 30.);
        let half = frame_smoothing(0.1, 1. / 60.);
        assert!((half - 0.1).abs() < 1e-5);
        assert!(((1. - half) * (1. - half) - (1. - one)).abs() < 1e-5);
    }

    #[test]
    fn cursor_normalization() {
        let viewport = Vec2::new(200., 100.);
        assert_eq!(normalized_cursor(Vec2::new(100., 50.), viewport), Vec2::ZERO);
        assert_eq!(normalized_cursor(Vec2::new(200., 0.), viewport), Vec2::ONE);
        assert_eq!(normalized_cursor(Vec2::new(400., 100.), viewport), Vec2::new(1., -1.));
    }

    #[test]
    fn offsets_are_bounded_and_ordered() {
        let mut rig = test_rig();
        let mut overlay = CursorOverlay::new(OverlayTuning::default());
        overlay.set_tracking(true);
        overlay.set_cursor(Vec2::new(1., 0.));

        for _ in 0..600 {
            overlay.apply(1. / 60., &mut rig);
        }

        let yaw = |bone| {
            rig.bone_rotation(bone)
                .unwrap()
                .to_euler(EulerRot::XYZ)
                .1
        };
        let eye = yaw(HumanoidBone::RightEye);
        let neck = yaw(HumanoidBone::Neck);
        let chest = yaw(HumanoidBone::UpperChest);
        let root = rig.root().rotation.to_euler(EulerRot::XYZ).1;

        assert!(eye > neck && neck > chest && chest > 0.);
        assert!(eye <= 0.52);
        assert!((neck - 0.1).abs() < 1e-3);
        assert!((root - 0.12).abs() < 1e-3);
    }

    #[test]
    fn toggling_restores_the_original_pose() {
        let mut rig = test_rig();
        let original: Vec<_> = TRACKED_BONES
            .iter()
            .map(|bone| rig.bone_rotation(*bone))
            .collect();
        let original_root = rig.root().rotation;

        let mut overlay = CursorOverlay::new(OverlayTuning::default());
        overlay.set_cursor(Vec2::new(-0.8, 0.6));
        for _ in 0..100 {
            overlay.set_tracking(true);
            for _ in 0..5 {
                overlay.apply(1. / 60., &mut rig);
            }
            overlay.set_tracking(false);
            overlay.apply(1. / 60., &mut rig);
        }
        while overlay.is_active() {
            overlay.apply(1. / 60., &mut rig);
        }

        let restored: Vec<_> = TRACKED_BONES
            .iter()
            .map(|bone| rig.bone_rotation(*bone))
            .collect();
        assert_eq!(restored, original);
        assert_eq!(rig.root().rotation, original_root);
    }

    #[test]
    fn animated_bones_become_the_new_base() {
        let mut rig = test_rig();
        let mut overlay = CursorOverlay::new(OverlayTuning::default());
        overlay.set_tracking(true);
        overlay.set_cursor(Vec2::new(0.5, 0.));
        overlay.apply(1. / 60., &mut rig);

        let animated = Quat::from_rotation_x(0.3);
        rig.set_bone_rotation(HumanoidBone::Neck, animated);
        overlay.set_tracking(false);
        while overlay.is_active() {
            overlay.apply(1. / 60., &mut rig);
        }

        assert_eq!(rig.bone_rotation(HumanoidBone::Neck), Some(animated));
    }

    #[test]
    fn restoring_the_base_hides_the_offsets_until_the_next_apply() {
        let mut rig = test_rig();
        let rest = rig.bone_rotation(HumanoidBone::Neck).unwrap();
        let mut overlay = CursorOverlay::new(OverlayTuning::default());
        overlay.set_tracking(true);
        overlay.set_cursor(Vec2::new(1., 0.));

        for _ in 0..300 {
            overlay.restore_base(&mut rig);
            assert_eq!(rig.bone_rotation(HumanoidBone::Neck), Some(rest));
            overlay.apply(1. / 60., &mut rig);
        }
        let tracked = rig.bone_rotation(HumanoidBone::Neck).unwrap();
        assert!(tracked.angle_between(rest) > 0.09);

        overlay.restore_base(&mut rig);
        overlay.resnapshot(&rig);
        overlay.apply(1. / 60., &mut rig);
        let again = rig.bone_rotation(HumanoidBone::Neck).unwrap();
        assert!(again.angle_between(tracked) < 1e-4);
    }
}
