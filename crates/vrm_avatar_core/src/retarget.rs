use bevy::{
    log::{debug, warn},
    math::{Quat, Vec3},
    platform::collections::HashMap,
};

use crate::{
    bone_map::BoneNameMapper,
    clip::{
        Clip, ClipProvenance, ClipTrack, Keyframes,
        source::SourceClip,
    },
    decode::MotionFormat,
    humanoid::HumanoidBone,
    rig::HumanoidRig,
    skeleton::Skeleton,
};

/// Below this the source hips height is treated as unknown
const MIN_HIPS_HEIGHT: f32 = 1e-4;

/// Per-model knobs for retargeting.
#[derive(Clone, Debug, Default)]
pub struct RetargetOptions {
    /// Source bone name -> humanoid bone, checked before the format's own table
    pub bone_overrides: HashMap<String, HumanoidBone>,
    /// Correction rotations right-multiplied onto every sample of a bone
    pub rotation_offsets: HashMap<HumanoidBone, Quat>,
    /// Forces the source hips height instead of reading it from the source rest pose
    pub source_hips_height: Option<f32>,
}

/// Where rest rotations for the rest-pose correction are read from
enum RestReference<'a> {
    Skeleton(&'a Skeleton),
    /// Samples already are humanoid-normalized rotations
    Normalized,
}

/// Converts a decoded clip into a clip playable on `rig`.
///
/// Tracks whose bone cannot be mapped to a humanoid slot, or whose slot the rig lacks, are
/// dropped. When the format needs a skeleton to bind against and none is available, a
/// warning is logged and an empty clip is returned.
pub fn retarget(source: &SourceClip, rig: &HumanoidRig, options: &RetargetOptions) -> Clip {
    let provenance = ClipProvenance::Retargeted(source.format);
    let mapper = BoneNameMapper::new(source.format.bone_convention())
        .with_overrides(options.bone_overrides.clone());

    let Some(rest) = rest_reference(source, rig) else {
        warn!(
            "Cannot bind {} ({}), no target skeleton available",
            source.name, source.format
        );
        return Clip::empty(source.name.clone(), provenance);
    };

    let scale = translation_scale(source, rig, &mapper, options);
    let legacy = rig.legacy_axes();

    let mut tracks = Vec::with_capacity(source.tracks.len());
    for track in &source.tracks {
        let (bone_name, _) = match track.target() {
            Ok(target) => target,
            Err(error) => {
                debug!("Skipping track: {error}");
                continue;
            }
        };
        let Some(bone) = mapper.map(bone_name) else {
            continue;
        };
        let Some(node) = rig.node(bone) else {
            debug!("Rig has no {bone} bone, dropping track {}", track.id);
            continue;
        };

        let keyframes = match &track.keyframes {
            Keyframes::Rotation(values) => {
                let (parent_rest_world, rest_inverse) = match &rest {
                    RestReference::Skeleton(skeleton) => {
                        let Some(source_node) = skeleton.find(bone_name) else {
                            debug!("Source rest pose has no node {bone_name}, dropping track");
                            continue;
                        };
                        let parent_rest_world = skeleton
                            .parent(source_node)
                            .map(|parent| skeleton.rest_world_rotation(parent))
                            .unwrap_or(Quat::IDENTITY);
                        (
                            parent_rest_world,
                            skeleton.rest_world_rotation(source_node).inverse(),
                        )
                    }
                    RestReference::Normalized => (Quat::IDENTITY, Quat::IDENTITY),
                };
                let offset = options.rotation_offsets.get(&bone).copied();

                Keyframes::Rotation(
                    values
                        .iter()
                        .map(|sample| {
                            let mut rotation = parent_rest_world * *sample * rest_inverse;
                            if let Some(offset) = offset {
                                rotation *= offset;
                            }
                            if legacy {
                                rotation = Quat::from_xyzw(
                                    -rotation.x,
                                    rotation.y,
                                    -rotation.z,
                                    rotation.w,
                                );
                            }
                            rotation
                        })
                        .collect(),
                )
            }
            Keyframes::Translation(values) => Keyframes::Translation(
                values
                    .iter()
                    .map(|sample| {
                        let scaled = *sample * scale;
                        if legacy {
                            Vec3::new(-scaled.x, scaled.y, -scaled.z)
                        } else {
                            scaled
                        }
                    })
                    .collect(),
            ),
        };

        tracks.push(ClipTrack {
            node,
            times: track.times.clone(),
            keyframes,
        });
    }

    let clip = Clip::new(source.name.clone(), provenance, tracks);
    match source.duration {
        Some(duration) => clip.with_duration(duration),
        None => clip,
    }
}

fn rest_reference<'a>(source: &'a SourceClip, rig: &'a HumanoidRig) -> Option<RestReference<'a>> {
    match source.format {
        MotionFormat::Vrma => Some(RestReference::Normalized),
        MotionFormat::Fbx | MotionFormat::Bvh => {
            source.skeleton.as_ref().map(RestReference::Skeleton)
        }
        MotionFormat::Vmd => source
            .skeleton
            .as_ref()
            .or_else(|| Some(rig.skeleton()).filter(|skeleton| !skeleton.is_empty()))
            .map(RestReference::Skeleton),
    }
}

/// `destination hips height / source hips height`, or 1 when the source height is unknown.
/// Bound formats share the destination's units and are never scaled.
fn translation_scale(
    source: &SourceClip,
    rig: &HumanoidRig,
    mapper: &BoneNameMapper,
    options: &RetargetOptions,
) -> f32 {
    if source.format.needs_binding() {
        return 1.;
    }

    let source_height = options.source_hips_height.or_else(|| {
        let skeleton = source.skeleton.as_ref()?;
        let (_, hips) = skeleton
            .iter()
            .find(|(_, node)| mapper.map(&node.name) == Some(HumanoidBone::Hips))?;
        Some(hips.rest.translation.y)
    });

    match source_height {
        Some(height) if height.abs() > MIN_HIPS_HEIGHT => rig.hips_height() / height,
        _ => {
            debug!(
                "Unknown source hips height for {}, translations are not scaled",
                source.name
            );
            1.
        }
    }
}

#[cfg(test)]
mod test {
    use std::f32::consts::FRAC_PI_2;

    use bevy::transform::components::Transform;

    use super::*;
    use crate::{clip::source::SourceTrack, rig::test::test_rig};

    fn mixamo_skeleton(hips_height: f32) -> Skeleton {
        let mut skeleton = Skeleton::new();
        let hips = skeleton.add_node(
            "mixamorigHips",
            None,
            Transform::from_xyz(0., hips_height, 0.).with_rotation(Quat::from_rotation_y(FRAC_PI_2)),
        );
        let spine = skeleton.add_node(
            "mixamorigSpine",
            Some(hips),
            Transform::from_xyz(0., 0.1, 0.).with_rotation(Quat::from_rotation_x(0.3)),
        );
        skeleton.add_node("mixamorigHead", Some(spine), Transform::IDENTITY);
        skeleton.add_node("mixamorigLeftHandPinky1", Some(spine), Transform::IDENTITY);
        skeleton
    }

    fn wave(hips_height: f32) -> SourceClip {
        let rest_spine = Quat::from_rotation_x(0.3);
        SourceClip::new("wave", MotionFormat::Fbx)
            .with_skeleton(mixamo_skeleton(hips_height))
            .with_track(SourceTrack::translation(
                "mixamorigHips",
                vec![0., 1.],
                vec![Vec3::new(0.1, hips_height, 0.2), Vec3::new(0.2, hips_height, 0.4)],
            ))
            .with_track(SourceTrack::rotation(
                "mixamorigSpine",
                vec![0., 1.],
                vec![rest_spine, rest_spine],
            ))
            .with_track(SourceTrack::rotation(
                "mixamorigLeftHandPinky1",
                vec![0., 1.],
                vec![Quat::IDENTITY; 2],
            ))
            .with_track(SourceTrack::rotation(
                "mixamorigTail",
                vec![0.],
                vec![Quat::IDENTITY],
            ))
    }

    fn translations(clip: &Clip) -> Vec<Vec3> {
        clip.tracks()
            .iter()
            .find_map(|track| match &track.keyframes {
                Keyframes::Translation(values) => Some(values.clone()),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn absent_bones_contribute_no_tracks() {
        let rig = test_rig();
        let clip = retarget(&wave(1.), &rig, &RetargetOptions::default());

        assert_eq!(clip.tracks().len(), 2);
        assert!(
            clip.tracks()
                .iter()
                .all(|track| track.node == rig.node(HumanoidBone::Hips).unwrap()
                    || track.node == rig.node(HumanoidBone::Spine).unwrap())
        );
        assert_eq!(clip.provenance(), ClipProvenance::Retargeted(MotionFormat::Fbx));
    }

    #[test]
    fn rest_pose_samples_become_identity() {
        let rig = test_rig();
        let clip = retarget(&wave(1.), &rig, &RetargetOptions::default());

        let spine = rig.node(HumanoidBone::Spine).unwrap();
        let track = clip.tracks().iter().find(|t| t.node == spine).unwrap();
        let Keyframes::Rotation(values) = &track.keyframes else {
            panic!("spine track should hold rotations");
        };
        for value in values {
            assert!(value.abs_diff_eq(Quat::IDENTITY, 1e-5), "{value:?}");
        }
    }

    #[test]
    fn translations_scale_with_hips_ratio() {
        let rig = test_rig();
        let options = RetargetOptions::default();

        let single = translations(&retarget(&wave(1.), &rig, &options));
        let double = translations(&retarget(&wave(2.), &rig, &options));

        // destination hips sit at 0.9
        assert!((single[0].x - 0.09).abs() < 1e-6);
        assert!((single[0].y - 0.9).abs() < 1e-6);
        for (single, double) in single.iter().zip(&double) {
            assert!((single.x - 2. * double.x).abs() < 1e-6);
            assert!((single.z - 2. * double.z).abs() < 1e-6);
        }
    }

    #[test]
    fn legacy_rigs_negate_x_and_z() {
        let rig = test_rig();
        let legacy = test_rig().with_legacy_axes(true);
        let options = RetargetOptions::default();

        let modern = translations(&retarget(&wave(1.), &rig, &options));
        let flipped = translations(&retarget(&wave(1.), &legacy, &options));

        assert_eq!(flipped[1], Vec3::new(-modern[1].x, modern[1].y, -modern[1].z));
    }

    #[test]
    fn rotation_offsets_are_right_multiplied() {
        let rig = test_rig();
        let offset = Quat::from_rotation_z(0.5);
        let options = RetargetOptions {
            rotation_offsets: HashMap::from_iter([(HumanoidBone::Spine, offset)]),
            ..Default::default()
        };

        let clip = retarget(&wave(1.), &rig, &options);
        let spine = rig.node(HumanoidBone::Spine).unwrap();
        let sample = clip
            .tracks()
            .iter()
            .find(|t| t.node == spine)
            .and_then(|t| t.sample(0.));

        let Some(crate::clip::TrackSample::Rotation(rotation)) = sample else {
            panic!("expected a rotation sample");
        };
        assert!(rotation.abs_diff_eq(offset, 1e-5));
    }

    #[test]
    fn unbound_clip_is_empty_not_an_error() {
        let rig = test_rig();
        let mut source = wave(1.);
        source.skeleton = None;

        let clip = retarget(&source, &rig, &RetargetOptions::default());
        assert!(clip.is_empty());
        assert_eq!(clip.duration(), 0.);
    }

    #[test]
    fn humanoid_native_clips_skip_rest_correction() {
        let rig = test_rig();
        let nod = Quat::from_rotation_x(0.2);
        let source = SourceClip::new("nod", MotionFormat::Vrma)
            .with_track(SourceTrack::rotation("head", vec![0., 0.5], vec![nod, nod]))
            .with_track(SourceTrack::translation(
                "hips",
                vec![0.],
                vec![Vec3::new(0., 1., 0.)],
            ));

        let clip = retarget(&source, &rig, &RetargetOptions::default());
        let head = rig.node(HumanoidBone::Head).unwrap();

        let samples: Vec<_> = clip.sample(0.).collect();
        assert!(samples.contains(&(head, crate::clip::TrackSample::Rotation(nod))));
        assert_eq!(translations(&clip), vec![Vec3::new(0., 1., 0.)]);
    }

    #[test]
    fn mmd_motion_binds_to_destination_skeleton_without_scaling() {
        let mut skeleton = Skeleton::new();
        let center = skeleton.add_node("センター", None, Transform::from_xyz(0., 8., 0.));
        let rig = HumanoidRig::new(skeleton, [(HumanoidBone::Hips, center)]);

        let source = SourceClip::new("dance", MotionFormat::Vmd).with_track(
            SourceTrack::translation("センター", vec![0.], vec![Vec3::new(1., 2., 3.)]),
        );

        let clip = retarget(&source, &rig, &RetargetOptions::default());
        assert_eq!(translations(&clip), vec![Vec3::new(1., 2., 3.)]);

        let empty_rig = HumanoidRig::new(Skeleton::new(), []);
        assert!(retarget(&source, &empty_rig, &RetargetOptions::default()).is_empty());
    }
}
