use std::sync::{Arc, LazyLock};

use bevy::{log::debug, platform::collections::HashMap};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::humanoid::HumanoidBone;

/// Bone naming convention of a motion source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoneConvention {
    /// `mixamorig` rigs (`mixamorigLeftForeArm`, `mixamorig:Hips`, ...)
    Mixamo,
    /// MikuMikuDance bone names, Japanese or English
    Mmd,
    /// Names already are canonical humanoid names
    Humanoid,
}

/// Translates source bone names into humanoid slots.
///
/// Caller-supplied overrides take precedence over the convention's table.
#[derive(Clone, Debug)]
pub struct BoneNameMapper {
    convention: BoneConvention,
    overrides: Arc<HashMap<String, HumanoidBone>>,
}

impl BoneNameMapper {
    pub fn new(convention: BoneConvention) -> Self {
        Self {
            convention,
            overrides: Arc::default(),
        }
    }

    pub fn with_overrides(mut self, overrides: HashMap<String, HumanoidBone>) -> Self {
        self.overrides = Arc::new(overrides);
        self
    }

    pub fn convention(&self) -> BoneConvention {
        self.convention
    }

    pub fn map(&self, source_name: &str) -> Option<HumanoidBone> {
        if let Some(bone) = self.overrides.get(source_name) {
            return Some(*bone);
        }

        let bone = match self.convention {
            BoneConvention::Mixamo => map_mixamo(source_name),
            BoneConvention::Mmd => MMD_BONES.get(source_name).copied(),
            BoneConvention::Humanoid => HumanoidBone::from_name(source_name),
        };

        if bone.is_none() {
            debug!(
                "No humanoid bone for {source_name} in the {:?} convention",
                self.convention
            );
        }

        bone
    }
}

static MIXAMO_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^mixamorig\d*:?(?P<bone>.+)$").expect("valid regex"));

fn map_mixamo(source_name: &str) -> Option<HumanoidBone> {
    let bone = MIXAMO_PREFIX.captures(source_name)?.name("bone")?.as_str();
    MIXAMO_BONES.get(bone).copied()
}

static MIXAMO_BONES: LazyLock<HashMap<&'static str, HumanoidBone>> = LazyLock::new(|| {
    use HumanoidBone::*;

    HashMap::from_iter([
        ("Hips", Hips),
        ("Spine", Spine),
        ("Spine1", Chest),
        ("Spine2", UpperChest),
        ("Neck", Neck),
        ("Head", Head),
        ("LeftShoulder", LeftShoulder),
        ("LeftArm", LeftUpperArm),
        ("LeftForeArm", LeftLowerArm),
        ("LeftHand", LeftHand),
        ("LeftHandThumb1", LeftThumbMetacarpal),
        ("LeftHandThumb2", LeftThumbProximal),
        ("LeftHandThumb3", LeftThumbDistal),
        ("LeftHandIndex1", LeftIndexProximal),
        ("LeftHandIndex2", LeftIndexIntermediate),
        ("LeftHandIndex3", LeftIndexDistal),
        ("LeftHandMiddle1", LeftMiddleProximal),
        ("LeftHandMiddle2", LeftMiddleIntermediate),
        ("LeftHandMiddle3", LeftMiddleDistal),
        ("LeftHandRing1", LeftRingProximal),
        ("LeftHandRing2", LeftRingIntermediate),
        ("LeftHandRing3", LeftRingDistal),
        ("LeftHandPinky1", LeftLittleProximal),
        ("LeftHandPinky2", LeftLittleIntermediate),
        ("LeftHandPinky3", LeftLittleDistal),
        ("RightShoulder", RightShoulder),
        ("RightArm", RightUpperArm),
        ("RightForeArm", RightLowerArm),
        ("RightHand", RightHand),
        ("RightHandPinky1", RightLittleProximal),
        ("RightHandPinky2", RightLittleIntermediate),
        ("RightHandPinky3", RightLittleDistal),
        ("RightHandRing1", RightRingProximal),
        ("RightHandRing2", RightRingIntermediate),
        ("RightHandRing3", RightRingDistal),
        ("RightHandMiddle1", RightMiddleProximal),
        ("RightHandMiddle2", RightMiddleIntermediate),
        ("RightHandMiddle3", RightMiddleDistal),
        ("RightHandIndex1", RightIndexProximal),
        ("RightHandIndex2", RightIndexIntermediate),
        ("RightHandIndex3", RightIndexDistal),
        ("RightHandThumb1", RightThumbMetacarpal),
        ("RightHandThumb2", RightThumbProximal),
        ("RightHandThumb3", RightThumbDistal),
        ("LeftUpLeg", LeftUpperLeg),
        ("LeftLeg", LeftLowerLeg),
        ("LeftFoot", LeftFoot),
        ("LeftToeBase", LeftToes),
        ("RightUpLeg", RightUpperLeg),
        ("RightLeg", RightLowerLeg),
        ("RightFoot", RightFoot),
        ("RightToeBase", RightToes),
    ])
});

// Several MMD bones drive the same humanoid slot (center, groove and lower body all end up
// on the hips).
static MMD_BONES: LazyLock<HashMap<&'static str, HumanoidBone>> = LazyLock::new(|| {
    use HumanoidBone::*;

    HashMap::from_iter([
        ("センター", Hips),
        ("center", Hips),
        ("グルーブ", Hips),
        ("groove", Hips),
        ("下半身", Hips),
        ("lower body", Hips),
        ("上半身", Spine),
        ("upper body", Spine),
        ("上半身2", Chest),
        ("upper body2", Chest),
        ("上半身3", UpperChest),
        ("upper body3", UpperChest),
        ("首", Neck),
        ("neck", Neck),
        ("頭", Head),
        ("head", Head),
        ("左肩", LeftShoulder),
        ("左肩P", LeftShoulder),
        ("left shoulder", LeftShoulder),
        ("右肩", RightShoulder),
        ("右肩P", RightShoulder),
        ("right shoulder", RightShoulder),
        ("左腕", LeftUpperArm),
        ("left arm", LeftUpperArm),
        ("左ひじ", LeftLowerArm),
        ("left elbow", LeftLowerArm),
        ("左手首", LeftHand),
        ("left wrist", LeftHand),
        ("右腕", RightUpperArm),
        ("right arm", RightUpperArm),
        ("右ひじ", RightLowerArm),
        ("right elbow", RightLowerArm),
        ("右手首", RightHand),
        ("right wrist", RightHand),
        ("左足", LeftUpperLeg),
        ("left leg", LeftUpperLeg),
        ("左ひざ", LeftLowerLeg),
        ("left knee", LeftLowerLeg),
        ("左足首", LeftFoot),
        ("left ankle", LeftFoot),
        ("右足", RightUpperLeg),
        ("right leg", RightUpperLeg),
        ("右ひざ", RightLowerLeg),
        ("right knee", RightLowerLeg),
        ("右足首", RightFoot),
        ("right ankle", RightFoot),
        ("左つま先", LeftToes),
        ("left toe", LeftToes),
        ("右つま先", RightToes),
        ("right toe", RightToes),
    ])
});

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mixamo_accepts_namespaced_names() {
        let mapper = BoneNameMapper::new(BoneConvention::Mixamo);

        assert_eq!(mapper.map("mixamorigHips"), Some(HumanoidBone::Hips));
        assert_eq!(mapper.map("mixamorig:Spine2"), Some(HumanoidBone::UpperChest));
        assert_eq!(
            mapper.map("mixamorig1:LeftHandPinky3"),
            Some(HumanoidBone::LeftLittleDistal)
        );
        assert_eq!(mapper.map("mixamorigLeftHandPinky4"), None);
        assert_eq!(mapper.map("Hips"), None);
    }

    #[test]
    fn mmd_aliases_share_a_slot() {
        let mapper = BoneNameMapper::new(BoneConvention::Mmd);

        for name in ["センター", "groove", "下半身"] {
            assert_eq!(mapper.map(name), Some(HumanoidBone::Hips));
        }
        assert_eq!(mapper.map("左ひじ"), Some(HumanoidBone::LeftLowerArm));
        assert_eq!(mapper.map("両目"), None);
    }

    #[test]
    fn overrides_win_over_the_table() {
        let mapper = BoneNameMapper::new(BoneConvention::Humanoid).with_overrides(
            HashMap::from_iter([("hips".to_string(), HumanoidBone::Spine)]),
        );

        assert_eq!(mapper.map("hips"), Some(HumanoidBone::Spine));
        assert_eq!(mapper.map("head"), Some(HumanoidBone::Head));
    }
}
