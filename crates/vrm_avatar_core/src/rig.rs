use bevy::{
    log::{debug, warn},
    math::Quat,
    platform::collections::HashMap,
    transform::components::Transform,
};

use crate::{
    humanoid::HumanoidBone,
    id::RigId,
    skeleton::{NodeId, Skeleton},
};

/// A skeleton with its humanoid slots resolved.
///
/// The bone lookup table is built once, when the rig is constructed. Slots the model does
/// not have are simply absent and every query on them is a no-op.
#[derive(Clone, Debug)]
pub struct HumanoidRig {
    id: RigId,
    skeleton: Skeleton,
    bones: HashMap<HumanoidBone, NodeId>,
    /// VRM 0.x models face the opposite direction, so X and Z of every retargeted sample
    /// get negated.
    legacy_axes: bool,
    /// Transform of the container the model is placed in. Root yaw and pitch offsets are
    /// written here.
    root: Transform,
}

impl HumanoidRig {
    pub fn new(skeleton: Skeleton, bones: impl IntoIterator<Item = (HumanoidBone, NodeId)>) -> Self {
        let mut resolved = HashMap::new();
        for (bone, node) in bones {
            if skeleton.node(node).is_none() {
                warn!("Humanoid bone {bone} points at missing node {node:?}, ignoring it");
                continue;
            }
            if resolved.insert(bone, node).is_some() {
                debug!("Humanoid bone {bone} was assigned twice, keeping the last node");
            }
        }

        Self {
            id: RigId::new(),
            skeleton,
            bones: resolved,
            legacy_axes: false,
            root: Transform::IDENTITY,
        }
    }

    /// Resolves humanoid slots by node name
    pub fn from_node_names<'a>(
        skeleton: Skeleton,
        names: impl IntoIterator<Item = (HumanoidBone, &'a str)>,
    ) -> Self {
        let bones: Vec<_> = names
            .into_iter()
            .filter_map(|(bone, name)| match skeleton.find(name) {
                Some(node) => Some((bone, node)),
                None => {
                    debug!("Humanoid bone {bone} names node {name}, which is not in the skeleton");
                    None
                }
            })
            .collect();

        Self::new(skeleton, bones)
    }

    pub fn with_legacy_axes(mut self, legacy_axes: bool) -> Self {
        self.legacy_axes = legacy_axes;
        self
    }

    pub fn with_root(mut self, root: Transform) -> Self {
        self.root = root;
        self
    }

    pub fn id(&self) -> RigId {
        self.id
    }

    pub fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    pub fn skeleton_mut(&mut self) -> &mut Skeleton {
        &mut self.skeleton
    }

    pub fn node(&self, bone: HumanoidBone) -> Option<NodeId> {
        self.bones.get(&bone).copied()
    }

    pub fn bones(&self) -> impl Iterator<Item = (HumanoidBone, NodeId)> + '_ {
        self.bones.iter().map(|(bone, node)| (*bone, *node))
    }

    pub fn legacy_axes(&self) -> bool {
        self.legacy_axes
    }

    pub fn root(&self) -> &Transform {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Transform {
        &mut self.root
    }

    /// Model-space rest height of the hips, 0 when the rig has no hips.
    pub fn hips_height(&self) -> f32 {
        self.node(HumanoidBone::Hips)
            .map(|hips| self.skeleton.rest_world_transform(hips).translation.y)
            .unwrap_or(0.)
    }

    pub fn bone_rotation(&self, bone: HumanoidBone) -> Option<Quat> {
        let node = self.node(bone)?;
        self.skeleton.local(node).map(|local| local.rotation)
    }

    /// Sets the local rotation of a humanoid bone. Returns false if the rig lacks the bone.
    pub fn set_bone_rotation(&mut self, bone: HumanoidBone, rotation: Quat) -> bool {
        let Some(node) = self.node(bone) else {
            return false;
        };
        self.skeleton.set_local_rotation(node, rotation);
        true
    }
}
