use bevy::{
    math::{Quat, Vec3},
    platform::collections::HashMap,
    transform::components::Transform,
};
use serde::{Deserialize, Serialize};

use super::Skeleton;
use crate::errors::DecodeError;

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct SkeletonSerial {
    pub nodes: Vec<SkeletonNodeSerial>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SkeletonNodeSerial {
    pub name: String,
    /// Name of a node listed earlier
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub translation: [f32; 3],
    #[serde(default = "identity_rotation")]
    pub rotation: [f32; 4],
}

fn identity_rotation() -> [f32; 4] {
    [0., 0., 0., 1.]
}

impl SkeletonSerial {
    pub fn to_skeleton(&self) -> Result<Skeleton, DecodeError> {
        let mut skeleton = Skeleton::new();
        let mut ids = HashMap::new();

        for node in &self.nodes {
            let parent = match &node.parent {
                Some(parent) => Some(*ids.get(parent.as_str()).ok_or_else(|| {
                    DecodeError::Malformed(format!(
                        "node {} lists parent {parent} before it is defined",
                        node.name
                    ))
                })?),
                None => None,
            };

            let rest = Transform::from_translation(Vec3::from_array(node.translation))
                .with_rotation(Quat::from_array(node.rotation).normalize());
            let id = skeleton.add_node(node.name.clone(), parent, rest);
            ids.insert(node.name.as_str(), id);
        }

        Ok(skeleton)
    }
}
