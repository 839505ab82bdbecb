pub mod serial;

use bevy::{
    log::warn,
    math::{Quat, Vec3},
    platform::collections::HashMap,
    reflect::Reflect,
    transform::components::Transform,
};

/// Index of a node inside a [`Skeleton`]. Ids are only meaningful for the skeleton that
/// produced them.
#[derive(Reflect, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

#[derive(Reflect, Clone, Debug, PartialEq)]
pub struct SkeletonNode {
    pub name: String,
    pub parent: Option<NodeId>,
    /// Local rest transform
    pub rest: Transform,
}

/// A flat node hierarchy with a rest pose and a mutable current (local) pose.
///
/// Parents are always inserted before their children, so node ids are topologically
/// sorted.
#[derive(Reflect, Clone, Debug, Default, PartialEq)]
pub struct Skeleton {
    nodes: Vec<SkeletonNode>,
    pose: Vec<Transform>,
    by_name: HashMap<String, NodeId>,
}

impl Skeleton {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        parent: Option<NodeId>,
        rest: Transform,
    ) -> NodeId {
        let name = name.into();
        let id = NodeId(self.nodes.len() as u32);

        let parent = match parent {
            Some(parent) if parent.index() >= self.nodes.len() => {
                warn!("Node {name} references parent {parent:?} that does not exist yet, attaching to root");
                None
            }
            parent => parent,
        };

        if !self.by_name.contains_key(&name) {
            self.by_name.insert(name.clone(), id);
        }

        self.nodes.push(SkeletonNode { name, parent, rest });
        self.pose.push(rest);

        id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the first node with the given name
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    pub fn node(&self, id: NodeId) -> Option<&SkeletonNode> {
        self.nodes.get(id.index())
    }

    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.node(id).map(|node| node.name.as_str())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|node| node.parent)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &SkeletonNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (NodeId(i as u32), node))
    }

    pub fn local(&self, id: NodeId) -> Option<&Transform> {
        self.pose.get(id.index())
    }

    pub fn local_mut(&mut self, id: NodeId) -> Option<&mut Transform> {
        self.pose.get_mut(id.index())
    }

    pub fn set_local_rotation(&mut self, id: NodeId, rotation: Quat) {
        if let Some(local) = self.local_mut(id) {
            local.rotation = rotation;
        }
    }

    pub fn set_local_translation(&mut self, id: NodeId, translation: Vec3) {
        if let Some(local) = self.local_mut(id) {
            local.translation = translation;
        }
    }

    /// Puts every node back at its rest transform
    pub fn reset_pose(&mut self) {
        for (pose, node) in self.pose.iter_mut().zip(&self.nodes) {
            *pose = node.rest;
        }
    }

    /// Model-space rest rotation of a node (the product of all rest rotations from the
    /// root down to it). Identity for an unknown node.
    pub fn rest_world_rotation(&self, id: NodeId) -> Quat {
        self.rest_world_transform(id).rotation
    }

    pub fn rest_world_transform(&self, id: NodeId) -> Transform {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            let Some(node) = self.node(node_id) else {
                break;
            };
            chain.push(node.rest);
            current = node.parent;
        }

        chain
            .into_iter()
            .rev()
            .fold(Transform::IDENTITY, |world, local| world.mul_transform(local))
    }
}
