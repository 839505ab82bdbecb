use bevy::{
    ecs::{component::Component, entity::Entity},
    platform::collections::HashMap,
};
use vrm_avatar_core::skeleton::NodeId;

/// Ties a spawned model to the avatar of `character`.
///
/// `bones` lists the entity of every skeleton node; the avatar's root transform is written
/// to the entity holding this component.
#[derive(Component, Clone, Debug)]
pub struct AvatarBinding {
    pub character: String,
    pub bones: Vec<(NodeId, Entity)>,
}

impl AvatarBinding {
    pub fn new(character: impl Into<String>, bones: impl IntoIterator<Item = (NodeId, Entity)>) -> Self {
        Self {
            character: character.into(),
            bones: bones.into_iter().collect(),
        }
    }
}

/// Expression weights of the bound avatar, refreshed every frame. The host copies them
/// onto the model's morph targets.
#[derive(Component, Clone, Debug, Default)]
pub struct AvatarExpressionWeights {
    pub weights: HashMap<String, f32>,
}

impl AvatarExpressionWeights {
    pub fn get(&self, expression: &str) -> f32 {
        self.weights.get(expression).copied().unwrap_or(0.)
    }
}
