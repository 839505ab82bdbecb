//! # VRM avatar
//!
//! Bevy integration of [`vrm_avatar_core`]. Add [`VrmAvatarPlugin`](plugin::VrmAvatarPlugin)
//! to the app, register avatars in the [`Avatars`](resources::Avatars) resource and bind
//! the spawned model with an [`AvatarBinding`](components::AvatarBinding):
//!
//! ```ignore
//! fn assign_model(mut avatars: ResMut<Avatars>, mut commands: Commands, model: Res<LoadedModel>) {
//!     avatars.insert("Alice", model.setup());
//!     commands.entity(model.root).insert(AvatarBinding::new("Alice", model.bone_entities()));
//! }
//!
//! fn on_message(mut avatars: ResMut<Avatars>) {
//!     avatars.on_message("Alice", "joy");
//!     avatars.talk("Alice", "Hello there!");
//! }
//! ```
//!
//! Every frame the plugin starts the clip loads avatars asked for on the
//! [`AsyncComputeTaskPool`](bevy::tasks::AsyncComputeTaskPool), hands finished ones back,
//! advances every avatar and writes the resulting pose to the bound bone entities.
//!
//! Model settings can be authored as `*.vrmcfg.ron` assets, see
//! [`ModelSettingsAsset`](settings_loader::ModelSettingsAsset).

pub mod components;
pub mod plugin;
pub mod resources;
pub mod settings_loader;
pub mod systems;

pub use vrm_avatar_core;

pub mod prelude {
    pub use super::components::{AvatarBinding, AvatarExpressionWeights};
    pub use super::plugin::{VrmAvatarPlugin, VrmAvatarSet};
    pub use super::resources::{Avatars, MotionLoads, SharedMotionLoader};
    pub use super::settings_loader::{ModelSettingsAsset, ModelSettingsLoader};
    pub use vrm_avatar_core::prelude::*;
}
