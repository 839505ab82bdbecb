use bevy::{
    app::{App, Plugin, PostUpdate},
    asset::AssetApp,
    ecs::schedule::{IntoScheduleConfigs, SystemSet},
    transform::TransformSystems,
};
use vrm_avatar_core::{
    config::{AvatarConfig, FeatureToggles},
    loader::MotionLoader,
};

use crate::{
    resources::{Avatars, MotionLoads, SharedMotionLoader},
    settings_loader::{ModelSettingsAsset, ModelSettingsLoader},
    systems::{
        apply_avatar_poses, drive_avatars, poll_motion_loads, spawn_motion_loads,
        sync_expression_weights,
    },
};

/// Drives VRM avatars: loads and retargets their motions, runs idle gestures, cursor
/// tracking and expressions, and writes the resulting poses to the bound entities.
///
/// Avatars are created through the [`Avatars`] resource once the host has built a
/// [`HumanoidRig`](vrm_avatar_core::rig::HumanoidRig) for the model.
#[derive(Default)]
pub struct VrmAvatarPlugin {
    pub config: AvatarConfig,
    /// Motion loader to use instead of the default `assets` directory one
    pub loader: Option<MotionLoader>,
}

#[derive(Clone, Debug, Copy, PartialEq, Eq, Hash, SystemSet)]
pub enum VrmAvatarSet {
    /// Starts requested loads and collects finished ones
    Load,
    /// Advances every avatar and writes poses and expression weights
    Drive,
}

impl Plugin for VrmAvatarPlugin {
    fn build(&self, app: &mut App) {
        self.register_assets(app);
        self.register_types(app);

        app.insert_resource(Avatars::new(self.config.clone()))
            .insert_resource(
                self.loader
                    .clone()
                    .map(SharedMotionLoader)
                    .unwrap_or_default(),
            )
            .init_resource::<MotionLoads>();

        app.configure_sets(
            PostUpdate,
            (VrmAvatarSet::Load, VrmAvatarSet::Drive)
                .chain()
                .before(TransformSystems::Propagate),
        );

        app.add_systems(
            PostUpdate,
            (poll_motion_loads, spawn_motion_loads)
                .chain()
                .in_set(VrmAvatarSet::Load),
        );

        app.add_systems(
            PostUpdate,
            (drive_avatars, apply_avatar_poses, sync_expression_weights)
                .chain()
                .in_set(VrmAvatarSet::Drive),
        );
    }
}

impl VrmAvatarPlugin {
    fn register_assets(&self, app: &mut App) {
        app.init_asset::<ModelSettingsAsset>()
            .init_asset_loader::<ModelSettingsLoader>();
    }

    fn register_types(&self, app: &mut App) {
        app.register_type::<AvatarConfig>()
            .register_type::<FeatureToggles>();
    }
}
