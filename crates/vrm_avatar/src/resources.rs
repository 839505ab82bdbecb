use bevy::{
    prelude::{Deref, DerefMut},
    ecs::resource::Resource,
    tasks::Task,
};
use vrm_avatar_core::{
    clip::Clip,
    config::AvatarConfig,
    decode::DecoderRegistry,
    errors::LoadResult,
    loader::{DirectoryFetch, MotionLoader},
    store::{AvatarStore, PendingLoad},
};

/// Every avatar of the app, by character name
#[derive(Resource, Default, Deref, DerefMut)]
pub struct Avatars(pub AvatarStore);

impl Avatars {
    pub fn new(config: AvatarConfig) -> Self {
        Self(AvatarStore::new(config))
    }
}

/// Fetches, decodes and retargets the motion files avatars ask for
#[derive(Resource, Clone, Deref)]
pub struct SharedMotionLoader(pub MotionLoader);

impl Default for SharedMotionLoader {
    /// Reads pre-converted RON clips from the `assets` directory
    fn default() -> Self {
        Self(MotionLoader::new(
            DirectoryFetch::new("assets"),
            DecoderRegistry::ron(),
        ))
    }
}

/// Clip loads in flight
#[derive(Resource, Default)]
pub struct MotionLoads {
    pub(crate) tasks: Vec<(PendingLoad, Task<LoadResult<Clip>>)>,
}

impl MotionLoads {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
