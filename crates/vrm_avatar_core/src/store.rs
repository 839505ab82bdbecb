use std::sync::Arc;

use bevy::{
    log::{debug, info, warn},
    math::Vec2,
    platform::collections::HashMap,
};
use rand::{SeedableRng, rngs::StdRng};

use crate::{
    avatar::{AvatarRuntime, AvatarSetup, LoadRequest},
    clip::Clip,
    config::{AvatarConfig, FeatureToggles},
    errors::LoadResult,
    id::InstanceId,
    motion::MotionCatalog,
    overlay::normalized_cursor,
    retarget::RetargetOptions,
    rig::HumanoidRig,
};

/// Retargeted clips, per model path then per motion file. Entries are never modified once
/// inserted.
#[derive(Clone, Debug, Default)]
pub struct ClipCache {
    models: HashMap<String, HashMap<String, Arc<Clip>>>,
}

impl ClipCache {
    pub fn get(&self, model: &str, file: &str) -> Option<&Arc<Clip>> {
        self.models.get(model)?.get(file)
    }

    pub fn insert(&mut self, model: &str, file: &str, clip: Arc<Clip>) {
        self.models
            .entry(model.to_string())
            .or_default()
            .entry(file.to_string())
            .or_insert(clip);
    }

    pub fn model_clips(&self, model: &str) -> impl Iterator<Item = (&String, &Arc<Clip>)> + use<'_> {
        self.models.get(model).into_iter().flat_map(|clips| clips.iter())
    }

    pub fn len(&self) -> usize {
        self.models.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.models.clear();
    }
}

/// A load the host has to run: fetch `request.file`, decode it and retarget it onto `rig`
#[derive(Clone, Debug)]
pub struct PendingLoad {
    pub character: String,
    pub model: String,
    pub request: LoadRequest,
    pub rig: HumanoidRig,
    pub options: RetargetOptions,
}

/// Every live avatar, by character name, plus the clip cache shared between them.
#[derive(Default)]
pub struct AvatarStore {
    config: AvatarConfig,
    catalog: MotionCatalog,
    avatars: HashMap<String, AvatarRuntime>,
    cache: ClipCache,
    seed: Option<u64>,
    spawned: u64,
}

impl AvatarStore {
    pub fn new(config: AvatarConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Makes every avatar's randomness reproducible
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn config(&self) -> &AvatarConfig {
        &self.config
    }

    /// Applies new feature toggles, to the live avatars too
    pub fn set_features(&mut self, features: FeatureToggles) {
        let previous = self.config.features;
        self.config.features = features;
        if previous.animations_cache && !features.animations_cache {
            self.cache.clear();
        }
        for avatar in self.avatars.values_mut() {
            if previous.blink != features.blink {
                avatar.set_blinking(features.blink);
            }
            if previous.follow_cursor != features.follow_cursor {
                avatar.set_cursor_tracking(features.follow_cursor);
            }
        }
    }

    pub fn catalog(&self) -> &MotionCatalog {
        &self.catalog
    }

    pub fn set_catalog(&mut self, catalog: MotionCatalog) {
        for avatar in self.avatars.values_mut() {
            avatar.set_catalog(catalog.clone());
        }
        self.catalog = catalog;
    }

    pub fn cache(&self) -> &ClipCache {
        &self.cache
    }

    fn next_rng(&mut self) -> StdRng {
        self.spawned += 1;
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(self.spawned)),
            None => StdRng::from_os_rng(),
        }
    }

    /// Brings up an avatar for `character`, tearing down the one it had before
    pub fn insert(&mut self, character: &str, setup: AvatarSetup) -> InstanceId {
        if let Some(mut previous) = self.avatars.remove(character) {
            debug!("Replacing avatar {} of {character}", previous.id());
            previous.teardown();
        }

        let rng = self.next_rng();
        let mut avatar = AvatarRuntime::new(setup, &self.config, self.catalog.clone(), rng);
        for (file, clip) in self.cache.model_clips(avatar.model()) {
            avatar.insert_clip(file.clone(), clip.clone());
        }
        let id = avatar.id();
        info!("Loaded avatar {id} for {character} ({})", avatar.model());
        self.avatars.insert(character.to_string(), avatar);
        id
    }

    pub fn remove(&mut self, character: &str) -> bool {
        match self.avatars.remove(character) {
            Some(mut avatar) => {
                avatar.teardown();
                true
            }
            None => false,
        }
    }

    /// Tears every avatar down, e.g. when the scene reloads
    pub fn clear(&mut self) {
        for (_, mut avatar) in self.avatars.drain() {
            avatar.teardown();
        }
    }

    pub fn get(&self, character: &str) -> Option<&AvatarRuntime> {
        self.avatars.get(character)
    }

    pub fn get_mut(&mut self, character: &str) -> Option<&mut AvatarRuntime> {
        self.avatars.get_mut(character)
    }

    /// Whether `id` still identifies the avatar of `character`
    pub fn is_current(&self, character: &str, id: InstanceId) -> bool {
        self.avatars
            .get(character)
            .is_some_and(|avatar| avatar.id() == id)
    }

    pub fn characters(&self) -> impl Iterator<Item = &str> {
        self.avatars.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AvatarRuntime)> {
        self.avatars
            .iter()
            .map(|(character, avatar)| (character.as_str(), avatar))
    }

    pub fn len(&self) -> usize {
        self.avatars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.avatars.is_empty()
    }

    /// Advances every avatar by one frame
    pub fn update(&mut self, delta: f32) {
        for avatar in self.avatars.values_mut() {
            avatar.update(delta);
        }
    }

    /// Collects the loads avatars asked for. Requests the cache can answer are served on
    /// the spot.
    pub fn take_load_requests(&mut self) -> Vec<PendingLoad> {
        let mut pending = Vec::new();
        for (character, avatar) in self.avatars.iter_mut() {
            for request in avatar.take_load_requests() {
                if let Some(clip) = self.cache.get(avatar.model(), &request.file) {
                    debug!("Serving {} from the clip cache", request.file);
                    avatar.on_clip_loaded(&request, Ok(clip.clone()));
                    continue;
                }
                pending.push(PendingLoad {
                    character: character.clone(),
                    model: avatar.model().to_string(),
                    rig: avatar.rig().clone(),
                    options: avatar.retarget_options(),
                    request,
                });
            }
        }
        pending
    }

    /// Delivers a finished load. Results for an avatar that has been replaced or removed
    /// since the request was made are dropped.
    pub fn on_clip_loaded(&mut self, load: &PendingLoad, result: LoadResult<Clip>) {
        if !self.is_current(&load.character, load.request.owner) {
            debug!(
                "Dropping {} loaded for a previous avatar of {}",
                load.request.file, load.character
            );
            return;
        }

        let result = result.map(Arc::new);
        if let Ok(clip) = &result
            && self.config.features.animations_cache
        {
            self.cache.insert(&load.model, &load.request.file, clip.clone());
        }
        if let Some(avatar) = self.avatars.get_mut(&load.character) {
            avatar.on_clip_loaded(&load.request, result);
        }
    }

    pub fn clear_clip_cache(&mut self) {
        info!("Clearing {} cached clips", self.cache.len());
        self.cache.clear();
    }

    fn with_avatar(&mut self, character: &str, operation: &str, f: impl FnOnce(&mut AvatarRuntime)) {
        match self.avatars.get_mut(character) {
            Some(avatar) => f(avatar),
            None => warn!("Cannot {operation}: {character} has no avatar loaded"),
        }
    }

    pub fn set_expression(&mut self, character: &str, expression: &str) {
        self.with_avatar(character, "set expression", |avatar| {
            avatar.set_expression(expression)
        });
    }

    pub fn set_motion(
        &mut self,
        character: &str,
        file: &str,
        looping: bool,
        force: bool,
        random: bool,
    ) {
        self.with_avatar(character, "set motion", |avatar| {
            avatar.set_motion(file, looping, force, random)
        });
    }

    pub fn set_motion_sequence(&mut self, character: &str, sequence: &str, looping: bool) {
        self.with_avatar(character, "play sequence", |avatar| {
            avatar.set_motion_sequence(sequence, looping)
        });
    }

    pub fn clear_animation_sequence(&mut self, character: &str) {
        self.with_avatar(character, "clear sequence", AvatarRuntime::clear_sequence);
    }

    pub fn talk(&mut self, character: &str, text: &str) {
        self.with_avatar(character, "talk", |avatar| avatar.talk(text));
    }

    pub fn on_message(&mut self, character: &str, classification: &str) {
        self.with_avatar(character, "react to message", |avatar| {
            avatar.on_message(classification)
        });
    }

    pub fn set_audio_spectrum(&mut self, character: &str, bins: Vec<u8>) {
        self.with_avatar(character, "lip sync", |avatar| {
            avatar.set_audio_spectrum(bins)
        });
    }

    /// Points every avatar at a cursor given in viewport pixels
    pub fn set_cursor(&mut self, position: Vec2, viewport: Vec2) {
        let cursor = normalized_cursor(position, viewport);
        for avatar in self.avatars.values_mut() {
            avatar.set_cursor(cursor);
        }
    }

    pub fn set_cursor_tracking(&mut self, enabled: bool) {
        self.config.features.follow_cursor = enabled;
        for avatar in self.avatars.values_mut() {
            avatar.set_cursor_tracking(enabled);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        avatar::test::{head_clip, setup},
        config::ModelSettings,
        motion::NO_MOTION,
    };

    fn store(animations_cache: bool) -> AvatarStore {
        let mut config = AvatarConfig::default();
        config.features.animations_cache = animations_cache;
        let mut store = AvatarStore::new(config).with_seed(5);
        store.set_catalog(MotionCatalog::new(["Idle.bvh", "Wave.fbx"]));
        store
    }

    fn idle_settings() -> ModelSettings {
        ModelSettings {
            default_motion: "Idle.bvh".into(),
            ..Default::default()
        }
    }

    fn serve(store: &mut AvatarStore) -> Vec<PendingLoad> {
        let loads = store.take_load_requests();
        for load in &loads {
            let clip = head_clip(&load.rig, &load.request.file, 0.3, 2.);
            store.on_clip_loaded(load, Ok(Clip::clone(&clip)));
        }
        loads
    }

    #[test]
    fn replacing_an_avatar_invalidates_the_old_token() {
        let mut store = store(false);
        let first = store.insert("alice", setup(idle_settings()));
        assert!(store.is_current("alice", first));

        let stale = store.take_load_requests();
        assert_eq!(stale.len(), 1);

        let second = store.insert("alice", setup(idle_settings()));
        assert!(!store.is_current("alice", first));
        assert!(store.is_current("alice", second));
        assert_eq!(store.len(), 1);

        let clip = head_clip(&stale[0].rig, "idle", 0.3, 2.);
        store.on_clip_loaded(&stale[0], Ok(Clip::clone(&clip)));
        let alice = store.get("alice").unwrap();
        assert!(alice.current_motion().action.is_none());

        assert!(store.remove("alice"));
        assert!(!store.is_current("alice", second));
        assert!(!store.remove("alice"));
    }

    #[test]
    fn cache_serves_later_avatars() {
        let mut store = store(true);
        store.insert("alice", setup(idle_settings()));
        assert_eq!(serve(&mut store).len(), 1);
        assert_eq!(store.cache().len(), 1);

        store.insert("alice", setup(idle_settings()));
        assert!(store.take_load_requests().is_empty());
        let alice = store.get("alice").unwrap();
        assert!(alice.current_motion().action.is_some());

        store.clear_clip_cache();
        assert!(store.cache().is_empty());
        store.insert("alice", setup(idle_settings()));
        assert_eq!(store.take_load_requests().len(), 1);
    }

    #[test]
    fn without_cache_every_avatar_loads() {
        let mut store = store(false);
        store.insert("alice", setup(idle_settings()));
        serve(&mut store);
        assert!(store.cache().is_empty());

        store.insert("bob", setup(idle_settings()));
        assert_eq!(store.take_load_requests().len(), 1);
    }

    #[test]
    fn host_operations_on_missing_avatars_are_noops() {
        let mut store = store(false);
        store.set_motion("nobody", "Wave.fbx", false, false, false);
        store.set_expression("nobody", "happy");
        store.set_motion_sequence("nobody", "wave", false);
        store.clear_animation_sequence("nobody");
        store.talk("nobody", "hello");
        assert!(store.take_load_requests().is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn host_operations_reach_the_avatar() {
        let mut store = store(false);
        store.insert("alice", setup(ModelSettings::default()));
        assert_eq!(store.get("alice").unwrap().current_motion().name, NO_MOTION);

        store.set_expression("alice", "sad");
        store.set_motion("alice", "Wave.fbx", true, false, false);
        serve(&mut store);

        let alice = store.get("alice").unwrap();
        assert_eq!(alice.expressions().current(), "sad");
        assert_eq!(alice.current_motion().name, "Wave.fbx");

        store.set_cursor_tracking(true);
        store.set_cursor(Vec2::new(800., 300.), Vec2::new(800., 600.));
        store.update(0.5);
        assert!(store.get("alice").unwrap().overlay().is_active());
    }
}
