use bevy::{
    asset::{Asset, AssetLoader, LoadContext, io::Reader},
    prelude::Deref,
    reflect::TypePath,
};
use vrm_avatar_core::{config::ModelSettings, errors::AssetLoaderError};

/// Per model settings, loaded from a `.vrmcfg.ron` file next to the model.
#[derive(Asset, TypePath, Clone, Debug, Default, Deref)]
pub struct ModelSettingsAsset(pub ModelSettings);

#[derive(Default, TypePath)]
pub struct ModelSettingsLoader;

impl AssetLoader for ModelSettingsLoader {
    type Asset = ModelSettingsAsset;
    type Settings = ();
    type Error = AssetLoaderError;

    async fn load(
        &self,
        reader: &mut dyn Reader,
        _settings: &Self::Settings,
        _load_context: &mut LoadContext<'_>,
    ) -> Result<Self::Asset, Self::Error> {
        let mut bytes = vec![];
        reader.read_to_end(&mut bytes).await?;
        let settings: ModelSettings = ron::de::from_bytes(&bytes)?;
        Ok(ModelSettingsAsset(settings))
    }

    fn extensions(&self) -> &[&str] {
        &["vrmcfg.ron"]
    }
}

#[cfg(test)]
mod test {
    use vrm_avatar_core::config::ModelSettings;

    #[test]
    fn partial_settings_fall_back_to_defaults() {
        let settings: ModelSettings = ron::de::from_bytes(
            br#"(
                scale: 0.8,
                default_motion: "Idle.bvh",
                classify: {
                    "joy": (expression: "happy"),
                },
            )"#,
        )
        .unwrap();

        assert_eq!(settings.scale, 0.8);
        assert_eq!(settings.default_motion, "Idle.bvh");
        assert_eq!(settings.default_expression, "neutral");
        assert!(settings.classify.contains_key("joy"));
        assert!(settings.idle_clips.is_empty());
    }
}
