use std::{future::Future, path::Path, pin::Pin, sync::Arc};

use bevy::{
    asset::io::{AssetReader, Reader, file::FileAssetReader},
    log::{debug, error},
};

use crate::{
    clip::Clip,
    decode::{DecodeBinding, DecoderRegistry},
    errors::{LoadError, LoadResult},
    retarget::{RetargetOptions, retarget},
    rig::HumanoidRig,
};

pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = LoadResult<Vec<u8>>> + Send + 'a>>;

/// Asynchronous binary asset access, provided by the host.
pub trait AssetFetch: Send + Sync + 'static {
    fn fetch<'a>(&'a self, path: &'a str) -> FetchFuture<'a>;
}

/// Fetches through any Bevy [`AssetReader`]
pub struct ReaderFetch<R> {
    reader: R,
}

/// Reads assets from a directory, resolved the way Bevy resolves its `assets` folder
pub type DirectoryFetch = ReaderFetch<FileAssetReader>;

impl<R: AssetReader> ReaderFetch<R> {
    pub fn from_reader(reader: R) -> Self {
        Self { reader }
    }
}

impl DirectoryFetch {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self::from_reader(FileAssetReader::new(root))
    }
}

impl<R: AssetReader> AssetFetch for ReaderFetch<R> {
    fn fetch<'a>(&'a self, path: &'a str) -> FetchFuture<'a> {
        Box::pin(async move {
            let fetch_error = |reason: String| LoadError::Fetch {
                path: path.to_string(),
                reason,
            };
            let mut reader = self
                .reader
                .read(Path::new(path))
                .await
                .map_err(|error| fetch_error(error.to_string()))?;
            let mut bytes = vec![];
            reader
                .read_to_end(&mut bytes)
                .await
                .map_err(|error| fetch_error(error.to_string()))?;
            Ok(bytes)
        })
    }
}

/// Fetches, decodes and retargets motion files for one destination rig at a time.
#[derive(Clone)]
pub struct MotionLoader {
    fetch: Arc<dyn AssetFetch>,
    decoders: DecoderRegistry,
}

impl MotionLoader {
    pub fn new(fetch: impl AssetFetch, decoders: DecoderRegistry) -> Self {
        Self {
            fetch: Arc::new(fetch),
            decoders,
        }
    }

    pub fn decoders(&self) -> &DecoderRegistry {
        &self.decoders
    }

    /// Loads `path` and retargets it onto `rig`. Decode failures are errors; a file that
    /// decodes but has no usable tracks yields an empty clip.
    pub async fn load(
        &self,
        path: &str,
        rig: &HumanoidRig,
        options: &RetargetOptions,
    ) -> LoadResult<Clip> {
        let bytes = self.fetch.fetch(path).await?;

        let binding = DecodeBinding {
            skeleton: Some(rig.skeleton()),
        };
        let source = self
            .decoders
            .decode(path, &bytes, binding)
            .map_err(|source| {
                error!("Wrong animation file format for {path}: {source}");
                LoadError::Decode {
                    path: path.to_string(),
                    source,
                }
            })?;

        let clip = retarget(&source, rig, options);
        debug!(
            "Loaded {path}: {} of {} tracks bound, {:.2}s",
            clip.tracks().len(),
            source.tracks.len(),
            clip.duration()
        );

        Ok(clip)
    }
}

#[cfg(test)]
pub(crate) mod test {
    use bevy::{
        asset::io::memory::{Dir, MemoryAssetReader},
        platform::collections::HashMap,
        tasks::block_on,
    };

    use super::*;
    use crate::{errors::DecodeError, rig::test::test_rig};

    /// In-memory asset source for tests
    #[derive(Default)]
    pub(crate) struct MemoryFetch {
        pub(crate) files: HashMap<String, Vec<u8>>,
    }

    impl MemoryFetch {
        pub(crate) fn with_file(mut self, path: &str, contents: &str) -> Self {
            self.files.insert(path.to_string(), contents.as_bytes().to_vec());
            self
        }
    }

    impl AssetFetch for MemoryFetch {
        fn fetch<'a>(&'a self, path: &'a str) -> FetchFuture<'a> {
            Box::pin(async move {
                self.files.get(path).cloned().ok_or_else(|| LoadError::Fetch {
                    path: path.to_string(),
                    reason: "not found".into(),
                })
            })
        }
    }

    pub(crate) const IDLE_BVH: &str = r#"(
        name: "idle",
        skeleton: Some((nodes: [
            (name: "hips", translation: (0., 1.8, 0.)),
            (name: "head", parent: Some("hips")),
        ])),
        tracks: [
            (id: "hips.position", times: [0., 2.], values: Translations([(0., 1.8, 0.), (0., 1.8, 0.)])),
            (id: "head.quaternion", times: [0., 2.], values: Rotations([(0., 0., 0., 1.), (0., 0., 0., 1.)])),
            (id: "tail.quaternion", times: [0., 2.], values: Rotations([(0., 0., 0., 1.), (0., 0., 0., 1.)])),
        ],
    )"#;

    #[test]
    fn reads_through_bevy_asset_readers() {
        let dir = Dir::default();
        dir.insert_asset(Path::new("motions/Idle.bvh"), IDLE_BVH.as_bytes().to_vec());
        let fetch = ReaderFetch::from_reader(MemoryAssetReader { root: dir });

        let bytes = block_on(fetch.fetch("motions/Idle.bvh")).unwrap();
        assert_eq!(bytes, IDLE_BVH.as_bytes());
        assert!(matches!(
            block_on(fetch.fetch("motions/Wave.fbx")),
            Err(LoadError::Fetch { path, .. }) if path == "motions/Wave.fbx"
        ));

        let loader = MotionLoader::new(fetch, DecoderRegistry::ron());
        let clip = block_on(loader.load("motions/Idle.bvh", &test_rig(), &RetargetOptions::default()));
        assert!(clip.is_ok());
    }

    #[test]
    fn loads_and_retargets() {
        let loader = MotionLoader::new(
            MemoryFetch::default().with_file("Idle.bvh", IDLE_BVH),
            DecoderRegistry::ron(),
        );
        let rig = test_rig();

        let clip = block_on(loader.load("Idle.bvh", &rig, &RetargetOptions::default())).unwrap();
        assert_eq!(clip.tracks().len(), 2);
        assert_eq!(clip.duration(), 2.);
    }

    #[test]
    fn fetch_and_decode_failures_are_distinct() {
        let loader = MotionLoader::new(
            MemoryFetch::default().with_file("broken.fbx", "(name:"),
            DecoderRegistry::ron(),
        );
        let rig = test_rig();
        let options = RetargetOptions::default();

        assert!(matches!(
            block_on(loader.load("missing.fbx", &rig, &options)),
            Err(LoadError::Fetch { .. })
        ));
        assert!(matches!(
            block_on(loader.load("broken.fbx", &rig, &options)),
            Err(LoadError::Decode {
                source: DecodeError::Malformed(_),
                ..
            })
        ));
    }
}
