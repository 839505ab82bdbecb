//! Motion file decoding.
//!
//! The container parsers themselves (FBX, BVH, VRMA, VMD) live outside this crate. They
//! plug in through [`MotionDecoder`] and produce a [`SourceClip`], which the retargeter
//! then turns into a playable clip. A RON decoder for pre-converted clips ships here.

mod ron_clip;

pub use ron_clip::*;

use std::{fmt, sync::Arc};

use bevy::platform::collections::HashMap;
use serde::{Deserialize, Serialize};

use crate::{
    bone_map::BoneConvention, clip::source::SourceClip, errors::DecodeError, skeleton::Skeleton,
};

/// Container kinds, chosen by file extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MotionFormat {
    /// Skeletal FBX exported from a fixed, `mixamorig` named rig
    Fbx,
    /// Plain bone-hierarchy motion capture
    Bvh,
    /// Humanoid-native VRM animation
    Vrma,
    /// MikuMikuDance motion, bound to the destination mesh skeleton
    Vmd,
}

impl MotionFormat {
    pub const ALL: [MotionFormat; 4] = [Self::Fbx, Self::Bvh, Self::Vrma, Self::Vmd];

    pub fn from_path(path: &str) -> Result<Self, DecodeError> {
        let extension = path
            .rsplit_once('.')
            .map(|(_, extension)| extension.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "fbx" => Ok(Self::Fbx),
            "bvh" => Ok(Self::Bvh),
            "vrma" => Ok(Self::Vrma),
            "vmd" => Ok(Self::Vmd),
            _ => Err(DecodeError::UnsupportedFormat(path.to_string())),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Fbx => "fbx",
            Self::Bvh => "bvh",
            Self::Vrma => "vrma",
            Self::Vmd => "vmd",
        }
    }

    pub fn bone_convention(&self) -> BoneConvention {
        match self {
            Self::Fbx => BoneConvention::Mixamo,
            Self::Bvh | Self::Vrma => BoneConvention::Humanoid,
            Self::Vmd => BoneConvention::Mmd,
        }
    }

    /// Formats whose tracks must be bound against the destination's own skeleton
    pub fn needs_binding(&self) -> bool {
        matches!(self, Self::Vmd)
    }
}

impl fmt::Display for MotionFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// What a decoder may bind tracks against
#[derive(Clone, Copy, Debug, Default)]
pub struct DecodeBinding<'a> {
    /// Skeleton of the destination model's skinned mesh, if it has one
    pub skeleton: Option<&'a Skeleton>,
}

pub trait MotionDecoder: Send + Sync + 'static {
    fn decode(&self, bytes: &[u8], binding: DecodeBinding<'_>) -> Result<SourceClip, DecodeError>;
}

/// Maps each container kind to the decoder that understands it.
#[derive(Clone, Default)]
pub struct DecoderRegistry {
    decoders: HashMap<MotionFormat, Arc<dyn MotionDecoder>>,
}

impl DecoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry reading every format from its RON serialization
    pub fn ron() -> Self {
        MotionFormat::ALL
            .into_iter()
            .fold(Self::new(), |registry, format| {
                registry.with_decoder(format, RonClipDecoder::new(format))
            })
    }

    pub fn with_decoder(mut self, format: MotionFormat, decoder: impl MotionDecoder) -> Self {
        self.register(format, decoder);
        self
    }

    pub fn register(&mut self, format: MotionFormat, decoder: impl MotionDecoder) {
        self.decoders.insert(format, Arc::new(decoder));
    }

    pub fn supports(&self, format: MotionFormat) -> bool {
        self.decoders.contains_key(&format)
    }

    /// Decodes a motion file, picking the decoder from the path's extension
    pub fn decode(
        &self,
        path: &str,
        bytes: &[u8],
        binding: DecodeBinding<'_>,
    ) -> Result<SourceClip, DecodeError> {
        let format = MotionFormat::from_path(path)?;
        let decoder = self
            .decoders
            .get(&format)
            .ok_or(DecodeError::MissingDecoder(format.extension()))?;

        decoder.decode(bytes, binding)?.validated()
    }
}

impl fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.decoders.keys()).finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn format_from_extension() {
        assert_eq!(MotionFormat::from_path("animations/Wave.FBX"), Ok(MotionFormat::Fbx));
        assert_eq!(MotionFormat::from_path("dance.vmd"), Ok(MotionFormat::Vmd));
        assert!(matches!(
            MotionFormat::from_path("notes.txt"),
            Err(DecodeError::UnsupportedFormat(_))
        ));
        assert!(MotionFormat::from_path("no_extension").is_err());
    }

    #[test]
    fn missing_decoder_is_reported() {
        let registry = DecoderRegistry::new();
        assert_eq!(
            registry.decode("idle.bvh", b"", DecodeBinding::default()),
            Err(DecodeError::MissingDecoder("bvh"))
        );
    }
}
