use bevy::math::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::{DecodeBinding, MotionDecoder, MotionFormat};
use crate::{
    clip::{
        Keyframes,
        source::{SourceClip, SourceTrack},
    },
    errors::DecodeError,
    skeleton::serial::SkeletonSerial,
};

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SourceClipSerial {
    pub name: String,
    #[serde(default)]
    pub duration: Option<f32>,
    #[serde(default)]
    pub skeleton: Option<SkeletonSerial>,
    pub tracks: Vec<SourceTrackSerial>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SourceTrackSerial {
    pub id: String,
    pub times: Vec<f32>,
    pub values: TrackValuesSerial,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub enum TrackValuesSerial {
    Rotations(Vec<[f32; 4]>),
    Translations(Vec<[f32; 3]>),
}

/// Reads a source clip serialized as RON, stamping it with the format it is registered
/// for.
#[derive(Clone, Copy, Debug)]
pub struct RonClipDecoder {
    format: MotionFormat,
}

impl RonClipDecoder {
    pub fn new(format: MotionFormat) -> Self {
        Self { format }
    }
}

impl MotionDecoder for RonClipDecoder {
    fn decode(&self, bytes: &[u8], binding: DecodeBinding<'_>) -> Result<SourceClip, DecodeError> {
        let serial: SourceClipSerial = ron::de::from_bytes(bytes)?;

        let skeleton = match serial.skeleton {
            Some(skeleton) => Some(skeleton.to_skeleton()?),
            None if self.format.needs_binding() => binding.skeleton.cloned(),
            None => None,
        };

        let tracks = serial
            .tracks
            .into_iter()
            .map(|track| SourceTrack {
                id: track.id,
                times: track.times,
                keyframes: match track.values {
                    TrackValuesSerial::Rotations(values) => {
                        Keyframes::Rotation(values.into_iter().map(Quat::from_array).collect())
                    }
                    TrackValuesSerial::Translations(values) => {
                        Keyframes::Translation(values.into_iter().map(Vec3::from_array).collect())
                    }
                },
            })
            .collect();

        Ok(SourceClip {
            name: serial.name,
            format: self.format,
            tracks,
            skeleton,
            duration: serial.duration,
        })
    }
}
