use bevy::math::{Quat, Vec3};

use super::{Keyframes, TrackProperty};
use crate::{decode::MotionFormat, errors::DecodeError, skeleton::Skeleton};

/// A decoded, not yet retargeted track, named after a bone of the source skeleton.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceTrack {
    /// `<bone>.quaternion` or `<bone>.position`
    pub id: String,
    pub times: Vec<f32>,
    pub keyframes: Keyframes,
}

impl SourceTrack {
    pub fn rotation(bone: &str, times: Vec<f32>, values: Vec<Quat>) -> Self {
        Self {
            id: format!("{bone}.{}", TrackProperty::Rotation.suffix()),
            times,
            keyframes: Keyframes::Rotation(values),
        }
    }

    pub fn translation(bone: &str, times: Vec<f32>, values: Vec<Vec3>) -> Self {
        Self {
            id: format!("{bone}.{}", TrackProperty::Translation.suffix()),
            times,
            keyframes: Keyframes::Translation(values),
        }
    }

    /// Splits the identifier into the source bone name and the animated property
    pub fn target(&self) -> Result<(&str, TrackProperty), DecodeError> {
        let (bone, property) = self
            .id
            .rsplit_once('.')
            .ok_or_else(|| DecodeError::InvalidTrackId(self.id.clone()))?;
        let property = TrackProperty::from_suffix(property)
            .filter(|property| *property == self.keyframes.property())
            .ok_or_else(|| DecodeError::InvalidTrackId(self.id.clone()))?;

        Ok((bone, property))
    }

    pub fn validate(&self) -> Result<(), DecodeError> {
        self.target()?;

        if self.times.len() != self.keyframes.len() {
            return Err(DecodeError::MismatchedSampleCount {
                track: self.id.clone(),
                times: self.times.len(),
                values: self.keyframes.len(),
            });
        }

        if self.times.iter().any(|time| !time.is_finite()) {
            return Err(DecodeError::Malformed(format!(
                "track {} has non-finite sample times",
                self.id
            )));
        }

        if self.times.windows(2).any(|pair| pair[1] < pair[0]) {
            return Err(DecodeError::NonMonotonicTimes(self.id.clone()));
        }

        let usable = match &self.keyframes {
            Keyframes::Rotation(values) => values
                .iter()
                .all(|value| value.is_finite() && value.length_squared() > 1e-12),
            Keyframes::Translation(values) => values.iter().all(|value| value.is_finite()),
        };
        if !usable {
            return Err(DecodeError::Malformed(format!(
                "track {} has non-finite or zero-length values",
                self.id
            )));
        }

        Ok(())
    }
}

/// Output of a motion decoder.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceClip {
    pub name: String,
    pub format: MotionFormat,
    pub tracks: Vec<SourceTrack>,
    /// Rest pose of the skeleton the tracks were authored against, when the container has
    /// one (or, for bound formats, the skeleton the decoder bound the tracks to).
    pub skeleton: Option<Skeleton>,
    /// Duration stored in the file, if any
    pub duration: Option<f32>,
}

impl SourceClip {
    pub fn new(name: impl Into<String>, format: MotionFormat) -> Self {
        Self {
            name: name.into(),
            format,
            tracks: Vec::new(),
            skeleton: None,
            duration: None,
        }
    }

    pub fn with_track(mut self, track: SourceTrack) -> Self {
        self.tracks.push(track);
        self
    }

    pub fn with_skeleton(mut self, skeleton: Skeleton) -> Self {
        self.skeleton = Some(skeleton);
        self
    }

    /// Checks the structural invariants every decoder must uphold, and renormalizes
    /// rotation samples.
    pub fn validated(mut self) -> Result<Self, DecodeError> {
        for track in &mut self.tracks {
            track.validate()?;
            if let Keyframes::Rotation(values) = &mut track.keyframes {
                for value in values.iter_mut() {
                    *value = value.normalize();
                }
            }
        }
        Ok(self)
    }
}
