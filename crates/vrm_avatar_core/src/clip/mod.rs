pub mod source;

use bevy::math::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::{
    decode::MotionFormat, interpolation::linear::sample_linear, skeleton::NodeId,
};

/// Which transform channel a track animates
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackProperty {
    Rotation,
    Translation,
}

impl TrackProperty {
    /// Parses the property half of a `<bone>.<property>` track identifier
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "quaternion" => Some(Self::Rotation),
            "position" => Some(Self::Translation),
            _ => None,
        }
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Rotation => "quaternion",
            Self::Translation => "position",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Keyframes {
    Rotation(Vec<Quat>),
    Translation(Vec<Vec3>),
}

impl Keyframes {
    pub fn len(&self) -> usize {
        match self {
            Self::Rotation(values) => values.len(),
            Self::Translation(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn property(&self) -> TrackProperty {
        match self {
            Self::Rotation(_) => TrackProperty::Rotation,
            Self::Translation(_) => TrackProperty::Translation,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TrackSample {
    Rotation(Quat),
    Translation(Vec3),
}

/// A track bound to a node of the destination rig
#[derive(Clone, Debug, PartialEq)]
pub struct ClipTrack {
    pub node: NodeId,
    pub times: Vec<f32>,
    pub keyframes: Keyframes,
}

impl ClipTrack {
    pub fn rotation(node: NodeId, times: Vec<f32>, values: Vec<Quat>) -> Self {
        Self {
            node,
            times,
            keyframes: Keyframes::Rotation(values),
        }
    }

    pub fn translation(node: NodeId, times: Vec<f32>, values: Vec<Vec3>) -> Self {
        Self {
            node,
            times,
            keyframes: Keyframes::Translation(values),
        }
    }

    pub fn sample(&self, time: f32) -> Option<TrackSample> {
        match &self.keyframes {
            Keyframes::Rotation(values) => {
                sample_linear(&self.times, values, time).map(TrackSample::Rotation)
            }
            Keyframes::Translation(values) => {
                sample_linear(&self.times, values, time).map(TrackSample::Translation)
            }
        }
    }

    pub fn end_time(&self) -> f32 {
        self.times.last().copied().unwrap_or(0.)
    }
}

/// Where a playable clip came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClipProvenance {
    /// Converted from a motion file for one particular rig
    Retargeted(MotionFormat),
    /// Synthesized from a movement descriptor against the rig's current pose
    Procedural,
}

/// A clip ready to be played on one rig.
///
/// Clips are only produced by the retargeter or the procedural generator, and are never
/// mutated afterwards; they are shared through `Arc` by the caches and the mixer.
#[derive(Clone, Debug, PartialEq)]
pub struct Clip {
    name: String,
    duration: f32,
    tracks: Vec<ClipTrack>,
    provenance: ClipProvenance,
}

impl Clip {
    /// Builds a clip whose duration is the end of its longest track
    pub fn new(name: impl Into<String>, provenance: ClipProvenance, tracks: Vec<ClipTrack>) -> Self {
        let duration = tracks.iter().map(ClipTrack::end_time).fold(0., f32::max);
        Self {
            name: name.into(),
            duration,
            tracks,
            provenance,
        }
    }

    pub fn empty(name: impl Into<String>, provenance: ClipProvenance) -> Self {
        Self::new(name, provenance, Vec::new())
    }

    /// Overrides the computed duration, e.g. with the one stored in the source file
    pub fn with_duration(mut self, duration: f32) -> Self {
        self.duration = duration.max(0.);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn duration(&self) -> f32 {
        self.duration
    }

    pub fn tracks(&self) -> &[ClipTrack] {
        &self.tracks
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn provenance(&self) -> ClipProvenance {
        self.provenance
    }

    pub fn sample(&self, time: f32) -> impl Iterator<Item = (NodeId, TrackSample)> + '_ {
        self.tracks
            .iter()
            .filter_map(move |track| track.sample(time).map(|sample| (track.node, sample)))
    }
}
