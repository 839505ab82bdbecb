use thiserror::Error;

/// A motion file could not be turned into a source clip.
///
/// Decode errors are fatal to the load that produced them. A clip that decodes fine but
/// ends up with zero usable tracks is *not* a decode error.
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    #[error("wrong animation file format: {0}")]
    UnsupportedFormat(String),
    #[error("no decoder registered for {0} files")]
    MissingDecoder(&'static str),
    #[error("could not parse clip: {0}")]
    Malformed(String),
    #[error("track {track} has {values} values for {times} sample times")]
    MismatchedSampleCount {
        track: String,
        times: usize,
        values: usize,
    },
    #[error("track {0} has decreasing sample times")]
    NonMonotonicTimes(String),
    #[error("track identifier {0} is not of the form <bone>.<quaternion|position>")]
    InvalidTrackId(String),
    #[error("unknown humanoid bone: {0}")]
    UnknownHumanoidBone(String),
}

impl From<ron::error::SpannedError> for DecodeError {
    fn from(value: ron::error::SpannedError) -> Self {
        Self::Malformed(value.to_string())
    }
}
