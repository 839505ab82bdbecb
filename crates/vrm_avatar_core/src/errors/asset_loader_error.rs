use thiserror::Error;

/// Errors produced by the RON settings loaders
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum AssetLoaderError {
    #[error("could not read settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse RON: {0}")]
    RonSpannedError(#[from] ron::error::SpannedError),
}
