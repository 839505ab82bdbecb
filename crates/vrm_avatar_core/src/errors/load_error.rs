use thiserror::Error;

use super::DecodeError;

/// Failure of an asynchronous motion load (fetch, then decode).
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LoadError {
    #[error("could not fetch {path}: {reason}")]
    Fetch { path: String, reason: String },
    #[error("could not decode {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: DecodeError,
    },
}

pub type LoadResult<T> = Result<T, LoadError>;
