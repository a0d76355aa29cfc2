// Error types for the blob engine.
// Only construction and explicit argument validation fail; numerical trouble
// during a frame is repaired in place and reported through the observer.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BlobError {
    /// A configuration value is out of range. Raised at construction time.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The isosurface threshold handed to the mesher is negative or not finite.
    #[error("invalid isolation threshold: {0}")]
    InvalidIsolation(f32),

    /// A JSON configuration document could not be parsed.
    #[error("config parse error: {0}")]
    ConfigParse(String),
}

pub type BlobResult<T> = Result<T, BlobError>;

impl From<serde_json::Error> for BlobError {
    fn from(err: serde_json::Error) -> Self {
        BlobError::ConfigParse(err.to_string())
    }
}
