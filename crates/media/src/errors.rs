use std::io;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("No input provided")]
    MissingInput,

    #[error("Unsupported input file type: {name}")]
    UnsupportedInputKind { name: String },

    #[error("Invalid media type for an image resource: {media_type}")]
    InvalidMediaType { media_type: String },

    #[error("Failed to decode {name}: {reason}")]
    Decode { name: String, reason: String },

    #[error("Failed to encode {name}: {reason}")]
    Encode { name: String, reason: String },

    #[error("Timed out waiting for {stage} after {timeout:?}")]
    ExtractionTimeout { stage: String, timeout: Duration },

    #[error("Video error: {0}")]
    Video(String),

    #[error("Resize failed: {0}")]
    Resize(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl MediaError {
    pub(crate) fn decode(name: &str, reason: impl ToString) -> Self {
        MediaError::Decode {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn encode(name: &str, reason: impl ToString) -> Self {
        MediaError::Encode {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<common::WaitTimeout> for MediaError {
    fn from(err: common::WaitTimeout) -> Self {
        MediaError::ExtractionTimeout {
            stage: err.resource,
            timeout: err.after,
        }
    }
}
