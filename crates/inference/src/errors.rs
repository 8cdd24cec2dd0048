use media::MediaError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Unsupported dispatch: {0}")]
    UnsupportedDispatch(String),

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Model does not support {capability}")]
    CapabilityMissing { capability: &'static str },

    #[error("Model call failed: {0:#}")]
    Model(#[source] anyhow::Error),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("Invalid model output: {0}")]
    InvalidOutput(String),
}

/// Raised by a backend for a capability it does not implement.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("capability `{0}` is not implemented by this backend")]
pub struct MissingCapability(pub &'static str);

impl From<anyhow::Error> for InferenceError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<MissingCapability>() {
            Ok(MissingCapability(capability)) => InferenceError::CapabilityMissing { capability },
            Err(err) => InferenceError::Model(err),
        }
    }
}
