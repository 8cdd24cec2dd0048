pub mod backend;
pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod labels;
pub mod logging;
pub mod postprocessing;
pub mod provision;
pub mod request;

// Re-export commonly used types for convenience
pub use backend::InferenceBackend;
pub use config::InferenceConfig;
pub use dispatcher::{InferenceDispatcher, classify_resource};
pub use errors::{InferenceError, MissingCapability};
pub use labels::{COCO_CATEGORIES, label_or_index};
pub use postprocessing::{PostProcessor, TransformParams};
pub use provision::{DefaultModel, DetectorProvider, ModelProvider, default_detector};
pub use request::{FanOutPolicy, InferenceOptions, InferenceRequest, TaskType};

#[cfg(feature = "ort-backend")]
pub use backend::ort::{ExecutionProvider, OrtBackend, OrtDetector};
