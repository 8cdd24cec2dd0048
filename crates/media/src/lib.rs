pub mod annotate;
pub mod cache;
pub mod classifier;
pub mod collection;
pub mod errors;
pub mod input;
pub mod prediction;
pub mod resource;
pub mod stack;
pub mod video;

pub use annotate::{AnnotationRenderer, AnnotationStyle};
pub use classifier::{ClassifyOptions, InputClassifier, InputKind, classify_kind};
pub use collection::{CollectionKind, Media, MediaCollection};
pub use errors::MediaError;
pub use input::{InMemoryInput, InputDescriptor};
pub use prediction::{BoundingBox, Prediction, Predictions};
pub use resource::{MediaResource, TensorKey};
pub use video::{
    ExtractionState, FrameExtractor, UnsupportedVideoBackend, VideoBackend, VideoMetadata,
    VideoSource,
};
