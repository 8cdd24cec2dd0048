pub mod config;
pub mod letterbox;
pub mod tensor;

pub use config::{DEFAULT_INPUT_SIZE, DETECTOR_INPUT_SIZE, TensorOptions};
pub use letterbox::{LetterboxPreProcessor, PreprocessResult};
pub use tensor::{TensorPreparer, to_tensor};
