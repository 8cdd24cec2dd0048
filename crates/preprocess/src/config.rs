use media::TensorKey;
use serde::{Deserialize, Serialize};

/// Classifier input size as (width, height).
pub const DEFAULT_INPUT_SIZE: (u32, u32) = (224, 224);

/// Letterboxed detector input size as (width, height).
pub const DETECTOR_INPUT_SIZE: (u32, u32) = (640, 640);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TensorOptions {
    pub target_width: u32,
    pub target_height: u32,
    /// Divide channel values by 255.
    pub normalize: bool,
}

impl Default for TensorOptions {
    fn default() -> Self {
        Self {
            target_width: DEFAULT_INPUT_SIZE.0,
            target_height: DEFAULT_INPUT_SIZE.1,
            normalize: true,
        }
    }
}

impl TensorOptions {
    pub fn key(&self) -> TensorKey {
        TensorKey {
            width: self.target_width,
            height: self.target_height,
            normalize: self.normalize,
        }
    }
}
