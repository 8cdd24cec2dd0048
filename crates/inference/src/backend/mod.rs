use crate::errors::MissingCapability;
use async_trait::async_trait;
use image::DynamicImage;
use media::Prediction;
use ndarray::ArrayD;

#[cfg(feature = "ort-backend")]
pub mod ort;

/// An already-loaded model.
///
/// Implementations provide whichever capabilities the model has; the others
/// fail with [`MissingCapability`]. Calls may run concurrently through a shared
/// reference.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Run the model on a prepared tensor and return its raw output.
    async fn predict(&self, input: ArrayD<f32>) -> anyhow::Result<ArrayD<f32>> {
        let _ = input;
        Err(MissingCapability("predict").into())
    }

    /// Detect objects in a decoded image; boxes are in source pixel coordinates.
    async fn detect(&self, image: &DynamicImage) -> anyhow::Result<Vec<Prediction>> {
        let _ = image;
        Err(MissingCapability("detect").into())
    }
}
