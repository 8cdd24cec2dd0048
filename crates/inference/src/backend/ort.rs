use super::InferenceBackend;
use crate::postprocessing::{PostProcessor, TransformParams};
use async_trait::async_trait;
use common::span;
use image::DynamicImage;
use media::Prediction;
use ndarray::{Array4, ArrayD};
use ort::{
    session::{Session, builder::GraphOptimizationLevel},
    value::TensorRef,
};
use preprocess::LetterboxPreProcessor;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, Copy)]
pub enum ExecutionProvider {
    Cpu,
    Cuda,
}

/// A loaded ONNX graph. Runs are serialized on the session and executed on the
/// blocking pool.
#[derive(Clone)]
pub struct OrtBackend {
    session: Arc<Mutex<Session>>,
}

impl OrtBackend {
    pub fn load_model(path: &str) -> anyhow::Result<Self> {
        Self::load_model_with_provider(path, ExecutionProvider::Cpu)
    }

    /// Load model with specified execution provider
    pub fn load_model_with_provider(
        path: &str,
        provider: ExecutionProvider,
    ) -> anyhow::Result<Self> {
        // Initialize ORT environment (idempotent)
        let _ = ort::init().commit();

        let mut builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?;

        match provider {
            ExecutionProvider::Cuda => {
                tracing::info!("Initializing ONNX Runtime with CUDA execution provider");
                builder = builder.with_execution_providers([
                    ort::execution_providers::CUDAExecutionProvider::default()
                        .with_device_id(0)
                        .build()
                        .error_on_failure(),
                ])?;
            }
            ExecutionProvider::Cpu => {
                tracing::info!("Initializing ONNX Runtime with CPU execution provider");
            }
        }

        let session = builder.commit_from_file(path)?;

        tracing::info!("Model loaded from {}", path);
        Ok(Self {
            session: Arc::new(Mutex::new(session)),
        })
    }

    /// Run a DETR-style graph: returns `(boxes [1, Q, 4], logits [1, Q, C])`.
    pub async fn run_detr(&self, images: Array4<f32>) -> anyhow::Result<(ArrayD<f32>, ArrayD<f32>)> {
        let session = Arc::clone(&self.session);

        tokio::task::spawn_blocking(move || {
            let _s = span!("ort_run_detr");
            let mut session = session.lock().unwrap_or_else(PoisonError::into_inner);

            let outputs = session.run(ort::inputs![TensorRef::from_array_view(images.view())?])?;

            let dets = outputs["dets"].try_extract_array::<f32>()?.into_owned();
            let logits = outputs["labels"].try_extract_array::<f32>()?.into_owned();

            Ok::<_, anyhow::Error>((dets, logits))
        })
        .await?
    }
}

#[async_trait]
impl InferenceBackend for OrtBackend {
    async fn predict(&self, input: ArrayD<f32>) -> anyhow::Result<ArrayD<f32>> {
        let session = Arc::clone(&self.session);

        tokio::task::spawn_blocking(move || {
            let _s = span!("ort_predict");
            let mut session = session.lock().unwrap_or_else(PoisonError::into_inner);

            let outputs = session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
            let output = outputs[0].try_extract_array::<f32>()?.into_owned();

            Ok::<_, anyhow::Error>(output)
        })
        .await?
    }
}

/// The bundled detection capability: letterbox, DETR graph, post-processing.
pub struct OrtDetector {
    backend: OrtBackend,
    preprocessor: Mutex<LetterboxPreProcessor>,
    postprocessor: PostProcessor,
}

impl OrtDetector {
    pub fn load(path: &str, confidence_threshold: f32) -> anyhow::Result<Self> {
        Self::load_with_provider(path, confidence_threshold, ExecutionProvider::Cpu)
    }

    pub fn load_with_provider(
        path: &str,
        confidence_threshold: f32,
        provider: ExecutionProvider,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            backend: OrtBackend::load_model_with_provider(path, provider)?,
            preprocessor: Mutex::new(LetterboxPreProcessor::default()),
            postprocessor: PostProcessor::new(confidence_threshold),
        })
    }
}

#[async_trait]
impl InferenceBackend for OrtDetector {
    async fn predict(&self, input: ArrayD<f32>) -> anyhow::Result<ArrayD<f32>> {
        self.backend.predict(input).await
    }

    async fn detect(&self, image: &DynamicImage) -> anyhow::Result<Vec<Prediction>> {
        let rgb = image.to_rgb8();
        let (orig_width, orig_height) = rgb.dimensions();

        let (pre, input_size) = {
            let mut preprocessor = self
                .preprocessor
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            (preprocessor.preprocess(&rgb)?, preprocessor.input_size)
        };
        drop(rgb);

        let (dets, logits) = self.backend.run_detr(pre.tensor).await?;

        let transform = TransformParams {
            orig_width,
            orig_height,
            input_width: input_size.0,
            input_height: input_size.1,
            scale: pre.scale,
            offset_x: pre.offset_x,
            offset_y: pre.offset_y,
        };

        let predictions =
            self.postprocessor
                .parse_detections(&dets.view(), &logits.view(), &transform)?;

        tracing::debug!(detections = predictions.len(), "Detector run complete");
        Ok(predictions)
    }
}
