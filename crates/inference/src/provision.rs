use crate::backend::InferenceBackend;
use crate::config::InferenceConfig;
use crate::errors::InferenceError;
use async_trait::async_trait;
use std::sync::{Arc, OnceLock};
use tokio::sync::OnceCell;

/// Produces a ready-to-use model. Called at most once per [`DefaultModel`].
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn acquire(&self) -> Result<Arc<dyn InferenceBackend>, InferenceError>;
}

/// Lazily acquired shared model: the first caller pays for the acquisition, every
/// later caller gets the same handle. A failed acquisition is not cached.
pub struct DefaultModel {
    provider: Box<dyn ModelProvider>,
    cell: OnceCell<Arc<dyn InferenceBackend>>,
}

impl DefaultModel {
    pub fn new(provider: impl ModelProvider + 'static) -> Self {
        Self {
            provider: Box::new(provider),
            cell: OnceCell::new(),
        }
    }

    pub async fn get(&self) -> Result<Arc<dyn InferenceBackend>, InferenceError> {
        let model = self
            .cell
            .get_or_try_init(|| async {
                let model = self.provider.acquire().await?;
                tracing::info!("Default model acquired");
                Ok::<_, InferenceError>(model)
            })
            .await?;

        Ok(Arc::clone(model))
    }

    pub fn is_acquired(&self) -> bool {
        self.cell.initialized()
    }
}

/// Loads the bundled ONNX detector from a configured path.
#[derive(Debug, Clone)]
pub struct DetectorProvider {
    model_path: Option<String>,
    confidence_threshold: f32,
}

impl DetectorProvider {
    pub fn new(model_path: Option<String>, confidence_threshold: f32) -> Self {
        Self {
            model_path,
            confidence_threshold,
        }
    }

    pub fn from_config(config: &InferenceConfig) -> Self {
        Self::new(config.detector_model_path.clone(), config.confidence_threshold)
    }
}

#[async_trait]
impl ModelProvider for DetectorProvider {
    #[cfg(feature = "ort-backend")]
    async fn acquire(&self) -> Result<Arc<dyn InferenceBackend>, InferenceError> {
        use crate::backend::ort::OrtDetector;

        let path = self.model_path.clone().ok_or_else(|| {
            InferenceError::ModelUnavailable("DETECTOR_MODEL_PATH is not set".to_string())
        })?;
        let threshold = self.confidence_threshold;

        let loaded = tokio::task::spawn_blocking(move || {
            OrtDetector::load(&path, threshold).map_err(|e| format!("{path}: {e:#}"))
        })
        .await
        .map_err(|e| InferenceError::ModelUnavailable(e.to_string()))?;

        let detector = loaded.map_err(InferenceError::ModelUnavailable)?;
        Ok(Arc::new(detector))
    }

    #[cfg(not(feature = "ort-backend"))]
    async fn acquire(&self) -> Result<Arc<dyn InferenceBackend>, InferenceError> {
        Err(InferenceError::ModelUnavailable(format!(
            "no detector backend compiled in (model path: {})",
            self.model_path.as_deref().unwrap_or("unset")
        )))
    }
}

static DEFAULT_DETECTOR: OnceLock<Arc<DefaultModel>> = OnceLock::new();

/// Process-wide default detector, configured from the environment on first use.
pub fn default_detector() -> Arc<DefaultModel> {
    let model = DEFAULT_DETECTOR.get_or_init(|| {
        let config = InferenceConfig::from_env();
        Arc::new(DefaultModel::new(DetectorProvider::from_config(&config)))
    });
    Arc::clone(model)
}
