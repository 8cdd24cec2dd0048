use crate::backend::InferenceBackend;
use crate::config::InferenceConfig;
use crate::errors::InferenceError;
use crate::labels::label_or_index;
use crate::provision::{DefaultModel, default_detector};
use crate::request::{FanOutPolicy, InferenceOptions, InferenceRequest, TaskType};
use media::{Media, MediaCollection, MediaResource, Prediction, Predictions};
use std::sync::Arc;

/// Runs a task over a single resource or every frame of a collection and hands
/// back media of the same shape with predictions attached.
pub struct InferenceDispatcher {
    default_model: Arc<DefaultModel>,
    policy: FanOutPolicy,
    max_in_flight: Option<usize>,
}

impl Default for InferenceDispatcher {
    fn default() -> Self {
        Self::new(default_detector())
    }
}

impl InferenceDispatcher {
    /// `default_model` serves detection requests that arrive without a model.
    pub fn new(default_model: Arc<DefaultModel>) -> Self {
        Self {
            default_model,
            policy: FanOutPolicy::default(),
            max_in_flight: None,
        }
    }

    pub fn from_config(config: &InferenceConfig) -> Self {
        Self::default()
            .with_policy(config.fan_out_policy)
            .with_max_in_flight(config.max_in_flight)
    }

    pub fn with_policy(mut self, policy: FanOutPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Cap on frames in flight at once; `None` submits every frame together.
    pub fn with_max_in_flight(mut self, max_in_flight: Option<usize>) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    pub fn policy(&self) -> FanOutPolicy {
        self.policy
    }

    #[tracing::instrument(
        name = "dispatch",
        skip_all,
        fields(task = %request.task, media = request.media.kind_name(), len = request.media.len())
    )]
    pub async fn run(&self, request: InferenceRequest) -> Result<Media, InferenceError> {
        let InferenceRequest {
            task,
            media,
            model,
            options,
        } = request;

        let model = self.resolve_model(task, model).await?;

        let result = match media {
            Media::Single(resource) => {
                let predictions = predict_one(task, &resource, model.as_ref(), &options).await?;
                Media::Single(resource.with_predictions(predictions))
            }
            Media::Collection(collection) => {
                Media::Collection(self.fan_out(task, &collection, model.as_ref(), &options).await?)
            }
        };

        tracing::debug!("Dispatch complete");
        Ok(result)
    }

    async fn resolve_model(
        &self,
        task: TaskType,
        model: Option<Arc<dyn InferenceBackend>>,
    ) -> Result<Arc<dyn InferenceBackend>, InferenceError> {
        match (model, task) {
            (Some(model), _) => Ok(model),
            (None, TaskType::Detection) => self.default_model.get().await,
            (None, task) => Err(InferenceError::ModelUnavailable(format!(
                "{task} requires a model"
            ))),
        }
    }

    async fn fan_out(
        &self,
        task: TaskType,
        collection: &MediaCollection,
        model: &dyn InferenceBackend,
        options: &InferenceOptions,
    ) -> Result<MediaCollection, InferenceError> {
        let frames = match self.policy {
            FanOutPolicy::FailFast => {
                collection
                    .try_run_on_each(self.max_in_flight, move |frame| async move {
                        let predictions = predict_one(task, &frame, model, options).await?;
                        Ok::<_, InferenceError>(frame.with_predictions(predictions))
                    })
                    .await?
            }
            FanOutPolicy::CollectPartial => {
                collection
                    .run_on_each(self.max_in_flight, move |frame| async move {
                        match predict_one(task, &frame, model, options).await {
                            Ok(predictions) => frame.with_predictions(predictions),
                            Err(e) => {
                                tracing::warn!(frame = frame.name(), error = %e, "Frame inference failed");
                                frame.with_predictions(Predictions::Failed {
                                    reason: e.to_string(),
                                })
                            }
                        }
                    })
                    .await
            }
        };

        Ok(collection.with_frames(frames))
    }
}

/// Classify one resource outside of a request: tensor, predict, label, rank.
pub async fn classify_resource(
    resource: &MediaResource,
    model: &dyn InferenceBackend,
    options: &InferenceOptions,
) -> Result<MediaResource, InferenceError> {
    let predictions = predict_one(TaskType::Classification, resource, model, options).await?;
    Ok(resource.with_predictions(predictions))
}

async fn predict_one(
    task: TaskType,
    resource: &MediaResource,
    model: &dyn InferenceBackend,
    options: &InferenceOptions,
) -> Result<Predictions, InferenceError> {
    match task {
        TaskType::Classification => {
            let output = predict_tensor(resource, model, options).await?;
            let mut ranked: Vec<Prediction> = output
                .iter()
                .enumerate()
                .map(|(i, &score)| Prediction::new(label_or_index(&options.labels, i), score))
                .collect();
            ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

            tracing::trace!(name = resource.name(), scores = ranked.len(), "Classified");
            Ok(Predictions::Labels(ranked))
        }
        TaskType::Segmentation => {
            let output = predict_tensor(resource, model, options).await?;
            tracing::trace!(name = resource.name(), shape = ?output.shape(), "Segmented");
            Ok(Predictions::Raw(output))
        }
        TaskType::Detection => {
            let image = resource.decoded()?;
            let detections = model.detect(&image).await?;
            tracing::trace!(name = resource.name(), detections = detections.len(), "Detected");
            Ok(Predictions::Labels(detections))
        }
    }
}

async fn predict_tensor(
    resource: &MediaResource,
    model: &dyn InferenceBackend,
    options: &InferenceOptions,
) -> Result<ndarray::ArrayD<f32>, InferenceError> {
    let tensor = preprocess::to_tensor(resource, &options.tensor_options())?;
    Ok(model.predict(tensor.into_dyn()).await?)
}
