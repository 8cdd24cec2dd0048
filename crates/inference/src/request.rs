use crate::backend::InferenceBackend;
use crate::errors::InferenceError;
use media::Media;
use preprocess::{DEFAULT_INPUT_SIZE, TensorOptions};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    #[serde(alias = "classify")]
    Classification,
    #[serde(alias = "segment")]
    Segmentation,
    #[serde(alias = "detect")]
    Detection,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Classification => "classification",
            TaskType::Segmentation => "segmentation",
            TaskType::Detection => "detection",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = InferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "classification" | "classify" => Ok(TaskType::Classification),
            "segmentation" | "segment" => Ok(TaskType::Segmentation),
            "detection" | "detect" => Ok(TaskType::Detection),
            _ => Err(InferenceError::UnsupportedDispatch(format!("task type `{s}`"))),
        }
    }
}

/// What happens to a collection when one of its frames fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FanOutPolicy {
    /// The whole dispatch fails with the first frame error.
    #[default]
    FailFast,
    /// The failing frame carries a failure marker; the rest go through.
    CollectPartial,
}

impl FromStr for FanOutPolicy {
    type Err = InferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fail-fast" | "fail_fast" => Ok(FanOutPolicy::FailFast),
            "collect-partial" | "collect_partial" => Ok(FanOutPolicy::CollectPartial),
            _ => Err(InferenceError::UnsupportedDispatch(format!("fan-out policy `{s}`"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InferenceOptions {
    pub target_width: u32,
    pub target_height: u32,
    pub normalize: bool,
    /// Label for each score index; missing entries become `class_<i>`.
    pub labels: Vec<String>,
}

impl Default for InferenceOptions {
    fn default() -> Self {
        Self {
            target_width: DEFAULT_INPUT_SIZE.0,
            target_height: DEFAULT_INPUT_SIZE.1,
            normalize: true,
            labels: Vec::new(),
        }
    }
}

impl InferenceOptions {
    pub fn tensor_options(&self) -> TensorOptions {
        TensorOptions {
            target_width: self.target_width,
            target_height: self.target_height,
            normalize: self.normalize,
        }
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }
}

/// One dispatch: a task, the media to run it on, an optional model and options.
#[derive(Clone)]
pub struct InferenceRequest {
    pub task: TaskType,
    pub media: Media,
    pub model: Option<Arc<dyn InferenceBackend>>,
    pub options: InferenceOptions,
}

impl InferenceRequest {
    pub fn new(task: TaskType, media: impl Into<Media>) -> Self {
        Self {
            task,
            media: media.into(),
            model: None,
            options: InferenceOptions::default(),
        }
    }

    pub fn with_model(mut self, model: Arc<dyn InferenceBackend>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_options(mut self, options: InferenceOptions) -> Self {
        self.options = options;
        self
    }
}

impl fmt::Debug for InferenceRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InferenceRequest")
            .field("task", &self.task)
            .field("media", &self.media.kind_name())
            .field("len", &self.media.len())
            .field("model", &self.model.is_some())
            .field("options", &self.options)
            .finish()
    }
}
