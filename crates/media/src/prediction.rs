use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

/// Axis-aligned box in source pixel coordinates (top-left corner plus size).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build from corner coordinates, clamping negative extents to zero.
    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x: x1,
            y: y1,
            width: (x2 - x1).max(0.0),
            height: (y2 - y1).max(0.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
}

impl Prediction {
    pub fn new(label: impl Into<String>, score: f32) -> Self {
        Self {
            label: label.into(),
            score,
            bbox: None,
        }
    }

    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    /// Caption drawn next to the box, e.g. `dog (87.5%)`.
    pub fn caption(&self) -> String {
        format!("{} ({:.1}%)", self.label, self.score * 100.0)
    }
}

/// What an inference pass attached to a resource.
#[derive(Debug, Clone, PartialEq)]
pub enum Predictions {
    /// Ranked records; index 0 is the best one.
    Labels(Vec<Prediction>),
    /// Untouched model output (segmentation maps).
    Raw(ArrayD<f32>),
    /// This frame failed while the rest of its collection went through.
    Failed { reason: String },
}

impl Predictions {
    /// Ranked records, empty for raw or failed payloads.
    pub fn labels(&self) -> &[Prediction] {
        match self {
            Predictions::Labels(labels) => labels,
            Predictions::Raw(_) | Predictions::Failed { .. } => &[],
        }
    }

    pub fn raw(&self) -> Option<&ArrayD<f32>> {
        match self {
            Predictions::Raw(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&str> {
        match self {
            Predictions::Failed { reason } => Some(reason),
            _ => None,
        }
    }
}
