use crate::errors::InferenceError;
use crate::labels::{COCO_CATEGORIES, label_or_index};
use media::{BoundingBox, Prediction};
use ndarray::ArrayViewD;

/// How the detector input was derived from the source image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformParams {
    pub orig_width: u32,
    pub orig_height: u32,
    pub input_width: u32,
    pub input_height: u32,
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

/// Turns DETR-style output (`[1, Q, 4]` cxcywh boxes, `[1, Q, C]` class logits)
/// into ranked prediction records.
#[derive(Debug, Clone)]
pub struct PostProcessor {
    pub confidence_threshold: f32,
    /// Indexed by class id; index 0 is background and never reported.
    labels: Vec<String>,
}

impl PostProcessor {
    pub fn new(confidence_threshold: f32) -> Self {
        Self::with_labels(
            confidence_threshold,
            COCO_CATEGORIES.iter().map(|s| s.to_string()).collect(),
        )
    }

    pub fn with_labels(confidence_threshold: f32, labels: Vec<String>) -> Self {
        Self {
            confidence_threshold,
            labels,
        }
    }

    /// Keep queries whose best class clears the threshold, map their boxes back to
    /// source pixels and order them best first.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn parse_detections(
        &self,
        dets: &ArrayViewD<f32>,
        logits: &ArrayViewD<f32>,
        transform: &TransformParams,
    ) -> Result<Vec<Prediction>, InferenceError> {
        if dets.ndim() != 3 || dets.shape()[2] != 4 {
            return Err(InferenceError::InvalidOutput(format!(
                "expected boxes shaped [1, Q, 4], got {:?}",
                dets.shape()
            )));
        }
        if logits.ndim() != 3 || logits.shape()[1] != dets.shape()[1] {
            return Err(InferenceError::InvalidOutput(format!(
                "logits {:?} do not match boxes {:?}",
                logits.shape(),
                dets.shape()
            )));
        }

        let num_queries = dets.shape()[1];
        let num_classes = logits.shape()[2];

        let mut predictions = Vec::new();

        for i in 0..num_queries {
            // argmax over classes, skipping background at 0
            let mut max_logit = f32::NEG_INFINITY;
            let mut class_idx = 1usize;
            for c in 1..num_classes {
                let logit = logits[[0, i, c]];
                if logit > max_logit {
                    max_logit = logit;
                    class_idx = c;
                }
            }

            let confidence = sigmoid(max_logit);
            if confidence < self.confidence_threshold {
                continue;
            }

            let (x1, y1, x2, y2) = cxcywh_to_xyxy(
                dets[[0, i, 0]],
                dets[[0, i, 1]],
                dets[[0, i, 2]],
                dets[[0, i, 3]],
            );

            // normalized -> detector input -> source pixels
            let to_source_x = |x: f32| {
                ((x * transform.input_width as f32 - transform.offset_x) / transform.scale)
                    .clamp(0.0, transform.orig_width as f32)
            };
            let to_source_y = |y: f32| {
                ((y * transform.input_height as f32 - transform.offset_y) / transform.scale)
                    .clamp(0.0, transform.orig_height as f32)
            };

            let bbox = BoundingBox::from_corners(
                to_source_x(x1),
                to_source_y(y1),
                to_source_x(x2),
                to_source_y(y2),
            );

            predictions.push(
                Prediction::new(label_or_index(&self.labels, class_idx), confidence).with_bbox(bbox),
            );
        }

        predictions.sort_by(|a, b| b.score.total_cmp(&a.score));
        tracing::trace!(queries = num_queries, kept = predictions.len(), "Parsed detections");

        Ok(predictions)
    }
}

impl Default for PostProcessor {
    fn default() -> Self {
        Self::new(0.5)
    }
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[inline]
fn cxcywh_to_xyxy(cx: f32, cy: f32, w: f32, h: f32) -> (f32, f32, f32, f32) {
    (cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0)
}
