use crate::collection::Media;
use crate::errors::MediaError;
use crate::input::InputDescriptor;
use crate::resource::{IMAGE_PREFIX, MediaResource, VIDEO_PREFIX};
use crate::stack::load_stack;
use crate::video::{FrameExtractor, VideoBackend, default_backend};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const DEFAULT_FPS: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClassifyOptions {
    /// Video sampling rate in frames per second.
    pub fps: f64,
}

impl Default for ClassifyOptions {
    fn default() -> Self {
        Self { fps: DEFAULT_FPS }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Image,
    Video,
    Stack,
}

/// Decide what an input is from its declared type and file extension.
///
/// TIFF extensions win over the declared type, so `image/tiff` still becomes a stack.
pub fn classify_kind(declared_type: &str, extension: &str) -> Option<InputKind> {
    if extension.eq_ignore_ascii_case("tif") || extension.eq_ignore_ascii_case("tiff") {
        Some(InputKind::Stack)
    } else if declared_type.starts_with(IMAGE_PREFIX) {
        Some(InputKind::Image)
    } else if declared_type.starts_with(VIDEO_PREFIX) {
        Some(InputKind::Video)
    } else {
        None
    }
}

/// Turns arbitrary inputs into [`Media`].
#[derive(Clone)]
pub struct InputClassifier {
    video: Arc<dyn VideoBackend>,
    extractor: FrameExtractor,
}

impl Default for InputClassifier {
    fn default() -> Self {
        Self::new(default_backend(), FrameExtractor::default())
    }
}

impl InputClassifier {
    pub fn new(video: Arc<dyn VideoBackend>, extractor: FrameExtractor) -> Self {
        Self { video, extractor }
    }

    #[tracing::instrument(name = "classify", skip_all, fields(fps = options.fps))]
    pub async fn classify<D>(
        &self,
        input: Option<&D>,
        options: &ClassifyOptions,
    ) -> Result<Media, MediaError>
    where
        D: InputDescriptor + ?Sized,
    {
        let input = input.ok_or(MediaError::MissingInput)?;

        let name = input.name();
        let declared_type = input.declared_type();
        let extension = input.extension();

        let kind = classify_kind(declared_type, &extension).ok_or_else(|| {
            MediaError::UnsupportedInputKind {
                name: name.to_string(),
            }
        })?;
        tracing::debug!(name, declared_type, ?kind, "Classified input");

        let bytes = input.read_bytes().await?;

        let media = match kind {
            InputKind::Stack => Media::Collection(load_stack(name, &bytes)?),
            InputKind::Image => Media::Single(MediaResource::decode(name, declared_type, bytes)?),
            InputKind::Video => Media::Collection(
                self.extractor
                    .extract_collection(self.video.as_ref(), name, bytes, options.fps)
                    .await?,
            ),
        };

        Ok(media)
    }
}

impl std::fmt::Debug for InputClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputClassifier")
            .field("extractor", &self.extractor)
            .finish_non_exhaustive()
    }
}
