mod extractor;
#[cfg(feature = "ffmpeg")]
mod ffmpeg;

pub use extractor::{
    DEFAULT_EXTRACTION_TIMEOUT, Extraction, ExtractionState, FrameExtractor, MAX_FRAMES,
};
#[cfg(feature = "ffmpeg")]
pub use ffmpeg::FfmpegVideoBackend;

use crate::errors::MediaError;
use async_trait::async_trait;
use image::RgbaImage;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoMetadata {
    pub duration_secs: f64,
    pub width: u32,
    pub height: u32,
}

/// One open decode cursor over a video.
///
/// A source serves one request at a time: `seek` must complete before the next
/// `seek` or `rasterize` is issued. Dropping the source releases everything it holds.
#[async_trait]
pub trait VideoSource: Send {
    /// Resolves once the container reports its duration.
    async fn metadata(&mut self) -> Result<VideoMetadata, MediaError>;

    /// Move the cursor so the visible frame is the one shown at `seconds`.
    async fn seek(&mut self, seconds: f64) -> Result<(), MediaError>;

    /// Copy the visible frame onto a fresh surface at native resolution.
    async fn rasterize(&mut self) -> Result<RgbaImage, MediaError>;
}

#[async_trait]
pub trait VideoBackend: Send + Sync {
    async fn open(&self, name: &str, bytes: Arc<[u8]>) -> Result<Box<dyn VideoSource>, MediaError>;
}

/// Backend used when no decoder is compiled in.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedVideoBackend;

#[async_trait]
impl VideoBackend for UnsupportedVideoBackend {
    async fn open(
        &self,
        name: &str,
        _bytes: Arc<[u8]>,
    ) -> Result<Box<dyn VideoSource>, MediaError> {
        Err(MediaError::Video(format!(
            "no video decoder available for {name} (build with the `ffmpeg` feature)"
        )))
    }
}

/// The decoder this build ships with.
pub fn default_backend() -> Arc<dyn VideoBackend> {
    #[cfg(feature = "ffmpeg")]
    {
        Arc::new(FfmpegVideoBackend::default())
    }
    #[cfg(not(feature = "ffmpeg"))]
    {
        Arc::new(UnsupportedVideoBackend)
    }
}

/// Number of frames sampled from `duration_secs` of video at `fps`.
///
/// Non-positive or non-finite inputs sample nothing.
pub fn frame_count(duration_secs: f64, fps: f64) -> usize {
    if !(fps > 0.0 && duration_secs > 0.0) || !fps.is_finite() || !duration_secs.is_finite() {
        return 0;
    }
    (duration_secs * fps).floor() as usize
}
