use super::{VideoBackend, VideoSource, frame_count};
use crate::collection::MediaCollection;
use crate::errors::MediaError;
use crate::resource::MediaResource;
use common::wait_with_timeout;
use image::DynamicImage;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

pub const DEFAULT_EXTRACTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on frames one extraction may sample.
pub const MAX_FRAMES: usize = 1 << 20;

// Frame storage grows past this as frames arrive.
const INITIAL_FRAME_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionState {
    Idle,
    AwaitingMetadata,
    Seeking(usize),
    Rasterizing(usize),
    Done,
    Aborted,
}

impl ExtractionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExtractionState::Done | ExtractionState::Aborted)
    }
}

/// Samples a video at a fixed rate by seeking to each timestamp in turn.
#[derive(Debug, Clone, Copy)]
pub struct FrameExtractor {
    metadata_timeout: Duration,
    step_timeout: Duration,
}

impl Default for FrameExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_EXTRACTION_TIMEOUT)
    }
}

impl FrameExtractor {
    /// Same bound for the metadata wait and for every seek and rasterization.
    pub fn new(timeout: Duration) -> Self {
        Self::with_timeouts(timeout, timeout)
    }

    pub fn with_timeouts(metadata_timeout: Duration, step_timeout: Duration) -> Self {
        Self {
            metadata_timeout,
            step_timeout,
        }
    }

    pub fn start(&self, source: Box<dyn VideoSource>, name: &str, fps: f64) -> Extraction {
        Extraction {
            source: Some(source),
            name: name.to_string(),
            fps,
            metadata_timeout: self.metadata_timeout,
            step_timeout: self.step_timeout,
            state: ExtractionState::Idle,
            total: 0,
            frames: Vec::new(),
        }
    }

    pub async fn extract_frames(
        &self,
        source: Box<dyn VideoSource>,
        name: &str,
        fps: f64,
    ) -> Result<Vec<MediaResource>, MediaError> {
        self.start(source, name, fps).drive().await
    }

    /// Open `bytes` with `backend` and sample it into a video collection.
    #[tracing::instrument(name = "extract_collection", skip_all, fields(video = %name, fps))]
    pub async fn extract_collection(
        &self,
        backend: &dyn VideoBackend,
        name: &str,
        bytes: Arc<[u8]>,
        fps: f64,
    ) -> Result<MediaCollection, MediaError> {
        let source = backend.open(name, bytes).await?;
        let frames = self.extract_frames(source, name, fps).await?;

        tracing::debug!(name, fps, frames = frames.len(), "Extracted video frames");
        Ok(MediaCollection::video(name, fps, frames))
    }
}

/// A running extraction over one video source.
///
/// The source is released as soon as the extraction reaches `Done` or `Aborted`,
/// and on drop if it never got there.
pub struct Extraction {
    source: Option<Box<dyn VideoSource>>,
    name: String,
    fps: f64,
    metadata_timeout: Duration,
    step_timeout: Duration,
    state: ExtractionState,
    total: usize,
    frames: Vec<MediaResource>,
}

impl Extraction {
    pub fn state(&self) -> ExtractionState {
        self.state
    }

    /// Frames the video yields at this rate; known once metadata has arrived.
    pub fn total_frames(&self) -> usize {
        self.total
    }

    pub fn frames(&self) -> &[MediaResource] {
        &self.frames
    }

    /// Run until a terminal state and hand back the frames in index order.
    pub async fn drive(mut self) -> Result<Vec<MediaResource>, MediaError> {
        while !self.state.is_terminal() {
            self.step().await?;
        }

        Ok(std::mem::take(&mut self.frames))
    }

    /// Perform one transition. Any failure aborts the extraction before it is returned.
    pub async fn step(&mut self) -> Result<ExtractionState, MediaError> {
        match self.advance().await {
            Ok(next) => {
                self.transition(next);
                Ok(next)
            }
            Err(err) => {
                tracing::warn!(name = %self.name, state = ?self.state, error = %err, "Frame extraction failed");
                self.abort();
                Err(err)
            }
        }
    }

    pub fn abort(&mut self) {
        if self.state != ExtractionState::Aborted {
            self.transition(ExtractionState::Aborted);
        }
    }

    async fn advance(&mut self) -> Result<ExtractionState, MediaError> {
        match self.state {
            ExtractionState::Idle => Ok(ExtractionState::AwaitingMetadata),
            ExtractionState::AwaitingMetadata => {
                let timeout = self.metadata_timeout;
                let source = self.source_mut()?;
                let metadata = wait_with_timeout(source.metadata(), timeout, "video metadata").await??;

                if !metadata.duration_secs.is_finite() {
                    return Err(MediaError::Video(format!(
                        "{} reports no finite duration",
                        self.name
                    )));
                }

                let total = frame_count(metadata.duration_secs, self.fps);
                if total > MAX_FRAMES {
                    return Err(MediaError::Video(format!(
                        "{} at {} fps yields more than {MAX_FRAMES} frames",
                        self.name, self.fps
                    )));
                }

                self.total = total;
                self.frames.reserve(total.min(INITIAL_FRAME_CAPACITY));
                tracing::debug!(
                    name = %self.name,
                    duration = metadata.duration_secs,
                    fps = self.fps,
                    total = self.total,
                    "Video metadata ready"
                );

                Ok(self.after_frame(0))
            }
            ExtractionState::Seeking(i) => {
                let target = self.timestamp(i);
                let timeout = self.step_timeout;
                let source = self.source_mut()?;

                wait_with_timeout(source.seek(target), timeout, &format!("seek to {target}s"))
                    .instrument(tracing::debug_span!("seek", frame = i))
                    .await??;

                Ok(ExtractionState::Rasterizing(i))
            }
            ExtractionState::Rasterizing(i) => {
                let target = self.timestamp(i);
                let timeout = self.step_timeout;
                let source = self.source_mut()?;

                let surface = wait_with_timeout(
                    source.rasterize(),
                    timeout,
                    &format!("frame {i} rasterization"),
                )
                .instrument(tracing::debug_span!("rasterize", frame = i))
                .await??;

                let frame = MediaResource::from_raster(
                    format!("{}_frame_{i}.png", self.name),
                    DynamicImage::ImageRgba8(surface),
                )?
                .with_timestamp(target);

                tracing::trace!(frame = i, timestamp = target, "Frame rasterized");
                self.frames.push(frame);

                Ok(self.after_frame(i + 1))
            }
            terminal @ (ExtractionState::Done | ExtractionState::Aborted) => Ok(terminal),
        }
    }

    fn after_frame(&self, next: usize) -> ExtractionState {
        if next < self.total {
            ExtractionState::Seeking(next)
        } else {
            ExtractionState::Done
        }
    }

    fn timestamp(&self, index: usize) -> f64 {
        index as f64 / self.fps
    }

    fn source_mut(&mut self) -> Result<&mut Box<dyn VideoSource>, MediaError> {
        self.source
            .as_mut()
            .ok_or_else(|| MediaError::Video(format!("{} source already released", self.name)))
    }

    fn transition(&mut self, next: ExtractionState) {
        if next == self.state {
            return;
        }
        tracing::trace!(name = %self.name, from = ?self.state, to = ?next, "Extraction state changed");
        self.state = next;

        if next.is_terminal() && self.source.take().is_some() {
            tracing::debug!(name = %self.name, state = ?next, "Video source released");
        }
    }
}

impl Drop for Extraction {
    fn drop(&mut self) {
        if self.source.is_some() {
            self.abort();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::video::VideoMetadata;
    use async_trait::async_trait;
    use image::{Rgba, RgbaImage};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory video whose frame at `t` is filled with red = `t * 10`.
    pub(crate) struct MockSource {
        pub duration: Option<f64>,
        pub hang_on_seek: Option<usize>,
        pub position: f64,
        pub seeks: Arc<Mutex<Vec<f64>>>,
        pub drops: Arc<AtomicUsize>,
    }

    impl MockSource {
        pub(crate) fn new(duration: f64) -> Self {
            Self {
                duration: Some(duration),
                hang_on_seek: None,
                position: 0.0,
                seeks: Arc::default(),
                drops: Arc::default(),
            }
        }
    }

    #[async_trait]
    impl VideoSource for MockSource {
        async fn metadata(&mut self) -> Result<VideoMetadata, MediaError> {
            match self.duration {
                Some(duration_secs) => Ok(VideoMetadata {
                    duration_secs,
                    width: 2,
                    height: 2,
                }),
                None => std::future::pending().await,
            }
        }

        async fn seek(&mut self, seconds: f64) -> Result<(), MediaError> {
            let index = self.seeks.lock().unwrap().len();
            if self.hang_on_seek == Some(index) {
                std::future::pending::<()>().await;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.seeks.lock().unwrap().push(seconds);
            self.position = seconds;
            Ok(())
        }

        async fn rasterize(&mut self) -> Result<RgbaImage, MediaError> {
            let red = (self.position * 10.0).round() as u8;
            Ok(RgbaImage::from_pixel(2, 2, Rgba([red, 0, 0, 255])))
        }
    }

    impl Drop for MockSource {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn samples_at_requested_rate() {
        let source = MockSource::new(3.0);
        let seeks = Arc::clone(&source.seeks);
        let drops = Arc::clone(&source.drops);

        let frames = FrameExtractor::default()
            .extract_frames(Box::new(source), "clip.mp4", 2.0)
            .await
            .unwrap();

        assert_eq!(frames.len(), 6);
        let timestamps: Vec<f64> = frames.iter().map(|f| f.timestamp().unwrap()).collect();
        assert_eq!(timestamps, vec![0.0, 0.5, 1.0, 1.5, 2.0, 2.5]);
        assert_eq!(*seeks.lock().unwrap(), timestamps, "Seeks must be issued in order");

        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.name(), format!("clip.mp4_frame_{i}.png"));
            assert_eq!(frame.media_type(), "image/png");
            let red = frame.decoded().unwrap().to_rgba8().get_pixel(0, 0).0[0];
            assert_eq!(red, (i * 5) as u8);
        }

        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn walks_through_every_state() {
        let source = MockSource::new(1.0);
        let mut extraction = FrameExtractor::default().start(Box::new(source), "clip.mp4", 2.0);

        let mut seen = vec![extraction.state()];
        while !extraction.state().is_terminal() {
            seen.push(extraction.step().await.unwrap());
        }

        assert_eq!(
            seen,
            vec![
                ExtractionState::Idle,
                ExtractionState::AwaitingMetadata,
                ExtractionState::Seeking(0),
                ExtractionState::Rasterizing(0),
                ExtractionState::Seeking(1),
                ExtractionState::Rasterizing(1),
                ExtractionState::Done,
            ]
        );
        assert_eq!(extraction.total_frames(), 2);
        assert_eq!(extraction.frames().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn short_video_yields_no_frames() {
        let source = MockSource::new(0.4);
        let drops = Arc::clone(&source.drops);

        let frames = FrameExtractor::default()
            .extract_frames(Box::new(source), "blip.mp4", 2.0)
            .await
            .unwrap();

        assert!(frames.is_empty());
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_metadata_times_out_and_releases() {
        let mut source = MockSource::new(0.0);
        source.duration = None;
        let drops = Arc::clone(&source.drops);

        let extractor = FrameExtractor::new(Duration::from_millis(200));
        let mut extraction = extractor.start(Box::new(source), "stuck.mp4", 1.0);

        extraction.step().await.unwrap();
        let err = extraction.step().await.unwrap_err();

        match err {
            MediaError::ExtractionTimeout { stage, timeout } => {
                assert_eq!(stage, "video metadata");
                assert_eq!(timeout, Duration::from_millis(200));
            }
            other => panic!("Expected ExtractionTimeout, got {other:?}"),
        }
        assert_eq!(extraction.state(), ExtractionState::Aborted);
        assert_eq!(drops.load(Ordering::SeqCst), 1);

        drop(extraction);
        assert_eq!(drops.load(Ordering::SeqCst), 1, "Source must be released exactly once");
    }

    #[tokio::test(start_paused = true)]
    async fn hung_seek_times_out() {
        let mut source = MockSource::new(5.0);
        source.hang_on_seek = Some(2);
        let drops = Arc::clone(&source.drops);

        let err = FrameExtractor::with_timeouts(Duration::from_secs(1), Duration::from_millis(50))
            .extract_frames(Box::new(source), "clip.mp4", 1.0)
            .await
            .unwrap_err();

        assert!(
            matches!(&err, MediaError::ExtractionTimeout { stage, .. } if stage == "seek to 2s"),
            "unexpected error: {err:?}"
        );
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn infinite_duration_is_rejected() {
        let source = MockSource::new(f64::INFINITY);
        let err = FrameExtractor::default()
            .extract_frames(Box::new(source), "live.mp4", 1.0)
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::Video(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn excessive_frame_rate_is_rejected_without_sampling() {
        let source = MockSource::new(10.0);
        let seeks = Arc::clone(&source.seeks);
        let drops = Arc::clone(&source.drops);

        let err = FrameExtractor::default()
            .extract_frames(Box::new(source), "clip.mp4", 1e18)
            .await
            .unwrap_err();

        match err {
            MediaError::Video(msg) => assert!(msg.contains("clip.mp4"), "unexpected message: {msg}"),
            other => panic!("Expected Video error, got {other:?}"),
        }
        assert!(seeks.lock().unwrap().is_empty());
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn frame_ceiling_is_inclusive() {
        let source = MockSource::new(1.0);
        let mut extraction =
            FrameExtractor::default().start(Box::new(source), "clip.mp4", MAX_FRAMES as f64);

        extraction.step().await.unwrap();
        assert_eq!(extraction.step().await.unwrap(), ExtractionState::Seeking(0));
        assert_eq!(extraction.total_frames(), MAX_FRAMES);
    }

    #[tokio::test(start_paused = true)]
    async fn extraction_runs_on_a_spawned_task() {
        let source = MockSource::new(2.0);
        let handle = tokio::spawn(async move {
            FrameExtractor::default()
                .extract_frames(Box::new(source), "clip.mp4", 1.0)
                .await
        });

        let frames = handle.await.unwrap().unwrap();
        assert_eq!(frames.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_midway_releases_source() {
        let source = MockSource::new(3.0);
        let drops = Arc::clone(&source.drops);

        let mut extraction = FrameExtractor::default().start(Box::new(source), "clip.mp4", 1.0);
        extraction.step().await.unwrap();
        extraction.step().await.unwrap();
        assert_eq!(extraction.state(), ExtractionState::Seeking(0));

        drop(extraction);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}
