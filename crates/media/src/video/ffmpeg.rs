use super::{VideoBackend, VideoMetadata, VideoSource};
use crate::errors::MediaError;
use async_trait::async_trait;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling;
use image::RgbaImage;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::NamedTempFile;

/// Frames whose timestamp lies within this distance before a target count as reached.
const SEEK_TOLERANCE_SECS: f64 = 1e-3;

/// libav-backed decoder. Bytes are spilled to a temporary file that lives as long
/// as the source opened on it.
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegVideoBackend;

#[async_trait]
impl VideoBackend for FfmpegVideoBackend {
    async fn open(&self, name: &str, bytes: Arc<[u8]>) -> Result<Box<dyn VideoSource>, MediaError> {
        let owned_name = name.to_string();
        let state = tokio::task::spawn_blocking(move || DecoderState::open(&owned_name, &bytes))
            .await
            .map_err(|e| MediaError::Video(format!("decoder task failed: {e}")))??;

        tracing::debug!(
            name,
            width = state.width,
            height = state.height,
            duration = state.duration_secs,
            "Opened video"
        );

        Ok(Box::new(FfmpegSource {
            name: name.to_string(),
            state: Some(state),
        }))
    }
}

struct FfmpegSource {
    name: String,
    state: Option<DecoderState>,
}

/// Raises its flag when dropped, so blocking work outlives an abandoned caller
/// only until its next check.
struct CancelOnDrop(Arc<AtomicBool>);

impl CancelOnDrop {
    fn new() -> (Self, Arc<AtomicBool>) {
        let flag = Arc::new(AtomicBool::new(false));
        (Self(Arc::clone(&flag)), flag)
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

impl FfmpegSource {
    /// Run `op` on the blocking pool with exclusive ownership of the decoder.
    ///
    /// A blocking task cannot be aborted. If this future is dropped (a timed out
    /// seek, say) the closure keeps the decoder and its temp file until `op`
    /// returns; long-running ops poll the flag they are handed and bail out early.
    /// The source is unusable afterwards since the state never comes back.
    async fn with_state<T, F>(&mut self, op: F) -> Result<T, MediaError>
    where
        T: Send + 'static,
        F: FnOnce(&mut DecoderState, &AtomicBool) -> Result<T, MediaError> + Send + 'static,
    {
        let mut state = self
            .state
            .take()
            .ok_or_else(|| MediaError::Video(format!("{} decoder lost after a failed call", self.name)))?;

        let (_guard, cancelled) = CancelOnDrop::new();
        let (state, result) = tokio::task::spawn_blocking(move || {
            let result = op(&mut state, &cancelled);
            (state, result)
        })
        .await
        .map_err(|e| MediaError::Video(format!("decoder task failed: {e}")))?;

        self.state = Some(state);
        result
    }
}

#[async_trait]
impl VideoSource for FfmpegSource {
    async fn metadata(&mut self) -> Result<VideoMetadata, MediaError> {
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| MediaError::Video(format!("{} decoder lost after a failed call", self.name)))?;

        Ok(VideoMetadata {
            duration_secs: state.duration_secs,
            width: state.width,
            height: state.height,
        })
    }

    async fn seek(&mut self, seconds: f64) -> Result<(), MediaError> {
        self.with_state(move |state, cancelled| state.seek_to(seconds, cancelled))
            .await
    }

    async fn rasterize(&mut self) -> Result<RgbaImage, MediaError> {
        self.with_state(|state, _| state.rasterize()).await
    }
}

struct DecoderState {
    input: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    video_stream_index: usize,
    time_base_f64: f64,
    src_format: Pixel,
    width: u32,
    height: u32,
    duration_secs: f64,
    current: Option<ffmpeg_next::frame::Video>,
    // Dropped after the input context that reads from it
    _file: NamedTempFile,
}

// SAFETY: the libav contexts hold raw pointers but are only ever touched by the
// one task that currently owns the state; ownership moves, it is never shared.
unsafe impl Send for DecoderState {}

impl DecoderState {
    fn open(name: &str, bytes: &[u8]) -> Result<Self, MediaError> {
        ffmpeg_next::init().map_err(|e| MediaError::Video(format!("failed to initialize FFmpeg: {e}")))?;

        let mut file = NamedTempFile::new()?;
        file.write_all(bytes)?;
        file.flush()?;

        let input = ffmpeg_next::format::input(file.path())
            .map_err(|e| MediaError::decode(name, format!("failed to open video: {e}")))?;

        let stream = input
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| MediaError::decode(name, "no video stream found"))?;
        let video_stream_index = stream.index();

        let time_base = stream.time_base();
        let time_base_f64 = f64::from(time_base.numerator()) / f64::from(time_base.denominator());

        let context = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| MediaError::decode(name, format!("failed to create codec context: {e}")))?;
        let decoder = context
            .decoder()
            .video()
            .map_err(|e| MediaError::decode(name, format!("failed to create video decoder: {e}")))?;

        // Unknown durations surface as NaN and are rejected by the extractor
        let duration_secs = if input.duration() > 0 {
            input.duration() as f64 / f64::from(ffmpeg_next::ffi::AV_TIME_BASE)
        } else {
            f64::NAN
        };

        Ok(Self {
            width: decoder.width(),
            height: decoder.height(),
            src_format: decoder.format(),
            input,
            decoder,
            video_stream_index,
            time_base_f64,
            duration_secs,
            current: None,
            _file: file,
        })
    }

    /// Seek to the keyframe before `target`, then decode forward to the first
    /// frame shown at or after it. Past the last frame, the last frame stays visible.
    /// Stops between packets once `cancelled` is raised.
    fn seek_to(&mut self, target: f64, cancelled: &AtomicBool) -> Result<(), MediaError> {
        let timestamp = (target * f64::from(ffmpeg_next::ffi::AV_TIME_BASE)) as i64;
        self.input
            .seek(timestamp, ..timestamp)
            .map_err(|e| MediaError::Video(format!("seek to {target}s failed: {e}")))?;
        self.decoder.flush();

        let mut frame = ffmpeg_next::frame::Video::empty();
        let mut last = None;

        for (stream, packet) in self.input.packets() {
            if cancelled.load(Ordering::Relaxed) {
                return Err(MediaError::Video(format!("seek to {target}s abandoned")));
            }
            if stream.index() != self.video_stream_index {
                continue;
            }
            self.decoder
                .send_packet(&packet)
                .map_err(|e| MediaError::Video(format!("packet send failed: {e}")))?;

            while self.decoder.receive_frame(&mut frame).is_ok() {
                let shown_at = frame
                    .timestamp()
                    .map(|pts| pts as f64 * self.time_base_f64)
                    .unwrap_or(target);
                let reached = shown_at + SEEK_TOLERANCE_SECS >= target;
                last = Some(std::mem::replace(&mut frame, ffmpeg_next::frame::Video::empty()));

                if reached {
                    self.current = last;
                    return Ok(());
                }
            }
        }

        let _ = self.decoder.send_eof();
        while self.decoder.receive_frame(&mut frame).is_ok() {
            last = Some(std::mem::replace(&mut frame, ffmpeg_next::frame::Video::empty()));
        }

        match last {
            Some(frame) => {
                self.current = Some(frame);
                Ok(())
            }
            None => Err(MediaError::Video(format!("no frame decodable at {target}s"))),
        }
    }

    fn rasterize(&mut self) -> Result<RgbaImage, MediaError> {
        let decoded = self
            .current
            .as_ref()
            .ok_or_else(|| MediaError::Video("rasterize called before a seek".to_string()))?;

        let mut scaler = scaling::Context::get(
            self.src_format,
            self.width,
            self.height,
            Pixel::RGBA,
            self.width,
            self.height,
            scaling::Flags::BILINEAR,
        )
        .map_err(|e| MediaError::Video(format!("failed to create scaler: {e}")))?;

        let mut rgba = ffmpeg_next::frame::Video::empty();
        scaler
            .run(decoded, &mut rgba)
            .map_err(|e| MediaError::Video(format!("scaling failed: {e}")))?;

        let data = rgba.data(0);
        let stride = rgba.stride(0);
        let row_len = (self.width * 4) as usize;

        let mut pixels = Vec::with_capacity(row_len * self.height as usize);
        for y in 0..self.height as usize {
            let start = y * stride;
            pixels.extend_from_slice(&data[start..start + row_len]);
        }

        RgbaImage::from_raw(self.width, self.height, pixels)
            .ok_or_else(|| MediaError::Video("scaled frame has unexpected size".to_string()))
    }
}
