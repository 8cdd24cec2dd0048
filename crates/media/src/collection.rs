use crate::resource::MediaResource;
use futures_util::{StreamExt, TryStreamExt, stream};
use std::future::Future;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CollectionKind {
    /// Frames sampled from a video at `fps` frames per second.
    Video { fps: f64 },
    /// Pages of a multi-page image file.
    Stack { page_count: usize },
}

/// Ordered frames sharing one originating input.
#[derive(Debug, Clone)]
pub struct MediaCollection {
    source_name: String,
    kind: CollectionKind,
    frames: Vec<MediaResource>,
}

impl MediaCollection {
    pub fn video(source_name: impl Into<String>, fps: f64, frames: Vec<MediaResource>) -> Self {
        Self {
            source_name: source_name.into(),
            kind: CollectionKind::Video { fps },
            frames,
        }
    }

    pub fn stack(source_name: impl Into<String>, frames: Vec<MediaResource>) -> Self {
        Self {
            source_name: source_name.into(),
            kind: CollectionKind::Stack {
                page_count: frames.len(),
            },
            frames,
        }
    }

    /// Same kind and metadata, different frames.
    pub fn with_frames(&self, frames: Vec<MediaResource>) -> Self {
        Self {
            source_name: self.source_name.clone(),
            kind: self.kind,
            frames,
        }
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn kind(&self) -> CollectionKind {
        self.kind
    }

    pub fn fps(&self) -> Option<f64> {
        match self.kind {
            CollectionKind::Video { fps } => Some(fps),
            CollectionKind::Stack { .. } => None,
        }
    }

    pub fn page_count(&self) -> Option<usize> {
        match self.kind {
            CollectionKind::Stack { page_count } => Some(page_count),
            CollectionKind::Video { .. } => None,
        }
    }

    pub fn frames(&self) -> &[MediaResource] {
        &self.frames
    }

    pub fn frames_mut(&mut self) -> &mut [MediaResource] {
        &mut self.frames
    }

    pub fn into_frames(self) -> Vec<MediaResource> {
        self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Run `op` on every frame with at most `max_in_flight` calls pending
    /// (all of them when `None`). Results come back in frame order no matter
    /// which call finishes first.
    pub async fn run_on_each<F, Fut>(&self, max_in_flight: Option<usize>, op: F) -> Vec<Fut::Output>
    where
        F: FnMut(MediaResource) -> Fut,
        Fut: Future,
    {
        stream::iter(self.frames.iter().cloned().map(op))
            .buffered(self.in_flight_limit(max_in_flight))
            .collect()
            .await
    }

    /// Like [`run_on_each`](Self::run_on_each) but stops at the first error,
    /// dropping every call still pending.
    pub async fn try_run_on_each<F, Fut, T, E>(
        &self,
        max_in_flight: Option<usize>,
        op: F,
    ) -> Result<Vec<T>, E>
    where
        F: FnMut(MediaResource) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        stream::iter(self.frames.iter().cloned().map(op))
            .buffered(self.in_flight_limit(max_in_flight))
            .try_collect()
            .await
    }

    fn in_flight_limit(&self, max_in_flight: Option<usize>) -> usize {
        max_in_flight.unwrap_or(self.frames.len()).max(1)
    }
}

/// A single image or a collection of frames; downstream code matches on this
/// instead of asking what concrete kind of input it was handed.
#[derive(Debug, Clone)]
pub enum Media {
    Single(MediaResource),
    Collection(MediaCollection),
}

impl Media {
    pub fn len(&self) -> usize {
        match self {
            Media::Single(_) => 1,
            Media::Collection(c) => c.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Media::Single(_) => "image",
            Media::Collection(c) => match c.kind() {
                CollectionKind::Video { .. } => "video",
                CollectionKind::Stack { .. } => "stack",
            },
        }
    }

    /// Every resource in order.
    pub fn resources(&self) -> &[MediaResource] {
        match self {
            Media::Single(r) => std::slice::from_ref(r),
            Media::Collection(c) => c.frames(),
        }
    }

    pub fn as_single(&self) -> Option<&MediaResource> {
        match self {
            Media::Single(r) => Some(r),
            Media::Collection(_) => None,
        }
    }

    pub fn as_collection(&self) -> Option<&MediaCollection> {
        match self {
            Media::Collection(c) => Some(c),
            Media::Single(_) => None,
        }
    }
}

impl From<MediaResource> for Media {
    fn from(resource: MediaResource) -> Self {
        Media::Single(resource)
    }
}

impl From<MediaCollection> for Media {
    fn from(collection: MediaCollection) -> Self {
        Media::Collection(collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::tests::png_bytes;
    use std::time::Duration;

    fn frames(n: usize) -> Vec<MediaResource> {
        (0..n)
            .map(|i| {
                MediaResource::new(
                    format!("clip.mp4_frame_{i}.png"),
                    "image/png",
                    png_bytes(1, 1, [i as u8, 0, 0]),
                    Some((1, 1)),
                )
                .unwrap()
            })
            .collect()
    }

    #[test]
    fn with_frames_keeps_metadata() {
        let video = MediaCollection::video("clip.mp4", 2.0, frames(3));
        let rebuilt = video.with_frames(frames(3));

        assert_eq!(rebuilt.source_name(), "clip.mp4");
        assert_eq!(rebuilt.fps(), Some(2.0));
        assert_eq!(rebuilt.page_count(), None);
    }

    #[test]
    fn stack_counts_pages() {
        let stack = MediaCollection::stack("scan.tiff", frames(4));
        assert_eq!(stack.page_count(), Some(4));
        assert_eq!(Media::from(stack).kind_name(), "stack");
    }

    #[test]
    fn media_exposes_resources_uniformly() {
        let single = Media::from(frames(1).remove(0));
        assert_eq!(single.len(), 1);
        assert_eq!(single.resources().len(), 1);
        assert_eq!(single.kind_name(), "image");

        let video = Media::from(MediaCollection::video("clip.mp4", 1.0, frames(5)));
        assert_eq!(video.len(), 5);
        assert_eq!(video.resources()[4].name(), "clip.mp4_frame_4.png");
    }

    #[tokio::test(start_paused = true)]
    async fn run_on_each_preserves_order_under_reverse_completion() {
        let video = MediaCollection::video("clip.mp4", 1.0, frames(5));

        // Later frames finish first
        let names = video
            .run_on_each(None, |frame| async move {
                let idx: u64 = frame
                    .name()
                    .trim_start_matches("clip.mp4_frame_")
                    .trim_end_matches(".png")
                    .parse()
                    .unwrap();
                tokio::time::sleep(Duration::from_millis(100 - idx * 20)).await;
                frame.name().to_string()
            })
            .await;

        let expected: Vec<String> = (0..5).map(|i| format!("clip.mp4_frame_{i}.png")).collect();
        assert_eq!(names, expected);
    }

    #[tokio::test]
    async fn try_run_on_each_stops_on_error() {
        let video = MediaCollection::video("clip.mp4", 1.0, frames(3));

        let result: Result<Vec<String>, String> = video
            .try_run_on_each(Some(1), |frame| async move {
                if frame.name().ends_with("_1.png") {
                    Err(format!("{} failed", frame.name()))
                } else {
                    Ok(frame.name().to_string())
                }
            })
            .await;

        assert_eq!(result.unwrap_err(), "clip.mp4_frame_1.png failed");
    }

    #[tokio::test]
    async fn empty_collection_runs_nothing() {
        let video = MediaCollection::video("clip.mp4", 1.0, Vec::new());
        let out: Vec<()> = video.run_on_each(Some(4), |_| async {}).await;
        assert!(out.is_empty());
    }
}
