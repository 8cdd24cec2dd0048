use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use media::{
    ClassifyOptions, FrameExtractor, InMemoryInput, InputClassifier, InputDescriptor, Media,
    MediaError, UnsupportedVideoBackend, VideoBackend, VideoMetadata, VideoSource,
};
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tiff::encoder::{TiffEncoder, colortype};

fn png(width: u32, height: u32) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([10, 20, 30])))
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

fn two_page_tiff() -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut buf).unwrap();
        for fill in [0u8, 200] {
            encoder
                .write_image::<colortype::RGB8>(3, 2, &[fill; 18])
                .unwrap();
        }
    }
    buf.into_inner()
}

/// Decoder that ignores the bytes and plays a fixed-length blank clip.
struct FixedLengthBackend {
    duration_secs: f64,
    opened: Arc<AtomicUsize>,
}

struct BlankClip {
    duration_secs: f64,
}

#[async_trait]
impl VideoBackend for FixedLengthBackend {
    async fn open(
        &self,
        _name: &str,
        _bytes: Arc<[u8]>,
    ) -> Result<Box<dyn VideoSource>, MediaError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(BlankClip {
            duration_secs: self.duration_secs,
        }))
    }
}

#[async_trait]
impl VideoSource for BlankClip {
    async fn metadata(&mut self) -> Result<VideoMetadata, MediaError> {
        Ok(VideoMetadata {
            duration_secs: self.duration_secs,
            width: 4,
            height: 4,
        })
    }

    async fn seek(&mut self, _seconds: f64) -> Result<(), MediaError> {
        Ok(())
    }

    async fn rasterize(&mut self) -> Result<RgbaImage, MediaError> {
        Ok(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255])))
    }
}

fn classifier_with_clip(duration_secs: f64) -> (InputClassifier, Arc<AtomicUsize>) {
    let opened = Arc::new(AtomicUsize::new(0));
    let backend = FixedLengthBackend {
        duration_secs,
        opened: Arc::clone(&opened),
    };
    let classifier = InputClassifier::new(
        Arc::new(backend),
        FrameExtractor::new(Duration::from_secs(1)),
    );
    (classifier, opened)
}

#[tokio::test]
async fn png_becomes_single_resource() {
    let input = InMemoryInput::new("cat.png", "image/png", png(6, 4));

    let media = InputClassifier::default()
        .classify(Some(&input), &ClassifyOptions::default())
        .await
        .unwrap();

    let resource = media.as_single().expect("PNG should classify as a single image");
    assert_eq!(resource.name(), "cat.png");
    assert_eq!(resource.extension(), "png");
    assert_eq!(resource.dimensions(), Some((6, 4)));
    assert!(resource.predictions().is_none());
}

#[tokio::test]
async fn tiff_is_a_stack_even_when_declared_as_image() {
    let input = InMemoryInput::new("scan.TIFF", "image/tiff", two_page_tiff());

    let media = InputClassifier::default()
        .classify(Some(&input), &ClassifyOptions::default())
        .await
        .unwrap();

    assert_eq!(media.kind_name(), "stack");
    let stack = media.as_collection().unwrap();
    assert_eq!(stack.page_count(), Some(2));
    assert_eq!(stack.frames()[1].name(), "scan.TIFF_page_1.png");
    assert_eq!(stack.frames()[1].dimensions(), Some((3, 2)));
}

#[tokio::test]
async fn pdf_is_rejected_by_name() {
    let input = InMemoryInput::new("report.pdf", "application/pdf", vec![0x25, 0x50, 0x44, 0x46]);

    let err = InputClassifier::default()
        .classify(Some(&input), &ClassifyOptions::default())
        .await
        .unwrap_err();

    match err {
        MediaError::UnsupportedInputKind { name } => assert_eq!(name, "report.pdf"),
        other => panic!("Expected UnsupportedInputKind, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_input_fails_first() {
    let err = InputClassifier::default()
        .classify::<InMemoryInput>(None, &ClassifyOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, MediaError::MissingInput));
}

#[tokio::test]
async fn video_is_sampled_into_frames() {
    let (classifier, opened) = classifier_with_clip(3.0);
    let input: Box<dyn InputDescriptor> =
        Box::new(InMemoryInput::new("walk.mp4", "video/mp4", vec![0u8; 16]));

    let media = classifier
        .classify(Some(input.as_ref()), &ClassifyOptions { fps: 2.0 })
        .await
        .unwrap();

    assert_eq!(opened.load(Ordering::SeqCst), 1);
    let Media::Collection(video) = media else {
        panic!("Video should classify as a collection");
    };
    assert_eq!(video.fps(), Some(2.0));
    assert_eq!(video.source_name(), "walk.mp4");

    let timestamps: Vec<f64> = video.frames().iter().filter_map(|f| f.timestamp()).collect();
    assert_eq!(timestamps, vec![0.0, 0.5, 1.0, 1.5, 2.0, 2.5]);
    assert_eq!(video.frames()[5].name(), "walk.mp4_frame_5.png");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn classification_runs_on_spawned_tasks() {
    let (classifier, opened) = classifier_with_clip(2.0);
    let classifier = Arc::new(classifier);

    let image = {
        let classifier = Arc::clone(&classifier);
        let input = InMemoryInput::new("cat.png", "image/png", png(2, 2));
        tokio::spawn(async move {
            classifier
                .classify(Some(&input), &ClassifyOptions::default())
                .await
        })
    };
    let video = {
        let classifier = Arc::clone(&classifier);
        let input = InMemoryInput::new("walk.mp4", "video/mp4", vec![0u8; 16]);
        tokio::spawn(async move {
            classifier
                .classify(Some(&input), &ClassifyOptions::default())
                .await
        })
    };

    let image = image.await.unwrap().unwrap();
    let video = video.await.unwrap().unwrap();

    assert_eq!(image.kind_name(), "image");
    assert_eq!(video.len(), 2);
    assert_eq!(opened.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn video_without_decoder_reports_backend_error() {
    let classifier = InputClassifier::new(
        Arc::new(UnsupportedVideoBackend),
        FrameExtractor::default(),
    );
    let input = InMemoryInput::new("walk.mp4", "video/mp4", vec![0u8; 16]);

    let err = classifier
        .classify(Some(&input), &ClassifyOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, MediaError::Video(_)));
}
