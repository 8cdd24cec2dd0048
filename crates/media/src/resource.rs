use crate::cache::CacheSlot;
use crate::errors::MediaError;
use crate::prediction::{Prediction, Predictions};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use common::span_debug;
use image::{DynamicImage, ImageFormat, ImageReader};
use ndarray::Array4;
use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

pub const IMAGE_PREFIX: &str = "image/";
pub const VIDEO_PREFIX: &str = "video/";

/// Identifies one tensor layout computed from a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TensorKey {
    pub width: u32,
    pub height: u32,
    pub normalize: bool,
}

#[derive(Clone)]
struct CachedTensor {
    key: TensorKey,
    tensor: Arc<Array4<f32>>,
}

/// One decodable still image plus everything derived from it.
///
/// Raw bytes are only ever replaced wholesale through [`MediaResource::replace_bytes`],
/// which bumps the generation and drops every derived value.
pub struct MediaResource {
    bytes: Arc<[u8]>,
    media_type: String,
    name: String,
    extension: String,
    dimensions: Option<(u32, u32)>,
    timestamp: Option<f64>,
    predictions: Option<Arc<Predictions>>,
    generation: u64,
    decoded: CacheSlot<Arc<DynamicImage>>,
    tensor: CacheSlot<CachedTensor>,
    preview: CacheSlot<Arc<str>>,
}

impl MediaResource {
    /// Wrap bytes whose dimensions are already known (or unknown).
    pub fn new(
        name: impl Into<String>,
        media_type: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
        dimensions: Option<(u32, u32)>,
    ) -> Result<Self, MediaError> {
        let media_type = media_type.into();
        if !media_type.starts_with(IMAGE_PREFIX) {
            return Err(MediaError::InvalidMediaType { media_type });
        }

        let name = name.into();
        let extension = extension_of(&name);

        Ok(Self {
            bytes: bytes.into(),
            media_type,
            name,
            extension,
            dimensions,
            timestamp: None,
            predictions: None,
            generation: 0,
            decoded: CacheSlot::new(),
            tensor: CacheSlot::new(),
            preview: CacheSlot::new(),
        })
    }

    /// Wrap encoded image bytes, probing the header for dimensions.
    pub fn decode(
        name: impl Into<String>,
        media_type: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Result<Self, MediaError> {
        let mut resource = Self::new(name, media_type, bytes, None)?;
        let _s = span_debug!("probe_dimensions");

        let dims = ImageReader::new(Cursor::new(&resource.bytes[..]))
            .with_guessed_format()?
            .into_dimensions()
            .map_err(|e| MediaError::decode(&resource.name, e))?;

        resource.dimensions = Some(dims);
        Ok(resource)
    }

    /// Encode a rasterized surface as PNG and wrap it, seeding the decode cache.
    pub fn from_raster(name: impl Into<String>, raster: DynamicImage) -> Result<Self, MediaError> {
        let name = name.into();
        let bytes = encode(&raster, ImageFormat::Png).map_err(|e| MediaError::encode(&name, e))?;
        let dims = (raster.width(), raster.height());

        let resource = Self::new(name, "image/png", bytes, Some(dims))?;
        resource.decoded.store(resource.generation, Arc::new(raster));
        Ok(resource)
    }

    pub fn with_timestamp(mut self, seconds: f64) -> Self {
        self.timestamp = Some(seconds);
        self
    }

    /// A new value carrying `predictions`; bytes are shared, caches are copied.
    pub fn with_predictions(&self, predictions: Predictions) -> Self {
        let mut next = self.clone();
        next.predictions = Some(Arc::new(predictions));
        next
    }

    pub fn bytes(&self) -> &Arc<[u8]> {
        &self.bytes
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.dimensions
    }

    pub fn width(&self) -> Option<u32> {
        self.dimensions.map(|(w, _)| w)
    }

    pub fn height(&self) -> Option<u32> {
        self.dimensions.map(|(_, h)| h)
    }

    /// Source timestamp in seconds, set on frames extracted from a video.
    pub fn timestamp(&self) -> Option<f64> {
        self.timestamp
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn predictions(&self) -> Option<&Predictions> {
        self.predictions.as_deref()
    }

    pub fn top_predictions(&self, n: usize) -> &[Prediction] {
        let labels = self.predictions().map(Predictions::labels).unwrap_or(&[]);
        &labels[..n.min(labels.len())]
    }

    pub fn best_prediction(&self) -> Option<&Prediction> {
        self.top_predictions(1).first()
    }

    /// Decoded pixels, computed once per byte generation.
    pub fn decoded(&self) -> Result<Arc<DynamicImage>, MediaError> {
        self.decoded.get_or_try_insert_with(self.generation, || {
            let _s = span_debug!("decode_image");
            tracing::trace!(name = %self.name, bytes = self.bytes.len(), "Decoding image");

            let image = ImageReader::new(Cursor::new(&self.bytes[..]))
                .with_guessed_format()?
                .decode()
                .map_err(|e| MediaError::decode(&self.name, e))?;
            Ok(Arc::new(image))
        })
    }

    pub fn cached_tensor(&self, key: &TensorKey) -> Option<Arc<Array4<f32>>> {
        self.tensor
            .get(self.generation)
            .filter(|cached| cached.key == *key)
            .map(|cached| cached.tensor)
    }

    pub fn store_tensor(&self, key: TensorKey, tensor: Arc<Array4<f32>>) {
        self.tensor
            .store(self.generation, CachedTensor { key, tensor });
    }

    /// `data:` URL for previews, rebuilt only when the bytes change.
    pub fn preview_url(&self) -> Arc<str> {
        if let Some(url) = self.preview.get(self.generation) {
            return url;
        }
        let url: Arc<str> =
            format!("data:{};base64,{}", self.media_type, STANDARD.encode(&self.bytes)).into();
        self.preview.store(self.generation, url.clone());
        url
    }

    /// Whether a derived value computed for the current bytes is cached.
    pub fn has_fresh_decode(&self) -> bool {
        self.decoded.is_fresh(self.generation)
    }

    pub fn has_fresh_preview(&self) -> bool {
        self.preview.is_fresh(self.generation)
    }

    /// Swap in new encoded bytes and drop every derived value.
    pub fn replace_bytes(&mut self, bytes: Vec<u8>, media_type: String) {
        self.bytes = bytes.into();
        self.media_type = media_type;
        self.generation += 1;
        self.decoded.clear();
        self.tensor.clear();
        self.preview.clear();

        tracing::trace!(
            name = %self.name,
            generation = self.generation,
            "Raw bytes replaced, derived caches invalidated"
        );
    }
}

impl Clone for MediaResource {
    fn clone(&self) -> Self {
        Self {
            bytes: Arc::clone(&self.bytes),
            media_type: self.media_type.clone(),
            name: self.name.clone(),
            extension: self.extension.clone(),
            dimensions: self.dimensions,
            timestamp: self.timestamp,
            predictions: self.predictions.clone(),
            generation: self.generation,
            decoded: self.decoded.clone(),
            tensor: self.tensor.clone(),
            preview: self.preview.clone(),
        }
    }
}

impl fmt::Debug for MediaResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaResource")
            .field("name", &self.name)
            .field("media_type", &self.media_type)
            .field("bytes", &self.bytes.len())
            .field("dimensions", &self.dimensions)
            .field("timestamp", &self.timestamp)
            .field("predictions", &self.predictions)
            .field("generation", &self.generation)
            .finish()
    }
}

/// Lower-cased text after the last `.` of `name`, empty when there is none.
pub fn extension_of(name: &str) -> String {
    name.rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default()
}

pub(crate) fn encode(image: &DynamicImage, format: ImageFormat) -> image::ImageResult<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    match format {
        // JPEG has no alpha channel
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8()).write_to(&mut buf, format)?,
        _ => image.write_to(&mut buf, format)?,
    }
    Ok(buf.into_inner())
}
