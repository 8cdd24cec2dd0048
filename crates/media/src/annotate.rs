use crate::errors::MediaError;
use crate::prediction::{BoundingBox, Prediction};
use crate::resource::{MediaResource, encode};
use ab_glyph::{FontArc, FontVec};
use common::span;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::path::Path;

const LABEL_GAP_ABOVE: f32 = 5.0;
/// Boxes starting at or above this row get their caption inside the box.
const MIN_ROOM_ABOVE: f32 = 10.0;
const LABEL_OFFSET_BELOW: f32 = 15.0;

static EMBEDDED_FONT: &[u8] = include_bytes!("../assets/DejaVuSansMono.ttf");

/// The monospace font compiled into the crate.
pub fn embedded_font() -> Option<FontArc> {
    match FontArc::try_from_slice(EMBEDDED_FONT) {
        Ok(font) => Some(font),
        Err(e) => {
            tracing::warn!(error = %e, "Embedded font is unreadable, captions will be skipped");
            None
        }
    }
}

pub struct AnnotationStyle {
    /// Captions are skipped when no font is loaded.
    pub font: Option<FontArc>,
    pub font_scale: f32,
    pub thickness: u32,
    pub color: Rgba<u8>,
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        Self {
            font: embedded_font(),
            font_scale: 16.0,
            thickness: 2,
            color: Rgba([255, 0, 0, 255]),
        }
    }
}

impl AnnotationStyle {
    pub fn with_font_path(font_path: &Path) -> Result<Self, MediaError> {
        let font_data = std::fs::read(font_path)?;
        let font = FontVec::try_from_vec(font_data)
            .map_err(|e| MediaError::decode(&font_path.display().to_string(), e))?;

        Ok(Self {
            font: Some(FontArc::new(font)),
            ..Self::default()
        })
    }

    /// First readable font from the usual system locations, or the embedded one.
    pub fn with_system_font() -> Self {
        let font_paths = [
            "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
            "/System/Library/Fonts/Helvetica.ttc",
            "C:\\Windows\\Fonts\\arial.ttf",
        ];

        for path in font_paths {
            if let Ok(style) = Self::with_font_path(Path::new(path)) {
                tracing::info!(path, "Loaded system font");
                return style;
            }
        }

        tracing::debug!("No system font found, using the embedded font");
        Self::default()
    }
}

impl std::fmt::Debug for AnnotationStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnotationStyle")
            .field("font", &self.font.is_some())
            .field("font_scale", &self.font_scale)
            .field("thickness", &self.thickness)
            .field("color", &self.color)
            .finish()
    }
}

/// Burns prediction boxes and captions into a resource's pixels.
#[derive(Debug, Default)]
pub struct AnnotationRenderer {
    style: AnnotationStyle,
}

impl AnnotationRenderer {
    pub fn new(style: AnnotationStyle) -> Self {
        Self { style }
    }

    /// Redraw `resource` with its predictions and replace its bytes in place.
    ///
    /// The bytes are re-encoded even when there is nothing to draw. The declared
    /// media type is kept when it can be written, otherwise the result is PNG.
    pub fn embed_predictions(&self, resource: &mut MediaResource) -> Result<(), MediaError> {
        let _s = span!("embed_predictions");

        let mut surface: RgbaImage = resource.decoded()?.to_rgba8();

        let boxed: Vec<&Prediction> = resource
            .predictions()
            .map(|p| p.labels())
            .unwrap_or(&[])
            .iter()
            .filter(|p| p.bbox.is_some())
            .collect();

        for prediction in &boxed {
            self.draw(&mut surface, prediction);
        }

        let (format, media_type) = match ImageFormat::from_mime_type(resource.media_type())
            .filter(|f| f.writing_enabled())
        {
            Some(format) => (format, resource.media_type().to_string()),
            None => {
                tracing::warn!(
                    name = resource.name(),
                    media_type = resource.media_type(),
                    "Cannot encode declared media type, falling back to PNG"
                );
                (ImageFormat::Png, "image/png".to_string())
            }
        };

        let bytes = encode(&DynamicImage::ImageRgba8(surface), format)
            .map_err(|e| MediaError::encode(resource.name(), e))?;

        tracing::debug!(
            name = resource.name(),
            boxes = boxed.len(),
            media_type = %media_type,
            "Embedded predictions"
        );
        resource.replace_bytes(bytes, media_type);
        Ok(())
    }

    fn draw(&self, surface: &mut RgbaImage, prediction: &Prediction) {
        let Some(bbox) = prediction.bbox else { return };
        let Some(rect) = bbox_to_rect(&bbox) else {
            return;
        };

        for t in 0..self.style.thickness as i32 {
            let thick = Rect::at(rect.left() - t, rect.top() - t).of_size(
                rect.width() + (2 * t) as u32,
                rect.height() + (2 * t) as u32,
            );
            draw_hollow_rect_mut(surface, thick, self.style.color);
        }

        if let Some(font) = &self.style.font {
            // draw_text_mut positions the glyph top, captions are placed by baseline
            let top = label_baseline(&bbox) - self.style.font_scale;
            draw_text_mut(
                surface,
                self.style.color,
                bbox.x as i32,
                top as i32,
                self.style.font_scale,
                font,
                &prediction.caption(),
            );
        }
    }
}

/// Caption baseline: just above the box, or inside it near the top edge of the image.
pub fn label_baseline(bbox: &BoundingBox) -> f32 {
    if bbox.y > MIN_ROOM_ABOVE {
        bbox.y - LABEL_GAP_ABOVE
    } else {
        bbox.y + LABEL_OFFSET_BELOW
    }
}

fn bbox_to_rect(bbox: &BoundingBox) -> Option<Rect> {
    let width = bbox.width.round() as u32;
    let height = bbox.height.round() as u32;
    (width > 0 && height > 0).then(|| Rect::at(bbox.x as i32, bbox.y as i32).of_size(width, height))
}
