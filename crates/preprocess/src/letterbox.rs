use crate::config::DETECTOR_INPUT_SIZE;
use crate::tensor::resize_rgb;
use common::span;
use image::RgbImage;
use media::MediaError;
use ndarray::Array4;

const LETTERBOX_COLOR: u8 = 114;
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Letterboxed detector input plus what it takes to map boxes back to the source.
#[derive(Debug)]
pub struct PreprocessResult {
    /// `[1, 3, H, W]`, ImageNet-normalized
    pub tensor: Array4<f32>,
    /// Scale factor applied during letterboxing
    pub scale: f32,
    /// X offset from letterboxing (in pixels)
    pub offset_x: f32,
    /// Y offset from letterboxing (in pixels)
    pub offset_y: f32,
}

/// Aspect-preserving resize onto a gray canvas, for detectors trained that way.
pub struct LetterboxPreProcessor {
    pub input_size: (u32, u32),
    canvas: Vec<u8>,
}

impl LetterboxPreProcessor {
    pub fn new(input_size: (u32, u32)) -> Self {
        Self {
            input_size,
            canvas: vec![LETTERBOX_COLOR; (input_size.0 * input_size.1 * 3) as usize],
        }
    }

    pub fn preprocess(&mut self, image: &RgbImage) -> Result<PreprocessResult, MediaError> {
        let _s = span!("letterbox_preprocess");

        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(MediaError::Resize(format!(
                "cannot letterbox an empty {width}x{height} image"
            )));
        }

        let (scale, offset_x, offset_y) = self.letterbox(image.as_raw(), width, height)?;
        let tensor = self.normalize()?;

        tracing::trace!(width, height, scale, offset_x, offset_y, "Letterboxed image");

        Ok(PreprocessResult {
            tensor,
            scale,
            offset_x,
            offset_y,
        })
    }

    fn letterbox(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<(f32, f32, f32), MediaError> {
        let (target_w, target_h) = self.input_size;

        let scale = (target_w as f32 / width as f32).min(target_h as f32 / height as f32);
        let new_width = ((width as f32 * scale) as u32).clamp(1, target_w);
        let new_height = ((height as f32 * scale) as u32).clamp(1, target_h);

        let offset_x = (target_w - new_width) / 2;
        let offset_y = (target_h - new_height) / 2;

        let resized = resize_rgb(pixels, width, height, new_width, new_height)?;

        self.canvas.fill(LETTERBOX_COLOR);

        let resized_data = resized.buffer();
        let stride = (target_w * 3) as usize;
        let row_len = (new_width * 3) as usize;

        for y in 0..new_height as usize {
            let src_row = y * row_len;
            let dst_row = (y + offset_y as usize) * stride + offset_x as usize * 3;

            self.canvas[dst_row..dst_row + row_len]
                .copy_from_slice(&resized_data[src_row..src_row + row_len]);
        }

        Ok((scale, offset_x as f32, offset_y as f32))
    }

    fn normalize(&self) -> Result<Array4<f32>, MediaError> {
        let (width, height) = (self.input_size.0 as usize, self.input_size.1 as usize);
        let spatial = width * height;

        let mut output = vec![0.0f32; 3 * spatial];

        for (i, px) in self.canvas.chunks_exact(3).enumerate() {
            for c in 0..3 {
                let v = px[c] as f32 / 255.0;
                output[i + c * spatial] = (v - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
            }
        }

        Array4::from_shape_vec((1, 3, height, width), output)
            .map_err(|e| MediaError::Resize(e.to_string()))
    }
}

impl Default for LetterboxPreProcessor {
    fn default() -> Self {
        Self::new(DETECTOR_INPUT_SIZE)
    }
}
