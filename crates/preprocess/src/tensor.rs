use crate::config::TensorOptions;
use common::{span, span_debug};
use fast_image_resize::{
    FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer,
    images::{Image, ImageRef},
};
use media::{MediaError, MediaResource};
use ndarray::Array4;
use std::sync::Arc;

/// Turns resources into `[1, H, W, 3]` model inputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TensorPreparer {
    options: TensorOptions,
}

impl TensorPreparer {
    pub fn new(options: TensorOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &TensorOptions {
        &self.options
    }

    pub fn prepare(&self, resource: &MediaResource) -> Result<Array4<f32>, MediaError> {
        to_tensor(resource, &self.options)
    }
}

/// Decode `resource`, resize it bilinearly to the target size and lay it out as
/// `[1, target_height, target_width, 3]`, scaled to `[0, 1]` when `normalize` is set.
///
/// The result is cached on the resource for its current bytes and options.
pub fn to_tensor(
    resource: &MediaResource,
    options: &TensorOptions,
) -> Result<Array4<f32>, MediaError> {
    let key = options.key();
    if let Some(cached) = resource.cached_tensor(&key) {
        tracing::trace!(name = resource.name(), "Tensor cache hit");
        return Ok(cached.as_ref().clone());
    }

    let _s = span!("to_tensor");

    if options.target_width == 0 || options.target_height == 0 {
        return Err(MediaError::Resize(format!(
            "target size {}x{} must be non-zero",
            options.target_width, options.target_height
        )));
    }

    let decoded = resource.decoded()?;
    let rgb = decoded.to_rgb8();

    let resized = resize_rgb(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        options.target_width,
        options.target_height,
    )?;
    drop(rgb);

    let tensor = to_nhwc(
        resized.buffer(),
        options.target_width,
        options.target_height,
        options.normalize,
    )?;

    tracing::trace!(
        name = resource.name(),
        width = options.target_width,
        height = options.target_height,
        normalize = options.normalize,
        "Prepared tensor"
    );

    resource.store_tensor(key, Arc::new(tensor.clone()));
    Ok(tensor)
}

pub(crate) fn resize_rgb(
    pixels: &[u8],
    width: u32,
    height: u32,
    target_width: u32,
    target_height: u32,
) -> Result<Image<'static>, MediaError> {
    let _s = span_debug!("resize");

    let src = ImageRef::new(width, height, pixels, PixelType::U8x3)
        .map_err(|e| MediaError::Resize(e.to_string()))?;
    let mut resized = Image::new(target_width, target_height, PixelType::U8x3);

    Resizer::new()
        .resize(
            &src,
            &mut resized,
            &ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear)),
        )
        .map_err(|e| MediaError::Resize(e.to_string()))?;

    Ok(resized)
}

fn to_nhwc(
    pixels: &[u8],
    width: u32,
    height: u32,
    normalize: bool,
) -> Result<Array4<f32>, MediaError> {
    let _s = span_debug!("normalize");

    let data: Vec<f32> = if normalize {
        pixels.iter().map(|&v| v as f32 / 255.0).collect()
    } else {
        pixels.iter().map(|&v| v as f32).collect()
    };

    Array4::from_shape_vec((1, height as usize, width as usize, 3), data)
        .map_err(|e| MediaError::Resize(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn resource(width: u32, height: u32, color: [u8; 3]) -> MediaResource {
        let img = RgbImage::from_pixel(width, height, Rgb(color));
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        MediaResource::decode("solid.png", "image/png", buf.into_inner()).unwrap()
    }

    #[test]
    fn test_default_shape_is_nhwc() {
        let tensor = to_tensor(&resource(50, 30, [0, 0, 0]), &TensorOptions::default()).unwrap();
        assert_eq!(tensor.shape(), &[1, 224, 224, 3]);
    }

    #[test]
    fn test_custom_size_and_normalization() {
        let options = TensorOptions {
            target_width: 8,
            target_height: 4,
            normalize: true,
        };
        let tensor = to_tensor(&resource(16, 16, [255, 51, 0]), &options).unwrap();

        assert_eq!(tensor.shape(), &[1, 4, 8, 3]);
        assert!((tensor[[0, 2, 5, 0]] - 1.0).abs() < 1e-6);
        assert!((tensor[[0, 2, 5, 1]] - 0.2).abs() < 1e-6);
        assert_eq!(tensor[[0, 2, 5, 2]], 0.0);
    }

    #[test]
    fn test_raw_values_without_normalization() {
        let options = TensorOptions {
            target_width: 4,
            target_height: 4,
            normalize: false,
        };
        let tensor = to_tensor(&resource(4, 4, [10, 128, 255]), &options).unwrap();

        assert_eq!(tensor[[0, 0, 0, 0]], 10.0);
        assert_eq!(tensor[[0, 3, 3, 1]], 128.0);
        assert_eq!(tensor[[0, 1, 2, 2]], 255.0);
    }

    #[test]
    fn test_tensor_is_cached_per_options() {
        let res = resource(10, 10, [1, 2, 3]);
        let options = TensorOptions::default();

        to_tensor(&res, &options).unwrap();
        assert!(res.cached_tensor(&options.key()).is_some());

        let other = TensorOptions {
            normalize: false,
            ..options
        };
        assert!(res.cached_tensor(&other.key()).is_none());
    }

    #[test]
    fn test_replaced_bytes_are_reflected() {
        let mut res = resource(4, 4, [0, 0, 0]);
        let options = TensorOptions {
            target_width: 2,
            target_height: 2,
            normalize: true,
        };
        assert_eq!(to_tensor(&res, &options).unwrap()[[0, 0, 0, 0]], 0.0);

        let white = resource(4, 4, [255, 255, 255]);
        res.replace_bytes(white.bytes().to_vec(), "image/png".to_string());

        assert_eq!(to_tensor(&res, &options).unwrap()[[0, 0, 0, 0]], 1.0);
    }

    #[test]
    fn test_undecodable_bytes() {
        let res = MediaResource::new("broken.png", "image/png", vec![1u8, 2, 3], None).unwrap();
        let err = to_tensor(&res, &TensorOptions::default()).unwrap_err();
        assert!(matches!(err, MediaError::Decode { .. }) || matches!(err, MediaError::Io(_)));
    }

    #[test]
    fn test_zero_target_size_is_rejected() {
        let options = TensorOptions {
            target_width: 0,
            ..TensorOptions::default()
        };
        let err = to_tensor(&resource(2, 2, [0, 0, 0]), &options).unwrap_err();
        assert!(matches!(err, MediaError::Resize(_)));
    }

    #[test]
    fn test_preparer_uses_its_options() {
        let preparer = TensorPreparer::new(TensorOptions {
            target_width: 3,
            target_height: 5,
            normalize: true,
        });
        let tensor = preparer.prepare(&resource(9, 9, [0, 0, 0])).unwrap();
        assert_eq!(tensor.shape(), &[1, 5, 3, 3]);
    }
}
