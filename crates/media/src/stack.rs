use crate::collection::MediaCollection;
use crate::errors::MediaError;
use crate::resource::MediaResource;
use common::span;
use image::{DynamicImage, ImageBuffer};
use std::io::Cursor;
use tiff::ColorType;
use tiff::decoder::{Decoder, DecodingResult};

/// Decode every page of a TIFF file into its own PNG-encoded frame.
pub fn load_stack(name: &str, bytes: &[u8]) -> Result<MediaCollection, MediaError> {
    let _s = span!("load_stack");

    let pages = decode_pages(name, bytes)?;
    tracing::debug!(name, pages = pages.len(), "Decoded image stack");

    let frames = pages
        .into_iter()
        .enumerate()
        .map(|(i, page)| MediaResource::from_raster(format!("{name}_page_{i}.png"), page))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(MediaCollection::stack(name, frames))
}

pub fn decode_pages(name: &str, bytes: &[u8]) -> Result<Vec<DynamicImage>, MediaError> {
    let mut decoder =
        Decoder::new(Cursor::new(bytes)).map_err(|e| MediaError::decode(name, e))?;

    let mut pages = Vec::new();

    loop {
        let (width, height) = decoder
            .dimensions()
            .map_err(|e| MediaError::decode(name, e))?;
        let color_type = decoder
            .colortype()
            .map_err(|e| MediaError::decode(name, e))?;
        let data = decoder
            .read_image()
            .map_err(|e| MediaError::decode(name, e))?;

        let size_mismatch = || {
            MediaError::decode(
                name,
                format!(
                    "page {} buffer does not match {width}x{height} {color_type:?}",
                    pages.len()
                ),
            )
        };

        let page = match (data, color_type) {
            (DecodingResult::U8(data), ColorType::Gray(8)) => DynamicImage::ImageLuma8(
                ImageBuffer::from_raw(width, height, data).ok_or_else(size_mismatch)?,
            ),
            (DecodingResult::U8(data), ColorType::RGB(8)) => DynamicImage::ImageRgb8(
                ImageBuffer::from_raw(width, height, data).ok_or_else(size_mismatch)?,
            ),
            (DecodingResult::U8(data), ColorType::RGBA(8)) => DynamicImage::ImageRgba8(
                ImageBuffer::from_raw(width, height, data).ok_or_else(size_mismatch)?,
            ),
            (DecodingResult::U16(data), ColorType::Gray(16)) => DynamicImage::ImageLuma16(
                ImageBuffer::from_raw(width, height, data).ok_or_else(size_mismatch)?,
            ),
            (DecodingResult::U16(data), ColorType::RGB(16)) => DynamicImage::ImageRgb16(
                ImageBuffer::from_raw(width, height, data).ok_or_else(size_mismatch)?,
            ),
            (DecodingResult::U16(data), ColorType::RGBA(16)) => DynamicImage::ImageRgba16(
                ImageBuffer::from_raw(width, height, data).ok_or_else(size_mismatch)?,
            ),
            (_, other) => {
                return Err(MediaError::decode(
                    name,
                    format!("unsupported TIFF color type {other:?}"),
                ));
            }
        };

        pages.push(page);

        if !decoder.more_images() {
            break;
        }
        decoder
            .next_image()
            .map_err(|e| MediaError::decode(name, e))?;
    }

    Ok(pages)
}
