//! Bitmap normalization: decode, resize to a fixed square, encode atomically.

use std::fs;
use std::path::Path;

use image::{imageops::FilterType, DynamicImage, GenericImageView, ImageFormat};
use log::debug;
use zune_core::{colorspace::ColorSpace, options::DecoderOptions};
use zune_jpeg::JpegDecoder;

use crate::resolver::ResolveError;

pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, ResolveError> {
    // Preserve broad support for PNG/WebP/GIF/BMP/etc via the primary decoder.
    // Use non-strict JPEG fallback only when the primary path fails.
    image::load_from_memory(bytes)
        .ok()
        .or_else(|| decode_jpeg_non_strict(bytes))
        .ok_or(ResolveError::DecodeError)
}

fn looks_like_jpeg(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0xff && bytes[1] == 0xd8
}

fn decode_jpeg_non_strict(bytes: &[u8]) -> Option<DynamicImage> {
    if !looks_like_jpeg(bytes) {
        return None;
    }

    let options = DecoderOptions::new_cmd()
        .set_strict_mode(false)
        .jpeg_set_out_colorspace(ColorSpace::RGBA);
    let mut decoder = JpegDecoder::new_with_options(bytes, options);
    let pixels = decoder.decode().ok()?;
    let (width, height) = decoder.dimensions()?;
    let image = image::RgbaImage::from_raw(width as u32, height as u32, pixels)?;
    Some(DynamicImage::ImageRgba8(image))
}

/// Resizes preserving aspect ratio so the short edge matches `side`, then
/// center-crops to exactly `side` x `side`. Inputs that are not already
/// RGB8/RGBA8 are converted to RGBA8 first.
pub fn normalize_to_square(decoded: DynamicImage, side: u32) -> DynamicImage {
    let side = side.max(1);
    let normalized = match decoded {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => decoded,
        other => DynamicImage::ImageRgba8(other.to_rgba8()),
    };

    let (width, height) = normalized.dimensions();
    if width == side && height == side {
        return normalized;
    }

    let scale = f64::from(side) / f64::from(width.min(height).max(1));
    let scaled_width = ((f64::from(width) * scale) + 0.5) as u32;
    let scaled_height = ((f64::from(height) * scale) + 0.5) as u32;
    let resized = normalized.resize_exact(
        scaled_width.max(side),
        scaled_height.max(side),
        FilterType::Lanczos3,
    );

    let left = (resized.width() - side) / 2;
    let top = (resized.height() - side) / 2;
    resized.crop_imm(left, top, side, side)
}

/// Encodes the square image to PNG via a temp file plus rename, so a
/// concurrent reader never observes a half-written cover.
pub fn write_square_png_atomic(image: &DynamicImage, target_path: &Path) -> Option<()> {
    let temp_path = target_path.with_extension("png.tmp");
    if temp_path.exists() {
        let _ = fs::remove_file(&temp_path);
    }
    if let Err(error) = image.save_with_format(&temp_path, ImageFormat::Png) {
        debug!("Failed to encode {}: {error}", temp_path.display());
        return None;
    }
    if let Err(error) = fs::rename(&temp_path, target_path) {
        debug!("Failed to publish {}: {error}", target_path.display());
        let _ = fs::remove_file(&temp_path);
        return None;
    }
    Some(())
}
