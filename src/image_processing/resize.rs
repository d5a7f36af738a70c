use fast_image_resize::{images::Image, PixelType, ResizeOptions, Resizer};
use image::RgbImage;

use crate::error::{Result, VisualizerError};

/// Dimensions that fit inside a `max_side` square while keeping the aspect ratio
pub fn fitted_dimensions(width: u32, height: u32, max_side: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= max_side || max_side == 0 {
        return (width, height);
    }

    let scale = max_side as f64 / longest as f64;
    (
        ((width as f64 * scale).round() as u32).max(1),
        ((height as f64 * scale).round() as u32).max(1),
    )
}

/// Downscale an image for on-screen preview (gallery thumbnails, crop view).
/// Images already small enough are returned unchanged.
pub fn fit_within(img: &RgbImage, max_side: u32) -> Result<RgbImage> {
    let (src_width, src_height) = img.dimensions();
    let (dst_width, dst_height) = fitted_dimensions(src_width, src_height, max_side);

    if (src_width, src_height) == (dst_width, dst_height) {
        return Ok(img.clone());
    }
    if src_width == 0 || src_height == 0 {
        return Err(VisualizerError::Resize("source image is empty".to_string()));
    }

    let src_image = Image::from_vec_u8(src_width, src_height, img.as_raw().clone(), PixelType::U8x3)
        .map_err(|e| VisualizerError::Resize(e.to_string()))?;
    let mut dst_image = Image::new(dst_width, dst_height, PixelType::U8x3);

    Resizer::new()
        .resize(&src_image, &mut dst_image, Some(&ResizeOptions::default()))
        .map_err(|e| VisualizerError::Resize(e.to_string()))?;

    RgbImage::from_raw(dst_width, dst_height, dst_image.into_vec())
        .ok_or_else(|| VisualizerError::Resize("resized buffer has the wrong length".to_string()))
}
