pub mod crop;
pub mod orientation;
pub mod resize;

use image::codecs::jpeg::JpegEncoder;
use image::{ImageBuffer, RgbImage};
use std::path::{Path, PathBuf};

use crate::error::Result;

pub use crop::{CropRegion, Cropper};
pub use orientation::ExifOrientation;

/// Quality used when encoding crops (matches a browser canvas' JPEG default)
pub const DEFAULT_JPEG_QUALITY: u8 = 92;

/// Room photo chosen by the user, decoded and upright
#[derive(Debug, Clone)]
pub struct UserImage {
    pub path: PathBuf,
    pub pixels: RgbImage,
    pub orientation: ExifOrientation,
}

impl UserImage {
    /// Decode a photo from disk and apply its EXIF orientation
    pub fn open(path: &Path) -> Result<Self> {
        let decoded = image::open(path)?.to_rgb8();
        let orientation = orientation::read_exif_orientation(path);
        let pixels = orientation::apply_orientation(decoded, orientation);

        tracing::debug!(
            path = %path.display(),
            width = pixels.width(),
            height = pixels.height(),
            ?orientation,
            "loaded room photo"
        );

        Ok(Self {
            path: path.to_path_buf(),
            pixels,
            orientation,
        })
    }

    pub fn from_pixels(path: impl Into<PathBuf>, pixels: RgbImage) -> Self {
        Self {
            path: path.into(),
            pixels,
            orientation: ExifOrientation::Undefined,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// A crop frame sized to this photo
    pub fn cropper(&self, aspect: f64) -> Cropper {
        let (width, height) = self.dimensions();
        Cropper::with_aspect(width, height, aspect)
    }
}

/// The rasterized crop, ready for upload
#[derive(Debug, Clone, PartialEq)]
pub struct CroppedImage {
    pub region: CropRegion,
    pub jpeg: Vec<u8>,
}

impl CroppedImage {
    pub fn dimensions(&self) -> (u32, u32) {
        (self.region.width, self.region.height)
    }

    pub fn len(&self) -> usize {
        self.jpeg.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jpeg.is_empty()
    }
}

/// Copy a region of an image into a new image of exactly that size
pub fn crop_image(img: &RgbImage, region: &CropRegion) -> Result<RgbImage> {
    let (img_width, img_height) = img.dimensions();
    region.validate(img_width, img_height)?;

    let mut output = ImageBuffer::new(region.width, region.height);
    for (out_x, out_y, pixel) in output.enumerate_pixels_mut() {
        *pixel = *img.get_pixel(region.x + out_x, region.y + out_y);
    }

    Ok(output)
}

pub fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
    encoder.encode_image(img)?;
    Ok(buffer)
}

/// Draw the crop region into an offscreen image and encode it as JPEG
pub fn rasterize_crop(img: &RgbImage, region: &CropRegion, quality: u8) -> Result<CroppedImage> {
    let cropped = crop_image(img, region)?;
    let jpeg = encode_jpeg(&cropped, quality)?;

    tracing::trace!(%region, bytes = jpeg.len(), "rasterized crop");

    Ok(CroppedImage {
        region: *region,
        jpeg,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn create_test_image(width: u32, height: u32) -> RgbImage {
        ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        })
    }

    #[test]
    fn test_crop_image() {
        let img = create_test_image(100, 100);
        let cropped = crop_image(&img, &CropRegion::new(10, 10, 50, 50)).unwrap();

        assert_eq!(cropped.dimensions(), (50, 50));
        assert_eq!(img.get_pixel(15, 15), cropped.get_pixel(5, 5));
    }

    #[test]
    fn test_crop_bounds_validation() {
        let img = create_test_image(50, 50);
        assert!(crop_image(&img, &CropRegion::new(10, 10, 50, 50)).is_err());
        assert!(crop_image(&img, &CropRegion::new(10, 10, 40, 40)).is_ok());
    }

    #[test]
    fn test_rasterize_crop_produces_jpeg_of_region_size() {
        let img = create_test_image(120, 80);
        let region = CropRegion::new(30, 20, 60, 40);
        let cropped = rasterize_crop(&img, &region, DEFAULT_JPEG_QUALITY).unwrap();

        assert!(!cropped.is_empty());
        assert_eq!(cropped.dimensions(), (60, 40));
        // JPEG SOI marker
        assert_eq!(&cropped.jpeg[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory(&cropped.jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (60, 40));
    }

    #[test]
    fn test_user_image_open_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("room.png");
        create_test_image(30, 20).save(&path).unwrap();

        let user = UserImage::open(&path).unwrap();
        assert_eq!(user.dimensions(), (30, 20));
        assert_eq!(user.orientation, ExifOrientation::Undefined);
        assert_eq!(user.cropper(1.5).region(), CropRegion::new(0, 0, 30, 20));
    }

    #[test]
    fn test_user_image_open_rejects_non_images() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.jpg");
        std::fs::write(&path, b"not an image").unwrap();
        assert!(UserImage::open(&path).is_err());
    }
}
