use exif::{In, Reader, Tag, Value};
use image::{imageops, RgbImage};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// How the camera stored the photo relative to upright (EXIF tag 0x0112)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExifOrientation {
    /// Tag missing or out of range; treated as upright
    Undefined,
    Upright,
    Mirrored,
    UpsideDown,
    MirroredUpsideDown,
    /// Mirrored along the top-left/bottom-right diagonal
    Transposed,
    /// Needs a quarter turn clockwise
    TurnedLeft,
    /// Mirrored along the top-right/bottom-left diagonal
    Transversed,
    /// Needs a quarter turn counter-clockwise
    TurnedRight,
}

impl From<u32> for ExifOrientation {
    fn from(tag_value: u32) -> Self {
        use ExifOrientation::*;
        const BY_TAG: [ExifOrientation; 8] = [
            Upright,
            Mirrored,
            UpsideDown,
            MirroredUpsideDown,
            Transposed,
            TurnedLeft,
            Transversed,
            TurnedRight,
        ];
        (tag_value as usize)
            .checked_sub(1)
            .and_then(|i| BY_TAG.get(i).copied())
            .unwrap_or(Undefined)
    }
}

/// Orientation tag of a photo. Photos without EXIF (PNG, stripped JPEG) read as `Undefined`.
pub fn read_exif_orientation(image_path: &Path) -> ExifOrientation {
    let exif = File::open(image_path)
        .map_err(|e| e.to_string())
        .and_then(|file| {
            Reader::new()
                .read_from_container(&mut BufReader::new(file))
                .map_err(|e| e.to_string())
        });

    let exif = match exif {
        Ok(exif) => exif,
        Err(reason) => {
            tracing::debug!(path = %image_path.display(), %reason, "no EXIF orientation");
            return ExifOrientation::Undefined;
        }
    };

    match exif.get_field(Tag::Orientation, In::PRIMARY).map(|f| &f.value) {
        Some(Value::Short(values)) => values
            .first()
            .map(|&v| ExifOrientation::from(u32::from(v)))
            .unwrap_or(ExifOrientation::Undefined),
        _ => ExifOrientation::Undefined,
    }
}

/// Turn the decoded pixels upright so crop coordinates match what the user sees
pub fn apply_orientation(img: RgbImage, orientation: ExifOrientation) -> RgbImage {
    use ExifOrientation::*;
    match orientation {
        Undefined | Upright => img,
        Mirrored => imageops::flip_horizontal(&img),
        UpsideDown => imageops::rotate180(&img),
        MirroredUpsideDown => imageops::flip_vertical(&img),
        Transposed => imageops::flip_horizontal(&imageops::rotate90(&img)),
        TurnedLeft => imageops::rotate90(&img),
        Transversed => imageops::flip_horizontal(&imageops::rotate270(&img)),
        TurnedRight => imageops::rotate270(&img),
    }
}
