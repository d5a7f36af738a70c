use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::VisualizerError;

/// Crop frame aspect ratio (width / height)
pub const DEFAULT_ASPECT: f64 = 3.0 / 2.0;
pub const MIN_ZOOM: f64 = 1.0;
pub const MAX_ZOOM: f64 = 3.0;
/// Granularity of the zoom slider
pub const ZOOM_STEP: f64 = 0.1;

/// Pixel rectangle inside the (EXIF-oriented) room photo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRegion {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Whether the region is non-empty and lies entirely inside an image of the given size
    pub fn fits_within(&self, image_width: u32, image_height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self.x as u64 + self.width as u64 <= image_width as u64
            && self.y as u64 + self.height as u64 <= image_height as u64
    }

    pub fn validate(&self, image_width: u32, image_height: u32) -> Result<(), VisualizerError> {
        if self.fits_within(image_width, image_height) {
            Ok(())
        } else {
            Err(VisualizerError::InvalidCrop {
                x: self.x,
                y: self.y,
                width: self.width,
                height: self.height,
                image_width,
                image_height,
            })
        }
    }
}

impl fmt::Display for CropRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// Parses ImageMagick-style geometry: `WIDTHxHEIGHT+X+Y`
impl FromStr for CropRegion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let re = Regex::new(r"^(\d+)x(\d+)\+(\d+)\+(\d+)$").map_err(|e| e.to_string())?;
        let caps = re.captures(s.trim()).ok_or_else(|| {
            format!(
                "Invalid crop geometry '{}'. Use WIDTHxHEIGHT+X+Y (e.g., 600x400+10+20)",
                s
            )
        })?;

        let field = |idx: usize| -> Result<u32, String> {
            caps[idx]
                .parse::<u32>()
                .map_err(|_| format!("Crop value out of range: '{}'", &caps[idx]))
        };

        let region = CropRegion::new(field(3)?, field(4)?, field(1)?, field(2)?);
        if region.width == 0 || region.height == 0 {
            return Err("Crop width and height must be greater than 0".to_string());
        }
        Ok(region)
    }
}

/// Interactive crop frame over a photo.
///
/// The frame keeps a fixed aspect ratio. At zoom 1.0 it is the largest frame
/// that fits in the photo; zooming shrinks it by the zoom factor. The pan is
/// the offset of the frame center from the photo center, in photo pixels,
/// and is always clamped so the frame stays inside the photo.
#[derive(Debug, Clone, PartialEq)]
pub struct Cropper {
    image_width: u32,
    image_height: u32,
    aspect: f64,
    zoom: f64,
    pan_x: f64,
    pan_y: f64,
}

impl Cropper {
    pub fn new(image_width: u32, image_height: u32) -> Self {
        Self::with_aspect(image_width, image_height, DEFAULT_ASPECT)
    }

    pub fn with_aspect(image_width: u32, image_height: u32, aspect: f64) -> Self {
        let aspect = if aspect.is_finite() && aspect > 0.0 {
            aspect
        } else {
            DEFAULT_ASPECT
        };
        Self {
            image_width: image_width.max(1),
            image_height: image_height.max(1),
            aspect,
            zoom: MIN_ZOOM,
            pan_x: 0.0,
            pan_y: 0.0,
        }
    }

    pub fn image_size(&self) -> (u32, u32) {
        (self.image_width, self.image_height)
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn pan(&self) -> (f64, f64) {
        (self.pan_x, self.pan_y)
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = if zoom.is_finite() {
            zoom.clamp(MIN_ZOOM, MAX_ZOOM)
        } else {
            MIN_ZOOM
        };
        // A larger frame has less room to move
        self.set_pan(self.pan_x, self.pan_y);
    }

    pub fn set_pan(&mut self, pan_x: f64, pan_y: f64) {
        let (max_x, max_y) = self.max_pan();
        self.pan_x = if pan_x.is_finite() { pan_x.clamp(-max_x, max_x) } else { 0.0 };
        self.pan_y = if pan_y.is_finite() { pan_y.clamp(-max_y, max_y) } else { 0.0 };
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.set_pan(self.pan_x + dx, self.pan_y + dy);
    }

    /// Frame size in photo pixels (unrounded)
    pub fn frame_size(&self) -> (f64, f64) {
        let w = self.image_width as f64;
        let h = self.image_height as f64;

        let (base_w, base_h) = if w / h > self.aspect {
            // Photo is wider than the frame - full height
            (h * self.aspect, h)
        } else {
            (w, w / self.aspect)
        };

        (base_w / self.zoom, base_h / self.zoom)
    }

    fn max_pan(&self) -> (f64, f64) {
        let (frame_w, frame_h) = self.frame_size();
        (
            ((self.image_width as f64 - frame_w) / 2.0).max(0.0),
            ((self.image_height as f64 - frame_h) / 2.0).max(0.0),
        )
    }

    /// Current frame as a pixel rectangle, always inside the photo
    pub fn region(&self) -> CropRegion {
        let (frame_w, frame_h) = self.frame_size();
        let center_x = self.image_width as f64 / 2.0 + self.pan_x;
        let center_y = self.image_height as f64 / 2.0 + self.pan_y;

        let (x, width) = snap_axis(center_x - frame_w / 2.0, frame_w, self.image_width);
        let (y, height) = snap_axis(center_y - frame_h / 2.0, frame_h, self.image_height);

        CropRegion::new(x, y, width, height)
    }
}

/// Round one axis of the frame to whole pixels and clamp it into `0..limit`
fn snap_axis(start: f64, length: f64, limit: u32) -> (u32, u32) {
    let length = (length.round() as u32).clamp(1, limit);
    let max_start = limit - length;
    let start = start.round().max(0.0) as u32;
    (start.min(max_start), length)
}
