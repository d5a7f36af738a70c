//! State of the single visualizer screen.
//!
//! The screen is always in exactly one [`ScreenMode`]. Network work is not
//! done here: operations that need the network hand back a job
//! ([`UploadJob`], [`CompositeJob`]) and the caller reports the outcome with
//! [`Session::finish_upload`] / [`Session::finish_composite`]. All timing is
//! driven by the `now` the caller passes in.

use std::time::{Duration, Instant};

use crate::error::VisualizerError;
use crate::image_processing::crop::DEFAULT_ASPECT;
use crate::image_processing::{
    rasterize_crop, CropRegion, CroppedImage, Cropper, UserImage, DEFAULT_JPEG_QUALITY,
};
use crate::remote::TileImage;
use crate::utils::random_upload_key;

pub const MESSAGE_DURATION: Duration = Duration::from_millis(1200);
pub const CROSSFADE_DELAY: Duration = Duration::from_millis(2000);

pub const UPLOAD_INSTRUCTION: &str = "Upload your room image";
pub const MSG_SELECT_TILE: &str = "Please select a tile";
pub const MSG_PROVIDE_ROOM: &str = "Please provide room image";
pub const MSG_CROP_FIRST: &str = "Please crop the image";
pub const MSG_FINISH_CROP: &str = "Finish cropping your room image first";
pub const MSG_BUSY: &str = "Please wait for the current request to finish";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScreenMode {
    Idle,
    Cropping,
    Uploading,
    Compositing,
    Result,
    Error { message: String },
}

impl ScreenMode {
    /// A network request is in flight
    pub fn is_busy(&self) -> bool {
        matches!(self, ScreenMode::Uploading | ScreenMode::Compositing)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScreenMode::Idle => "idle",
            ScreenMode::Cropping => "cropping",
            ScreenMode::Uploading => "uploading",
            ScreenMode::Compositing => "compositing",
            ScreenMode::Result => "result",
            ScreenMode::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub aspect: f64,
    pub jpeg_quality: u8,
    pub room_prefix: String,
    pub message_duration: Duration,
    pub crossfade_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            aspect: DEFAULT_ASPECT,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            room_prefix: "room-images".to_string(),
            message_duration: MESSAGE_DURATION,
            crossfade_delay: CROSSFADE_DELAY,
        }
    }
}

/// Bytes to push to storage
#[derive(Debug, Clone)]
pub struct UploadJob {
    pub key: String,
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
}

/// Tile/room pair to send to the compositing API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeJob {
    pub tile_url: String,
    pub room_url: String,
}

#[derive(Debug, Clone)]
struct FlashMessage {
    text: String,
    expires_at: Instant,
}

/// Delayed swap from the previous image to a newly displayed one
#[derive(Debug, Clone, Copy)]
struct Crossfade {
    changed_at: Instant,
    delay: Duration,
}

impl Crossfade {
    fn showing_new(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.changed_at) >= self.delay
    }

    fn remaining(&self, now: Instant) -> Option<Duration> {
        let elapsed = now.saturating_duration_since(self.changed_at);
        self.delay.checked_sub(elapsed).filter(|d| !d.is_zero())
    }
}

pub struct Session {
    config: SessionConfig,
    mode: ScreenMode,
    tiles: Vec<TileImage>,
    user_image: Option<UserImage>,
    cropper: Option<Cropper>,
    cropped: Option<CroppedImage>,
    room_url: Option<String>,
    display_url: Option<String>,
    result_url: Option<String>,
    selected_tile: Option<String>,
    flash: Option<FlashMessage>,
    crossfade: Crossfade,
    show_instruction: bool,
}

impl Session {
    pub fn new(config: SessionConfig, now: Instant) -> Self {
        let crossfade = Crossfade {
            changed_at: now,
            delay: config.crossfade_delay,
        };
        Self {
            config,
            mode: ScreenMode::Idle,
            tiles: Vec::new(),
            user_image: None,
            cropper: None,
            cropped: None,
            room_url: None,
            display_url: None,
            result_url: None,
            selected_tile: None,
            flash: None,
            crossfade,
            show_instruction: true,
        }
    }

    pub fn mode(&self) -> &ScreenMode {
        &self.mode
    }

    pub fn tiles(&self) -> &[TileImage] {
        &self.tiles
    }

    pub fn set_tiles(&mut self, tiles: Vec<TileImage>) {
        tracing::debug!(count = tiles.len(), "tile gallery loaded");
        self.tiles = tiles;
    }

    pub fn tiles_failed(&mut self, err: &VisualizerError) {
        tracing::error!(error = %err, "failed to list tiles");
        if !self.mode.is_busy() && self.mode != ScreenMode::Cropping {
            self.mode = ScreenMode::Error {
                message: format!("Could not load tiles: {}", err),
            };
        }
    }

    /// Tiles react to clicks only once a room image is on screen and nothing is in flight
    pub fn tiles_enabled(&self) -> bool {
        self.display_url.is_some() && !self.mode.is_busy() && self.mode != ScreenMode::Cropping
    }

    pub fn room_url(&self) -> Option<&str> {
        self.room_url.as_deref()
    }

    pub fn display_url(&self) -> Option<&str> {
        self.display_url.as_deref()
    }

    pub fn selected_tile(&self) -> Option<&str> {
        self.selected_tile.as_deref()
    }

    pub fn user_image(&self) -> Option<&UserImage> {
        self.user_image.as_ref()
    }

    pub fn cropper(&self) -> Option<&Cropper> {
        self.cropper.as_ref()
    }

    pub fn cropped(&self) -> Option<&CroppedImage> {
        self.cropped.as_ref()
    }

    pub fn instruction(&self) -> Option<&'static str> {
        (self.show_instruction && self.display_url.is_none()).then_some(UPLOAD_INSTRUCTION)
    }

    fn flash(&mut self, text: &str, now: Instant) {
        tracing::debug!(text, "flash message");
        self.flash = Some(FlashMessage {
            text: text.to_string(),
            expires_at: now + self.config.message_duration,
        });
    }

    /// The transient validation message, if one is still showing
    pub fn message(&self, now: Instant) -> Option<&str> {
        self.flash
            .as_ref()
            .filter(|flash| now < flash.expires_at)
            .map(|flash| flash.text.as_str())
    }

    /// Drop expired timers; call once per frame
    pub fn tick(&mut self, now: Instant) {
        if self.flash.as_ref().is_some_and(|flash| now >= flash.expires_at) {
            self.flash = None;
        }
    }

    /// How long until a timer changes what is on screen
    pub fn next_deadline(&self, now: Instant) -> Option<Duration> {
        let flash = self
            .flash
            .as_ref()
            .and_then(|flash| flash.expires_at.checked_duration_since(now))
            .filter(|d| !d.is_zero());
        let fade = self
            .display_url
            .as_ref()
            .and_then(|_| self.crossfade.remaining(now));

        match (flash, fade) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn set_display(&mut self, url: Option<String>, now: Instant) {
        self.display_url = url;
        self.crossfade.changed_at = now;
    }

    /// Whether the crossfade has swapped to the newly displayed image
    pub fn crossfade_showing_new(&self, now: Instant) -> bool {
        self.crossfade.showing_new(now)
    }

    /// The image to draw in the main slot.
    ///
    /// Nothing when no display image is set. Otherwise the previous (room)
    /// image for the crossfade delay, then the display image itself.
    pub fn visible_image(&self, now: Instant) -> Option<&str> {
        let display = self.display_url.as_deref()?;
        if self.crossfade.showing_new(now) {
            Some(display)
        } else {
            Some(self.room_url.as_deref().unwrap_or(display))
        }
    }

    /// The user picked a file (or dismissed the picker with `None`)
    pub fn select_file(&mut self, image: Option<UserImage>, now: Instant) -> bool {
        self.show_instruction = false;

        if self.mode.is_busy() {
            self.flash(MSG_BUSY, now);
            return false;
        }

        let Some(image) = image else {
            if self.mode == ScreenMode::Cropping {
                self.cancel_crop();
            }
            return false;
        };

        tracing::info!(path = %image.path.display(), "room photo selected");
        self.cropper = Some(image.cropper(self.config.aspect));
        self.user_image = Some(image);
        self.cropped = None;
        self.mode = ScreenMode::Cropping;
        self.refresh_crop();
        true
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        if let Some(cropper) = self.cropper.as_mut() {
            cropper.set_zoom(zoom);
            self.refresh_crop();
        }
    }

    pub fn set_pan(&mut self, pan_x: f64, pan_y: f64) {
        if let Some(cropper) = self.cropper.as_mut() {
            cropper.set_pan(pan_x, pan_y);
            self.refresh_crop();
        }
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        if let Some(cropper) = self.cropper.as_mut() {
            cropper.pan_by(dx, dy);
            self.refresh_crop();
        }
    }

    /// Crop an exact pixel region instead of the zoom/pan frame
    pub fn set_region(&mut self, region: CropRegion) -> Result<(), VisualizerError> {
        let Some(user) = self.user_image.as_ref() else {
            return Ok(());
        };
        if self.mode != ScreenMode::Cropping {
            return Ok(());
        }

        let (width, height) = user.dimensions();
        region.validate(width, height)?;
        self.cropped = Some(rasterize_crop(&user.pixels, &region, self.config.jpeg_quality)?);
        Ok(())
    }

    /// Re-rasterize the crop after a pan/zoom change
    fn refresh_crop(&mut self) {
        let (Some(user), Some(cropper)) = (self.user_image.as_ref(), self.cropper.as_ref()) else {
            return;
        };

        match rasterize_crop(&user.pixels, &cropper.region(), self.config.jpeg_quality) {
            Ok(cropped) => self.cropped = Some(cropped),
            Err(e) => {
                tracing::warn!(error = %e, "failed to rasterize crop");
                self.cropped = None;
            }
        }
    }

    pub fn cancel_crop(&mut self) {
        if self.mode == ScreenMode::Cropping {
            self.user_image = None;
            self.cropper = None;
            self.mode = ScreenMode::Idle;
        }
    }

    /// "Select" in the crop dialog: leave cropping and start the upload
    pub fn confirm_crop(&mut self, now: Instant) -> Option<UploadJob> {
        self.show_instruction = false;
        if self.mode != ScreenMode::Cropping {
            return None;
        }

        self.user_image = None;
        self.cropper = None;

        let Some(cropped) = self.cropped.as_ref() else {
            self.flash(MSG_CROP_FIRST, now);
            self.mode = ScreenMode::Idle;
            return None;
        };

        let job = UploadJob {
            key: random_upload_key(&self.config.room_prefix),
            bytes: cropped.jpeg.clone(),
            content_type: "image/jpeg",
        };

        self.set_display(None, now);
        self.mode = ScreenMode::Uploading;
        tracing::info!(key = %job.key, bytes = job.bytes.len(), "upload started");
        Some(job)
    }

    pub fn finish_upload(&mut self, outcome: Result<String, VisualizerError>, now: Instant) {
        if self.mode != ScreenMode::Uploading {
            tracing::warn!(mode = self.mode.name(), "ignoring upload result");
            return;
        }

        match outcome {
            Ok(url) => {
                tracing::info!(%url, "room image uploaded");
                self.room_url = Some(url.clone());
                self.set_display(Some(url), now);
                self.mode = ScreenMode::Idle;
            }
            Err(e) => {
                tracing::error!(error = %e, "upload failed");
                self.mode = ScreenMode::Error {
                    message: format!("Upload failed: {}", e),
                };
            }
        }
    }

    /// A tile was clicked
    pub fn request_composite(&mut self, tile_url: &str, now: Instant) -> Option<CompositeJob> {
        self.show_instruction = false;

        if tile_url.trim().is_empty() {
            self.flash(MSG_SELECT_TILE, now);
            return None;
        }
        let Some(room_url) = self.room_url.clone() else {
            self.flash(MSG_PROVIDE_ROOM, now);
            return None;
        };
        if self.mode.is_busy() {
            self.flash(MSG_BUSY, now);
            return None;
        }
        if self.mode == ScreenMode::Cropping {
            self.flash(MSG_FINISH_CROP, now);
            return None;
        }

        self.selected_tile = Some(tile_url.to_string());
        self.set_display(None, now);
        self.mode = ScreenMode::Compositing;

        Some(CompositeJob {
            tile_url: tile_url.to_string(),
            room_url,
        })
    }

    pub fn finish_composite(&mut self, outcome: Result<String, VisualizerError>, now: Instant) {
        if self.mode != ScreenMode::Compositing {
            tracing::warn!(mode = self.mode.name(), "ignoring composite result");
            return;
        }

        match outcome {
            Ok(url) => {
                tracing::info!(%url, "composite ready");
                self.result_url = Some(url.clone());
                self.set_display(Some(url), now);
                self.mode = ScreenMode::Result;
            }
            Err(e) => {
                tracing::error!(error = %e, "composite failed");
                // Back to the room photo so another tile can be tried
                let room = self.room_url.clone();
                self.set_display(room, now);
                self.mode = ScreenMode::Error {
                    message: format!("Could not apply tile: {}", e),
                };
            }
        }
    }

    pub fn dismiss_error(&mut self) {
        if matches!(self.mode, ScreenMode::Error { .. }) {
            self.mode = ScreenMode::Idle;
        }
    }

    /// The result is downloadable only while it is the image on screen
    pub fn can_download(&self) -> bool {
        self.mode == ScreenMode::Result && self.result_url.is_some()
    }

    pub fn download_url(&self) -> Option<&str> {
        if self.can_download() {
            self.result_url.as_deref()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use pretty_assertions::assert_eq;

    fn room_photo() -> UserImage {
        UserImage::from_pixels("room.png", RgbImage::from_pixel(300, 200, Rgb([120, 90, 60])))
    }

    fn session(now: Instant) -> Session {
        Session::new(SessionConfig::default(), now)
    }

    /// Drive a session to the point where a room image is uploaded
    fn uploaded_session(now: Instant) -> Session {
        let mut s = session(now);
        s.select_file(Some(room_photo()), now);
        let job = s.confirm_crop(now).unwrap();
        assert!(!job.bytes.is_empty());
        s.finish_upload(Ok("https://cdn/room.jpg".to_string()), now);
        s
    }

    fn transport_error() -> VisualizerError {
        VisualizerError::Transport {
            url: "http://localhost:5000/api/v1/apply-tiles".to_string(),
            message: "connection refused".to_string(),
        }
    }

    #[test]
    fn test_selecting_file_enters_crop_mode() {
        let now = Instant::now();
        let mut s = session(now);
        assert_eq!(s.instruction(), Some(UPLOAD_INSTRUCTION));

        assert!(s.select_file(Some(room_photo()), now));
        assert_eq!(s.mode(), &ScreenMode::Cropping);
        assert_eq!(s.instruction(), None);
        assert!(s.cropper().is_some());
    }

    #[test]
    fn test_dismissed_picker_leaves_crop_mode() {
        let now = Instant::now();
        let mut s = session(now);
        s.select_file(Some(room_photo()), now);
        assert!(!s.select_file(None, now));
        assert_eq!(s.mode(), &ScreenMode::Idle);
        assert!(s.user_image().is_none());
    }

    #[test]
    fn test_crop_produces_preview() {
        let now = Instant::now();
        let mut s = session(now);
        s.select_file(Some(room_photo()), now);

        let first = s.cropped().cloned().unwrap();
        assert!(!first.is_empty());
        assert_eq!(first.dimensions(), (300, 200));

        s.set_zoom(2.0);
        let zoomed = s.cropped().unwrap();
        assert_eq!(zoomed.dimensions(), (150, 100));
        assert_ne!(zoomed.region, first.region);
    }

    #[test]
    fn test_confirm_uploads_with_room_key() {
        let now = Instant::now();
        let mut s = session(now);
        s.select_file(Some(room_photo()), now);

        let job = s.confirm_crop(now).unwrap();
        assert!(job.key.starts_with("room-images/"));
        assert!(job.key.ends_with(".jpg"));
        assert_eq!(job.content_type, "image/jpeg");
        assert_eq!(s.mode(), &ScreenMode::Uploading);
        assert!(s.display_url().is_none());
        assert!(s.user_image().is_none());
    }

    #[test]
    fn test_confirm_without_crop_flashes_message() {
        let now = Instant::now();
        let tiny = UserImage::from_pixels("empty.png", RgbImage::new(1, 1));
        let mut s = session(now);
        s.select_file(Some(tiny), now);
        // Force the "no crop yet" path
        s.cropped = None;

        assert!(s.confirm_crop(now).is_none());
        assert_eq!(s.mode(), &ScreenMode::Idle);
        assert_eq!(s.message(now), Some(MSG_CROP_FIRST));
    }

    #[test]
    fn test_upload_success_shows_room_and_enables_tiles() {
        let now = Instant::now();
        let s = uploaded_session(now);
        assert_eq!(s.mode(), &ScreenMode::Idle);
        assert_eq!(s.room_url(), Some("https://cdn/room.jpg"));
        assert_eq!(s.display_url(), Some("https://cdn/room.jpg"));
        assert!(s.tiles_enabled());
        assert!(!s.can_download());
    }

    #[test]
    fn test_upload_failure_enters_error_state() {
        let now = Instant::now();
        let mut s = session(now);
        s.select_file(Some(room_photo()), now);
        s.confirm_crop(now).unwrap();

        s.finish_upload(Err(transport_error()), now);
        match s.mode() {
            ScreenMode::Error { message } => assert!(message.starts_with("Upload failed")),
            other => panic!("expected error mode, got {:?}", other),
        }
        assert!(!s.mode().is_busy());

        s.dismiss_error();
        assert_eq!(s.mode(), &ScreenMode::Idle);
    }

    #[test]
    fn test_new_photo_leaves_error_state() {
        let now = Instant::now();
        let mut s = session(now);
        s.select_file(Some(room_photo()), now);
        s.confirm_crop(now).unwrap();
        s.finish_upload(Err(transport_error()), now);
        assert!(matches!(s.mode(), ScreenMode::Error { .. }));

        assert!(s.select_file(Some(room_photo()), now));
        assert_eq!(s.mode(), &ScreenMode::Cropping);
        assert!(s.cropped().is_some());
        assert!(s.confirm_crop(now).is_some());
        assert_eq!(s.mode(), &ScreenMode::Uploading);
    }

    #[test]
    fn test_tile_without_room_flashes_for_message_duration() {
        let t0 = Instant::now();
        let mut s = session(t0);

        assert!(s.request_composite("https://cdn/tile.jpg", t0).is_none());
        assert_eq!(s.message(t0), Some(MSG_PROVIDE_ROOM));
        assert_eq!(s.message(t0 + Duration::from_millis(1199)), Some(MSG_PROVIDE_ROOM));
        assert_eq!(s.message(t0 + Duration::from_millis(1200)), None);

        s.tick(t0 + Duration::from_millis(1300));
        assert!(s.flash.is_none());
        assert_eq!(s.mode(), &ScreenMode::Idle);
    }

    #[test]
    fn test_empty_tile_url_asks_for_tile() {
        let now = Instant::now();
        let mut s = uploaded_session(now);
        assert!(s.request_composite("  ", now).is_none());
        assert_eq!(s.message(now), Some(MSG_SELECT_TILE));
    }

    #[test]
    fn test_successful_composite_shows_result_and_download() {
        let now = Instant::now();
        let mut s = uploaded_session(now);

        let job = s.request_composite("https://cdn/tile.jpg", now).unwrap();
        assert_eq!(
            job,
            CompositeJob {
                tile_url: "https://cdn/tile.jpg".to_string(),
                room_url: "https://cdn/room.jpg".to_string(),
            }
        );
        assert_eq!(s.mode(), &ScreenMode::Compositing);
        assert!(s.display_url().is_none());
        assert!(!s.tiles_enabled());

        s.finish_composite(Ok("https://cdn/result.png".to_string()), now);
        assert_eq!(s.mode(), &ScreenMode::Result);
        assert_eq!(s.display_url(), Some("https://cdn/result.png"));
        assert_eq!(s.download_url(), Some("https://cdn/result.png"));
        assert_eq!(s.selected_tile(), Some("https://cdn/tile.jpg"));
    }

    #[test]
    fn test_composite_failure_enters_error_state() {
        let now = Instant::now();
        let mut s = uploaded_session(now);
        s.request_composite("https://cdn/tile.jpg", now).unwrap();

        s.finish_composite(Err(transport_error()), now);
        assert!(matches!(s.mode(), ScreenMode::Error { .. }));
        assert!(!s.can_download());
        assert_eq!(s.display_url(), Some("https://cdn/room.jpg"));
        assert!(s.tiles_enabled());

        // The room image is still known, so another tile can be tried right away
        assert!(s.request_composite("https://cdn/tile2.jpg", now).is_some());
    }

    #[test]
    fn test_single_request_in_flight() {
        let now = Instant::now();
        let mut s = uploaded_session(now);
        s.request_composite("https://cdn/a.jpg", now).unwrap();

        assert!(s.request_composite("https://cdn/b.jpg", now).is_none());
        assert_eq!(s.message(now), Some(MSG_BUSY));
        assert!(!s.select_file(Some(room_photo()), now));
        assert_eq!(s.mode(), &ScreenMode::Compositing);
    }

    #[test]
    fn test_stale_results_are_ignored() {
        let now = Instant::now();
        let mut s = session(now);
        s.finish_upload(Ok("https://cdn/late.jpg".to_string()), now);
        s.finish_composite(Ok("https://cdn/late.png".to_string()), now);
        assert_eq!(s.mode(), &ScreenMode::Idle);
        assert!(s.room_url().is_none());
    }

    #[test]
    fn test_crossfade_flips_after_delay() {
        let t0 = Instant::now();
        let mut s = uploaded_session(t0);

        let t1 = t0 + Duration::from_secs(10);
        s.request_composite("https://cdn/tile.jpg", t1).unwrap();
        s.finish_composite(Ok("https://cdn/result.png".to_string()), t1);

        assert!(!s.crossfade_showing_new(t1));
        assert_eq!(s.visible_image(t1), Some("https://cdn/room.jpg"));
        assert_eq!(s.next_deadline(t1), Some(CROSSFADE_DELAY));

        let t2 = t1 + Duration::from_millis(1999);
        assert_eq!(s.visible_image(t2), Some("https://cdn/room.jpg"));

        let t3 = t1 + Duration::from_millis(2000);
        assert!(s.crossfade_showing_new(t3));
        assert_eq!(s.visible_image(t3), Some("https://cdn/result.png"));
        assert_eq!(s.next_deadline(t3), None);
    }

    #[test]
    fn test_explicit_region() {
        let now = Instant::now();
        let mut s = session(now);
        s.select_file(Some(room_photo()), now);

        s.set_region(CropRegion::new(30, 20, 120, 80)).unwrap();
        let cropped = s.cropped().unwrap();
        assert_eq!(cropped.region, CropRegion::new(30, 20, 120, 80));
        assert_eq!(cropped.dimensions(), (120, 80));

        assert!(matches!(
            s.set_region(CropRegion::new(250, 0, 100, 100)),
            Err(VisualizerError::InvalidCrop { .. })
        ));
    }

    #[test]
    fn test_tiles_failed_is_visible() {
        let now = Instant::now();
        let mut s = session(now);
        s.tiles_failed(&VisualizerError::Config("no bucket".to_string()));
        assert!(matches!(s.mode(), ScreenMode::Error { .. }));
    }
}
