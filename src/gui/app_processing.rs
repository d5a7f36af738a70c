// Background work for the GUI
// Network and decoding run on worker threads and report back over the app's channel

use super::{TileVisualizerApp, WorkerMessage, DISPLAY_SIZE, THUMBNAIL_SIZE};
use eframe::egui;
use image::RgbImage;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tile_visualizer::image_processing::resize::fit_within;
use tile_visualizer::remote::download::{self, LocalFiles};
use tile_visualizer::remote::{http_agent, TileImage};
use tile_visualizer::utils::{unix_millis, IMAGE_EXTENSIONS};
use tile_visualizer::{UserImage, VisualizerError};

/// Location of the persisted GUI settings
pub(crate) fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("tile-visualizer").join("config.json"))
}

fn to_color_image(img: &RgbImage) -> egui::ColorImage {
    let size = [img.width() as usize, img.height() as usize];
    egui::ColorImage::from_rgb(size, img.as_raw())
}

/// Fetch an image (remote or local) and shrink it for display
fn fetch_display_image(
    agent: &ureq::Agent,
    url: &str,
    max_side: u32,
    local_files: LocalFiles,
) -> Result<egui::ColorImage, VisualizerError> {
    let downloaded = download::fetch_image(agent, url, local_files)?;
    let decoded = image::load_from_memory(&downloaded.bytes)?.to_rgb8();
    Ok(to_color_image(&fit_within(&decoded, max_side)?))
}

fn load_photo(path: &Path) -> Result<(UserImage, egui::ColorImage), VisualizerError> {
    let photo = UserImage::open(path)?;
    let preview = to_color_image(&fit_within(&photo.pixels, DISPLAY_SIZE)?);
    Ok((photo, preview))
}

impl TileVisualizerApp {
    pub(crate) fn save_config(&self) {
        let Some(path) = &self.config_path else {
            return;
        };
        if let Err(e) = self.config.save(path) {
            tracing::warn!(error = %e, "failed to save settings");
        }
    }

    /// (Re)build the storage client from the config and reload the gallery
    pub(crate) fn connect_storage(&mut self) {
        self.thumbnails.clear();
        self.session.set_tiles(Vec::new());

        match self.config.build_storage() {
            Ok(storage) => {
                self.storage = Some(storage);
                self.start_tile_listing();
            }
            Err(e) => {
                self.storage = None;
                self.session.tiles_failed(&e);
            }
        }
    }

    fn start_tile_listing(&self) {
        let Some(storage) = self.storage.clone() else {
            return;
        };
        let category = self.config.tile_category.clone();
        let tx = self.worker_tx.clone();
        let ctx = self.ctx.clone();

        std::thread::spawn(move || {
            let _ = tx.send(WorkerMessage::Tiles(storage.list_tiles(&category)));
            ctx.request_repaint();
        });
    }

    fn start_thumbnails(&self, tiles: Vec<TileImage>) {
        let tx = self.worker_tx.clone();
        let ctx = self.ctx.clone();
        let agent = http_agent(self.config.timeout());
        let local_files = self.config.local_files();

        std::thread::spawn(move || {
            tiles.par_iter().for_each_with(tx, |tx, tile| {
                let image = fetch_display_image(&agent, &tile.url, THUMBNAIL_SIZE, local_files);
                let _ = tx.send(WorkerMessage::Thumbnail {
                    url: tile.url.clone(),
                    image,
                });
                ctx.request_repaint();
            });
        });
    }

    /// Start loading the texture for a room/result URL, once per URL
    pub(crate) fn request_image(&mut self, url: &str) {
        if !self.requested_images.insert(url.to_string()) {
            return;
        }

        let url = url.to_string();
        let tx = self.worker_tx.clone();
        let ctx = self.ctx.clone();
        let agent = http_agent(self.config.timeout());
        let local_files = self.config.local_files();

        std::thread::spawn(move || {
            let image = fetch_display_image(&agent, &url, DISPLAY_SIZE, local_files);
            let _ = tx.send(WorkerMessage::Image { url, image });
            ctx.request_repaint();
        });
    }

    pub(crate) fn pick_photo(&mut self) {
        let picked = rfd::FileDialog::new()
            .add_filter("Images", IMAGE_EXTENSIONS)
            .pick_file();

        let Some(path) = picked else {
            self.session.select_file(None, Instant::now());
            return;
        };

        self.loading_photo = true;
        self.status_message.clear();
        let tx = self.worker_tx.clone();
        let ctx = self.ctx.clone();

        std::thread::spawn(move || {
            let _ = tx.send(WorkerMessage::PhotoLoaded(load_photo(&path)));
            ctx.request_repaint();
        });
    }

    /// Push the crop dialog's frame into the session (re-rasterizes the crop)
    pub(crate) fn commit_crop(&mut self) {
        if let Some(preview) = &self.crop_preview {
            let (pan_x, pan_y) = preview.pan();
            self.session.set_zoom(preview.zoom());
            self.session.set_pan(pan_x, pan_y);
        }
    }

    pub(crate) fn start_upload(&mut self, now: Instant) {
        let job = self.session.confirm_crop(now);
        self.crop_texture = None;
        self.crop_preview = None;

        let Some(job) = job else {
            return;
        };
        let Some(storage) = self.storage.clone() else {
            self.session.finish_upload(
                Err(VisualizerError::Config("No storage configured".to_string())),
                now,
            );
            return;
        };

        let tx = self.worker_tx.clone();
        let ctx = self.ctx.clone();
        std::thread::spawn(move || {
            let outcome = storage.upload(&job.key, &job.bytes, job.content_type);
            let _ = tx.send(WorkerMessage::Uploaded(outcome));
            ctx.request_repaint();
        });
    }

    pub(crate) fn start_composite(&mut self, tile_url: &str, now: Instant) {
        let Some(job) = self.session.request_composite(tile_url, now) else {
            return;
        };

        let compositor = self.compositor.clone();
        let tx = self.worker_tx.clone();
        let ctx = self.ctx.clone();
        std::thread::spawn(move || {
            let outcome = compositor.apply_tiles(&job.tile_url, &job.room_url);
            let _ = tx.send(WorkerMessage::Composited(outcome));
            ctx.request_repaint();
        });
    }

    pub(crate) fn start_download(&mut self) {
        let Some(url) = self.session.download_url().map(str::to_string) else {
            return;
        };
        let Some(dir) = rfd::FileDialog::new()
            .set_directory(&self.config.output_dir)
            .pick_folder()
        else {
            return;
        };

        self.config.output_dir = dir.clone();
        self.save_config();
        self.status_message = "Downloading...".to_string();

        let agent = http_agent(self.config.timeout());
        let local_files = self.config.local_files();
        let tx = self.worker_tx.clone();
        let ctx = self.ctx.clone();
        std::thread::spawn(move || {
            let outcome = download::download_result(&agent, &url, &dir, unix_millis(), local_files);
            let _ = tx.send(WorkerMessage::Downloaded(outcome));
            ctx.request_repaint();
        });
    }

    /// Apply every result the workers have sent since the last frame
    pub fn check_progress(&mut self, now: Instant) {
        let messages: Vec<WorkerMessage> = self.worker_rx.try_iter().collect();

        for msg in messages {
            match msg {
                WorkerMessage::Tiles(Ok(tiles)) => {
                    self.session.set_tiles(tiles.clone());
                    self.start_thumbnails(tiles);
                }
                WorkerMessage::Tiles(Err(e)) => self.session.tiles_failed(&e),
                WorkerMessage::Thumbnail { url, image } => match image {
                    Ok(image) => {
                        let texture = self.ctx.load_texture(
                            format!("thumb:{}", url),
                            image,
                            egui::TextureOptions::LINEAR,
                        );
                        self.thumbnails.insert(url, texture);
                    }
                    Err(e) => tracing::warn!(%url, error = %e, "failed to load thumbnail"),
                },
                // Failed URLs stay in `requested_images` while on screen so they are not retried every frame
                WorkerMessage::Image { url, image } => {
                    match image {
                        Ok(image) => {
                            let texture = self.ctx.load_texture(
                                format!("image:{}", url),
                                image,
                                egui::TextureOptions::LINEAR,
                            );
                            self.images.insert(url, texture);
                        }
                        Err(e) => {
                            tracing::error!(%url, error = %e, "failed to load image");
                            self.status_message = format!("Could not display image: {}", e);
                        }
                    }
                }
                WorkerMessage::PhotoLoaded(outcome) => {
                    self.loading_photo = false;
                    match outcome {
                        Ok((photo, preview)) => {
                            if self.session.select_file(Some(photo), now) {
                                self.crop_texture = Some(self.ctx.load_texture(
                                    "crop-photo",
                                    preview,
                                    egui::TextureOptions::LINEAR,
                                ));
                                self.crop_preview = self.session.cropper().cloned();
                            }
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "failed to open room photo");
                            self.status_message = format!("Could not open image: {}", e);
                        }
                    }
                }
                WorkerMessage::Uploaded(outcome) => self.session.finish_upload(outcome, now),
                WorkerMessage::Composited(outcome) => self.session.finish_composite(outcome, now),
                WorkerMessage::Downloaded(outcome) => {
                    self.status_message = match outcome {
                        Ok(path) => format!("✓ Saved {}", path.display()),
                        Err(e) => {
                            tracing::error!(error = %e, "download failed");
                            format!("Download failed: {}", e)
                        }
                    };
                }
            }
        }
    }
}
