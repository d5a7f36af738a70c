use eframe::egui;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::time::Instant;

use tile_visualizer::image_processing::crop::{MAX_ZOOM, MIN_ZOOM, ZOOM_STEP};
use tile_visualizer::remote::{Compositor, TileImage, TileStorage};
use tile_visualizer::{AppConfig, Cropper, ScreenMode, Session, StorageConfig, UserImage, VisualizerError};

#[path = "app_processing.rs"]
mod app_processing;

/// Longest side of a gallery thumbnail, in pixels
pub(crate) const THUMBNAIL_SIZE: u32 = 160;
/// Longest side of the room/result image and of the crop preview
pub(crate) const DISPLAY_SIZE: u32 = 1600;

const GALLERY_WIDTH: f32 = 380.0;
const TILE_BUTTON_SIZE: f32 = 104.0;

pub struct TileVisualizerApp {
    ctx: egui::Context,
    config: AppConfig,
    config_path: Option<PathBuf>,
    session: Session,

    storage: Option<Arc<dyn TileStorage>>,
    compositor: Arc<dyn Compositor>,

    // Textures keyed by URL
    thumbnails: HashMap<String, egui::TextureHandle>,
    images: HashMap<String, egui::TextureHandle>,
    requested_images: HashSet<String>,

    // Crop dialog
    crop_texture: Option<egui::TextureHandle>,
    crop_preview: Option<Cropper>,
    loading_photo: bool,

    // Settings panel (edited copy, applied on demand)
    settings_open: bool,
    settings_bucket: String,
    settings_local_root: String,
    settings_use_local: bool,

    status_message: String,
    worker_tx: Sender<WorkerMessage>,
    worker_rx: Receiver<WorkerMessage>,
}

/// Results sent back from background threads
pub(crate) enum WorkerMessage {
    Tiles(Result<Vec<TileImage>, VisualizerError>),
    Thumbnail {
        url: String,
        image: Result<egui::ColorImage, VisualizerError>,
    },
    Image {
        url: String,
        image: Result<egui::ColorImage, VisualizerError>,
    },
    /// Decoded photo plus its downscaled crop-view texture
    PhotoLoaded(Result<(UserImage, egui::ColorImage), VisualizerError>),
    Uploaded(Result<String, VisualizerError>),
    Composited(Result<String, VisualizerError>),
    Downloaded(Result<PathBuf, VisualizerError>),
}

impl TileVisualizerApp {
    pub fn new(cc: &eframe::CreationContext<'_>) -> Self {
        let config_path = app_processing::config_path();
        let config = config_path
            .as_deref()
            .filter(|path| path.exists())
            .and_then(|path| match AppConfig::load(path) {
                Ok(config) => Some(config),
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring unreadable config file");
                    None
                }
            })
            .unwrap_or_default();

        let (settings_bucket, settings_local_root, settings_use_local) = match &config.storage {
            StorageConfig::Firebase { bucket, .. } => (bucket.clone(), String::new(), false),
            StorageConfig::Local { root } => (String::new(), root.display().to_string(), true),
        };

        let (worker_tx, worker_rx) = channel();
        let mut app = Self {
            ctx: cc.egui_ctx.clone(),
            session: Session::new(config.session_config(), Instant::now()),
            compositor: config.build_compositor(),
            storage: None,
            config,
            config_path,
            thumbnails: HashMap::new(),
            images: HashMap::new(),
            requested_images: HashSet::new(),
            crop_texture: None,
            crop_preview: None,
            loading_photo: false,
            settings_open: false,
            settings_bucket,
            settings_local_root,
            settings_use_local,
            status_message: String::new(),
            worker_tx,
            worker_rx,
        };
        app.connect_storage();
        app
    }

    fn render_header(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.heading("Tile Visualizer");
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui.button("⚙ Settings").clicked() {
                    self.settings_open = !self.settings_open;
                }
            });
        });
        ui.label("See a tile in your room before you buy it");
        ui.separator();
    }

    fn render_settings(&mut self, ui: &mut egui::Ui) {
        if !self.settings_open {
            return;
        }

        ui.heading("Settings");
        egui::Grid::new("settings_grid").num_columns(2).show(ui, |ui| {
            ui.label("Compositing service:");
            ui.text_edit_singleline(&mut self.config.base_url);
            ui.end_row();

            ui.label("Storage:");
            ui.horizontal(|ui| {
                ui.radio_value(&mut self.settings_use_local, false, "Firebase");
                ui.radio_value(&mut self.settings_use_local, true, "Local folder");
            });
            ui.end_row();

            if self.settings_use_local {
                ui.label("Folder:");
                ui.horizontal(|ui| {
                    ui.text_edit_singleline(&mut self.settings_local_root);
                    if ui.button("Browse...").clicked() {
                        if let Some(path) = rfd::FileDialog::new().pick_folder() {
                            self.settings_local_root = path.display().to_string();
                        }
                    }
                });
            } else {
                ui.label("Bucket:");
                ui.text_edit_singleline(&mut self.settings_bucket);
            }
            ui.end_row();

            ui.label("Tile folder:");
            ui.text_edit_singleline(&mut self.config.tile_category);
            ui.end_row();

            ui.label("Timeout (s):");
            ui.add(egui::DragValue::new(&mut self.config.request_timeout_secs).range(1..=600));
            ui.end_row();
        });

        if ui.button("Apply").clicked() {
            self.apply_settings();
        }
        ui.separator();
    }

    fn apply_settings(&mut self) {
        self.config.storage = if self.settings_use_local {
            StorageConfig::Local {
                root: PathBuf::from(self.settings_local_root.trim()),
            }
        } else {
            let endpoint = match &self.config.storage {
                StorageConfig::Firebase { endpoint, .. } => endpoint.clone(),
                StorageConfig::Local { .. } => {
                    tile_visualizer::config_file::DEFAULT_STORAGE_ENDPOINT.to_string()
                }
            };
            StorageConfig::Firebase {
                endpoint,
                bucket: self.settings_bucket.trim().to_string(),
            }
        };
        self.compositor = self.config.build_compositor();
        self.save_config();
        self.connect_storage();
    }

    /// Drop textures for anything other than the current room and display images
    fn prune_images(&mut self) {
        let keep: Vec<&str> = [self.session.room_url(), self.session.display_url()]
            .into_iter()
            .flatten()
            .collect();
        retain_urls(&mut self.images, &mut self.requested_images, &keep);
    }

    /// The main slot: placeholder, spinner, or the room/result image
    fn render_display(&mut self, ui: &mut egui::Ui, now: Instant) {
        let available = ui.available_size();
        let slot = egui::vec2(available.x, (available.x / 1.5).min(available.y - 120.0).max(200.0));

        let visible = self.session.visible_image(now).map(str::to_string);
        match visible {
            Some(url) => {
                self.request_image(&url);
                match self.images.get(&url) {
                    Some(texture) => {
                        let size = fit_size(texture.size_vec2(), slot);
                        ui.vertical_centered(|ui| {
                            ui.add(egui::Image::new((texture.id(), size)));
                        });
                    }
                    None => placeholder(ui, slot, None, true),
                }
            }
            None => {
                let busy = self.session.mode().is_busy() || self.loading_photo;
                placeholder(ui, slot, self.session.instruction(), busy);
            }
        }
    }

    fn render_status(&mut self, ui: &mut egui::Ui, now: Instant) {
        if let ScreenMode::Error { message } = self.session.mode() {
            let message = message.clone();
            ui.horizontal(|ui| {
                ui.colored_label(egui::Color32::RED, format!("⚠ {}", message));
                if ui.small_button("Dismiss").clicked() {
                    self.session.dismiss_error();
                }
            });
        }

        if let Some(message) = self.session.message(now) {
            ui.colored_label(egui::Color32::from_rgb(230, 160, 30), message);
        }

        match self.session.mode() {
            ScreenMode::Uploading => {
                ui.label("Uploading room image...");
            }
            ScreenMode::Compositing => {
                ui.label("Applying tile...");
            }
            _ => {}
        }

        if !self.status_message.is_empty() {
            ui.label(&self.status_message);
        }
    }

    fn render_actions(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let busy = self.session.mode().is_busy() || self.loading_photo;
            let upload = egui::Button::new("📷 Upload room image").min_size(egui::vec2(180.0, 36.0));
            if ui.add_enabled(!busy, upload).clicked() {
                self.pick_photo();
            }

            let download = egui::Button::new("⬇ Download").min_size(egui::vec2(140.0, 36.0));
            if ui.add_enabled(self.session.can_download(), download).clicked() {
                self.start_download();
            }
        });
    }

    fn render_gallery(&mut self, ui: &mut egui::Ui, now: Instant) {
        ui.heading("Tiles");
        ui.separator();

        if self.session.tiles().is_empty() {
            ui.label("No tiles loaded");
            return;
        }

        let enabled = self.session.tiles_enabled();
        let selected = self.session.selected_tile().map(str::to_string);
        let tiles: Vec<TileImage> = self.session.tiles().to_vec();
        let mut clicked = None;

        egui::ScrollArea::vertical().show(ui, |ui| {
            ui.horizontal_wrapped(|ui| {
                for tile in &tiles {
                    let size = egui::vec2(TILE_BUTTON_SIZE, TILE_BUTTON_SIZE);
                    let response = match self.thumbnails.get(&tile.url) {
                        Some(texture) => ui.add_enabled(
                            enabled,
                            egui::Button::image(egui::Image::new((texture.id(), size)))
                                .selected(selected.as_deref() == Some(tile.url.as_str())),
                        ),
                        None => ui.add_enabled(enabled, egui::Button::new(&tile.name).min_size(size)),
                    };
                    if response.on_hover_text(&tile.name).clicked() {
                        clicked = Some(tile.url.clone());
                    }
                }
            });
        });

        if let Some(url) = clicked {
            self.start_composite(&url, now);
        }
    }

    /// Modal crop dialog: draggable 3:2 frame over the photo plus a zoom slider
    fn render_crop_dialog(&mut self, ctx: &egui::Context, now: Instant) {
        if self.session.mode() != &ScreenMode::Cropping {
            return;
        }
        let (Some(texture), Some(mut preview)) = (self.crop_texture.clone(), self.crop_preview.clone())
        else {
            return;
        };

        let mut confirm = false;
        let mut cancel = false;
        let mut commit = false;

        egui::Window::new("Crop your room image")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
            .show(ctx, |ui| {
                let (image_w, image_h) = preview.image_size();
                let display = fit_size(
                    egui::vec2(image_w as f32, image_h as f32),
                    egui::vec2(720.0, 480.0),
                );
                let scale = display.x / image_w as f32;

                let (rect, response) = ui.allocate_exact_size(display, egui::Sense::drag());
                let painter = ui.painter_at(rect);
                painter.image(
                    texture.id(),
                    rect,
                    egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                    egui::Color32::from_gray(110),
                );

                if response.dragged() {
                    let delta = response.drag_delta() / scale;
                    preview.pan_by(delta.x as f64, delta.y as f64);
                }
                if response.drag_stopped() {
                    commit = true;
                }

                let region = preview.region();
                let frame = egui::Rect::from_min_size(
                    rect.min + egui::vec2(region.x as f32, region.y as f32) * scale,
                    egui::vec2(region.width as f32, region.height as f32) * scale,
                );
                let uv = egui::Rect::from_min_max(
                    egui::pos2(region.x as f32 / image_w as f32, region.y as f32 / image_h as f32),
                    egui::pos2(
                        (region.x + region.width) as f32 / image_w as f32,
                        (region.y + region.height) as f32 / image_h as f32,
                    ),
                );
                painter.image(texture.id(), frame, uv, egui::Color32::WHITE);
                painter.rect_stroke(
                    frame,
                    0.0,
                    egui::Stroke::new(2.0, egui::Color32::WHITE),
                    egui::StrokeKind::Inside,
                );

                ui.horizontal(|ui| {
                    ui.label("Zoom:");
                    let mut zoom = preview.zoom();
                    let slider = ui.add(egui::Slider::new(&mut zoom, MIN_ZOOM..=MAX_ZOOM).step_by(ZOOM_STEP));
                    if slider.changed() {
                        preview.set_zoom(zoom);
                    }
                    if slider.drag_stopped() || (slider.changed() && !slider.dragged()) {
                        commit = true;
                    }
                });

                ui.label(format!("{}x{} px", region.width, region.height));

                ui.horizontal(|ui| {
                    if ui.button("Cancel").clicked() {
                        cancel = true;
                    }
                    let select = egui::Button::new("Select").min_size(egui::vec2(100.0, 28.0));
                    if ui.add(select).clicked() {
                        confirm = true;
                    }
                });
            });

        self.crop_preview = Some(preview);
        if commit || confirm {
            self.commit_crop();
        }
        if cancel {
            self.session.cancel_crop();
            self.crop_texture = None;
            self.crop_preview = None;
        } else if confirm {
            self.start_upload(now);
        }
    }
}

/// Largest size with the texture's aspect ratio inside `bounds`
pub(crate) fn fit_size(size: egui::Vec2, bounds: egui::Vec2) -> egui::Vec2 {
    if size.x <= 0.0 || size.y <= 0.0 {
        return bounds;
    }
    let scale = (bounds.x / size.x).min(bounds.y / size.y);
    size * scale
}

fn placeholder(ui: &mut egui::Ui, size: egui::Vec2, text: Option<&str>, busy: bool) {
    let (rect, _) = ui.allocate_exact_size(size, egui::Sense::hover());
    let painter = ui.painter_at(rect);
    painter.rect_filled(rect, 8.0, ui.visuals().extreme_bg_color);

    if busy {
        let spinner_rect = egui::Rect::from_center_size(rect.center(), egui::vec2(48.0, 48.0));
        ui.put(spinner_rect, egui::Spinner::new().size(48.0));
    } else if let Some(text) = text {
        painter.text(
            rect.center(),
            egui::Align2::CENTER_CENTER,
            text,
            egui::FontId::proportional(22.0),
            ui.visuals().weak_text_color(),
        );
    }
}

impl eframe::App for TileVisualizerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let now = Instant::now();

        // Check for results from background threads
        self.check_progress(now);
        self.session.tick(now);
        self.prune_images();

        egui::SidePanel::right("gallery")
            .resizable(false)
            .exact_width(GALLERY_WIDTH)
            .show(ctx, |ui| {
                self.render_gallery(ui, now);
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| {
                self.render_header(ui);
                self.render_settings(ui);
                self.render_display(ui, now);
                ui.add_space(8.0);
                self.render_actions(ui);
                self.render_status(ui, now);
            });
        });

        self.render_crop_dialog(ctx, now);

        // Wake up again when a timer changes the screen
        if let Some(delay) = self.session.next_deadline(now) {
            ctx.request_repaint_after(delay);
        }
        if self.session.mode().is_busy() || self.loading_photo {
            ctx.request_repaint();
        }
    }
}

fn retain_urls<T>(images: &mut HashMap<String, T>, requested: &mut HashSet<String>, keep: &[&str]) {
    images.retain(|url, _| keep.contains(&url.as_str()));
    requested.retain(|url| keep.contains(&url.as_str()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retain_urls_evicts_stale_results() {
        let mut images: HashMap<String, u32> = HashMap::new();
        let mut requested = HashSet::new();
        for url in ["room", "result-1", "result-2"] {
            images.insert(url.to_string(), 0);
            requested.insert(url.to_string());
        }
        requested.insert("failed".to_string());

        retain_urls(&mut images, &mut requested, &["room", "result-2"]);

        let mut kept: Vec<&str> = images.keys().map(String::as_str).collect();
        kept.sort();
        assert_eq!(kept, vec!["result-2", "room"]);
        assert_eq!(requested.len(), 2);
        assert!(!requested.contains("result-1"));
        assert!(!requested.contains("failed"));
    }

    #[test]
    fn test_fit_size_keeps_aspect() {
        let fitted = fit_size(egui::vec2(3000.0, 2000.0), egui::vec2(600.0, 600.0));
        assert_eq!(fitted, egui::vec2(600.0, 400.0));

        let tall = fit_size(egui::vec2(1000.0, 2000.0), egui::vec2(600.0, 600.0));
        assert_eq!(tall, egui::vec2(300.0, 600.0));
    }
}
