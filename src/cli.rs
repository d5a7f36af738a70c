use clap::Parser;
use std::path::PathBuf;

use crate::image_processing::CropRegion;

/// Which tile to apply: a position in the gallery listing or a direct URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileChoice {
    /// 1-based position, as printed by `--list-tiles`
    Index(usize),
    Url(String),
}

#[derive(Parser, Debug)]
#[command(
    name = "tile-visualizer",
    version,
    about = "Preview tile swatches on a photo of your room",
    long_about = "
Tile Visualizer

Crops a room photo to a 3:2 frame, uploads it to tile storage, asks the
compositing service to lay a tile swatch over it, and downloads the result.

Example Usage:
  # Show the tile gallery
  tile-visualizer --bucket my-app.appspot.com --list-tiles

  # Apply the third tile from the gallery to a room photo
  tile-visualizer --bucket my-app.appspot.com -i ~/Photos/kitchen.jpg -t 3 -o ~/renders

  # Zoom in and move the crop frame 200px right of center
  tile-visualizer -i kitchen.jpg -t 3 --zoom 1.5 --pan-x 200

  # Exact crop region (WIDTHxHEIGHT+X+Y) and a tile URL
  tile-visualizer -i kitchen.jpg --crop 1200x800+100+50 -t https://cdn.example.com/oak.jpg

  # Offline: tiles and uploads in a local directory
  tile-visualizer --storage-dir ./storage -i kitchen.jpg -t 1

  # Only write the cropped JPEG, no network
  tile-visualizer -i kitchen.jpg --zoom 2 --dry-run -o /tmp"
)]
pub struct Args {
    /// Room photo to crop and upload
    #[arg(
        short = 'i',
        long = "input",
        value_name = "FILE",
        required_unless_present = "list_tiles"
    )]
    pub input: Option<PathBuf>,

    /// Tile to apply: 1-based gallery index or an image URL
    #[arg(
        short = 't',
        long = "tile",
        value_name = "INDEX|URL",
        required_unless_present_any = ["list_tiles", "dry_run"]
    )]
    pub tile: Option<String>,

    /// Directory the composited image (or the crop, with --dry-run) is written to
    #[arg(short = 'o', long = "output", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Crop zoom factor (1.0 - 3.0)
    #[arg(long = "zoom", value_name = "FACTOR")]
    pub zoom: Option<f64>,

    /// Horizontal offset of the crop frame from the photo center, in pixels
    #[arg(long = "pan-x", default_value = "0", value_name = "PX", allow_hyphen_values = true)]
    pub pan_x: f64,

    /// Vertical offset of the crop frame from the photo center, in pixels
    #[arg(long = "pan-y", default_value = "0", value_name = "PX", allow_hyphen_values = true)]
    pub pan_y: f64,

    /// Explicit crop region instead of zoom/pan (format: WIDTHxHEIGHT+X+Y)
    #[arg(long = "crop", value_name = "GEOMETRY")]
    pub crop: Option<CropRegion>,

    /// Base URL of the compositing service
    #[arg(long = "base-url", value_name = "URL")]
    pub base_url: Option<String>,

    /// Firebase Storage bucket holding tiles and room uploads
    #[arg(long = "bucket", value_name = "NAME")]
    pub bucket: Option<String>,

    /// Firebase Storage REST endpoint
    #[arg(long = "storage-endpoint", value_name = "URL")]
    pub storage_endpoint: Option<String>,

    /// Use a local directory as storage instead of Firebase
    #[arg(long = "storage-dir", value_name = "DIR")]
    pub storage_dir: Option<PathBuf>,

    /// Storage folder the tile swatches are listed from
    #[arg(long = "category", value_name = "NAME")]
    pub category: Option<String>,

    /// Network timeout per request, in seconds
    #[arg(long = "timeout", value_name = "SECS")]
    pub timeout_secs: Option<u64>,

    /// JSON configuration file (command-line flags take precedence)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Print the tile gallery and exit
    #[arg(long = "list-tiles")]
    pub list_tiles: bool,

    /// Crop and write the JPEG locally without any network calls
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Emit progress as JSON lines on stdout (for scripts and other front-ends)
    #[arg(long = "json-progress")]
    pub json_progress: bool,

    /// Enable verbose output with detailed progress information
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

impl Args {
    /// Parse the `--tile` value: a positive integer selects from the gallery
    pub fn tile_choice(&self) -> Option<Result<TileChoice, String>> {
        let raw = self.tile.as_deref()?.trim();
        Some(parse_tile_choice(raw))
    }
}

fn parse_tile_choice(raw: &str) -> Result<TileChoice, String> {
    if raw.is_empty() {
        return Err("Tile must not be empty".to_string());
    }
    if raw.chars().all(|c| c.is_ascii_digit()) {
        return match raw.parse::<usize>() {
            Ok(0) => Err("Tile indices start at 1".to_string()),
            Ok(index) => Ok(TileChoice::Index(index)),
            Err(_) => Err(format!("Tile index out of range: '{}'", raw)),
        };
    }
    Ok(TileChoice::Url(raw.to_string()))
}


// Default implementation for tests
#[cfg(test)]
impl Default for Args {
    fn default() -> Self {
        Self {
            input: None,
            tile: None,
            output_dir: None,
            zoom: None,
            pan_x: 0.0,
            pan_y: 0.0,
            crop: None,
            base_url: None,
            bucket: None,
            storage_endpoint: None,
            storage_dir: None,
            category: None,
            timeout_secs: None,
            config_file: None,
            list_tiles: false,
            dry_run: false,
            json_progress: false,
            verbose: false,
        }
    }
}
