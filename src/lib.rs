// Library exports for reuse by GUI and other applications
pub mod cli;
pub mod config_file;
pub mod error;
pub mod image_processing;
pub mod json_output;
pub mod remote;
pub mod session;
pub mod utils;

// Re-export commonly used types
pub use config_file::{AppConfig, StorageConfig};
pub use error::{Result, VisualizerError};
pub use image_processing::{CropRegion, CroppedImage, Cropper, UserImage};
pub use json_output::JsonMessage;
pub use remote::{Compositor, TileImage, TileStorage};
pub use session::{ScreenMode, Session, SessionConfig};
