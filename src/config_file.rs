use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::cli::Args;
use crate::error::VisualizerError;
use crate::image_processing::crop::DEFAULT_ASPECT;
use crate::image_processing::DEFAULT_JPEG_QUALITY;
use crate::remote::download::LocalFiles;
use crate::remote::{Compositor, FirebaseStorage, HttpCompositor, LocalStorage, TileStorage};
use crate::session::SessionConfig;

pub const DEFAULT_BASE_URL: &str = "http://localhost:5000";
pub const DEFAULT_STORAGE_ENDPOINT: &str = "https://firebasestorage.googleapis.com/v0";

/// Where tiles are listed from and room photos are uploaded to
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StorageConfig {
    Firebase {
        #[serde(default = "default_storage_endpoint")]
        endpoint: String,
        #[serde(default)]
        bucket: String,
    },
    Local {
        root: PathBuf,
    },
}

fn default_storage_endpoint() -> String {
    DEFAULT_STORAGE_ENDPOINT.to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Firebase {
            endpoint: default_storage_endpoint(),
            bucket: String::new(),
        }
    }
}

/// Settings shared by the CLI and the GUI
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub base_url: String,
    pub storage: StorageConfig,
    pub tile_category: String,
    pub room_prefix: String,
    pub jpeg_quality: u8,
    pub request_timeout_secs: u64,
    pub message_millis: u64,
    pub crossfade_millis: u64,
    pub output_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            storage: StorageConfig::default(),
            tile_category: "tiles".to_string(),
            room_prefix: "room-images".to_string(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            request_timeout_secs: 60,
            message_millis: 1200,
            crossfade_millis: 2000,
            output_dir: PathBuf::from("."),
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write config file: {:?}", path))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            aspect: DEFAULT_ASPECT,
            jpeg_quality: self.jpeg_quality,
            room_prefix: self.room_prefix.clone(),
            message_duration: Duration::from_millis(self.message_millis),
            crossfade_delay: Duration::from_millis(self.crossfade_millis),
        }
    }

    pub fn build_storage(&self) -> std::result::Result<Arc<dyn TileStorage>, VisualizerError> {
        match &self.storage {
            StorageConfig::Firebase { endpoint, bucket } => {
                if bucket.trim().is_empty() {
                    return Err(VisualizerError::Config(
                        "No storage bucket configured (set a bucket or use a local storage folder)".to_string(),
                    ));
                }
                Ok(Arc::new(FirebaseStorage::new(endpoint, bucket.trim(), self.timeout())))
            }
            StorageConfig::Local { root } => Ok(Arc::new(LocalStorage::new(root.clone()))),
        }
    }

    /// Local paths are only trusted as image URLs when storage is a local folder
    pub fn local_files(&self) -> LocalFiles {
        match self.storage {
            StorageConfig::Local { .. } => LocalFiles::Allow,
            StorageConfig::Firebase { .. } => LocalFiles::Deny,
        }
    }

    pub fn build_compositor(&self) -> Arc<dyn Compositor> {
        Arc::new(HttpCompositor::new(&self.base_url, self.timeout()))
    }
}

impl Args {
    /// Load the `--config` file (or defaults) and apply command-line overrides on top
    pub fn resolve_config(&self) -> Result<AppConfig> {
        let mut config = match &self.config_file {
            Some(path) => {
                let config = AppConfig::load(path)?;
                if self.verbose {
                    eprintln!("Loaded configuration from: {:?}", path);
                }
                config
            }
            None => AppConfig::default(),
        };

        self.merge_into(&mut config);
        Ok(config)
    }

    fn merge_into(&self, config: &mut AppConfig) {
        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
        }

        if let Some(root) = &self.storage_dir {
            config.storage = StorageConfig::Local { root: root.clone() };
        } else if self.bucket.is_some() || self.storage_endpoint.is_some() {
            // Keep whichever half of the Firebase settings was not given on the command line
            let (file_endpoint, file_bucket) = match &config.storage {
                StorageConfig::Firebase { endpoint, bucket } => (endpoint.clone(), bucket.clone()),
                StorageConfig::Local { .. } => (default_storage_endpoint(), String::new()),
            };
            config.storage = StorageConfig::Firebase {
                endpoint: self.storage_endpoint.clone().unwrap_or(file_endpoint),
                bucket: self.bucket.clone().unwrap_or(file_bucket),
            };
        }

        if let Some(category) = &self.category {
            config.tile_category = category.clone();
        }
        if let Some(timeout) = self.timeout_secs {
            config.request_timeout_secs = timeout;
        }
        if let Some(output_dir) = &self.output_dir {
            config.output_dir = output_dir.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.base_url, "http://localhost:5000");
        assert_eq!(config.tile_category, "tiles");
        assert_eq!(config.session_config().message_duration, Duration::from_millis(1200));
        assert_eq!(config.session_config().crossfade_delay, Duration::from_millis(2000));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: AppConfig = serde_json::from_str(
            r#"{"baseUrl":"https://api.example.com","storage":{"kind":"firebase","bucket":"demo"}}"#,
        )
        .unwrap();

        assert_eq!(config.base_url, "https://api.example.com");
        assert_eq!(
            config.storage,
            StorageConfig::Firebase {
                endpoint: DEFAULT_STORAGE_ENDPOINT.to_string(),
                bucket: "demo".to_string(),
            }
        );
        assert_eq!(config.jpeg_quality, 92);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = AppConfig {
            storage: StorageConfig::Local {
                root: PathBuf::from("/srv/tiles"),
            },
            crossfade_millis: 500,
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(AppConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_command_line_takes_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"baseUrl":"https://from-file","tileCategory":"marble","storage":{"kind":"firebase","endpoint":"https://emulator/v0","bucket":"file-bucket"}}"#,
        )
        .unwrap();

        let args = Args {
            config_file: Some(path),
            base_url: Some("https://from-cli".to_string()),
            bucket: Some("cli-bucket".to_string()),
            ..Default::default()
        };
        let config = args.resolve_config().unwrap();

        assert_eq!(config.base_url, "https://from-cli");
        assert_eq!(config.tile_category, "marble");
        assert_eq!(
            config.storage,
            StorageConfig::Firebase {
                endpoint: "https://emulator/v0".to_string(),
                bucket: "cli-bucket".to_string(),
            }
        );
    }

    #[test]
    fn test_storage_dir_selects_local_backend() {
        let args = Args {
            storage_dir: Some(PathBuf::from("./storage")),
            ..Default::default()
        };
        let config = args.resolve_config().unwrap();
        assert_eq!(
            config.storage,
            StorageConfig::Local {
                root: PathBuf::from("./storage")
            }
        );
        assert!(config.build_storage().is_ok());
        assert_eq!(config.local_files(), LocalFiles::Allow);
    }

    #[test]
    fn test_missing_bucket_is_a_config_error() {
        let config = AppConfig::default();
        assert!(matches!(
            config.build_storage(),
            Err(VisualizerError::Config(_))
        ));
        assert_eq!(config.local_files(), LocalFiles::Deny);
    }
}
