//! JSON output for scripted use
//!
//! When --json-progress flag is enabled, every stage of the CLI flow is
//! emitted as a JSON line on stdout and all other output is suppressed.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::remote::TileImage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum JsonMessage {
    /// A stage of the flow started
    Stage { stage: String, message: String },
    /// The tile gallery (`--list-tiles`)
    Tiles { tiles: Vec<TileImage> },
    /// Room photo stored
    Uploaded { key: String, url: String, bytes: usize },
    /// Compositing service returned a result
    Composited {
        #[serde(rename = "tileUrl")]
        tile_url: String,
        #[serde(rename = "roomUrl")]
        room_url: String,
        #[serde(rename = "resultUrl")]
        result_url: String,
    },
    /// A file was written locally
    Downloaded { path: String },
    Failed { stage: String, error: String },
    Summary { success: bool, duration_secs: f64 },
}

impl JsonMessage {
    /// Emit JSON message to stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    pub fn stage(stage: &str, message: impl Into<String>) {
        Self::Stage {
            stage: stage.to_string(),
            message: message.into(),
        }
        .emit();
    }

    pub fn uploaded(key: &str, url: &str, bytes: usize) {
        Self::Uploaded {
            key: key.to_string(),
            url: url.to_string(),
            bytes,
        }
        .emit();
    }

    pub fn composited(tile_url: &str, room_url: &str, result_url: &str) {
        Self::Composited {
            tile_url: tile_url.to_string(),
            room_url: room_url.to_string(),
            result_url: result_url.to_string(),
        }
        .emit();
    }

    pub fn downloaded(path: &Path) {
        Self::Downloaded {
            path: path.display().to_string(),
        }
        .emit();
    }

    pub fn failed(stage: &str, error: impl Into<String>) {
        Self::Failed {
            stage: stage.to_string(),
            error: error.into(),
        }
        .emit();
    }

    pub fn summary(success: bool, duration_secs: f64) {
        Self::Summary {
            success,
            duration_secs,
        }
        .emit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_messages_are_tagged_by_type() {
        let msg = JsonMessage::Composited {
            tile_url: "t".to_string(),
            room_url: "r".to_string(),
            result_url: "o".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "composited", "tileUrl": "t", "roomUrl": "r", "resultUrl": "o"})
        );

        let failed = JsonMessage::Failed {
            stage: "upload".to_string(),
            error: "boom".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            json!({"type": "failed", "stage": "upload", "error": "boom"})
        );
    }

    #[test]
    fn test_parse_line() {
        let line = r#"{"type":"uploaded","key":"room-images/1_2.jpg","url":"u","bytes":10}"#;
        let msg: JsonMessage = serde_json::from_str(line).unwrap();
        assert_eq!(
            msg,
            JsonMessage::Uploaded {
                key: "room-images/1_2.jpg".to_string(),
                url: "u".to_string(),
                bytes: 10,
            }
        );
    }
}
