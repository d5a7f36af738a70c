use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::http_agent;
use crate::error::{Result, VisualizerError};

pub const APPLY_TILES_PATH: &str = "/api/v1/apply-tiles";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyTilesRequest {
    pub tile_image: String,
    pub room_image: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyTilesResponse {
    pub image: String,
}

/// Service that renders a tile onto a room photo
pub trait Compositor: Send + Sync {
    /// Returns the URL of the composited image
    fn apply_tiles(&self, tile_url: &str, room_url: &str) -> Result<String>;
}

pub struct HttpCompositor {
    base_url: String,
    agent: ureq::Agent,
}

pub fn apply_tiles_url(base_url: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), APPLY_TILES_PATH)
}

impl HttpCompositor {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.to_string(),
            agent: http_agent(timeout),
        }
    }

    pub fn endpoint(&self) -> String {
        apply_tiles_url(&self.base_url)
    }
}

fn parse_response(url: &str, response: ApplyTilesResponse) -> Result<String> {
    let image = response.image.trim();
    if image.is_empty() {
        return Err(VisualizerError::malformed(url, "response has an empty 'image' field"));
    }
    Ok(image.to_string())
}

impl Compositor for HttpCompositor {
    fn apply_tiles(&self, tile_url: &str, room_url: &str) -> Result<String> {
        let url = self.endpoint();
        let body = ApplyTilesRequest {
            tile_image: tile_url.to_string(),
            room_image: room_url.to_string(),
        };

        tracing::info!(%url, tile = tile_url, "requesting composite");
        let response = self
            .agent
            .post(&url)
            .send_json(&body)
            .map_err(|e| VisualizerError::from_ureq(&url, e))?;

        let parsed: ApplyTilesResponse = response
            .into_json()
            .map_err(|e| VisualizerError::malformed(&url, e.to_string()))?;

        parse_response(&url, parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_apply_tiles_url() {
        assert_eq!(
            apply_tiles_url("http://localhost:5000"),
            "http://localhost:5000/api/v1/apply-tiles"
        );
        assert_eq!(
            apply_tiles_url("http://localhost:5000/"),
            "http://localhost:5000/api/v1/apply-tiles"
        );
    }

    #[test]
    fn test_request_shape() {
        let body = ApplyTilesRequest {
            tile_image: "https://cdn/tile.jpg".to_string(),
            room_image: "https://cdn/room.jpg".to_string(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "tileImage": "https://cdn/tile.jpg",
                "roomImage": "https://cdn/room.jpg"
            })
        );
    }

    #[test]
    fn test_response_parsing() {
        let response: ApplyTilesResponse =
            serde_json::from_str(r#"{"image":"https://cdn/result.png","extra":1}"#).unwrap();
        assert_eq!(
            parse_response("u", response).unwrap(),
            "https://cdn/result.png"
        );

        assert!(serde_json::from_str::<ApplyTilesResponse>(r#"{"url":"x"}"#).is_err());

        let blank = ApplyTilesResponse {
            image: "  ".to_string(),
        };
        assert!(matches!(
            parse_response("u", blank),
            Err(VisualizerError::MalformedResponse { .. })
        ));
    }
}
