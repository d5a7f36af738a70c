use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::{encode_component, file_url, http_agent};
use crate::error::{Result, VisualizerError};
use crate::utils::has_image_extension;

/// A swatch the user can apply to their room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileImage {
    pub name: String,
    pub url: String,
}

/// Remote file storage: lists tile swatches and accepts room uploads
pub trait TileStorage: Send + Sync {
    /// All tiles stored under `category`, in listing order
    fn list_tiles(&self, category: &str) -> Result<Vec<TileImage>>;

    /// Store `bytes` under `key` and return a publicly readable URL
    fn upload(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<String>;
}

/// Firebase Storage over its REST API (v0)
pub struct FirebaseStorage {
    endpoint: String,
    bucket: String,
    agent: ureq::Agent,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    items: Vec<ObjectRef>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectRef {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectMetadata {
    name: String,
    download_tokens: Option<String>,
}

impl FirebaseStorage {
    pub fn new(endpoint: &str, bucket: &str, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            agent: http_agent(timeout),
        }
    }

    fn objects_url(&self) -> String {
        format!("{}/b/{}/o", self.endpoint, encode_component(&self.bucket))
    }

    /// Direct download URL of an object, with its access token when known
    pub fn media_url(&self, name: &str, token: Option<&str>) -> String {
        let mut url = format!("{}/{}?alt=media", self.objects_url(), encode_component(name));
        if let Some(token) = token {
            url.push_str("&token=");
            url.push_str(&encode_component(token));
        }
        url
    }
}

/// Last path segment of a storage object name
fn display_name(object_name: &str) -> String {
    object_name
        .rsplit('/')
        .next()
        .unwrap_or(object_name)
        .to_string()
}

impl FirebaseStorage {
    /// Walk a paged listing, following `nextPageToken` until it runs out.
    /// `fetch_page` gets the token of the page to fetch (`None` for the first).
    fn collect_pages<F>(&self, mut fetch_page: F) -> Result<Vec<TileImage>>
    where
        F: FnMut(Option<&str>) -> Result<ListResponse>,
    {
        let mut tiles = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = fetch_page(page_token.as_deref())?;

            tiles.extend(
                page.items
                    .iter()
                    // Folder placeholders end with '/'
                    .filter(|item| !item.name.ends_with('/'))
                    .map(|item| TileImage {
                        name: display_name(&item.name),
                        url: self.media_url(&item.name, None),
                    }),
            );

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(tiles)
    }
}

impl TileStorage for FirebaseStorage {
    fn list_tiles(&self, category: &str) -> Result<Vec<TileImage>> {
        let url = self.objects_url();
        let prefix = format!("{}/", category.trim_matches('/'));

        let tiles = self.collect_pages(|page_token| {
            let mut request = self.agent.get(&url).query("prefix", &prefix);
            if let Some(token) = page_token {
                request = request.query("pageToken", token);
            }

            request
                .call()
                .map_err(|e| VisualizerError::from_ureq(&url, e))?
                .into_json()
                .map_err(|e| VisualizerError::malformed(&url, e.to_string()))
        })?;

        tracing::info!(category, count = tiles.len(), "listed tiles");
        Ok(tiles)
    }

    fn upload(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<String> {
        let url = self.objects_url();
        let response = self
            .agent
            .post(&url)
            .query("uploadType", "media")
            .query("name", key)
            .set("Content-Type", content_type)
            .send_bytes(bytes)
            .map_err(|e| VisualizerError::from_ureq(&url, e))?;

        let metadata: ObjectMetadata = response
            .into_json()
            .map_err(|e| VisualizerError::malformed(&url, e.to_string()))?;

        let token = metadata
            .download_tokens
            .as_deref()
            .and_then(|tokens| tokens.split(',').map(str::trim).find(|t| !t.is_empty()));

        let public_url = self.media_url(&metadata.name, token);
        tracing::info!(key, bytes = bytes.len(), "uploaded room image");
        Ok(public_url)
    }
}

/// A directory acting as storage; useful offline and for demos.
///
/// Tiles live in `{root}/{category}/`, uploads are written to `{root}/{key}`.
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl TileStorage for LocalStorage {
    fn list_tiles(&self, category: &str) -> Result<Vec<TileImage>> {
        let dir = self.root.join(category);
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_file() && has_image_extension(&path) {
                paths.push(path);
            }
        }
        paths.sort();

        let tiles = paths
            .iter()
            .map(|path| TileImage {
                name: path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("tile")
                    .to_string(),
                url: file_url(path),
            })
            .collect::<Vec<_>>();

        tracing::info!(dir = %dir.display(), count = tiles.len(), "listed local tiles");
        Ok(tiles)
    }

    fn upload(&self, key: &str, bytes: &[u8], _content_type: &str) -> Result<String> {
        if key.split('/').any(|segment| segment == "..") {
            return Err(VisualizerError::Config(format!(
                "Upload key must stay inside the storage root: '{}'",
                key
            )));
        }

        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, bytes)?;

        Ok(file_url(&path))
    }
}
