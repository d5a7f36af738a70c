use std::io::Read;
use std::path::{Path, PathBuf};

use super::file_url_path;
use crate::error::{Result, VisualizerError};

/// Upper bound on a downloaded result image
pub const MAX_DOWNLOAD_BYTES: u64 = 64 * 1024 * 1024;

/// Prefix of saved result files
pub const RESULT_FILE_PREFIX: &str = "see-or-show-placed-tile";

#[derive(Debug, Clone)]
pub struct DownloadedImage {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

impl DownloadedImage {
    /// File extension from the image signature, then the content type, then `jpg`
    pub fn extension(&self) -> &'static str {
        if let Ok(format) = image::guess_format(&self.bytes) {
            if let Some(&ext) = format.extensions_str().first() {
                return ext;
            }
        }

        match self.content_type.as_deref().map(|ct| ct.split(';').next().unwrap_or(ct).trim()) {
            Some("image/png") => "png",
            Some("image/webp") => "webp",
            Some("image/gif") => "gif",
            _ => "jpg",
        }
    }
}

/// Whether `file://` URLs and bare paths may be read from disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalFiles {
    Allow,
    Deny,
}

fn local_path(url: &str) -> Option<PathBuf> {
    if url.starts_with("file://") {
        file_url_path(url)
    } else if url.contains("://") {
        None
    } else {
        Some(PathBuf::from(url))
    }
}

/// Fetch the bytes behind an image URL.
///
/// `file://` URLs and bare paths are read from disk only with `LocalFiles::Allow`;
/// a remote service handing back a local path is refused otherwise.
pub fn fetch_image(agent: &ureq::Agent, url: &str, local_files: LocalFiles) -> Result<DownloadedImage> {
    if let Some(path) = local_path(url) {
        if local_files == LocalFiles::Deny {
            return Err(VisualizerError::malformed(
                url,
                "local file URLs are only read when using local storage",
            ));
        }
        return Ok(DownloadedImage {
            bytes: std::fs::read(path)?,
            content_type: None,
        });
    }

    let response = agent
        .get(url)
        .call()
        .map_err(|e| VisualizerError::from_ureq(url, e))?;

    let content_type = response.header("Content-Type").map(str::to_string);
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(MAX_DOWNLOAD_BYTES + 1)
        .read_to_end(&mut bytes)?;

    if bytes.len() as u64 > MAX_DOWNLOAD_BYTES {
        return Err(VisualizerError::malformed(
            url,
            format!("image larger than {} bytes", MAX_DOWNLOAD_BYTES),
        ));
    }
    if bytes.is_empty() {
        return Err(VisualizerError::malformed(url, "empty body"));
    }

    Ok(DownloadedImage {
        bytes,
        content_type,
    })
}

pub fn result_file_name(unix_millis: u128, extension: &str) -> String {
    format!("{}-{}.{}", RESULT_FILE_PREFIX, unix_millis, extension)
}

/// Write a downloaded result into `output_dir`, returning the new file's path
pub fn save_result(image: &DownloadedImage, output_dir: &Path, unix_millis: u128) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)?;
    let path = output_dir.join(result_file_name(unix_millis, image.extension()));
    std::fs::write(&path, &image.bytes)?;
    tracing::info!(path = %path.display(), bytes = image.bytes.len(), "saved result");
    Ok(path)
}

/// Fetch and save in one go
pub fn download_result(
    agent: &ureq::Agent,
    url: &str,
    output_dir: &Path,
    unix_millis: u128,
    local_files: LocalFiles,
) -> Result<PathBuf> {
    let image = fetch_image(agent, url, local_files)?;
    save_result(&image, output_dir, unix_millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;
    use std::time::Duration;

    fn png_bytes() -> Vec<u8> {
        let mut bytes = Vec::new();
        RgbImage::new(2, 2)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_extension_sniffs_signature() {
        let image = DownloadedImage {
            bytes: png_bytes(),
            content_type: Some("image/jpeg".to_string()),
        };
        assert_eq!(image.extension(), "png");
    }

    #[test]
    fn test_extension_falls_back_to_content_type() {
        let image = DownloadedImage {
            bytes: b"????".to_vec(),
            content_type: Some("image/webp; charset=binary".to_string()),
        };
        assert_eq!(image.extension(), "webp");

        let unknown = DownloadedImage {
            bytes: b"????".to_vec(),
            content_type: None,
        };
        assert_eq!(unknown.extension(), "jpg");
    }

    #[test]
    fn test_result_file_name() {
        assert_eq!(
            result_file_name(1700000000123, "png"),
            "see-or-show-placed-tile-1700000000123.png"
        );
    }

    #[test]
    fn test_download_local_result_writes_real_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("result.png");
        std::fs::write(&source, png_bytes()).unwrap();

        let agent = crate::remote::http_agent(Duration::from_secs(1));
        let url = crate::remote::file_url(&source);
        let out_dir = dir.path().join("out");
        let saved = download_result(&agent, &url, &out_dir, 42, LocalFiles::Allow).unwrap();

        assert_eq!(saved, out_dir.join("see-or-show-placed-tile-42.png"));
        assert_eq!(std::fs::read(&saved).unwrap(), png_bytes());
    }

    #[test]
    fn test_local_result_refused_without_local_storage() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("secret.png");
        std::fs::write(&source, png_bytes()).unwrap();

        let agent = crate::remote::http_agent(Duration::from_secs(1));
        let out_dir = dir.path().join("out");
        for url in [crate::remote::file_url(&source), source.display().to_string()] {
            let outcome = download_result(&agent, &url, &out_dir, 7, LocalFiles::Deny);
            assert!(
                matches!(outcome, Err(VisualizerError::MalformedResponse { .. })),
                "{} should be refused",
                url
            );
        }
        assert!(!out_dir.exists());
    }

    #[test]
    fn test_local_path_detection() {
        assert_eq!(local_path("file:///tmp/a%20b.png"), Some(PathBuf::from("/tmp/a b.png")));
        assert_eq!(local_path("/tmp/a.png"), Some(PathBuf::from("/tmp/a.png")));
        assert_eq!(local_path("https://cdn/a.png"), None);
    }
}
