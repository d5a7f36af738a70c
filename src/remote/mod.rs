//! Clients for the services the screen talks to: tile storage, the
//! compositing API, and plain downloads of the composited result.

pub mod compositor;
pub mod download;
pub mod storage;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use compositor::{Compositor, HttpCompositor};
pub use storage::{FirebaseStorage, LocalStorage, TileImage, TileStorage};

/// Shared HTTP agent with a whole-request timeout
pub fn http_agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout(timeout)
        .user_agent(concat!("tile-visualizer/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Everything outside the RFC 3986 unreserved set, `/` included
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

/// Like `SEGMENT`, but keeps `/` so a filesystem path stays readable
const PATH: &AsciiSet = &SEGMENT.remove(b'/');

/// Storage object names travel as a single path segment, so `/` is encoded too.
pub(crate) fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, SEGMENT).to_string()
}

/// `file://` URL for a local path
pub(crate) fn file_url(path: &Path) -> String {
    format!("file://{}", utf8_percent_encode(&path.to_string_lossy(), PATH))
}

/// Local path behind a `file://` URL
pub(crate) fn file_url_path(url: &str) -> Option<PathBuf> {
    let encoded = url.strip_prefix("file://")?;
    let decoded = percent_decode_str(encoded).decode_utf8().ok()?;
    Some(PathBuf::from(decoded.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_component() {
        assert_eq!(encode_component("tiles/oak.jpg"), "tiles%2Foak.jpg");
        assert_eq!(encode_component("a b+c"), "a%20b%2Bc");
        assert_eq!(encode_component("plain-name_1.~"), "plain-name_1.~");
        assert_eq!(encode_component("é"), "%C3%A9");
    }

    #[test]
    fn test_file_url_escapes_reserved_characters() {
        let path = Path::new("/srv/a#b/room images/x?.jpg");
        let url = file_url(path);
        assert_eq!(url, "file:///srv/a%23b/room%20images/x%3F.jpg");
        assert_eq!(file_url_path(&url), Some(path.to_path_buf()));
    }

    #[test]
    fn test_file_url_path_rejects_other_schemes() {
        assert_eq!(file_url_path("https://cdn/a.png"), None);
        assert_eq!(file_url_path("file:///tmp/a.png"), Some(PathBuf::from("/tmp/a.png")));
    }
}
