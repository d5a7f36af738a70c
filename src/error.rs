use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisualizerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Resize failed: {0}")]
    Resize(String),

    #[error("Invalid crop region {width}x{height}+{x}+{y} for {image_width}x{image_height} image")]
    InvalidCrop {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        image_width: u32,
        image_height: u32,
    },

    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("Server returned {status} for {url}: {body}")]
    Status { url: String, status: u16, body: String },

    #[error("Malformed response from {url}: {message}")]
    MalformedResponse { url: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, VisualizerError>;

impl VisualizerError {
    /// Map a ureq failure for `url` onto our error type, reading the body of
    /// non-2xx responses so the server's message is kept.
    pub(crate) fn from_ureq(url: &str, err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(status, response) => {
                let body = response
                    .into_string()
                    .unwrap_or_else(|_| "<unreadable body>".to_string());
                VisualizerError::Status {
                    url: url.to_string(),
                    status,
                    body,
                }
            }
            ureq::Error::Transport(transport) => VisualizerError::Transport {
                url: url.to_string(),
                message: transport.to_string(),
            },
        }
    }

    pub(crate) fn malformed(url: &str, message: impl Into<String>) -> Self {
        VisualizerError::MalformedResponse {
            url: url.to_string(),
            message: message.into(),
        }
    }
}
