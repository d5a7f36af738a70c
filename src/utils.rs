use anyhow::Result;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::cli::Args;

/// Extensions accepted by the file picker and the local tile listing
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Exclusive upper bound of the random upload-key suffix
const UPLOAD_SUFFIX_RANGE: u32 = 1000;

/// Create a spinner for a single network stage
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.blue} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Elapsed time for the final summary line
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let millis = duration.subsec_millis();

    if total_secs >= 60 {
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        format!("{}m {}s", mins, secs)
    } else if total_secs > 0 {
        format!("{}.{:03}s", total_secs, millis)
    } else {
        format!("{}ms", duration.as_millis())
    }
}

/// Milliseconds since the Unix epoch (0 if the clock is before 1970)
pub fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// Storage key for an uploaded room photo: `{prefix}/{millis}_{suffix}.jpg`
pub fn upload_key(prefix: &str, unix_millis: u128, suffix: u32) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        format!("{}_{}.jpg", unix_millis, suffix)
    } else {
        format!("{}/{}_{}.jpg", prefix, unix_millis, suffix)
    }
}

/// Upload key with the current time and a random 0..1000 suffix
pub fn random_upload_key(prefix: &str) -> String {
    let suffix = rand::rng().random_range(0..UPLOAD_SUFFIX_RANGE);
    upload_key(prefix, unix_millis(), suffix)
}

/// Validate command line arguments
pub fn validate_inputs(args: &Args) -> Result<()> {
    if let Some(input) = &args.input {
        if !input.is_file() {
            return Err(anyhow::anyhow!(
                "Room image does not exist or is not a file: {}",
                input.display()
            ));
        }
        if !has_image_extension(input) {
            return Err(anyhow::anyhow!(
                "Unsupported room image type: {} (expected one of {})",
                input.display(),
                IMAGE_EXTENSIONS.join(", ")
            ));
        }
    }

    if let Some(zoom) = args.zoom {
        if !(crate::image_processing::crop::MIN_ZOOM..=crate::image_processing::crop::MAX_ZOOM)
            .contains(&zoom)
        {
            return Err(anyhow::anyhow!(
                "Zoom must be between {} and {}, got: {}",
                crate::image_processing::crop::MIN_ZOOM,
                crate::image_processing::crop::MAX_ZOOM,
                zoom
            ));
        }
    }

    if args.crop.is_some() && (args.zoom.is_some() || args.pan_x != 0.0 || args.pan_y != 0.0) {
        return Err(anyhow::anyhow!(
            "--crop cannot be combined with --zoom/--pan-x/--pan-y"
        ));
    }

    if args.storage_dir.is_some() && args.bucket.is_some() {
        return Err(anyhow::anyhow!(
            "--storage-dir and --bucket select different storage backends; pass only one"
        ));
    }

    Ok(())
}

/// Whether the path ends in one of [`IMAGE_EXTENSIONS`] (case-insensitive)
pub fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|known| known.eq_ignore_ascii_case(ext)))
}

/// `[VERBOSE]`-prefixed line, only with `--verbose`
pub fn verbose_println(verbose: bool, message: &str) {
    if verbose {
        println!("{} {}", style("[VERBOSE]").dim(), message);
    }
}

/// Print warning message
pub fn warn_println(message: &str) {
    println!("{} {}", style("[WARNING]").yellow().bold(), message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
        assert_eq!(format_duration(Duration::from_secs(1)), "1.000s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m 5s");
    }

    #[test]
    fn test_upload_key() {
        assert_eq!(
            upload_key("room-images", 1700000000000, 42),
            "room-images/1700000000000_42.jpg"
        );
        assert_eq!(upload_key("/room-images/", 5, 0), "room-images/5_0.jpg");
        assert_eq!(upload_key("", 5, 7), "5_7.jpg");
    }

    #[test]
    fn test_random_upload_key_shape() {
        let key = random_upload_key("room-images");
        let rest = key.strip_prefix("room-images/").unwrap();
        let stem = rest.strip_suffix(".jpg").unwrap();
        let (millis, suffix) = stem.split_once('_').unwrap();
        assert!(millis.parse::<u128>().unwrap() > 0);
        assert!(suffix.parse::<u32>().unwrap() < 1000);
    }

    #[test]
    fn test_has_image_extension() {
        assert!(has_image_extension(&PathBuf::from("room.JPG")));
        assert!(has_image_extension(&PathBuf::from("a/b/tile.webp")));
        assert!(!has_image_extension(&PathBuf::from("notes.txt")));
        assert!(!has_image_extension(&PathBuf::from("no_extension")));
    }

    #[test]
    fn test_validate_rejects_crop_with_zoom() {
        let args = Args {
            crop: Some("10x10+0+0".parse().unwrap()),
            zoom: Some(1.5),
            ..Default::default()
        };
        assert!(validate_inputs(&args).is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_zoom() {
        let args = Args {
            zoom: Some(4.0),
            ..Default::default()
        };
        assert!(validate_inputs(&args).is_err());

        let args = Args {
            zoom: Some(2.5),
            ..Default::default()
        };
        assert!(validate_inputs(&args).is_ok());
    }

    #[test]
    fn test_validate_rejects_two_backends() {
        let args = Args {
            storage_dir: Some(PathBuf::from("/tmp")),
            bucket: Some("demo".to_string()),
            ..Default::default()
        };
        assert!(validate_inputs(&args).is_err());
    }
}
