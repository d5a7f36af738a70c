use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use indicatif::ProgressBar;
use prettytable::{format, Cell, Row, Table};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use tile_visualizer::cli::{Args, TileChoice};
use tile_visualizer::image_processing::UserImage;
use tile_visualizer::remote::{download, http_agent};
use tile_visualizer::session::MSG_CROP_FIRST;
use tile_visualizer::utils::{
    create_spinner, format_duration, unix_millis, validate_inputs, verbose_println, warn_println,
};
use tile_visualizer::{
    AppConfig, Compositor, JsonMessage, ScreenMode, Session, TileImage, TileStorage,
};

/// Where progress goes: spinners on the terminal or JSON lines on stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reporter {
    Terminal,
    Json,
}

impl Reporter {
    fn begin(self, stage: &str, message: &str) -> Option<ProgressBar> {
        match self {
            Reporter::Terminal => Some(create_spinner(message)),
            Reporter::Json => {
                JsonMessage::stage(stage, message);
                None
            }
        }
    }

    fn done(self, pb: Option<ProgressBar>, message: &str) {
        if let Some(pb) = pb {
            pb.finish_with_message(format!("✓ {}", message));
        }
    }

    fn fail(self, pb: Option<ProgressBar>, stage: &str, error: &str) {
        match self {
            Reporter::Terminal => {
                if let Some(pb) = pb {
                    pb.abandon_with_message(format!("{} {}", style("✗").red().bold(), error));
                }
            }
            Reporter::Json => JsonMessage::failed(stage, error),
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };

    // stdout is reserved for results and JSON lines
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_tiles(tiles: &[TileImage]) {
    if tiles.is_empty() {
        warn_println("No tiles found");
        return;
    }

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BOX_CHARS);
    table.add_row(Row::new(vec![
        Cell::new("#"),
        Cell::new("Name"),
        Cell::new("URL"),
    ]));
    for (i, tile) in tiles.iter().enumerate() {
        table.add_row(Row::new(vec![
            Cell::new(&(i + 1).to_string()),
            Cell::new(&tile.name),
            Cell::new(&tile.url),
        ]));
    }
    table.printstd();
}

fn handle_list_tiles(config: &AppConfig, reporter: Reporter) -> Result<()> {
    let storage = config.build_storage()?;
    let pb = reporter.begin("tiles", &format!("Listing '{}' tiles", config.tile_category));

    let tiles = match storage.list_tiles(&config.tile_category) {
        Ok(tiles) => tiles,
        Err(e) => {
            reporter.fail(pb, "tiles", &e.to_string());
            return Err(e).context("Failed to list tiles");
        }
    };
    reporter.done(pb, &format!("Found {} tiles", tiles.len()));

    match reporter {
        Reporter::Terminal => print_tiles(&tiles),
        Reporter::Json => JsonMessage::Tiles { tiles }.emit(),
    }
    Ok(())
}

/// Turn `--tile` into a URL, listing the gallery for an index
fn resolve_tile(
    choice: &TileChoice,
    storage: &dyn TileStorage,
    category: &str,
    reporter: Reporter,
) -> Result<String> {
    match choice {
        TileChoice::Url(url) => Ok(url.clone()),
        TileChoice::Index(index) => {
            let pb = reporter.begin("tiles", &format!("Listing '{}' tiles", category));
            let tiles = match storage.list_tiles(category) {
                Ok(tiles) => tiles,
                Err(e) => {
                    reporter.fail(pb, "tiles", &e.to_string());
                    return Err(e).context("Failed to list tiles");
                }
            };

            let Some(tile) = tiles.get(index - 1) else {
                let message = format!(
                    "Tile {} does not exist (the gallery has {} tiles)",
                    index,
                    tiles.len()
                );
                reporter.fail(pb, "tiles", &message);
                return Err(anyhow::anyhow!(message));
            };
            reporter.done(pb, &format!("Tile {}: {}", index, tile.name));
            Ok(tile.url.clone())
        }
    }
}

fn error_message(session: &Session) -> Option<String> {
    match session.mode() {
        ScreenMode::Error { message } => Some(message.clone()),
        _ => None,
    }
}

/// Upload the confirmed crop, then composite the tile onto it. Returns the result URL.
fn run_pipeline(
    session: &mut Session,
    storage: &dyn TileStorage,
    compositor: &dyn Compositor,
    tile_url: &str,
    reporter: Reporter,
) -> Result<String> {
    let Some(job) = session.confirm_crop(Instant::now()) else {
        let message = session
            .message(Instant::now())
            .unwrap_or(MSG_CROP_FIRST)
            .to_string();
        reporter.fail(None, "crop", &message);
        return Err(anyhow::anyhow!(message));
    };

    let pb = reporter.begin(
        "upload",
        &format!("Uploading room image ({} KB)", job.bytes.len() / 1024),
    );
    let outcome = storage.upload(&job.key, &job.bytes, job.content_type);
    session.finish_upload(outcome, Instant::now());
    if let Some(message) = error_message(session) {
        reporter.fail(pb, "upload", &message);
        return Err(anyhow::anyhow!(message));
    }
    let room_url = session.room_url().unwrap_or_default().to_string();
    reporter.done(pb, "Room image uploaded");
    if reporter == Reporter::Json {
        JsonMessage::uploaded(&job.key, &room_url, job.bytes.len());
    }

    let Some(composite) = session.request_composite(tile_url, Instant::now()) else {
        let message = session
            .message(Instant::now())
            .unwrap_or("Tile could not be applied")
            .to_string();
        reporter.fail(None, "composite", &message);
        return Err(anyhow::anyhow!(message));
    };

    let pb = reporter.begin("composite", "Applying tile to room image");
    let outcome = compositor.apply_tiles(&composite.tile_url, &composite.room_url);
    session.finish_composite(outcome, Instant::now());
    if let Some(message) = error_message(session) {
        reporter.fail(pb, "composite", &message);
        return Err(anyhow::anyhow!(message));
    }

    let result_url = session
        .download_url()
        .context("Compositing finished without a result")?
        .to_string();
    reporter.done(pb, "Tile applied");
    if reporter == Reporter::Json {
        JsonMessage::composited(&composite.tile_url, &composite.room_url, &result_url);
    }

    Ok(result_url)
}

fn crop_file_name(input: &Path) -> String {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("room");
    format!("{}-crop.jpg", stem)
}

/// Load the photo and set up the crop from `--crop` or `--zoom`/`--pan-*`
fn prepare_session(args: &Args, config: &AppConfig, input: &Path) -> Result<Session> {
    let image = UserImage::open(input)
        .with_context(|| format!("Failed to load room image: {}", input.display()))?;
    let (width, height) = image.dimensions();
    verbose_println(
        args.verbose,
        &format!("Loaded {} ({}x{}, {:?})", input.display(), width, height, image.orientation),
    );

    let mut session = Session::new(config.session_config(), Instant::now());
    session.select_file(Some(image), Instant::now());

    match args.crop {
        Some(region) => session
            .set_region(region)
            .with_context(|| format!("Invalid --crop for a {}x{} image", width, height))?,
        None => {
            if let Some(zoom) = args.zoom {
                session.set_zoom(zoom);
            }
            session.set_pan(args.pan_x, args.pan_y);
        }
    }

    if let Some(cropped) = session.cropped() {
        verbose_println(
            args.verbose,
            &format!("Crop region: {} ({} bytes)", cropped.region, cropped.len()),
        );
    }
    Ok(session)
}

fn run(args: &Args, config: &AppConfig, reporter: Reporter) -> Result<Option<PathBuf>> {
    if args.list_tiles {
        handle_list_tiles(config, reporter)?;
        return Ok(None);
    }

    let input = args.input.as_deref().context("No room image given (--input)")?;
    let session = prepare_session(args, config, input)?;

    if args.dry_run {
        let cropped = session.cropped().context(MSG_CROP_FIRST)?;
        std::fs::create_dir_all(&config.output_dir).context("Failed to create output directory")?;
        let path = config.output_dir.join(crop_file_name(input));
        std::fs::write(&path, &cropped.jpeg)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        return Ok(Some(path));
    }

    let choice = match args.tile_choice() {
        Some(choice) => choice.map_err(anyhow::Error::msg)?,
        None => return Err(anyhow::anyhow!("No tile given (--tile)")),
    };

    let storage = config.build_storage()?;
    let compositor = config.build_compositor();
    let tile_url = resolve_tile(&choice, storage.as_ref(), &config.tile_category, reporter)?;

    let mut session = session;
    let result_url = run_pipeline(
        &mut session,
        storage.as_ref(),
        compositor.as_ref(),
        &tile_url,
        reporter,
    )?;

    let pb = reporter.begin("download", "Downloading result");
    let agent = http_agent(config.timeout());
    match download::download_result(
        &agent,
        &result_url,
        &config.output_dir,
        unix_millis(),
        config.local_files(),
    ) {
        Ok(path) => {
            reporter.done(pb, "Result downloaded");
            Ok(Some(path))
        }
        Err(e) => {
            reporter.fail(pb, "download", &e.to_string());
            Err(e).context("Failed to download the result")
        }
    }
}

fn main() -> Result<()> {
    let start_time = Instant::now();
    let args = Args::parse();
    init_logging(args.verbose);

    let reporter = if args.json_progress {
        Reporter::Json
    } else {
        Reporter::Terminal
    };

    if reporter == Reporter::Terminal {
        println!("{}", style("Tile Visualizer").bold().blue());
        println!("{}", style("See a tile in your room before you buy it").dim());
        println!();
    }

    validate_inputs(&args)?;
    let config = args.resolve_config()?;

    if args.verbose && reporter == Reporter::Terminal {
        println!("{}", style("Configuration:").bold());
        println!("  Compositing service: {}", config.base_url);
        println!("  Storage: {:?}", config.storage);
        println!("  Tile category: {}", config.tile_category);
        println!("  Room prefix: {}", config.room_prefix);
        println!("  Request timeout: {}s", config.request_timeout_secs);
        println!("  Output directory: {}", config.output_dir.display());
        println!();
    }

    let outcome = run(&args, &config, reporter);
    let total_time = start_time.elapsed();

    match reporter {
        Reporter::Json => {
            if let Ok(Some(path)) = &outcome {
                JsonMessage::downloaded(path);
            }
            JsonMessage::summary(outcome.is_ok(), total_time.as_secs_f64());
        }
        Reporter::Terminal => {
            if let Ok(Some(path)) = &outcome {
                println!();
                println!(
                    "{} {}",
                    style("Saved:").bold().green(),
                    style(path.display()).cyan()
                );
                println!("  Total time: {}", format_duration(total_time));
            }
        }
    }

    outcome.map(|_| ())
}
