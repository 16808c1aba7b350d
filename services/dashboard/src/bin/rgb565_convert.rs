//! Convert raw RGB565 camera frames to JPEG.
//!
//! ```text
//! rgb565-convert --file uploads/frame.rgb565 --width 800 --height 600
//! rgb565-convert --file uploads/frame.rgb565 --all-layouts
//! rgb565-convert --batch uploads
//! ```

use anyhow::Context;
use clap::Parser;
use posture_dashboard::config::Config;
use posture_dashboard::convert::{convert_all_layouts, convert_directory, convert_file};
use posture_dashboard::resolution::Resolution;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "rgb565-convert", version, about = "Convert RGB565 camera frames to JPEG")]
struct Args {
    /// Convert a single file
    #[arg(short, long, conflicts_with = "batch")]
    file: Option<PathBuf>,

    /// Convert every raw frame in a directory
    #[arg(short, long)]
    batch: Option<PathBuf>,

    /// Frame width in pixels
    #[arg(short, long, default_value_t = 800)]
    width: u32,

    /// Frame height in pixels
    #[arg(long, default_value_t = 600)]
    height: u32,

    /// Output path (single file only)
    #[arg(short, long, requires = "file")]
    output: Option<PathBuf>,

    /// Write one image per byte/channel order, for sensor calibration
    #[arg(long, requires = "file", conflicts_with = "output")]
    all_layouts: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Conversion failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    // Same layout as the server; canonical when no config file exists
    let config = Config::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    let layout = config.pixel_layout();

    if let Some(file) = args.file {
        let hint = Resolution::new(args.width, args.height);

        if args.all_layouts {
            for converted in convert_all_layouts(&file, hint)? {
                println!("{}: {}", converted.output.display(), describe(converted.resolution));
            }
            return Ok(());
        }

        let converted = convert_file(&file, args.output.as_deref(), hint, layout)?;
        println!("Converted {} -> {}", converted.input.display(), converted.output.display());
        println!("Image size: {}", describe(converted.resolution));
        println!(
            "File size: {} -> {} bytes",
            converted.input_bytes, converted.output_bytes
        );
        return Ok(());
    }

    let dir = args.batch.unwrap_or_else(|| PathBuf::from("uploads"));
    let summary = convert_directory(&dir, layout)?;
    println!(
        "Batch finished in {}: {} converted, {} skipped, {} failed",
        dir.display(),
        summary.converted,
        summary.skipped,
        summary.failed
    );

    if summary.failed > 0 {
        anyhow::bail!("{} file(s) could not be converted", summary.failed);
    }
    Ok(())
}

fn describe(resolution: Option<Resolution>) -> String {
    match resolution {
        Some(res) => res.to_string(),
        None => "unchanged (already JPEG)".to_string(),
    }
}
