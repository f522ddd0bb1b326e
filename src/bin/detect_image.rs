use anyhow::Context;
use clap::Parser;
use sawdust_watcher::core::detection::{
    detect, load_image, rescale_image, write_image, DetectionParams, ThresholdMode,
};
use sawdust_watcher::domain::model::round_percent;
use sawdust_watcher::utils::logger;
use sawdust_watcher::WatcherConfig;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "detect_image")]
#[command(about = "Measure sawdust coverage in image files")]
struct Args {
    /// Images to analyse
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Read [detection] parameters from this TOML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Median filter kernel size (odd)
    #[arg(long)]
    noise_size: Option<u32>,

    /// Fixed binary threshold (0-255)
    #[arg(long, conflicts_with = "otsu")]
    threshold: Option<u8>,

    /// Choose the threshold with Otsu's method
    #[arg(long)]
    otsu: bool,

    /// Morphological closing kernel size (odd)
    #[arg(long)]
    morph_size: Option<u32>,

    /// Number of dilate/erode iterations
    #[arg(long)]
    morph_iterations: Option<u32>,

    /// Rescale factor applied before detection
    #[arg(long)]
    scale: Option<f64>,

    /// Write every pipeline stage as PNG into this directory
    #[arg(long)]
    save_stages: Option<PathBuf>,

    /// Print one JSON object per image
    #[arg(long)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Serialize)]
struct ImageReport {
    image: String,
    width: u32,
    height: u32,
    coverage_ratio: f64,
    coverage_percent: f64,
    threshold_level: u8,
}

fn build_params(args: &Args) -> anyhow::Result<DetectionParams> {
    let mut params = match &args.config {
        Some(path) => WatcherConfig::from_file(path)
            .with_context(|| format!("Failed to load config file '{}'", path))?
            .detection_params(),
        None => DetectionParams::default(),
    };

    if let Some(noise_size) = args.noise_size {
        params.noise_size = noise_size;
    }
    if let Some(level) = args.threshold {
        params.threshold = ThresholdMode::Fixed(level);
    }
    if args.otsu {
        params.threshold = ThresholdMode::Otsu;
    }
    if let Some(morph_size) = args.morph_size {
        params.morph_size = morph_size;
    }
    if let Some(iterations) = args.morph_iterations {
        params.morph_iterations = iterations;
    }
    if let Some(scale) = args.scale {
        params.scale = scale;
    }

    params.validate()?;
    Ok(params)
}

fn analyse(path: &Path, params: &DetectionParams, stages_dir: Option<&Path>) -> anyhow::Result<ImageReport> {
    let img = load_image(path)?;
    let img = if params.scale < 1.0 {
        rescale_image(&img, params.scale)?
    } else {
        img
    };

    let output = detect(&img, params)?;

    if let Some(dir) = stages_dir {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        let stages = &output.stages;
        write_image(&stages.original, &dir.join(format!("{}_original.png", stem)))?;
        write_image(&stages.denoise, &dir.join(format!("{}_denoise.png", stem)))?;
        write_image(&stages.difference, &dir.join(format!("{}_difference.png", stem)))?;
        write_image(&stages.grayscale, &dir.join(format!("{}_grayscale.png", stem)))?;
        write_image(&stages.threshold, &dir.join(format!("{}_threshold.png", stem)))?;
        write_image(&stages.morph, &dir.join(format!("{}_morph.png", stem)))?;
        tracing::debug!("Saved stages for {} to {}", stem, dir.display());
    }

    Ok(ImageReport {
        image: path.display().to_string(),
        width: img.width(),
        height: img.height(),
        coverage_ratio: output.coverage_ratio,
        coverage_percent: round_percent(output.coverage_ratio),
        threshold_level: output.threshold_level,
    })
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 初始化日誌
    logger::init_cli_logger(args.verbose);

    let params = build_params(&args)?;
    tracing::debug!("Detection parameters: {:?}", params);

    let mut failed = 0;
    for path in &args.images {
        tracing::info!("Detecting sawdust in '{}'", path.display());
        match analyse(path, &params, args.save_stages.as_deref()) {
            Ok(report) if args.json => println!("{}", serde_json::to_string(&report)?),
            Ok(report) => println!(
                "{}: {:.2}% coverage ({}x{}, threshold level {})",
                report.image,
                report.coverage_percent,
                report.width,
                report.height,
                report.threshold_level
            ),
            Err(e) => {
                failed += 1;
                tracing::error!("❌ {}: {:#}", path.display(), e);
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} images could not be analysed", failed, args.images.len());
    }
    Ok(())
}
