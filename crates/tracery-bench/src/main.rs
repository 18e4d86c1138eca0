//! tracery-bench: CLI tool for trace parameter experimentation and diagnostics.
//!
//! Decodes an image file, runs the trace pipeline on it with configurable
//! options, and prints per-stage diagnostics. Useful for:
//!
//! - Comparing trace modes and presets on the same artwork
//! - Tuning threshold, simplify and smoothing amounts
//! - Checking how close an image comes to the complexity budget
//! - Measuring per-stage durations to identify bottlenecks
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin tracery-bench -- [OPTIONS] <IMAGE_PATH>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use tracery_pipeline::diagnostics::{Clock, STAGE_LABELS, TraceDiagnostics};
use tracery_pipeline::{Bitmap, ProgressSink, Stage, TraceOptions};

/// Trace parameter experimentation and diagnostics for tracery.
///
/// Runs the trace pipeline on a given image with configurable options
/// and prints detailed per-stage timing and count diagnostics.
#[derive(Parser)]
#[command(name = "tracery-bench", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    /// Trace mode.
    #[arg(long, value_enum, default_value_t = Mode::Silhouette)]
    mode: Mode,

    /// Luminance threshold for single-band modes.
    #[arg(long, default_value_t = TraceOptions::DEFAULT_THRESHOLD)]
    threshold: u8,

    /// Comma-separated band thresholds for multiband mode.
    #[arg(long, value_delimiter = ',')]
    thresholds: Vec<u8>,

    /// Trace light shapes on a dark background.
    #[arg(long)]
    invert: bool,

    /// Simplification amount (0-10).
    #[arg(long, default_value_t = TraceOptions::DEFAULT_SIMPLIFY)]
    simplify: f64,

    /// Smoothing amount (0-10).
    #[arg(long, default_value_t = TraceOptions::DEFAULT_SMOOTHING)]
    smoothing: f64,

    /// Target output width in millimetres.
    #[arg(long)]
    width_mm: Option<f64>,

    /// Target output height in millimetres.
    #[arg(long)]
    height_mm: Option<f64>,

    /// Stretch to both target sizes instead of preserving aspect ratio.
    #[arg(long)]
    free_aspect: bool,

    /// Fraction of the target box the output may occupy (0-1].
    #[arg(long, default_value_t = TraceOptions::DEFAULT_FOOTPRINT_FRACTION)]
    footprint: f64,

    /// Drop paths with fewer nodes than this.
    #[arg(long, default_value_t = TraceOptions::DEFAULT_MIN_PATH_NODES)]
    min_path_nodes: u32,

    /// Cap on emitted paths.
    #[arg(long, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    max_paths: Option<u32>,

    /// Small-contour filtering preset.
    #[arg(long, value_enum, default_value_t = Preset::Balanced)]
    preset: Preset,

    /// Write SVG output to file.
    #[arg(long)]
    svg: Option<PathBuf>,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,

    /// Full trace options as a JSON string.
    ///
    /// When provided, all other trace option flags are ignored.
    /// The JSON uses the same camelCase shape as worker requests.
    #[arg(long)]
    options_json: Option<String>,
}

/// Trace mode selection.
#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// Filled outer shapes, holes discarded.
    Silhouette,
    /// Hairline cut lines around every boundary.
    Outline,
    /// Filled shapes with holes preserved.
    Engrave,
    /// Layered fills at several thresholds.
    Multiband,
    /// Hairline strokes keeping fine detail.
    Lineart,
}

/// Filtering preset selection.
#[derive(Clone, Copy, ValueEnum)]
enum Preset {
    Detailed,
    Balanced,
    Fast,
}

/// Build [`TraceOptions`] from CLI arguments.
///
/// If `--options-json` is provided, the JSON is parsed directly and all
/// individual option flags are ignored.
fn options_from_cli(cli: &Cli) -> Result<TraceOptions, String> {
    if let Some(ref json) = cli.options_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --options-json: {e}"));
    }

    Ok(TraceOptions {
        mode: match cli.mode {
            Mode::Silhouette => tracery_pipeline::TraceMode::Silhouette,
            Mode::Outline => tracery_pipeline::TraceMode::Outline,
            Mode::Engrave => tracery_pipeline::TraceMode::Engrave,
            Mode::Multiband => tracery_pipeline::TraceMode::Multiband,
            Mode::Lineart => tracery_pipeline::TraceMode::Lineart,
        },
        threshold: cli.threshold,
        thresholds: (!cli.thresholds.is_empty()).then(|| cli.thresholds.clone()),
        invert: cli.invert,
        simplify: cli.simplify,
        smoothing: cli.smoothing,
        target_width_mm: cli.width_mm,
        target_height_mm: cli.height_mm,
        lock_aspect: !cli.free_aspect,
        footprint_fraction: cli.footprint,
        min_path_nodes: cli.min_path_nodes,
        max_paths: cli.max_paths,
        preset: match cli.preset {
            Preset::Detailed => tracery_pipeline::TracePreset::Detailed,
            Preset::Balanced => tracery_pipeline::TracePreset::Balanced,
            Preset::Fast => tracery_pipeline::TracePreset::Fast,
        },
    })
}

/// Decode an image file into a [`Bitmap`].
fn load_bitmap(bytes: &[u8]) -> Result<Bitmap, String> {
    let decoded = image::load_from_memory(bytes).map_err(|e| format!("Error decoding image: {e}"))?;
    Bitmap::from_image(decoded.to_rgba8()).map_err(|e| e.to_string())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let options = match options_from_cli(&cli) {
        Ok(o) => o,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let image_bytes = match std::fs::read(&cli.image_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error reading {}: {e}", cli.image_path.display());
            return ExitCode::FAILURE;
        }
    };

    let bitmap = match load_bitmap(&image_bytes) {
        Ok(b) => b,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    eprintln!(
        "Image: {} ({} bytes, {}x{})",
        cli.image_path.display(),
        image_bytes.len(),
        bitmap.width(),
        bitmap.height(),
    );
    eprintln!("Options: {options:#?}");
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        match tracery_pipeline::diagnostics::trace_with_diagnostics(
            &bitmap,
            &options,
            &mut LogProgress::default(),
            &StdClock,
        ) {
            Ok((document, diagnostics)) => {
                if cli.json {
                    match serde_json::to_string_pretty(&diagnostics) {
                        Ok(json) => println!("{json}"),
                        Err(e) => {
                            eprintln!("Error serializing diagnostics: {e}");
                            return ExitCode::FAILURE;
                        }
                    }
                } else {
                    println!("{}", diagnostics.report());
                    for warning in &document.warnings {
                        println!("warning: {warning}");
                    }
                }

                // Write SVG on the first run only.
                if run == 0
                    && let Some(ref svg_path) = cli.svg
                {
                    let title = cli
                        .image_path
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .unwrap_or("bench");
                    let options_json = serde_json::to_string(&options).ok();
                    let metadata = tracery_export::SvgMetadata {
                        title: Some(title),
                        description: Some("Traced by tracery-bench"),
                        options_json: options_json.as_deref(),
                    };
                    let svg = tracery_export::to_svg(&document, &metadata);
                    match std::fs::write(svg_path, &svg) {
                        Ok(()) => {
                            eprintln!(
                                "SVG written to {} ({} bytes)",
                                svg_path.display(),
                                svg.len(),
                            );
                        }
                        Err(e) => {
                            eprintln!("Error writing SVG to {}: {e}", svg_path.display());
                        }
                    }
                }

                all_diagnostics.push(diagnostics);
            }
            Err(e) => {
                eprintln!("Trace error: {e}");
                return ExitCode::FAILURE;
            }
        }

        if cli.runs > 1 {
            eprintln!();
        }
    }

    // Print summary when multiple runs.
    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    ExitCode::SUCCESS
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Logs each stage the first time it reports.
#[derive(Default)]
struct LogProgress {
    last: Option<Stage>,
}

impl ProgressSink for LogProgress {
    fn report(&mut self, stage: Stage, fraction: f64, message: Option<&str>) {
        if self.last != Some(stage) {
            debug!(stage = stage.as_str(), fraction, detail = message, "stage started");
            self.last = Some(stage);
        }
    }

    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[TraceDiagnostics]) {
    debug_assert!(!all_diagnostics.is_empty(), "no diagnostics to summarize");

    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    if all_diagnostics.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    // Per-stage means, summed over bands.
    println!();
    println!("{:<24} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(40));

    for label in STAGE_LABELS {
        let total: f64 = all_diagnostics
            .iter()
            .map(|d| d.duration_of(label).as_secs_f64() * 1000.0)
            .sum();
        let stage_mean = total / all_diagnostics.len() as f64;
        println!("{label:<24} {stage_mean:>10.3}ms");
    }
}
