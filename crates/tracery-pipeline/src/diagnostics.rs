//! Trace diagnostics: timing, counts, and other metrics for each stage.
//!
//! These diagnostics are permanent instrumentation intended for
//! parameter experimentation. [`trace_with_diagnostics`] runs the same
//! pipeline as [`trace_with_progress`](crate::trace_with_progress) and
//! records one [`StageDiagnostics`] per executed stage (per band, for
//! multiband traces).
//!
//! The pipeline has no notion of wall-clock time of its own; callers
//! supply a [`Clock`]. That keeps the crate free of platform timers.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::document::TracedDocument;
use crate::progress::{ProgressSink, Stage};
use crate::types::{Bitmap, Contour, TraceError, TraceOptions};

/// `Duration` on the wire as fractional seconds.
mod seconds {
    use std::time::Duration;

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Duration::try_from_secs_f64(f64::deserialize(deserializer)?).map_err(D::Error::custom)
    }
}

/// Source of timestamps for stage timing.
pub trait Clock {
    /// Opaque point in time.
    type Instant;

    fn now(&self) -> Self::Instant;

    /// Time passed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// A clock that never advances. Used when nobody asked for timings.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoClock;

impl Clock for NoClock {
    type Instant = ();

    fn now(&self) {}

    fn elapsed(&self, _since: &()) -> Duration {
        Duration::ZERO
    }
}

/// Diagnostics collected from a single trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceDiagnostics {
    /// Executed stages in order.
    pub stages: Vec<StageDiagnostics>,
    /// Total wall-clock duration of the trace (seconds).
    #[serde(with = "seconds")]
    pub total_duration: Duration,
    /// Summary counts across all stages.
    pub summary: TraceSummary,
}

/// Diagnostics for a single stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    pub stage: Stage,
    /// Band threshold, for multiband traces.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub band: Option<u8>,
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "seconds")]
    pub duration: Duration,
    /// Stage-specific metrics (counts, sizes, etc.).
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Luminance thresholding.
    Binarize {
        threshold: u8,
        invert: bool,
        /// Pixels classified as foreground.
        foreground_pixels: u64,
        total_pixels: u64,
    },
    /// Marching-squares extraction.
    Extract {
        /// Number of contours found.
        contour_count: usize,
        /// Contours bounding holes.
        hole_count: usize,
        /// Total number of points across all contours.
        total_point_count: usize,
        cells_scanned: u64,
        /// Contours abandoned by the point cap.
        aborted: usize,
    },
    /// RDP simplification.
    Simplify {
        /// RDP tolerance in pixels.
        epsilon: f64,
        /// Total points before simplification.
        points_before: usize,
        /// Total points after simplification.
        points_after: usize,
        /// Reduction ratio: `1.0 - (after / before)`.
        reduction_ratio: f64,
    },
    /// Moving average or Chaikin smoothing.
    Smooth {
        /// Which smoother was used.
        strategy: String,
        points_before: usize,
        points_after: usize,
    },
    /// Complexity guard.
    Guard {
        /// Contours entering the guard.
        input_count: usize,
        /// Contours kept.
        kept: usize,
        dropped_short: usize,
        /// Minimum bounding-box area of the final pass (px^2).
        min_area: f64,
        relaxations: u32,
        truncated: usize,
        commands: usize,
        bytes: usize,
    },
    /// Ordering and millimetre placement.
    Scale {
        scale_x: f64,
        scale_y: f64,
        width_mm: f64,
        height_mm: f64,
    },
}

/// High-level summary counts for the whole trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceSummary {
    /// Source image width in pixels.
    pub image_width: u32,
    /// Source image height in pixels.
    pub image_height: u32,
    /// Total pixel count.
    pub pixel_count: u64,
    /// Emitted layers.
    pub layer_count: usize,
    /// Emitted paths.
    pub path_count: usize,
    /// Emitted nodes.
    pub node_count: usize,
}

impl TraceDiagnostics {
    /// Human-readable report.
    ///
    /// Stages are grouped by the band they ran for; stages that work on
    /// the whole image (every stage of a single-band trace, and final
    /// placement of a multiband one) form their own group.
    #[must_use]
    pub fn report(&self) -> String {
        let total_ms = millis(self.total_duration);
        let share = |ms: f64| if total_ms > 0.0 { ms / total_ms * 100.0 } else { 0.0 };

        let mut lines = vec![format!(
            "trace {}x{} ({} px) in {total_ms:.3} ms",
            self.summary.image_width, self.summary.image_height, self.summary.pixel_count,
        )];

        for group in self.stages.chunk_by(|a, b| a.band == b.band) {
            let group_ms: f64 = group.iter().map(|s| millis(s.duration)).sum();
            let heading = group
                .first()
                .and_then(|s| s.band)
                .map_or_else(|| "[whole image]".to_string(), |t| format!("[threshold {t}]"));
            lines.push(String::new());
            lines.push(format!(
                "{heading:<18} {group_ms:>9.3} ms {:>5.1}%",
                share(group_ms)
            ));
            for stage in group {
                let ms = millis(stage.duration);
                lines.push(format!(
                    "  {:<16} {ms:>9.3} ms {:>5.1}%  {}",
                    stage_label(&stage.metrics),
                    share(ms),
                    format_metrics(&stage.metrics),
                ));
            }
        }

        lines.push(String::new());
        lines.push(format!(
            "{} layers, {} paths, {} nodes",
            self.summary.layer_count, self.summary.path_count, self.summary.node_count,
        ));
        lines.join("\n")
    }

    /// Summed duration of every recorded stage with the given label.
    #[must_use]
    pub fn duration_of(&self, label: &str) -> Duration {
        self.stages
            .iter()
            .filter(|s| stage_label(&s.metrics) == label)
            .map(|s| s.duration)
            .sum()
    }
}

/// Display name for a metrics variant.
#[must_use]
pub const fn stage_label(metrics: &StageMetrics) -> &'static str {
    match metrics {
        StageMetrics::Binarize { .. } => "Binarize",
        StageMetrics::Extract { .. } => "Extract",
        StageMetrics::Simplify { .. } => "Simplify",
        StageMetrics::Smooth { .. } => "Smooth",
        StageMetrics::Guard { .. } => "Guard",
        StageMetrics::Scale { .. } => "Scale",
    }
}

/// Every label [`stage_label`] can return, in pipeline order.
pub const STAGE_LABELS: [&str; 6] = ["Binarize", "Extract", "Simplify", "Smooth", "Guard", "Scale"];

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Binarize {
            threshold,
            invert,
            foreground_pixels,
            total_pixels,
        } => {
            #[allow(clippy::cast_precision_loss)]
            let density = if *total_pixels > 0 {
                *foreground_pixels as f64 / *total_pixels as f64 * 100.0
            } else {
                0.0
            };
            let inv = if *invert { " inverted" } else { "" };
            format!("t={threshold}{inv} fg={foreground_pixels} ({density:.1}%)")
        }
        StageMetrics::Extract {
            contour_count,
            hole_count,
            total_point_count,
            aborted,
            ..
        } => format!(
            "{contour_count} contours ({hole_count} holes), {total_point_count} pts, {aborted} aborted",
        ),
        StageMetrics::Simplify {
            epsilon,
            points_before,
            points_after,
            reduction_ratio,
        } => format!(
            "eps={epsilon:.2} {points_before}->{points_after} pts ({:.1}% reduction)",
            reduction_ratio * 100.0,
        ),
        StageMetrics::Smooth {
            strategy,
            points_before,
            points_after,
        } => format!("{strategy} {points_before}->{points_after} pts"),
        StageMetrics::Guard {
            input_count,
            kept,
            min_area,
            relaxations,
            truncated,
            commands,
            ..
        } => format!(
            "{input_count}->{kept} paths, min_area={min_area:.1} relax={relaxations} cut={truncated} cmds={commands}",
        ),
        StageMetrics::Scale {
            scale_x,
            scale_y,
            width_mm,
            height_mm,
        } => format!("{scale_x:.4}x{scale_y:.4} mm/px -> {width_mm:.1}x{height_mm:.1} mm"),
    }
}

/// Total points across a slice of contours.
pub(crate) fn total_points(contours: &[Contour]) -> usize {
    contours.iter().map(Contour::len).sum()
}

/// Records stage timings while the pipeline runs.
pub(crate) struct StageLog<'c, C: Clock> {
    clock: &'c C,
    pub(crate) stages: Vec<StageDiagnostics>,
}

impl<'c, C: Clock> StageLog<'c, C> {
    pub(crate) const fn new(clock: &'c C) -> Self {
        Self {
            clock,
            stages: Vec::new(),
        }
    }

    /// Run `f`, timing it, and record its metrics.
    pub(crate) fn time<T>(
        &mut self,
        stage: Stage,
        band: Option<u8>,
        f: impl FnOnce() -> T,
        metrics: impl FnOnce(&T) -> StageMetrics,
    ) -> T {
        let start = self.clock.now();
        let value = f();
        let duration = self.clock.elapsed(&start);
        self.stages.push(StageDiagnostics {
            stage,
            band,
            duration,
            metrics: metrics(&value),
        });
        value
    }

    /// Like [`time`](Self::time), but only records the stage on success.
    pub(crate) fn try_time<T, E>(
        &mut self,
        stage: Stage,
        band: Option<u8>,
        f: impl FnOnce() -> Result<T, E>,
        metrics: impl FnOnce(&T) -> StageMetrics,
    ) -> Result<T, E> {
        let start = self.clock.now();
        let value = f()?;
        let duration = self.clock.elapsed(&start);
        self.stages.push(StageDiagnostics {
            stage,
            band,
            duration,
            metrics: metrics(&value),
        });
        Ok(value)
    }
}

/// Run the trace pipeline and collect per-stage diagnostics.
///
/// # Errors
///
/// Returns the same errors as [`trace_with_progress`](crate::trace_with_progress).
pub fn trace_with_diagnostics<P: ProgressSink + ?Sized, C: Clock>(
    bitmap: &Bitmap,
    options: &TraceOptions,
    progress: &mut P,
    clock: &C,
) -> Result<(TracedDocument, TraceDiagnostics), TraceError> {
    let start = clock.now();
    let mut log = StageLog::new(clock);
    let document = crate::pipeline::run(bitmap, options, progress, &mut log)?;
    let total_duration = clock.elapsed(&start);

    let dimensions = bitmap.dimensions();
    let summary = TraceSummary {
        image_width: dimensions.width,
        image_height: dimensions.height,
        pixel_count: dimensions.pixel_count(),
        layer_count: document.layers.len(),
        path_count: document.path_count(),
        node_count: document.node_count(),
    };

    Ok((
        document,
        TraceDiagnostics {
            stages: log.stages,
            total_duration,
            summary,
        },
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::progress::NoProgress;
    use crate::types::{RgbaImage, TraceMode};

    /// Advances one millisecond every time it is read.
    struct TickClock(Cell<u64>);

    impl Clock for TickClock {
        type Instant = u64;

        fn now(&self) -> u64 {
            let t = self.0.get();
            self.0.set(t + 1);
            t
        }

        fn elapsed(&self, since: &u64) -> Duration {
            Duration::from_millis(self.now() - since)
        }
    }

    fn square_bitmap() -> Bitmap {
        let img = RgbaImage::from_fn(40, 40, |x, y| {
            if (10..30).contains(&x) && (10..30).contains(&y) {
                image::Rgba([0, 0, 0, 255])
            } else {
                image::Rgba([255, 255, 255, 255])
            }
        });
        Bitmap::from_image(img).unwrap()
    }

    #[test]
    fn millis_converts_correctly() {
        assert!((millis(Duration::from_micros(1_234_500)) - 1234.5).abs() < 1e-9);
    }

    #[test]
    fn no_clock_reports_zero() {
        let clock = NoClock;
        let start = clock.now();
        assert_eq!(clock.elapsed(&start), Duration::ZERO);
    }

    #[test]
    fn single_band_records_every_stage_once() {
        let clock = TickClock(Cell::new(0));
        let (doc, diag) = trace_with_diagnostics(
            &square_bitmap(),
            &TraceOptions::default(),
            &mut NoProgress,
            &clock,
        )
        .unwrap();
        let labels: Vec<&str> = diag.stages.iter().map(|s| stage_label(&s.metrics)).collect();
        assert_eq!(labels, STAGE_LABELS.to_vec());
        assert!(diag.stages.iter().all(|s| s.band.is_none()));
        assert!(diag.total_duration >= Duration::from_millis(1));
        assert_eq!(diag.summary.path_count, doc.path_count());
    }

    #[test]
    fn multiband_tags_stages_with_band() {
        let clock = TickClock(Cell::new(0));
        let options = TraceOptions {
            mode: TraceMode::Multiband,
            thresholds: Some(vec![100, 200]),
            ..TraceOptions::default()
        };
        let (_, diag) =
            trace_with_diagnostics(&square_bitmap(), &options, &mut NoProgress, &clock).unwrap();
        let bands: Vec<u8> = diag.stages.iter().filter_map(|s| s.band).collect();
        assert!(bands.contains(&100));
        assert!(bands.contains(&200));
    }

    #[test]
    fn report_lists_stages_and_totals() {
        let (doc, diag) = trace_with_diagnostics(
            &square_bitmap(),
            &TraceOptions::default(),
            &mut NoProgress,
            &NoClock,
        )
        .unwrap();
        let report = diag.report();
        assert!(report.starts_with("trace 40x40 (1600 px)"));
        assert_eq!(report.matches("[whole image]").count(), 1);
        assert!(report.contains("Extract"));
        let footer = format!("1 layers, 1 paths, {} nodes", doc.node_count());
        assert!(report.ends_with(&footer), "{report}");
    }

    #[test]
    fn report_groups_stages_by_band() {
        let options = TraceOptions {
            mode: TraceMode::Multiband,
            thresholds: Some(vec![100, 200]),
            ..TraceOptions::default()
        };
        let (_, diag) =
            trace_with_diagnostics(&square_bitmap(), &options, &mut NoProgress, &NoClock).unwrap();
        let report = diag.report();
        let first = report.find("[threshold 100]").unwrap();
        let second = report.find("[threshold 200]").unwrap();
        let placement = report.find("[whole image]").unwrap();
        assert!(first < second && second < placement, "{report}");
    }

    #[test]
    fn diagnostics_serialize_durations_as_seconds() {
        let stage = StageDiagnostics {
            stage: Stage::Trace,
            band: None,
            duration: Duration::from_millis(1500),
            metrics: StageMetrics::Smooth {
                strategy: "chaikin".into(),
                points_before: 4,
                points_after: 8,
            },
        };
        let json = serde_json::to_value(&stage).unwrap();
        assert!((json["duration"].as_f64().unwrap() - 1.5).abs() < 1e-9);
        assert!(json.get("band").is_none());
        let back: StageDiagnostics = serde_json::from_value(json).unwrap();
        assert_eq!(back.duration, Duration::from_millis(1500));
    }
}
