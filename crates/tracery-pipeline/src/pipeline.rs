//! Stage orchestration shared by every public entry point.
//!
//! A band is one pass of binarize -> extract -> simplify -> smooth ->
//! guard at a single threshold, in pixel space. Single-band modes run
//! one band; multiband runs one per threshold (see
//! [`multiband`](crate::multiband)). Finalization orders and places every
//! band's contours into one millimetre-space [`TracedDocument`].

use crate::binarize::binarize;
use crate::complexity::{self, ComplexityBudget, GuardOutcome};
use crate::contour::extract_contours;
use crate::diagnostics::{Clock, StageLog, StageMetrics, total_points};
use crate::document::{FillRule, Layer, LayerStyle, TracedDocument};
use crate::multiband;
use crate::order::order_for_travel;
use crate::progress::{ProgressSink, Stage, checkpoint};
use crate::scale::Placement;
use crate::simplify::{epsilon_for, simplify_contours};
use crate::smooth::{Smoother, SmootherKind};
use crate::types::{
    Bitmap, Contour, Dimensions, TraceError, TraceMode, TraceOptions, TracePreset,
};

/// Per-band parameters derived once from [`TraceOptions`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct BandSettings {
    pub invert: bool,
    pub epsilon: f64,
    pub smoother: SmootherKind,
    pub preset: TracePreset,
    pub min_nodes: usize,
    pub keep_holes: bool,
    pub budget: ComplexityBudget,
    /// Mapping into millimetres, shared by every band so the guard
    /// measures the coordinates that will actually be written.
    pub placement: Placement,
    /// Threshold tag for diagnostics; `None` for single-band traces.
    pub band: Option<u8>,
}

impl BandSettings {
    pub(crate) fn new(
        options: &TraceOptions,
        dimensions: Dimensions,
        budget: ComplexityBudget,
    ) -> Self {
        Self {
            invert: options.invert,
            epsilon: epsilon_for(options.simplify),
            smoother: SmootherKind::for_mode(options.mode, options.smoothing),
            // Line art keeps fine strokes whatever the preset says.
            preset: if options.mode == TraceMode::Lineart {
                TracePreset::Detailed
            } else {
                options.preset
            },
            min_nodes: options.min_nodes(),
            keep_holes: options.mode != TraceMode::Silhouette,
            budget,
            placement: Placement::compute(dimensions, options),
            band: None,
        }
    }
}

/// Contours of one band, in pixel space.
#[derive(Debug, Clone)]
pub(crate) struct Band {
    pub threshold: u8,
    /// Fill shade for multiband layers (0 = black).
    pub gray: u8,
    pub contours: Vec<Contour>,
}

/// Trace a single band at `threshold`.
pub(crate) fn trace_band<P: ProgressSink + ?Sized, C: Clock>(
    bitmap: &Bitmap,
    threshold: u8,
    settings: &BandSettings,
    progress: &mut P,
    log: &mut StageLog<'_, C>,
) -> Result<GuardOutcome, TraceError> {
    let band = settings.band;

    checkpoint(progress)?;
    progress.report(Stage::Preprocess, 0.0, None);
    let mask = log.time(
        Stage::Preprocess,
        band,
        || binarize(bitmap, threshold, settings.invert),
        |m| StageMetrics::Binarize {
            threshold,
            invert: settings.invert,
            foreground_pixels: m.foreground_count(),
            total_pixels: m.dimensions().pixel_count(),
        },
    );
    progress.report(Stage::Preprocess, 1.0, None);
    if mask.foreground_count() == 0 {
        return Err(TraceError::EmptyResult);
    }

    checkpoint(progress)?;
    let extraction = log.try_time(
        Stage::Trace,
        band,
        || extract_contours(&mask, progress),
        |e| StageMetrics::Extract {
            contour_count: e.contours.len(),
            hole_count: e.contours.iter().filter(|c| c.is_hole()).count(),
            total_point_count: total_points(&e.contours),
            cells_scanned: e.cells_scanned,
            aborted: e.aborted,
        },
    )?;
    let mut contours = extraction.contours;
    if !settings.keep_holes {
        contours.retain(|c| !c.is_hole());
    }

    checkpoint(progress)?;
    progress.report(Stage::Simplify, 0.0, None);
    let points_before = total_points(&contours);
    let simplified = log.time(
        Stage::Simplify,
        band,
        || simplify_contours(&contours, settings.epsilon),
        |s| {
            let points_after = total_points(s);
            #[allow(clippy::cast_precision_loss)]
            let reduction_ratio = if points_before > 0 {
                1.0 - points_after as f64 / points_before as f64
            } else {
                0.0
            };
            StageMetrics::Simplify {
                epsilon: settings.epsilon,
                points_before,
                points_after,
                reduction_ratio,
            }
        },
    );

    // Node minimum applies to simplified geometry, before corner cutting
    // multiplies the point count.
    let (kept, short): (Vec<Contour>, Vec<Contour>) = simplified
        .into_iter()
        .partition(|c| c.len() >= settings.min_nodes);
    progress.report(Stage::Simplify, 0.4, None);

    checkpoint(progress)?;
    let smoother = settings.smoother;
    let kept_points = total_points(&kept);
    let smoothed = log.time(
        Stage::Simplify,
        band,
        || smoother.smooth_all(&kept),
        |s| StageMetrics::Smooth {
            strategy: smoother.name().to_string(),
            points_before: kept_points,
            points_after: total_points(s),
        },
    );
    progress.report(Stage::Simplify, 0.7, None);

    checkpoint(progress)?;
    let input_count = smoothed.len() + short.len();
    #[allow(clippy::cast_precision_loss)]
    let image_area = bitmap.dimensions().pixel_count() as f64;
    let mut outcome = log.try_time(
        Stage::Simplify,
        band,
        || {
            complexity::enforce(
                smoothed,
                image_area,
                settings.preset,
                settings.min_nodes,
                &settings.placement,
                &settings.budget,
            )
        },
        |o| StageMetrics::Guard {
            input_count,
            kept: o.contours.len(),
            dropped_short: o.dropped_short + short.len(),
            min_area: o.min_area,
            relaxations: o.relaxations,
            truncated: o.truncated,
            commands: o.cost.commands,
            bytes: o.cost.bytes,
        },
    )?;
    outcome.dropped_short += short.len();
    progress.report(
        Stage::Simplify,
        1.0,
        Some(&format!("{} paths", outcome.contours.len())),
    );

    Ok(outcome)
}

/// Run the whole trace and assemble the document.
pub(crate) fn run<P: ProgressSink + ?Sized, C: Clock>(
    bitmap: &Bitmap,
    options: &TraceOptions,
    progress: &mut P,
    log: &mut StageLog<'_, C>,
) -> Result<TracedDocument, TraceError> {
    progress.report(Stage::Decode, 0.0, None);
    options.validate()?;
    checkpoint(progress)?;
    progress.report(Stage::Decode, 1.0, None);

    let dimensions = bitmap.dimensions();
    let budget = ComplexityBudget::from_options(options);
    let settings = BandSettings::new(options, dimensions, budget);

    let (bands, warnings) = if options.mode == TraceMode::Multiband {
        multiband::trace_bands(bitmap, options, &settings, progress, log)?
    } else {
        let outcome = trace_band(bitmap, options.threshold, &settings, progress, log)?;
        let band = Band {
            threshold: options.threshold,
            gray: 0,
            contours: order_for_travel(&outcome.contours),
        };
        (vec![band], outcome.warnings)
    };

    checkpoint(progress)?;
    progress.report(Stage::Finalize, 0.0, None);
    let mut placement = settings.placement;
    let (scale_x, scale_y) = (placement.scale_x, placement.scale_y);
    let (width_mm, height_mm) = (placement.width_mm(), placement.height_mm());

    let layers = log.time(
        Stage::Finalize,
        None,
        || {
            // Lightest band first so darker bands paint over it.
            bands
                .iter()
                .rev()
                .map(|band| Layer {
                    threshold: band.threshold,
                    style: if options.mode == TraceMode::Multiband {
                        LayerStyle::Fill {
                            gray: band.gray,
                            rule: FillRule::EvenOdd,
                        }
                    } else {
                        LayerStyle::for_mode(options.mode)
                    },
                    contours: placement.place(&band.contours),
                })
                .collect::<Vec<_>>()
        },
        |_| StageMetrics::Scale {
            scale_x,
            scale_y,
            width_mm,
            height_mm,
        },
    );

    let document = TracedDocument {
        mode: options.mode,
        dimensions,
        placement,
        layers,
        warnings,
    };
    progress.report(
        Stage::Finalize,
        1.0,
        Some(&format!("{} paths", document.path_count())),
    );
    Ok(document)
}
