//! tracery-pipeline: Pure bitmap-to-contour tracing pipeline (sans-IO).
//!
//! Converts an RGBA bitmap into closed vector contours through:
//! binarize -> marching squares -> RDP simplification -> smoothing ->
//! complexity guard -> travel ordering -> millimetre placement.
//! Multiband mode repeats the per-threshold steps once per band.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! pixel buffers and returns structured data. Serialization lives in
//! `tracery-export`; threads, channels and logging live in
//! `tracery-worker`.

pub mod binarize;
pub mod bitgrid;
pub mod complexity;
pub mod contour;
pub mod diagnostics;
pub mod document;
pub mod multiband;
pub mod order;
mod pipeline;
pub mod progress;
pub mod scale;
pub mod simplify;
pub mod smooth;
pub mod types;

pub use complexity::ComplexityBudget;
pub use document::{FillRule, Layer, LayerStyle, TracedDocument};
pub use progress::{NoProgress, ProgressSink, Stage};
pub use scale::{MM_PER_PX, Placement};
pub use smooth::{Smoother, SmootherKind};
pub use types::{
    Bitmap, BoundingBox, Contour, Dimensions, Point, RgbaImage, TraceError, TraceMode,
    TraceOptions, TracePreset,
};

use diagnostics::{NoClock, StageLog};

/// Trace `bitmap` with `options`.
///
/// # Errors
///
/// See [`trace_with_progress`].
pub fn trace(bitmap: &Bitmap, options: &TraceOptions) -> Result<TracedDocument, TraceError> {
    trace_with_progress(bitmap, options, &mut NoProgress)
}

/// Trace `bitmap`, reporting progress to and polling cancellation from
/// `progress`.
///
/// # Pipeline steps
///
/// 1. Validate options ([`Stage::Decode`])
/// 2. Binarize ([`Stage::Preprocess`])
/// 3. Marching-squares extraction ([`Stage::Trace`])
/// 4. Simplify, smooth and enforce the complexity budget ([`Stage::Simplify`])
/// 5. Order for travel and place in millimetres ([`Stage::Finalize`])
///
/// Steps 2-4 run once per band in [`TraceMode::Multiband`].
///
/// # Errors
///
/// Returns [`TraceError::MalformedRequest`] if `options` fail validation,
/// [`TraceError::EmptyResult`] if nothing survives filtering,
/// [`TraceError::ComplexityExceeded`] if the output cannot be brought
/// under budget, and [`TraceError::Cancelled`] if `progress` reports
/// cancellation at a checkpoint.
pub fn trace_with_progress<P: ProgressSink + ?Sized>(
    bitmap: &Bitmap,
    options: &TraceOptions,
    progress: &mut P,
) -> Result<TracedDocument, TraceError> {
    let mut log = StageLog::new(&NoClock);
    pipeline::run(bitmap, options, progress, &mut log)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn centered_square(size: u32, side: u32) -> Bitmap {
        let lo = (size - side) / 2;
        let hi = lo + side;
        let img = RgbaImage::from_fn(size, size, |x, y| {
            if (lo..hi).contains(&x) && (lo..hi).contains(&y) {
                image::Rgba([0, 0, 0, 255])
            } else {
                image::Rgba([255, 255, 255, 255])
            }
        });
        Bitmap::from_image(img).unwrap()
    }

    /// Records every progress event and cancels after `cancel_after` reports.
    #[derive(Default)]
    struct Recorder {
        events: Vec<(Stage, f64)>,
        cancel_after: Option<usize>,
    }

    impl ProgressSink for Recorder {
        fn report(&mut self, stage: Stage, fraction: f64, _message: Option<&str>) {
            self.events.push((stage, fraction));
        }

        fn is_cancelled(&self) -> bool {
            self.cancel_after.is_some_and(|n| self.events.len() >= n)
        }
    }

    #[test]
    fn trace_square_produces_one_layer() {
        let doc = trace(&centered_square(40, 20), &TraceOptions::default()).unwrap();
        assert_eq!(doc.layers.len(), 1);
        assert_eq!(doc.path_count(), 1);
        assert!(doc.node_count() >= 4);
        assert!(doc.warnings.is_empty());
    }

    #[test]
    fn stages_reported_in_order() {
        let mut recorder = Recorder::default();
        trace_with_progress(&centered_square(40, 20), &TraceOptions::default(), &mut recorder)
            .unwrap();
        let mut stages: Vec<Stage> = recorder.events.iter().map(|e| e.0).collect();
        stages.dedup();
        assert_eq!(
            stages,
            vec![
                Stage::Decode,
                Stage::Preprocess,
                Stage::Trace,
                Stage::Simplify,
                Stage::Finalize
            ]
        );
        assert!(
            recorder
                .events
                .iter()
                .all(|&(_, f)| (0.0..=1.0).contains(&f))
        );
    }

    #[test]
    fn cancellation_stops_at_next_checkpoint() {
        let mut recorder = Recorder {
            cancel_after: Some(3),
            ..Recorder::default()
        };
        let result =
            trace_with_progress(&centered_square(40, 20), &TraceOptions::default(), &mut recorder);
        assert_eq!(result.err(), Some(TraceError::Cancelled));
        assert!(!recorder.events.iter().any(|e| e.0 == Stage::Finalize));
    }

    #[test]
    fn invalid_options_rejected_before_work() {
        let options = TraceOptions {
            thresholds: Some(vec![]),
            ..TraceOptions::default()
        };
        let result = trace(&centered_square(10, 4), &options);
        assert!(matches!(result, Err(TraceError::MalformedRequest(_))));
    }

    #[test]
    fn outline_mode_strokes() {
        let options = TraceOptions {
            mode: TraceMode::Outline,
            ..TraceOptions::default()
        };
        let doc = trace(&centered_square(40, 20), &options).unwrap();
        assert!(matches!(doc.layers[0].style, LayerStyle::Stroke { .. }));
    }
}
