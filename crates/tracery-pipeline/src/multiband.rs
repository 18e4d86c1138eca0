//! Multiband tracing: layered posterization at several thresholds.
//!
//! Each threshold runs the full single-band pipeline. Lower thresholds
//! select only the darkest pixels, so they produce the smallest shapes
//! and get the darkest fill. Drawn lightest-first, the stacked fills
//! approximate the grayscale source.

use crate::diagnostics::{Clock, StageLog};
use crate::pipeline::{Band, BandSettings, trace_band};
use crate::progress::{ProgressSink, Scoped, checkpoint};
use crate::types::{Bitmap, TraceError, TraceOptions};

/// Gray level of the lightest possible band; pure white is never used.
pub const LIGHTEST_SHADE: u32 = 200;

/// Fill shade for band `index` of `count` (0 = black).
///
/// Shades are evenly spaced from black towards [`LIGHTEST_SHADE`].
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn band_shade(index: usize, count: usize) -> u8 {
    if count == 0 {
        return 0;
    }
    let shade = (index as f64 * f64::from(LIGHTEST_SHADE) / count as f64).round();
    shade.clamp(0.0, f64::from(LIGHTEST_SHADE)) as u8
}

/// Trace one band per threshold, ascending.
///
/// The complexity budget is shared evenly between bands. Bands that end
/// up empty are skipped with a warning.
///
/// # Errors
///
/// Returns [`TraceError::EmptyResult`] when every band is empty, and
/// propagates any other band failure (including cancellation).
pub(crate) fn trace_bands<P: ProgressSink + ?Sized, C: Clock>(
    bitmap: &Bitmap,
    options: &TraceOptions,
    settings: &BandSettings,
    progress: &mut P,
    log: &mut StageLog<'_, C>,
) -> Result<(Vec<Band>, Vec<String>), TraceError> {
    let thresholds = options.band_thresholds();
    let count = thresholds.len();
    let budget = settings.budget.split(count);

    let mut bands = Vec::with_capacity(count);
    let mut warnings = Vec::new();

    #[allow(clippy::cast_precision_loss)]
    let span = 1.0 / count.max(1) as f64;
    for (index, &threshold) in thresholds.iter().enumerate() {
        checkpoint(progress)?;
        let band_settings = BandSettings {
            budget,
            band: Some(threshold),
            ..*settings
        };
        #[allow(clippy::cast_precision_loss)]
        let offset = index as f64 * span;
        let mut scoped = Scoped::new(&mut *progress, offset, span, format!("band {threshold}"));

        match trace_band(bitmap, threshold, &band_settings, &mut scoped, log) {
            Ok(outcome) => {
                warnings.extend(
                    outcome
                        .warnings
                        .into_iter()
                        .map(|w| format!("band {threshold}: {w}")),
                );
                bands.push(Band {
                    threshold,
                    gray: band_shade(index, count),
                    contours: outcome.contours,
                });
            }
            Err(TraceError::EmptyResult) => {
                warnings.push(format!("band {threshold} produced no contours and was skipped"));
            }
            Err(e) => return Err(e),
        }
    }

    if bands.is_empty() {
        return Err(TraceError::EmptyResult);
    }
    Ok((bands, warnings))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::complexity::ComplexityBudget;
    use crate::diagnostics::NoClock;
    use crate::progress::NoProgress;
    use crate::types::{RgbaImage, TraceMode};

    /// Three vertical stripes: black, mid gray, light gray, then white.
    fn stripes() -> Bitmap {
        let img = RgbaImage::from_fn(80, 20, |x, _| {
            let v = match x / 20 {
                0 => 20,
                1 => 100,
                2 => 170,
                _ => 255,
            };
            image::Rgba([v, v, v, 255])
        });
        Bitmap::from_image(img).unwrap()
    }

    fn run_bands(thresholds: Vec<u8>) -> Result<(Vec<Band>, Vec<String>), TraceError> {
        let options = TraceOptions {
            mode: TraceMode::Multiband,
            thresholds: Some(thresholds),
            ..TraceOptions::default()
        };
        let settings = BandSettings::new(
            &options,
            stripes().dimensions(),
            ComplexityBudget::from_options(&options),
        );
        let mut log = StageLog::new(&NoClock);
        trace_bands(&stripes(), &options, &settings, &mut NoProgress, &mut log)
    }

    #[test]
    fn shades_are_distinct_and_never_white() {
        let shades: Vec<u8> = (0..3).map(|i| band_shade(i, 3)).collect();
        assert_eq!(shades, vec![0, 67, 133]);
        assert!(band_shade(15, 16) <= 200);
        assert_eq!(band_shade(0, 0), 0);
    }

    #[test]
    fn one_band_per_threshold_ascending() {
        let (bands, warnings) = run_bands(vec![192, 64, 128]).unwrap();
        let thresholds: Vec<u8> = bands.iter().map(|b| b.threshold).collect();
        assert_eq!(thresholds, vec![64, 128, 192]);
        assert!(warnings.is_empty(), "{warnings:?}");
        assert!(bands.iter().all(|b| b.contours.len() == 1));
        // Higher thresholds cover more stripes.
        let widths: Vec<f64> = bands
            .iter()
            .map(|b| b.contours[0].bounding_box().unwrap().width())
            .collect();
        assert!(widths[0] < widths[1] && widths[1] < widths[2]);
    }

    #[test]
    fn empty_band_is_skipped_with_warning() {
        // Nothing is darker than 10.
        let (bands, warnings) = run_bands(vec![10, 128]).unwrap();
        assert_eq!(bands.len(), 1);
        assert_eq!(bands[0].threshold, 128);
        // Shade keeps its position in the full threshold list.
        assert_eq!(bands[0].gray, 100);
        assert!(warnings.iter().any(|w| w.contains("band 10")));
    }

    #[test]
    fn all_bands_empty_is_empty_result() {
        assert_eq!(run_bands(vec![5, 10]).err(), Some(TraceError::EmptyResult));
    }
}
