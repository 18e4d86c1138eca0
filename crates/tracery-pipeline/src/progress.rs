//! Progress reporting and cooperative cancellation.
//!
//! The pipeline never blocks or performs I/O. Instead it calls into a
//! [`ProgressSink`] at coarse intervals (stage boundaries and every
//! few scan rows) and polls the same sink for cancellation.

use serde::{Deserialize, Serialize};

use crate::types::TraceError;

/// Coarse pipeline stage, reported alongside progress fractions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Input validation.
    Decode,
    /// Binarization.
    Preprocess,
    /// Marching-squares contour extraction.
    Trace,
    /// Simplification, smoothing and the complexity guard.
    Simplify,
    /// Scaling and document assembly.
    Finalize,
}

impl Stage {
    /// Lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Decode => "decode",
            Self::Preprocess => "preprocess",
            Self::Trace => "trace",
            Self::Simplify => "simplify",
            Self::Finalize => "finalize",
        }
    }
}

/// Receives progress updates and answers cancellation polls.
pub trait ProgressSink {
    /// Record that `stage` is `fraction` (0.0 to 1.0) complete.
    fn report(&mut self, stage: Stage, fraction: f64, message: Option<&str>);

    /// Whether the caller has asked the trace to stop.
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// A sink that discards progress and never cancels.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _stage: Stage, _fraction: f64, _message: Option<&str>) {}
}

/// Returns [`TraceError::Cancelled`] if the sink reports cancellation.
///
/// # Errors
///
/// Returns [`TraceError::Cancelled`] when `sink.is_cancelled()`.
pub fn checkpoint<P: ProgressSink + ?Sized>(sink: &P) -> Result<(), TraceError> {
    if sink.is_cancelled() {
        Err(TraceError::Cancelled)
    } else {
        Ok(())
    }
}

/// Maps a sub-task's 0..1 progress into a slice of the parent's range.
///
/// Multiband tracing runs the full single-band pipeline once per band;
/// each band reports into its own share of the overall fraction.
pub struct Scoped<'a, P: ProgressSink + ?Sized> {
    inner: &'a mut P,
    offset: f64,
    span: f64,
    label: String,
}

impl<'a, P: ProgressSink + ?Sized> Scoped<'a, P> {
    /// Wrap `inner`, mapping fractions into `offset..offset + span`.
    pub fn new(inner: &'a mut P, offset: f64, span: f64, label: String) -> Self {
        Self {
            inner,
            offset,
            span,
            label,
        }
    }
}

impl<P: ProgressSink + ?Sized> ProgressSink for Scoped<'_, P> {
    fn report(&mut self, stage: Stage, fraction: f64, message: Option<&str>) {
        let mapped = self.span.mul_add(fraction.clamp(0.0, 1.0), self.offset);
        let text = message.map_or_else(
            || self.label.clone(),
            |m| format!("{}: {m}", self.label),
        );
        self.inner.report(stage, mapped, Some(&text));
    }

    fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }
}
