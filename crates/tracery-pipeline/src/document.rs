//! The traced document: millimetre-space layers ready for serialization.

use serde::{Deserialize, Serialize};

use crate::scale::Placement;
use crate::types::{Contour, Dimensions, TraceMode};

/// Stroke width for cut-line modes, in millimetres.
pub const HAIRLINE_MM: f64 = 0.1;

/// How overlapping sub-paths of a filled layer combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillRule {
    NonZero,
    /// Nested loops alternate between filled and empty, so holes show.
    EvenOdd,
}

/// Paint applied to every contour in a layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum LayerStyle {
    /// Solid fill in a shade of gray (0 = black). No stroke.
    Fill { gray: u8, rule: FillRule },
    /// Black stroke, no fill.
    Stroke { width_mm: f64 },
}

impl LayerStyle {
    /// Style for a single-band trace in `mode`.
    #[must_use]
    pub const fn for_mode(mode: TraceMode) -> Self {
        match mode {
            TraceMode::Silhouette => Self::Fill {
                gray: 0,
                rule: FillRule::NonZero,
            },
            TraceMode::Engrave | TraceMode::Multiband => Self::Fill {
                gray: 0,
                rule: FillRule::EvenOdd,
            },
            TraceMode::Outline | TraceMode::Lineart => Self::Stroke {
                width_mm: HAIRLINE_MM,
            },
        }
    }
}

/// Contours traced at one threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    /// Luminance threshold the layer was binarized at.
    pub threshold: u8,
    pub style: LayerStyle,
    /// Closed contours in millimetres, centred on the origin.
    pub contours: Vec<Contour>,
}

impl Layer {
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.contours.iter().map(Contour::len).sum()
    }
}

/// Result of a successful trace, before serialization.
///
/// Layers are stored in drawing order: for multiband traces the
/// lightest (highest threshold) band comes first so darker bands are
/// painted over it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TracedDocument {
    pub mode: TraceMode,
    /// Source bitmap size in pixels.
    pub dimensions: Dimensions,
    pub placement: Placement,
    pub layers: Vec<Layer>,
    /// Non-fatal notes about filtering, relaxation and skipped bands.
    pub warnings: Vec<String>,
}

impl TracedDocument {
    /// Number of emitted paths across all layers.
    #[must_use]
    pub fn path_count(&self) -> usize {
        self.layers.iter().map(|l| l.contours.len()).sum()
    }

    /// Number of emitted nodes across all layers.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.layers.iter().map(Layer::node_count).sum()
    }
}
