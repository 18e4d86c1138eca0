//! The caller-facing trace result: SVG markup plus counts.

use serde::{Deserialize, Serialize};

use tracery_pipeline::TracedDocument;

use crate::svg::{SvgMetadata, to_svg};

/// Successful trace, ready to hand back across the worker boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceResult {
    /// Complete SVG document.
    pub svg: String,
    /// Source bitmap width in pixels.
    pub width_px: u32,
    /// Source bitmap height in pixels.
    pub height_px: u32,
    /// Paths summed over every layer.
    pub path_count: usize,
    /// Nodes summed over every path.
    pub node_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Serialize `document` and collect its counts.
#[must_use]
pub fn render(document: &TracedDocument, metadata: &SvgMetadata<'_>) -> TraceResult {
    TraceResult {
        svg: to_svg(document, metadata),
        width_px: document.dimensions.width,
        height_px: document.dimensions.height,
        path_count: document.path_count(),
        node_count: document.node_count(),
        warnings: document.warnings.clone(),
    }
}
