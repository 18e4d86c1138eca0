//! tracery-export: Pure format serializers (sans-IO)
//!
//! Converts a traced document into output formats. Currently supports
//! SVG, plus the [`TraceResult`] summary handed back to callers.

pub mod result;
pub mod svg;

pub use result::{TraceResult, render};
pub use svg::{SvgMetadata, build_path_data, to_svg};
