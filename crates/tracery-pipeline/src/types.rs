//! Shared types for the tracery tracing pipeline.

use serde::{Deserialize, Serialize};

/// Re-export `RgbaImage` so downstream crates can build a [`Bitmap`]
/// from decoded pixels without depending on `image` directly.
pub use image::RgbaImage;

/// A 2D point. Pixel space inside the pipeline, millimetres after
/// [`scale`](crate::scale).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position.
    pub x: f64,
    /// Vertical position (grows downward).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    ///
    /// Avoids the square root for comparison purposes.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Smallest box containing every point, or `None` for an empty slice.
    #[must_use]
    pub fn from_points(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let seed = Self {
            min_x: first.x,
            min_y: first.y,
            max_x: first.x,
            max_y: first.y,
        };
        Some(points[1..].iter().fold(seed, |b, p| Self {
            min_x: b.min_x.min(p.x),
            min_y: b.min_y.min(p.y),
            max_x: b.max_x.max(p.x),
            max_y: b.max_y.max(p.y),
        }))
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    #[must_use]
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    #[must_use]
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Smallest box containing both boxes.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }
}

/// A closed polygonal boundary.
///
/// The loop is stored without repeating the first point; the segment
/// from the last point back to the first is implicit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contour(Vec<Point>);

impl Contour {
    /// Create a new contour from its vertices in traversal order.
    #[must_use]
    pub const fn new(points: Vec<Point>) -> Self {
        Self(points)
    }

    /// Returns `true` if the contour has no points.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of vertices (nodes) in the loop.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns the first vertex, if any.
    #[must_use]
    pub fn first(&self) -> Option<&Point> {
        self.0.first()
    }

    /// Returns a slice of all vertices.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.0
    }

    /// Consumes the contour and returns the underlying vertices.
    #[must_use]
    pub fn into_points(self) -> Vec<Point> {
        self.0
    }

    /// Bounding box of the vertices, `None` when empty.
    #[must_use]
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        BoundingBox::from_points(&self.0)
    }

    /// Signed shoelace area of the closed loop.
    ///
    /// In the y-down image coordinate system the extractor emits outer
    /// boundaries with negative area and holes with positive area.
    #[must_use]
    pub fn signed_area(&self) -> f64 {
        let n = self.0.len();
        if n < 3 {
            return 0.0;
        }
        let twice: f64 = (0..n)
            .map(|i| {
                let a = self.0[i];
                let b = self.0[(i + 1) % n];
                a.x.mul_add(b.y, -(b.x * a.y))
            })
            .sum();
        twice / 2.0
    }

    /// `true` when the loop bounds a hole in the foreground.
    #[must_use]
    pub fn is_hole(&self) -> bool {
        self.signed_area() > 0.0
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Total pixel count.
    #[must_use]
    pub const fn pixel_count(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Immutable RGBA input raster.
///
/// Guaranteed non-empty with exactly `width * height * 4` bytes.
#[derive(Debug, Clone)]
pub struct Bitmap(RgbaImage);

impl Bitmap {
    /// Build a bitmap from interleaved RGBA bytes.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::MalformedRequest`] if either dimension is
    /// zero or `data.len() != width * height * 4`.
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Result<Self, TraceError> {
        if width == 0 || height == 0 {
            return Err(TraceError::MalformedRequest(format!(
                "bitmap dimensions must be non-zero, got {width}x{height}"
            )));
        }
        let expected = u64::from(width) * u64::from(height) * 4;
        if data.len() as u64 != expected {
            return Err(TraceError::MalformedRequest(format!(
                "bitmap data has {} bytes, expected {expected} for {width}x{height} RGBA",
                data.len(),
            )));
        }
        RgbaImage::from_raw(width, height, data)
            .map(Self)
            .ok_or_else(|| TraceError::MalformedRequest("bitmap buffer rejected".into()))
    }

    /// Wrap an already-decoded image.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::MalformedRequest`] if the image is empty.
    pub fn from_image(image: RgbaImage) -> Result<Self, TraceError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(TraceError::MalformedRequest(
                "bitmap dimensions must be non-zero".into(),
            ));
        }
        Ok(Self(image))
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.0.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.0.height()
    }

    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.0.width(),
            height: self.0.height(),
        }
    }

    /// The wrapped image.
    #[must_use]
    pub const fn as_image(&self) -> &RgbaImage {
        &self.0
    }

    /// Raw interleaved RGBA bytes, row-major.
    #[must_use]
    pub fn as_raw(&self) -> &[u8] {
        self.0.as_raw()
    }
}

/// What kind of artwork a trace produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceMode {
    /// Filled outer shapes; holes are discarded.
    #[default]
    Silhouette,
    /// Stroked cut lines around every boundary.
    Outline,
    /// Filled shapes with holes preserved (even-odd fill).
    Engrave,
    /// Layered fills at several thresholds approximating grayscale.
    Multiband,
    /// Stroked boundaries that keep fine detail regardless of preset.
    Lineart,
}

impl TraceMode {
    /// Whether output paths are filled (as opposed to stroked).
    #[must_use]
    pub const fn is_filled(self) -> bool {
        matches!(self, Self::Silhouette | Self::Engrave | Self::Multiband)
    }
}

/// Trade-off between detail and output size used by the complexity guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TracePreset {
    /// Keep small features.
    Detailed,
    #[default]
    Balanced,
    /// Aggressively drop small contours.
    Fast,
}

impl TracePreset {
    /// Minimum contour bounding-box area as a fraction of image area.
    #[must_use]
    pub const fn min_area_ratio(self) -> f64 {
        match self {
            Self::Detailed => 1e-5,
            Self::Balanced => 1e-4,
            Self::Fast => 5e-4,
        }
    }
}

/// Options controlling a single trace request.
///
/// Deserialized from the camelCase request schema; absent fields take
/// their defaults. Call [`validate`](Self::validate) before tracing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TraceOptions {
    pub mode: TraceMode,

    /// Luminance threshold (0-255). Pixels darker than this are
    /// foreground.
    pub threshold: u8,

    /// Band thresholds for [`TraceMode::Multiband`]. Falls back to
    /// [`DEFAULT_BAND_THRESHOLDS`](Self::DEFAULT_BAND_THRESHOLDS).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thresholds: Option<Vec<u8>>,

    /// Swap foreground and background.
    pub invert: bool,

    /// Simplification amount (0-10). RDP epsilon is half this, in pixels.
    pub simplify: f64,

    /// Smoothing amount (0-10).
    pub smoothing: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_width_mm: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_height_mm: Option<f64>,

    /// Scale both axes uniformly.
    pub lock_aspect: bool,

    /// Fraction of the target footprint the artwork may occupy (0, 1].
    pub footprint_fraction: f64,

    /// Contours with fewer nodes than this are dropped. Never below 3.
    pub min_path_nodes: u32,

    /// Cap on emitted paths. Defaults to the complexity guard's budget.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_paths: Option<u32>,

    pub preset: TracePreset,
}

impl TraceOptions {
    pub const DEFAULT_THRESHOLD: u8 = 128;
    pub const DEFAULT_SIMPLIFY: f64 = 1.0;
    pub const DEFAULT_SMOOTHING: f64 = 0.0;
    pub const DEFAULT_MIN_PATH_NODES: u32 = 3;
    pub const DEFAULT_FOOTPRINT_FRACTION: f64 = 1.0;
    pub const DEFAULT_BAND_THRESHOLDS: [u8; 3] = [64, 128, 192];

    /// Upper bound of the `simplify` and `smoothing` sliders.
    pub const MAX_AMOUNT: f64 = 10.0;
    /// Maximum number of multiband layers.
    pub const MAX_BANDS: usize = 16;

    /// Check every field against its documented range.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::MalformedRequest`] naming the first
    /// offending field.
    pub fn validate(&self) -> Result<(), TraceError> {
        let bad = |msg: String| Err(TraceError::MalformedRequest(msg));

        for (name, value) in [("simplify", self.simplify), ("smoothing", self.smoothing)] {
            if !value.is_finite() || !(0.0..=Self::MAX_AMOUNT).contains(&value) {
                return bad(format!("{name} must be within 0..=10, got {value}"));
            }
        }
        for (name, value) in [
            ("targetWidthMm", self.target_width_mm),
            ("targetHeightMm", self.target_height_mm),
        ] {
            if let Some(v) = value
                && !(v.is_finite() && v > 0.0)
            {
                return bad(format!("{name} must be a positive finite size, got {v}"));
            }
        }
        if !(self.footprint_fraction.is_finite()
            && self.footprint_fraction > 0.0
            && self.footprint_fraction <= 1.0)
        {
            return bad(format!(
                "footprintFraction must be within (0, 1], got {}",
                self.footprint_fraction
            ));
        }
        if self.max_paths == Some(0) {
            return bad("maxPaths must be at least 1".into());
        }
        if let Some(ref thresholds) = self.thresholds {
            if thresholds.is_empty() {
                return bad("thresholds must not be empty".into());
            }
            if thresholds.len() > Self::MAX_BANDS {
                return bad(format!(
                    "at most {} thresholds are supported, got {}",
                    Self::MAX_BANDS,
                    thresholds.len()
                ));
            }
        }
        Ok(())
    }

    /// Band thresholds sorted ascending with duplicates removed.
    #[must_use]
    pub fn band_thresholds(&self) -> Vec<u8> {
        let mut bands = self
            .thresholds
            .clone()
            .unwrap_or_else(|| Self::DEFAULT_BAND_THRESHOLDS.to_vec());
        bands.sort_unstable();
        bands.dedup();
        bands
    }

    /// Effective minimum node count per contour.
    #[must_use]
    pub fn min_nodes(&self) -> usize {
        self.min_path_nodes.max(3) as usize
    }
}

impl Default for TraceOptions {
    fn default() -> Self {
        Self {
            mode: TraceMode::default(),
            threshold: Self::DEFAULT_THRESHOLD,
            thresholds: None,
            invert: false,
            simplify: Self::DEFAULT_SIMPLIFY,
            smoothing: Self::DEFAULT_SMOOTHING,
            target_width_mm: None,
            target_height_mm: None,
            lock_aspect: true,
            footprint_fraction: Self::DEFAULT_FOOTPRINT_FRACTION,
            min_path_nodes: Self::DEFAULT_MIN_PATH_NODES,
            max_paths: None,
            preset: TracePreset::default(),
        }
    }
}

/// Errors that can end a trace.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum TraceError {
    /// Binarization left nothing worth emitting.
    #[error("no usable contours found; try a different threshold or toggle invert")]
    EmptyResult,

    /// The output could not be brought under budget.
    #[error(
        "output too complex ({paths} paths, {commands} commands, {bytes} bytes; limits are \
         {max_commands} commands and {max_bytes} bytes); raise simplify, adjust the threshold, \
         or use the fast preset"
    )]
    ComplexityExceeded {
        paths: usize,
        commands: usize,
        bytes: usize,
        max_commands: usize,
        max_bytes: usize,
    },

    /// Bitmap or options failed validation.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// Unexpected fault inside a stage.
    #[error("internal failure: {0}")]
    InternalFailure(String),

    /// The caller cancelled the request.
    #[error("trace cancelled")]
    Cancelled,
}
