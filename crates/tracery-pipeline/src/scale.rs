//! Pixel-to-millimetre placement.
//!
//! Every layer of a trace shares one [`Placement`]: the image centre maps
//! to the origin and each axis is multiplied by its scale factor, so
//! relative geometry between contours (and between multiband layers) is
//! preserved.

use serde::{Deserialize, Serialize};

use crate::types::{BoundingBox, Contour, Dimensions, Point, TraceOptions};

pub const MM_PER_INCH: f64 = 25.4;

/// CSS reference pixel density shared with the rest of the application.
pub const PX_PER_INCH: f64 = 96.0;

/// Physical size of one source pixel when no target size is requested.
pub const MM_PER_PX: f64 = MM_PER_INCH / PX_PER_INCH;

/// How pixel-space contours are mapped into millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    /// Millimetres per pixel along x.
    pub scale_x: f64,
    /// Millimetres per pixel along y.
    pub scale_y: f64,
    /// Image centre in pixel space; maps to the origin.
    pub center_px: Point,
    /// The whole scaled image, centred on the origin.
    pub frame: BoundingBox,
    /// Bounds of the emitted contours, once known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<BoundingBox>,
}

impl Placement {
    /// Scale factors and frame for an image of `dimensions`.
    ///
    /// With `lockAspect` both axes share `min(tw / w, th / h)`, so the
    /// image fits inside the target without stretching; a single target
    /// side alone determines the factor. Unlocked axes scale
    /// independently and fall back to [`MM_PER_PX`] when their target is
    /// missing. `footprintFraction` shrinks any target-derived factor.
    #[must_use]
    pub fn compute(dimensions: Dimensions, options: &TraceOptions) -> Self {
        let w = f64::from(dimensions.width.max(1));
        let h = f64::from(dimensions.height.max(1));
        let ratio_x = options.target_width_mm.map(|tw| tw / w);
        let ratio_y = options.target_height_mm.map(|th| th / h);
        let fraction = options.footprint_fraction;

        let (scale_x, scale_y) = if options.lock_aspect {
            let s = match (ratio_x, ratio_y) {
                (Some(rx), Some(ry)) => rx.min(ry) * fraction,
                (Some(r), None) | (None, Some(r)) => r * fraction,
                (None, None) => MM_PER_PX,
            };
            (s, s)
        } else {
            (
                ratio_x.map_or(MM_PER_PX, |r| r * fraction),
                ratio_y.map_or(MM_PER_PX, |r| r * fraction),
            )
        };

        let half_w = w * scale_x / 2.0;
        let half_h = h * scale_y / 2.0;
        Self {
            scale_x,
            scale_y,
            center_px: Point::new(w / 2.0, h / 2.0),
            frame: BoundingBox {
                min_x: -half_w,
                min_y: -half_h,
                max_x: half_w,
                max_y: half_h,
            },
            content: None,
        }
    }

    /// Map one pixel-space point into millimetres.
    #[must_use]
    pub fn apply(&self, p: Point) -> Point {
        Point::new(
            (p.x - self.center_px.x) * self.scale_x,
            (p.y - self.center_px.y) * self.scale_y,
        )
    }

    /// Map every contour into millimetres and grow [`content`](Self::content)
    /// to cover them.
    #[must_use = "returns the scaled contours"]
    pub fn place(&mut self, contours: &[Contour]) -> Vec<Contour> {
        let placed: Vec<Contour> = contours
            .iter()
            .map(|c| Contour::new(c.points().iter().map(|&p| self.apply(p)).collect()))
            .collect();
        for bounds in placed.iter().filter_map(Contour::bounding_box) {
            self.content = Some(self.content.map_or(bounds, |b| b.union(bounds)));
        }
        placed
    }

    /// Width of the frame in millimetres.
    #[must_use]
    pub fn width_mm(&self) -> f64 {
        self.frame.width()
    }

    /// Height of the frame in millimetres.
    #[must_use]
    pub fn height_mm(&self) -> f64 {
        self.frame.height()
    }
}
