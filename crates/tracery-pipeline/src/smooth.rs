//! Contour smoothing: local averaging and corner cutting.
//!
//! This module defines the [`Smoother`] trait for pluggable smoothing
//! strategies and the [`SmootherKind`] enum that selects one at runtime.
//! Both strategies treat their input as a closed loop: neighbours wrap
//! around from the last vertex to the first, and no endpoints are
//! introduced.

use crate::types::{Contour, Point, TraceMode};

/// Selects which smoothing algorithm to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmootherKind {
    /// Replace each vertex by the mean of itself and `radius` neighbours
    /// on either side. Point count is unchanged.
    MovingAverage {
        /// Neighbours per side. Zero is a no-op.
        radius: usize,
    },

    /// Chaikin corner cutting. Each iteration replaces every edge with
    /// points at its 1/4 and 3/4 positions, doubling the point count.
    Chaikin {
        /// Number of subdivision passes. Zero is a no-op.
        iterations: u32,
    },
}

impl SmootherKind {
    /// Most Chaikin passes ever applied.
    pub const MAX_CHAIKIN_ITERATIONS: u32 = 3;

    /// Largest moving-average radius, reached at smoothing 10. The
    /// averaging window is then 11 points wide.
    pub const MAX_RADIUS: usize = 5;

    /// Pick the strategy for `mode` at the given smoothing amount (0-10).
    ///
    /// Multiband output uses corner cutting; every other mode uses the
    /// moving average with `radius = round(smoothing / 2)`, capped at
    /// [`MAX_RADIUS`](Self::MAX_RADIUS) so a window never spans more than
    /// 11 points (fewer on short contours).
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn for_mode(mode: TraceMode, smoothing: f64) -> Self {
        let amount = if smoothing.is_finite() {
            smoothing.clamp(0.0, 10.0)
        } else {
            0.0
        };
        // amount is clamped to 0..=10, so both casts are exact and small.
        match mode {
            TraceMode::Multiband => Self::Chaikin {
                iterations: ((amount / 10.0 * 3.0).ceil() as u32)
                    .min(Self::MAX_CHAIKIN_ITERATIONS),
            },
            _ => Self::MovingAverage {
                radius: ((amount * 0.5).round() as usize).min(Self::MAX_RADIUS),
            },
        }
    }

    /// Short name used in diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::MovingAverage { .. } => "moving-average",
            Self::Chaikin { .. } => "chaikin",
        }
    }

    /// Whether this strategy leaves every contour untouched.
    #[must_use]
    pub const fn is_noop(self) -> bool {
        matches!(
            self,
            Self::MovingAverage { radius: 0 } | Self::Chaikin { iterations: 0 }
        )
    }
}

/// Trait for contour smoothing strategies.
pub trait Smoother {
    /// Smooth one closed contour.
    fn smooth(&self, contour: &Contour) -> Contour;

    /// Smooth every contour independently.
    fn smooth_all(&self, contours: &[Contour]) -> Vec<Contour> {
        contours.iter().map(|c| self.smooth(c)).collect()
    }
}

impl Smoother for SmootherKind {
    fn smooth(&self, contour: &Contour) -> Contour {
        if contour.len() < 3 {
            return contour.clone();
        }
        match *self {
            Self::MovingAverage { radius } => moving_average(contour.points(), radius),
            Self::Chaikin { iterations } => chaikin(contour.points(), iterations),
        }
    }
}

fn moving_average(points: &[Point], radius: usize) -> Contour {
    let n = points.len();
    // Keep the window strictly inside the loop.
    let radius = radius.min((n - 1) / 2);
    if radius == 0 {
        return Contour::new(points.to_vec());
    }

    #[allow(clippy::cast_precision_loss)]
    let window = (2 * radius + 1) as f64;
    let smoothed = (0..n)
        .map(|i| {
            let (sx, sy) = (0..=2 * radius).fold((0.0, 0.0), |(sx, sy), k| {
                let p = points[(i + n + k - radius) % n];
                (sx + p.x, sy + p.y)
            });
            Point::new(sx / window, sy / window)
        })
        .collect();
    Contour::new(smoothed)
}

fn chaikin(points: &[Point], iterations: u32) -> Contour {
    let mut current = points.to_vec();
    for _ in 0..iterations {
        let n = current.len();
        let mut next = Vec::with_capacity(n * 2);
        for i in 0..n {
            let a = current[i];
            let b = current[(i + 1) % n];
            next.push(Point::new(
                0.75f64.mul_add(a.x, 0.25 * b.x),
                0.75f64.mul_add(a.y, 0.25 * b.y),
            ));
            next.push(Point::new(
                0.25f64.mul_add(a.x, 0.75 * b.x),
                0.25f64.mul_add(a.y, 0.75 * b.y),
            ));
        }
        current = next;
    }
    Contour::new(current)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn square() -> Contour {
        Contour::new(vec![
            Point::new(0.0, 0.0),
            Point::new(0.0, 4.0),
            Point::new(4.0, 4.0),
            Point::new(4.0, 0.0),
        ])
    }

    fn centroid(c: &Contour) -> Point {
        #[allow(clippy::cast_precision_loss)]
        let n = c.len() as f64;
        let (sx, sy) = c
            .points()
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        Point::new(sx / n, sy / n)
    }

    #[test]
    fn zero_strength_is_noop() {
        let c = square();
        assert_eq!(SmootherKind::MovingAverage { radius: 0 }.smooth(&c), c);
        assert_eq!(SmootherKind::Chaikin { iterations: 0 }.smooth(&c), c);
    }

    #[test]
    fn short_contours_unchanged() {
        let c = Contour::new(vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)]);
        assert_eq!(SmootherKind::Chaikin { iterations: 2 }.smooth(&c), c);
        assert_eq!(SmootherKind::MovingAverage { radius: 3 }.smooth(&c), c);
    }

    #[test]
    fn moving_average_keeps_count_and_centroid() {
        let c = square();
        let smoothed = SmootherKind::MovingAverage { radius: 1 }.smooth(&c);
        assert_eq!(smoothed.len(), c.len());
        let (a, b) = (centroid(&c), centroid(&smoothed));
        assert!(a.distance(b) < 1e-9);
    }

    #[test]
    fn moving_average_wraps_around_the_loop() {
        let smoothed = SmootherKind::MovingAverage { radius: 1 }.smooth(&square());
        // Vertex 0 averages the last, first and second vertices.
        let p = smoothed.first().copied().unwrap();
        assert!((p.x - 4.0 / 3.0).abs() < 1e-9);
        assert!((p.y - 4.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn moving_average_radius_clamped_to_contour() {
        let smoothed = SmootherKind::MovingAverage { radius: 50 }.smooth(&square());
        assert_eq!(smoothed.len(), 4);
        for p in smoothed.points() {
            assert!(p.x.is_finite() && p.y.is_finite());
        }
    }

    #[test]
    fn chaikin_doubles_per_iteration() {
        let c = square();
        for iterations in 1..=3 {
            let smoothed = SmootherKind::Chaikin { iterations }.smooth(&c);
            assert_eq!(smoothed.len(), c.len() << iterations);
        }
    }

    #[test]
    fn chaikin_cuts_at_quarter_points() {
        let smoothed = SmootherKind::Chaikin { iterations: 1 }.smooth(&square());
        assert_eq!(smoothed.points()[0], Point::new(0.0, 1.0));
        assert_eq!(smoothed.points()[1], Point::new(0.0, 3.0));
        // Last edge closes the loop back to vertex 0.
        assert_eq!(smoothed.points()[7], Point::new(1.0, 0.0));
    }

    #[test]
    fn chaikin_stays_inside_original_hull() {
        let c = square();
        let bb = c.bounding_box().unwrap();
        let smoothed = SmootherKind::Chaikin { iterations: 3 }.smooth(&c);
        let sb = smoothed.bounding_box().unwrap();
        assert!(sb.min_x >= bb.min_x && sb.max_x <= bb.max_x);
        assert!(sb.min_y >= bb.min_y && sb.max_y <= bb.max_y);
    }

    #[test]
    fn for_mode_selects_strategy() {
        assert_eq!(
            SmootherKind::for_mode(TraceMode::Silhouette, 4.0),
            SmootherKind::MovingAverage { radius: 2 }
        );
        assert_eq!(
            SmootherKind::for_mode(TraceMode::Outline, 10.0),
            SmootherKind::MovingAverage { radius: 5 }
        );
        assert_eq!(
            SmootherKind::for_mode(TraceMode::Multiband, 1.0),
            SmootherKind::Chaikin { iterations: 1 }
        );
        assert_eq!(
            SmootherKind::for_mode(TraceMode::Multiband, 10.0),
            SmootherKind::Chaikin { iterations: 3 }
        );
        assert!(SmootherKind::for_mode(TraceMode::Multiband, 0.0).is_noop());
        assert!(SmootherKind::for_mode(TraceMode::Engrave, 0.0).is_noop());
    }

    #[test]
    fn moving_average_window_tops_out_at_eleven_points() {
        for smoothing in [10.0, 25.0] {
            let kind = SmootherKind::for_mode(TraceMode::Lineart, smoothing);
            assert_eq!(
                kind,
                SmootherKind::MovingAverage {
                    radius: SmootherKind::MAX_RADIUS
                }
            );
        }
        assert_eq!(2 * SmootherKind::MAX_RADIUS + 1, 11);
    }

    #[test]
    fn smooth_all_applies_to_each() {
        let contours = vec![square(), square()];
        let out = SmootherKind::Chaikin { iterations: 1 }.smooth_all(&contours);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|c| c.len() == 8));
    }
}
