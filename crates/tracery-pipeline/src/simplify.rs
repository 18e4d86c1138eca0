//! Contour simplification using the Ramer-Douglas-Peucker algorithm.
//!
//! Reduces point count in closed contours by removing points within a
//! tolerance of the chord between their retained neighbours. Contours
//! from large images can run to hundreds of thousands of points, so the
//! subdivision uses an explicit work stack instead of recursion.
//!
//! A closed loop has no natural endpoints. It is split at vertex 0 and
//! the vertex farthest from it, and each half is simplified as an open
//! chain; both split vertices are always kept.

use crate::types::{Contour, Point};

/// Pixels of RDP tolerance per unit of the `simplify` option.
pub const EPSILON_PER_STEP: f64 = 0.5;

/// RDP tolerance in pixels for a `simplify` amount (0-10).
#[must_use]
pub fn epsilon_for(simplify: f64) -> f64 {
    simplify.max(0.0) * EPSILON_PER_STEP
}

/// Simplify a closed contour.
///
/// A tolerance of 0.0 (or below) returns the contour unchanged.
/// Contours with fewer than 4 points have nothing to remove. The
/// result never has more points than the input.
#[must_use = "returns the simplified contour"]
pub fn simplify(contour: &Contour, tolerance: f64) -> Contour {
    let points = contour.points();
    let n = points.len();
    if tolerance <= 0.0 || n < 4 {
        return contour.clone();
    }

    let far = (1..n)
        .max_by(|&a, &b| {
            points[0]
                .distance_squared(points[a])
                .total_cmp(&points[0].distance_squared(points[b]))
        })
        .unwrap_or(n / 2);

    // Index `n` stands for vertex 0 closing the loop.
    let at = |i: usize| points[i % n];
    let mut kept = vec![false; n];
    kept[0] = true;
    kept[far] = true;

    let mut stack = vec![(0, far), (far, n)];
    while let Some((start, end)) = stack.pop() {
        if end <= start + 1 {
            continue;
        }

        let mut max_dist = 0.0;
        let mut max_idx = start;
        for i in (start + 1)..end {
            let d = perpendicular_distance(at(i), at(start), at(end));
            if d > max_dist {
                max_dist = d;
                max_idx = i;
            }
        }

        if max_dist > tolerance {
            kept[max_idx % n] = true;
            stack.push((start, max_idx));
            stack.push((max_idx, end));
        }
    }

    let simplified: Vec<Point> = points
        .iter()
        .zip(&kept)
        .filter(|&(_, k)| *k)
        .map(|(&p, _)| p)
        .collect();

    Contour::new(simplified)
}

/// Simplify every contour independently.
#[must_use = "returns the simplified contours"]
pub fn simplify_contours(contours: &[Contour], tolerance: f64) -> Vec<Contour> {
    contours.iter().map(|c| simplify(c, tolerance)).collect()
}

/// Perpendicular distance from point `p` to the line defined by `a` and `b`.
///
/// Uses the formula: |cross(b-a, p-a)| / |b-a|.
/// When `a` and `b` coincide, returns the distance from `p` to `a`.
fn perpendicular_distance(p: Point, a: Point, b: Point) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let length_sq = dx.mul_add(dx, dy * dy);

    if length_sq == 0.0 {
        return p.distance(a);
    }

    let cross = dx.mul_add(a.y - p.y, -(dy * (a.x - p.x)));
    cross.abs() / length_sq.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Axis-aligned square outline with `per_side` points per side.
    fn dense_square(size: f64, per_side: usize) -> Contour {
        let mut pts = Vec::new();
        #[allow(clippy::cast_precision_loss)]
        let step = size / per_side as f64;
        for i in 0..per_side {
            #[allow(clippy::cast_precision_loss)]
            let t = i as f64 * step;
            pts.push(Point::new(t, 0.0));
        }
        for i in 0..per_side {
            #[allow(clippy::cast_precision_loss)]
            let t = i as f64 * step;
            pts.push(Point::new(size, t));
        }
        for i in 0..per_side {
            #[allow(clippy::cast_precision_loss)]
            let t = i as f64 * step;
            pts.push(Point::new(size - t, size));
        }
        for i in 0..per_side {
            #[allow(clippy::cast_precision_loss)]
            let t = i as f64 * step;
            pts.push(Point::new(0.0, size - t));
        }
        Contour::new(pts)
    }

    #[test]
    fn empty_contour_unchanged() {
        let c = Contour::new(vec![]);
        assert!(simplify(&c, 1.0).is_empty());
    }

    #[test]
    fn triangle_unchanged() {
        let c = Contour::new(vec![
            Point::new(0.0, 0.0),
            Point::new(5.0, 0.0),
            Point::new(0.0, 5.0),
        ]);
        assert_eq!(simplify(&c, 10.0), c);
    }

    #[test]
    fn zero_tolerance_preserves_all_points() {
        let c = dense_square(10.0, 5);
        assert_eq!(simplify(&c, 0.0), c);
    }

    #[test]
    fn square_collapses_to_corners() {
        let c = dense_square(10.0, 5);
        let result = simplify(&c, 0.1);
        assert_eq!(result.len(), 4);
        let bb = result.bounding_box();
        assert_eq!(bb, c.bounding_box());
    }

    #[test]
    fn never_grows() {
        let c = Contour::new(
            (0..200)
                .map(|i| {
                    let t = f64::from(i) * 0.1;
                    Point::new(t.cos() * 20.0 + (t * 7.0).sin(), t.sin() * 20.0)
                })
                .collect(),
        );
        for tol in [0.0, 0.1, 0.5, 1.0, 3.0, 50.0] {
            let result = simplify(&c, tol);
            assert!(result.len() <= c.len(), "tol={tol}");
            assert!(result.len() >= 2, "split vertices are always kept");
        }
    }

    #[test]
    fn kept_points_are_a_subsequence() {
        let c = dense_square(8.0, 4);
        let result = simplify(&c, 0.5);
        let mut source = c.points().iter();
        for p in result.points() {
            assert!(source.any(|q| q == p), "{p:?} out of order");
        }
    }

    #[test]
    fn large_contour_does_not_recurse() {
        // Deep zigzag that would recurse once per point in a naive RDP.
        let pts: Vec<Point> = (0..200_000)
            .map(|i| Point::new(f64::from(i), f64::from(i % 2) * 3.0))
            .collect();
        let c = Contour::new(pts);
        let result = simplify(&c, 1.0);
        assert!(result.len() <= c.len());
    }

    #[test]
    fn simplify_contours_applies_to_each() {
        let contours = vec![dense_square(10.0, 5), dense_square(4.0, 2)];
        let results = simplify_contours(&contours, 0.1);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].len(), 4);
        assert_eq!(results[1].len(), 4);
    }

    #[test]
    fn epsilon_scales_with_simplify() {
        assert!((epsilon_for(0.0) - 0.0).abs() < f64::EPSILON);
        assert!((epsilon_for(4.0) - 2.0).abs() < f64::EPSILON);
        assert!((epsilon_for(-1.0) - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn perpendicular_distance_on_axis() {
        let d = perpendicular_distance(
            Point::new(1.0, 3.0),
            Point::new(0.0, 0.0),
            Point::new(2.0, 0.0),
        );
        assert!((d - 3.0).abs() < 1e-10);
    }

    #[test]
    fn perpendicular_distance_coincident_endpoints() {
        let d = perpendicular_distance(
            Point::new(3.0, 4.0),
            Point::new(0.0, 0.0),
            Point::new(0.0, 0.0),
        );
        assert!((d - 5.0).abs() < 1e-10);
    }
}
