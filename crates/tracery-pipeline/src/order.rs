//! Travel ordering: reorder and rotate closed contours to cut head travel.
//!
//! Uses a nearest-neighbor greedy heuristic on loop start vertices. Once
//! the next loop is chosen it is rotated so that it begins at the vertex
//! nearest to where the previous loop ended. A closed loop ends where it
//! starts, so rotation never changes the shape or winding, only the
//! point at which the cutter enters it.

use crate::types::{Contour, Point};

/// Reorder and rotate `contours` to shorten travel between them.
///
/// The first contour keeps its position and starting vertex. Empty
/// contours are filtered out.
#[must_use = "returns the reordered contours"]
pub fn order_for_travel(contours: &[Contour]) -> Vec<Contour> {
    let candidates: Vec<&Contour> = contours.iter().filter(|c| !c.is_empty()).collect();

    let Some(&head) = candidates.first() else {
        return Vec::new();
    };

    let n = candidates.len();
    let mut visited = vec![false; n];
    let mut result = Vec::with_capacity(n);

    visited[0] = true;
    result.push(head.clone());

    for _ in 1..n {
        let current = result
            .last()
            .and_then(Contour::first)
            .copied()
            .unwrap_or(Point::new(0.0, 0.0));

        let best = candidates
            .iter()
            .enumerate()
            .filter(|&(j, _)| !visited[j])
            .filter_map(|(j, c)| c.first().map(|s| (j, current.distance_squared(*s))))
            .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

        // At least one candidate is unvisited on every iteration.
        let Some((best_idx, _)) = best else {
            continue;
        };

        visited[best_idx] = true;
        result.push(rotate_to_nearest(candidates[best_idx], current));
    }

    result
}

/// Rotate a closed loop so it starts at the vertex nearest to `from`.
#[must_use]
pub fn rotate_to_nearest(contour: &Contour, from: Point) -> Contour {
    let points = contour.points();
    let start = points
        .iter()
        .enumerate()
        .min_by(|a, b| {
            from.distance_squared(*a.1)
                .total_cmp(&from.distance_squared(*b.1))
                .then(a.0.cmp(&b.0))
        })
        .map_or(0, |(i, _)| i);

    let mut rotated = points.to_vec();
    rotated.rotate_left(start);
    Contour::new(rotated)
}
