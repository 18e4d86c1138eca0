//! Contour extraction: marching squares over a binary mask.
//!
//! The mask is sampled at pixel centres. Every 2x2 group of samples forms
//! a cell whose corners combine into a 4-bit code (TL = 1, TR = 2,
//! BL = 4, BR = 8). Codes 0 and 15 are uniform and carry no boundary;
//! every other code maps through [`SEGMENTS`] to one or two oriented
//! boundary segments joining cell-edge midpoints.
//!
//! The cell grid is padded by one cell on every side so foreground
//! touching the image border still yields closed loops. With pixel
//! `(x, y)` covering `[x, x+1) x [y, y+1)`, a filled block of pixels
//! `[x0, x1) x [y0, y1)` produces a contour whose bounding box is exactly
//! that rectangle.
//!
//! # Orientation
//!
//! Segments keep foreground on the left of travel. In the y-down image
//! frame outer boundaries therefore have negative shoelace area and
//! holes positive.
//!
//! # Saddles
//!
//! Codes 6 (TR + BL) and 9 (TL + BR) are ambiguous. The tie-break is
//! fixed: a saddle always joins its two diagonal foreground pixels, so
//! foreground is 8-connected and background 4-connected. Each saddle
//! cell carries two segments and is visited once per segment.
//!
//! # Visited state
//!
//! A dense bit array with two slots per cell, indexed
//! `(y * grid_width + x) * 2 + slot`. A walk starts at any unvisited
//! segment and ends when it returns to that segment, so no boundary is
//! traced twice.

use crate::binarize::BinaryMask;
use crate::bitgrid::BitGrid;
use crate::progress::{ProgressSink, Stage, checkpoint};
use crate::types::{Contour, Point, TraceError};

/// Absolute ceiling on points in one contour.
pub const MAX_CONTOUR_POINTS: usize = 1 << 22;

/// Progress is reported once per this many cell rows.
pub const PROGRESS_ROW_INTERVAL: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edge {
    Top,
    Right,
    Bottom,
    Left,
}

impl Edge {
    /// Cell offset across this edge and the edge the walk enters the
    /// neighbouring cell through.
    const fn step(self) -> (i64, i64, Self) {
        match self {
            Self::Top => (0, -1, Self::Bottom),
            Self::Right => (1, 0, Self::Left),
            Self::Bottom => (0, 1, Self::Top),
            Self::Left => (-1, 0, Self::Right),
        }
    }

    /// Midpoint of this edge of cell `(cx, cy)` in pixel space.
    ///
    /// Cell `(cx, cy)` spans the sample centres of pixels
    /// `(cx-1, cy-1)` to `(cx, cy)`, so its own centre sits at `(cx, cy)`.
    #[allow(clippy::cast_precision_loss)]
    fn midpoint(self, cx: usize, cy: usize) -> Point {
        let (x, y) = (cx as f64, cy as f64);
        match self {
            Self::Top => Point::new(x, y - 0.5),
            Self::Right => Point::new(x + 0.5, y),
            Self::Bottom => Point::new(x, y + 0.5),
            Self::Left => Point::new(x - 0.5, y),
        }
    }
}

/// An oriented boundary segment through one cell: `(from, to)`.
type Segment = (Edge, Edge);

const fn seg(from: Edge, to: Edge) -> Option<Segment> {
    Some((from, to))
}

/// Boundary segments per cell code, foreground on the left of travel.
///
/// Slot 1 is only used by the saddles, which are resolved by joining
/// the diagonal foreground pixels (segments wrap the background
/// corners).
const SEGMENTS: [[Option<Segment>; 2]; 16] = [
    // 0: empty
    [None, None],
    // 1: TL
    [seg(Edge::Left, Edge::Top), None],
    // 2: TR
    [seg(Edge::Top, Edge::Right), None],
    // 3: TL TR
    [seg(Edge::Left, Edge::Right), None],
    // 4: BL
    [seg(Edge::Bottom, Edge::Left), None],
    // 5: TL BL
    [seg(Edge::Bottom, Edge::Top), None],
    // 6: TR BL (saddle)
    [seg(Edge::Top, Edge::Left), seg(Edge::Bottom, Edge::Right)],
    // 7: TL TR BL
    [seg(Edge::Bottom, Edge::Right), None],
    // 8: BR
    [seg(Edge::Right, Edge::Bottom), None],
    // 9: TL BR (saddle)
    [seg(Edge::Right, Edge::Top), seg(Edge::Left, Edge::Bottom)],
    // 10: TR BR
    [seg(Edge::Top, Edge::Bottom), None],
    // 11: TL TR BR
    [seg(Edge::Left, Edge::Bottom), None],
    // 12: BL BR
    [seg(Edge::Right, Edge::Left), None],
    // 13: TL BL BR
    [seg(Edge::Right, Edge::Top), None],
    // 14: TR BL BR
    [seg(Edge::Top, Edge::Left), None],
    // 15: full
    [None, None],
];

/// Output of [`extract_contours`].
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    /// Closed contours in raster discovery order.
    pub contours: Vec<Contour>,
    /// Number of cells classified.
    pub cells_scanned: u64,
    /// Contours abandoned for exceeding the point cap or hitting an
    /// inconsistent cell.
    pub aborted: usize,
}

/// Padded cell grid geometry.
#[derive(Debug, Clone, Copy)]
struct CellGrid {
    width: usize,
    height: usize,
}

impl CellGrid {
    const fn cells(self) -> usize {
        self.width * self.height
    }

    const fn slot_index(self, cx: usize, cy: usize, slot: usize) -> usize {
        (cy * self.width + cx) * 2 + slot
    }
}

/// 4-bit marching-squares code of cell `(cx, cy)`.
#[allow(clippy::cast_possible_wrap)]
fn cell_code(mask: &BinaryMask, cx: usize, cy: usize) -> usize {
    let (x, y) = (cx as i64, cy as i64);
    usize::from(mask.is_foreground(x - 1, y - 1))
        | usize::from(mask.is_foreground(x, y - 1)) << 1
        | usize::from(mask.is_foreground(x - 1, y)) << 2
        | usize::from(mask.is_foreground(x, y)) << 3
}

/// Trace every boundary in `mask`.
///
/// Cancellation is polled once per cell row and progress is reported
/// every [`PROGRESS_ROW_INTERVAL`] rows under [`Stage::Trace`].
///
/// # Errors
///
/// Returns [`TraceError::Cancelled`] if `progress` reports cancellation.
pub fn extract_contours<P: ProgressSink + ?Sized>(
    mask: &BinaryMask,
    progress: &mut P,
) -> Result<Extraction, TraceError> {
    let grid = CellGrid {
        width: mask.width() as usize + 1,
        height: mask.height() as usize + 1,
    };
    let cap = grid.cells().saturating_mul(2).min(MAX_CONTOUR_POINTS);
    let mut visited = BitGrid::new(grid.cells() * 2);
    let mut contours = Vec::new();
    let mut aborted = 0;

    for cy in 0..grid.height {
        checkpoint(progress)?;
        if cy % PROGRESS_ROW_INTERVAL == 0 {
            #[allow(clippy::cast_precision_loss)]
            let fraction = cy as f64 / grid.height as f64;
            progress.report(Stage::Trace, fraction, None);
        }

        for cx in 0..grid.width {
            let code = cell_code(mask, cx, cy);
            for slot in 0..2 {
                if SEGMENTS[code][slot].is_none() || visited.get(grid.slot_index(cx, cy, slot)) {
                    continue;
                }
                match walk(mask, &mut visited, grid, (cx, cy, slot), cap) {
                    Some(points) => contours.push(Contour::new(points)),
                    None => aborted += 1,
                }
            }
        }
    }

    progress.report(
        Stage::Trace,
        1.0,
        Some(&format!("{} contours", contours.len())),
    );

    Ok(Extraction {
        contours,
        cells_scanned: grid.cells() as u64,
        aborted,
    })
}

/// Follow one boundary from `start` until it closes.
///
/// Emits the entry midpoint of every segment. Returns `None` when the
/// walk exceeds `cap` points or reaches a cell with no matching
/// segment; the segments visited so far stay marked.
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn walk(
    mask: &BinaryMask,
    visited: &mut BitGrid,
    grid: CellGrid,
    start: (usize, usize, usize),
    cap: usize,
) -> Option<Vec<Point>> {
    let mut points = Vec::new();
    let (mut cx, mut cy, mut slot) = start;

    loop {
        let index = grid.slot_index(cx, cy, slot);
        if visited.get(index) {
            return None;
        }
        visited.set(index);

        let (from, to) = SEGMENTS[cell_code(mask, cx, cy)][slot]?;
        points.push(from.midpoint(cx, cy));
        if points.len() > cap {
            return None;
        }

        let (dx, dy, entry) = to.step();
        let nx = cx as i64 + dx;
        let ny = cy as i64 + dy;
        if nx < 0 || ny < 0 || nx as usize >= grid.width || ny as usize >= grid.height {
            return None;
        }
        (cx, cy) = (nx as usize, ny as usize);

        let next = &SEGMENTS[cell_code(mask, cx, cy)];
        slot = next
            .iter()
            .position(|s| matches!(s, Some((f, _)) if *f == entry))?;

        if (cx, cy, slot) == start {
            return Some(points);
        }
    }
}
