//! Complexity guard: bound the size of the emitted document.
//!
//! Contours are ranked by bounding-box area. Anything below a minimum
//! area (a fraction of the image area chosen by the preset) is dropped,
//! and at most `max_paths` of the remainder are kept. When the survivors
//! still cost more SVG commands or path-data bytes than the budget
//! allows, the minimum area is doubled and the filter re-run, up to
//! [`MAX_RELAXATIONS`] times. A final greedy truncation keeps the
//! highest-ranked contours that fit; if not even one fits the trace
//! fails with [`TraceError::ComplexityExceeded`].
//!
//! Path-data bytes are measured, not estimated: each contour is mapped
//! through the document's [`Placement`] and its `d` attribute length is
//! counted exactly as the SVG writer formats it (`f32` coordinates,
//! `M`/`L` commands separated by spaces, closing ` z`).

use std::fmt::{self, Write as _};

use serde::{Deserialize, Serialize};

use crate::scale::Placement;
use crate::types::{Contour, Point, TraceError, TraceOptions, TracePreset};

/// Doubling passes attempted before truncating.
pub const MAX_RELAXATIONS: u32 = 3;

/// Smallest minimum area ever applied, in square pixels.
pub const MIN_AREA_FLOOR: f64 = 1.0;

/// Hard limits on the output document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplexityBudget {
    pub max_paths: usize,
    pub max_commands: usize,
    pub max_path_data_bytes: usize,
}

impl ComplexityBudget {
    pub const DEFAULT_MAX_PATHS: usize = 5_000;
    pub const DEFAULT_MAX_COMMANDS: usize = 250_000;
    pub const DEFAULT_MAX_PATH_DATA_BYTES: usize = 2_000_000;

    /// Budget for a request: `maxPaths` overrides the path cap, the other
    /// limits are fixed.
    #[must_use]
    pub fn from_options(options: &TraceOptions) -> Self {
        Self {
            max_paths: options
                .max_paths
                .map_or(Self::DEFAULT_MAX_PATHS, |n| n as usize),
            ..Self::default()
        }
    }

    /// One of `parts` equal shares, never below one path/command/byte.
    #[must_use]
    pub fn split(self, parts: usize) -> Self {
        let parts = parts.max(1);
        Self {
            max_paths: (self.max_paths / parts).max(1),
            max_commands: (self.max_commands / parts).max(1),
            max_path_data_bytes: (self.max_path_data_bytes / parts).max(1),
        }
    }
}

impl Default for ComplexityBudget {
    fn default() -> Self {
        Self {
            max_paths: Self::DEFAULT_MAX_PATHS,
            max_commands: Self::DEFAULT_MAX_COMMANDS,
            max_path_data_bytes: Self::DEFAULT_MAX_PATH_DATA_BYTES,
        }
    }
}

/// Measured (or estimated) cost of a set of contours.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cost {
    pub paths: usize,
    pub commands: usize,
    pub bytes: usize,
}

impl Cost {
    /// Cost of a pixel-space contour once placed: one `M`, `n - 1` `L`
    /// and one `z`, with bytes measured on the millimetre coordinates.
    #[must_use]
    pub fn of_contour(contour: &Contour, placement: &Placement) -> Self {
        let points = contour.points();
        Self {
            paths: 1,
            commands: points.len() + 1,
            bytes: measure_path_data(points.iter().map(|&p| placement.apply(p))),
        }
    }

    #[must_use]
    pub fn of(contours: &[Contour], placement: &Placement) -> Self {
        contours
            .iter()
            .map(|c| Self::of_contour(c, placement))
            .fold(Self::default(), Self::plus)
    }

    #[must_use]
    pub const fn plus(self, other: Self) -> Self {
        Self {
            paths: self.paths + other.paths,
            commands: self.commands + other.commands,
            bytes: self.bytes + other.bytes,
        }
    }

    /// Whether this cost stays within every limit of `budget`.
    #[must_use]
    pub const fn fits(self, budget: &ComplexityBudget) -> bool {
        self.paths <= budget.max_paths
            && self.commands <= budget.max_commands
            && self.bytes <= budget.max_path_data_bytes
    }

    const fn exceeded(self, budget: &ComplexityBudget) -> TraceError {
        TraceError::ComplexityExceeded {
            paths: self.paths,
            commands: self.commands,
            bytes: self.bytes,
            max_commands: budget.max_commands,
            max_bytes: budget.max_path_data_bytes,
        }
    }
}

/// What the guard kept and how it got there.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardOutcome {
    /// Surviving contours, largest bounding box first.
    pub contours: Vec<Contour>,
    /// Contours dropped for having too few nodes.
    pub dropped_short: usize,
    /// Minimum bounding-box area of the final filter pass.
    pub min_area: f64,
    /// Number of doubling passes applied.
    pub relaxations: u32,
    /// Contours removed by the final truncation.
    pub truncated: usize,
    pub cost: Cost,
    pub warnings: Vec<String>,
}

/// Length of the SVG path data written for an already placed contour.
///
/// Matches the output of the exporter byte for byte; contours with fewer
/// than two points serialize to nothing.
#[must_use]
pub fn path_data_len(contour: &Contour) -> usize {
    measure_path_data(contour.points().iter().copied())
}

/// `M{x},{y}` then ` L{x},{y}` per further point, then ` z`.
fn measure_path_data(points: impl ExactSizeIterator<Item = Point>) -> usize {
    let n = points.len();
    if n < 2 {
        return 0;
    }
    let coordinates: usize = points
        .map(|p| number_len(p.x) + number_len(p.y) + 2)
        .sum();
    coordinates + n + 1
}

/// Counts bytes instead of storing them.
struct ByteCount(usize);

impl fmt::Write for ByteCount {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0 += s.len();
        Ok(())
    }
}

/// Display width of `value` at the `f32` precision path data is written in.
fn number_len(value: f64) -> usize {
    let mut count = ByteCount(0);
    #[allow(clippy::cast_possible_truncation)]
    let written = write!(count, "{}", value as f32);
    written.map_or(0, |()| count.0)
}

/// Minimum bounding-box area before any relaxation.
#[must_use]
pub fn initial_min_area(image_area: f64, preset: TracePreset) -> f64 {
    (image_area * preset.min_area_ratio()).max(MIN_AREA_FLOOR)
}

/// Filter, relax and truncate `contours` until they fit `budget`.
///
/// `contours` are in pixel space; `placement` is the mapping the
/// document will apply to them, so byte costs reflect the written output.
///
/// # Errors
///
/// Returns [`TraceError::EmptyResult`] when no contour survives the
/// node-count and initial area filters, and
/// [`TraceError::ComplexityExceeded`] when not even the single
/// highest-ranked contour fits the budget.
pub fn enforce(
    contours: Vec<Contour>,
    image_area: f64,
    preset: TracePreset,
    min_nodes: usize,
    placement: &Placement,
    budget: &ComplexityBudget,
) -> Result<GuardOutcome, TraceError> {
    let total = contours.len();
    let candidates: Vec<Contour> = contours
        .into_iter()
        .filter(|c| c.len() >= min_nodes)
        .collect();
    let dropped_short = total - candidates.len();

    let areas: Vec<f64> = candidates
        .iter()
        .map(|c| c.bounding_box().map_or(0.0, |b| b.area()))
        .collect();
    let mut ranked: Vec<usize> = (0..candidates.len()).collect();
    ranked.sort_by(|&a, &b| areas[b].total_cmp(&areas[a]).then(a.cmp(&b)));

    let select = |min_area: f64| -> (Vec<usize>, usize) {
        let eligible: Vec<usize> = ranked
            .iter()
            .copied()
            .filter(|&i| areas[i] >= min_area)
            .collect();
        let over_cap = eligible.len().saturating_sub(budget.max_paths);
        (eligible.into_iter().take(budget.max_paths).collect(), over_cap)
    };
    let costs: Vec<Cost> = candidates
        .iter()
        .map(|c| Cost::of_contour(c, placement))
        .collect();
    let cost_of = |indices: &[usize]| {
        indices
            .iter()
            .map(|&i| costs[i])
            .fold(Cost::default(), Cost::plus)
    };

    let mut warnings = Vec::new();
    let mut min_area = initial_min_area(image_area, preset);
    let (mut selected, over_cap) = select(min_area);
    if selected.is_empty() {
        return Err(TraceError::EmptyResult);
    }
    if over_cap > 0 {
        warnings.push(format!(
            "kept the {} largest paths; {over_cap} more exceeded the path limit",
            budget.max_paths
        ));
    }

    let mut relaxations = 0;
    while !cost_of(&selected).fits(budget) && relaxations < MAX_RELAXATIONS {
        let next_area = min_area * 2.0;
        let (next, _) = select(next_area);
        if next.is_empty() {
            break;
        }
        min_area = next_area;
        selected = next;
        relaxations += 1;
    }
    if relaxations > 0 {
        warnings.push(format!(
            "raised the minimum contour area to {min_area:.1} px\u{b2} after {relaxations} \
             relaxation pass{}",
            if relaxations == 1 { "" } else { "es" }
        ));
    }

    let mut truncated = 0;
    let before = cost_of(&selected);
    if !before.fits(budget) {
        let mut running = Cost::default();
        let kept = selected
            .iter()
            .copied()
            .take_while(|&i| {
                let next = running.plus(costs[i]);
                let fits = next.fits(budget);
                if fits {
                    running = next;
                }
                fits
            })
            .count();
        if kept == 0 {
            return Err(before.exceeded(budget));
        }
        truncated = selected.len() - kept;
        selected.truncate(kept);
        warnings.push(format!(
            "output truncated to {kept} of {} paths to stay within the complexity budget",
            kept + truncated
        ));
    }

    let cost = cost_of(&selected);
    let mut slots: Vec<Option<Contour>> = candidates.into_iter().map(Some).collect();
    let contours: Vec<Contour> = selected
        .iter()
        .filter_map(|&i| slots[i].take())
        .collect();

    Ok(GuardOutcome {
        contours,
        dropped_short,
        min_area,
        relaxations,
        truncated,
        cost,
        warnings,
    })
}
