//! Adaptive background grid with viewport culling.
//!
//! DESIGN
//! ======
//! Spacing is a step function of scale (see [`GRID_STEPS`]): coarse when
//! zoomed out, fine when zoomed in, and nothing at all below
//! [`GRID_MIN_SCALE`]. Only lines crossing the visible canvas rectangle are
//! emitted, so the line count is bounded by screen size, not canvas size.

#[cfg(test)]
#[path = "grid_test.rs"]
mod grid_test;

use crate::camera::{Rect, Viewport, visible_canvas_rect};
use crate::consts::{GRID_MIN_SCALE, GRID_STEPS};

/// Grid lines to draw, in canvas coordinates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridLines {
    /// Canvas units between adjacent lines.
    pub spacing: f64,
    /// X coordinate of each vertical line.
    pub vertical: Vec<f64>,
    /// Y coordinate of each horizontal line.
    pub horizontal: Vec<f64>,
}

impl GridLines {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vertical.is_empty() && self.horizontal.is_empty()
    }
}

/// Grid spacing for a scale, or `None` when the grid is hidden.
#[must_use]
pub fn grid_spacing(scale: f64) -> Option<f64> {
    if !scale.is_finite() || scale < GRID_MIN_SCALE {
        return None;
    }
    GRID_STEPS
        .iter()
        .find(|(threshold, _)| scale >= *threshold)
        .map(|(_, spacing)| *spacing)
}

/// Lines of the adaptive grid visible through a `width` x `height` screen.
#[must_use]
pub fn visible_grid_lines(viewport: &Viewport, width: f64, height: f64, bounds: &Rect) -> GridLines {
    let Some(spacing) = grid_spacing(viewport.scale) else {
        return GridLines::default();
    };
    let visible = visible_canvas_rect(viewport, width, height, bounds);
    if visible.is_empty() {
        return GridLines { spacing, ..GridLines::default() };
    }

    GridLines {
        spacing,
        vertical: lines_between(visible.min_x, visible.max_x, spacing),
        horizontal: lines_between(visible.min_y, visible.max_y, spacing),
    }
}

/// Multiples of `spacing` inside `[min, max]`.
fn lines_between(min: f64, max: f64, spacing: f64) -> Vec<f64> {
    let first = (min / spacing).ceil();
    let last = (max / spacing).floor();
    if last < first {
        return Vec::new();
    }

    #[allow(clippy::cast_possible_truncation)]
    let (first, last) = (first as i64, last as i64);
    #[allow(clippy::cast_precision_loss)]
    (first..=last).map(|i| i as f64 * spacing).collect()
}
