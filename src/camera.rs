//! Coordinate transform between canvas space and screen space.
//!
//! Canvas space is the shared, viewport-independent coordinate system every
//! client publishes in. Screen space is client-local pixels. The two are
//! related by the viewport's pan offset and scale:
//!
//! ```text
//! screen = canvas * scale + offset
//! canvas = (screen - offset) / scale
//! ```

#[cfg(test)]
#[path = "camera_test.rs"]
mod camera_test;

use serde::{Deserialize, Serialize};

use crate::config::ZoomLimits;

/// A point in either screen or canvas space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Axis-aligned rectangle in canvas space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Rect {
    #[must_use]
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    #[must_use]
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }
}

/// Pan offset and zoom factor of one client.
///
/// `x` / `y` are the screen-space position of the canvas origin, in pixels.
/// `scale` is screen pixels per canvas unit (1.0 = no zoom).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub scale: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self { x: 0.0, y: 0.0, scale: 1.0 }
    }
}

impl Viewport {
    #[must_use]
    pub fn offset(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// All fields finite and a strictly positive scale.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.scale.is_finite() && self.scale > 0.0
    }
}

/// Convert a canvas-space point to screen pixels.
#[must_use]
pub fn to_screen(canvas: Point, viewport: &Viewport) -> Point {
    Point {
        x: canvas.x * viewport.scale + viewport.x,
        y: canvas.y * viewport.scale + viewport.y,
    }
}

/// Convert a screen-space point to canvas coordinates.
#[must_use]
pub fn to_canvas(screen: Point, viewport: &Viewport) -> Point {
    Point {
        x: (screen.x - viewport.x) / viewport.scale,
        y: (screen.y - viewport.y) / viewport.scale,
    }
}

/// Convert a screen-space distance (pixels) to canvas units.
#[must_use]
pub fn screen_dist_to_canvas(screen_dist: f64, viewport: &Viewport) -> f64 {
    screen_dist / viewport.scale
}

/// Zoom toward a pointer: returns the viewport at `new_scale` (clamped to
/// `limits`) that keeps the canvas point under `pointer` fixed on screen.
#[must_use]
pub fn zoom_at_pointer(viewport: &Viewport, pointer: Point, new_scale: f64, limits: &ZoomLimits) -> Viewport {
    let scale = limits.clamp(new_scale);
    let anchor = to_canvas(pointer, viewport);
    Viewport {
        x: pointer.x - anchor.x * scale,
        y: pointer.y - anchor.y * scale,
        scale,
    }
}

/// The part of the canvas visible through a `width` x `height` pixel screen,
/// clamped to `bounds`. Empty when the view lies entirely off the canvas.
#[must_use]
pub fn visible_canvas_rect(viewport: &Viewport, width: f64, height: f64, bounds: &Rect) -> Rect {
    let corners = [
        to_canvas(Point::new(0.0, 0.0), viewport),
        to_canvas(Point::new(width, 0.0), viewport),
        to_canvas(Point::new(0.0, height), viewport),
        to_canvas(Point::new(width, height), viewport),
    ];

    let mut rect = Rect { min_x: f64::INFINITY, min_y: f64::INFINITY, max_x: f64::NEG_INFINITY, max_y: f64::NEG_INFINITY };
    for c in corners {
        rect.min_x = rect.min_x.min(c.x);
        rect.min_y = rect.min_y.min(c.y);
        rect.max_x = rect.max_x.max(c.x);
        rect.max_y = rect.max_y.max(c.y);
    }

    Rect {
        min_x: rect.min_x.max(bounds.min_x),
        min_y: rect.min_y.max(bounds.min_y),
        max_x: rect.max_x.min(bounds.max_x),
        max_y: rect.max_y.min(bounds.max_y),
    }
}
