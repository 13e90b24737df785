//! Runtime configuration parsed from environment variables.
//!
//! DESIGN
//! ======
//! Every knob has a compiled-in default from [`crate::consts`]. Environment
//! overrides are optional and never fatal: an unparseable value falls back to
//! the default, and so does a zoom range that cannot be satisfied.

use std::time::Duration;

use crate::camera::Rect;

use crate::consts::{
    CANVAS_HEIGHT, CANVAS_WIDTH, CURSOR_INTERVAL_MS, DRAG_INTERVAL_MS, VIEWPORT_DEBOUNCE_MS, ZOOM_MAX, ZOOM_MIN,
};

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomLimits {
    pub min: f64,
    pub max: f64,
}

impl ZoomLimits {
    /// Clamp a scale into the allowed range. Non-finite input maps to 1.0 first.
    #[must_use]
    pub fn clamp(&self, scale: f64) -> f64 {
        let scale = if scale.is_finite() { scale } else { 1.0 };
        scale.clamp(self.min, self.max)
    }

    fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min > 0.0 && self.min <= self.max
    }
}

impl Default for ZoomLimits {
    fn default() -> Self {
        Self { min: ZOOM_MIN, max: ZOOM_MAX }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Throttle window for cursor publishes.
    pub cursor_interval: Duration,
    /// Throttle window for interactive drag writes.
    pub drag_interval: Duration,
    /// Debounce delay for local viewport persistence.
    pub viewport_debounce: Duration,
    pub zoom: ZoomLimits,
    pub canvas_width: f64,
    pub canvas_height: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            cursor_interval: Duration::from_millis(CURSOR_INTERVAL_MS),
            drag_interval: Duration::from_millis(DRAG_INTERVAL_MS),
            viewport_debounce: Duration::from_millis(VIEWPORT_DEBOUNCE_MS),
            zoom: ZoomLimits::default(),
            canvas_width: CANVAS_WIDTH,
            canvas_height: CANVAS_HEIGHT,
        }
    }
}

impl SyncConfig {
    /// The canvas extent, `0..canvas_width` by `0..canvas_height`.
    #[must_use]
    pub fn canvas_bounds(&self) -> Rect {
        Rect { min_x: 0.0, min_y: 0.0, max_x: self.canvas_width, max_y: self.canvas_height }
    }

    /// Build config from environment variables.
    ///
    /// Optional:
    /// - `CANVAS_SYNC_CURSOR_INTERVAL_MS`: default 100
    /// - `CANVAS_SYNC_DRAG_INTERVAL_MS`: default 50
    /// - `CANVAS_SYNC_VIEWPORT_DEBOUNCE_MS`: default 500
    /// - `CANVAS_SYNC_ZOOM_MIN` / `CANVAS_SYNC_ZOOM_MAX`: default 0.1 / 5.0
    /// - `CANVAS_SYNC_CANVAS_WIDTH` / `CANVAS_SYNC_CANVAS_HEIGHT`: default 5000
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| match std::env::var(key) {
            Ok(value) => Some(value),
            Err(_) => None,
        })
    }

    /// Build config from an arbitrary key lookup. `from_env` delegates here.
    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let zoom = ZoomLimits {
            min: parse_or(&lookup, "CANVAS_SYNC_ZOOM_MIN", defaults.zoom.min),
            max: parse_or(&lookup, "CANVAS_SYNC_ZOOM_MAX", defaults.zoom.max),
        };
        let zoom = if zoom.is_valid() {
            zoom
        } else {
            tracing::warn!(min = zoom.min, max = zoom.max, "invalid zoom range; using defaults");
            defaults.zoom
        };

        let canvas_width = parse_or(&lookup, "CANVAS_SYNC_CANVAS_WIDTH", defaults.canvas_width);
        let canvas_height = parse_or(&lookup, "CANVAS_SYNC_CANVAS_HEIGHT", defaults.canvas_height);

        Self {
            cursor_interval: Duration::from_millis(parse_or(
                &lookup,
                "CANVAS_SYNC_CURSOR_INTERVAL_MS",
                CURSOR_INTERVAL_MS,
            )),
            drag_interval: Duration::from_millis(parse_or(&lookup, "CANVAS_SYNC_DRAG_INTERVAL_MS", DRAG_INTERVAL_MS)),
            viewport_debounce: Duration::from_millis(parse_or(
                &lookup,
                "CANVAS_SYNC_VIEWPORT_DEBOUNCE_MS",
                VIEWPORT_DEBOUNCE_MS,
            )),
            zoom,
            canvas_width: positive_or(canvas_width, defaults.canvas_width),
            canvas_height: positive_or(canvas_height, defaults.canvas_height),
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    match lookup(key).map(|v| v.trim().parse::<T>()) {
        Some(Ok(value)) => value,
        _ => default,
    }
}

fn positive_or(value: f64, default: f64) -> f64 {
    if value.is_finite() && value > 0.0 { value } else { default }
}
