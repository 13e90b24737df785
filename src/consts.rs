//! Shared numeric constants for the sync core.

// ── Zoom ────────────────────────────────────────────────────────

/// Smallest allowed viewport scale.
pub const ZOOM_MIN: f64 = 0.1;

/// Largest allowed viewport scale.
pub const ZOOM_MAX: f64 = 5.0;

// ── Rates ───────────────────────────────────────────────────────

/// Cursor publish window in milliseconds (~10 Hz).
pub const CURSOR_INTERVAL_MS: u64 = 100;

/// Interactive drag write window in milliseconds.
pub const DRAG_INTERVAL_MS: u64 = 50;

/// Quiet period before a changed viewport is saved locally.
pub const VIEWPORT_DEBOUNCE_MS: u64 = 500;

// ── Canvas ──────────────────────────────────────────────────────

/// Canvas width in canvas units. The canvas spans `0..CANVAS_WIDTH`.
pub const CANVAS_WIDTH: f64 = 5000.0;

/// Canvas height in canvas units. The canvas spans `0..CANVAS_HEIGHT`.
pub const CANVAS_HEIGHT: f64 = 5000.0;

// ── Grid ────────────────────────────────────────────────────────

/// Below this scale no grid is drawn at all.
pub const GRID_MIN_SCALE: f64 = 0.3;

/// `(scale threshold, spacing)` pairs, checked top down. The first entry whose
/// threshold the scale reaches wins.
pub const GRID_STEPS: [(f64, f64); 4] = [(2.0, 10.0), (1.0, 25.0), (0.6, 50.0), (GRID_MIN_SCALE, 100.0)];

// ── Identity ────────────────────────────────────────────────────

/// Presence colors handed out to identities.
pub const PALETTE: [&str; 8] = [
    "#E53935", "#8E24AA", "#3949AB", "#039BE5", "#00897B", "#7CB342", "#FDD835", "#FB8C00",
];
