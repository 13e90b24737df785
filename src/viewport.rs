//! Viewport controller — local pan/zoom with debounced persistence.
//!
//! DESIGN
//! ======
//! The viewport is private to one client and never goes through the Sync
//! Channel. It is restored once at startup from a [`ViewportStorage`]; saved
//! state that is absent, unreadable, or fails type validation falls back to
//! `{x: 0, y: 0, scale: 1}`. Every change is saved through a [`Debounce`], so
//! a burst of wheel or drag events costs one write once input goes quiet.
//!
//! Scale is always clamped to the configured zoom limits, on restore as well
//! as on every change.
//!
//! Saves run on tokio's blocking pool, one at a time and in order, so a slow
//! disk never stalls the runtime thread that drives the debounce.

#[cfg(test)]
#[path = "viewport_test.rs"]
mod viewport_test;

use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, warn};

use crate::camera::{self, Point, Rect, Viewport};
use crate::config::{SyncConfig, ZoomLimits};
use crate::error::ErrorCode;
use crate::grid::{GridLines, visible_grid_lines};
use crate::object::ValidationError;
use crate::rate_limit::Debounce;

// =============================================================================
// STORAGE
// =============================================================================

/// Local key-value slot holding the serialized viewport.
///
/// `load` runs once, synchronously, in [`ViewportController::load`]. `save`
/// is always called from a blocking-pool thread and may block.
pub trait ViewportStorage: Send + Sync {
    /// Saved state, or `None` if nothing was ever saved.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the slot exists but cannot be read.
    fn load(&self) -> io::Result<Option<String>>;

    /// # Errors
    ///
    /// Returns the I/O error if the slot cannot be written.
    fn save(&self, raw: &str) -> io::Result<()>;
}

/// In-memory slot. Clones share the slot.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    slot: Arc<Mutex<Option<String>>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot pre-filled with `raw`.
    #[must_use]
    pub fn with_contents(raw: impl Into<String>) -> Self {
        Self { slot: Arc::new(Mutex::new(Some(raw.into()))) }
    }

    #[must_use]
    pub fn contents(&self) -> Option<String> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl ViewportStorage for MemoryStorage {
    fn load(&self) -> io::Result<Option<String>> {
        Ok(self.contents())
    }

    fn save(&self, raw: &str) -> io::Result<()> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(raw.to_owned());
        Ok(())
    }
}

/// JSON file on disk. A missing file means nothing was saved.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ViewportStorage for FileStorage {
    fn load(&self) -> io::Result<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn save(&self, raw: &str) -> io::Result<()> {
        std::fs::write(&self.path, raw)
    }
}

// =============================================================================
// RESTORE
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PersistedStateError {
    #[error("malformed viewport state: {0}")]
    Malformed(String),
    #[error("viewport storage error: {0}")]
    Storage(#[from] io::Error),
}

impl ErrorCode for PersistedStateError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "E_VIEWPORT_MALFORMED",
            Self::Storage(_) => "E_VIEWPORT_STORAGE",
        }
    }
}

/// Decode saved state. Every field must be present, numeric and finite, and
/// the scale must be positive.
///
/// # Errors
///
/// Returns `Malformed` describing the first problem found.
pub fn decode_viewport(raw: &str) -> Result<Viewport, PersistedStateError> {
    let viewport: Viewport =
        serde_json::from_str(raw).map_err(|e| PersistedStateError::Malformed(e.to_string()))?;
    if !viewport.is_valid() {
        return Err(PersistedStateError::Malformed(format!(
            "x={}, y={}, scale={}",
            viewport.x, viewport.y, viewport.scale
        )));
    }
    Ok(viewport)
}

/// Read and decode the saved viewport. `Ok(None)` when nothing was saved.
///
/// # Errors
///
/// Returns `Storage` if the read fails, `Malformed` if decoding does.
pub fn restore(storage: &dyn ViewportStorage) -> Result<Option<Viewport>, PersistedStateError> {
    match storage.load()? {
        Some(raw) => decode_viewport(&raw).map(Some),
        None => Ok(None),
    }
}

// =============================================================================
// CONTROLLER
// =============================================================================

pub struct ViewportController {
    current: Viewport,
    limits: ZoomLimits,
    bounds: Rect,
    persist: Debounce<Viewport>,
}

impl ViewportController {
    /// Restore the saved viewport, falling back to the default.
    ///
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn load(storage: Arc<dyn ViewportStorage>, config: &SyncConfig) -> Self {
        let restored = match restore(storage.as_ref()) {
            Ok(Some(viewport)) => viewport,
            Ok(None) => Viewport::default(),
            Err(e) => {
                warn!(error = %e, code = e.error_code(), "discarding saved viewport");
                Viewport::default()
            }
        };
        let limits = config.zoom;
        let current = Viewport { scale: limits.clamp(restored.scale), ..restored };
        info!(x = current.x, y = current.y, scale = current.scale, "viewport restored");

        let persist = Debounce::new(config.viewport_debounce, move |viewport: Viewport| {
            save_in_background(Arc::clone(&storage), viewport)
        });

        Self { current, limits, bounds: config.canvas_bounds(), persist }
    }

    #[must_use]
    pub fn get(&self) -> Viewport {
        self.current
    }

    #[must_use]
    pub fn limits(&self) -> ZoomLimits {
        self.limits
    }

    /// Replace the viewport. The scale is clamped to the zoom limits.
    ///
    /// # Errors
    ///
    /// Returns the first non-finite field; the viewport is left unchanged.
    pub fn set(&mut self, viewport: Viewport) -> Result<(), ValidationError> {
        for (field, value) in [("x", viewport.x), ("y", viewport.y), ("scale", viewport.scale)] {
            if !value.is_finite() {
                return Err(ValidationError { field, value });
            }
        }
        self.apply(Viewport { scale: self.limits.clamp(viewport.scale), ..viewport });
        Ok(())
    }

    /// Pan by a screen-space delta.
    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        if !(dx.is_finite() && dy.is_finite()) {
            debug!(dx, dy, "ignoring non-finite pan");
            return;
        }
        self.apply(Viewport { x: self.current.x + dx, y: self.current.y + dy, ..self.current });
    }

    /// Zoom to `new_scale`, keeping the canvas point under `pointer` fixed.
    pub fn zoom_at(&mut self, pointer: Point, new_scale: f64) {
        if !pointer.is_finite() || !new_scale.is_finite() {
            debug!(?pointer, new_scale, "ignoring non-finite zoom");
            return;
        }
        self.apply(camera::zoom_at_pointer(&self.current, pointer, new_scale, &self.limits));
    }

    /// Multiply the scale by `factor` around `pointer` (wheel zoom).
    pub fn zoom_by(&mut self, pointer: Point, factor: f64) {
        if !(factor.is_finite() && factor > 0.0) {
            debug!(factor, "ignoring zoom factor");
            return;
        }
        self.zoom_at(pointer, self.current.scale * factor);
    }

    #[must_use]
    pub fn to_canvas(&self, screen: Point) -> Point {
        camera::to_canvas(screen, &self.current)
    }

    #[must_use]
    pub fn to_screen(&self, canvas: Point) -> Point {
        camera::to_screen(canvas, &self.current)
    }

    /// Canvas area visible through a `width` x `height` screen.
    #[must_use]
    pub fn visible_rect(&self, width: f64, height: f64) -> Rect {
        camera::visible_canvas_rect(&self.current, width, height, &self.bounds)
    }

    /// Grid lines to draw for a `width` x `height` screen.
    #[must_use]
    pub fn grid_lines(&self, width: f64, height: f64) -> GridLines {
        visible_grid_lines(&self.current, width, height, &self.bounds)
    }

    /// Save a pending change now instead of after the quiet period.
    pub fn flush(&self) {
        self.persist.flush();
    }

    #[must_use]
    pub fn has_unsaved_changes(&self) -> bool {
        self.persist.has_pending()
    }

    fn apply(&mut self, viewport: Viewport) {
        if viewport == self.current {
            return;
        }
        self.current = viewport;
        self.persist.call(viewport);
    }
}

async fn save_in_background(storage: Arc<dyn ViewportStorage>, viewport: Viewport) {
    let raw = match serde_json::to_string(&viewport) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "viewport did not encode");
            return;
        }
    };
    match tokio::task::spawn_blocking(move || storage.save(&raw)).await {
        Ok(Ok(())) => debug!(x = viewport.x, y = viewport.y, scale = viewport.scale, "viewport saved"),
        Ok(Err(e)) => warn!(error = %e, "viewport save failed"),
        Err(e) => warn!(error = %e, "viewport save task failed"),
    }
}
