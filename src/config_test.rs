use std::collections::HashMap;

use super::*;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn empty_lookup_matches_default() {
    let cfg = SyncConfig::from_lookup(|_| None);
    assert_eq!(cfg, SyncConfig::default());
}

#[test]
fn default_cursor_rate_is_ten_hz() {
    assert_eq!(SyncConfig::default().cursor_interval, Duration::from_millis(100));
}

#[test]
fn overrides_are_applied() {
    let cfg = SyncConfig::from_lookup(lookup_from(&[
        ("CANVAS_SYNC_CURSOR_INTERVAL_MS", "250"),
        ("CANVAS_SYNC_VIEWPORT_DEBOUNCE_MS", "1000"),
        ("CANVAS_SYNC_ZOOM_MIN", "0.5"),
        ("CANVAS_SYNC_ZOOM_MAX", "2"),
    ]));
    assert_eq!(cfg.cursor_interval, Duration::from_millis(250));
    assert_eq!(cfg.viewport_debounce, Duration::from_millis(1000));
    assert!((cfg.zoom.min - 0.5).abs() < f64::EPSILON);
    assert!((cfg.zoom.max - 2.0).abs() < f64::EPSILON);
}

#[test]
fn garbage_values_fall_back() {
    let cfg = SyncConfig::from_lookup(lookup_from(&[
        ("CANVAS_SYNC_CURSOR_INTERVAL_MS", "fast"),
        ("CANVAS_SYNC_CANVAS_WIDTH", "-10"),
    ]));
    assert_eq!(cfg.cursor_interval, Duration::from_millis(CURSOR_INTERVAL_MS));
    assert!((cfg.canvas_width - CANVAS_WIDTH).abs() < f64::EPSILON);
}

#[test]
fn inverted_zoom_range_falls_back() {
    let cfg = SyncConfig::from_lookup(lookup_from(&[("CANVAS_SYNC_ZOOM_MIN", "4"), ("CANVAS_SYNC_ZOOM_MAX", "1")]));
    assert_eq!(cfg.zoom, ZoomLimits::default());
}

#[test]
fn zoom_clamp_bounds_and_non_finite() {
    let limits = ZoomLimits::default();
    assert!((limits.clamp(100.0) - ZOOM_MAX).abs() < f64::EPSILON);
    assert!((limits.clamp(0.0) - ZOOM_MIN).abs() < f64::EPSILON);
    assert!((limits.clamp(f64::NAN) - 1.0).abs() < f64::EPSILON);
}

#[test]
fn canvas_bounds_start_at_origin() {
    let cfg = lookup_from(&[("CANVAS_SYNC_CANVAS_WIDTH", "800")]);
    let bounds = SyncConfig::from_lookup(cfg).canvas_bounds();
    assert_eq!(bounds, Rect { min_x: 0.0, min_y: 0.0, max_x: 800.0, max_y: CANVAS_HEIGHT });
}
