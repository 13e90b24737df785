use std::sync::{Arc, Mutex};

use tokio::time::{Duration, Instant, sleep};

use super::*;

type Log<T> = Arc<Mutex<Vec<(T, Instant)>>>;

fn recording_throttle(interval: Duration) -> (Throttle<u32>, Log<u32>) {
    let log: Log<u32> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    let throttle = Throttle::new(interval, move |value| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().unwrap().push((value, Instant::now()));
        }
    });
    (throttle, log)
}

fn values<T: Copy>(log: &Log<T>) -> Vec<T> {
    log.lock().unwrap().iter().map(|(v, _)| *v).collect()
}

// --- Throttle ---

#[tokio::test(start_paused = true)]
async fn first_call_fires_immediately() {
    let (throttle, log) = recording_throttle(Duration::from_millis(100));
    let start = Instant::now();
    throttle.call(7);
    sleep(Duration::from_millis(1)).await;

    let calls = log.lock().unwrap().clone();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, 7);
    assert!(calls[0].1 - start < Duration::from_millis(1));
}

#[tokio::test(start_paused = true)]
async fn burst_inside_window_fires_leading_and_latest_trailing() {
    let (throttle, log) = recording_throttle(Duration::from_millis(100));
    for i in 0..10 {
        throttle.call(i);
    }
    sleep(Duration::from_millis(500)).await;
    assert_eq!(values(&log), vec![0, 9]);
}

#[tokio::test(start_paused = true)]
async fn trailing_waits_for_the_window() {
    let (throttle, log) = recording_throttle(Duration::from_millis(100));
    throttle.call(1);
    sleep(Duration::from_millis(10)).await;
    throttle.call(2);
    assert!(throttle.has_pending());

    sleep(Duration::from_millis(50)).await;
    assert_eq!(values(&log), vec![1]);

    sleep(Duration::from_millis(60)).await;
    assert_eq!(values(&log), vec![1, 2]);
    assert!(!throttle.has_pending());
}

#[tokio::test(start_paused = true)]
async fn invocations_are_spaced_by_the_interval() {
    let interval = Duration::from_millis(100);
    let (throttle, log) = recording_throttle(interval);
    for i in 0..30 {
        throttle.call(i);
        sleep(Duration::from_millis(15)).await;
    }
    sleep(Duration::from_millis(300)).await;

    let calls = log.lock().unwrap().clone();
    assert!(calls.len() >= 4);
    for pair in calls.windows(2) {
        assert!(pair[1].1 - pair[0].1 >= interval, "calls fired {:?} apart", pair[1].1 - pair[0].1);
    }
    // The last value always lands eventually.
    assert_eq!(calls.last().map(|(v, _)| *v), Some(29));
}

#[tokio::test(start_paused = true)]
async fn idle_after_window_fires_immediately_again() {
    let (throttle, log) = recording_throttle(Duration::from_millis(100));
    throttle.call(1);
    sleep(Duration::from_millis(250)).await;
    let before = Instant::now();
    throttle.call(2);
    sleep(Duration::from_millis(1)).await;

    let calls = log.lock().unwrap().clone();
    assert_eq!(calls.len(), 2);
    assert!(calls[1].1 - before < Duration::from_millis(1));
}

#[tokio::test(start_paused = true)]
async fn cancel_discards_trailing_value() {
    let (throttle, log) = recording_throttle(Duration::from_millis(100));
    throttle.call(1);
    throttle.call(2);
    throttle.cancel();
    sleep(Duration::from_millis(300)).await;
    assert_eq!(values(&log), vec![1]);
}

#[tokio::test(start_paused = true)]
async fn close_discards_pending_and_stops() {
    let (throttle, log) = recording_throttle(Duration::from_millis(100));
    throttle.call(1);
    sleep(Duration::from_millis(1)).await;
    throttle.call(2);
    throttle.close().await;
    sleep(Duration::from_millis(300)).await;
    assert_eq!(values(&log), vec![1]);
}

// --- Debounce ---

fn recording_debounce(delay: Duration) -> (Debounce<u32>, Log<u32>) {
    let log: Log<u32> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    let debounce = Debounce::new(delay, move |value| {
        sink.lock().unwrap().push((value, Instant::now()));
        async {}
    });
    (debounce, log)
}

#[tokio::test(start_paused = true)]
async fn debounce_fires_once_after_quiet_period() {
    let (debounce, log) = recording_debounce(Duration::from_millis(500));
    debounce.call(1);
    sleep(Duration::from_millis(100)).await;
    debounce.call(2);
    sleep(Duration::from_millis(100)).await;
    debounce.call(3);

    sleep(Duration::from_millis(400)).await;
    assert!(values(&log).is_empty(), "fired before the quiet period elapsed");

    sleep(Duration::from_millis(150)).await;
    assert_eq!(values(&log), vec![3]);
    assert!(!debounce.has_pending());
}

#[tokio::test(start_paused = true)]
async fn debounce_flush_fires_now() {
    let (debounce, log) = recording_debounce(Duration::from_millis(500));
    debounce.call(4);
    debounce.flush();
    sleep(Duration::from_millis(1)).await;
    assert_eq!(values(&log), vec![4]);
}

#[tokio::test(start_paused = true)]
async fn debounce_drop_delivers_pending_value() {
    let (debounce, log) = recording_debounce(Duration::from_millis(500));
    debounce.call(5);
    drop(debounce);
    sleep(Duration::from_millis(1)).await;
    assert_eq!(values(&log), vec![5]);
}
