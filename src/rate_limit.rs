//! Time-windowed call limiting: throttle and debounce.
//!
//! DESIGN
//! ======
//! Both limiters own a background tokio task that runs the wrapped action, so
//! `call` is synchronous and never blocks the input path. Values flow through
//! a single slot guarded by a std mutex; the task is woken with `Notify`.
//!
//! - [`Throttle`]: the first call in an idle period fires immediately. Calls
//!   made while the window is open overwrite one trailing slot, which fires
//!   with the latest value once the window elapses. At most one invocation
//!   starts per interval and at most one trailing call is ever pending.
//! - [`Debounce`]: fires once the calls have been quiet for the delay, with
//!   the latest value. Invocations run one at a time, in call order.

#[cfg(test)]
#[path = "rate_limit_test.rs"]
mod rate_limit_test;

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

// =============================================================================
// THROTTLE
// =============================================================================

struct ThrottleSlot<T> {
    /// Value for the immediate call that opened the window.
    leading: Option<T>,
    /// Latest value seen while the window was open.
    trailing: Option<T>,
    window_open: bool,
    closed: bool,
}

struct ThrottleShared<T> {
    slot: Mutex<ThrottleSlot<T>>,
    wake: Notify,
}

impl<T> ThrottleShared<T> {
    fn lock(&self) -> std::sync::MutexGuard<'_, ThrottleSlot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Leading + single-trailing throttle around an async action.
///
/// Must be created inside a tokio runtime.
pub struct Throttle<T> {
    shared: Arc<ThrottleShared<T>>,
    worker: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> Throttle<T> {
    pub fn new<F, Fut>(interval: Duration, mut action: F) -> Self
    where
        F: FnMut(T) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let shared = Arc::new(ThrottleShared {
            slot: Mutex::new(ThrottleSlot { leading: None, trailing: None, window_open: false, closed: false }),
            wake: Notify::new(),
        });

        let task_shared = Arc::clone(&shared);
        let worker = tokio::spawn(async move {
            loop {
                task_shared.wake.notified().await;

                let leading = {
                    let mut slot = task_shared.lock();
                    if slot.closed {
                        return;
                    }
                    slot.leading.take()
                };
                let Some(value) = leading else {
                    continue;
                };

                action(value).await;
                let mut window_end = Instant::now() + interval;

                // Drain trailing calls, one per window, until a window passes empty.
                loop {
                    tokio::select! {
                        () = sleep_until(window_end) => {}
                        () = task_shared.wake.notified() => {
                            if task_shared.lock().closed {
                                return;
                            }
                            continue;
                        }
                    }

                    let trailing = {
                        let mut slot = task_shared.lock();
                        if slot.closed {
                            return;
                        }
                        let value = slot.trailing.take();
                        if value.is_none() {
                            slot.window_open = false;
                        }
                        value
                    };
                    let Some(value) = trailing else {
                        break;
                    };
                    action(value).await;
                    window_end = Instant::now() + interval;
                }
            }
        });

        Self { shared, worker: Some(worker) }
    }

    /// Submit a value. Fires now if idle, otherwise replaces the pending
    /// trailing value.
    pub fn call(&self, value: T) {
        let mut slot = self.shared.lock();
        if slot.closed {
            return;
        }
        if slot.window_open {
            slot.trailing = Some(value);
            return;
        }
        slot.window_open = true;
        slot.leading = Some(value);
        drop(slot);
        self.shared.wake.notify_one();
    }

    /// Drop any pending trailing value without closing the throttle.
    pub fn cancel(&self) {
        self.shared.lock().trailing = None;
    }

    /// Whether a trailing value is waiting for the window to elapse.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.shared.lock().trailing.is_some()
    }

    /// Discard pending values and wait for an in-flight action to finish.
    pub async fn close(mut self) {
        self.shut_down();
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                tracing::warn!(error = %e, "throttle worker ended abnormally");
            }
        }
    }
}

impl<T> Throttle<T> {
    fn shut_down(&self) {
        {
            let mut slot = self.shared.lock();
            slot.closed = true;
            slot.leading = None;
            slot.trailing = None;
        }
        self.shared.wake.notify_one();
    }
}

impl<T> Drop for Throttle<T> {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.shut_down();
        }
    }
}

// =============================================================================
// DEBOUNCE
// =============================================================================

struct DebounceSlot<T> {
    pending: Option<T>,
    /// Moment the pending value fires unless another call pushes it back.
    deadline: Instant,
    closed: bool,
}

struct DebounceShared<T> {
    slot: Mutex<DebounceSlot<T>>,
    wake: Notify,
    flush: Notify,
}

impl<T> DebounceShared<T> {
    fn lock(&self) -> std::sync::MutexGuard<'_, DebounceSlot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Trailing-edge debounce around an async action.
///
/// Must be created inside a tokio runtime.
pub struct Debounce<T> {
    shared: Arc<DebounceShared<T>>,
    delay: Duration,
}

impl<T: Send + 'static> Debounce<T> {
    pub fn new<F, Fut>(delay: Duration, mut action: F) -> Self
    where
        F: FnMut(T) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let shared = Arc::new(DebounceShared {
            slot: Mutex::new(DebounceSlot { pending: None, deadline: Instant::now(), closed: false }),
            wake: Notify::new(),
            flush: Notify::new(),
        });

        let task_shared = Arc::clone(&shared);
        tokio::spawn(async move {
            loop {
                task_shared.wake.notified().await;

                // Sleep until the latest deadline; later calls move it forward.
                loop {
                    let deadline = {
                        let slot = task_shared.lock();
                        if slot.pending.is_none() {
                            if slot.closed {
                                return;
                            }
                            break;
                        }
                        if slot.closed {
                            break;
                        }
                        slot.deadline
                    };
                    tokio::select! {
                        () = sleep_until(deadline) => {}
                        () = task_shared.flush.notified() => break,
                    }
                    let slot = task_shared.lock();
                    if slot.closed || slot.deadline <= Instant::now() {
                        break;
                    }
                }

                let (value, closed) = {
                    let mut slot = task_shared.lock();
                    (slot.pending.take(), slot.closed)
                };
                if let Some(value) = value {
                    action(value).await;
                }
                if closed {
                    return;
                }
            }
        });

        Self { shared, delay }
    }

    /// Submit a value, restarting the quiet period.
    pub fn call(&self, value: T) {
        {
            let mut slot = self.shared.lock();
            if slot.closed {
                return;
            }
            slot.pending = Some(value);
            slot.deadline = Instant::now() + self.delay;
        }
        self.shared.wake.notify_one();
    }

    /// Run the pending value now instead of waiting for the quiet period.
    pub fn flush(&self) {
        if self.shared.lock().pending.is_some() {
            self.shared.flush.notify_one();
        }
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.shared.lock().pending.is_some()
    }
}

impl<T> Drop for Debounce<T> {
    /// A pending value is still delivered once, immediately.
    fn drop(&mut self) {
        self.shared.lock().closed = true;
        self.shared.wake.notify_one();
        self.shared.flush.notify_one();
    }
}
