//! Trailing-edge debounce of a changing value.
//!
//! The published value follows the input only once the input has been quiet
//! for the configured delay. Each change restarts the wait and cancels the
//! previous pending update, so only the most recent value is ever delivered.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

struct Pending<T> {
    latest: T,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

struct Shared<T> {
    pending: Mutex<Pending<T>>,
    output: watch::Sender<T>,
}

/// Timers run on the ambient tokio runtime; `set` must be called from
/// inside one.
pub struct Debouncer<T> {
    delay: Duration,
    shared: Arc<Shared<T>>,
}

impl<T> Debouncer<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new(initial: T, delay: Duration) -> Self {
        let (output, _) = watch::channel(initial.clone());
        Self {
            delay,
            shared: Arc::new(Shared {
                pending: Mutex::new(Pending {
                    latest: initial,
                    generation: 0,
                    timer: None,
                }),
                output,
            }),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Feed a new input value. Repeating the latest input keeps the running
    /// timer as is.
    pub fn set(&self, value: T) {
        let mut pending = self.shared.pending.lock();
        if pending.latest == value {
            return;
        }

        pending.latest = value.clone();
        pending.generation += 1;
        if let Some(timer) = pending.timer.take() {
            timer.abort();
        }

        if self.delay.is_zero() {
            publish(&self.shared.output, value);
            return;
        }

        let generation = pending.generation;
        let shared = Arc::clone(&self.shared);
        let delay = self.delay;
        pending.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let mut pending = shared.pending.lock();
            // a newer input may have landed between the timer firing and
            // this task taking the lock
            if pending.generation == generation {
                pending.timer = None;
                publish(&shared.output, value);
            }
        }));
    }

    /// The debounced value.
    pub fn current(&self) -> T {
        self.shared.output.borrow().clone()
    }

    /// The most recent input, delivered or not.
    pub fn latest(&self) -> T {
        self.shared.pending.lock().latest.clone()
    }

    pub fn is_pending(&self) -> bool {
        self.shared.pending.lock().timer.is_some()
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.shared.output.subscribe()
    }

    /// Drop any pending update. The input falls back to the delivered value.
    pub fn cancel(&self) {
        let mut pending = self.shared.pending.lock();
        pending.generation += 1;
        if let Some(timer) = pending.timer.take() {
            timer.abort();
        }
        pending.latest = self.shared.output.borrow().clone();
    }
}

fn publish<T: PartialEq>(output: &watch::Sender<T>, value: T) {
    output.send_if_modified(|current| {
        if *current == value {
            false
        } else {
            *current = value;
            true
        }
    });
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        let mut pending = self.shared.pending.lock();
        pending.generation += 1;
        if let Some(timer) = pending.timer.take() {
            timer.abort();
        }
    }
}
