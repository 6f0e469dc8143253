// Broadcast cancellation shared by every long running task.
// Once triggered it stays triggered; waiters are woken through a condvar so
// timer loops do not sleep through a shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

#[derive(Clone, Default)]
pub struct ShutdownSignal {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    triggered: AtomicBool,
    lock: Mutex<()>,
    cond: Condvar,
}

impl ShutdownSignal {
    pub fn new() -> ShutdownSignal {
        ShutdownSignal::default()
    }

    /// Trigger the signal. Returns true only for the call that flipped it.
    pub fn trigger(&self) -> bool {
        let first = !self.inner.triggered.swap(true, Ordering::AcqRel);
        if first {
            // take the lock so a waiter between its check and its wait sees the flip
            let _guard = self.inner.lock.lock();
            self.inner.cond.notify_all();
        }
        first
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::Acquire)
    }

    /// Block until triggered
    pub fn wait(&self) {
        let Ok(mut guard) = self.inner.lock.lock() else {
            return;
        };
        while !self.is_triggered() {
            guard = match self.inner.cond.wait(guard) {
                Ok(guard) => guard,
                Err(_) => return,
            };
        }
    }

    /// Block for at most `timeout`. Returns true when the signal fired.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let Ok(guard) = self.inner.lock.lock() else {
            return self.is_triggered();
        };
        let _ = self
            .inner
            .cond
            .wait_timeout_while(guard, timeout, |_| !self.is_triggered());
        self.is_triggered()
    }
}
