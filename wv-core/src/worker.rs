//! Background thread plumbing shared by the transports and the connector

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::warn;

/// Cooperative cancellation flag for long operations such as flash reads
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Stop flag a sleeping worker can be woken from
#[derive(Default)]
pub(crate) struct StopSignal {
    stopped: Mutex<bool>,
    cv: Condvar,
}

impl StopSignal {
    pub fn stop(&self) {
        *self.stopped.lock() = true;
        self.cv.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *self.stopped.lock()
    }

    /// Sleep up to `dur`; returns true if stopped meanwhile
    pub fn sleep(&self, dur: Duration) -> bool {
        let mut stopped = self.stopped.lock();
        if !*stopped {
            self.cv.wait_for(&mut stopped, dur);
        }
        *stopped
    }
}

/// A named background thread with its stop signal
pub(crate) struct Worker {
    stop: Arc<StopSignal>,
    handle: JoinHandle<()>,
}

impl Worker {
    pub fn spawn<F>(name: &str, body: F) -> std::io::Result<Self>
    where
        F: FnOnce(Arc<StopSignal>) + Send + 'static,
    {
        let stop = Arc::new(StopSignal::default());
        let s = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(s))?;
        Ok(Self { stop, handle })
    }

    /// Signal the worker and wait for it, unless called from the worker itself
    pub fn stop_and_join(self) {
        self.stop.stop();
        if self.handle.thread().id() == thread::current().id() {
            return;
        }
        let name = self.handle.thread().name().unwrap_or("worker").to_string();
        if self.handle.join().is_err() {
            warn!(worker = %name, "worker thread panicked");
        }
    }

    /// Signal the worker and wait at most `grace` for it to finish.
    ///
    /// Returns false if the thread was still running and has been detached.
    pub fn stop_within(self, grace: Duration) -> bool {
        self.stop.stop();
        if self.handle.thread().id() == thread::current().id() {
            return false;
        }
        let deadline = Instant::now() + grace;
        while !self.handle.is_finished() {
            if Instant::now() >= deadline {
                let name = self.handle.thread().name().unwrap_or("worker").to_string();
                warn!(worker = %name, "worker still busy after grace period, detaching");
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
        if self.handle.join().is_err() {
            warn!("worker thread panicked");
        }
        true
    }
}
