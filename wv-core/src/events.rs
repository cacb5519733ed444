//! Callback registry with drop-scoped subscriptions
//!
//! Handlers run on whichever thread calls [`EventHub::emit`]. The registry
//! lock is not held while handlers run, so a handler may subscribe, drop a
//! subscription, or emit again without deadlocking.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::data::DeviceData;

/// Events a transport (or the connector) publishes
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    Data(DeviceData),
    ConnectionChanged(bool),
}

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registry<T> {
    next_id: u64,
    handlers: Vec<(u64, Handler<T>)>,
}

pub struct EventHub<T> {
    inner: Arc<Mutex<Registry<T>>>,
}

impl<T: 'static> EventHub<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry {
                next_id: 0,
                handlers: Vec::new(),
            })),
        }
    }

    /// Register `handler`; it stays attached until the returned handle is dropped
    #[must_use = "dropping the subscription detaches the handler immediately"]
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let mut reg = self.inner.lock();
        let id = reg.next_id;
        reg.next_id += 1;
        reg.handlers.push((id, Arc::new(handler)));

        let weak: Weak<Mutex<Registry<T>>> = Arc::downgrade(&self.inner);
        Subscription {
            detach: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.lock().handlers.retain(|(h, _)| *h != id);
                }
            })),
        }
    }

    pub fn emit(&self, event: &T) {
        let handlers: Vec<Handler<T>> = self
            .inner
            .lock()
            .handlers
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for h in handlers {
            h(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().handlers.len()
    }
}

impl<T: 'static> Default for EventHub<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps a handler attached; detaches on drop
pub struct Subscription {
    detach: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Detach now instead of at end of scope
    pub fn cancel(mut self) {
        self.run_detach();
    }

    fn run_detach(&mut self) {
        if let Some(f) = self.detach.take() {
            f();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_detach();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("attached", &self.detach.is_some())
            .finish()
    }
}
