//! Observer registration with disposable handles.
//!
//! Subscribing returns a [`Subscription`]; dropping or disposing it removes
//! the callback. Background tasks are held through a [`TaskGuard`] that
//! aborts the task when stopped or dropped, so periodic work cannot outlive
//! its owner.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::task::JoinHandle;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registry<T> {
    next_id: u64,
    callbacks: Vec<(u64, Callback<T>)>,
}

/// A set of callbacks notified with `&T`.
pub struct Observers<T> {
    inner: Arc<Mutex<Registry<T>>>,
}

impl<T: 'static> Observers<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry {
                next_id: 0,
                callbacks: Vec::new(),
            })),
        }
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let mut registry = lock(&self.inner);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.callbacks.push((id, Arc::new(callback)));

        let weak: Weak<Mutex<Registry<T>>> = Arc::downgrade(&self.inner);
        Subscription {
            remove: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    lock(&inner).callbacks.retain(|(cb_id, _)| *cb_id != id);
                }
            })),
        }
    }

    /// Calls every live callback. Callbacks run outside the registry lock,
    /// so a callback may subscribe or dispose without deadlocking.
    pub fn notify(&self, value: &T) {
        let callbacks: Vec<Callback<T>> = lock(&self.inner)
            .callbacks
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in callbacks {
            callback(value);
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: 'static> Default for Observers<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(inner: &Mutex<Registry<T>>) -> MutexGuard<'_, Registry<T>> {
    match inner.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Handle returned by [`Observers::subscribe`].
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn dispose(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

/// Owns a spawned background task.
#[derive(Debug)]
pub struct TaskGuard {
    name: &'static str,
    handle: Option<JoinHandle<()>>,
}

impl TaskGuard {
    pub fn new(name: &'static str, handle: JoinHandle<()>) -> Self {
        Self {
            name,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            tracing::debug!(task = self.name, "stopping background task");
            handle.abort();
        }
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.stop();
    }
}
