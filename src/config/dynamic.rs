//! Live-updatable configuration values.
//!
//! A [`DynamicProperty`] is a cheaply clonable cell shared between the party
//! that reconfigures a value at runtime and the components that read it.
//! Readers call [`DynamicProperty::get`] at every decision point instead of
//! caching the value at construction, so a [`DynamicProperty::set`] takes
//! effect without restarting anything.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

type Listener<T> = Arc<dyn Fn(&T, &T) + Send + Sync>;

struct PropertyInner<T> {
    value: RwLock<T>,
    listeners: Mutex<HashMap<u64, Listener<T>>>,
    next_listener: AtomicU64,
}

/// A shared value that may change while it is being used.
///
/// # Examples
///
/// ```
/// use pending_limiter::config::DynamicProperty;
///
/// let threshold = DynamicProperty::new(10_u64);
/// let reader = threshold.clone();
/// threshold.set(20);
/// assert_eq!(reader.get(), 20);
/// ```
pub struct DynamicProperty<T> {
    inner: Arc<PropertyInner<T>>,
}

impl<T> Clone for DynamicProperty<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for DynamicProperty<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicProperty")
            .field("value", &*self.inner.value.read())
            .field("listeners", &self.inner.listeners.lock().len())
            .finish()
    }
}

impl<T> DynamicProperty<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a property holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(PropertyInner {
                value: RwLock::new(value),
                listeners: Mutex::new(HashMap::new()),
                next_listener: AtomicU64::new(0),
            }),
        }
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Replace the value and notify subscribers with `(old, new)`.
    ///
    /// Listeners run on the calling thread after the value lock is released.
    pub fn set(&self, value: T) {
        let old = {
            let mut guard = self.inner.value.write();
            std::mem::replace(&mut *guard, value.clone())
        };
        let listeners: Vec<Listener<T>> = self.inner.listeners.lock().values().cloned().collect();
        for listener in listeners {
            listener(&old, &value);
        }
    }

    /// Attach a listener invoked on every [`set`](Self::set).
    ///
    /// The listener stays attached until the returned [`Subscription`] is
    /// dropped.
    #[must_use = "dropping the subscription detaches the listener"]
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T, &T) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().insert(id, Arc::new(listener));

        let weak: Weak<PropertyInner<T>> = Arc::downgrade(&self.inner);
        Subscription {
            detach: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.listeners.lock().remove(&id);
                }
            })),
        }
    }

    /// Attach a listener and immediately call it with the current value as
    /// both old and new.
    #[must_use = "dropping the subscription detaches the listener"]
    pub fn subscribe_and_call<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T, &T) + Send + Sync + 'static,
    {
        let current = self.get();
        listener(&current, &current);
        self.subscribe(listener)
    }

    /// Number of attached listeners.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }
}

impl<T> From<T> for DynamicProperty<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

/// Keeps a [`DynamicProperty`] listener attached while alive.
pub struct Subscription {
    detach: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("attached", &self.detach.is_some())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}
