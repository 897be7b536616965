//! Interruption of blocking waits.
//!
//! Rust threads cannot be interrupted from outside, so a blocking admission
//! takes an explicit [`Interrupt`] token. Raising the token wakes every wait
//! currently parked on it; a wait entered after the token was raised fails
//! immediately.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

type Waker = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct InterruptInner {
    raised: AtomicBool,
    wakers: Mutex<HashMap<u64, Waker>>,
    next_waker: AtomicU64,
}

/// Cloneable cancellation signal for blocking waits.
///
/// # Examples
///
/// ```
/// use pending_limiter::core::Interrupt;
///
/// let interrupt = Interrupt::new();
/// let remote = interrupt.clone();
/// remote.interrupt();
/// assert!(interrupt.is_interrupted());
/// interrupt.clear();
/// assert!(!interrupt.is_interrupted());
/// ```
#[derive(Clone, Default)]
pub struct Interrupt {
    inner: Arc<InterruptInner>,
}

impl fmt::Debug for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interrupt")
            .field("raised", &self.is_interrupted())
            .finish()
    }
}

impl Interrupt {
    /// Create a token that has not been raised.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the token and wake every wait parked on it.
    pub fn interrupt(&self) {
        self.inner.raised.store(true, Ordering::SeqCst);
        let wakers: Vec<Waker> = self.inner.wakers.lock().values().cloned().collect();
        for wake in wakers {
            wake();
        }
    }

    /// Whether the token is currently raised.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.inner.raised.load(Ordering::SeqCst)
    }

    /// Lower the token so it can be reused for later waits.
    pub fn clear(&self) {
        self.inner.raised.store(false, Ordering::SeqCst);
    }

    /// Register `wake` to run on [`interrupt`](Self::interrupt) until the
    /// returned guard is dropped.
    ///
    /// Callers must register before their last check of
    /// [`is_interrupted`](Self::is_interrupted), otherwise a raise landing
    /// between the check and the registration is missed.
    pub(crate) fn on_interrupt<F>(&self, wake: F) -> WakerGuard
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.inner.next_waker.fetch_add(1, Ordering::Relaxed);
        self.inner.wakers.lock().insert(id, Arc::new(wake));
        WakerGuard {
            inner: Arc::clone(&self.inner),
            id,
        }
    }
}

/// Deregisters a waker on drop.
pub(crate) struct WakerGuard {
    inner: Arc<InterruptInner>,
    id: u64,
}

impl Drop for WakerGuard {
    fn drop(&mut self) {
        self.inner.wakers.lock().remove(&self.id);
    }
}
