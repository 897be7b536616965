//! Admission control for in-flight asynchronous operations.
//!
//! A [`PendingLimiter`] counts operations that were admitted but have not yet
//! completed. Producers either admit unconditionally
//! ([`enqueue_unlimited`](PendingLimiter::enqueue_unlimited)) or park until the
//! pending count drops below the live threshold
//! ([`enqueue_blocking`](PendingLimiter::enqueue_blocking)).
//!
//! # Design
//!
//! - **Single gate lock**: every change of the pending count happens under one
//!   `parking_lot::Mutex`, mirrored into an atomic for lock-free reads.
//! - **No lost wakeups**: waiters re-check their condition under the gate lock
//!   and releases notify while holding it.
//! - **FIFO waiters**: blocked callers take a ticket; only the head of the queue
//!   may admit, so newcomers cannot starve earlier waiters.
//! - **Exactly-once release**: each admission owns a [`Slot`] that releases on
//!   completion, on timeout, or on drop, whichever comes first.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use pending_limiter::config::LimiterLimits;
//! use pending_limiter::core::{Interrupt, PendingLimiter};
//! use pending_limiter::runtime::TokioSpawner;
//!
//! let limiter = PendingLimiter::new(
//!     LimiterLimits::new(32, 64, Duration::from_secs(30)),
//!     TokioSpawner::current(),
//! );
//! let op = limiter.enqueue_blocking(async { fetch().await }, &Interrupt::new())?;
//! let value = op.await?;
//! ```

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::config::{LimiterLimits, Subscription};
use crate::core::error::{AdmissionError, OperationError};
use crate::core::interrupt::Interrupt;
use crate::core::observer::{AdmissionObserver, Completion, OperationId};
use crate::core::spawn::Spawn;

/// Point-in-time view of the limiter counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterSnapshot {
    /// Operations admitted and not yet released.
    pub pending: u64,
    /// Current blocking threshold.
    pub threshold: u64,
    /// Current reporting ceiling.
    pub max_capacity: u64,
    /// Callers parked in a blocking enqueue.
    pub waiting: usize,
}

/// Mutable state guarded by the gate lock.
#[derive(Debug, Default)]
struct GateState {
    /// Tickets of parked callers, oldest first.
    waiters: VecDeque<u64>,
    next_ticket: u64,
    closed: bool,
}

impl GateState {
    fn leave(&mut self, ticket: u64) {
        self.waiters.retain(|t| *t != ticket);
    }
}

struct Shared {
    limits: LimiterLimits,
    /// Written only under `gate`.
    pending: AtomicU64,
    waiting: AtomicU64,
    gate: Mutex<GateState>,
    released: Condvar,
    observer: RwLock<Option<Arc<dyn AdmissionObserver>>>,
    next_operation: AtomicU64,
    _threshold_watch: Subscription,
}

impl Shared {
    fn has_room(&self) -> bool {
        self.pending.load(Ordering::SeqCst) < self.limits.threshold.get()
    }

    fn wake_all(&self) {
        let _gate = self.gate.lock();
        self.released.notify_all();
    }

    /// Increment the pending count. Caller holds the gate lock and reports
    /// the admission through [`notify_admitted`](Self::notify_admitted) once
    /// the lock is dropped.
    fn admit_locked(self: &Arc<Self>) -> (Slot, u64) {
        let pending = self.pending.fetch_add(1, Ordering::SeqCst) + 1;
        let id = OperationId(self.next_operation.fetch_add(1, Ordering::Relaxed));
        let slot = Slot {
            shared: Arc::clone(self),
            id,
            admitted_at: Instant::now(),
            released: AtomicBool::new(false),
        };
        (slot, pending)
    }

    fn notify_admitted(&self, (slot, pending): (Slot, u64)) -> Slot {
        if let Some(observer) = self.observer.read().as_ref() {
            observer.on_admitted(slot.id, pending);
        }
        slot
    }

    fn acquire_unlimited(self: &Arc<Self>) -> Result<Slot, AdmissionError> {
        let admitted = {
            let gate = self.gate.lock();
            if gate.closed {
                return Err(AdmissionError::Closed);
            }
            self.admit_locked()
        };
        Ok(self.notify_admitted(admitted))
    }

    fn acquire_blocking(self: &Arc<Self>, interrupt: &Interrupt) -> Result<Slot, AdmissionError> {
        let admitted = self.wait_for_room(interrupt)?;
        Ok(self.notify_admitted(admitted))
    }

    /// Park until this caller is at the head of the queue and there is room.
    /// Returns with the gate lock released.
    fn wait_for_room(self: &Arc<Self>, interrupt: &Interrupt) -> Result<(Slot, u64), AdmissionError> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let _waker = interrupt.on_interrupt(move || {
            if let Some(shared) = weak.upgrade() {
                shared.wake_all();
            }
        });

        let mut gate = self.gate.lock();
        if gate.closed {
            return Err(AdmissionError::Closed);
        }
        if gate.waiters.is_empty() && self.has_room() {
            return Ok(self.admit_locked());
        }
        if interrupt.is_interrupted() {
            return Err(AdmissionError::Interrupted);
        }

        let ticket = gate.next_ticket;
        gate.next_ticket += 1;
        gate.waiters.push_back(ticket);
        self.waiting.fetch_add(1, Ordering::SeqCst);
        debug!(
            ticket,
            pending = self.pending.load(Ordering::SeqCst),
            threshold = self.limits.threshold.get(),
            "enqueue blocked, waiting for pending operations to drain"
        );

        let outcome = loop {
            if gate.closed {
                break Err(AdmissionError::Closed);
            }
            if interrupt.is_interrupted() {
                debug!(ticket, "blocked enqueue interrupted");
                break Err(AdmissionError::Interrupted);
            }
            if gate.waiters.front() == Some(&ticket) && self.has_room() {
                break Ok(());
            }
            self.released.wait(&mut gate);
        };

        gate.leave(ticket);
        self.waiting.fetch_sub(1, Ordering::SeqCst);
        match outcome {
            Ok(()) => {
                let admitted = self.admit_locked();
                if !gate.waiters.is_empty() && self.has_room() {
                    self.released.notify_all();
                }
                Ok(admitted)
            }
            Err(err) => {
                // The next ticket may now be at the head.
                self.released.notify_all();
                Err(err)
            }
        }
    }

    fn release(&self, id: OperationId, completion: Completion, lifetime: Duration) {
        let pending = {
            let _gate = self.gate.lock();
            let pending = self.pending.fetch_sub(1, Ordering::SeqCst) - 1;
            if pending == 0 || pending < self.limits.threshold.get() {
                self.released.notify_all();
            }
            pending
        };
        if let Some(observer) = self.observer.read().as_ref() {
            observer.on_completed(id, completion, lifetime, pending);
        }
    }
}

/// One unit of the pending count, released exactly once.
struct Slot {
    shared: Arc<Shared>,
    id: OperationId,
    admitted_at: Instant,
    released: AtomicBool,
}

impl Slot {
    fn release(&self, completion: Completion) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.shared
                .release(self.id, completion, self.admitted_at.elapsed());
        }
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.release(Completion::Abandoned);
    }
}

/// Handle to the eventual output of an admitted operation.
///
/// Await it from async code or call [`blocking_wait`](Self::blocking_wait)
/// from a plain thread. Dropping the handle does not cancel the operation.
#[derive(Debug)]
pub struct PendingOperation<T> {
    id: OperationId,
    rx: oneshot::Receiver<T>,
}

impl<T> PendingOperation<T> {
    /// Identifier assigned at admission.
    #[must_use]
    pub const fn id(&self) -> OperationId {
        self.id
    }

    /// Block the current thread until the operation finishes.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::Abandoned`] if the operation was dropped
    /// before producing output.
    ///
    /// # Panics
    ///
    /// Panics when called from within an async runtime context.
    pub fn blocking_wait(self) -> Result<T, OperationError> {
        self.rx.blocking_recv().map_err(|_| OperationError::Abandoned)
    }
}

impl<T> Future for PendingOperation<T> {
    type Output = Result<T, OperationError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.rx)
            .poll(cx)
            .map(|r| r.map_err(|_| OperationError::Abandoned))
    }
}

/// Bounds the number of outstanding asynchronous operations.
///
/// Cloning yields another handle to the same limiter.
pub struct PendingLimiter<S> {
    shared: Arc<Shared>,
    spawner: S,
}

impl<S: Clone> Clone for PendingLimiter<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            spawner: self.spawner.clone(),
        }
    }
}

impl<S> std::fmt::Debug for PendingLimiter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingLimiter")
            .field("snapshot", &self.snapshot())
            .finish_non_exhaustive()
    }
}

impl<S> PendingLimiter<S> {
    /// Create a limiter reading its limits live from `limits`.
    ///
    /// A change of `limits.threshold` wakes parked callers so a raised
    /// threshold takes effect immediately.
    pub fn new(limits: LimiterLimits, spawner: S) -> Self {
        let shared = Arc::new_cyclic(|weak: &Weak<Shared>| {
            let weak = weak.clone();
            let threshold_watch = limits.threshold.subscribe(move |old, new| {
                if let Some(shared) = weak.upgrade() {
                    debug!(old, new, "limiter threshold changed");
                    shared.wake_all();
                }
            });
            Shared {
                limits,
                pending: AtomicU64::new(0),
                waiting: AtomicU64::new(0),
                gate: Mutex::new(GateState::default()),
                released: Condvar::new(),
                observer: RwLock::new(None),
                next_operation: AtomicU64::new(0),
                _threshold_watch: threshold_watch,
            }
        });
        Self { shared, spawner }
    }

    /// Attach an observer notified on every admission and release.
    #[must_use]
    pub fn with_observer(self, observer: Arc<dyn AdmissionObserver>) -> Self {
        *self.shared.observer.write() = Some(observer);
        self
    }

    /// Operations admitted and not yet released.
    #[must_use]
    pub fn pending_count(&self) -> u64 {
        self.shared.pending.load(Ordering::SeqCst)
    }

    /// Current blocking threshold.
    #[must_use]
    pub fn threshold(&self) -> u64 {
        self.shared.limits.threshold.get()
    }

    /// Current reporting ceiling.
    #[must_use]
    pub fn max_capacity(&self) -> u64 {
        self.shared.limits.max_capacity.get()
    }

    /// Callers currently parked in a blocking enqueue.
    #[must_use]
    pub fn waiting_count(&self) -> usize {
        usize::try_from(self.shared.waiting.load(Ordering::SeqCst)).unwrap_or(usize::MAX)
    }

    /// All counters at once.
    #[must_use]
    pub fn snapshot(&self) -> LimiterSnapshot {
        LimiterSnapshot {
            pending: self.pending_count(),
            threshold: self.threshold(),
            max_capacity: self.max_capacity(),
            waiting: self.waiting_count(),
        }
    }

    /// Whether [`close`](Self::close) was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.gate.lock().closed
    }

    /// Stop admitting. Parked callers fail with [`AdmissionError::Closed`];
    /// operations already admitted run to completion.
    pub fn close(&self) {
        let mut gate = self.shared.gate.lock();
        if !gate.closed {
            gate.closed = true;
            debug!(
                pending = self.shared.pending.load(Ordering::SeqCst),
                "limiter closed"
            );
        }
        self.shared.released.notify_all();
    }

    /// Block until no operation is pending or `timeout` elapses.
    ///
    /// Returns `true` if the pending count reached zero.
    pub fn wait_all(&self, timeout: Duration) -> bool {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.wait_all_blocking();
            return true;
        };
        let mut gate = self.shared.gate.lock();
        while self.shared.pending.load(Ordering::SeqCst) > 0 {
            if self
                .shared
                .released
                .wait_until(&mut gate, deadline)
                .timed_out()
            {
                return self.shared.pending.load(Ordering::SeqCst) == 0;
            }
        }
        true
    }

    /// Block until no operation is pending.
    pub fn wait_all_blocking(&self) {
        let mut gate = self.shared.gate.lock();
        while self.shared.pending.load(Ordering::SeqCst) > 0 {
            self.shared.released.wait(&mut gate);
        }
    }
}

impl<S: Spawn> PendingLimiter<S> {
    /// Track `operation`, blocking first when `blocking` is set.
    ///
    /// The wait cannot be interrupted; use
    /// [`enqueue_with`](Self::enqueue_with) to pass an [`Interrupt`].
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::Closed`] after [`close`](Self::close).
    pub fn enqueue<F>(
        &self,
        operation: F,
        blocking: bool,
    ) -> Result<PendingOperation<F::Output>, AdmissionError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.enqueue_with(operation, blocking, &Interrupt::new())
    }

    /// Track `operation`, blocking first when `blocking` is set. A raised
    /// `interrupt` aborts the wait; it is ignored when `blocking` is unset.
    ///
    /// # Errors
    ///
    /// - [`AdmissionError::Interrupted`] if a blocking wait is interrupted.
    /// - [`AdmissionError::Closed`] if the limiter is or becomes closed.
    pub fn enqueue_with<F>(
        &self,
        operation: F,
        blocking: bool,
        interrupt: &Interrupt,
    ) -> Result<PendingOperation<F::Output>, AdmissionError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if blocking {
            self.enqueue_blocking(operation, interrupt)
        } else {
            self.enqueue_unlimited(operation)
        }
    }

    /// Admit `operation` immediately regardless of the threshold.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::Closed`] after [`close`](Self::close).
    pub fn enqueue_unlimited<F>(&self, operation: F) -> Result<PendingOperation<F::Output>, AdmissionError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let slot = self.shared.acquire_unlimited()?;
        Ok(self.launch(slot, operation))
    }

    /// Park the calling thread while the pending count is at or above the
    /// threshold, then admit `operation`.
    ///
    /// Must not be called from an async task; see
    /// [`enqueue_blocking_async`](Self::enqueue_blocking_async).
    ///
    /// # Errors
    ///
    /// - [`AdmissionError::Interrupted`] if `interrupt` is raised before
    ///   admission; the pending count is unchanged.
    /// - [`AdmissionError::Closed`] if the limiter is or becomes closed.
    pub fn enqueue_blocking<F>(
        &self,
        operation: F,
        interrupt: &Interrupt,
    ) -> Result<PendingOperation<F::Output>, AdmissionError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let slot = self.shared.acquire_blocking(interrupt)?;
        Ok(self.launch(slot, operation))
    }

    /// Async-context form of [`enqueue_blocking`](Self::enqueue_blocking).
    ///
    /// The wait runs on tokio's blocking pool. Dropping this future while it
    /// waits aborts the wait and frees the blocking-pool thread.
    ///
    /// # Errors
    ///
    /// As [`enqueue_blocking`](Self::enqueue_blocking), plus
    /// [`AdmissionError::Runtime`] if the blocking task fails.
    pub async fn enqueue_blocking_async<F>(
        &self,
        operation: F,
        interrupt: &Interrupt,
    ) -> Result<PendingOperation<F::Output>, AdmissionError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let abort = AbortOnDrop(Interrupt::new());
        let forward = abort.0.clone();
        let _link = interrupt.on_interrupt(move || forward.interrupt());
        if interrupt.is_interrupted() {
            abort.0.interrupt();
        }

        let shared = Arc::clone(&self.shared);
        let waiter = abort.0.clone();
        let slot = tokio::task::spawn_blocking(move || shared.acquire_blocking(&waiter))
            .await
            .map_err(|e| AdmissionError::Runtime(e.to_string()))??;
        Ok(self.launch(slot, operation))
    }

    fn launch<F>(&self, slot: Slot, operation: F) -> PendingOperation<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let id = slot.id;
        let timeout = self.shared.limits.operation_timeout.get();
        let (tx, rx) = oneshot::channel();
        self.spawner.spawn(drive(operation, slot, timeout, tx));
        PendingOperation { id, rx }
    }
}

/// Raises its interrupt when dropped, so a cancelled async enqueue stops
/// waiting.
struct AbortOnDrop(Interrupt);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.interrupt();
    }
}

/// Run `operation`, releasing `slot` on completion or after `timeout`.
async fn drive<F>(operation: F, slot: Slot, timeout: Duration, tx: oneshot::Sender<F::Output>)
where
    F: Future,
{
    tokio::pin!(operation);
    let output = tokio::select! {
        output = &mut operation => {
            slot.release(Completion::Finished);
            output
        }
        () = tokio::time::sleep(timeout) => {
            warn!(
                operation = %slot.id,
                ?timeout,
                "operation exceeded its timeout, releasing its slot"
            );
            slot.release(Completion::TimedOut);
            operation.await
        }
    };
    // The caller may have dropped its handle.
    let _ = tx.send(output);
}
