//! Deferred cleanup of unreachable objects.
//!
//! A [`ReferenceCleaner`] runs a registered action once the watched
//! [`Tracked`] value becomes unreachable. Cleanup runs on a single worker
//! thread that is started on demand and stops by itself once nothing is left
//! to watch.
//!
//! # Design
//!
//! - **One worker at most**: the worker slot is an atomic holding either 0 or
//!   the generation of the live worker; only the registration that wins the
//!   compare-and-swap spawns a thread.
//! - **Race-free shutdown**: a stopping worker clears its slot, then looks at
//!   the watch set again and reclaims the slot if a registration slipped in.
//! - **Cancel vs fire**: both remove the entry from one map under one lock, so
//!   exactly one of them wins.
//! - **Isolated failures**: a panicking action is logged and the worker keeps
//!   going.
//!
//! # Example
//!
//! ```
//! use std::sync::mpsc;
//! use std::time::Duration;
//! use pending_limiter::core::{ReferenceCleaner, Tracked};
//!
//! let cleaner = ReferenceCleaner::new();
//! let (tx, rx) = mpsc::channel();
//!
//! let file = Tracked::new(String::from("handle"));
//! let _watch = cleaner.register(&file, 7_u32, move |fd| {
//!     tx.send(fd).unwrap();
//! });
//!
//! drop(file);
//! assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 7);
//! ```

mod tracked;

pub use tracked::Tracked;

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, trace};
use uuid::Uuid;

use crate::core::error::CleanupError;

use tracked::TrackedInner;

/// Name given to worker threads unless overridden.
pub const DEFAULT_WORKER_NAME: &str = "reference-cleaner";

/// Identifier of one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchId(Uuid);

impl WatchId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for WatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Messages consumed by the worker.
#[derive(Debug)]
enum Signal {
    /// A watched value became unreachable.
    Dead(WatchId),
    /// The watch set may have become empty.
    Recheck,
    /// Stop the worker of the given generation.
    Interrupt(u64),
}

type Action = Box<dyn FnOnce() + Send>;

struct CleanerShared {
    name: String,
    watches: Mutex<HashMap<WatchId, Action>>,
    tx: Sender<Signal>,
    rx: Receiver<Signal>,
    /// 0 when no worker is running, otherwise its generation.
    worker: AtomicU64,
    generations: AtomicU64,
    workers_started: AtomicU64,
}

/// Runs cleanup actions when watched values become unreachable.
///
/// Construct one and share it by cloning; clones drive the same worker and
/// watch set.
#[derive(Clone)]
pub struct ReferenceCleaner {
    shared: Arc<CleanerShared>,
}

impl Default for ReferenceCleaner {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ReferenceCleaner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceCleaner")
            .field("name", &self.shared.name)
            .field("active_watches", &self.active_watches())
            .field("has_worker", &self.has_worker())
            .finish()
    }
}

impl ReferenceCleaner {
    /// Create a cleaner whose worker threads are named
    /// [`DEFAULT_WORKER_NAME`].
    #[must_use]
    pub fn new() -> Self {
        Self::named(DEFAULT_WORKER_NAME)
    }

    /// Create a cleaner whose worker threads are named `<name>-<generation>`.
    pub fn named(name: impl Into<String>) -> Self {
        let (tx, rx) = unbounded();
        Self {
            shared: Arc::new(CleanerShared {
                name: name.into(),
                watches: Mutex::new(HashMap::new()),
                tx,
                rx,
                worker: AtomicU64::new(0),
                generations: AtomicU64::new(0),
                workers_started: AtomicU64::new(0),
            }),
        }
    }

    /// Run `action(metadata)` once `referent` becomes unreachable.
    ///
    /// Starts the worker if none is running. The returned [`Watch`] can cancel
    /// the order; dropping it leaves the order in place.
    pub fn register<T, M, F>(&self, referent: &Tracked<T>, metadata: M, action: F) -> Watch<T>
    where
        M: Send + 'static,
        F: FnOnce(M) + Send + 'static,
    {
        let id = WatchId::new();
        self.shared
            .watches
            .lock()
            .insert(id, Box::new(move || action(metadata)));
        referent.attach(id, self.shared.tx.clone());
        trace!(watch = %id, "watch registered");

        ensure_worker(&self.shared);

        Watch {
            id,
            shared: Arc::clone(&self.shared),
            referent: referent.downgrade(),
        }
    }

    /// Registrations that have neither fired nor been cancelled.
    #[must_use]
    pub fn active_watches(&self) -> usize {
        self.shared.watches.lock().len()
    }

    /// Whether a worker currently owns the worker slot.
    #[must_use]
    pub fn has_worker(&self) -> bool {
        self.shared.worker.load(Ordering::SeqCst) != 0
    }

    /// Total worker threads started over the cleaner's lifetime.
    #[must_use]
    pub fn workers_started(&self) -> u64 {
        self.shared.workers_started.load(Ordering::SeqCst)
    }

    /// Ask the current worker to exit without waiting for the watch set to
    /// drain. Watches stay registered; the next [`register`](Self::register)
    /// starts a fresh worker that serves them.
    pub fn interrupt_worker(&self) {
        let generation = self.shared.worker.load(Ordering::SeqCst);
        if generation != 0 {
            let _ = self.shared.tx.send(Signal::Interrupt(generation));
        }
    }
}

/// Handle to one cleanup order.
pub struct Watch<T> {
    id: WatchId,
    shared: Arc<CleanerShared>,
    referent: Weak<TrackedInner<T>>,
}

impl<T> fmt::Debug for Watch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watch")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

impl<T> Watch<T> {
    /// Identifier of this registration.
    #[must_use]
    pub const fn id(&self) -> WatchId {
        self.id
    }

    /// Whether the order is still waiting to fire.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.shared.watches.lock().contains_key(&self.id)
    }

    /// The watched value, if it is still reachable.
    #[must_use]
    pub fn referent(&self) -> Option<Tracked<T>> {
        self.referent.upgrade().map(Tracked::from_inner)
    }

    /// Withdraw the order. Returns `false` if it already fired or was already
    /// cancelled. Never blocks and never runs the action.
    pub fn cancel(&self) -> bool {
        let (action, now_empty) = {
            let mut watches = self.shared.watches.lock();
            let action = watches.remove(&self.id);
            (action, watches.is_empty())
        };
        let Some(action) = action else {
            return false;
        };
        drop(action);

        if let Some(inner) = self.referent.upgrade() {
            inner.detach(self.id);
        }
        trace!(watch = %self.id, "watch cancelled");
        if now_empty {
            let _ = self.shared.tx.send(Signal::Recheck);
        }
        true
    }
}

fn ensure_worker(shared: &Arc<CleanerShared>) {
    if shared.worker.load(Ordering::SeqCst) != 0 {
        return;
    }
    let generation = shared.generations.fetch_add(1, Ordering::Relaxed) + 1;
    if shared
        .worker
        .compare_exchange(0, generation, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return;
    }

    let worker_shared = Arc::clone(shared);
    let spawned = thread::Builder::new()
        .name(format!("{}-{generation}", shared.name))
        .spawn(move || run_worker(&worker_shared, generation));
    if let Err(e) = spawned {
        error!(generation, error = %e, "failed to spawn reference cleaner worker");
        let _ = shared
            .worker
            .compare_exchange(generation, 0, Ordering::SeqCst, Ordering::SeqCst);
    }
}

/// Worker loop. Returns once the slot has been handed back.
fn run_worker(shared: &CleanerShared, generation: u64) {
    shared.workers_started.fetch_add(1, Ordering::SeqCst);
    debug!(generation, "reference cleaner worker started");

    loop {
        while !shared.watches.lock().is_empty() {
            let Ok(signal) = shared.rx.recv() else {
                // Unreachable while `shared` holds a sender.
                release_slot(shared, generation);
                return;
            };
            if !handle(shared, signal, generation) {
                release_slot(shared, generation);
                return;
            }
        }

        // Consume whatever is still queued, including signals for watches that
        // were registered after the emptiness check.
        while let Ok(signal) = shared.rx.try_recv() {
            if !handle(shared, signal, generation) {
                release_slot(shared, generation);
                return;
            }
        }
        if !shared.watches.lock().is_empty() {
            continue;
        }

        if !release_slot(shared, generation) {
            return;
        }
        if shared.watches.lock().is_empty() {
            debug!(generation, "reference cleaner worker idle, exiting");
            return;
        }
        // A registration arrived between the check and the release. Take the
        // slot back unless it already started a worker of its own.
        if shared
            .worker
            .compare_exchange(0, generation, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(generation, "newer worker took over, exiting");
            return;
        }
    }
}

fn release_slot(shared: &CleanerShared, generation: u64) -> bool {
    shared
        .worker
        .compare_exchange(generation, 0, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
}

/// Process one signal. Returns `false` if the worker must exit.
fn handle(shared: &CleanerShared, signal: Signal, generation: u64) -> bool {
    match signal {
        Signal::Dead(id) => {
            let action = shared.watches.lock().remove(&id);
            match action {
                Some(action) => run_action(id, action),
                None => trace!(watch = %id, "dead watch already cancelled"),
            }
            true
        }
        Signal::Recheck => true,
        Signal::Interrupt(target) if target == generation => {
            debug!(generation, "reference cleaner worker interrupted");
            false
        }
        Signal::Interrupt(_) => true,
    }
}

fn run_action(id: WatchId, action: Action) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(action)) {
        let err = CleanupError::ActionPanicked {
            watch: id.to_string(),
            message: panic_message(payload.as_ref()),
        };
        error!(error = %err, "reference cleaner action failed");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
