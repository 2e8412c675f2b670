//! Per-watch ordering and cancellation state.

use balance_watch_domain::{BalanceUpdate, Slot, WatchError};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Workflow that produced a candidate update or failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workflow {
    /// Target validation and derivation.
    Resolve,
    /// One-shot balance query.
    Snapshot,
    /// Push subscription.
    Subscription,
}

impl fmt::Display for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Workflow::Resolve => write!(f, "resolve"),
            Workflow::Snapshot => write!(f, "snapshot"),
            Workflow::Subscription => write!(f, "subscription"),
        }
    }
}

/// What happened to an offered update or failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The callback was invoked.
    Published,
    /// The update was not newer than the last published slot.
    Stale,
    /// The session is cancelled or the failure is cancellation noise.
    Suppressed,
}

/// Cancels a watch session.
///
/// Callbacks run under the same lock that [`WatchCanceller::cancel`] takes,
/// so once `cancel` returns no callback is running on another thread and none
/// will start.
#[derive(Debug, Clone, Default)]
pub struct WatchCanceller {
    inner: Arc<CancellerInner>,
}

#[derive(Debug, Default)]
struct CancellerInner {
    token: CancellationToken,
    delivery: Mutex<()>,
    /// Thread currently running the callback, if any.
    delivering_on: Mutex<Option<ThreadId>>,
}

impl WatchCanceller {
    /// Creates a canceller for a new session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the session; repeated calls have no further effect.
    ///
    /// Blocks while a callback runs on another thread. Called from inside the
    /// callback itself it returns immediately.
    pub fn cancel(&self) {
        if *lock(&self.inner.delivering_on) == Some(thread::current().id()) {
            self.inner.token.cancel();
            return;
        }
        let _delivery = lock(&self.inner.delivery);
        self.inner.token.cancel();
    }

    /// Whether [`WatchCanceller::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Token cancelled together with the session.
    pub fn token(&self) -> &CancellationToken {
        &self.inner.token
    }

    /// Runs `deliver` unless the session is cancelled. Returns whether it ran.
    fn deliver(&self, deliver: impl FnOnce()) -> bool {
        let _delivery = lock(&self.inner.delivery);
        if self.inner.token.is_cancelled() {
            return false;
        }
        let _delivering = DeliveringOn::enter(&self.inner.delivering_on);
        deliver();
        true
    }
}

/// Marks the current thread as running the callback until dropped.
struct DeliveringOn<'a>(&'a Mutex<Option<ThreadId>>);

impl<'a> DeliveringOn<'a> {
    fn enter(slot: &'a Mutex<Option<ThreadId>>) -> Self {
        *lock(slot) = Some(thread::current().id());
        Self(slot)
    }
}

impl Drop for DeliveringOn<'_> {
    fn drop(&mut self) {
        *lock(self.0) = None;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State of one watch: last published slot, cancellation and the callback.
pub struct WatchSession<F> {
    last_published: Option<Slot>,
    canceller: WatchCanceller,
    callback: F,
}

impl<F> WatchSession<F> {
    /// Creates a session that stops publishing once `canceller` is cancelled.
    pub fn new(canceller: WatchCanceller, callback: F) -> Self {
        Self {
            last_published: None,
            canceller,
            callback,
        }
    }

    /// Slot of the last value handed to the callback.
    pub fn last_published(&self) -> Option<Slot> {
        self.last_published
    }

    /// Whether the session has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.canceller.is_cancelled()
    }

    /// Token raced against every suspension point of the session.
    pub fn token(&self) -> &CancellationToken {
        self.canceller.token()
    }

    /// Publishes `update` if it is strictly newer than anything published so far.
    pub fn offer<V>(&mut self, workflow: Workflow, update: BalanceUpdate<V>) -> Delivery
    where
        F: FnMut(Result<V, WatchError>),
    {
        if self.is_cancelled() {
            return Delivery::Suppressed;
        }

        if !update.is_newer_than(self.last_published) {
            debug!(
                workflow = %workflow,
                slot = update.slot,
                last_published = ?self.last_published,
                "Discarding stale balance update"
            );
            return Delivery::Stale;
        }

        debug!(workflow = %workflow, slot = update.slot, "Publishing balance update");
        let slot = update.slot;
        let callback = &mut self.callback;
        if !self.canceller.deliver(|| callback(Ok(update.value))) {
            return Delivery::Suppressed;
        }
        self.last_published = Some(slot);
        Delivery::Published
    }

    /// Surfaces `error` unless it is cancellation noise.
    pub fn fail<V>(&mut self, workflow: Workflow, error: WatchError) -> Delivery
    where
        F: FnMut(Result<V, WatchError>),
    {
        if self.is_cancelled() || error.is_cancellation() {
            debug!(workflow = %workflow, error = %error, "Suppressing cancellation failure");
            return Delivery::Suppressed;
        }

        warn!(workflow = %workflow, error = %error, "Watch workflow failed");
        let callback = &mut self.callback;
        if !self.canceller.deliver(|| callback(Err(error))) {
            return Delivery::Suppressed;
        }
        Delivery::Published
    }
}
