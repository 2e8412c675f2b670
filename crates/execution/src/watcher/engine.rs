//! Snapshot/subscription race resolution.
//!
//! Each call to [`BalanceWatcher::watch`] spawns one session task that:
//! - resolves the target into the account to watch
//! - runs the snapshot query and the subscription concurrently
//! - publishes only updates newer than the last published slot
//! - stops publishing as soon as the handle is cancelled

use super::session::{WatchCanceller, WatchSession, Workflow};
use async_trait::async_trait;
use balance_watch_domain::{BalanceUpdate, WatchError};
use futures::stream::{self, BoxStream};
use futures::{FutureExt, Stream, StreamExt};
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Slot-tagged updates pushed by a subscription.
pub type UpdateStream<V> = BoxStream<'static, Result<BalanceUpdate<V>, WatchError>>;

/// What a watcher observes and how.
#[async_trait]
pub trait BalanceSource: Send + Sync + 'static {
    /// Identity supplied by the caller.
    type Target: fmt::Debug + Send + Sync + 'static;
    /// Validated identity the queries run against.
    type Account: fmt::Display + Clone + Send + Sync + 'static;
    /// Balance value delivered to the callback.
    type Value: Send + 'static;

    /// Validates or derives the account to watch. Performs no I/O.
    fn resolve(&self, target: &Self::Target) -> Result<Self::Account, WatchError>;

    /// Queries the current balance.
    async fn snapshot(
        &self,
        account: &Self::Account,
    ) -> Result<BalanceUpdate<Self::Value>, WatchError>;

    /// Establishes the push subscription.
    async fn subscribe(
        &self,
        account: &Self::Account,
        cancel: CancellationToken,
    ) -> Result<UpdateStream<Self::Value>, WatchError>;
}

/// Handle to a running watch session.
///
/// Dropping the handle leaves the session running; call [`WatchHandle::cancel`]
/// to stop it.
#[derive(Debug)]
pub struct WatchHandle {
    canceller: WatchCanceller,
    task: JoinHandle<()>,
}

impl WatchHandle {
    /// Stops the session. No callback starts after this returns; repeated
    /// calls have no further effect. If the callback is running on another
    /// thread, waits for it to return.
    pub fn cancel(&self) {
        if !self.canceller.is_cancelled() {
            debug!("Cancelling watch session");
        }
        self.canceller.cancel();
    }

    /// Whether the session has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.canceller.is_cancelled()
    }

    /// Token cancelled once the session is cancelled.
    ///
    /// Cancelling the returned token does not stop the session; use
    /// [`WatchHandle::canceller`] for that.
    pub fn token(&self) -> CancellationToken {
        self.canceller.token().child_token()
    }

    /// Cancels this session from elsewhere, e.g. after the handle was moved
    /// into [`WatchHandle::join`].
    pub fn canceller(&self) -> WatchCanceller {
        self.canceller.clone()
    }

    /// Whether the session task has settled.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the session task to settle.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            if e.is_panic() {
                warn!(error = %e, "Watch session panicked");
            }
        }
    }
}

/// Delivers slot-ordered balance updates from a [`BalanceSource`].
pub struct BalanceWatcher<S> {
    source: Arc<S>,
}

impl<S> Clone for BalanceWatcher<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
        }
    }
}

impl<S: BalanceSource> BalanceWatcher<S> {
    /// Creates a new watcher.
    pub fn new(source: S) -> Self {
        Self::from_arc(Arc::new(source))
    }

    /// Creates a watcher over a shared source.
    pub fn from_arc(source: Arc<S>) -> Self {
        Self { source }
    }

    /// Gets the source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Starts watching `target`.
    ///
    /// Returns immediately; `callback` is invoked from the session task with
    /// either a newer balance or a failure. Must be called inside a tokio
    /// runtime.
    pub fn watch<F>(&self, target: S::Target, callback: F) -> WatchHandle
    where
        F: FnMut(Result<S::Value, WatchError>) + Send + 'static,
    {
        let canceller = WatchCanceller::new();
        let session = WatchSession::new(canceller.clone(), callback);
        let task = tokio::spawn(run_session(Arc::clone(&self.source), target, session));
        WatchHandle { canceller, task }
    }
}

async fn run_session<S, F>(source: Arc<S>, target: S::Target, mut session: WatchSession<F>)
where
    S: BalanceSource,
    F: FnMut(Result<S::Value, WatchError>) + Send + 'static,
{
    let account = match source.resolve(&target) {
        Ok(account) => account,
        Err(e) => {
            session.fail::<S::Value>(Workflow::Resolve, e);
            return;
        }
    };
    let cancel = session.token().clone();
    info!(watch_target = ?target, account = %account, "Watch session started");

    let snapshot = {
        let source = Arc::clone(&source);
        let account = account.clone();
        let cancel = cancel.clone();
        stream::once(async move { until_cancelled(&cancel, source.snapshot(&account)).await })
            .map(|result| (Workflow::Snapshot, result))
            .boxed()
    };

    let subscription = {
        let source = Arc::clone(&source);
        let account = account.clone();
        let cancel = cancel.clone();
        stream::once(async move {
            until_cancelled(&cancel, source.subscribe(&account, cancel.clone())).await
        })
        .flat_map(|established| match established {
            Ok(updates) => stop_after_error(
                AssertUnwindSafe(updates)
                    .catch_unwind()
                    .map(|item| item.unwrap_or_else(|payload| Err(panic_error(payload)))),
            )
            .boxed(),
            Err(e) => stream::once(futures::future::ready(Err(e))).boxed(),
        })
        .map(|result| (Workflow::Subscription, result))
        .boxed()
    };

    let mut events = stream::select(snapshot, subscription);
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = events.next() => next,
        };

        match next {
            Some((workflow, Ok(update))) => {
                session.offer(workflow, update);
            }
            Some((workflow, Err(e))) => {
                session.fail::<S::Value>(workflow, e);
            }
            None => break,
        }
    }

    info!(
        account = %account,
        cancelled = session.is_cancelled(),
        last_published = ?session.last_published(),
        "Watch session finished"
    );
}

/// Runs `fut`, turning cancellation into [`WatchError::Cancelled`] and a
/// panic into [`WatchError::Panicked`].
async fn until_cancelled<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, WatchError>>,
) -> Result<T, WatchError> {
    let fut = AssertUnwindSafe(fut).catch_unwind();
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(WatchError::Cancelled),
        outcome = fut => outcome.unwrap_or_else(|payload| Err(panic_error(payload))),
    }
}

/// Ends the stream after its first error, dropping the inner stream.
fn stop_after_error<T, S>(inner: S) -> impl Stream<Item = Result<T, WatchError>>
where
    S: Stream<Item = Result<T, WatchError>> + Unpin,
{
    stream::unfold(Some(inner), |state| async move {
        let Some(mut inner) = state else {
            return None;
        };
        let item = inner.next().await?;
        let next = if item.is_ok() { Some(inner) } else { None };
        Some((item, next))
    })
}

fn panic_error(payload: Box<dyn Any + Send>) -> WatchError {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    };
    WatchError::Panicked(message)
}
