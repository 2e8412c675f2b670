//! In-memory collaborators for watcher tests.

use super::engine::{BalanceSource, UpdateStream};
use async_trait::async_trait;
use balance_watch_domain::{BalanceUpdate, TokenBalance, WatchError};
use balance_watch_protocols::rpc::{AccountNotification, BalanceRpc, NotificationStream};
use futures::StreamExt;
use futures::channel::{mpsc, oneshot};
use solana_sdk::pubkey::Pubkey;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

type Reply = Result<BalanceUpdate<u64>, WatchError>;

/// Collects callback invocations into a channel.
pub fn collector<V: Send + 'static>() -> (
    impl FnMut(Result<V, WatchError>) + Send + 'static,
    tokio::sync::mpsc::UnboundedReceiver<Result<V, WatchError>>,
) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let callback = move |event| {
        let _ = tx.send(event);
    };
    (callback, rx)
}

/// Source whose snapshot and subscription are driven by a [`Script`].
pub struct ScriptedSource {
    snapshot: Mutex<Option<oneshot::Receiver<Reply>>>,
    updates: Mutex<Option<mpsc::UnboundedReceiver<Reply>>>,
    subscribe_error: Mutex<Option<WatchError>>,
    panic_on_snapshot: bool,
    panic_on_update: bool,
}

/// Test-side controls of a [`ScriptedSource`].
pub struct Script {
    snapshot: Mutex<Option<oneshot::Sender<Reply>>>,
    updates: Mutex<Option<mpsc::UnboundedSender<Reply>>>,
}

impl ScriptedSource {
    pub fn new() -> (Self, Script) {
        let (snapshot_tx, snapshot_rx) = oneshot::channel();
        let (updates_tx, updates_rx) = mpsc::unbounded();
        let source = Self {
            snapshot: Mutex::new(Some(snapshot_rx)),
            updates: Mutex::new(Some(updates_rx)),
            subscribe_error: Mutex::new(None),
            panic_on_snapshot: false,
            panic_on_update: false,
        };
        let script = Script {
            snapshot: Mutex::new(Some(snapshot_tx)),
            updates: Mutex::new(Some(updates_tx)),
        };
        (source, script)
    }

    pub fn failing_subscribe(error: WatchError) -> (Self, Script) {
        let (source, script) = Self::new();
        *source.subscribe_error.lock().unwrap() = Some(error);
        (source, script)
    }

    pub fn panicking_snapshot() -> (Self, Script) {
        let (mut source, script) = Self::new();
        source.panic_on_snapshot = true;
        (source, script)
    }

    /// Subscription whose stream panics on the first pushed update.
    pub fn panicking_subscription() -> (Self, Script) {
        let (mut source, script) = Self::new();
        source.panic_on_update = true;
        (source, script)
    }
}

impl Script {
    pub fn snapshot(&self, update: BalanceUpdate<u64>) {
        if let Some(tx) = self.snapshot.lock().unwrap().take() {
            let _ = tx.send(Ok(update));
        }
    }

    pub fn snapshot_error(&self, error: WatchError) {
        if let Some(tx) = self.snapshot.lock().unwrap().take() {
            let _ = tx.send(Err(error));
        }
    }

    pub fn push(&self, update: BalanceUpdate<u64>) {
        self.try_push(update);
    }

    /// Returns false once the subscription has been dropped by the session.
    pub fn try_push(&self, update: BalanceUpdate<u64>) -> bool {
        self.send(Ok(update))
    }

    pub fn push_error(&self, error: WatchError) {
        self.send(Err(error));
    }

    /// Ends the subscription stream.
    pub fn close(&self) {
        self.updates.lock().unwrap().take();
    }

    fn send(&self, reply: Reply) -> bool {
        match self.updates.lock().unwrap().as_ref() {
            Some(tx) => tx.unbounded_send(reply).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl BalanceSource for ScriptedSource {
    type Target = &'static str;
    type Account = String;
    type Value = u64;

    fn resolve(&self, target: &Self::Target) -> Result<String, WatchError> {
        if target.starts_with("bad") {
            return Err(WatchError::malformed("address", *target, "invalid base58"));
        }
        Ok(target.to_string())
    }

    async fn snapshot(&self, _account: &String) -> Reply {
        if self.panic_on_snapshot {
            panic!("snapshot exploded");
        }
        let rx = self.snapshot.lock().unwrap().take();
        match rx {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| Err(WatchError::transport("snapshot script dropped"))),
            None => Err(WatchError::transport("snapshot requested twice")),
        }
    }

    async fn subscribe(
        &self,
        _account: &String,
        _cancel: CancellationToken,
    ) -> Result<UpdateStream<u64>, WatchError> {
        if let Some(error) = self.subscribe_error.lock().unwrap().take() {
            return Err(error);
        }
        let rx = self
            .updates
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| WatchError::transport("subscribed twice"))?;
        if self.panic_on_update {
            return Ok(rx
                .map(|_| -> Reply { panic!("notification handler exploded") })
                .boxed());
        }
        Ok(rx.boxed())
    }
}

/// Scripted [`BalanceRpc`] recording the addresses it is asked about.
pub struct MockRpc {
    native: Mutex<VecDeque<Result<BalanceUpdate<u64>, WatchError>>>,
    token: Mutex<VecDeque<Result<BalanceUpdate<Option<TokenBalance>>, WatchError>>>,
    mint_decimals: Mutex<Option<u8>>,
    notifier: Mutex<Option<mpsc::UnboundedSender<Result<AccountNotification, WatchError>>>>,
    notifications: Mutex<Option<mpsc::UnboundedReceiver<Result<AccountNotification, WatchError>>>>,
    subscribed: Mutex<Vec<Pubkey>>,
    token_queries: Mutex<Vec<Pubkey>>,
    mint_queries: Mutex<Vec<Pubkey>>,
}

impl MockRpc {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded();
        Arc::new(Self {
            native: Mutex::new(VecDeque::new()),
            token: Mutex::new(VecDeque::new()),
            mint_decimals: Mutex::new(None),
            notifier: Mutex::new(Some(tx)),
            notifications: Mutex::new(Some(rx)),
            subscribed: Mutex::new(Vec::new()),
            token_queries: Mutex::new(Vec::new()),
            mint_queries: Mutex::new(Vec::new()),
        })
    }

    pub fn native_reply(&self, reply: Result<BalanceUpdate<u64>, WatchError>) {
        self.native.lock().unwrap().push_back(reply);
    }

    pub fn token_reply(&self, reply: Result<BalanceUpdate<Option<TokenBalance>>, WatchError>) {
        self.token.lock().unwrap().push_back(reply);
    }

    pub fn set_mint_decimals(&self, decimals: u8) {
        *self.mint_decimals.lock().unwrap() = Some(decimals);
    }

    pub fn clear_mint_decimals(&self) {
        *self.mint_decimals.lock().unwrap() = None;
    }

    pub fn notify(&self, slot: u64, lamports: u64) {
        self.send(Ok(AccountNotification { slot, lamports }));
    }

    pub fn notify_error(&self, error: WatchError) {
        self.send(Err(error));
    }

    pub fn close_notifications(&self) {
        self.notifier.lock().unwrap().take();
    }

    pub fn subscribed(&self) -> Vec<Pubkey> {
        self.subscribed.lock().unwrap().clone()
    }

    pub fn token_queries(&self) -> Vec<Pubkey> {
        self.token_queries.lock().unwrap().clone()
    }

    pub fn mint_queries(&self) -> Vec<Pubkey> {
        self.mint_queries.lock().unwrap().clone()
    }

    fn send(&self, item: Result<AccountNotification, WatchError>) {
        if let Some(tx) = self.notifier.lock().unwrap().as_ref() {
            let _ = tx.unbounded_send(item);
        }
    }
}

#[async_trait]
impl BalanceRpc for MockRpc {
    async fn native_balance(&self, _address: &Pubkey) -> Result<BalanceUpdate<u64>, WatchError> {
        self.native
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(WatchError::transport("no scripted native balance")))
    }

    async fn token_balance(
        &self,
        address: &Pubkey,
    ) -> Result<BalanceUpdate<Option<TokenBalance>>, WatchError> {
        self.token_queries.lock().unwrap().push(*address);
        self.token
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(WatchError::transport("no scripted token balance")))
    }

    async fn mint_decimals(&self, mint: &Pubkey) -> Result<u8, WatchError> {
        self.mint_queries.lock().unwrap().push(*mint);
        self.mint_decimals
            .lock()
            .unwrap()
            .ok_or_else(|| WatchError::transport("mint not found"))
    }

    async fn account_notifications(
        &self,
        address: &Pubkey,
        cancel: CancellationToken,
    ) -> Result<NotificationStream, WatchError> {
        self.subscribed.lock().unwrap().push(*address);
        let rx = self
            .notifications
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| WatchError::transport("subscribed twice"))?;
        Ok(rx.take_until(cancel.cancelled_owned()).boxed())
    }
}
