//! Native (lamport) balance watching.

use super::engine::{BalanceSource, BalanceWatcher, UpdateStream};
use async_trait::async_trait;
use balance_watch_domain::{BalanceUpdate, WatchError};
use balance_watch_protocols::parse_address;
use balance_watch_protocols::rpc::BalanceRpc;
use futures::StreamExt;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Lamport balance of a single address.
pub struct NativeBalanceSource {
    rpc: Arc<dyn BalanceRpc>,
}

impl NativeBalanceSource {
    /// Creates a new native balance source.
    pub fn new(rpc: Arc<dyn BalanceRpc>) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl BalanceSource for NativeBalanceSource {
    type Target = String;
    type Account = Pubkey;
    type Value = u64;

    fn resolve(&self, target: &String) -> Result<Pubkey, WatchError> {
        parse_address("address", target)
    }

    async fn snapshot(&self, account: &Pubkey) -> Result<BalanceUpdate<u64>, WatchError> {
        self.rpc.native_balance(account).await
    }

    async fn subscribe(
        &self,
        account: &Pubkey,
        cancel: CancellationToken,
    ) -> Result<UpdateStream<u64>, WatchError> {
        let notifications = self.rpc.account_notifications(account, cancel).await?;
        Ok(notifications
            .map(|notification| {
                notification.map(|n| BalanceUpdate::new(n.lamports, n.slot))
            })
            .boxed())
    }
}

/// Watcher for native balances.
pub type NativeBalanceWatcher = BalanceWatcher<NativeBalanceSource>;

impl BalanceWatcher<NativeBalanceSource> {
    /// Creates a native balance watcher over `rpc`.
    pub fn native(rpc: Arc<dyn BalanceRpc>) -> Self {
        Self::new(NativeBalanceSource::new(rpc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::testing::{MockRpc, collector};

    #[tokio::test]
    async fn test_snapshot_then_notifications() {
        let rpc = MockRpc::new();
        let address = Pubkey::new_unique();
        rpc.native_reply(Ok(BalanceUpdate::new(1_000, 5)));

        let watcher = NativeBalanceWatcher::native(rpc.clone());
        let (callback, mut events) = collector::<u64>();
        let handle = watcher.watch(address.to_string(), callback);

        assert_eq!(events.recv().await.unwrap().unwrap(), 1_000);

        rpc.notify(3, 900);
        rpc.notify(7, 1_500);
        assert_eq!(events.recv().await.unwrap().unwrap(), 1_500);

        handle.cancel();
        rpc.notify(9, 2_000);
        handle.join().await;

        assert!(events.recv().await.is_none());
        assert_eq!(rpc.subscribed(), vec![address]);
    }

    #[tokio::test]
    async fn test_unfunded_account_reports_zero() {
        let rpc = MockRpc::new();
        rpc.native_reply(Ok(BalanceUpdate::new(0, 12)));

        let watcher = NativeBalanceWatcher::native(rpc.clone());
        let (callback, mut events) = collector::<u64>();
        let handle = watcher.watch(Pubkey::new_unique().to_string(), callback);

        assert_eq!(events.recv().await.unwrap().unwrap(), 0);
        handle.cancel();
        handle.join().await;
    }

    #[tokio::test]
    async fn test_malformed_address() {
        let rpc = MockRpc::new();
        let watcher = NativeBalanceWatcher::native(rpc.clone());
        let (callback, mut events) = collector::<u64>();

        let handle = watcher.watch("definitely not base58!".to_string(), callback);
        handle.join().await;

        match events.recv().await.unwrap() {
            Err(WatchError::MalformedIdentity { field, .. }) => assert_eq!(field, "address"),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(events.recv().await.is_none());
        assert!(rpc.subscribed().is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_surfaces() {
        let rpc = MockRpc::new();
        rpc.native_reply(Err(WatchError::transport("503 service unavailable")));

        let watcher = NativeBalanceWatcher::native(rpc.clone());
        let (callback, mut events) = collector::<u64>();
        let handle = watcher.watch(Pubkey::new_unique().to_string(), callback);

        assert!(matches!(
            events.recv().await.unwrap(),
            Err(WatchError::Transport(_))
        ));

        rpc.notify(4, 250);
        assert_eq!(events.recv().await.unwrap().unwrap(), 250);

        rpc.notify_error(WatchError::transport("account subscription closed by server"));
        assert!(matches!(
            events.recv().await.unwrap(),
            Err(WatchError::Transport(_))
        ));
        handle.join().await;
        assert!(events.recv().await.is_none());
    }
}
