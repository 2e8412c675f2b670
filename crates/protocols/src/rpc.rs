//! RPC access for balance snapshots and account subscriptions.

use async_trait::async_trait;
use balance_watch_domain::{BalanceUpdate, TokenBalance, WatchError};
use futures::StreamExt;
use futures::stream::BoxStream;
use solana_account_decoder_client_types::{UiAccountEncoding, UiDataSliceConfig};
use solana_client::nonblocking::pubsub_client::PubsubClient;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcAccountInfoConfig;
use solana_commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Account change pushed by a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountNotification {
    /// Slot of the change.
    pub slot: u64,
    /// Lamports held by the account after the change.
    pub lamports: u64,
}

/// Stream of account notifications. Ends once the subscription is torn down.
pub type NotificationStream = BoxStream<'static, Result<AccountNotification, WatchError>>;

/// Balance queries and account subscriptions used by the watchers.
#[async_trait]
pub trait BalanceRpc: Send + Sync {
    /// Lamport balance of `address`. Unfunded accounts report zero.
    async fn native_balance(&self, address: &Pubkey) -> Result<BalanceUpdate<u64>, WatchError>;

    /// Token balance held at `address`.
    ///
    /// `None` means the account did not exist at the returned slot.
    async fn token_balance(
        &self,
        address: &Pubkey,
    ) -> Result<BalanceUpdate<Option<TokenBalance>>, WatchError>;

    /// Decimals configured on `mint`.
    async fn mint_decimals(&self, mint: &Pubkey) -> Result<u8, WatchError>;

    /// Subscribes to changes of `address`.
    ///
    /// The stream stops yielding once `cancel` fires or the stream is dropped.
    async fn account_notifications(
        &self,
        address: &Pubkey,
        cancel: CancellationToken,
    ) -> Result<NotificationStream, WatchError>;
}

/// Errors raised while building an [`RpcConfig`].
#[derive(Debug, Error)]
pub enum RpcConfigError {
    /// Commitment level not recognised.
    #[error("invalid commitment level: {0}")]
    InvalidCommitment(String),
    /// A numeric setting could not be parsed.
    #[error("invalid value for {key}: {value}")]
    InvalidNumber { key: &'static str, value: String },
    /// No websocket URL can be derived from the RPC URL.
    #[error("cannot derive websocket url from '{0}'")]
    UnsupportedScheme(String),
}

/// Configuration for the RPC provider.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// HTTP JSON-RPC endpoint.
    pub rpc_url: String,
    /// Websocket endpoint for subscriptions.
    pub ws_url: String,
    /// Commitment used for queries and subscriptions.
    pub commitment: CommitmentConfig,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Buffered notifications per subscription.
    pub notification_buffer: usize,
    /// Set when `ws_url` was given explicitly rather than derived.
    ws_url_pinned: bool,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            ws_url: "wss://api.mainnet-beta.solana.com".to_string(),
            commitment: CommitmentConfig::confirmed(),
            timeout_secs: 30,
            notification_buffer: 256,
            ws_url_pinned: false,
        }
    }
}

impl RpcConfig {
    /// Reads `SOLANA_RPC_URL`, `SOLANA_WS_URL`, `SOLANA_COMMITMENT` and
    /// `SOLANA_RPC_TIMEOUT_SECS`, falling back to defaults.
    pub fn from_env() -> Result<Self, RpcConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`RpcConfig::from_env`] with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, RpcConfigError> {
        let defaults = Self::default();

        let rpc_url = lookup("SOLANA_RPC_URL").unwrap_or(defaults.rpc_url);
        let (ws_url, ws_url_pinned) = match lookup("SOLANA_WS_URL") {
            Some(url) => (url, true),
            None => (ws_url_for(&rpc_url)?, false),
        };
        let commitment = match lookup("SOLANA_COMMITMENT") {
            Some(level) => CommitmentConfig::from_str(&level)
                .map_err(|_| RpcConfigError::InvalidCommitment(level))?,
            None => defaults.commitment,
        };
        let timeout_secs = match lookup("SOLANA_RPC_TIMEOUT_SECS") {
            Some(value) => value
                .parse::<u64>()
                .map_err(|_| RpcConfigError::InvalidNumber {
                    key: "SOLANA_RPC_TIMEOUT_SECS",
                    value,
                })?,
            None => defaults.timeout_secs,
        };

        Ok(Self {
            rpc_url,
            ws_url,
            commitment,
            timeout_secs,
            notification_buffer: defaults.notification_buffer,
            ws_url_pinned,
        })
    }

    /// Points the config at `rpc_url`. The websocket URL is derived from it
    /// unless one was set explicitly.
    pub fn with_rpc_url(mut self, rpc_url: impl Into<String>) -> Result<Self, RpcConfigError> {
        self.rpc_url = rpc_url.into();
        if !self.ws_url_pinned {
            self.ws_url = ws_url_for(&self.rpc_url)?;
        }
        Ok(self)
    }

    /// Overrides the websocket URL. Later RPC URL changes keep it.
    #[must_use]
    pub fn with_ws_url(mut self, ws_url: impl Into<String>) -> Self {
        self.ws_url = ws_url.into();
        self.ws_url_pinned = true;
        self
    }
}

/// Maps an HTTP(S) RPC URL to the matching websocket URL.
pub fn ws_url_for(rpc_url: &str) -> Result<String, RpcConfigError> {
    if let Some(rest) = rpc_url.strip_prefix("https://") {
        Ok(format!("wss://{rest}"))
    } else if let Some(rest) = rpc_url.strip_prefix("http://") {
        Ok(format!("ws://{rest}"))
    } else {
        Err(RpcConfigError::UnsupportedScheme(rpc_url.to_string()))
    }
}

/// Solana JSON-RPC and websocket provider.
pub struct RpcProvider {
    /// Configuration.
    config: RpcConfig,
    /// Nonblocking HTTP client.
    client: RpcClient,
}

impl RpcProvider {
    /// Creates a new provider. No connection is made until the first request.
    pub fn new(config: RpcConfig) -> Self {
        let client = RpcClient::new_with_timeout_and_commitment(
            config.rpc_url.clone(),
            Duration::from_secs(config.timeout_secs),
            config.commitment,
        );
        Self { config, client }
    }

    /// Gets the configuration.
    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    fn subscription_config(&self) -> RpcAccountInfoConfig {
        // Only lamports and the slot are read from notifications.
        RpcAccountInfoConfig {
            encoding: Some(UiAccountEncoding::Base64),
            data_slice: Some(UiDataSliceConfig {
                offset: 0,
                length: 0,
            }),
            commitment: Some(self.config.commitment),
            min_context_slot: None,
        }
    }
}

impl Default for RpcProvider {
    fn default() -> Self {
        Self::new(RpcConfig::default())
    }
}

#[async_trait]
impl BalanceRpc for RpcProvider {
    async fn native_balance(&self, address: &Pubkey) -> Result<BalanceUpdate<u64>, WatchError> {
        let response = self
            .client
            .get_balance_with_commitment(address, self.config.commitment)
            .await
            .map_err(WatchError::transport)?;

        debug!(
            address = %address,
            slot = response.context.slot,
            lamports = response.value,
            "Fetched native balance"
        );
        Ok(BalanceUpdate::new(response.value, response.context.slot))
    }

    async fn token_balance(
        &self,
        address: &Pubkey,
    ) -> Result<BalanceUpdate<Option<TokenBalance>>, WatchError> {
        let commitment = self.config.commitment;

        match self
            .client
            .get_token_account_balance_with_commitment(address, commitment)
            .await
        {
            Ok(response) => {
                let balance = TokenBalance::parse(&response.value.amount, response.value.decimals)?;
                debug!(
                    address = %address,
                    slot = response.context.slot,
                    amount = balance.amount,
                    "Fetched token balance"
                );
                Ok(BalanceUpdate::new(Some(balance), response.context.slot))
            }
            Err(err) => {
                // The balance call cannot tell a missing account apart from
                // other failures, so ask for the account itself.
                let probe = self
                    .client
                    .get_account_with_commitment(address, commitment)
                    .await
                    .map_err(WatchError::transport)?;

                if probe.value.is_none() {
                    debug!(
                        address = %address,
                        slot = probe.context.slot,
                        "Token account does not exist"
                    );
                    Ok(BalanceUpdate::new(None, probe.context.slot))
                } else {
                    Err(WatchError::transport(err))
                }
            }
        }
    }

    async fn mint_decimals(&self, mint: &Pubkey) -> Result<u8, WatchError> {
        let response = self
            .client
            .get_token_supply_with_commitment(mint, self.config.commitment)
            .await
            .map_err(WatchError::transport)?;
        Ok(response.value.decimals)
    }

    async fn account_notifications(
        &self,
        address: &Pubkey,
        cancel: CancellationToken,
    ) -> Result<NotificationStream, WatchError> {
        let (tx, rx) = mpsc::channel(self.config.notification_buffer.max(1));
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), WatchError>>();
        let ws_url = self.config.ws_url.clone();
        let account_config = self.subscription_config();
        let address = *address;

        tokio::spawn(async move {
            let client = match PubsubClient::new(&ws_url).await {
                Ok(client) => client,
                Err(e) => {
                    let _ = ready_tx.send(Err(WatchError::transport(e)));
                    return;
                }
            };

            let (mut stream, unsubscribe) =
                match client.account_subscribe(&address, Some(account_config)).await {
                    Ok(subscription) => subscription,
                    Err(e) => {
                        let _ = ready_tx.send(Err(WatchError::transport(e)));
                        return;
                    }
                };

            if ready_tx.send(Ok(())).is_err() {
                // Caller went away while we were connecting.
                drop(stream);
                unsubscribe().await;
                return;
            }
            info!(address = %address, ws_url = %ws_url, "Account subscription established");

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tx.closed() => break,
                    next = stream.next() => match next {
                        Some(response) => {
                            let notification = AccountNotification {
                                slot: response.context.slot,
                                lamports: response.value.lamports,
                            };
                            if tx.send(Ok(notification)).await.is_err() {
                                break;
                            }
                        }
                        None => {
                            warn!(address = %address, "Account subscription closed by server");
                            let closed = WatchError::transport("account subscription closed by server");
                            let _ = tx.send(Err(closed)).await;
                            break;
                        }
                    },
                }
            }

            drop(stream);
            unsubscribe().await;
            if let Err(e) = client.shutdown().await {
                debug!(address = %address, error = %e, "Pubsub shutdown failed");
            }
            debug!(address = %address, "Account subscription torn down");
        });

        match ready_rx.await {
            Ok(Ok(())) => Ok(ReceiverStream::new(rx).boxed()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(WatchError::transport("subscription task ended before connecting")),
        }
    }
}
