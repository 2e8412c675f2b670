//! Token balance watching on the owner's associated token account.
//!
//! Account notifications do not carry parsed token amounts, so every
//! notification triggers a fresh balance query whose own slot is what gets
//! ordered. A token account that does not exist yet reads as a zero balance.

use super::engine::{BalanceSource, BalanceWatcher, UpdateStream};
use async_trait::async_trait;
use balance_watch_domain::{BalanceUpdate, TokenBalance, TokenProgram, WatchError};
use balance_watch_protocols::parse_address;
use balance_watch_protocols::rpc::BalanceRpc;
use balance_watch_protocols::token_account::derive_token_account;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Where the decimals of a not-yet-created token account come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingAccountDecimals {
    /// Read the mint's decimals.
    #[default]
    FromMint,
    /// Use a fixed value without querying the mint.
    Fixed(u8),
}

/// Configuration for token balance watching.
#[derive(Debug, Clone, Default)]
pub struct TokenWatchConfig {
    /// Decimals reported for a missing token account.
    pub missing_account_decimals: MissingAccountDecimals,
}

/// Owner, mint and program family identifying a token holding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTarget {
    /// Wallet address owning the token account.
    pub owner: String,
    /// Token mint address.
    pub mint: String,
    /// Token program family the mint belongs to.
    pub program: TokenProgram,
}

impl TokenTarget {
    /// Creates a new target.
    pub fn new(owner: impl Into<String>, mint: impl Into<String>, program: TokenProgram) -> Self {
        Self {
            owner: owner.into(),
            mint: mint.into(),
            program,
        }
    }
}

/// Resolved token holding and its derived account address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenAccount {
    /// Wallet owning the token account.
    pub owner: Pubkey,
    /// Token mint.
    pub mint: Pubkey,
    /// Token program family.
    pub program: TokenProgram,
    /// Associated token account watched by the subscription.
    pub address: Pubkey,
}

impl fmt::Display for TokenAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} of {})", self.address, self.program, self.mint)
    }
}

/// Token balance of an owner's associated token account.
#[derive(Clone)]
pub struct TokenBalanceSource {
    rpc: Arc<dyn BalanceRpc>,
    config: TokenWatchConfig,
    /// Mint decimals already looked up. A mint's decimals never change.
    mint_decimals: Arc<Mutex<HashMap<Pubkey, u8>>>,
}

impl TokenBalanceSource {
    /// Creates a new token balance source.
    pub fn new(rpc: Arc<dyn BalanceRpc>, config: TokenWatchConfig) -> Self {
        Self {
            rpc,
            config,
            mint_decimals: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Queries the balance, mapping a missing account to zero.
    pub async fn fetch(
        &self,
        account: &TokenAccount,
    ) -> Result<BalanceUpdate<TokenBalance>, WatchError> {
        let update = self.rpc.token_balance(&account.address).await?;
        match update.value {
            Some(balance) => Ok(BalanceUpdate::new(balance, update.slot)),
            None => {
                let decimals = self.missing_account_decimals(account).await?;
                debug!(
                    address = %account.address,
                    slot = update.slot,
                    decimals,
                    "Token account missing, reporting zero balance"
                );
                Ok(BalanceUpdate::new(TokenBalance::zero(decimals), update.slot))
            }
        }
    }

    async fn missing_account_decimals(&self, account: &TokenAccount) -> Result<u8, WatchError> {
        match self.config.missing_account_decimals {
            MissingAccountDecimals::Fixed(decimals) => Ok(decimals),
            MissingAccountDecimals::FromMint => {
                if let Some(decimals) = self.cached_mint_decimals(&account.mint) {
                    return Ok(decimals);
                }
                let decimals = self.rpc.mint_decimals(&account.mint).await?;
                self.mint_decimals
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(account.mint, decimals);
                Ok(decimals)
            }
        }
    }

    fn cached_mint_decimals(&self, mint: &Pubkey) -> Option<u8> {
        self.mint_decimals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(mint)
            .copied()
    }
}

#[async_trait]
impl BalanceSource for TokenBalanceSource {
    type Target = TokenTarget;
    type Account = TokenAccount;
    type Value = TokenBalance;

    fn resolve(&self, target: &TokenTarget) -> Result<TokenAccount, WatchError> {
        let owner = parse_address("owner", &target.owner)?;
        let mint = parse_address("mint", &target.mint)?;
        Ok(TokenAccount {
            owner,
            mint,
            program: target.program,
            address: derive_token_account(&owner, &mint, target.program),
        })
    }

    async fn snapshot(
        &self,
        account: &TokenAccount,
    ) -> Result<BalanceUpdate<TokenBalance>, WatchError> {
        self.fetch(account).await
    }

    async fn subscribe(
        &self,
        account: &TokenAccount,
        cancel: CancellationToken,
    ) -> Result<UpdateStream<TokenBalance>, WatchError> {
        let notifications = self
            .rpc
            .account_notifications(&account.address, cancel)
            .await?;

        let source = self.clone();
        let account = account.clone();
        Ok(notifications
            .then(move |notification| {
                let source = source.clone();
                let account = account.clone();
                async move {
                    let notification = notification?;
                    debug!(
                        address = %account.address,
                        slot = notification.slot,
                        "Token account changed, re-querying balance"
                    );
                    source.fetch(&account).await
                }
            })
            .boxed())
    }
}

/// Watcher for token balances.
pub type TokenBalanceWatcher = BalanceWatcher<TokenBalanceSource>;

impl BalanceWatcher<TokenBalanceSource> {
    /// Creates a token balance watcher over `rpc`.
    pub fn token(rpc: Arc<dyn BalanceRpc>, config: TokenWatchConfig) -> Self {
        Self::new(TokenBalanceSource::new(rpc, config))
    }
}
