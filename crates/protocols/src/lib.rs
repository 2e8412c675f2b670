//! Solana collaborators for balance watching.
//!
//! - RPC configuration and client construction
//! - The [`rpc::BalanceRpc`] trait used by the watchers
//! - Associated token account derivation

/// Prelude module for convenient imports.
pub mod prelude;

/// RPC configuration, collaborator trait and Solana implementation.
pub mod rpc;
/// Token program ids and associated token account derivation.
pub mod token_account;

use balance_watch_domain::WatchError;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

/// Parses a base58 address, naming the offending field on failure.
pub fn parse_address(field: &'static str, value: &str) -> Result<Pubkey, WatchError> {
    Pubkey::from_str(value.trim()).map_err(|e| WatchError::malformed(field, value, e))
}
