//! Prelude module for convenient imports.
//!
//! This module re-exports the most commonly used types from the crate.
//!
//! # Example
//!
//! ```rust
//! use balance_watch_execution::prelude::*;
//! ```

// Engine
pub use crate::watcher::{BalanceSource, BalanceWatcher, UpdateStream, WatchHandle};

// Sessions
pub use crate::watcher::{Delivery, WatchCanceller, WatchSession, Workflow};

// Native balances
pub use crate::watcher::{NativeBalanceSource, NativeBalanceWatcher};

// Token balances
pub use crate::watcher::{
    MissingAccountDecimals, TokenAccount, TokenBalanceSource, TokenBalanceWatcher, TokenTarget,
    TokenWatchConfig,
};

// Domain
pub use balance_watch_domain::{BalanceUpdate, Slot, TokenBalance, TokenProgram, WatchError};
