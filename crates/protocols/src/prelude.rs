//! Prelude module for convenient imports.
//!
//! ```rust
//! use balance_watch_protocols::prelude::*;
//! ```

pub use crate::parse_address;
pub use crate::rpc::{
    AccountNotification, BalanceRpc, NotificationStream, RpcConfig, RpcConfigError, RpcProvider,
};
pub use crate::token_account::{
    ASSOCIATED_TOKEN_PROGRAM_ID, TOKEN_2022_PROGRAM_ID, TOKEN_PROGRAM_ID, derive_token_account,
    token_program_id,
};
