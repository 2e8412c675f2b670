//! Core types for slot-ordered balance watching.
//!
//! Nothing in this crate talks to the network; it holds the values that
//! flow between the RPC collaborators and the watcher engine.

/// Slot-tagged balance observations.
pub mod balance;
/// Enumerations shared across crates.
pub mod enums;
/// Error taxonomy for watch sessions.
pub mod error;
/// Token balance value.
pub mod token;

pub use balance::{BalanceUpdate, Slot};
pub use enums::TokenProgram;
pub use error::WatchError;
pub use token::TokenBalance;
