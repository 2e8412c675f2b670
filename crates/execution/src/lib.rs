//! Slot-ordered balance watching.
//!
//! This crate provides:
//! - The [`watcher::BalanceWatcher`] engine reconciling a snapshot query with
//!   a push subscription
//! - Native (lamport) balance watching
//! - SPL token balance watching on associated token accounts

/// Prelude module for convenient imports.
pub mod prelude;

/// Balance watchers.
pub mod watcher;
