//! Balance watchers.
//!
//! A watch combines two sources that race each other:
//! - a one-shot snapshot of the current balance
//! - a push subscription of account changes
//!
//! Updates reach the callback in strictly increasing slot order, and nothing
//! reaches it once the session is cancelled.

mod engine;
mod native;
mod session;
mod token;

#[cfg(test)]
mod testing;

pub use engine::*;
pub use native::*;
pub use session::*;
pub use token::*;
