//! # parley-store
//!
//! Chat state, reducer, and state container for the Parley chat client.
//!
//! - [`ChatState`]: messages, thought steps, tool calls, system log, and flags
//! - [`reduce`]: the pure `(state, action) -> state` transition
//! - [`ChatStore`]: owned container that serializes dispatch and notifies subscribers

#![deny(unsafe_code)]

pub mod reducer;
pub mod state;
pub mod store;

pub use reducer::{Action, reduce, user_message};
pub use state::{ChatState, SYSTEM_LOG_CAPACITY, SystemNote};
pub use store::ChatStore;
