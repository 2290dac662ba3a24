//! # parley-client
//!
//! Binds one stream transport to one chat store.
//!
//! - [`ChatClient`]: `connect`, `send_message(text, files, source)`, `stop`, `clear`
//! - [`bridge`]: maps transport notifications onto reducer actions
//!
//! The client owns neither piece exclusively: the composition root builds the
//! [`ChatStore`](parley_store::ChatStore) and the transport, hands both to
//! [`ChatClient::new`], and reads state from the store.

#![deny(unsafe_code)]

pub mod bridge;
pub mod client;

pub use client::ChatClient;
