//! Reed client core - single-channel WebSocket connection management
//!
//! This crate owns the real-time side of the chat client: a
//! [`ConnectionManager`] that maintains at most one authenticated WebSocket
//! channel and decodes its frames into typed events, and a [`MessageBus`]
//! that buffers those events for possibly-late-subscribing views.
//!
//! Reconnection is deliberately the embedder's decision: a dropped channel
//! is reported as a status transition and nothing more.

mod bus;
mod error;
mod manager;

pub use bus::{BusConfig, BusSubscription, MessageBus};
pub use error::ConnectionError;
pub use manager::{ClientConfig, ConnectionManager, ConnectionStatus};
