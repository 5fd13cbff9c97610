//! Reed wire protocol
//!
//! Defines the frame types exchanged with the chat server and the codec
//! that turns raw text frames into typed events. This crate does no I/O;
//! the connection manager in `reed-client` drives it.

mod frame;
mod types;

pub use frame::{decode_frame, ChatMessage, DecodeError, OutgoingMessage, SocketEvent};
pub use types::{Conversation, PresenceState, UserRef};
