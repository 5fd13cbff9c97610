use thiserror::Error;

/// Errors returned directly to callers of the connection manager.
///
/// Transport-level failures never appear here; they are folded into
/// status transitions so views only ever react to connectivity state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// `connect` was called with an empty token; no connection is attempted.
    #[error("auth token is empty")]
    EmptyToken,
    /// `send` was called while the channel is not connected; the message
    /// is dropped, not queued.
    #[error("not connected")]
    NotConnected,
}
