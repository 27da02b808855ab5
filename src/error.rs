//! Error types for the socket context and its client.

use thiserror::Error;

/// Errors surfaced synchronously by this crate.
///
/// Transport failures (refused connections, dropped sockets) are never
/// returned here. They arrive as `connect_error` and `disconnect` events.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SocketError {
    /// A component asked for the socket context without a `SocketProvider` above it.
    #[error("no SocketProvider found above this component; wrap the tree in `SocketProvider`")]
    MissingProvider,

    /// The configured endpoint could not be turned into a socket URL.
    #[error("invalid socket endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// A configuration value could not be parsed.
    #[error("invalid value '{value}' for {key}")]
    InvalidConfig { key: String, value: String },

    /// The event name belongs to the client's connection lifecycle.
    #[error("\"{0}\" is a reserved event name")]
    ReservedEvent(String),

    /// An incoming frame was not a valid Engine.IO / Socket.IO packet.
    #[error("malformed packet: {0}")]
    MalformedPacket(String),
}

impl SocketError {
    pub fn invalid_endpoint(endpoint: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidEndpoint {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }
}
