//! Error handling types for portico.
//!
//! Errors are grouped by how far they reach:
//!
//! - [`ConfigError`] is fatal and keeps the server from starting.
//! - [`NegotiationError`] only affects the connection that failed its handshake.
//! - [`ContextError`] and handler errors only affect a single request.
//!
//! # Examples
//!
//! ```rust,ignore
//! use portico::errors::{ConfigError, PorticoError};
//!
//! match server.start().await {
//!     Ok(()) => println!("listening on {:?}", server.runtime_port()),
//!     Err(PorticoError::Config(ConfigError::Bind(reason))) => {
//!         eprintln!("port unavailable: {}", reason);
//!     }
//!     Err(other) => eprintln!("cannot start: {}", other),
//! }
//! ```

use thiserror::Error;

/// Main error type for portico operations.
#[derive(Debug, Error, PartialEq)]
pub enum PorticoError {
    /// Configuration-related errors, fatal at startup
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Per-connection protocol negotiation errors
    #[error("Negotiation error: {0}")]
    Negotiation(#[from] NegotiationError),

    /// Request/response context misuse
    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    /// Error returned by a request handler
    #[error("Handler error: {0}")]
    Handler(String),

    /// HTTP framing or socket failure on an established connection
    #[error("Connection error: {0}")]
    Connection(String),

    /// `start` was called on a running server
    #[error("Server is already running")]
    AlreadyRunning,

    /// `stop` was called on a server that never started
    #[error("Server is not running")]
    NotRunning,

    /// The server reached its terminal state and cannot be restarted
    #[error("Server has been stopped")]
    Terminated,
}

impl PorticoError {
    /// Wraps any displayable failure as a handler error.
    ///
    /// ```rust,ignore
    /// let value: u32 = raw.parse().map_err(PorticoError::handler)?;
    /// ```
    pub fn handler<E: std::fmt::Display>(error: E) -> Self {
        PorticoError::Handler(error.to_string())
    }
}

/// Configuration errors.
///
/// These are raised while building settings, routers and TLS contexts, and
/// while binding the listener. All of them abort `Server::start`.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    /// A protocol requiring TLS was configured without SSL settings
    #[error("Protocol {0} requires SSL settings")]
    MissingSslSettings(String),

    /// Bind address could not be parsed
    #[error("Invalid bind address: {0}")]
    InvalidAddress(String),

    /// A key material locator is not a valid URI
    #[error("Invalid key material location '{location}': {reason}")]
    InvalidLocation { location: String, reason: String },

    /// Key material could not be resolved or parsed
    #[error("Key material '{location}' unavailable: {reason}")]
    KeyMaterial { location: String, reason: String },

    /// Client authentication is required but no trust anchors were loaded
    #[error("Client authentication requires at least one trusted certificate")]
    MissingTrustAnchors,

    /// TLS configuration could not be assembled
    #[error("Tls error: {0}")]
    Tls(String),

    /// Invalid route pattern
    #[error("Invalid route '{pattern}': {reason}")]
    InvalidRoute { pattern: String, reason: String },

    /// Listener could not be bound
    #[error("Failed to bind to address: {0}")]
    Bind(String),
}

/// Connection negotiation errors.
///
/// A negotiation error closes the offending connection. The listener keeps
/// accepting.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum NegotiationError {
    /// TLS handshake failed, including missing or untrusted client certificates
    #[error("Tls handshake failed: {0}")]
    Handshake(String),

    /// Handshake did not complete within the configured bound
    #[error("Tls handshake timed out after {0} ms")]
    Timeout(u128),

    /// Peer presented a certificate that could not be decoded
    #[error("Invalid peer certificate: {0}")]
    Certificate(String),
}

/// Request/response context errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ContextError {
    /// The response was already sent and can no longer change
    #[error("Response already sent")]
    AlreadySent,

    /// Header name or value is not valid HTTP
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Request body is not valid UTF-8
    #[error("Request body is not valid UTF-8")]
    InvalidBody,
}
