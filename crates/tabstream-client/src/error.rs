//! Client error types.

use std::sync::Arc;

use tabstream_codec::CodecError;
use tabstream_protocol::ProtocolError;
use tabstream_protocol::token::ServerError;
use tabstream_types::TypeError;
use thiserror::Error;

/// Errors surfaced by session operations.
///
/// Recoverable errors settle the active request only and leave the
/// session reusable; fatal errors (`is_fatal`) tear the session down
/// and settle everything outstanding.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed frame, unknown tag, unknown type id. Fatal.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server reported an error for the active request.
    ///
    /// Displays as the server's message text.
    #[error("{message}")]
    Server {
        /// Error number.
        number: i32,
        /// Error state.
        state: u8,
        /// Error severity class.
        class: u8,
        /// Error message text.
        message: String,
        /// Server name.
        server: String,
        /// Procedure name.
        procedure: String,
        /// Line number.
        line: i32,
    },

    /// A cell value failed validation. Scoped to the bulk load; the
    /// session stays reusable.
    #[error(transparent)]
    Type(#[from] TypeError),

    /// The request was cancelled.
    #[error("Canceled.")]
    Canceled,

    /// The request's one-shot timer fired.
    #[error("Timeout: Request failed to complete in {ms}ms")]
    Timeout {
        /// The configured timeout in milliseconds.
        ms: u64,
    },

    /// Bulk-load configuration misuse.
    #[error("{0}")]
    BulkInput(String),

    /// Framing-layer failure. Fatal.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The transport closed underneath an active request. Fatal.
    #[error("connection closed")]
    ConnectionClosed,

    /// Transport I/O error. Fatal.
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),
}

impl Error {
    /// Build a request error from a server ERROR token.
    #[must_use]
    pub fn from_server_error(e: ServerError) -> Self {
        Self::Server {
            number: e.number,
            state: e.state,
            class: e.class,
            message: e.message,
            server: e.server,
            procedure: e.procedure,
            line: e.line,
        }
    }

    /// Whether this error poisons the session.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Protocol(_) | Self::Codec(_) | Self::ConnectionClosed | Self::Io(_)
        )
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(Arc::new(e))
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;
