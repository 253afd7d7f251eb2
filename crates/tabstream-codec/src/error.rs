//! Codec error types.

use thiserror::Error;

/// Errors produced by the packet framing layer.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The packet header is malformed (length smaller than the header).
    #[error("invalid packet header")]
    InvalidHeader,

    /// A packet claims a length beyond the negotiated packet size.
    #[error("packet too large: {size} bytes (max {max})")]
    PacketTooLarge {
        /// Length claimed by the header.
        size: usize,
        /// Negotiated maximum.
        max: usize,
    },

    /// The transport closed mid-message.
    #[error("connection closed")]
    ConnectionClosed,

    /// Wire-format error from the protocol layer.
    #[error("protocol error: {0}")]
    Protocol(#[from] tabstream_protocol::ProtocolError),

    /// Underlying transport I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
