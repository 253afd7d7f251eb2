//! Protocol error types.

use thiserror::Error;

/// Errors produced while encoding or decoding the TDS wire format.
///
/// Protocol errors are fatal for the connection that produced them: a
/// malformed frame or an unknown tag means the byte stream can no longer
/// be trusted.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Fewer bytes were available than a fixed-size structure requires.
    #[error("incomplete packet: expected {expected} bytes, got {actual}")]
    IncompletePacket {
        /// Bytes required.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },

    /// The packet type byte is not a known TDS packet type.
    #[error("invalid packet type: 0x{0:02X}")]
    InvalidPacketType(u8),

    /// The packet status byte contains undefined bits.
    #[error("invalid packet status: 0x{0:02X}")]
    InvalidPacketStatus(u8),

    /// The packet length field is smaller than the header or larger than
    /// the negotiated packet size.
    #[error("packet length {length} outside valid range (max {max})")]
    LengthOverflow {
        /// Length claimed by the header.
        length: usize,
        /// Negotiated maximum.
        max: usize,
    },

    /// A token tag byte that no handler is registered for.
    #[error("unknown token: 0x{0:02X}")]
    UnknownToken(u8),

    /// A data type id that the type registry does not know.
    #[error("unknown data type: 0x{0:02X}")]
    UnknownTypeId(u8),

    /// A ROW or NBCROW token arrived before any COLMETADATA.
    #[error("row token received before column metadata")]
    RowWithoutMetadata,

    /// The stream ended inside a structure.
    #[error("unexpected end of stream")]
    UnexpectedEof,

    /// String data was not valid UCS-2 / UTF-8.
    #[error("string encoding error: {0}")]
    StringEncoding(String),
}
