//! # tabstream-protocol
//!
//! Pure implementation of the TDS (Tabular Data Stream) wire format used
//! by Microsoft SQL Server, scoped to the pieces a streaming client
//! needs: packet framing structures, the token stream, column metadata
//! with collations, and a suspendable token parser.
//!
//! ## Design
//!
//! This crate is intentionally IO-agnostic. It contains no networking
//! logic and makes no assumptions about the async runtime; the
//! `tabstream-codec` crate layers tokio framing on top.
//!
//! The token parser ([`stream::TokenStreamParser`]) is a state machine
//! over a bounded input buffer: it decodes one token per call and
//! suspends (returning `None`, consuming nothing) whenever the buffered
//! bytes end inside a token. That makes it resumable across packet
//! boundaries and trivially cancellable between tokens.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod buffer;
pub mod codec;
pub mod collation;
pub mod error;
pub mod packet;
pub mod stream;
pub mod token;
pub mod types;
pub mod version;

pub use buffer::TrackingBuffer;
pub use collation::{Collation, CollationFlags};
pub use error::ProtocolError;
pub use packet::{
    DEFAULT_PACKET_SIZE, MAX_PACKET_SIZE, PACKET_HEADER_SIZE, PacketHeader, PacketStatus,
    PacketType,
};
pub use stream::TokenStreamParser;
pub use token::{
    ColMetaData, ColumnData, Done, DoneStatus, EnvChange, EnvChangeType, EnvChangeValue, LoginAck,
    NbcRow, Order, RawRow, ServerError, ServerInfo, Token, TokenType, UdtInfo, XmlSchema,
};
pub use types::TypeId;
pub use version::TdsVersion;
