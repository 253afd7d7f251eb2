//! # tabstream-codec
//!
//! Async framing layer for TDS packet handling.
//!
//! Transforms raw byte streams into packets and messages, and back:
//!
//! ```text
//! transport → PacketCodec (packet framing) → MessageAssembler → session
//! ```
//!
//! The connection splits its transport into read and write halves so
//! the out-of-band Attention signal can be written while a read is
//! blocked on the server's response.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod connection;
pub mod error;
pub mod framed;
pub mod message;
pub mod packet_codec;

pub use connection::{CancelHandle, Connection};
pub use error::CodecError;
pub use framed::{PacketReader, PacketStream, PacketWriter};
pub use message::{Message, MessageAssembler};
pub use packet_codec::{Packet, PacketCodec};
