//! TDS message reassembly.
//!
//! A logical message spans one or more packets, terminated by the
//! `END_OF_MESSAGE` status bit on exactly one packet. This module
//! reassembles packet payloads into complete messages, honours the
//! IGNORE bit (drop the in-flight message), and surfaces the
//! RESET_CONNECTION bit to the state machine as a message flag.

use bytes::{Bytes, BytesMut};
use tabstream_protocol::packet::{PacketStatus, PacketType};

use crate::packet_codec::Packet;

/// A complete TDS message reassembled from one or more packets.
#[derive(Debug, Clone)]
pub struct Message {
    /// The packet type of this message.
    pub packet_type: PacketType,
    /// The complete message payload (all packets combined).
    pub payload: Bytes,
    /// Whether any packet carried the RESET_CONNECTION bit.
    ///
    /// Forwarded to the connection state machine; the token parser
    /// never sees it.
    pub reset_connection: bool,
}

impl Message {
    /// Get the message payload length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Check if the message is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Reassembles TDS packets into complete messages.
#[derive(Debug, Default)]
pub struct MessageAssembler {
    /// Buffer for accumulating packet payloads.
    buffer: BytesMut,
    /// Packet type of the message being assembled.
    packet_type: Option<PacketType>,
    /// Number of packets accumulated.
    packet_count: usize,
    /// RESET_CONNECTION seen on any packet of the in-flight message.
    reset_connection: bool,
}

impl MessageAssembler {
    /// Create a new message assembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a packet into the assembler.
    ///
    /// Returns `Some(Message)` if this packet completes a message,
    /// `None` if more packets are needed or the message was discarded
    /// via the IGNORE bit.
    pub fn push(&mut self, packet: Packet) -> Option<Message> {
        // Attention travels out-of-band: it interrupts whatever message
        // is in flight rather than extending it.
        if packet.header.packet_type == PacketType::Attention {
            self.clear();
            return Some(Message {
                packet_type: PacketType::Attention,
                payload: Bytes::new(),
                reset_connection: false,
            });
        }

        if packet.header.status.contains(PacketStatus::IGNORE_EVENT) {
            tracing::trace!(
                packets_dropped = self.packet_count + 1,
                "discarding in-flight message (IGNORE)"
            );
            self.clear();
            return None;
        }

        if self.packet_type.is_none() {
            self.packet_type = Some(packet.header.packet_type);
        }
        if packet.header.status.contains(PacketStatus::RESET_CONNECTION) {
            self.reset_connection = true;
        }

        self.buffer.extend_from_slice(&packet.payload);
        self.packet_count += 1;

        tracing::trace!(
            packet_type = ?packet.header.packet_type,
            packet_count = self.packet_count,
            buffer_len = self.buffer.len(),
            is_eom = packet.header.is_end_of_message(),
            "assembling message"
        );

        if packet.header.is_end_of_message() {
            let message = Message {
                packet_type: self.packet_type.take().unwrap_or(packet.header.packet_type),
                payload: self.buffer.split().freeze(),
                reset_connection: self.reset_connection,
            };
            self.packet_count = 0;
            self.reset_connection = false;
            Some(message)
        } else {
            None
        }
    }

    /// Check if the assembler has partial data buffered.
    #[must_use]
    pub fn has_partial(&self) -> bool {
        self.packet_type.is_some()
    }

    /// Get the number of packets accumulated so far.
    #[must_use]
    pub fn packet_count(&self) -> usize {
        self.packet_count
    }

    /// Clear any partial message data.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.packet_type = None;
        self.packet_count = 0;
        self.reset_connection = false;
    }
}
