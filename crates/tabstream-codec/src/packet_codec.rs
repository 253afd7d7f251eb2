//! TDS packet codec implementation.

use bytes::{BufMut, BytesMut};
use tabstream_protocol::packet::{
    DEFAULT_PACKET_SIZE, MAX_PACKET_SIZE, PACKET_HEADER_SIZE, PacketHeader,
};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::CodecError;

/// Smallest packet size a server will negotiate.
const MIN_PACKET_SIZE: usize = 512;

/// A TDS packet with header and payload.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Packet header.
    pub header: PacketHeader,
    /// Packet payload (excluding header).
    pub payload: BytesMut,
}

impl Packet {
    /// Create a new packet with the given header and payload.
    #[must_use]
    pub fn new(header: PacketHeader, payload: BytesMut) -> Self {
        Self { header, payload }
    }

    /// Get the total packet size including header.
    #[must_use]
    pub fn total_size(&self) -> usize {
        PACKET_HEADER_SIZE + self.payload.len()
    }

    /// Check if this is the last packet in a message.
    #[must_use]
    pub fn is_end_of_message(&self) -> bool {
        self.header.is_end_of_message()
    }
}

/// TDS packet codec for tokio-util framing.
///
/// Handles the low-level encoding and decoding of TDS packets over a
/// byte stream. Outbound packets get a sequence number that increments
/// per packet and wraps at 255; inbound sequence regressions are logged
/// and tolerated.
pub struct PacketCodec {
    /// Negotiated packet size; bounds both directions.
    packet_size: usize,
    /// Next outbound packet sequence number.
    packet_id: u8,
    /// Last inbound packet sequence number, for monotonicity checks.
    last_inbound_id: Option<u8>,
}

impl PacketCodec {
    /// Create a new codec with the default packet size.
    #[must_use]
    pub fn new() -> Self {
        Self {
            packet_size: DEFAULT_PACKET_SIZE,
            packet_id: 1,
            last_inbound_id: None,
        }
    }

    /// Apply a negotiated packet size, clamped to the protocol's bounds.
    pub fn set_packet_size(&mut self, size: usize) {
        self.packet_size = size.clamp(MIN_PACKET_SIZE, MAX_PACKET_SIZE);
    }

    /// The active packet size.
    #[must_use]
    pub fn packet_size(&self) -> usize {
        self.packet_size
    }

    /// Largest payload one packet can carry.
    #[must_use]
    pub fn max_payload(&self) -> usize {
        self.packet_size - PACKET_HEADER_SIZE
    }

    /// Get the next packet ID and increment the counter.
    fn next_packet_id(&mut self) -> u8 {
        let id = self.packet_id;
        self.packet_id = self.packet_id.wrapping_add(1);
        id
    }

    /// Reset the outbound packet ID counter.
    pub fn reset_packet_id(&mut self) {
        self.packet_id = 1;
    }
}

impl Default for PacketCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < PACKET_HEADER_SIZE {
            return Ok(None);
        }

        // The length field is the protocol's only big-endian integer.
        let length = u16::from_be_bytes([src[2], src[3]]) as usize;

        if length < PACKET_HEADER_SIZE {
            return Err(CodecError::InvalidHeader);
        }
        if length > self.packet_size {
            return Err(CodecError::PacketTooLarge {
                size: length,
                max: self.packet_size,
            });
        }

        if src.len() < length {
            src.reserve(length - src.len());
            return Ok(None);
        }

        let packet_bytes = src.split_to(length);
        let mut cursor = packet_bytes.as_ref();
        let header = PacketHeader::decode(&mut cursor)?;

        if let Some(last) = self.last_inbound_id {
            if header.packet_id != last.wrapping_add(1) {
                tracing::warn!(
                    expected = last.wrapping_add(1),
                    actual = header.packet_id,
                    "inbound packet id not monotonic"
                );
            }
        }
        self.last_inbound_id = Some(header.packet_id);

        let payload = BytesMut::from(&packet_bytes[PACKET_HEADER_SIZE..]);

        tracing::trace!(
            packet_type = ?header.packet_type,
            length,
            is_eom = header.is_end_of_message(),
            "decoded packet"
        );

        Ok(Some(Packet::new(header, payload)))
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let total_length = PACKET_HEADER_SIZE + item.payload.len();

        if total_length > self.packet_size {
            return Err(CodecError::PacketTooLarge {
                size: total_length,
                max: self.packet_size,
            });
        }

        dst.reserve(total_length);

        let mut header = item.header;
        header.length = total_length as u16;
        header.packet_id = self.next_packet_id();

        header.encode(dst);
        dst.put_slice(&item.payload);

        tracing::trace!(
            packet_type = ?header.packet_type,
            length = total_length,
            packet_id = header.packet_id,
            "encoded packet"
        );

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tabstream_protocol::packet::{PacketStatus, PacketType};

    #[test]
    fn test_decode_packet() {
        let mut codec = PacketCodec::new();

        let mut data = BytesMut::new();
        data.put_u8(PacketType::BulkLoad as u8);
        data.put_u8(PacketStatus::END_OF_MESSAGE.bits());
        data.put_u16(12); // length, big-endian
        data.put_u16(0); // spid
        data.put_u8(1); // packet_id
        data.put_u8(0); // window
        data.put_slice(b"rows");

        let packet = codec.decode(&mut data).unwrap().unwrap();
        assert_eq!(packet.header.packet_type, PacketType::BulkLoad);
        assert!(packet.is_end_of_message());
        assert_eq!(&packet.payload[..], b"rows");
    }

    #[test]
    fn test_decode_incomplete_packet() {
        let mut codec = PacketCodec::new();

        let mut data = BytesMut::new();
        data.put_u8(PacketType::SqlBatch as u8);
        data.put_u8(PacketStatus::END_OF_MESSAGE.bits());
        data.put_u16(12);
        data.put_u16(0);
        data.put_u8(1);
        data.put_u8(0);
        // Payload missing.

        assert!(codec.decode(&mut data).unwrap().is_none());
    }

    #[test]
    fn test_decode_rejects_short_length() {
        let mut codec = PacketCodec::new();

        let mut data = BytesMut::new();
        data.put_u8(PacketType::SqlBatch as u8);
        data.put_u8(PacketStatus::END_OF_MESSAGE.bits());
        data.put_u16(4); // shorter than the header itself
        data.put_u16(0);
        data.put_u8(1);
        data.put_u8(0);

        assert!(matches!(
            codec.decode(&mut data),
            Err(CodecError::InvalidHeader)
        ));
    }

    #[test]
    fn test_decode_rejects_oversized_length() {
        let mut codec = PacketCodec::new();
        codec.set_packet_size(512);

        let mut data = BytesMut::new();
        data.put_u8(PacketType::SqlBatch as u8);
        data.put_u8(PacketStatus::END_OF_MESSAGE.bits());
        data.put_u16(1024);
        data.put_u16(0);
        data.put_u8(1);
        data.put_u8(0);

        assert!(matches!(
            codec.decode(&mut data),
            Err(CodecError::PacketTooLarge { size: 1024, max: 512 })
        ));
    }

    #[test]
    fn test_encode_stamps_length_and_id() {
        let mut codec = PacketCodec::new();

        let header = PacketHeader::new(PacketType::BulkLoad, PacketStatus::NORMAL, 0);
        let mut dst = BytesMut::new();

        codec
            .encode(Packet::new(header, BytesMut::from(&b"ab"[..])), &mut dst)
            .unwrap();
        codec
            .encode(Packet::new(header, BytesMut::from(&b"cd"[..])), &mut dst)
            .unwrap();

        assert_eq!(dst.len(), 20);
        assert_eq!(u16::from_be_bytes([dst[2], dst[3]]), 10);
        assert_eq!(dst[6], 1); // first packet id
        assert_eq!(dst[16], 2); // second packet id
    }

    #[test]
    fn test_packet_size_clamped() {
        let mut codec = PacketCodec::new();
        codec.set_packet_size(64);
        assert_eq!(codec.packet_size(), MIN_PACKET_SIZE);
        codec.set_packet_size(1 << 20);
        assert_eq!(codec.packet_size(), MAX_PACKET_SIZE);
    }
}
