//! Suspendable token stream parser.
//!
//! The framer hands over packet payloads as they arrive; a token may be
//! split across any number of packets. [`TokenStreamParser`] buffers the
//! payload bytes and decodes one token at a time: when the buffered
//! bytes end inside a token it rewinds and reports "need more" by
//! returning `Ok(None)`, consuming nothing, and resumes cleanly once
//! more bytes are fed in. The consumer pulls tokens one by one, so it
//! controls the pace.

use bytes::{Buf, BytesMut};

use crate::error::ProtocolError;
use crate::token::{ColMetaData, Done, EnvChange, LoginAck, NbcRow, Order, RawRow, ServerError,
    ServerInfo, Token, TokenType};
use crate::version::TdsVersion;

/// A pull parser over an incrementally fed token stream.
#[derive(Debug, Default)]
pub struct TokenStreamParser {
    buf: BytesMut,
    metadata: Option<ColMetaData>,
    version: TdsVersion,
    cancelled: bool,
    finished: bool,
}

impl TokenStreamParser {
    /// Create a parser for the given protocol version.
    #[must_use]
    pub fn new(version: TdsVersion) -> Self {
        Self {
            buf: BytesMut::new(),
            metadata: None,
            version,
            cancelled: false,
            finished: false,
        }
    }

    /// Feed more payload bytes into the parser.
    pub fn extend(&mut self, payload: &[u8]) {
        self.buf.extend_from_slice(payload);
    }

    /// Number of buffered, not yet consumed bytes.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Whether bytes remain that do not form a complete token.
    ///
    /// Checked at end-of-stream: leftover bytes mean the peer closed the
    /// connection mid-token.
    #[must_use]
    pub fn has_partial(&self) -> bool {
        !self.buf.is_empty()
    }

    /// Request cancellation handling.
    ///
    /// From the next `try_next` on, decoded tokens are discarded until a
    /// DONE with the attention-acknowledged bit, which is yielded and
    /// terminates the stream. Idempotent.
    pub fn set_cancelled(&mut self) {
        self.cancelled = true;
    }

    /// Whether the parser is discarding tokens after a cancel.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Whether the parser yielded the attention-acknowledging DONE.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The most recent COLMETADATA, if any.
    #[must_use]
    pub fn metadata(&self) -> Option<&ColMetaData> {
        self.metadata.as_ref()
    }

    /// Decode the next token from the buffered bytes.
    ///
    /// Returns `Ok(None)` when the buffer does not hold a complete token
    /// yet; feed more bytes and call again. Tokens are yielded in wire
    /// order. Unknown tags are fatal.
    pub fn try_next(&mut self) -> Result<Option<Token>, ProtocolError> {
        loop {
            if self.finished {
                return Ok(None);
            }

            let Some((token, consumed)) = self.decode_one()? else {
                return Ok(None);
            };
            self.buf.advance(consumed);

            if let Token::ColMetaData(meta) = &token {
                self.metadata = Some(meta.clone());
            }

            if self.cancelled {
                // Keep consuming bytes, but only the attention ack is
                // surfaced to the consumer.
                if let Some(done) = token.as_done() {
                    if done.is_attention_ack() {
                        self.finished = true;
                        return Ok(Some(token));
                    }
                }
                continue;
            }

            return Ok(Some(token));
        }
    }

    /// Attempt to decode one token without consuming the buffer.
    ///
    /// `Ok(None)` is the suspension state: the buffered bytes end inside
    /// the token. On success the consumed byte count is returned so the
    /// caller can commit the read.
    fn decode_one(&self) -> Result<Option<(Token, usize)>, ProtocolError> {
        if self.buf.is_empty() {
            return Ok(None);
        }

        let mut cursor: &[u8] = &self.buf;
        let tag = cursor.get_u8();
        let token_type = TokenType::from_u8(tag).ok_or(ProtocolError::UnknownToken(tag))?;

        let result = match token_type {
            TokenType::Done => Done::decode(&mut cursor).map(Token::Done),
            TokenType::DoneProc => Done::decode(&mut cursor).map(Token::DoneProc),
            TokenType::DoneInProc => Done::decode(&mut cursor).map(Token::DoneInProc),
            TokenType::Error => ServerError::decode(&mut cursor).map(Token::Error),
            TokenType::Info => ServerInfo::decode(&mut cursor).map(Token::Info),
            TokenType::LoginAck => LoginAck::decode(&mut cursor).map(Token::LoginAck),
            TokenType::EnvChange => EnvChange::decode(&mut cursor).map(Token::EnvChange),
            TokenType::Order => Order::decode(&mut cursor).map(Token::Order),
            TokenType::ColMetaData => {
                ColMetaData::decode(&mut cursor, self.version).map(Token::ColMetaData)
            }
            TokenType::Row => {
                let meta = self
                    .metadata
                    .as_ref()
                    .ok_or(ProtocolError::RowWithoutMetadata)?;
                RawRow::decode(&mut cursor, meta).map(Token::Row)
            }
            TokenType::NbcRow => {
                let meta = self
                    .metadata
                    .as_ref()
                    .ok_or(ProtocolError::RowWithoutMetadata)?;
                NbcRow::decode(&mut cursor, meta).map(Token::NbcRow)
            }
            TokenType::ReturnStatus => {
                if cursor.remaining() < 4 {
                    Err(ProtocolError::UnexpectedEof)
                } else {
                    Ok(Token::ReturnStatus(cursor.get_i32_le()))
                }
            }
        };

        match result {
            Ok(token) => {
                let consumed = self.buf.len() - cursor.len();
                Ok(Some((token, consumed)))
            }
            // Not enough buffered bytes: suspend without consuming.
            Err(ProtocolError::UnexpectedEof | ProtocolError::IncompletePacket { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use bytes::BufMut;

    fn done_bytes(status: u16, row_count: u64) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.put_u8(0xFD);
        buf.put_u16_le(status);
        buf.put_u16_le(0);
        buf.put_u64_le(row_count);
        buf
    }

    #[test]
    fn test_parse_done() {
        let mut parser = TokenStreamParser::new(TdsVersion::V7_4);
        parser.extend(&done_bytes(0x0010, 5));

        let token = parser.try_next().unwrap().unwrap();
        match token {
            Token::Done(done) => {
                assert!(done.status.count);
                assert_eq!(done.row_count, 5);
            }
            other => panic!("expected Done, got {other:?}"),
        }

        assert!(parser.try_next().unwrap().is_none());
        assert!(!parser.has_partial());
    }

    #[test]
    fn test_suspends_on_partial_token() {
        let bytes = done_bytes(0x0010, 7);
        let mut parser = TokenStreamParser::new(TdsVersion::V7_4);

        // Feed everything except the last byte: no token, nothing consumed.
        parser.extend(&bytes[..bytes.len() - 1]);
        assert!(parser.try_next().unwrap().is_none());
        assert_eq!(parser.buffered(), bytes.len() - 1);

        // The final byte completes the token.
        parser.extend(&bytes[bytes.len() - 1..]);
        let token = parser.try_next().unwrap().unwrap();
        assert_eq!(token.as_done().unwrap().row_count, 7);
        assert_eq!(parser.buffered(), 0);
    }

    #[test]
    fn test_byte_at_a_time() {
        let bytes = done_bytes(0x0010, 3);
        let mut parser = TokenStreamParser::new(TdsVersion::V7_4);

        for &b in &bytes[..bytes.len() - 1] {
            parser.extend(&[b]);
            assert!(parser.try_next().unwrap().is_none());
        }
        parser.extend(&bytes[bytes.len() - 1..]);
        assert!(parser.try_next().unwrap().is_some());
    }

    #[test]
    fn test_unknown_tag_is_fatal() {
        let mut parser = TokenStreamParser::new(TdsVersion::V7_4);
        parser.extend(&[0x42]);

        assert!(matches!(
            parser.try_next(),
            Err(ProtocolError::UnknownToken(0x42))
        ));
    }

    #[test]
    fn test_row_requires_metadata() {
        let mut parser = TokenStreamParser::new(TdsVersion::V7_4);
        parser.extend(&[0xD1, 0x00]);

        assert!(matches!(
            parser.try_next(),
            Err(ProtocolError::RowWithoutMetadata)
        ));
    }

    #[test]
    fn test_metadata_then_row() {
        let mut payload = Vec::new();
        // COLMETADATA with a single INT column named "n".
        payload.put_u8(0x81);
        payload.put_u16_le(1);
        payload.put_u32_le(0);
        payload.put_u16_le(0);
        payload.put_u8(0x38);
        payload.put_u8(1);
        payload.extend_from_slice(&[b'n', 0x00]);
        // ROW with the value 9.
        payload.put_u8(0xD1);
        payload.put_i32_le(9);

        let mut parser = TokenStreamParser::new(TdsVersion::V7_4);
        parser.extend(&payload);

        assert!(matches!(
            parser.try_next().unwrap().unwrap(),
            Token::ColMetaData(_)
        ));
        match parser.try_next().unwrap().unwrap() {
            Token::Row(row) => assert_eq!(&row.data[..], &9i32.to_le_bytes()),
            other => panic!("expected Row, got {other:?}"),
        }
    }

    #[test]
    fn test_cancelled_discards_until_attention_ack() {
        let mut parser = TokenStreamParser::new(TdsVersion::V7_4);
        parser.set_cancelled();

        // A DONE without the attention bit is swallowed.
        parser.extend(&done_bytes(0x0010, 100));
        assert!(parser.try_next().unwrap().is_none());

        // The attention ack comes through and ends the stream.
        parser.extend(&done_bytes(0x0020, 0));
        let token = parser.try_next().unwrap().unwrap();
        assert!(token.as_done().unwrap().is_attention_ack());
        assert!(parser.is_finished());

        // Nothing after termination.
        parser.extend(&done_bytes(0x0010, 1));
        assert!(parser.try_next().unwrap().is_none());
    }

    #[test]
    fn test_cancelled_discards_rows() {
        let mut payload = Vec::new();
        payload.put_u8(0x81);
        payload.put_u16_le(1);
        payload.put_u32_le(0);
        payload.put_u16_le(0);
        payload.put_u8(0x38);
        payload.put_u8(1);
        payload.extend_from_slice(&[b'n', 0x00]);
        payload.put_u8(0xD1);
        payload.put_i32_le(1);

        let mut parser = TokenStreamParser::new(TdsVersion::V7_4);
        parser.extend(&payload);
        parser.set_cancelled();

        assert!(parser.try_next().unwrap().is_none());
        parser.extend(&done_bytes(0x0020, 0));
        assert!(parser.try_next().unwrap().is_some());
    }
}
