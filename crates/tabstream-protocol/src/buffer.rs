//! Growable write buffer with position tracking.
//!
//! Outbound token streams (COLMETADATA headers, ROW tokens, the client
//! DONE) are assembled in a [`TrackingBuffer`] before being handed to the
//! packet framer. All integer writers are little-endian; the packet
//! header's big-endian length is written by the framer, not here.

use bytes::{BufMut, Bytes, BytesMut};

/// A growable byte sink with a write cursor.
///
/// Wraps a `BytesMut` (doubling growth) and adds the length-prefixed
/// string forms the token stream uses. Out-of-memory is the only failure
/// mode, so none of the writers return errors.
#[derive(Debug, Default)]
pub struct TrackingBuffer {
    inner: BytesMut,
}

impl TrackingBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: BytesMut::new(),
        }
    }

    /// Create a buffer with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: BytesMut::with_capacity(capacity),
        }
    }

    /// Current write position (bytes written so far).
    #[must_use]
    pub fn position(&self) -> usize {
        self.inner.len()
    }

    /// Number of buffered bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Write a single byte.
    pub fn write_u8(&mut self, value: u8) {
        self.inner.put_u8(value);
    }

    /// Write a little-endian `u16`.
    pub fn write_u16_le(&mut self, value: u16) {
        self.inner.put_u16_le(value);
    }

    /// Write a big-endian `u16`.
    pub fn write_u16_be(&mut self, value: u16) {
        self.inner.put_u16(value);
    }

    /// Write a little-endian `u32`.
    pub fn write_u32_le(&mut self, value: u32) {
        self.inner.put_u32_le(value);
    }

    /// Write a little-endian `u64`.
    pub fn write_u64_le(&mut self, value: u64) {
        self.inner.put_u64_le(value);
    }

    /// Write a signed byte.
    pub fn write_i8(&mut self, value: i8) {
        self.inner.put_i8(value);
    }

    /// Write a little-endian `i16`.
    pub fn write_i16_le(&mut self, value: i16) {
        self.inner.put_i16_le(value);
    }

    /// Write a little-endian `i32`.
    pub fn write_i32_le(&mut self, value: i32) {
        self.inner.put_i32_le(value);
    }

    /// Write a little-endian `i64`.
    pub fn write_i64_le(&mut self, value: i64) {
        self.inner.put_i64_le(value);
    }

    /// Write a little-endian `f32`.
    pub fn write_f32_le(&mut self, value: f32) {
        self.inner.put_f32_le(value);
    }

    /// Write a little-endian `f64`.
    pub fn write_f64_le(&mut self, value: f64) {
        self.inner.put_f64_le(value);
    }

    /// Write a raw byte slice.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.inner.put_slice(bytes);
    }

    /// Write a B_VARCHAR: 1-byte character count followed by UCS-2 LE.
    ///
    /// Strings longer than 255 characters are truncated to the prefix's
    /// range, matching the wire format's limit.
    pub fn write_b_varchar(&mut self, s: &str) {
        crate::codec::write_b_varchar(&mut self.inner, s);
    }

    /// Write a US_VARCHAR: 2-byte character count followed by UCS-2 LE.
    pub fn write_us_varchar(&mut self, s: &str) {
        crate::codec::write_us_varchar(&mut self.inner, s);
    }

    /// Write UCS-2 LE code units without a length prefix.
    pub fn write_utf16(&mut self, s: &str) {
        crate::codec::write_utf16_string(&mut self.inner, s);
    }

    /// Take all buffered bytes, leaving the buffer empty.
    #[must_use]
    pub fn split(&mut self) -> BytesMut {
        self.inner.split()
    }

    /// Take up to `at` buffered bytes from the front.
    #[must_use]
    pub fn split_to(&mut self, at: usize) -> BytesMut {
        self.inner.split_to(at)
    }

    /// Freeze the buffer into immutable bytes.
    #[must_use]
    pub fn freeze(self) -> Bytes {
        self.inner.freeze()
    }

    /// View the buffered bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.inner
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_writers_are_little_endian() {
        let mut buf = TrackingBuffer::new();
        buf.write_u16_le(0x0102);
        buf.write_u32_le(0x03040506);
        buf.write_u64_le(0x0708090A0B0C0D0E);

        assert_eq!(buf.as_slice()[..2], [0x02, 0x01]);
        assert_eq!(buf.as_slice()[2..6], [0x06, 0x05, 0x04, 0x03]);
        assert_eq!(buf.position(), 14);
    }

    #[test]
    fn test_b_varchar_prefix_counts_characters() {
        let mut buf = TrackingBuffer::new();
        buf.write_b_varchar("ab");

        assert_eq!(buf.as_slice(), &[0x02, b'a', 0x00, b'b', 0x00]);
    }

    #[test]
    fn test_us_varchar_prefix() {
        let mut buf = TrackingBuffer::new();
        buf.write_us_varchar("a");

        assert_eq!(buf.as_slice(), &[0x01, 0x00, b'a', 0x00]);
    }

    #[test]
    fn test_split_resets_position() {
        let mut buf = TrackingBuffer::new();
        buf.write_u32_le(42);
        let taken = buf.split();

        assert_eq!(taken.len(), 4);
        assert_eq!(buf.position(), 0);
    }

    #[test]
    fn test_floats() {
        let mut buf = TrackingBuffer::new();
        buf.write_f32_le(1.5);
        buf.write_f64_le(-2.25);

        assert_eq!(&buf.as_slice()[..4], &1.5f32.to_le_bytes());
        assert_eq!(&buf.as_slice()[4..], &(-2.25f64).to_le_bytes());
    }
}
