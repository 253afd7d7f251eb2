//! Codec utilities for TDS string encoding and decoding.
//!
//! Length-prefixed UCS-2 LE strings appear throughout the token stream:
//! B_VARCHAR uses a 1-byte character count, US_VARCHAR a 2-byte count.

use bytes::{Buf, BufMut};

/// Read a length-prefixed UTF-16LE string.
///
/// The format is: 1-byte length (in characters) followed by UTF-16LE bytes.
pub fn read_b_varchar(src: &mut impl Buf) -> Option<String> {
    if src.remaining() < 1 {
        return None;
    }
    let len = src.get_u8() as usize;
    read_utf16_string(src, len)
}

/// Read a length-prefixed UTF-16LE string with 2-byte length.
///
/// The format is: 2-byte length (in characters) followed by UTF-16LE bytes.
pub fn read_us_varchar(src: &mut impl Buf) -> Option<String> {
    if src.remaining() < 2 {
        return None;
    }
    let len = src.get_u16_le() as usize;
    read_utf16_string(src, len)
}

/// Read a UTF-16LE string of specified character length.
pub fn read_utf16_string(src: &mut impl Buf, char_count: usize) -> Option<String> {
    let byte_count = char_count * 2;
    if src.remaining() < byte_count {
        return None;
    }

    let mut chars = Vec::with_capacity(char_count);
    for _ in 0..char_count {
        chars.push(src.get_u16_le());
    }

    String::from_utf16(&chars).ok()
}

/// Read a little-endian 24-bit unsigned integer.
///
/// Used by 3-byte wire fields (DATE day counts, TIME low words).
pub fn read_u24_le(src: &mut impl Buf) -> Option<u32> {
    if src.remaining() < 3 {
        return None;
    }
    let mut bytes = [0u8; 4];
    src.copy_to_slice(&mut bytes[..3]);
    Some(u32::from_le_bytes(bytes))
}

/// Read `len` bytes of ASCII data.
pub fn read_ascii(src: &mut impl Buf, len: usize) -> Option<String> {
    if src.remaining() < len {
        return None;
    }
    let mut bytes = vec![0u8; len];
    src.copy_to_slice(&mut bytes);
    String::from_utf8(bytes).ok()
}

/// Write a length-prefixed UTF-16LE string (1-byte length).
pub fn write_b_varchar(dst: &mut impl BufMut, s: &str) {
    let chars: Vec<u16> = s.encode_utf16().collect();
    let len = chars.len().min(255) as u8;
    dst.put_u8(len);
    for &c in &chars[..len as usize] {
        dst.put_u16_le(c);
    }
}

/// Write a length-prefixed UTF-16LE string (2-byte length).
pub fn write_us_varchar(dst: &mut impl BufMut, s: &str) {
    let chars: Vec<u16> = s.encode_utf16().collect();
    let len = chars.len().min(65535) as u16;
    dst.put_u16_le(len);
    for &c in &chars[..len as usize] {
        dst.put_u16_le(c);
    }
}

/// Write a UTF-16LE string without length prefix.
pub fn write_utf16_string(dst: &mut impl BufMut, s: &str) {
    for c in s.encode_utf16() {
        dst.put_u16_le(c);
    }
}

/// Calculate the byte length of a UTF-16 encoded string.
#[must_use]
pub fn utf16_byte_len(s: &str) -> usize {
    s.encode_utf16().count() * 2
}

/// Read a 16-byte GUID in its wire order, returning RFC 4122 byte order.
///
/// The first three GUID fields travel little-endian while the final
/// eight bytes keep their order (the MS-GUID mixed-endian layout).
pub fn read_guid(src: &mut impl Buf) -> Option<[u8; 16]> {
    if src.remaining() < 16 {
        return None;
    }
    let mut wire = [0u8; 16];
    src.copy_to_slice(&mut wire);
    Some(swap_guid_fields(wire))
}

/// Write a GUID given in RFC 4122 byte order using the wire order.
pub fn write_guid(dst: &mut impl BufMut, guid: [u8; 16]) {
    dst.put_slice(&swap_guid_fields(guid));
}

/// Swap the endianness of the first three GUID fields (involution).
#[must_use]
fn swap_guid_fields(mut bytes: [u8; 16]) -> [u8; 16] {
    bytes.swap(0, 3);
    bytes.swap(1, 2);
    bytes.swap(4, 5);
    bytes.swap(6, 7);
    bytes
}
