//! Wire encoding helpers for SQL values.
//!
//! These produce the value bytes that follow each length prefix in ROW
//! tokens; the length prefixes themselves are written by
//! [`crate::SqlType::encode_value`].

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tabstream_protocol::TrackingBuffer;
use tabstream_protocol::codec::write_guid;
use uuid::Uuid;

use crate::error::TypeError;

/// Options applied while encoding values.
#[derive(Debug, Clone, Copy)]
pub struct EncodeOptions {
    /// Encode timezone-aware values relative to UTC rather than their
    /// local wall-clock time. Affects the legacy datetime family's day
    /// and minute fields.
    pub use_utc: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self { use_utc: true }
    }
}

/// Epoch of the legacy datetime family.
fn epoch_1900() -> NaiveDate {
    NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or_default()
}

/// Epoch of the 2008+ date family.
fn epoch_0001() -> NaiveDate {
    NaiveDate::from_ymd_opt(1, 1, 1).unwrap_or_default()
}

/// Days between a date and 1900-01-01.
#[must_use]
pub fn days_since_1900(date: NaiveDate) -> i64 {
    (date - epoch_1900()).num_days()
}

/// Encode a SMALLDATETIME value: days and minutes, both `u16` LE.
pub fn encode_smalldatetime(
    value: NaiveDateTime,
    buf: &mut TrackingBuffer,
) -> Result<(), TypeError> {
    let days = days_since_1900(value.date());
    let days = u16::try_from(days).map_err(|_| TypeError::InvalidDate)?;
    let minutes = (value.hour() * 60 + value.minute()) as u16;

    buf.write_u16_le(days);
    buf.write_u16_le(minutes);
    Ok(())
}

/// Encode a DATETIME value: `i32` days and `u32` three-hundredths of a
/// second since midnight.
pub fn encode_datetime(value: NaiveDateTime, buf: &mut TrackingBuffer) -> Result<(), TypeError> {
    let days = days_since_1900(value.date());
    let days = i32::try_from(days).map_err(|_| TypeError::InvalidDate)?;

    let seconds = u64::from(value.num_seconds_from_midnight());
    let three_hundredths = seconds * 300 + u64::from(value.nanosecond()) * 3 / 10_000_000;

    buf.write_i32_le(days);
    buf.write_u32_le(three_hundredths as u32);
    Ok(())
}

/// Encode a DATE value: 3-byte LE days since 0001-01-01.
pub fn encode_date(value: NaiveDate, buf: &mut TrackingBuffer) -> Result<(), TypeError> {
    let days = (value - epoch_0001()).num_days();
    let days = u32::try_from(days).map_err(|_| TypeError::InvalidDate)?;

    buf.write_bytes(&days.to_le_bytes()[..3]);
    Ok(())
}

/// On-wire byte length of a TIME value at the given scale.
#[must_use]
pub fn time_byte_length(scale: u8) -> u8 {
    match scale {
        0..=2 => 3,
        3..=4 => 4,
        _ => 5,
    }
}

/// Divisor turning nanoseconds into `10^-scale` second intervals.
fn time_scale_divisor(scale: u8) -> u64 {
    match scale {
        0 => 1_000_000_000,
        1 => 100_000_000,
        2 => 10_000_000,
        3 => 1_000_000,
        4 => 100_000,
        5 => 10_000,
        6 => 1_000,
        _ => 100,
    }
}

/// Encode a TIME value as scaled intervals since midnight.
pub fn encode_time(value: NaiveTime, scale: u8, buf: &mut TrackingBuffer) {
    let nanos =
        u64::from(value.num_seconds_from_midnight()) * 1_000_000_000 + u64::from(value.nanosecond());
    let intervals = nanos / time_scale_divisor(scale);

    let len = time_byte_length(scale);
    buf.write_bytes(&intervals.to_le_bytes()[..len as usize]);
}

/// Encode a DATETIME2 value: time at the given scale, then the date.
pub fn encode_datetime2(
    value: NaiveDateTime,
    scale: u8,
    buf: &mut TrackingBuffer,
) -> Result<(), TypeError> {
    encode_time(value.time(), scale, buf);
    encode_date(value.date(), buf)
}

/// Encode a UNIQUEIDENTIFIER in the mixed-endian wire layout.
pub fn encode_uuid(value: Uuid, buf: &mut TrackingBuffer) {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(value.as_bytes());

    let mut wire = bytes::BytesMut::with_capacity(16);
    write_guid(&mut wire, bytes);
    buf.write_bytes(&wire);
}

/// Encode binary data using the PLP (Partially Length-Prefixed) format.
///
/// Layout: `u64` total length, then chunks of `u32` length + data, then
/// a zero-length terminator chunk. The whole value goes out as a single
/// chunk; the packet framer fragments it across packets as needed.
pub fn encode_plp_bytes(data: &[u8], buf: &mut TrackingBuffer) {
    buf.write_u64_le(data.len() as u64);

    if !data.is_empty() {
        buf.write_u32_le(data.len() as u32);
        buf.write_bytes(data);
    }

    buf.write_u32_le(0);
}

/// Encode a string as UTF-16LE using the PLP format.
pub fn encode_plp_utf16(s: &str, buf: &mut TrackingBuffer) {
    let byte_len = tabstream_protocol::codec::utf16_byte_len(s);
    buf.write_u64_le(byte_len as u64);

    if byte_len > 0 {
        buf.write_u32_le(byte_len as u32);
        buf.write_utf16(s);
    }

    buf.write_u32_le(0);
}

/// On-wire byte length of a NUMERIC value, sign byte included.
#[must_use]
pub fn decimal_byte_length(precision: u8) -> u8 {
    match precision {
        1..=9 => 5,
        10..=19 => 9,
        20..=28 => 13,
        _ => 17,
    }
}

/// Encode a NUMERIC value: length, sign byte (1 = positive), then the
/// scaled magnitude little-endian.
pub fn encode_decimal(
    value: Decimal,
    precision: u8,
    scale: u8,
    buf: &mut TrackingBuffer,
) -> Result<(), TypeError> {
    let mut scaled = value;
    scaled.rescale(u32::from(scale));

    let len = decimal_byte_length(precision);
    let magnitude_len = (len - 1) as usize;

    let magnitude = scaled.mantissa().unsigned_abs();
    let bytes = magnitude.to_le_bytes();
    if bytes[magnitude_len..].iter().any(|&b| b != 0) {
        return Err(TypeError::InvalidNumber);
    }

    buf.write_u8(len);
    buf.write_u8(if scaled.is_sign_negative() { 0 } else { 1 });
    buf.write_bytes(&bytes[..magnitude_len]);
    Ok(())
}

/// Encode an 8-byte MONEY value: the 1/10000 units split into a
/// high-then-low dword pair.
pub fn encode_money(value: Decimal, buf: &mut TrackingBuffer) -> Result<(), TypeError> {
    let units = money_units(value)?;

    buf.write_i32_le((units >> 32) as i32);
    buf.write_u32_le(units as u32);
    Ok(())
}

/// Encode a 4-byte SMALLMONEY value.
pub fn encode_smallmoney(value: Decimal, buf: &mut TrackingBuffer) -> Result<(), TypeError> {
    let units = money_units(value)?;
    let units = i32::try_from(units).map_err(|_| TypeError::InvalidNumber)?;

    buf.write_i32_le(units);
    Ok(())
}

/// A money value in 1/10000 currency units.
fn money_units(value: Decimal) -> Result<i64, TypeError> {
    value
        .checked_mul(Decimal::from(10_000))
        .ok_or(TypeError::InvalidNumber)?
        .round()
        .to_i64()
        .ok_or(TypeError::InvalidNumber)
}
