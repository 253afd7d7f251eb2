//! The data type registry.
//!
//! One [`SqlType`] value describes everything the bulk engine needs to
//! know about a column's declared type: its wire id, DDL declaration,
//! COLMETADATA tail, value validation, and value encoding. The registry
//! is a plain enum dispatched by match, so it is process-wide immutable
//! and shared by copy.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use tabstream_protocol::collation::{Collation, CollationFlags};
use tabstream_protocol::{TrackingBuffer, TypeId};
use uuid::Uuid;

use crate::encode;
use crate::encode::EncodeOptions;
use crate::error::TypeError;
use crate::value::SqlValue;

/// Declared length of a variable-length column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarLen {
    /// An explicit limit.
    Limited(u16),
    /// `(max)`: unbounded, streamed with PLP encoding.
    Max,
}

/// NULL marker for 2-byte length-prefixed values.
const USHORTLEN_NULL: u16 = 0xFFFF;
/// Wire marker for MAX-length columns in type info.
const MAX_MARKER: u16 = 0xFFFF;
/// NULL marker for PLP values.
const PLP_NULL: u64 = 0xFFFF_FFFF_FFFF_FFFF;

/// A SQL Server column type as declared by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    /// BIT.
    Bit,
    /// TINYINT.
    TinyInt,
    /// SMALLINT.
    SmallInt,
    /// INT.
    Int,
    /// BIGINT.
    BigInt,
    /// REAL (4-byte float).
    Real,
    /// FLOAT (8-byte float).
    Float,
    /// SMALLMONEY.
    SmallMoney,
    /// MONEY.
    Money,
    /// SMALLDATETIME.
    SmallDateTime,
    /// DATETIME.
    DateTime,
    /// DATE.
    Date,
    /// TIME with fractional-second scale 0..=7.
    Time {
        /// Fractional second digits.
        scale: u8,
    },
    /// DATETIME2 with fractional-second scale 0..=7.
    DateTime2 {
        /// Fractional second digits.
        scale: u8,
    },
    /// DATETIMEOFFSET with fractional-second scale 0..=7.
    DateTimeOffset {
        /// Fractional second digits.
        scale: u8,
    },
    /// NUMERIC / DECIMAL.
    Numeric {
        /// Total digits (1..=38).
        precision: u8,
        /// Digits right of the decimal point.
        scale: u8,
    },
    /// UNIQUEIDENTIFIER.
    UniqueIdentifier,
    /// CHAR(n).
    Char {
        /// Declared length in bytes.
        length: u16,
    },
    /// VARCHAR(n) or VARCHAR(MAX).
    VarChar {
        /// Declared length.
        length: VarLen,
    },
    /// NCHAR(n).
    NChar {
        /// Declared length in characters.
        length: u16,
    },
    /// NVARCHAR(n) or NVARCHAR(MAX).
    NVarChar {
        /// Declared length in characters.
        length: VarLen,
    },
    /// BINARY(n).
    Binary {
        /// Declared length in bytes.
        length: u16,
    },
    /// VARBINARY(n) or VARBINARY(MAX).
    VarBinary {
        /// Declared length.
        length: VarLen,
    },
}

impl SqlType {
    /// The wire type id used in bulk column descriptors.
    ///
    /// Bulk loads always emit the nullable wire form so NULL cells stay
    /// representable regardless of the column's declared nullability.
    #[must_use]
    pub fn id(&self) -> TypeId {
        match self {
            Self::Bit => TypeId::BitN,
            Self::TinyInt | Self::SmallInt | Self::Int | Self::BigInt => TypeId::IntN,
            Self::Real | Self::Float => TypeId::FloatN,
            Self::SmallMoney | Self::Money => TypeId::MoneyN,
            Self::SmallDateTime | Self::DateTime => TypeId::DateTimeN,
            Self::Date => TypeId::Date,
            Self::Time { .. } => TypeId::Time,
            Self::DateTime2 { .. } => TypeId::DateTime2,
            Self::DateTimeOffset { .. } => TypeId::DateTimeOffset,
            Self::Numeric { .. } => TypeId::NumericN,
            Self::UniqueIdentifier => TypeId::Guid,
            Self::Char { .. } => TypeId::BigChar,
            Self::VarChar { .. } => TypeId::BigVarChar,
            Self::NChar { .. } => TypeId::NChar,
            Self::NVarChar { .. } => TypeId::NVarChar,
            Self::Binary { .. } => TypeId::BigBinary,
            Self::VarBinary { .. } => TypeId::BigVarBinary,
        }
    }

    /// Display name of the type.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bit => "Bit",
            Self::TinyInt => "TinyInt",
            Self::SmallInt => "SmallInt",
            Self::Int => "Int",
            Self::BigInt => "BigInt",
            Self::Real => "Real",
            Self::Float => "Float",
            Self::SmallMoney => "SmallMoney",
            Self::Money => "Money",
            Self::SmallDateTime => "SmallDateTime",
            Self::DateTime => "DateTime",
            Self::Date => "Date",
            Self::Time { .. } => "Time",
            Self::DateTime2 { .. } => "DateTime2",
            Self::DateTimeOffset { .. } => "DateTimeOffset",
            Self::Numeric { .. } => "Numeric",
            Self::UniqueIdentifier => "UniqueIdentifier",
            Self::Char { .. } => "Char",
            Self::VarChar { .. } => "VarChar",
            Self::NChar { .. } => "NChar",
            Self::NVarChar { .. } => "NVarChar",
            Self::Binary { .. } => "Binary",
            Self::VarBinary { .. } => "VarBinary",
        }
    }

    /// The DDL declaration of this type, as used in CREATE TABLE and the
    /// bulk-insert statement's column list.
    #[must_use]
    pub fn declaration(&self) -> String {
        match self {
            Self::Bit => "bit".into(),
            Self::TinyInt => "tinyint".into(),
            Self::SmallInt => "smallint".into(),
            Self::Int => "int".into(),
            Self::BigInt => "bigint".into(),
            Self::Real => "real".into(),
            Self::Float => "float".into(),
            Self::SmallMoney => "smallmoney".into(),
            Self::Money => "money".into(),
            Self::SmallDateTime => "smalldatetime".into(),
            Self::DateTime => "datetime".into(),
            Self::Date => "date".into(),
            Self::Time { scale } => format!("time({scale})"),
            Self::DateTime2 { scale } => format!("datetime2({scale})"),
            Self::DateTimeOffset { scale } => format!("datetimeoffset({scale})"),
            Self::Numeric { precision, scale } => format!("numeric({precision},{scale})"),
            Self::UniqueIdentifier => "uniqueidentifier".into(),
            Self::Char { length } => format!("char({length})"),
            Self::VarChar { length: VarLen::Limited(n) } => format!("varchar({n})"),
            Self::VarChar { length: VarLen::Max } => "varchar(max)".into(),
            Self::NChar { length } => format!("nchar({length})"),
            Self::NVarChar { length: VarLen::Limited(n) } => format!("nvarchar({n})"),
            Self::NVarChar { length: VarLen::Max } => "nvarchar(max)".into(),
            Self::Binary { length } => format!("binary({length})"),
            Self::VarBinary { length: VarLen::Limited(n) } => format!("varbinary({n})"),
            Self::VarBinary { length: VarLen::Max } => "varbinary(max)".into(),
        }
    }

    /// Whether values of this type use PLP encoding on the wire.
    #[must_use]
    pub fn is_plp(&self) -> bool {
        matches!(
            self,
            Self::VarChar { length: VarLen::Max }
                | Self::NVarChar { length: VarLen::Max }
                | Self::VarBinary { length: VarLen::Max }
        )
    }

    /// The collation emitted for character columns.
    ///
    /// Bulk descriptors carry a concrete collation; the server converts
    /// to the target column's collation on insert.
    #[must_use]
    pub fn default_collation() -> Collation {
        Collation {
            lcid: 0x0409,
            flags: CollationFlags::IGNORE_CASE
                | CollationFlags::IGNORE_KANA
                | CollationFlags::IGNORE_WIDTH,
            version: 0,
            sort_id: 52,
        }
    }

    /// Emit the type id and its COLMETADATA tail.
    ///
    /// This mirrors the metadata decoder's per-type layout, so a
    /// descriptor written here reads back through `ColMetaData::decode`.
    pub fn encode_type_info(&self, buf: &mut TrackingBuffer) {
        buf.write_u8(self.id() as u8);

        match self {
            Self::Bit => buf.write_u8(1),
            Self::TinyInt => buf.write_u8(1),
            Self::SmallInt => buf.write_u8(2),
            Self::Int => buf.write_u8(4),
            Self::BigInt => buf.write_u8(8),
            Self::Real => buf.write_u8(4),
            Self::Float => buf.write_u8(8),
            Self::SmallMoney => buf.write_u8(4),
            Self::Money => buf.write_u8(8),
            Self::SmallDateTime => buf.write_u8(4),
            Self::DateTime => buf.write_u8(8),
            Self::Date => {}
            Self::Time { scale } | Self::DateTime2 { scale } | Self::DateTimeOffset { scale } => {
                buf.write_u8(*scale);
            }
            Self::Numeric { precision, scale } => {
                buf.write_u8(encode::decimal_byte_length(*precision));
                buf.write_u8(*precision);
                buf.write_u8(*scale);
            }
            Self::UniqueIdentifier => buf.write_u8(16),
            Self::Char { length } => {
                buf.write_u16_le(*length);
                write_default_collation(buf);
            }
            Self::VarChar { length } => {
                buf.write_u16_le(match length {
                    VarLen::Limited(n) => *n,
                    VarLen::Max => MAX_MARKER,
                });
                write_default_collation(buf);
            }
            Self::NChar { length } => {
                buf.write_u16_le(length * 2);
                write_default_collation(buf);
            }
            Self::NVarChar { length } => {
                buf.write_u16_le(match length {
                    VarLen::Limited(n) => n * 2,
                    VarLen::Max => MAX_MARKER,
                });
                write_default_collation(buf);
            }
            Self::Binary { length } => buf.write_u16_le(*length),
            Self::VarBinary { length } => {
                buf.write_u16_le(match length {
                    VarLen::Limited(n) => *n,
                    VarLen::Max => MAX_MARKER,
                });
            }
        }
    }

    /// Validate and coerce a cell value for this column type.
    ///
    /// NULL passes through untouched. Everything else is coerced to the
    /// type's canonical [`SqlValue`] variant and range-checked; a failed
    /// coercion returns a typed error, it never panics.
    pub fn validate(&self, value: &SqlValue) -> Result<SqlValue, TypeError> {
        if value.is_null() {
            return Ok(SqlValue::Null);
        }

        match self {
            Self::Bit => validate_bool(value),
            Self::TinyInt => {
                validate_integer(value, 0, i64::from(u8::MAX)).map(|v| SqlValue::TinyInt(v as u8))
            }
            Self::SmallInt => {
                validate_integer(value, i64::from(i16::MIN), i64::from(i16::MAX))
                    .map(|v| SqlValue::SmallInt(v as i16))
            }
            Self::Int => validate_integer(value, i64::from(i32::MIN), i64::from(i32::MAX))
                .map(|v| SqlValue::Int(v as i32)),
            Self::BigInt => validate_integer(value, i64::MIN, i64::MAX).map(SqlValue::BigInt),
            Self::Real => validate_float(value).map(|v| SqlValue::Float(v as f32)),
            Self::Float => validate_float(value).map(SqlValue::Double),
            Self::SmallMoney => {
                let v = validate_decimal(value)?;
                let limit = Decimal::new(214_748_3647, 4);
                if v > limit || v < -limit {
                    return Err(TypeError::InvalidNumber);
                }
                Ok(SqlValue::Decimal(v))
            }
            Self::Money | Self::Numeric { .. } => validate_decimal(value).map(SqlValue::Decimal),
            Self::Date => validate_date(value).map(SqlValue::Date),
            Self::Time { .. } => validate_time(value).map(SqlValue::Time),
            Self::SmallDateTime | Self::DateTime | Self::DateTime2 { .. } => {
                validate_datetime(value)
            }
            Self::DateTimeOffset { .. } => validate_datetimeoffset(value),
            Self::UniqueIdentifier => validate_uuid(value).map(SqlValue::Uuid),
            Self::Char { .. } | Self::VarChar { .. } | Self::NChar { .. }
            | Self::NVarChar { .. } => match value {
                SqlValue::String(s) => Ok(SqlValue::String(s.clone())),
                _ => Err(TypeError::InvalidString),
            },
            Self::Binary { .. } | Self::VarBinary { .. } => match value {
                SqlValue::Binary(b) => Ok(SqlValue::Binary(b.clone())),
                _ => Err(TypeError::InvalidBuffer),
            },
        }
    }

    /// Emit `[length prefix][value bytes]` for one cell.
    ///
    /// Values are expected in the canonical form `validate` produces;
    /// anything else fails with an unsupported-conversion error.
    pub fn encode_value(
        &self,
        value: &SqlValue,
        buf: &mut TrackingBuffer,
        opts: &EncodeOptions,
    ) -> Result<(), TypeError> {
        if value.is_null() {
            self.encode_null(buf);
            return Ok(());
        }

        match (self, value) {
            (Self::Bit, SqlValue::Bool(b)) => {
                buf.write_u8(1);
                buf.write_u8(u8::from(*b));
            }
            (Self::TinyInt, SqlValue::TinyInt(v)) => {
                buf.write_u8(1);
                buf.write_u8(*v);
            }
            (Self::SmallInt, SqlValue::SmallInt(v)) => {
                buf.write_u8(2);
                buf.write_i16_le(*v);
            }
            (Self::Int, SqlValue::Int(v)) => {
                buf.write_u8(4);
                buf.write_i32_le(*v);
            }
            (Self::BigInt, SqlValue::BigInt(v)) => {
                buf.write_u8(8);
                buf.write_i64_le(*v);
            }
            (Self::Real, SqlValue::Float(v)) => {
                buf.write_u8(4);
                buf.write_f32_le(*v);
            }
            (Self::Float, SqlValue::Double(v)) => {
                buf.write_u8(8);
                buf.write_f64_le(*v);
            }
            (Self::SmallMoney, SqlValue::Decimal(v)) => {
                buf.write_u8(4);
                encode::encode_smallmoney(*v, buf)?;
            }
            (Self::Money, SqlValue::Decimal(v)) => {
                buf.write_u8(8);
                encode::encode_money(*v, buf)?;
            }
            (Self::SmallDateTime, _) => {
                let dt = canonical_datetime(value, opts)?;
                buf.write_u8(4);
                encode::encode_smalldatetime(dt, buf)?;
            }
            (Self::DateTime, _) => {
                let dt = canonical_datetime(value, opts)?;
                buf.write_u8(8);
                encode::encode_datetime(dt, buf)?;
            }
            (Self::Date, SqlValue::Date(d)) => {
                buf.write_u8(3);
                encode::encode_date(*d, buf)?;
            }
            (Self::Time { scale }, SqlValue::Time(t)) => {
                buf.write_u8(encode::time_byte_length(*scale));
                encode::encode_time(*t, *scale, buf);
            }
            (Self::DateTime2 { scale }, _) => {
                let dt = canonical_datetime(value, opts)?;
                buf.write_u8(encode::time_byte_length(*scale) + 3);
                encode::encode_datetime2(dt, *scale, buf)?;
            }
            (Self::DateTimeOffset { scale }, SqlValue::DateTimeOffset(dto)) => {
                buf.write_u8(encode::time_byte_length(*scale) + 5);
                encode::encode_datetime2(dto.naive_utc(), *scale, buf)?;
                buf.write_i16_le((dto.offset().local_minus_utc() / 60) as i16);
            }
            (Self::Numeric { precision, scale }, SqlValue::Decimal(v)) => {
                encode::encode_decimal(*v, *precision, *scale, buf)?;
            }
            (Self::UniqueIdentifier, SqlValue::Uuid(u)) => {
                buf.write_u8(16);
                encode::encode_uuid(*u, buf);
            }
            (Self::Char { length }, SqlValue::String(s))
            | (Self::VarChar { length: VarLen::Limited(length) }, SqlValue::String(s)) => {
                let length = *length;
                let (encoded, _, _) = encoding_rs::WINDOWS_1252.encode(s);
                if encoded.len() > usize::from(length) {
                    return Err(TypeError::ValueTooLarge {
                        needed: encoded.len(),
                        available: usize::from(length),
                    });
                }
                buf.write_u16_le(encoded.len() as u16);
                buf.write_bytes(&encoded);
            }
            (Self::VarChar { length: VarLen::Max }, SqlValue::String(s)) => {
                let (encoded, _, _) = encoding_rs::WINDOWS_1252.encode(s);
                encode::encode_plp_bytes(&encoded, buf);
            }
            (Self::NChar { length }, SqlValue::String(s))
            | (Self::NVarChar { length: VarLen::Limited(length) }, SqlValue::String(s)) => {
                let byte_len = tabstream_protocol::codec::utf16_byte_len(s);
                let available = usize::from(*length) * 2;
                if byte_len > available {
                    return Err(TypeError::ValueTooLarge {
                        needed: byte_len,
                        available,
                    });
                }
                buf.write_u16_le(byte_len as u16);
                buf.write_utf16(s);
            }
            (Self::NVarChar { length: VarLen::Max }, SqlValue::String(s)) => {
                encode::encode_plp_utf16(s, buf);
            }
            (Self::Binary { length }, SqlValue::Binary(b))
            | (Self::VarBinary { length: VarLen::Limited(length) }, SqlValue::Binary(b)) => {
                if b.len() > usize::from(*length) {
                    return Err(TypeError::ValueTooLarge {
                        needed: b.len(),
                        available: usize::from(*length),
                    });
                }
                buf.write_u16_le(b.len() as u16);
                buf.write_bytes(b);
            }
            (Self::VarBinary { length: VarLen::Max }, SqlValue::Binary(b)) => {
                encode::encode_plp_bytes(b, buf);
            }
            _ => {
                return Err(TypeError::UnsupportedConversion {
                    from: value.type_name(),
                    to: self.name(),
                });
            }
        }

        Ok(())
    }

    /// Emit this type's NULL marker.
    fn encode_null(&self, buf: &mut TrackingBuffer) {
        match self {
            Self::Char { .. }
            | Self::NChar { .. }
            | Self::Binary { .. }
            | Self::VarChar { length: VarLen::Limited(_) }
            | Self::NVarChar { length: VarLen::Limited(_) }
            | Self::VarBinary { length: VarLen::Limited(_) } => {
                buf.write_u16_le(USHORTLEN_NULL);
            }
            Self::VarChar { length: VarLen::Max }
            | Self::NVarChar { length: VarLen::Max }
            | Self::VarBinary { length: VarLen::Max } => {
                buf.write_u64_le(PLP_NULL);
            }
            _ => buf.write_u8(0),
        }
    }
}

/// Write the default collation's 5-byte block into the buffer.
fn write_default_collation(buf: &mut TrackingBuffer) {
    let mut block = bytes::BytesMut::with_capacity(5);
    SqlType::default_collation().encode(&mut block);
    buf.write_bytes(&block);
}

fn validate_bool(value: &SqlValue) -> Result<SqlValue, TypeError> {
    match value {
        SqlValue::Bool(b) => Ok(SqlValue::Bool(*b)),
        _ => match value.as_i64() {
            Some(0) => Ok(SqlValue::Bool(false)),
            Some(1) => Ok(SqlValue::Bool(true)),
            _ => match value.as_str() {
                Some("true") | Some("1") => Ok(SqlValue::Bool(true)),
                Some("false") | Some("0") => Ok(SqlValue::Bool(false)),
                _ => Err(TypeError::InvalidBoolean),
            },
        },
    }
}

fn validate_integer(value: &SqlValue, min: i64, max: i64) -> Result<i64, TypeError> {
    let v = if let Some(v) = value.as_i64() {
        v
    } else if let Some(f) = value.as_f64() {
        if f.fract() != 0.0 {
            return Err(TypeError::InvalidNumber);
        }
        f as i64
    } else if let Some(s) = value.as_str() {
        s.trim().parse().map_err(|_| TypeError::InvalidNumber)?
    } else {
        return Err(TypeError::InvalidNumber);
    };

    if v < min || v > max {
        return Err(TypeError::InvalidNumber);
    }
    Ok(v)
}

fn validate_float(value: &SqlValue) -> Result<f64, TypeError> {
    if let Some(f) = value.as_f64() {
        return Ok(f);
    }
    if let Some(v) = value.as_i64() {
        return Ok(v as f64);
    }
    if let Some(s) = value.as_str() {
        return s.trim().parse().map_err(|_| TypeError::InvalidNumber);
    }
    Err(TypeError::InvalidNumber)
}

fn validate_decimal(value: &SqlValue) -> Result<Decimal, TypeError> {
    match value {
        SqlValue::Decimal(d) => Ok(*d),
        SqlValue::Float(f) => Decimal::try_from(*f).map_err(|_| TypeError::InvalidNumber),
        SqlValue::Double(f) => Decimal::try_from(*f).map_err(|_| TypeError::InvalidNumber),
        SqlValue::String(s) => s.trim().parse().map_err(|_| TypeError::InvalidNumber),
        _ => value
            .as_i64()
            .map(Decimal::from)
            .ok_or(TypeError::InvalidNumber),
    }
}

fn validate_date(value: &SqlValue) -> Result<NaiveDate, TypeError> {
    match value {
        SqlValue::Date(d) => Ok(*d),
        SqlValue::DateTime(dt) => Ok(dt.date()),
        SqlValue::String(s) => {
            NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| TypeError::InvalidDate)
        }
        _ => Err(TypeError::InvalidDate),
    }
}

fn validate_time(value: &SqlValue) -> Result<NaiveTime, TypeError> {
    match value {
        SqlValue::Time(t) => Ok(*t),
        SqlValue::DateTime(dt) => Ok(dt.time()),
        SqlValue::String(s) => NaiveTime::parse_from_str(s.trim(), "%H:%M:%S%.f")
            .map_err(|_| TypeError::InvalidTime),
        _ => Err(TypeError::InvalidTime),
    }
}

fn validate_datetime(value: &SqlValue) -> Result<SqlValue, TypeError> {
    match value {
        SqlValue::DateTime(dt) => Ok(SqlValue::DateTime(*dt)),
        // Kept as-is: the UTC/local decision happens at encode time.
        SqlValue::DateTimeOffset(dto) => Ok(SqlValue::DateTimeOffset(*dto)),
        SqlValue::Date(d) => d
            .and_hms_opt(0, 0, 0)
            .map(SqlValue::DateTime)
            .ok_or(TypeError::InvalidDate),
        SqlValue::String(s) => parse_datetime(s.trim()).map(SqlValue::DateTime),
        _ => Err(TypeError::InvalidDate),
    }
}

fn validate_datetimeoffset(value: &SqlValue) -> Result<SqlValue, TypeError> {
    match value {
        SqlValue::DateTimeOffset(dto) => Ok(SqlValue::DateTimeOffset(*dto)),
        SqlValue::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .map(SqlValue::DateTimeOffset)
            .map_err(|_| TypeError::InvalidDate),
        _ => Err(TypeError::InvalidDate),
    }
}

fn validate_uuid(value: &SqlValue) -> Result<Uuid, TypeError> {
    match value {
        SqlValue::Uuid(u) => Ok(*u),
        SqlValue::String(s) => Uuid::parse_str(s.trim()).map_err(|_| TypeError::InvalidGuid),
        SqlValue::Binary(b) => {
            Uuid::from_slice(b.as_ref()).map_err(|_| TypeError::InvalidGuid)
        }
        _ => Err(TypeError::InvalidGuid),
    }
}

fn parse_datetime(s: &str) -> Result<NaiveDateTime, TypeError> {
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(dt);
        }
    }
    Err(TypeError::InvalidDate)
}

/// Coerce a validated datetime-ish value to a naive datetime.
fn canonical_datetime(
    value: &SqlValue,
    opts: &EncodeOptions,
) -> Result<NaiveDateTime, TypeError> {
    match value {
        SqlValue::DateTime(dt) => Ok(*dt),
        SqlValue::DateTimeOffset(dto) => Ok(if opts.use_utc {
            dto.naive_utc()
        } else {
            dto.naive_local()
        }),
        _ => Err(TypeError::UnsupportedConversion {
            from: value.type_name(),
            to: "DateTime",
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tabstream_protocol::version::TdsVersion;

    #[test]
    fn test_declarations() {
        assert_eq!(SqlType::Int.declaration(), "int");
        assert_eq!(
            SqlType::Numeric { precision: 10, scale: 2 }.declaration(),
            "numeric(10,2)"
        );
        assert_eq!(
            SqlType::NVarChar { length: VarLen::Limited(50) }.declaration(),
            "nvarchar(50)"
        );
        assert_eq!(
            SqlType::VarBinary { length: VarLen::Max }.declaration(),
            "varbinary(max)"
        );
    }

    #[test]
    fn test_wire_ids_use_nullable_forms() {
        assert_eq!(SqlType::Int.id(), TypeId::IntN);
        assert_eq!(SqlType::Bit.id(), TypeId::BitN);
        assert_eq!(SqlType::Float.id(), TypeId::FloatN);
        assert_eq!(SqlType::DateTime.id(), TypeId::DateTimeN);
        assert_eq!(
            SqlType::Numeric { precision: 18, scale: 0 }.id(),
            TypeId::NumericN
        );
    }

    #[test]
    fn test_validate_null_passes_through() {
        for ty in [SqlType::Int, SqlType::Date, SqlType::NVarChar { length: VarLen::Max }] {
            assert_eq!(ty.validate(&SqlValue::Null).unwrap(), SqlValue::Null);
        }
    }

    #[test]
    fn test_validate_int_coercions() {
        assert_eq!(
            SqlType::Int.validate(&SqlValue::SmallInt(7)).unwrap(),
            SqlValue::Int(7)
        );
        assert_eq!(
            SqlType::Int.validate(&SqlValue::String("42".into())).unwrap(),
            SqlValue::Int(42)
        );
        assert_eq!(
            SqlType::TinyInt.validate(&SqlValue::Int(300)),
            Err(TypeError::InvalidNumber)
        );
        assert_eq!(
            SqlType::Int.validate(&SqlValue::String("nope".into())),
            Err(TypeError::InvalidNumber)
        );
    }

    #[test]
    fn test_validate_date_message() {
        let err = SqlType::Date
            .validate(&SqlValue::String("invalid date".into()))
            .unwrap_err();
        assert_eq!(err, TypeError::InvalidDate);
        assert_eq!(err.to_string(), "Invalid date.");
    }

    #[test]
    fn test_validate_date_from_string() {
        assert_eq!(
            SqlType::Date
                .validate(&SqlValue::String("2024-02-29".into()))
                .unwrap(),
            SqlValue::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())
        );
    }

    #[test]
    fn test_validate_string_rejects_non_strings() {
        let err = SqlType::NVarChar { length: VarLen::Limited(10) }
            .validate(&SqlValue::Int(1))
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid string.");
    }

    #[test]
    fn test_validate_bool_coercions() {
        assert_eq!(
            SqlType::Bit.validate(&SqlValue::Int(1)).unwrap(),
            SqlValue::Bool(true)
        );
        assert_eq!(
            SqlType::Bit.validate(&SqlValue::String("false".into())).unwrap(),
            SqlValue::Bool(false)
        );
        assert_eq!(
            SqlType::Bit.validate(&SqlValue::Int(2)).unwrap_err().to_string(),
            "Invalid boolean."
        );
    }

    #[test]
    fn test_validate_uuid() {
        let err = SqlType::UniqueIdentifier
            .validate(&SqlValue::String("not-a-guid".into()))
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid GUID.");
    }

    #[test]
    fn test_encode_int_value() {
        let mut buf = TrackingBuffer::new();
        SqlType::Int
            .encode_value(&SqlValue::Int(6), &mut buf, &EncodeOptions::default())
            .unwrap();
        assert_eq!(buf.as_slice(), &[4, 6, 0, 0, 0]);
    }

    #[test]
    fn test_encode_null_markers() {
        let mut buf = TrackingBuffer::new();
        SqlType::Int
            .encode_value(&SqlValue::Null, &mut buf, &EncodeOptions::default())
            .unwrap();
        assert_eq!(buf.as_slice(), &[0]);

        let mut buf = TrackingBuffer::new();
        SqlType::NVarChar { length: VarLen::Limited(10) }
            .encode_value(&SqlValue::Null, &mut buf, &EncodeOptions::default())
            .unwrap();
        assert_eq!(buf.as_slice(), &[0xFF, 0xFF]);

        let mut buf = TrackingBuffer::new();
        SqlType::NVarChar { length: VarLen::Max }
            .encode_value(&SqlValue::Null, &mut buf, &EncodeOptions::default())
            .unwrap();
        assert_eq!(buf.as_slice(), &PLP_NULL.to_le_bytes());
    }

    #[test]
    fn test_encode_nvarchar_value() {
        let mut buf = TrackingBuffer::new();
        SqlType::NVarChar { length: VarLen::Limited(10) }
            .encode_value(
                &SqlValue::String("ab".into()),
                &mut buf,
                &EncodeOptions::default(),
            )
            .unwrap();
        assert_eq!(buf.as_slice(), &[4, 0, b'a', 0, b'b', 0]);
    }

    #[test]
    fn test_encode_nvarchar_max_uses_plp() {
        let mut buf = TrackingBuffer::new();
        SqlType::NVarChar { length: VarLen::Max }
            .encode_value(
                &SqlValue::String("ab".into()),
                &mut buf,
                &EncodeOptions::default(),
            )
            .unwrap();

        assert_eq!(&buf.as_slice()[..8], &4u64.to_le_bytes());
        assert_eq!(&buf.as_slice()[8..12], &4u32.to_le_bytes());
        assert_eq!(&buf.as_slice()[buf.len() - 4..], &0u32.to_le_bytes());
    }

    #[test]
    fn test_encode_value_too_large() {
        let mut buf = TrackingBuffer::new();
        let err = SqlType::NVarChar { length: VarLen::Limited(1) }
            .encode_value(
                &SqlValue::String("toolong".into()),
                &mut buf,
                &EncodeOptions::default(),
            )
            .unwrap_err();
        assert!(matches!(err, TypeError::ValueTooLarge { .. }));
    }

    #[test]
    fn test_type_info_roundtrips_through_decoder() {
        use tabstream_protocol::token::ColMetaData;

        let columns: Vec<(SqlType, &str)> = vec![
            (SqlType::Int, "id"),
            (SqlType::NVarChar { length: VarLen::Limited(50) }, "name"),
            (SqlType::Numeric { precision: 10, scale: 2 }, "price"),
            (SqlType::Date, "created"),
            (SqlType::Time { scale: 3 }, "at"),
        ];

        let mut buf = TrackingBuffer::new();
        buf.write_u16_le(columns.len() as u16);
        for (ty, name) in &columns {
            buf.write_u32_le(0);
            buf.write_u16_le(0x0001);
            ty.encode_type_info(&mut buf);
            buf.write_b_varchar(name);
        }

        let bytes = buf.freeze();
        let mut cursor: &[u8] = &bytes;
        let meta = ColMetaData::decode(&mut cursor, TdsVersion::V7_4).unwrap();

        assert_eq!(meta.column_count(), columns.len());
        assert_eq!(meta.columns[0].type_id, TypeId::IntN);
        assert_eq!(meta.columns[0].max_length, Some(4));
        assert_eq!(meta.columns[1].type_id, TypeId::NVarChar);
        assert_eq!(meta.columns[1].max_length, Some(100));
        assert!(meta.columns[1].collation.is_some());
        assert_eq!(meta.columns[2].precision, Some(10));
        assert_eq!(meta.columns[2].scale, Some(2));
        assert_eq!(meta.columns[3].type_id, TypeId::Date);
        assert_eq!(meta.columns[4].scale, Some(3));
        assert_eq!(meta.columns[1].name, "name");
        assert_eq!(cursor.len(), 0);
    }
}
