//! TDS data type identifiers.
//!
//! These are the wire ids carried in COLMETADATA and bulk column
//! descriptors. The value-level registry (declarations, validation,
//! encoding) lives in the `tabstream-types` crate; this module only
//! knows the wire shape of each id.

use crate::error::ProtocolError;

/// TDS data type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeId {
    // Fixed-length types (no length prefix)
    /// Null type.
    Null = 0x1F,
    /// 8-bit unsigned integer (TINYINT).
    Int1 = 0x30,
    /// Bit (boolean).
    Bit = 0x32,
    /// 16-bit signed integer (SMALLINT).
    Int2 = 0x34,
    /// 32-bit signed integer (INT).
    Int4 = 0x38,
    /// 64-bit signed integer (BIGINT).
    Int8 = 0x7F,
    /// 32-bit floating point (REAL).
    Float4 = 0x3B,
    /// 64-bit floating point (FLOAT).
    Float8 = 0x3E,
    /// 8-byte money.
    Money = 0x3C,
    /// 4-byte money (SMALLMONEY).
    Money4 = 0x7A,
    /// 8-byte datetime.
    DateTime = 0x3D,
    /// 4-byte small datetime.
    DateTime4 = 0x3A,
    /// Date (3 bytes, SQL Server 2008+).
    Date = 0x28,

    // Nullable variable-length forms (1-byte length prefix)
    /// GUID (UNIQUEIDENTIFIER).
    Guid = 0x24,
    /// Variable-length integer.
    IntN = 0x26,
    /// Variable-length bit.
    BitN = 0x68,
    /// Variable-length decimal.
    DecimalN = 0x6A,
    /// Variable-length numeric.
    NumericN = 0x6C,
    /// Variable-length float.
    FloatN = 0x6D,
    /// Variable-length money.
    MoneyN = 0x6E,
    /// Variable-length datetime.
    DateTimeN = 0x6F,

    // Counted types with 2-byte length
    /// Large variable-length character.
    BigVarChar = 0xA7,
    /// Large fixed-length character.
    BigChar = 0xAF,
    /// Large variable-length binary.
    BigVarBinary = 0xA5,
    /// Large fixed-length binary.
    BigBinary = 0xAD,

    // Unicode types
    /// Variable-length Unicode character.
    NVarChar = 0xE7,
    /// Fixed-length Unicode character.
    NChar = 0xEF,

    // Large object types
    /// Text (deprecated, use varchar(max)).
    Text = 0x23,
    /// NText (deprecated, use nvarchar(max)).
    NText = 0x63,
    /// Image (deprecated, use varbinary(max)).
    Image = 0x22,

    // Scaled temporal types (SQL Server 2008+)
    /// Time with variable precision.
    Time = 0x29,
    /// DateTime2 with variable precision.
    DateTime2 = 0x2A,
    /// DateTimeOffset with variable precision.
    DateTimeOffset = 0x2B,

    // Special types
    /// SQL Variant.
    Variant = 0x62,
    /// User-defined type.
    Udt = 0xF0,
    /// XML type.
    Xml = 0xF1,
}

impl TypeId {
    /// Create a type id from a raw byte.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x1F => Some(Self::Null),
            0x30 => Some(Self::Int1),
            0x32 => Some(Self::Bit),
            0x34 => Some(Self::Int2),
            0x38 => Some(Self::Int4),
            0x7F => Some(Self::Int8),
            0x3B => Some(Self::Float4),
            0x3E => Some(Self::Float8),
            0x3C => Some(Self::Money),
            0x7A => Some(Self::Money4),
            0x3D => Some(Self::DateTime),
            0x3A => Some(Self::DateTime4),
            0x28 => Some(Self::Date),
            0x24 => Some(Self::Guid),
            0x26 => Some(Self::IntN),
            0x68 => Some(Self::BitN),
            0x6A => Some(Self::DecimalN),
            0x6C => Some(Self::NumericN),
            0x6D => Some(Self::FloatN),
            0x6E => Some(Self::MoneyN),
            0x6F => Some(Self::DateTimeN),
            0xA7 => Some(Self::BigVarChar),
            0xAF => Some(Self::BigChar),
            0xA5 => Some(Self::BigVarBinary),
            0xAD => Some(Self::BigBinary),
            0xE7 => Some(Self::NVarChar),
            0xEF => Some(Self::NChar),
            0x23 => Some(Self::Text),
            0x63 => Some(Self::NText),
            0x22 => Some(Self::Image),
            0x29 => Some(Self::Time),
            0x2A => Some(Self::DateTime2),
            0x2B => Some(Self::DateTimeOffset),
            0x62 => Some(Self::Variant),
            0xF0 => Some(Self::Udt),
            0xF1 => Some(Self::Xml),
            _ => None,
        }
    }

    /// Create a type id from a raw byte, failing on unknown ids.
    ///
    /// An unrecognised id in column metadata poisons the whole stream,
    /// so this is a fatal protocol error rather than a soft fallback.
    pub fn try_from_u8(value: u8) -> Result<Self, ProtocolError> {
        Self::from_u8(value).ok_or(ProtocolError::UnknownTypeId(value))
    }

    /// The fixed on-wire size of the value, if the type has one.
    #[must_use]
    pub const fn fixed_size(&self) -> Option<usize> {
        match self {
            Self::Null => Some(0),
            Self::Int1 | Self::Bit => Some(1),
            Self::Int2 => Some(2),
            Self::Int4 | Self::Float4 | Self::Money4 | Self::DateTime4 => Some(4),
            Self::Int8 | Self::Float8 | Self::Money | Self::DateTime => Some(8),
            _ => None,
        }
    }

    /// Check if this is a fixed-length type.
    #[must_use]
    pub const fn is_fixed_length(&self) -> bool {
        self.fixed_size().is_some()
    }

    /// Check if this type can use PLP (Partially Length-Prefixed) encoding.
    #[must_use]
    pub const fn is_plp_capable(&self) -> bool {
        matches!(
            self,
            Self::BigVarChar | Self::BigVarBinary | Self::NVarChar | Self::Xml | Self::Udt
        )
    }

    /// Check if this is a Unicode string type.
    #[must_use]
    pub const fn is_unicode(&self) -> bool {
        matches!(self, Self::NChar | Self::NVarChar | Self::NText)
    }
}
