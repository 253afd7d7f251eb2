//! TDS token stream definitions.
//!
//! Tokens are the units of TDS response data: a tag byte followed by a
//! type-specific payload. This module defines the token structures and
//! their per-token decoders; the suspendable dispatch loop that feeds on
//! partial packet payloads lives in [`crate::stream`].

use bytes::{Buf, BufMut, Bytes};

use crate::codec::{read_b_varchar, read_us_varchar};
use crate::collation::Collation;
use crate::error::ProtocolError;
use crate::types::TypeId;
use crate::version::TdsVersion;

/// Token type identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TokenType {
    /// Column metadata (COLMETADATA).
    ColMetaData = 0x81,
    /// Row data (ROW).
    Row = 0xD1,
    /// Null bitmap compressed row (NBCROW).
    NbcRow = 0xD2,
    /// Completion of a SQL statement (DONE).
    Done = 0xFD,
    /// Completion of a stored procedure (DONEPROC).
    DoneProc = 0xFE,
    /// Completion within a stored procedure (DONEINPROC).
    DoneInProc = 0xFF,
    /// Error message (ERROR).
    Error = 0xAA,
    /// Informational message (INFO).
    Info = 0xAB,
    /// Login acknowledgment (LOGINACK).
    LoginAck = 0xAD,
    /// Environment change (ENVCHANGE).
    EnvChange = 0xE3,
    /// Return status (RETURNSTATUS).
    ReturnStatus = 0x79,
    /// Column ordering (ORDER).
    Order = 0xA9,
}

impl TokenType {
    /// Create a token type from a raw byte.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x81 => Some(Self::ColMetaData),
            0xD1 => Some(Self::Row),
            0xD2 => Some(Self::NbcRow),
            0xFD => Some(Self::Done),
            0xFE => Some(Self::DoneProc),
            0xFF => Some(Self::DoneInProc),
            0xAA => Some(Self::Error),
            0xAB => Some(Self::Info),
            0xAD => Some(Self::LoginAck),
            0xE3 => Some(Self::EnvChange),
            0x79 => Some(Self::ReturnStatus),
            0xA9 => Some(Self::Order),
            _ => None,
        }
    }
}

/// Parsed TDS token.
#[derive(Debug, Clone)]
pub enum Token {
    /// Column metadata describing result set structure.
    ColMetaData(ColMetaData),
    /// Row data.
    Row(RawRow),
    /// Null bitmap compressed row.
    NbcRow(NbcRow),
    /// Completion of a SQL statement.
    Done(Done),
    /// Completion of a stored procedure.
    DoneProc(Done),
    /// Completion within a stored procedure.
    DoneInProc(Done),
    /// Error message from server.
    Error(ServerError),
    /// Informational message from server.
    Info(ServerInfo),
    /// Login acknowledgment.
    LoginAck(LoginAck),
    /// Environment change notification.
    EnvChange(EnvChange),
    /// Return status from stored procedure.
    ReturnStatus(i32),
    /// Column ordering information.
    Order(Order),
}

impl Token {
    /// The DONE-family payload of this token, if it is one.
    #[must_use]
    pub fn as_done(&self) -> Option<&Done> {
        match self {
            Self::Done(d) | Self::DoneProc(d) | Self::DoneInProc(d) => Some(d),
            _ => None,
        }
    }
}

// =============================================================================
// DONE family
// =============================================================================

/// Done token status flag bit positions.
mod done_status_bits {
    pub const DONE_MORE: u16 = 0x0001;
    pub const DONE_ERROR: u16 = 0x0002;
    pub const DONE_INXACT: u16 = 0x0004;
    pub const DONE_COUNT: u16 = 0x0010;
    pub const DONE_ATTN: u16 = 0x0020;
    pub const DONE_SRVERROR: u16 = 0x0100;
}

/// Done status flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DoneStatus {
    /// More results follow.
    pub more: bool,
    /// Error occurred.
    pub error: bool,
    /// Transaction in progress.
    pub in_xact: bool,
    /// Row count is valid.
    pub count: bool,
    /// Attention acknowledgment.
    pub attn: bool,
    /// Server error caused statement termination.
    pub srverror: bool,
}

impl DoneStatus {
    /// Parse done status from raw bits.
    #[must_use]
    pub fn from_bits(bits: u16) -> Self {
        use done_status_bits::*;
        Self {
            more: (bits & DONE_MORE) != 0,
            error: (bits & DONE_ERROR) != 0,
            in_xact: (bits & DONE_INXACT) != 0,
            count: (bits & DONE_COUNT) != 0,
            attn: (bits & DONE_ATTN) != 0,
            srverror: (bits & DONE_SRVERROR) != 0,
        }
    }

    /// Convert to raw bits.
    #[must_use]
    pub fn to_bits(self) -> u16 {
        use done_status_bits::*;
        let mut bits = 0u16;
        if self.more {
            bits |= DONE_MORE;
        }
        if self.error {
            bits |= DONE_ERROR;
        }
        if self.in_xact {
            bits |= DONE_INXACT;
        }
        if self.count {
            bits |= DONE_COUNT;
        }
        if self.attn {
            bits |= DONE_ATTN;
        }
        if self.srverror {
            bits |= DONE_SRVERROR;
        }
        bits
    }
}

/// Completion token shared by DONE, DONEPROC and DONEINPROC.
#[derive(Debug, Clone, Copy)]
pub struct Done {
    /// Status flags.
    pub status: DoneStatus,
    /// Current command.
    pub cur_cmd: u16,
    /// Row count (valid when the COUNT bit is set).
    pub row_count: u64,
}

impl Done {
    /// Size of the DONE token in bytes (excluding the tag byte).
    pub const SIZE: usize = 12;

    /// Decode a DONE-family token from bytes.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < Self::SIZE {
            return Err(ProtocolError::UnexpectedEof);
        }

        let status = DoneStatus::from_bits(src.get_u16_le());
        let cur_cmd = src.get_u16_le();
        let row_count = src.get_u64_le();

        Ok(Self {
            status,
            cur_cmd,
            row_count,
        })
    }

    /// Encode as a DONE token, tag included.
    ///
    /// The bulk-load engine terminates its outbound token stream with a
    /// client-side DONE carrying the row count it sent.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u8(TokenType::Done as u8);
        dst.put_u16_le(self.status.to_bits());
        dst.put_u16_le(self.cur_cmd);
        dst.put_u64_le(self.row_count);
    }

    /// Check if more results follow this token.
    #[must_use]
    pub const fn has_more(&self) -> bool {
        self.status.more
    }

    /// Check if this token acknowledges an attention signal.
    #[must_use]
    pub const fn is_attention_ack(&self) -> bool {
        self.status.attn
    }
}

// =============================================================================
// ERROR / INFO
// =============================================================================

/// Server error message.
#[derive(Debug, Clone)]
pub struct ServerError {
    /// Error number.
    pub number: i32,
    /// Error state.
    pub state: u8,
    /// Error severity class.
    pub class: u8,
    /// Error message text.
    pub message: String,
    /// Server name.
    pub server: String,
    /// Procedure name.
    pub procedure: String,
    /// Line number.
    pub line: i32,
}

impl ServerError {
    /// Decode an ERROR token from bytes.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        decode_message_body(src).map(
            |(number, state, class, message, server, procedure, line)| Self {
                number,
                state,
                class,
                message,
                server,
                procedure,
                line,
            },
        )
    }

    /// Check if this is a fatal error (severity >= 20).
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        self.class >= 20
    }
}

/// Server informational message.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    /// Info number.
    pub number: i32,
    /// Info state.
    pub state: u8,
    /// Info class (severity).
    pub class: u8,
    /// Info message text.
    pub message: String,
    /// Server name.
    pub server: String,
    /// Procedure name.
    pub procedure: String,
    /// Line number.
    pub line: i32,
}

impl ServerInfo {
    /// Decode an INFO token from bytes.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        decode_message_body(src).map(
            |(number, state, class, message, server, procedure, line)| Self {
                number,
                state,
                class,
                message,
                server,
                procedure,
                line,
            },
        )
    }
}

/// Shared body of ERROR and INFO tokens.
#[allow(clippy::type_complexity)]
fn decode_message_body(
    src: &mut impl Buf,
) -> Result<(i32, u8, u8, String, String, String, i32), ProtocolError> {
    if src.remaining() < 2 {
        return Err(ProtocolError::UnexpectedEof);
    }
    let _length = src.get_u16_le();

    if src.remaining() < 6 {
        return Err(ProtocolError::UnexpectedEof);
    }
    let number = src.get_i32_le();
    let state = src.get_u8();
    let class = src.get_u8();

    let message = read_us_varchar(src).ok_or(ProtocolError::UnexpectedEof)?;
    let server = read_b_varchar(src).ok_or(ProtocolError::UnexpectedEof)?;
    let procedure = read_b_varchar(src).ok_or(ProtocolError::UnexpectedEof)?;

    if src.remaining() < 4 {
        return Err(ProtocolError::UnexpectedEof);
    }
    let line = src.get_i32_le();

    Ok((number, state, class, message, server, procedure, line))
}

// =============================================================================
// LOGINACK / ENVCHANGE / ORDER
// =============================================================================

/// Login acknowledgment token.
#[derive(Debug, Clone)]
pub struct LoginAck {
    /// Interface type.
    pub interface: u8,
    /// Raw TDS version advertised by the server.
    pub tds_version: u32,
    /// Program name.
    pub prog_name: String,
    /// Program version.
    pub prog_version: u32,
}

impl LoginAck {
    /// Decode a LOGINACK token from bytes.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < 2 {
            return Err(ProtocolError::UnexpectedEof);
        }
        let _length = src.get_u16_le();

        if src.remaining() < 5 {
            return Err(ProtocolError::UnexpectedEof);
        }
        let interface = src.get_u8();
        let tds_version = src.get_u32_le();
        let prog_name = read_b_varchar(src).ok_or(ProtocolError::UnexpectedEof)?;

        if src.remaining() < 4 {
            return Err(ProtocolError::UnexpectedEof);
        }
        let prog_version = src.get_u32_le();

        Ok(Self {
            interface,
            tds_version,
            prog_name,
            prog_version,
        })
    }
}

/// Environment change type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvChangeType {
    /// Database changed.
    Database,
    /// Language changed.
    Language,
    /// Character set changed.
    CharacterSet,
    /// Packet size renegotiated.
    PacketSize,
    /// SQL collation changed.
    SqlCollation,
    /// Transaction began.
    BeginTransaction,
    /// Transaction committed.
    CommitTransaction,
    /// Transaction rolled back.
    RollbackTransaction,
    /// Reset connection acknowledged.
    ResetConnectionAck,
    /// Any other environment change; the raw type byte is kept.
    Other(u8),
}

impl EnvChangeType {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Database,
            2 => Self::Language,
            3 => Self::CharacterSet,
            4 => Self::PacketSize,
            7 => Self::SqlCollation,
            8 => Self::BeginTransaction,
            9 => Self::CommitTransaction,
            10 => Self::RollbackTransaction,
            18 => Self::ResetConnectionAck,
            other => Self::Other(other),
        }
    }
}

/// Environment change value.
#[derive(Debug, Clone)]
pub enum EnvChangeValue {
    /// String value.
    String(String),
    /// Binary value.
    Binary(Bytes),
}

/// Environment change token.
#[derive(Debug, Clone)]
pub struct EnvChange {
    /// Type of environment change.
    pub env_type: EnvChangeType,
    /// New value.
    pub new_value: EnvChangeValue,
    /// Old value.
    pub old_value: EnvChangeValue,
}

impl EnvChange {
    /// Decode an ENVCHANGE token from bytes.
    ///
    /// The token is length-prefixed, so unmodelled change types can be
    /// consumed without understanding their payload.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < 2 {
            return Err(ProtocolError::UnexpectedEof);
        }
        let length = src.get_u16_le() as usize;
        if src.remaining() < length {
            return Err(ProtocolError::UnexpectedEof);
        }

        let mut body = src.copy_to_bytes(length);
        if !body.has_remaining() {
            return Err(ProtocolError::UnexpectedEof);
        }
        let env_type = EnvChangeType::from_u8(body.get_u8());

        let (new_value, old_value) = match env_type {
            EnvChangeType::SqlCollation
            | EnvChangeType::BeginTransaction
            | EnvChangeType::CommitTransaction
            | EnvChangeType::RollbackTransaction => {
                (Self::binary_value(&mut body), Self::binary_value(&mut body))
            }
            EnvChangeType::Other(_) => {
                // Keep the whole unparsed body as the new value.
                let rest = body.copy_to_bytes(body.remaining());
                (EnvChangeValue::Binary(rest), EnvChangeValue::Binary(Bytes::new()))
            }
            _ => (Self::string_value(&mut body), Self::string_value(&mut body)),
        };

        Ok(Self {
            env_type,
            new_value,
            old_value,
        })
    }

    fn string_value(src: &mut impl Buf) -> EnvChangeValue {
        EnvChangeValue::String(read_b_varchar(src).unwrap_or_default())
    }

    fn binary_value(src: &mut impl Buf) -> EnvChangeValue {
        if !src.has_remaining() {
            return EnvChangeValue::Binary(Bytes::new());
        }
        let len = src.get_u8() as usize;
        if src.remaining() < len {
            return EnvChangeValue::Binary(Bytes::new());
        }
        EnvChangeValue::Binary(src.copy_to_bytes(len))
    }

    /// The renegotiated packet size, if this is a packet-size change.
    #[must_use]
    pub fn packet_size(&self) -> Option<u16> {
        if self.env_type != EnvChangeType::PacketSize {
            return None;
        }
        match &self.new_value {
            EnvChangeValue::String(s) => s.parse().ok(),
            EnvChangeValue::Binary(_) => None,
        }
    }
}

/// Column ordering information.
#[derive(Debug, Clone)]
pub struct Order {
    /// Ordered column indices.
    pub columns: Vec<u16>,
}

impl Order {
    /// Decode an ORDER token from bytes.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < 2 {
            return Err(ProtocolError::UnexpectedEof);
        }
        let length = src.get_u16_le() as usize;
        if src.remaining() < length {
            return Err(ProtocolError::UnexpectedEof);
        }

        let mut columns = Vec::with_capacity(length / 2);
        for _ in 0..length / 2 {
            columns.push(src.get_u16_le());
        }

        Ok(Self { columns })
    }
}

// =============================================================================
// COLMETADATA
// =============================================================================

/// XML schema collection reference on an XML column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlSchema {
    /// Database name.
    pub db_name: String,
    /// Owning schema.
    pub owning_schema: String,
    /// Schema collection name.
    pub collection: String,
}

/// CLR type information on a UDT column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdtInfo {
    /// Maximum serialized size in bytes.
    pub max_byte_size: u16,
    /// Database name.
    pub db_name: String,
    /// Owning schema.
    pub owning_schema: String,
    /// Type name.
    pub type_name: String,
    /// Assembly qualified name.
    pub assembly_name: String,
}

/// Column definition within metadata.
///
/// Immutable once decoded; the descriptor lives for the duration of the
/// request that produced it.
#[derive(Debug, Clone)]
pub struct ColumnData {
    /// User type ID.
    pub user_type: u32,
    /// Column flags.
    pub flags: u16,
    /// Column data type.
    pub type_id: TypeId,
    /// Maximum length for variable-length types.
    pub max_length: Option<u32>,
    /// Precision for numeric types.
    pub precision: Option<u8>,
    /// Scale for numeric and scaled temporal types.
    pub scale: Option<u8>,
    /// Collation for character types.
    pub collation: Option<Collation>,
    /// Schema collection for XML columns.
    pub xml_schema: Option<XmlSchema>,
    /// CLR info for UDT columns.
    pub udt: Option<UdtInfo>,
    /// Column name.
    pub name: String,
}

impl ColumnData {
    /// Check if this column is nullable.
    #[must_use]
    pub fn is_nullable(&self) -> bool {
        (self.flags & 0x0001) != 0
    }
}

/// Column metadata token.
#[derive(Debug, Clone, Default)]
pub struct ColMetaData {
    /// Column definitions, in select-list order.
    pub columns: Vec<ColumnData>,
}

impl ColMetaData {
    /// Sentinel column count meaning no metadata follows.
    pub const NO_METADATA: u16 = 0xFFFF;

    /// Decode a COLMETADATA token from bytes.
    ///
    /// `version` decides the width of the per-column user type: `u16`
    /// below TDS 7.2, `u32` from 7.2 on.
    pub fn decode(src: &mut impl Buf, version: TdsVersion) -> Result<Self, ProtocolError> {
        if src.remaining() < 2 {
            return Err(ProtocolError::UnexpectedEof);
        }

        let column_count = src.get_u16_le();
        if column_count == Self::NO_METADATA {
            return Ok(Self::default());
        }

        let mut columns = Vec::with_capacity(column_count as usize);
        for _ in 0..column_count {
            columns.push(Self::decode_column(src, version)?);
        }

        Ok(Self { columns })
    }

    fn decode_column(src: &mut impl Buf, version: TdsVersion) -> Result<ColumnData, ProtocolError> {
        let user_type_width = if version.supports_u32_user_type() { 4 } else { 2 };
        if src.remaining() < user_type_width + 3 {
            return Err(ProtocolError::UnexpectedEof);
        }

        let user_type = if version.supports_u32_user_type() {
            src.get_u32_le()
        } else {
            u32::from(src.get_u16_le())
        };
        let flags = src.get_u16_le();
        let type_id = TypeId::try_from_u8(src.get_u8())?;

        let mut column = ColumnData {
            user_type,
            flags,
            type_id,
            max_length: None,
            precision: None,
            scale: None,
            collation: None,
            xml_schema: None,
            udt: None,
            name: String::new(),
        };

        Self::decode_type_tail(src, &mut column)?;

        column.name = read_b_varchar(src).ok_or(ProtocolError::UnexpectedEof)?;
        Ok(column)
    }

    /// Decode the per-type tail that follows the type id.
    fn decode_type_tail(src: &mut impl Buf, column: &mut ColumnData) -> Result<(), ProtocolError> {
        match column.type_id {
            // Fixed-length types carry no extra metadata.
            TypeId::Null
            | TypeId::Int1
            | TypeId::Bit
            | TypeId::Int2
            | TypeId::Int4
            | TypeId::Int8
            | TypeId::Float4
            | TypeId::Float8
            | TypeId::Money
            | TypeId::Money4
            | TypeId::DateTime
            | TypeId::DateTime4
            | TypeId::Date => {}

            // Nullable fixed variants carry a 1-byte max length.
            TypeId::IntN
            | TypeId::BitN
            | TypeId::FloatN
            | TypeId::MoneyN
            | TypeId::DateTimeN
            | TypeId::Guid => {
                if src.remaining() < 1 {
                    return Err(ProtocolError::UnexpectedEof);
                }
                column.max_length = Some(u32::from(src.get_u8()));
            }

            TypeId::Variant => {
                if src.remaining() < 4 {
                    return Err(ProtocolError::UnexpectedEof);
                }
                column.max_length = Some(src.get_u32_le());
            }

            // Character types: 2-byte length plus collation.
            TypeId::BigVarChar | TypeId::BigChar | TypeId::NVarChar | TypeId::NChar => {
                if src.remaining() < 2 {
                    return Err(ProtocolError::UnexpectedEof);
                }
                column.max_length = Some(u32::from(src.get_u16_le()));
                column.collation = Some(Collation::decode(src)?);
            }

            // Legacy LOB character types: 4-byte length plus collation.
            TypeId::Text | TypeId::NText => {
                if src.remaining() < 4 {
                    return Err(ProtocolError::UnexpectedEof);
                }
                column.max_length = Some(src.get_u32_le());
                column.collation = Some(Collation::decode(src)?);
            }

            TypeId::BigVarBinary | TypeId::BigBinary => {
                if src.remaining() < 2 {
                    return Err(ProtocolError::UnexpectedEof);
                }
                column.max_length = Some(u32::from(src.get_u16_le()));
            }

            TypeId::Image => {
                if src.remaining() < 4 {
                    return Err(ProtocolError::UnexpectedEof);
                }
                column.max_length = Some(src.get_u32_le());
            }

            TypeId::Xml => {
                if src.remaining() < 1 {
                    return Err(ProtocolError::UnexpectedEof);
                }
                if src.get_u8() != 0 {
                    let db_name = read_b_varchar(src).ok_or(ProtocolError::UnexpectedEof)?;
                    let owning_schema = read_b_varchar(src).ok_or(ProtocolError::UnexpectedEof)?;
                    let collection = read_us_varchar(src).ok_or(ProtocolError::UnexpectedEof)?;
                    column.xml_schema = Some(XmlSchema {
                        db_name,
                        owning_schema,
                        collection,
                    });
                }
            }

            TypeId::Time | TypeId::DateTime2 | TypeId::DateTimeOffset => {
                if src.remaining() < 1 {
                    return Err(ProtocolError::UnexpectedEof);
                }
                column.scale = Some(src.get_u8());
            }

            TypeId::NumericN | TypeId::DecimalN => {
                if src.remaining() < 3 {
                    return Err(ProtocolError::UnexpectedEof);
                }
                column.max_length = Some(u32::from(src.get_u8()));
                column.precision = Some(src.get_u8());
                column.scale = Some(src.get_u8());
            }

            TypeId::Udt => {
                if src.remaining() < 2 {
                    return Err(ProtocolError::UnexpectedEof);
                }
                let max_byte_size = src.get_u16_le();
                let db_name = read_b_varchar(src).ok_or(ProtocolError::UnexpectedEof)?;
                let owning_schema = read_b_varchar(src).ok_or(ProtocolError::UnexpectedEof)?;
                let type_name = read_b_varchar(src).ok_or(ProtocolError::UnexpectedEof)?;
                let assembly_name = read_us_varchar(src).ok_or(ProtocolError::UnexpectedEof)?;
                column.max_length = Some(u32::from(max_byte_size));
                column.udt = Some(UdtInfo {
                    max_byte_size,
                    db_name,
                    owning_schema,
                    type_name,
                    assembly_name,
                });
            }
        }

        Ok(())
    }

    /// Get the number of columns.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Check if this represents no metadata.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

// =============================================================================
// ROW / NBCROW
// =============================================================================

/// NULL marker for 1-byte length-prefixed values.
const BYTELEN_NULL: u8 = 0xFF;
/// NULL marker for 2-byte length-prefixed values.
const USHORTLEN_NULL: u16 = 0xFFFF;
/// NULL marker for PLP values.
const PLP_NULL: u64 = 0xFFFF_FFFF_FFFF_FFFF;

/// Raw row data: each column value captured with its wire length prefix.
#[derive(Debug, Clone)]
pub struct RawRow {
    /// Raw column values.
    pub data: Bytes,
}

impl RawRow {
    /// Decode a ROW token using the active column metadata.
    pub fn decode(src: &mut impl Buf, metadata: &ColMetaData) -> Result<Self, ProtocolError> {
        let mut data = bytes::BytesMut::new();
        for col in &metadata.columns {
            Self::decode_column_value(src, col, &mut data)?;
        }
        Ok(Self {
            data: data.freeze(),
        })
    }

    /// Decode a single column value and append it, prefix included.
    fn decode_column_value(
        src: &mut impl Buf,
        col: &ColumnData,
        dst: &mut bytes::BytesMut,
    ) -> Result<(), ProtocolError> {
        if let Some(size) = col.type_id.fixed_size() {
            if src.remaining() < size {
                return Err(ProtocolError::UnexpectedEof);
            }
            dst.extend_from_slice(&src.copy_to_bytes(size));
            return Ok(());
        }

        match col.type_id {
            // MAX-length variable types switch to PLP on the wire.
            TypeId::BigVarChar | TypeId::BigVarBinary | TypeId::NVarChar
                if col.max_length == Some(0xFFFF) =>
            {
                Self::decode_plp(src, dst)
            }
            TypeId::Xml | TypeId::Udt => Self::decode_plp(src, dst),

            TypeId::BigVarChar
            | TypeId::BigChar
            | TypeId::BigVarBinary
            | TypeId::BigBinary
            | TypeId::NVarChar
            | TypeId::NChar => Self::decode_ushortlen(src, dst),

            TypeId::Text | TypeId::NText | TypeId::Image => Self::decode_textptr(src, dst),

            TypeId::Variant => Self::decode_intlen(src, dst),

            // Everything else is 1-byte length prefixed.
            _ => Self::decode_bytelen(src, dst),
        }
    }

    /// Decode a 1-byte length-prefixed value.
    fn decode_bytelen(src: &mut impl Buf, dst: &mut bytes::BytesMut) -> Result<(), ProtocolError> {
        if src.remaining() < 1 {
            return Err(ProtocolError::UnexpectedEof);
        }
        let len = src.get_u8();
        dst.extend_from_slice(&[len]);
        if len == BYTELEN_NULL || len == 0 {
            return Ok(());
        }
        let len = len as usize;
        if src.remaining() < len {
            return Err(ProtocolError::UnexpectedEof);
        }
        dst.extend_from_slice(&src.copy_to_bytes(len));
        Ok(())
    }

    /// Decode a 2-byte length-prefixed value.
    fn decode_ushortlen(
        src: &mut impl Buf,
        dst: &mut bytes::BytesMut,
    ) -> Result<(), ProtocolError> {
        if src.remaining() < 2 {
            return Err(ProtocolError::UnexpectedEof);
        }
        let len = src.get_u16_le();
        dst.extend_from_slice(&len.to_le_bytes());
        if len == USHORTLEN_NULL || len == 0 {
            return Ok(());
        }
        let len = len as usize;
        if src.remaining() < len {
            return Err(ProtocolError::UnexpectedEof);
        }
        dst.extend_from_slice(&src.copy_to_bytes(len));
        Ok(())
    }

    /// Decode a 4-byte length-prefixed value.
    fn decode_intlen(src: &mut impl Buf, dst: &mut bytes::BytesMut) -> Result<(), ProtocolError> {
        if src.remaining() < 4 {
            return Err(ProtocolError::UnexpectedEof);
        }
        let len = src.get_u32_le();
        dst.extend_from_slice(&len.to_le_bytes());
        if len == u32::MAX || len == 0 {
            return Ok(());
        }
        let len = len as usize;
        if src.remaining() < len {
            return Err(ProtocolError::UnexpectedEof);
        }
        dst.extend_from_slice(&src.copy_to_bytes(len));
        Ok(())
    }

    /// Decode a legacy TEXT/NTEXT/IMAGE value.
    ///
    /// The wire carries a text pointer and timestamp before the data;
    /// both are dropped and the capture is normalized to PLP so readers
    /// handle one LOB layout.
    fn decode_textptr(src: &mut impl Buf, dst: &mut bytes::BytesMut) -> Result<(), ProtocolError> {
        if src.remaining() < 1 {
            return Err(ProtocolError::UnexpectedEof);
        }
        let textptr_len = src.get_u8() as usize;

        if textptr_len == 0 {
            dst.extend_from_slice(&PLP_NULL.to_le_bytes());
            return Ok(());
        }

        // Skip textptr and the 8-byte timestamp.
        if src.remaining() < textptr_len + 8 + 4 {
            return Err(ProtocolError::UnexpectedEof);
        }
        src.advance(textptr_len + 8);

        let data_len = src.get_u32_le() as usize;
        if src.remaining() < data_len {
            return Err(ProtocolError::UnexpectedEof);
        }

        dst.extend_from_slice(&(data_len as u64).to_le_bytes());
        dst.extend_from_slice(&(data_len as u32).to_le_bytes());
        dst.extend_from_slice(&src.copy_to_bytes(data_len));
        dst.extend_from_slice(&0u32.to_le_bytes());
        Ok(())
    }

    /// Decode a PLP (Partially Length-Prefixed) value.
    fn decode_plp(src: &mut impl Buf, dst: &mut bytes::BytesMut) -> Result<(), ProtocolError> {
        if src.remaining() < 8 {
            return Err(ProtocolError::UnexpectedEof);
        }

        let total_len = src.get_u64_le();
        dst.extend_from_slice(&total_len.to_le_bytes());

        if total_len == PLP_NULL {
            return Ok(());
        }

        loop {
            if src.remaining() < 4 {
                return Err(ProtocolError::UnexpectedEof);
            }
            let chunk_len = src.get_u32_le();
            dst.extend_from_slice(&chunk_len.to_le_bytes());

            if chunk_len == 0 {
                return Ok(());
            }

            let chunk_len = chunk_len as usize;
            if src.remaining() < chunk_len {
                return Err(ProtocolError::UnexpectedEof);
            }
            dst.extend_from_slice(&src.copy_to_bytes(chunk_len));
        }
    }
}

/// Null bitmap compressed row.
#[derive(Debug, Clone)]
pub struct NbcRow {
    /// Null bitmap, one bit per column, LSB first.
    pub null_bitmap: Vec<u8>,
    /// Raw non-null column values.
    pub data: Bytes,
}

impl NbcRow {
    /// Decode an NBCROW token using the active column metadata.
    pub fn decode(src: &mut impl Buf, metadata: &ColMetaData) -> Result<Self, ProtocolError> {
        let col_count = metadata.columns.len();
        let bitmap_len = col_count.div_ceil(8);

        if src.remaining() < bitmap_len {
            return Err(ProtocolError::UnexpectedEof);
        }

        let mut null_bitmap = vec![0u8; bitmap_len];
        src.copy_to_slice(&mut null_bitmap);

        let mut data = bytes::BytesMut::new();
        for (i, col) in metadata.columns.iter().enumerate() {
            let is_null = (null_bitmap[i / 8] & (1 << (i % 8))) != 0;
            if !is_null {
                RawRow::decode_column_value(src, col, &mut data)?;
            }
        }

        Ok(Self {
            null_bitmap,
            data: data.freeze(),
        })
    }

    /// Check if the column at the given index is NULL.
    #[must_use]
    pub fn is_null(&self, column_index: usize) -> bool {
        let byte_idx = column_index / 8;
        if byte_idx >= self.null_bitmap.len() {
            return true;
        }
        (self.null_bitmap[byte_idx] & (1 << (column_index % 8))) != 0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use bytes::{BufMut, BytesMut};

    fn b_varchar(s: &str) -> Vec<u8> {
        let mut buf = BytesMut::new();
        crate::codec::write_b_varchar(&mut buf, s);
        buf.to_vec()
    }

    #[test]
    fn test_done_roundtrip() {
        let done = Done {
            status: DoneStatus {
                count: true,
                ..Default::default()
            },
            cur_cmd: 193,
            row_count: 42,
        };

        let mut buf = BytesMut::new();
        done.encode(&mut buf);
        assert_eq!(buf[0], TokenType::Done as u8);

        let mut cursor = &buf[1..];
        let decoded = Done::decode(&mut cursor).unwrap();
        assert_eq!(decoded.status, done.status);
        assert_eq!(decoded.cur_cmd, 193);
        assert_eq!(decoded.row_count, 42);
    }

    #[test]
    fn test_done_attention_ack() {
        let done = Done {
            status: DoneStatus::from_bits(0x0020),
            cur_cmd: 0,
            row_count: 0,
        };
        assert!(done.is_attention_ack());
        assert!(!done.has_more());
    }

    #[test]
    fn test_colmetadata_no_columns() {
        let mut cursor: &[u8] = &[0xFF, 0xFF];
        let meta = ColMetaData::decode(&mut cursor, TdsVersion::V7_4).unwrap();
        assert!(meta.is_empty());
    }

    #[test]
    fn test_colmetadata_int_column() {
        let mut data = BytesMut::new();
        data.put_u16_le(1);
        data.put_u32_le(2); // user_type
        data.put_u16_le(3); // flags
        data.put_u8(TypeId::Int4 as u8);
        data.extend_from_slice(&b_varchar("id"));

        let mut cursor: &[u8] = &data;
        let meta = ColMetaData::decode(&mut cursor, TdsVersion::V7_4).unwrap();

        assert_eq!(meta.column_count(), 1);
        let col = &meta.columns[0];
        assert_eq!(col.user_type, 2);
        assert_eq!(col.flags, 3);
        assert_eq!(col.type_id, TypeId::Int4);
        assert_eq!(col.name, "id");
        assert!(col.is_nullable());
    }

    #[test]
    fn test_colmetadata_user_type_is_u16_before_7_2() {
        let mut data = BytesMut::new();
        data.put_u16_le(1);
        data.put_u16_le(2); // user_type, narrow form
        data.put_u16_le(0);
        data.put_u8(TypeId::Int4 as u8);
        data.extend_from_slice(&b_varchar("id"));

        let mut cursor: &[u8] = &data;
        let meta = ColMetaData::decode(&mut cursor, TdsVersion::V7_1).unwrap();
        assert_eq!(meta.columns[0].user_type, 2);
    }

    #[test]
    fn test_colmetadata_many_int_columns() {
        let mut data = BytesMut::new();
        data.put_u16_le(1024);
        for _ in 0..1024 {
            data.put_u32_le(2);
            data.put_u16_le(3);
            data.put_u8(TypeId::Int4 as u8);
            data.extend_from_slice(&b_varchar("name"));
        }

        let mut cursor: &[u8] = &data;
        let meta = ColMetaData::decode(&mut cursor, TdsVersion::V7_4).unwrap();

        assert_eq!(meta.column_count(), 1024);
        for col in &meta.columns {
            assert_eq!(col.user_type, 2);
            assert_eq!(col.flags, 3);
            assert_eq!(col.name, "name");
        }
    }

    #[test]
    fn test_colmetadata_nvarchar_column() {
        let mut data = BytesMut::new();
        data.put_u16_le(1);
        data.put_u32_le(0);
        data.put_u16_le(1);
        data.put_u8(TypeId::NVarChar as u8);
        data.put_u16_le(100); // max byte length
        data.extend_from_slice(&[0x09, 0x04, 0xD0, 0x00, 0x34]); // collation
        data.extend_from_slice(&b_varchar("name"));

        let mut cursor: &[u8] = &data;
        let meta = ColMetaData::decode(&mut cursor, TdsVersion::V7_4).unwrap();

        let col = &meta.columns[0];
        assert_eq!(col.max_length, Some(100));
        let collation = col.collation.unwrap();
        assert_eq!(collation.lcid, 0x0409);
        assert_eq!(collation.sort_id, 0x34);
        assert_eq!(col.name, "name");
    }

    #[test]
    fn test_colmetadata_numeric_column() {
        let mut data = BytesMut::new();
        data.put_u16_le(1);
        data.put_u32_le(0);
        data.put_u16_le(1);
        data.put_u8(TypeId::NumericN as u8);
        data.put_u8(9); // length
        data.put_u8(10); // precision
        data.put_u8(2); // scale
        data.extend_from_slice(&b_varchar("price"));

        let mut cursor: &[u8] = &data;
        let meta = ColMetaData::decode(&mut cursor, TdsVersion::V7_4).unwrap();

        let col = &meta.columns[0];
        assert_eq!(col.max_length, Some(9));
        assert_eq!(col.precision, Some(10));
        assert_eq!(col.scale, Some(2));
    }

    #[test]
    fn test_colmetadata_xml_with_schema() {
        let mut data = BytesMut::new();
        data.put_u16_le(1);
        data.put_u32_le(0);
        data.put_u16_le(1);
        data.put_u8(TypeId::Xml as u8);
        data.put_u8(1); // schema present
        data.extend_from_slice(&b_varchar("db"));
        data.extend_from_slice(&b_varchar("dbo"));
        {
            let mut tail = BytesMut::new();
            crate::codec::write_us_varchar(&mut tail, "coll");
            data.extend_from_slice(&tail);
        }
        data.extend_from_slice(&b_varchar("doc"));

        let mut cursor: &[u8] = &data;
        let meta = ColMetaData::decode(&mut cursor, TdsVersion::V7_4).unwrap();

        let col = &meta.columns[0];
        let schema = col.xml_schema.as_ref().unwrap();
        assert_eq!(schema.db_name, "db");
        assert_eq!(schema.owning_schema, "dbo");
        assert_eq!(schema.collection, "coll");
        assert_eq!(col.name, "doc");
    }

    #[test]
    fn test_colmetadata_udt_column() {
        let mut data = BytesMut::new();
        data.put_u16_le(1);
        data.put_u32_le(0);
        data.put_u16_le(1);
        data.put_u8(TypeId::Udt as u8);
        data.put_u16_le(8000);
        data.extend_from_slice(&b_varchar("db"));
        data.extend_from_slice(&b_varchar("dbo"));
        data.extend_from_slice(&b_varchar("Point"));
        {
            let mut tail = BytesMut::new();
            crate::codec::write_us_varchar(&mut tail, "Spatial, Version=1.0");
            data.extend_from_slice(&tail);
        }
        data.extend_from_slice(&b_varchar("location"));

        let mut cursor: &[u8] = &data;
        let meta = ColMetaData::decode(&mut cursor, TdsVersion::V7_4).unwrap();

        let udt = meta.columns[0].udt.as_ref().unwrap();
        assert_eq!(udt.max_byte_size, 8000);
        assert_eq!(udt.type_name, "Point");
        assert_eq!(udt.assembly_name, "Spatial, Version=1.0");
    }

    #[test]
    fn test_colmetadata_unknown_type_is_fatal() {
        let mut data = BytesMut::new();
        data.put_u16_le(1);
        data.put_u32_le(0);
        data.put_u16_le(0);
        data.put_u8(0x99);

        let mut cursor: &[u8] = &data;
        assert!(matches!(
            ColMetaData::decode(&mut cursor, TdsVersion::V7_4),
            Err(ProtocolError::UnknownTypeId(0x99))
        ));
    }

    #[test]
    fn test_error_token_decode() {
        let mut data = BytesMut::new();
        let mut body = BytesMut::new();
        body.put_i32_le(2601);
        body.put_u8(1); // state
        body.put_u8(14); // class
        crate::codec::write_us_varchar(&mut body, "Cannot insert duplicate key row.");
        crate::codec::write_b_varchar(&mut body, "server01");
        crate::codec::write_b_varchar(&mut body, "");
        body.put_i32_le(1);
        data.put_u16_le(body.len() as u16);
        data.extend_from_slice(&body);

        let mut cursor: &[u8] = &data;
        let err = ServerError::decode(&mut cursor).unwrap();

        assert_eq!(err.number, 2601);
        assert_eq!(err.class, 14);
        assert_eq!(err.message, "Cannot insert duplicate key row.");
        assert_eq!(err.server, "server01");
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_env_change_packet_size() {
        let mut body = BytesMut::new();
        body.put_u8(4); // PacketSize
        crate::codec::write_b_varchar(&mut body, "8192");
        crate::codec::write_b_varchar(&mut body, "4096");

        let mut data = BytesMut::new();
        data.put_u16_le(body.len() as u16);
        data.extend_from_slice(&body);

        let mut cursor: &[u8] = &data;
        let change = EnvChange::decode(&mut cursor).unwrap();

        assert_eq!(change.env_type, EnvChangeType::PacketSize);
        assert_eq!(change.packet_size(), Some(8192));
    }

    #[test]
    fn test_env_change_unknown_type_is_skipped() {
        let mut data = BytesMut::new();
        data.put_u16_le(4);
        data.put_u8(42); // unmodelled type
        data.extend_from_slice(&[1, 2, 3]);
        data.put_u8(0xFD); // next token must stay in the buffer

        let mut cursor: &[u8] = &data;
        let change = EnvChange::decode(&mut cursor).unwrap();
        assert_eq!(change.env_type, EnvChangeType::Other(42));
        assert_eq!(cursor, &[0xFD]);
    }

    #[test]
    fn test_raw_row_fixed_int() {
        let metadata = ColMetaData {
            columns: vec![int4_column("id")],
        };

        let mut cursor: &[u8] = &[0x2A, 0x00, 0x00, 0x00];
        let row = RawRow::decode(&mut cursor, &metadata).unwrap();
        assert_eq!(&row.data[..], &[0x2A, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_raw_row_nullable_int() {
        let metadata = ColMetaData {
            columns: vec![intn_column("id")],
        };

        let mut cursor: &[u8] = &[0x04, 0x2A, 0x00, 0x00, 0x00];
        let row = RawRow::decode(&mut cursor, &metadata).unwrap();
        assert_eq!(row.data[0], 4);
        assert_eq!(&row.data[1..], &[0x2A, 0x00, 0x00, 0x00]);

        let mut cursor: &[u8] = &[BYTELEN_NULL];
        let row = RawRow::decode(&mut cursor, &metadata).unwrap();
        assert_eq!(&row.data[..], &[BYTELEN_NULL]);
    }

    #[test]
    fn test_raw_row_plp_chunks() {
        let mut col = int4_column("doc");
        col.type_id = TypeId::NVarChar;
        col.max_length = Some(0xFFFF);
        let metadata = ColMetaData {
            columns: vec![col],
        };

        let mut data = BytesMut::new();
        data.put_u64_le(4); // total length
        data.put_u32_le(2);
        data.extend_from_slice(&[0x61, 0x00]);
        data.put_u32_le(2);
        data.extend_from_slice(&[0x62, 0x00]);
        data.put_u32_le(0); // terminator

        let mut cursor: &[u8] = &data;
        let row = RawRow::decode(&mut cursor, &metadata).unwrap();
        assert_eq!(row.data.len(), data.len());
    }

    #[test]
    fn test_nbc_row_bitmap() {
        let metadata = ColMetaData {
            columns: vec![int4_column("a"), int4_column("b"), int4_column("c")],
        };

        // Columns a and c null (bits 0 and 2); only b has data.
        let mut data = BytesMut::new();
        data.put_u8(0b0000_0101);
        data.put_i32_le(7);

        let mut cursor: &[u8] = &data;
        let row = NbcRow::decode(&mut cursor, &metadata).unwrap();

        assert!(row.is_null(0));
        assert!(!row.is_null(1));
        assert!(row.is_null(2));
        assert_eq!(&row.data[..], &7i32.to_le_bytes());
    }

    fn int4_column(name: &str) -> ColumnData {
        ColumnData {
            user_type: 0,
            flags: 0,
            type_id: TypeId::Int4,
            max_length: None,
            precision: None,
            scale: None,
            collation: None,
            xml_schema: None,
            udt: None,
            name: name.to_string(),
        }
    }

    fn intn_column(name: &str) -> ColumnData {
        ColumnData {
            max_length: Some(4),
            type_id: TypeId::IntN,
            ..int4_column(name)
        }
    }
}
