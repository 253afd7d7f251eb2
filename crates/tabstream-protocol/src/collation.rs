//! SQL Server collation descriptors.
//!
//! A collation travels as a fixed 5-byte block inside COLMETADATA for
//! every character column: 20 bits of LCID, eight comparison flag bits,
//! a 4-bit version, and a sort id. The resolved codepage decides how
//! VARCHAR payloads are decoded.
//!
//! Layout (`LL LL FL VF SS`):
//!
//! ```text
//! byte 0   lcid bits 0-7
//! byte 1   lcid bits 8-15
//! byte 2   low nybble: lcid bits 16-19, high nybble: flag bits 0-3
//! byte 3   low nybble: flag bits 4-7, high nybble: version
//! byte 4   sort id
//! ```

use bitflags::bitflags;
use bytes::{Buf, BufMut};

use crate::error::ProtocolError;

/// Size of the collation block in bytes.
pub const COLLATION_SIZE: usize = 5;

bitflags! {
    /// Collation comparison flags.
    ///
    /// The raw value combines the high nybble of byte 2 with the low
    /// nybble of byte 3.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CollationFlags: u8 {
        /// Case-insensitive comparison.
        const IGNORE_CASE = 0x10;
        /// Accent-insensitive comparison.
        const IGNORE_ACCENT = 0x20;
        /// Width-insensitive comparison.
        const IGNORE_WIDTH = 0x40;
        /// Kana-type-insensitive comparison.
        const IGNORE_KANA = 0x80;
        /// Binary sort order.
        const BINARY = 0x01;
        /// Binary code-point sort order.
        const BINARY2 = 0x02;
        /// UTF-8 storage (SQL Server 2019+).
        const UTF8 = 0x04;
        /// Reserved bit.
        const RESERVED = 0x08;
    }
}

/// A decoded SQL Server collation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Collation {
    /// Locale ID (20 bits).
    pub lcid: u32,
    /// Comparison flags.
    pub flags: CollationFlags,
    /// Collation version (4 bits).
    pub version: u8,
    /// Sort id; 0 means the LCID selects the codepage.
    pub sort_id: u8,
}

impl Collation {
    /// Decode the 5-byte collation block.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < COLLATION_SIZE {
            return Err(ProtocolError::UnexpectedEof);
        }

        let b0 = src.get_u8();
        let b1 = src.get_u8();
        let b2 = src.get_u8();
        let b3 = src.get_u8();
        let b4 = src.get_u8();

        let lcid = (u32::from(b2 & 0x0F) << 16) | (u32::from(b1) << 8) | u32::from(b0);
        let flags = CollationFlags::from_bits_retain((b2 & 0xF0) | (b3 & 0x0F));
        let version = (b3 & 0xF0) >> 4;

        Ok(Self {
            lcid,
            flags,
            version,
            sort_id: b4,
        })
    }

    /// Encode the 5-byte collation block (exact inverse of `decode`).
    pub fn encode(&self, dst: &mut impl BufMut) {
        let bits = self.flags.bits();
        dst.put_u8((self.lcid & 0xFF) as u8);
        dst.put_u8(((self.lcid >> 8) & 0xFF) as u8);
        dst.put_u8((((self.lcid >> 16) & 0x0F) as u8) | (bits & 0xF0));
        dst.put_u8((bits & 0x0F) | (self.version << 4));
        dst.put_u8(self.sort_id);
    }

    /// Resolve the codepage name for this collation.
    ///
    /// Resolution order: the UTF-8 flag wins outright; otherwise a zero
    /// sort id selects by LCID and a non-zero sort id selects by sort id.
    /// Unknown locales fall back to `"CP1252"`.
    #[must_use]
    pub fn codepage(&self) -> &'static str {
        if self.flags.contains(CollationFlags::UTF8) {
            return "utf8";
        }

        let resolved = if self.sort_id == 0 {
            codepage_for_lcid(self.lcid)
        } else {
            codepage_for_sort_id(self.sort_id)
        };

        resolved.unwrap_or("CP1252")
    }

    /// Returns the character encoding for this collation's codepage.
    ///
    /// `None` means either no transcoding is needed (UTF-8 collations)
    /// or the codepage has no `encoding_rs` counterpart (the OEM
    /// codepages 437/850); callers fall back to Windows-1252.
    #[must_use]
    pub fn encoding(&self) -> Option<&'static encoding_rs::Encoding> {
        encoding_for_codepage(self.codepage())
    }
}

/// Look up the codepage for a locale id.
///
/// The match is on the primary language id (low 16 bits); sort variants
/// in bits 16-19 share their base locale's codepage.
#[must_use]
pub fn codepage_for_lcid(lcid: u32) -> Option<&'static str> {
    match lcid & 0xFFFF {
        // Japanese
        0x0411 => Some("CP932"),

        // Chinese (Simplified): PRC, Singapore
        0x0804 | 0x1004 => Some("CP936"),

        // Chinese (Traditional): Taiwan, Hong Kong, Macao
        0x0404 | 0x0C04 | 0x1404 => Some("CP950"),

        // Korean
        0x0412 => Some("CP949"),

        // Thai
        0x041E => Some("CP874"),

        // Vietnamese
        0x042A => Some("CP1258"),

        // Central and Eastern European
        0x0405 | 0x0415 | 0x040E | 0x041A | 0x081A | 0x101A | 0x141A | 0x041B | 0x0424
        | 0x0418 | 0x041C => Some("CP1250"),

        // Cyrillic
        0x0419 | 0x0422 | 0x0423 | 0x0402 | 0x042F | 0x0C1A | 0x201A | 0x0440 | 0x0843
        | 0x0444 | 0x0450 => Some("CP1251"),

        // Greek
        0x0408 => Some("CP1253"),

        // Turkish, Azerbaijani (Latin)
        0x041F | 0x042C => Some("CP1254"),

        // Hebrew
        0x040D => Some("CP1255"),

        // Arabic script: Arabic variants, Farsi, Urdu
        0x0401 | 0x0801 | 0x0C01 | 0x1001 | 0x1401 | 0x1801 | 0x1C01 | 0x2001 | 0x2401
        | 0x2801 | 0x2C01 | 0x3001 | 0x3401 | 0x3801 | 0x3C01 | 0x4001 | 0x0429 | 0x0420 => {
            Some("CP1256")
        }

        // Baltic: Estonian, Latvian, Lithuanian
        0x0425 | 0x0426 | 0x0427 => Some("CP1257"),

        // Western European and others sharing 1252
        0x0409 | 0x0809 | 0x0C09 | 0x1009 | 0x1409 | 0x1809 | 0x040C | 0x080C | 0x0C0C
        | 0x100C | 0x140C | 0x0407 | 0x0807 | 0x0C07 | 0x1007 | 0x1407 | 0x040A | 0x080A
        | 0x0C0A | 0x0410 | 0x0810 | 0x0416 | 0x0816 | 0x0413 | 0x0813 | 0x0406 | 0x0414
        | 0x0814 | 0x041D | 0x081D | 0x040B | 0x040F | 0x0403 | 0x042D | 0x0436 | 0x0421
        | 0x043E => Some("CP1252"),

        _ => None,
    }
}

/// Look up the codepage for a SQL sort id (pre-Windows collations).
#[must_use]
pub fn codepage_for_sort_id(sort_id: u8) -> Option<&'static str> {
    match sort_id {
        30..=34 => Some("CP437"),
        40..=44 | 49 | 55..=61 => Some("CP850"),
        50..=54 | 71..=75 | 183..=186 => Some("CP1252"),
        80..=89 => Some("CP1250"),
        104..=108 => Some("CP1251"),
        112..=114 | 120..=124 => Some("CP1253"),
        128..=130 => Some("CP1254"),
        136..=138 => Some("CP1255"),
        144..=146 => Some("CP1256"),
        152..=158 => Some("CP1257"),
        192 | 193 | 200 => Some("CP932"),
        194 | 195 | 201 => Some("CP949"),
        196 | 197 | 202 => Some("CP950"),
        198 | 199 | 203 => Some("CP936"),
        204..=206 => Some("CP874"),
        210..=217 => Some("CP1252"),
        _ => None,
    }
}

/// Map a codepage name to its `encoding_rs` encoding.
///
/// The OEM codepages (437, 850) predate the web encoding set and have no
/// `encoding_rs` counterpart.
#[must_use]
pub fn encoding_for_codepage(codepage: &str) -> Option<&'static encoding_rs::Encoding> {
    match codepage {
        "utf8" => Some(encoding_rs::UTF_8),
        "CP874" => Some(encoding_rs::WINDOWS_874),
        "CP932" => Some(encoding_rs::SHIFT_JIS),
        "CP936" => Some(encoding_rs::GB18030),
        "CP949" => Some(encoding_rs::EUC_KR),
        "CP950" => Some(encoding_rs::BIG5),
        "CP1250" => Some(encoding_rs::WINDOWS_1250),
        "CP1251" => Some(encoding_rs::WINDOWS_1251),
        "CP1252" => Some(encoding_rs::WINDOWS_1252),
        "CP1253" => Some(encoding_rs::WINDOWS_1253),
        "CP1254" => Some(encoding_rs::WINDOWS_1254),
        "CP1255" => Some(encoding_rs::WINDOWS_1255),
        "CP1256" => Some(encoding_rs::WINDOWS_1256),
        "CP1257" => Some(encoding_rs::WINDOWS_1257),
        "CP1258" => Some(encoding_rs::WINDOWS_1258),
        _ => None,
    }
}
