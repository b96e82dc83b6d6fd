//! Column metadata and the wire-type → semantic-type mapping.
//! Ported from `connection::packet::result_set_column_packet`, generalized
//! from "parse and discard" (the CDC reader only needed field counts) to a
//! full column-definition parser plus the wire-type disambiguation rules.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};
use common::err::decode_error::ReError;
use common::err::CResult;

use crate::codec::{read_len_enc_bytes, read_len_enc_int};

pub const BINARY_CHARSET: u16 = 63;

/// Wire-level column type code (the raw byte from `Protocol::ColumnDefinition`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireColumnType {
    Decimal,
    Tiny,
    Short,
    Long,
    Float,
    Double,
    Null,
    Timestamp,
    LongLong,
    Int24,
    Date,
    Time,
    DateTime,
    Year,
    NewDate,
    VarChar,
    Bit,
    Timestamp2,
    DateTime2,
    Time2,
    Json,
    NewDecimal,
    Enum,
    Set,
    TinyBlob,
    MediumBlob,
    LongBlob,
    Blob,
    VarString,
    String,
    Geometry,
}

impl TryFrom<u8> for WireColumnType {
    type Error = ReError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        use WireColumnType::*;
        Ok(match code {
            0x00 => Decimal,
            0x01 => Tiny,
            0x02 => Short,
            0x03 => Long,
            0x04 => Float,
            0x05 => Double,
            0x06 => Null,
            0x07 => Timestamp,
            0x08 => LongLong,
            0x09 => Int24,
            0x0a => Date,
            0x0b => Time,
            0x0c => DateTime,
            0x0d => Year,
            0x0e => NewDate,
            0x0f => VarChar,
            0x10 => Bit,
            0x11 => Timestamp2,
            0x12 => DateTime2,
            0x13 => Time2,
            0xf5 => Json,
            0xf6 => NewDecimal,
            0xf7 => Enum,
            0xf8 => Set,
            0xf9 => TinyBlob,
            0xfa => MediumBlob,
            0xfb => LongBlob,
            0xfc => Blob,
            0xfd => VarString,
            0xfe => String,
            0xff => Geometry,
            other => {
                return Err(ReError::ProtocolValue(format!(
                    "unknown column wire type 0x{other:02x}"
                )))
            }
        })
    }
}

/// The semantic column type surfaced to applications, after applying the
/// disambiguators (binary-charset strings become blobs;
/// `tiny(1)` stays `TinyInt`, never `Bool`; timestamp vs datetime is purely
/// the wire code).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Decimal,
    TinyInt,
    SmallInt,
    MediumInt,
    Int,
    BigInt,
    Float,
    Double,
    Null,
    Timestamp,
    Date,
    Time,
    DateTime,
    Year,
    VarChar,
    Bit,
    Json,
    NewDecimal,
    Enum,
    Set,
    TinyBlob,
    MediumBlob,
    LongBlob,
    Blob,
    VarString,
    String,
    Geometry,
}

/// Column definition flags. Hand-rolled rather than generated, following the
/// same "single integer + has()" shape as capabilities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnFlags(u16);

pub const NOT_NULL_FLAG: u16 = 0x0001;
pub const PRI_KEY_FLAG: u16 = 0x0002;
pub const UNIQUE_KEY_FLAG: u16 = 0x0004;
pub const MULTIPLE_KEY_FLAG: u16 = 0x0008;
pub const BLOB_FLAG: u16 = 0x0010;
pub const UNSIGNED_FLAG: u16 = 0x0020;
pub const ZEROFILL_FLAG: u16 = 0x0040;
pub const BINARY_FLAG: u16 = 0x0080;
pub const ENUM_FLAG: u16 = 0x0100;
pub const AUTO_INCREMENT_FLAG: u16 = 0x0200;
pub const TIMESTAMP_FLAG: u16 = 0x0400;
pub const SET_FLAG: u16 = 0x0800;
pub const NO_DEFAULT_VALUE_FLAG: u16 = 0x1000;
pub const ON_UPDATE_NOW_FLAG: u16 = 0x2000;

impl ColumnFlags {
    pub fn new(bits: u16) -> Self {
        ColumnFlags(bits)
    }

    pub fn bits(self) -> u16 {
        self.0
    }

    pub fn has(self, mask: u16) -> bool {
        (self.0 & mask) != 0
    }
}

/// Controls how much schema/table/column naming metadata is retained
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaMode {
    Full,
    Minimal,
}

/// Per-column metadata. Naming fields are `None` under
/// `MetaMode::Minimal`.
#[derive(Debug, Clone)]
pub struct Metadata {
    pub database: Option<String>,
    pub virtual_table: Option<String>,
    pub physical_table: Option<String>,
    pub virtual_name: Option<String>,
    pub physical_name: Option<String>,
    pub collation_id: u16,
    pub max_length: u32,
    pub wire_type: WireColumnType,
    pub flags: ColumnFlags,
    pub decimals: u8,
}

impl Metadata {
    pub fn parse(packet: &[u8], mode: MetaMode) -> CResult<Self> {
        let mut cursor = Cursor::new(packet);

        let _catalog = read_len_enc_bytes(&mut cursor)?;
        let schema = String::from_utf8_lossy(&read_len_enc_bytes(&mut cursor)?).to_string();
        let table = String::from_utf8_lossy(&read_len_enc_bytes(&mut cursor)?).to_string();
        let org_table = String::from_utf8_lossy(&read_len_enc_bytes(&mut cursor)?).to_string();
        let name = String::from_utf8_lossy(&read_len_enc_bytes(&mut cursor)?).to_string();
        let org_name = String::from_utf8_lossy(&read_len_enc_bytes(&mut cursor)?).to_string();
        let _fixed_len_fields_len = read_len_enc_int(&mut cursor)?;
        let collation_id = cursor
            .read_u16::<LittleEndian>()
            .map_err(|_| ReError::Framing("truncated column definition".to_string()))?;
        let max_length = cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| ReError::Framing("truncated column definition".to_string()))?;
        let type_code = cursor
            .read_u8()
            .map_err(|_| ReError::Framing("truncated column definition".to_string()))?;
        let wire_type = WireColumnType::try_from(type_code)?;
        let flags = cursor
            .read_u16::<LittleEndian>()
            .map_err(|_| ReError::Framing("truncated column definition".to_string()))?;
        let decimals = cursor
            .read_u8()
            .map_err(|_| ReError::Framing("truncated column definition".to_string()))?;

        let (database, virtual_table, physical_table, virtual_name, physical_name) = match mode {
            MetaMode::Full => (
                Some(schema),
                Some(table),
                Some(org_table),
                Some(name),
                Some(org_name),
            ),
            MetaMode::Minimal => (None, None, None, None, None),
        };

        Ok(Metadata {
            database,
            virtual_table,
            physical_table,
            virtual_name,
            physical_name,
            collation_id,
            max_length,
            wire_type,
            flags: ColumnFlags::new(flags),
            decimals,
        })
    }

    /// Applies the disambiguators to compute the semantic column type.
    pub fn column_type(&self) -> ColumnType {
        let is_binary_charset = self.collation_id == BINARY_CHARSET;
        match self.wire_type {
            WireColumnType::Decimal => ColumnType::Decimal,
            WireColumnType::Tiny => ColumnType::TinyInt,
            WireColumnType::Short => ColumnType::SmallInt,
            WireColumnType::Long => ColumnType::Int,
            WireColumnType::Float => ColumnType::Float,
            WireColumnType::Double => ColumnType::Double,
            WireColumnType::Null => ColumnType::Null,
            WireColumnType::Timestamp | WireColumnType::Timestamp2 => ColumnType::Timestamp,
            WireColumnType::LongLong => ColumnType::BigInt,
            WireColumnType::Int24 => ColumnType::MediumInt,
            WireColumnType::Date | WireColumnType::NewDate => ColumnType::Date,
            WireColumnType::Time | WireColumnType::Time2 => ColumnType::Time,
            WireColumnType::DateTime | WireColumnType::DateTime2 => ColumnType::DateTime,
            WireColumnType::Year => ColumnType::Year,
            WireColumnType::VarChar | WireColumnType::VarString => {
                if is_binary_charset {
                    ColumnType::Blob
                } else {
                    ColumnType::VarString
                }
            }
            WireColumnType::String => {
                if is_binary_charset {
                    ColumnType::Blob
                } else if self.flags.has(ENUM_FLAG) {
                    ColumnType::Enum
                } else if self.flags.has(SET_FLAG) {
                    ColumnType::Set
                } else {
                    ColumnType::String
                }
            }
            WireColumnType::Bit => ColumnType::Bit,
            WireColumnType::Json => ColumnType::Json,
            WireColumnType::NewDecimal => ColumnType::NewDecimal,
            WireColumnType::Enum => ColumnType::Enum,
            WireColumnType::Set => ColumnType::Set,
            WireColumnType::TinyBlob => ColumnType::TinyBlob,
            WireColumnType::MediumBlob => ColumnType::MediumBlob,
            WireColumnType::LongBlob => ColumnType::LongBlob,
            WireColumnType::Blob => ColumnType::Blob,
            WireColumnType::Geometry => ColumnType::Geometry,
        }
    }

    pub fn is_unsigned(&self) -> bool {
        self.flags.has(UNSIGNED_FLAG)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn col(wire: u8, collation: u16, flags: u16) -> Metadata {
        Metadata {
            database: None,
            virtual_table: None,
            physical_table: None,
            virtual_name: None,
            physical_name: None,
            collation_id: collation,
            max_length: 0,
            wire_type: WireColumnType::try_from(wire).unwrap(),
            flags: ColumnFlags::new(flags),
            decimals: 0,
        }
    }

    #[test]
    fn binary_charset_string_becomes_blob() {
        let m = col(0xfd, BINARY_CHARSET, 0); // VarString, binary charset
        assert_eq!(m.column_type(), ColumnType::Blob);

        let m = col(0xfd, 33, 0); // VarString, utf8 charset
        assert_eq!(m.column_type(), ColumnType::VarString);
    }

    #[test]
    fn tiny_stays_tinyint_regardless_of_display_width() {
        // display width lives in max_length, which never affects the mapping.
        let mut m = col(0x01, 33, 0);
        m.max_length = 1;
        assert_eq!(m.column_type(), ColumnType::TinyInt);
    }

    #[test]
    fn timestamp_vs_datetime_is_purely_wire_code() {
        assert_eq!(col(0x07, 33, 0).column_type(), ColumnType::Timestamp);
        assert_eq!(col(0x0c, 33, 0).column_type(), ColumnType::DateTime);
        assert_eq!(col(0x11, 33, 0).column_type(), ColumnType::Timestamp);
        assert_eq!(col(0x12, 33, 0).column_type(), ColumnType::DateTime);
    }

    #[test]
    fn unknown_wire_type_is_protocol_value_error() {
        let err = WireColumnType::try_from(0x20).unwrap_err();
        assert!(matches!(err, ReError::ProtocolValue(_)));
    }
}
