//! Decodes one row packet (text or binary protocol) into [`Field`]s, given
//! the column metadata already parsed by [`crate::column::Metadata`].
//! Grounded on `connection::conn::query_result::parse_text_value_by_type`'s
//! type-directed conversion, generalized to produce protocol-level `Field`s
//! rather than a CDC-specific column-value enum, and extended with the
//! binary protocol's typed, null-bitmap-prefixed row format.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};

use common::err::decode_error::ReError;
use common::err::CResult;

use crate::codec::{read_len_enc_bytes_allow_null, read_null_bitmap};
use crate::column::{ColumnType, Metadata};
use crate::value::{Date, DateTime, Field, Time};

/// The text protocol: every non-null column is a length-encoded string,
/// converted according to its semantic type.
pub fn decode_text_row(packet: &[u8], columns: &[Metadata]) -> CResult<Vec<Field>> {
    let mut cursor = Cursor::new(packet);
    let mut fields = Vec::with_capacity(columns.len());
    for column in columns {
        match read_len_enc_bytes_allow_null(&mut cursor)? {
            None => fields.push(Field::Null),
            Some(bytes) => fields.push(text_field(&bytes, column)?),
        }
    }
    Ok(fields)
}

fn text_field(bytes: &[u8], column: &Metadata) -> CResult<Field> {
    let text = String::from_utf8_lossy(bytes);
    let unsigned = column.is_unsigned();
    Ok(match column.column_type() {
        ColumnType::TinyInt
        | ColumnType::SmallInt
        | ColumnType::MediumInt
        | ColumnType::Int
        | ColumnType::BigInt
        | ColumnType::Year => {
            if unsigned {
                Field::UInt(parse_num(&text)?)
            } else {
                Field::Int(parse_num(&text)?)
            }
        }
        ColumnType::Float => Field::Float(parse_num(&text)?),
        ColumnType::Double => Field::Double(parse_num(&text)?),
        ColumnType::Date => Field::Date(parse_text_date(&text)?),
        ColumnType::DateTime | ColumnType::Timestamp => Field::DateTime(parse_text_datetime(&text)?),
        ColumnType::Time => Field::Time(parse_text_time(&text)?),
        ColumnType::TinyBlob
        | ColumnType::MediumBlob
        | ColumnType::LongBlob
        | ColumnType::Blob
        | ColumnType::Geometry => Field::Blob(bytes.to_vec()),
        ColumnType::Null => Field::Null,
        _ => Field::String(bytes.to_vec()),
    })
}

/// The binary protocol: a leading `0x00` header, a null bitmap (2-bit
/// offset, per `protocol::codec::read_null_bitmap`'s doc), then one
/// fixed-or-length-encoded value per non-null column, laid out per its wire
/// type rather than its semantic type (`Int24` and `Long` share a 4-byte
/// encoding, `Year` shares `Short`'s 2-byte encoding, etc).
pub fn decode_binary_row(packet: &[u8], columns: &[Metadata]) -> CResult<Vec<Field>> {
    if packet.first() != Some(&0x00) {
        return Err(ReError::Framing("binary row packet missing 0x00 header".to_string()));
    }
    let bitmap_len = (columns.len() + 7 + 2) / 8;
    let bitmap_start = 1;
    let bitmap_end = bitmap_start + bitmap_len;
    let bitmap = packet
        .get(bitmap_start..bitmap_end)
        .ok_or_else(|| ReError::Framing("truncated binary row null bitmap".to_string()))?;
    let null_flags = read_null_bitmap(bitmap, columns.len(), 2);

    let mut cursor = Cursor::new(&packet[bitmap_end..]);
    let mut fields = Vec::with_capacity(columns.len());
    for (column, is_null) in columns.iter().zip(null_flags) {
        if is_null {
            fields.push(Field::Null);
            continue;
        }
        fields.push(binary_field(&mut cursor, column)?);
    }
    Ok(fields)
}

fn binary_field(cursor: &mut Cursor<&[u8]>, column: &Metadata) -> CResult<Field> {
    use crate::column::WireColumnType::*;
    let unsigned = column.is_unsigned();
    let truncated = || ReError::Framing("truncated binary row value".to_string());
    Ok(match column.wire_type {
        Tiny => {
            let byte = cursor.read_u8().map_err(|_| truncated())?;
            if unsigned {
                Field::UInt(byte as u64)
            } else {
                Field::Int(byte as i8 as i64)
            }
        }
        Short | Year => {
            let v = cursor.read_u16::<LittleEndian>().map_err(|_| truncated())?;
            if unsigned {
                Field::UInt(v as u64)
            } else {
                Field::Int(v as i16 as i64)
            }
        }
        Long | Int24 => {
            let v = cursor.read_u32::<LittleEndian>().map_err(|_| truncated())?;
            if unsigned {
                Field::UInt(v as u64)
            } else {
                Field::Int(v as i32 as i64)
            }
        }
        LongLong => {
            let v = cursor.read_u64::<LittleEndian>().map_err(|_| truncated())?;
            if unsigned {
                Field::UInt(v)
            } else {
                Field::Int(v as i64)
            }
        }
        Float => Field::Float(cursor.read_f32::<LittleEndian>().map_err(|_| truncated())?),
        Double => Field::Double(cursor.read_f64::<LittleEndian>().map_err(|_| truncated())?),
        Date | NewDate => Field::Date(read_binary_date(cursor)?),
        Timestamp | Timestamp2 | DateTime | DateTime2 => Field::DateTime(read_binary_datetime(cursor)?),
        Time | Time2 => Field::Time(read_binary_time(cursor)?),
        Null => Field::Null,
        Decimal | NewDecimal | VarChar | VarString | String | Bit | Enum | Set | Json | Geometry | TinyBlob
        | MediumBlob | LongBlob | Blob => {
            let bytes = crate::codec::read_len_enc_bytes(cursor)?;
            match column.column_type() {
                ColumnType::TinyBlob
                | ColumnType::MediumBlob
                | ColumnType::LongBlob
                | ColumnType::Blob
                | ColumnType::Geometry => Field::Blob(bytes),
                _ => Field::String(bytes),
            }
        }
    })
}

/// Binary date/datetime/time values are length-prefixed with the number of
/// fields actually present (0, 4, 7, or 11 bytes for date/datetime; 0, 8, or
/// 12 for time), per `Protocol::MYSQL_TIME`.
fn read_binary_date(cursor: &mut Cursor<&[u8]>) -> CResult<Date> {
    let len = cursor.read_u8().map_err(|_| ReError::Framing("truncated binary date length".to_string()))?;
    if len == 0 {
        return Ok(Date::zero());
    }
    let year = cursor.read_u16::<LittleEndian>().map_err(|_| ReError::Framing("truncated binary date".to_string()))?;
    let month = cursor.read_u8().map_err(|_| ReError::Framing("truncated binary date".to_string()))?;
    let day = cursor.read_u8().map_err(|_| ReError::Framing("truncated binary date".to_string()))?;
    Ok(Date { year, month, day })
}

fn read_binary_datetime(cursor: &mut Cursor<&[u8]>) -> CResult<DateTime> {
    let len = cursor
        .read_u8()
        .map_err(|_| ReError::Framing("truncated binary datetime length".to_string()))?;
    if len == 0 {
        return Ok(DateTime::default());
    }
    let truncated = || ReError::Framing("truncated binary datetime".to_string());
    let year = cursor.read_u16::<LittleEndian>().map_err(|_| truncated())?;
    let month = cursor.read_u8().map_err(|_| truncated())?;
    let day = cursor.read_u8().map_err(|_| truncated())?;
    let (hour, minute, second, microsecond) = if len > 4 {
        let hour = cursor.read_u8().map_err(|_| truncated())?;
        let minute = cursor.read_u8().map_err(|_| truncated())?;
        let second = cursor.read_u8().map_err(|_| truncated())?;
        let microsecond = if len > 7 { cursor.read_u32::<LittleEndian>().map_err(|_| truncated())? } else { 0 };
        (hour, minute, second, microsecond)
    } else {
        (0, 0, 0, 0)
    };
    Ok(DateTime { date: Date { year, month, day }, hour, minute, second, microsecond })
}

fn read_binary_time(cursor: &mut Cursor<&[u8]>) -> CResult<Time> {
    let len = cursor.read_u8().map_err(|_| ReError::Framing("truncated binary time length".to_string()))?;
    if len == 0 {
        return Ok(Time::default());
    }
    let truncated = || ReError::Framing("truncated binary time".to_string());
    let negative = cursor.read_u8().map_err(|_| truncated())? != 0;
    let days = cursor.read_u32::<LittleEndian>().map_err(|_| truncated())?;
    let hours = cursor.read_u8().map_err(|_| truncated())?;
    let minutes = cursor.read_u8().map_err(|_| truncated())?;
    let seconds = cursor.read_u8().map_err(|_| truncated())?;
    let microsecond = if len > 8 { cursor.read_u32::<LittleEndian>().map_err(|_| truncated())? } else { 0 };
    Ok(Time { negative, days, hours, minutes, seconds, microsecond })
}

fn parse_num<T: std::str::FromStr>(text: &str) -> CResult<T> {
    text.parse().map_err(|_| ReError::ProtocolValue(format!("could not parse {text:?} as a number")))
}

fn parse_text_date(text: &str) -> CResult<Date> {
    if text == "0000-00-00" {
        return Ok(Date::zero());
    }
    let (y, m, d) = split3(text, '-')?;
    Ok(Date { year: parse_num(y)?, month: parse_num(m)?, day: parse_num(d)? })
}

fn parse_text_datetime(text: &str) -> CResult<DateTime> {
    let (date_part, time_part) = text.split_once(' ').unwrap_or((text, "00:00:00"));
    let date = parse_text_date(date_part)?;
    let (h, m, rest) = split3(time_part, ':')?;
    let (s, micros) = rest.split_once('.').unwrap_or((rest, "0"));
    let microsecond = format!("{micros:0<6}").get(..6).unwrap_or("0").parse().unwrap_or(0);
    Ok(DateTime { date, hour: parse_num(h)?, minute: parse_num(m)?, second: parse_num(s)?, microsecond })
}

fn parse_text_time(text: &str) -> CResult<Time> {
    let (negative, text) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (h, m, rest) = split3(text, ':')?;
    let (s, micros) = rest.split_once('.').unwrap_or((rest, "0"));
    let microsecond = format!("{micros:0<6}").get(..6).unwrap_or("0").parse().unwrap_or(0);
    let total_hours: u32 = parse_num(h)?;
    Ok(Time {
        negative,
        days: total_hours / 24,
        hours: (total_hours % 24) as u8,
        minutes: parse_num(m)?,
        seconds: parse_num(s)?,
        microsecond,
    })
}

fn split3(text: &str, sep: char) -> CResult<(&str, &str, &str)> {
    let mut parts = text.splitn(3, sep);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(a), Some(b), Some(c)) => Ok((a, b, c)),
        _ => Err(ReError::ProtocolValue(format!("expected three {sep:?}-separated parts in {text:?}"))),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::column::{ColumnFlags, MetaMode, WireColumnType};

    fn column(wire: WireColumnType, unsigned: bool) -> Metadata {
        Metadata {
            database: None,
            virtual_table: None,
            physical_table: None,
            virtual_name: None,
            physical_name: None,
            collation_id: 33,
            max_length: 0,
            wire_type: wire,
            flags: ColumnFlags::new(if unsigned { crate::column::UNSIGNED_FLAG } else { 0 }),
            decimals: 0,
        }
    }

    #[test]
    fn text_row_decodes_int_and_null() {
        let mut packet = Vec::new();
        crate::codec::write_len_enc_bytes(&mut packet, b"42");
        packet.push(0xFB); // NULL marker
        let columns = vec![column(WireColumnType::Long, false), column(WireColumnType::VarString, false)];
        let fields = decode_text_row(&packet, &columns).unwrap();
        assert_eq!(fields, vec![Field::Int(42), Field::Null]);
    }

    #[test]
    fn binary_row_decodes_tiny_and_longlong() {
        let columns = vec![column(WireColumnType::Tiny, false), column(WireColumnType::LongLong, true)];
        let mut packet = vec![0x00];
        packet.extend(crate::codec::write_null_bitmap(&[false, false], 2));
        packet.push(200u8 as i8 as u8); // -56 as signed tiny
        packet.extend_from_slice(&42u64.to_le_bytes());
        let fields = decode_binary_row(&packet, &columns).unwrap();
        assert_eq!(fields, vec![Field::Int(-56), Field::UInt(42)]);
    }

    #[test]
    fn binary_row_honors_null_bitmap() {
        let columns = vec![column(WireColumnType::Long, false)];
        let mut packet = vec![0x00];
        packet.extend(crate::codec::write_null_bitmap(&[true], 2));
        let fields = decode_binary_row(&packet, &columns).unwrap();
        assert_eq!(fields, vec![Field::Null]);
    }

    #[test]
    fn text_date_sentinel_round_trips() {
        assert!(parse_text_date("0000-00-00").unwrap().is_zero());
    }
}
