//! L1: fixed and length-encoded integer/string/blob codec primitives.
//!
//! Mirrors the Cursor + byteorder idiom used throughout the connection
//! crate's packet parsers, generalized to cover the full set of wire
//! primitives instead of only the handful a binlog reader needed.

use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use common::err::decode_error::ReError;
use common::err::CResult;

/// Marker byte meanings for length-encoded integers.
pub const LENENC_NULL: u8 = 0xFB;
pub const LENENC_U16: u8 = 0xFC;
pub const LENENC_U24: u8 = 0xFD;
pub const LENENC_U64: u8 = 0xFE;

fn incomplete(what: &str) -> ReError {
    ReError::Framing(format!("incomplete message while reading {what}"))
}

/// Reads a length-encoded integer. Does not interpret
/// `0xFB` as null; callers in row context must check for that marker first.
pub fn read_len_enc_int(cursor: &mut Cursor<&[u8]>) -> CResult<u64> {
    let first = cursor.read_u8().map_err(|_| incomplete("lenenc-int prefix"))?;
    match first {
        0..=0xFA => Ok(first as u64),
        LENENC_U16 => cursor
            .read_u16::<LittleEndian>()
            .map(|v| v as u64)
            .map_err(|_| incomplete("lenenc-int u16 body")),
        LENENC_U24 => {
            let v = cursor
                .read_u24::<LittleEndian>()
                .map_err(|_| incomplete("lenenc-int u24 body"))?;
            Ok(v as u64)
        }
        LENENC_U64 => cursor
            .read_u64::<LittleEndian>()
            .map_err(|_| incomplete("lenenc-int u64 body")),
        0xFF => Err(ReError::ProtocolValue(
            "0xFF is not a valid lenenc-int prefix".to_string(),
        )),
        _ => unreachable!("match is exhaustive over u8"),
    }
}

/// Writes a length-encoded integer choosing the minimal prefix.
pub fn write_len_enc_int(buf: &mut Vec<u8>, value: u64) {
    if value <= 250 {
        buf.push(value as u8);
    } else if value <= 0xFFFF {
        buf.push(LENENC_U16);
        buf.extend_from_slice(&(value as u16).to_le_bytes());
    } else if value <= 0xFF_FFFF {
        buf.push(LENENC_U24);
        buf.extend_from_slice(&(value as u32).to_le_bytes()[..3]);
    } else {
        buf.push(LENENC_U64);
        buf.extend_from_slice(&value.to_le_bytes());
    }
}

/// Reads a length-encoded string as raw bytes (strings may be binary/blob data).
pub fn read_len_enc_bytes(cursor: &mut Cursor<&[u8]>) -> CResult<Vec<u8>> {
    let len = read_len_enc_int(cursor)? as usize;
    let mut buf = vec![0u8; len];
    cursor
        .read_exact(&mut buf)
        .map_err(|_| incomplete("lenenc-string body"))?;
    Ok(buf)
}

/// Reads a length-encoded string field that may be SQL NULL (row context: the
/// `0xFB` prefix byte is the null marker rather than a length prefix).
pub fn read_len_enc_bytes_allow_null(cursor: &mut Cursor<&[u8]>) -> CResult<Option<Vec<u8>>> {
    let pos = cursor.position();
    let marker = cursor.read_u8().map_err(|_| incomplete("lenenc-string marker"))?;
    if marker == LENENC_NULL {
        return Ok(None);
    }
    cursor.set_position(pos);
    Ok(Some(read_len_enc_bytes(cursor)?))
}

pub fn write_len_enc_bytes(buf: &mut Vec<u8>, value: &[u8]) {
    write_len_enc_int(buf, value.len() as u64);
    buf.extend_from_slice(value);
}

/// Reads a NUL-terminated string (consumes the terminator).
pub fn read_null_term_string(cursor: &mut Cursor<&[u8]>) -> CResult<String> {
    let mut bytes = Vec::new();
    loop {
        let b = cursor.read_u8().map_err(|_| incomplete("null-terminated string"))?;
        if b == 0 {
            break;
        }
        bytes.push(b);
    }
    Ok(String::from_utf8_lossy(&bytes).to_string())
}

pub fn write_null_term_string(buf: &mut Vec<u8>, value: &str) {
    buf.extend_from_slice(value.as_bytes());
    buf.push(0);
}

/// Reads whatever bytes remain in the cursor (EOF-terminated string).
/// Invalid UTF-8 is replaced lossily; the wire format does not guarantee
/// strings are valid UTF-8 (they are only "utf8-ish").
pub fn read_eof_string(cursor: &mut Cursor<&[u8]>) -> CResult<String> {
    Ok(String::from_utf8_lossy(&read_eof_bytes(cursor)).to_string())
}

/// Reads the remaining bytes of the cursor verbatim (EOF-terminated blob).
pub fn read_eof_bytes(cursor: &mut Cursor<&[u8]>) -> Vec<u8> {
    let pos = cursor.position() as usize;
    let all = cursor.get_ref();
    let rest = all[pos..].to_vec();
    cursor.set_position(all.len() as u64);
    rest
}

/// Reads a fixed-width little-endian unsigned integer of 1/2/3/4/6/8 bytes.
pub fn read_fixed_len_int(cursor: &mut Cursor<&[u8]>, len: u8) -> CResult<u64> {
    match len {
        1 => cursor.read_u8().map(|v| v as u64),
        2 => cursor.read_u16::<LittleEndian>().map(|v| v as u64),
        3 => cursor.read_u24::<LittleEndian>().map(|v| v as u64),
        4 => cursor.read_u32::<LittleEndian>().map(|v| v as u64),
        6 => cursor.read_uint::<LittleEndian>(6),
        8 => cursor.read_u64::<LittleEndian>(),
        other => {
            return Err(ReError::ProtocolValue(format!(
                "unsupported fixed-length integer width {other}"
            )))
        }
    }
    .map_err(|_| incomplete("fixed-length integer"))
}

pub fn write_fixed_len_int(buf: &mut Vec<u8>, value: u64, len: u8) -> CResult<()> {
    match len {
        1 => buf.write_u8(value as u8),
        2 => buf.write_u16::<LittleEndian>(value as u16),
        3 => buf.write_u24::<LittleEndian>(value as u32),
        4 => buf.write_u32::<LittleEndian>(value as u32),
        6 => buf.write_uint::<LittleEndian>(value, 6),
        8 => buf.write_u64::<LittleEndian>(value),
        other => {
            return Err(ReError::ProtocolValue(format!(
                "unsupported fixed-length integer width {other}"
            )))
        }
    }
    .map_err(ReError::from)
}

/// Builds the null bitmap for `n` parameters/columns with the given leading
/// bit offset (0 for `COM_STMT_EXECUTE`, 2 for binary protocol rows).
pub fn write_null_bitmap(null_positions: &[bool], offset: usize) -> Vec<u8> {
    let total_bits = null_positions.len() + offset;
    let mut bitmap = vec![0u8; (total_bits + 7) / 8];
    for (i, is_null) in null_positions.iter().enumerate() {
        if *is_null {
            let bit = i + offset;
            bitmap[bit / 8] |= 1 << (bit % 8);
        }
    }
    bitmap
}

/// Reads back the null positions encoded by [`write_null_bitmap`].
pub fn read_null_bitmap(bitmap: &[u8], count: usize, offset: usize) -> Vec<bool> {
    (0..count)
        .map(|i| {
            let bit = i + offset;
            let byte = bitmap.get(bit / 8).copied().unwrap_or(0);
            (byte & (1 << (bit % 8))) != 0
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn len_enc_int_round_trip_thresholds() {
        for &n in &[0u64, 1, 250, 251, 0xFFFF, 0x1_0000, 0xFF_FFFF, 0x100_0000, u64::MAX] {
            let mut buf = Vec::new();
            write_len_enc_int(&mut buf, n);
            let mut cursor = Cursor::new(buf.as_slice());
            let got = read_len_enc_int(&mut cursor).unwrap();
            assert_eq!(got, n);
            assert_eq!(cursor.position() as usize, buf.len());
        }
    }

    #[test]
    fn len_enc_int_minimal_prefix() {
        let mut buf = Vec::new();
        write_len_enc_int(&mut buf, 250);
        assert_eq!(buf.len(), 1);

        let mut buf = Vec::new();
        write_len_enc_int(&mut buf, 0xFFFF);
        assert_eq!(buf.len(), 3);
        assert_eq!(buf[0], LENENC_U16);

        let mut buf = Vec::new();
        write_len_enc_int(&mut buf, 0xFFFFFF);
        assert_eq!(buf.len(), 4);
        assert_eq!(buf[0], LENENC_U24);

        let mut buf = Vec::new();
        write_len_enc_int(&mut buf, u64::MAX);
        assert_eq!(buf.len(), 9);
        assert_eq!(buf[0], LENENC_U64);
    }

    #[test]
    fn len_enc_bytes_allow_null() {
        let mut buf = Vec::new();
        buf.push(LENENC_NULL);
        let mut cursor = Cursor::new(buf.as_slice());
        assert_eq!(read_len_enc_bytes_allow_null(&mut cursor).unwrap(), None);

        let mut buf = Vec::new();
        write_len_enc_bytes(&mut buf, b"hi");
        let mut cursor = Cursor::new(buf.as_slice());
        assert_eq!(
            read_len_enc_bytes_allow_null(&mut cursor).unwrap(),
            Some(b"hi".to_vec())
        );
    }

    #[test]
    fn null_bitmap_round_trip_stmt_execute_offset() {
        let positions = vec![false, true, false, true, true];
        let bitmap = write_null_bitmap(&positions, 0);
        assert_eq!(read_null_bitmap(&bitmap, positions.len(), 0), positions);
    }

    #[test]
    fn null_bitmap_round_trip_binary_row_offset() {
        let positions = vec![true, false, true, false, false, true, true];
        let bitmap = write_null_bitmap(&positions, 2);
        assert_eq!(read_null_bitmap(&bitmap, positions.len(), 2), positions);
    }

    #[test]
    fn null_term_string_round_trip() {
        let mut buf = Vec::new();
        write_null_term_string(&mut buf, "mysql_native_password");
        buf.push(0xAA); // trailing byte that must not be consumed
        let mut cursor = Cursor::new(buf.as_slice());
        assert_eq!(
            read_null_term_string(&mut cursor).unwrap(),
            "mysql_native_password"
        );
        assert_eq!(cursor.position(), buf.len() as u64 - 1);
    }
}
