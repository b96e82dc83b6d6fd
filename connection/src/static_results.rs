//! The static result-set sink: decodes rows directly into a caller-chosen
//! Rust type instead of a generic `Vec<Field>`, the way [`crate::results::Results`]
//! does. Grounded on the position-map idea behind per-resultset metadata
//! checking — a value type declares the column names it expects in field
//! order (its "name table"), and at the batch boundary the sink builds a
//! position map from those names into the server's actual column order
//! (which need not match, and may include columns the type doesn't use),
//! then reorders each row before handing it to the type's constructor.
//!
//! The type-level guarantee comes from `StaticRow::from_ordered_fields`
//! itself: it indexes `COLUMN_NAMES.len()` fields by position, written once
//! per type, so a mismatch between the name table and the constructor is a
//! bug in that one `impl`, not something every caller can get wrong.

use common::err::decode_error::ReError;
use common::err::CResult;
use protocol::column::{Metadata, MetaMode};
use protocol::value::Field;

use crate::results::RowEncoding;

/// A Rust type that can be decoded directly out of a result set row.
pub trait StaticRow: Sized {
    /// Column names this type expects, in the order its
    /// `from_ordered_fields` reads them.
    const COLUMN_NAMES: &'static [&'static str];

    /// Builds one value from fields already reordered to match
    /// `COLUMN_NAMES` — `fields[i]` is always the column named
    /// `COLUMN_NAMES[i]`, regardless of the order the server sent them in.
    fn from_ordered_fields(fields: &[Field]) -> CResult<Self>;
}

/// Maps each of `T::COLUMN_NAMES` to the index of the matching server
/// column. Errors if the server's result set is missing a column the type
/// requires — the static-sink equivalent of a metadata check.
fn build_position_map<T: StaticRow>(columns: &[Metadata]) -> CResult<Vec<usize>> {
    T::COLUMN_NAMES
        .iter()
        .map(|&name| {
            columns
                .iter()
                .position(|c| c.virtual_name.as_deref().map(|n| n.eq_ignore_ascii_case(name)).unwrap_or(false))
                .ok_or_else(|| {
                    ReError::Precondition(format!(
                        "result set is missing column {name:?} required by the requested row type"
                    ))
                })
        })
        .collect()
}

/// Accumulates one result set's rows and decodes each directly into `T`,
/// using [`build_position_map`] to tolerate the server returning columns in
/// a different order (or with extras) than `T` declares.
pub struct StaticResults<T: StaticRow> {
    columns: Vec<Metadata>,
    encoding: RowEncoding,
    position_map: Vec<usize>,
    arena: Vec<u8>,
    offsets: Vec<(usize, usize)>,
    _marker: std::marker::PhantomData<T>,
}

impl<T: StaticRow> std::fmt::Debug for StaticResults<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticResults")
            .field("columns", &self.columns)
            .field("encoding", &self.encoding)
            .field("position_map", &self.position_map)
            .field("arena", &self.arena)
            .field("offsets", &self.offsets)
            .finish()
    }
}

impl<T: StaticRow> StaticResults<T> {
    pub fn from_column_packets(
        column_packets: &[Vec<u8>],
        mode: MetaMode,
        encoding: RowEncoding,
    ) -> CResult<Self> {
        let columns = column_packets
            .iter()
            .map(|packet| Metadata::parse(packet, mode))
            .collect::<CResult<Vec<_>>>()?;
        let position_map = build_position_map::<T>(&columns)?;
        Ok(StaticResults {
            columns,
            encoding,
            position_map,
            arena: Vec::new(),
            offsets: Vec::new(),
            _marker: std::marker::PhantomData,
        })
    }

    pub fn num_rows(&self) -> usize {
        self.offsets.len()
    }

    pub fn push_batch(&mut self, row_packets: Vec<Vec<u8>>) {
        for packet in row_packets {
            let start = self.arena.len();
            self.arena.extend_from_slice(&packet);
            self.offsets.push((start, self.arena.len()));
        }
    }

    pub fn resolve(&self) -> CResult<Vec<T>> {
        self.offsets
            .iter()
            .map(|&(start, end)| {
                let packet = &self.arena[start..end];
                let fields = match self.encoding {
                    RowEncoding::Text => protocol::row::decode_text_row(packet, &self.columns)?,
                    RowEncoding::Binary => protocol::row::decode_binary_row(packet, &self.columns)?,
                };
                let ordered: Vec<Field> = self.position_map.iter().map(|&i| fields[i].clone()).collect();
                T::from_ordered_fields(&ordered)
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use protocol::column::WireColumnType;

    struct UserRow {
        id: i64,
        name: String,
    }

    impl StaticRow for UserRow {
        const COLUMN_NAMES: &'static [&'static str] = &["id", "name"];

        fn from_ordered_fields(fields: &[Field]) -> CResult<Self> {
            Ok(UserRow { id: fields[0].as_i64()?, name: String::from_utf8_lossy(fields[1].as_bytes()?).into_owned() })
        }
    }

    fn column_packet(name: &str, wire_code: u8) -> Vec<u8> {
        let mut buf = Vec::new();
        protocol::codec::write_len_enc_bytes(&mut buf, b"def");
        protocol::codec::write_len_enc_bytes(&mut buf, b"db");
        protocol::codec::write_len_enc_bytes(&mut buf, b"t");
        protocol::codec::write_len_enc_bytes(&mut buf, b"t");
        protocol::codec::write_len_enc_bytes(&mut buf, name.as_bytes());
        protocol::codec::write_len_enc_bytes(&mut buf, name.as_bytes());
        protocol::codec::write_len_enc_int(&mut buf, 0x0c);
        buf.extend_from_slice(&33u16.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.push(wire_code);
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.push(0);
        buf
    }

    #[test]
    fn position_map_tolerates_server_column_reordering() {
        // server sends "name" before "id"; the type declares the opposite order.
        let col_packets = vec![column_packet("name", 0xfd), column_packet("id", 0x03)];
        let mut results =
            StaticResults::<UserRow>::from_column_packets(&col_packets, MetaMode::Full, RowEncoding::Text).unwrap();
        assert_eq!(results.position_map, vec![1, 0]);

        let mut row = Vec::new();
        protocol::codec::write_len_enc_bytes(&mut row, b"ada"); // name
        protocol::codec::write_len_enc_bytes(&mut row, b"7"); // id
        results.push_batch(vec![row]);

        let rows = results.resolve().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, 7);
        assert_eq!(rows[0].name, "ada");
    }

    #[test]
    fn missing_required_column_is_an_error() {
        let col_packets = vec![column_packet("id", 0x03)];
        let err = StaticResults::<UserRow>::from_column_packets(&col_packets, MetaMode::Full, RowEncoding::Text)
            .unwrap_err();
        assert!(matches!(err, ReError::Precondition(_)));
    }

    fn _use_wire_type(_: WireColumnType) {}
}
