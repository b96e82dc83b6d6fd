//! The dynamic result-set sink: turns the raw column/row packets
//! [`crate::algorithm::query::Query`] and [`crate::algorithm::execute::Execute`]
//! capture into typed [`protocol::value::Field`] rows.
//!
//! Row packets are appended to one growable byte arena instead of decoded as
//! they arrive; each row is recorded as an `(offset, len)` view into that
//! arena. Decoding happens once, at the batch boundary — when the caller
//! asks for the resolved rows, typically once a whole result set (or a
//! `Fetch` page of one) has been collected — rather than per packet.
//! Grounded on [`protocol::frame::ReadBuffer`]'s own reserved/pending split:
//! the wire layer already defers copying until a message is known complete,
//! and this sink applies the same idea one level up, to whole rows.

use common::err::CResult;
use protocol::column::{Metadata, MetaMode};
use protocol::value::Field;

/// Whether row packets were produced by the text or binary protocol — the
/// two encodings require different decoders, but both flow through the same
/// arena bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowEncoding {
    Text,
    Binary,
}

/// Accumulates one result set's rows as byte ranges, then resolves all of
/// them into [`Field`] rows at once.
pub struct Results {
    columns: Vec<Metadata>,
    encoding: RowEncoding,
    arena: Vec<u8>,
    offsets: Vec<(usize, usize)>,
}

impl Results {
    /// Parses the column-definition packets captured by `Query`/`Execute`
    /// and prepares an empty sink ready to receive that result set's rows.
    pub fn from_column_packets(
        column_packets: &[Vec<u8>],
        mode: MetaMode,
        encoding: RowEncoding,
    ) -> CResult<Self> {
        let columns = column_packets
            .iter()
            .map(|packet| Metadata::parse(packet, mode))
            .collect::<CResult<Vec<_>>>()?;
        Ok(Results { columns, encoding, arena: Vec::new(), offsets: Vec::new() })
    }

    pub fn columns(&self) -> &[Metadata] {
        &self.columns
    }

    pub fn num_rows(&self) -> usize {
        self.offsets.len()
    }

    /// Appends one batch of raw row packets (a whole result set, or one
    /// `Fetch` page) into the arena, recording each row's byte range.
    /// Consumes the packets rather than cloning them — ownership of the
    /// bytes moves from the algorithm's captured packets into the arena.
    pub fn push_batch(&mut self, row_packets: Vec<Vec<u8>>) {
        for packet in row_packets {
            let start = self.arena.len();
            self.arena.extend_from_slice(&packet);
            self.offsets.push((start, self.arena.len()));
        }
    }

    /// Decodes every row currently in the arena into [`Field`] values. This
    /// is the offset→view resolution step: until this is called, a pushed
    /// batch is just bytes plus ranges, not yet typed.
    pub fn resolve(&self) -> CResult<Vec<Vec<Field>>> {
        self.offsets
            .iter()
            .map(|&(start, end)| {
                let packet = &self.arena[start..end];
                match self.encoding {
                    RowEncoding::Text => protocol::row::decode_text_row(packet, &self.columns),
                    RowEncoding::Binary => protocol::row::decode_binary_row(packet, &self.columns),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use protocol::column::WireColumnType;

    fn column_packet(name: &str, wire: WireColumnType) -> Vec<u8> {
        let mut buf = Vec::new();
        protocol::codec::write_len_enc_bytes(&mut buf, b"def"); // catalog
        protocol::codec::write_len_enc_bytes(&mut buf, b"db"); // schema
        protocol::codec::write_len_enc_bytes(&mut buf, b"t"); // table
        protocol::codec::write_len_enc_bytes(&mut buf, b"t"); // org_table
        protocol::codec::write_len_enc_bytes(&mut buf, name.as_bytes());
        protocol::codec::write_len_enc_bytes(&mut buf, name.as_bytes());
        protocol::codec::write_len_enc_int(&mut buf, 0x0c);
        buf.extend_from_slice(&33u16.to_le_bytes()); // collation
        buf.extend_from_slice(&0u32.to_le_bytes()); // max_length
        buf.push(match wire {
            WireColumnType::Long => 0x03,
            WireColumnType::VarString => 0xfd,
            other => panic!("unhandled test wire type {other:?}"),
        });
        buf.extend_from_slice(&0u16.to_le_bytes()); // flags
        buf.push(0); // decimals
        buf
    }

    #[test]
    fn resolves_text_rows_across_two_batches() {
        let col_packets = vec![column_packet("id", WireColumnType::Long)];
        let mut results = Results::from_column_packets(&col_packets, MetaMode::Full, RowEncoding::Text).unwrap();
        assert_eq!(results.columns().len(), 1);

        let mut row1 = Vec::new();
        protocol::codec::write_len_enc_bytes(&mut row1, b"1");
        let mut row2 = Vec::new();
        protocol::codec::write_len_enc_bytes(&mut row2, b"2");
        results.push_batch(vec![row1]);
        results.push_batch(vec![row2]);

        assert_eq!(results.num_rows(), 2);
        let rows = results.resolve().unwrap();
        assert_eq!(rows, vec![vec![Field::Int(1)], vec![Field::Int(2)]]);
    }
}
