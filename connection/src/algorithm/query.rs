//! `COM_QUERY`: runs one SQL statement over the text protocol. Grounded on
//! `conn::connection::Connection::query`/`query_stream`'s two-shape response
//! (an `OK_Packet` for statements with no result set, or a column count
//! followed by column definitions and rows for statements that return one),
//! generalized to capture the raw packets a result set needs rather than the
//! single hand-rolled row shape a binlog reader cared about. Decoding those
//! packets into typed [`protocol::value::Field`]s is the execution
//! processor's job, not this algorithm's.

use common::err::decode_error::ReError;
use common::err::CResult;

use crate::next_action::NextAction;
use crate::state::ConnState;

const COM_QUERY: u8 = 0x03;
const OK_PACKET: u8 = 0x00;
const ERR_PACKET: u8 = 0xFF;
const LOCAL_INFILE_PACKET: u8 = 0xFB;

/// What a completed query produced.
#[derive(Debug)]
pub enum QueryOutcome {
    /// No result set: affected rows, last insert id, and warning count.
    Ok {
        affected_rows: u64,
        last_insert_id: u64,
        warnings: u16,
    },
    /// A result set: one raw column-definition packet per column, then one
    /// raw row packet per row, both still in wire form.
    ResultSet {
        column_packets: Vec<Vec<u8>>,
        row_packets: Vec<Vec<u8>>,
    },
}

#[derive(Debug)]
enum Step {
    AwaitSend(String),
    AwaitHeader,
    AwaitColumnDefs { remaining: usize, defs: Vec<Vec<u8>> },
    AwaitRows { defs: Vec<Vec<u8>>, rows: Vec<Vec<u8>> },
    Done,
}

pub struct Query {
    step: Step,
    result: Option<QueryOutcome>,
}

impl Query {
    pub fn new(sql: impl Into<String>) -> Self {
        Query { step: Step::AwaitSend(sql.into()), result: None }
    }

    /// Takes the outcome once `resume` has returned `NextAction::Done(Ok(()))`.
    pub fn into_outcome(self) -> Option<QueryOutcome> {
        self.result
    }

    pub fn resume(&mut self, conn: &mut ConnState) -> CResult<NextAction> {
        loop {
            match &mut self.step {
                Step::AwaitSend(sql) => {
                    let mut payload = vec![COM_QUERY];
                    payload.extend_from_slice(sql.as_bytes());
                    conn.sequence = protocol::frame::SequenceNumber(0);
                    let frame = super::frame_for_write(conn, &payload);
                    self.step = Step::AwaitHeader;
                    return Ok(NextAction::Write(frame));
                }

                Step::AwaitHeader => {
                    let Some(packet) = take_message(conn)? else {
                        return Ok(NextAction::Read);
                    };
                    match packet.first().copied() {
                        Some(OK_PACKET) => {
                            let (affected_rows, last_insert_id, warnings) = parse_ok_packet(&packet)?;
                            self.result = Some(QueryOutcome::Ok { affected_rows, last_insert_id, warnings });
                            self.step = Step::Done;
                            return Ok(NextAction::Done(Ok(())));
                        }
                        Some(ERR_PACKET) => {
                            super::server_error_from_packet(&packet)?;
                            unreachable!("server_error_from_packet returns Err for 0xFF");
                        }
                        Some(LOCAL_INFILE_PACKET) => {
                            return Err(ReError::Precondition(
                                "LOCAL INFILE requests are not supported".to_string(),
                            ))
                        }
                        _ => {
                            let mut cursor = std::io::Cursor::new(packet.as_slice());
                            let column_count = protocol::codec::read_len_enc_int(&mut cursor)? as usize;
                            self.step = Step::AwaitColumnDefs {
                                remaining: column_count,
                                defs: Vec::with_capacity(column_count),
                            };
                        }
                    }
                }

                Step::AwaitColumnDefs { remaining, defs } => {
                    if *remaining == 0 {
                        let defs = std::mem::take(defs);
                        self.step = Step::AwaitRows { defs, rows: Vec::new() };
                        continue;
                    }
                    let Some(packet) = take_message(conn)? else {
                        return Ok(NextAction::Read);
                    };
                    defs.push(packet);
                    *remaining -= 1;
                }

                Step::AwaitRows { rows, .. } => {
                    let Some(packet) = take_message(conn)? else {
                        return Ok(NextAction::Read);
                    };
                    match packet.first().copied() {
                        Some(OK_PACKET) if packet.len() < 0xFF_FFFF => {
                            let Step::AwaitRows { defs, rows } = std::mem::replace(&mut self.step, Step::Done)
                            else {
                                unreachable!()
                            };
                            self.result = Some(QueryOutcome::ResultSet { column_packets: defs, row_packets: rows });
                            return Ok(NextAction::Done(Ok(())));
                        }
                        Some(ERR_PACKET) => {
                            super::server_error_from_packet(&packet)?;
                            unreachable!("server_error_from_packet returns Err for 0xFF");
                        }
                        _ => rows.push(packet),
                    }
                }

                Step::Done => return Ok(NextAction::Done(Ok(()))),
            }
        }
    }
}

fn take_message(conn: &mut ConnState) -> CResult<Option<Vec<u8>>> {
    match super::poll_message(conn)? {
        Some(()) => {
            let packet = conn.read_buffer.current_message().to_vec();
            conn.read_buffer.finish_message();
            Ok(Some(packet))
        }
        None => Ok(None),
    }
}

fn parse_ok_packet(packet: &[u8]) -> CResult<(u64, u64, u16)> {
    use byteorder::{LittleEndian, ReadBytesExt};
    let mut cursor = std::io::Cursor::new(&packet[1..]);
    let affected_rows = protocol::codec::read_len_enc_int(&mut cursor)?;
    let last_insert_id = protocol::codec::read_len_enc_int(&mut cursor)?;
    let _status_flags = cursor
        .read_u16::<LittleEndian>()
        .map_err(|_| ReError::Framing("truncated OK_Packet status flags".to_string()))?;
    let warnings = cursor.read_u16::<LittleEndian>().unwrap_or(0);
    Ok((affected_rows, last_insert_id, warnings))
}

#[cfg(test)]
mod test {
    use super::*;

    fn ok_packet(affected_rows: u64) -> Vec<u8> {
        let mut buf = vec![OK_PACKET];
        protocol::codec::write_len_enc_int(&mut buf, affected_rows);
        protocol::codec::write_len_enc_int(&mut buf, 0);
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf
    }

    fn feed(conn: &mut ConnState, payload: &[u8]) {
        let mut wire = Vec::new();
        protocol::frame::write_framed(&mut wire, payload, conn.sequence);
        let dst = conn.read_buffer.free_mut(wire.len());
        dst[..wire.len()].copy_from_slice(&wire);
        conn.read_buffer.commit_read(wire.len());
    }

    #[test]
    fn no_result_set_statement_yields_ok_outcome() {
        let mut conn = ConnState::new();
        let mut query = Query::new("DELETE FROM t");
        assert!(matches!(query.resume(&mut conn).unwrap(), NextAction::Write(_)));
        conn.sequence = protocol::frame::SequenceNumber(1);
        feed(&mut conn, &ok_packet(3));
        assert!(matches!(query.resume(&mut conn).unwrap(), NextAction::Done(Ok(()))));
        match query.into_outcome().unwrap() {
            QueryOutcome::Ok { affected_rows, .. } => assert_eq!(affected_rows, 3),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
