//! `COM_STMT_FETCH`: pulls the next batch of rows from a cursor opened by a
//! `COM_STMT_EXECUTE` that requested one. Grounded on [`super::query::Query`]
//! 's row-collection loop, narrowed to skip the column-definition phase
//! (fetch reuses the column defs the owning `Prepare`/`Execute` already
//! captured) and to surface
//! `protocol::status::SERVER_STATUS_LAST_ROW_SENT` instead of an `OK`/result
//! distinction.

use common::err::decode_error::ReError;
use common::err::CResult;
use protocol::status::SERVER_STATUS_LAST_ROW_SENT;

use crate::next_action::NextAction;
use crate::state::ConnState;

const COM_STMT_FETCH: u8 = 0x1C;
const OK_PACKET: u8 = 0x00;
const ERR_PACKET: u8 = 0xFF;

/// One batch of fetched rows. `last_row_sent` mirrors the server's
/// `SERVER_STATUS_LAST_ROW_SENT` flag: once set, the cursor is exhausted and
/// no further `Fetch` should be issued for this statement.
#[derive(Debug)]
pub struct FetchBatch {
    pub row_packets: Vec<Vec<u8>>,
    pub last_row_sent: bool,
}

#[derive(Debug)]
enum Step {
    AwaitSend,
    AwaitRows { rows: Vec<Vec<u8>> },
    Done,
}

pub struct Fetch {
    statement_id: u32,
    num_rows: u32,
    step: Step,
    result: Option<FetchBatch>,
}

impl Fetch {
    pub fn new(statement_id: u32, num_rows: u32) -> Self {
        Fetch { statement_id, num_rows, step: Step::AwaitSend, result: None }
    }

    pub fn into_batch(self) -> Option<FetchBatch> {
        self.result
    }

    pub fn resume(&mut self, conn: &mut ConnState) -> CResult<NextAction> {
        loop {
            match &mut self.step {
                Step::AwaitSend => {
                    let mut payload = vec![COM_STMT_FETCH];
                    payload.extend_from_slice(&self.statement_id.to_le_bytes());
                    payload.extend_from_slice(&self.num_rows.to_le_bytes());
                    conn.sequence = protocol::frame::SequenceNumber(0);
                    let frame = super::frame_for_write(conn, &payload);
                    self.step = Step::AwaitRows { rows: Vec::new() };
                    return Ok(NextAction::Write(frame));
                }

                Step::AwaitRows { rows } => {
                    let Some(packet) = take_message(conn)? else {
                        return Ok(NextAction::Read);
                    };
                    match packet.first().copied() {
                        Some(OK_PACKET) if packet.len() < 0xFF_FFFF => {
                            let last_row_sent = parse_status_flags(&packet)?.contains(SERVER_STATUS_LAST_ROW_SENT);
                            let Step::AwaitRows { rows } = std::mem::replace(&mut self.step, Step::Done) else {
                                unreachable!()
                            };
                            self.result = Some(FetchBatch { row_packets: rows, last_row_sent });
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

fn parse_status_flags(packet: &[u8]) -> CResult<protocol::status::StatusFlags> {
    use byteorder::{LittleEndian, ReadBytesExt};
    let mut cursor = std::io::Cursor::new(&packet[1..]);
    let _affected_rows = protocol::codec::read_len_enc_int(&mut cursor)?;
    let _last_insert_id = protocol::codec::read_len_enc_int(&mut cursor)?;
    let status_flags = cursor
        .read_u16::<LittleEndian>()
        .map_err(|_| ReError::Framing("truncated fetch terminator status flags".to_string()))?;
    Ok(protocol::status::StatusFlags::new(status_flags))
}

#[cfg(test)]
mod test {
    use super::*;

    fn terminator(status_flags: u16) -> Vec<u8> {
        let mut buf = vec![OK_PACKET, 0, 0];
        buf.extend_from_slice(&status_flags.to_le_bytes());
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
    fn fetch_collects_rows_then_reports_last_row_sent() {
        let mut conn = ConnState::new();
        let mut fetch = Fetch::new(9, 2);
        assert!(matches!(fetch.resume(&mut conn).unwrap(), NextAction::Write(_)));
        conn.sequence = protocol::frame::SequenceNumber(1);
        feed(&mut conn, &[0x00, 1, 2, 3]); // one binary row
        assert!(matches!(fetch.resume(&mut conn).unwrap(), NextAction::Read));
        feed(&mut conn, &terminator(SERVER_STATUS_LAST_ROW_SENT));
        assert!(matches!(fetch.resume(&mut conn).unwrap(), NextAction::Done(Ok(()))));
        let batch = fetch.into_batch().unwrap();
        assert_eq!(batch.row_packets.len(), 1);
        assert!(batch.last_row_sent);
    }
}
