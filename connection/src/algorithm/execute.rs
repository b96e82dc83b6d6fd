//! `COM_STMT_EXECUTE`: binds parameters to a prepared statement and runs it
//! over the binary protocol. Grounded on [`super::query::Query`]'s
//! header/column-defs/rows state machine (reused verbatim for the response
//! side — binary result sets share the same packet shapes as text ones,
//! only the row encoding differs) plus `protocol::value::Field`'s variants
//! for the parameter-binding side, which `Query`'s text protocol never
//! needed.

use byteorder::{LittleEndian, WriteBytesExt};

use common::err::decode_error::ReError;
use common::err::CResult;
use protocol::value::{Date, DateTime, Field, Time};

use crate::next_action::NextAction;
use crate::state::ConnState;

const COM_STMT_EXECUTE: u8 = 0x17;
const CURSOR_TYPE_NO_CURSOR: u8 = 0x00;
const NEW_PARAMS_BIND_FLAG: u8 = 0x01;
const PARAM_UNSIGNED_FLAG: u8 = 0x80;

const TYPE_DOUBLE: u8 = 0x05;
const TYPE_FLOAT: u8 = 0x04;
const TYPE_LONGLONG: u8 = 0x08;
const TYPE_DATE: u8 = 0x0a;
const TYPE_DATETIME: u8 = 0x0c;
const TYPE_TIME: u8 = 0x0b;
const TYPE_VAR_STRING: u8 = 0xfd;
const TYPE_BLOB: u8 = 0xfc;
const TYPE_NULL: u8 = 0x06;

const OK_PACKET: u8 = 0x00;
const ERR_PACKET: u8 = 0xFF;
const LOCAL_INFILE_PACKET: u8 = 0xFB;

/// What executing a prepared statement produced — same shape as
/// [`super::query::QueryOutcome`], since the wire-level structure of the
/// response doesn't depend on text vs binary protocol.
#[derive(Debug)]
pub enum ExecuteOutcome {
    Ok { affected_rows: u64, last_insert_id: u64, warnings: u16 },
    ResultSet { column_packets: Vec<Vec<u8>>, row_packets: Vec<Vec<u8>> },
}

#[derive(Debug)]
enum Step {
    AwaitSend,
    AwaitHeader,
    AwaitColumnDefs { remaining: usize, defs: Vec<Vec<u8>> },
    AwaitRows { defs: Vec<Vec<u8>>, rows: Vec<Vec<u8>> },
    Done,
}

pub struct Execute {
    statement_id: u32,
    params: Vec<Field>,
    step: Step,
    result: Option<ExecuteOutcome>,
}

impl Execute {
    pub fn new(statement_id: u32, params: Vec<Field>) -> Self {
        Execute { statement_id, params, step: Step::AwaitSend, result: None }
    }

    pub fn into_outcome(self) -> Option<ExecuteOutcome> {
        self.result
    }

    pub fn resume(&mut self, conn: &mut ConnState) -> CResult<NextAction> {
        loop {
            match &mut self.step {
                Step::AwaitSend => {
                    let payload = build_execute_payload(self.statement_id, &self.params);
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
                            self.result = Some(ExecuteOutcome::Ok { affected_rows, last_insert_id, warnings });
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
                            self.result = Some(ExecuteOutcome::ResultSet { column_packets: defs, row_packets: rows });
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

fn build_execute_payload(statement_id: u32, params: &[Field]) -> Vec<u8> {
    let mut buf = vec![COM_STMT_EXECUTE];
    buf.extend_from_slice(&statement_id.to_le_bytes());
    buf.push(CURSOR_TYPE_NO_CURSOR);
    buf.extend_from_slice(&1u32.to_le_bytes());

    if !params.is_empty() {
        let null_flags: Vec<bool> = params.iter().map(Field::is_null).collect();
        buf.extend(protocol::codec::write_null_bitmap(&null_flags, 0));
        buf.push(NEW_PARAMS_BIND_FLAG);
        for param in params {
            let (type_code, unsigned) = param_type_code(param);
            buf.push(type_code);
            buf.push(if unsigned { PARAM_UNSIGNED_FLAG } else { 0x00 });
        }
        for param in params {
            write_param_value(&mut buf, param);
        }
    }
    buf
}

fn param_type_code(field: &Field) -> (u8, bool) {
    match field {
        Field::Null => (TYPE_NULL, false),
        Field::Int(_) => (TYPE_LONGLONG, false),
        Field::UInt(_) => (TYPE_LONGLONG, true),
        Field::Float(_) => (TYPE_FLOAT, false),
        Field::Double(_) => (TYPE_DOUBLE, false),
        Field::String(_) => (TYPE_VAR_STRING, false),
        Field::Blob(_) => (TYPE_BLOB, false),
        Field::Date(_) => (TYPE_DATE, false),
        Field::DateTime(_) => (TYPE_DATETIME, false),
        Field::Time(_) => (TYPE_TIME, false),
    }
}

fn write_param_value(buf: &mut Vec<u8>, field: &Field) {
    match field {
        Field::Null => {}
        Field::Int(v) => buf.write_i64::<LittleEndian>(*v).expect("write to Vec never fails"),
        Field::UInt(v) => buf.write_u64::<LittleEndian>(*v).expect("write to Vec never fails"),
        Field::Float(v) => buf.write_f32::<LittleEndian>(*v).expect("write to Vec never fails"),
        Field::Double(v) => buf.write_f64::<LittleEndian>(*v).expect("write to Vec never fails"),
        Field::String(bytes) | Field::Blob(bytes) => protocol::codec::write_len_enc_bytes(buf, bytes),
        Field::Date(date) => write_binary_date(buf, date),
        Field::DateTime(dt) => write_binary_datetime(buf, dt),
        Field::Time(time) => write_binary_time(buf, time),
    }
}

fn write_binary_date(buf: &mut Vec<u8>, date: &Date) {
    if date.is_zero() {
        buf.push(0);
        return;
    }
    buf.push(4);
    buf.write_u16::<LittleEndian>(date.year).expect("write to Vec never fails");
    buf.push(date.month);
    buf.push(date.day);
}

fn write_binary_datetime(buf: &mut Vec<u8>, dt: &DateTime) {
    if dt.date.is_zero() && dt.hour == 0 && dt.minute == 0 && dt.second == 0 && dt.microsecond == 0 {
        buf.push(0);
        return;
    }
    let len: u8 = if dt.microsecond != 0 { 11 } else { 7 };
    buf.push(len);
    buf.write_u16::<LittleEndian>(dt.date.year).expect("write to Vec never fails");
    buf.push(dt.date.month);
    buf.push(dt.date.day);
    buf.push(dt.hour);
    buf.push(dt.minute);
    buf.push(dt.second);
    if len == 11 {
        buf.write_u32::<LittleEndian>(dt.microsecond).expect("write to Vec never fails");
    }
}

fn write_binary_time(buf: &mut Vec<u8>, time: &Time) {
    if time.days == 0 && time.hours == 0 && time.minutes == 0 && time.seconds == 0 && time.microsecond == 0 {
        buf.push(0);
        return;
    }
    let len: u8 = if time.microsecond != 0 { 12 } else { 8 };
    buf.push(len);
    buf.push(time.negative as u8);
    buf.write_u32::<LittleEndian>(time.days).expect("write to Vec never fails");
    buf.push(time.hours);
    buf.push(time.minutes);
    buf.push(time.seconds);
    if len == 12 {
        buf.write_u32::<LittleEndian>(time.microsecond).expect("write to Vec never fails");
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
    use byteorder::ReadBytesExt;
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
    fn execute_with_params_writes_null_bitmap_and_types() {
        let mut conn = ConnState::new();
        let mut execute = Execute::new(5, vec![Field::Int(42), Field::Null]);
        match execute.resume(&mut conn).unwrap() {
            NextAction::Write(buf) => {
                // header(4) + com(1) + stmt_id(4) + flags(1) + iter(4) = 14
                assert_eq!(buf[4], 0x17);
                assert_eq!(&buf[5..9], &5u32.to_le_bytes());
                let null_bitmap_byte = buf[14];
                assert_eq!(null_bitmap_byte & 0b10, 0b10); // second param is null
                assert_eq!(buf[15], 1); // new-params-bind-flag
            }
            other => panic!("unexpected action: {other:?}"),
        }
        conn.sequence = protocol::frame::SequenceNumber(1);
        feed(&mut conn, &ok_packet(1));
        assert!(matches!(execute.resume(&mut conn).unwrap(), NextAction::Done(Ok(()))));
        match execute.into_outcome().unwrap() {
            ExecuteOutcome::Ok { affected_rows, .. } => assert_eq!(affected_rows, 1),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn execute_with_no_params_skips_binding_block() {
        let mut conn = ConnState::new();
        let mut execute = Execute::new(5, vec![]);
        match execute.resume(&mut conn).unwrap() {
            NextAction::Write(buf) => assert_eq!(buf.len(), 4 + 1 + 4 + 1 + 4),
            other => panic!("unexpected action: {other:?}"),
        }
    }
}
