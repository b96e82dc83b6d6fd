//! `COM_STMT_PREPARE`: registers a parameterized statement with the server
//! and captures the parameter/column definitions later needed to bind
//! parameters and decode a binary result set. Grounded on [`super::query`]'s
//! "one raw packet at a time" shape and `conn::connection::query_result`'s
//! column-definition-then-optional-EOF loop, generalized to also read the
//! leading `COM_STMT_PREPARE_OK` header and the parameter-definition block
//! the text protocol never has.

use common::err::decode_error::ReError;
use common::err::CResult;

use crate::next_action::NextAction;
use crate::state::ConnState;

const COM_STMT_PREPARE: u8 = 0x16;
const OK_PACKET: u8 = 0x00;
const ERR_PACKET: u8 = 0xFF;

/// What a successful `COM_STMT_PREPARE` produced: the statement id future
/// `Execute`/`Fetch`/`CloseStatement` calls reference, plus the raw
/// parameter and result-column definition packets (decoded on demand by the
/// execution processor via [`protocol::column::Metadata::parse`]).
#[derive(Debug)]
pub struct PreparedStatement {
    pub statement_id: u32,
    pub warning_count: u16,
    pub param_defs: Vec<Vec<u8>>,
    pub column_defs: Vec<Vec<u8>>,
}

#[derive(Debug)]
enum Step {
    AwaitSend(String),
    AwaitHeader,
    AwaitParamDefs { remaining: usize, defs: Vec<Vec<u8>> },
    AwaitParamsEof { defs: Vec<Vec<u8>> },
    AwaitColumnDefs { params: Vec<Vec<u8>>, remaining: usize, defs: Vec<Vec<u8>> },
    AwaitColumnsEof { params: Vec<Vec<u8>>, columns: Vec<Vec<u8>> },
    Done,
}

pub struct Prepare {
    step: Step,
    header: Option<(u32, u16, u16, u16)>, // statement_id, num_columns, num_params, warning_count
    result: Option<PreparedStatement>,
}

impl Prepare {
    pub fn new(sql: impl Into<String>) -> Self {
        Prepare { step: Step::AwaitSend(sql.into()), header: None, result: None }
    }

    pub fn into_statement(self) -> Option<PreparedStatement> {
        self.result
    }

    pub fn resume(&mut self, conn: &mut ConnState) -> CResult<NextAction> {
        loop {
            match &mut self.step {
                Step::AwaitSend(sql) => {
                    let mut payload = vec![COM_STMT_PREPARE];
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
                            let (statement_id, num_columns, num_params, warning_count) =
                                parse_prepare_ok(&packet)?;
                            self.header = Some((statement_id, num_columns, num_params, warning_count));
                            self.step = Step::AwaitParamDefs {
                                remaining: num_params as usize,
                                defs: Vec::with_capacity(num_params as usize),
                            };
                        }
                        Some(ERR_PACKET) => {
                            super::server_error_from_packet(&packet)?;
                            unreachable!("server_error_from_packet returns Err for 0xFF");
                        }
                        other => {
                            return Err(ReError::Framing(format!(
                                "unexpected byte {other:?} starting COM_STMT_PREPARE response"
                            )))
                        }
                    }
                }

                Step::AwaitParamDefs { remaining, defs } => {
                    if *remaining == 0 {
                        let defs = std::mem::take(defs);
                        self.step = if conn.has_capability(protocol::capability::CLIENT_DEPRECATE_EOF) || defs.is_empty()
                        {
                            let (_, num_columns, _, _) = self.header.expect("header parsed before param defs");
                            Step::AwaitColumnDefs {
                                params: defs,
                                remaining: num_columns as usize,
                                defs: Vec::with_capacity(num_columns as usize),
                            }
                        } else {
                            Step::AwaitParamsEof { defs }
                        };
                        continue;
                    }
                    let Some(packet) = take_message(conn)? else {
                        return Ok(NextAction::Read);
                    };
                    defs.push(packet);
                    *remaining -= 1;
                }

                Step::AwaitParamsEof { defs } => {
                    let Some(_eof) = take_message(conn)? else {
                        return Ok(NextAction::Read);
                    };
                    let defs = std::mem::take(defs);
                    let (_, num_columns, _, _) = self.header.expect("header parsed before param defs");
                    self.step = Step::AwaitColumnDefs {
                        params: defs,
                        remaining: num_columns as usize,
                        defs: Vec::with_capacity(num_columns as usize),
                    };
                }

                Step::AwaitColumnDefs { params, remaining, defs } => {
                    if *remaining == 0 {
                        let params = std::mem::take(params);
                        let columns = std::mem::take(defs);
                        if conn.has_capability(protocol::capability::CLIENT_DEPRECATE_EOF) || columns.is_empty() {
                            self.finish(params, columns);
                            return Ok(NextAction::Done(Ok(())));
                        }
                        self.step = Step::AwaitColumnsEof { params, columns };
                        continue;
                    }
                    let Some(packet) = take_message(conn)? else {
                        return Ok(NextAction::Read);
                    };
                    defs.push(packet);
                    *remaining -= 1;
                }

                Step::AwaitColumnsEof { params, columns } => {
                    let Some(_eof) = take_message(conn)? else {
                        return Ok(NextAction::Read);
                    };
                    let params = std::mem::take(params);
                    let columns = std::mem::take(columns);
                    self.finish(params, columns);
                    return Ok(NextAction::Done(Ok(())));
                }

                Step::Done => return Ok(NextAction::Done(Ok(()))),
            }
        }
    }

    fn finish(&mut self, param_defs: Vec<Vec<u8>>, column_defs: Vec<Vec<u8>>) {
        let (statement_id, _, _, warning_count) = self.header.expect("header parsed before finishing");
        self.result = Some(PreparedStatement { statement_id, warning_count, param_defs, column_defs });
        self.step = Step::Done;
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

fn parse_prepare_ok(packet: &[u8]) -> CResult<(u32, u16, u16, u16)> {
    use byteorder::{LittleEndian, ReadBytesExt};
    let mut cursor = std::io::Cursor::new(&packet[1..]);
    let truncated = || ReError::Framing("truncated COM_STMT_PREPARE_OK header".to_string());
    let statement_id = cursor.read_u32::<LittleEndian>().map_err(|_| truncated())?;
    let num_columns = cursor.read_u16::<LittleEndian>().map_err(|_| truncated())?;
    let num_params = cursor.read_u16::<LittleEndian>().map_err(|_| truncated())?;
    let _filler = cursor.read_u8().map_err(|_| truncated())?;
    let warning_count = cursor.read_u16::<LittleEndian>().unwrap_or(0);
    Ok((statement_id, num_columns, num_params, warning_count))
}

#[cfg(test)]
mod test {
    use super::*;

    fn prepare_ok(statement_id: u32, num_columns: u16, num_params: u16) -> Vec<u8> {
        use byteorder::{LittleEndian, WriteBytesExt};
        let mut buf = vec![OK_PACKET];
        buf.write_u32::<LittleEndian>(statement_id).unwrap();
        buf.write_u16::<LittleEndian>(num_columns).unwrap();
        buf.write_u16::<LittleEndian>(num_params).unwrap();
        buf.push(0);
        buf.write_u16::<LittleEndian>(0).unwrap();
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
    fn prepare_with_no_params_or_columns_finishes_after_header() {
        let mut conn = ConnState::new();
        conn.capabilities = protocol::CapabilityFlags::new(protocol::capability::CLIENT_DEPRECATE_EOF);
        let mut prepare = Prepare::new("DELETE FROM t WHERE 1=1");
        assert!(matches!(prepare.resume(&mut conn).unwrap(), NextAction::Write(_)));
        conn.sequence = protocol::frame::SequenceNumber(1);
        feed(&mut conn, &prepare_ok(7, 0, 0));
        assert!(matches!(prepare.resume(&mut conn).unwrap(), NextAction::Done(Ok(()))));
        let stmt = prepare.into_statement().unwrap();
        assert_eq!(stmt.statement_id, 7);
        assert!(stmt.param_defs.is_empty());
        assert!(stmt.column_defs.is_empty());
    }

    #[test]
    fn prepare_collects_one_param_def() {
        let mut conn = ConnState::new();
        conn.capabilities = protocol::CapabilityFlags::new(protocol::capability::CLIENT_DEPRECATE_EOF);
        let mut prepare = Prepare::new("SELECT * FROM t WHERE id = ?");
        assert!(matches!(prepare.resume(&mut conn).unwrap(), NextAction::Write(_)));
        conn.sequence = protocol::frame::SequenceNumber(1);
        feed(&mut conn, &prepare_ok(1, 0, 1));
        assert!(matches!(prepare.resume(&mut conn).unwrap(), NextAction::Read));
        feed(&mut conn, b"param-def-packet");
        assert!(matches!(prepare.resume(&mut conn).unwrap(), NextAction::Done(Ok(()))));
        let stmt = prepare.into_statement().unwrap();
        assert_eq!(stmt.param_defs.len(), 1);
    }
}
