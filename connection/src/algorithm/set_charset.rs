//! Sets the connection's character set via `SET NAMES`, issued over the text
//! protocol like [`super::query::Query`] but narrowed to the single
//! OK-or-error response `SET NAMES` always produces — it can never return a
//! result set, so this algorithm doesn't carry the column/row bookkeeping
//! `Query` needs.

use common::err::decode_error::ReError;
use common::err::CResult;

use crate::next_action::NextAction;
use crate::state::ConnState;

const COM_QUERY: u8 = 0x03;
const OK_PACKET: u8 = 0x00;
const ERR_PACKET: u8 = 0xFF;

#[derive(Debug)]
enum Step {
    AwaitSend(String),
    AwaitResult,
    Done,
}

pub struct SetCharset {
    step: Step,
}

impl SetCharset {
    /// `charset_name` is a MySQL charset name (e.g. `utf8mb4`), not a
    /// collation id; quoting follows `SET NAMES`'s own grammar, which takes
    /// an unquoted identifier.
    pub fn new(charset_name: impl Into<String>) -> Self {
        let sql = format!("SET NAMES {}", charset_name.into());
        SetCharset { step: Step::AwaitSend(sql) }
    }

    pub fn resume(&mut self, conn: &mut ConnState) -> CResult<NextAction> {
        loop {
            match &self.step {
                Step::AwaitSend(sql) => {
                    let mut payload = vec![COM_QUERY];
                    payload.extend_from_slice(sql.as_bytes());
                    conn.sequence = protocol::frame::SequenceNumber(0);
                    let frame = super::frame_for_write(conn, &payload);
                    self.step = Step::AwaitResult;
                    return Ok(NextAction::Write(frame));
                }

                Step::AwaitResult => {
                    let Some(()) = super::poll_message(conn)? else {
                        return Ok(NextAction::Read);
                    };
                    let packet = conn.read_buffer.current_message().to_vec();
                    conn.read_buffer.finish_message();
                    self.step = Step::Done;
                    match packet.first().copied() {
                        Some(OK_PACKET) => return Ok(NextAction::Done(Ok(()))),
                        Some(ERR_PACKET) => {
                            super::server_error_from_packet(&packet)?;
                            unreachable!("server_error_from_packet returns Err for 0xFF");
                        }
                        other => {
                            return Err(ReError::Framing(format!(
                                "unexpected byte {other:?} in response to SET NAMES"
                            )))
                        }
                    }
                }

                Step::Done => return Ok(NextAction::Done(Ok(()))),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn ok_packet() -> Vec<u8> {
        vec![OK_PACKET, 0, 0, 0, 0, 0, 0]
    }

    fn feed(conn: &mut ConnState, payload: &[u8]) {
        let mut wire = Vec::new();
        protocol::frame::write_framed(&mut wire, payload, conn.sequence);
        let dst = conn.read_buffer.free_mut(wire.len());
        dst[..wire.len()].copy_from_slice(&wire);
        conn.read_buffer.commit_read(wire.len());
    }

    #[test]
    fn set_charset_sends_set_names_and_awaits_ok() {
        let mut conn = ConnState::new();
        let mut set_charset = SetCharset::new("utf8mb4");
        match set_charset.resume(&mut conn).unwrap() {
            NextAction::Write(buf) => {
                assert!(buf.windows(b"SET NAMES utf8mb4".len()).any(|w| w == b"SET NAMES utf8mb4"));
            }
            other => panic!("unexpected action: {other:?}"),
        }
        conn.sequence = protocol::frame::SequenceNumber(1);
        feed(&mut conn, &ok_packet());
        assert!(matches!(set_charset.resume(&mut conn).unwrap(), NextAction::Done(Ok(()))));
    }
}
