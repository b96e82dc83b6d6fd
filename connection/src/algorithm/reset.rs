//! `COM_RESET_CONNECTION`: clears session state (temp tables, transactions,
//! prepared statements, user variables) without paying for a full
//! reconnect. Grounded on `Quit`'s shape — a single command byte — plus
//! `Ping`'s shape for the OK response that follows it; the pool issues this
//! before returning a connection whose last use left session state behind.

use common::err::CResult;

use crate::next_action::NextAction;
use crate::state::ConnState;

const COM_RESET_CONNECTION: u8 = 0x1F;
const OK_PACKET: u8 = 0x00;

#[derive(Debug, Default)]
enum Step {
    #[default]
    AwaitSend,
    AwaitResult,
}

#[derive(Debug, Default)]
pub struct ResetConnection {
    step: Step,
}

impl ResetConnection {
    pub fn new() -> Self {
        ResetConnection::default()
    }

    pub fn resume(&mut self, conn: &mut ConnState) -> CResult<NextAction> {
        match self.step {
            Step::AwaitSend => {
                conn.sequence = protocol::frame::SequenceNumber(0);
                let frame = super::frame_for_write(conn, &[COM_RESET_CONNECTION]);
                self.step = Step::AwaitResult;
                Ok(NextAction::Write(frame))
            }
            Step::AwaitResult => {
                let Some(()) = super::poll_message(conn)? else {
                    return Ok(NextAction::Read);
                };
                let packet = conn.read_buffer.current_message().to_vec();
                conn.read_buffer.finish_message();
                if packet.first() == Some(&OK_PACKET) {
                    Ok(NextAction::Done(Ok(())))
                } else {
                    super::server_error_from_packet(&packet)?;
                    Ok(NextAction::Done(Ok(())))
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn feed_ok(conn: &mut ConnState) {
        let payload = [OK_PACKET, 0, 0, 0, 0, 0, 0];
        let mut wire = Vec::new();
        protocol::frame::write_framed(&mut wire, &payload, conn.sequence);
        let dst = conn.read_buffer.free_mut(wire.len());
        dst[..wire.len()].copy_from_slice(&wire);
        conn.read_buffer.commit_read(wire.len());
    }

    #[test]
    fn reset_writes_then_awaits_ok() {
        let mut conn = ConnState::new();
        let mut reset = ResetConnection::new();
        match reset.resume(&mut conn).unwrap() {
            NextAction::Write(buf) => assert_eq!(buf.last(), Some(&COM_RESET_CONNECTION)),
            other => panic!("unexpected action: {other:?}"),
        }
        conn.sequence = protocol::frame::SequenceNumber(1);
        feed_ok(&mut conn);
        assert!(matches!(reset.resume(&mut conn).unwrap(), NextAction::Done(Ok(()))));
    }
}
