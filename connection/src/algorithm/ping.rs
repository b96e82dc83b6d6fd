//! `COM_PING`: round-trips a single command byte to confirm the connection
//! is alive, used by pool health checks between checkouts.

use common::err::CResult;

use crate::next_action::NextAction;
use crate::state::ConnState;

const COM_PING: u8 = 0x0E;
const OK_PACKET: u8 = 0x00;

#[derive(Debug, Default)]
enum Step {
    #[default]
    AwaitSend,
    AwaitResult,
}

#[derive(Debug, Default)]
pub struct Ping {
    step: Step,
}

impl Ping {
    pub fn new() -> Self {
        Ping::default()
    }

    pub fn resume(&mut self, conn: &mut ConnState) -> CResult<NextAction> {
        match self.step {
            Step::AwaitSend => {
                conn.sequence = protocol::frame::SequenceNumber(0);
                let frame = super::frame_for_write(conn, &[COM_PING]);
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
    fn ping_writes_then_awaits_ok() {
        let mut conn = ConnState::new();
        let mut ping = Ping::new();
        match ping.resume(&mut conn).unwrap() {
            NextAction::Write(buf) => assert_eq!(buf.last(), Some(&COM_PING)),
            other => panic!("unexpected action: {other:?}"),
        }
        conn.sequence = protocol::frame::SequenceNumber(1);
        feed_ok(&mut conn);
        assert!(matches!(ping.resume(&mut conn).unwrap(), NextAction::Done(Ok(()))));
    }
}
