//! `COM_STMT_CLOSE`: deallocates a prepared statement. Grounded on
//! [`super::quit::Quit`]'s shape — a fixed-size command payload with no
//! response expected, per the protocol's definition of `COM_STMT_CLOSE`.

use common::err::CResult;

use crate::next_action::NextAction;
use crate::state::ConnState;

const COM_STMT_CLOSE: u8 = 0x19;

#[derive(Debug, Default)]
enum Step {
    #[default]
    AwaitSend,
    Sent,
}

#[derive(Debug)]
pub struct CloseStatement {
    statement_id: u32,
    step: Step,
}

impl CloseStatement {
    pub fn new(statement_id: u32) -> Self {
        CloseStatement { statement_id, step: Step::default() }
    }

    pub fn resume(&mut self, conn: &mut ConnState) -> CResult<NextAction> {
        match self.step {
            Step::AwaitSend => {
                let mut payload = vec![COM_STMT_CLOSE];
                payload.extend_from_slice(&self.statement_id.to_le_bytes());
                conn.sequence = protocol::frame::SequenceNumber(0);
                let frame = super::frame_for_write(conn, &payload);
                self.step = Step::Sent;
                Ok(NextAction::Write(frame))
            }
            Step::Sent => Ok(NextAction::Done(Ok(()))),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn close_writes_statement_id_then_completes() {
        let mut conn = ConnState::new();
        let mut close = CloseStatement::new(0x0102_0304);
        match close.resume(&mut conn).unwrap() {
            NextAction::Write(buf) => {
                assert_eq!(buf[4], COM_STMT_CLOSE);
                assert_eq!(&buf[5..9], &0x0102_0304u32.to_le_bytes());
            }
            other => panic!("unexpected action: {other:?}"),
        }
        assert!(matches!(close.resume(&mut conn).unwrap(), NextAction::Done(Ok(()))));
    }
}
