//! `COM_QUIT`: tells the server the connection is closing. Grounded on
//! `conn::connection::Connection`'s shutdown path — a single fire-and-forget
//! command byte, no response expected.

use common::err::CResult;

use crate::next_action::NextAction;
use crate::state::ConnState;

const COM_QUIT: u8 = 0x01;

#[derive(Debug, Default)]
enum Step {
    #[default]
    AwaitSend,
    Sent,
}

#[derive(Debug, Default)]
pub struct Quit {
    step: Step,
}

impl Quit {
    pub fn new() -> Self {
        Quit::default()
    }

    pub fn resume(&mut self, conn: &mut ConnState) -> CResult<NextAction> {
        match self.step {
            Step::AwaitSend => {
                conn.sequence = protocol::frame::SequenceNumber(0);
                let frame = super::frame_for_write(conn, &[COM_QUIT]);
                self.step = Step::Sent;
                Ok(NextAction::Write(frame))
            }
            Step::Sent => Ok(NextAction::Done(Ok(()))),
        }
    }
}
