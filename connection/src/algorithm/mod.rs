//! Sans-I/O protocol algorithms: each is a resumable state machine that
//! inspects/mutates a [`crate::state::ConnState`] and returns a
//! [`crate::next_action::NextAction`] telling the engine runner what I/O to
//! perform next. None of these touch a socket directly — see `engine` for
//! the runners that drive them.

pub mod close_statement;
pub mod execute;
pub mod fetch;
pub mod handshake;
pub mod ping;
pub mod pipeline;
pub mod prepare;
pub mod query;
pub mod quit;
pub mod reset;
pub mod set_charset;

use common::err::decode_error::ReError;
use common::err::CResult;

use crate::next_action::NextAction;
use crate::state::ConnState;

/// Common shape of every resumable protocol algorithm: mutate `conn` and
/// return what the engine runner must do next. Lets a runner drive any of
/// `Handshake`, `Query`, `Ping`, `Quit` without matching on which one it is.
pub trait Algorithm {
    fn resume(&mut self, conn: &mut ConnState) -> CResult<NextAction>;
}

impl Algorithm for handshake::Handshake {
    fn resume(&mut self, conn: &mut ConnState) -> CResult<NextAction> {
        handshake::Handshake::resume(self, conn)
    }
}

impl Algorithm for query::Query {
    fn resume(&mut self, conn: &mut ConnState) -> CResult<NextAction> {
        query::Query::resume(self, conn)
    }
}

impl Algorithm for ping::Ping {
    fn resume(&mut self, conn: &mut ConnState) -> CResult<NextAction> {
        ping::Ping::resume(self, conn)
    }
}

impl Algorithm for quit::Quit {
    fn resume(&mut self, conn: &mut ConnState) -> CResult<NextAction> {
        quit::Quit::resume(self, conn)
    }
}

impl Algorithm for reset::ResetConnection {
    fn resume(&mut self, conn: &mut ConnState) -> CResult<NextAction> {
        reset::ResetConnection::resume(self, conn)
    }
}

impl Algorithm for prepare::Prepare {
    fn resume(&mut self, conn: &mut ConnState) -> CResult<NextAction> {
        prepare::Prepare::resume(self, conn)
    }
}

impl Algorithm for execute::Execute {
    fn resume(&mut self, conn: &mut ConnState) -> CResult<NextAction> {
        execute::Execute::resume(self, conn)
    }
}

impl Algorithm for close_statement::CloseStatement {
    fn resume(&mut self, conn: &mut ConnState) -> CResult<NextAction> {
        close_statement::CloseStatement::resume(self, conn)
    }
}

impl Algorithm for set_charset::SetCharset {
    fn resume(&mut self, conn: &mut ConnState) -> CResult<NextAction> {
        set_charset::SetCharset::resume(self, conn)
    }
}

impl Algorithm for fetch::Fetch {
    fn resume(&mut self, conn: &mut ConnState) -> CResult<NextAction> {
        fetch::Fetch::resume(self, conn)
    }
}

impl Algorithm for pipeline::Pipeline {
    fn resume(&mut self, conn: &mut ConnState) -> CResult<NextAction> {
        pipeline::Pipeline::resume(self, conn)
    }
}

/// Attempts to pull one complete message out of `conn`'s read buffer,
/// advancing `conn.sequence` on success. Returns `Ok(None)` (and the caller
/// should yield `NextAction::Read`) when more bytes are needed.
pub(crate) fn poll_message(conn: &mut ConnState) -> CResult<Option<()>> {
    match protocol::frame::try_reassemble(&mut conn.read_buffer, conn.sequence)? {
        Some(next_seq) => {
            conn.sequence = protocol::frame::SequenceNumber(next_seq);
            Ok(Some(()))
        }
        None => Ok(None),
    }
}

/// Frames and writes `payload`, advancing `conn.sequence` past the frames
/// that will be written.
pub(crate) fn frame_for_write(conn: &mut ConnState, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    conn.sequence = protocol::frame::write_framed(&mut out, payload, conn.sequence);
    out
}

/// Raised when the server sends `ERR_Packet` in response to a command.
pub(crate) fn server_error_from_packet(packet: &[u8]) -> CResult<()> {
    if packet.first() != Some(&0xFF) {
        return Ok(());
    }
    use std::io::Cursor;
    use byteorder::{LittleEndian, ReadBytesExt};

    let mut cursor = Cursor::new(&packet[1..]);
    let code = cursor
        .read_u16::<LittleEndian>()
        .map_err(|_| ReError::Framing("truncated ERR_Packet".to_string()))?;

    let mut rest = Cursor::new(&packet[3..]);
    let sqlstate = if packet.get(3) == Some(&b'#') {
        std::io::Read::read_exact(&mut rest, &mut [0u8; 1]).ok();
        let mut state = [0u8; 5];
        std::io::Read::read_exact(&mut rest, &mut state)
            .map_err(|_| ReError::Framing("truncated ERR_Packet sqlstate".to_string()))?;
        Some(String::from_utf8_lossy(&state).to_string())
    } else {
        None
    };
    let message = protocol::codec::read_eof_string(&mut rest)?;

    Err(ReError::Server { code, sqlstate, message })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn server_error_parses_sqlstate_and_message() {
        let mut packet = vec![0xFFu8];
        packet.extend_from_slice(&1045u16.to_le_bytes());
        packet.extend_from_slice(b"#28000");
        packet.extend_from_slice(b"Access denied");
        let err = server_error_from_packet(&packet).unwrap_err();
        match err {
            ReError::Server { code, sqlstate, message } => {
                assert_eq!(code, 1045);
                assert_eq!(sqlstate.as_deref(), Some("28000"));
                assert_eq!(message, "Access denied");
            }
            other => panic!("unexpected error variant: {other:?}"),
        }
    }

    #[test]
    fn non_error_packet_is_ok() {
        assert!(server_error_from_packet(&[0x00, 0x00]).is_ok());
    }
}
