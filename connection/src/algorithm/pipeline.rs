//! Drives a fixed sequence of heterogeneous commands over one connection as
//! a single [`Algorithm`], so a caller gets one `NextAction` stream to drive
//! instead of juggling several. Grounded on `handshake::Handshake`'s
//! "advance through an enum of steps, returning whatever the current step
//! needs" shape, generalized from one algorithm's internal steps to a
//! sequence of independently-complete algorithms.
//!
//! Each step still fully completes (its own writes and reads) before the
//! next one starts: [`crate::state::ConnState`] carries a single running
//! sequence counter for the command currently in flight, not one per queued
//! command, so batching every step's initial write onto the wire ahead of
//! reading any response is not representable without widening that state.
//! What pipelining buys here is avoiding a round trip back to the caller
//! between commands, not collapsing multiple commands into one TCP write.

use common::err::CResult;

use super::Algorithm;
use super::close_statement::CloseStatement;
use super::execute::Execute;
use super::fetch::Fetch;
use super::ping::Ping;
use super::prepare::Prepare;
use super::query::Query;
use super::reset::ResetConnection;
use super::set_charset::SetCharset;
use crate::next_action::NextAction;
use crate::state::ConnState;

/// One command in a pipeline, closed over the algorithms this crate
/// implements. Not a `Box<dyn Algorithm>`: a closed enum lets a caller match
/// back on [`Pipeline::into_steps`] to recover each step's typed outcome
/// (`Query::into_outcome`, `Prepare::into_statement`, ...).
pub enum PipelineStep {
    Query(Query),
    Prepare(Prepare),
    Execute(Execute),
    Fetch(Fetch),
    Ping(Ping),
    SetCharset(SetCharset),
    CloseStatement(CloseStatement),
    Reset(ResetConnection),
}

impl Algorithm for PipelineStep {
    fn resume(&mut self, conn: &mut ConnState) -> CResult<NextAction> {
        match self {
            PipelineStep::Query(a) => a.resume(conn),
            PipelineStep::Prepare(a) => a.resume(conn),
            PipelineStep::Execute(a) => a.resume(conn),
            PipelineStep::Fetch(a) => a.resume(conn),
            PipelineStep::Ping(a) => a.resume(conn),
            PipelineStep::SetCharset(a) => a.resume(conn),
            PipelineStep::CloseStatement(a) => a.resume(conn),
            PipelineStep::Reset(a) => a.resume(conn),
        }
    }
}

pub struct Pipeline {
    steps: Vec<PipelineStep>,
    index: usize,
}

impl Pipeline {
    pub fn new(steps: Vec<PipelineStep>) -> Self {
        Pipeline { steps, index: 0 }
    }

    /// Hands the steps back once the pipeline is done, so the caller can
    /// pull each one's typed result out.
    pub fn into_steps(self) -> Vec<PipelineStep> {
        self.steps
    }

    pub fn resume(&mut self, conn: &mut ConnState) -> CResult<NextAction> {
        loop {
            let Some(step) = self.steps.get_mut(self.index) else {
                return Ok(NextAction::Done(Ok(())));
            };
            match step.resume(conn)? {
                NextAction::Done(Ok(())) => {
                    self.index += 1;
                    continue;
                }
                NextAction::Done(Err(e)) => return Ok(NextAction::Done(Err(e))),
                other => return Ok(other),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn feed(conn: &mut ConnState, payload: &[u8]) {
        let mut wire = Vec::new();
        protocol::frame::write_framed(&mut wire, payload, conn.sequence);
        let dst = conn.read_buffer.free_mut(wire.len());
        dst[..wire.len()].copy_from_slice(&wire);
        conn.read_buffer.commit_read(wire.len());
    }

    fn ok_packet() -> Vec<u8> {
        vec![0x00, 0, 0, 0, 0, 0, 0]
    }

    #[test]
    fn pipeline_runs_each_step_to_completion_in_order() {
        let mut conn = ConnState::new();
        let mut pipeline = Pipeline::new(vec![
            PipelineStep::Ping(Ping::new()),
            PipelineStep::Query(Query::new("SELECT 1")),
        ]);

        // Ping: write, then await its OK.
        assert!(matches!(pipeline.resume(&mut conn).unwrap(), NextAction::Write(_)));
        conn.sequence = protocol::frame::SequenceNumber(1);
        feed(&mut conn, &ok_packet());
        // Query: write.
        assert!(matches!(pipeline.resume(&mut conn).unwrap(), NextAction::Write(_)));
        conn.sequence = protocol::frame::SequenceNumber(1);
        feed(&mut conn, &ok_packet());
        assert!(matches!(pipeline.resume(&mut conn).unwrap(), NextAction::Done(Ok(()))));

        let steps = pipeline.into_steps();
        assert_eq!(steps.len(), 2);
        assert!(matches!(steps[0], PipelineStep::Ping(_)));
        assert!(matches!(steps[1], PipelineStep::Query(_)));
    }

    #[test]
    fn pipeline_stops_at_first_error() {
        let mut conn = ConnState::new();
        let mut pipeline = Pipeline::new(vec![PipelineStep::Ping(Ping::new()), PipelineStep::Ping(Ping::new())]);
        assert!(matches!(pipeline.resume(&mut conn).unwrap(), NextAction::Write(_)));
        conn.sequence = protocol::frame::SequenceNumber(1);
        let mut err_packet = vec![0xFFu8];
        err_packet.extend_from_slice(&1045u16.to_le_bytes());
        err_packet.extend_from_slice(b"#28000");
        err_packet.extend_from_slice(b"Access denied");
        feed(&mut conn, &err_packet);
        assert!(pipeline.resume(&mut conn).is_err());
    }
}
