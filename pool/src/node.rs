//! The per-node lifecycle state machine: connect, idle, hand out, return,
//! health-check, reconnect. A pure transition function with no I/O of its
//! own — the pool drives it and performs whatever `NodeAction` it yields.
//!
//! Grounded on `connection::algorithm`'s resumable-state-machine shape
//! (struct holding a `Step`, `resume` returning the next thing to do), one
//! level up: here the "thing to do" is connect/sleep/ping/reset rather than
//! read/write a socket.

use common::err::decode_error::ReError;
use common::err::CResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Initial,
    ConnectInProgress,
    SleepConnectFailed,
    Idle,
    InUse,
    PingInProgress,
    ResetInProgress,
    Terminated,
}

/// What the pool must do after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeAction {
    Connect,
    Sleep,
    IdleWait,
    Ping,
    /// `SET session state` followed by `COM_RESET` — a two-stage pipeline in
    /// the connection layer, one action here.
    Reset,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeEvent {
    Resume,
    ConnectOk,
    ConnectErr,
    Checkout,
    IdleTimerElapsed,
    ReturnedNeedsReset,
    ReturnedNoReset,
    PingOk,
    PingErr,
    ResetOk,
    ResetErr,
    Cancel,
}

impl NodeState {
    /// Applies one event, returning the resulting state and the action the
    /// pool must perform to reach it. `Cancel` is accepted from any state.
    pub fn apply(self, event: NodeEvent) -> CResult<(NodeState, NodeAction)> {
        use NodeEvent::*;
        use NodeState::*;

        if matches!(event, Cancel) {
            return Ok((Terminated, NodeAction::None));
        }

        let transition = match (self, event) {
            (Initial, Resume) => (ConnectInProgress, NodeAction::Connect),
            (ConnectInProgress, ConnectOk) => (Idle, NodeAction::IdleWait),
            (ConnectInProgress, ConnectErr) => (SleepConnectFailed, NodeAction::Sleep),
            (SleepConnectFailed, Resume) => (ConnectInProgress, NodeAction::Connect),
            (Idle, Checkout) => (InUse, NodeAction::None),
            (Idle, IdleTimerElapsed) => (PingInProgress, NodeAction::Ping),
            (InUse, ReturnedNeedsReset) => (ResetInProgress, NodeAction::Reset),
            (InUse, ReturnedNoReset) => (Idle, NodeAction::IdleWait),
            (InUse, IdleTimerElapsed) => (InUse, NodeAction::IdleWait),
            (PingInProgress, PingOk) => (Idle, NodeAction::IdleWait),
            (PingInProgress, PingErr) => (ConnectInProgress, NodeAction::Connect),
            (ResetInProgress, ResetOk) => (Idle, NodeAction::IdleWait),
            (ResetInProgress, ResetErr) => (ConnectInProgress, NodeAction::Connect),
            (state, event) => {
                return Err(ReError::Precondition(format!(
                    "illegal pool node transition: {event:?} in state {state:?}"
                )))
            }
        };
        Ok(transition)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use NodeEvent::*;
    use NodeState::*;

    #[test]
    fn happy_path_connect_checkout_return() {
        let (s, a) = Initial.apply(Resume).unwrap();
        assert_eq!((s, a), (ConnectInProgress, NodeAction::Connect));
        let (s, a) = s.apply(ConnectOk).unwrap();
        assert_eq!((s, a), (Idle, NodeAction::IdleWait));
        let (s, a) = s.apply(Checkout).unwrap();
        assert_eq!((s, a), (InUse, NodeAction::None));
        let (s, a) = s.apply(ReturnedNoReset).unwrap();
        assert_eq!((s, a), (Idle, NodeAction::IdleWait));
    }

    #[test]
    fn failed_connect_sleeps_then_retries() {
        let (s, a) = ConnectInProgress.apply(ConnectErr).unwrap();
        assert_eq!((s, a), (SleepConnectFailed, NodeAction::Sleep));
        let (s, a) = s.apply(Resume).unwrap();
        assert_eq!((s, a), (ConnectInProgress, NodeAction::Connect));
    }

    #[test]
    fn returned_needs_reset_pipelines_through_reset() {
        let (s, a) = InUse.apply(ReturnedNeedsReset).unwrap();
        assert_eq!((s, a), (ResetInProgress, NodeAction::Reset));
        let (s, _) = s.apply(ResetOk).unwrap();
        assert_eq!(s, Idle);
    }

    #[test]
    fn ping_failure_triggers_reconnect() {
        let (s, a) = PingInProgress.apply(PingErr).unwrap();
        assert_eq!((s, a), (ConnectInProgress, NodeAction::Connect));
    }

    #[test]
    fn cancel_terminates_from_any_state() {
        for state in [Initial, Idle, InUse, PingInProgress, ResetInProgress, SleepConnectFailed] {
            let (s, a) = state.apply(Cancel).unwrap();
            assert_eq!((s, a), (Terminated, NodeAction::None));
        }
    }

    #[test]
    fn illegal_transition_is_an_error() {
        assert!(Terminated.apply(Checkout).is_err());
    }
}
