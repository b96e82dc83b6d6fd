//! Shared pool state and the checkout algorithm.
//!
//! Grounded on the per-node state machine in [`crate::node`] plus the
//! `pool owns nodes; a pooled connection holds a shared handle to the pool
//! and an index into it, never a two-way owning link` guidance: `Pool` is the
//! only owner of `Node<C>`, and [`crate::handle::PooledConnection`] carries
//! an `Arc<Pool<C>>` plus a node index back to it.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{instrument, warn};

use common::err::decode_error::ReError;
use common::err::CResult;

use crate::config::PoolConfig;
use crate::handle::PooledConnection;
use crate::node::{NodeEvent, NodeState};

/// Performs the actual connect/ping/reset work for a node. Kept separate
/// from the state machine so the pool can be exercised with a mock in
/// tests without a real socket — the real implementation plugs in the
/// sans-I/O algorithms in `connection::algorithm` run by an engine runner.
pub trait Connector: Send + Sync {
    type Connection: Send;

    fn connect(&self) -> CResult<Self::Connection>;
    fn ping(&self, conn: &mut Self::Connection) -> CResult<()>;
    fn reset(&self, conn: &mut Self::Connection) -> CResult<()>;
}

struct Node<C: Connector> {
    state: NodeState,
    conn: Option<C::Connection>,
}

impl<C: Connector> Node<C> {
    fn new() -> Self {
        Node { state: NodeState::Initial, conn: None }
    }
}

struct PoolState<C: Connector> {
    nodes: Vec<Node<C>>,
    idle: VecDeque<usize>,
    num_pending_connections: usize,
    cancelled: bool,
    last_diagnostics: Option<ReError>,
}

impl<C: Connector> PoolState<C> {
    fn new() -> Self {
        PoolState {
            nodes: Vec::new(),
            idle: VecDeque::new(),
            num_pending_connections: 0,
            cancelled: false,
            last_diagnostics: None,
        }
    }
}

pub struct Pool<C: Connector> {
    config: PoolConfig,
    connector: C,
    shared: Mutex<PoolState<C>>,
    idle_cv: Condvar,
    /// Lets `get_connection` hand callers an `Arc<Pool<C>>` back without
    /// requiring an unstable `self: &Arc<Self>` receiver — `PooledConnection`
    /// needs to own a strong reference so the pool outlives any checked-out
    /// connection.
    self_ref: Weak<Pool<C>>,
}

impl<C: Connector + 'static> Pool<C> {
    /// Builds the pool and, when `config.thread_safety` is set and
    /// `ping_interval` is non-zero, starts a background thread that drives
    /// [`Self::tick_idle_pings`] on a fixed interval — the "strand" the
    /// pool's idle-timer pings run on. With `thread_safety` unset, the pool
    /// assumes the single-threaded cooperative model of §5: no background
    /// thread touches pool state, and the owner is expected to call
    /// `tick_idle_pings` from its own event loop if it wants idle pings at
    /// all.
    pub fn new(config: PoolConfig, connector: C) -> Arc<Self> {
        let initial_size = config.initial_size;
        let thread_safety = config.thread_safety;
        let ping_interval = config.ping_interval;
        let pool = Arc::new_cyclic(|weak| Pool {
            config,
            connector,
            shared: Mutex::new(PoolState::new()),
            idle_cv: Condvar::new(),
            self_ref: weak.clone(),
        });
        pool.prewarm(initial_size);
        if thread_safety && ping_interval > Duration::ZERO {
            pool.spawn_idle_ticker(ping_interval);
        }
        pool
    }

    /// Spawns the background strand that periodically pings idle nodes.
    /// Holds only a [`Weak`] reference so the pool can be dropped without
    /// waiting for this thread to notice; the thread exits on its own once
    /// the pool is gone or cancelled.
    fn spawn_idle_ticker(self: &Arc<Self>, ping_interval: Duration) {
        let weak = self.self_ref.clone();
        thread::spawn(move || loop {
            thread::sleep(ping_interval);
            let Some(pool) = weak.upgrade() else { return };
            if pool.shared.lock().unwrap().cancelled {
                return;
            }
            pool.tick_idle_pings();
        });
    }

    /// Pings every node currently idle, per the `Idle --idle-timer elapsed-->
    /// PingInProgress` transition. One tick treats all idle nodes as having
    /// elapsed their timer at once rather than tracking a per-node
    /// deadline — the tick interval itself is the granularity of the idle
    /// timer.
    pub fn tick_idle_pings(&self) {
        let idle_ids: Vec<usize> = {
            let mut guard = self.shared.lock().unwrap();
            if guard.cancelled {
                return;
            }
            std::mem::take(&mut guard.idle).into_iter().collect()
        };
        for id in idle_ids {
            self.ping_idle_node(id);
        }
    }

    fn ping_idle_node(&self, id: usize) {
        let mut guard = self.shared.lock().unwrap();
        if guard.cancelled {
            return;
        }
        let Ok((state, action)) = guard.nodes[id].state.apply(NodeEvent::IdleTimerElapsed) else {
            guard.idle.push_back(id);
            return;
        };
        guard.nodes[id].state = state;
        if action != crate::node::NodeAction::Ping {
            guard.idle.push_back(id);
            return;
        }
        let mut conn = guard.nodes[id].conn.take().expect("idle node must hold a connection");
        drop(guard);

        let result = self.connector.ping(&mut conn);
        let mut guard = self.shared.lock().unwrap();
        match result {
            Ok(()) => {
                let (state, _) = guard.nodes[id].state.apply(NodeEvent::PingOk).unwrap();
                guard.nodes[id].state = state;
                guard.nodes[id].conn = Some(conn);
                guard.idle.push_back(id);
                drop(guard);
                self.idle_cv.notify_one();
            }
            Err(e) => {
                let (state, _) = guard.nodes[id].state.apply(NodeEvent::PingErr).unwrap();
                guard.nodes[id].state = state;
                warn!(node = id, error = %e, "pool node failed idle-timer ping");
                guard.last_diagnostics = Some(e);
            }
        }
    }

    /// Eagerly connects `initial_size` nodes. Failures just leave the node
    /// `SleepConnectFailed`, picked up the same way a failed on-demand
    /// connect would be on the next checkout.
    fn prewarm(&self, initial_size: u32) {
        let mut guard = self.shared.lock().unwrap();
        for _ in 0..initial_size {
            let id = guard.nodes.len();
            guard.nodes.push(Node::new());
            let (state, _) = guard.nodes[id].state.apply(NodeEvent::Resume).unwrap();
            debug_assert_eq!(state, NodeState::ConnectInProgress);
            match self.connector.connect() {
                Ok(conn) => {
                    let (state, _) = guard.nodes[id].state.apply(NodeEvent::ConnectOk).unwrap();
                    guard.nodes[id].state = state;
                    guard.nodes[id].conn = Some(conn);
                    guard.idle.push_back(id);
                }
                Err(e) => {
                    let (state, _) = guard.nodes[id].state.apply(NodeEvent::ConnectErr).unwrap();
                    guard.nodes[id].state = state;
                    guard.last_diagnostics = Some(e);
                }
            }
        }
    }

    /// Runs the four-step checkout algorithm: fail fast if cancelled, reuse
    /// an idle node, else open a new one under `max_size`, else wait for one
    /// to free up (retrying on spurious wakeups) until `timeout` elapses.
    #[instrument(skip(self))]
    pub fn get_connection(&self, timeout: Duration) -> CResult<PooledConnection<C>> {
        let deadline = Instant::now() + timeout;
        let mut guard = self.shared.lock().unwrap();
        loop {
            if guard.cancelled {
                return Err(ReError::Aborted);
            }

            if let Some(id) = guard.idle.pop_front() {
                let (_, action) = guard.nodes[id].state.apply(NodeEvent::Checkout)?;
                debug_assert_eq!(action, crate::node::NodeAction::None);
                guard.nodes[id].state = NodeState::InUse;
                let conn = guard.nodes[id].conn.take().expect("idle node must hold a connection");
                let pool = self.self_ref.upgrade().expect("pool outlives its own checked-out connections");
                return Ok(PooledConnection::new(pool, id, conn));
            }

            if guard.nodes.len() < self.config.max_size as usize && guard.num_pending_connections == 0 {
                let id = guard.nodes.len();
                guard.nodes.push(Node::new());
                guard.num_pending_connections += 1;
                drop(guard);

                let result = self.connector.connect();
                guard = self.shared.lock().unwrap();
                guard.num_pending_connections -= 1;
                match result {
                    Ok(conn) => {
                        let (state, _) = guard.nodes[id].state.apply(NodeEvent::Resume)?;
                        debug_assert_eq!(state, NodeState::ConnectInProgress);
                        let (state, _) = guard.nodes[id].state.apply(NodeEvent::ConnectOk)?;
                        guard.nodes[id].state = state;
                        guard.nodes[id].conn = Some(conn);
                        continue;
                    }
                    Err(e) => {
                        let (state, _) = guard.nodes[id].state.apply(NodeEvent::Resume)?;
                        debug_assert_eq!(state, NodeState::ConnectInProgress);
                        let (state, _) = guard.nodes[id].state.apply(NodeEvent::ConnectErr)?;
                        guard.nodes[id].state = state;
                        warn!(node = id, error = %e, "pool node failed to connect");
                        guard.last_diagnostics = Some(e);
                        self.idle_cv.notify_all();
                        continue;
                    }
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(guard
                    .last_diagnostics
                    .take()
                    .unwrap_or_else(|| ReError::Precondition("timed out waiting for a pool connection".to_string())));
            }
            let (g, _) = self.idle_cv.wait_timeout(guard, deadline - now).unwrap();
            guard = g;
        }
    }

    /// Returns a checked-out connection to the pool. Reset happens inline
    /// on the caller's thread, mirroring a node's `ResetInProgress` step,
    /// before the node becomes idle again.
    pub(crate) fn return_connection(&self, id: usize, mut conn: C::Connection, needs_reset: bool) {
        let mut guard = self.shared.lock().unwrap();
        if guard.cancelled {
            return;
        }
        let event = if needs_reset { NodeEvent::ReturnedNeedsReset } else { NodeEvent::ReturnedNoReset };
        let Ok((state, action)) = guard.nodes[id].state.apply(event) else {
            return;
        };
        guard.nodes[id].state = state;

        if action == crate::node::NodeAction::Reset {
            drop(guard);
            let reset_result = self.connector.reset(&mut conn);
            guard = self.shared.lock().unwrap();
            let event = if reset_result.is_ok() { NodeEvent::ResetOk } else { NodeEvent::ResetErr };
            if let Ok((state, _)) = guard.nodes[id].state.apply(event) {
                guard.nodes[id].state = state;
            }
        }

        guard.nodes[id].conn = Some(conn);
        guard.idle.push_back(id);
        drop(guard);
        self.idle_cv.notify_one();
    }

    /// Marks the pool cancelled: every waiter wakes with `Aborted`, every
    /// node transitions to `Terminated` and drops its connection.
    pub fn cancel(&self) {
        tracing::info!("cancelling connection pool");
        let mut guard = self.shared.lock().unwrap();
        guard.cancelled = true;
        for node in guard.nodes.iter_mut() {
            let (state, _) = node.state.apply(NodeEvent::Cancel).expect("Cancel is valid from any state");
            node.state = state;
            node.conn = None;
        }
        guard.idle.clear();
        drop(guard);
        self.idle_cv.notify_all();
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingConnector {
        connects: AtomicU32,
        fail_first_n: u32,
    }

    impl Connector for CountingConnector {
        type Connection = u32;

        fn connect(&self) -> CResult<u32> {
            let n = self.connects.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first_n {
                Err(ReError::Precondition("simulated connect failure".to_string()))
            } else {
                Ok(n)
            }
        }

        fn ping(&self, _conn: &mut u32) -> CResult<()> {
            Ok(())
        }

        fn reset(&self, conn: &mut u32) -> CResult<()> {
            *conn += 1000;
            Ok(())
        }
    }

    fn pool(max_size: u32) -> Arc<Pool<CountingConnector>> {
        let cfg = PoolConfig::new(max_size);
        Pool::new(cfg, CountingConnector { connects: AtomicU32::new(0), fail_first_n: 0 })
    }

    #[test]
    fn checkout_creates_a_node_up_to_max_size() {
        let p = pool(1);
        let conn = p.get_connection(Duration::from_millis(100)).unwrap();
        drop(conn);
        assert_eq!(p.shared.lock().unwrap().nodes.len(), 1);
    }

    #[test]
    fn returned_connection_is_reused() {
        let p = pool(1);
        let first = p.get_connection(Duration::from_millis(100)).unwrap();
        drop(first);
        let second = p.get_connection(Duration::from_millis(100)).unwrap();
        drop(second);
        assert_eq!(p.shared.lock().unwrap().nodes.len(), 1);
    }

    #[test]
    fn checkout_beyond_max_size_times_out() {
        let p = pool(1);
        let _held = p.get_connection(Duration::from_millis(50)).unwrap();
        let err = p.get_connection(Duration::from_millis(20));
        assert!(err.is_err());
    }

    #[test]
    fn cancelled_pool_fails_fast() {
        let p = pool(1);
        p.cancel();
        assert!(matches!(p.get_connection(Duration::from_millis(10)), Err(ReError::Aborted)));
    }

    #[test]
    fn failed_connect_surfaces_diagnostics_on_timeout() {
        let cfg = PoolConfig::new(1);
        let p = Pool::new(cfg, CountingConnector { connects: AtomicU32::new(0), fail_first_n: 1000 });
        let err = p.get_connection(Duration::from_millis(30));
        assert!(err.is_err());
    }

    struct FlakyPingConnector {
        connects: AtomicU32,
        ping_fails: AtomicU32,
    }

    impl Connector for FlakyPingConnector {
        type Connection = u32;

        fn connect(&self) -> CResult<u32> {
            Ok(self.connects.fetch_add(1, Ordering::SeqCst))
        }

        fn ping(&self, _conn: &mut u32) -> CResult<()> {
            if self.ping_fails.fetch_sub(1, Ordering::SeqCst) > 0 {
                Err(ReError::Precondition("simulated ping failure".to_string()))
            } else {
                Ok(())
            }
        }

        fn reset(&self, _conn: &mut u32) -> CResult<()> {
            Ok(())
        }
    }

    #[test]
    fn tick_idle_pings_keeps_a_healthy_node_idle() {
        let cfg = PoolConfig::new(1).with_initial_size(1);
        let p = Pool::new(cfg, FlakyPingConnector { connects: AtomicU32::new(0), ping_fails: AtomicU32::new(0) });
        assert_eq!(p.shared.lock().unwrap().idle.len(), 1);
        p.tick_idle_pings();
        let guard = p.shared.lock().unwrap();
        assert_eq!(guard.idle.len(), 1);
        assert_eq!(guard.nodes[0].state, NodeState::Idle);
    }

    #[test]
    fn tick_idle_pings_reconnects_after_a_failed_ping() {
        let cfg = PoolConfig::new(1).with_initial_size(1);
        let p = Pool::new(cfg, FlakyPingConnector { connects: AtomicU32::new(0), ping_fails: AtomicU32::new(1) });
        p.tick_idle_pings();
        let guard = p.shared.lock().unwrap();
        assert_eq!(guard.nodes[0].state, NodeState::ConnectInProgress);
        assert!(guard.idle.is_empty());
    }

    #[test]
    fn thread_safety_disabled_spawns_no_idle_ticker() {
        let mut cfg = PoolConfig::new(1).with_initial_size(1);
        cfg.thread_safety = false;
        cfg.ping_interval = Duration::from_millis(5);
        let p = Pool::new(cfg, FlakyPingConnector { connects: AtomicU32::new(0), ping_fails: AtomicU32::new(0) });
        // No background ticker: an idle node stays idle without anyone
        // calling `tick_idle_pings` on its behalf.
        std::thread::sleep(Duration::from_millis(30));
        let guard = p.shared.lock().unwrap();
        assert_eq!(guard.nodes[0].state, NodeState::Idle);
    }
}
