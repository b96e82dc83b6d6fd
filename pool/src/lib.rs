//! A bounded pool of MySQL connections: per-node lifecycle state machine,
//! shared pool state with a checkout algorithm, and an RAII handle that
//! returns connections to the pool on drop.

pub mod blocking_connector;
pub mod config;
pub mod handle;
pub mod node;
pub mod state;

pub use blocking_connector::BlockingConnector;
pub use config::PoolConfig;
pub use handle::PooledConnection;
pub use node::{NodeAction, NodeEvent, NodeState};
pub use state::{Connector, Pool};
