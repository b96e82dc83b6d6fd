//! The real [`Connector`] used in production: opens a blocking connection
//! via `connection::engine::SyncRunner` and drives `Ping`/`ResetConnection`
//! over it. Pool tests use a mock connector instead; this is the only piece
//! that actually touches a socket.

use connection::algorithm::ping::Ping;
use connection::algorithm::reset::ResetConnection;
use connection::config::ConnectConfig;
use connection::engine::SyncRunner;

use common::err::CResult;

use crate::state::Connector;

pub struct BlockingConnector {
    config: ConnectConfig,
}

impl BlockingConnector {
    pub fn new(config: ConnectConfig) -> Self {
        BlockingConnector { config }
    }
}

impl Connector for BlockingConnector {
    type Connection = SyncRunner;

    fn connect(&self) -> CResult<SyncRunner> {
        SyncRunner::connect(self.config.clone())
    }

    fn ping(&self, conn: &mut SyncRunner) -> CResult<()> {
        conn.drive(&mut Ping::new())
    }

    fn reset(&self, conn: &mut SyncRunner) -> CResult<()> {
        conn.drive(&mut ResetConnection::new())
    }
}
