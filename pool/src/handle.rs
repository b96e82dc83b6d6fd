//! RAII handle returned by [`crate::state::Pool::get_connection`]. Dropping
//! it returns the connection to the pool without the releasing thread ever
//! entering the pool's lock beyond the single call in `Drop::drop` — there
//! is no separate "collectable" flag to set lock-free here since the pool
//! itself only ever touches its `Mutex` briefly, but the shape (shared pool
//! reference + node index, no owning link back) follows the pool's node
//! ownership rule directly.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::state::{Connector, Pool};

pub struct PooledConnection<C: Connector + 'static> {
    pool: Arc<Pool<C>>,
    node_id: usize,
    conn: Option<C::Connection>,
    needs_reset: bool,
}

impl<C: Connector> PooledConnection<C> {
    pub(crate) fn new(pool: Arc<Pool<C>>, node_id: usize, conn: C::Connection) -> Self {
        PooledConnection { pool, node_id, conn: Some(conn), needs_reset: false }
    }

    /// Marks the connection as needing a `SET` + `COM_RESET` pipeline before
    /// it rejoins the idle set, e.g. after a user-initiated transaction was
    /// left open.
    pub fn mark_needs_reset(&mut self) {
        self.needs_reset = true;
    }
}

impl<C: Connector> Deref for PooledConnection<C> {
    type Target = C::Connection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("connection taken only on drop")
    }
}

impl<C: Connector> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("connection taken only on drop")
    }
}

impl<C: Connector + 'static> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.return_connection(self.node_id, conn, self.needs_reset);
        }
    }
}
