//! L3: the mutable connection state every sans-I/O algorithm reads and
//! updates. Grounded on `conn::connection::Session` (capability/status
//! flags, connection id, character set, server version), generalized with
//! the read buffer and sequence counter that used to live inside
//! `PacketChannel`, and with the flavor/meta-mode fields a general client
//! needs that a binlog-only reader never tracked.

use protocol::column::MetaMode;
use protocol::flavor::ServerFlavor;
use protocol::frame::{ReadBuffer, SequenceNumber};
use protocol::status::StatusFlags;
use protocol::CapabilityFlags;

#[derive(Debug)]
pub struct ConnState {
    pub capabilities: CapabilityFlags,
    pub status: StatusFlags,
    pub flavor: ServerFlavor,
    pub connection_id: u32,
    pub server_version: String,
    pub charset: u8,
    pub meta_mode: MetaMode,

    pub read_buffer: ReadBuffer,
    pub sequence: SequenceNumber,
}

impl Default for ConnState {
    fn default() -> Self {
        ConnState {
            capabilities: CapabilityFlags::empty(),
            status: StatusFlags::empty(),
            flavor: ServerFlavor::MySql,
            connection_id: 0,
            server_version: String::new(),
            charset: 0,
            meta_mode: MetaMode::Full,
            read_buffer: ReadBuffer::new(),
            sequence: SequenceNumber(0),
        }
    }
}

impl ConnState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backslash_escapes(&self) -> bool {
        self.status.backslash_escapes()
    }

    pub fn more_results(&self) -> bool {
        self.status.more_results()
    }

    pub fn has_capability(&self, mask: u32) -> bool {
        self.capabilities.has(mask)
    }
}
