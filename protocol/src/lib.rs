//! Pure, sans-I/O building blocks for the MySQL/MariaDB wire protocol:
//! length-encoded codec primitives, frame reassembly, capability and status
//! bitsets, column metadata, and decoded value types. Nothing in this crate
//! touches a socket; the `connection` crate drives these algorithms with
//! actual I/O.

pub mod capability;
pub mod codec;
pub mod column;
pub mod flavor;
pub mod frame;
pub mod handshake;
pub mod row;
pub mod status;
pub mod value;

pub use capability::CapabilityFlags;
pub use column::{ColumnType, Metadata as ColumnMetadata, MetaMode, WireColumnType};
pub use flavor::ServerFlavor;
pub use frame::{ReadBuffer, SequenceNumber};
pub use handshake::InitialHandshake;
pub use row::{decode_binary_row, decode_text_row};
pub use status::StatusFlags;
pub use value::{Date, DateTime, Field, Time};
