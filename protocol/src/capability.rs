//! Capability bitset. Design guidance: store as a single machine
//! integer and provide `has`/`has_all`; do not expose as a struct with named
//! booleans"). Grounded on `connection::declar::capability_flags`, kept as a
//! flat module of `u32` constants, with the
//! handshake's mandatory/optional split layered on top.

/// ### Server / Client
/// Use the improved version of Old Password Authentication.
pub const CLIENT_LONG_PASSWORD: u32 = 0x0000_0001;
pub const CLIENT_FOUND_ROWS: u32 = 0x0000_0002;
pub const CLIENT_LONG_FLAG: u32 = 0x0000_0004;
pub const CLIENT_CONNECT_WITH_DB: u32 = 0x0000_0008;
pub const CLIENT_NO_SCHEMA: u32 = 0x0000_0010;
pub const CLIENT_COMPRESS: u32 = 0x0000_0020;
pub const CLIENT_ODBC: u32 = 0x0000_0040;
pub const CLIENT_LOCAL_FILES: u32 = 0x0000_0080;
pub const CLIENT_IGNORE_SPACE: u32 = 0x0000_0100;
pub const CLIENT_PROTOCOL_41: u32 = 0x0000_0200;
pub const CLIENT_INTERACTIVE: u32 = 0x0000_0400;
pub const CLIENT_SSL: u32 = 0x0000_0800;
pub const CLIENT_IGNORE_SIGPIPE: u32 = 0x0000_1000;
pub const CLIENT_TRANSACTIONS: u32 = 0x0000_2000;
pub const CLIENT_RESERVED: u32 = 0x0000_4000;
pub const CLIENT_SECURE_CONNECTION: u32 = 0x0000_8000;
pub const CLIENT_MULTI_STATEMENTS: u32 = 0x0001_0000;
pub const CLIENT_MULTI_RESULTS: u32 = 0x0002_0000;
pub const CLIENT_PS_MULTI_RESULTS: u32 = 0x0004_0000;
pub const CLIENT_PLUGIN_AUTH: u32 = 0x0008_0000;
pub const CLIENT_CONNECT_ATTRS: u32 = 0x0010_0000;
pub const CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA: u32 = 0x0020_0000;
pub const CLIENT_CAN_HANDLE_EXPIRED_PASSWORDS: u32 = 0x0040_0000;
pub const CLIENT_SESSION_TRACK: u32 = 0x0080_0000;
pub const CLIENT_DEPRECATE_EOF: u32 = 0x0100_0000;
pub const CLIENT_OPTIONAL_RESULTSET_METADATA: u32 = 0x0200_0000;
pub const CLIENT_QUERY_ATTRIBUTES: u32 = 0x0800_0000;
pub const CLIENT_SSL_VERIFY_SERVER_CERT: u32 = 0x4000_0000;

/// The capabilities the core always requests and the server must have,
/// Handshake fails if the server lacks any mandatory
/// capability after accounting for the user's options."
pub const MANDATORY: u32 = CLIENT_LONG_PASSWORD
    | CLIENT_PROTOCOL_41
    | CLIENT_SECURE_CONNECTION
    | CLIENT_PLUGIN_AUTH
    | CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA
    | CLIENT_DEPRECATE_EOF
    | CLIENT_MULTI_RESULTS
    | CLIENT_SESSION_TRACK;

/// Capabilities requested only when the matching connect option is set
/// (connect-with-db, TLS, multi-statements, query attributes).
pub const OPTIONAL: u32 =
    CLIENT_CONNECT_WITH_DB | CLIENT_SSL | CLIENT_MULTI_STATEMENTS | CLIENT_QUERY_ATTRIBUTES;

/// A negotiated capability bitset. Deliberately a thin wrapper over a single
/// integer rather than a struct of named booleans: the capability set is
/// open-ended and server-defined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapabilityFlags(u32);

impl CapabilityFlags {
    pub fn new(bits: u32) -> Self {
        CapabilityFlags(bits)
    }

    pub fn empty() -> Self {
        CapabilityFlags(0)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn has(self, mask: u32) -> bool {
        (self.0 & mask) != 0
    }

    pub fn has_all(self, mask: u32) -> bool {
        (self.0 & mask) == mask
    }

    pub fn with(self, mask: u32) -> Self {
        CapabilityFlags(self.0 | mask)
    }

    pub fn without(self, mask: u32) -> Self {
        CapabilityFlags(self.0 & !mask)
    }

    pub fn intersect(self, other: CapabilityFlags) -> Self {
        CapabilityFlags(self.0 & other.0)
    }
}

/// Computes the capability flags the client requests, given which optional
/// features the caller's connect options enabled.
pub fn client_capabilities(want_db: bool, want_ssl: bool, want_multi_statements: bool) -> CapabilityFlags {
    let mut caps = CapabilityFlags::new(MANDATORY);
    if want_db {
        caps = caps.with(CLIENT_CONNECT_WITH_DB);
    }
    if want_ssl {
        caps = caps.with(CLIENT_SSL);
    }
    if want_multi_statements {
        caps = caps.with(CLIENT_MULTI_STATEMENTS | CLIENT_PS_MULTI_RESULTS);
    }
    caps
}

/// Checks that the server advertises every mandatory capability the client
/// needs after negotiation.
pub fn missing_mandatory(server: CapabilityFlags, requested: CapabilityFlags) -> Option<u32> {
    let needed = requested.bits() & MANDATORY;
    let missing = needed & !server.bits();
    if missing == 0 {
        None
    } else {
        Some(missing)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn has_and_has_all() {
        let caps = CapabilityFlags::new(CLIENT_PROTOCOL_41 | CLIENT_SSL);
        assert!(caps.has(CLIENT_SSL));
        assert!(!caps.has(CLIENT_COMPRESS));
        assert!(caps.has_all(CLIENT_PROTOCOL_41 | CLIENT_SSL));
        assert!(!caps.has_all(CLIENT_PROTOCOL_41 | CLIENT_COMPRESS));
    }

    #[test]
    fn missing_mandatory_detects_gap() {
        let requested = client_capabilities(false, false, false);
        let server = CapabilityFlags::new(MANDATORY & !CLIENT_PLUGIN_AUTH);
        assert_eq!(missing_mandatory(server, requested), Some(CLIENT_PLUGIN_AUTH));

        let server_ok = CapabilityFlags::new(MANDATORY);
        assert_eq!(missing_mandatory(server_ok, requested), None);
    }
}
