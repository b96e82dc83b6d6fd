//! The initial handshake packet and the client's `HandshakeResponse41`.
//! Grounded on the field list `connection::conn::connection::Connection::
//! do_handshake` reads off its (missing-from-the-pack) `HandshakePacket` —
//! protocol_version, server_version, connection_id, scramble, capabilities,
//! collation, status_flags, auth_plugin_name — reconstructed here as an
//! actual parser/serializer pair instead of an opaque struct.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use common::err::decode_error::ReError;
use common::err::CResult;

use crate::codec::{read_null_term_string, write_null_term_string};

pub const PROTOCOL_VERSION: u8 = 10;

#[derive(Debug, Clone)]
pub struct InitialHandshake {
    pub protocol_version: u8,
    pub server_version: String,
    pub connection_id: u32,
    /// The two scramble fragments, concatenated (first 8 + remaining bytes,
    /// trailing NUL dropped).
    pub scramble: Vec<u8>,
    pub capabilities: u32,
    pub collation: u8,
    pub status_flags: u16,
    pub auth_plugin_name: String,
}

impl InitialHandshake {
    pub fn parse(packet: &[u8]) -> CResult<Self> {
        let mut cursor = Cursor::new(packet);
        let protocol_version = cursor
            .read_u8()
            .map_err(|_| ReError::Framing("truncated initial handshake packet".to_string()))?;
        if protocol_version != PROTOCOL_VERSION {
            return Err(ReError::ProtocolValue(format!(
                "unsupported handshake protocol version {protocol_version}"
            )));
        }

        let server_version = read_null_term_string(&mut cursor)?;
        let connection_id = cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| ReError::Framing("truncated handshake: connection id".to_string()))?;

        let mut scramble = vec![0u8; 8];
        std::io::Read::read_exact(&mut cursor, &mut scramble)
            .map_err(|_| ReError::Framing("truncated handshake: scramble part 1".to_string()))?;

        let _filler = cursor.read_u8();
        let caps_low = cursor
            .read_u16::<LittleEndian>()
            .map_err(|_| ReError::Framing("truncated handshake: capabilities (low)".to_string()))?;
        let collation = cursor
            .read_u8()
            .map_err(|_| ReError::Framing("truncated handshake: collation".to_string()))?;
        let status_flags = cursor
            .read_u16::<LittleEndian>()
            .map_err(|_| ReError::Framing("truncated handshake: status flags".to_string()))?;
        let caps_high = cursor
            .read_u16::<LittleEndian>()
            .map_err(|_| ReError::Framing("truncated handshake: capabilities (high)".to_string()))?;
        let capabilities = (caps_low as u32) | ((caps_high as u32) << 16);

        let auth_data_len = cursor
            .read_u8()
            .map_err(|_| ReError::Framing("truncated handshake: auth data length".to_string()))?;

        let mut reserved = [0u8; 10];
        std::io::Read::read_exact(&mut cursor, &mut reserved)
            .map_err(|_| ReError::Framing("truncated handshake: reserved bytes".to_string()))?;

        if capabilities & crate::capability::CLIENT_SECURE_CONNECTION != 0 {
            let part2_len = std::cmp::max(13, auth_data_len.saturating_sub(8) as usize);
            let mut part2 = vec![0u8; part2_len];
            std::io::Read::read_exact(&mut cursor, &mut part2)
                .map_err(|_| ReError::Framing("truncated handshake: scramble part 2".to_string()))?;
            // drop the trailing NUL the wire format always includes here.
            if part2.last() == Some(&0) {
                part2.pop();
            }
            scramble.extend(part2);
        }

        let auth_plugin_name = if capabilities & crate::capability::CLIENT_PLUGIN_AUTH != 0 {
            read_null_term_string(&mut cursor)?
        } else {
            String::new()
        };

        Ok(InitialHandshake {
            protocol_version,
            server_version,
            connection_id,
            scramble,
            capabilities,
            collation,
            status_flags,
            auth_plugin_name,
        })
    }
}

/// Builds a `HandshakeResponse41` packet body.
#[allow(clippy::too_many_arguments)]
pub fn build_handshake_response41(
    client_capabilities: u32,
    collation: u8,
    username: &str,
    auth_response: &[u8],
    database: Option<&str>,
    auth_plugin_name: &str,
) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.write_u32::<LittleEndian>(client_capabilities).unwrap();
    buf.write_u32::<LittleEndian>(0x0100_0000).unwrap(); // max_packet_size, 16MiB-1 rounded
    buf.write_u8(collation).unwrap();
    buf.extend_from_slice(&[0u8; 23]);
    write_null_term_string(&mut buf, username);

    if client_capabilities & crate::capability::CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA != 0 {
        crate::codec::write_len_enc_bytes(&mut buf, auth_response);
    } else if client_capabilities & crate::capability::CLIENT_SECURE_CONNECTION != 0 {
        buf.write_u8(auth_response.len() as u8).unwrap();
        buf.extend_from_slice(auth_response);
    } else {
        buf.extend_from_slice(auth_response);
        buf.push(0);
    }

    if let Some(db) = database {
        if client_capabilities & crate::capability::CLIENT_CONNECT_WITH_DB != 0 {
            write_null_term_string(&mut buf, db);
        }
    }

    if client_capabilities & crate::capability::CLIENT_PLUGIN_AUTH != 0 {
        write_null_term_string(&mut buf, auth_plugin_name);
    }

    buf
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::capability::{
        CLIENT_PLUGIN_AUTH, CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA, CLIENT_PROTOCOL_41,
        CLIENT_SECURE_CONNECTION,
    };

    fn sample_packet(caps: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push(PROTOCOL_VERSION);
        write_null_term_string(&mut buf, "8.0.34");
        buf.write_u32::<LittleEndian>(42).unwrap();
        buf.extend_from_slice(b"ABCDEFGH"); // scramble part 1
        buf.push(0); // filler
        buf.write_u16::<LittleEndian>((caps & 0xFFFF) as u16).unwrap();
        buf.push(45); // collation
        buf.write_u16::<LittleEndian>(2).unwrap(); // status
        buf.write_u16::<LittleEndian>((caps >> 16) as u16).unwrap();
        buf.push(21); // auth data len (8 + 12 + 1 nul)
        buf.extend_from_slice(&[0u8; 10]);
        if caps & CLIENT_SECURE_CONNECTION != 0 {
            buf.extend_from_slice(b"IJKLMNOPQRST"); // 12 bytes
            buf.push(0); // trailing NUL
        }
        if caps & CLIENT_PLUGIN_AUTH != 0 {
            write_null_term_string(&mut buf, "mysql_native_password");
        }
        buf
    }

    #[test]
    fn parses_full_scramble_and_plugin_name() {
        let caps = CLIENT_PROTOCOL_41 | CLIENT_SECURE_CONNECTION | CLIENT_PLUGIN_AUTH;
        let packet = sample_packet(caps);
        let hs = InitialHandshake::parse(&packet).unwrap();
        assert_eq!(hs.server_version, "8.0.34");
        assert_eq!(hs.connection_id, 42);
        assert_eq!(hs.scramble, b"ABCDEFGHIJKLMNOPQRST");
        assert_eq!(hs.auth_plugin_name, "mysql_native_password");
        assert_eq!(hs.collation, 45);
    }

    #[test]
    fn rejects_unsupported_protocol_version() {
        let mut packet = sample_packet(CLIENT_PROTOCOL_41);
        packet[0] = 9;
        assert!(InitialHandshake::parse(&packet).is_err());
    }

    #[test]
    fn response_uses_lenenc_auth_response_when_negotiated() {
        let caps = CLIENT_PROTOCOL_41 | CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA | CLIENT_PLUGIN_AUTH;
        let resp = build_handshake_response41(caps, 45, "root", b"0123456789ab", None, "mysql_native_password");
        // username (null-terminated) precedes the lenenc length byte for a
        // response this short (< 251 bytes, one-byte lenenc prefix).
        let username_end = resp.windows(1).position(|w| w == [0]).unwrap();
        assert_eq!(&resp[32..username_end], b"root");
        assert_eq!(resp[username_end + 1], 12); // lenenc prefix == length
    }
}
