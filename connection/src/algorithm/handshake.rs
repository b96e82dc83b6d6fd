//! The connection handshake: initial handshake packet, capability
//! negotiation, optional TLS upgrade, and authentication (including
//! `caching_sha2_password` full auth over an RSA-encrypted channel).
//!
//! Grounded on `conn::connection::Connection::do_handshake`,
//! `handle_auth_plugin_switch`, and `authenticate_sha_256` — the control flow
//! is the same three-way branch (OK / plugin switch / caching_sha2 full
//! auth), pulled out of a blocking call stack into explicit states a runner
//! drives one `NextAction` at a time.

use std::io::Cursor;

use common::err::decode_error::ReError;
use common::err::CResult;
use openssl::rsa::{Padding, Rsa};
use protocol::capability::{self, CapabilityFlags};
use protocol::handshake::{build_handshake_response41, InitialHandshake};

use crate::auth::{self, AuthPlugin};
use crate::config::{ConnectConfig, SslMode};
use crate::next_action::NextAction;
use crate::state::ConnState;

const OK_PACKET: u8 = 0x00;
const ERR_PACKET: u8 = 0xFF;
const AUTH_SWITCH_PACKET: u8 = 0xFE;

#[derive(Debug)]
enum Step {
    AwaitInitialHandshake,
    /// `SSLRequest` has been written; the next `resume` must trigger the TLS
    /// handshake before any more bytes cross the wire.
    AwaitTlsUpgrade { scramble: String, plugin: AuthPlugin },
    /// The TLS handshake completed; send the (now encrypted)
    /// `HandshakeResponse41`.
    AwaitSslHandshakeDone { scramble: String, plugin: AuthPlugin },
    AwaitHandshakeResult { scramble: String, plugin: AuthPlugin },
    AwaitAuthSwitchResult,
    AwaitCachingSha2PublicKey { scramble: String },
    Done,
}

/// Resumable state machine driving one connection's handshake to completion.
pub struct Handshake {
    config: ConnectConfig,
    client_capabilities: u32,
    step: Step,
}

impl Handshake {
    pub fn new(config: ConnectConfig) -> Self {
        let client_capabilities = capability::client_capabilities(
            config.database.is_some(),
            config.ssl_mode != SslMode::Disabled,
            config.multi_statements,
        )
        .bits();
        Handshake {
            config,
            client_capabilities,
            step: Step::AwaitInitialHandshake,
        }
    }

    /// The first action the caller must perform: open the TCP connection.
    pub fn start(&self) -> NextAction {
        NextAction::Connect {
            host: self.config.host.clone(),
            port: self.config.port,
        }
    }

    pub fn resume(&mut self, conn: &mut ConnState) -> CResult<NextAction> {
        loop {
            match &self.step {
                Step::AwaitInitialHandshake => {
                    let Some(packet) = self.take_message(conn)? else {
                        return Ok(NextAction::Read);
                    };
                    let handshake = InitialHandshake::parse(&packet)?;
                    conn.connection_id = handshake.connection_id;
                    conn.server_version = handshake.server_version.clone();
                    conn.charset = handshake.collation;
                    conn.capabilities = CapabilityFlags::new(handshake.capabilities);
                    conn.status = protocol::status::StatusFlags::new(handshake.status_flags);

                    if let Some(missing) = capability::missing_mandatory(
                        conn.capabilities,
                        CapabilityFlags::new(self.client_capabilities),
                    ) {
                        return Ok(NextAction::Done(Err(ReError::Precondition(format!(
                            "server is missing mandatory capabilities: {missing:#010x}"
                        )))));
                    }

                    let want_ssl = self.config.ssl_mode != SslMode::Disabled;
                    let server_supports_ssl = conn.capabilities.has(capability::CLIENT_SSL);
                    if want_ssl && !server_supports_ssl {
                        if self.config.ssl_mode >= SslMode::Require {
                            return Ok(NextAction::Done(Err(ReError::Precondition(
                                "TLS required but the server does not advertise CLIENT_SSL".to_string(),
                            ))));
                        }
                        self.client_capabilities &= !capability::CLIENT_SSL;
                    }

                    let plugin = auth::resolve(&handshake.auth_plugin_name)?;
                    let scramble = String::from_utf8_lossy(&handshake.scramble).to_string();

                    if self.client_capabilities & capability::CLIENT_SSL != 0 {
                        let ssl_request = build_ssl_request(self.client_capabilities, self.config.collation);
                        let frame = super::frame_for_write(conn, &ssl_request);
                        self.step = Step::AwaitTlsUpgrade { scramble, plugin };
                        return Ok(NextAction::Write(frame));
                    }

                    let response = self.build_auth_response(plugin, &scramble);
                    let frame = super::frame_for_write(conn, &response);
                    self.step = Step::AwaitHandshakeResult { scramble, plugin };
                    return Ok(NextAction::Write(frame));
                }

                Step::AwaitTlsUpgrade { .. } => {
                    // `SSLRequest` is on the wire; the runner must upgrade the
                    // transport before the encrypted response can be sent.
                    let Step::AwaitTlsUpgrade { scramble, plugin } =
                        std::mem::replace(&mut self.step, Step::Done)
                    else {
                        unreachable!()
                    };
                    self.step = Step::AwaitSslHandshakeDone { scramble, plugin };
                    return Ok(NextAction::TlsHandshake);
                }

                Step::AwaitSslHandshakeDone { .. } => {
                    // the runner just finished NextAction::TlsHandshake; every
                    // subsequent read/write happens over the encrypted stream.
                    let Step::AwaitSslHandshakeDone { scramble, plugin } =
                        std::mem::replace(&mut self.step, Step::Done)
                    else {
                        unreachable!()
                    };
                    let response = self.build_auth_response(plugin, &scramble);
                    let frame = super::frame_for_write(conn, &response);
                    self.step = Step::AwaitHandshakeResult { scramble, plugin };
                    return Ok(NextAction::Write(frame));
                }

                Step::AwaitHandshakeResult { .. } => {
                    let Some(packet) = self.take_message(conn)? else {
                        return Ok(NextAction::Read);
                    };
                    let Step::AwaitHandshakeResult { scramble, plugin } =
                        std::mem::replace(&mut self.step, Step::Done)
                    else {
                        unreachable!()
                    };
                    match packet.first().copied() {
                        Some(OK_PACKET) => return Ok(NextAction::Done(Ok(()))),
                        Some(ERR_PACKET) => {
                            super::server_error_from_packet(&packet)?;
                            unreachable!("server_error_from_packet returns Err for 0xFF");
                        }
                        Some(AUTH_SWITCH_PACKET) => {
                            let (new_plugin, new_scramble) = parse_auth_switch(&packet)?;
                            let response = auth::initial_response(new_plugin, &self.config.password, &new_scramble);
                            let frame = super::frame_for_write(conn, &response);
                            self.step = Step::AwaitAuthSwitchResult;
                            return Ok(NextAction::Write(frame));
                        }
                        _ if plugin == AuthPlugin::CachingSha2Password => {
                            if auth::is_fast_auth_success(&packet) {
                                self.step = Step::AwaitAuthSwitchResult;
                                continue;
                            }
                            // any other "auth more data" byte means full auth
                            // is required (the 0x01 0x04 marker).
                            if self.client_capabilities & capability::CLIENT_SSL != 0 {
                                let mut cleartext = self.config.password.as_bytes().to_vec();
                                cleartext.push(0);
                                let frame = super::frame_for_write(conn, &cleartext);
                                self.step = Step::AwaitAuthSwitchResult;
                                return Ok(NextAction::Write(frame));
                            }
                            let frame = super::frame_for_write(conn, &[0x02]);
                            self.step = Step::AwaitCachingSha2PublicKey { scramble };
                            return Ok(NextAction::Write(frame));
                        }
                        other => {
                            return Ok(NextAction::Done(Err(ReError::Precondition(format!(
                                "unexpected byte {other:?} in handshake response"
                            )))))
                        }
                    }
                }

                Step::AwaitAuthSwitchResult => {
                    let Some(packet) = self.take_message(conn)? else {
                        return Ok(NextAction::Read);
                    };
                    return Ok(final_result(&packet));
                }

                Step::AwaitCachingSha2PublicKey { .. } => {
                    let Some(packet) = self.take_message(conn)? else {
                        return Ok(NextAction::Read);
                    };
                    let Step::AwaitCachingSha2PublicKey { scramble } =
                        std::mem::replace(&mut self.step, Step::Done)
                    else {
                        unreachable!()
                    };
                    let rsa = Rsa::public_key_from_pem(&packet)
                        .map_err(|e| ReError::Tls(format!("invalid RSA public key from server: {e}")))?;
                    let xored = auth::xor_password_with_scramble(&self.config.password, &scramble);
                    let mut encrypted = vec![0u8; rsa.size() as usize];
                    let len = rsa
                        .public_encrypt(&xored, &mut encrypted, Padding::PKCS1_OAEP)
                        .map_err(|e| ReError::Tls(format!("RSA encryption of password failed: {e}")))?;
                    encrypted.truncate(len);
                    let frame = super::frame_for_write(conn, &encrypted);
                    self.step = Step::AwaitAuthSwitchResult;
                    return Ok(NextAction::Write(frame));
                }

                Step::Done => return Ok(NextAction::Done(Ok(()))),
            }
        }
    }

    fn build_auth_response(&self, plugin: AuthPlugin, scramble: &str) -> Vec<u8> {
        let auth_response = auth::initial_response(plugin, &self.config.password, scramble);
        build_handshake_response41(
            self.client_capabilities,
            self.config.collation,
            &self.config.username,
            &auth_response,
            self.config.database.as_deref(),
            plugin.name(),
        )
    }

    fn take_message(&self, conn: &mut ConnState) -> CResult<Option<Vec<u8>>> {
        match super::poll_message(conn)? {
            Some(()) => {
                let packet = conn.read_buffer.current_message().to_vec();
                conn.read_buffer.finish_message();
                Ok(Some(packet))
            }
            None => Ok(None),
        }
    }
}

fn final_result(packet: &[u8]) -> NextAction {
    match packet.first().copied() {
        Some(OK_PACKET) => NextAction::Done(Ok(())),
        Some(ERR_PACKET) => match super::server_error_from_packet(packet) {
            Ok(()) => NextAction::Done(Err(ReError::Precondition(
                "malformed ERR_Packet terminating handshake".to_string(),
            ))),
            Err(e) => NextAction::Done(Err(e)),
        },
        other => NextAction::Done(Err(ReError::Precondition(format!(
            "unexpected byte {other:?} terminating handshake"
        )))),
    }
}

fn build_ssl_request(client_capabilities: u32, collation: u8) -> Vec<u8> {
    use byteorder::{LittleEndian, WriteBytesExt};
    let mut buf = Vec::new();
    buf.write_u32::<LittleEndian>(client_capabilities).unwrap();
    buf.write_u32::<LittleEndian>(0x0100_0000).unwrap();
    buf.push(collation);
    buf.extend_from_slice(&[0u8; 23]);
    buf
}

fn parse_auth_switch(packet: &[u8]) -> CResult<(AuthPlugin, String)> {
    let mut cursor = Cursor::new(&packet[1..]);
    let name = protocol::codec::read_null_term_string(&mut cursor)?;
    let mut scramble = protocol::codec::read_eof_bytes(&mut cursor);
    if scramble.last() == Some(&0) {
        scramble.pop();
    }
    let plugin = auth::resolve(&name)?;
    Ok((plugin, String::from_utf8_lossy(&scramble).to_string()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn new_requests_mandatory_and_db_capabilities() {
        let cfg = ConnectConfig::new("localhost", 3306, "root", "").with_database("app");
        let hs = Handshake::new(cfg);
        assert!(hs.client_capabilities & capability::CLIENT_CONNECT_WITH_DB != 0);
        assert!(hs.client_capabilities & capability::MANDATORY == capability::MANDATORY);
    }

    #[test]
    fn start_yields_connect_with_configured_host_and_port() {
        let cfg = ConnectConfig::new("db.internal", 3307, "root", "");
        let hs = Handshake::new(cfg);
        match hs.start() {
            NextAction::Connect { host, port } => {
                assert_eq!(host, "db.internal");
                assert_eq!(port, 3307);
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }
}
