//! Blocking engine runner. Grounded on
//! `conn::connection::PacketChannel`/`ChannelStream`'s `Tcp`/`Tls` split and
//! `upgrade_to_ssl`, adapted to drive a sans-I/O [`crate::algorithm::Algorithm`]
//! one [`NextAction`](crate::next_action::NextAction) at a time instead of
//! calling `read_packet`/`write_packet` directly.

use std::fmt;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use native_tls::{TlsConnector, TlsStream};

use common::err::decode_error::ReError;
use common::err::CResult;

use crate::algorithm::Algorithm;
use crate::algorithm::handshake::Handshake;
use crate::algorithm::quit::Quit;
use crate::config::ConnectConfig;
use crate::next_action::NextAction;
use crate::state::ConnState;

const READ_CHUNK: usize = 8192;

enum Transport {
    Tcp(TcpStream),
    Tls(TlsStream<TcpStream>),
    /// The algorithm finished before ever opening a socket (shouldn't
    /// normally happen, but keeps the runner total).
    Closed,
}

impl Transport {
    fn shutdown(&mut self) -> CResult<()> {
        let result = match self {
            Transport::Tcp(stream) => stream.shutdown(Shutdown::Both),
            Transport::Tls(stream) => stream.shutdown(),
            Transport::Closed => Ok(()),
        };
        *self = Transport::Closed;
        result.map_err(|e| ReError::Tls(format!("transport shutdown failed: {e}")))
    }
}

impl Read for Transport {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Transport::Tcp(stream) => stream.read(buf),
            Transport::Tls(stream) => stream.read(buf),
            Transport::Closed => Ok(0),
        }
    }
}

impl Write for Transport {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Transport::Tcp(stream) => stream.write(buf),
            Transport::Tls(stream) => stream.write(buf),
            Transport::Closed => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Transport::Tcp(stream) => stream.flush(),
            Transport::Tls(stream) => stream.flush(),
            Transport::Closed => Ok(()),
        }
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Tcp(s) => write!(f, "Tcp({s:?})"),
            Transport::Tls(_) => write!(f, "Tls(..)"),
            Transport::Closed => write!(f, "Closed"),
        }
    }
}

/// A live, authenticated, blocking connection: the transport plus the
/// protocol state the next algorithm resumes against.
pub struct SyncRunner {
    transport: Transport,
    conn: ConnState,
    config: ConnectConfig,
}

impl SyncRunner {
    /// Opens a TCP connection to `config` and runs the handshake to
    /// completion, returning a runner ready to drive further algorithms
    /// (`Query`, `Ping`) against the same authenticated session.
    pub fn connect(config: ConnectConfig) -> CResult<Self> {
        let mut runner = SyncRunner {
            transport: Transport::Closed,
            conn: ConnState::new(),
            config: config.clone(),
        };
        let mut handshake = Handshake::new(config);
        let start = handshake.start();
        runner.run(&mut handshake, start)?;
        Ok(runner)
    }

    /// Runs one algorithm to completion on an already-connected transport,
    /// performing whatever I/O its `NextAction`s request.
    pub fn drive<A: Algorithm>(&mut self, algorithm: &mut A) -> CResult<()> {
        let next = algorithm.resume(&mut self.conn)?;
        self.run(algorithm, next)
    }

    fn run<A: Algorithm>(&mut self, algorithm: &mut A, mut next: NextAction) -> CResult<()> {
        loop {
            next = match next {
                NextAction::Connect { host, port } => {
                    let stream = TcpStream::connect((host.as_str(), port))?;
                    stream.set_read_timeout(Some(self.config.connect_timeout))?;
                    stream.set_nodelay(true)?;
                    self.transport = Transport::Tcp(stream);
                    algorithm.resume(&mut self.conn)?
                }
                NextAction::Read => {
                    let dst = self.conn.read_buffer.free_mut(READ_CHUNK);
                    let n = self.transport.read(dst)?;
                    if n == 0 {
                        return Err(ReError::Framing("connection closed mid-message".to_string()));
                    }
                    self.conn.read_buffer.commit_read(n);
                    algorithm.resume(&mut self.conn)?
                }
                NextAction::Write(buf) => {
                    self.transport.write_all(&buf)?;
                    self.transport.flush()?;
                    algorithm.resume(&mut self.conn)?
                }
                NextAction::TlsHandshake => {
                    self.upgrade_to_tls()?;
                    algorithm.resume(&mut self.conn)?
                }
                NextAction::TlsShutdown => {
                    self.transport.shutdown()?;
                    algorithm.resume(&mut self.conn)?
                }
                NextAction::Close => {
                    self.transport.shutdown()?;
                    algorithm.resume(&mut self.conn)?
                }
                NextAction::Done(result) => return result,
            };
        }
    }

    fn upgrade_to_tls(&mut self) -> CResult<()> {
        let mut builder = TlsConnector::builder();
        if let Some(opts) = &self.config.ssl_opts {
            if let Some(identity) = opts.client_identity() {
                builder.identity(identity.load()?);
            }
            builder.danger_accept_invalid_hostnames(opts.skip_domain_validation());
            builder.danger_accept_invalid_certs(opts.accept_invalid_certs());
        }
        let connector = builder
            .build()
            .map_err(|e| ReError::Tls(format!("failed to build TLS connector: {e}")))?;

        let tcp = match std::mem::replace(&mut self.transport, Transport::Closed) {
            Transport::Tcp(stream) => stream,
            other => {
                self.transport = other;
                return Err(ReError::Tls("TLS handshake requested on a non-TCP transport".to_string()));
            }
        };
        let tls = connector
            .connect(&self.config.host, tcp)
            .map_err(|e| ReError::Tls(format!("TLS handshake failed: {e}")))?;
        self.transport = Transport::Tls(tls);
        Ok(())
    }

    pub fn conn_state(&self) -> &ConnState {
        &self.conn
    }

    /// Sends `COM_QUIT` and shuts the transport down.
    pub fn close(mut self) -> CResult<()> {
        let mut quit = Quit::new();
        let result = self.drive(&mut quit);
        let _ = self.transport.shutdown();
        result
    }
}
