//! Async engine runner. Mirrors [`super::sync_runner::SyncRunner`] step for
//! step — same `Transport` split, same `drive`/`run` loop — swapped onto
//! `tokio::net::TcpStream` and `tokio_native_tls::TlsStream` so a caller on a
//! tokio runtime can drive the same [`crate::algorithm::Algorithm`]s without
//! blocking a worker thread.

use std::fmt;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_native_tls::{TlsConnector, TlsStream};

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
    Closed,
}

impl Transport {
    async fn shutdown(&mut self) -> CResult<()> {
        let result = match self {
            Transport::Tcp(stream) => stream.shutdown().await,
            Transport::Tls(stream) => stream.shutdown().await,
            Transport::Closed => Ok(()),
        };
        *self = Transport::Closed;
        result.map_err(|e| ReError::Tls(format!("transport shutdown failed: {e}")))
    }

    async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Transport::Tcp(stream) => stream.read(buf).await,
            Transport::Tls(stream) => stream.read(buf).await,
            Transport::Closed => Ok(0),
        }
    }

    async fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        match self {
            Transport::Tcp(stream) => stream.write_all(buf).await,
            Transport::Tls(stream) => stream.write_all(buf).await,
            Transport::Closed => Ok(()),
        }
    }

    async fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Transport::Tcp(stream) => stream.flush().await,
            Transport::Tls(stream) => stream.flush().await,
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

/// The tokio counterpart of [`super::sync_runner::SyncRunner`]: a live,
/// authenticated connection driven by `.await` instead of blocking calls.
pub struct AsyncRunner {
    transport: Transport,
    conn: ConnState,
    config: ConnectConfig,
}

impl AsyncRunner {
    pub async fn connect(config: ConnectConfig) -> CResult<Self> {
        let mut runner = AsyncRunner {
            transport: Transport::Closed,
            conn: ConnState::new(),
            config: config.clone(),
        };
        let mut handshake = Handshake::new(config);
        let start = handshake.start();
        runner.run(&mut handshake, start).await?;
        Ok(runner)
    }

    pub async fn drive<A: Algorithm>(&mut self, algorithm: &mut A) -> CResult<()> {
        let next = algorithm.resume(&mut self.conn)?;
        self.run(algorithm, next).await
    }

    async fn run<A: Algorithm>(&mut self, algorithm: &mut A, mut next: NextAction) -> CResult<()> {
        loop {
            next = match next {
                NextAction::Connect { host, port } => {
                    let stream = TcpStream::connect((host.as_str(), port)).await?;
                    stream.set_nodelay(true)?;
                    self.transport = Transport::Tcp(stream);
                    algorithm.resume(&mut self.conn)?
                }
                NextAction::Read => {
                    let dst = self.conn.read_buffer.free_mut(READ_CHUNK);
                    let n = self.transport.read(dst).await?;
                    if n == 0 {
                        return Err(ReError::Framing("connection closed mid-message".to_string()));
                    }
                    self.conn.read_buffer.commit_read(n);
                    algorithm.resume(&mut self.conn)?
                }
                NextAction::Write(buf) => {
                    self.transport.write_all(&buf).await?;
                    self.transport.flush().await?;
                    algorithm.resume(&mut self.conn)?
                }
                NextAction::TlsHandshake => {
                    self.upgrade_to_tls().await?;
                    algorithm.resume(&mut self.conn)?
                }
                NextAction::TlsShutdown => {
                    self.transport.shutdown().await?;
                    algorithm.resume(&mut self.conn)?
                }
                NextAction::Close => {
                    self.transport.shutdown().await?;
                    algorithm.resume(&mut self.conn)?
                }
                NextAction::Done(result) => return result,
            };
        }
    }

    async fn upgrade_to_tls(&mut self) -> CResult<()> {
        let mut builder = native_tls::TlsConnector::builder();
        if let Some(opts) = &self.config.ssl_opts {
            if let Some(identity) = opts.client_identity() {
                builder.identity(identity.load()?);
            }
            builder.danger_accept_invalid_hostnames(opts.skip_domain_validation());
            builder.danger_accept_invalid_certs(opts.accept_invalid_certs());
        }
        let connector: TlsConnector = builder
            .build()
            .map_err(|e| ReError::Tls(format!("failed to build TLS connector: {e}")))?
            .into();

        let tcp = match std::mem::replace(&mut self.transport, Transport::Closed) {
            Transport::Tcp(stream) => stream,
            other => {
                self.transport = other;
                return Err(ReError::Tls("TLS handshake requested on a non-TCP transport".to_string()));
            }
        };
        let tls = connector
            .connect(&self.config.host, tcp)
            .await
            .map_err(|e| ReError::Tls(format!("TLS handshake failed: {e}")))?;
        self.transport = Transport::Tls(tls);
        Ok(())
    }

    pub fn conn_state(&self) -> &ConnState {
        &self.conn
    }

    pub async fn close(mut self) -> CResult<()> {
        let mut quit = Quit::new();
        let result = self.drive(&mut quit).await;
        let _ = self.transport.shutdown().await;
        result
    }
}
