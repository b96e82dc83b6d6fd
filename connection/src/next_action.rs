//! The resumable sans-I/O algorithms in `algorithm` never touch a socket;
//! instead each call to `resume` returns a `NextAction` telling the engine
//! runner (sync or async, see `engine`) what I/O to perform before calling
//! `resume` again. Grounded on `conn::connection::Connection::do_handshake`'s
//! read/write/upgrade-to-ssl sequence, pulled out of the blocking call stack
//! into an explicit state the runner drives.

use common::err::decode_error::ReError;

/// What the engine runner must do before the algorithm can make progress.
pub enum NextAction {
    /// Open the TCP connection to `host:port`.
    Connect { host: String, port: u16 },
    /// Read more bytes and feed them back in via `resume`.
    Read,
    /// Write this buffer to the wire, then call `resume` again.
    Write(Vec<u8>),
    /// Perform the TLS client handshake on the current stream.
    TlsHandshake,
    /// Shut the TLS session down cleanly (used by `Quit`/connection reset).
    TlsShutdown,
    /// Close the underlying transport.
    Close,
    /// The algorithm has produced its result; the runner must not call
    /// `resume` again, and should yield this result to its own caller.
    ///
    /// Per the "done always yields at least once" rule: a `Done` is always
    /// returned from `resume`, never substituted with a bare return, so
    /// synchronous callers can rely on a single terminal yield point.
    Done(Result<(), ReError>),
}

impl std::fmt::Debug for NextAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NextAction::Connect { host, port } => write!(f, "Connect({host}:{port})"),
            NextAction::Read => write!(f, "Read"),
            NextAction::Write(buf) => write!(f, "Write({} bytes)", buf.len()),
            NextAction::TlsHandshake => write!(f, "TlsHandshake"),
            NextAction::TlsShutdown => write!(f, "TlsShutdown"),
            NextAction::Close => write!(f, "Close"),
            NextAction::Done(r) => write!(f, "Done({})", if r.is_ok() { "Ok" } else { "Err" }),
        }
    }
}
