use std::fmt::Display;
use std::{fmt, io};
use std::num::ParseIntError;
use std::str::Utf8Error;
use std::string::FromUtf8Error;
use hex::FromHexError;

#[derive(Debug)]
pub enum ReError {
    //////////////////////
    // Common
    //////////////////////
    /// 一定不会出现的异常。如果出现，一定是BUG
    BUG(String),
    /// The parser had an error (recoverable)
    Error(String),

    //////////////////////
    // SQL Parser
    //////////////////////
    ASTParserError(String),

    //////////////////////
    // Binlog
    //////////////////////
    /// Byte code is incomplete
    /// 此错误用于binlog编解码过程中的异常处理，包含：
    ///     编解码进行中、已完成、格式错误等， 由 Needed 产生为具体的错误信息描述
    Incomplete(Needed),

    //////////////////////
    // IO
    //////////////////////
    IoError(io::Error),
    Utf8Error(Utf8Error),
    FromUtf8Error(FromUtf8Error),
    FromHexError(FromHexError),
    ParseIntError(ParseIntError),
    ConnectionError(String),
    String(String),

    /// The parser had an unrecoverable error: we got to the right
    /// branch and we know other branches won't work, so backtrack
    /// as fast as possible
    Failure(String),

    ConfigFileParseErr(String),


    TableSchemaIntoErr(String),
    RcMysqlUrlErr(String),
    RcMysqlQueryErr(String),
    OpRaftErr(String),

    MysqlQueryErr(String),

    OpTableNotExistErr(String),
    OpSchemaNotExistErr(String),
    OpMetadataErr(String),
    MetadataMockErr(String),

    //////////////////////
    // Wire protocol
    //////////////////////
    /// Frame-level malformation: sequence number mismatch, an impossible
    /// header length, or trailing bytes after reassembly. Fatal to the
    /// connection.
    Framing(String),
    /// A value that parsed syntactically but is outside the range the wire
    /// format can represent.
    ProtocolValue(String),
    /// An `ERR_Packet` returned by the server.
    Server {
        code: u16,
        sqlstate: Option<String>,
        message: String,
    },
    /// A client-side precondition failed before any bytes were sent:
    /// metadata mismatch against a static sink, resultset-count mismatch,
    /// unsupported capability, local-infile request.
    Precondition(String),
    /// An in-flight I/O operation was cancelled or timed out. Always fatal
    /// to the connection, since the wire position after a partial write is
    /// unknown.
    Aborted,
    /// TLS handshake or shutdown failure.
    Tls(String),
}

/// Extra context carried alongside a [`ReError::Server`], mirroring what the
/// server itself reported plus any client-side gloss added on top.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    pub client_message: String,
    pub server_message: Option<String>,
}

impl Display for ReError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> fmt::Result {
        match self {
            ReError::BUG(s) | ReError::Error(s) | ReError::ASTParserError(s)
            | ReError::ConnectionError(s) | ReError::String(s) | ReError::Failure(s)
            | ReError::ConfigFileParseErr(s) | ReError::TableSchemaIntoErr(s) | ReError::RcMysqlUrlErr(s)
            | ReError::RcMysqlQueryErr(s) | ReError::OpRaftErr(s) | ReError::MysqlQueryErr(s)
            | ReError::OpTableNotExistErr(s) | ReError::OpSchemaNotExistErr(s) | ReError::OpMetadataErr(s)
            | ReError::MetadataMockErr(s) => {
                write!(f, "{}", s)
            }
            ReError::Incomplete(n) => {
                write!(f, "{}", n)
            }
            ReError::IoError(err) => {
                write!(f, "{}", err.to_string())
            }
            ReError::Utf8Error(err) => {
                write!(f, "{}", err.to_string())
            }
            ReError::FromUtf8Error(err) => {
                write!(f, "{}", err.to_string())
            }
            ReError::FromHexError(err) => {
                write!(f, "{}", err.to_string())
            }
            ReError::ParseIntError(err) => {
                write!(f, "{}", err.to_string())
            }
            ReError::Framing(s) | ReError::ProtocolValue(s) | ReError::Precondition(s) | ReError::Tls(s) => {
                write!(f, "{}", s)
            }
            ReError::Server { code, sqlstate, message } => match sqlstate {
                Some(state) => write!(f, "server error {code} ({state}): {message}"),
                None => write!(f, "server error {code}: {message}"),
            },
            ReError::Aborted => write!(f, "operation aborted (cancelled or timed out)"),
        }
    }
}

impl std::error::Error for ReError {}

impl From<io::Error> for ReError {
    fn from(error: io::Error) -> Self {
        ReError::IoError(error)
    }
}

// impl <T> From<error::Error<T>> for ReError {
//     fn  from(error: error::Error<T>) -> Self {
//         ReError::String(error.input)
//     }
// }

impl From<Utf8Error> for ReError {
    fn from(error: Utf8Error) -> Self {
        ReError::Utf8Error(error)
    }
}

impl From<FromUtf8Error> for ReError {
    fn from(error: FromUtf8Error) -> Self {
        ReError::FromUtf8Error(error)
    }
}

impl From<FromHexError> for ReError {
    fn from(error: FromHexError) -> Self {
        ReError::FromHexError(error)
    }
}

impl From<ParseIntError> for ReError {
    fn from(error: ParseIntError) -> Self {
        ReError::ParseIntError(error)
    }
}

/// Contains information on needed data if a parser returned `Incomplete`
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Needed {
    /// Needs more data, but we do not know how much
    Unknown,

    NoEnoughData,

    InvalidUtf8,

    /// 被忽略的异常。
    MissingNull,

    InvalidData(String),
}

impl Display for Needed {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> fmt::Result {
        match self {
            Needed::Unknown => {
                write!(f, "Unknown")
            }
            Needed::NoEnoughData => {
                write!(f, "NoEnoughData")
            }
            Needed::InvalidUtf8 => {
                write!(f, "InvalidUtf8")
            }
            Needed::MissingNull => {
                write!(f, "MissingNull")
            }
            Needed::InvalidData(s) => {
                write!(f, "{}", s)
            }
        }
    }
}

impl ReError {
    /// Extracts the two-channel diagnostics a [`ReError::Server`] carries,
    /// wrapping its raw fields with a library-generated client message so
    /// the untrusted server text stays distinguishable from it.
    pub fn diagnostics(&self) -> Option<Diagnostics> {
        match self {
            ReError::Server { code, sqlstate, message } => Some(Diagnostics {
                client_message: match sqlstate {
                    Some(state) => format!("server error {code} ({state})"),
                    None => format!("server error {code}"),
                },
                server_message: Some(message.clone()),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    #[test]
    fn test() {
        assert_eq!(1, 1);
    }
}