use std::io;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// A malformed Service Frame or SSO Frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("truncated frame: need {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },
    #[error("length prefix {declared} is shorter than its own {width}-byte width")]
    BadPrefix { declared: u32, width: usize },
    #[error("unrecognized protocol tag: {0}")]
    UnknownProtocol(u32),
    #[error("unrecognized auth flag: {0}")]
    UnknownAuthFlag(u8),
    #[error("field `{0}` is not valid UTF-8")]
    InvalidUtf8(&'static str),
    #[error("decrypt failed: {0}")]
    Decrypt(String),
    #[error("decompress failed: {0}")]
    Decompress(String),
    #[error("bad reserved fields: {0}")]
    ReservedFields(String),
}

/// Why a connection was torn down.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("connection closed by peer")]
    Eof,
    #[error("socket error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed service frame: {0}")]
    Frame(#[from] FrameError),
}

/// Failure surfaced to a caller of the transport session.
#[derive(Debug, Clone, Error)]
pub enum SsoError {
    #[error("not connected")]
    NotConnected,
    #[error("disconnected: {reason}")]
    Disconnected { reason: String },
    #[error("session closed")]
    Closed,
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: Arc<io::Error>,
    },
    #[error("[seq={sequence}] {command} timed out after {timeout:?}")]
    Timeout {
        command: String,
        sequence: i32,
        timeout: Duration,
    },
    #[error("sequence {0} already has a pending request")]
    SequenceInUse(i32),
    #[error("signing {command} failed: {message}")]
    Sign { command: String, message: String },
    #[error("[seq={sequence}] malformed response: {source}")]
    MalformedResponse {
        sequence: i32,
        #[source]
        source: FrameError,
    },
    #[error("{command} returned code {code}: {message}")]
    Service {
        command: String,
        code: i32,
        message: String,
    },
    #[error("failed to parse {command} response: {message}")]
    Parse { command: String, message: String },
    #[error("online registration rejected: {0}")]
    Online(String),
}

impl SsoError {
    /// True for the uniform failure every waiter sees when a connection drops.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Disconnected { .. } | Self::Closed)
    }
}
