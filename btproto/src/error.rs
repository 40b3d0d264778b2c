//! Flat, data-only error type for codec and state-machine failures: no
//! I/O source to wrap here, just a kind plus an optional message, in the
//! style `nxzr_core`'s own error module uses for the same reason.

use strum::Display;

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    Malformed,
    ProtocolError,
    Timeout,
    Disconnected,
    Cancelled,
    Unauthorized,
    Busy,
    IoError,
    NotSupported,
    RangeError,
    Overflow,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: String::new(),
        }
    }

    pub fn with_message(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}: {}", self.kind, self.message)
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
