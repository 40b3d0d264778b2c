//! `thiserror`-derived error enums for the socket/handler/adapter layer,
//! in the teacher's style (`nxzr_device::transport::TransportError`): a
//! public enum wrapping an `XxxInternalError` that captures only
//! `.kind()` of any upstream `std::io::Error` so the error stays `Clone`
//! -- the same failure is delivered to every status listener fanned out
//! from `HciHandler::dispatch`.
use btproto::ErrorKind as ProtoErrorKind;
use thiserror::Error;

/// spec.md §7's kind set. Every public error in this crate converts to
/// one of these via `.kind()` so callers can match on outcome
/// independent of which layer raised it.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
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
}

impl From<ProtoErrorKind> for ErrorKind {
    fn from(k: ProtoErrorKind) -> Self {
        match k {
            ProtoErrorKind::Malformed => Self::Malformed,
            ProtoErrorKind::ProtocolError => Self::ProtocolError,
            ProtoErrorKind::Timeout => Self::Timeout,
            ProtoErrorKind::Disconnected => Self::Disconnected,
            ProtoErrorKind::Cancelled => Self::Cancelled,
            ProtoErrorKind::Unauthorized => Self::Unauthorized,
            ProtoErrorKind::Busy => Self::Busy,
            ProtoErrorKind::IoError => Self::IoError,
            ProtoErrorKind::NotSupported => Self::NotSupported,
            ProtoErrorKind::RangeError | ProtoErrorKind::Overflow => Self::Malformed,
        }
    }
}

#[derive(Clone, Error, Debug)]
pub enum SockInternalError {
    #[error("io: {kind}; {message}")]
    Io { kind: std::io::ErrorKind, message: String },
}

impl From<std::io::Error> for SockInternalError {
    fn from(err: std::io::Error) -> Self {
        Self::Io { kind: err.kind(), message: err.to_string() }
    }
}

#[derive(Clone, Error, Debug)]
pub enum HciError {
    #[error("hci command queue is shut down")]
    Closed,
    #[error("hci command timed out waiting for a response")]
    CommandTimeout,
    #[error("no command is outstanding to resolve")]
    NoPendingCommand,
    #[error("hci event ring overflowed")]
    RingOverflow,
    #[error(transparent)]
    Sock(#[from] SockInternalError),
    #[error(transparent)]
    Proto(#[from] btproto::Error),
}

impl From<std::io::Error> for HciError {
    fn from(err: std::io::Error) -> Self {
        Self::Sock(err.into())
    }
}

impl HciError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Closed => ErrorKind::Cancelled,
            Self::CommandTimeout => ErrorKind::Timeout,
            Self::NoPendingCommand => ErrorKind::ProtocolError,
            Self::RingOverflow => ErrorKind::Busy,
            Self::Sock(_) => ErrorKind::IoError,
            Self::Proto(e) => e.kind.clone().into(),
        }
    }
}

#[derive(Clone, Error, Debug)]
pub enum AdapterError {
    #[error("adapter is closed")]
    Closed,
    #[error(transparent)]
    Hci(#[from] HciError),
    #[error("operation requires powered-on adapter")]
    NotPowered,
    #[error("feature not supported by this controller")]
    NotSupported,
}

impl AdapterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Closed => ErrorKind::Cancelled,
            Self::Hci(e) => e.kind(),
            Self::NotPowered => ErrorKind::Unauthorized,
            Self::NotSupported => ErrorKind::NotSupported,
        }
    }
}

#[derive(Clone, Error, Debug)]
pub enum RegistryError {
    #[error(transparent)]
    Sock(#[from] SockInternalError),
    #[error("key file is malformed or version-mismatched")]
    CorruptKeyFile,
}

impl From<std::io::Error> for RegistryError {
    fn from(err: std::io::Error) -> Self {
        Self::Sock(err.into())
    }
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Sock(_) => ErrorKind::IoError,
            Self::CorruptKeyFile => ErrorKind::Malformed,
        }
    }
}

pub type Result<T, E> = std::result::Result<T, E>;
