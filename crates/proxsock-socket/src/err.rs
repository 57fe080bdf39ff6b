//! Declare error types for proxsock-socket

use std::sync::PoisonError;
use thiserror::Error;

/// An error returned by a [`PromisedSocket`](crate::PromisedSocket).
#[derive(Debug, Error)]
pub enum Error {
    /// The proxy configuration given at construction was invalid.
    #[error("invalid proxy configuration: {0}")]
    Config(#[from] proxsock_config::Error),

    /// We couldn't open a transport to the target.
    #[error("{0}")]
    Dial(#[from] proxsock_dial::Error),

    /// The socket was closed, or never connected.
    #[error("socket was closed")]
    Closed,

    /// An internal error of some kind that should never occur.
    #[error("Internal error: {0}")]
    Internal(&'static str),
}

impl<T> From<PoisonError<T>> for Error {
    fn from(_: PoisonError<T>) -> Error {
        Error::Internal("socket state lock poisoned")
    }
}

/// The kinds of failure a socket operation can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Bad proxy parameters; reported at construction.
    Configuration,
    /// The target couldn't be reached, or the transport failed.
    Connection,
    /// A proxy refused us, failed, or timed out.
    ProxyHandshake,
    /// The operation was attempted on a closed socket.
    ClosedSocket,
    /// Something went wrong that shouldn't be possible.
    Internal,
}

impl Error {
    /// Return the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) => ErrorKind::Configuration,
            Error::Dial(e) => match e.kind() {
                proxsock_dial::ErrorKind::Connection => ErrorKind::Connection,
                _ => ErrorKind::ProxyHandshake,
            },
            Error::Closed => ErrorKind::ClosedSocket,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }
}
