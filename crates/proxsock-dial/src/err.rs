//! Declare dialer-specific errors.

use thiserror::Error;
use tokio::time::error::Elapsed;

/// An error originating from the proxsock-dial crate.
#[derive(Error, Debug)]
pub enum Error {
    /// We couldn't open a direct connection to the target.
    #[error("couldn't connect to target: {0}")]
    Connect(#[source] std::io::Error),

    /// We couldn't talk to the HTTP proxy before it answered.
    #[error("HTTP proxy connection error: {0}")]
    ProxyConnect(#[source] std::io::Error),

    /// The proxy took too long to finish its handshake.
    #[error("proxy connection timeout")]
    ProxyTimeout,

    /// The HTTP proxy answered our CONNECT with something other than 200.
    #[error("HTTP proxy connection failed with status {0:?}")]
    ProxyStatus(Option<u16>),

    /// The SOCKS handshake failed.
    #[error("SOCKS proxy error: {0}")]
    Socks(#[from] tokio_socks::Error),

    /// The proxy closed the connection in the middle of its reply headers.
    #[error("truncated HTTP headers from proxy")]
    TruncatedHeaders,

    /// The proxy's reply couldn't be parsed as HTTP.
    #[error("couldn't parse HTTP headers from proxy: {0}")]
    BadHeaders(#[from] httparse::Error),

    /// We couldn't build a CONNECT request for this target.
    #[error("couldn't build CONNECT request: {0}")]
    BadRequest(#[from] http::Error),
}

impl From<Elapsed> for Error {
    fn from(_: Elapsed) -> Self {
        Error::ProxyTimeout
    }
}

/// A broad classification of dialing errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The target itself couldn't be reached.
    Connection,
    /// A proxy was unreachable, slow, or refused to open a tunnel.
    ProxyHandshake,
}

impl Error {
    /// Return the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Connect(_) => ErrorKind::Connection,
            _ => ErrorKind::ProxyHandshake,
        }
    }

    /// Return true if this error came from a proxy deadline expiring.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::ProxyTimeout)
    }
}
