//! Open byte-stream transports, with or without a proxy.
//!
//! Given a target host and port, a [`ProxyDialer`] produces a connected
//! [`Transport`]:
//!
//!  * With no proxy, it opens a direct TCP connection.
//!  * With a SOCKS proxy, it hands the handshake to `tokio-socks`.
//!  * With an HTTP proxy, it sends a `CONNECT host:port` request, and on a
//!    200 reply keeps the proxy connection as a raw tunnel.
//!
//! Proxy handshakes are bounded by the proxy's configured timeout (five
//! seconds unless set otherwise).  Direct connections aren't.
//!
//! # Limitations
//!
//! There is no retry here; that's the caller's business.

#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]

mod direct;
mod err;
mod http_connect;
mod socks;
mod transport;

pub use err::{Error, ErrorKind};
pub use transport::{Stream, Transport};

use async_trait::async_trait;
use proxsock_config::ProxyConfig;

/// A Result as returned by this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Something that knows how to open a transport to a target.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Try once to open a transport to `host`:`port`.
    async fn dial(&self, host: &str, port: u16) -> Result<Transport>;
}

/// A [`Dialer`] that follows a [`ProxyConfig`].
#[derive(Debug, Clone, Default)]
pub struct ProxyDialer {
    /// How to reach targets.
    config: ProxyConfig,
}

impl ProxyDialer {
    /// Construct a new dialer that uses `config`.
    pub fn new(config: ProxyConfig) -> Self {
        ProxyDialer { config }
    }

    /// Return the configuration this dialer follows.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

#[async_trait]
impl Dialer for ProxyDialer {
    async fn dial(&self, host: &str, port: u16) -> Result<Transport> {
        match &self.config {
            ProxyConfig::None => direct::connect(host, port).await,
            ProxyConfig::Socks(proxy) => socks::connect(proxy, host, port).await,
            ProxyConfig::Http(proxy) => http_connect::connect(proxy, host, port).await,
        }
    }
}
