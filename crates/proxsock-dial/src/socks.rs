//! Dialing through a SOCKS proxy.
//!
//! The handshake itself is `tokio-socks`'s job; here we only pick the
//! right flavor and hold it to the configured deadline.

use crate::transport::Transport;
use crate::Result;

use proxsock_config::{SocksProxy, SocksVersion};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_socks::tcp::{Socks4Stream, Socks5Stream};
use tracing::{debug, info};

/// Connect to `host`:`port` through the SOCKS proxy `proxy`.
pub(crate) async fn connect(proxy: &SocksProxy, host: &str, port: u16) -> Result<Transport> {
    info!(
        "Connecting to {}:{} via {} proxy {}:{}",
        host,
        port,
        proxy.version(),
        proxy.host(),
        proxy.port()
    );
    let stream = timeout(proxy.timeout(), handshake(proxy, host, port))
        .await
        .map_err(|e| {
            debug!("SOCKS proxy {}:{} timed out", proxy.host(), proxy.port());
            e
        })??;
    Ok(Transport::new(stream))
}

/// Run the SOCKS handshake, with no timeout.
async fn handshake(proxy: &SocksProxy, host: &str, port: u16) -> Result<TcpStream> {
    let proxy_addr = (proxy.host(), proxy.port());
    let target = (host, port);

    let stream = match (proxy.version(), proxy.username(), proxy.password()) {
        (SocksVersion::V4, Some(user), _) => {
            Socks4Stream::connect_with_userid(proxy_addr, target, user)
                .await?
                .into_inner()
        }
        (SocksVersion::V4, None, _) => Socks4Stream::connect(proxy_addr, target)
            .await?
            .into_inner(),
        (SocksVersion::V5, Some(user), Some(pass)) => {
            Socks5Stream::connect_with_password(proxy_addr, target, user, pass)
                .await?
                .into_inner()
        }
        (SocksVersion::V5, _, _) => Socks5Stream::connect(proxy_addr, target)
            .await?
            .into_inner(),
    };
    Ok(stream)
}
