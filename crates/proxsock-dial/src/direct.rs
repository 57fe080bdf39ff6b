//! Direct TCP connections.

use crate::transport::Transport;
use crate::{Error, Result};

use tokio::net::TcpStream;
use tracing::{debug, info};

/// Open a plain TCP connection to `host`:`port`.
pub(crate) async fn connect(host: &str, port: u16) -> Result<Transport> {
    info!("Connecting directly to {}:{}", host, port);
    let stream = TcpStream::connect((host, port))
        .await
        .map_err(Error::Connect)?;
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Couldn't set TCP_NODELAY on {}:{}: {}", host, port, e);
    }
    Ok(Transport::new(stream))
}
