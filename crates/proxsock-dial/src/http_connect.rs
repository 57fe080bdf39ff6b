//! Tunnelling through an HTTP proxy with the CONNECT method.
//!
//! This is a single round trip: we send one `CONNECT host:port` request,
//! read the reply headers, and if the status is 200 we keep the
//! connection as a raw tunnel.  No other HTTP semantics apply after that.

use crate::transport::Transport;
use crate::{Error, Result};

use proxsock_config::HttpProxy;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// The largest reply header block we're willing to buffer.
const MAX_HEADER_LEN: usize = 16384;

/// The most headers that could fit in [`MAX_HEADER_LEN`] bytes.
const MAX_HEADERS: usize = MAX_HEADER_LEN / 4;

/// Connect to `host`:`port` through the HTTP proxy `proxy`.
pub(crate) async fn connect(proxy: &HttpProxy, host: &str, port: u16) -> Result<Transport> {
    info!(
        "Opening CONNECT tunnel to {}:{} via HTTP proxy {}:{}",
        host,
        port,
        proxy.host(),
        proxy.port()
    );
    match timeout(proxy.timeout(), handshake(proxy, host, port)).await {
        Ok(result) => result,
        Err(elapsed) => {
            debug!("HTTP proxy {}:{} timed out", proxy.host(), proxy.port());
            Err(elapsed.into())
        }
    }
}

/// Run the CONNECT handshake, with no timeout.
async fn handshake(proxy: &HttpProxy, host: &str, port: u16) -> Result<Transport> {
    let request = connect_request(proxy, host, port)?;

    let mut stream = TcpStream::connect((proxy.host(), proxy.port()))
        .await
        .map_err(Error::ProxyConnect)?;
    stream
        .write_all(encode_request(&request).as_bytes())
        .await
        .map_err(Error::ProxyConnect)?;

    let (status, leftover) = read_reply(&mut stream).await?;
    if status != Some(200) {
        warn!(
            "HTTP proxy {}:{} refused CONNECT to {}:{} with status {:?}",
            proxy.host(),
            proxy.port(),
            host,
            port,
            status
        );
        // The tunnel never formed; don't leave the connection lying around.
        let _ignore = stream.shutdown().await;
        return Err(Error::ProxyStatus(status));
    }

    debug!("CONNECT tunnel to {}:{} established", host, port);
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Couldn't set TCP_NODELAY on tunnel: {}", e);
    }
    Ok(Transport::new(stream).with_prefix(leftover))
}

/// Return the authority-form request target for `host`:`port`.
fn request_target(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        // An IPv6 literal.
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// Build a CONNECT request for `host`:`port` to send to `proxy`.
pub(crate) fn connect_request(
    proxy: &HttpProxy,
    host: &str,
    port: u16,
) -> Result<http::Request<()>> {
    let target = request_target(host, port);
    let mut builder = http::Request::builder()
        .method(http::Method::CONNECT)
        .uri(target.as_str())
        .header(http::header::HOST, target.as_str());
    if let Some(creds) = proxy.basic_auth() {
        builder = builder.header(
            http::header::PROXY_AUTHORIZATION,
            format!("Basic {}", creds),
        );
    }
    Ok(builder.body(())?)
}

/// Encode a CONNECT request in HTTP/1.1 format.
pub(crate) fn encode_request(req: &http::Request<()>) -> String {
    let target = match req.uri().authority() {
        Some(authority) => authority.to_string(),
        None => req.uri().to_string(),
    };
    let mut s = format!("{} {} HTTP/1.1\r\n", req.method(), target);

    for (key, val) in req.headers().iter() {
        s.push_str(&format!(
            "{}: {}\r\n",
            key,
            String::from_utf8_lossy(val.as_bytes())
        ));
    }
    s.push_str("\r\n");
    s
}

/// Read and parse the proxy's reply headers from `stream`.
///
/// On success, return the status code and any bytes that arrived after
/// the end of the headers.
async fn read_reply<S>(stream: &mut S) -> Result<(Option<u16>, Vec<u8>)>
where
    S: AsyncRead + Unpin,
{
    let mut buf = vec![0; 1024];
    let mut n_in_buf = 0;

    loop {
        let n = stream
            .read(&mut buf[n_in_buf..])
            .await
            .map_err(Error::ProxyConnect)?;
        n_in_buf += n;

        match parse_reply(&buf[..n_in_buf])? {
            Some((n_parsed, status)) => {
                let leftover = buf[n_parsed..n_in_buf].to_vec();
                return Ok((status, leftover));
            }
            None => {
                if n == 0 {
                    return Err(Error::TruncatedHeaders);
                }
                if n_in_buf == buf.len() {
                    if buf.len() >= MAX_HEADER_LEN {
                        return Err(httparse::Error::TooManyHeaders.into());
                    }
                    buf.resize(buf.len() * 2, 0);
                }
            }
        }
    }
}

/// Try to parse a complete reply head from `buf`.
///
/// Return `None` if more bytes are needed, or the length of the head and
/// the status code if it's all there.
fn parse_reply(buf: &[u8]) -> Result<Option<(usize, Option<u16>)>> {
    let mut n_headers = 32;
    loop {
        let mut headers = vec![httparse::EMPTY_HEADER; n_headers];
        let mut response = httparse::Response::new(&mut headers);
        match response.parse(buf) {
            Ok(httparse::Status::Complete(n_parsed)) => {
                debug!(
                    "HTTP proxy replied: {:?} {}",
                    response.code,
                    response.reason.unwrap_or("")
                );
                return Ok(Some((n_parsed, response.code)));
            }
            Ok(httparse::Status::Partial) => return Ok(None),
            Err(httparse::Error::TooManyHeaders) if n_headers < MAX_HEADERS => {
                n_headers *= 2;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use proxsock_config::{ProxyConfig, ProxyParams};

    fn http_proxy(params: ProxyParams) -> HttpProxy {
        match params.validate().unwrap() {
            ProxyConfig::Http(h) => h,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn format_without_auth() {
        let proxy = http_proxy(ProxyParams::http("127.0.0.1", 3128));
        let req = connect_request(&proxy, "example.com", 443).unwrap();
        assert_eq!(
            encode_request(&req),
            "CONNECT example.com:443 HTTP/1.1\r\nhost: example.com:443\r\n\r\n"
        );
    }

    #[test]
    fn format_with_auth() {
        let proxy = http_proxy(ProxyParams::http("127.0.0.1", 3128).with_auth("user", "pass"));
        let req = connect_request(&proxy, "149.154.167.51", 443).unwrap();
        assert_eq!(
            encode_request(&req),
            "CONNECT 149.154.167.51:443 HTTP/1.1\r\n\
             host: 149.154.167.51:443\r\n\
             proxy-authorization: Basic dXNlcjpwYXNz\r\n\r\n"
        );
    }

    #[test]
    fn ipv6_target() {
        assert_eq!(request_target("2001:db8::1", 443), "[2001:db8::1]:443");
        assert_eq!(request_target("[2001:db8::1]", 443), "[2001:db8::1]:443");
        assert_eq!(request_target("localhost", 80), "localhost:80");
    }

    #[test]
    fn bad_target_rejected() {
        let proxy = http_proxy(ProxyParams::http("127.0.0.1", 3128));
        let r = connect_request(&proxy, "bad host\r\nX-Injected: 1", 443);
        assert!(matches!(r, Err(Error::BadRequest(_))));
    }

    #[tokio::test]
    async fn reply_with_leftover() {
        let mut reply: &[u8] = b"HTTP/1.1 200 Connection established\r\n\r\nhello";
        let (status, leftover) = read_reply(&mut reply).await.unwrap();
        assert_eq!(status, Some(200));
        assert_eq!(&leftover[..], b"hello");
    }

    #[tokio::test]
    async fn reply_refused() {
        let mut reply: &[u8] =
            b"HTTP/1.1 407 Proxy Authentication Required\r\nProxy-Authenticate: Basic\r\n\r\n";
        let (status, leftover) = read_reply(&mut reply).await.unwrap();
        assert_eq!(status, Some(407));
        assert!(leftover.is_empty());
    }

    #[tokio::test]
    async fn reply_with_many_headers() {
        let mut big = b"HTTP/1.1 200 Connection established\r\n".to_vec();
        for i in 0..100 {
            big.extend_from_slice(format!("X-Hop-{}: yes\r\n", i).as_bytes());
        }
        big.extend_from_slice(b"\r\ntunnel");
        let mut reply: &[u8] = &big[..];
        let (status, leftover) = read_reply(&mut reply).await.unwrap();
        assert_eq!(status, Some(200));
        assert_eq!(&leftover[..], b"tunnel");
    }

    #[tokio::test]
    async fn reply_truncated() {
        let mut reply: &[u8] = b"HTTP/1.1 200 OK\r\nVia: som";
        let r = read_reply(&mut reply).await;
        assert!(matches!(r, Err(Error::TruncatedHeaders)));
    }

    #[tokio::test]
    async fn reply_garbage() {
        let mut reply: &[u8] = b"SSH-2.0-OpenSSH_8.4\r\n\r\n";
        let r = read_reply(&mut reply).await;
        assert!(matches!(r, Err(Error::BadHeaders(_))));
    }

    #[tokio::test]
    async fn reply_too_long() {
        let mut big = b"HTTP/1.1 200 OK\r\n".to_vec();
        while big.len() < MAX_HEADER_LEN + 10 {
            big.extend_from_slice(b"X-Padding: aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\r\n");
        }
        let mut reply: &[u8] = &big[..];
        let r = read_reply(&mut reply).await;
        assert!(matches!(r, Err(Error::BadHeaders(_))));
    }
}
