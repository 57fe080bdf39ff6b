//! Proxy configuration types.
//!
//! [`ProxyParams`] is the loose, user-facing shape of a proxy setting, as
//! it appears in a configuration file.  [`ProxyParams::validate`] turns it
//! into a [`ProxyConfig`], which is what the rest of proxsock works with.

use crate::{Error, Result};

use base64::Engine;
use serde::Deserialize;
use std::convert::TryFrom;
use std::fmt;
use std::time::Duration;

/// How long to wait for a proxy handshake when no timeout is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// A SOCKS protocol version that we know how to dial through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocksVersion {
    /// SOCKS4 (and SOCKS4a, for hostnames).
    V4,
    /// SOCKS5.
    V5,
}

impl TryFrom<u8> for SocksVersion {
    type Error = Error;

    fn try_from(v: u8) -> Result<Self> {
        match v {
            0 => Err(Error::MissingSocksVersion),
            4 => Ok(SocksVersion::V4),
            5 => Ok(SocksVersion::V5),
            other => Err(Error::UnsupportedSocksVersion(other)),
        }
    }
}

impl fmt::Display for SocksVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocksVersion::V4 => write!(f, "socks4"),
            SocksVersion::V5 => write!(f, "socks5"),
        }
    }
}

/// The raw form of a proxy setting.
///
/// Which proxy family this describes depends on which marker field is
/// present: `httpProxy` means an HTTP CONNECT proxy, `socksType` means a
/// SOCKS proxy.  An `MTProxy` marker describes an application-layer proxy
/// that isn't handled at the socket level at all.
///
/// Field names accept the camel-case spelling, the all-lowercase spelling
/// (which is what `config` hands us), and snake case.
#[derive(Deserialize, Clone, Default)]
pub struct ProxyParams {
    /// Address or hostname of the proxy.
    #[serde(default)]
    pub ip: String,
    /// Port of the proxy.
    #[serde(default)]
    pub port: Option<u32>,
    /// Present if this is an HTTP CONNECT proxy.
    #[serde(default, rename = "httpProxy", alias = "httpproxy", alias = "http_proxy")]
    pub http_proxy: Option<bool>,
    /// Present if this is a SOCKS proxy; gives the protocol version.
    #[serde(default, rename = "socksType", alias = "sockstype", alias = "socks_type")]
    pub socks_type: Option<u8>,
    /// Username to authenticate with, if any.
    #[serde(default)]
    pub username: Option<String>,
    /// Password to authenticate with, if any.
    #[serde(default)]
    pub password: Option<String>,
    /// Handshake timeout in seconds, possibly fractional.  Zero or absent
    /// means the default.
    #[serde(default)]
    pub timeout: Option<f64>,
    /// Present if this describes an MTProto proxy.
    #[serde(default, rename = "MTProxy", alias = "mtproxy", alias = "mt_proxy")]
    pub mt_proxy: Option<bool>,
    /// Secret for an MTProto proxy.  Never used here.
    #[serde(default)]
    pub secret: Option<String>,
}

impl ProxyParams {
    /// Describe an HTTP CONNECT proxy at `ip`:`port`.
    pub fn http(ip: impl Into<String>, port: u32) -> Self {
        ProxyParams {
            ip: ip.into(),
            port: Some(port),
            http_proxy: Some(true),
            ..Default::default()
        }
    }

    /// Describe a SOCKS proxy at `ip`:`port`, speaking `socks_type`.
    pub fn socks(ip: impl Into<String>, port: u32, socks_type: u8) -> Self {
        ProxyParams {
            ip: ip.into(),
            port: Some(port),
            socks_type: Some(socks_type),
            ..Default::default()
        }
    }

    /// Describe an MTProto proxy.
    pub fn mtproxy(ip: impl Into<String>, port: u32, secret: impl Into<String>) -> Self {
        ProxyParams {
            ip: ip.into(),
            port: Some(port),
            mt_proxy: Some(true),
            secret: Some(secret.into()),
            ..Default::default()
        }
    }

    /// Set the credentials to use with this proxy.
    pub fn with_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set the handshake timeout, in seconds.
    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout = Some(seconds);
        self
    }

    /// Check these parameters, and convert them into a [`ProxyConfig`].
    ///
    /// Parameters that describe a proxy family we don't handle (an
    /// MTProto proxy, or no recognizable marker at all) become
    /// [`ProxyConfig::None`] rather than an error.
    pub fn validate(&self) -> Result<ProxyConfig> {
        if self.mt_proxy.is_some() {
            return Ok(ProxyConfig::None);
        }
        if self.http_proxy.is_some() {
            let (host, port) = self.endpoint()?;
            return Ok(ProxyConfig::Http(HttpProxy {
                host,
                port,
                username: self.username.clone(),
                password: self.password.clone(),
                timeout: timeout_from_secs(self.timeout)?,
            }));
        }
        if let Some(socks_type) = self.socks_type {
            let (host, port) = self.endpoint()?;
            let version = SocksVersion::try_from(socks_type)?;
            return Ok(ProxyConfig::Socks(SocksProxy {
                host,
                port,
                version,
                username: self.username.clone(),
                password: self.password.clone(),
                timeout: timeout_from_secs(self.timeout)?,
            }));
        }
        Ok(ProxyConfig::None)
    }

    /// Return the checked host and port of this proxy.
    fn endpoint(&self) -> Result<(String, u16)> {
        let host = self.ip.trim();
        if host.is_empty() {
            return Err(Error::MissingHost);
        }
        let port = match self.port {
            None => return Err(Error::MissingPort),
            Some(p) => u16::try_from(p)
                .ok()
                .filter(|p| *p != 0)
                .ok_or(Error::InvalidPort(p))?,
        };
        Ok((host.to_string(), port))
    }
}

impl fmt::Debug for ProxyParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyParams")
            .field("ip", &self.ip)
            .field("port", &self.port)
            .field("http_proxy", &self.http_proxy)
            .field("socks_type", &self.socks_type)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("mt_proxy", &self.mt_proxy)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Convert an optional timeout in seconds into a Duration.
fn timeout_from_secs(secs: Option<f64>) -> Result<Duration> {
    match secs {
        None => Ok(DEFAULT_TIMEOUT),
        Some(s) if !s.is_finite() || s < 0.0 || s > u32::MAX as f64 => {
            Err(Error::InvalidTimeout(s))
        }
        Some(s) if s == 0.0 => Ok(DEFAULT_TIMEOUT),
        Some(s) => Ok(Duration::from_secs_f64(s)),
    }
}

/// A checked proxy configuration.
///
/// Once built, this never changes.  The host of any proxy is non-empty,
/// and its port is nonzero.
#[derive(Clone, PartialEq, Eq)]
pub enum ProxyConfig {
    /// Connect directly to the target.
    None,
    /// Connect through a SOCKS proxy.
    Socks(SocksProxy),
    /// Connect through an HTTP proxy, using the CONNECT method.
    Http(HttpProxy),
}

impl Default for ProxyConfig {
    fn default() -> Self {
        ProxyConfig::None
    }
}

impl ProxyConfig {
    /// Build a configuration from optional raw parameters.
    ///
    /// No parameters at all means a direct connection.
    pub fn from_params(params: Option<&ProxyParams>) -> Result<Self> {
        match params {
            Some(p) => p.validate(),
            None => Ok(ProxyConfig::None),
        }
    }

    /// Return true if this configuration connects directly.
    pub fn is_direct(&self) -> bool {
        matches!(self, ProxyConfig::None)
    }
}

impl fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyConfig::None => write!(f, "None"),
            ProxyConfig::Socks(s) => f.debug_tuple("Socks").field(s).finish(),
            ProxyConfig::Http(h) => f.debug_tuple("Http").field(h).finish(),
        }
    }
}

/// Settings for a SOCKS proxy.
#[derive(Clone, PartialEq, Eq)]
pub struct SocksProxy {
    /// Proxy hostname or address.
    host: String,
    /// Proxy port.
    port: u16,
    /// Protocol version to speak.
    version: SocksVersion,
    /// Username (SOCKS5) or user id (SOCKS4).
    username: Option<String>,
    /// Password (SOCKS5 only).
    password: Option<String>,
    /// Deadline for the whole dial.
    timeout: Duration,
}

impl SocksProxy {
    /// Return the hostname or address of the proxy.
    pub fn host(&self) -> &str {
        &self.host
    }
    /// Return the port of the proxy.
    pub fn port(&self) -> u16 {
        self.port
    }
    /// Return the SOCKS version to use.
    pub fn version(&self) -> SocksVersion {
        self.version
    }
    /// Return the configured username, if any.
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }
    /// Return the configured password, if any.
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }
    /// Return the deadline for dialing through this proxy.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl fmt::Debug for SocksProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocksProxy")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("version", &self.version)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Settings for an HTTP CONNECT proxy.
#[derive(Clone, PartialEq, Eq)]
pub struct HttpProxy {
    /// Proxy hostname or address.
    host: String,
    /// Proxy port.
    port: u16,
    /// Username for Basic authentication.
    username: Option<String>,
    /// Password for Basic authentication.
    password: Option<String>,
    /// Deadline for the whole handshake.
    timeout: Duration,
}

impl HttpProxy {
    /// Return the hostname or address of the proxy.
    pub fn host(&self) -> &str {
        &self.host
    }
    /// Return the port of the proxy.
    pub fn port(&self) -> u16 {
        self.port
    }
    /// Return the configured username, if any.
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }
    /// Return the deadline for the CONNECT handshake.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Return the base64-encoded `username:password` pair to put in a
    /// `Proxy-Authorization: Basic` header.
    ///
    /// Only returns a value when both halves are present and non-empty.
    pub fn basic_auth(&self) -> Option<String> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(u), Some(p)) if !u.is_empty() && !p.is_empty() => {
                let creds = format!("{}:{}", u, p);
                Some(base64::engine::general_purpose::STANDARD.encode(creds.as_bytes()))
            }
            _ => None,
        }
    }
}

impl fmt::Debug for HttpProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpProxy")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn socks_versions() {
        assert_eq!(SocksVersion::try_from(4).unwrap(), SocksVersion::V4);
        assert_eq!(SocksVersion::try_from(5).unwrap(), SocksVersion::V5);
        assert!(matches!(
            SocksVersion::try_from(0),
            Err(Error::MissingSocksVersion)
        ));
        assert!(matches!(
            SocksVersion::try_from(6),
            Err(Error::UnsupportedSocksVersion(6))
        ));
        assert_eq!(SocksVersion::V5.to_string(), "socks5");
    }

    #[test]
    fn timeouts() {
        assert_eq!(timeout_from_secs(None).unwrap(), DEFAULT_TIMEOUT);
        assert_eq!(timeout_from_secs(Some(0.0)).unwrap(), DEFAULT_TIMEOUT);
        assert_eq!(
            timeout_from_secs(Some(10.0)).unwrap(),
            Duration::from_secs(10)
        );
        assert_eq!(
            timeout_from_secs(Some(1.5)).unwrap(),
            Duration::from_millis(1500)
        );
        for bad in &[-1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                timeout_from_secs(Some(*bad)),
                Err(Error::InvalidTimeout(_))
            ));
        }
    }

    #[test]
    fn ports() {
        let e = ProxyParams::http("10.0.0.1", 0).validate();
        assert!(matches!(e, Err(Error::InvalidPort(0))));
        let e = ProxyParams::http("10.0.0.1", 70000).validate();
        assert!(matches!(e, Err(Error::InvalidPort(70000))));
        let mut p = ProxyParams::http("10.0.0.1", 80);
        p.port = None;
        assert!(matches!(p.validate(), Err(Error::MissingPort)));

        let ok = ProxyParams::http("10.0.0.1", 65535).validate().unwrap();
        match ok {
            ProxyConfig::Http(h) => assert_eq!(h.port(), 65535),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn basic_auth() {
        let cfg = ProxyParams::http("proxy.example.com", 8080)
            .with_auth("user", "pass")
            .validate()
            .unwrap();
        let h = match cfg {
            ProxyConfig::Http(h) => h,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(h.basic_auth().as_deref(), Some("dXNlcjpwYXNz"));

        let mut p = ProxyParams::http("proxy.example.com", 8080);
        p.username = Some("user".into());
        let h = match p.validate().unwrap() {
            ProxyConfig::Http(h) => h,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(h.basic_auth(), None);
    }

    #[test]
    fn debug_redacts() {
        let p = ProxyParams::socks("127.0.0.1", 1080, 5).with_auth("alice", "hunter2");
        let cfg = p.validate().unwrap();
        assert!(!format!("{:?}", p).contains("hunter2"));
        assert!(!format!("{:?}", cfg).contains("hunter2"));
        assert!(format!("{:?}", cfg).contains("alice"));
    }

    #[test]
    fn http_wins_over_socks() {
        let mut p = ProxyParams::http("127.0.0.1", 3128);
        p.socks_type = Some(5);
        assert!(matches!(p.validate().unwrap(), ProxyConfig::Http(_)));
    }
}
