//! Declare configuration errors.

use thiserror::Error;

/// An error found while checking or loading a proxy configuration.
///
/// Every variant here means the configuration was rejected before any
/// connection was attempted.
#[derive(Error, Debug)]
pub enum Error {
    /// The proxy host was missing or empty.
    #[error("invalid proxy params: missing proxy host")]
    MissingHost,

    /// No port was given for the proxy.
    #[error("invalid proxy params: missing proxy port")]
    MissingPort,

    /// The proxy port was outside of 1..=65535.
    #[error("invalid proxy params: port {0} is out of range")]
    InvalidPort(u32),

    /// A SOCKS proxy was requested without saying which version.
    #[error("invalid SOCKS proxy params: missing socksType")]
    MissingSocksVersion,

    /// A SOCKS proxy was requested with a version we don't speak.
    #[error("invalid SOCKS proxy params: unsupported socksType {0}")]
    UnsupportedSocksVersion(u8),

    /// The proxy timeout was negative, not a number, or absurdly large.
    #[error("invalid proxy params: bad timeout {0}")]
    InvalidTimeout(f64),

    /// We couldn't read or merge a configuration source.
    #[error("couldn't load configuration: {0}")]
    Load(#[from] config::ConfigError),
}
