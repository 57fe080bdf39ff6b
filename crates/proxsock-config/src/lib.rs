//! Configuration for proxsock sockets.
//!
//! A socket may reach its target directly, through a SOCKS proxy, or
//! through an HTTP proxy using the CONNECT method.  This crate holds the
//! types that describe that choice, checks them, and loads them from
//! toml files using the `serde` and `config` crates.
//!
//! Checking happens once, when a [`ProxyConfig`] is built: a proxy with
//! an empty host, a bad port, or an unknown SOCKS version is rejected
//! before any connection is attempted.

#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]

mod cmdline;
mod err;
mod proxy;

pub use cmdline::Overrides;
pub use err::Error;
pub use proxy::{HttpProxy, ProxyConfig, ProxyParams, SocksProxy, SocksVersion, DEFAULT_TIMEOUT};

use std::path::{Path, PathBuf};

/// A Result as returned by this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Merge a set of toml files and command-line overrides into `cfg`.
///
/// If `files` is empty and `default_path` is given, the default file is
/// used if it exists.  Explicitly listed files must exist.
pub fn load<'a, P1, C1, P2, C2>(
    cfg: &mut config::Config,
    default_path: Option<P1>,
    files: C1,
    overrides: C2,
) -> Result<()>
where
    P1: AsRef<Path> + 'a,
    C1: IntoIterator<Item = &'a P2>,
    P2: AsRef<Path> + 'a + ?Sized,
    C2: IntoIterator,
    C2::Item: AsRef<str>,
{
    let mut search: Vec<(&Path, bool)> = files.into_iter().map(|p| (p.as_ref(), true)).collect();
    if search.is_empty() {
        if let Some(p) = &default_path {
            search.push((p.as_ref(), false));
        }
    }

    for (path, required) in search {
        let f: config::File<_> = path.into();
        cfg.merge(f.format(config::FileFormat::Toml).required(required))?;
    }

    let mut cmdline = Overrides::new();
    for line in overrides {
        cmdline.push(line.as_ref());
    }
    if !cmdline.is_empty() {
        cfg.merge(cmdline)?;
    }
    Ok(())
}

/// Return a filename for the default user configuration file.
pub fn default_config_file() -> Option<PathBuf> {
    let dirs = directories::ProjectDirs::from("org", "proxsock", "proxsock")?;
    Some(dirs.config_dir().join("proxsock.toml"))
}
