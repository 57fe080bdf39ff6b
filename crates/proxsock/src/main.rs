//! A command-line client for proxsock sockets.
//!
//! Connects to a host (directly, or through whatever proxy the
//! configuration names), optionally sends a payload, and prints what
//! comes back.

#![warn(missing_docs)]

use std::time::Duration;

use proxsock_config::ProxyParams;
use proxsock_socket::PromisedSocket;

use anyhow::{Context, Result};
use argh::FromArgs;
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(FromArgs, Debug, Clone)]
/// Connect to HOST:PORT, directly or through a proxy, and print the first
/// bytes it sends back.
struct Args {
    /// override the default location(s) for the configuration file
    #[argh(option, short = 'f')]
    rc: Vec<String>,
    /// override a configuration option (uses toml syntax)
    #[argh(option, short = 'c')]
    cfg: Vec<String>,
    /// text to send once connected
    #[argh(option)]
    payload: Option<String>,
    /// host to connect to
    #[argh(positional)]
    host: String,
    /// port to connect to
    #[argh(positional)]
    port: u16,
}

/// Default options to use for our configuration.
const PROXSOCK_DEFAULTS: &str = include_str!("./proxsock_defaults.toml");

/// Structure to hold our configuration options, whether from a
/// configuration file or the command line.
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Whether to log at trace level.
    trace: bool,
    /// How many bytes to read back; 0 means whatever arrives first.
    read_bytes: usize,
    /// How long to wait for a reply, in seconds.
    read_timeout: u64,
    /// The proxy to connect through, if any.
    proxy: Option<ProxyParams>,
}

/// Build a configuration from the defaults, files, and overrides.
fn load_config(args: &Args) -> Result<ClientConfig> {
    let mut cfg = config::Config::new();
    cfg.merge(config::File::from_str(
        PROXSOCK_DEFAULTS,
        config::FileFormat::Toml,
    ))?;
    proxsock_config::load(
        &mut cfg,
        proxsock_config::default_config_file(),
        &args.rc,
        &args.cfg,
    )?;
    Ok(cfg.try_into()?)
}

/// Connect, send the payload, and return what came back.
async fn fetch(config: &ClientConfig, args: &Args) -> Result<Vec<u8>> {
    let mut sock =
        PromisedSocket::new(config.proxy.as_ref()).context("Invalid proxy configuration")?;
    sock.connect(args.port, &args.host)
        .await
        .with_context(|| format!("Couldn't connect to {}:{}", args.host, args.port))?;

    if let Some(payload) = &args.payload {
        sock.write(payload.as_bytes())?;
    }

    let wait = Duration::from_secs(config.read_timeout);
    let reply = if config.read_bytes == 0 {
        tokio::time::timeout(wait, sock.read_all()).await
    } else {
        tokio::time::timeout(wait, sock.read_exactly(config.read_bytes)).await
    };
    sock.close().await;

    match reply {
        Ok(r) => Ok(r.context("Connection closed before a reply")?.to_vec()),
        Err(_) => {
            warn!("No reply within {} seconds", config.read_timeout);
            Ok(Vec::new())
        }
    }
}

fn main() -> Result<()> {
    let args: Args = argh::from_env();
    let config = load_config(&args)?;

    let filt = if config.trace { "trace" } else { "debug" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filt));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &config.proxy {
        Some(p) => info!("Using proxy {:?}", p),
        None => info!("Connecting directly"),
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let reply = runtime.block_on(fetch(&config, &args))?;
    println!("{}", String::from_utf8_lossy(&reply));
    Ok(())
}
