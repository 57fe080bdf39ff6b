//! A byte-stream socket with promise-style buffered reads.
//!
//! # Overview
//!
//! [`PromisedSocket`] hides how a connection was made (directly, through a
//! SOCKS proxy, or through an HTTP CONNECT tunnel) and gives its caller a
//! small buffered API:
//!
//!  * [`read(n)`](PromisedSocket::read) returns up to `n` bytes,
//!    waiting only while nothing at all is buffered.
//!  * [`read_exactly(n)`](PromisedSocket::read_exactly) waits for
//!    exactly `n` bytes.
//!  * [`read_all()`](PromisedSocket::read_all) drains the buffer.
//!  * [`write(bytes)`](PromisedSocket::write) queues bytes to send, and
//!    doesn't wait.
//!  * [`close()`](PromisedSocket::close) tears the transport down.
//!
//! Behind the socket, a reactor task owns the read half of the transport
//! and appends whatever arrives to a shared buffer, waking the reader if
//! one is waiting.  Another task owns the write half.
//!
//! # Limitations
//!
//! There is exactly one reader.  Reads borrow the socket mutably, so two
//! overlapping reads can't be expressed.
//!
//! The receive buffer holds at most [`MAX_BUFFERED`] bytes.  Once it is
//! full the socket stops reading from its transport until the caller
//! reads, so a slow caller slows the peer down instead of using unbounded
//! memory.
//!
//! # Example
//!
//! ```no_run
//! # async fn demo() -> proxsock_socket::Result<()> {
//! use proxsock_config::ProxyParams;
//! use proxsock_socket::PromisedSocket;
//!
//! let proxy = ProxyParams::http("10.0.0.1", 3128).with_auth("user", "secret");
//! let mut sock = PromisedSocket::new(Some(&proxy))?;
//! sock.connect(443, "example.com").await?;
//! sock.write(b"hello")?;
//! let reply = sock.read_exactly(5).await?;
//! sock.close().await;
//! # let _ = reply;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]

mod err;
mod reactor;
mod shared;
mod socket;

pub use err::{Error, ErrorKind};
pub use shared::{SocketState, MAX_BUFFERED};
pub use socket::{CloseHandle, PromisedSocket};

/// A Result as returned by this crate.
pub type Result<T> = std::result::Result<T, Error>;
