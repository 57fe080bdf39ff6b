//! The buffered socket type itself.

use crate::reactor;
use crate::shared::{Readiness, Shared, SocketState, Waiter};
use crate::{Error, Result};

use bytes::{Bytes, BytesMut};
use futures::channel::mpsc;
use proxsock_config::{ProxyConfig, ProxyParams};
use proxsock_dial::{Dialer, ProxyDialer};
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// A byte-stream socket with buffered, awaitable reads.
///
/// A `PromisedSocket` is built once with an (optional) proxy
/// configuration, then [connected](PromisedSocket::connect) to a target.
/// Everything the transport delivers is appended to a receive buffer;
/// reads take bytes from the front of that buffer, and suspend while it
/// is empty.
///
/// Only one read can be in flight at a time: all the read methods take
/// `&mut self`.  To close the socket from elsewhere while a read is
/// pending, use a [`CloseHandle`].
///
/// Once a connection is closed it stays closed; nothing on it can be read
/// or written any more.  A socket whose `connect` failed is closed too,
/// and should be thrown away.
pub struct PromisedSocket {
    /// How we open transports.
    dialer: Arc<dyn Dialer>,
    /// The current connection, if we ever opened one.
    conn: Option<Connection>,
}

/// Per-connection state held by the socket.
struct Connection {
    /// State shared with the reactor tasks.
    shared: Arc<Shared>,
    /// The receiver for the currently installed waiter, if we hold it.
    canread: Option<Waiter>,
    /// Queue of outbound data for the writer task.
    outbound: mpsc::UnboundedSender<Bytes>,
    /// The task reading from the transport, until we've waited for it.
    reader: Option<JoinHandle<()>>,
    /// The task writing to the transport, until we've waited for it.
    writer: Option<JoinHandle<()>>,
}

/// A handle that can close a [`PromisedSocket`] from another task.
///
/// Closing through a handle wakes a pending read with
/// [`Error::Closed`].  A handle outliving its connection does nothing.
#[derive(Clone, Debug)]
pub struct CloseHandle {
    /// The connection to close.
    shared: Weak<Shared>,
}

impl CloseHandle {
    /// Close the connection this handle belongs to.
    pub fn close(&self) {
        if let Some(shared) = self.shared.upgrade() {
            debug!("Closing socket through handle");
            shared.request_close();
        }
    }
}

/// Wait for `waiter` to fire, and report whether data may be available.
async fn wait_readable(waiter: Waiter) -> Result<()> {
    match waiter.await {
        Ok(Readiness::Readable) => Ok(()),
        // A dropped sender means the transport went away.
        Ok(Readiness::Closed) | Err(_) => Err(Error::Closed),
    }
}

impl PromisedSocket {
    /// Construct a new socket that will connect as `proxy` says.
    ///
    /// With `None`, connections are direct.  Malformed proxy parameters
    /// are rejected here, before any connection is attempted.
    pub fn new(proxy: Option<&ProxyParams>) -> Result<Self> {
        let config = ProxyConfig::from_params(proxy)?;
        Ok(Self::with_config(config))
    }

    /// Construct a new socket from an already validated configuration.
    pub fn with_config(config: ProxyConfig) -> Self {
        Self::with_dialer(ProxyDialer::new(config))
    }

    /// Construct a new socket that opens transports with `dialer`.
    pub fn with_dialer<D: Dialer + 'static>(dialer: D) -> Self {
        PromisedSocket {
            dialer: Arc::new(dialer),
            conn: None,
        }
    }

    /// Connect to `host`:`port`.
    ///
    /// The receive buffer starts out empty (or holding whatever the proxy
    /// sent past its handshake).  If this socket already had a
    /// connection, that connection is closed first.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn connect(&mut self, port: u16, host: &str) -> Result<()> {
        if let Some(old) = self.conn.take() {
            debug!("Replacing existing connection");
            old.shared.request_close();
        }

        let transport = self.dialer.dial(host, port).await?;
        let (stream, prefix) = transport.into_parts();
        if !prefix.is_empty() {
            debug!("{} bytes arrived with the handshake", prefix.len());
        }

        let (shared, canread) = Shared::new(prefix);
        let (rd, wr) = tokio::io::split(stream);
        let (outbound, outbound_rx) = mpsc::unbounded();

        let reader = tokio::spawn(reactor::run_reader(
            Arc::clone(&shared),
            rd,
            shared.subscribe(),
        ));
        let writer = tokio::spawn(reactor::run_writer(
            Arc::clone(&shared),
            wr,
            outbound_rx,
            shared.subscribe(),
        ));

        self.conn = Some(Connection {
            shared,
            canread: Some(canread),
            outbound,
            reader: Some(reader),
            writer: Some(writer),
        });
        info!("Socket connected to {}:{}", host, port);
        Ok(())
    }

    /// Return the current connection, or an error if it is closed.
    fn open_conn(&mut self) -> Result<&mut Connection> {
        let conn = self.conn.as_mut().ok_or(Error::Closed)?;
        if conn.shared.lock()?.is_closed() {
            return Err(Error::Closed);
        }
        Ok(conn)
    }

    /// Read up to `n` bytes.
    ///
    /// If anything is buffered, return at once with as much of it as fits
    /// in `n` bytes.  Otherwise wait until something arrives.  This never
    /// waits for a full `n` bytes; use
    /// [`read_exactly`](PromisedSocket::read_exactly) for that.
    ///
    /// Fails with [`Error::Closed`] if the socket is closed, or closes
    /// while we wait.
    pub async fn read(&mut self, n: usize) -> Result<Bytes> {
        let conn = self.open_conn()?;
        loop {
            let waiter = {
                let mut inner = conn.shared.lock()?;
                if inner.is_closed() {
                    return Err(Error::Closed);
                }
                if inner.buffered() > 0 || n == 0 {
                    let data = inner.take(n);
                    conn.shared.wake_reader();
                    if inner.buffered() == 0 {
                        conn.canread = Some(inner.fresh_waiter());
                    }
                    return Ok(data);
                }
                match conn.canread.take() {
                    Some(waiter) => waiter,
                    None => inner.fresh_waiter(),
                }
            };
            wait_readable(waiter).await?;
        }
    }

    /// Read exactly `n` bytes, waiting as long as it takes.
    ///
    /// Fails with [`Error::Closed`] if the socket closes first; the bytes
    /// collected so far are lost.
    pub async fn read_exactly(&mut self, n: usize) -> Result<Bytes> {
        self.open_conn()?;
        let mut collected = BytesMut::with_capacity(n);
        while collected.len() < n {
            let chunk = self.read(n - collected.len()).await?;
            collected.extend_from_slice(&chunk);
        }
        Ok(collected.freeze())
    }

    /// Return everything in the receive buffer, waiting for data if the
    /// buffer is empty.
    pub async fn read_all(&mut self) -> Result<Bytes> {
        let conn = self.open_conn()?;
        loop {
            let waiter = {
                let mut inner = conn.shared.lock()?;
                if inner.is_closed() {
                    return Err(Error::Closed);
                }
                if inner.buffered() > 0 {
                    let data = inner.take_all();
                    conn.shared.wake_reader();
                    conn.canread = Some(inner.fresh_waiter());
                    return Ok(data);
                }
                match conn.canread.take() {
                    Some(waiter) => waiter,
                    None => inner.fresh_waiter(),
                }
            };
            wait_readable(waiter).await?;
        }
    }

    /// Queue `data` to be sent on the transport.
    ///
    /// This doesn't wait for the data to be written.  If the write later
    /// fails, the socket is closed and the failure shows up on the next
    /// operation.
    pub fn write(&self, data: &[u8]) -> Result<()> {
        let conn = self.conn.as_ref().ok_or(Error::Closed)?;
        if conn.shared.lock()?.is_closed() {
            return Err(Error::Closed);
        }
        conn.outbound
            .unbounded_send(Bytes::copy_from_slice(data))
            .map_err(|_| Error::Closed)
    }

    /// Close this socket and tear down its transport.
    ///
    /// Closing a socket that is already closed does nothing.
    pub async fn close(&mut self) {
        if let Some(conn) = self.conn.as_mut() {
            debug!("Closing socket");
            conn.shared.request_close();
            conn.outbound.close_channel();
            conn.canread = None;
            // The tasks can only fail by panicking, which we can't help.
            if let Some(reader) = conn.reader.take() {
                let _ignore = reader.await;
            }
            if let Some(writer) = conn.writer.take() {
                let _ignore = writer.await;
            }
        }
    }

    /// Return a handle that can close the current connection from
    /// another task.
    pub fn close_handle(&self) -> Result<CloseHandle> {
        let conn = self.conn.as_ref().ok_or(Error::Closed)?;
        Ok(CloseHandle {
            shared: Arc::downgrade(&conn.shared),
        })
    }

    /// Return the current state of this socket.
    pub fn state(&self) -> SocketState {
        match &self.conn {
            Some(conn) => match conn.shared.lock() {
                Ok(inner) => inner.state(),
                Err(_) => SocketState::Closed,
            },
            None => SocketState::Closed,
        }
    }

    /// Return true if this socket is closed.
    pub fn is_closed(&self) -> bool {
        self.state() == SocketState::Closed
    }

    /// Return the number of bytes received and not yet read.
    pub fn buffered(&self) -> usize {
        match &self.conn {
            Some(conn) => conn.shared.lock().map(|i| i.buffered()).unwrap_or(0),
            None => 0,
        }
    }
}

impl Drop for PromisedSocket {
    fn drop(&mut self) {
        if let Some(conn) = &self.conn {
            conn.shared.request_close();
        }
    }
}

impl fmt::Debug for PromisedSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromisedSocket")
            .field("state", &self.state())
            .field("buffered", &self.buffered())
            .finish()
    }
}
