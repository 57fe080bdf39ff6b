//! State shared between a socket and its reactor tasks.
//!
//! The receive buffer has one producer (the reader task) and one consumer
//! (whichever read call is active).  Both sides only touch it while
//! holding the lock, and appending a chunk and waking the waiter happen
//! under the same lock acquisition.
//!
//! The buffer holds at most [`MAX_BUFFERED`] bytes.  At that point the
//! reader task stops reading from the transport until a read drains some
//! of it, so a peer that keeps sending is held back by flow control.

use crate::Result;

use bytes::{Bytes, BytesMut};
use futures::channel::oneshot;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::futures::Notified;
use tokio::sync::{watch, Notify};
use tracing::trace;

/// The most bytes a socket will buffer before it stops reading from its
/// transport.
pub const MAX_BUFFERED: usize = 1 << 20;

/// The externally visible state of a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    /// Not connected: either never connected, or closed.  Once a
    /// connection is closed it stays closed.
    Closed,
    /// Connected and streaming.
    Open,
}

/// What a pending reader is woken up with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Readiness {
    /// New bytes are in the buffer.
    Readable,
    /// The transport went away.
    Closed,
}

/// The receiving end of a single-slot wakeup.
pub(crate) type Waiter = oneshot::Receiver<Readiness>;

/// Everything guarded by the lock in [`Shared`].
pub(crate) struct Inner {
    /// Bytes received and not yet consumed.
    buffer: BytesMut,
    /// Whether the connection is still usable.
    state: SocketState,
    /// The sending half of the current waiter, if one is installed.
    waiter: Option<oneshot::Sender<Readiness>>,
}

impl Inner {
    /// Return true if this connection is closed.
    pub(crate) fn is_closed(&self) -> bool {
        self.state == SocketState::Closed
    }

    /// Return the current state.
    pub(crate) fn state(&self) -> SocketState {
        self.state
    }

    /// Return the number of bytes waiting to be read.
    pub(crate) fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Remove and return up to `n` bytes from the front of the buffer.
    pub(crate) fn take(&mut self, n: usize) -> Bytes {
        let n = std::cmp::min(n, self.buffer.len());
        self.buffer.split_to(n).freeze()
    }

    /// Remove and return everything in the buffer.
    pub(crate) fn take_all(&mut self) -> Bytes {
        self.buffer.split().freeze()
    }

    /// Install a new waiter, replacing any old one, and return its
    /// receiving end.
    pub(crate) fn fresh_waiter(&mut self) -> Waiter {
        let (snd, rcv) = oneshot::channel();
        self.waiter = Some(snd);
        rcv
    }

    /// Wake the current waiter, if any, and clear the slot.
    fn wake(&mut self, why: Readiness) {
        if let Some(snd) = self.waiter.take() {
            // Nobody may be listening; that's fine.
            let _ignore = snd.send(why);
        }
    }
}

/// State for one connection, shared by the socket and its reactor.
pub(crate) struct Shared {
    /// Buffer, state, and waiter slot.
    ///
    /// (This is a blocking mutex close to async code.  It must never be
    /// held while an await is happening.)
    inner: Mutex<Inner>,
    /// Set to true when someone asks for the transport to be torn down.
    shutdown: watch::Sender<bool>,
    /// Signalled whenever a read takes bytes out of the buffer.
    drained: Notify,
}

impl Shared {
    /// Create state for a freshly opened connection whose buffer starts
    /// with `prefix`.  Return it along with the first waiter.
    pub(crate) fn new(prefix: Vec<u8>) -> (Arc<Self>, Waiter) {
        let (shutdown, _) = watch::channel(false);
        let mut inner = Inner {
            buffer: BytesMut::from(&prefix[..]),
            state: SocketState::Open,
            waiter: None,
        };
        let waiter = inner.fresh_waiter();
        let shared = Shared {
            inner: Mutex::new(inner),
            shutdown,
            drained: Notify::new(),
        };
        (Arc::new(shared), waiter)
    }

    /// Lock the shared state.
    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        Ok(self.inner.lock()?)
    }

    /// Lock the shared state, even if another thread panicked with it
    /// held.
    fn lock_anyway(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Return a receiver that sees close requests made after this call.
    pub(crate) fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Return a future that resolves once a read has taken bytes from the
    /// buffer.
    ///
    /// A drain that happened since the last call also counts, so the reader
    /// task can't miss one that races with its check of the buffer size.
    pub(crate) fn drained(&self) -> Notified<'_> {
        self.drained.notified()
    }

    /// Tell the reader task that the buffer may have room again.
    pub(crate) fn wake_reader(&self) {
        self.drained.notify_one();
    }

    /// Append a chunk from the transport and wake the waiter.
    pub(crate) fn deliver(&self, chunk: &[u8]) -> Result<()> {
        let mut inner = self.lock()?;
        inner.buffer.extend_from_slice(chunk);
        trace!("{} bytes buffered", inner.buffer.len());
        inner.wake(Readiness::Readable);
        Ok(())
    }

    /// Mark the socket closed and ask the reactor to tear the transport
    /// down.
    ///
    /// This does not wake a pending reader; that happens once the
    /// transport is actually gone.
    pub(crate) fn request_close(&self) {
        self.lock_anyway().state = SocketState::Closed;
        let _ignore = self.shutdown.send(true);
    }

    /// Record that the transport has been torn down, and wake any pending
    /// reader with [`Readiness::Closed`].
    pub(crate) fn torn_down(&self) {
        let mut inner = self.lock_anyway();
        inner.state = SocketState::Closed;
        inner.wake(Readiness::Closed);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use futures::FutureExt;

    #[test]
    fn prefix_is_buffered() {
        let (shared, _w) = Shared::new(b"abc".to_vec());
        let mut inner = shared.lock().unwrap();
        assert_eq!(inner.buffered(), 3);
        assert_eq!(inner.state(), SocketState::Open);
        assert_eq!(&inner.take(2)[..], b"ab");
        assert_eq!(&inner.take(10)[..], b"c");
        assert_eq!(inner.buffered(), 0);
        assert!(inner.take(1).is_empty());
    }

    #[test]
    fn deliver_wakes_once() {
        let (shared, waiter) = Shared::new(Vec::new());
        shared.deliver(b"one").unwrap();
        assert_eq!(waiter.now_or_never(), Some(Ok(Readiness::Readable)));

        // The slot was cleared: a second delivery has nobody to wake.
        shared.deliver(b"two").unwrap();
        let mut inner = shared.lock().unwrap();
        assert!(inner.waiter.is_none());
        assert_eq!(&inner.take_all()[..], b"onetwo");
    }

    #[test]
    fn close_wakes_only_on_teardown() {
        let (shared, mut waiter) = Shared::new(Vec::new());
        let shutdown = shared.subscribe();

        shared.request_close();
        assert!(shared.lock().unwrap().is_closed());
        assert!(*shutdown.borrow());
        assert_eq!(waiter.try_recv(), Ok(None));

        shared.torn_down();
        assert_eq!(waiter.now_or_never(), Some(Ok(Readiness::Closed)));
    }

    #[test]
    fn drain_before_wait_is_remembered() {
        let (shared, _w) = Shared::new(Vec::new());
        assert!(shared.drained().now_or_never().is_none());

        shared.wake_reader();
        assert!(shared.drained().now_or_never().is_some());
        // The permit was used up.
        assert!(shared.drained().now_or_never().is_none());
    }
}
