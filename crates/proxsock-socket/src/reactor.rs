//! Background tasks that move bytes between a transport and a socket.
//!
//! Each connection gets two tasks.  The reader owns the read half: it
//! appends every chunk to the shared buffer and wakes the waiting reader,
//! pausing while the buffer is full.
//! The writer owns the write half and drains the outbound queue in
//! order.  Either one stops as soon as a close is requested.

use crate::shared::{Shared, MAX_BUFFERED};

use bytes::Bytes;
use futures::channel::mpsc;
use futures::StreamExt;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tracing::{debug, trace, warn};

/// How many bytes we try to read from the transport at a time.
const READ_CHUNK_LEN: usize = 16 * 1024;

/// Read from `rd` into `shared` until EOF, an error, or a close request.
///
/// When this returns the socket is closed and any pending reader has been
/// told so.
pub(crate) async fn run_reader<R>(
    shared: Arc<Shared>,
    mut rd: R,
    mut shutdown: watch::Receiver<bool>,
) where
    R: AsyncRead + Unpin,
{
    let mut chunk = vec![0_u8; READ_CHUNK_LEN];
    loop {
        let room = match shared.lock() {
            Ok(inner) => MAX_BUFFERED.saturating_sub(inner.buffered()),
            Err(e) => {
                warn!("Couldn't check receive buffer: {}", e);
                break;
            }
        };
        if room == 0 {
            trace!("Receive buffer full; pausing");
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    debug!("Close requested; dropping transport");
                    break;
                }
                _ = shared.drained() => continue,
            }
        }
        let want = std::cmp::min(room, chunk.len());
        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                debug!("Close requested; dropping transport");
                break;
            }
            res = rd.read(&mut chunk[..want]) => match res {
                Ok(0) => {
                    debug!("Peer closed the connection");
                    break;
                }
                Ok(n) => {
                    trace!("Received {} bytes", n);
                    if let Err(e) = shared.deliver(&chunk[..n]) {
                        warn!("Couldn't buffer received data: {}", e);
                        break;
                    }
                }
                Err(e) => {
                    debug!("Read from transport failed: {}", e);
                    break;
                }
            }
        }
    }
    shared.torn_down();
}

/// Write every chunk from `outbound` to `wr`, in order.
///
/// On a write error the socket is closed.  If the queue ends normally
/// (because the socket was dropped) the write half is shut down cleanly.
pub(crate) async fn run_writer<W>(
    shared: Arc<Shared>,
    mut wr: W,
    mut outbound: mpsc::UnboundedReceiver<Bytes>,
    mut shutdown: watch::Receiver<bool>,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let data = tokio::select! {
            biased;
            _ = shutdown.changed() => return,
            msg = outbound.next() => match msg {
                Some(data) => data,
                None => break,
            },
        };
        let res = tokio::select! {
            biased;
            _ = shutdown.changed() => return,
            res = wr.write_all(&data) => res,
        };
        match res {
            Ok(()) => trace!("Sent {} bytes", data.len()),
            Err(e) => {
                warn!("Write to transport failed: {}", e);
                shared.request_close();
                return;
            }
        }
    }
    if let Err(e) = wr.shutdown().await {
        debug!("Couldn't shut down write half: {}", e);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::shared::Readiness;

    #[tokio::test]
    async fn reader_delivers_then_closes() {
        let (mut peer, ours) = tokio::io::duplex(64);
        let (shared, waiter) = Shared::new(Vec::new());
        let task = tokio::spawn(run_reader(Arc::clone(&shared), ours, shared.subscribe()));

        peer.write_all(b"data").await.unwrap();
        assert_eq!(waiter.await, Ok(Readiness::Readable));

        let waiter = shared.lock().unwrap().fresh_waiter();
        drop(peer);
        assert_eq!(waiter.await, Ok(Readiness::Closed));
        task.await.unwrap();

        let mut inner = shared.lock().unwrap();
        assert!(inner.is_closed());
        assert_eq!(&inner.take_all()[..], b"data");
    }

    #[tokio::test]
    async fn reader_stops_on_request() {
        let (_peer, ours) = tokio::io::duplex(64);
        let (shared, waiter) = Shared::new(Vec::new());
        let task = tokio::spawn(run_reader(Arc::clone(&shared), ours, shared.subscribe()));

        shared.request_close();
        assert_eq!(waiter.await, Ok(Readiness::Closed));
        task.await.unwrap();
    }

    #[tokio::test]
    async fn reader_pauses_when_full() {
        let (mut peer, ours) = tokio::io::duplex(64 * 1024);
        let (shared, _waiter) = Shared::new(vec![0_u8; MAX_BUFFERED - 10]);
        let task = tokio::spawn(run_reader(Arc::clone(&shared), ours, shared.subscribe()));

        peer.write_all(&[1_u8; 100]).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(shared.lock().unwrap().buffered(), MAX_BUFFERED);

        // Draining lets the rest in.
        let taken = shared.lock().unwrap().take(MAX_BUFFERED - 10);
        assert_eq!(taken.len(), MAX_BUFFERED - 10);
        shared.wake_reader();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(&shared.lock().unwrap().take_all()[..], &[1_u8; 100][..]);

        shared.request_close();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn writer_preserves_order() {
        let (mut peer, ours) = tokio::io::duplex(64);
        let (shared, _waiter) = Shared::new(Vec::new());
        let (snd, rcv) = mpsc::unbounded();
        let task = tokio::spawn(run_writer(
            Arc::clone(&shared),
            ours,
            rcv,
            shared.subscribe(),
        ));

        for part in &["one ", "two ", "three"] {
            snd.unbounded_send(Bytes::copy_from_slice(part.as_bytes()))
                .unwrap();
        }
        drop(snd);
        task.await.unwrap();

        let mut got = Vec::new();
        peer.read_to_end(&mut got).await.unwrap();
        assert_eq!(&got[..], b"one two three");
    }
}
