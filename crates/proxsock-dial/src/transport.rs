//! The byte stream handed back by a successful dial.

use std::fmt;
use tokio::io::{AsyncRead, AsyncWrite};

/// Any bidirectional byte stream that we can use as a transport.
pub trait Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<S> Stream for S where S: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// A connected transport, ready to carry application bytes.
///
/// It doesn't matter whether this came from a direct dial, a SOCKS
/// proxy, or an HTTP CONNECT tunnel: from here on, every byte is payload.
///
/// Some proxies send the first tunnelled bytes in the same segment as
/// their handshake reply.  Those bytes have already been read off the
/// stream, so they're kept in `prefix` and must be consumed first.
pub struct Transport {
    /// The underlying stream.
    stream: Box<dyn Stream>,
    /// Payload bytes that were read while finishing the handshake.
    prefix: Vec<u8>,
}

impl Transport {
    /// Wrap `stream` as a transport.
    pub fn new<S: Stream>(stream: S) -> Self {
        Transport {
            stream: Box::new(stream),
            prefix: Vec::new(),
        }
    }

    /// Record bytes that arrived before the stream was handed over.
    pub fn with_prefix(mut self, prefix: Vec<u8>) -> Self {
        self.prefix = prefix;
        self
    }

    /// Return the bytes that must be read before anything on the stream.
    pub fn prefix(&self) -> &[u8] {
        &self.prefix[..]
    }

    /// Take this transport apart.
    pub fn into_parts(self) -> (Box<dyn Stream>, Vec<u8>) {
        (self.stream, self.prefix)
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("prefix_len", &self.prefix.len())
            .finish()
    }
}
