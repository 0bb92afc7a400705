use std::fmt;
use std::net::SocketAddr;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::trace;

use crate::codec::{FragmentCodec, Reply};
use crate::error::Result;

/// The reliable byte-stream layer a session runs on.
///
/// The session never opens, binds or listens; it only consumes
/// fragments and writes replies through this boundary.
#[async_trait]
pub trait FragmentTransport: Send {
    /// Next inbound fragment, or `None` once the peer has closed.
    async fn recv_fragment(&mut self) -> Result<Option<Bytes>>;

    /// Write one reply byte.
    async fn send(&mut self, reply: Reply) -> Result<()>;

    /// Report that `bytes` inbound bytes have been processed.
    fn acknowledge_consumed(&mut self, bytes: usize);
}

/// [`FragmentTransport`] over any async byte stream.
pub struct StreamTransport<S> {
    framed: Framed<S, FragmentCodec>,
    consumed: u64,
}

/// The transport used in production.
pub type TcpTransport = StreamTransport<TcpStream>;

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self {
            framed: Framed::new(stream, FragmentCodec),
            consumed: 0,
        }
    }

    /// Inbound bytes acknowledged so far.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    pub fn into_inner(self) -> S {
        self.framed.into_inner()
    }
}

impl StreamTransport<TcpStream> {
    /// Wrap an accepted socket. Nagle is turned off so every reply
    /// byte leaves immediately.
    pub fn from_tcp(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }

    pub fn peer_addr(&self) -> Result<SocketAddr> {
        Ok(self.framed.get_ref().peer_addr()?)
    }
}

#[async_trait]
impl<S> FragmentTransport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn recv_fragment(&mut self) -> Result<Option<Bytes>> {
        self.framed.next().await.transpose()
    }

    async fn send(&mut self, reply: Reply) -> Result<()> {
        self.framed.send(reply).await
    }

    fn acknowledge_consumed(&mut self, bytes: usize) {
        self.consumed += bytes as u64;
        trace!(bytes, total = self.consumed, "inbound bytes consumed");
    }
}

// ── ConnectionInfo ───────────────────────────────────────────────

/// Where a classifier server can be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    host: String,
    port: u16,
}

impl ConnectionInfo {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
