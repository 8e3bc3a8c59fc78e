//! The `Host` capability consumed from the secure transport.
//! The transport itself — handshake, stream multiplexing, address parsing —
//! is out of scope; this module only states the contract the rest
//! of the crate is built against, plus a concrete libp2p-backed
//! implementation (`swarm_host`).

use crate::types::{AddrInfo, Multiaddr, PeerId};
use async_trait::async_trait;
use futures::{AsyncRead, AsyncWrite};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Connectedness as observed by the transport; may briefly differ from the
/// `PeerRegistry`'s own view during teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectedness {
    NotConnected,
    Connected,
    CanConnect,
    CannotConnect,
}

pub trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Stream for T {}

pub type BoxedStream = Pin<Box<dyn Stream>>;

/// Invoked by the transport when a remote peer opens a stream for a
/// registered protocol-id.
#[async_trait]
pub trait StreamHandler: Send + Sync {
    async fn handle(&self, peer_id: PeerId, stream: BoxedStream);
}

#[async_trait]
pub trait Peerstore: Send + Sync {
    async fn add_addr(&self, id: PeerId, addr: Multiaddr, ttl: Duration);
    fn peer_info(&self, id: PeerId) -> Option<AddrInfo>;
    fn protocols(&self, id: PeerId) -> Vec<String>;
}

#[async_trait]
pub trait Host: Send + Sync {
    fn id(&self) -> PeerId;
    fn addrs(&self) -> Vec<Multiaddr>;

    async fn listen(&self, addr: Multiaddr) -> Result<(), crate::error::Error>;

    /// Blocks until the dial either succeeds (handshake complete) or fails.
    async fn connect(&self, addr_info: AddrInfo) -> Result<(), crate::error::Error>;

    async fn close_peer(&self, id: PeerId) -> Result<(), crate::error::Error>;

    fn connectedness(&self, id: PeerId) -> Connectedness;

    fn is_connected(&self, id: PeerId) -> bool {
        self.connectedness(id) == Connectedness::Connected
    }

    async fn new_stream(
        &self,
        id: PeerId,
        protocol_id: &str,
    ) -> Result<BoxedStream, crate::error::Error>;

    fn set_stream_handler(&self, protocol_id: &str, handler: Arc<dyn StreamHandler>);

    /// Registers a callback fired from transport internals on disconnect.
    fn on_disconnect(&self, cb: Box<dyn Fn(PeerId) + Send + Sync>);

    fn peerstore(&self) -> Arc<dyn Peerstore>;
}
