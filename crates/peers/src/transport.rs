use thiserror::Error;

use veilmesh_core::NodeId;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("No route to {0}")]
    Unreachable(NodeId),
    #[error("Send to {0} failed")]
    SendFailed(NodeId),
}

/// The channel contract the pool requires from its host.
///
/// Connection setup is fire-and-forget: `connect` starts the handshake and
/// the host later reports the outcome through
/// [`PeerPool::connection_opened`](crate::PeerPool::connection_opened) or
/// [`PeerPool::connection_closed`](crate::PeerPool::connection_closed).
/// Per-peer delivery is assumed ordered and reliable; anything beyond that
/// (NAT traversal, reconnection) is the transport's problem.
pub trait Transport: Send + Sync + 'static {
    fn connect(&self, peer: &NodeId, address: Option<&str>) -> Result<(), TransportError>;

    fn send(&self, peer: &NodeId, bytes: &[u8]) -> Result<(), TransportError>;
}

impl<T: Transport> Transport for std::sync::Arc<T> {
    fn connect(&self, peer: &NodeId, address: Option<&str>) -> Result<(), TransportError> {
        (**self).connect(peer, address)
    }

    fn send(&self, peer: &NodeId, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).send(peer, bytes)
    }
}
