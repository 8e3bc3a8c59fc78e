//! Error kinds the core raises.

use crate::types::PeerId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid multiaddr: {0}")]
    InvalidMultiaddr(String),

    #[error("protocol {0:?} is not registered")]
    ProtocolNotFound(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Join(#[from] JoinError),

    #[error("subscription setup failed: {0}")]
    Subscription(String),
}

/// Raised at startup from `new`/`start`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("discovery is enabled but no bootnodes were configured")]
    NoBootnodes,
    #[error("fewer than 1 usable bootnode remained after filtering out our own id")]
    MinBootnodes,
    #[error("invalid bootnode address {0:?}: {1}")]
    InvalidBootnode(String, String),
}

/// Returned by `JoinWatcher::watch`/`Server::join_addr` on timeout.
#[derive(Debug, Error)]
#[error("timed out waiting for a dial outcome for peer {remote} (local id {local})")]
pub struct JoinError {
    pub local: PeerId,
    pub remote: PeerId,
}
