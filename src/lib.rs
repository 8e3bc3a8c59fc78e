mod bootnodes;
mod config;
mod counters;
mod dial_queue;
mod dial_worker;
mod discovery;
mod error;
mod event_bus;
mod handshake;
mod host;
mod identity;
mod join_watcher;
mod maintainer;
mod metrics;
mod peer_registry;
mod protocol_registry;
mod server;
mod swarm_host;
mod types;

pub use bootnodes::BootnodeSet;
pub use config::{Config, DEFAULT_LISTEN_PORT, MAINTAINER_INTERVAL_SECS, MIN_PEER_CONNECTIONS};
pub use error::{ConfigError, Error, JoinError};
pub use event_bus::Subscription;
pub use host::{BoxedStream, Connectedness, Host, Peerstore, Stream, StreamHandler};
pub use identity::{FileSecretsManager, SecretsManager};
pub use metrics::{Metrics, NullMetrics, PrometheusMetrics};
pub use protocol_registry::{ClientWrapper, ProtocolHandlerPair};
pub use server::Server;
pub use types::{
    AddrInfo, DialPriority, Direction, Event, EventKind, Multiaddr, PeerId, PeerRecord,
};
