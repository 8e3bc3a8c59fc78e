//! Recognized configuration options.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

pub const DEFAULT_LISTEN_PORT: u16 = 1478;

/// Below this many connected peers, the maintainer tops up from bootnodes.
pub const MIN_PEER_CONNECTIONS: usize = 1;

/// How often `PeerMaintainer` ticks.
pub const MAINTAINER_INTERVAL_SECS: u64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Transport bind address.
    pub listen_addr: IpAddr,
    pub listen_port: u16,

    /// If set, the advertised address is rewritten to `nat_addr:port`.
    pub nat_addr: Option<IpAddr>,

    /// If set (and `nat_addr` is not), replaces advertised addresses.
    pub dns: Option<String>,

    pub max_inbound_peers: usize,
    pub max_outbound_peers: usize,

    /// Disables discovery and bootnodes entirely.
    pub no_discover: bool,

    /// Required unless `no_discover`.
    pub bootnodes: Vec<String>,

    /// Reserved for a future dial/accept ratio policy. Accepted, stored,
    /// never consulted by any dial decision.
    pub dial_ratio: f32,

    /// Gates the not-yet-implemented peerstore top-up when discovery is
    /// disabled. Has no effect while `false`.
    pub peerstore_topup: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: IpAddr::from([0, 0, 0, 0]),
            listen_port: DEFAULT_LISTEN_PORT,
            nat_addr: None,
            dns: None,
            max_inbound_peers: 32,
            max_outbound_peers: 32,
            no_discover: false,
            bootnodes: Vec::new(),
            dial_ratio: 0.2,
            peerstore_topup: false,
        }
    }
}
