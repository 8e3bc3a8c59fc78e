//! Discv5-backed peer discovery, feeding newly found addresses into the
//! dial queue. Runs discv5's own event loop in a dedicated task rather than
//! folding it into the libp2p swarm, since discv5 already drives its own
//! UDP socket independently of it.

use crate::dial_queue::DialQueue;
use crate::error::Error;
use crate::types::{AddrInfo, DialPriority, PeerId};
use discv5::enr::{CombinedKey, CombinedPublicKey, Enr};
use discv5::{ConfigBuilder, Discv5, Event, ListenConfig};
use libp2p::identity::Keypair;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How often the discovery loop issues a random-walk query.
const FIND_PEERS_INTERVAL: Duration = Duration::from_secs(30);

pub struct Discovery {
    discv5: Discv5,
}

impl Discovery {
    /// Builds the discv5 service from the node's own ed25519 network
    /// identity and the bootnode ENRs configured at startup. The identity
    /// scheme is restricted to ed25519 to match the `libp2p` identity
    /// features this crate builds with; secp256k1 ENRs are rejected.
    pub fn new(keypair: &Keypair, listen_addr: SocketAddr, boot_enrs: Vec<Enr>) -> Result<Self, Error> {
        let enr_key = CombinedKey::from_libp2p(keypair)
            .map_err(|e| Error::Transport(format!("deriving discv5 key from network identity: {e}")))?;
        let ip = match listen_addr.ip() {
            std::net::IpAddr::V4(ip) => ip,
            std::net::IpAddr::V6(_) => {
                return Err(Error::Transport("discv5 listen address must be IPv4".into()))
            }
        };
        let enr = Enr::builder()
            .ip4(ip)
            .udp4(listen_addr.port())
            .build(&enr_key)
            .map_err(|e| Error::Transport(format!("building local ENR: {e}")))?;

        let listen_config = ListenConfig::Ipv4 {
            ip,
            port: listen_addr.port(),
        };
        let config = ConfigBuilder::new(listen_config).build();
        let mut discv5 = Discv5::new(enr, enr_key, config)
            .map_err(|e| Error::Transport(format!("constructing discv5 service: {e}")))?;

        for boot_enr in boot_enrs {
            if let Err(e) = discv5.add_enr(boot_enr) {
                warn!(error = %e, "failed to add bootnode ENR to discv5 table");
            }
        }

        Ok(Self { discv5 })
    }

    /// Binds the UDP socket configured at construction and starts discv5's
    /// internal event loop.
    pub async fn start(&self) -> Result<(), Error> {
        self.discv5
            .start()
            .await
            .map_err(|e| Error::Transport(format!("starting discv5: {e}")))
    }

    pub fn local_enr(&self) -> Enr {
        self.discv5.local_enr()
    }

    /// Runs random-walk queries on a timer, translating newly discovered
    /// ENRs into dial tasks, until `shutdown` fires.
    pub fn spawn_query_loop(
        self: Arc<Self>,
        dial_queue: Arc<DialQueue>,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(FIND_PEERS_INTERVAL);
            let mut events = self.discv5.event_stream().await.ok();
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = ticker.tick() => self.run_random_query(&dial_queue).await,
                    event = async {
                        match &mut events {
                            Some(stream) => stream.recv().await,
                            None => std::future::pending().await,
                        }
                    } => {
                        if let Some(Event::Discovered(enr)) = event {
                            if let Some(addr_info) = enr_to_addr_info(&enr) {
                                dial_queue.add(addr_info, DialPriority::RandomDial);
                            }
                        }
                    }
                }
            }
        })
    }

    async fn run_random_query(&self, dial_queue: &DialQueue) {
        match self.discv5.find_node(discv5::enr::NodeId::random()).await {
            Ok(enrs) => {
                debug!(count = enrs.len(), "discv5 random query returned results");
                for enr in enrs {
                    if let Some(addr_info) = enr_to_addr_info(&enr) {
                        dial_queue.add(addr_info, DialPriority::RandomDial);
                    }
                }
            }
            Err(e) => warn!(error = %e, "discv5 random query failed"),
        }
    }
}

fn enr_to_addr_info(enr: &Enr) -> Option<AddrInfo> {
    let ip = enr.ip4()?;
    let port = enr.tcp4()?;
    let peer_id = enr_to_peer_id(enr)?;

    let mut addr: libp2p::Multiaddr = format!("/ip4/{ip}/tcp/{port}").parse().ok()?;
    addr.push(libp2p::multiaddr::Protocol::P2p(peer_id));
    Some(AddrInfo::new(peer_id, vec![addr]))
}

fn enr_to_peer_id(enr: &Enr) -> Option<PeerId> {
    match enr.public_key() {
        CombinedPublicKey::Ed25519(key) => {
            let public = libp2p::identity::ed25519::PublicKey::try_from_bytes(&key.to_bytes()).ok()?;
            Some(libp2p::identity::PublicKey::from(public).to_peer_id())
        }
        CombinedPublicKey::Secp256k1(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ed25519_enr(ip: [u8; 4], tcp_port: u16) -> Enr {
        let key = CombinedKey::generate_ed25519();
        Enr::builder()
            .ip4(ip.into())
            .udp4(9000)
            .tcp4(tcp_port)
            .build(&key)
            .unwrap()
    }

    #[test]
    fn ed25519_enr_converts_to_an_addr_info() {
        let enr = ed25519_enr([127, 0, 0, 1], 4242);
        let addr_info = enr_to_addr_info(&enr).expect("ed25519 ENR with tcp4 set should convert");
        assert_eq!(addr_info.addrs.len(), 1);
        assert!(addr_info.addrs[0].to_string().contains("4242"));
    }

    #[test]
    fn enr_without_tcp_port_does_not_convert() {
        let key = CombinedKey::generate_ed25519();
        let enr = Enr::builder()
            .ip4([127, 0, 0, 1].into())
            .udp4(9000)
            .build(&key)
            .unwrap();
        assert!(enr_to_addr_info(&enr).is_none());
    }

    #[test]
    fn secp256k1_enr_is_rejected() {
        let key = CombinedKey::generate_secp256k1();
        let enr = Enr::builder()
            .ip4([127, 0, 0, 1].into())
            .udp4(9000)
            .tcp4(4242)
            .build(&key)
            .unwrap();
        assert!(enr_to_peer_id(&enr).is_none());
    }
}
