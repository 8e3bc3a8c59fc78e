//! The crate's public façade: wires every component together and exposes
//! the node's lifecycle and peer operations.

use crate::bootnodes::BootnodeSet;
use crate::config::Config;
use crate::counters::ConnectionCounters;
use crate::dial_queue::DialQueue;
use crate::dial_worker::DialWorker;
use crate::discovery::Discovery;
use crate::error::{ConfigError, Error};
use crate::event_bus::{EventBus, Subscription};
use crate::host::Host;
use crate::identity::{self, SecretsManager};
use crate::join_watcher::JoinWatcher;
use crate::maintainer::PeerMaintainer;
use crate::metrics::Metrics;
use crate::peer_registry::PeerRegistry;
use crate::protocol_registry::{ProtocolHandlerPair, ProtocolRegistry};
use crate::swarm_host::Libp2pHost;
use crate::types::{AddrInfo, Direction, DialPriority, Event, Multiaddr, PeerId, PeerRecord};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Owns the node's lifecycle: construction validates configuration and
/// wires the background workers; `start` binds the transport and begins
/// dialing; `close` tears everything down.
pub struct Server {
    config: Config,
    host: Arc<dyn Host>,
    registry: Arc<PeerRegistry>,
    bootnodes: Option<Arc<BootnodeSet>>,
    dial_queue: Arc<DialQueue>,
    event_bus: Arc<EventBus>,
    protocol_registry: Arc<ProtocolRegistry>,
    join_watcher: Arc<JoinWatcher>,
    discovery: Option<Arc<Discovery>>,
    shutdown: CancellationToken,
    background: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl Server {
    pub fn new(
        config: Config,
        secrets: &dyn SecretsManager,
        metrics: Arc<dyn Metrics>,
    ) -> Result<Arc<Self>, Error> {
        if !config.no_discover && config.bootnodes.is_empty() {
            return Err(ConfigError::NoBootnodes.into());
        }

        let keypair = identity::load_or_generate_keypair(secrets)?;
        let local_id = keypair.public().to_peer_id();

        let parsed_bootnodes: Vec<AddrInfo> = config
            .bootnodes
            .iter()
            .map(|s| AddrInfo::parse(s))
            .collect::<Result<_, _>>()
            .map_err(|e| Error::Config(ConfigError::InvalidBootnode(String::new(), e.to_string())))?;

        let bootnodes = if config.no_discover {
            None
        } else {
            let set = Arc::new(BootnodeSet::new(parsed_bootnodes, local_id));
            if !set.has_any() {
                return Err(ConfigError::MinBootnodes.into());
            }
            Some(set)
        };

        let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel::<(PeerId, AddrInfo)>();
        let inbound_cb: crate::swarm_host::InboundConnectedCallback =
            Box::new(move |id, addr_info| {
                let _ = inbound_tx.send((id, addr_info));
            });

        let discovery_keypair = keypair.clone();
        let host = Libp2pHost::new(keypair, "ssv".to_string(), inbound_cb)?;

        let discovery = if config.no_discover {
            None
        } else {
            let discovery_addr = std::net::SocketAddr::new(config.listen_addr, config.listen_port);
            Some(Arc::new(Discovery::new(&discovery_keypair, discovery_addr, Vec::new())?))
        };

        let counters = Arc::new(ConnectionCounters::new(
            config.max_inbound_peers,
            config.max_outbound_peers,
        ));
        let event_bus = Arc::new(EventBus::new(metrics.clone()));
        let registry = Arc::new(PeerRegistry::new(
            counters.clone(),
            bootnodes.clone(),
            metrics.clone(),
            event_bus.clone(),
            host.clone() as Arc<dyn Host>,
        ));

        let registry_for_inbound = registry.clone();
        tokio::spawn(async move {
            while let Some((id, addr_info)) = inbound_rx.recv().await {
                registry_for_inbound.add_peer(id, addr_info, Direction::Inbound);
            }
        });

        let registry_for_disconnect = registry.clone();
        host.on_disconnect(Box::new(move |id| {
            let registry = registry_for_disconnect.clone();
            tokio::spawn(async move {
                registry.del_peer(id).await;
            });
        }));

        let protocol_registry = Arc::new(ProtocolRegistry::new(host.clone() as Arc<dyn Host>));
        let dial_queue = Arc::new(DialQueue::new(event_bus.clone()));
        let join_watcher = Arc::new(JoinWatcher::new(local_id));
        let shutdown = CancellationToken::new();

        let mut background = Vec::new();
        background.push(join_watcher.spawn_pump(&event_bus));
        background.push(
            DialWorker::new(
                dial_queue.clone(),
                counters.clone(),
                host.clone() as Arc<dyn Host>,
                registry.clone(),
                event_bus.clone(),
                metrics.clone(),
                shutdown.clone(),
            )
            .spawn(),
        );
        background.push(
            PeerMaintainer::new(
                crate::config::MIN_PEER_CONNECTIONS,
                registry.clone(),
                bootnodes.clone(),
                dial_queue.clone(),
                shutdown.clone(),
            )
            .spawn(),
        );
        if let Some(discovery) = &discovery {
            background.push(discovery.clone().spawn_query_loop(dial_queue.clone(), shutdown.clone()));
        }

        Ok(Arc::new(Self {
            config,
            host: host as Arc<dyn Host>,
            registry,
            bootnodes,
            dial_queue,
            event_bus,
            protocol_registry,
            join_watcher,
            discovery,
            shutdown,
            background: std::sync::Mutex::new(background),
        }))
    }

    /// Binds the listen address and enqueues every configured bootnode as an
    /// initial dial target.
    pub async fn start(&self) -> Result<(), Error> {
        let addr: Multiaddr = format!("/ip4/{}/tcp/{}", self.config.listen_addr, self.config.listen_port)
            .parse()
            .map_err(|e| Error::InvalidMultiaddr(format!("{e}")))?;
        self.host.listen(addr).await?;

        if let Some(discovery) = &self.discovery {
            discovery.start().await?;
            info!(enr = %discovery.local_enr(), "discv5 listening");
        }

        if let Some(bootnodes) = &self.bootnodes {
            for addr_info in bootnodes.get_all() {
                self.dial_queue.add(addr_info, DialPriority::RandomDial);
            }
            info!(count = bootnodes.len(), "enqueued bootnodes for initial dial");
        }
        Ok(())
    }

    /// Cancels background workers and closes the dial queue. Idempotent.
    pub fn close(&self) {
        self.shutdown.cancel();
        self.dial_queue.close();
    }

    pub async fn join_addr(&self, addr: &str, timeout: Duration) -> Result<(), Error> {
        let addr_info = AddrInfo::parse(addr)?;
        self.join(addr_info, timeout).await
    }

    /// A zero timeout enqueues the dial and returns immediately without
    /// waiting for an outcome.
    pub async fn join(&self, addr_info: AddrInfo, timeout: Duration) -> Result<(), Error> {
        let peer_id = addr_info.peer_id;
        self.dial_queue.add(addr_info, DialPriority::RequestedDial);
        if timeout.is_zero() {
            return Ok(());
        }
        self.join_watcher.watch(peer_id, timeout).await?;
        Ok(())
    }

    pub async fn disconnect(&self, id: PeerId, reason: &str) {
        info!(peer_id = %id, reason, "disconnecting peer");
        self.registry.del_peer(id).await;
    }

    pub fn peers(&self) -> Vec<PeerRecord> {
        self.registry.peers()
    }

    pub fn num_peers(&self) -> usize {
        self.registry.num_peers()
    }

    pub fn has_peer(&self, id: &PeerId) -> bool {
        self.registry.has_peer(id)
    }

    pub fn id(&self) -> PeerId {
        self.host.id()
    }

    /// The addresses this node advertises to peers. Rewritten to
    /// `nat_addr`/`dns` when configured; otherwise the transport's own
    /// listen addresses.
    pub fn addrs(&self) -> Vec<Multiaddr> {
        advertised_addrs(&self.config, self.host.addrs())
    }

    pub fn subscribe(&self) -> Subscription {
        self.event_bus.subscribe()
    }

    pub fn subscribe_fn<F>(&self, handler: F) -> JoinHandle<()>
    where
        F: FnMut(Event) + Send + 'static,
    {
        self.event_bus.subscribe_fn(handler)
    }

    pub fn register_protocol(&self, id: impl Into<String>, pair: ProtocolHandlerPair) {
        self.protocol_registry.register(id, pair);
    }

    pub async fn new_proto_stream(
        &self,
        id: &str,
        peer_id: PeerId,
    ) -> Result<Box<dyn Any + Send>, Error> {
        self.protocol_registry.open_stream(id, peer_id).await
    }

    pub fn get_random_bootnode(&self) -> Option<AddrInfo> {
        let registry = &self.registry;
        self.bootnodes
            .as_ref()?
            .random_not_connected(|id| registry.has_peer(id))
    }

    pub fn get_bootnode_conn_count(&self) -> i64 {
        self.bootnodes.as_ref().map(|b| b.connected_count()).unwrap_or(0)
    }

    pub fn is_bootnode(&self, id: &PeerId) -> bool {
        self.bootnodes.as_ref().is_some_and(|b| b.is_bootnode(id))
    }
}

/// Rewrites each listen address's host component per `config.nat_addr`
/// (takes priority) or `config.dns`, keeping the original TCP port; an
/// address with no TCP component, or no override configured, passes through
/// unchanged.
fn advertised_addrs(config: &Config, raw: Vec<Multiaddr>) -> Vec<Multiaddr> {
    if config.nat_addr.is_none() && config.dns.is_none() {
        return raw;
    }
    raw.into_iter()
        .map(|addr| {
            let Some(port) = addr.iter().find_map(|p| match p {
                libp2p::multiaddr::Protocol::Tcp(port) => Some(port),
                _ => None,
            }) else {
                return addr;
            };
            if let Some(nat_addr) = config.nat_addr {
                format!("/{}/{nat_addr}/tcp/{port}", ip_protocol_name(nat_addr))
                    .parse()
                    .unwrap_or(addr)
            } else if let Some(dns) = &config.dns {
                format!("/dns4/{dns}/tcp/{port}").parse().unwrap_or(addr)
            } else {
                addr
            }
        })
        .collect()
}

fn ip_protocol_name(ip: std::net::IpAddr) -> &'static str {
    match ip {
        std::net::IpAddr::V4(_) => "ip4",
        std::net::IpAddr::V6(_) => "ip6",
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown.cancel();
        for handle in self.background.lock().unwrap().drain(..) {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listen_addr() -> Multiaddr {
        "/ip4/10.0.0.5/tcp/1478".parse().unwrap()
    }

    #[test]
    fn no_override_passes_addresses_through() {
        let config = Config::default();
        let rewritten = advertised_addrs(&config, vec![listen_addr()]);
        assert_eq!(rewritten, vec![listen_addr()]);
    }

    #[test]
    fn nat_addr_rewrites_the_host_keeping_the_port() {
        let config = Config {
            nat_addr: Some("203.0.113.9".parse().unwrap()),
            ..Config::default()
        };
        let rewritten = advertised_addrs(&config, vec![listen_addr()]);
        assert_eq!(
            rewritten,
            vec!["/ip4/203.0.113.9/tcp/1478".parse::<Multiaddr>().unwrap()]
        );
    }

    #[test]
    fn dns_rewrites_the_host_when_nat_addr_is_unset() {
        let config = Config {
            dns: Some("node.example.com".to_string()),
            ..Config::default()
        };
        let rewritten = advertised_addrs(&config, vec![listen_addr()]);
        assert_eq!(
            rewritten,
            vec!["/dns4/node.example.com/tcp/1478".parse::<Multiaddr>().unwrap()]
        );
    }

    #[test]
    fn nat_addr_takes_priority_over_dns() {
        let config = Config {
            nat_addr: Some("203.0.113.9".parse().unwrap()),
            dns: Some("node.example.com".to_string()),
            ..Config::default()
        };
        let rewritten = advertised_addrs(&config, vec![listen_addr()]);
        assert_eq!(
            rewritten,
            vec!["/ip4/203.0.113.9/tcp/1478".parse::<Multiaddr>().unwrap()]
        );
    }
}
