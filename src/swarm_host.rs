//! Concrete `Host` backed by a `libp2p::Swarm`.
//! The swarm is owned by a dedicated task (the actor pattern used elsewhere
//! for the peer-manager/network split); `Libp2pHost` talks to it over a
//! command channel and exposes the synchronous/async surface the rest of
//! the crate is built against.

use crate::error::Error;
use crate::handshake;
use crate::host::{BoxedStream, Connectedness, Host, Peerstore, StreamHandler};
use crate::identity::NodeInfoManager;
use crate::types::{AddrInfo, Multiaddr, PeerId};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use libp2p::core::ConnectedPoint;
use libp2p::swarm::{NetworkBehaviour, SwarmEvent};
use libp2p::{identify, identity::Keypair, ping, Swarm};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

#[derive(NetworkBehaviour)]
pub struct ComposedBehaviour {
    identify: identify::Behaviour,
    ping: ping::Behaviour,
    handshake: handshake::Behaviour,
    stream: libp2p_stream::Behaviour,
}

enum Command {
    Listen(Multiaddr, oneshot::Sender<Result<(), Error>>),
    Connect(AddrInfo, oneshot::Sender<Result<(), Error>>),
    ClosePeer(PeerId, oneshot::Sender<Result<(), Error>>),
}

/// Invoked on the actor task when a handshake completes for a connection we
/// did not initiate; outbound completions are reported via `connect`'s
/// return value instead, so only inbound acceptance needs a push channel.
pub type InboundConnectedCallback = Box<dyn Fn(PeerId, AddrInfo) + Send + Sync>;

pub struct Libp2pHost {
    local_peer_id: PeerId,
    listen_addrs: Mutex<Vec<Multiaddr>>,
    cmd_tx: mpsc::Sender<Command>,
    connected: Arc<DashMap<PeerId, ()>>,
    stream_control: libp2p_stream::Control,
    disconnect_callbacks: Arc<Mutex<Vec<Box<dyn Fn(PeerId) + Send + Sync>>>>,
    peerstore: Arc<InMemoryPeerstore>,
}

impl Libp2pHost {
    /// Builds the swarm and spawns its driving task. `network_id` is used
    /// both for the identify protocol's agent string and as the handshake's
    /// network-matching field.
    pub fn new(
        keypair: Keypair,
        network_id: String,
        inbound_connected: InboundConnectedCallback,
    ) -> Result<Arc<Self>, Error> {
        let local_peer_id = keypair.public().to_peer_id();

        let identify = identify::Behaviour::new(identify::Config::new(
            "/ssv/id/1.0.0".to_string(),
            keypair.public(),
        ));
        let ping = ping::Behaviour::default();
        let handshake = handshake::Behaviour::new(keypair.clone(), NodeInfoManager::new(network_id));
        let stream = libp2p_stream::Behaviour::new();
        let stream_control = stream.new_control();

        let behaviour = ComposedBehaviour {
            identify,
            ping,
            handshake,
            stream,
        };

        let mut swarm = libp2p::SwarmBuilder::with_existing_identity(keypair)
            .with_tokio()
            .with_tcp(
                libp2p::tcp::Config::default(),
                libp2p::noise::Config::new,
                libp2p::yamux::Config::default,
            )
            .map_err(|e| Error::Transport(format!("building tcp transport: {e}")))?
            .with_behaviour(|_| behaviour)
            .map_err(|e| Error::Transport(format!("building swarm behaviour: {e}")))?
            .build();
        swarm.behaviour_mut();

        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let connected = Arc::new(DashMap::new());
        let disconnect_callbacks: Arc<Mutex<Vec<Box<dyn Fn(PeerId) + Send + Sync>>>> =
            Arc::new(Mutex::new(Vec::new()));

        let host = Arc::new(Self {
            local_peer_id,
            listen_addrs: Mutex::new(Vec::new()),
            cmd_tx,
            connected: connected.clone(),
            stream_control,
            disconnect_callbacks: disconnect_callbacks.clone(),
            peerstore: Arc::new(InMemoryPeerstore::default()),
        });

        let listen_addrs_for_task = Arc::downgrade(&host);
        tokio::spawn(run_swarm_actor(
            swarm,
            cmd_rx,
            connected,
            disconnect_callbacks,
            inbound_connected,
            listen_addrs_for_task,
        ));

        Ok(host)
    }
}

async fn run_swarm_actor(
    mut swarm: Swarm<ComposedBehaviour>,
    mut cmd_rx: mpsc::Receiver<Command>,
    connected: Arc<DashMap<PeerId, ()>>,
    disconnect_callbacks: Arc<Mutex<Vec<Box<dyn Fn(PeerId) + Send + Sync>>>>,
    inbound_connected: InboundConnectedCallback,
    host: std::sync::Weak<Libp2pHost>,
) {
    let mut pending_listens: HashMap<u64, oneshot::Sender<Result<(), Error>>> = HashMap::new();
    let mut pending_connects: HashMap<PeerId, oneshot::Sender<Result<(), Error>>> = HashMap::new();
    let mut pending_closes: HashMap<PeerId, oneshot::Sender<Result<(), Error>>> = HashMap::new();
    let mut pending_endpoints: HashMap<PeerId, ConnectedPoint> = HashMap::new();
    let mut next_listen_token: u64 = 0;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    None => return,
                    Some(Command::Listen(addr, tx)) => {
                        match swarm.listen_on(addr) {
                            Ok(_) => {
                                next_listen_token += 1;
                                pending_listens.insert(next_listen_token, tx);
                            }
                            Err(e) => {
                                let _ = tx.send(Err(Error::Transport(format!("listen: {e}"))));
                            }
                        }
                    }
                    Some(Command::Connect(addr_info, tx)) => {
                        if let Some(addr) = addr_info.addrs.first().cloned() {
                            match swarm.dial(addr) {
                                Ok(()) => {
                                    pending_connects.insert(addr_info.peer_id, tx);
                                }
                                Err(e) => {
                                    let _ = tx.send(Err(Error::Transport(format!("dial: {e}"))));
                                }
                            }
                        } else {
                            let _ = tx.send(Err(Error::Transport("no addresses to dial".into())));
                        }
                    }
                    Some(Command::ClosePeer(peer_id, tx)) => {
                        if swarm.disconnect_peer_id(peer_id).is_ok() {
                            pending_closes.insert(peer_id, tx);
                        } else {
                            let _ = tx.send(Ok(()));
                        }
                    }
                }
            }
            event = swarm.select_next_some() => {
                match event {
                    SwarmEvent::NewListenAddr { address, .. } => {
                        if let Some(host) = host.upgrade() {
                            host.listen_addrs.lock().push(address);
                        }
                        for (_, tx) in pending_listens.drain() {
                            let _ = tx.send(Ok(()));
                        }
                    }
                    SwarmEvent::ConnectionEstablished { peer_id, endpoint, .. } => {
                        pending_endpoints.insert(peer_id, endpoint);
                    }
                    SwarmEvent::OutgoingConnectionError { peer_id: Some(peer_id), error, .. } => {
                        if let Some(tx) = pending_connects.remove(&peer_id) {
                            let _ = tx.send(Err(Error::Transport(format!("{error}"))));
                        }
                    }
                    SwarmEvent::ConnectionClosed { peer_id, .. } => {
                        connected.remove(&peer_id);
                        pending_endpoints.remove(&peer_id);
                        if let Some(tx) = pending_closes.remove(&peer_id) {
                            let _ = tx.send(Ok(()));
                        }
                        for cb in disconnect_callbacks.lock().iter() {
                            cb(peer_id);
                        }
                    }
                    SwarmEvent::Behaviour(ComposedBehaviourEvent::Handshake(event)) => {
                        match event {
                            handshake::Event::Completed { peer_id, .. } => {
                                connected.insert(peer_id, ());
                                if let Some(tx) = pending_connects.remove(&peer_id) {
                                    let _ = tx.send(Ok(()));
                                } else if let Some(ConnectedPoint::Listener { send_back_addr, .. }) =
                                    pending_endpoints.get(&peer_id)
                                {
                                    let mut addr = send_back_addr.clone();
                                    addr.push(libp2p::multiaddr::Protocol::P2p(peer_id));
                                    inbound_connected(peer_id, AddrInfo::new(peer_id, vec![addr]));
                                }
                            }
                            handshake::Event::Failed { peer_id, error } => {
                                warn!(peer_id = %peer_id, ?error, "identity handshake failed");
                                if let Some(tx) = pending_connects.remove(&peer_id) {
                                    let _ = tx.send(Err(Error::Transport(format!("{error:?}"))));
                                }
                            }
                        }
                    }
                    SwarmEvent::Behaviour(ComposedBehaviourEvent::Identify(identify::Event::Received { peer_id, info, .. })) => {
                        debug!(peer_id = %peer_id, protocols = ?info.protocols, "identify info received");
                    }
                    _ => {}
                }
            }
        }
    }
}

#[async_trait]
impl Host for Libp2pHost {
    fn id(&self) -> PeerId {
        self.local_peer_id
    }

    fn addrs(&self) -> Vec<Multiaddr> {
        self.listen_addrs.lock().clone()
    }

    async fn listen(&self, addr: Multiaddr) -> Result<(), Error> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Listen(addr, tx))
            .await
            .map_err(|_| Error::Transport("swarm actor stopped".into()))?;
        rx.await
            .map_err(|_| Error::Transport("swarm actor dropped listen response".into()))?
    }

    async fn connect(&self, addr_info: AddrInfo) -> Result<(), Error> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Connect(addr_info, tx))
            .await
            .map_err(|_| Error::Transport("swarm actor stopped".into()))?;
        rx.await
            .map_err(|_| Error::Transport("swarm actor dropped connect response".into()))?
    }

    async fn close_peer(&self, id: PeerId) -> Result<(), Error> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::ClosePeer(id, tx))
            .await
            .map_err(|_| Error::Transport("swarm actor stopped".into()))?;
        rx.await
            .map_err(|_| Error::Transport("swarm actor dropped close response".into()))?
    }

    fn connectedness(&self, id: PeerId) -> Connectedness {
        if self.connected.contains_key(&id) {
            Connectedness::Connected
        } else {
            Connectedness::NotConnected
        }
    }

    async fn new_stream(&self, id: PeerId, protocol_id: &str) -> Result<BoxedStream, Error> {
        let protocol = libp2p::StreamProtocol::try_from_owned(protocol_id.to_string())
            .map_err(|e| Error::Transport(format!("invalid protocol id: {e}")))?;
        let mut control = self.stream_control.clone();
        let stream = control
            .open_stream(id, protocol)
            .await
            .map_err(|e| Error::Transport(format!("open_stream: {e}")))?;
        Ok(Box::pin(stream))
    }

    fn set_stream_handler(&self, protocol_id: &str, handler: Arc<dyn StreamHandler>) {
        let protocol = match libp2p::StreamProtocol::try_from_owned(protocol_id.to_string()) {
            Ok(p) => p,
            Err(e) => {
                warn!(protocol_id, %e, "refusing to register invalid protocol id");
                return;
            }
        };
        let mut control = self.stream_control.clone();
        let incoming = match control.accept(protocol) {
            Ok(incoming) => incoming,
            Err(e) => {
                warn!(protocol_id, %e, "protocol already registered with the transport");
                return;
            }
        };
        tokio::spawn(async move {
            let mut incoming = incoming;
            while let Some((peer_id, stream)) = incoming.next().await {
                let handler = handler.clone();
                tokio::spawn(async move {
                    handler.handle(peer_id, Box::pin(stream)).await;
                });
            }
        });
    }

    fn on_disconnect(&self, cb: Box<dyn Fn(PeerId) + Send + Sync>) {
        self.disconnect_callbacks.lock().push(cb);
    }

    fn peerstore(&self) -> Arc<dyn Peerstore> {
        self.peerstore.clone()
    }
}

#[derive(Default)]
struct InMemoryPeerstore {
    entries: DashMap<PeerId, (Vec<Multiaddr>, Instant)>,
}

#[async_trait]
impl Peerstore for InMemoryPeerstore {
    async fn add_addr(&self, id: PeerId, addr: Multiaddr, ttl: Duration) {
        let expires = Instant::now() + ttl;
        self.entries
            .entry(id)
            .and_modify(|(addrs, exp)| {
                if !addrs.contains(&addr) {
                    addrs.push(addr.clone());
                }
                *exp = expires;
            })
            .or_insert_with(|| (vec![addr], expires));
    }

    fn peer_info(&self, id: PeerId) -> Option<AddrInfo> {
        let entry = self.entries.get(&id)?;
        let (addrs, expires) = entry.value();
        if Instant::now() > *expires {
            return None;
        }
        Some(AddrInfo::new(id, addrs.clone()))
    }

    fn protocols(&self, _id: PeerId) -> Vec<String> {
        // Protocol discovery rides on `identify`; this crate does not cache
        // it separately from the transport's own identify cache.
        Vec::new()
    }
}
