//! Core data model: peer identity, addresses, direction, dial tasks and
//! lifecycle events.

use std::cmp::Ordering;

pub use libp2p::Multiaddr;
pub use libp2p::PeerId;

/// Whether a connection was initiated locally or by the remote peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// `(peer-id, list-of-multi-addresses)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddrInfo {
    pub peer_id: PeerId,
    pub addrs: Vec<Multiaddr>,
}

impl AddrInfo {
    pub fn new(peer_id: PeerId, addrs: Vec<Multiaddr>) -> Self {
        Self { peer_id, addrs }
    }

    /// Parses a single multi-address of the form
    /// `/ip4/<ip>/tcp/<port>/p2p/<peer-id>` into an `AddrInfo`.
    pub fn parse(s: &str) -> Result<Self, crate::error::Error> {
        let addr: Multiaddr = s
            .parse()
            .map_err(|e| crate::error::Error::InvalidMultiaddr(format!("{s}: {e}")))?;
        let peer_id = extract_peer_id(&addr)
            .ok_or_else(|| crate::error::Error::InvalidMultiaddr(format!("{s}: missing /p2p/<id>")))?;
        Ok(AddrInfo::new(peer_id, vec![addr]))
    }
}

fn extract_peer_id(addr: &Multiaddr) -> Option<PeerId> {
    addr.iter().find_map(|p| match p {
        libp2p::multiaddr::Protocol::P2p(id) => Some(id),
        _ => None,
    })
}

/// Priority of a pending dial. Smaller value dials sooner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum DialPriority {
    RequestedDial = 0,
    RandomDial = 1,
}

/// A pending outbound dial, ordered by `(priority, insertion sequence)`.
#[derive(Debug, Clone)]
pub struct DialTask {
    pub addr_info: AddrInfo,
    pub priority: DialPriority,
    pub(crate) seq: u64,
}

impl PartialEq for DialTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl Eq for DialTask {}

impl PartialOrd for DialTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DialTask {
    /// Priority ascending, then insertion sequence ascending. `DialTask` is
    /// stored in a `BinaryHeap` (a max-heap), so this is reversed to make the
    /// heap pop the *smallest* `(priority, seq)` pair first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// A connected peer's record: the sole source of truth for registry
/// membership.
#[derive(Debug, Clone)]
pub struct PeerRecord {
    pub addr_info: AddrInfo,
    pub direction: Direction,
}

/// Lifecycle event kinds emitted on the `EventBus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    AddedToDialQueue,
    Connected,
    Disconnected,
    FailedToConnect,
    AlreadyConnected,
    DialCompleted,
}

#[derive(Debug, Clone)]
pub struct Event {
    pub peer_id: PeerId,
    pub kind: EventKind,
}

impl Event {
    pub fn new(peer_id: PeerId, kind: EventKind) -> Self {
        Self { peer_id, kind }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dial_task_orders_by_priority_then_sequence() {
        let peer = PeerId::random();
        let a = DialTask {
            addr_info: AddrInfo::new(peer, vec![]),
            priority: DialPriority::RandomDial,
            seq: 0,
        };
        let b = DialTask {
            addr_info: AddrInfo::new(peer, vec![]),
            priority: DialPriority::RequestedDial,
            seq: 1,
        };
        // b has the stricter (smaller) priority, so it must sort "greater"
        // in our max-heap ordering (popped first).
        assert!(b > a);
    }

    #[test]
    fn parse_round_trips_peer_id() {
        let peer = PeerId::random();
        let s = format!("/ip4/127.0.0.1/tcp/1478/p2p/{peer}");
        let info = AddrInfo::parse(&s).unwrap();
        assert_eq!(info.peer_id, peer);
        assert_eq!(info.addrs.len(), 1);
        assert_eq!(info.addrs[0].to_string(), s);
    }

    #[test]
    fn parse_rejects_missing_peer_id() {
        let err = AddrInfo::parse("/ip4/127.0.0.1/tcp/1478");
        assert!(err.is_err());
    }
}
