//! The peer fabric: server-to-server links grouped into mesh slots.
//!
//! The fixed 32-slot shape is wire-compatible state, not a tunable. Every
//! outbound packet is prefixed with a sum nonce (fresh, or preserved when
//! forwarding) and offered to modules through the transmit hook before
//! serialization. Receivers drop packets whose sum is already in a short
//! TTL cache; ordering is per-peer FIFO and nothing more.

use crate::modules::ModuleHost;
use crate::state::{ServerState, UserId};
use cinder_proto::fold_eq;
use rand::Rng;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;

/// Number of mesh slots. Hard wire-compatibility invariant.
pub const MAX_MESHES: usize = 32;

/// How long a seen sum stays in the duplicate cache.
const SUM_TTL: Duration = Duration::from_secs(30);

/// Link lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Connecting,
    Handshake,
    Connected,
    Disconnected,
}

/// One link to another server.
#[derive(Debug)]
pub struct Peer {
    pub name: String,
    pub description: String,
    pub state: PeerState,
    tx: Option<UnboundedSender<String>>,
}

impl Peer {
    fn send(&mut self, line: &str) {
        let Some(tx) = &self.tx else {
            return;
        };
        if tx.send(line.to_string()).is_err() {
            tracing::debug!(peer = %self.name, "peer queue closed, marking disconnected");
            self.state = PeerState::Disconnected;
            self.tx = None;
        }
    }
}

/// One mesh slot's worth of peers.
#[derive(Debug, Default)]
pub struct Mesh {
    pub peers: Vec<Peer>,
}

/// All server links plus the inbound duplicate-detection cache.
pub struct PeerFabric {
    meshes: [Option<Mesh>; MAX_MESHES],
    seen_sums: HashMap<String, Instant>,
    local_description: String,
}

impl PeerFabric {
    pub fn new(local_description: &str) -> Self {
        Self {
            meshes: std::array::from_fn(|_| None),
            seen_sums: HashMap::new(),
            local_description: local_description.to_string(),
        }
    }

    /// Attach (or reattach) a peer in a mesh slot.
    pub fn register_peer(
        &mut self,
        mesh: usize,
        name: &str,
        description: &str,
        tx: UnboundedSender<String>,
        state: PeerState,
    ) {
        let slot = self.meshes[mesh % MAX_MESHES].get_or_insert_with(Mesh::default);
        if let Some(peer) = slot.peers.iter_mut().find(|p| fold_eq(&p.name, name)) {
            peer.description = description.to_string();
            peer.state = state;
            peer.tx = Some(tx);
            return;
        }
        slot.peers.push(Peer {
            name: name.to_string(),
            description: description.to_string(),
            state,
            tx: Some(tx),
        });
    }

    /// Update the state of a named peer wherever it lives.
    pub fn set_peer_state(&mut self, name: &str, state: PeerState) -> bool {
        for mesh in self.meshes.iter_mut().flatten() {
            for peer in &mut mesh.peers {
                if fold_eq(&peer.name, name) {
                    peer.state = state;
                    if state == PeerState::Disconnected {
                        peer.tx = None;
                    }
                    return true;
                }
            }
        }
        false
    }

    /// Fill in a peer's advertised name/description once its SERVER
    /// introduction arrives.
    pub fn complete_handshake(&mut self, old_name: &str, name: &str, description: &str) {
        for mesh in self.meshes.iter_mut().flatten() {
            for peer in &mut mesh.peers {
                if fold_eq(&peer.name, old_name) {
                    peer.name = name.to_string();
                    peer.description = description.to_string();
                    peer.state = PeerState::Connected;
                    return;
                }
            }
        }
    }

    /// A fresh routing nonce. Recorded in the local cache immediately so
    /// an echo of our own packet is recognized and dropped.
    pub fn create_sum(&mut self) -> String {
        let sum = format!("{:08x}", rand::thread_rng().gen::<u32>());
        self.seen_sums.insert(sum.clone(), Instant::now());
        sum
    }

    /// Record an inbound sum. Returns false when it was already seen
    /// (the packet must be dropped).
    pub fn note_sum(&mut self, sum: &str) -> bool {
        let now = Instant::now();
        self.seen_sums.retain(|_, at| now.duration_since(*at) < SUM_TTL);
        self.seen_sums.insert(sum.to_string(), now).is_none()
    }

    /// Description of a named server. All meshes are searched; the local
    /// description is the fallback only when no peer matches anywhere.
    pub fn server_description(&self, name: &str) -> String {
        for mesh in self.meshes.iter().flatten() {
            for peer in &mesh.peers {
                if fold_eq(&peer.name, name) {
                    return peer.description.clone();
                }
            }
        }
        self.local_description.clone()
    }

    /// Snapshot of every peer for LINKS/MAP/STATS output.
    pub fn all_peers(&self) -> Vec<(String, String, PeerState)> {
        self.meshes
            .iter()
            .flatten()
            .flat_map(|m| &m.peers)
            .map(|p| (p.name.clone(), p.description.clone(), p.state))
            .collect()
    }

    pub fn alive_count(&self) -> usize {
        self.meshes
            .iter()
            .flatten()
            .flat_map(|m| &m.peers)
            .filter(|p| p.state != PeerState::Disconnected)
            .count()
    }

    fn broadcast(
        &mut self,
        modules: &mut ModuleHost,
        line: &str,
        sum: &str,
        skip: Option<&str>,
        alive_only: bool,
    ) {
        let mut packet = format!("{sum} {line}");
        modules.packet_transmit(&mut packet);
        for mesh in self.meshes.iter_mut().flatten() {
            for peer in &mut mesh.peers {
                if let Some(skip) = skip {
                    if fold_eq(&peer.name, skip) {
                        continue;
                    }
                }
                if alive_only && peer.state == PeerState::Disconnected {
                    tracing::debug!(peer = %peer.name, "peer is dead, not sending to it");
                    continue;
                }
                peer.send(&packet);
            }
        }
    }

    /// Send to every peer in every mesh, under a fresh sum.
    pub fn send_to_all(&mut self, modules: &mut ModuleHost, line: &str) {
        let sum = self.create_sum();
        self.broadcast(modules, line, &sum, None, false);
    }

    /// As [`send_to_all`], skipping disconnected peers.
    pub fn send_to_all_alive(&mut self, modules: &mut ModuleHost, line: &str) {
        let sum = self.create_sum();
        self.broadcast(modules, line, &sum, None, true);
    }

    /// Send to the one peer matching `name` under the fold.
    pub fn send_to_one(&mut self, modules: &mut ModuleHost, name: &str, line: &str) {
        let sum = self.create_sum();
        let mut packet = format!("{sum} {line}");
        modules.packet_transmit(&mut packet);
        for mesh in self.meshes.iter_mut().flatten() {
            for peer in &mut mesh.peers {
                if fold_eq(&peer.name, name) {
                    peer.send(&packet);
                }
            }
        }
    }

    /// Send to everyone except `name` (avoids echoing to the origin).
    pub fn send_to_all_except(&mut self, modules: &mut ModuleHost, name: &str, line: &str) {
        let sum = self.create_sum();
        self.broadcast(modules, line, &sum, Some(name), false);
    }

    /// Forwarding variants: the original sum is preserved so downstream
    /// duplicate detection keeps working.
    pub fn send_to_all_with_sum(&mut self, modules: &mut ModuleHost, line: &str, sum: &str) {
        self.broadcast(modules, line, sum, None, false);
    }

    pub fn send_to_all_except_with_sum(
        &mut self,
        modules: &mut ModuleHost,
        name: &str,
        line: &str,
        sum: &str,
    ) {
        self.broadcast(modules, line, sum, Some(name), false);
    }

    /// Send to every peer hosting at least one user sharing a channel
    /// with `user`. One packet (one sum) per qualifying peer.
    pub fn send_to_common(
        &mut self,
        modules: &mut ModuleHost,
        state: &ServerState,
        user: UserId,
        line: &str,
    ) {
        let Some(u) = state.users.get(user) else {
            return;
        };
        let mut remote_servers: Vec<String> = Vec::new();
        for membership in &u.memberships {
            let Some(chan) = state.channels.get(membership.channel) else {
                continue;
            };
            for &(member, _) in &chan.members {
                let Some(other) = state.users.get(member) else {
                    continue;
                };
                if other.is_local() {
                    continue;
                }
                if !remote_servers.iter().any(|s| fold_eq(s, &other.server)) {
                    remote_servers.push(other.server.clone());
                }
            }
        }
        if remote_servers.is_empty() {
            return;
        }
        let sum = self.create_sum();
        let mut packet = format!("{sum} {line}");
        modules.packet_transmit(&mut packet);
        for mesh in self.meshes.iter_mut().flatten() {
            for peer in &mut mesh.peers {
                if remote_servers.iter().any(|s| fold_eq(s, &peer.name)) {
                    peer.send(&packet);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{ConnId, MemberStatus};
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn fabric_with_peer(name: &str) -> (PeerFabric, UnboundedReceiver<String>) {
        let mut fabric = PeerFabric::new("local desc");
        let (tx, rx) = mpsc::unbounded_channel();
        fabric.register_peer(0, name, "a peer", tx, PeerState::Connected);
        (fabric, rx)
    }

    #[test]
    fn packets_carry_a_sum_prefix() {
        let (mut fabric, mut rx) = fabric_with_peer("hub.test.net");
        let mut modules = ModuleHost::default();
        fabric.send_to_all(&mut modules, "PRIVMSG #x :hi");
        let packet = rx.try_recv().unwrap();
        let (sum, rest) = packet.split_once(' ').unwrap();
        assert_eq!(sum.len(), 8);
        assert_eq!(rest, "PRIVMSG #x :hi");
    }

    #[test]
    fn forwarding_preserves_the_sum() {
        let (mut fabric, mut rx) = fabric_with_peer("hub.test.net");
        let mut modules = ModuleHost::default();
        fabric.send_to_all_with_sum(&mut modules, "V alice * :hi", "cafebabe");
        assert_eq!(rx.try_recv().unwrap(), "cafebabe V alice * :hi");
    }

    #[test]
    fn except_skips_the_origin() {
        let mut fabric = PeerFabric::new("local");
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        fabric.register_peer(0, "a.net", "", tx_a, PeerState::Connected);
        fabric.register_peer(1, "b.net", "", tx_b, PeerState::Connected);
        let mut modules = ModuleHost::default();
        fabric.send_to_all_except(&mut modules, "a.net", "SQUIT gone.net");
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
    }

    #[test]
    fn alive_only_skips_dead_peers() {
        let (mut fabric, mut rx) = fabric_with_peer("hub.test.net");
        fabric.set_peer_state("hub.test.net", PeerState::Disconnected);
        let mut modules = ModuleHost::default();
        fabric.send_to_all_alive(&mut modules, "PING");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn sum_cache_detects_replays() {
        let mut fabric = PeerFabric::new("local");
        assert!(fabric.note_sum("deadbeef"));
        assert!(!fabric.note_sum("deadbeef"));
        assert!(fabric.note_sum("cafebabe"));
    }

    #[test]
    fn description_searches_all_meshes_before_falling_back() {
        let mut fabric = PeerFabric::new("the local server");
        let (tx, _rx) = mpsc::unbounded_channel();
        fabric.register_peer(7, "far.net", "a far server", tx, PeerState::Connected);
        assert_eq!(fabric.server_description("FAR.net"), "a far server");
        assert_eq!(fabric.server_description("nowhere.net"), "the local server");
    }

    #[test]
    fn common_targets_only_peers_hosting_sharers() {
        let mut state =
            ServerState::new("irc.test.net", "TestNet", "test", 10, 65536, 0);
        let local = state
            .users
            .create(ConnId(1), "irc.test.net", "h", "127.0.0.1", 0);
        state.users.bind_nick(local, "alice").unwrap();
        let remote = state
            .users
            .create(ConnId::REMOTE, "hub.test.net", "far", "0.0.0.0", 0);
        state.users.bind_nick(remote, "bob").unwrap();
        let chan = state.channels.create("#x", 0).unwrap();
        state.bind(local, chan, MemberStatus::default()).unwrap();
        state.bind(remote, chan, MemberStatus::default()).unwrap();

        let mut fabric = PeerFabric::new("local");
        let (tx_hub, mut rx_hub) = mpsc::unbounded_channel();
        let (tx_other, mut rx_other) = mpsc::unbounded_channel();
        fabric.register_peer(0, "hub.test.net", "", tx_hub, PeerState::Connected);
        fabric.register_peer(0, "other.net", "", tx_other, PeerState::Connected);

        let mut modules = ModuleHost::default();
        fabric.send_to_common(&mut modules, &state, local, ":alice PRIVMSG #x :hi");
        let packet = rx_hub.try_recv().unwrap();
        assert!(packet.ends_with(":alice PRIVMSG #x :hi"));
        assert!(rx_hub.try_recv().is_err(), "exactly one packet");
        assert!(rx_other.try_recv().is_err(), "uninvolved peer untouched");
    }
}
