//! Central server state: the user/channel/membership graph and the
//! counters around it.
//!
//! All of this is owned by the core task and mutated between poll points;
//! nothing here is shared across threads. Handlers and module hooks receive
//! it by mutable reference and run to completion.
//!
//! # Invariants
//!
//! - A membership edge appears on both endpoints or on neither.
//! - A channel exists iff it has at least one member; `unlink` performs the
//!   destruction check on every removal.
//! - `opers` contains exactly the users whose mode set includes `o`.

pub mod channel;
pub mod registration;
pub mod stats;
pub mod tables;
pub mod user;

pub use channel::{BanEntry, Channel, ChannelId, ChannelModes, Topic};
pub use registration::Registration;
pub use stats::GlobalStats;
pub use tables::{ChannelTable, UserTable};
pub use user::{
    ClientSender, ConnId, MemberStatus, Membership, ModeSet, User, UserId, WhowasEntry,
};

use crate::error::StateError;
use cinder_proto::validate::NICK_MAX;
use cinder_proto::{fold, message::clamp_content};
use std::collections::{HashMap, VecDeque};

/// WHOWAS entries retained per nickname.
const WHOWAS_GROUPSIZE: usize = 10;

/// The mutable heart of the daemon.
#[derive(Debug)]
pub struct ServerState {
    pub server_name: String,
    pub network: String,
    pub description: String,
    pub users: UserTable,
    pub channels: ChannelTable,
    /// Exactly the users holding mode `o`.
    pub opers: Vec<UserId>,
    /// Local connection handle to user mapping.
    pub conns: HashMap<ConnId, UserId>,
    pub whowas: HashMap<String, VecDeque<WhowasEntry>>,
    pub stats: GlobalStats,
    pub max_chans: usize,
    pub max_write_queue: usize,
    pub created_at: i64,
    /// Teardowns requested mid-fanout (flood kills); drained by the core
    /// loop after the current line completes.
    pub pending_closes: Vec<(UserId, String)>,
    /// Lines enqueued this event cycle, drained through the modules'
    /// raw-socket-write observation hook.
    pub write_log: Vec<(ConnId, String)>,
}

impl ServerState {
    pub fn new(
        server_name: &str,
        network: &str,
        description: &str,
        max_chans: usize,
        max_write_queue: usize,
        created_at: i64,
    ) -> Self {
        Self {
            server_name: server_name.to_string(),
            network: network.to_string(),
            description: description.to_string(),
            users: UserTable::default(),
            channels: ChannelTable::default(),
            opers: Vec::new(),
            conns: HashMap::new(),
            whowas: HashMap::new(),
            stats: GlobalStats::default(),
            max_chans,
            max_write_queue,
            created_at,
            pending_closes: Vec::new(),
            write_log: Vec::new(),
        }
    }

    pub fn user_by_conn(&self, conn: ConnId) -> Option<UserId> {
        self.conns.get(&conn).copied()
    }

    /// Enqueue one rendered line to a local user. Remote users are silently
    /// skipped; queue overflow schedules an Excess Flood teardown.
    pub fn enqueue_user(&mut self, id: UserId, text: &str) {
        let cap = self.max_write_queue;
        let Some(user) = self.users.get(id) else {
            return;
        };
        let Some(sender) = user.sender.clone() else {
            return;
        };
        let conn = user.conn;
        let mut line = text.to_string();
        clamp_content(&mut line);
        match sender.try_enqueue(line.clone(), cap) {
            Some(cost) => {
                self.stats.bytes_sent += cost as u64;
                self.write_log.push((conn, line));
            }
            None => {
                tracing::debug!(nick = %user.nick_or_star(), "output queue overflow");
                self.pending_closes.push((id, "Excess Flood".to_string()));
            }
        }
    }

    pub fn enqueue_conn(&mut self, conn: ConnId, text: &str) {
        if let Some(id) = self.user_by_conn(conn) {
            self.enqueue_user(id, text);
        }
    }

    /// Flip a user mode letter, keeping the opers index in step.
    /// Returns true when the mode set actually changed.
    pub fn set_user_mode(&mut self, id: UserId, letter: char, on: bool) -> bool {
        let Some(user) = self.users.get_mut(id) else {
            return false;
        };
        let changed = if on {
            user.modes.set(letter)
        } else {
            user.modes.unset(letter)
        };
        if changed && letter == 'o' {
            if on {
                self.opers.push(id);
            } else {
                self.opers.retain(|&u| u != id);
            }
        }
        changed
    }

    /// Bind a membership edge on both endpoints.
    pub fn bind(
        &mut self,
        user_id: UserId,
        channel_id: ChannelId,
        status: MemberStatus,
    ) -> Result<(), StateError> {
        let max_chans = self.max_chans;
        let user = self.users.get_mut(user_id).ok_or(StateError::NoSuchNick)?;
        if user.memberships.iter().any(|m| m.channel == channel_id) {
            return Err(StateError::AlreadyJoined);
        }
        if user.memberships.len() >= max_chans {
            return Err(StateError::TooManyChannels);
        }
        let chan = self
            .channels
            .get_mut(channel_id)
            .ok_or(StateError::NoSuchChannel)?;
        chan.members.push((user_id, status));
        user.memberships.push(Membership {
            channel: channel_id,
            status,
        });
        Ok(())
    }

    /// Remove a membership edge from both endpoints. Destroys the channel
    /// when its last member leaves; returns true in that case.
    pub fn unlink(&mut self, user_id: UserId, channel_id: ChannelId) -> Result<bool, StateError> {
        let user = self.users.get_mut(user_id).ok_or(StateError::NoSuchNick)?;
        let before = user.memberships.len();
        user.memberships.retain(|m| m.channel != channel_id);
        if user.memberships.len() == before {
            return Err(StateError::NotOnChannel);
        }
        let empty = match self.channels.get_mut(channel_id) {
            Some(chan) => {
                chan.members.retain(|(u, _)| *u != user_id);
                chan.members.is_empty()
            }
            None => false,
        };
        if empty {
            let name = self.channels.remove(channel_id).map(|c| c.name);
            tracing::debug!(channel = ?name, "destroyed empty channel");
        }
        Ok(empty)
    }

    /// Flip a member-status flag on both sides of the membership edge.
    /// Returns true when the flag actually changed.
    pub fn set_member_status(
        &mut self,
        user_id: UserId,
        channel_id: ChannelId,
        letter: char,
        on: bool,
    ) -> bool {
        fn apply(status: &mut MemberStatus, letter: char, on: bool) -> bool {
            let slot = match letter {
                'o' => &mut status.op,
                'h' => &mut status.halfop,
                'v' => &mut status.voice,
                _ => return false,
            };
            if *slot == on {
                return false;
            }
            *slot = on;
            true
        }

        let changed = match self.channels.get_mut(channel_id) {
            Some(chan) => chan
                .members
                .iter_mut()
                .find(|(u, _)| *u == user_id)
                .map(|(_, status)| apply(status, letter, on))
                .unwrap_or(false),
            None => false,
        };
        if changed {
            if let Some(user) = self.users.get_mut(user_id) {
                if let Some(m) = user.membership_mut(channel_id) {
                    apply(&mut m.status, letter, on);
                }
            }
        }
        changed
    }

    /// Record a departing user for WHOWAS.
    pub fn record_whowas(&mut self, id: UserId, now: i64) {
        let Some(user) = self.users.get(id) else {
            return;
        };
        if user.nick.is_empty() {
            return;
        }
        let key = fold(&user.nick);
        let entry = WhowasEntry {
            nick: user.nick.clone(),
            ident: user.ident.clone(),
            host: user.host.clone(),
            realname: user.realname.clone(),
            server: user.server.clone(),
            logout_at: now,
        };
        let group = self.whowas.entry(key).or_default();
        group.push_front(entry);
        group.truncate(WHOWAS_GROUPSIZE);
    }

    /// Server-assigned replacement nick for the loser of a collision.
    pub fn collision_nick(&self, connected_at: i64, nick: &str) -> String {
        let mut fresh = format!("{}{}", connected_at.rem_euclid(100_000), nick);
        fresh.truncate(NICK_MAX);
        fresh
    }

    /// Count of users visible as registered.
    pub fn registered_count(&self) -> usize {
        self.users
            .iter()
            .filter(|u| u.registration.is_registered())
            .count()
    }

    pub fn unknown_count(&self) -> usize {
        self.users.len() - self.registered_count()
    }

    pub fn invisible_count(&self) -> usize {
        self.users
            .iter()
            .filter(|u| u.registration.is_registered() && u.modes.has('i'))
            .count()
    }

    pub fn local_count(&self) -> usize {
        self.users.iter().filter(|u| u.is_local()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> ServerState {
        ServerState::new("irc.test.net", "TestNet", "a test server", 2, 1024, 0)
    }

    fn local_user(st: &mut ServerState, nick: &str, conn: u32) -> UserId {
        let id = st
            .users
            .create(ConnId(conn), "irc.test.net", "host", "127.0.0.1", conn as i64);
        st.users.bind_nick(id, nick).unwrap();
        st.conns.insert(ConnId(conn), id);
        id
    }

    #[test]
    fn bind_is_bidirectional_and_bounded() {
        let mut st = state();
        let u = local_user(&mut st, "alice", 1);
        let c1 = st.channels.create("#one", 0).unwrap();
        let c2 = st.channels.create("#two", 0).unwrap();
        st.bind(u, c1, MemberStatus::default()).unwrap();
        st.bind(u, c2, MemberStatus::default()).unwrap();

        assert!(st.channels.get(c1).unwrap().is_member(u));
        assert!(st.users.get(u).unwrap().membership(c1).is_some());

        assert_eq!(
            st.bind(u, c1, MemberStatus::default()),
            Err(StateError::AlreadyJoined)
        );
        let c3 = st.channels.create("#three", 0).unwrap();
        assert_eq!(
            st.bind(u, c3, MemberStatus::default()),
            Err(StateError::TooManyChannels)
        );
    }

    #[test]
    fn unlink_destroys_empty_channels() {
        let mut st = state();
        let a = local_user(&mut st, "alice", 1);
        let b = local_user(&mut st, "bob", 2);
        let c = st.channels.create("#room", 0).unwrap();
        st.bind(a, c, MemberStatus::founder_op()).unwrap();
        st.bind(b, c, MemberStatus::default()).unwrap();

        assert!(!st.unlink(a, c).unwrap());
        assert!(st.channels.by_name("#room").is_some());
        assert!(st.unlink(b, c).unwrap());
        assert!(st.channels.by_name("#room").is_none());
        assert_eq!(st.unlink(b, c), Err(StateError::NotOnChannel));
    }

    #[test]
    fn oper_index_tracks_mode_o() {
        let mut st = state();
        let u = local_user(&mut st, "alice", 1);
        assert!(st.set_user_mode(u, 'o', true));
        assert_eq!(st.opers, vec![u]);
        assert!(!st.set_user_mode(u, 'o', true));
        assert_eq!(st.opers.len(), 1);
        assert!(st.set_user_mode(u, 'o', false));
        assert!(st.opers.is_empty());
    }

    #[test]
    fn overflow_schedules_excess_flood() {
        let mut st = state();
        let u = local_user(&mut st, "alice", 1);
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        st.users.get_mut(u).unwrap().sender =
            Some(ClientSender::new(tx, Default::default()));
        let big = "x".repeat(400);
        st.enqueue_user(u, &big);
        st.enqueue_user(u, &big);
        st.enqueue_user(u, &big); // 1206 bytes queued > 1024 cap
        assert_eq!(st.pending_closes.len(), 1);
        assert_eq!(st.pending_closes[0].1, "Excess Flood");
    }

    #[test]
    fn whowas_groups_are_capped() {
        let mut st = state();
        let u = local_user(&mut st, "alice", 1);
        for i in 0..15 {
            st.record_whowas(u, i);
        }
        let group = &st.whowas[&fold("alice")];
        assert_eq!(group.len(), 10);
        assert_eq!(group.front().unwrap().logout_at, 14);
    }
}
