//! User-related types and state.

use crate::state::registration::Registration;
use crate::state::ChannelId;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Opaque connection handle. Remote users carry the sentinel value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(pub u32);

impl ConnId {
    /// Sentinel for users hosted on a peer server: no local socket.
    pub const REMOTE: ConnId = ConnId(u32::MAX);

    pub fn is_remote(self) -> bool {
        self == Self::REMOTE
    }
}

/// Stable identifier into the user arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserId(pub u32);

/// Handle to a local connection's outbound queue.
///
/// The writer task owns the receiving end and decrements `queued_bytes`
/// as lines reach the socket.
#[derive(Debug, Clone)]
pub struct ClientSender {
    tx: mpsc::UnboundedSender<String>,
    queued_bytes: Arc<AtomicUsize>,
}

impl ClientSender {
    pub fn new(tx: mpsc::UnboundedSender<String>, queued_bytes: Arc<AtomicUsize>) -> Self {
        Self { tx, queued_bytes }
    }

    /// Enqueue one line (CR-LF accounted but appended by the writer).
    /// Returns the bytes charged, or `None` when the queue cap is hit or
    /// the connection is gone.
    pub fn try_enqueue(&self, line: String, cap: usize) -> Option<usize> {
        let cost = line.len() + 2;
        let prior = self.queued_bytes.fetch_add(cost, Ordering::Relaxed);
        if prior + cost > cap {
            self.queued_bytes.fetch_sub(cost, Ordering::Relaxed);
            return None;
        }
        if self.tx.send(line).is_err() {
            self.queued_bytes.fetch_sub(cost, Ordering::Relaxed);
            return None;
        }
        Some(cost)
    }

    pub fn queued_bytes(&self) -> usize {
        self.queued_bytes.load(Ordering::Relaxed)
    }
}

/// An unordered set of single-letter user modes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ModeSet {
    letters: String,
}

impl ModeSet {
    pub fn has(&self, letter: char) -> bool {
        self.letters.contains(letter)
    }

    /// Set a letter; returns false when it was already present.
    pub fn set(&mut self, letter: char) -> bool {
        if self.has(letter) {
            return false;
        }
        self.letters.push(letter);
        true
    }

    /// Clear a letter; returns false when it was not set.
    pub fn unset(&mut self, letter: char) -> bool {
        if !self.has(letter) {
            return false;
        }
        self.letters.retain(|c| c != letter);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = char> + '_ {
        self.letters.chars()
    }

    /// Render as `+iw`; a bare `+` when empty.
    pub fn to_display(&self) -> String {
        format!("+{}", self.letters)
    }
}

/// Per-channel status of one member.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MemberStatus {
    pub founder: bool,
    pub op: bool,
    pub halfop: bool,
    pub voice: bool,
}

impl MemberStatus {
    pub fn founder_op() -> Self {
        Self {
            founder: true,
            op: true,
            ..Default::default()
        }
    }

    /// Highest prefix character shown in NAMES/WHO replies.
    pub fn prefix_char(&self) -> Option<char> {
        if self.op {
            Some('@')
        } else if self.halfop {
            Some('%')
        } else if self.voice {
            Some('+')
        } else {
            None
        }
    }

    pub fn has_voice_or_higher(&self) -> bool {
        self.op || self.halfop || self.voice
    }
}

/// One edge of the membership matrix, as stored on the user side.
#[derive(Debug, Clone, Copy)]
pub struct Membership {
    pub channel: ChannelId,
    pub status: MemberStatus,
}

/// A connected (or remote) user.
#[derive(Debug)]
pub struct User {
    pub id: UserId,
    /// Display nickname; empty until NICK is accepted.
    pub nick: String,
    pub ident: String,
    /// Real hostname.
    pub host: String,
    /// Displayed (cloak-capable) hostname.
    pub dhost: String,
    /// Connection IP, used by Z-line matching.
    pub ip: String,
    pub realname: String,
    /// Name of the server this user is attached to.
    pub server: String,
    pub conn: ConnId,
    pub modes: ModeSet,
    pub away: Option<String>,
    /// PASS argument, held for the allow-class check at promotion.
    pub password: Option<String>,
    /// Folded channel names this user has open invitations for.
    pub invites: Vec<String>,
    pub registration: Registration,
    pub connected_at: i64,
    /// Bounded membership list; capped by the server's max_chans.
    pub memberships: Vec<Membership>,
    /// Outbound queue handle; `None` for remote users.
    pub sender: Option<ClientSender>,
}

impl User {
    pub fn is_local(&self) -> bool {
        !self.conn.is_remote()
    }

    pub fn is_oper(&self) -> bool {
        self.modes.has('o')
    }

    /// `nick!ident@dhost` source prefix as receivers see it.
    pub fn prefix(&self) -> String {
        format!("{}!{}@{}", self.nick, self.ident, self.dhost)
    }

    /// Nick shown in numerics: `*` until one is bound.
    pub fn nick_or_star(&self) -> &str {
        if self.nick.is_empty() {
            "*"
        } else {
            &self.nick
        }
    }

    pub fn membership(&self, channel: ChannelId) -> Option<&Membership> {
        self.memberships.iter().find(|m| m.channel == channel)
    }

    pub fn membership_mut(&mut self, channel: ChannelId) -> Option<&mut Membership> {
        self.memberships.iter_mut().find(|m| m.channel == channel)
    }

    pub fn take_invite(&mut self, folded_channel: &str) -> bool {
        let before = self.invites.len();
        self.invites.retain(|c| c != folded_channel);
        self.invites.len() != before
    }
}

/// An entry in the WHOWAS history for a departed user.
#[derive(Debug, Clone)]
pub struct WhowasEntry {
    pub nick: String,
    pub ident: String,
    pub host: String,
    pub realname: String,
    pub server: String,
    pub logout_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_set_round_trip() {
        let mut modes = ModeSet::default();
        assert!(modes.set('i'));
        assert!(modes.set('w'));
        assert!(!modes.set('i'));
        assert_eq!(modes.to_display(), "+iw");
        assert!(modes.unset('i'));
        assert!(!modes.unset('i'));
        assert_eq!(modes.to_display(), "+w");
    }

    #[test]
    fn status_prefix_priority() {
        let mut st = MemberStatus::default();
        assert_eq!(st.prefix_char(), None);
        st.voice = true;
        assert_eq!(st.prefix_char(), Some('+'));
        st.halfop = true;
        assert_eq!(st.prefix_char(), Some('%'));
        st.op = true;
        assert_eq!(st.prefix_char(), Some('@'));
    }

    #[test]
    fn sender_cap_is_enforced() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sender = ClientSender::new(tx, Arc::default());
        assert!(sender.try_enqueue("0123456789".to_string(), 24).is_some());
        // 12 of 24 bytes used; the next 12-byte line fits exactly.
        assert!(sender.try_enqueue("0123456789".to_string(), 24).is_some());
        assert!(sender.try_enqueue("x".to_string(), 24).is_none());
        assert_eq!(rx.try_recv().unwrap(), "0123456789");
    }
}
