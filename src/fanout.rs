//! The fanout engine: every way one rendered line reaches a computed set
//! of recipients.
//!
//! Callers format the payload once; each primitive attaches the proper
//! source prefix and routes. Remote users never receive local writes, and
//! a failure to reach one recipient never aborts delivery to the rest.

use crate::error::StateError;
use crate::state::{ChannelId, ConnId, ServerState, UserId};
use std::collections::HashSet;

/// How `mode_mask` combines its letters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskMatch {
    /// Recipient must hold every letter.
    All,
    /// Recipient must hold at least one letter.
    Any,
}

/// Write a line to one connection, no prefix.
pub fn raw(state: &mut ServerState, conn: ConnId, text: &str) {
    state.enqueue_conn(conn, text);
}

/// Write a server-prefixed line to one connection.
pub fn server(state: &mut ServerState, conn: ConnId, text: &str) {
    let line = format!(":{} {}", state.server_name, text);
    state.enqueue_conn(conn, &line);
}

/// Write a line to one connection, prefixed as coming from `src`.
pub fn from_user(state: &mut ServerState, conn: ConnId, src: UserId, text: &str) {
    let Some(prefix) = state.users.get(src).map(|u| u.prefix()) else {
        return;
    };
    let line = format!(":{prefix} {text}");
    state.enqueue_conn(conn, &line);
}

/// Write to a destination user, from a user when given, else from the
/// server. Remote destinations are dropped.
pub fn to(state: &mut ServerState, src: Option<UserId>, dst: UserId, text: &str) {
    let Some(dest) = state.users.get(dst) else {
        return;
    };
    if !dest.is_local() {
        return;
    }
    let conn = dest.conn;
    match src {
        Some(src) => from_user(state, conn, src, text),
        None => server(state, conn, text),
    }
}

/// Write to every member of a channel, sender included, from `src`.
pub fn channel(state: &mut ServerState, channel: ChannelId, src: UserId, text: &str) {
    let members = member_ids(state, channel);
    for member in members {
        to(state, Some(src), member, text);
    }
}

/// Write to every local member of a channel except `src`. With no source
/// the line carries the server prefix.
pub fn channel_local(state: &mut ServerState, channel: ChannelId, src: Option<UserId>, text: &str) {
    let members = member_ids(state, channel);
    for member in members {
        if Some(member) == src {
            continue;
        }
        to(state, src, member, text);
    }
}

/// Write a server-prefixed line to every local member of a channel.
pub fn channel_from_server(state: &mut ServerState, channel: ChannelId, text: &str) {
    let members = member_ids(state, channel);
    for member in members {
        to(state, None, member, text);
    }
}

/// Write to every local user sharing at least one channel with `id`,
/// including `id`. A user alone in the world still receives one copy.
pub fn common(state: &mut ServerState, id: UserId, text: &str) {
    deliver_common(state, id, text, true);
}

/// As [`common`], but the source user is excluded.
pub fn common_except(state: &mut ServerState, id: UserId, text: &str) {
    deliver_common(state, id, text, false);
}

fn deliver_common(state: &mut ServerState, id: UserId, text: &str, include_self: bool) {
    let Some(user) = state.users.get(id) else {
        return;
    };
    let line = format!(":{} {}", user.prefix(), text);
    let channels: Vec<ChannelId> = user.memberships.iter().map(|m| m.channel).collect();

    // One copy per socket, however many channels are shared.
    let mut visited: HashSet<ConnId> = HashSet::new();
    let mut recipients: Vec<UserId> = Vec::new();
    for cid in channels {
        let Some(chan) = state.channels.get(cid) else {
            continue;
        };
        for &(member, _) in &chan.members {
            if !include_self && member == id {
                continue;
            }
            let Some(other) = state.users.get(member) else {
                continue;
            };
            if other.is_local() && visited.insert(other.conn) {
                recipients.push(member);
            }
        }
    }

    let had_recipients = !recipients.is_empty();
    for member in recipients {
        state.enqueue_user(member, &line);
    }
    // A channel-less user must still see their own change (NICK while alone).
    if include_self && !had_recipients {
        state.enqueue_user(id, &line);
    }
}

/// Server notice to every local oper carrying the +s notice flag.
pub fn opers(state: &mut ServerState, text: &str) {
    let targets: Vec<(UserId, String)> = state
        .opers
        .iter()
        .filter_map(|&id| state.users.get(id))
        .filter(|u| u.is_local() && u.modes.has('s'))
        .map(|u| (u.id, u.nick.clone()))
        .collect();
    for (id, nick) in targets {
        let notice = format!("NOTICE {nick} :{text}");
        to(state, None, id, &notice);
    }
}

/// Server notice to every local user whose mode set satisfies the mask.
/// An empty letter set is a caller error, reported rather than matched.
pub fn mode_mask(
    state: &mut ServerState,
    letters: &str,
    mode: MaskMatch,
    text: &str,
) -> Result<(), StateError> {
    if letters.is_empty() {
        return Err(StateError::EmptyModeMask);
    }
    let targets: Vec<(UserId, String)> = state
        .users
        .iter()
        .filter(|u| u.is_local())
        .filter(|u| match mode {
            MaskMatch::All => letters.chars().all(|c| u.modes.has(c)),
            MaskMatch::Any => letters.chars().any(|c| u.modes.has(c)),
        })
        .map(|u| (u.id, u.nick.clone()))
        .collect();
    for (id, nick) in targets {
        let notice = format!("NOTICE {nick} :{text}");
        to(state, None, id, &notice);
    }
    Ok(())
}

/// WALLOPS from `src` to every local user holding +w.
pub fn wallops(state: &mut ServerState, src: UserId, text: &str) {
    let targets: Vec<UserId> = state
        .users
        .iter()
        .filter(|u| u.is_local() && u.modes.has('w'))
        .map(|u| u.id)
        .collect();
    let line = format!("WALLOPS :{text}");
    for id in targets {
        to(state, Some(src), id, &line);
    }
}

/// Notice from `src` to every local user.
pub fn notice_all(state: &mut ServerState, src: UserId, text: &str) {
    let targets: Vec<UserId> = state.users.iter().filter(|u| u.is_local()).map(|u| u.id).collect();
    let line = format!("NOTICE $* :{text}");
    for id in targets {
        to(state, Some(src), id, &line);
    }
}

/// Emergency broadcast. Registered users get a notice; connections still
/// registering get a bare ERROR.
pub fn send_error_all(state: &mut ServerState, text: &str) {
    let targets: Vec<(UserId, ConnId, Option<String>)> = state
        .users
        .iter()
        .filter(|u| u.is_local())
        .map(|u| {
            let nick = u.registration.is_registered().then(|| u.nick.clone());
            (u.id, u.conn, nick)
        })
        .collect();
    for (_, conn, nick) in targets {
        match nick {
            Some(nick) => server(state, conn, &format!("NOTICE {nick} :{text}")),
            None => raw(state, conn, &format!("ERROR :{text}")),
        }
    }
}

/// Send a numeric reply to a user.
pub fn numeric(state: &mut ServerState, id: UserId, num: u16, text: &str) {
    let Some(user) = state.users.get(id) else {
        return;
    };
    let line = format!(
        ":{} {:03} {} {}",
        state.server_name,
        num,
        user.nick_or_star(),
        text
    );
    let conn = user.conn;
    state.enqueue_conn(conn, &line);
}

fn member_ids(state: &ServerState, channel: ChannelId) -> Vec<UserId> {
    state
        .channels
        .get(channel)
        .map(|c| c.members.iter().map(|(u, _)| *u).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{ClientSender, MemberStatus};
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    struct Rig {
        state: ServerState,
        taps: Vec<(UserId, UnboundedReceiver<String>)>,
    }

    impl Rig {
        fn new() -> Self {
            Self {
                state: ServerState::new("irc.test.net", "TestNet", "test", 10, 65536, 0),
                taps: Vec::new(),
            }
        }

        fn user(&mut self, nick: &str, conn: u32) -> UserId {
            let id = self
                .state
                .users
                .create(ConnId(conn), "irc.test.net", "host", "127.0.0.1", 0);
            self.state.users.bind_nick(id, nick).unwrap();
            self.state.conns.insert(ConnId(conn), id);
            let (tx, rx) = mpsc::unbounded_channel();
            let user = self.state.users.get_mut(id).unwrap();
            user.ident = nick.to_string();
            user.sender = Some(ClientSender::new(tx, Default::default()));
            self.taps.push((id, rx));
            id
        }

        fn remote_user(&mut self, nick: &str) -> UserId {
            let id = self
                .state
                .users
                .create(ConnId::REMOTE, "hub.test.net", "far", "0.0.0.0", 0);
            self.state.users.bind_nick(id, nick).unwrap();
            id
        }

        fn drain(&mut self, id: UserId) -> Vec<String> {
            let rx = self
                .taps
                .iter_mut()
                .find(|(u, _)| *u == id)
                .map(|(_, rx)| rx)
                .unwrap();
            let mut out = Vec::new();
            while let Ok(line) = rx.try_recv() {
                out.push(line);
            }
            out
        }
    }

    #[test]
    fn common_deduplicates_across_shared_channels() {
        let mut rig = Rig::new();
        let a = rig.user("a", 1);
        let b = rig.user("b", 2);
        let c = rig.user("c", 3);
        let x = rig.state.channels.create("#x", 0).unwrap();
        let y = rig.state.channels.create("#y", 0).unwrap();
        for u in [a, b, c] {
            rig.state.bind(u, x, MemberStatus::default()).unwrap();
            rig.state.bind(u, y, MemberStatus::default()).unwrap();
        }

        common(&mut rig.state, a, "NICK :alicia");

        for u in [a, b, c] {
            let lines = rig.drain(u);
            assert_eq!(lines, vec![":a!a@host NICK :alicia".to_string()]);
        }
    }

    #[test]
    fn common_on_channelless_user_self_delivers_once() {
        let mut rig = Rig::new();
        let a = rig.user("loner", 1);
        common(&mut rig.state, a, "NICK :stillalone");
        assert_eq!(rig.drain(a).len(), 1);
    }

    #[test]
    fn common_except_skips_the_source() {
        let mut rig = Rig::new();
        let a = rig.user("a", 1);
        let b = rig.user("b", 2);
        let x = rig.state.channels.create("#x", 0).unwrap();
        rig.state.bind(a, x, MemberStatus::default()).unwrap();
        rig.state.bind(b, x, MemberStatus::default()).unwrap();

        common_except(&mut rig.state, a, "QUIT :gone");
        assert!(rig.drain(a).is_empty());
        assert_eq!(rig.drain(b).len(), 1);
    }

    #[test]
    fn channel_write_skips_remote_members() {
        let mut rig = Rig::new();
        let a = rig.user("a", 1);
        let r = rig.remote_user("far");
        let x = rig.state.channels.create("#x", 0).unwrap();
        rig.state.bind(a, x, MemberStatus::default()).unwrap();
        rig.state.bind(r, x, MemberStatus::default()).unwrap();

        channel(&mut rig.state, x, a, "JOIN :#x");
        assert_eq!(rig.drain(a).len(), 1);
        // nothing to assert for the remote user: it has no queue at all
    }

    #[test]
    fn opers_requires_notice_flag() {
        let mut rig = Rig::new();
        let a = rig.user("quietop", 1);
        let b = rig.user("noisyop", 2);
        rig.state.set_user_mode(a, 'o', true);
        rig.state.set_user_mode(b, 'o', true);
        rig.state.set_user_mode(b, 's', true);

        opers(&mut rig.state, "routing notice");
        assert!(rig.drain(a).is_empty());
        let lines = rig.drain(b);
        assert_eq!(
            lines,
            vec![":irc.test.net NOTICE noisyop :routing notice".to_string()]
        );
    }

    #[test]
    fn mode_mask_all_vs_any() {
        let mut rig = Rig::new();
        let a = rig.user("a", 1);
        let b = rig.user("b", 2);
        rig.state.set_user_mode(a, 'i', true);
        rig.state.set_user_mode(a, 'w', true);
        rig.state.set_user_mode(b, 'w', true);

        mode_mask(&mut rig.state, "iw", MaskMatch::All, "both").unwrap();
        assert_eq!(rig.drain(a).len(), 1);
        assert!(rig.drain(b).is_empty());

        mode_mask(&mut rig.state, "iw", MaskMatch::Any, "either").unwrap();
        assert_eq!(rig.drain(a).len(), 1);
        assert_eq!(rig.drain(b).len(), 1);

        assert_eq!(
            mode_mask(&mut rig.state, "", MaskMatch::All, "none"),
            Err(StateError::EmptyModeMask)
        );
    }

    #[test]
    fn notice_all_reaches_every_local_user() {
        let mut rig = Rig::new();
        let a = rig.user("a", 1);
        let b = rig.user("b", 2);
        rig.remote_user("far");
        notice_all(&mut rig.state, a, "network event");
        assert_eq!(rig.drain(a).len(), 1);
        assert_eq!(
            rig.drain(b),
            vec![":a!a@host NOTICE $* :network event".to_string()]
        );
    }

    #[test]
    fn send_error_distinguishes_registration_state() {
        let mut rig = Rig::new();
        let a = rig.user("a", 1);
        rig.state.users.get_mut(a).unwrap().registration =
            crate::state::Registration::Registered;
        let id = rig.state.users.create(ConnId(9), "irc.test.net", "h", "::1", 0);
        let (tx, mut rx) = mpsc::unbounded_channel();
        rig.state.users.get_mut(id).unwrap().sender =
            Some(ClientSender::new(tx, Default::default()));
        rig.state.conns.insert(ConnId(9), id);

        send_error_all(&mut rig.state, "going down");
        assert_eq!(
            rig.drain(a),
            vec![":irc.test.net NOTICE a :going down".to_string()]
        );
        assert_eq!(rx.try_recv().unwrap(), "ERROR :going down");
    }

    #[test]
    fn numeric_uses_star_before_nick_is_bound() {
        let mut rig = Rig::new();
        let id = rig
            .state
            .users
            .create(ConnId(9), "irc.test.net", "host", "::1", 0);
        let (tx, mut rx) = mpsc::unbounded_channel();
        rig.state.users.get_mut(id).unwrap().sender =
            Some(ClientSender::new(tx, Default::default()));
        rig.state.conns.insert(ConnId(9), id);

        numeric(&mut rig.state, id, 451, ":You have not registered");
        assert_eq!(
            rx.try_recv().unwrap(),
            ":irc.test.net 451 * :You have not registered"
        );
    }
}
