//! Membership lifecycle: the join/part/kick pipelines and the NAMES burst.
//!
//! These functions perform the graph mutation and the associated channel
//! fanout; privilege checks and module hooks stay with the callers.

use crate::bans::match_mask;
use crate::error::{HandlerError, HandlerResult, StateError};
use crate::fanout;
use crate::state::{ChannelId, MemberStatus, ServerState, UserId};
use cinder_proto::validate::NICK_MAX;
use cinder_proto::{fold, is_valid_channel_name, numeric};

/// Result of a join attempt.
#[derive(Debug, Clone, Copy)]
pub struct JoinOutcome {
    pub channel: ChannelId,
    /// The join created the channel (caller fires `on_channel_create`).
    pub created: bool,
    /// False when the user was already a member (idempotent no-op).
    pub joined: bool,
}

/// Join a user to a channel, creating it when absent.
///
/// The creator becomes founder and op. With `force` set (module-driven
/// joins) the invite/key/limit/ban checks are skipped.
pub fn join_channel(
    state: &mut ServerState,
    user_id: UserId,
    name: &str,
    key: Option<&str>,
    force: bool,
) -> Result<JoinOutcome, HandlerError> {
    if !is_valid_channel_name(name) {
        return Err(HandlerError::NoSuchChannel(name.to_string()));
    }

    let existing = state.channels.by_name(name);
    let (channel_id, created, status) = match existing {
        Some(id) => {
            if !force {
                check_admission(state, user_id, id, name, key)?;
            }
            (id, false, MemberStatus::default())
        }
        None => {
            let id = state
                .channels
                .create(name, chrono::Utc::now().timestamp())
                .map_err(|_| HandlerError::NoSuchChannel(name.to_string()))?;
            (id, true, MemberStatus::founder_op())
        }
    };

    match state.bind(user_id, channel_id, status) {
        Ok(()) => {}
        Err(StateError::AlreadyJoined) => {
            return Ok(JoinOutcome {
                channel: channel_id,
                created: false,
                joined: false,
            });
        }
        Err(StateError::TooManyChannels) => {
            if created {
                state.channels.remove(channel_id);
            }
            return Err(HandlerError::TooManyChannels(name.to_string()));
        }
        Err(_) => return Err(HandlerError::NoSuchChannel(name.to_string())),
    }

    // A pending invitation is spent by the join.
    let folded = fold(name);
    if let Some(user) = state.users.get_mut(user_id) {
        user.take_invite(&folded);
    }

    let display_name = state
        .channels
        .get(channel_id)
        .map(|c| c.name.clone())
        .unwrap_or_else(|| name.to_string());
    fanout::channel(state, channel_id, user_id, &format!("JOIN :{display_name}"));

    // Fresh channels start +nt, announced by the server.
    if created {
        if let Some(chan) = state.channels.get_mut(channel_id) {
            chan.modes.no_external_msgs = true;
            chan.modes.topic_locked = true;
        }
        fanout::channel_from_server(state, channel_id, &format!("MODE {display_name} +nt"));
    }

    // Joiners only see a topic when one is set; the bare 331 is for
    // explicit TOPIC queries.
    let has_topic = state
        .channels
        .get(channel_id)
        .map(|c| c.topic.is_some())
        .unwrap_or(false);
    if has_topic {
        send_topic(state, user_id, channel_id);
    }
    send_names(state, user_id, channel_id);

    Ok(JoinOutcome {
        channel: channel_id,
        created,
        joined: true,
    })
}

fn check_admission(
    state: &ServerState,
    user_id: UserId,
    channel_id: ChannelId,
    name: &str,
    key: Option<&str>,
) -> HandlerResult {
    let Some(chan) = state.channels.get(channel_id) else {
        return Err(HandlerError::NoSuchChannel(name.to_string()));
    };
    let Some(user) = state.users.get(user_id) else {
        return Err(HandlerError::NoSuchNick(name.to_string()));
    };

    if chan.modes.invite_only && !user.invites.contains(&fold(name)) {
        return Err(HandlerError::InviteOnlyChan(name.to_string()));
    }
    if let Some(required) = &chan.key {
        if key != Some(required.as_str()) {
            return Err(HandlerError::BadChannelKey(name.to_string()));
        }
    }
    if chan.limit > 0 && chan.member_count() >= chan.limit as usize {
        return Err(HandlerError::ChannelIsFull(name.to_string()));
    }
    let hostmask = format!("{}!{}@{}", user.nick, user.ident, user.host);
    if chan.bans.iter().any(|b| match_mask(&b.mask, &hostmask)) {
        return Err(HandlerError::BannedFromChan(name.to_string()));
    }
    Ok(())
}

/// Part a user from a channel, fanning out the notice before the edge is
/// removed so the departing user sees it too.
pub fn part_channel(
    state: &mut ServerState,
    user_id: UserId,
    channel_id: ChannelId,
    reason: Option<&str>,
) -> HandlerResult {
    let Some(chan) = state.channels.get(channel_id) else {
        return Err(HandlerError::NoSuchChannel(String::new()));
    };
    let name = chan.name.clone();
    if !chan.is_member(user_id) {
        return Err(HandlerError::NotOnChannel(name));
    }

    let text = match reason {
        Some(r) if !r.is_empty() => format!("PART {name} :{r}"),
        _ => format!("PART {name}"),
    };
    fanout::channel(state, channel_id, user_id, &text);
    state
        .unlink(user_id, channel_id)
        .map_err(|_| HandlerError::NotOnChannel(name))?;
    Ok(())
}

/// Eject `target` from a channel on behalf of `source`.
pub fn kick_member(
    state: &mut ServerState,
    source: UserId,
    target: UserId,
    channel_id: ChannelId,
    reason: &str,
) -> HandlerResult {
    let Some(chan) = state.channels.get(channel_id) else {
        return Err(HandlerError::NoSuchChannel(String::new()));
    };
    let name = chan.name.clone();
    let target_nick = state
        .users
        .get(target)
        .map(|u| u.nick.clone())
        .unwrap_or_default();

    fanout::channel(
        state,
        channel_id,
        source,
        &format!("KICK {name} {target_nick} :{reason}"),
    );
    state
        .unlink(target, channel_id)
        .map_err(|_| HandlerError::UserNotInChannel(target_nick, name))?;
    Ok(())
}

/// Remove a user from every channel, fanning one QUIT to all onlookers.
/// Returns how many channels were destroyed in the sweep.
pub fn quit_channels(state: &mut ServerState, user_id: UserId, reason: &str) -> usize {
    fanout::common_except(state, user_id, &format!("QUIT :{reason}"));
    let channels: Vec<ChannelId> = state
        .users
        .get(user_id)
        .map(|u| u.memberships.iter().map(|m| m.channel).collect())
        .unwrap_or_default();
    let mut purged = 0;
    for channel in channels {
        if state.unlink(user_id, channel).unwrap_or(false) {
            purged += 1;
        }
    }
    purged
}

/// Send the current topic (332/333) to a user, or 331 when unset.
pub fn send_topic(state: &mut ServerState, user_id: UserId, channel_id: ChannelId) {
    let Some(chan) = state.channels.get(channel_id) else {
        return;
    };
    let name = chan.name.clone();
    match chan.topic.clone() {
        Some(topic) => {
            fanout::numeric(
                state,
                user_id,
                numeric::RPL_TOPIC,
                &format!("{name} :{}", topic.text),
            );
            fanout::numeric(
                state,
                user_id,
                numeric::RPL_TOPICWHOTIME,
                &format!("{name} {} {}", topic.set_by, topic.set_at),
            );
        }
        None => {
            fanout::numeric(
                state,
                user_id,
                numeric::RPL_NOTOPIC,
                &format!("{name} :No topic is set."),
            );
        }
    }
}

/// NAMES burst: 353 lines (split before they outgrow the reply budget,
/// each with a fresh header) then the 366 terminator.
pub fn send_names(state: &mut ServerState, user_id: UserId, channel_id: ChannelId) {
    let Some(chan) = state.channels.get(channel_id) else {
        return;
    };
    let name = chan.name.clone();
    let requester_on_channel = chan.is_member(user_id);

    let mut entries: Vec<String> = Vec::new();
    for &(member, status) in &chan.members {
        let Some(user) = state.users.get(member) else {
            continue;
        };
        // +i users stay hidden from outsiders.
        if !requester_on_channel && user.modes.has('i') {
            continue;
        }
        let mut entry = String::new();
        if let Some(prefix) = status.prefix_char() {
            entry.push(prefix);
        }
        entry.push_str(&user.nick);
        entries.push(entry);
    }

    let header = format!("= {name} :");
    let budget = 480usize.saturating_sub(NICK_MAX);
    let mut line = header.clone();
    for entry in entries {
        if line.len() > header.len() && line.len() + entry.len() + 1 > budget {
            fanout::numeric(state, user_id, numeric::RPL_NAMREPLY, line.trim_end());
            line = header.clone();
        }
        line.push_str(&entry);
        line.push(' ');
    }
    if line.len() > header.len() {
        fanout::numeric(state, user_id, numeric::RPL_NAMREPLY, line.trim_end());
    }
    fanout::numeric(
        state,
        user_id,
        numeric::RPL_ENDOFNAMES,
        &format!("{name} :End of /NAMES list."),
    );
}
