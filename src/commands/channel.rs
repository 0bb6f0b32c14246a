//! Channel commands: JOIN, PART, KICK, TOPIC, NAMES, INVITE, MODE, LIST.

use crate::error::{HandlerError, HandlerResult};
use crate::fanout;
use crate::ircd::Ircd;
use crate::membership;
use crate::modules::{Decision, ModeTarget};
use crate::state::{BanEntry, ChannelId, UserId};
use cinder_proto::{fold, numeric};

pub fn handle_join(ircd: &mut Ircd, user: UserId, args: &[String]) -> HandlerResult {
    let keys: Vec<&str> = args.get(1).map(|k| k.split(',').collect()).unwrap_or_default();
    for (i, name) in args[0].split(',').filter(|n| !n.is_empty()).enumerate() {
        let key = keys.get(i).copied().filter(|k| !k.is_empty());
        match membership::join_channel(&mut ircd.state, user, name, key, false) {
            Ok(out) => {
                if out.created {
                    ircd.with_api(|api, modules| modules.channel_create(api, out.channel));
                }
                if out.joined {
                    ircd.with_api(|api, modules| modules.join(api, user, out.channel));
                    let nick = nick_of(ircd, user);
                    let chan_name = ircd
                        .state
                        .channels
                        .get(out.channel)
                        .map(|c| c.name.clone())
                        .unwrap_or_else(|| name.to_string());
                    ircd.net_send_all(&format!(":{nick} JOIN {chan_name}"));
                }
            }
            Err(e) => {
                if let Some((num, text)) = e.to_numeric() {
                    fanout::numeric(&mut ircd.state, user, num, &text);
                }
            }
        }
    }
    Ok(())
}

pub fn handle_part(ircd: &mut Ircd, user: UserId, args: &[String]) -> HandlerResult {
    let reason = args.get(1).cloned();
    for name in args[0].split(',').filter(|n| !n.is_empty()) {
        let Some(channel) = ircd.state.channels.by_name(name) else {
            fanout::numeric(
                &mut ircd.state,
                user,
                numeric::ERR_NOSUCHCHANNEL,
                &format!("{name} :No such channel"),
            );
            continue;
        };
        match membership::part_channel(&mut ircd.state, user, channel, reason.as_deref()) {
            Ok(()) => {
                ircd.with_api(|api, modules| modules.part(api, user, channel));
                let nick = nick_of(ircd, user);
                ircd.net_send_all(&format!(":{nick} PART {name}"));
            }
            Err(e) => {
                if let Some((num, text)) = e.to_numeric() {
                    fanout::numeric(&mut ircd.state, user, num, &text);
                }
            }
        }
    }
    Ok(())
}

pub fn handle_kick(ircd: &mut Ircd, user: UserId, args: &[String]) -> HandlerResult {
    let chan_name = &args[0];
    let target_nick = &args[1];
    let reason = args
        .get(2)
        .filter(|r| !r.is_empty())
        .cloned()
        .unwrap_or_else(|| nick_of(ircd, user));

    let channel = ircd
        .state
        .channels
        .by_name(chan_name)
        .ok_or_else(|| HandlerError::NoSuchChannel(chan_name.clone()))?;
    let target = ircd
        .state
        .users
        .by_nick(target_nick)
        .ok_or_else(|| HandlerError::NoSuchNick(target_nick.clone()))?;

    let kicker_status = ircd
        .state
        .channels
        .get(channel)
        .and_then(|c| c.member_status(user))
        .ok_or_else(|| HandlerError::NotOnChannel(chan_name.clone()))?;
    if !kicker_status.op && !kicker_status.halfop {
        return Err(HandlerError::ChanOpPrivsNeeded(chan_name.clone()));
    }
    let target_on = ircd
        .state
        .channels
        .get(channel)
        .map(|c| c.is_member(target))
        .unwrap_or(false);
    if !target_on {
        return Err(HandlerError::UserNotInChannel(
            target_nick.clone(),
            chan_name.clone(),
        ));
    }

    membership::kick_member(&mut ircd.state, user, target, channel, &reason)?;
    ircd.with_api(|api, modules| modules.kick(api, user, target, channel));
    let nick = nick_of(ircd, user);
    ircd.net_send_all(&format!(":{nick} KICK {chan_name} {target_nick} :{reason}"));
    Ok(())
}

pub fn handle_topic(ircd: &mut Ircd, user: UserId, args: &[String]) -> HandlerResult {
    let chan_name = &args[0];
    let channel = ircd
        .state
        .channels
        .by_name(chan_name)
        .ok_or_else(|| HandlerError::NoSuchChannel(chan_name.clone()))?;

    if args.len() == 1 {
        membership::send_topic(&mut ircd.state, user, channel);
        return Ok(());
    }

    let status = ircd
        .state
        .channels
        .get(channel)
        .and_then(|c| c.member_status(user))
        .ok_or_else(|| HandlerError::NotOnChannel(chan_name.clone()))?;
    let locked = ircd
        .state
        .channels
        .get(channel)
        .map(|c| c.modes.topic_locked)
        .unwrap_or(false);
    if locked && !status.op && !status.halfop {
        return Err(HandlerError::ChanOpPrivsNeeded(chan_name.clone()));
    }

    let text = args[1].clone();
    let decision =
        ircd.with_api(|api, modules| modules.topic_change(api, user, channel, &text));
    if decision == Decision::Halt {
        return Err(HandlerError::Veto);
    }

    let nick = nick_of(ircd, user);
    if let Some(chan) = ircd.state.channels.get_mut(channel) {
        chan.topic = Some(crate::state::Topic {
            text: text.clone(),
            set_by: nick.clone(),
            set_at: chrono::Utc::now().timestamp(),
        });
    }
    fanout::channel(
        &mut ircd.state,
        channel,
        user,
        &format!("TOPIC {chan_name} :{text}"),
    );
    ircd.net_send_common(user, &format!(":{nick} TOPIC {chan_name} :{text}"));
    Ok(())
}

pub fn handle_names(ircd: &mut Ircd, user: UserId, args: &[String]) -> HandlerResult {
    match args.first().and_then(|n| ircd.state.channels.by_name(n)) {
        Some(channel) => membership::send_names(&mut ircd.state, user, channel),
        None => {
            let shown = args.first().map(String::as_str).unwrap_or("*");
            fanout::numeric(
                &mut ircd.state,
                user,
                numeric::RPL_ENDOFNAMES,
                &format!("{shown} :End of /NAMES list."),
            );
        }
    }
    Ok(())
}

pub fn handle_invite(ircd: &mut Ircd, user: UserId, args: &[String]) -> HandlerResult {
    if args.len() < 2 {
        fanout::numeric(
            &mut ircd.state,
            user,
            numeric::ERR_NEEDMOREPARAMS,
            "INVITE :Not enough parameters",
        );
        return Ok(());
    }
    let target_nick = &args[0];
    let chan_name = &args[1];

    let target = ircd
        .state
        .users
        .by_nick(target_nick)
        .ok_or_else(|| HandlerError::NoSuchNick(target_nick.clone()))?;
    let channel = ircd
        .state
        .channels
        .by_name(chan_name)
        .ok_or_else(|| HandlerError::NoSuchChannel(chan_name.clone()))?;

    let inviter_status = ircd
        .state
        .channels
        .get(channel)
        .and_then(|c| c.member_status(user))
        .ok_or_else(|| HandlerError::NotOnChannel(chan_name.clone()))?;
    let chan = ircd.state.channels.get(channel);
    if chan.map(|c| c.is_member(target)).unwrap_or(false) {
        return Err(HandlerError::UserNotInChannel(
            target_nick.clone(),
            chan_name.clone(),
        ));
    }
    let invite_only = ircd
        .state
        .channels
        .get(channel)
        .map(|c| c.modes.invite_only)
        .unwrap_or(false);
    if invite_only && !inviter_status.op {
        return Err(HandlerError::ChanOpPrivsNeeded(chan_name.clone()));
    }

    let folded = fold(chan_name);
    if let Some(t) = ircd.state.users.get_mut(target) {
        if !t.invites.contains(&folded) {
            t.invites.push(folded);
        }
    }
    fanout::numeric(
        &mut ircd.state,
        user,
        numeric::RPL_INVITING,
        &format!("{target_nick} {chan_name}"),
    );
    fanout::to(
        &mut ircd.state,
        Some(user),
        target,
        &format!("INVITE {target_nick} :{chan_name}"),
    );
    Ok(())
}

pub fn handle_list(ircd: &mut Ircd, user: UserId, _args: &[String]) -> HandlerResult {
    fanout::numeric(
        &mut ircd.state,
        user,
        numeric::RPL_LISTSTART,
        "Channel :Users Name",
    );
    let rows: Vec<(String, usize, String)> = ircd
        .state
        .channels
        .iter()
        .filter(|c| !(c.modes.secret || c.modes.is_private) || c.is_member(user))
        .map(|c| {
            let topic = c.topic.as_ref().map(|t| t.text.clone()).unwrap_or_default();
            (c.name.clone(), c.member_count(), topic)
        })
        .collect();
    for (name, count, topic) in rows {
        fanout::numeric(
            &mut ircd.state,
            user,
            numeric::RPL_LIST,
            &format!("{name} {count} :{topic}"),
        );
    }
    fanout::numeric(
        &mut ircd.state,
        user,
        numeric::RPL_LISTEND,
        ":End of channel list.",
    );
    Ok(())
}

pub fn handle_mode(ircd: &mut Ircd, user: UserId, args: &[String]) -> HandlerResult {
    if args[0].starts_with(['#', '&', '+']) {
        channel_mode(ircd, user, args)
    } else {
        user_mode(ircd, user, args)
    }
}

fn channel_mode(ircd: &mut Ircd, user: UserId, args: &[String]) -> HandlerResult {
    let chan_name = args[0].clone();
    let channel = ircd
        .state
        .channels
        .by_name(&chan_name)
        .ok_or_else(|| HandlerError::NoSuchChannel(chan_name.clone()))?;

    if args.len() == 1 {
        let (flags, params) = ircd
            .state
            .channels
            .get(channel)
            .map(|c| c.render_modes())
            .unwrap_or_default();
        fanout::numeric(
            &mut ircd.state,
            user,
            numeric::RPL_CHANNELMODEIS,
            &format!("{chan_name} +{flags}{params}"),
        );
        return Ok(());
    }

    // Ban list query is open to anyone.
    if args[1] == "b" && args.len() == 2 {
        let bans: Vec<BanEntry> = ircd
            .state
            .channels
            .get(channel)
            .map(|c| c.bans.clone())
            .unwrap_or_default();
        for ban in bans {
            fanout::numeric(
                &mut ircd.state,
                user,
                numeric::RPL_BANLIST,
                &format!("{chan_name} {} {} {}", ban.mask, ban.set_by, ban.set_at),
            );
        }
        fanout::numeric(
            &mut ircd.state,
            user,
            numeric::RPL_ENDOFBANLIST,
            &format!("{chan_name} :End of channel ban list"),
        );
        return Ok(());
    }

    let status = ircd
        .state
        .channels
        .get(channel)
        .and_then(|c| c.member_status(user))
        .ok_or_else(|| HandlerError::NotOnChannel(chan_name.clone()))?;
    if !status.op {
        return Err(HandlerError::ChanOpPrivsNeeded(chan_name.clone()));
    }

    apply_channel_modes(ircd, user, channel, &chan_name, args)
}

fn apply_channel_modes(
    ircd: &mut Ircd,
    user: UserId,
    channel: ChannelId,
    chan_name: &str,
    args: &[String],
) -> HandlerResult {
    let mut adding = true;
    let mut param_idx = 2;
    let mut out_modes = String::new();
    let mut out_params: Vec<String> = Vec::new();
    let mut last_sign = ' ';

    let changes = args[1].clone();
    for letter in changes.chars() {
        match letter {
            '+' => adding = true,
            '-' => adding = false,
            'n' | 't' | 'i' | 'm' | 's' | 'p' => {
                if hook_mode(ircd, user, channel, letter, adding, None) == Decision::Halt {
                    continue;
                }
                let changed = ircd
                    .state
                    .channels
                    .get_mut(channel)
                    .and_then(|c| c.modes.flag_mut(letter).map(|f| {
                        let changed = *f != adding;
                        *f = adding;
                        changed
                    }))
                    .unwrap_or(false);
                if changed {
                    push_mode(&mut out_modes, &mut last_sign, adding, letter);
                }
            }
            'k' => {
                if adding {
                    let Some(key) = args.get(param_idx).cloned() else {
                        continue;
                    };
                    param_idx += 1;
                    if hook_mode(ircd, user, channel, 'k', true, Some(&key)) == Decision::Halt {
                        continue;
                    }
                    if let Some(c) = ircd.state.channels.get_mut(channel) {
                        c.key = Some(key.clone());
                    }
                    push_mode(&mut out_modes, &mut last_sign, true, 'k');
                    out_params.push(key);
                } else {
                    if hook_mode(ircd, user, channel, 'k', false, None) == Decision::Halt {
                        continue;
                    }
                    let had = ircd
                        .state
                        .channels
                        .get_mut(channel)
                        .map(|c| c.key.take().is_some())
                        .unwrap_or(false);
                    if had {
                        push_mode(&mut out_modes, &mut last_sign, false, 'k');
                    }
                }
            }
            'l' => {
                if adding {
                    let Some(raw) = args.get(param_idx).cloned() else {
                        continue;
                    };
                    param_idx += 1;
                    let Ok(limit) = raw.parse::<u32>() else {
                        continue;
                    };
                    if hook_mode(ircd, user, channel, 'l', true, Some(&raw)) == Decision::Halt {
                        continue;
                    }
                    if let Some(c) = ircd.state.channels.get_mut(channel) {
                        c.limit = limit;
                    }
                    push_mode(&mut out_modes, &mut last_sign, true, 'l');
                    out_params.push(raw);
                } else {
                    if hook_mode(ircd, user, channel, 'l', false, None) == Decision::Halt {
                        continue;
                    }
                    let had = ircd
                        .state
                        .channels
                        .get_mut(channel)
                        .map(|c| {
                            let had = c.limit > 0;
                            c.limit = 0;
                            had
                        })
                        .unwrap_or(false);
                    if had {
                        push_mode(&mut out_modes, &mut last_sign, false, 'l');
                    }
                }
            }
            'o' | 'h' | 'v' => {
                let Some(nick) = args.get(param_idx).cloned() else {
                    continue;
                };
                param_idx += 1;
                let Some(target) = ircd.state.users.by_nick(&nick) else {
                    fanout::numeric(
                        &mut ircd.state,
                        user,
                        numeric::ERR_NOSUCHNICK,
                        &format!("{nick} :No such nick/channel"),
                    );
                    continue;
                };
                let on_channel = ircd
                    .state
                    .channels
                    .get(channel)
                    .map(|c| c.is_member(target))
                    .unwrap_or(false);
                if !on_channel {
                    fanout::numeric(
                        &mut ircd.state,
                        user,
                        numeric::ERR_USERNOTINCHANNEL,
                        &format!("{nick} {chan_name} :They aren't on that channel"),
                    );
                    continue;
                }
                if hook_mode(ircd, user, channel, letter, adding, Some(&nick)) == Decision::Halt {
                    continue;
                }
                if ircd.state.set_member_status(target, channel, letter, adding) {
                    push_mode(&mut out_modes, &mut last_sign, adding, letter);
                    out_params.push(nick);
                }
            }
            'b' => {
                let Some(mask) = args.get(param_idx).cloned() else {
                    continue;
                };
                param_idx += 1;
                if hook_mode(ircd, user, channel, 'b', adding, Some(&mask)) == Decision::Halt {
                    continue;
                }
                if adding {
                    let limit = ircd.config.ban_limit_for(chan_name);
                    let full = ircd
                        .state
                        .channels
                        .get(channel)
                        .map(|c| c.bans.len() >= limit)
                        .unwrap_or(false);
                    if full {
                        if let Some((num, text)) =
                            HandlerError::BanListFull(chan_name.to_string()).to_numeric()
                        {
                            fanout::numeric(&mut ircd.state, user, num, &text);
                        }
                        continue;
                    }
                    let setter = nick_of(ircd, user);
                    let changed = ircd
                        .state
                        .channels
                        .get_mut(channel)
                        .map(|c| {
                            if c.bans.iter().any(|b| b.mask == mask) {
                                return false;
                            }
                            c.bans.push(BanEntry {
                                mask: mask.clone(),
                                set_by: setter,
                                set_at: chrono::Utc::now().timestamp(),
                            });
                            true
                        })
                        .unwrap_or(false);
                    if changed {
                        push_mode(&mut out_modes, &mut last_sign, true, 'b');
                        out_params.push(mask);
                    }
                } else {
                    let changed = ircd
                        .state
                        .channels
                        .get_mut(channel)
                        .map(|c| {
                            let before = c.bans.len();
                            c.bans.retain(|b| b.mask != mask);
                            c.bans.len() != before
                        })
                        .unwrap_or(false);
                    if changed {
                        push_mode(&mut out_modes, &mut last_sign, false, 'b');
                        out_params.push(mask);
                    }
                }
            }
            other => {
                // Module-registered (custom) modes take one optional
                // parameter when set.
                let param = args.get(param_idx).cloned();
                match hook_mode(ircd, user, channel, other, adding, param.as_deref()) {
                    Decision::Passthru => {
                        let changed = ircd
                            .state
                            .channels
                            .get_mut(channel)
                            .map(|c| {
                                if adding {
                                    let took = c.set_custom_mode(other, param.clone());
                                    took
                                } else {
                                    c.unset_custom_mode(other)
                                }
                            })
                            .unwrap_or(false);
                        if changed {
                            push_mode(&mut out_modes, &mut last_sign, adding, other);
                            if adding {
                                if let Some(p) = param {
                                    out_params.push(p);
                                    param_idx += 1;
                                }
                            }
                        }
                    }
                    Decision::Halt => {}
                    Decision::Continue => {
                        fanout::numeric(
                            &mut ircd.state,
                            user,
                            numeric::ERR_UNKNOWNMODE,
                            &format!("{other} :is unknown mode char to me for {chan_name}"),
                        );
                    }
                }
            }
        }
    }

    if !out_modes.is_empty() {
        let mut line = format!("MODE {chan_name} {out_modes}");
        for p in &out_params {
            line.push(' ');
            line.push_str(p);
        }
        fanout::channel(&mut ircd.state, channel, user, &line);
        let nick = nick_of(ircd, user);
        ircd.net_send_common(user, &format!(":{nick} {line}"));
    }
    Ok(())
}

fn user_mode(ircd: &mut Ircd, user: UserId, args: &[String]) -> HandlerResult {
    let Some(target) = ircd.state.users.by_nick(&args[0]) else {
        return Err(HandlerError::NoSuchNick(args[0].clone()));
    };
    if target != user {
        return Err(HandlerError::UsersDontMatch);
    }

    let nick = nick_of(ircd, user);
    if args.len() == 1 {
        let modes = ircd
            .state
            .users
            .get(user)
            .map(|u| u.modes.to_display())
            .unwrap_or_default();
        fanout::numeric(&mut ircd.state, user, numeric::RPL_UMODEIS, &modes);
        return Ok(());
    }

    let mut adding = true;
    let mut out = String::new();
    let mut last_sign = ' ';
    let changes = args[1].clone();
    for letter in changes.chars() {
        match letter {
            '+' => adding = true,
            '-' => adding = false,
            'i' | 'w' | 's' => {
                let decision = ircd.with_api(|api, modules| {
                    modules.mode_change(api, user, ModeTarget::User(user), letter, adding, None)
                });
                if decision == Decision::Halt {
                    continue;
                }
                if ircd.state.set_user_mode(user, letter, adding) {
                    push_mode(&mut out, &mut last_sign, adding, letter);
                }
            }
            // Oper status is granted by OPER alone; it can only be shed here.
            'o' if !adding => {
                if ircd.state.set_user_mode(user, 'o', false) {
                    push_mode(&mut out, &mut last_sign, false, 'o');
                }
            }
            _ => {}
        }
    }
    if !out.is_empty() {
        fanout::to(
            &mut ircd.state,
            Some(user),
            user,
            &format!("MODE {nick} :{out}"),
        );
    }
    Ok(())
}

fn hook_mode(
    ircd: &mut Ircd,
    user: UserId,
    channel: ChannelId,
    letter: char,
    on: bool,
    param: Option<&str>,
) -> Decision {
    ircd.with_api(|api, modules| {
        modules.mode_change(api, user, ModeTarget::Channel(channel), letter, on, param)
    })
}

fn push_mode(out: &mut String, last_sign: &mut char, adding: bool, letter: char) {
    let sign = if adding { '+' } else { '-' };
    if *last_sign != sign {
        out.push(sign);
        *last_sign = sign;
    }
    out.push(letter);
}

fn nick_of(ircd: &Ircd, user: UserId) -> String {
    ircd.state
        .users
        .get(user)
        .map(|u| u.nick.clone())
        .unwrap_or_default()
}
