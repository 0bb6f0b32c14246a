//! User query commands: WHOIS, WHO, WHOWAS, USERHOST, ISON, USERS, SUMMON.

use crate::error::{HandlerError, HandlerResult};
use crate::fanout;
use crate::ircd::Ircd;
use crate::state::UserId;
use cinder_proto::{fold, numeric};

pub fn handle_whois(ircd: &mut Ircd, user: UserId, args: &[String]) -> HandlerResult {
    let target_nick = &args[0];
    let Some(target) = ircd.state.users.by_nick(target_nick) else {
        return Err(HandlerError::NoSuchNick(target_nick.clone()));
    };

    let Some(u) = ircd.state.users.get(target) else {
        return Err(HandlerError::NoSuchNick(target_nick.clone()));
    };
    let (nick, ident, dhost, realname, server, away, is_oper, connected_at) = {
        (
            u.nick.clone(),
            u.ident.clone(),
            u.dhost.clone(),
            u.realname.clone(),
            u.server.clone(),
            u.away.clone(),
            u.is_oper(),
            u.connected_at,
        )
    };

    fanout::numeric(
        &mut ircd.state,
        user,
        numeric::RPL_WHOISUSER,
        &format!("{nick} {ident} {dhost} * :{realname}"),
    );

    // Channel list, with status prefixes; secret channels only show to
    // fellow members.
    let mut channels = String::new();
    let memberships: Vec<_> = ircd
        .state
        .users
        .get(target)
        .map(|u| u.memberships.clone())
        .unwrap_or_default();
    for m in memberships {
        let Some(chan) = ircd.state.channels.get(m.channel) else {
            continue;
        };
        if chan.modes.secret && !chan.is_member(user) {
            continue;
        }
        if let Some(prefix) = m.status.prefix_char() {
            channels.push(prefix);
        }
        channels.push_str(&chan.name);
        channels.push(' ');
    }
    if !channels.is_empty() {
        fanout::numeric(
            &mut ircd.state,
            user,
            numeric::RPL_WHOISCHANNELS,
            &format!("{nick} :{}", channels.trim_end()),
        );
    }

    let server_desc = ircd.peers.server_description(&server);
    fanout::numeric(
        &mut ircd.state,
        user,
        numeric::RPL_WHOISSERVER,
        &format!("{nick} {server} :{server_desc}"),
    );
    if let Some(away) = away {
        fanout::numeric(
            &mut ircd.state,
            user,
            numeric::RPL_AWAY,
            &format!("{nick} :{away}"),
        );
    }
    if is_oper {
        fanout::numeric(
            &mut ircd.state,
            user,
            numeric::RPL_WHOISOPERATOR,
            &format!("{nick} :is an IRC operator"),
        );
    }
    fanout::numeric(
        &mut ircd.state,
        user,
        numeric::RPL_WHOISIDLE,
        &format!("{nick} 0 {connected_at} :seconds idle, signon time"),
    );
    fanout::numeric(
        &mut ircd.state,
        user,
        numeric::RPL_ENDOFWHOIS,
        &format!("{nick} :End of /WHOIS list."),
    );
    Ok(())
}

pub fn handle_who(ircd: &mut Ircd, user: UserId, args: &[String]) -> HandlerResult {
    let target = &args[0];
    let mut rows: Vec<String> = Vec::new();

    if let Some(channel) = ircd.state.channels.by_name(target) {
        let chan_name = ircd
            .state
            .channels
            .get(channel)
            .map(|c| c.name.clone())
            .unwrap_or_default();
        let members: Vec<_> = ircd
            .state
            .channels
            .get(channel)
            .map(|c| c.members.clone())
            .unwrap_or_default();
        for (member, status) in members {
            let Some(u) = ircd.state.users.get(member) else {
                continue;
            };
            let mut flags = String::from(if u.away.is_some() { "G" } else { "H" });
            if u.is_oper() {
                flags.push('*');
            }
            if let Some(prefix) = status.prefix_char() {
                flags.push(prefix);
            }
            rows.push(format!(
                "{chan_name} {} {} {} {} {flags} :0 {}",
                u.ident, u.dhost, u.server, u.nick, u.realname
            ));
        }
    } else if let Some(id) = ircd.state.users.by_nick(target) {
        if let Some(u) = ircd.state.users.get(id) {
            let flags = if u.away.is_some() { "G" } else { "H" };
            rows.push(format!(
                "* {} {} {} {} {flags} :0 {}",
                u.ident, u.dhost, u.server, u.nick, u.realname
            ));
        }
    }

    for row in rows {
        fanout::numeric(&mut ircd.state, user, numeric::RPL_WHOREPLY, &row);
    }
    fanout::numeric(
        &mut ircd.state,
        user,
        numeric::RPL_ENDOFWHO,
        &format!("{target} :End of /WHO list."),
    );
    Ok(())
}

pub fn handle_whowas(ircd: &mut Ircd, user: UserId, args: &[String]) -> HandlerResult {
    let nick = &args[0];
    let entries = ircd.state.whowas.get(&fold(nick)).cloned();
    match entries {
        Some(group) if !group.is_empty() => {
            for entry in &group {
                fanout::numeric(
                    &mut ircd.state,
                    user,
                    numeric::RPL_WHOWASUSER,
                    &format!(
                        "{} {} {} * :{}",
                        entry.nick, entry.ident, entry.host, entry.realname
                    ),
                );
                fanout::numeric(
                    &mut ircd.state,
                    user,
                    numeric::RPL_WHOISSERVER,
                    &format!("{} {} :{}", entry.nick, entry.server, entry.logout_at),
                );
            }
        }
        _ => {
            fanout::numeric(
                &mut ircd.state,
                user,
                numeric::ERR_WASNOSUCHNICK,
                &format!("{nick} :There was no such nickname"),
            );
        }
    }
    fanout::numeric(
        &mut ircd.state,
        user,
        numeric::RPL_ENDOFWHOWAS,
        &format!("{nick} :End of WHOWAS"),
    );
    Ok(())
}

pub fn handle_userhost(ircd: &mut Ircd, user: UserId, args: &[String]) -> HandlerResult {
    let mut reply = String::from(":");
    for nick in args.iter().take(5) {
        let Some(id) = ircd.state.users.by_nick(nick) else {
            continue;
        };
        let Some(u) = ircd.state.users.get(id) else {
            continue;
        };
        let oper_mark = if u.is_oper() { "*" } else { "" };
        reply.push_str(&format!("{}{}=+{}@{} ", u.nick, oper_mark, u.ident, u.dhost));
    }
    let reply = reply.trim_end().to_string();
    fanout::numeric(&mut ircd.state, user, numeric::RPL_USERHOST, &reply);
    Ok(())
}

pub fn handle_ison(ircd: &mut Ircd, user: UserId, args: &[String]) -> HandlerResult {
    let mut present = String::from(":");
    for nick in args {
        // ISON may arrive as one space-separated trailing parameter.
        for candidate in nick.split(' ') {
            if candidate.is_empty() {
                continue;
            }
            if let Some(id) = ircd.state.users.by_nick(candidate) {
                if let Some(u) = ircd.state.users.get(id) {
                    present.push_str(&u.nick);
                    present.push(' ');
                }
            }
        }
    }
    let present = present.trim_end().to_string();
    fanout::numeric(&mut ircd.state, user, numeric::RPL_ISON, &present);
    Ok(())
}

pub fn handle_users(ircd: &mut Ircd, user: UserId, _args: &[String]) -> HandlerResult {
    fanout::numeric(
        &mut ircd.state,
        user,
        numeric::RPL_USERSDISABLED,
        ":USERS has been disabled",
    );
    Ok(())
}

pub fn handle_summon(ircd: &mut Ircd, user: UserId, _args: &[String]) -> HandlerResult {
    fanout::numeric(
        &mut ircd.state,
        user,
        numeric::ERR_SUMMONDISABLED,
        ":SUMMON has been disabled",
    );
    Ok(())
}
