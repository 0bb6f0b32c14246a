//! Messaging commands: PRIVMSG, NOTICE, WALLOPS.

use crate::error::{HandlerError, HandlerResult};
use crate::fanout;
use crate::ircd::Ircd;
use crate::state::UserId;
use cinder_proto::numeric;

pub fn handle_privmsg(ircd: &mut Ircd, user: UserId, args: &[String]) -> HandlerResult {
    deliver(ircd, user, args, "PRIVMSG")
}

pub fn handle_notice(ircd: &mut Ircd, user: UserId, args: &[String]) -> HandlerResult {
    deliver(ircd, user, args, "NOTICE")
}

fn deliver(ircd: &mut Ircd, user: UserId, args: &[String], verb: &str) -> HandlerResult {
    let target = &args[0];
    let text = &args[1];

    if target.starts_with(['#', '&', '+']) {
        let Some(channel) = ircd.state.channels.by_name(target) else {
            return Err(HandlerError::NoSuchNick(target.clone()));
        };
        let chan = ircd.state.channels.get(channel);
        let member_status = chan.and_then(|c| c.member_status(user));
        let no_external = chan.map(|c| c.modes.no_external_msgs).unwrap_or(false);
        let moderated = chan.map(|c| c.modes.moderated).unwrap_or(false);

        if member_status.is_none() && no_external {
            return Err(HandlerError::CannotSendToChan(target.clone()));
        }
        if moderated && !member_status.map(|s| s.has_voice_or_higher()).unwrap_or(false) {
            return Err(HandlerError::CannotSendToChan(target.clone()));
        }

        fanout::channel_local(
            &mut ircd.state,
            channel,
            Some(user),
            &format!("{verb} {target} :{text}"),
        );
        let nick = ircd
            .state
            .users
            .get(user)
            .map(|u| u.nick.clone())
            .unwrap_or_default();
        ircd.net_send_common(user, &format!(":{nick} {verb} {target} :{text}"));
        return Ok(());
    }

    let Some(dest) = ircd.state.users.by_nick(target) else {
        return Err(HandlerError::NoSuchNick(target.clone()));
    };
    let (dest_local, dest_server, dest_away) = {
        let u = ircd.state.users.get(dest);
        (
            u.map(|u| u.is_local()).unwrap_or(false),
            u.map(|u| u.server.clone()).unwrap_or_default(),
            u.and_then(|u| u.away.clone()),
        )
    };

    if verb == "PRIVMSG" {
        if let Some(away) = dest_away {
            fanout::numeric(
                &mut ircd.state,
                user,
                numeric::RPL_AWAY,
                &format!("{target} :{away}"),
            );
        }
    }

    if dest_local {
        fanout::to(
            &mut ircd.state,
            Some(user),
            dest,
            &format!("{verb} {target} :{text}"),
        );
    } else {
        let nick = ircd
            .state
            .users
            .get(user)
            .map(|u| u.nick.clone())
            .unwrap_or_default();
        let line = format!(":{nick} {verb} {target} :{text}");
        let Ircd {
            peers, modules, ..
        } = ircd;
        peers.send_to_one(modules, &dest_server, &line);
    }
    Ok(())
}

pub fn handle_wallops(ircd: &mut Ircd, user: UserId, args: &[String]) -> HandlerResult {
    let text = &args[0];
    fanout::wallops(&mut ircd.state, user, text);
    let nick = ircd
        .state
        .users
        .get(user)
        .map(|u| u.nick.clone())
        .unwrap_or_default();
    ircd.net_send_all(&format!("@ {nick} :{text}"));
    Ok(())
}
