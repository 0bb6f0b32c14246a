//! Connection and registration commands: USER, NICK, PASS, QUIT, PING,
//! PONG, OPER, AWAY, SERVER.

use crate::bans::match_mask;
use crate::error::{HandlerError, HandlerResult};
use crate::fanout;
use crate::ircd::Ircd;
use crate::state::UserId;
use cinder_proto::{is_valid_nick, numeric};

const IDENT_MAX: usize = 10;

pub fn handle_user(ircd: &mut Ircd, user: UserId, args: &[String]) -> HandlerResult {
    let Some(u) = ircd.state.users.get_mut(user) else {
        return Ok(());
    };
    if u.registration.is_registered() {
        return Err(HandlerError::AlreadyRegistered);
    }
    let mut ident = String::from("~");
    ident.push_str(&args[0]);
    ident.truncate(IDENT_MAX);
    u.ident = ident;
    u.realname = args[3].clone();
    u.registration = u.registration.on_user();
    Ok(())
}

pub fn handle_nick(ircd: &mut Ircd, user: UserId, args: &[String]) -> HandlerResult {
    let newnick = args[0].clone();
    if newnick.is_empty() {
        return Err(HandlerError::NoNicknameGiven);
    }
    if !is_valid_nick(&newnick) {
        return Err(HandlerError::ErroneousNickname(newnick));
    }
    if ircd.xlines.check_nick(&newnick).is_some() {
        return Err(HandlerError::ErroneousNickname(newnick));
    }
    if let Some(holder) = ircd.state.users.by_nick(&newnick) {
        if holder != user {
            return Err(HandlerError::NicknameInUse(newnick));
        }
    }

    let Some(u) = ircd.state.users.get(user) else {
        return Ok(());
    };
    let registered = u.registration.is_registered();
    let oldnick = u.nick.clone();

    if registered {
        // Onlookers see the old prefix announcing the new name.
        fanout::common(&mut ircd.state, user, &format!("NICK :{newnick}"));
        ircd.net_send_common(user, &format!(":{oldnick} NICK {newnick}"));
    }

    ircd.state
        .users
        .bind_nick(user, &newnick)
        .map_err(|_| HandlerError::NicknameInUse(newnick.clone()))?;

    if !registered {
        if let Some(u) = ircd.state.users.get_mut(user) {
            u.registration = u.registration.on_nick();
        }
    }
    Ok(())
}

pub fn handle_pass(ircd: &mut Ircd, user: UserId, args: &[String]) -> HandlerResult {
    let Some(u) = ircd.state.users.get_mut(user) else {
        return Ok(());
    };
    if u.registration.is_registered() {
        return Err(HandlerError::AlreadyRegistered);
    }
    u.password = Some(args[0].clone());
    Ok(())
}

pub fn handle_quit(_ircd: &mut Ircd, _user: UserId, args: &[String]) -> HandlerResult {
    let reason = args
        .first()
        .filter(|r| !r.is_empty())
        .cloned()
        .unwrap_or_else(|| "Client exited".to_string());
    Err(HandlerError::Quit(reason))
}

pub fn handle_ping(ircd: &mut Ircd, user: UserId, args: &[String]) -> HandlerResult {
    let Some(conn) = ircd.state.users.get(user).map(|u| u.conn) else {
        return Ok(());
    };
    let server = ircd.state.server_name.clone();
    fanout::server(
        &mut ircd.state,
        conn,
        &format!("PONG {server} :{}", args[0]),
    );
    Ok(())
}

pub fn handle_pong(_ircd: &mut Ircd, _user: UserId, _args: &[String]) -> HandlerResult {
    Ok(())
}

pub fn handle_oper(ircd: &mut Ircd, user: UserId, args: &[String]) -> HandlerResult {
    let (nick, ident, host) = {
        let Some(u) = ircd.state.users.get(user) else {
            return Ok(());
        };
        (u.nick.clone(), u.ident.clone(), u.host.clone())
    };
    let idhost = format!("{ident}@{host}");

    let matched = ircd
        .config
        .oper
        .iter()
        .any(|o| o.name == args[0] && o.password == args[1] && match_mask(&o.host, &idhost));
    if !matched {
        fanout::opers(
            &mut ircd.state,
            &format!("*** Failed oper attempt by {nick} ({idhost})"),
        );
        return Err(HandlerError::NoOperHost);
    }

    ircd.state.set_user_mode(user, 'o', true);
    fanout::numeric(
        &mut ircd.state,
        user,
        numeric::RPL_YOUREOPER,
        ":You are now an IRC operator",
    );
    fanout::to(
        &mut ircd.state,
        Some(user),
        user,
        &format!("MODE {nick} :+o"),
    );
    fanout::opers(
        &mut ircd.state,
        &format!("*** {nick} ({idhost}) is now an IRC operator"),
    );
    ircd.with_api(|api, modules| modules.oper(api, user));
    Ok(())
}

pub fn handle_away(ircd: &mut Ircd, user: UserId, args: &[String]) -> HandlerResult {
    let message = args.first().filter(|m| !m.is_empty()).cloned();
    let going_away = message.is_some();
    if let Some(u) = ircd.state.users.get_mut(user) {
        u.away = message;
    }
    if going_away {
        fanout::numeric(
            &mut ircd.state,
            user,
            numeric::RPL_NOWAWAY,
            ":You have been marked as being away",
        );
    } else {
        fanout::numeric(
            &mut ircd.state,
            user,
            numeric::RPL_UNAWAY,
            ":You are no longer marked as being away",
        );
    }
    Ok(())
}

/// SERVER from a local client socket: not a peer link, refuse politely.
pub fn handle_server(ircd: &mut Ircd, user: UserId, _args: &[String]) -> HandlerResult {
    let Some(u) = ircd.state.users.get(user) else {
        return Ok(());
    };
    let nick = u.nick_or_star().to_string();
    let conn = u.conn;
    fanout::server(
        &mut ircd.state,
        conn,
        &format!("NOTICE {nick} :SERVER is only valid on server-to-server links"),
    );
    Ok(())
}

/// The 001..005 burst plus LUSERS and MOTD, sent at promotion.
pub fn send_welcome_burst(ircd: &mut Ircd, user: UserId) {
    let Some(u) = ircd.state.users.get(user) else {
        return;
    };
    let nick = u.nick.clone();
    let ident = u.ident.clone();
    let dhost = u.dhost.clone();
    let server = ircd.state.server_name.clone();
    let network = ircd.state.network.clone();
    let version = concat!("cinderd-", env!("CARGO_PKG_VERSION"));
    let created = chrono::DateTime::from_timestamp(ircd.state.created_at, 0)
        .map(|t| t.format("%a %b %d %Y at %H:%M:%S UTC").to_string())
        .unwrap_or_default();

    fanout::numeric(
        &mut ircd.state,
        user,
        numeric::RPL_WELCOME,
        &format!(":Welcome to the {network} IRC Network {nick}!{ident}@{dhost}"),
    );
    fanout::numeric(
        &mut ircd.state,
        user,
        numeric::RPL_YOURHOST,
        &format!(":Your host is {server}, running version {version}"),
    );
    fanout::numeric(
        &mut ircd.state,
        user,
        numeric::RPL_CREATED,
        &format!(":This server was created {created}"),
    );
    fanout::numeric(
        &mut ircd.state,
        user,
        numeric::RPL_MYINFO,
        &format!("{server} {version} iows bhiklmnopstv"),
    );
    let max_chans = ircd.state.max_chans;
    fanout::numeric(
        &mut ircd.state,
        user,
        numeric::RPL_ISUPPORT,
        &format!(
            "NETWORK={network} CASEMAPPING=rfc1459 CHANTYPES=#&+ PREFIX=(ohv)@%+ \
             CHANMODES=b,k,l,ntimsp MAXCHANNELS={max_chans} NICKLEN=32 \
             :are supported by this server"
        ),
    );
    super::server_query::send_lusers(ircd, user);
    super::server_query::send_motd(ircd, user);
}
