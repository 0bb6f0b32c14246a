//! Operator commands: DIE, RESTART, KILL, REHASH, CONNECT, SQUIT, the
//! x-line family, and module management.

use crate::bans::XLineKind;
use crate::error::{HandlerError, HandlerResult};
use crate::fanout;
use crate::ircd::{Ircd, Shutdown};
use crate::peers::PeerState;
use crate::state::UserId;
use cinder_proto::numeric;

pub fn handle_die(ircd: &mut Ircd, user: UserId, args: &[String]) -> HandlerResult {
    if !password_ok(ircd.config.server.die_password.as_deref(), &args[0]) {
        return Err(HandlerError::PasswdMismatch);
    }
    let nick = nick_of(ircd, user);
    tracing::warn!(by = %nick, "DIE issued");
    fanout::opers(&mut ircd.state, &format!("*** {nick} used DIE"));
    fanout::send_error_all(&mut ircd.state, "Server terminating!");
    ircd.shutdown = Some(Shutdown::Die);
    Ok(())
}

pub fn handle_restart(ircd: &mut Ircd, user: UserId, args: &[String]) -> HandlerResult {
    if !password_ok(ircd.config.server.restart_password.as_deref(), &args[0]) {
        return Err(HandlerError::PasswdMismatch);
    }
    let nick = nick_of(ircd, user);
    tracing::warn!(by = %nick, "RESTART issued");
    fanout::send_error_all(&mut ircd.state, "Server restarting!");
    ircd.shutdown = Some(Shutdown::Restart);
    Ok(())
}

fn password_ok(configured: Option<&str>, given: &str) -> bool {
    match configured {
        Some(expected) => expected == given,
        None => true,
    }
}

pub fn handle_kill(ircd: &mut Ircd, user: UserId, args: &[String]) -> HandlerResult {
    let target_nick = &args[0];
    let reason = &args[1];
    let Some(target) = ircd.state.users.by_nick(target_nick) else {
        return Err(HandlerError::NoSuchNick(target_nick.clone()));
    };
    let nick = nick_of(ircd, user);
    let full_reason = format!("Killed ({nick} ({reason}))");

    fanout::opers(
        &mut ircd.state,
        &format!("*** {nick} killed {target_nick}: {reason}"),
    );
    fanout::to(
        &mut ircd.state,
        Some(user),
        target,
        &format!("KILL {target_nick} :{full_reason}"),
    );
    ircd.quit_user(target, &full_reason, true);
    Ok(())
}

pub fn handle_rehash(ircd: &mut Ircd, user: UserId, _args: &[String]) -> HandlerResult {
    let config_name = "cinderd.toml";
    fanout::numeric(
        &mut ircd.state,
        user,
        numeric::RPL_REHASHING,
        &format!("{config_name} :Rehashing"),
    );
    ircd.rehash();
    Ok(())
}

pub fn handle_connect(ircd: &mut Ircd, user: UserId, args: &[String]) -> HandlerResult {
    let target = &args[0];
    let Some(link) = ircd.find_link(target) else {
        return Err(HandlerError::NoSuchServer(target.clone()));
    };
    let nick = nick_of(ircd, user);
    fanout::opers(
        &mut ircd.state,
        &format!("*** {nick} requested CONNECT to {}", link.name),
    );
    ircd.request_connect(link);
    Ok(())
}

pub fn handle_squit(ircd: &mut Ircd, user: UserId, args: &[String]) -> HandlerResult {
    let Some(target) = args.first().cloned() else {
        fanout::numeric(
            &mut ircd.state,
            user,
            numeric::ERR_NEEDMOREPARAMS,
            "SQUIT :Not enough parameters",
        );
        return Ok(());
    };
    if !ircd.peers.set_peer_state(&target, PeerState::Disconnected) {
        return Err(HandlerError::NoSuchServer(target));
    }
    let nick = nick_of(ircd, user);
    fanout::opers(&mut ircd.state, &format!("*** {nick} used SQUIT on {target}"));
    ircd.net_send_all(&format!("SQUIT {target}"));
    Ok(())
}

/// Shared implementation for the x-line family: `<mask> [duration]
/// [:reason]` adds, `-<mask>` removes.
fn xline(ircd: &mut Ircd, user: UserId, args: &[String], kind: XLineKind) -> HandlerResult {
    let mask = args[0].clone();
    let duration = args.get(1).and_then(|d| d.parse().ok()).unwrap_or(0);
    let reason = args
        .get(2)
        .cloned()
        .unwrap_or_else(|| "No reason given".to_string());
    ircd.apply_xline(kind, user, &mask, duration, &reason)
}

pub fn handle_kline(ircd: &mut Ircd, user: UserId, args: &[String]) -> HandlerResult {
    xline(ircd, user, args, XLineKind::K)
}

pub fn handle_gline(ircd: &mut Ircd, user: UserId, args: &[String]) -> HandlerResult {
    xline(ircd, user, args, XLineKind::G)
}

pub fn handle_zline(ircd: &mut Ircd, user: UserId, args: &[String]) -> HandlerResult {
    xline(ircd, user, args, XLineKind::Z)
}

pub fn handle_qline(ircd: &mut Ircd, user: UserId, args: &[String]) -> HandlerResult {
    xline(ircd, user, args, XLineKind::Q)
}

pub fn handle_eline(ircd: &mut Ircd, user: UserId, args: &[String]) -> HandlerResult {
    xline(ircd, user, args, XLineKind::E)
}

pub fn handle_loadmodule(ircd: &mut Ircd, user: UserId, args: &[String]) -> HandlerResult {
    let name = args[0].clone();
    let result = ircd.with_api(|api, modules| modules.load(&name, api));
    let nick = nick_of(ircd, user);
    match result {
        Ok(()) => {
            fanout::opers(&mut ircd.state, &format!("*** {nick} loaded module {name}"));
        }
        Err(e) => {
            let conn = ircd.state.users.get(user).map(|u| u.conn);
            if let Some(conn) = conn {
                fanout::server(&mut ircd.state, conn, &format!("NOTICE {nick} :{e}"));
            }
        }
    }
    Ok(())
}

pub fn handle_unloadmodule(ircd: &mut Ircd, user: UserId, args: &[String]) -> HandlerResult {
    let name = args[0].clone();
    let result = ircd.with_api(|api, modules| modules.unload(&name, api));
    let nick = nick_of(ircd, user);
    match result {
        Ok(()) => {
            fanout::opers(
                &mut ircd.state,
                &format!("*** {nick} unloaded module {name}"),
            );
        }
        Err(e) => {
            let conn = ircd.state.users.get(user).map(|u| u.conn);
            if let Some(conn) = conn {
                fanout::server(&mut ircd.state, conn, &format!("NOTICE {nick} :{e}"));
            }
        }
    }
    Ok(())
}

fn nick_of(ircd: &Ircd, user: UserId) -> String {
    ircd.state
        .users
        .get(user)
        .map(|u| u.nick.clone())
        .unwrap_or_default()
}
