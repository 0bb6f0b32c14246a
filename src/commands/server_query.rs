//! Server query commands: VERSION, TIME, ADMIN, INFO, MOTD, RULES,
//! LUSERS, STATS, LINKS, MAP, TRACE, MODULES.

use crate::error::HandlerResult;
use crate::fanout;
use crate::ircd::Ircd;
use crate::peers::PeerState;
use crate::state::UserId;
use cinder_proto::numeric;

const VERSION: &str = concat!("cinderd-", env!("CARGO_PKG_VERSION"));

pub fn handle_version(ircd: &mut Ircd, user: UserId, _args: &[String]) -> HandlerResult {
    let server = ircd.state.server_name.clone();
    fanout::numeric(
        &mut ircd.state,
        user,
        numeric::RPL_VERSION,
        &format!("{VERSION}. {server} :routing core"),
    );
    Ok(())
}

pub fn handle_time(ircd: &mut Ircd, user: UserId, _args: &[String]) -> HandlerResult {
    let server = ircd.state.server_name.clone();
    let now = chrono::Local::now().format("%a %b %d %Y %H:%M:%S %Z").to_string();
    fanout::numeric(
        &mut ircd.state,
        user,
        numeric::RPL_TIME,
        &format!("{server} :{now}"),
    );
    Ok(())
}

pub fn handle_admin(ircd: &mut Ircd, user: UserId, _args: &[String]) -> HandlerResult {
    let server = ircd.state.server_name.clone();
    let info = ircd
        .config
        .server
        .admin_info
        .clone()
        .unwrap_or_else(|| "Administrative info not configured".to_string());
    let email = ircd
        .config
        .server
        .admin_email
        .clone()
        .unwrap_or_else(|| "<no email configured>".to_string());
    fanout::numeric(
        &mut ircd.state,
        user,
        numeric::RPL_ADMINME,
        &format!("{server} :Administrative info"),
    );
    fanout::numeric(
        &mut ircd.state,
        user,
        numeric::RPL_ADMINLOC1,
        &format!(":{info}"),
    );
    fanout::numeric(
        &mut ircd.state,
        user,
        numeric::RPL_ADMINEMAIL,
        &format!(":{email}"),
    );
    Ok(())
}

pub fn handle_info(ircd: &mut Ircd, user: UserId, _args: &[String]) -> HandlerResult {
    let description = ircd.state.description.clone();
    fanout::numeric(
        &mut ircd.state,
        user,
        numeric::RPL_INFO,
        &format!(":{VERSION}"),
    );
    fanout::numeric(
        &mut ircd.state,
        user,
        numeric::RPL_INFO,
        &format!(":{description}"),
    );
    fanout::numeric(
        &mut ircd.state,
        user,
        numeric::RPL_ENDOFINFO,
        ":End of /INFO list",
    );
    Ok(())
}

pub fn handle_motd(ircd: &mut Ircd, user: UserId, _args: &[String]) -> HandlerResult {
    send_motd(ircd, user);
    Ok(())
}

/// 375/372/376 burst, or 422 when no MOTD is configured.
pub fn send_motd(ircd: &mut Ircd, user: UserId) {
    if ircd.motd.is_empty() {
        fanout::numeric(
            &mut ircd.state,
            user,
            numeric::ERR_NOMOTD,
            ":Message of the day file is missing.",
        );
        return;
    }
    let server = ircd.state.server_name.clone();
    fanout::numeric(
        &mut ircd.state,
        user,
        numeric::RPL_MOTDSTART,
        &format!(":- {server} message of the day"),
    );
    let lines = ircd.motd.clone();
    for line in lines {
        fanout::numeric(&mut ircd.state, user, numeric::RPL_MOTD, &format!(":- {line}"));
    }
    fanout::numeric(
        &mut ircd.state,
        user,
        numeric::RPL_ENDOFMOTD,
        ":End of message of the day.",
    );
}

pub fn handle_rules(ircd: &mut Ircd, user: UserId, _args: &[String]) -> HandlerResult {
    let Some(conn) = ircd.state.users.get(user).map(|u| u.conn) else {
        return Ok(());
    };
    let nick = ircd
        .state
        .users
        .get(user)
        .map(|u| u.nick.clone())
        .unwrap_or_default();
    let server = ircd.state.server_name.clone();
    if ircd.rules.is_empty() {
        fanout::server(
            &mut ircd.state,
            conn,
            &format!("NOTICE {nick} :Rules file is missing."),
        );
        return Ok(());
    }
    fanout::server(
        &mut ircd.state,
        conn,
        &format!("NOTICE {nick} :{server} rules"),
    );
    let lines = ircd.rules.clone();
    for line in lines {
        fanout::server(&mut ircd.state, conn, &format!("NOTICE {nick} :{line}"));
    }
    fanout::server(
        &mut ircd.state,
        conn,
        &format!("NOTICE {nick} :End of {server} rules."),
    );
    Ok(())
}

pub fn handle_lusers(ircd: &mut Ircd, user: UserId, _args: &[String]) -> HandlerResult {
    send_lusers(ircd, user);
    Ok(())
}

/// The 251..255 block.
pub fn send_lusers(ircd: &mut Ircd, user: UserId) {
    let registered = ircd.state.registered_count();
    let invisible = ircd.state.invisible_count();
    let servers = ircd.peers.alive_count() + 1;
    let opers = ircd.state.opers.len();
    let unknown = ircd.state.unknown_count();
    let channels = ircd.state.channels.len();
    let local = ircd.state.local_count();

    fanout::numeric(
        &mut ircd.state,
        user,
        numeric::RPL_LUSERCLIENT,
        &format!(
            ":There are {} users and {invisible} invisible on {servers} servers",
            registered.saturating_sub(invisible)
        ),
    );
    fanout::numeric(
        &mut ircd.state,
        user,
        numeric::RPL_LUSEROP,
        &format!("{opers} :operator(s) online"),
    );
    fanout::numeric(
        &mut ircd.state,
        user,
        numeric::RPL_LUSERUNKNOWN,
        &format!("{unknown} :unknown connections"),
    );
    fanout::numeric(
        &mut ircd.state,
        user,
        numeric::RPL_LUSERCHANNELS,
        &format!("{channels} :channels formed"),
    );
    fanout::numeric(
        &mut ircd.state,
        user,
        numeric::RPL_LUSERME,
        &format!(":I have {local} clients and {} servers", servers - 1),
    );
}

pub fn handle_stats(ircd: &mut Ircd, user: UserId, args: &[String]) -> HandlerResult {
    let symbol = args[0].chars().next().unwrap_or('*');
    match symbol {
        'm' => {
            let rows: Vec<(String, u64, u64)> = ircd
                .commands
                .entries()
                .iter()
                .filter(|e| e.use_count > 0)
                .map(|e| (e.name.clone(), e.use_count, e.total_bytes))
                .collect();
            for (name, uses, bytes) in rows {
                fanout::numeric(
                    &mut ircd.state,
                    user,
                    numeric::RPL_STATSCOMMANDS,
                    &format!("{name} {uses} {bytes}"),
                );
            }
        }
        'u' => {
            let uptime = chrono::Utc::now().timestamp() - ircd.state.created_at;
            let (d, rem) = (uptime / 86_400, uptime % 86_400);
            let (h, rem) = (rem / 3_600, rem % 3_600);
            let (m, s) = (rem / 60, rem % 60);
            fanout::numeric(
                &mut ircd.state,
                user,
                numeric::RPL_STATSUPTIME,
                &format!(":Server Up {d} days, {h:02}:{m:02}:{s:02}"),
            );
        }
        't' => {
            let stats = ircd.state.stats.clone();
            let conn = ircd.state.users.get(user).map(|u| u.conn);
            if let Some(conn) = conn {
                let nick = ircd
                    .state
                    .users
                    .get(user)
                    .map(|u| u.nick.clone())
                    .unwrap_or_default();
                for (label, value) in [
                    ("accepts", stats.accepts),
                    ("refused", stats.refused),
                    ("unknown commands", stats.unknown_commands),
                    ("nick collisions", stats.nick_collisions),
                    ("dns queries", stats.dns_queries),
                    ("dns good", stats.dns_good),
                    ("dns bad", stats.dns_bad),
                    ("bytes sent", stats.bytes_sent),
                    ("bytes received", stats.bytes_received),
                ] {
                    fanout::server(
                        &mut ircd.state,
                        conn,
                        &format!("NOTICE {nick} :{label}: {value}"),
                    );
                }
            }
        }
        'k' => {
            let rows: Vec<String> = ircd
                .xlines
                .entries(crate::bans::XLineKind::K)
                .iter()
                .map(|l| format!("{} {} {} :{}", l.mask, l.set_at, l.duration, l.reason))
                .collect();
            let conn = ircd.state.users.get(user).map(|u| u.conn);
            if let Some(conn) = conn {
                let nick = ircd
                    .state
                    .users
                    .get(user)
                    .map(|u| u.nick.clone())
                    .unwrap_or_default();
                for row in rows {
                    fanout::server(&mut ircd.state, conn, &format!("NOTICE {nick} :K: {row}"));
                }
            }
        }
        _ => {}
    }
    fanout::numeric(
        &mut ircd.state,
        user,
        numeric::RPL_ENDOFSTATS,
        &format!("{symbol} :End of /STATS report"),
    );
    Ok(())
}

pub fn handle_links(ircd: &mut Ircd, user: UserId, _args: &[String]) -> HandlerResult {
    let local = ircd.state.server_name.clone();
    let description = ircd.state.description.clone();
    fanout::numeric(
        &mut ircd.state,
        user,
        numeric::RPL_LINKS,
        &format!("{local} {local} :0 {description}"),
    );
    for (name, desc, state) in ircd.peers.all_peers() {
        if state == PeerState::Disconnected {
            continue;
        }
        fanout::numeric(
            &mut ircd.state,
            user,
            numeric::RPL_LINKS,
            &format!("{name} {local} :1 {desc}"),
        );
    }
    fanout::numeric(
        &mut ircd.state,
        user,
        numeric::RPL_ENDOFLINKS,
        "* :End of /LINKS list.",
    );
    Ok(())
}

pub fn handle_map(ircd: &mut Ircd, user: UserId, _args: &[String]) -> HandlerResult {
    let local = ircd.state.server_name.clone();
    let local_users = ircd.state.local_count();
    fanout::numeric(
        &mut ircd.state,
        user,
        numeric::RPL_MAP,
        &format!(":{local} ({local_users} users)"),
    );
    let peers = ircd.peers.all_peers();
    for (name, _, state) in peers {
        if state == PeerState::Disconnected {
            continue;
        }
        let count = ircd
            .state
            .users
            .iter()
            .filter(|u| cinder_proto::fold_eq(&u.server, &name))
            .count();
        fanout::numeric(
            &mut ircd.state,
            user,
            numeric::RPL_MAP,
            &format!(":`- {name} ({count} users)"),
        );
    }
    fanout::numeric(&mut ircd.state, user, numeric::RPL_MAPEND, ":End of /MAP");
    Ok(())
}

pub fn handle_trace(ircd: &mut Ircd, user: UserId, _args: &[String]) -> HandlerResult {
    let nick = ircd
        .state
        .users
        .get(user)
        .map(|u| u.nick.clone())
        .unwrap_or_default();
    fanout::numeric(
        &mut ircd.state,
        user,
        numeric::RPL_TRACEUSER,
        &format!("User users {nick} :0"),
    );
    for (name, _, state) in ircd.peers.all_peers() {
        if state == PeerState::Disconnected {
            continue;
        }
        fanout::numeric(
            &mut ircd.state,
            user,
            numeric::RPL_TRACESERVER,
            &format!("Serv 1 0S 0C {name} :*"),
        );
    }
    Ok(())
}

pub fn handle_modules(ircd: &mut Ircd, user: UserId, _args: &[String]) -> HandlerResult {
    let Some(conn) = ircd.state.users.get(user).map(|u| u.conn) else {
        return Ok(());
    };
    let nick = ircd
        .state
        .users
        .get(user)
        .map(|u| u.nick.clone())
        .unwrap_or_default();
    let listing = ircd.modules.listing();
    if listing.is_empty() {
        fanout::server(
            &mut ircd.state,
            conn,
            &format!("NOTICE {nick} :No modules loaded"),
        );
        return Ok(());
    }
    for (name, description) in listing {
        fanout::server(
            &mut ircd.state,
            conn,
            &format!("NOTICE {nick} :{name} - {description}"),
        );
    }
    Ok(())
}
