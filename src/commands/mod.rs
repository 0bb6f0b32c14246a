//! The command table and dispatch pipeline.
//!
//! The table is an ordered registry: registration order is preserved so
//! MODULES and STATS listings are deterministic, and lookups scan under
//! the IRC fold. Module-registered commands carry their module's name as
//! `source` and are removed at unload.

pub mod channel;
pub mod connection;
pub mod messaging;
pub mod oper;
pub mod server_query;
pub mod user_query;

use crate::error::{HandlerError, HandlerResult, StateError};
use crate::fanout;
use crate::ircd::Ircd;
use crate::modules::Decision;
use crate::state::{ConnId, UserId};
use cinder_proto::{fold, numeric, Line};

/// A command handler: synchronous, run to completion per line.
pub type HandlerFn = fn(&mut Ircd, UserId, &[String]) -> HandlerResult;

/// One command descriptor.
#[derive(Clone)]
pub struct CommandEntry {
    /// Canonical (upper-case) command name.
    pub name: String,
    pub handler: HandlerFn,
    /// User-mode letter required to run this, `None` for everyone.
    pub required_mode: Option<char>,
    pub min_params: usize,
    /// `<core>` or the owning module's name.
    pub source: String,
    pub use_count: u64,
    pub total_bytes: u64,
}

/// Ordered command registry.
#[derive(Default)]
pub struct CommandTable {
    entries: Vec<CommandEntry>,
}

impl CommandTable {
    /// Append a command. Duplicate names (under the fold) are rejected.
    pub fn register(
        &mut self,
        name: &str,
        handler: HandlerFn,
        required_mode: Option<char>,
        min_params: usize,
        source: &str,
    ) -> Result<(), StateError> {
        if self.find(&fold(name)).is_some() {
            return Err(StateError::DuplicateName);
        }
        tracing::debug!(command = %name, min_params, "added command");
        self.entries.push(CommandEntry {
            name: name.to_uppercase(),
            handler,
            required_mode,
            min_params,
            source: source.to_string(),
            use_count: 0,
            total_bytes: 0,
        });
        Ok(())
    }

    /// Position of a command by its folded name.
    pub fn find(&self, folded: &str) -> Option<usize> {
        self.entries.iter().position(|e| fold(&e.name) == folded)
    }

    pub fn entry(&self, idx: usize) -> &CommandEntry {
        &self.entries[idx]
    }

    pub fn entries(&self) -> &[CommandEntry] {
        &self.entries
    }

    /// Record one use of the command at `idx`.
    pub fn bump(&mut self, idx: usize, bytes: u64) {
        if let Some(e) = self.entries.get_mut(idx) {
            e.use_count += 1;
            e.total_bytes += bytes;
        }
    }

    /// Drop every command owned by `source`; returns how many went.
    pub fn remove_source(&mut self, source: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.source != source);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Commands a connection may issue before registration completes.
/// Anything else is silently dropped in that phase.
const PRE_REGISTRATION: &[&str] = &[
    "nick", "user", "pass", "ping", "pong", "quit", "server", "capab",
];

/// Dispatch one inbound line from a local connection.
pub fn dispatch_line(ircd: &mut Ircd, conn: ConnId, raw: &str) {
    ircd.state.stats.bytes_received += raw.len() as u64;

    if ircd.modules.raw_read(conn, raw) != Decision::Continue {
        return;
    }

    let Ok(line) = Line::parse(raw) else {
        return;
    };
    let Some(user) = ircd.state.user_by_conn(conn) else {
        return;
    };

    let folded = fold(&line.command);
    let registered = ircd
        .state
        .users
        .get(user)
        .map(|u| u.registration.is_registered())
        .unwrap_or(false);
    if !registered && !PRE_REGISTRATION.contains(&folded.as_str()) {
        return;
    }

    let Some(idx) = ircd.commands.find(&folded) else {
        if registered {
            ircd.state.stats.unknown_commands += 1;
            fanout::numeric(
                &mut ircd.state,
                user,
                numeric::ERR_UNKNOWNCOMMAND,
                &format!("{} :Unknown command", line.command),
            );
        }
        return;
    };

    let (handler, required_mode, min_params, name) = {
        let entry = ircd.commands.entry(idx);
        (
            entry.handler,
            entry.required_mode,
            entry.min_params,
            entry.name.clone(),
        )
    };

    if let Some(letter) = required_mode {
        let allowed = ircd
            .state
            .users
            .get(user)
            .map(|u| u.modes.has(letter))
            .unwrap_or(false);
        if !allowed {
            fanout::numeric(
                &mut ircd.state,
                user,
                numeric::ERR_NOPRIVILEGES,
                ":Permission Denied - You do not have the required operator privileges",
            );
            return;
        }
    }

    if line.params.len() < min_params {
        fanout::numeric(
            &mut ircd.state,
            user,
            numeric::ERR_NEEDMOREPARAMS,
            &format!("{name} :Not enough parameters"),
        );
        return;
    }

    let decision =
        ircd.with_api(|api, modules| modules.pre_command(api, user, &name, &line.params));
    if decision == Decision::Halt {
        return;
    }

    let result = handler(ircd, user, &line.params);
    ircd.commands.bump(idx, raw.len() as u64);

    match result {
        Ok(()) => {}
        Err(HandlerError::Quit(reason)) => {
            ircd.quit_user(user, &reason, true);
            return;
        }
        Err(e) => {
            if let Some((num, text)) = e.to_numeric() {
                fanout::numeric(&mut ircd.state, user, num, &text);
            }
        }
    }

    ircd.with_api(|api, modules| modules.post_command(api, user, &name, &line.params));
}

/// Register the core command surface.
pub fn register_core(table: &mut CommandTable) {
    const CORE: &str = "<core>";
    let defs: &[(&str, HandlerFn, Option<char>, usize)] = &[
        ("USER", connection::handle_user, None, 4),
        ("NICK", connection::handle_nick, None, 1),
        ("QUIT", connection::handle_quit, None, 0),
        ("VERSION", server_query::handle_version, None, 0),
        ("PING", connection::handle_ping, None, 1),
        ("PONG", connection::handle_pong, None, 1),
        ("ADMIN", server_query::handle_admin, None, 0),
        ("PRIVMSG", messaging::handle_privmsg, None, 2),
        ("INFO", server_query::handle_info, None, 0),
        ("TIME", server_query::handle_time, None, 0),
        ("WHOIS", user_query::handle_whois, None, 1),
        ("WALLOPS", messaging::handle_wallops, Some('o'), 1),
        ("NOTICE", messaging::handle_notice, None, 2),
        ("JOIN", channel::handle_join, None, 1),
        ("NAMES", channel::handle_names, None, 0),
        ("PART", channel::handle_part, None, 1),
        ("KICK", channel::handle_kick, None, 2),
        ("MODE", channel::handle_mode, None, 1),
        ("TOPIC", channel::handle_topic, None, 1),
        ("WHO", user_query::handle_who, None, 1),
        ("MOTD", server_query::handle_motd, None, 0),
        ("RULES", server_query::handle_rules, None, 0),
        ("OPER", connection::handle_oper, None, 2),
        ("LIST", channel::handle_list, None, 0),
        ("DIE", oper::handle_die, Some('o'), 1),
        ("RESTART", oper::handle_restart, Some('o'), 1),
        ("KILL", oper::handle_kill, Some('o'), 2),
        ("REHASH", oper::handle_rehash, Some('o'), 0),
        ("LUSERS", server_query::handle_lusers, None, 0),
        ("STATS", server_query::handle_stats, None, 1),
        ("USERHOST", user_query::handle_userhost, None, 1),
        ("AWAY", connection::handle_away, None, 0),
        ("ISON", user_query::handle_ison, None, 0),
        ("SUMMON", user_query::handle_summon, None, 0),
        ("USERS", user_query::handle_users, None, 0),
        ("INVITE", channel::handle_invite, None, 0),
        ("PASS", connection::handle_pass, None, 1),
        ("TRACE", server_query::handle_trace, Some('o'), 0),
        ("WHOWAS", user_query::handle_whowas, None, 1),
        ("CONNECT", oper::handle_connect, Some('o'), 1),
        ("SQUIT", oper::handle_squit, Some('o'), 0),
        ("MODULES", server_query::handle_modules, None, 0),
        ("LINKS", server_query::handle_links, None, 0),
        ("MAP", server_query::handle_map, None, 0),
        ("KLINE", oper::handle_kline, Some('o'), 1),
        ("GLINE", oper::handle_gline, Some('o'), 1),
        ("ZLINE", oper::handle_zline, Some('o'), 1),
        ("QLINE", oper::handle_qline, Some('o'), 1),
        ("ELINE", oper::handle_eline, Some('o'), 1),
        ("LOADMODULE", oper::handle_loadmodule, Some('o'), 1),
        ("UNLOADMODULE", oper::handle_unloadmodule, Some('o'), 1),
        ("SERVER", connection::handle_server, None, 0),
    ];
    for (name, handler, mode, min) in defs {
        // Core registration cannot collide: the table starts empty.
        let _ = table.register(name, *handler, *mode, *min, CORE);
    }
}
