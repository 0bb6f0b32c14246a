//! The server context: one value owning every table, threaded through
//! dispatch and fanout by the core task.
//!
//! Events from the listener, client connections, peer links, and the
//! ticker all funnel into [`Ircd::handle_event`]; each is processed to
//! completion before the next, which is what makes the shared graph safe
//! without locks.

use crate::bans::{XLine, XLineKind, XLines};
use crate::commands::{self, CommandTable};
use crate::config::{Config, LinkBlock};
use crate::error::HandlerError;
use crate::fanout;
use crate::membership;
use crate::modules::{ModuleHost, ServerApi};
use crate::peers::{PeerFabric, PeerState};
use crate::state::{ClientSender, ConnId, Registration, ServerState, UserId};
use cinder_proto::{fold_eq, numeric, Line};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

/// Why the core loop is stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// DIE: clean exit, code 0.
    Die,
    /// RESTART: re-exec the daemon.
    Restart,
    /// Fatal signal or internal failure, code 1.
    Fatal,
}

/// Everything the core task reacts to.
#[derive(Debug)]
pub enum CoreEvent {
    Accepted {
        conn: ConnId,
        addr: SocketAddr,
        tx: UnboundedSender<String>,
        queued: Arc<AtomicUsize>,
    },
    Line {
        conn: ConnId,
        line: String,
    },
    Closed {
        conn: ConnId,
    },
    PeerUp {
        mesh: usize,
        label: String,
        description: String,
        tx: UnboundedSender<String>,
    },
    PeerLine {
        label: String,
        line: String,
    },
    PeerDown {
        label: String,
    },
    Tick,
    Rehash,
    Terminate,
}

/// The daemon.
pub struct Ircd {
    pub config: Config,
    pub motd: Vec<String>,
    pub rules: Vec<String>,
    pub state: ServerState,
    pub commands: CommandTable,
    pub modules: ModuleHost,
    pub peers: PeerFabric,
    pub xlines: XLines,
    pub shutdown: Option<Shutdown>,
    /// CONNECT requests for the runtime to act on.
    pending_connects: Vec<LinkBlock>,
    /// Stable network-task label to current peer name.
    peer_labels: HashMap<String, String>,
}

impl Ircd {
    pub fn new(config: Config) -> Self {
        let now = chrono::Utc::now().timestamp();
        let motd = config
            .server
            .motd_file
            .as_deref()
            .map(crate::config::read_display_file)
            .unwrap_or_default();
        let rules = config
            .server
            .rules_file
            .as_deref()
            .map(crate::config::read_display_file)
            .unwrap_or_default();
        let state = ServerState::new(
            &config.server.name,
            &config.server.network,
            &config.server.description,
            config.limits.max_chans,
            config.limits.max_write_queue,
            now,
        );
        let mut commands = CommandTable::default();
        commands::register_core(&mut commands);
        let peers = PeerFabric::new(&config.server.description);

        let mut ircd = Self {
            config,
            motd,
            rules,
            state,
            commands,
            modules: ModuleHost::default(),
            peers,
            xlines: XLines::default(),
            shutdown: None,
            pending_connects: Vec::new(),
            peer_labels: HashMap::new(),
        };
        ircd.load_boot_modules();
        ircd
    }

    fn load_boot_modules(&mut self) {
        let boot = self.config.modules.boot.clone();
        for name in boot {
            let result = self.with_api(|api, modules| modules.load(&name, api));
            if let Err(e) = result {
                tracing::warn!(module = %name, error = %e, "boot module failed to load");
            }
        }
    }

    /// Split-borrow helper: hand module hooks the capability façade
    /// without aliasing the host itself.
    pub fn with_api<R>(&mut self, f: impl FnOnce(&mut ServerApi<'_>, &mut ModuleHost) -> R) -> R {
        let Ircd {
            state,
            peers,
            commands,
            modules,
            config,
            ..
        } = self;
        let mut api = ServerApi {
            state,
            peers,
            commands,
            config,
        };
        f(&mut api, modules)
    }

    /// Broadcast to every peer in every mesh.
    pub fn net_send_all(&mut self, line: &str) {
        self.peers.send_to_all(&mut self.modules, line);
    }

    /// Broadcast to peers hosting users that share a channel with `user`.
    pub fn net_send_common(&mut self, user: UserId, line: &str) {
        let Ircd {
            state,
            peers,
            modules,
            ..
        } = self;
        peers.send_to_common(modules, state, user, line);
    }

    /// Queue an outbound link for the runtime to establish.
    pub fn request_connect(&mut self, link: LinkBlock) {
        self.pending_connects.push(link);
    }

    pub fn take_pending_connects(&mut self) -> Vec<LinkBlock> {
        std::mem::take(&mut self.pending_connects)
    }

    // --- Event handling ---

    pub fn handle_event(&mut self, event: CoreEvent) {
        match event {
            CoreEvent::Accepted {
                conn,
                addr,
                tx,
                queued,
            } => self.accept_client(conn, addr, tx, queued),
            CoreEvent::Line { conn, line } => {
                commands::dispatch_line(self, conn, &line);
                self.check_promotion(conn);
            }
            CoreEvent::Closed { conn } => self.handle_closed(conn),
            CoreEvent::PeerUp {
                mesh,
                label,
                description,
                tx,
            } => self.peer_up(mesh, &label, &description, tx),
            CoreEvent::PeerLine { label, line } => self.handle_peer_line(&label, &line),
            CoreEvent::PeerDown { label } => self.peer_down(&label),
            CoreEvent::Tick => self.tick(),
            CoreEvent::Rehash => self.rehash(),
            CoreEvent::Terminate => {
                fanout::send_error_all(&mut self.state, "Server terminating!");
                self.shutdown = Some(Shutdown::Fatal);
            }
        }
        self.flush_pending_closes();
        self.flush_write_observations();
    }

    /// Deliver the cycle's writes to the raw-socket-write hook. Batched
    /// so module-initiated fanout cannot re-enter the module list.
    fn flush_write_observations(&mut self) {
        if self.modules.is_empty() {
            self.state.write_log.clear();
            return;
        }
        let writes = std::mem::take(&mut self.state.write_log);
        for (conn, line) in writes {
            self.modules.raw_write(conn, &line);
        }
    }

    fn accept_client(
        &mut self,
        conn: ConnId,
        addr: SocketAddr,
        tx: UnboundedSender<String>,
        queued: Arc<AtomicUsize>,
    ) {
        let host = addr.ip().to_string();
        let sender = ClientSender::new(tx, queued);

        // Deny classes are checked before any state is allocated.
        if self
            .config
            .deny
            .iter()
            .any(|d| crate::bans::match_mask(&d.host, &host))
        {
            self.state.stats.refused += 1;
            let _ = sender.try_enqueue(
                "ERROR :Closing link: Connection refused".to_string(),
                self.state.max_write_queue,
            );
            tracing::info!(%addr, "connection refused by deny class");
            return;
        }
        if !self.config.allow.is_empty()
            && !self
                .config
                .allow
                .iter()
                .any(|a| crate::bans::match_mask(&a.host, &host))
        {
            self.state.stats.refused += 1;
            let _ = sender.try_enqueue(
                "ERROR :Closing link: No matching allow class".to_string(),
                self.state.max_write_queue,
            );
            tracing::info!(%addr, "connection matched no allow class");
            return;
        }

        self.state.stats.accepts += 1;
        self.state.stats.connects += 1;
        // No resolver is attached to this boundary: the reverse lookup for
        // every connection falls back to the literal address, and the
        // counters record that outcome for STATS.
        self.state.stats.dns_queries += 1;
        self.state.stats.dns_bad += 1;
        let now = chrono::Utc::now().timestamp();
        let server_name = self.state.server_name.clone();
        let id = self.state.users.create(conn, &server_name, &host, &host, now);
        if let Some(user) = self.state.users.get_mut(id) {
            user.sender = Some(sender);
        }
        self.state.conns.insert(conn, id);
        tracing::debug!(%addr, conn = conn.0, "client accepted");
    }

    fn handle_closed(&mut self, conn: ConnId) {
        if let Some(id) = self.state.user_by_conn(conn) {
            self.quit_user(id, "Connection closed", true);
        }
    }

    /// Tear a user down: notify onlookers, purge the graph, drop tables.
    pub fn quit_user(&mut self, id: UserId, reason: &str, notify_peers: bool) {
        let Some(user) = self.state.users.get(id) else {
            return;
        };
        let nick = user.nick.clone();
        let conn = user.conn;
        let registered = user.registration.is_registered();
        let is_local = user.is_local();

        self.with_api(|api, modules| modules.user_quit(api, id, reason));

        if registered {
            membership::quit_channels(&mut self.state, id, reason);
            let now = chrono::Utc::now().timestamp();
            self.state.record_whowas(id, now);
            if notify_peers && is_local && !nick.is_empty() {
                self.net_send_all(&format!(":{nick} QUIT :{reason}"));
            }
        } else {
            // Unregistered users hold no edges, but sweep defensively.
            membership::quit_channels(&mut self.state, id, reason);
        }

        if is_local {
            // Connections that never registered get the bare reason.
            let line = if registered {
                format!("ERROR :Closing link: {reason}")
            } else {
                format!("ERROR :{reason}")
            };
            fanout::raw(&mut self.state, conn, &line);
        }
        self.state.opers.retain(|&u| u != id);
        self.state.conns.remove(&conn);
        self.state.users.release(id);
        tracing::debug!(nick = %nick, reason = %reason, "user removed");
    }

    /// After NICK/USER or a module state change, see whether the gate
    /// opens for this connection.
    pub fn check_promotion(&mut self, conn: ConnId) {
        if let Some(id) = self.state.user_by_conn(conn) {
            self.try_promote(id);
        }
    }

    pub fn try_promote(&mut self, id: UserId) {
        let Some(user) = self.state.users.get(id) else {
            return;
        };
        if !user.registration.awaiting_gate() {
            return;
        }

        // Every module must report ready (ident, DNSBL, SASL style gates).
        let ready = self.with_api(|api, modules| modules.check_ready(api, id));
        if !ready {
            return;
        }

        let Some(user) = self.state.users.get(id) else {
            return;
        };
        let ident = user.ident.clone();
        let host = user.host.clone();
        let ip = user.ip.clone();
        let password = user.password.clone();

        if let Some((kind, line)) = self.xlines.check_connection(&ident, &host, &ip) {
            let reason = format!("{}-Lined: {}", kind.letter(), line.reason);
            self.state.stats.refused += 1;
            self.quit_user(id, &reason, false);
            return;
        }

        // Allow-class password, when the matching class demands one.
        let needs_pass = self
            .config
            .allow
            .iter()
            .find(|a| crate::bans::match_mask(&a.host, &host))
            .and_then(|a| a.password.clone());
        if let Some(expected) = needs_pass {
            if password.as_deref() != Some(expected.as_str()) {
                self.quit_user(id, "Bad password", false);
                return;
            }
        }

        if let Some(user) = self.state.users.get_mut(id) {
            user.registration = user.registration.promote();
        }
        commands::connection::send_welcome_burst(self, id);

        let Some(user) = self.state.users.get(id) else {
            return;
        };
        let nick = user.nick.clone();
        let realname = user.realname.clone();
        let connected_at = user.connected_at;
        let server = user.server.clone();
        fanout::opers(
            &mut self.state,
            &format!("*** Client connecting: {nick} ({ident}@{host})"),
        );
        self.net_send_all(&format!(
            "NICK {nick} {ident} {host} {server} {connected_at} :{realname}"
        ));
        self.with_api(|api, modules| modules.user_connect(api, id));
    }

    fn tick(&mut self) {
        let now = chrono::Utc::now().timestamp();
        self.xlines.expire(now);

        // Registration wall clock.
        let timeout = self.config.limits.registration_timeout as i64;
        let stale: Vec<UserId> = self
            .state
            .users
            .iter()
            .filter(|u| u.is_local() && !u.registration.is_registered())
            .filter(|u| now - u.connected_at > timeout)
            .map(|u| u.id)
            .collect();
        for id in stale {
            self.quit_user(id, "Registration timeout", false);
        }

        // Re-poll the module gate for connections that are otherwise done.
        let gated: Vec<ConnId> = self
            .state
            .users
            .iter()
            .filter(|u| u.is_local() && u.registration.awaiting_gate())
            .map(|u| u.conn)
            .collect();
        for conn in gated {
            self.check_promotion(conn);
        }
    }

    fn flush_pending_closes(&mut self) {
        while let Some((id, reason)) = self.state.pending_closes.pop() {
            self.quit_user(id, &reason, true);
        }
    }

    /// Reload the display files and announce it. Hot-reloadable pieces
    /// only; listener and identity changes need a restart.
    pub fn rehash(&mut self) {
        let motd = self
            .config
            .server
            .motd_file
            .as_deref()
            .map(crate::config::read_display_file)
            .unwrap_or_default();
        let rules = self
            .config
            .server
            .rules_file
            .as_deref()
            .map(crate::config::read_display_file)
            .unwrap_or_default();
        self.motd = motd;
        self.rules = rules;
        fanout::opers(&mut self.state, "*** Rehashing server files");
        tracing::info!("rehash complete");
    }

    // --- Peer fabric events ---

    fn peer_up(&mut self, mesh: usize, label: &str, description: &str, tx: UnboundedSender<String>) {
        self.peers
            .register_peer(mesh, label, description, tx, PeerState::Handshake);
        self.peer_labels
            .insert(label.to_string(), label.to_string());
        let intro = format!(
            "SERVER {} :{}",
            self.state.server_name, self.state.description
        );
        self.peers.send_to_one(&mut self.modules, label, &intro);
        tracing::info!(peer = %label, "peer link up, handshake sent");
    }

    fn peer_down(&mut self, label: &str) {
        let Some(name) = self.peer_labels.get(label).cloned() else {
            return;
        };
        self.peers.set_peer_state(&name, PeerState::Disconnected);
        fanout::opers(&mut self.state, &format!("*** Lost link to {name}"));
        self.net_send_all(&format!("SQUIT {name}"));
        tracing::warn!(peer = %name, "peer link lost");
    }

    fn handle_peer_line(&mut self, label: &str, raw: &str) {
        self.state.stats.bytes_received += raw.len() as u64;
        let Some(origin) = self.peer_labels.get(label).cloned() else {
            return;
        };

        let Some((token, rest)) = raw.split_once(' ') else {
            return;
        };
        let sum = if token.starts_with(':') {
            None
        } else {
            if !self.peers.note_sum(token) {
                tracing::debug!(sum = %token, "duplicate packet dropped");
                return;
            }
            Some(token.to_string())
        };

        let Ok(line) = Line::parse(rest) else {
            return;
        };
        let command = line.command.to_uppercase();
        match command.as_str() {
            "SERVER" => {
                if let Some(name) = line.params.first() {
                    let desc = line.params.get(1).cloned().unwrap_or_default();
                    self.peers.complete_handshake(&origin, name, &desc);
                    self.peer_labels
                        .insert(label.to_string(), name.to_string());
                    fanout::opers(
                        &mut self.state,
                        &format!("*** Link with {name} established"),
                    );
                }
            }
            "V" => {
                // V <nick> <*|@*> :text
                if line.params.len() >= 3 {
                    let nick = &line.params[0];
                    let text = &line.params[2];
                    if line.params[1] == "@*" {
                        fanout::opers(
                            &mut self.state,
                            &format!("*** Notice From {nick}: {text}"),
                        );
                    } else {
                        self.remote_notice_all(nick, text);
                    }
                    self.forward(&origin, rest, sum.as_deref());
                }
            }
            "@" => {
                // @ <nick> :text
                if line.params.len() >= 2 {
                    let nick = line.params[0].clone();
                    let text = line.params[1].clone();
                    self.remote_wallops(&nick, &text);
                    self.forward(&origin, rest, sum.as_deref());
                }
            }
            "SQUIT" => {
                if let Some(name) = line.params.first().cloned() {
                    self.peers.set_peer_state(&name, PeerState::Disconnected);
                    fanout::opers(&mut self.state, &format!("*** {name} split from the mesh"));
                    self.forward(&origin, rest, sum.as_deref());
                }
            }
            "NICK" => {
                self.peer_nick(&origin, &line, rest, sum.as_deref());
            }
            "JOIN" => {
                if let (Some(nick), Some(chan)) = (line.prefix.as_deref(), line.params.first()) {
                    if let Some(id) = self.state.users.by_nick(nick) {
                        let chan = chan.clone();
                        if let Ok(out) =
                            membership::join_channel(&mut self.state, id, &chan, None, true)
                        {
                            if out.created {
                                self.with_api(|api, modules| modules.channel_create(api, out.channel));
                            }
                            if out.joined {
                                self.with_api(|api, modules| modules.join(api, id, out.channel));
                            }
                        }
                    }
                    self.forward(&origin, rest, sum.as_deref());
                }
            }
            "QUIT" => {
                if let Some(nick) = line.prefix.as_deref() {
                    if let Some(id) = self.state.users.by_nick(nick) {
                        let reason = line.params.first().cloned().unwrap_or_default();
                        let is_remote = self
                            .state
                            .users
                            .get(id)
                            .map(|u| !u.is_local())
                            .unwrap_or(false);
                        if is_remote {
                            self.quit_user(id, &reason, false);
                        }
                    }
                    self.forward(&origin, rest, sum.as_deref());
                }
            }
            "PRIVMSG" | "NOTICE" => {
                if let (Some(nick), Some(target)) = (line.prefix.as_deref(), line.params.first()) {
                    let text = line.params.get(1).cloned().unwrap_or_default();
                    self.remote_message(nick, target, &command, &text);
                    self.forward(&origin, rest, sum.as_deref());
                }
            }
            _ => {
                tracing::debug!(peer = %origin, command = %command, "unhandled peer verb");
            }
        }
    }

    /// Pass a sum-tagged packet on to the rest of the mesh, keeping the
    /// original sum so everyone's duplicate cache stays coherent.
    fn forward(&mut self, origin: &str, rest: &str, sum: Option<&str>) {
        if let Some(sum) = sum {
            let Ircd { peers, modules, .. } = self;
            peers.send_to_all_except_with_sum(modules, origin, rest, sum);
        }
    }

    fn remote_notice_all(&mut self, nick: &str, text: &str) {
        let targets: Vec<ConnId> = self
            .state
            .users
            .iter()
            .filter(|u| u.is_local() && u.registration.is_registered())
            .map(|u| u.conn)
            .collect();
        let line = format!(":{nick} NOTICE $* :{text}");
        for conn in targets {
            fanout::raw(&mut self.state, conn, &line);
        }
    }

    fn remote_wallops(&mut self, nick: &str, text: &str) {
        let targets: Vec<ConnId> = self
            .state
            .users
            .iter()
            .filter(|u| u.is_local() && u.modes.has('w'))
            .map(|u| u.conn)
            .collect();
        let line = format!(":{nick} WALLOPS :{text}");
        for conn in targets {
            fanout::raw(&mut self.state, conn, &line);
        }
    }

    fn remote_message(&mut self, nick: &str, target: &str, command: &str, text: &str) {
        if let Some(src) = self.state.users.by_nick(nick) {
            if let Some(chan) = self.state.channels.by_name(target) {
                fanout::channel_local(
                    &mut self.state,
                    chan,
                    Some(src),
                    &format!("{command} {target} :{text}"),
                );
            } else if let Some(dst) = self.state.users.by_nick(target) {
                fanout::to(
                    &mut self.state,
                    Some(src),
                    dst,
                    &format!("{command} {target} :{text}"),
                );
            }
        }
    }

    /// Remote NICK traffic: introductions and renames, with the
    /// earlier-connection-wins collision rule.
    fn peer_nick(&mut self, origin: &str, line: &Line, rest: &str, sum: Option<&str>) {
        if line.prefix.is_none() && line.params.len() >= 5 {
            // NICK <nick> <ident> <host> <server> <ts> [:realname]
            let nick = line.params[0].clone();
            let ts: i64 = line.params[4].parse().unwrap_or(0);

            if let Some(existing) = self.state.users.by_nick(&nick) {
                self.state.stats.nick_collisions += 1;
                let existing_ts = self
                    .state
                    .users
                    .get(existing)
                    .map(|u| u.connected_at)
                    .unwrap_or(0);
                if existing_ts <= ts {
                    // Incumbent wins; the newcomer arrives under a
                    // server-assigned collision nick.
                    let fresh = self.state.collision_nick(ts, &nick);
                    self.introduce_remote(&fresh, line, ts);
                    self.forward(origin, rest, sum);
                    return;
                }
                // Newcomer wins; rename and notify the incumbent.
                let fresh = self.state.collision_nick(existing_ts, &nick);
                fanout::numeric(
                    &mut self.state,
                    existing,
                    numeric::ERR_NICKNAMEINUSE,
                    &format!("{nick} :Nickname collision, you have been renamed"),
                );
                fanout::common(&mut self.state, existing, &format!("NICK :{fresh}"));
                let _ = self.state.users.bind_nick(existing, &fresh);
                self.introduce_remote(&nick, line, ts);
            } else {
                self.introduce_remote(&nick, line, ts);
            }
            self.forward(origin, rest, sum);
        } else if let (Some(old), Some(new)) = (line.prefix.as_deref(), line.params.first()) {
            if let Some(id) = self.state.users.by_nick(old) {
                let new = new.clone();
                if self.state.users.by_nick(&new).is_none() {
                    fanout::common(&mut self.state, id, &format!("NICK :{new}"));
                    let _ = self.state.users.bind_nick(id, &new);
                }
            }
            self.forward(origin, rest, sum);
        }
    }

    fn introduce_remote(&mut self, nick: &str, line: &Line, ts: i64) {
        let ident = line.params[1].clone();
        let host = line.params[2].clone();
        let server = line.params[3].clone();
        let realname = line.params.get(5).cloned().unwrap_or_default();

        let id = self
            .state
            .users
            .create(ConnId::REMOTE, &server, &host, "0.0.0.0", ts);
        if self.state.users.bind_nick(id, nick).is_err() {
            self.state.users.release(id);
            return;
        }
        if let Some(user) = self.state.users.get_mut(id) {
            user.ident = ident;
            user.realname = realname;
            user.registration = Registration::Registered;
        }
        tracing::debug!(nick = %nick, server = %line.params[3], "remote user introduced");
    }

    /// Is this one of our configured links?
    pub fn find_link(&self, name: &str) -> Option<LinkBlock> {
        self.config
            .link
            .iter()
            .find(|l| fold_eq(&l.name, name))
            .cloned()
    }
}

impl Ircd {
    /// KLINE/GLINE/ZLINE/QLINE/ELINE shared implementation.
    pub fn apply_xline(
        &mut self,
        kind: XLineKind,
        source: UserId,
        mask: &str,
        duration: u64,
        reason: &str,
    ) -> Result<(), HandlerError> {
        let set_by = self
            .state
            .users
            .get(source)
            .map(|u| u.nick.clone())
            .unwrap_or_default();

        if let Some(mask) = mask.strip_prefix('-') {
            let removed = self.xlines.remove(kind, mask);
            let verdict = if removed { "removed" } else { "found no" };
            fanout::opers(
                &mut self.state,
                &format!("*** {set_by} {verdict} {}-line on {mask}", kind.letter()),
            );
            return Ok(());
        }

        let added = self.xlines.add(
            kind,
            XLine {
                mask: mask.to_string(),
                set_by: set_by.clone(),
                set_at: chrono::Utc::now().timestamp(),
                duration,
                reason: reason.to_string(),
            },
        );
        if !added {
            fanout::opers(
                &mut self.state,
                &format!("*** {}-line on {mask} already exists", kind.letter()),
            );
            return Ok(());
        }
        fanout::opers(
            &mut self.state,
            &format!(
                "*** {set_by} added {}-line on {mask}: {reason}",
                kind.letter()
            ),
        );

        // Enforce against whoever is already connected.
        match kind {
            XLineKind::K | XLineKind::G | XLineKind::Z => {
                let victims: Vec<UserId> = self
                    .state
                    .users
                    .iter()
                    .filter(|u| u.is_local() && u.registration.is_registered())
                    .filter(|u| {
                        self.xlines
                            .check_connection(&u.ident, &u.host, &u.ip)
                            .is_some()
                    })
                    .map(|u| u.id)
                    .collect();
                let reason = format!("{}-Lined: {reason}", kind.letter());
                for id in victims {
                    self.quit_user(id, &reason, true);
                }
            }
            XLineKind::Q => {
                let victims: Vec<UserId> = self
                    .state
                    .users
                    .iter()
                    .filter(|u| u.is_local() && self.xlines.check_nick(&u.nick).is_some())
                    .map(|u| u.id)
                    .collect();
                for id in victims {
                    self.quit_user(id, "Q-Lined nickname", true);
                }
            }
            XLineKind::E => {}
        }
        Ok(())
    }
}
