//! The module host: compiled-in extensions wired to fixed hook points.
//!
//! A module implements [`Module`] and is created through the factory
//! registry at boot or via LOADMODULE. Hooks run synchronously on the core
//! task; decision-returning hooks short-circuit on the first HALT.
//!
//! Module callbacks receive a [`ServerApi`] façade rather than the full
//! daemon, and must re-resolve any `UserId`/`ChannelId` on every callback:
//! the core may have destroyed the record in between. Hook sites are
//! non-reentrant: fanout performed *from inside* a callback does not
//! re-enter the raw-socket write hook.

mod operjoin;
mod sajoin;

pub use operjoin::Operjoin;
pub use sajoin::Sajoin;

use crate::commands::{CommandTable, HandlerFn};
use crate::config::Config;
use crate::error::{HandlerResult, StateError};
use crate::fanout;
use crate::membership;
use crate::peers::PeerFabric;
use crate::state::{ChannelId, ConnId, ServerState, UserId};

/// Outcome of a decision-bearing hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Proceed normally.
    Continue,
    /// Abort the action; the module has handled any reply itself.
    Halt,
    /// The module consumed the action (e.g. a custom mode letter).
    Passthru,
}

/// What a mode change is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeTarget {
    User(UserId),
    Channel(ChannelId),
}

/// Narrowed capability surface handed to module callbacks.
pub struct ServerApi<'a> {
    pub state: &'a mut ServerState,
    pub peers: &'a mut PeerFabric,
    pub commands: &'a mut CommandTable,
    pub config: &'a Config,
}

impl ServerApi<'_> {
    pub fn find_nick(&self, nick: &str) -> Option<UserId> {
        self.state.users.by_nick(nick)
    }

    /// Send a line to `dst`, from a user when given, else from the server.
    pub fn send_to(&mut self, src: Option<UserId>, dst: UserId, text: &str) {
        fanout::to(self.state, src, dst, text);
    }

    /// Server notice to all +s opers.
    pub fn send_opers(&mut self, text: &str) {
        fanout::opers(self.state, text);
    }

    /// Register a command owned by `source` (the module's name).
    pub fn add_command(
        &mut self,
        name: &str,
        handler: HandlerFn,
        required_mode: Option<char>,
        min_params: usize,
        source: &str,
    ) -> Result<(), StateError> {
        self.commands
            .register(name, handler, required_mode, min_params, source)
    }

    /// Force a user into a channel, bypassing join restrictions.
    pub fn join_user_to_channel(&mut self, user: UserId, channel: &str) -> HandlerResult {
        membership::join_channel(self.state, user, channel, None, true).map(|_| ())
    }
}

/// The extension interface. Every hook has a no-op default.
pub trait Module: Send {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str {
        ""
    }

    fn on_load(&mut self, _api: &mut ServerApi<'_>) {}
    fn on_unload(&mut self, _api: &mut ServerApi<'_>) {}

    fn on_user_connect(&mut self, _api: &mut ServerApi<'_>, _user: UserId) {}
    fn on_user_quit(&mut self, _api: &mut ServerApi<'_>, _user: UserId, _reason: &str) {}
    fn on_channel_create(&mut self, _api: &mut ServerApi<'_>, _channel: ChannelId) {}
    fn on_join(&mut self, _api: &mut ServerApi<'_>, _user: UserId, _channel: ChannelId) {}
    fn on_part(&mut self, _api: &mut ServerApi<'_>, _user: UserId, _channel: ChannelId) {}
    fn on_kick(
        &mut self,
        _api: &mut ServerApi<'_>,
        _source: UserId,
        _target: UserId,
        _channel: ChannelId,
    ) {
    }

    fn on_mode_change(
        &mut self,
        _api: &mut ServerApi<'_>,
        _source: UserId,
        _target: ModeTarget,
        _letter: char,
        _on: bool,
        _param: Option<&str>,
    ) -> Decision {
        Decision::Continue
    }

    fn on_topic_change(
        &mut self,
        _api: &mut ServerApi<'_>,
        _user: UserId,
        _channel: ChannelId,
        _text: &str,
    ) -> Decision {
        Decision::Continue
    }

    fn on_pre_command(
        &mut self,
        _api: &mut ServerApi<'_>,
        _user: UserId,
        _command: &str,
        _args: &[String],
    ) -> Decision {
        Decision::Continue
    }

    fn on_post_command(
        &mut self,
        _api: &mut ServerApi<'_>,
        _user: UserId,
        _command: &str,
        _args: &[String],
    ) {
    }

    fn on_raw_socket_read(&mut self, _conn: ConnId, _line: &str) -> Decision {
        Decision::Continue
    }

    fn on_raw_socket_write(&mut self, _conn: ConnId, _line: &str) {}

    fn on_oper(&mut self, _api: &mut ServerApi<'_>, _user: UserId) {}

    /// Registration gate: a user is promoted only once every module
    /// returns true.
    fn on_check_ready(&mut self, _api: &mut ServerApi<'_>, _user: UserId) -> bool {
        true
    }

    /// Last chance to rewrite an outbound peer packet.
    fn on_packet_transmit(&mut self, _line: &mut String) {}
}

/// Factory registry for loadable modules.
pub fn create_module(name: &str) -> Option<Box<dyn Module>> {
    match name {
        "operjoin" => Some(Box::new(Operjoin::default())),
        "sajoin" => Some(Box::new(Sajoin)),
        _ => None,
    }
}

struct LoadedModule {
    name: String,
    module: Box<dyn Module>,
}

/// Owner of every loaded module instance.
#[derive(Default)]
pub struct ModuleHost {
    loaded: Vec<LoadedModule>,
}

impl ModuleHost {
    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded.iter().any(|m| m.name == name)
    }

    /// Instantiate and attach a module by factory name.
    pub fn load(&mut self, name: &str, api: &mut ServerApi<'_>) -> Result<(), String> {
        if self.is_loaded(name) {
            return Err(format!("module {name} is already loaded"));
        }
        let module = create_module(name).ok_or_else(|| format!("no such module: {name}"))?;
        self.attach(name, module, api);
        Ok(())
    }

    /// Attach an already-built module instance.
    pub fn attach(&mut self, name: &str, mut module: Box<dyn Module>, api: &mut ServerApi<'_>) {
        module.on_load(api);
        tracing::info!(module = %name, "module loaded");
        self.loaded.push(LoadedModule {
            name: name.to_string(),
            module,
        });
    }

    /// Detach a module, removing any commands it registered.
    pub fn unload(&mut self, name: &str, api: &mut ServerApi<'_>) -> Result<(), String> {
        let idx = self
            .loaded
            .iter()
            .position(|m| m.name == name)
            .ok_or_else(|| format!("module {name} is not loaded"))?;
        let mut entry = self.loaded.remove(idx);
        entry.module.on_unload(api);
        let removed = api.commands.remove_source(name);
        tracing::info!(module = %name, commands_removed = removed, "module unloaded");
        Ok(())
    }

    /// Loaded module names with descriptions, in load order.
    pub fn listing(&self) -> Vec<(String, String)> {
        self.loaded
            .iter()
            .map(|m| (m.name.clone(), m.module.description().to_string()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.loaded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaded.is_empty()
    }

    // --- Hook fan-outs ---

    pub fn pre_command(
        &mut self,
        api: &mut ServerApi<'_>,
        user: UserId,
        command: &str,
        args: &[String],
    ) -> Decision {
        for entry in &mut self.loaded {
            match entry.module.on_pre_command(api, user, command, args) {
                Decision::Continue => {}
                stop => return stop,
            }
        }
        Decision::Continue
    }

    pub fn post_command(
        &mut self,
        api: &mut ServerApi<'_>,
        user: UserId,
        command: &str,
        args: &[String],
    ) {
        for entry in &mut self.loaded {
            entry.module.on_post_command(api, user, command, args);
        }
    }

    pub fn check_ready(&mut self, api: &mut ServerApi<'_>, user: UserId) -> bool {
        self.loaded
            .iter_mut()
            .all(|entry| entry.module.on_check_ready(api, user))
    }

    pub fn raw_read(&mut self, conn: ConnId, line: &str) -> Decision {
        for entry in &mut self.loaded {
            match entry.module.on_raw_socket_read(conn, line) {
                Decision::Continue => {}
                stop => return stop,
            }
        }
        Decision::Continue
    }

    pub fn raw_write(&mut self, conn: ConnId, line: &str) {
        for entry in &mut self.loaded {
            entry.module.on_raw_socket_write(conn, line);
        }
    }

    pub fn packet_transmit(&mut self, line: &mut String) {
        for entry in &mut self.loaded {
            entry.module.on_packet_transmit(line);
        }
    }

    pub fn user_connect(&mut self, api: &mut ServerApi<'_>, user: UserId) {
        for entry in &mut self.loaded {
            entry.module.on_user_connect(api, user);
        }
    }

    pub fn user_quit(&mut self, api: &mut ServerApi<'_>, user: UserId, reason: &str) {
        for entry in &mut self.loaded {
            entry.module.on_user_quit(api, user, reason);
        }
    }

    pub fn channel_create(&mut self, api: &mut ServerApi<'_>, channel: ChannelId) {
        for entry in &mut self.loaded {
            entry.module.on_channel_create(api, channel);
        }
    }

    pub fn join(&mut self, api: &mut ServerApi<'_>, user: UserId, channel: ChannelId) {
        for entry in &mut self.loaded {
            entry.module.on_join(api, user, channel);
        }
    }

    pub fn part(&mut self, api: &mut ServerApi<'_>, user: UserId, channel: ChannelId) {
        for entry in &mut self.loaded {
            entry.module.on_part(api, user, channel);
        }
    }

    pub fn kick(
        &mut self,
        api: &mut ServerApi<'_>,
        source: UserId,
        target: UserId,
        channel: ChannelId,
    ) {
        for entry in &mut self.loaded {
            entry.module.on_kick(api, source, target, channel);
        }
    }

    pub fn mode_change(
        &mut self,
        api: &mut ServerApi<'_>,
        source: UserId,
        target: ModeTarget,
        letter: char,
        on: bool,
        param: Option<&str>,
    ) -> Decision {
        for entry in &mut self.loaded {
            match entry
                .module
                .on_mode_change(api, source, target, letter, on, param)
            {
                Decision::Continue => {}
                stop => return stop,
            }
        }
        Decision::Continue
    }

    pub fn topic_change(
        &mut self,
        api: &mut ServerApi<'_>,
        user: UserId,
        channel: ChannelId,
        text: &str,
    ) -> Decision {
        for entry in &mut self.loaded {
            match entry.module.on_topic_change(api, user, channel, text) {
                Decision::Continue => {}
                stop => return stop,
            }
        }
        Decision::Continue
    }

    pub fn oper(&mut self, api: &mut ServerApi<'_>, user: UserId) {
        for entry in &mut self.loaded {
            entry.module.on_oper(api, user);
        }
    }
}
