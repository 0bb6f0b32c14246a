//! Unreal-style SAJOIN: an oper forces another user into a channel.

use crate::error::{HandlerError, HandlerResult};
use crate::fanout;
use crate::ircd::Ircd;
use crate::membership;
use crate::modules::{Module, ServerApi};
use crate::state::UserId;

pub struct Sajoin;

impl Module for Sajoin {
    fn name(&self) -> &'static str {
        "sajoin"
    }

    fn description(&self) -> &'static str {
        "Provides support for unreal-style SAJOIN command"
    }

    fn on_load(&mut self, api: &mut ServerApi<'_>) {
        if let Err(e) = api.add_command("SAJOIN", handle_sajoin, Some('o'), 2, "sajoin") {
            tracing::warn!(error = %e, "could not register SAJOIN");
        }
    }
}

fn handle_sajoin(ircd: &mut Ircd, user: UserId, args: &[String]) -> HandlerResult {
    let target_nick = &args[0];
    let channel = &args[1];

    let Some(target) = ircd.state.users.by_nick(target_nick) else {
        return Err(HandlerError::NoSuchNick(target_nick.clone()));
    };

    if !channel.starts_with('#') || channel.contains(' ') || channel.contains(',') {
        let nick = ircd
            .state
            .users
            .get(user)
            .map(|u| u.nick.clone())
            .unwrap_or_default();
        fanout::to(
            &mut ircd.state,
            None,
            user,
            &format!("NOTICE {nick} :*** Invalid characters in channel name"),
        );
        return Ok(());
    }

    let (source_nick, dest_nick) = {
        let src = ircd.state.users.get(user).map(|u| u.nick.clone());
        let dst = ircd.state.users.get(target).map(|u| u.nick.clone());
        (src.unwrap_or_default(), dst.unwrap_or_default())
    };
    fanout::opers(
        &mut ircd.state,
        &format!("{source_nick} used SAJOIN to make {dest_nick} join {channel}"),
    );
    membership::join_channel(&mut ircd.state, target, channel, None, true).map(|_| ())
}
