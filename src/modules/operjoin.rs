//! Force opers into a configured channel when they oper up.

use crate::modules::{Module, ServerApi};
use crate::state::UserId;

#[derive(Default)]
pub struct Operjoin {
    channel: String,
}

impl Module for Operjoin {
    fn name(&self) -> &'static str {
        "operjoin"
    }

    fn description(&self) -> &'static str {
        "Forces opers to join a specified channel on oper-up"
    }

    fn on_load(&mut self, api: &mut ServerApi<'_>) {
        self.channel = api.config.operjoin.channel.clone();
    }

    fn on_oper(&mut self, api: &mut ServerApi<'_>, user: UserId) {
        if self.channel.is_empty() {
            return;
        }
        let channel = self.channel.clone();
        if let Err(e) = api.join_user_to_channel(user, &channel) {
            tracing::debug!(error = %e, channel = %channel, "operjoin failed");
        }
    }
}
