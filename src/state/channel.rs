//! Channel-related types and state.

use crate::state::user::{MemberStatus, UserId};
use std::collections::HashMap;

/// Stable identifier into the channel arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(pub u32);

/// Channel topic with attribution.
#[derive(Debug, Clone)]
pub struct Topic {
    pub text: String,
    pub set_by: String,
    pub set_at: i64,
}

/// An entry in the ban list.
#[derive(Debug, Clone)]
pub struct BanEntry {
    pub mask: String,
    pub set_by: String,
    pub set_at: i64,
}

/// The simple boolean channel modes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ChannelModes {
    pub no_external_msgs: bool, // +n
    pub topic_locked: bool,     // +t
    pub invite_only: bool,      // +i
    pub moderated: bool,        // +m
    pub secret: bool,           // +s
    pub is_private: bool,       // +p
}

impl ChannelModes {
    /// Look up by mode letter; `None` for letters that are not simple
    /// boolean modes.
    pub fn flag_mut(&mut self, letter: char) -> Option<&mut bool> {
        match letter {
            'n' => Some(&mut self.no_external_msgs),
            't' => Some(&mut self.topic_locked),
            'i' => Some(&mut self.invite_only),
            'm' => Some(&mut self.moderated),
            's' => Some(&mut self.secret),
            'p' => Some(&mut self.is_private),
            _ => None,
        }
    }
}

/// A live channel. Exists iff it has at least one member.
#[derive(Debug)]
pub struct Channel {
    pub id: ChannelId,
    /// Display name, case preserved from the creator's JOIN.
    pub name: String,
    pub topic: Option<Topic>,
    pub key: Option<String>,
    /// Member cap; 0 means unlimited.
    pub limit: u32,
    pub modes: ChannelModes,
    /// Module-registered mode letters, in activation order.
    pub custom_modes: String,
    /// Parameters for custom modes that take one.
    pub custom_params: HashMap<char, String>,
    pub bans: Vec<BanEntry>,
    pub members: Vec<(UserId, MemberStatus)>,
    pub created_at: i64,
}

impl Channel {
    pub fn new(id: ChannelId, name: &str, created_at: i64) -> Self {
        Self {
            id,
            name: name.to_string(),
            topic: None,
            key: None,
            limit: 0,
            modes: ChannelModes::default(),
            custom_modes: String::new(),
            custom_params: HashMap::new(),
            bans: Vec::new(),
            members: Vec::new(),
            created_at,
        }
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_member(&self, user: UserId) -> bool {
        self.members.iter().any(|(u, _)| *u == user)
    }

    pub fn member_status(&self, user: UserId) -> Option<MemberStatus> {
        self.members
            .iter()
            .find(|(u, _)| *u == user)
            .map(|(_, st)| *st)
    }

    /// Activate a custom (module-registered) mode letter, optionally with a
    /// parameter. Returns false when already active.
    pub fn set_custom_mode(&mut self, letter: char, param: Option<String>) -> bool {
        if self.custom_modes.contains(letter) {
            return false;
        }
        self.custom_modes.push(letter);
        if let Some(p) = param {
            self.custom_params.insert(letter, p);
        }
        true
    }

    /// Deactivate a custom mode letter. Returns false when not active.
    pub fn unset_custom_mode(&mut self, letter: char) -> bool {
        if !self.custom_modes.contains(letter) {
            return false;
        }
        self.custom_modes.retain(|c| c != letter);
        self.custom_params.remove(&letter);
        true
    }

    /// Render active modes as `(flags, params)`.
    ///
    /// Letter order is fixed: `n t k l i m s p`, then custom letters in
    /// activation order. Parameters follow the same order, each with a
    /// single leading space, key before limit.
    pub fn render_modes(&self) -> (String, String) {
        let mut flags = String::new();
        let mut params = String::new();

        if self.modes.no_external_msgs {
            flags.push('n');
        }
        if self.modes.topic_locked {
            flags.push('t');
        }
        if self.key.is_some() {
            flags.push('k');
        }
        if self.limit > 0 {
            flags.push('l');
        }
        if self.modes.invite_only {
            flags.push('i');
        }
        if self.modes.moderated {
            flags.push('m');
        }
        if self.modes.secret {
            flags.push('s');
        }
        if self.modes.is_private {
            flags.push('p');
        }

        if let Some(key) = &self.key {
            params.push(' ');
            params.push_str(key);
        }
        if self.limit > 0 {
            params.push_str(&format!(" {}", self.limit));
        }

        for letter in self.custom_modes.chars() {
            flags.push(letter);
            if let Some(p) = self.custom_params.get(&letter) {
                params.push(' ');
                params.push_str(p);
            }
        }

        (flags, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chan() -> Channel {
        Channel::new(ChannelId(0), "#test", 0)
    }

    #[test]
    fn render_order_is_canonical() {
        let mut c = chan();
        c.modes.is_private = true;
        c.modes.moderated = true;
        c.modes.no_external_msgs = true;
        c.modes.topic_locked = true;
        c.key = Some("sekrit".to_string());
        c.limit = 25;
        let (flags, params) = c.render_modes();
        assert_eq!(flags, "ntklmp");
        assert_eq!(params, " sekrit 25");
    }

    #[test]
    fn custom_modes_follow_simple_ones() {
        let mut c = chan();
        c.modes.no_external_msgs = true;
        assert!(c.set_custom_mode('J', Some("5".to_string())));
        assert!(c.set_custom_mode('x', None));
        assert!(!c.set_custom_mode('J', None));
        let (flags, params) = c.render_modes();
        assert_eq!(flags, "nJx");
        assert_eq!(params, " 5");
        assert!(c.unset_custom_mode('J'));
        assert_eq!(c.render_modes().0, "nx");
    }

    #[test]
    fn empty_channel_renders_nothing() {
        let (flags, params) = chan().render_modes();
        assert!(flags.is_empty());
        assert!(params.is_empty());
    }

    #[test]
    fn rendered_modes_reapply_to_an_equal_channel() {
        let mut original = chan();
        original.modes.no_external_msgs = true;
        original.modes.invite_only = true;
        original.key = Some("pass".to_string());
        original.limit = 7;
        original.set_custom_mode('J', Some("5".to_string()));

        let (flags, params) = original.render_modes();
        let mut params = params.split_whitespace();

        let mut rebuilt = chan();
        for letter in flags.chars() {
            match letter {
                'k' => rebuilt.key = params.next().map(str::to_string),
                'l' => rebuilt.limit = params.next().and_then(|p| p.parse().ok()).unwrap_or(0),
                other => {
                    if let Some(flag) = rebuilt.modes.flag_mut(other) {
                        *flag = true;
                    } else {
                        rebuilt.set_custom_mode(other, params.next().map(str::to_string));
                    }
                }
            }
        }

        assert_eq!(rebuilt.modes, original.modes);
        assert_eq!(rebuilt.key, original.key);
        assert_eq!(rebuilt.limit, original.limit);
        assert_eq!(rebuilt.custom_modes, original.custom_modes);
        assert_eq!(rebuilt.custom_params, original.custom_params);
        assert_eq!(rebuilt.render_modes(), original.render_modes());
    }
}
