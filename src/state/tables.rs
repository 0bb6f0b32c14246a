//! Identifier tables: the nick and channel lookups.
//!
//! Both tables are arenas with stable indices plus a folded-name index.
//! Records are owned exclusively by their table; everything else refers to
//! them through `UserId`/`ChannelId`.

use crate::error::StateError;
use crate::state::channel::{Channel, ChannelId};
use crate::state::registration::Registration;
use crate::state::user::{ConnId, User, UserId};
use cinder_proto::fold;
use std::collections::HashMap;

/// Arena of users with a folded-nick index.
///
/// A user enters the index when a nick is bound (which reserves it for the
/// duration of registration) and leaves it on release.
#[derive(Debug, Default)]
pub struct UserTable {
    slots: Vec<Option<User>>,
    free: Vec<usize>,
    index: HashMap<String, UserId>,
}

impl UserTable {
    /// Allocate a user record with no nick bound yet.
    pub fn create(&mut self, conn: ConnId, server: &str, host: &str, ip: &str, now: i64) -> UserId {
        let slot = match self.free.pop() {
            Some(s) => s,
            None => {
                self.slots.push(None);
                self.slots.len() - 1
            }
        };
        let id = UserId(slot as u32);
        self.slots[slot] = Some(User {
            id,
            nick: String::new(),
            ident: String::new(),
            host: host.to_string(),
            dhost: host.to_string(),
            ip: ip.to_string(),
            realname: String::new(),
            server: server.to_string(),
            conn,
            modes: Default::default(),
            away: None,
            password: None,
            invites: Vec::new(),
            registration: Registration::New,
            connected_at: now,
            memberships: Vec::new(),
            sender: None,
        });
        id
    }

    pub fn get(&self, id: UserId) -> Option<&User> {
        self.slots.get(id.0 as usize).and_then(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, id: UserId) -> Option<&mut User> {
        self.slots.get_mut(id.0 as usize).and_then(|s| s.as_mut())
    }

    /// Look up by nickname under the fold.
    pub fn by_nick(&self, nick: &str) -> Option<UserId> {
        self.index.get(&fold(nick)).copied()
    }

    /// Bind (or rebind) a nickname, reserving its folded form.
    ///
    /// Fails with `DuplicateName` when another user holds the folded name.
    pub fn bind_nick(&mut self, id: UserId, nick: &str) -> Result<(), StateError> {
        let folded = fold(nick);
        if let Some(&holder) = self.index.get(&folded) {
            if holder != id {
                return Err(StateError::DuplicateName);
            }
        }
        let old_folded = match self.get(id) {
            Some(u) if !u.nick.is_empty() => Some(fold(&u.nick)),
            Some(_) => None,
            None => return Err(StateError::NoSuchNick),
        };
        if let Some(old) = old_folded {
            self.index.remove(&old);
        }
        self.index.insert(folded, id);
        if let Some(user) = self.get_mut(id) {
            user.nick = nick.to_string();
        }
        Ok(())
    }

    /// Remove a user, releasing its slot and nick reservation.
    pub fn release(&mut self, id: UserId) -> Option<User> {
        let user = self.slots.get_mut(id.0 as usize)?.take()?;
        if !user.nick.is_empty() {
            self.index.remove(&fold(&user.nick));
        }
        self.free.push(id.0 as usize);
        Some(user)
    }

    pub fn iter(&self) -> impl Iterator<Item = &User> {
        self.slots.iter().filter_map(|s| s.as_ref())
    }

    /// Snapshot of live ids, for iterate-then-mutate patterns.
    pub fn ids(&self) -> Vec<UserId> {
        self.iter().map(|u| u.id).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Arena of channels with a folded-name index.
#[derive(Debug, Default)]
pub struct ChannelTable {
    slots: Vec<Option<Channel>>,
    free: Vec<usize>,
    index: HashMap<String, ChannelId>,
}

impl ChannelTable {
    /// Create a channel; fails with `DuplicateName` if the folded name
    /// already exists.
    pub fn create(&mut self, name: &str, now: i64) -> Result<ChannelId, StateError> {
        let folded = fold(name);
        if self.index.contains_key(&folded) {
            return Err(StateError::DuplicateName);
        }
        let slot = match self.free.pop() {
            Some(s) => s,
            None => {
                self.slots.push(None);
                self.slots.len() - 1
            }
        };
        let id = ChannelId(slot as u32);
        self.slots[slot] = Some(Channel::new(id, name, now));
        self.index.insert(folded, id);
        Ok(id)
    }

    pub fn get(&self, id: ChannelId) -> Option<&Channel> {
        self.slots.get(id.0 as usize).and_then(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, id: ChannelId) -> Option<&mut Channel> {
        self.slots.get_mut(id.0 as usize).and_then(|s| s.as_mut())
    }

    pub fn by_name(&self, name: &str) -> Option<ChannelId> {
        self.index.get(&fold(name)).copied()
    }

    pub fn remove(&mut self, id: ChannelId) -> Option<Channel> {
        let chan = self.slots.get_mut(id.0 as usize)?.take()?;
        self.index.remove(&fold(&chan.name));
        self.free.push(id.0 as usize);
        Some(chan)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.slots.iter().filter_map(|s| s.as_ref())
    }

    pub fn ids(&self) -> Vec<ChannelId> {
        self.iter().map(|c| c.id).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
