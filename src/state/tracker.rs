//! Channel membership tracking.
//!
//! Follows who is in which channel, which prefix modes they hold, and what
//! their hostmask is. Hostmasks are not always known up front (NAMES only
//! lists nicks), so joining a channel triggers a `WHO` lookup; each reply
//! that reveals a hostmask produces a [`BotEvent::HostmaskUpdated`], and the
//! last outstanding lookup to finish produces
//! [`BotEvent::AllHostmasksProcessed`].

use crate::client::ClientEvent;
use crate::client::casemap::{irc_eq, irc_to_lower};
use crate::events::{ActionableEvent, BotEvent};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

/// Prefix modes in rank order, with their NAMES/WHO symbols.
const PREFIXES: [(char, char); 5] = [('q', '~'), ('a', '&'), ('o', '@'), ('h', '%'), ('v', '+')];

/// Modes that make the holder a channel operator.
const OPERATOR_MODES: [char; 3] = ['q', 'a', 'o'];

/// Privilege modes a member holds in one channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberModes(BTreeSet<char>);

impl MemberModes {
    /// Modes from NAMES/WHO prefix symbols (`@+nick` style).
    pub fn from_prefixes(symbols: &str) -> Self {
        Self(
            symbols
                .chars()
                .filter_map(|s| PREFIXES.iter().find(|(_, p)| *p == s).map(|(m, _)| *m))
                .collect(),
        )
    }

    pub fn has(&self, mode: char) -> bool {
        self.0.contains(&mode)
    }

    pub fn set(&mut self, mode: char, adding: bool) {
        if adding {
            self.0.insert(mode);
        } else {
            self.0.remove(&mode);
        }
    }

    pub fn is_operator(&self) -> bool {
        OPERATOR_MODES.iter().any(|m| self.has(*m))
    }
}

impl<const N: usize> From<[char; N]> for MemberModes {
    fn from(modes: [char; N]) -> Self {
        Self(modes.into_iter().collect())
    }
}

#[derive(Debug, Clone)]
struct Member {
    nick: String,
    modes: MemberModes,
}

#[derive(Debug, Clone)]
struct ChannelState {
    name: String,
    members: HashMap<String, Member>,
}

impl ChannelState {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            members: HashMap::new(),
        }
    }
}

/// Side effects of applying one client event.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TrackerUpdate {
    /// Events for plugins.
    pub events: Vec<BotEvent>,
    /// Channels to send `WHO` for.
    pub who: Vec<String>,
}

/// Live view of the channels the bot is in.
pub struct ChannelTracker {
    own_nick: RwLock<String>,
    /// Keyed by casefolded channel name.
    channels: DashMap<String, ChannelState>,
    /// Casefolded nick -> `nick!user@host`.
    hostmasks: DashMap<String, String>,
    /// Casefolded WHO masks still waiting for RPL_ENDOFWHO.
    pending_who: Mutex<HashSet<String>>,
}

fn key(name: &str) -> String {
    irc_to_lower(name)
}

impl ChannelTracker {
    pub fn new(own_nick: &str) -> Self {
        Self {
            own_nick: RwLock::new(own_nick.to_string()),
            channels: DashMap::new(),
            hostmasks: DashMap::new(),
            pending_who: Mutex::new(HashSet::new()),
        }
    }

    pub fn own_nick(&self) -> String {
        self.own_nick.read().clone()
    }

    fn is_self(&self, nick: &str) -> bool {
        irc_eq(&self.own_nick.read(), nick)
    }

    /// Known hostmask for `nick`.
    pub fn hostmask_of(&self, nick: &str) -> Option<String> {
        self.hostmasks.get(&key(nick)).map(|h| h.clone())
    }

    /// Whether the bot holds operator-equivalent privileges in `channel`.
    pub fn bot_has_ops(&self, channel: &str) -> bool {
        let own = key(&self.own_nick());
        self.channels
            .get(&key(channel))
            .and_then(|c| c.members.get(&own).map(|m| m.modes.is_operator()))
            .unwrap_or(false)
    }

    /// Known hostmasks of the members of `channel`.
    pub fn hostmasks_in(&self, channel: &str) -> Vec<String> {
        let Some(state) = self.channels.get(&key(channel)) else {
            return Vec::new();
        };
        state
            .members
            .keys()
            .filter_map(|k| self.hostmasks.get(k).map(|h| h.clone()))
            .collect()
    }

    /// Tracked channel names.
    pub fn channels(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name.clone()).collect()
    }

    /// Channels `nick` is currently in.
    pub fn channels_of(&self, nick: &str) -> Vec<String> {
        let k = key(nick);
        self.channels
            .iter()
            .filter(|c| c.members.contains_key(&k))
            .map(|c| c.name.clone())
            .collect()
    }

    /// Current state of `nick` in `channel`.
    pub fn subject(&self, channel: &str, nick: &str) -> Option<ActionableEvent> {
        let state = self.channels.get(&key(channel))?;
        let member = state.members.get(&key(nick))?;
        Some(ActionableEvent {
            hostmask: self.hostmask_of(&member.nick),
            nick: member.nick.clone(),
            channel: state.name.clone(),
            modes: member.modes.clone(),
        })
    }

    /// Every member of every tracked channel except the bot itself.
    pub fn subjects(&self) -> Vec<ActionableEvent> {
        let own = key(&self.own_nick());
        let mut subjects = Vec::new();
        for state in self.channels.iter() {
            for (k, member) in &state.members {
                if *k == own {
                    continue;
                }
                subjects.push(ActionableEvent {
                    hostmask: self.hostmask_of(&member.nick),
                    nick: member.nick.clone(),
                    channel: state.name.clone(),
                    modes: member.modes.clone(),
                });
            }
        }
        subjects
    }

    /// Fold a client event into the tracked state.
    pub fn apply(&self, event: &ClientEvent) -> TrackerUpdate {
        let mut update = TrackerUpdate::default();

        match event {
            ClientEvent::Registered { nick, .. } => {
                *self.own_nick.write() = nick.clone();
            }
            ClientEvent::Join {
                channel,
                nick,
                hostmask,
            } => {
                if self.is_self(nick) {
                    self.channels.insert(key(channel), ChannelState::new(channel));
                    self.pending_who.lock().insert(key(channel));
                    update.who.push(channel.clone());
                }
                if let Some(mut state) = self.channels.get_mut(&key(channel)) {
                    state.members.insert(
                        key(nick),
                        Member {
                            nick: nick.clone(),
                            modes: MemberModes::default(),
                        },
                    );
                }
                if let Some(hostmask) = hostmask {
                    self.hostmasks.insert(key(nick), hostmask.clone());
                }
                update.events.push(BotEvent::Join {
                    channel: channel.clone(),
                    nick: nick.clone(),
                    hostmask: hostmask.clone(),
                });
            }
            ClientEvent::Part { channel, nick } | ClientEvent::Kick { channel, nick } => {
                if self.is_self(nick) {
                    self.channels.remove(&key(channel));
                    self.pending_who.lock().remove(&key(channel));
                } else if let Some(mut state) = self.channels.get_mut(&key(channel)) {
                    state.members.remove(&key(nick));
                }
                self.forget_if_gone(nick);
            }
            ClientEvent::Quit { nick } => {
                let k = key(nick);
                for mut state in self.channels.iter_mut() {
                    state.members.remove(&k);
                }
                self.hostmasks.remove(&k);
            }
            ClientEvent::NickChange { old, new } => self.rename(old, new),
            ClientEvent::Privmsg {
                nick,
                hostmask: Some(hostmask),
                ..
            } => {
                self.hostmasks.insert(key(nick), hostmask.clone());
            }
            ClientEvent::Mode {
                channel,
                changes,
                args,
                ..
            } => update.events.extend(self.apply_modes(channel, changes, args)),
            ClientEvent::Names { channel, entries } => {
                if let Some(mut state) = self.channels.get_mut(&key(channel)) {
                    for entry in entries {
                        let split = entry
                            .find(|c: char| !PREFIXES.iter().any(|(_, p)| *p == c))
                            .unwrap_or(entry.len());
                        let (symbols, rest) = entry.split_at(split);
                        if rest.is_empty() {
                            continue;
                        }
                        // userhost-in-names form: nick!user@host
                        let nick = match rest.split_once('!') {
                            Some((nick, _)) => {
                                self.hostmasks.insert(key(nick), rest.to_string());
                                nick
                            }
                            None => rest,
                        };
                        state.members.insert(
                            key(nick),
                            Member {
                                nick: nick.to_string(),
                                modes: MemberModes::from_prefixes(symbols),
                            },
                        );
                    }
                }
            }
            ClientEvent::WhoReply {
                channel,
                nick,
                user,
                host,
                flags,
            } => {
                let hostmask = format!("{}!{}@{}", nick, user, host);
                let k = key(nick);

                if let Some(mut state) = self.channels.get_mut(&key(channel))
                    && let Some(member) = state.members.get_mut(&k)
                {
                    member.modes = MemberModes::from_prefixes(flags);
                }

                let previous = self.hostmasks.insert(k, hostmask.clone());
                if previous.as_deref() != Some(hostmask.as_str()) && !self.is_self(nick) {
                    update.events.push(BotEvent::HostmaskUpdated {
                        nick: nick.clone(),
                        hostmask,
                        channels: self.channels_of(nick),
                    });
                }
            }
            ClientEvent::EndOfWho { mask } => {
                let mut pending = self.pending_who.lock();
                if pending.remove(&key(mask)) && pending.is_empty() {
                    update.events.push(BotEvent::AllHostmasksProcessed);
                }
            }
            ClientEvent::Privmsg { .. }
            | ClientEvent::CtcpVersion { .. }
            | ClientEvent::Disconnected { .. } => {}
        }

        update
    }

    fn forget_if_gone(&self, nick: &str) {
        let k = key(nick);
        if !self.channels.iter().any(|c| c.members.contains_key(&k)) {
            self.hostmasks.remove(&k);
        }
    }

    fn rename(&self, old: &str, new: &str) {
        let (old_key, new_key) = (key(old), key(new));

        if self.is_self(old) {
            *self.own_nick.write() = new.to_string();
        }

        for mut state in self.channels.iter_mut() {
            if let Some(mut member) = state.members.remove(&old_key) {
                member.nick = new.to_string();
                state.members.insert(new_key.clone(), member);
            }
        }

        if let Some((_, hostmask)) = self.hostmasks.remove(&old_key) {
            let rest = hostmask.split_once('!').map(|(_, r)| r).unwrap_or_default();
            self.hostmasks.insert(new_key, format!("{}!{}", new, rest));
        }
    }

    /// Update member modes; reports every ban placed in a tracked channel.
    fn apply_modes(&self, channel: &str, changes: &str, args: &[String]) -> Vec<BotEvent> {
        let mut events = Vec::new();
        let Some(mut state) = self.channels.get_mut(&key(channel)) else {
            return events;
        };

        let mut args = args.iter();
        let mut adding = true;
        for mode in changes.chars() {
            match mode {
                '+' => adding = true,
                '-' => adding = false,
                m if PREFIXES.iter().any(|(pm, _)| *pm == m) => {
                    let Some(target) = args.next() else { break };
                    match state.members.get_mut(&key(target)) {
                        Some(member) => member.modes.set(m, adding),
                        None => debug!(channel = %channel, nick = %target, "Mode for untracked member"),
                    }
                }
                'b' => {
                    let Some(mask) = args.next() else { break };
                    if adding {
                        events.push(BotEvent::BanAdded {
                            channel: state.name.clone(),
                            mask: mask.clone(),
                        });
                    }
                }
                'e' | 'I' | 'k' => {
                    args.next();
                }
                'l' if adding => {
                    args.next();
                }
                _ => {}
            }
        }
        events
    }
}
