//! Bot-level events dispatched to plugins.
//!
//! Raw [`ClientEvent`](crate::client::ClientEvent)s pass through the channel
//! tracker and the message classifier first; what comes out is a
//! [`BotEvent`]. Plugins declare the [`EventKind`]s they handle and only see
//! those.

use crate::client::casemap::irc_eq;
use crate::state::{ChannelTracker, MemberModes};

/// An observed user in a channel, with the privileges they hold right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionableEvent {
    /// `nick!user@host`, when known.
    pub hostmask: Option<String>,
    pub nick: String,
    pub channel: String,
    pub modes: MemberModes,
}

/// A command addressed to the bot in a channel (`guacbot: af bob`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEvent {
    pub channel: String,
    pub nick: String,
    pub hostmask: Option<String>,
    /// Lowercased command word.
    pub command: String,
    pub args: Vec<String>,
}

impl CommandEvent {
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotEvent {
    Join {
        channel: String,
        nick: String,
        hostmask: Option<String>,
    },
    /// A channel message from a user, classified with their current state.
    ActionableMessage(ActionableEvent),
    AddressedCommand(CommandEvent),
    /// A deferred hostmask lookup finished for `nick`.
    HostmaskUpdated {
        nick: String,
        hostmask: String,
        channels: Vec<String>,
    },
    /// Every pending hostmask lookup has drained.
    AllHostmasksProcessed,
    /// A `+b` was set in a tracked channel.
    BanAdded { channel: String, mask: String },
    /// Periodic timer.
    Tick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Join,
    ActionableMessage,
    AddressedCommand,
    HostmaskUpdated,
    AllHostmasksProcessed,
    BanAdded,
    Tick,
}

impl BotEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Join { .. } => EventKind::Join,
            Self::ActionableMessage(_) => EventKind::ActionableMessage,
            Self::AddressedCommand(_) => EventKind::AddressedCommand,
            Self::HostmaskUpdated { .. } => EventKind::HostmaskUpdated,
            Self::AllHostmasksProcessed => EventKind::AllHostmasksProcessed,
            Self::BanAdded { .. } => EventKind::BanAdded,
            Self::Tick => EventKind::Tick,
        }
    }

    /// The single channel this event is bound to, if any.
    pub fn channel(&self) -> Option<&str> {
        match self {
            Self::Join { channel, .. } => Some(channel),
            Self::ActionableMessage(ev) => Some(&ev.channel),
            Self::AddressedCommand(cmd) => Some(&cmd.channel),
            Self::BanAdded { channel, .. } => Some(channel),
            Self::HostmaskUpdated { .. } | Self::AllHostmasksProcessed | Self::Tick => None,
        }
    }
}

/// Classify a channel message.
///
/// Every message is actionable; one that starts with `<botnick>:` or
/// `<botnick>,` is also an addressed command.
pub fn classify_message(
    tracker: &ChannelTracker,
    nick: &str,
    hostmask: Option<&str>,
    channel: &str,
    text: &str,
) -> Vec<BotEvent> {
    let hostmask = hostmask
        .map(str::to_string)
        .or_else(|| tracker.hostmask_of(nick));

    let subject = tracker
        .subject(channel, nick)
        .map(|mut ev| {
            if ev.hostmask.is_none() {
                ev.hostmask = hostmask.clone();
            }
            ev
        })
        .unwrap_or_else(|| ActionableEvent {
            hostmask: hostmask.clone(),
            nick: nick.to_string(),
            channel: channel.to_string(),
            modes: MemberModes::default(),
        });

    let mut events = vec![BotEvent::ActionableMessage(subject)];

    if let Some((command, args)) = addressed_command(&tracker.own_nick(), text) {
        events.push(BotEvent::AddressedCommand(CommandEvent {
            channel: channel.to_string(),
            nick: nick.to_string(),
            hostmask,
            command,
            args,
        }));
    }

    events
}

/// Split `guacbot: af bob` into `("af", ["bob"])`.
fn addressed_command(own_nick: &str, text: &str) -> Option<(String, Vec<String>)> {
    let mut words = text.split_whitespace();
    let first = words.next()?;
    let addressee = first
        .strip_suffix(':')
        .or_else(|| first.strip_suffix(','))?;
    if !irc_eq(addressee, own_nick) {
        return None;
    }
    let command = words.next()?.to_lowercase();
    Some((command, words.map(str::to_string).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientEvent;

    #[test]
    fn test_addressed_command() {
        assert_eq!(
            addressed_command("guacbot", "guacbot: AF bob v"),
            Some(("af".to_string(), vec!["bob".to_string(), "v".to_string()]))
        );
        assert_eq!(
            addressed_command("guacbot", "GuacBot, scan"),
            Some(("scan".to_string(), vec![]))
        );
        assert_eq!(
            addressed_command("[guac]", "{GUAC}: scan"),
            Some(("scan".to_string(), vec![]))
        );
        assert_eq!(addressed_command("guacbot", "guacbot af bob"), None);
        assert_eq!(addressed_command("guacbot", "otherbot: af bob"), None);
        assert_eq!(addressed_command("guacbot", "guacbot:"), None);
    }

    #[test]
    fn test_classify_uses_tracked_modes() {
        let tracker = ChannelTracker::new("guacbot");
        tracker.apply(&ClientEvent::Join {
            channel: "#x".into(),
            nick: "guacbot".into(),
            hostmask: None,
        });
        tracker.apply(&ClientEvent::Names {
            channel: "#x".into(),
            entries: vec!["@guacbot".into(), "+bob".into()],
        });

        let events = classify_message(&tracker, "bob", Some("bob!b@friend.net"), "#x", "guacbot: scan");
        assert_eq!(events.len(), 2);

        match &events[0] {
            BotEvent::ActionableMessage(ev) => {
                assert_eq!(ev.hostmask.as_deref(), Some("bob!b@friend.net"));
                assert!(ev.modes.has('v'));
            }
            other => panic!("unexpected {:?}", other),
        }
        match &events[1] {
            BotEvent::AddressedCommand(cmd) => {
                assert_eq!(cmd.command, "scan");
                assert_eq!(cmd.channel, "#x");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_event_channel_binding() {
        assert_eq!(BotEvent::Tick.channel(), None);
        assert_eq!(BotEvent::Tick.kind(), EventKind::Tick);
        let join = BotEvent::Join {
            channel: "#x".into(),
            nick: "bob".into(),
            hostmask: None,
        };
        assert_eq!(join.channel(), Some("#x"));
    }
}
