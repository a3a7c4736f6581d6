//! Network events derived from inbound lines.

use super::message::Message;

/// Something the server told us, in the shape listeners care about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// RPL_WELCOME: registration finished.
    Registered {
        server: String,
        nick: String,
        welcome: String,
    },
    Join {
        channel: String,
        nick: String,
        hostmask: Option<String>,
    },
    Part {
        channel: String,
        nick: String,
    },
    Kick {
        channel: String,
        nick: String,
    },
    Quit {
        nick: String,
    },
    NickChange {
        old: String,
        new: String,
    },
    Privmsg {
        nick: String,
        hostmask: Option<String>,
        target: String,
        text: String,
    },
    CtcpVersion {
        nick: String,
        target: String,
    },
    /// Channel mode change. `changes` is the raw mode string (`+ov-v`).
    Mode {
        channel: String,
        by: Option<String>,
        changes: String,
        args: Vec<String>,
    },
    /// RPL_NAMREPLY: entries still carry their prefix characters.
    Names {
        channel: String,
        entries: Vec<String>,
    },
    /// RPL_WHOREPLY.
    WhoReply {
        channel: String,
        nick: String,
        user: String,
        host: String,
        flags: String,
    },
    /// RPL_ENDOFWHO.
    EndOfWho {
        mask: String,
    },
    Disconnected {
        reason: String,
    },
}

const CTCP_VERSION: &str = "\x01VERSION\x01";

impl ClientEvent {
    /// Translate a parsed line. Returns `None` for lines nobody listens to.
    pub fn from_message(msg: &Message) -> Option<Self> {
        let nick = || msg.source_nick().map(str::to_string);
        let hostmask = || msg.prefix.as_ref().and_then(|p| p.hostmask());

        match msg.numeric() {
            Some(1) => {
                return Some(ClientEvent::Registered {
                    server: msg
                        .prefix
                        .as_ref()
                        .map(ToString::to_string)
                        .unwrap_or_default(),
                    nick: msg.param(0)?.to_string(),
                    welcome: msg.params.last().cloned().unwrap_or_default(),
                });
            }
            Some(353) => {
                // <me> <type> <channel> :<entries>
                return Some(ClientEvent::Names {
                    channel: msg.param(2)?.to_string(),
                    entries: msg
                        .param(3)?
                        .split_whitespace()
                        .map(str::to_string)
                        .collect(),
                });
            }
            Some(352) => {
                // <me> <channel> <user> <host> <server> <nick> <flags> :<hops> <realname>
                return Some(ClientEvent::WhoReply {
                    channel: msg.param(1)?.to_string(),
                    user: msg.param(2)?.to_string(),
                    host: msg.param(3)?.to_string(),
                    nick: msg.param(5)?.to_string(),
                    flags: msg.param(6).unwrap_or_default().to_string(),
                });
            }
            Some(315) => {
                return Some(ClientEvent::EndOfWho {
                    mask: msg.param(1)?.to_string(),
                });
            }
            Some(_) => return None,
            None => {}
        }

        match msg.command.as_str() {
            "JOIN" => Some(ClientEvent::Join {
                channel: msg.param(0)?.to_string(),
                nick: nick()?,
                hostmask: hostmask(),
            }),
            "PART" => Some(ClientEvent::Part {
                channel: msg.param(0)?.to_string(),
                nick: nick()?,
            }),
            "KICK" => Some(ClientEvent::Kick {
                channel: msg.param(0)?.to_string(),
                nick: msg.param(1)?.to_string(),
            }),
            "QUIT" => Some(ClientEvent::Quit { nick: nick()? }),
            "NICK" => Some(ClientEvent::NickChange {
                old: nick()?,
                new: msg.param(0)?.to_string(),
            }),
            "PRIVMSG" => {
                let target = msg.param(0)?.to_string();
                let text = msg.param(1)?;
                if text == CTCP_VERSION {
                    return Some(ClientEvent::CtcpVersion {
                        nick: nick()?,
                        target,
                    });
                }
                if text.starts_with('\x01') {
                    return None;
                }
                Some(ClientEvent::Privmsg {
                    nick: nick()?,
                    hostmask: hostmask(),
                    target,
                    text: text.to_string(),
                })
            }
            "MODE" => {
                let channel = msg.param(0)?;
                if !is_channel_name(channel) {
                    return None;
                }
                Some(ClientEvent::Mode {
                    channel: channel.to_string(),
                    by: nick(),
                    changes: msg.param(1)?.to_string(),
                    args: msg.params.iter().skip(2).cloned().collect(),
                })
            }
            "ERROR" => Some(ClientEvent::Disconnected {
                reason: msg.param(0).unwrap_or("server error").to_string(),
            }),
            _ => None,
        }
    }
}

/// Whether `target` names a channel rather than a user.
pub fn is_channel_name(target: &str) -> bool {
    target.starts_with(['#', '&', '!', '+'])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(line: &str) -> Option<ClientEvent> {
        ClientEvent::from_message(&line.parse().unwrap())
    }

    #[test]
    fn test_welcome() {
        assert_eq!(
            event(":irc.test 001 guacbot :Welcome to TestNet guacbot"),
            Some(ClientEvent::Registered {
                server: "irc.test".into(),
                nick: "guacbot".into(),
                welcome: "Welcome to TestNet guacbot".into(),
            })
        );
    }

    #[test]
    fn test_join_carries_hostmask() {
        assert_eq!(
            event(":bob!b@friend.net JOIN #x"),
            Some(ClientEvent::Join {
                channel: "#x".into(),
                nick: "bob".into(),
                hostmask: Some("bob!b@friend.net".into()),
            })
        );
    }

    #[test]
    fn test_ctcp_version() {
        assert_eq!(
            event(":bob!b@friend.net PRIVMSG guacbot :\x01VERSION\x01"),
            Some(ClientEvent::CtcpVersion {
                nick: "bob".into(),
                target: "guacbot".into(),
            })
        );
        assert_eq!(event(":bob!b@friend.net PRIVMSG #x :\x01ACTION waves\x01"), None);
    }

    #[test]
    fn test_who_reply() {
        assert_eq!(
            event(":irc.test 352 guacbot #x b friend.net irc.test bob H@ :0 Bob"),
            Some(ClientEvent::WhoReply {
                channel: "#x".into(),
                nick: "bob".into(),
                user: "b".into(),
                host: "friend.net".into(),
                flags: "H@".into(),
            })
        );
        assert_eq!(
            event(":irc.test 315 guacbot #x :End of WHO list"),
            Some(ClientEvent::EndOfWho { mask: "#x".into() })
        );
    }

    #[test]
    fn test_user_mode_is_ignored() {
        assert_eq!(event(":guacbot MODE guacbot :+i"), None);
        assert_eq!(
            event(":ChanServ!s@services. MODE #x +ov bob alice"),
            Some(ClientEvent::Mode {
                channel: "#x".into(),
                by: Some("ChanServ".into()),
                changes: "+ov".into(),
                args: vec!["bob".into(), "alice".into()],
            })
        );
    }
}
