//! IRC line parsing and serialization.
//!
//! Only what the bot needs: an optional source prefix, the command (or
//! three-digit numeric), and the parameter list. Message tags are skipped.

use std::fmt;
use std::str::FromStr;

/// Message source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prefix {
    /// A server name (`irc.example.net`).
    ServerName(String),
    /// A user prefix. `user` and `host` are empty when the server omitted them.
    Nickname {
        nick: String,
        user: String,
        host: String,
    },
}

impl Prefix {
    fn parse(raw: &str) -> Self {
        match raw.split_once('!') {
            Some((nick, rest)) => {
                let (user, host) = rest.split_once('@').unwrap_or((rest, ""));
                Prefix::Nickname {
                    nick: nick.to_string(),
                    user: user.to_string(),
                    host: host.to_string(),
                }
            }
            None if raw.contains('.') && !raw.contains('@') => Prefix::ServerName(raw.to_string()),
            None => {
                let (nick, host) = raw.split_once('@').unwrap_or((raw, ""));
                Prefix::Nickname {
                    nick: nick.to_string(),
                    user: String::new(),
                    host: host.to_string(),
                }
            }
        }
    }

    /// The nickname, if this is a user prefix.
    pub fn nick(&self) -> Option<&str> {
        match self {
            Prefix::Nickname { nick, .. } => Some(nick),
            Prefix::ServerName(_) => None,
        }
    }

    /// `nick!user@host`, when the prefix carries all three parts.
    pub fn hostmask(&self) -> Option<String> {
        match self {
            Prefix::Nickname { nick, user, host } if !user.is_empty() && !host.is_empty() => {
                Some(format!("{}!{}@{}", nick, user, host))
            }
            _ => None,
        }
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prefix::ServerName(name) => f.write_str(name),
            Prefix::Nickname { nick, user, host } => {
                f.write_str(nick)?;
                if !user.is_empty() {
                    write!(f, "!{}", user)?;
                }
                if !host.is_empty() {
                    write!(f, "@{}", host)?;
                }
                Ok(())
            }
        }
    }
}

/// A single IRC protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub prefix: Option<Prefix>,
    pub command: String,
    pub params: Vec<String>,
}

/// Line could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError(pub String);

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unparseable line: {}", self.0)
    }
}

impl std::error::Error for ParseError {}

impl Message {
    /// Build an outbound message without a prefix.
    pub fn new<I, S>(command: &str, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefix: None,
            command: command.to_ascii_uppercase(),
            params: params.into_iter().map(Into::into).collect(),
        }
    }

    /// Parameter at `index`, if present.
    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    /// Numeric reply code, if the command is a three-digit numeric.
    pub fn numeric(&self) -> Option<u16> {
        if self.command.len() == 3 {
            self.command.parse().ok()
        } else {
            None
        }
    }

    /// Source nickname, if any.
    pub fn source_nick(&self) -> Option<&str> {
        self.prefix.as_ref().and_then(Prefix::nick)
    }
}

impl FromStr for Message {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut rest = line.trim_end_matches(['\r', '\n']);

        if rest.starts_with('@') {
            rest = rest
                .split_once(' ')
                .map(|(_, r)| r)
                .ok_or_else(|| ParseError(line.to_string()))?;
        }
        rest = rest.trim_start_matches(' ');

        let mut prefix = None;
        if let Some(stripped) = rest.strip_prefix(':') {
            let (raw, r) = stripped
                .split_once(' ')
                .ok_or_else(|| ParseError(line.to_string()))?;
            prefix = Some(Prefix::parse(raw));
            rest = r.trim_start_matches(' ');
        }

        let (command, mut rest) = match rest.split_once(' ') {
            Some((c, r)) => (c, r),
            None => (rest, ""),
        };
        if command.is_empty() {
            return Err(ParseError(line.to_string()));
        }

        let mut params = Vec::new();
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            match rest.split_once(' ') {
                Some((param, r)) => {
                    params.push(param.to_string());
                    rest = r;
                }
                None => {
                    params.push(rest.to_string());
                    break;
                }
            }
        }

        Ok(Message {
            prefix,
            command: command.to_ascii_uppercase(),
            params,
        })
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.prefix {
            write!(f, ":{} ", prefix)?;
        }
        f.write_str(&self.command)?;

        let last = self.params.len().saturating_sub(1);
        for (i, param) in self.params.iter().enumerate() {
            let needs_colon =
                i == last && (param.is_empty() || param.contains(' ') || param.starts_with(':'));
            if needs_colon {
                write!(f, " :{}", param)?;
            } else {
                write!(f, " {}", param)?;
            }
        }
        Ok(())
    }
}
