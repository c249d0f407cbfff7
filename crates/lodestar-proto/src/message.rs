//! Owned IRC message type with parsing and serialization.

use std::fmt;
use std::str::FromStr;

use crate::chan::ChannelExt;
use crate::command::Command;
use crate::error::MessageParseError;
use crate::prefix::Prefix;

/// An owned IRC message.
///
/// Contains the optional prefix/source and the command with parameters.
///
/// # Example
///
/// ```
/// use lodestar_proto::Message;
///
/// // Parse a message
/// let msg: Message = ":nick!user@host PRIVMSG #channel :Hello!".parse().unwrap();
///
/// // Construct a message
/// let msg = Message::privmsg("#channel", "Hello!");
/// ```
#[derive(Clone, PartialEq, Debug)]
pub struct Message {
    /// Message prefix/source (e.g., `nick!user@host`).
    pub prefix: Option<Prefix>,
    /// The IRC command and its parameters.
    pub command: Command,
}

impl Message {
    /// Create a message from a command, without a prefix.
    ///
    /// Clients rarely send prefixed messages; the server fills in the source.
    pub fn from_command(command: Command) -> Message {
        Message {
            prefix: None,
            command,
        }
    }

    /// Attach a prefix to this message.
    #[must_use]
    pub fn with_prefix(mut self, prefix: Prefix) -> Message {
        self.prefix = Some(prefix);
        self
    }

    /// Get the nickname from the message prefix, if present.
    pub fn source_nickname(&self) -> Option<&str> {
        self.prefix.as_ref().and_then(Prefix::nick)
    }

    /// Get the appropriate target for a response.
    ///
    /// For channel messages, returns the channel name. For private messages,
    /// returns the sender's nickname.
    pub fn response_target(&self) -> Option<&str> {
        match self.command {
            Command::PRIVMSG(ref target, _) if target.is_channel_name() => Some(target),
            Command::NOTICE(ref target, _) if target.is_channel_name() => Some(target),
            _ => self.source_nickname(),
        }
    }

    /// Create a PRIVMSG to a target.
    #[must_use]
    pub fn privmsg(target: impl Into<String>, text: impl Into<String>) -> Message {
        Message::from_command(Command::PRIVMSG(target.into(), text.into()))
    }

    /// Create a NOTICE to a target.
    #[must_use]
    pub fn notice(target: impl Into<String>, text: impl Into<String>) -> Message {
        Message::from_command(Command::NOTICE(target.into(), text.into()))
    }

    /// Create a JOIN for a channel.
    #[must_use]
    pub fn join(channel: impl Into<String>) -> Message {
        Message::from_command(Command::JOIN(channel.into(), None))
    }

    /// Create a PART for a channel.
    #[must_use]
    pub fn part(channel: impl Into<String>) -> Message {
        Message::from_command(Command::PART(channel.into(), None))
    }

    /// Create a NICK command.
    #[must_use]
    pub fn nick(nickname: impl Into<String>) -> Message {
        Message::from_command(Command::NICK(nickname.into()))
    }

    /// Create a USER registration command.
    #[must_use]
    pub fn user(username: impl Into<String>, realname: impl Into<String>) -> Message {
        Message::from_command(Command::USER(username.into(), "0".into(), realname.into()))
    }

    /// Create a PONG reply for a PING token.
    #[must_use]
    pub fn pong(token: impl Into<String>) -> Message {
        Message::from_command(Command::PONG(token.into(), None))
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref prefix) = self.prefix {
            write!(f, ":{prefix} ")?;
        }
        write!(f, "{}", self.command)
    }
}

impl FromStr for Message {
    type Err = MessageParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let line = s.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Err(MessageParseError::EmptyMessage);
        }

        let (prefix, rest) = if let Some(stripped) = line.strip_prefix(':') {
            match stripped.split_once(' ') {
                Some((prefix, rest)) if !prefix.is_empty() => {
                    (Some(Prefix::new_from_str(prefix)), rest)
                }
                _ => return Err(MessageParseError::InvalidPrefix(stripped.to_string())),
            }
        } else {
            (None, line)
        };

        // Trailing parameter: everything after the first ` :` or a leading `:`.
        let (params_part, trailing) = if let Some(rest) = rest.strip_prefix(':') {
            ("", Some(rest))
        } else if let Some(pos) = rest.find(" :") {
            (&rest[..pos], Some(&rest[pos + 2..]))
        } else {
            (rest, None)
        };

        let mut tokens = params_part.split_ascii_whitespace();
        let command = tokens.next().ok_or(MessageParseError::MissingCommand)?;
        if !command.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(MessageParseError::InvalidCommand(command.to_string()));
        }

        let mut args: Vec<String> = tokens.map(str::to_string).collect();
        if let Some(trailing) = trailing {
            args.push(trailing.to_string());
        }

        Ok(Message {
            prefix,
            command: Command::new(command, args),
        })
    }
}
