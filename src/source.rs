//! Message origins: the sending user and the originating conversation.

use std::fmt;

use lodestar_proto::{ChannelExt, Prefix};

use crate::supervisor::{BotError, BotHandle};

/// The user a message came from, parsed out of its `nick!user@host` prefix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IrcUser {
    /// Nickname.
    pub nickname: String,
    /// Ident/username, when the server supplied one.
    pub username: Option<String>,
    /// Hostname, when the server supplied one.
    pub host: Option<String>,
}

impl IrcUser {
    /// Build from a message prefix. Server-name prefixes have no user.
    pub fn from_prefix(prefix: &Prefix) -> Option<IrcUser> {
        match prefix {
            Prefix::Nickname(nick, user, host) if !nick.is_empty() => Some(IrcUser {
                nickname: nick.clone(),
                username: (!user.is_empty()).then(|| user.clone()),
                host: (!host.is_empty()).then(|| host.clone()),
            }),
            _ => None,
        }
    }

    /// Full `nick!user@host` mask with wildcards for missing parts, as used
    /// by ignore filtering.
    pub fn usermask(&self) -> String {
        format!(
            "{}!{}@{}",
            self.nickname,
            self.username.as_deref().unwrap_or("*"),
            self.host.as_deref().unwrap_or("*")
        )
    }
}

/// The conversation a message originated from, and the way back to it.
///
/// `channel` is the raw message target: a channel name for public traffic,
/// our own nickname for private messages. Replies are routed accordingly.
#[derive(Clone)]
pub struct Conversation {
    /// Raw conversation target.
    pub channel: String,
    /// The sending user; absent for events without a sender (e.g. joins).
    pub sender: Option<IrcUser>,
    handle: BotHandle,
}

impl Conversation {
    /// Create a conversation handle.
    pub fn new(channel: impl Into<String>, sender: Option<IrcUser>, handle: BotHandle) -> Self {
        Conversation {
            channel: channel.into(),
            sender,
            handle,
        }
    }

    /// Whether this is a private (direct) conversation.
    pub fn is_private(&self) -> bool {
        !self.channel.is_channel_name()
    }

    /// Where replies go: the channel for public traffic, the sender for
    /// private messages.
    pub fn target(&self) -> &str {
        if self.is_private() {
            self.sender
                .as_ref()
                .map(|u| u.nickname.as_str())
                .unwrap_or(&self.channel)
        } else {
            &self.channel
        }
    }

    /// The session handle this conversation delivers through.
    pub fn handle(&self) -> &BotHandle {
        &self.handle
    }

    /// Send text to the conversation.
    pub async fn say(&self, text: &str) -> Result<(), BotError> {
        self.handle.say(self.target(), text).await
    }

    /// Send text addressed to the sender: in a channel the text is prefixed
    /// with their nick, privately it is a plain message.
    pub async fn reply(&self, text: &str) -> Result<(), BotError> {
        match (&self.sender, self.is_private()) {
            (Some(user), false) => {
                let addressed = format!("{}: {}", user.nickname, text);
                self.handle.say(self.target(), &addressed).await
            }
            _ => self.say(text).await,
        }
    }

    /// Send a NOTICE to the sender (or the conversation target if there is
    /// no sender).
    pub async fn notice(&self, text: &str) -> Result<(), BotError> {
        let target = self
            .sender
            .as_ref()
            .map(|u| u.nickname.as_str())
            .unwrap_or(self.target());
        self.handle.notice(target, text).await
    }
}

impl fmt::Debug for Conversation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conversation")
            .field("channel", &self.channel)
            .field("sender", &self.sender)
            .finish_non_exhaustive()
    }
}
