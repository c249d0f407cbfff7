//! Inbound message classification and routing.
//!
//! Every chat line goes through the same gauntlet: ignore filtering first,
//! then private/public classification, then the directedness check. Directed
//! text is handed to the command dispatcher; undirected public traffic is
//! broadcast as ambient events.

use std::sync::Arc;

use lodestar_proto::{ChannelExt, Prefix};
use tracing::debug;

use crate::config::ConfigStore;
use crate::dispatch::CommandDispatcher;
use crate::events::{
    EventBroadcaster, JOINED_CHANNEL, PUBLIC_MESSAGE_RECEIVED, PUBLIC_URL_RECEIVED,
};
use crate::session::Session;
use crate::source::{Conversation, IrcUser};
use crate::supervisor::BotHandle;
use crate::urls::extract_urls;

/// Where a classified message goes. Ignore filtering happens before this
/// decision is ever computed.
#[derive(Debug, PartialEq, Eq)]
pub enum RouteDecision {
    /// Directed text for the command dispatcher.
    Dispatch {
        /// The text with any nick prefix stripped.
        text: String,
    },
    /// Undirected public traffic for ambient broadcast.
    Ambient {
        /// The full message text.
        text: String,
        /// URLs found in the text, in order of appearance.
        urls: Vec<String>,
    },
}

/// Strip a directed-text prefix (`nick:` or `nick,`) from a message.
///
/// Matching is case-insensitive; `:` is checked before `,` and the first
/// matching suffix wins. Returns the stripped text, or `None` when the
/// message is not addressed to `nickname`.
pub fn strip_directed(nickname: &str, text: &str) -> Option<String> {
    if nickname.is_empty() {
        return None;
    }
    let len = nickname.len();
    if text.len() <= len || !text.is_char_boundary(len) {
        return None;
    }
    if !text[..len].eq_ignore_ascii_case(nickname) {
        return None;
    }
    for suffix in [':', ','] {
        if text[len..].starts_with(suffix) {
            return Some(text[len + suffix.len_utf8()..].trim_start().to_string());
        }
    }
    None
}

/// Classify one (already ignore-filtered) message.
pub fn decide(nickname: &str, is_private: bool, text: &str) -> RouteDecision {
    let directed = strip_directed(nickname, text);
    match (is_private, directed) {
        // Private messages are directed whether or not they carry the
        // prefix; strip it when present.
        (true, Some(stripped)) => RouteDecision::Dispatch { text: stripped },
        (true, None) => RouteDecision::Dispatch {
            text: text.to_string(),
        },
        (false, Some(stripped)) => RouteDecision::Dispatch { text: stripped },
        (false, None) => RouteDecision::Ambient {
            text: text.to_string(),
            urls: extract_urls(text),
        },
    }
}

/// Routes classified messages to the dispatcher or the broadcaster.
pub struct MessageRouter {
    config: Arc<dyn ConfigStore>,
    broadcaster: EventBroadcaster,
    dispatcher: CommandDispatcher,
}

impl MessageRouter {
    /// Create a router over its two sinks.
    pub fn new(
        config: Arc<dyn ConfigStore>,
        broadcaster: EventBroadcaster,
        dispatcher: CommandDispatcher,
    ) -> MessageRouter {
        MessageRouter {
            config,
            broadcaster,
            dispatcher,
        }
    }

    /// Route one inbound chat line.
    pub async fn route(
        &self,
        handle: &BotHandle,
        session: &Session,
        prefix: Option<&Prefix>,
        target: &str,
        text: &str,
    ) {
        let Some(user) = prefix.and_then(IrcUser::from_prefix) else {
            debug!(conversation = %target, "dropping chat line without a user prefix");
            return;
        };

        // Ignore filtering comes strictly before any broadcast or dispatch.
        if self.config.is_ignored(&user.usermask()) {
            crate::metrics::messages_ignored().inc();
            debug!(mask = %user.usermask(), "sender is ignored");
            return;
        }

        let is_private = !target.is_channel_name();
        let conversation = Conversation::new(target, Some(user), handle.clone());

        match decide(&session.nickname, is_private, text) {
            RouteDecision::Dispatch { text } => {
                self.dispatcher.dispatch(conversation, &text);
            }
            RouteDecision::Ambient { text, urls } => {
                self.broadcaster
                    .broadcast(PUBLIC_MESSAGE_RECEIVED, conversation.clone(), vec![text])
                    .await;
                for url in urls {
                    self.broadcaster
                        .broadcast(PUBLIC_URL_RECEIVED, conversation.clone(), vec![url])
                        .await;
                }
            }
        }
    }

    /// Announce that the session joined a channel.
    pub async fn channel_joined(&self, handle: &BotHandle, channel: &str) {
        let conversation = Conversation::new(channel, None, handle.clone());
        self.broadcaster
            .broadcast(JOINED_CHANNEL, conversation, vec![])
            .await;
    }
}
