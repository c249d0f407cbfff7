//! Per-epoch connection state.
//!
//! A [`Session`] lives exactly as long as one connection epoch: it is built
//! after the transport connects and dropped when the connection is lost, so
//! capability data never leaks across reconnects.

use std::collections::{HashMap, HashSet};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use lodestar_proto::SupportTable;
use thiserror::Error;
use tokio::sync::oneshot;

/// Protocol base from which the usable message length is derived.
const MESSAGE_LENGTH_BASE: usize = 500;

/// A resolved topic query: who set it, where, and the text (absent when the
/// channel has no topic).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopicUpdate {
    /// Nick or server that changed or reported the topic.
    pub set_by: String,
    /// The channel the topic belongs to.
    pub channel: String,
    /// The topic text, or `None` for an unset topic.
    pub topic: Option<String>,
}

/// The connection epoch ended before the topic query resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("topic query cancelled by disconnect")]
pub struct TopicCancelled;

/// Shared single-resolution future for a topic query.
///
/// Concurrent queries for the same channel all receive clones of the same
/// future.
pub type TopicFuture = Shared<BoxFuture<'static, Result<TopicUpdate, TopicCancelled>>>;

struct PendingTopic {
    tx: oneshot::Sender<TopicUpdate>,
    shared: TopicFuture,
}

/// Outcome of a 005 numeric, which is doubly assigned on the wire.
#[derive(Debug, PartialEq, Eq)]
pub enum SupportLine {
    /// The line carried ISUPPORT tokens; this many were merged.
    Merged(usize),
    /// A legacy bounce/redirect numeric; the advertised target, if any.
    Bounce(Option<String>),
}

/// Live state for one connection epoch.
pub struct Session {
    /// The nickname currently in use (may drift from configuration after a
    /// collision retry).
    pub nickname: String,
    /// Whether registration completed (RPL_WELCOME seen).
    pub registered: bool,
    support: SupportTable,
    joined: HashSet<String>,
    pending_topics: HashMap<String, PendingTopic>,
}

impl Session {
    /// Create the state for a fresh connection epoch.
    pub fn new(nickname: String) -> Session {
        Session {
            nickname,
            registered: false,
            support: SupportTable::new(),
            joined: HashSet::new(),
            pending_topics: HashMap::new(),
        }
    }

    /// Apply a 005 numeric, disambiguating ISUPPORT from the legacy bounce
    /// by its trailing parameter.
    pub fn apply_support_numeric(&mut self, args: &[String]) -> SupportLine {
        match args.last() {
            Some(trailing) if args.len() >= 2 && SupportTable::is_confirmation(trailing) => {
                // First arg is our nick, last is the confirmation phrase.
                let tokens = &args[1..args.len() - 1];
                self.support.merge_tokens(tokens);
                SupportLine::Merged(tokens.len())
            }
            _ => SupportLine::Bounce(args.get(1).cloned()),
        }
    }

    /// The negotiated capability table.
    pub fn support(&self) -> &SupportTable {
        &self.support
    }

    /// Maximum usable PRIVMSG payload length, derived from the negotiated
    /// NICKLEN and CHANNELLEN.
    ///
    /// `None` until capability negotiation has supplied both tokens.
    pub fn max_message_length(&self) -> Option<usize> {
        let nicklen = self.support.numeric("NICKLEN")? as usize;
        let channellen = self.support.numeric("CHANNELLEN")? as usize;
        MESSAGE_LENGTH_BASE.checked_sub(nicklen + channellen)
    }

    /// Record that we joined a channel. Returns whether it was new.
    pub fn mark_joined(&mut self, channel: &str) -> bool {
        self.joined.insert(channel.to_string())
    }

    /// Record that we left a channel.
    pub fn mark_parted(&mut self, channel: &str) -> bool {
        self.joined.remove(channel)
    }

    /// Whether we are currently in a channel.
    pub fn is_joined(&self, channel: &str) -> bool {
        self.joined.contains(channel)
    }

    /// Get the shared future for a topic query on `channel`, creating it if
    /// none is pending. Returns the future and whether it was newly created.
    pub fn topic_query(&mut self, channel: &str) -> (TopicFuture, bool) {
        if let Some(pending) = self.pending_topics.get(channel) {
            return (pending.shared.clone(), false);
        }
        let (tx, rx) = oneshot::channel::<TopicUpdate>();
        let shared: TopicFuture = async move { rx.await.map_err(|_| TopicCancelled) }
            .boxed()
            .shared();
        self.pending_topics.insert(
            channel.to_string(),
            PendingTopic {
                tx,
                shared: shared.clone(),
            },
        );
        (shared, true)
    }

    /// Resolve a pending topic query, if one exists for the channel.
    pub fn resolve_topic(&mut self, update: TopicUpdate) {
        if let Some(pending) = self.pending_topics.remove(&update.channel) {
            // The receiver side may have been dropped; nothing to do then.
            let _ = pending.tx.send(update);
        }
    }

    /// Cancel every outstanding topic query.
    ///
    /// Dropping the senders resolves the shared futures with
    /// [`TopicCancelled`], so callers never hang across a disconnect.
    pub fn cancel_pending_topics(&mut self) {
        self.pending_topics.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn isupport_line_merges_tokens() {
        let mut session = Session::new("bot".into());
        let outcome = session.apply_support_numeric(&args(&[
            "bot",
            "NICKLEN=9",
            "CHANNELLEN=50",
            "are supported by this server",
        ]));
        assert_eq!(outcome, SupportLine::Merged(2));
        assert_eq!(session.support().numeric("NICKLEN"), Some(9));
        assert_eq!(session.max_message_length(), Some(441));
    }

    #[test]
    fn alternate_confirmation_phrase_accepted() {
        let mut session = Session::new("bot".into());
        let outcome = session.apply_support_numeric(&args(&[
            "bot",
            "EXCEPTS",
            "are available on this server",
        ]));
        assert_eq!(outcome, SupportLine::Merged(1));
    }

    #[test]
    fn legacy_bounce_is_not_merged() {
        let mut session = Session::new("bot".into());
        let outcome = session.apply_support_numeric(&args(&[
            "bot",
            "irc.other.example",
            "Try server irc.other.example, port 6667",
        ]));
        assert_eq!(outcome, SupportLine::Bounce(Some("irc.other.example".into())));
        assert!(session.support().is_empty());
    }

    #[test]
    fn max_message_length_unavailable_before_negotiation() {
        let session = Session::new("bot".into());
        assert_eq!(session.max_message_length(), None);

        let mut session = Session::new("bot".into());
        session.apply_support_numeric(&args(&["bot", "NICKLEN=9", "are supported by this server"]));
        // CHANNELLEN still missing.
        assert_eq!(session.max_message_length(), None);
    }

    #[test]
    fn joined_set_tracks_membership() {
        let mut session = Session::new("bot".into());
        assert!(session.mark_joined("#chan"));
        assert!(!session.mark_joined("#chan"));
        assert!(session.is_joined("#chan"));
        assert!(session.mark_parted("#chan"));
        assert!(!session.is_joined("#chan"));
    }

    #[tokio::test]
    async fn concurrent_topic_queries_collapse() {
        let mut session = Session::new("bot".into());
        let (first, created_first) = session.topic_query("#chan");
        let (second, created_second) = session.topic_query("#chan");
        assert!(created_first);
        assert!(!created_second);

        session.resolve_topic(TopicUpdate {
            set_by: "alice".into(),
            channel: "#chan".into(),
            topic: Some("hello".into()),
        });

        let a = first.await.unwrap();
        let b = second.await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.topic.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn disconnect_cancels_pending_queries() {
        let mut session = Session::new("bot".into());
        let (pending, _) = session.topic_query("#chan");
        session.cancel_pending_topics();
        assert_eq!(pending.await.unwrap_err(), TopicCancelled);
    }

    #[tokio::test]
    async fn resolving_unqueried_channel_is_harmless() {
        let mut session = Session::new("bot".into());
        session.resolve_topic(TopicUpdate {
            set_by: "server".into(),
            channel: "#nobody-asked".into(),
            topic: None,
        });
    }
}
