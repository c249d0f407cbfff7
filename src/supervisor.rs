//! Connection lifecycle: transport ownership, registration, and
//! reconnection with backoff.
//!
//! One supervisor task owns one connection epoch at a time. Inbound lines
//! are processed strictly in arrival order; everything else reaches the
//! loop as a [`Control`] message through a [`BotHandle`]. Transport errors
//! never surface to callers: they end the epoch and schedule a reconnect.

use std::io;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use lodestar_proto::{Command, IrcCodec, Message, ProtocolError, Response};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::config::ConfigStore;
use crate::router::MessageRouter;
use crate::session::{Session, SupportLine, TopicCancelled, TopicFuture, TopicUpdate};

/// Reply length cap used before ISUPPORT negotiation has completed.
pub const FALLBACK_MESSAGE_LENGTH: usize = 400;

/// Capacity of the control channel between handles and the supervisor.
const CONTROL_CHANNEL_SIZE: usize = 64;

type IrcFramed = Framed<TcpStream, IrcCodec>;

/// Requests from handles to the supervisor's event loop.
pub enum Control {
    /// Send a raw protocol message.
    Send(Message),
    /// Send text to a target, split at the negotiated message length.
    Say {
        /// Channel or nick.
        target: String,
        /// The text; may span multiple lines.
        text: String,
    },
    /// Send a NOTICE to a target.
    Notice {
        /// Channel or nick.
        target: String,
        /// Notice text.
        text: String,
    },
    /// Persist a channel into the membership list, then join it.
    Join(String),
    /// Remove a channel from the membership list, then part it.
    Part(String),
    /// Query (or set) a channel topic.
    Topic {
        /// The channel.
        channel: String,
        /// New topic to set, or `None` to query.
        new_topic: Option<String>,
        /// Receives the shared resolution future.
        reply: oneshot::Sender<TopicFuture>,
    },
}

impl std::fmt::Debug for Control {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Control::Send(message) => f.debug_tuple("Send").field(message).finish(),
            Control::Say { target, text } => f
                .debug_struct("Say")
                .field("target", target)
                .field("text", text)
                .finish(),
            Control::Notice { target, text } => f
                .debug_struct("Notice")
                .field("target", target)
                .field("text", text)
                .finish(),
            Control::Join(channel) => f.debug_tuple("Join").field(channel).finish(),
            Control::Part(channel) => f.debug_tuple("Part").field(channel).finish(),
            Control::Topic {
                channel, new_topic, ..
            } => f
                .debug_struct("Topic")
                .field("channel", channel)
                .field("new_topic", new_topic)
                .finish_non_exhaustive(),
        }
    }
}

/// Errors surfaced by [`BotHandle`] operations.
#[derive(Debug, Error)]
pub enum BotError {
    /// The supervisor task is gone; no more epochs will run.
    #[error("connection supervisor is not running")]
    SupervisorGone,
    /// A topic query was cancelled by a disconnect.
    #[error(transparent)]
    TopicCancelled(#[from] TopicCancelled),
}

/// Cloneable handle to the running session.
///
/// Holds a non-owning path back to the supervisor; the supervisor alone
/// owns the transport and the per-epoch session state.
#[derive(Clone)]
pub struct BotHandle {
    tx: mpsc::Sender<Control>,
    config: Arc<dyn ConfigStore>,
}

impl BotHandle {
    async fn send_control(&self, control: Control) -> Result<(), BotError> {
        self.tx
            .send(control)
            .await
            .map_err(|_| BotError::SupervisorGone)
    }

    /// Send a raw protocol message.
    pub async fn send(&self, message: Message) -> Result<(), BotError> {
        self.send_control(Control::Send(message)).await
    }

    /// Say text to a channel or nick.
    pub async fn say(&self, target: &str, text: &str) -> Result<(), BotError> {
        self.send_control(Control::Say {
            target: target.to_string(),
            text: text.to_string(),
        })
        .await
    }

    /// Send a NOTICE to a channel or nick.
    pub async fn notice(&self, target: &str, text: &str) -> Result<(), BotError> {
        self.send_control(Control::Notice {
            target: target.to_string(),
            text: text.to_string(),
        })
        .await
    }

    /// Add a channel to the configured membership and join it.
    pub async fn join(&self, channel: &str) -> Result<(), BotError> {
        self.send_control(Control::Join(channel.to_string())).await
    }

    /// Remove a channel from the configured membership and part it.
    pub async fn part(&self, channel: &str) -> Result<(), BotError> {
        self.send_control(Control::Part(channel.to_string())).await
    }

    /// Query (or set) a channel topic and await its resolution.
    ///
    /// Concurrent queries for the same channel share one resolution. If the
    /// connection drops first, this resolves with
    /// [`BotError::TopicCancelled`].
    pub async fn topic(
        &self,
        channel: &str,
        new_topic: Option<String>,
    ) -> Result<TopicUpdate, BotError> {
        let (reply, rx) = oneshot::channel();
        self.send_control(Control::Topic {
            channel: channel.to_string(),
            new_topic,
            reply,
        })
        .await?;
        let future = rx.await.map_err(|_| BotError::SupervisorGone)?;
        Ok(future.await?)
    }

    /// Add an ignore mask. Returns the normalized mask if it was new.
    pub fn ignore(&self, mask: &str) -> Option<String> {
        self.config.add_ignore(mask)
    }

    /// Remove matching ignore masks. Returns the removed entries.
    pub fn unignore(&self, mask: &str) -> Vec<String> {
        self.config.remove_ignore(mask)
    }

    /// Handle wired to a bare channel, for exercising components without a
    /// running supervisor.
    #[cfg(test)]
    pub fn detached() -> (BotHandle, mpsc::Receiver<Control>) {
        let (tx, rx) = mpsc::channel(CONTROL_CHANNEL_SIZE);
        let config: Arc<dyn ConfigStore> = Arc::new(crate::config::FileConfig::from_config(
            crate::config::tests::test_config(),
        ));
        (BotHandle { tx, config }, rx)
    }
}

/// Owns the transport connection, the reconnect policy, and the per-epoch
/// session state.
pub struct ConnectionSupervisor {
    config: Arc<dyn ConfigStore>,
    router: MessageRouter,
    control_rx: mpsc::Receiver<Control>,
    handle: BotHandle,
    shutdown: CancellationToken,
}

impl ConnectionSupervisor {
    /// Create a supervisor and the handle for talking to it.
    pub fn new(
        config: Arc<dyn ConfigStore>,
        router: MessageRouter,
        shutdown: CancellationToken,
    ) -> (ConnectionSupervisor, BotHandle) {
        let (tx, control_rx) = mpsc::channel(CONTROL_CHANNEL_SIZE);
        let handle = BotHandle {
            tx,
            config: Arc::clone(&config),
        };
        let supervisor = ConnectionSupervisor {
            config,
            router,
            control_rx,
            handle: handle.clone(),
            shutdown,
        };
        (supervisor, handle)
    }

    /// Run connection epochs until shut down.
    ///
    /// There is no attempt cap: every lost connection schedules another
    /// try, with delays following the backoff sequence. The delay resets
    /// as soon as registration completes.
    pub async fn run(mut self) {
        let mut backoff = Backoff::new();
        loop {
            let (host, port) = self.config.target();
            info!(
                network = %self.config.network_name(),
                host = %host,
                port,
                nickname = %self.config.nickname(),
                "connecting"
            );

            let epoch = self.run_epoch(&host, port, &mut backoff).await;
            if self.shutdown.is_cancelled() {
                break;
            }

            crate::metrics::reconnects().inc();
            let delay = backoff.next();
            match epoch {
                Ok(()) => info!(
                    delay_secs = delay.as_secs_f64(),
                    "connection closed; reconnecting"
                ),
                Err(e) => warn!(
                    error = %e,
                    delay_secs = delay.as_secs_f64(),
                    "connection lost; reconnecting"
                ),
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        info!("connection supervisor stopped");
    }

    /// One connection epoch: connect, register, process until the
    /// connection ends.
    async fn run_epoch(
        &mut self,
        host: &str,
        port: u16,
        backoff: &mut Backoff,
    ) -> Result<(), ProtocolError> {
        let stream = TcpStream::connect((host, port)).await?;
        let mut framed = Framed::new(stream, IrcCodec::new());
        let mut session = Session::new(self.config.nickname());

        framed.send(Message::nick(session.nickname.clone())).await?;
        framed
            .send(Message::user(
                self.config.nickname(),
                self.config.realname(),
            ))
            .await?;

        let result = loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    let _ = framed
                        .send(Message::from_command(Command::QUIT(Some("shutting down".into()))))
                        .await;
                    break Ok(());
                }
                control = self.control_rx.recv() => match control {
                    Some(control) => {
                        if let Err(e) = self.handle_control(&mut framed, &mut session, control).await {
                            break Err(e);
                        }
                    }
                    // Every handle is gone; nothing can talk to this
                    // session anymore, but the connection itself stays up
                    // until told otherwise.
                    None => {}
                },
                frame = framed.next() => match frame {
                    None => break Err(ProtocolError::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "server closed the connection",
                    ))),
                    Some(Err(e)) if e.is_fatal() => break Err(e),
                    Some(Err(e)) => {
                        warn!(error = %e, "discarding unparseable line");
                    }
                    Some(Ok(msg)) => {
                        if let Err(e) = self
                            .handle_message(&mut framed, &mut session, backoff, msg)
                            .await
                        {
                            break Err(e);
                        }
                    }
                },
            }
        };

        // The epoch is over; outstanding topic queries resolve with a
        // cancellation error instead of hanging into the next epoch.
        session.cancel_pending_topics();
        result
    }

    async fn handle_control(
        &self,
        framed: &mut IrcFramed,
        session: &mut Session,
        control: Control,
    ) -> Result<(), ProtocolError> {
        match control {
            Control::Send(message) => framed.send(message).await?,
            Control::Say { target, text } => {
                let limit = session
                    .max_message_length()
                    .unwrap_or(FALLBACK_MESSAGE_LENGTH);
                for chunk in split_reply(&text, limit) {
                    framed.send(Message::privmsg(target.clone(), chunk)).await?;
                }
            }
            Control::Notice { target, text } => {
                let limit = session
                    .max_message_length()
                    .unwrap_or(FALLBACK_MESSAGE_LENGTH);
                for chunk in split_reply(&text, limit) {
                    framed.send(Message::notice(target.clone(), chunk)).await?;
                }
            }
            Control::Join(channel) => {
                // Persist the membership change, then tell the server.
                self.config.add_channel(&channel);
                framed.send(Message::join(channel)).await?;
            }
            Control::Part(channel) => {
                self.config.remove_channel(&channel);
                framed.send(Message::part(channel)).await?;
            }
            Control::Topic {
                channel,
                new_topic,
                reply,
            } => {
                let (future, created) = session.topic_query(&channel);
                let _ = reply.send(future);
                if created {
                    debug!(channel = %channel, "topic query opened");
                }
                framed
                    .send(Message::from_command(Command::TOPIC(channel, new_topic)))
                    .await?;
            }
        }
        Ok(())
    }

    async fn handle_message(
        &self,
        framed: &mut IrcFramed,
        session: &mut Session,
        backoff: &mut Backoff,
        msg: Message,
    ) -> Result<(), ProtocolError> {
        match &msg.command {
            Command::PING(token, _) => {
                framed.send(Message::pong(token.clone())).await?;
            }
            Command::Response(Response::RPL_WELCOME, _) => {
                self.signed_on(framed, session, backoff).await?;
            }
            Command::Response(Response::RPL_ISUPPORT, args) => {
                match session.apply_support_numeric(args) {
                    SupportLine::Merged(count) => debug!(
                        tokens = count,
                        known = session.support().len(),
                        "capabilities updated"
                    ),
                    // 005 is doubly assigned; anything without the ISUPPORT
                    // confirmation phrase is a legacy bounce.
                    SupportLine::Bounce(server) => info!(
                        server = server.as_deref().unwrap_or("<unknown>"),
                        "legacy bounce numeric"
                    ),
                }
            }
            Command::Response(Response::ERR_NICKNAMEINUSE, _) if !session.registered => {
                let alt = format!("{}_", session.nickname);
                warn!(nick = %session.nickname, alt = %alt, "nickname in use, trying alternative");
                session.nickname = alt.clone();
                framed.send(Message::nick(alt)).await?;
            }
            Command::Response(Response::RPL_TOPIC, args) if args.len() >= 3 => {
                session.resolve_topic(TopicUpdate {
                    set_by: prefix_name(&msg),
                    channel: args[1].clone(),
                    topic: Some(args[2].clone()),
                });
            }
            Command::Response(Response::RPL_NOTOPIC, args) if args.len() >= 2 => {
                session.resolve_topic(TopicUpdate {
                    set_by: prefix_name(&msg),
                    channel: args[1].clone(),
                    topic: None,
                });
            }
            Command::TOPIC(channel, topic) => {
                session.resolve_topic(TopicUpdate {
                    set_by: prefix_name(&msg),
                    channel: channel.clone(),
                    topic: topic.clone(),
                });
            }
            Command::JOIN(channel, _) => {
                if msg.source_nickname() == Some(session.nickname.as_str())
                    && session.mark_joined(channel)
                {
                    self.router.channel_joined(&self.handle, channel).await;
                }
            }
            Command::PART(channel, _) => {
                if msg.source_nickname() == Some(session.nickname.as_str()) {
                    session.mark_parted(channel);
                }
            }
            Command::PRIVMSG(target, text) if session.registered => {
                crate::metrics::messages_routed().inc();
                self.router
                    .route(&self.handle, session, msg.prefix.as_ref(), target, text)
                    .await;
            }
            // Never respond to NOTICEs.
            Command::NOTICE(..) => {}
            _ => {}
        }
        Ok(())
    }

    /// Registration completed: reset the backoff, apply configured user
    /// modes, then join every configured channel in order.
    async fn signed_on(
        &self,
        framed: &mut IrcFramed,
        session: &mut Session,
        backoff: &mut Backoff,
    ) -> Result<(), ProtocolError> {
        session.registered = true;
        backoff.reset();
        info!(nickname = %session.nickname, "signed on");

        for mode in self.config.modes().chars() {
            framed
                .send(Message::from_command(Command::MODE(
                    session.nickname.clone(),
                    Some(format!("+{mode}")),
                )))
                .await?;
        }

        let channels = self.config.channels();
        for channel in &channels {
            framed.send(Message::join(channel.clone())).await?;
        }
        info!(channels = ?channels, "joining configured channels");
        Ok(())
    }
}

fn prefix_name(msg: &Message) -> String {
    msg.prefix
        .as_ref()
        .map(|p| p.name().to_string())
        .unwrap_or_else(|| "server".to_string())
}

/// Split reply text into transmittable chunks: one chunk per line, long
/// lines cut at UTF-8 boundaries within `max_len` bytes.
pub fn split_reply(text: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    let mut chunks = Vec::new();
    for line in text.split('\n') {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        let mut remaining = line;
        while remaining.len() > max_len {
            let mut split_at = max_len;
            while split_at > 0 && !remaining.is_char_boundary(split_at) {
                split_at -= 1;
            }
            if split_at == 0 {
                // A single character wider than the limit; send it whole.
                split_at = remaining
                    .chars()
                    .next()
                    .map(char::len_utf8)
                    .unwrap_or(remaining.len());
            }
            chunks.push(remaining[..split_at].to_string());
            remaining = &remaining[split_at..];
        }
        if !remaining.is_empty() {
            chunks.push(remaining.to_string());
        }
    }
    chunks
}
