//! lodestar - a resilient IRC client session.
//!
//! The binary is the host process: it loads configuration, wires the
//! external collaborators (credential portal, command registry, observer
//! registry), and supervises the connection until shut down.

mod auth;
mod backoff;
mod config;
mod dispatch;
mod events;
mod fetch;
mod http;
mod mask;
mod metrics;
mod router;
mod session;
mod source;
mod supervisor;
mod urls;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::auth::{AuthManager, MemoryPortal};
use crate::config::{ConfigStore, FileConfig};
use crate::dispatch::{
    CommandDispatcher, CommandError, CommandHandler, CommandReply, Invocation,
    StaticCommandRegistry,
};
use crate::events::{
    AmbientEvent, AmbientObserver, EventBroadcaster, ObserverRegistry, PUBLIC_URL_RECEIVED,
    StaticObserverRegistry,
};
use crate::router::MessageRouter;
use crate::source::Conversation;
use crate::supervisor::ConnectionSupervisor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let store = Arc::new(FileConfig::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?);

    info!(
        network = %store.network_name(),
        nickname = %store.nickname(),
        "Starting lodestar"
    );

    // Prometheus metrics are optional.
    // Convention: metrics_port = 0 disables the HTTP endpoint.
    let metrics_port = store.metrics_port().unwrap_or(0);
    if metrics_port == 0 {
        info!("Metrics disabled");
    } else {
        metrics::init();
        tokio::spawn(async move {
            http::run_http_server(metrics_port).await;
        });
        info!(port = metrics_port, "Prometheus HTTP server started");
    }

    // External collaborators. The in-memory portal starts empty; a host
    // with real accounts swaps in its own CredentialPortal implementation.
    let portal = Arc::new(MemoryPortal::new());
    let auth = Arc::new(AuthManager::new(portal));

    let commands = Arc::new(StaticCommandRegistry::new());
    register_session_commands(&commands);

    let observers = Arc::new(StaticObserverRegistry::new());
    observers.register(Arc::new(UrlLogObserver));

    let dispatcher = CommandDispatcher::new(commands, auth);
    let broadcaster = EventBroadcaster::new(observers);
    let store_dyn: Arc<dyn ConfigStore> = store.clone();
    let router = MessageRouter::new(store_dyn.clone(), broadcaster, dispatcher);

    let shutdown = CancellationToken::new();
    let (supervisor, _handle) = ConnectionSupervisor::new(store_dyn, router, shutdown.clone());
    let supervisor_task = tokio::spawn(supervisor.run());

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    shutdown.cancel();
    supervisor_task.await?;

    Ok(())
}

/// Register the built-in session-management commands.
fn register_session_commands(registry: &StaticCommandRegistry) {
    registry.register("join", Arc::new(JoinCommand));
    registry.register("part", Arc::new(PartCommand));
    registry.register("ignore", Arc::new(IgnoreCommand));
    registry.register("unignore", Arc::new(UnignoreCommand));
    registry.register("topic", Arc::new(TopicCommand));
}

/// Logs every URL seen in public conversation.
struct UrlLogObserver;

#[async_trait]
impl AmbientObserver for UrlLogObserver {
    fn interested_in(&self, event_name: &str) -> bool {
        event_name == PUBLIC_URL_RECEIVED
    }

    async fn notify(&self, event: &AmbientEvent) -> anyhow::Result<()> {
        if let Some(url) = event.args.first() {
            info!(channel = %event.conversation.channel, url = %url, "url seen");
        }
        Ok(())
    }
}

struct JoinCommand;

#[async_trait]
impl CommandHandler for JoinCommand {
    fn arity(&self) -> (usize, Option<usize>) {
        (1, Some(1))
    }

    fn usage(&self) -> &str {
        "join <channel>"
    }

    async fn invoke(
        &self,
        conversation: &Conversation,
        invocation: &Invocation,
    ) -> Result<CommandReply, CommandError> {
        let channel = &invocation.args[0];
        conversation
            .handle()
            .join(channel)
            .await
            .map_err(|e| CommandError::Handler(e.to_string()))?;
        Ok(CommandReply::Text(format!("joining {channel}")))
    }
}

struct PartCommand;

#[async_trait]
impl CommandHandler for PartCommand {
    fn arity(&self) -> (usize, Option<usize>) {
        (1, Some(1))
    }

    fn usage(&self) -> &str {
        "part <channel>"
    }

    async fn invoke(
        &self,
        conversation: &Conversation,
        invocation: &Invocation,
    ) -> Result<CommandReply, CommandError> {
        let channel = &invocation.args[0];
        conversation
            .handle()
            .part(channel)
            .await
            .map_err(|e| CommandError::Handler(e.to_string()))?;
        Ok(CommandReply::Text(format!("leaving {channel}")))
    }
}

struct IgnoreCommand;

#[async_trait]
impl CommandHandler for IgnoreCommand {
    fn arity(&self) -> (usize, Option<usize>) {
        (1, Some(1))
    }

    fn usage(&self) -> &str {
        "ignore <mask>"
    }

    async fn invoke(
        &self,
        conversation: &Conversation,
        invocation: &Invocation,
    ) -> Result<CommandReply, CommandError> {
        let mask = &invocation.args[0];
        Ok(match conversation.handle().ignore(mask) {
            Some(normalized) => CommandReply::Text(format!("ignoring {normalized}")),
            None => CommandReply::Text(format!("already ignoring {mask}")),
        })
    }
}

struct UnignoreCommand;

#[async_trait]
impl CommandHandler for UnignoreCommand {
    fn arity(&self) -> (usize, Option<usize>) {
        (1, Some(1))
    }

    fn usage(&self) -> &str {
        "unignore <mask>"
    }

    async fn invoke(
        &self,
        conversation: &Conversation,
        invocation: &Invocation,
    ) -> Result<CommandReply, CommandError> {
        let mask = &invocation.args[0];
        let removed = conversation.handle().unignore(mask);
        Ok(if removed.is_empty() {
            CommandReply::Text(format!("nothing matched {mask}"))
        } else {
            CommandReply::Text(format!("no longer ignoring {}", removed.join(", ")))
        })
    }
}

struct TopicCommand;

#[async_trait]
impl CommandHandler for TopicCommand {
    fn arity(&self) -> (usize, Option<usize>) {
        (1, None)
    }

    fn usage(&self) -> &str {
        "topic <channel> [new topic]"
    }

    async fn invoke(
        &self,
        conversation: &Conversation,
        invocation: &Invocation,
    ) -> Result<CommandReply, CommandError> {
        let channel = invocation.args[0].clone();
        let new_topic = invocation
            .rest
            .strip_prefix(invocation.args[0].as_str())
            .map(|rest| rest.trim_start())
            .filter(|rest| !rest.is_empty())
            .map(str::to_string);

        let update = conversation
            .handle()
            .topic(&channel, new_topic)
            .await
            .map_err(|e| CommandError::Handler(e.to_string()))?;

        Ok(match update.topic {
            Some(topic) => CommandReply::Text(format!(
                "topic for {} (set by {}): {}",
                update.channel, update.set_by, topic
            )),
            None => CommandReply::Text(format!("no topic is set for {}", update.channel)),
        })
    }
}
