//! Command dispatch: parsing directed text, resolving handlers, and
//! reporting failures back to the originating conversation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;

use crate::auth::{AuthError, AuthManager, Avatar};
use crate::source::Conversation;

/// Errors surfaced to the originating conversation as
/// `<ErrorKind>: <message>`.
#[derive(Debug, Clone, Error)]
pub enum CommandError {
    /// No handler resolves to the command name.
    #[error("unknown command: {0}")]
    NotFound(String),
    /// The arguments do not fit the handler's declared shape.
    #[error("{0}")]
    Argument(String),
    /// The handler itself failed.
    #[error("{0}")]
    Handler(String),
}

impl CommandError {
    /// Static kind label used in failure reports and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            CommandError::NotFound(_) => "CommandNotFound",
            CommandError::Argument(_) => "CommandArgumentError",
            CommandError::Handler(_) => "CommandHandlerError",
        }
    }
}

/// Errors from privileged registry operations (grant/revoke/list).
#[derive(Debug, Error)]
pub enum AccessError {
    /// The named identity is not authenticated.
    #[error(transparent)]
    Auth(#[from] AuthError),
    /// The registry rejected the operation.
    #[error(transparent)]
    Registry(#[from] CommandError),
}

/// One parsed command invocation, alive for the duration of a dispatch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    /// Resolved command name (the leading token).
    pub name: String,
    /// Whitespace-split positional arguments.
    pub args: Vec<String>,
    /// The raw argument tail, untouched.
    pub rest: String,
}

/// Split directed text into a command name and its arguments.
pub fn parse_invocation(text: &str) -> Option<Invocation> {
    let trimmed = text.trim();
    let (name, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim_start()),
        None if trimmed.is_empty() => return None,
        None => (trimmed, ""),
    };
    Some(Invocation {
        name: name.to_string(),
        args: rest.split_whitespace().map(str::to_string).collect(),
        rest: rest.to_string(),
    })
}

/// A successful command result, delivered back to the conversation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandReply {
    /// Nothing to say; the handler replied itself or had no output.
    Silent,
    /// A single line of text.
    Text(String),
    /// A sequence of lines, delivered in order.
    Lines(Vec<String>),
}

/// A command provider.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Declared positional arity as (minimum, optional maximum).
    fn arity(&self) -> (usize, Option<usize>) {
        (0, None)
    }

    /// Usage string shown on argument errors.
    fn usage(&self) -> &str {
        ""
    }

    /// Execute the invocation.
    async fn invoke(
        &self,
        conversation: &Conversation,
        invocation: &Invocation,
    ) -> Result<CommandReply, CommandError>;
}

/// Scope for plugin installation bookkeeping: process-wide, or tied to one
/// authenticated avatar.
#[derive(Clone)]
pub enum PluginScope {
    /// The process-wide default scope.
    Global,
    /// The scope of one authenticated avatar.
    Avatar(Arc<dyn Avatar>),
}

/// External command/plugin registry.
pub trait CommandRegistry: Send + Sync {
    /// Resolve a command name to its handler.
    fn resolve(&self, name: &str) -> Option<Arc<dyn CommandHandler>>;

    /// Names available in a scope.
    fn list(&self, scope: &PluginScope) -> Vec<String>;

    /// Whether a name is installed in a scope.
    fn is_installed(&self, scope: &PluginScope, name: &str) -> bool;

    /// Install a name into a scope.
    fn install(&self, scope: &PluginScope, name: &str) -> Result<(), CommandError>;

    /// Remove a name from a scope.
    fn uninstall(&self, scope: &PluginScope, name: &str) -> Result<(), CommandError>;
}

/// Dispatches directed text to command handlers.
#[derive(Clone)]
pub struct CommandDispatcher {
    registry: Arc<dyn CommandRegistry>,
    auth: Arc<AuthManager>,
}

impl CommandDispatcher {
    /// Create a dispatcher over a registry and the auth manager.
    pub fn new(registry: Arc<dyn CommandRegistry>, auth: Arc<AuthManager>) -> CommandDispatcher {
        CommandDispatcher { registry, auth }
    }

    /// Dispatch directed text on its own task.
    ///
    /// The router is never blocked by a running handler. Success replies go
    /// back to the conversation; every failure is logged and reported there
    /// as `<ErrorKind>: <message>` instead of propagating.
    pub fn dispatch(&self, conversation: Conversation, text: &str) {
        let registry = Arc::clone(&self.registry);
        let text = text.to_string();
        tokio::spawn(async move {
            let result = Self::execute(registry, &conversation, &text).await;
            match result {
                Ok(()) => crate::metrics::commands_dispatched().inc(),
                Err(e) => {
                    crate::metrics::commands_failed().inc();
                    tracing::error!(kind = e.kind(), error = %e, "command failed");
                    let report = format!("{}: {}", e.kind(), e);
                    if let Err(send_err) = conversation.say(&report).await {
                        tracing::warn!(error = %send_err, "could not report command failure");
                    }
                }
            }
        });
    }

    async fn execute(
        registry: Arc<dyn CommandRegistry>,
        conversation: &Conversation,
        text: &str,
    ) -> Result<(), CommandError> {
        let invocation =
            parse_invocation(text).ok_or_else(|| CommandError::NotFound("<empty>".to_string()))?;

        let handler = registry
            .resolve(&invocation.name)
            .ok_or_else(|| CommandError::NotFound(invocation.name.clone()))?;

        let (min, max) = handler.arity();
        let given = invocation.args.len();
        if given < min || max.is_some_and(|max| given > max) {
            let usage = handler.usage();
            let detail = if usage.is_empty() {
                format!("wrong number of arguments for '{}'", invocation.name)
            } else {
                format!(
                    "wrong number of arguments for '{}' (usage: {usage})",
                    invocation.name
                )
            };
            return Err(CommandError::Argument(detail));
        }

        let reply = handler.invoke(conversation, &invocation).await?;
        Self::deliver(conversation, reply).await;
        Ok(())
    }

    async fn deliver(conversation: &Conversation, reply: CommandReply) {
        let lines = match reply {
            CommandReply::Silent => return,
            CommandReply::Text(line) => vec![line],
            CommandReply::Lines(lines) => lines,
        };
        for line in lines {
            if let Err(e) = conversation.say(&line).await {
                tracing::warn!(error = %e, "could not deliver command reply");
                return;
            }
        }
    }

    fn scope_for(&self, identity: Option<&str>) -> Result<PluginScope, AuthError> {
        match identity {
            None => Ok(PluginScope::Global),
            Some(identity) => Ok(PluginScope::Avatar(
                self.auth.get_authenticated_avatar(identity)?,
            )),
        }
    }

    /// Grant access to a command provider, globally or for one
    /// authenticated identity.
    pub fn grant(&self, identity: Option<&str>, name: &str) -> Result<(), AccessError> {
        let scope = self.scope_for(identity)?;
        self.registry.install(&scope, name)?;
        Ok(())
    }

    /// Revoke access to a command provider.
    pub fn revoke(&self, identity: Option<&str>, name: &str) -> Result<(), AccessError> {
        let scope = self.scope_for(identity)?;
        self.registry.uninstall(&scope, name)?;
        Ok(())
    }

    /// Names available in the scope of `identity` (global when `None`).
    pub fn available(&self, identity: Option<&str>) -> Result<Vec<String>, AccessError> {
        let scope = self.scope_for(identity)?;
        Ok(self.registry.list(&scope))
    }
}

/// In-memory command registry with global and per-account installation
/// bookkeeping.
#[derive(Default)]
pub struct StaticCommandRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn CommandHandler>>>,
    installed: RwLock<HashMap<String, Vec<String>>>,
}

/// Key for the global installation scope; account names never collide with
/// it because it is not a valid login name.
const GLOBAL_SCOPE: &str = "*";

impl StaticCommandRegistry {
    /// Create an empty registry.
    pub fn new() -> StaticCommandRegistry {
        StaticCommandRegistry::default()
    }

    /// Register a handler under a name and install it globally.
    pub fn register(&self, name: &str, handler: Arc<dyn CommandHandler>) {
        self.handlers.write().insert(name.to_string(), handler);
        let mut installed = self.installed.write();
        let names = installed.entry(GLOBAL_SCOPE.to_string()).or_default();
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }

    fn scope_key(scope: &PluginScope) -> String {
        match scope {
            PluginScope::Global => GLOBAL_SCOPE.to_string(),
            PluginScope::Avatar(avatar) => avatar.account().to_string(),
        }
    }
}

impl CommandRegistry for StaticCommandRegistry {
    fn resolve(&self, name: &str) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.read().get(name).cloned()
    }

    fn list(&self, scope: &PluginScope) -> Vec<String> {
        self.installed
            .read()
            .get(&Self::scope_key(scope))
            .cloned()
            .unwrap_or_default()
    }

    fn is_installed(&self, scope: &PluginScope, name: &str) -> bool {
        self.installed
            .read()
            .get(&Self::scope_key(scope))
            .is_some_and(|names| names.iter().any(|n| n == name))
    }

    fn install(&self, scope: &PluginScope, name: &str) -> Result<(), CommandError> {
        if !self.handlers.read().contains_key(name) {
            return Err(CommandError::NotFound(name.to_string()));
        }
        let mut installed = self.installed.write();
        let names = installed.entry(Self::scope_key(scope)).or_default();
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
        Ok(())
    }

    fn uninstall(&self, scope: &PluginScope, name: &str) -> Result<(), CommandError> {
        let mut installed = self.installed.write();
        match installed.get_mut(&Self::scope_key(scope)) {
            Some(names) if names.iter().any(|n| n == name) => {
                names.retain(|n| n != name);
                Ok(())
            }
            _ => Err(CommandError::NotFound(name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{CredentialPortal, MemoryPortal};
    use crate::supervisor::{BotHandle, Control};
    use std::time::Duration;
    use tokio::time::timeout;

    struct Echo;

    #[async_trait]
    impl CommandHandler for Echo {
        fn arity(&self) -> (usize, Option<usize>) {
            (1, None)
        }

        fn usage(&self) -> &str {
            "echo <text> [...]"
        }

        async fn invoke(
            &self,
            _conversation: &Conversation,
            invocation: &Invocation,
        ) -> Result<CommandReply, CommandError> {
            Ok(CommandReply::Text(invocation.rest.clone()))
        }
    }

    struct Explode;

    #[async_trait]
    impl CommandHandler for Explode {
        async fn invoke(
            &self,
            _conversation: &Conversation,
            _invocation: &Invocation,
        ) -> Result<CommandReply, CommandError> {
            Err(CommandError::Handler("the handler broke".into()))
        }
    }

    fn dispatcher() -> (CommandDispatcher, Arc<StaticCommandRegistry>) {
        let registry = Arc::new(StaticCommandRegistry::new());
        registry.register("echo", Arc::new(Echo));
        registry.register("explode", Arc::new(Explode));
        let auth = Arc::new(AuthManager::new(Arc::new(MemoryPortal::new())));
        (
            CommandDispatcher::new(registry.clone() as Arc<dyn CommandRegistry>, auth),
            registry,
        )
    }

    fn conversation() -> (Conversation, tokio::sync::mpsc::Receiver<Control>) {
        let (handle, rx) = BotHandle::detached();
        (Conversation::new("#chan", None, handle), rx)
    }

    async fn next_say(rx: &mut tokio::sync::mpsc::Receiver<Control>) -> (String, String) {
        match timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Some(Control::Say { target, text })) => (target, text),
            other => panic!("expected a Say control, got {other:?}"),
        }
    }

    #[test]
    fn invocation_parsing() {
        assert_eq!(parse_invocation("   "), None);
        assert_eq!(
            parse_invocation("echo"),
            Some(Invocation {
                name: "echo".into(),
                args: vec![],
                rest: String::new(),
            })
        );
        assert_eq!(
            parse_invocation("echo one  two"),
            Some(Invocation {
                name: "echo".into(),
                args: vec!["one".into(), "two".into()],
                rest: "one  two".into(),
            })
        );
    }

    #[tokio::test]
    async fn success_reply_reaches_conversation() {
        let (dispatcher, _) = dispatcher();
        let (convo, mut rx) = conversation();

        dispatcher.dispatch(convo, "echo hello world");
        let (target, text) = next_say(&mut rx).await;
        assert_eq!(target, "#chan");
        assert_eq!(text, "hello world");
    }

    #[tokio::test]
    async fn unknown_command_reports_not_found() {
        let (dispatcher, _) = dispatcher();
        let (convo, mut rx) = conversation();

        dispatcher.dispatch(convo, "nosuchthing at all");
        let (_, text) = next_say(&mut rx).await;
        assert_eq!(text, "CommandNotFound: unknown command: nosuchthing");
    }

    #[tokio::test]
    async fn arity_mismatch_reports_argument_error() {
        let (dispatcher, _) = dispatcher();
        let (convo, mut rx) = conversation();

        dispatcher.dispatch(convo, "echo");
        let (_, text) = next_say(&mut rx).await;
        assert_eq!(
            text,
            "CommandArgumentError: wrong number of arguments for 'echo' (usage: echo <text> [...])"
        );
    }

    #[tokio::test]
    async fn handler_failure_is_reported_not_propagated() {
        let (dispatcher, _) = dispatcher();
        let (convo, mut rx) = conversation();

        dispatcher.dispatch(convo, "explode");
        let (_, text) = next_say(&mut rx).await;
        assert_eq!(text, "CommandHandlerError: the handler broke");
    }

    #[tokio::test]
    async fn grant_and_revoke_resolve_scopes() {
        let registry = Arc::new(StaticCommandRegistry::new());
        registry.register("echo", Arc::new(Echo));
        let portal = MemoryPortal::new();
        portal.add_account("alice", "sesame");
        let auth = Arc::new(AuthManager::new(Arc::new(portal)));
        auth.login("alice", "sesame").await.unwrap();
        let dispatcher =
            CommandDispatcher::new(registry.clone() as Arc<dyn CommandRegistry>, auth.clone());

        // Global grant needs no identity.
        dispatcher.grant(None, "echo").unwrap();
        assert!(dispatcher.available(None).unwrap().contains(&"echo".to_string()));

        // Per-identity grant resolves through the auth manager.
        dispatcher.grant(Some("alice"), "echo").unwrap();
        let avatar = auth.get_authenticated_avatar("alice").unwrap();
        assert!(registry.is_installed(&PluginScope::Avatar(avatar), "echo"));

        dispatcher.revoke(Some("alice"), "echo").unwrap();
        assert!(dispatcher.available(Some("alice")).unwrap().is_empty());

        // Unauthenticated identities are refused.
        assert!(matches!(
            dispatcher.grant(Some("mallory"), "echo"),
            Err(AccessError::Auth(_))
        ));
    }

    #[tokio::test]
    async fn memory_portal_is_a_credential_portal() {
        // Object safety check: the portal is usable behind a trait object.
        let portal: Arc<dyn CredentialPortal> = Arc::new(MemoryPortal::new());
        assert!(portal.authenticate("ghost", "pw").await.is_err());
    }
}
