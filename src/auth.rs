//! Multi-session authentication against an external credential portal.
//!
//! The manager multiplexes logins per claimed identity: at most one
//! authenticated session exists per identity, and a fresh login for an
//! already-authenticated identity releases the old session before the new
//! one is installed.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The portal rejected the credentials.
    #[error("unable to authenticate \"{0}\"")]
    LoginFailed(String),
    /// No authenticated session exists for the identity.
    #[error("\"{0}\" is not authenticated or has no avatar")]
    NotAuthenticated(String),
}

/// An opaque authenticated identity handle issued by the portal.
pub trait Avatar: Send + Sync + fmt::Debug {
    /// Stable account identifier, used to scope per-user plugin state.
    fn account(&self) -> &str;
}

/// Callback releasing portal-side resources for one authenticated session.
pub type ReleaseFn = Box<dyn FnOnce() + Send>;

/// A successful portal authentication: the avatar plus its release hook.
pub struct PortalSession {
    /// The avatar capability handle.
    pub avatar: Arc<dyn Avatar>,
    /// Invoked exactly once when the session ends.
    pub release: ReleaseFn,
}

/// External credential portal.
#[async_trait]
pub trait CredentialPortal: Send + Sync {
    /// Exchange credentials for an avatar capability.
    async fn authenticate(&self, identity: &str, secret: &str)
    -> Result<PortalSession, AuthError>;
}

struct AuthSession {
    avatar: Arc<dyn Avatar>,
    release: ReleaseFn,
}

/// Manages authenticated sessions, keyed by the claimed login name.
pub struct AuthManager {
    portal: Arc<dyn CredentialPortal>,
    sessions: Mutex<HashMap<String, AuthSession>>,
}

impl AuthManager {
    /// Create a manager over a credential portal.
    pub fn new(portal: Arc<dyn CredentialPortal>) -> AuthManager {
        AuthManager {
            portal,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Authenticate `identity` with the portal.
    ///
    /// On success any existing session for the identity is released first,
    /// then the new one installed; the two never coexist. On failure the
    /// session map is untouched.
    pub async fn login(&self, identity: &str, secret: &str) -> Result<(), AuthError> {
        let portal_session = self.portal.authenticate(identity, secret).await?;

        let replaced = self.logout(identity);
        if replaced {
            tracing::info!(identity, "replaced existing authenticated session");
        }
        self.sessions.lock().insert(
            identity.to_string(),
            AuthSession {
                avatar: portal_session.avatar,
                release: portal_session.release,
            },
        );
        tracing::info!(identity, "authenticated");
        Ok(())
    }

    /// End the session for `identity`, invoking its release callback.
    ///
    /// Idempotent: returns whether a session was present.
    pub fn logout(&self, identity: &str) -> bool {
        let removed = self.sessions.lock().remove(identity);
        match removed {
            Some(session) => {
                // Run the callback outside the lock; it belongs to the portal
                // and may do arbitrary work.
                (session.release)();
                true
            }
            None => false,
        }
    }

    /// The avatar for an authenticated identity.
    ///
    /// This is the only way other components may read authentication state.
    pub fn get_authenticated_avatar(&self, identity: &str) -> Result<Arc<dyn Avatar>, AuthError> {
        self.sessions
            .lock()
            .get(identity)
            .map(|session| Arc::clone(&session.avatar))
            .ok_or_else(|| AuthError::NotAuthenticated(identity.to_string()))
    }
}

/// In-memory credential portal for hosts without an external account system.
///
/// Identities and secrets are registered up front; avatars are plain
/// account handles with no portal-side state to release.
#[derive(Default)]
pub struct MemoryPortal {
    accounts: Mutex<HashMap<String, String>>,
}

#[derive(Debug)]
struct MemoryAvatar {
    account: String,
}

impl Avatar for MemoryAvatar {
    fn account(&self) -> &str {
        &self.account
    }
}

impl MemoryPortal {
    /// Create an empty portal; every login fails until accounts are added.
    pub fn new() -> MemoryPortal {
        MemoryPortal::default()
    }

    /// Register an identity/secret pair.
    pub fn add_account(&self, identity: &str, secret: &str) {
        self.accounts
            .lock()
            .insert(identity.to_string(), secret.to_string());
    }
}

#[async_trait]
impl CredentialPortal for MemoryPortal {
    async fn authenticate(
        &self,
        identity: &str,
        secret: &str,
    ) -> Result<PortalSession, AuthError> {
        let ok = self
            .accounts
            .lock()
            .get(identity)
            .is_some_and(|stored| stored == secret);
        if !ok {
            return Err(AuthError::LoginFailed(identity.to_string()));
        }
        Ok(PortalSession {
            avatar: Arc::new(MemoryAvatar {
                account: identity.to_string(),
            }),
            release: Box::new(|| {}),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Portal that records the order of logins and releases.
    struct TracingPortal {
        log: Arc<Mutex<Vec<String>>>,
        reject: bool,
    }

    #[derive(Debug)]
    struct TestAvatar {
        account: String,
    }

    impl Avatar for TestAvatar {
        fn account(&self) -> &str {
            &self.account
        }
    }

    #[async_trait]
    impl CredentialPortal for TracingPortal {
        async fn authenticate(
            &self,
            identity: &str,
            _secret: &str,
        ) -> Result<PortalSession, AuthError> {
            if self.reject {
                return Err(AuthError::LoginFailed(identity.to_string()));
            }
            let log = Arc::clone(&self.log);
            log.lock().push(format!("auth:{identity}"));
            let identity = identity.to_string();
            let release_log = Arc::clone(&self.log);
            let release_id = identity.clone();
            Ok(PortalSession {
                avatar: Arc::new(TestAvatar { account: identity }),
                release: Box::new(move || {
                    release_log.lock().push(format!("release:{release_id}"));
                }),
            })
        }
    }

    fn manager(log: &Arc<Mutex<Vec<String>>>, reject: bool) -> AuthManager {
        AuthManager::new(Arc::new(TracingPortal {
            log: Arc::clone(log),
            reject,
        }))
    }

    #[tokio::test]
    async fn login_installs_session() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let auth = manager(&log, false);

        auth.login("alice", "secret").await.unwrap();
        let avatar = auth.get_authenticated_avatar("alice").unwrap();
        assert_eq!(avatar.account(), "alice");
    }

    #[tokio::test]
    async fn relogin_releases_old_session_exactly_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let auth = manager(&log, false);

        auth.login("alice", "first").await.unwrap();
        auth.login("alice", "second").await.unwrap();

        // Old session released after the second authentication succeeded and
        // before the replacement was installed; exactly one release so far.
        assert_eq!(
            *log.lock(),
            vec!["auth:alice", "auth:alice", "release:alice"]
        );
        assert!(auth.get_authenticated_avatar("alice").is_ok());

        auth.logout("alice");
        assert_eq!(
            log.lock().iter().filter(|e| *e == "release:alice").count(),
            2
        );
    }

    #[tokio::test]
    async fn failed_login_leaves_state_unchanged() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let auth = manager(&log, true);

        assert!(matches!(
            auth.login("bob", "bad").await,
            Err(AuthError::LoginFailed(_))
        ));
        assert!(matches!(
            auth.get_authenticated_avatar("bob"),
            Err(AuthError::NotAuthenticated(_))
        ));
        // No session was installed and nothing was released.
        assert!(log.lock().is_empty());
    }

    #[tokio::test]
    async fn logout_is_idempotent() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let auth = manager(&log, false);

        auth.login("alice", "secret").await.unwrap();
        assert!(auth.logout("alice"));
        assert!(!auth.logout("alice"));
        assert!(matches!(
            auth.get_authenticated_avatar("alice"),
            Err(AuthError::NotAuthenticated(_))
        ));
    }

    #[tokio::test]
    async fn memory_portal_checks_secrets() {
        let portal = MemoryPortal::new();
        portal.add_account("alice", "sesame");
        let auth = AuthManager::new(Arc::new(portal));

        assert!(auth.login("alice", "wrong").await.is_err());
        assert!(auth.login("alice", "sesame").await.is_ok());
    }
}
