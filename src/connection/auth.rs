use parking_lot::Mutex;
use std::collections::BTreeSet;

use crate::error::P4Error;
use crate::server::ServerConfig;

/// Login keys of the servers a prompt is currently open for.
static PROMPTING: Mutex<BTreeSet<String>> = parking_lot::const_mutex(BTreeSet::new());

/// What to do after the server refused our credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    /// Try the same operation again, usually after a new login
    Retry,
    /// Give up; the user is going to change the configuration
    Reconfigure,
    /// Switch the connection offline
    WorkOffline,
}

/// Decides how to recover from an authentication failure.
///
/// Called at most once at a time per server and user.
pub trait AuthFailureHandler: Send + Sync {
    fn on_auth_failure(&self, server: &ServerConfig, error: &P4Error) -> AuthDecision;
}

/// Handler for non-interactive use: always goes offline.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkOfflineOnAuthFailure;

impl AuthFailureHandler for WorkOfflineOnAuthFailure {
    fn on_auth_failure(&self, server: &ServerConfig, error: &P4Error) -> AuthDecision {
        log::warn!("{}: {}; working offline", server, error);
        AuthDecision::WorkOffline
    }
}

/// Marks a login key as being prompted for until dropped.
#[derive(Debug)]
pub struct AuthPromptGuard {
    key: String,
}

impl AuthPromptGuard {
    /// `None` when a prompt for `key` is already in progress.
    pub fn try_acquire(key: &str) -> Option<AuthPromptGuard> {
        let mut prompting = PROMPTING.lock();
        if !prompting.insert(key.to_string()) {
            return None;
        }
        Some(AuthPromptGuard {
            key: key.to_string(),
        })
    }

    pub fn is_prompting(key: &str) -> bool {
        PROMPTING.lock().contains(key)
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for AuthPromptGuard {
    fn drop(&mut self) {
        PROMPTING.lock().remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_prompt_for_same_key_is_refused() {
        let key = "ssl:perforce:1666>>>auth-test-a";
        let guard = AuthPromptGuard::try_acquire(key).unwrap();
        assert!(AuthPromptGuard::is_prompting(key));
        assert!(AuthPromptGuard::try_acquire(key).is_none());
        assert!(AuthPromptGuard::try_acquire("ssl:perforce:1666>>>auth-test-b").is_some());

        drop(guard);
        assert!(!AuthPromptGuard::is_prompting(key));
        assert!(AuthPromptGuard::try_acquire(key).is_some());
    }

    #[test]
    fn test_guard_released_on_panic() {
        let key = "ssl:perforce:1666>>>auth-test-panic";
        let result = std::panic::catch_unwind(|| {
            let _guard = AuthPromptGuard::try_acquire(key).unwrap();
            panic!("prompt failed");
        });
        assert!(result.is_err());
        assert!(!AuthPromptGuard::is_prompting(key));
    }
}
