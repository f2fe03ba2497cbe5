//! Server-side session store.
//!
//! Sessions are keyed by an opaque token handed to the client at login. The
//! store holds everything else server-side: the caller's identity and role,
//! plus the last-seen instant used for idle-timeout expiry. Validation hands
//! back an explicit [`SessionContext`] value which is threaded through the
//! services; there is no ambient request state.

use crate::error::{CoreError, CoreResult};
use crate::role::Role;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// The authenticated identity behind one request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionContext {
    pub user_id: String,
    pub email: String,
    pub role: Role,
}

struct SessionEntry {
    ctx: SessionContext,
    last_seen: Instant,
}

/// In-process session store with idle-timeout expiry.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, SessionEntry>>,
    idle_timeout: Duration,
}

impl SessionStore {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            idle_timeout,
        }
    }

    /// Creates a session for `ctx` and returns its opaque token.
    pub fn create(&self, ctx: SessionContext) -> String {
        let token = Uuid::new_v4().simple().to_string();
        let mut sessions = self.sessions.lock().expect("session mutex poisoned");
        sessions.insert(
            token.clone(),
            SessionEntry {
                ctx,
                last_seen: Instant::now(),
            },
        );
        token
    }

    /// Validates a session token, optionally restricted to `roles`.
    ///
    /// A valid token refreshes its idle deadline. An expired token is removed
    /// as if it never existed.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotAuthenticated`] for a missing, unknown, or
    /// expired token, and [`CoreError::Forbidden`] when `roles` is given and
    /// the session's role is not a member.
    pub fn require(
        &self,
        token: Option<&str>,
        roles: Option<&[Role]>,
    ) -> CoreResult<SessionContext> {
        let token = token.ok_or(CoreError::NotAuthenticated)?;
        let mut sessions = self.sessions.lock().expect("session mutex poisoned");

        let ctx = match sessions.get_mut(token) {
            Some(entry) if entry.last_seen.elapsed() <= self.idle_timeout => {
                entry.last_seen = Instant::now();
                entry.ctx.clone()
            }
            Some(_) => {
                sessions.remove(token);
                return Err(CoreError::NotAuthenticated);
            }
            None => return Err(CoreError::NotAuthenticated),
        };

        if let Some(roles) = roles {
            if !roles.contains(&ctx.role) {
                return Err(CoreError::Forbidden(format!(
                    "route not available to role '{}'",
                    ctx.role
                )));
            }
        }

        Ok(ctx)
    }

    /// Destroys a session. Returns whether it existed.
    pub fn destroy(&self, token: &str) -> bool {
        let mut sessions = self.sessions.lock().expect("session mutex poisoned");
        sessions.remove(token).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patient_ctx() -> SessionContext {
        SessionContext {
            user_id: "BM00001".into(),
            email: "patient1@example.com".into(),
            role: Role::Patient,
        }
    }

    #[test]
    fn test_create_then_require_returns_context() {
        let store = SessionStore::new(Duration::from_secs(60));
        let token = store.create(patient_ctx());

        let ctx = store
            .require(Some(&token), None)
            .expect("fresh session should validate");
        assert_eq!(ctx, patient_ctx());
    }

    #[test]
    fn test_missing_and_unknown_tokens_fail() {
        let store = SessionStore::new(Duration::from_secs(60));

        let err = store.require(None, None).expect_err("no token");
        assert!(matches!(err, CoreError::NotAuthenticated));

        let err = store
            .require(Some("deadbeef"), None)
            .expect_err("unknown token");
        assert!(matches!(err, CoreError::NotAuthenticated));
    }

    #[test]
    fn test_role_gate_rejects_wrong_role() {
        let store = SessionStore::new(Duration::from_secs(60));
        let token = store.create(patient_ctx());

        let err = store
            .require(Some(&token), Some(&[Role::Doctor]))
            .expect_err("patient session should not pass a doctor gate");
        assert!(matches!(err, CoreError::Forbidden(_)));

        store
            .require(Some(&token), Some(&[Role::Patient, Role::Doctor]))
            .expect("member role should pass");
    }

    #[test]
    fn test_idle_timeout_expires_session() {
        let store = SessionStore::new(Duration::from_millis(10));
        let token = store.create(patient_ctx());

        std::thread::sleep(Duration::from_millis(30));

        let err = store
            .require(Some(&token), None)
            .expect_err("idle session should expire");
        assert!(matches!(err, CoreError::NotAuthenticated));
    }

    #[test]
    fn test_destroy_invalidates_token() {
        let store = SessionStore::new(Duration::from_secs(60));
        let token = store.create(patient_ctx());

        assert!(store.destroy(&token));
        assert!(!store.destroy(&token), "second destroy is a no-op");

        let err = store
            .require(Some(&token), None)
            .expect_err("destroyed session should not validate");
        assert!(matches!(err, CoreError::NotAuthenticated));
    }
}
