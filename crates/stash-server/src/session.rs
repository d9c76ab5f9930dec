use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use constant_time_eq::constant_time_eq;
use tokio::time;
use tracing::{debug, info};

/// Sliding session lifetime. Also drives the cookie `Max-Age`.
pub const SESSION_TTL: Duration = Duration::from_secs(30 * 60);

/// How often the background sweep evicts expired sessions.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// One active session, bound to the client fingerprint presented at login.
#[derive(Debug, Clone)]
struct Session {
    ip: String,
    user_agent: String,
    expires_at: Instant,
}

/// In-memory session table keyed by token. Cheap to clone; all handles share
/// the same table. The registry owns the operator secret, so password
/// comparison and token issuance live in one place.
#[derive(Clone)]
pub struct SessionRegistry {
    password: Arc<String>,
    ttl: Duration,
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

/// Abort-on-drop handle to the background sweep task, so a shut-down server
/// does not keep ticking against a dead registry.
pub struct SweepHandle(tokio::task::JoinHandle<()>);

impl SweepHandle {
    /// Stop the sweep. Dropping the handle has the same effect; this spells
    /// out the intent at the call site.
    pub fn shutdown(self) {}
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl SessionRegistry {
    pub fn new(password: String, ttl: Duration) -> Self {
        Self {
            password: Arc::new(password),
            ttl,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Random 32-hex-char session token.
    fn generate_token() -> String {
        use rand::Rng;
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill(&mut bytes);
        hex::encode(bytes)
    }

    /// Constant-time password check; on match, store a new session bound to
    /// `(ip, user_agent)` and return its token for the caller to set as a
    /// cookie.
    pub fn login(&self, password: &str, ip: &str, user_agent: &str) -> Option<String> {
        if !constant_time_eq(password.as_bytes(), self.password.as_bytes()) {
            return None;
        }
        let token = Self::generate_token();
        let session = Session {
            ip: ip.to_owned(),
            user_agent: user_agent.to_owned(),
            expires_at: Instant::now() + self.ttl,
        };
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.insert(token.clone(), session);
        info!(ip = %ip, "session created");
        Some(token)
    }

    /// True iff the token names a live session whose stored fingerprint
    /// exactly matches the presented one. On success the expiry slides to
    /// `now + ttl`; on any failure nothing is touched, and an unknown token,
    /// an expired session, and a fingerprint mismatch are indistinguishable
    /// to the caller.
    pub fn authenticate(&self, token: &str, ip: &str, user_agent: &str) -> bool {
        let now = Instant::now();
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let Some(session) = sessions.get_mut(token) else {
            return false;
        };
        if now >= session.expires_at {
            return false;
        }
        if session.ip != ip || session.user_agent != user_agent {
            debug!(ip = %ip, "session fingerprint mismatch");
            return false;
        }
        session.expires_at = now + self.ttl;
        true
    }

    /// Drop every session whose expiry has passed. Returns how many.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at >= now);
        before - sessions.len()
    }

    /// Number of sessions currently in the table, expired or not.
    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawn a background tokio task that sweeps every `interval`.
    #[must_use]
    pub fn spawn_sweep(self, interval: Duration) -> SweepHandle {
        SweepHandle(tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.tick().await; // skip first immediate tick
            loop {
                ticker.tick().await;
                let removed = self.sweep();
                if removed > 0 {
                    info!(removed, "swept expired sessions");
                } else {
                    debug!("session sweep found nothing to evict");
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UA: &str = "test-agent/1.0";

    fn registry() -> SessionRegistry {
        SessionRegistry::new("hunter2".into(), SESSION_TTL)
    }

    #[test]
    fn login_rejects_wrong_password() {
        let r = registry();
        assert!(r.login("wrong", "1.2.3.4", UA).is_none());
        assert!(r.is_empty());
    }

    #[test]
    fn fresh_session_authenticates_with_same_fingerprint() {
        let r = registry();
        let token = r.login("hunter2", "1.2.3.4", UA).unwrap();
        assert!(r.authenticate(&token, "1.2.3.4", UA));
    }

    #[test]
    fn fingerprint_mismatch_fails() {
        let r = registry();
        let token = r.login("hunter2", "1.2.3.4", UA).unwrap();
        assert!(!r.authenticate(&token, "5.6.7.8", UA));
        assert!(!r.authenticate(&token, "1.2.3.4", "other-agent/2.0"));
        // The failed attempts must not have destroyed the session.
        assert!(r.authenticate(&token, "1.2.3.4", UA));
    }

    #[test]
    fn unknown_token_fails() {
        let r = registry();
        assert!(!r.authenticate("deadbeef", "1.2.3.4", UA));
    }

    #[test]
    fn expired_session_fails_and_sweep_removes_it() {
        let r = SessionRegistry::new("hunter2".into(), Duration::ZERO);
        let token = r.login("hunter2", "1.2.3.4", UA).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert!(!r.authenticate(&token, "1.2.3.4", UA));
        assert_eq!(r.len(), 1);
        assert_eq!(r.sweep(), 1);
        assert!(r.is_empty());
    }

    #[test]
    fn sweep_keeps_live_sessions() {
        let r = registry();
        r.login("hunter2", "1.2.3.4", UA).unwrap();
        assert_eq!(r.sweep(), 0);
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn expiry_slides_forward_on_each_authenticate() {
        let r = registry();
        let token = r.login("hunter2", "1.2.3.4", UA).unwrap();

        let read_expiry = |r: &SessionRegistry| {
            r.sessions.read().unwrap().get(&token).unwrap().expires_at
        };

        let first = read_expiry(&r);
        std::thread::sleep(Duration::from_millis(5));
        assert!(r.authenticate(&token, "1.2.3.4", UA));
        let second = read_expiry(&r);
        assert!(second > first);

        std::thread::sleep(Duration::from_millis(5));
        assert!(r.authenticate(&token, "1.2.3.4", UA));
        assert!(read_expiry(&r) > second);
    }

    #[test]
    fn tokens_are_unique_hex() {
        let r = registry();
        let a = r.login("hunter2", "1.2.3.4", UA).unwrap();
        let b = r.login("hunter2", "1.2.3.4", UA).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn background_sweep_evicts_expired_sessions() {
        let r = SessionRegistry::new("hunter2".into(), Duration::ZERO);
        r.login("hunter2", "1.2.3.4", UA).unwrap();
        assert_eq!(r.len(), 1);

        let handle = r.clone().spawn_sweep(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(r.is_empty());
        handle.shutdown();
    }
}
