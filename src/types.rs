use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Claims about the signed-in user, as returned by the provider.
///
/// Display data only. Nothing here has been signature-checked, so it must not
/// drive authorization decisions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserClaims(pub Map<String, Value>);

impl UserClaims {
    fn str_claim(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.str_claim("sub")
    }

    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.str_claim("email")
    }

    /// Best display name: `name`, then `preferred_username`, then `email`.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.str_claim("name")
            .or_else(|| self.str_claim("preferred_username"))
            .or_else(|| self.email())
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for UserClaims {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// One authenticated browser session.
///
/// The three values are written and cleared together; a session with no
/// access token does not exist.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub access_token: String,
    /// Only issued when the `offline_access` scope was granted.
    pub refresh_token: Option<String>,
    pub claims: UserClaims,
}

/// Transient record correlating a `/login` with its `/callback`.
///
/// Lives in an encrypted cookie, consumed once. `code_challenge` is derived
/// from `code_verifier` and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingExchange {
    pub state: String,
    pub code_verifier: String,
    /// Unix seconds.
    pub issued_at: u64,
}

impl PendingExchange {
    #[must_use]
    pub fn new(state: String, code_verifier: String) -> Self {
        Self {
            state,
            code_verifier,
            issued_at: unix_now(),
        }
    }

    /// `true` once `ttl_secs` or more have passed since `issued_at`.
    #[must_use]
    pub fn is_expired_at(&self, now: u64, ttl_secs: u64) -> bool {
        now.saturating_sub(self.issued_at) >= ttl_secs
    }

    #[must_use]
    pub fn is_expired(&self, ttl_secs: u64) -> bool {
        self.is_expired_at(unix_now(), ttl_secs)
    }

    /// Constant-shape comparison against the `state` echoed by the provider.
    #[must_use]
    pub fn matches_state(&self, state: &str) -> bool {
        let a = self.state.as_bytes();
        let b = state.as_bytes();
        a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
