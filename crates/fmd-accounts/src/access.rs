use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque access credential handed out by an [`AccessController`].
///
/// `AccessToken::default()` is the empty token returned when access is denied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub token: String,
    pub issued_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn is_empty(&self) -> bool {
        self.token.is_empty()
    }
}

/// Failed-attempt lockout and token issuance, owned outside this crate.
///
/// Called only after a credential matched: `reset_lock` once, then
/// `put_access` once.
pub trait AccessController: Send + Sync {
    /// Clear failed-attempt state for `uid`.
    fn reset_lock(&self, uid: &str);

    /// Issue a fresh token for `uid`.
    fn put_access(&self, uid: &str) -> AccessToken;
}
