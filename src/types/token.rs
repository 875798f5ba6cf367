use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Access tokens are treated as expired this many seconds before their reported expiry.
pub const EXPIRY_MARGIN_SECONDS: i64 = 60;

/// Lifetime assumed for an access token whose issuer did not report `expires_in`.
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// A bearer credential for one resource server, in the shape it is persisted on disk.
///
/// The struct is updated in place whenever the access token is refreshed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCredential {
    pub resource_server: String,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Expiry as seconds since the Unix epoch.
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl TokenCredential {
    /// Whether the access token must be refreshed before use at `now` (Unix seconds).
    ///
    /// A credential without an access token or without a known expiry is always stale.
    pub fn is_stale_at(&self, now: i64) -> bool {
        if self.access_token.is_empty() {
            return true;
        }
        match self.expires_at {
            Some(expires_at) => now + EXPIRY_MARGIN_SECONDS >= expires_at,
            None => true,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.is_stale_at(Utc::now().timestamp())
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Value for the `Authorization` header.
    pub fn authorization_value(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}
