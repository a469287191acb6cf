//! Authentication token and session lifetimes
//!
//! Applies the `[auth]` lifetimes: a token expires once it has not been
//! used for `token_lifetime` seconds, a session `session_lifetime` seconds
//! after it started.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use crate::config::AuthConfig;

/// Length of generated authentication tokens
pub const TOKEN_LENGTH: usize = 40;

/// Expiry rules derived from `[auth]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthPolicy {
    token_lifetime: Duration,
    session_lifetime: Duration,
}

impl AuthPolicy {
    /// Build the policy; lifetimes are expected to be validated already
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            token_lifetime: seconds(config.token_lifetime),
            session_lifetime: seconds(config.session_lifetime),
        }
    }

    pub fn token_lifetime(&self) -> Duration {
        self.token_lifetime
    }

    pub fn session_lifetime(&self) -> Duration {
        self.session_lifetime
    }

    pub fn token_expires_at(&self, last_used: DateTime<Utc>) -> DateTime<Utc> {
        last_used
            .checked_add_signed(self.token_lifetime)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn is_token_expired(&self, last_used: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now >= self.token_expires_at(last_used)
    }

    pub fn session_expires_at(&self, started: DateTime<Utc>) -> DateTime<Utc> {
        started
            .checked_add_signed(self.session_lifetime)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn is_session_expired(&self, started: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now >= self.session_expires_at(started)
    }
}

fn seconds(value: u64) -> Duration {
    Duration::seconds(i64::try_from(value).unwrap_or(i64::MAX).min(i64::MAX / 1000))
}

/// Generate a random authentication token of lowercase hex characters
pub fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    (0..TOKEN_LENGTH)
        .map(|_| char::from_digit(rng.gen_range(0..16), 16).unwrap_or('0'))
        .collect()
}
