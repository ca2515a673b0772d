//! Runtime settings and the time source.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

/// Protocol level lifetime of a nonce, in seconds.
pub const DEFAULT_NONCE_TTL: u64 = 600;

/// Lifetime of the signed OIDC state token, in seconds.
pub const DEFAULT_STATE_TTL: u64 = 600;

// Keeps `now + ttl` far away from the chrono range limits.
const MAX_TTL: u64 = u32::MAX as u64;

/// Tunables shared by the launch validators and the login initiator.
///
/// Deserializable so it can live in whatever configuration file the host
/// application already reads; missing fields take their defaults.
///
/// ```rust
/// let config: lti1p3_security::SecurityConfig =
///     serde_json::from_str(r#"{ "nonce_ttl": 300 }"#).unwrap();
///
/// assert_eq!(config.nonce_ttl, 300);
/// assert_eq!(config.state_ttl, 600);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// How long, in seconds, a seen or minted nonce stays unusable for replay.
    pub nonce_ttl: u64,
    /// How long, in seconds, a signed OIDC state token is valid.
    pub state_ttl: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        SecurityConfig {
            nonce_ttl: DEFAULT_NONCE_TTL,
            state_ttl: DEFAULT_STATE_TTL,
        }
    }
}

impl SecurityConfig {
    pub(crate) fn nonce_lifetime(&self) -> Duration {
        Duration::seconds(self.nonce_ttl.min(MAX_TTL) as i64)
    }

    pub(crate) fn state_lifetime(&self) -> Duration {
        Duration::seconds(self.state_ttl.min(MAX_TTL) as i64)
    }
}

/// Source of the current time for every expiry computation.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// [Clock] reading the system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SecurityConfig::default();
        assert_eq!(config.nonce_lifetime(), Duration::seconds(600));
        assert_eq!(config.state_lifetime(), Duration::seconds(600));
    }

    #[test]
    fn partial_config() {
        let config: SecurityConfig = serde_json::from_str(r#"{ "state_ttl": 30 }"#).unwrap();
        assert_eq!(config.nonce_ttl, DEFAULT_NONCE_TTL);
        assert_eq!(config.state_lifetime(), Duration::seconds(30));
    }
}
