//! Authentication configuration.

use std::time::Duration;

/// Configuration for credential verification and the session lifecycle.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// PEM-encoded Ed25519 private key for JWT signing.
    pub jwt_private_key_pem: String,
    /// PEM-encoded Ed25519 public key for JWT verification.
    pub jwt_public_key_pem: String,
    /// Access token lifetime in seconds (default: 900 = 15 minutes).
    pub access_token_lifetime_secs: u64,
    /// Refresh token lifetime in seconds (default: 1_209_600 = 14 days).
    pub refresh_token_lifetime_secs: u64,
    /// JWT issuer (`iss` claim).
    pub jwt_issuer: String,
    /// Optional pepper prepended to passwords before Argon2id hashing.
    pub pepper: Option<String>,
    pub min_password_length: usize,
    /// Concurrent sessions allowed per account before the least recently
    /// active ones are evicted (default: 5).
    pub max_concurrent_sessions: usize,
    /// Max consecutive failed login attempts before lockout (default: 5).
    pub max_failed_login_attempts: u32,
    /// Initial lockout duration in seconds (default: 300 = 5 min).
    pub lockout_duration_secs: u64,
    /// Exponential backoff multiplier for repeated lockouts (default: 2.0).
    pub lockout_backoff_multiplier: f64,
    /// Maximum lockout duration in seconds (default: 3600 = 1 hour).
    pub max_lockout_duration_secs: u64,
    /// Deadline for each store call made by the auth layer.
    pub store_timeout_ms: u64,
}

impl AuthConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Lockout duration for the `lockout_count`-th lockout (1-based),
    /// growing geometrically up to the configured maximum.
    pub fn lockout_duration(&self, lockout_count: u32) -> chrono::Duration {
        let exponent = lockout_count.saturating_sub(1).min(32) as i32;
        let secs =
            self.lockout_duration_secs as f64 * self.lockout_backoff_multiplier.powi(exponent);
        let capped = secs.min(self.max_lockout_duration_secs as f64);
        chrono::Duration::seconds(capped as i64)
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_private_key_pem: String::new(),
            jwt_public_key_pem: String::new(),
            access_token_lifetime_secs: 900,
            refresh_token_lifetime_secs: 1_209_600,
            jwt_issuer: "tollgate".into(),
            pepper: None,
            min_password_length: 12,
            max_concurrent_sessions: 5,
            max_failed_login_attempts: 5,
            lockout_duration_secs: 300,
            lockout_backoff_multiplier: 2.0,
            max_lockout_duration_secs: 3600,
            store_timeout_ms: 2_000,
        }
    }
}
