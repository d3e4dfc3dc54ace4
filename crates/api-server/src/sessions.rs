//! Session cookies, token material, and password hashing
//!
//! The raw session token travels only in the cookie; the database keeps its
//! SHA-256 hex digest. Sessions expire absolutely (days after login) and on
//! idle (minutes since last request), both enforced server-side.

use axum_extra::extract::cookie::{Cookie, SameSite};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// Session cookie name
pub const SESSION_COOKIE_NAME: &str = "cc_session";

/// bcrypt ignores input beyond 72 bytes; truncate explicitly
const BCRYPT_MAX_BYTES: usize = 72;

/// Session policy configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Hard lifetime of a session in days
    pub absolute_days: i64,

    /// Idle timeout in minutes
    pub idle_minutes: i64,

    /// Set the Secure cookie flag (HTTPS-only deployments)
    pub secure_cookies: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());
        Self {
            absolute_days: env_i64("SESSION_ABSOLUTE_DAYS", 7),
            idle_minutes: env_i64("SESSION_IDLE_MINUTES", 60),
            secure_cookies: env == "prod",
        }
    }
}

fn env_i64(name: &str, default: i64) -> i64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl SessionConfig {
    /// Absolute expiry instant for a session created now
    #[must_use]
    pub fn absolute_expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + chrono::Duration::days(self.absolute_days)
    }

    /// Idle deadline given the session's last activity
    #[must_use]
    pub fn idle_deadline(&self, last_seen_at: DateTime<Utc>) -> DateTime<Utc> {
        last_seen_at + chrono::Duration::minutes(self.idle_minutes)
    }
}

/// Generate a fresh raw session token (32 bytes, URL-safe base64)
#[must_use]
pub fn new_raw_token() -> String {
    use base64::Engine;
    use rand::RngCore;

    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// SHA-256 hex digest of a raw token
#[must_use]
pub fn hash_token(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

/// Build the session cookie carrying a raw token
#[must_use]
pub fn session_cookie(raw_token: String, config: &SessionConfig) -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE_NAME, raw_token);
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_path("/");
    cookie.set_secure(config.secure_cookies);
    cookie.set_max_age(time::Duration::days(config.absolute_days));
    cookie
}

/// Cookie used to clear the session client-side
#[must_use]
pub fn expired_session_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE_NAME, "");
    cookie.set_path("/");
    cookie
}

/// Hash a password with bcrypt
///
/// # Errors
///
/// Returns an error if bcrypt fails internally.
pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(truncate_for_bcrypt(password), bcrypt::DEFAULT_COST)
}

/// Verify a password against a stored bcrypt hash
#[must_use]
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    bcrypt::verify(truncate_for_bcrypt(password), password_hash).unwrap_or(false)
}

fn truncate_for_bcrypt(password: &str) -> &[u8] {
    let bytes = password.as_bytes();
    &bytes[..bytes.len().min(BCRYPT_MAX_BYTES)]
}
