use crate::error::{AuthError, Result};
use secrecy::Secret;
use serde::Deserialize;

/// Largest clock-skew leeway accepted when checking token expiry, in seconds
pub const MAX_LEEWAY_SECS: i64 = 10;

/// Longest accepted challenge or session lifetime, in seconds
pub const MAX_TTL_SECS: i64 = 86_400;

/// What happens when enrollment finishes for a username that already has a key
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReenrollmentPolicy {
    /// Refuse with `DuplicateUser`, the existing record is left untouched
    #[default]
    Reject,
    /// Swap the whole record for the new key in one step
    Replace,
}

/// Which bytes the client signs
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageBinding {
    /// The 32 raw challenge bytes, as existing signers produce them
    #[default]
    ChallengeOnly,
    /// `domain || 0x00 || challenge`, so a signature cannot be replayed
    /// against a service with a different domain
    DomainBound,
}

/// Configuration for challenge issuance, verification and session tokens
///
/// Every field has a default, so an empty document deserializes into a
/// working configuration with a per-process random signing key.
///
/// # Security Note
/// When `token_secret` is set it should be at least 256 bits of random data,
/// base64 encoded. Leaving it unset means tokens issued before a restart can
/// no longer be verified, which is fine for short-lived challenges.
///
/// # Example
/// ```rust
/// use p256_challenge_auth::AuthConfig;
/// use secrecy::Secret;
/// use base64::prelude::*;
///
/// let config = AuthConfig {
///     token_secret: Some(Secret::new(BASE64_STANDARD.encode("your-256-bit-secret-key"))),
///     session_ttl: 600,
///     ..AuthConfig::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC key for challenge and session tokens, base64 encoded string
    ///
    /// `None` generates a fresh key when the service starts.
    pub token_secret: Option<Secret<String>>,
    /// Lifetime of a challenge token in seconds
    pub challenge_ttl: i64,
    /// Lifetime of a session credential in seconds
    pub session_ttl: i64,
    /// Tolerated clock skew on expiry checks in seconds, `0..=10`
    pub leeway: i64,
    /// Origin string handed to the remote signer
    pub domain: String,
    pub reenrollment: ReenrollmentPolicy,
    pub message_binding: MessageBinding,
    /// Reject a second successful use of the same challenge
    pub single_use_challenges: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_secret: None,
            challenge_ttl: 30,
            session_ttl: 3000,
            leeway: MAX_LEEWAY_SECS,
            domain: "example.com".to_string(),
            reenrollment: ReenrollmentPolicy::default(),
            message_binding: MessageBinding::default(),
            single_use_challenges: true,
        }
    }
}

impl AuthConfig {
    /// Check that the configured values are usable
    ///
    /// # Errors
    /// `MalformedInput` for a non-positive TTL, a leeway outside `0..=10`
    /// or an empty domain.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_TTL_SECS).contains(&self.challenge_ttl) {
            return Err(AuthError::MalformedInput(format!(
                "challenge_ttl must be between 1 and {MAX_TTL_SECS} seconds"
            )));
        }
        if !(1..=MAX_TTL_SECS).contains(&self.session_ttl) {
            return Err(AuthError::MalformedInput(format!(
                "session_ttl must be between 1 and {MAX_TTL_SECS} seconds"
            )));
        }
        if !(0..=MAX_LEEWAY_SECS).contains(&self.leeway) {
            return Err(AuthError::MalformedInput(format!(
                "leeway must be between 0 and {MAX_LEEWAY_SECS} seconds"
            )));
        }
        if self.domain.trim().is_empty() {
            return Err(AuthError::MalformedInput("domain must not be empty".to_string()));
        }
        Ok(())
    }
}
