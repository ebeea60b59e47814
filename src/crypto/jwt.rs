use crate::{
    clock::Clock,
    config::AuthConfig,
    crypto::challenge::Challenge,
    error::{AuthError, Result},
};
use base64::prelude::*;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, Secret};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Size of a generated HMAC key in bytes
const GENERATED_KEY_LEN: usize = 64;

/// Symmetric key that signs and verifies every token the service issues
///
/// Read-only once built, so one `Arc<TokenKey>` can be shared across
/// threads. A key built by [`TokenKey::generate`] lives only in memory:
/// tokens it signed cannot be verified by any other key, which is what a
/// process restart looks like.
pub struct TokenKey {
    secret: Secret<Vec<u8>>,
}

impl fmt::Debug for TokenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TokenKey(..)")
    }
}

impl TokenKey {
    /// Fresh random key from the OS RNG
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; GENERATED_KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self {
            secret: Secret::new(bytes),
        }
    }

    /// Key from a base64 encoded secret
    ///
    /// # Errors
    /// `Base64Error` if the secret does not decode, `MalformedInput` if it
    /// decodes to nothing.
    pub fn from_base64(secret: &Secret<String>) -> Result<Self> {
        let bytes = BASE64_STANDARD
            .decode(secret.expose_secret())
            .map_err(|e| AuthError::Base64Error(format!("Failed to decode token secret: {}", e)))?;
        if bytes.is_empty() {
            return Err(AuthError::MalformedInput("token secret is empty".to_string()));
        }
        Ok(Self {
            secret: Secret::new(bytes),
        })
    }

    /// The configured secret if there is one, otherwise a generated key
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        match &config.token_secret {
            Some(secret) => Self::from_base64(secret),
            None => Ok(Self::generate()),
        }
    }

    fn bytes(&self) -> &[u8] {
        self.secret.expose_secret()
    }
}

/// Claims that carry an expiry timestamp
pub trait Expiring {
    /// Unix timestamp after which the claims are expired, before leeway
    fn expires_at(&self) -> i64;
}

/// Sign any claim set into a compact HS256 token
///
/// # Errors
/// `JwtError` if the claims cannot be serialized.
pub fn issue_claims<C: Serialize>(key: &TokenKey, claims: &C) -> Result<String> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(key.bytes()),
    )
    .map_err(|e| AuthError::JwtError(format!("Failed to create JWT: {}", e)))
}

/// Check a token's integrity and expiry and return its claims
///
/// The HMAC is verified before the payload is decoded. Expiry is checked
/// afterwards against `clock`, accepting `now <= exp + leeway_secs`.
///
/// # Returns
/// * `Ok(C)` - Authentic, unexpired claims
/// * `Err(AuthError::TokenInvalid)` - Bad signature, bad shape, wrong claims
/// * `Err(AuthError::TokenExpired)` - Authentic but expired
pub fn verify_claims<C>(key: &TokenKey, token: &str, clock: &dyn Clock, leeway_secs: i64) -> Result<C>
where
    C: DeserializeOwned + Expiring,
{
    if token.trim().is_empty() {
        return Err(AuthError::TokenInvalid);
    }

    let mut validation = Validation::new(Algorithm::HS256);
    // Expiry is checked below against the injected clock.
    validation.validate_exp = false;
    validation.leeway = 0;
    validation.set_required_spec_claims(&["exp"]);

    let claims = decode::<C>(token, &DecodingKey::from_secret(key.bytes()), &validation)
        .map_err(|e| {
            tracing::debug!(error = %e, "token rejected");
            AuthError::TokenInvalid
        })?
        .claims;

    let now = clock.timestamp();
    if now > claims.expires_at().saturating_add(leeway_secs) {
        tracing::debug!(now, exp = claims.expires_at(), "token expired");
        return Err(AuthError::TokenExpired);
    }
    Ok(claims)
}

/// Which flow a challenge token was issued for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    Enroll,
    Auth,
}

/// Claims of a challenge token
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ChallengeClaims {
    /// Base64 of the 32 challenge bytes
    pub chal: String,
    /// Expiration timestamp (Unix timestamp)
    pub exp: i64,
    /// Issued at timestamp (Unix timestamp)
    pub iat: i64,
    pub purpose: TokenPurpose,
    /// Username the challenge is bound to; only authentication tokens carry one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl ChallengeClaims {
    pub fn new(
        challenge: &Challenge,
        purpose: TokenPurpose,
        username: Option<String>,
        now: i64,
        ttl_secs: i64,
    ) -> Self {
        Self {
            chal: challenge.to_base64(),
            exp: now.saturating_add(ttl_secs),
            iat: now,
            purpose,
            username,
        }
    }

    /// Decode the embedded challenge
    pub fn challenge(&self) -> Result<Challenge> {
        Challenge::from_base64(&self.chal)
    }
}

impl Expiring for ChallengeClaims {
    fn expires_at(&self) -> i64 {
        self.exp
    }
}

/// Claims of a session credential
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SessionClaims {
    /// Session identifier
    pub sub: Uuid,
    pub username: String,
    /// Hex SHA-256 of the public key that authenticated the session
    pub key_hash: String,
    /// Expiration timestamp (Unix timestamp)
    pub exp: i64,
    /// Issued at timestamp (Unix timestamp)
    pub iat: i64,
}

impl SessionClaims {
    pub fn new(username: String, key_hash: String, now: i64, ttl_secs: i64) -> Self {
        Self {
            sub: Uuid::new_v4(),
            username,
            key_hash,
            exp: now.saturating_add(ttl_secs),
            iat: now,
        }
    }
}

impl Expiring for SessionClaims {
    fn expires_at(&self) -> i64 {
        self.exp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Duration;

    const NOW: i64 = 1_700_000_000;

    fn challenge_token(key: &TokenKey, username: Option<&str>, ttl: i64) -> (String, Challenge) {
        let challenge = Challenge::generate();
        let claims = ChallengeClaims::new(
            &challenge,
            TokenPurpose::Auth,
            username.map(str::to_string),
            NOW,
            ttl,
        );
        (issue_claims(key, &claims).unwrap(), challenge)
    }

    #[test]
    fn test_issue_verify_round_trip() {
        let key = TokenKey::generate();
        let clock = ManualClock::at(NOW);
        let (token, challenge) = challenge_token(&key, Some("alice"), 30);

        let claims: ChallengeClaims = verify_claims(&key, &token, &clock, 10).unwrap();
        assert_eq!(claims.challenge().unwrap(), challenge);
        assert_eq!(claims.username.as_deref(), Some("alice"));
        assert_eq!(claims.exp, NOW + 30);
    }

    #[test]
    fn test_wrong_key_is_invalid() {
        let key = TokenKey::generate();
        let restarted = TokenKey::generate();
        let clock = ManualClock::at(NOW);
        let (token, _) = challenge_token(&key, None, 30);

        let result = verify_claims::<ChallengeClaims>(&restarted, &token, &clock, 10);
        assert!(matches!(result, Err(AuthError::TokenInvalid)));
    }

    #[test]
    fn test_leeway_boundary() {
        let key = TokenKey::generate();
        let clock = ManualClock::at(NOW);
        let (token, _) = challenge_token(&key, None, 30);

        clock.advance(Duration::seconds(30 + 10));
        assert!(verify_claims::<ChallengeClaims>(&key, &token, &clock, 10).is_ok());

        clock.advance(Duration::seconds(1));
        let result = verify_claims::<ChallengeClaims>(&key, &token, &clock, 10);
        assert!(matches!(result, Err(AuthError::TokenExpired)));
    }

    #[test]
    fn test_expired_token_with_bad_signature_is_invalid() {
        let key = TokenKey::generate();
        let clock = ManualClock::at(NOW + 3600);
        let (token, _) = challenge_token(&key, None, 30);

        let result = verify_claims::<ChallengeClaims>(&TokenKey::generate(), &token, &clock, 10);
        assert!(matches!(result, Err(AuthError::TokenInvalid)));
    }

    #[test]
    fn test_bit_flips_never_decode() {
        let key = TokenKey::generate();
        let clock = ManualClock::at(NOW);
        let (token, _) = challenge_token(&key, Some("alice"), 30);
        let bytes = token.as_bytes();

        for index in 0..bytes.len() {
            for bit in 0..7 {
                let mut flipped = bytes.to_vec();
                flipped[index] ^= 1 << bit;
                let Ok(flipped) = String::from_utf8(flipped) else {
                    continue;
                };
                let result = verify_claims::<ChallengeClaims>(&key, &flipped, &clock, 10);
                assert!(
                    matches!(result, Err(AuthError::TokenInvalid)),
                    "flip of bit {bit} at byte {index} was not rejected"
                );
            }
        }
    }

    #[test]
    fn test_session_token_is_not_a_challenge_token() {
        let key = TokenKey::generate();
        let clock = ManualClock::at(NOW);
        let claims = SessionClaims::new("alice".to_string(), "00".repeat(32), NOW, 300);
        let token = issue_claims(&key, &claims).unwrap();

        let result = verify_claims::<ChallengeClaims>(&key, &token, &clock, 10);
        assert!(matches!(result, Err(AuthError::TokenInvalid)));

        let session: SessionClaims = verify_claims(&key, &token, &clock, 10).unwrap();
        assert_eq!(session.username, "alice");
    }

    #[test]
    fn test_key_from_base64() {
        let secret = Secret::new(BASE64_STANDARD.encode("test-secret-key"));
        assert!(TokenKey::from_base64(&secret).is_ok());

        let bad = Secret::new("not base64!".to_string());
        assert!(matches!(TokenKey::from_base64(&bad), Err(AuthError::Base64Error(_))));
    }

    #[test]
    fn test_configured_keys_agree() {
        let config = AuthConfig {
            token_secret: Some(Secret::new(BASE64_STANDARD.encode("shared-secret"))),
            ..AuthConfig::default()
        };
        let clock = ManualClock::at(NOW);
        let first = TokenKey::from_config(&config).unwrap();
        let second = TokenKey::from_config(&config).unwrap();
        let (token, _) = challenge_token(&first, None, 30);

        assert!(verify_claims::<ChallengeClaims>(&second, &token, &clock, 10).is_ok());
    }

    #[test]
    fn test_key_debug_is_redacted() {
        let key = TokenKey::from_base64(&Secret::new(BASE64_STANDARD.encode("hunter2"))).unwrap();
        assert_eq!(format!("{key:?}"), "TokenKey(..)");
    }

    #[test]
    fn test_huge_ttl_saturates() {
        let claims = ChallengeClaims::new(&Challenge::generate(), TokenPurpose::Enroll, None, NOW, i64::MAX);
        assert_eq!(claims.exp, i64::MAX);

        let session = SessionClaims::new("alice".to_string(), "00".repeat(32), NOW, i64::MAX);
        assert_eq!(session.exp, i64::MAX);
    }
}
