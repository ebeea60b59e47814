use crate::{
    config::MessageBinding,
    error::{AuthError, Result},
};
use base64::prelude::*;
use rand::{rngs::OsRng, RngCore};
use std::fmt;

/// Length of a challenge in bytes
pub const CHALLENGE_LEN: usize = 32;

/// A random nonce the key holder is asked to sign
///
/// Generated fresh per issuance, carried inside a challenge token, and
/// never stored on its own.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Challenge([u8; CHALLENGE_LEN]);

impl Challenge {
    /// Generate a cryptographically secure random challenge
    ///
    /// # Example
    /// ```rust
    /// use p256_challenge_auth::crypto::challenge::Challenge;
    ///
    /// let challenge = Challenge::generate();
    /// assert_eq!(challenge.as_bytes().len(), 32);
    /// ```
    pub fn generate() -> Self {
        let mut bytes = [0u8; CHALLENGE_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; CHALLENGE_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; CHALLENGE_LEN] {
        &self.0
    }

    /// Standard base64 with padding, the form carried in the `chal` claim
    pub fn to_base64(&self) -> String {
        BASE64_STANDARD.encode(self.0)
    }

    /// Decode a base64 challenge string back into a challenge
    ///
    /// # Returns
    /// * `Ok(Challenge)` - Exactly 32 decoded bytes
    /// * `Err(AuthError::Base64Error)` - Input is not valid base64
    /// * `Err(AuthError::MalformedInput)` - Decoded length is not 32
    ///
    /// # Example
    /// ```rust
    /// use p256_challenge_auth::crypto::challenge::Challenge;
    ///
    /// let challenge = Challenge::generate();
    /// let decoded = Challenge::from_base64(&challenge.to_base64()).unwrap();
    /// assert_eq!(decoded, challenge);
    /// ```
    pub fn from_base64(challenge_b64: &str) -> Result<Self> {
        let bytes = BASE64_STANDARD
            .decode(challenge_b64)
            .map_err(|e| AuthError::Base64Error(format!("Failed to decode challenge: {}", e)))?;
        let bytes: [u8; CHALLENGE_LEN] = bytes.try_into().map_err(|v: Vec<u8>| {
            AuthError::MalformedInput(format!(
                "challenge must be {CHALLENGE_LEN} bytes, got {}",
                v.len()
            ))
        })?;
        Ok(Self(bytes))
    }
}

// Keep challenge bytes out of logs.
impl fmt::Debug for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Challenge(..)")
    }
}

/// Build the exact bytes the client signs
///
/// With [`MessageBinding::ChallengeOnly`] this is the raw challenge, which is
/// what deployed signers sign today. [`MessageBinding::DomainBound`] prefixes
/// the domain and a zero separator: `domain || 0x00 || challenge`.
pub fn canonical_message(challenge: &Challenge, binding: MessageBinding, domain: &str) -> Vec<u8> {
    match binding {
        MessageBinding::ChallengeOnly => challenge.as_bytes().to_vec(),
        MessageBinding::DomainBound => {
            let mut message = Vec::with_capacity(domain.len() + 1 + CHALLENGE_LEN);
            message.extend_from_slice(domain.as_bytes());
            message.push(0x00);
            message.extend_from_slice(challenge.as_bytes());
            message
        }
    }
}
