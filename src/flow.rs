//! Pieces shared by the enrollment and authentication flows.

use crate::{
    clock::Clock,
    config::AuthConfig,
    crypto::{
        challenge::{canonical_message, Challenge},
        jwt::{issue_claims, verify_claims, ChallengeClaims, TokenKey, TokenPurpose},
    },
    error::{AuthError, RejectReason, Result},
    replay::ChallengeLedger,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What a flow's start step hands back to the client
///
/// `token` is the opaque challenge token to echo back on finish. The
/// challenge itself is inside it, readable by the client but not forgeable.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChallengeTicket {
    pub token: String,
    pub expires_at: i64,
}

impl ChallengeTicket {
    /// Read the challenge out of the token without verifying it
    ///
    /// This is what a client does to learn what to sign. It proves nothing
    /// about the token; only the issuing service can verify it.
    pub fn challenge(&self) -> Result<Challenge> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.set_required_spec_claims::<&str>(&[]);
        let claims = decode::<ChallengeClaims>(&self.token, &DecodingKey::from_secret(&[]), &validation)
            .map_err(|_| AuthError::TokenInvalid)?
            .claims;
        claims.challenge()
    }
}

/// Everything a flow needs besides the key store
///
/// Cheap to clone; all members are shared handles. The store is passed to
/// each finish call instead of living here.
#[derive(Clone)]
pub struct FlowContext {
    config: Arc<AuthConfig>,
    key: Arc<TokenKey>,
    clock: Arc<dyn Clock>,
    ledger: Arc<dyn ChallengeLedger>,
}

impl FlowContext {
    /// Assemble a context, validating the configuration first
    pub fn new(
        config: AuthConfig,
        key: Arc<TokenKey>,
        clock: Arc<dyn Clock>,
        ledger: Arc<dyn ChallengeLedger>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            key,
            clock,
            ledger,
        })
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn key(&self) -> &TokenKey {
        &self.key
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub(crate) fn issue_challenge(
        &self,
        purpose: TokenPurpose,
        username: Option<String>,
    ) -> Result<ChallengeTicket> {
        let challenge = Challenge::generate();
        let claims = ChallengeClaims::new(
            &challenge,
            purpose,
            username,
            self.clock.timestamp(),
            self.config.challenge_ttl,
        );
        let token = issue_claims(&self.key, &claims)?;
        Ok(ChallengeTicket {
            token,
            expires_at: claims.exp,
        })
    }

    /// Verify a challenge token and check it was issued for `purpose`
    pub(crate) fn open_challenge(
        &self,
        token: &str,
        purpose: TokenPurpose,
    ) -> Result<(ChallengeClaims, Challenge)> {
        let claims: ChallengeClaims =
            verify_claims(&self.key, token, self.clock.as_ref(), self.config.leeway)?;
        if claims.purpose != purpose {
            tracing::debug!(expected = ?purpose, actual = ?claims.purpose, "token purpose mismatch");
            return Err(AuthError::TokenInvalid);
        }
        // The claims are authenticated, so a bad challenge here means we issued it.
        let challenge = claims.challenge().map_err(|_| AuthError::TokenInvalid)?;
        Ok((claims, challenge))
    }

    /// The bytes the client was expected to sign for `challenge`
    pub(crate) fn signed_message(&self, challenge: &Challenge) -> Vec<u8> {
        canonical_message(challenge, self.config.message_binding, &self.config.domain)
    }

    /// Mark the challenge used, if single-use challenges are on
    pub(crate) fn consume(&self, claims: &ChallengeClaims, challenge: &Challenge) -> Result<()> {
        if !self.config.single_use_challenges {
            return Ok(());
        }
        let retain_until = claims.exp.saturating_add(self.config.leeway);
        if self
            .ledger
            .consume(challenge, retain_until, self.clock.timestamp())
        {
            Ok(())
        } else {
            Err(AuthError::ChallengeReused)
        }
    }

    /// Undo [`FlowContext::consume`] after an infrastructure failure
    pub(crate) fn release(&self, challenge: &Challenge) {
        if self.config.single_use_challenges {
            self.ledger.release(challenge);
            tracing::debug!("challenge released after infrastructure failure");
        }
    }

    /// Run the commit step of a flow, releasing the challenge if it fails
    /// for a reason other than a rejection
    pub(crate) fn commit<T>(&self, challenge: &Challenge, step: impl FnOnce() -> Result<T>) -> Result<T> {
        step().map_err(|err| {
            if err.reason().is_none() {
                self.release(challenge);
            }
            err
        })
    }
}

/// Fold a rejection-class error into the flow's rejection variant
///
/// Infrastructure errors pass through unchanged.
pub(crate) fn rejection(err: AuthError, wrap: fn(RejectReason) -> AuthError) -> AuthError {
    match err.reason() {
        Some(reason) => wrap(reason),
        None => err,
    }
}
