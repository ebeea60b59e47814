use crate::{
    crypto::{
        ecdsa::{verify_signature, SignatureValue},
        jwt::{issue_claims, verify_claims, SessionClaims, TokenPurpose},
    },
    error::{AuthError, Result},
    flow::{rejection, ChallengeTicket, FlowContext},
    store::{validate_username, KeyRecordStore},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request for the second authentication step
///
/// There is deliberately no username field: the username travels only
/// inside the signed challenge token, so it cannot be swapped.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthenticationFinish {
    pub token: String,
    pub signature: SignatureValue,
}

/// Session credential issued after a successful authentication
///
/// The token is an opaque bearer credential with a fixed lifetime. There
/// is no revocation; it simply expires.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionCredential {
    pub session_id: Uuid,
    pub username: String,
    pub session_token: String,
    pub expires_at: i64,
}

/// Two-step authentication against an enrolled key
///
/// This flow is stateless between the two steps:
/// - `start` binds a fresh challenge to the claimed username inside a
///   signed token
/// - `finish` verifies the token, looks up the stored key for the bound
///   username and checks the signature against it
/// - a session credential is issued only when all of that succeeds
#[derive(Clone)]
pub struct AuthenticationFlow {
    ctx: FlowContext,
}

impl AuthenticationFlow {
    pub fn new(ctx: FlowContext) -> Self {
        Self { ctx }
    }

    /// Issue a challenge bound to `username`
    ///
    /// The store is not consulted. An unknown username gets a token like
    /// any other and fails in [`AuthenticationFlow::finish`].
    ///
    /// # Errors
    /// - `MalformedInput` - The username is empty, too long or has control characters
    /// - `JwtError` - The token could not be signed
    pub fn start(&self, username: &str) -> Result<ChallengeTicket> {
        validate_username(username)?;
        let ticket = self
            .ctx
            .issue_challenge(TokenPurpose::Auth, Some(username.to_string()))?;
        tracing::debug!(%username, expires_at = ticket.expires_at, "authentication challenge issued");
        Ok(ticket)
    }

    /// Verify the signed challenge and issue a session credential
    ///
    /// # Returns
    /// * `Ok(SessionCredential)` - Authentication succeeded
    /// * `Err(AuthError::AuthenticationRejected(reason))` - Token invalid or
    ///   expired, unknown user, bad signature or reused challenge
    /// * `Err(AuthError::StoreUnavailable)` - The store failed
    ///
    /// # Example
    /// ```rust
    /// use p256_challenge_auth::{AuthService, AuthConfig, AuthenticationFinish, MemoryKeyStore};
    /// use p256_challenge_auth::crypto::ecdsa::SignatureValue;
    /// use p256::ecdsa::{signature::Signer, Signature, SigningKey};
    /// use rand::rngs::OsRng;
    /// use std::sync::Arc;
    ///
    /// let service = AuthService::new(AuthConfig::default(), Arc::new(MemoryKeyStore::new())).unwrap();
    /// let ticket = service.authentication_start("nobody").unwrap();
    ///
    /// let key = SigningKey::random(&mut OsRng);
    /// let signature: Signature = key.sign(ticket.challenge().unwrap().as_bytes());
    /// let request = AuthenticationFinish {
    ///     token: ticket.token,
    ///     signature: SignatureValue::from(signature),
    /// };
    /// match service.authentication_finish(request) {
    ///     Ok(credential) => println!("JWT: {}", credential.session_token),
    ///     Err(e) => println!("Authentication failed: {}", e),
    /// }
    /// ```
    pub fn finish(
        &self,
        store: &dyn KeyRecordStore,
        request: AuthenticationFinish,
    ) -> Result<SessionCredential> {
        self.try_finish(store, request).map_err(|err| {
            tracing::warn!(error = %err, "authentication rejected");
            rejection(err, AuthError::AuthenticationRejected)
        })
    }

    fn try_finish(
        &self,
        store: &dyn KeyRecordStore,
        request: AuthenticationFinish,
    ) -> Result<SessionCredential> {
        let (claims, challenge) = self.ctx.open_challenge(&request.token, TokenPurpose::Auth)?;
        let username = claims.username.clone().ok_or(AuthError::TokenInvalid)?;

        let record = store.get(&username)?.ok_or_else(|| {
            tracing::debug!(%username, "no key enrolled");
            AuthError::UnknownUser
        })?;

        let message = self.ctx.signed_message(&challenge);
        verify_signature(&record.public_key, &message, &request.signature)?;
        self.ctx.consume(&claims, &challenge)?;

        let credential = self
            .ctx
            .commit(&challenge, || self.create_session(username, record.public_key.key_hash()))?;
        tracing::info!(
            username = %credential.username,
            session_id = %credential.session_id,
            "authenticated"
        );
        Ok(credential)
    }

    /// Create the session credential after verification succeeded
    fn create_session(&self, username: String, key_hash: String) -> Result<SessionCredential> {
        let claims = SessionClaims::new(
            username,
            key_hash,
            self.ctx.clock().timestamp(),
            self.ctx.config().session_ttl,
        );
        let session_token = issue_claims(self.ctx.key(), &claims)?;

        Ok(SessionCredential {
            session_id: claims.sub,
            username: claims.username,
            session_token,
            expires_at: claims.exp,
        })
    }

    /// Validate a session credential token
    ///
    /// Verifies that the token is signed with the service key and has not
    /// expired, then returns its claims.
    ///
    /// # Errors
    /// - `TokenInvalid` - Bad signature, wrong shape or not a session token
    /// - `TokenExpired` - Past `exp` plus the configured leeway
    pub fn validate_session(&self, token: &str) -> Result<SessionClaims> {
        verify_claims(
            self.ctx.key(),
            token,
            self.ctx.clock(),
            self.ctx.config().leeway,
        )
    }
}
