use crate::{
    crypto::{
        ecdsa::{verify_signature, EcPoint, SignatureValue},
        jwt::TokenPurpose,
    },
    error::{AuthError, Result},
    flow::{rejection, ChallengeTicket, FlowContext},
    store::{validate_username, KeyRecord, KeyRecordStore},
};
use serde::{Deserialize, Serialize};

/// Request for the second enrollment step
///
/// The public key is asserted by the client: it does not exist on the
/// server yet, and the signature over the challenge is what proves the
/// client holds the matching private key.
///
/// JSON form: `{"token", "username", "signature": {"r", "s"}, "publicKey": {"x", "y"}}`
/// with base64 byte fields.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentFinish {
    pub token: String,
    pub username: String,
    pub signature: SignatureValue,
    pub public_key: EcPoint,
}

/// Two-step enrollment: issue a challenge, then bind a verified key to a username
///
/// States: awaiting signature, then completed or rejected. Nothing is
/// written to the store unless every check passes.
#[derive(Clone)]
pub struct EnrollmentFlow {
    ctx: FlowContext,
}

impl EnrollmentFlow {
    pub fn new(ctx: FlowContext) -> Self {
        Self { ctx }
    }

    /// Issue an enrollment challenge token
    ///
    /// The token carries no username and the store is not touched; the
    /// username is only checked once a signature arrives.
    pub fn start(&self) -> Result<ChallengeTicket> {
        let ticket = self.ctx.issue_challenge(TokenPurpose::Enroll, None)?;
        tracing::debug!(expires_at = ticket.expires_at, "enrollment challenge issued");
        Ok(ticket)
    }

    /// Verify the signed challenge and store the asserted key
    ///
    /// # Returns
    /// * `Ok(KeyRecord)` - The record that was written
    /// * `Err(AuthError::EnrollmentRejected(reason))` - Token, signature,
    ///   input or policy check failed
    /// * `Err(AuthError::StoreUnavailable)` - The store failed
    pub fn finish(&self, store: &dyn KeyRecordStore, request: EnrollmentFinish) -> Result<KeyRecord> {
        let username = request.username.clone();
        self.try_finish(store, request).map_err(|err| {
            tracing::warn!(%username, error = %err, "enrollment rejected");
            rejection(err, AuthError::EnrollmentRejected)
        })
    }

    fn try_finish(&self, store: &dyn KeyRecordStore, request: EnrollmentFinish) -> Result<KeyRecord> {
        let (claims, challenge) = self.ctx.open_challenge(&request.token, TokenPurpose::Enroll)?;
        if claims.username.is_some() {
            return Err(AuthError::TokenInvalid);
        }
        validate_username(&request.username)?;

        let message = self.ctx.signed_message(&challenge);
        verify_signature(&request.public_key, &message, &request.signature)?;
        self.ctx.consume(&claims, &challenge)?;

        let record = KeyRecord {
            username: request.username,
            public_key: request.public_key,
        };
        // DuplicateUser keeps the challenge consumed; a store outage gives it back.
        self.ctx
            .commit(&challenge, || store.put(record.clone(), self.ctx.config().reenrollment))?;

        tracing::info!(
            username = %record.username,
            key_hash = %record.public_key.key_hash(),
            "key enrolled"
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::AuthenticationFlow,
        clock::ManualClock,
        config::{AuthConfig, MessageBinding, ReenrollmentPolicy},
        crypto::{challenge::canonical_message, jwt::TokenKey},
        error::RejectReason,
        replay::MemoryChallengeLedger,
        store::MemoryKeyStore,
    };
    use chrono::Duration;
    use p256::ecdsa::{signature::Signer, Signature, SigningKey};
    use rand::rngs::OsRng;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    const NOW: i64 = 1_700_000_000;

    fn context_with(config: AuthConfig) -> (FlowContext, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at(NOW));
        let ctx = FlowContext::new(
            config,
            Arc::new(TokenKey::generate()),
            clock.clone(),
            Arc::new(MemoryChallengeLedger::new()),
        )
        .unwrap();
        (ctx, clock)
    }

    fn flow_with(config: AuthConfig) -> (EnrollmentFlow, Arc<ManualClock>) {
        let (ctx, clock) = context_with(config);
        (EnrollmentFlow::new(ctx), clock)
    }

    fn flow() -> (EnrollmentFlow, Arc<ManualClock>) {
        flow_with(AuthConfig::default())
    }

    fn signed_request(
        ticket: &ChallengeTicket,
        username: &str,
        key: &SigningKey,
        message: &[u8],
    ) -> EnrollmentFinish {
        let signature: Signature = key.sign(message);
        EnrollmentFinish {
            token: ticket.token.clone(),
            username: username.to_string(),
            signature: signature.into(),
            public_key: EcPoint::from_verifying_key(key.verifying_key()),
        }
    }

    fn sign_ticket(ticket: &ChallengeTicket, username: &str, key: &SigningKey) -> EnrollmentFinish {
        let challenge = ticket.challenge().unwrap();
        signed_request(ticket, username, key, challenge.as_bytes())
    }

    #[test]
    fn test_enroll_stores_key() {
        let (flow, _) = flow();
        let store = MemoryKeyStore::new();
        let key = SigningKey::random(&mut OsRng);

        let ticket = flow.start().unwrap();
        let record = flow.finish(&store, sign_ticket(&ticket, "alice", &key)).unwrap();

        assert_eq!(record.username, "alice");
        assert_eq!(store.get("alice").unwrap(), Some(record));
    }

    #[test]
    fn test_signature_over_other_challenge_is_rejected() {
        let (flow, _) = flow();
        let store = MemoryKeyStore::new();
        let key = SigningKey::random(&mut OsRng);

        let ticket = flow.start().unwrap();
        let request = signed_request(&ticket, "alice", &key, &[0u8; 32]);

        let result = flow.finish(&store, request);
        assert!(matches!(
            result,
            Err(AuthError::EnrollmentRejected(RejectReason::SignatureInvalid))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_key_mismatch_is_rejected() {
        let (flow, _) = flow();
        let store = MemoryKeyStore::new();
        let signer = SigningKey::random(&mut OsRng);
        let other = SigningKey::random(&mut OsRng);

        let ticket = flow.start().unwrap();
        let mut request = sign_ticket(&ticket, "alice", &signer);
        request.public_key = EcPoint::from_verifying_key(other.verifying_key());

        let result = flow.finish(&store, request);
        assert!(matches!(
            result,
            Err(AuthError::EnrollmentRejected(RejectReason::SignatureInvalid))
        ));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let (flow, clock) = flow();
        let store = MemoryKeyStore::new();
        let key = SigningKey::random(&mut OsRng);

        let ticket = flow.start().unwrap();
        clock.advance(Duration::seconds(30 + 10 + 1));

        let result = flow.finish(&store, sign_ticket(&ticket, "alice", &key));
        assert!(matches!(
            result,
            Err(AuthError::EnrollmentRejected(RejectReason::TokenExpired))
        ));
    }

    #[test]
    fn test_duplicate_user_is_rejected_by_default() {
        let (flow, _) = flow();
        let store = MemoryKeyStore::new();
        let first = SigningKey::random(&mut OsRng);
        let second = SigningKey::random(&mut OsRng);

        let ticket = flow.start().unwrap();
        let original = flow.finish(&store, sign_ticket(&ticket, "alice", &first)).unwrap();

        let ticket = flow.start().unwrap();
        let result = flow.finish(&store, sign_ticket(&ticket, "alice", &second));
        assert!(matches!(
            result,
            Err(AuthError::EnrollmentRejected(RejectReason::DuplicateUser))
        ));
        assert_eq!(store.get("alice").unwrap(), Some(original));
    }

    #[test]
    fn test_replace_policy_rebinds_key() {
        let (flow, _) = flow_with(AuthConfig {
            reenrollment: ReenrollmentPolicy::Replace,
            ..AuthConfig::default()
        });
        let store = MemoryKeyStore::new();

        let ticket = flow.start().unwrap();
        flow.finish(&store, sign_ticket(&ticket, "alice", &SigningKey::random(&mut OsRng)))
            .unwrap();

        let ticket = flow.start().unwrap();
        let replacement = flow
            .finish(&store, sign_ticket(&ticket, "alice", &SigningKey::random(&mut OsRng)))
            .unwrap();
        assert_eq!(store.get("alice").unwrap(), Some(replacement));
    }

    #[test]
    fn test_reused_challenge_is_rejected() {
        let (flow, _) = flow();
        let store = MemoryKeyStore::new();
        let key = SigningKey::random(&mut OsRng);

        let ticket = flow.start().unwrap();
        let request = sign_ticket(&ticket, "alice", &key);
        flow.finish(&store, request.clone()).unwrap();

        let mut replay = request;
        replay.username = "mallory".to_string();
        let result = flow.finish(&store, replay);
        assert!(matches!(
            result,
            Err(AuthError::EnrollmentRejected(RejectReason::ChallengeReused))
        ));
        assert_eq!(store.get("mallory").unwrap(), None);
    }

    /// Store whose first `outages` writes fail as if the backend were down
    struct FlakyStore {
        inner: MemoryKeyStore,
        outages: AtomicUsize,
    }

    impl FlakyStore {
        fn failing(outages: usize) -> Self {
            Self {
                inner: MemoryKeyStore::new(),
                outages: AtomicUsize::new(outages),
            }
        }
    }

    impl KeyRecordStore for FlakyStore {
        fn get(&self, username: &str) -> Result<Option<KeyRecord>> {
            self.inner.get(username)
        }

        fn put(&self, record: KeyRecord, policy: ReenrollmentPolicy) -> Result<()> {
            let down = self
                .outages
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if down {
                return Err(AuthError::StoreUnavailable("down".to_string()));
            }
            self.inner.put(record, policy)
        }

        fn remove(&self, username: &str) -> Result<bool> {
            self.inner.remove(username)
        }
    }

    #[test]
    fn test_store_outage_is_not_a_rejection() {
        let (flow, _) = flow();
        let store = FlakyStore::failing(usize::MAX);
        let key = SigningKey::random(&mut OsRng);

        let ticket = flow.start().unwrap();
        let result = flow.finish(&store, sign_ticket(&ticket, "alice", &key));
        assert!(matches!(result, Err(AuthError::StoreUnavailable(_))));
        assert!(store.inner.is_empty());
    }

    #[test]
    fn test_retry_after_store_outage_succeeds() {
        let (flow, _) = flow();
        let store = FlakyStore::failing(1);
        let key = SigningKey::random(&mut OsRng);

        let ticket = flow.start().unwrap();
        let request = sign_ticket(&ticket, "alice", &key);
        let result = flow.finish(&store, request.clone());
        assert!(matches!(result, Err(AuthError::StoreUnavailable(_))));

        let record = flow.finish(&store, request.clone()).unwrap();
        assert_eq!(store.get("alice").unwrap(), Some(record));

        // Once committed the challenge stays spent.
        let result = flow.finish(&store, request);
        assert!(matches!(
            result,
            Err(AuthError::EnrollmentRejected(RejectReason::ChallengeReused))
        ));
    }

    #[test]
    fn test_duplicate_user_keeps_challenge_spent() {
        let (flow, _) = flow();
        let store = MemoryKeyStore::new();
        let ticket = flow.start().unwrap();
        flow.finish(&store, sign_ticket(&ticket, "alice", &SigningKey::random(&mut OsRng)))
            .unwrap();

        let ticket = flow.start().unwrap();
        let request = sign_ticket(&ticket, "alice", &SigningKey::random(&mut OsRng));
        let result = flow.finish(&store, request.clone());
        assert!(matches!(
            result,
            Err(AuthError::EnrollmentRejected(RejectReason::DuplicateUser))
        ));

        let mut retry = request;
        retry.username = "bob".to_string();
        let result = flow.finish(&store, retry);
        assert!(matches!(
            result,
            Err(AuthError::EnrollmentRejected(RejectReason::ChallengeReused))
        ));
    }

    #[test]
    fn test_authentication_token_cannot_enroll() {
        let (ctx, _) = context_with(AuthConfig::default());
        let enrollment = EnrollmentFlow::new(ctx.clone());
        let authentication = AuthenticationFlow::new(ctx);
        let store = MemoryKeyStore::new();
        let key = SigningKey::random(&mut OsRng);

        let ticket = authentication.start("alice").unwrap();
        let result = enrollment.finish(&store, sign_ticket(&ticket, "alice", &key));
        assert!(matches!(
            result,
            Err(AuthError::EnrollmentRejected(RejectReason::TokenInvalid))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_bad_username_is_malformed() {
        let (flow, _) = flow();
        let store = MemoryKeyStore::new();
        let key = SigningKey::random(&mut OsRng);

        let ticket = flow.start().unwrap();
        let result = flow.finish(&store, sign_ticket(&ticket, "", &key));
        assert!(matches!(
            result,
            Err(AuthError::EnrollmentRejected(RejectReason::MalformedInput))
        ));
    }

    #[test]
    fn test_domain_bound_message() {
        let (flow, _) = flow_with(AuthConfig {
            message_binding: MessageBinding::DomainBound,
            domain: "bank.example".to_string(),
            ..AuthConfig::default()
        });
        let store = MemoryKeyStore::new();
        let key = SigningKey::random(&mut OsRng);

        // Raw challenge signatures no longer pass.
        let ticket = flow.start().unwrap();
        let result = flow.finish(&store, sign_ticket(&ticket, "alice", &key));
        assert!(matches!(
            result,
            Err(AuthError::EnrollmentRejected(RejectReason::SignatureInvalid))
        ));

        let ticket = flow.start().unwrap();
        let challenge = ticket.challenge().unwrap();
        let message = canonical_message(&challenge, MessageBinding::DomainBound, "bank.example");
        let request = signed_request(&ticket, "alice", &key, &message);
        assert!(flow.finish(&store, request).is_ok());
    }

    #[test]
    fn test_request_json_shape() {
        let (flow, _) = flow();
        let key = SigningKey::random(&mut OsRng);
        let ticket = flow.start().unwrap();
        let request = sign_ticket(&ticket, "alice", &key);

        let json = serde_json::to_value(&request).unwrap();
        assert!(json["publicKey"]["x"].is_string());
        assert!(json["signature"]["r"].is_string());

        let parsed: EnrollmentFinish = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.public_key, request.public_key);
        assert_eq!(parsed.signature, request.signature);
    }
}
