use crate::{
    auth::{AuthenticationFinish, AuthenticationFlow, SessionCredential},
    clock::{Clock, SystemClock},
    config::AuthConfig,
    crypto::jwt::{SessionClaims, TokenKey},
    enrollment::{EnrollmentFinish, EnrollmentFlow},
    error::Result,
    flow::{ChallengeTicket, FlowContext},
    replay::{ChallengeLedger, MemoryChallengeLedger},
    store::{KeyRecord, KeyRecordStore},
};
use std::sync::Arc;

/// Authentication service exposing the four protocol endpoints
///
/// This bundles the flows with the collaborators they share:
/// - the token signing key
/// - the clock
/// - the challenge ledger
/// - the key record store
///
/// Every member is a shared handle, so the service can sit behind an `Arc`
/// and serve concurrent requests.
pub struct AuthService {
    enrollment: EnrollmentFlow,
    authentication: AuthenticationFlow,
    store: Arc<dyn KeyRecordStore>,
}

impl AuthService {
    /// Create a service with the wall clock and an in-memory challenge ledger
    ///
    /// The signing key comes from `config.token_secret`, or is generated
    /// when none is configured.
    ///
    /// # Example
    /// ```rust
    /// use p256_challenge_auth::{AuthConfig, AuthService, MemoryKeyStore};
    /// use std::sync::Arc;
    ///
    /// let service = AuthService::new(AuthConfig::default(), Arc::new(MemoryKeyStore::new())).unwrap();
    /// let ticket = service.enrollment_start().unwrap();
    /// assert!(!ticket.token.is_empty());
    /// ```
    pub fn new(config: AuthConfig, store: Arc<dyn KeyRecordStore>) -> Result<Self> {
        let key = Arc::new(TokenKey::from_config(&config)?);
        Self::with_parts(
            config,
            key,
            Arc::new(SystemClock),
            store,
            Arc::new(MemoryChallengeLedger::new()),
        )
    }

    /// Create a service from explicit collaborators
    pub fn with_parts(
        config: AuthConfig,
        key: Arc<TokenKey>,
        clock: Arc<dyn Clock>,
        store: Arc<dyn KeyRecordStore>,
        ledger: Arc<dyn ChallengeLedger>,
    ) -> Result<Self> {
        let ctx = FlowContext::new(config, key, clock, ledger)?;
        Ok(Self {
            enrollment: EnrollmentFlow::new(ctx.clone()),
            authentication: AuthenticationFlow::new(ctx),
            store,
        })
    }

    pub fn enrollment_start(&self) -> Result<ChallengeTicket> {
        self.enrollment.start()
    }

    pub fn enrollment_finish(&self, request: EnrollmentFinish) -> Result<KeyRecord> {
        self.enrollment.finish(self.store.as_ref(), request)
    }

    pub fn authentication_start(&self, username: &str) -> Result<ChallengeTicket> {
        self.authentication.start(username)
    }

    pub fn authentication_finish(&self, request: AuthenticationFinish) -> Result<SessionCredential> {
        self.authentication.finish(self.store.as_ref(), request)
    }

    pub fn validate_session(&self, token: &str) -> Result<SessionClaims> {
        self.authentication.validate_session(token)
    }

    pub fn store(&self) -> &dyn KeyRecordStore {
        self.store.as_ref()
    }
}
