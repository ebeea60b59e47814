//! # p256-challenge-auth
//!
//! Challenge-response **enrollment and authentication** with P-256 ECDSA keys.
//! A client registers a public key under a username, then proves it still
//! holds the private key by signing a fresh server challenge.
//!
//! ## Features
//!
//! - **Stateless Challenges** - The challenge travels inside a signed, expiring
//!   JWT; the server keeps no per-request state
//! - **ECDSA P-256 / SHA-256 Verification** - Keys as raw `(x, y)` coordinates,
//!   signatures as raw `(r, s)` scalars, both range-checked before use
//! - **Explicit Collaborators** - Token key, clock, key store and replay ledger
//!   are injected, never global
//! - **Session Credentials** - Fixed-lifetime bearer JWTs after authentication
//! - **Remote Signer Protocol** - MessagePack client and an in-process signer
//!
//! ## Quick Start
//!
//! ```rust
//! use p256_challenge_auth::{
//!     AuthConfig, AuthService, AuthenticationFinish, EnrollmentFinish, MemoryKeyStore,
//!     signer::{RemoteSigner, SoftwareSigner},
//! };
//! use std::sync::Arc;
//!
//! let config = AuthConfig::default();
//! let domain = config.domain.clone();
//! let service = AuthService::new(config, Arc::new(MemoryKeyStore::new())).unwrap();
//! let mut signer = SoftwareSigner::new();
//!
//! // Enroll
//! let ticket = service.enrollment_start().unwrap();
//! let signed = RemoteSigner::new(&mut signer)
//!     .sign(&domain, ticket.challenge().unwrap().as_bytes(), true)
//!     .unwrap();
//! service
//!     .enrollment_finish(EnrollmentFinish {
//!         token: ticket.token,
//!         username: "alice".to_string(),
//!         signature: signed.signature,
//!         public_key: signed.public_key.unwrap(),
//!     })
//!     .unwrap();
//!
//! // Authenticate
//! let ticket = service.authentication_start("alice").unwrap();
//! let signed = RemoteSigner::new(&mut signer)
//!     .sign(&domain, ticket.challenge().unwrap().as_bytes(), false)
//!     .unwrap();
//! let credential = service
//!     .authentication_finish(AuthenticationFinish {
//!         token: ticket.token,
//!         signature: signed.signature,
//!     })
//!     .unwrap();
//! assert_eq!(credential.username, "alice");
//! ```
//!
//! ## Examples
//!
//! See the [basic_workflow example](demos/basic_workflow.rs) for a complete flow:
//!
//! ```bash
//! cargo run --example basic_workflow
//! ```

pub mod auth;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod enrollment;
pub mod error;
pub mod flow;
pub mod replay;
pub mod service;
pub mod signer;
pub mod store;

// Re-export main types for easier access
pub use auth::{AuthenticationFinish, AuthenticationFlow, SessionCredential};
pub use config::{AuthConfig, MessageBinding, ReenrollmentPolicy};
pub use crypto::challenge::Challenge;
pub use crypto::ecdsa::{verify_signature, EcPoint, SignatureValue};
pub use crypto::jwt::{ChallengeClaims, SessionClaims, TokenKey};
pub use enrollment::{EnrollmentFinish, EnrollmentFlow};
pub use error::{AuthError, RejectReason, Result};
pub use flow::{ChallengeTicket, FlowContext};
pub use replay::{ChallengeLedger, MemoryChallengeLedger};
pub use service::AuthService;
pub use store::{KeyRecord, KeyRecordStore, MemoryKeyStore};
