pub mod challenge;
pub mod ecdsa;
pub mod jwt;

// Re-export main functions for easier access
pub use challenge::{canonical_message, Challenge};
pub use ecdsa::{verify_signature, EcPoint, SignatureValue};
pub use jwt::{issue_claims, verify_claims, TokenKey};
