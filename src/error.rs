use std::fmt;

/// Caller-visible category of a rejected enrollment or authentication
///
/// This is the only detail a rejection exposes. The precise cause of a
/// cryptographic failure is logged, never returned, so that a client cannot
/// use the error as an oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The challenge token failed its integrity check or had the wrong shape
    TokenInvalid,
    /// The challenge token was authentic but past its expiry plus leeway
    TokenExpired,
    /// The signature did not verify against the challenge and public key
    SignatureInvalid,
    /// A submitted field had the wrong length or was out of range
    MalformedInput,
    /// No key is enrolled for the username bound in the token
    UnknownUser,
    /// The username is already enrolled and re-enrollment is rejected
    DuplicateUser,
    /// The challenge has already been consumed by a successful verification
    ChallengeReused,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            RejectReason::TokenInvalid => "token invalid",
            RejectReason::TokenExpired => "token expired",
            RejectReason::SignatureInvalid => "signature invalid",
            RejectReason::MalformedInput => "malformed input",
            RejectReason::UnknownUser => "unknown user",
            RejectReason::DuplicateUser => "duplicate user",
            RejectReason::ChallengeReused => "challenge reused",
        };
        f.write_str(reason)
    }
}

/// Authentication and cryptographic operation errors
///
/// The low-level variants (`TokenInvalid`, `SignatureInvalid`, ...) come out
/// of the building blocks in [`crate::crypto`], the store and the ledger. The
/// flows fold them into [`AuthError::EnrollmentRejected`] or
/// [`AuthError::AuthenticationRejected`] before they reach a caller.
///
/// # Example
/// ```rust
/// use p256_challenge_auth::{AuthError, RejectReason, Result};
///
/// fn handle_auth_result(result: Result<()>) {
///     match result {
///         Ok(()) => println!("Operation successful"),
///         Err(AuthError::AuthenticationRejected(RejectReason::TokenExpired)) => {
///             println!("Challenge expired, start again")
///         }
///         Err(e) => println!("Other error: {}", e),
///     }
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Signed token is invalid, malformed, or has the wrong signature
    ///
    /// This error occurs when:
    /// - The token is not a well-formed compact JWT
    /// - The HMAC does not match the process signing key
    /// - The claims do not fit the expected purpose
    #[error("Invalid or malformed token")]
    TokenInvalid,

    /// Token has expired
    ///
    /// Only reported for tokens whose signature checked out, when the
    /// current time is later than `exp + leeway`.
    #[error("Token has expired")]
    TokenExpired,

    /// ECDSA signature verification failed
    ///
    /// Covers a wrong key, a wrong message and a signature that does not
    /// belong to either. The reason is deliberately not distinguished.
    #[error("ECDSA signature verification failed")]
    SignatureInvalid,

    /// Input failed a structural check before any cryptography ran
    ///
    /// This error occurs when:
    /// - A byte field does not have the expected length
    /// - A signature scalar is zero or not below the curve order
    /// - A public key point is not on P-256 or is the identity
    /// - A username or configuration value is out of bounds
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// No key record exists for the username
    #[error("Unknown user")]
    UnknownUser,

    /// The username already has a key record
    #[error("User is already enrolled")]
    DuplicateUser,

    /// The challenge was already consumed by an earlier successful attempt
    #[error("Challenge has already been used")]
    ChallengeReused,

    /// The key record store could not serve the request
    #[error("Key store unavailable: {0}")]
    StoreUnavailable(String),

    /// The remote signer channel failed or returned an undecodable reply
    #[error("Signer transport failure: {0}")]
    TransportFailure(String),

    /// The remote signer answered with an explicit error message
    #[error("Signer rejected the request: {0}")]
    SignerRejected(String),

    /// Enrollment finish was refused
    #[error("Enrollment rejected: {0}")]
    EnrollmentRejected(RejectReason),

    /// Authentication finish was refused
    #[error("Authentication rejected: {0}")]
    AuthenticationRejected(RejectReason),

    /// Base64 decoding failed
    #[error("Base64 decode error: {0}")]
    Base64Error(String),

    /// JWT creation failed
    ///
    /// Only raised on the issuing side. Failures while verifying a token are
    /// always reported as [`AuthError::TokenInvalid`].
    #[error("JWT error: {0}")]
    JwtError(String),
}

impl AuthError {
    /// The rejection category of this error, if it is a rejection at all
    ///
    /// Infrastructure failures (`StoreUnavailable`, `TransportFailure`, ...)
    /// return `None`.
    pub fn reason(&self) -> Option<RejectReason> {
        match self {
            AuthError::TokenInvalid => Some(RejectReason::TokenInvalid),
            AuthError::TokenExpired => Some(RejectReason::TokenExpired),
            AuthError::SignatureInvalid => Some(RejectReason::SignatureInvalid),
            AuthError::MalformedInput(_) | AuthError::Base64Error(_) => {
                Some(RejectReason::MalformedInput)
            }
            AuthError::UnknownUser => Some(RejectReason::UnknownUser),
            AuthError::DuplicateUser => Some(RejectReason::DuplicateUser),
            AuthError::ChallengeReused => Some(RejectReason::ChallengeReused),
            AuthError::EnrollmentRejected(reason) | AuthError::AuthenticationRejected(reason) => {
                Some(*reason)
            }
            AuthError::StoreUnavailable(_)
            | AuthError::TransportFailure(_)
            | AuthError::SignerRejected(_)
            | AuthError::JwtError(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_for_rejections() {
        assert_eq!(
            AuthError::TokenExpired.reason(),
            Some(RejectReason::TokenExpired)
        );
        assert_eq!(
            AuthError::MalformedInput("short".to_string()).reason(),
            Some(RejectReason::MalformedInput)
        );
        assert_eq!(
            AuthError::EnrollmentRejected(RejectReason::DuplicateUser).reason(),
            Some(RejectReason::DuplicateUser)
        );
    }

    #[test]
    fn test_infrastructure_errors_have_no_reason() {
        assert_eq!(AuthError::StoreUnavailable("down".to_string()).reason(), None);
        assert_eq!(AuthError::TransportFailure("closed".to_string()).reason(), None);
    }

    #[test]
    fn test_rejection_display_is_generic() {
        let err = AuthError::AuthenticationRejected(RejectReason::SignatureInvalid);
        assert_eq!(err.to_string(), "Authentication rejected: signature invalid");
    }
}
