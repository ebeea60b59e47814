use super::wire::{self, SignRequest, SignerRequest, SignerResponse};
use crate::{
    crypto::ecdsa::{EcPoint, SignatureValue},
    error::{AuthError, Result},
};

/// One connection to a signing party.
///
/// `exchange` sends one encoded request and returns the encoded reply.
/// There is no timeout or retry here; callers bring their own.
pub trait SignerTransport {
    fn exchange(&mut self, request: &[u8]) -> Result<Vec<u8>>;
}

impl<T: SignerTransport + ?Sized> SignerTransport for &mut T {
    fn exchange(&mut self, request: &[u8]) -> Result<Vec<u8>> {
        (**self).exchange(request)
    }
}

/// A signature produced by a remote signer, already validated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedChallenge {
    pub signature: SignatureValue,
    /// Present when the request asked for the key
    pub public_key: Option<EcPoint>,
}

/// Client side of the signer protocol.
///
/// Single shot: [`RemoteSigner::sign`] consumes the signer, one request
/// and one reply per connection.
pub struct RemoteSigner<T> {
    transport: T,
}

impl<T: SignerTransport> RemoteSigner<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Ask the signer to sign `message` under the key scoped to `origin`.
    ///
    /// # Errors
    /// - `TransportFailure` - The exchange failed, the reply did not decode,
    ///   or a requested key was missing from the reply
    /// - `SignerRejected` - The signer replied with an error message
    /// - `MalformedInput` - The reply carried wrong-length or out-of-range values
    pub fn sign(mut self, origin: &str, message: &[u8], include_key: bool) -> Result<SignedChallenge> {
        let request = wire::encode(&SignerRequest::Sign(SignRequest {
            origin: origin.to_string(),
            data: message.to_vec(),
            include_key,
        }))?;

        let reply = self.transport.exchange(&request)?;
        let response = match wire::decode::<SignerResponse>(&reply)? {
            SignerResponse::Sign(response) => response,
            SignerResponse::Error(message) => {
                tracing::warn!(%origin, %message, "signer refused request");
                return Err(AuthError::SignerRejected(message));
            }
        };

        let signature = response.signature()?;
        let public_key = response.public_key()?;
        if include_key && public_key.is_none() {
            return Err(AuthError::TransportFailure(
                "signer reply is missing the requested public key".to_string(),
            ));
        }
        Ok(SignedChallenge {
            signature,
            public_key,
        })
    }
}
