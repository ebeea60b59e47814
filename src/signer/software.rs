use super::{
    client::SignerTransport,
    wire::{self, SignRequest, SignResponse, SignerRequest, SignerResponse, WireEcPoint},
};
use crate::{
    crypto::ecdsa::{EcPoint, SignatureValue},
    error::Result,
};
use p256::ecdsa::{signature::Signer, Signature, SigningKey};
use rand::rngs::OsRng;
use std::collections::HashMap;

/// In-process signing party holding one P-256 key per origin.
///
/// Speaks the same msgpack protocol as an external signer, so it can stand
/// in for one anywhere a [`SignerTransport`] is expected. Keys are created
/// on first use of an origin and live as long as the signer.
#[derive(Default)]
pub struct SoftwareSigner {
    keys: HashMap<String, SigningKey>,
}

impl SoftwareSigner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `key` for `origin` instead of generating one.
    pub fn with_key(mut self, origin: &str, key: SigningKey) -> Self {
        self.keys.insert(origin.to_string(), key);
        self
    }

    /// Public key currently bound to `origin`, if any.
    pub fn public_key(&self, origin: &str) -> Option<EcPoint> {
        self.keys
            .get(origin)
            .map(|key| EcPoint::from_verifying_key(key.verifying_key()))
    }

    /// Answer one decoded request.
    pub fn handle(&mut self, request: SignerRequest) -> SignerResponse {
        match request {
            SignerRequest::Sign(sign) => self.sign(sign),
        }
    }

    fn sign(&mut self, request: SignRequest) -> SignerResponse {
        if !valid_origin(&request.origin) {
            tracing::error!(origin = %request.origin, "invalid origin");
            return SignerResponse::Error("sign origin must be ascii alphanumeric".to_string());
        }

        let key = self
            .keys
            .entry(request.origin.clone())
            .or_insert_with(|| {
                tracing::debug!(origin = %request.origin, "generated signing key");
                SigningKey::random(&mut OsRng)
            });
        let signature: Signature = key.sign(&request.data);

        let mut response = SignResponse::from(&SignatureValue::from(signature));
        if request.include_key {
            response.ec_point = Some(WireEcPoint::from(&EcPoint::from_verifying_key(
                key.verifying_key(),
            )));
        }
        SignerResponse::Sign(response)
    }
}

impl SignerTransport for SoftwareSigner {
    fn exchange(&mut self, request: &[u8]) -> Result<Vec<u8>> {
        let response = match wire::decode::<SignerRequest>(request) {
            Ok(request) => self.handle(request),
            Err(e) => SignerResponse::Error(e.to_string()),
        };
        wire::encode(&response)
    }
}

/// Origins are restricted to ASCII alphanumerics and dots.
fn valid_origin(origin: &str) -> bool {
    !origin.is_empty() && origin.chars().all(|c| c.is_ascii_alphanumeric() || c == '.')
}
