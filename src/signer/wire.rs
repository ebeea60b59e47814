//! MessagePack messages exchanged with a signing party.
//!
//! Layout, as deployed signers produce and expect it:
//!
//! | Message  | Encoding                                              |
//! |----------|-------------------------------------------------------|
//! | request  | `{"Sign": [origin, [u8, ...], include_key]}`          |
//! | response | `{"Sign": [[r...], [s...], [[x...], [y...]] \| nil]}` |
//! | failure  | `{"Error": "message"}`                                |
//!
//! Byte fields are msgpack arrays of integers, never `bin` blobs. Structs
//! are written positionally; decoding also accepts the map form.

use crate::{
    crypto::ecdsa::{EcPoint, SignatureValue},
    error::{AuthError, Result},
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignerRequest {
    Sign(SignRequest),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignRequest {
    /// Domain the key is scoped to on the signer side
    pub origin: String,
    /// Bytes to sign
    pub data: Vec<u8>,
    /// Ask the signer to send its public key back; passed through untouched
    pub include_key: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignerResponse {
    Sign(SignResponse),
    Error(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignResponse {
    pub sig_r: Vec<u8>,
    pub sig_s: Vec<u8>,
    pub ec_point: Option<WireEcPoint>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireEcPoint {
    pub x: Vec<u8>,
    pub y: Vec<u8>,
}

impl SignResponse {
    /// Validated signature scalars
    pub fn signature(&self) -> Result<SignatureValue> {
        SignatureValue::from_slices(&self.sig_r, &self.sig_s)
    }

    /// Validated public key, if the signer sent one
    pub fn public_key(&self) -> Result<Option<EcPoint>> {
        self.ec_point
            .as_ref()
            .map(|point| EcPoint::from_slices(&point.x, &point.y))
            .transpose()
    }
}

impl From<&EcPoint> for WireEcPoint {
    fn from(point: &EcPoint) -> Self {
        Self {
            x: point.x().to_vec(),
            y: point.y().to_vec(),
        }
    }
}

impl From<&SignatureValue> for SignResponse {
    fn from(signature: &SignatureValue) -> Self {
        Self {
            sig_r: signature.r().to_vec(),
            sig_s: signature.s().to_vec(),
            ec_point: None,
        }
    }
}

/// Encode a message in the positional msgpack form
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    rmp_serde::to_vec(message)
        .map_err(|e| AuthError::TransportFailure(format!("Failed to encode signer message: {}", e)))
}

/// Decode a msgpack message
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    rmp_serde::from_slice(bytes)
        .map_err(|e| AuthError::TransportFailure(format!("Failed to decode signer message: {}", e)))
}
