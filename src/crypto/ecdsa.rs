use crate::error::{AuthError, Result};
use base64::prelude::*;
use p256::{
    ecdsa::{signature::Verifier, Signature, VerifyingKey},
    EncodedPoint, FieldBytes,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Length of one coordinate or one signature scalar in bytes
pub const COORDINATE_LEN: usize = 32;

/// A P-256 public key as raw affine coordinates
///
/// A value of this type always lies on the curve and is never the point at
/// infinity; every constructor checks this.
///
/// Over JSON it travels as `{"x": "<base64>", "y": "<base64>"}` and is
/// validated while deserializing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CoordinatesRepr", into = "CoordinatesRepr")]
pub struct EcPoint {
    x: [u8; COORDINATE_LEN],
    y: [u8; COORDINATE_LEN],
}

impl EcPoint {
    /// Build a point from big-endian coordinates
    ///
    /// # Errors
    /// `MalformedInput` if `(x, y)` is not a point on P-256.
    pub fn new(x: [u8; COORDINATE_LEN], y: [u8; COORDINATE_LEN]) -> Result<Self> {
        let point = Self { x, y };
        point.verifying_key()?;
        Ok(point)
    }

    /// Like [`EcPoint::new`] but also checks that both slices are 32 bytes
    pub fn from_slices(x: &[u8], y: &[u8]) -> Result<Self> {
        Self::new(fixed_field("x", x)?, fixed_field("y", y)?)
    }

    /// Parse a 65-byte uncompressed SEC1 encoding (`0x04 || x || y`)
    pub fn from_sec1_bytes(bytes: &[u8]) -> Result<Self> {
        let key = VerifyingKey::from_sec1_bytes(bytes)
            .map_err(|e| AuthError::MalformedInput(format!("Invalid SEC1 public key: {}", e)))?;
        Ok(Self::from_verifying_key(&key))
    }

    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        let encoded = key.to_encoded_point(false);
        let mut x = [0u8; COORDINATE_LEN];
        let mut y = [0u8; COORDINATE_LEN];
        // An uncompressed encoding of a valid key always carries both coordinates.
        if let (Some(ex), Some(ey)) = (encoded.x(), encoded.y()) {
            x.copy_from_slice(ex);
            y.copy_from_slice(ey);
        }
        Self { x, y }
    }

    pub fn x(&self) -> &[u8; COORDINATE_LEN] {
        &self.x
    }

    pub fn y(&self) -> &[u8; COORDINATE_LEN] {
        &self.y
    }

    /// Uncompressed SEC1 encoding, 65 bytes
    pub fn to_sec1_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(1 + 2 * COORDINATE_LEN);
        bytes.push(0x04);
        bytes.extend_from_slice(&self.x);
        bytes.extend_from_slice(&self.y);
        bytes
    }

    /// Hex SHA-256 of `x || y`, used to name a key in claims and logs
    pub fn key_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.x);
        hasher.update(self.y);
        hex::encode(hasher.finalize())
    }

    fn verifying_key(&self) -> Result<VerifyingKey> {
        let encoded = EncodedPoint::from_affine_coordinates(
            &FieldBytes::from(self.x),
            &FieldBytes::from(self.y),
            false,
        );
        VerifyingKey::from_encoded_point(&encoded)
            .map_err(|_| AuthError::MalformedInput("Public key is not a point on P-256".to_string()))
    }
}

/// The two ECDSA scalars `(r, s)`, each 32 bytes big-endian
///
/// Construction rejects a zero scalar or one that is not below the curve
/// order, so an out-of-range value never reaches the verifier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ScalarsRepr", into = "ScalarsRepr")]
pub struct SignatureValue {
    r: [u8; COORDINATE_LEN],
    s: [u8; COORDINATE_LEN],
}

impl SignatureValue {
    pub fn new(r: [u8; COORDINATE_LEN], s: [u8; COORDINATE_LEN]) -> Result<Self> {
        let value = Self { r, s };
        value.signature()?;
        Ok(value)
    }

    pub fn from_slices(r: &[u8], s: &[u8]) -> Result<Self> {
        Self::new(fixed_field("r", r)?, fixed_field("s", s)?)
    }

    pub fn r(&self) -> &[u8; COORDINATE_LEN] {
        &self.r
    }

    pub fn s(&self) -> &[u8; COORDINATE_LEN] {
        &self.s
    }

    /// Raw `r || s`, 64 bytes
    pub fn to_bytes(&self) -> [u8; 2 * COORDINATE_LEN] {
        let mut bytes = [0u8; 2 * COORDINATE_LEN];
        bytes[..COORDINATE_LEN].copy_from_slice(&self.r);
        bytes[COORDINATE_LEN..].copy_from_slice(&self.s);
        bytes
    }

    fn signature(&self) -> Result<Signature> {
        Signature::from_scalars(
            FieldBytes::from(self.r),
            FieldBytes::from(self.s),
        )
        .map_err(|_| {
            AuthError::MalformedInput("Signature scalar is zero or not below the curve order".to_string())
        })
    }
}

impl From<Signature> for SignatureValue {
    fn from(signature: Signature) -> Self {
        let (r_bytes, s_bytes) = signature.split_bytes();
        let mut r = [0u8; COORDINATE_LEN];
        let mut s = [0u8; COORDINATE_LEN];
        r.copy_from_slice(&r_bytes);
        s.copy_from_slice(&s_bytes);
        Self { r, s }
    }
}

/// Verify an ECDSA P-256 / SHA-256 signature over `message`
///
/// `message` is hashed with SHA-256 and checked against `(r, s)` and the
/// public point. Inputs are pre-validated by their types.
///
/// # Returns
/// * `Ok(())` if the signature is valid
/// * `Err(AuthError::SignatureInvalid)` for any failure, whatever the cause
///
/// # Example
/// ```rust
/// use p256::ecdsa::{signature::Signer, Signature, SigningKey};
/// use p256_challenge_auth::crypto::ecdsa::{verify_signature, EcPoint, SignatureValue};
/// use rand::rngs::OsRng;
///
/// let signing_key = SigningKey::random(&mut OsRng);
/// let public_key = EcPoint::from_verifying_key(signing_key.verifying_key());
/// let signature: Signature = signing_key.sign(b"random challenge bytes");
///
/// assert!(verify_signature(&public_key, b"random challenge bytes", &signature.into()).is_ok());
/// ```
pub fn verify_signature(public_key: &EcPoint, message: &[u8], signature: &SignatureValue) -> Result<()> {
    let verifying_key = public_key.verifying_key().map_err(|e| {
        tracing::debug!(error = %e, "public key rejected before verification");
        AuthError::SignatureInvalid
    })?;
    let signature = signature.signature().map_err(|e| {
        tracing::debug!(error = %e, "signature scalars rejected before verification");
        AuthError::SignatureInvalid
    })?;
    verifying_key.verify(message, &signature).map_err(|e| {
        tracing::debug!(error = %e, key_hash = %public_key.key_hash(), "ecdsa verification failed");
        AuthError::SignatureInvalid
    })
}

fn fixed_field(name: &str, bytes: &[u8]) -> Result<[u8; COORDINATE_LEN]> {
    bytes.try_into().map_err(|_| {
        AuthError::MalformedInput(format!(
            "{name} must be {COORDINATE_LEN} bytes, got {}",
            bytes.len()
        ))
    })
}

fn decode_field(name: &str, value: &str) -> Result<[u8; COORDINATE_LEN]> {
    let bytes = BASE64_STANDARD
        .decode(value)
        .map_err(|e| AuthError::Base64Error(format!("Invalid {name} encoding: {}", e)))?;
    fixed_field(name, &bytes)
}

#[derive(Serialize, Deserialize)]
struct CoordinatesRepr {
    x: String,
    y: String,
}

impl TryFrom<CoordinatesRepr> for EcPoint {
    type Error = AuthError;

    fn try_from(repr: CoordinatesRepr) -> Result<Self> {
        Self::new(decode_field("x", &repr.x)?, decode_field("y", &repr.y)?)
    }
}

impl From<EcPoint> for CoordinatesRepr {
    fn from(point: EcPoint) -> Self {
        Self {
            x: BASE64_STANDARD.encode(point.x),
            y: BASE64_STANDARD.encode(point.y),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct ScalarsRepr {
    r: String,
    s: String,
}

impl TryFrom<ScalarsRepr> for SignatureValue {
    type Error = AuthError;

    fn try_from(repr: ScalarsRepr) -> Result<Self> {
        Self::new(decode_field("r", &repr.r)?, decode_field("s", &repr.s)?)
    }
}

impl From<SignatureValue> for ScalarsRepr {
    fn from(value: SignatureValue) -> Self {
        Self {
            r: BASE64_STANDARD.encode(value.r),
            s: BASE64_STANDARD.encode(value.s),
        }
    }
}
