//! Cryptographic primitives.
//!
//! Consumed as pure functions by the rest of the workspace:
//! - Ed25519 signatures for peer authentication and signed envelopes
//! - BLAKE3 in extended-output mode for deriving 512-bit addresses

use std::fmt;

use bytes::{Bytes, BytesMut};
use ed25519_dalek::{Signer, Verifier};
use thiserror::Error;

use crate::encoding::{DecodeError, WireDecode, WireEncode};

/// Size of an Ed25519 public key in bytes.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Size of an Ed25519 secret key in bytes.
pub const SECRET_KEY_SIZE: usize = 32;

/// Size of an Ed25519 signature in bytes.
pub const SIGNATURE_SIZE: usize = 64;

/// Errors from signature operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// The public key bytes do not form a valid curve point
    #[error("invalid public key")]
    InvalidPublicKey,

    /// The signature does not verify against the key and message
    #[error("signature verification failed")]
    VerificationFailed,
}

/// Computes BLAKE3 in extended-output mode with a 64-byte digest.
///
/// Used to map identity keys into the 512-bit overlay address space.
pub fn wide_hash(data: &[u8]) -> [u8; 64] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(data);
    let mut output = [0u8; 64];
    hasher.finalize_xof().fill(&mut output);
    output
}

/// Generates a fresh Ed25519 keypair as `(secret, public)` bytes.
pub fn generate_keypair() -> ([u8; SECRET_KEY_SIZE], [u8; PUBLIC_KEY_SIZE]) {
    use rand::RngCore;
    let mut secret = [0u8; SECRET_KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut secret);
    let signing = ed25519_dalek::SigningKey::from_bytes(&secret);
    (secret, signing.verifying_key().to_bytes())
}

/// Signs a message with an Ed25519 secret key.
pub fn sign(secret: &[u8; SECRET_KEY_SIZE], message: &[u8]) -> [u8; SIGNATURE_SIZE] {
    let signing = ed25519_dalek::SigningKey::from_bytes(secret);
    signing.sign(message).to_bytes()
}

/// Verifies an Ed25519 signature.
pub fn verify(
    public: &[u8; PUBLIC_KEY_SIZE],
    message: &[u8],
    signature: &[u8; SIGNATURE_SIZE],
) -> Result<(), SignatureError> {
    let key = ed25519_dalek::VerifyingKey::from_bytes(public)
        .map_err(|_| SignatureError::InvalidPublicKey)?;
    let sig = ed25519_dalek::Signature::from_bytes(signature);
    key.verify(message, &sig)
        .map_err(|_| SignatureError::VerificationFailed)
}

/// A peer's public identity key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct PublicKey(pub [u8; PUBLIC_KEY_SIZE]);

impl PublicKey {
    /// Creates a public key from raw bytes.
    pub const fn new(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Returns the inner bytes.
    pub const fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }

    /// Verifies `signature` over `message` with this key.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), SignatureError> {
        verify(&self.0, message, &signature.0)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", &hex::encode(self.0)[..16])
    }
}

impl WireEncode for PublicKey {
    fn encode(&self, buf: &mut BytesMut) {
        self.0.encode(buf);
    }
}

impl WireDecode for PublicKey {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        Ok(Self(<[u8; PUBLIC_KEY_SIZE]>::decode(buf)?))
    }
}

/// A detached Ed25519 signature.
#[serde_with::serde_as]
#[derive(Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Signature(#[serde_as(as = "serde_with::Bytes")] pub [u8; SIGNATURE_SIZE]);

impl Signature {
    /// Creates a signature from raw bytes.
    pub const fn new(bytes: [u8; SIGNATURE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Returns the inner bytes.
    pub const fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.0
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", &hex::encode(self.0)[..16])
    }
}

impl WireEncode for Signature {
    fn encode(&self, buf: &mut BytesMut) {
        self.0.encode(buf);
    }
}

impl WireDecode for Signature {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        Ok(Self(<[u8; SIGNATURE_SIZE]>::decode(buf)?))
    }
}
