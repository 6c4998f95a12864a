//! Node identity: an Ed25519 keypair and the address derived from it.

use std::fmt;

use zeroize::Zeroize;

use crate::address::Address;
use crate::crypto::{self, PublicKey, Signature, SECRET_KEY_SIZE};

/// The local node's cryptographic identity.
///
/// The overlay address is the wide hash of the public key, so proving
/// ownership of the key proves ownership of the address.
#[derive(Clone)]
pub struct NodeIdentity {
    secret: [u8; SECRET_KEY_SIZE],
    public: PublicKey,
    address: Address,
}

impl NodeIdentity {
    /// Generates a fresh identity.
    pub fn generate() -> Self {
        let (secret, _) = crypto::generate_keypair();
        Self::from_secret_bytes(secret)
    }

    /// Restores an identity from stored secret key bytes.
    pub fn from_secret_bytes(secret: [u8; SECRET_KEY_SIZE]) -> Self {
        let signing = ed25519_dalek::SigningKey::from_bytes(&secret);
        let public = PublicKey::new(signing.verifying_key().to_bytes());
        let address = Address::from_public_key(&public);
        Self {
            secret,
            public,
            address,
        }
    }

    /// Returns the overlay address of this identity.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Returns the public identity key.
    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    /// Signs a message with the identity key.
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature::new(crypto::sign(&self.secret, message))
    }
}

impl fmt::Debug for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeIdentity")
            .field("address", &self.address)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl Drop for NodeIdentity {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}
