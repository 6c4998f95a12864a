//! Weft Core - Core types and primitives for the weft overlay network.
//!
//! This crate provides:
//! - 512-bit overlay addresses and the XOR distance metric
//! - Canonical wire encoding for deterministic serialization
//! - Cryptographic primitives (Ed25519 signatures, BLAKE3 wide hash)
//! - Node identity (keypair plus derived address)

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod address;
pub mod crypto;
pub mod encoding;
pub mod identity;

pub use address::{Address, Identity, ADDRESS_BITS, ADDRESS_BYTES};
pub use crypto::{
    sign, verify, wide_hash, PublicKey, Signature, SignatureError, PUBLIC_KEY_SIZE, SIGNATURE_SIZE,
};
pub use encoding::{DecodeError, WireDecode, WireEncode};
pub use identity::NodeIdentity;
