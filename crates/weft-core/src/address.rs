//! Overlay identifier types and the XOR distance metric.
//!
//! Every participant and every data item is named by a 512-bit
//! identifier. The XOR of two identifiers, read as an unsigned
//! big-endian integer, is the distance between them; the overlay
//! routes by moving monotonically closer under that metric.

use std::cmp::Ordering;
use std::fmt;

use bytes::{Bytes, BytesMut};

use crate::crypto::{wide_hash, PublicKey};
use crate::encoding::{DecodeError, WireDecode, WireEncode};

/// Identifier width in bytes.
pub const ADDRESS_BYTES: usize = 64;

/// Identifier width in bits.
pub const ADDRESS_BITS: usize = ADDRESS_BYTES * 8;

/// Macro to define a 512-bit identifier type with common implementations.
macro_rules! define_wide_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[serde_with::serde_as]
        #[derive(
            Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
            serde::Serialize, serde::Deserialize,
        )]
        pub struct $name(
            #[serde_as(as = "serde_with::Bytes")] pub [u8; ADDRESS_BYTES],
        );

        impl $name {
            /// Creates a new identifier from a 64-byte array.
            pub const fn new(bytes: [u8; ADDRESS_BYTES]) -> Self {
                Self(bytes)
            }

            /// Creates a zero identifier.
            pub const fn zero() -> Self {
                Self([0u8; ADDRESS_BYTES])
            }

            /// Returns the inner bytes.
            pub const fn as_bytes(&self) -> &[u8; ADDRESS_BYTES] {
                &self.0
            }

            /// Returns the inner bytes as a slice.
            pub fn as_slice(&self) -> &[u8] {
                &self.0
            }

            /// Creates from a hex string.
            pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
                let bytes = hex::decode(s)?;
                if bytes.len() != ADDRESS_BYTES {
                    return Err(hex::FromHexError::InvalidStringLength);
                }
                let mut arr = [0u8; ADDRESS_BYTES];
                arr.copy_from_slice(&bytes);
                Ok(Self(arr))
            }

            /// Returns as a hex string.
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Generates a random identifier.
            pub fn random() -> Self {
                use rand::RngCore;
                let mut bytes = [0u8; ADDRESS_BYTES];
                rand::thread_rng().fill_bytes(&mut bytes);
                Self(bytes)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::zero()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), &self.to_hex()[..16])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", &self.to_hex()[..16])
            }
        }

        impl From<[u8; ADDRESS_BYTES]> for $name {
            fn from(bytes: [u8; ADDRESS_BYTES]) -> Self {
                Self(bytes)
            }
        }

        impl From<$name> for [u8; ADDRESS_BYTES] {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl WireEncode for $name {
            fn encode(&self, buf: &mut BytesMut) {
                self.0.encode(buf);
            }
        }

        impl WireDecode for $name {
            fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
                Ok(Self(<[u8; ADDRESS_BYTES]>::decode(buf)?))
            }
        }
    };
}

define_wide_id!(
    /// Overlay address of a node, the wide hash of its identity key.
    ///
    /// Also used as the destination of routed messages.
    Address
);

define_wide_id!(
    /// Name of a data item in the overlay.
    ///
    /// Shares the address space with node ids so data can be routed to
    /// the group of nodes closest to its name.
    Identity
);

impl Address {
    /// Derives the address of a node from its public identity key.
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        Self(wide_hash(public_key.as_bytes()))
    }

    /// Returns the elementwise XOR of two addresses.
    pub fn xor_distance(&self, other: &Self) -> [u8; ADDRESS_BYTES] {
        let mut result = [0u8; ADDRESS_BYTES];
        for i in 0..ADDRESS_BYTES {
            result[i] = self.0[i] ^ other.0[i];
        }
        result
    }

    /// Counts the leading bits shared with `other`.
    ///
    /// Equals `ADDRESS_BITS` when the two addresses are identical.
    pub fn common_leading_bits(&self, other: &Self) -> u32 {
        let distance = self.xor_distance(other);
        let mut bits = 0u32;
        for byte in &distance {
            if *byte == 0 {
                bits += 8;
            } else {
                bits += byte.leading_zeros();
                break;
            }
        }
        bits
    }

    /// Returns the bucket index of `other` relative to this address.
    ///
    /// The index is the position of the most significant differing bit:
    /// 0 is the farthest half of the address space, `ADDRESS_BITS - 1`
    /// the nearest. `None` when the addresses are equal (a node has no
    /// bucket for itself).
    pub fn bucket_index(&self, other: &Self) -> Option<usize> {
        if self == other {
            return None;
        }
        Some(self.common_leading_bits(other) as usize)
    }

    /// Orders `a` against `b` by distance from this address.
    pub fn cmp_distance(&self, a: &Self, b: &Self) -> Ordering {
        self.xor_distance(a).cmp(&self.xor_distance(b))
    }

    /// Returns true if `a` is strictly closer to this address than `b`.
    pub fn closer(&self, a: &Self, b: &Self) -> bool {
        self.cmp_distance(a, b) == Ordering::Less
    }
}

impl From<Identity> for Address {
    fn from(name: Identity) -> Self {
        Self(name.0)
    }
}

impl From<Address> for Identity {
    fn from(address: Address) -> Self {
        Self(address.0)
    }
}
