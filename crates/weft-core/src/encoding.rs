//! Canonical wire encoding.
//!
//! Everything that crosses the wire or is hashed/signed uses this codec
//! so that byte representations are deterministic:
//!
//! - **Integers**: little-endian
//! - **Fixed arrays**: elements back to back, no length prefix
//! - **Variable sequences**: u32 length prefix followed by elements
//! - **Strings**: u32 byte length followed by UTF-8 bytes
//! - **Options**: 0x00 for None, 0x01 + value for Some
//! - **Structs**: fields in declaration order, no padding
//! - **Enums**: u32 tag, then payload fields
//!
//! Decoding is fail-closed: every malformed input surfaces as a
//! [`DecodeError`], never a panic.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Errors during wire decoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Not enough bytes to decode
    #[error("insufficient bytes: expected {expected}, got {available}")]
    InsufficientBytes {
        /// Expected number of bytes
        expected: usize,
        /// Actually available bytes
        available: usize,
    },

    /// Invalid UTF-8 string
    #[error("invalid UTF-8 string: {0}")]
    InvalidUtf8(String),

    /// Invalid enum tag
    #[error("invalid enum tag: {0}")]
    InvalidEnumTag(u32),

    /// Custom decode error
    #[error("{0}")]
    Custom(String),
}

/// Trait for types with a canonical wire encoding.
pub trait WireEncode {
    /// Appends the canonical byte representation to `buf`.
    fn encode(&self, buf: &mut BytesMut);

    /// Returns the encoded byte representation.
    fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Returns the encoded byte representation as a Vec.
    fn to_vec(&self) -> Vec<u8> {
        self.to_bytes().to_vec()
    }
}

/// Trait for types decodable from the canonical wire encoding.
pub trait WireDecode: Sized {
    /// Decodes a value, advancing `buf` past the consumed bytes.
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError>;

    /// Decodes from a byte slice.
    fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut buf = Bytes::copy_from_slice(bytes);
        Self::decode(&mut buf)
    }
}

fn need(buf: &Bytes, expected: usize) -> Result<(), DecodeError> {
    if buf.remaining() < expected {
        return Err(DecodeError::InsufficientBytes {
            expected,
            available: buf.remaining(),
        });
    }
    Ok(())
}

impl WireEncode for u8 {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(*self);
    }
}

impl WireDecode for u8 {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        need(buf, 1)?;
        Ok(buf.get_u8())
    }
}

impl WireEncode for u16 {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16_le(*self);
    }
}

impl WireDecode for u16 {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        need(buf, 2)?;
        Ok(buf.get_u16_le())
    }
}

impl WireEncode for u32 {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(*self);
    }
}

impl WireDecode for u32 {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        need(buf, 4)?;
        Ok(buf.get_u32_le())
    }
}

impl WireEncode for u64 {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64_le(*self);
    }
}

impl WireDecode for u64 {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        need(buf, 8)?;
        Ok(buf.get_u64_le())
    }
}

impl WireEncode for bool {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(*self as u8);
    }
}

impl WireDecode for bool {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        match u8::decode(buf)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(DecodeError::InvalidEnumTag(other as u32)),
        }
    }
}

impl<const N: usize> WireEncode for [u8; N] {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(self);
    }
}

impl<const N: usize> WireDecode for [u8; N] {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        need(buf, N)?;
        let mut arr = [0u8; N];
        buf.copy_to_slice(&mut arr);
        Ok(arr)
    }
}

impl<T: WireEncode> WireEncode for Vec<T> {
    fn encode(&self, buf: &mut BytesMut) {
        assert!(self.len() <= u32::MAX as usize, "sequence length exceeds u32::MAX");
        (self.len() as u32).encode(buf);
        for item in self {
            item.encode(buf);
        }
    }
}

impl<T: WireDecode> WireDecode for Vec<T> {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        let len = u32::decode(buf)? as usize;
        let mut vec = Vec::new();
        for _ in 0..len {
            vec.push(T::decode(buf)?);
        }
        Ok(vec)
    }
}

impl WireEncode for String {
    fn encode(&self, buf: &mut BytesMut) {
        let bytes = self.as_bytes();
        assert!(bytes.len() <= u32::MAX as usize, "string length exceeds u32::MAX");
        (bytes.len() as u32).encode(buf);
        buf.put_slice(bytes);
    }
}

impl WireDecode for String {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        let len = u32::decode(buf)? as usize;
        need(buf, len)?;
        let bytes = buf.copy_to_bytes(len);
        String::from_utf8(bytes.to_vec()).map_err(|e| DecodeError::InvalidUtf8(e.to_string()))
    }
}

impl<T: WireEncode> WireEncode for Option<T> {
    fn encode(&self, buf: &mut BytesMut) {
        match self {
            None => buf.put_u8(0x00),
            Some(value) => {
                buf.put_u8(0x01);
                value.encode(buf);
            }
        }
    }
}

impl<T: WireDecode> WireDecode for Option<T> {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        match u8::decode(buf)? {
            0x00 => Ok(None),
            0x01 => Ok(Some(T::decode(buf)?)),
            other => Err(DecodeError::InvalidEnumTag(other as u32)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_are_little_endian() {
        let value: u32 = 0x12345678;
        assert_eq!(value.to_vec(), vec![0x78, 0x56, 0x34, 0x12]);

        let value: u16 = 0xABCD;
        assert_eq!(value.to_vec(), vec![0xCD, 0xAB]);
    }

    #[test]
    fn vec_has_length_prefix() {
        let vec: Vec<u8> = vec![0xAA, 0xBB, 0xCC];
        assert_eq!(vec.to_vec(), vec![0x03, 0x00, 0x00, 0x00, 0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn option_encoding() {
        let none: Option<u32> = None;
        assert_eq!(none.to_vec(), vec![0x00]);

        let some: Option<u32> = Some(0x12345678);
        assert_eq!(some.to_vec(), vec![0x01, 0x78, 0x56, 0x34, 0x12]);
    }

    #[test]
    fn option_rejects_bad_tag() {
        let err = Option::<u32>::from_bytes(&[0x02, 0, 0, 0, 0]).unwrap_err();
        assert_eq!(err, DecodeError::InvalidEnumTag(2));
    }

    #[test]
    fn fixed_array_no_prefix() {
        let arr: [u8; 4] = [1, 2, 3, 4];
        assert_eq!(arr.to_vec(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn string_roundtrip() {
        let s = String::from("hello");
        assert_eq!(
            s.to_vec(),
            vec![0x05, 0x00, 0x00, 0x00, b'h', b'e', b'l', b'l', b'o']
        );
        let decoded = String::from_bytes(&s.to_vec()).unwrap();
        assert_eq!(decoded, s);
    }

    #[test]
    fn truncated_input_fails_closed() {
        assert!(matches!(
            u64::from_bytes(&[1, 2, 3]),
            Err(DecodeError::InsufficientBytes { .. })
        ));
        assert!(matches!(
            Vec::<u32>::from_bytes(&[0xFF, 0xFF, 0xFF, 0xFF]),
            Err(DecodeError::InsufficientBytes { .. })
        ));
    }

    #[test]
    fn roundtrip_primitives() {
        let val: u8 = 42;
        assert_eq!(u8::from_bytes(&val.to_vec()).unwrap(), val);

        let val: u32 = 0xDEADBEEF;
        assert_eq!(u32::from_bytes(&val.to_vec()).unwrap(), val);

        let val: u64 = u64::MAX;
        assert_eq!(u64::from_bytes(&val.to_vec()).unwrap(), val);

        assert!(bool::from_bytes(&true.to_vec()).unwrap());
    }
}
