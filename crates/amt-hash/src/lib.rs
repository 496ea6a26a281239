// SPDX-License-Identifier: Apache-2.0

//! Hashing primitives for the authenticated tree.
//!
//! [`Digest`] is the fixed 32-byte output of the tree's cryptographic hash
//! function. [`ZERO_DIGEST`] is the sentinel substituted for a missing
//! child when computing a [`node_hash`](hash_parts), matching the
//! `node_hash = H(left ∥ right ∥ kv_hash)` recurrence in the tree engine.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use thiserror::Error;

pub const DIGEST_LEN: usize = 32;

/// A 32-byte cryptographic digest.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Digest([u8; DIGEST_LEN]);

/// The "missing child" sentinel: a digest of all zero bytes.
pub const ZERO_DIGEST: Digest = Digest([0u8; DIGEST_LEN]);

impl Digest {
    pub const fn zero() -> Self {
        ZERO_DIGEST
    }

    pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Digest(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; DIGEST_LEN]
    }

    pub fn from_slice(slice: &[u8]) -> Result<Self, CodecError> {
        if slice.len() != DIGEST_LEN {
            return Err(CodecError::BadDigestLen(slice.len()));
        }
        let mut out = [0u8; DIGEST_LEN];
        out.copy_from_slice(slice);
        Ok(Digest(out))
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", hex::encode(self.0))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("expected a {DIGEST_LEN}-byte digest, got {0} bytes")]
    BadDigestLen(usize),
    #[error("truncated input while decoding")]
    Truncated,
    #[error("varint is longer than 10 bytes")]
    VarintTooLong,
}

/// `H(bytes) -> Digest`.
pub fn hash(bytes: &[u8]) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let out = hasher.finalize();
    let mut digest = [0u8; DIGEST_LEN];
    digest.copy_from_slice(&out);
    Digest(digest)
}

/// Hashes the concatenation of several length-prefixed fields, so that
/// `hash_parts(&[a, b]) != hash_parts(&[a_prefix_of_a_concat_b])` for any
/// split — the length prefixes make the concatenation injective.
pub fn hash_parts(parts: &[&[u8]]) -> Digest {
    let mut buf = Vec::new();
    for part in parts {
        encode_len_prefixed(&mut buf, part);
    }
    hash(&buf)
}

/// Appends a ULEB128-style varint length followed by the raw bytes.
pub fn encode_len_prefixed(buf: &mut Vec<u8>, data: &[u8]) {
    write_varint(buf, data.len() as u64);
    buf.extend_from_slice(data);
}

/// Reads back a value written by [`encode_len_prefixed`], advancing `pos`.
pub fn decode_len_prefixed(buf: &[u8], pos: &mut usize) -> Result<Vec<u8>, CodecError> {
    let len = read_varint(buf, pos)? as usize;
    let end = pos
        .checked_add(len)
        .filter(|&end| end <= buf.len())
        .ok_or(CodecError::Truncated)?;
    let out = buf[*pos..end].to_vec();
    *pos = end;
    Ok(out)
}

/// Writes `value` as an unsigned LEB128 varint.
pub fn write_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Reads an unsigned LEB128 varint, advancing `pos`.
pub fn read_varint(buf: &[u8], pos: &mut usize) -> Result<u64, CodecError> {
    let mut result: u64 = 0;
    let mut shift = 0u32;
    for _ in 0..10 {
        let byte = *buf.get(*pos).ok_or(CodecError::Truncated)?;
        *pos += 1;
        result |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
    }
    Err(CodecError::VarintTooLong)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn zero_digest_is_all_zero_bytes() {
        assert!(ZERO_DIGEST.is_zero());
        assert_eq!(ZERO_DIGEST.as_bytes(), &[0u8; DIGEST_LEN]);
    }

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(hash(b"foo"), hash(b"foo"));
        assert_ne!(hash(b"foo"), hash(b"bar"));
    }

    #[test]
    fn length_prefix_makes_concatenation_injective() {
        // Without length prefixes, ("fo", "obar") and ("foo", "bar") would collide.
        let a = hash_parts(&[b"fo", b"obar"]);
        let b = hash_parts(&[b"foo", b"bar"]);
        assert_ne!(a, b);
    }

    proptest! {
        #[test]
        fn varint_roundtrips(value: u64) {
            let mut buf = Vec::new();
            write_varint(&mut buf, value);
            let mut pos = 0;
            let decoded = read_varint(&buf, &mut pos).unwrap();
            prop_assert_eq!(decoded, value);
            prop_assert_eq!(pos, buf.len());
        }

        #[test]
        fn len_prefixed_roundtrips(data: Vec<u8>) {
            let mut buf = Vec::new();
            encode_len_prefixed(&mut buf, &data);
            let mut pos = 0;
            let decoded = decode_len_prefixed(&buf, &mut pos).unwrap();
            prop_assert_eq!(decoded, data);
        }
    }
}
