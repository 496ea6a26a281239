// SPDX-License-Identifier: Apache-2.0

//! The proof grammar and its binary encoding (spec.md §4.5.1, §4.5.2).

use amt_hash::{decode_len_prefixed, encode_len_prefixed, Digest};

use crate::error::ProofError;

const OP_PUSH_HASH: u8 = 0x01;
const OP_PUSH_KV_HASH: u8 = 0x02;
const OP_PUSH_KV: u8 = 0x03;
const OP_PARENT: u8 = 0x10;
const OP_CHILD: u8 = 0x11;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProofToken {
    /// 32-byte node hash of an unopened subtree.
    PushHash(Digest),
    /// 32-byte kv_hash of a node whose key/value are not exposed.
    PushKvHash(Digest),
    /// The full contents of a node.
    PushKv(Vec<u8>, Vec<u8>),
    /// Attach the top-of-stack as the left child of the next-down.
    Parent,
    /// Attach the top-of-stack as the right child of the next-down.
    Child,
}

pub fn encode(tokens: &[ProofToken]) -> Vec<u8> {
    let mut buf = Vec::new();
    for token in tokens {
        match token {
            ProofToken::PushHash(h) => {
                buf.push(OP_PUSH_HASH);
                buf.extend_from_slice(h.as_ref());
            }
            ProofToken::PushKvHash(h) => {
                buf.push(OP_PUSH_KV_HASH);
                buf.extend_from_slice(h.as_ref());
            }
            ProofToken::PushKv(k, v) => {
                buf.push(OP_PUSH_KV);
                encode_len_prefixed(&mut buf, k);
                encode_len_prefixed(&mut buf, v);
            }
            ProofToken::Parent => buf.push(OP_PARENT),
            ProofToken::Child => buf.push(OP_CHILD),
        }
    }
    buf
}

pub fn decode(bytes: &[u8]) -> Result<Vec<ProofToken>, ProofError> {
    let mut pos = 0;
    let mut tokens = Vec::new();
    while pos < bytes.len() {
        let opcode = bytes[pos];
        pos += 1;
        let token = match opcode {
            OP_PUSH_HASH => ProofToken::PushHash(read_digest(bytes, &mut pos)?),
            OP_PUSH_KV_HASH => ProofToken::PushKvHash(read_digest(bytes, &mut pos)?),
            OP_PUSH_KV => {
                let k = decode_len_prefixed(bytes, &mut pos)
                    .map_err(|e| ProofError::Malformed(e.to_string()))?;
                let v = decode_len_prefixed(bytes, &mut pos)
                    .map_err(|e| ProofError::Malformed(e.to_string()))?;
                ProofToken::PushKv(k, v)
            }
            OP_PARENT => ProofToken::Parent,
            OP_CHILD => ProofToken::Child,
            other => return Err(ProofError::Malformed(format!("unknown opcode {other:#04x}"))),
        };
        tokens.push(token);
    }
    Ok(tokens)
}

fn read_digest(bytes: &[u8], pos: &mut usize) -> Result<Digest, ProofError> {
    let end = pos
        .checked_add(amt_hash::DIGEST_LEN)
        .filter(|&end| end <= bytes.len())
        .ok_or_else(|| ProofError::Malformed("truncated digest".to_string()))?;
    let digest = Digest::from_slice(&bytes[*pos..end])
        .map_err(|e| ProofError::Malformed(e.to_string()))?;
    *pos = end;
    Ok(digest)
}
