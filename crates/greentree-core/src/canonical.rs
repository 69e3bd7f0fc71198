//! Canonical CBOR encoding for block hashing and signing.
//!
//! Follows RFC 8949 Core Deterministic Encoding for the subset we need:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats (timestamps are i64 milliseconds)
//!
//! Storage uses ordinary serde CBOR; only the bytes that feed a hash or a
//! signature go through this module.

/// Block header field keys. Keys 0-23 encode as single bytes.
pub mod header_keys {
    pub const VERSION: u64 = 0;
    pub const ISSUER: u64 = 1;
    pub const PREV_HASH: u64 = 2;
    pub const TIMESTAMP: u64 = 3;
    pub const PAYLOAD_TAG: u64 = 4;
    pub const PAYLOAD_DIGEST: u64 = 5;
    pub const OWNER_SHARE_DIGEST: u64 = 6;
}

/// Claim field keys.
pub mod claim_keys {
    pub const GRANTEE: u64 = 0;
    pub const EXCHANGE_KEY: u64 = 1;
    pub const NOT_BEFORE: u64 = 2;
    pub const NOT_AFTER: u64 = 3;
    pub const SHARE_DIGEST: u64 = 4;
}

/// Builds a canonical CBOR map from integer keys.
#[derive(Debug, Default)]
pub struct MapEncoder {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
}

impl MapEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uint(self, key: u64, n: u64) -> Self {
        let mut value = Vec::new();
        encode_uint(&mut value, 0, n);
        self.entry(key, value)
    }

    pub fn int(self, key: u64, n: i64) -> Self {
        let mut value = Vec::new();
        encode_int(&mut value, n);
        self.entry(key, value)
    }

    pub fn bytes(self, key: u64, bytes: &[u8]) -> Self {
        let mut value = Vec::new();
        encode_bytes(&mut value, bytes);
        self.entry(key, value)
    }

    pub fn optional_bytes(self, key: u64, bytes: Option<&[u8]>) -> Self {
        match bytes {
            Some(b) => self.bytes(key, b),
            None => self.entry(key, vec![0xf6]),
        }
    }

    fn entry(mut self, key: u64, value: Vec<u8>) -> Self {
        let mut key_buf = Vec::new();
        encode_uint(&mut key_buf, 0, key);
        self.entries.push((key_buf, value));
        self
    }

    /// Sort by encoded key bytes and emit the map.
    pub fn finish(mut self) -> Vec<u8> {
        self.entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut buf = Vec::new();
        encode_uint(&mut buf, 5, self.entries.len() as u64);
        for (key, value) in self.entries {
            buf.extend_from_slice(&key);
            buf.extend_from_slice(&value);
        }
        buf
    }
}

/// Encode already-canonical items as a definite-length array.
pub fn encode_array(items: &[Vec<u8>]) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_uint(&mut buf, 4, items.len() as u64);
    for item in items {
        buf.extend_from_slice(item);
    }
    buf
}

/// Encode a signed integer (major types 0 and 1).
fn encode_int(buf: &mut Vec<u8>, n: i64) {
    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // CBOR encodes -1 as 0, -2 as 1, etc.
        encode_uint(buf, 1, (-1 - n) as u64);
    }
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    encode_uint(buf, 2, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}
