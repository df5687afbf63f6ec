// src/hash.rs

//! SHA-256 content digests.
//!
//! Every file payload is identified by its digest: the staging area is keyed
//! by it, manifests carry it per record, and the MoM carries it per
//! sub-manifest. Equality of digests implies equality of content.

use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

/// Hex length of a SHA-256 digest.
pub const HEX_LEN: usize = 64;

/// A validated SHA-256 digest, stored as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Hash(String);

impl Hash {
    /// The all-zeros digest carried by deleted records.
    pub fn zero() -> Self {
        Hash("0".repeat(HEX_LEN))
    }

    /// True for the all-zeros digest.
    pub fn is_zero(&self) -> bool {
        self.0.bytes().all(|b| b == b'0')
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Hash {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != HEX_LEN {
            return Err(HashError::InvalidLength {
                expected: HEX_LEN,
                got: s.len(),
            });
        }
        if !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(HashError::InvalidHex(s.to_string()));
        }
        Ok(Hash(s.to_lowercase()))
    }
}

/// Digest string validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashError {
    InvalidLength { expected: usize, got: usize },
    InvalidHex(String),
}

impl fmt::Display for HashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidLength { expected, got } => {
                write!(f, "invalid hash length: expected {}, got {}", expected, got)
            }
            Self::InvalidHex(s) => write!(f, "invalid hex in hash: {}", s),
        }
    }
}

impl std::error::Error for HashError {}

/// Compute the digest of a byte slice.
pub fn hash_bytes(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    Hash(format!("{:x}", hasher.finalize()))
}

/// Compute the digest of data from a reader, streaming.
pub fn hash_reader<R: Read>(reader: &mut R) -> io::Result<Hash> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(Hash(format!("{:x}", hasher.finalize())))
}

/// Compute the digest of a file's content, streaming.
pub fn hash_file(path: &Path) -> io::Result<Hash> {
    let mut file = File::open(path)?;
    hash_reader(&mut file)
}

/// True when the file at `path` hashes to `expected`.
///
/// A missing or unreadable file is an error, not a mismatch.
pub fn verify_file(path: &Path, expected: &Hash) -> io::Result<bool> {
    Ok(hash_file(path)? == *expected)
}
