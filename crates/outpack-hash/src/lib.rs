//! Stable content hashing for outpack repositories.
//!
//! Every packet, file and metadata blob is identified by a [`Hash`]: an
//! algorithm tag plus a lowercase hex digest, formatted `alg:hex`. The
//! algorithm is fixed for the lifetime of a repository (recorded in its
//! [`Config`](outpack_config::Config)) but the hashing primitives here are
//! algorithm-generic so a repository could, in principle, be configured with
//! a different one.

use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use sha2::{Digest, Sha256};
use thiserror::Error;

/// A supported hash algorithm.
///
/// `spec.md` only requires sha256 support; we model this as an enum rather
/// than a bare string so that an unsupported algorithm is a compile-time
/// impossibility once parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Algorithm {
    Sha256,
}

impl Algorithm {
    fn as_str(self) -> &'static str {
        match self {
            Algorithm::Sha256 => "sha256",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl serde::Serialize for Algorithm {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> serde::Deserialize<'de> for Algorithm {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl FromStr for Algorithm {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sha256" => Ok(Algorithm::Sha256),
            other => Err(HashError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum HashError {
    #[error("unsupported hash algorithm '{0}'")]
    UnsupportedAlgorithm(String),

    #[error("invalid hash string '{0}': expected 'algorithm:hexdigest'")]
    InvalidFormat(String),

    #[error("hash mismatch while hashing {context}: expected {expected}, got {actual}")]
    Mismatch {
        context: String,
        expected: Hash,
        actual: Hash,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A hash: an algorithm tag plus digest, formatted `alg:hex`.
///
/// Equality of two [`Hash`] values implies identity of the hashed content
/// (`spec.md` §3, invariant 1).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash {
    algorithm: Algorithm,
    digest: String,
}

impl Hash {
    pub fn new(algorithm: Algorithm, digest: impl Into<String>) -> Self {
        Self {
            algorithm,
            digest: digest.into().to_ascii_lowercase(),
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// The hex digest, lowercase, without the algorithm prefix.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// The first two hex characters of the digest, used as the `FileStore`
    /// fan-out directory (`spec.md` §4.b).
    pub fn fan_out_prefix(&self) -> &str {
        &self.digest[..2]
    }

    /// The remainder of the digest after the fan-out prefix.
    pub fn fan_out_rest(&self) -> &str {
        &self.digest[2..]
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.digest)
    }
}

impl FromStr for Hash {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (alg, digest) = s
            .split_once(':')
            .ok_or_else(|| HashError::InvalidFormat(s.to_string()))?;
        if digest.is_empty() || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(HashError::InvalidFormat(s.to_string()));
        }
        Ok(Hash::new(alg.parse()?, digest))
    }
}

impl serde::Serialize for Hash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for Hash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Hash a byte string with the given algorithm.
pub fn hash_bytes(algorithm: Algorithm, data: &[u8]) -> Hash {
    match algorithm {
        Algorithm::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(data);
            Hash::new(algorithm, hex::encode(hasher.finalize()))
        }
    }
}

/// Hash a file by streaming its contents, without loading it all into memory.
pub fn hash_file(algorithm: Algorithm, path: &Path) -> Result<Hash, HashError> {
    let mut file = fs_err::File::open(path)?;
    match algorithm {
        Algorithm::Sha256 => {
            let mut hasher = Sha256::new();
            let mut buf = [0u8; 64 * 1024];
            loop {
                let n = file.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
            Ok(Hash::new(algorithm, hex::encode(hasher.finalize())))
        }
    }
}

/// Validate that `data` hashes to `expected`, with an error message naming
/// what was being hashed if it doesn't (`spec.md` §4.a).
pub fn validate_bytes(data: &[u8], expected: &Hash, context: impl Into<String>) -> Result<(), HashError> {
    let actual = hash_bytes(expected.algorithm(), data);
    if &actual == expected {
        Ok(())
    } else {
        Err(HashError::Mismatch {
            context: context.into(),
            expected: expected.clone(),
            actual,
        })
    }
}

/// Validate that a string's bytes hash to `expected` (used for metadata
/// blobs pulled from a remote location).
pub fn validate_string(data: &str, expected: &Hash, context: impl Into<String>) -> Result<(), HashError> {
    validate_bytes(data.as_bytes(), expected, context)
}

/// Validate that a file on disk hashes to `expected`.
pub fn validate_file(path: &Path, expected: &Hash, context: impl Into<String>) -> Result<(), HashError> {
    let actual = hash_file(expected.algorithm(), path)?;
    if &actual == expected {
        Ok(())
    } else {
        Err(HashError::Mismatch {
            context: context.into(),
            expected: expected.clone(),
            actual,
        })
    }
}
