//! Typed packet metadata with canonical JSON serialization.
//!
//! [`MetadataCore`] is the hashed record every packet carries: its id,
//! parameters, file list, dependencies and custom namespaces. The canonical
//! form is produced by [`to_canonical_json`] — UTF-8, key-sorted, no
//! insignificant whitespace — so that the metadata hash (`spec.md` §3,
//! invariant 1) is reproducible across platforms and serde_json versions.

mod codec;
mod id;

pub use codec::{to_canonical_json, CanonicalJsonError};
pub use id::PacketId;

use std::collections::BTreeMap;

use outpack_hash::Hash;
use serde::{Deserialize, Serialize};

/// The current metadata/config schema version this crate reads and writes.
pub const SCHEMA_VERSION: &str = "0.0.1";

/// A parameter value: restricted to string, bool or finite numeric scalars
/// (`spec.md` §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    String(String),
    Number(f64),
    Bool(bool),
}

/// A single declared output file (`spec.md` §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketFile {
    /// Relative, POSIX-style path, unique within a packet.
    pub path: String,
    pub hash: Hash,
    pub size: u64,
}

/// A `here -> there` file name remapping declared by a dependency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMapping {
    pub here: String,
    pub there: String,
}

/// A record that this packet consumed another packet (`spec.md` §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    pub packet: PacketId,
    pub query: String,
    pub files: Vec<FileMapping>,
}

/// Start/end UNIX timestamps (UTC seconds).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

/// Optional VCS provenance, recorded verbatim if present at authoring time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitInfo {
    pub sha: String,
    pub branch: String,
    pub url: Option<String>,
}

/// The canonical, hashed per-packet record (`spec.md` §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataCore {
    pub schema_version: String,
    pub id: PacketId,
    pub name: String,
    pub parameters: BTreeMap<String, ParameterValue>,
    pub time: TimeRange,
    /// Ordered by path; enforced by [`MetadataCore::new`] and at finalize
    /// time by the packet lifecycle, never re-sorted silently here.
    pub files: Vec<PacketFile>,
    pub depends: Vec<Dependency>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git: Option<GitInfo>,
    #[serde(default)]
    pub custom: BTreeMap<String, serde_json::Value>,
}

impl MetadataCore {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: PacketId,
        name: impl Into<String>,
        parameters: BTreeMap<String, ParameterValue>,
        time: TimeRange,
        mut files: Vec<PacketFile>,
        depends: Vec<Dependency>,
        git: Option<GitInfo>,
        custom: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            id,
            name: name.into(),
            parameters,
            time,
            files,
            depends,
            git,
            custom,
        }
    }

    /// Serialize to canonical bytes and hash them with `algorithm`.
    pub fn canonical_hash(&self, algorithm: outpack_hash::Algorithm) -> Result<Hash, CanonicalJsonError> {
        let bytes = to_canonical_json(self)?;
        Ok(outpack_hash::hash_bytes(algorithm, &bytes))
    }
}

/// A location's assertion that a packet exists and which metadata hash it
/// vouches for (`spec.md` §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketLocation {
    pub packet: PacketId,
    pub time: f64,
    pub hash: Hash,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MetadataCore {
        MetadataCore::new(
            "20220825-121308-e7665c90".parse().unwrap(),
            "data",
            BTreeMap::new(),
            TimeRange { start: 1.0, end: 2.0 },
            vec![PacketFile {
                path: "a".into(),
                hash: outpack_hash::hash_bytes(outpack_hash::Algorithm::Sha256, b"hello"),
                size: 5,
            }],
            vec![],
            None,
            BTreeMap::new(),
        )
    }

    #[test]
    fn round_trips_through_canonical_json() {
        let meta = sample();
        let bytes = to_canonical_json(&meta).unwrap();
        let parsed: MetadataCore = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(meta, parsed);
        let bytes2 = to_canonical_json(&parsed).unwrap();
        assert_eq!(bytes, bytes2);
    }

    #[test]
    fn files_are_kept_sorted_by_path() {
        let mut meta = sample();
        meta.files.push(PacketFile {
            path: "A".into(),
            hash: outpack_hash::hash_bytes(outpack_hash::Algorithm::Sha256, b"x"),
            size: 1,
        });
        let meta = MetadataCore::new(
            meta.id,
            meta.name,
            meta.parameters,
            meta.time,
            meta.files,
            meta.depends,
            meta.git,
            meta.custom,
        );
        assert!(meta.files.windows(2).all(|w| w[0].path <= w[1].path));
    }

    #[test]
    fn same_content_hashes_identically() {
        let a = sample();
        let b = sample();
        assert_eq!(
            a.canonical_hash(outpack_hash::Algorithm::Sha256).unwrap(),
            b.canonical_hash(outpack_hash::Algorithm::Sha256).unwrap()
        );
    }
}
