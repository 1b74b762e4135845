//! The location driver abstraction: a uniform, scoped capability set over
//! either a filesystem-adjacent repository or a remote HTTP server
//! (`spec.md` §4.i).

mod http;
mod path;

pub use http::HttpDriver;
pub use path::PathDriver;

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use outpack_hash::Hash;
use outpack_metadata::{PacketId, PacketLocation};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("location does not support this operation")]
    Unsupported,

    #[error("unknown packet '{0}'")]
    UnknownPacket(PacketId),

    #[error("file with hash '{0}' not found at location")]
    FileNotFound(Hash),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Request(#[from] reqwest_middleware::Error),
}

/// A single connection to a location, opened for the duration of one pull
/// or push (`spec.md` §4.i, "used as a scoped session").
///
/// Implementors acquire whatever resources they need in their constructor
/// and release them on drop; callers are expected to build a fresh driver
/// per sync operation rather than holding one open indefinitely.
#[async_trait]
pub trait LocationDriver: Send + Sync {
    /// Every packet this location currently claims to have.
    async fn list_packets(&self) -> Result<BTreeMap<PacketId, PacketLocation>, DriverError>;

    /// The canonical metadata JSON string for each requested id.
    ///
    /// Fails if any requested id is unknown to the location.
    async fn metadata(
        &self,
        ids: &[PacketId],
    ) -> Result<BTreeMap<PacketId, String>, DriverError>;

    /// Fetch the file identified by `hash` belonging to `packet` and write
    /// it to `dest`.
    async fn fetch_file(
        &self,
        packet: &PacketId,
        hash: &Hash,
        dest: &Path,
    ) -> Result<(), DriverError>;

    /// Of `ids`, those this location does not have.
    async fn list_unknown_packets(&self, ids: &[PacketId]) -> Result<Vec<PacketId>, DriverError>;

    /// Of `hashes`, those this location does not have.
    async fn list_unknown_files(&self, hashes: &[Hash]) -> Result<Vec<Hash>, DriverError>;

    /// Upload a file's bytes, addressed by its hash.
    async fn push_file(&self, src: &Path, hash: &Hash) -> Result<(), DriverError>;

    /// Upload a packet's canonical metadata.
    async fn push_metadata(&self, src: &Path, hash: &Hash) -> Result<(), DriverError>;
}
