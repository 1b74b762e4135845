//! The pull and push engines: the only two operations that make a
//! repository's location graph converge (`spec.md` §4.j, §4.k).
//!
//! Both engines are generalized over [`LocationDriver`] so the same code
//! path exercises a filesystem-adjacent repository and a remote HTTP
//! server identically, grounded on the teacher's
//! `puffin-distribution::fetcher::Fetcher` (download-then-verify, explicit
//! write ordering).

mod pull;
mod push;

pub use pull::{pull_metadata, pull_packets, PullReport};
pub use push::{push, PushPlan};

use outpack_metadata::PacketId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("unknown location '{0}'")]
    UnknownLocation(String),

    #[error("hash of metadata for '{id}' from '{location}' does not match")]
    MetadataHashMismatch { id: PacketId, location: String },

    #[error("conflicting metadata for packets from '{location}': {ids:?}. Consider removing this location.")]
    ConflictingMetadata { location: String, ids: Vec<PacketId> },

    #[error("'{0}' … Looked in location '{1}'. Do you need to run pull_metadata?")]
    PacketNotFound(PacketId, String),

    /// One or more dependencies of a requested target have no metadata at
    /// any candidate location, so the closure can't be resolved any
    /// further (`spec.md` §4.j: "If a dependency id of a requested target
    /// is not known at any candidate location, include it in the error
    /// with the count"; pinned by
    /// `examples/original_source/tests/test_location_pull.py::test_error_if_dependent_packet_not_known`).
    #[error("{}", render_missing_dependencies(requested, missing, location))]
    MissingDependencies {
        requested: Vec<PacketId>,
        missing: Vec<PacketId>,
        location: String,
    },

    #[error("recursive pull is required because this repository requires a complete dependency tree")]
    RecursionRequired,

    #[error("push target '{0}' is not a valid remote location")]
    InvalidPushTarget(String),

    #[error(transparent)]
    Index(#[from] outpack_index::IndexError),

    #[error(transparent)]
    Store(#[from] outpack_store::StoreError),

    #[error(transparent)]
    Driver(#[from] outpack_location::DriverError),

    #[error(transparent)]
    Hash(#[from] outpack_hash::HashError),

    #[error(transparent)]
    CanonicalJson(#[from] outpack_metadata::CanonicalJsonError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Render `SyncError::MissingDependencies`'s message: names the first
/// unresolvable dependency, where it was looked for, and how many
/// dependencies of the requested target(s) came back missing in total.
fn render_missing_dependencies(requested: &[PacketId], missing: &[PacketId], location: &str) -> String {
    let first = missing.first().expect("MissingDependencies always carries at least one id");
    let count = missing.len();
    let packet_noun = if count == 1 { "packet" } else { "packets" };
    let verb = if count == 1 { "was" } else { "were" };
    let dependency_noun = if count == 1 { "dependency" } else { "dependencies" };
    let target_noun = if requested.len() == 1 { "one" } else { "ones" };
    let quoted = missing
        .iter()
        .map(|id| format!("'{id}'"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Failed to find packet '{first}'\nLooked in location '{location}'.\n\
         {count} missing {packet_noun} {verb} requested as {dependency_noun} of the \
         {target_noun} you asked for: {quoted}"
    )
}
