//! `outpack-core`: the repository facade, packet authoring lifecycle and
//! search, composed from the lower-level `outpack-*` crates.
//!
//! This is the crate collaborators (`outpack-cli`, test harnesses) build
//! against directly; everything below it is an implementation detail.

mod error;
mod packet;
mod root;
mod search;

pub use error::{Error, Result};
pub use packet::Packet;
pub use root::Root;
pub use search::{search, search_unique, Universe};

pub use outpack_config::{Config, Location, LocationKind};
pub use outpack_hash::{Algorithm, Hash};
pub use outpack_index::Index;
pub use outpack_location::{DriverError, HttpDriver, LocationDriver, PathDriver};
pub use outpack_metadata::{
    Dependency, FileMapping, GitInfo, MetadataCore, PacketFile, PacketId, PacketLocation,
    ParameterValue, TimeRange,
};
pub use outpack_store::{Archive, FileStore};
pub use outpack_sync::{pull_metadata, pull_packets, push, PullReport, PushPlan};
