//! The user-facing error umbrella, composing every sub-crate's local error
//! type the way `puffin-distribution::Error` wraps `pypi_types::Error` and
//! `install_wheel_rs::Error` (`spec.md` §7).

use outpack_hash::Hash;
use outpack_metadata::PacketId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] outpack_config::ConfigError),

    #[error(transparent)]
    Hash(#[from] outpack_hash::HashError),

    #[error(transparent)]
    CanonicalJson(#[from] outpack_metadata::CanonicalJsonError),

    #[error(transparent)]
    Store(#[from] outpack_store::StoreError),

    #[error(transparent)]
    Index(#[from] outpack_index::IndexError),

    #[error(transparent)]
    Driver(#[from] outpack_location::DriverError),

    #[error(transparent)]
    Sync(#[from] outpack_sync::SyncError),

    #[error("neither a file store nor an archive is configured for this repository")]
    ConfigurationError,

    #[error("no repository found at or above '{0}'")]
    RepositoryNotFound(std::path::PathBuf),

    #[error("file with hash '{0}' not found in the store or archive")]
    FileNotFound(Hash),

    #[error("packet '{0}' has no file mapped to '{1}'")]
    UnknownPacketFile(PacketId, String),

    #[error("immutable file '{path}' changed before the packet was finalized")]
    ImmutableFileChanged { path: String },

    #[error("custom metadata namespace '{0}' was already set for this packet")]
    DuplicateCustomKey(String),

    #[error("this packet has already ended")]
    PacketAlreadyEnded,

    #[error("packet description was already set")]
    MultipleDescriptionCalls,

    #[error("search query '{0}' matched no packets")]
    SearchNoMatch(String),

    #[error("search query '{0}' matched more than one packet")]
    SearchAmbiguous(String),

    #[error("invalid search query '{0}'")]
    InvalidQuery(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
