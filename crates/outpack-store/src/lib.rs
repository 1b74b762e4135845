//! Content-addressed storage: the [`FileStore`] blob pool (`spec.md` §4.b)
//! and the human-readable [`Archive`] mirror (`spec.md` §4.c).

mod archive;
mod file_store;

pub use archive::{Archive, RejectedFile};
pub use file_store::FileStore;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("file with hash '{0}' not found")]
    FileNotFound(outpack_hash::Hash),

    #[error(transparent)]
    Hash(#[from] outpack_hash::HashError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
