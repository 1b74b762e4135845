//! The filesystem location driver: direct access to another repository on
//! the same machine (`spec.md` §4.i).
//!
//! All operations resolve immediately (no real suspension), but are still
//! `async fn` so the pull/push engines can treat every driver uniformly.
//! Disk work is dispatched through `spawn_blocking` to avoid stalling the
//! executor on large files, mirroring how the teacher's `PathDriver`
//! equivalents wrap `std::fs` for async callers.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs_err as fs;
use outpack_config::Config;
use outpack_hash::Hash;
use outpack_index::Index;
use outpack_metadata::{PacketId, PacketLocation};
use outpack_store::{Archive, FileStore};

use crate::{DriverError, LocationDriver};

/// A location backed by a plain directory containing `.outpack/`.
pub struct PathDriver {
    root: PathBuf,
    config: Config,
}

impl PathDriver {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, DriverError> {
        let root = root.into();
        let config = outpack_config::read_config(&root)
            .map_err(|e| DriverError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, e)))?;
        Ok(Self { root, config })
    }

    fn file_store(&self) -> Option<FileStore> {
        self.config
            .core
            .use_file_store
            .then(|| FileStore::new(self.root.join(".outpack").join("files"), self.config.core.hash_algorithm))
    }

    fn archive(&self) -> Option<Archive> {
        self.config
            .core
            .path_archive
            .as_ref()
            .map(|relative| Archive::new(self.root.join(relative)))
    }
}

#[async_trait]
impl LocationDriver for PathDriver {
    async fn list_packets(&self) -> Result<BTreeMap<PacketId, PacketLocation>, DriverError> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || {
            let index = Index::open(&root)?;
            Ok(index
                .location(outpack_config::LOCATION_LOCAL)
                .map(|table| table.iter().map(|(id, loc)| (id.clone(), loc.clone())).collect())
                .unwrap_or_default())
        })
        .await
        .expect("blocking task panicked")
        .map_err(DriverError::Io)
    }

    async fn metadata(
        &self,
        ids: &[PacketId],
    ) -> Result<BTreeMap<PacketId, String>, DriverError> {
        let root = self.root.clone();
        let ids = ids.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut out = BTreeMap::new();
            for id in ids {
                let path = Index::metadata_path(&root, &id);
                if !path.is_file() {
                    return Err(DriverError::UnknownPacket(id));
                }
                out.insert(id, fs::read_to_string(path)?);
            }
            Ok(out)
        })
        .await
        .expect("blocking task panicked")
    }

    async fn fetch_file(
        &self,
        packet: &PacketId,
        hash: &Hash,
        dest: &Path,
    ) -> Result<(), DriverError> {
        if let Some(store) = self.file_store() {
            if store.exists(hash) {
                store.get(hash, dest, true).map_err(|e| DriverError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
                return Ok(());
            }
        }
        if let Some(archive) = self.archive() {
            let root = self.root.clone();
            let index = Index::open(&root).map_err(DriverError::Io)?;
            let meta = index.metadata(packet).cloned();
            if let Some(meta) = meta {
                let candidates: Vec<_> = meta
                    .files
                    .iter()
                    .filter(|f| &f.hash == hash)
                    .map(|f| (meta.name.clone(), packet.clone(), f.path.clone()))
                    .collect();
                if let Ok((found, _rejected)) = archive.find_file(&index, hash, &candidates) {
                    if let Some(parent) = dest.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    fs::copy(found, dest)?;
                    return Ok(());
                }
            }
        }
        Err(DriverError::FileNotFound(hash.clone()))
    }

    async fn list_unknown_packets(&self, ids: &[PacketId]) -> Result<Vec<PacketId>, DriverError> {
        // A push target's metadata presence, not its `local` location table,
        // is what tells us whether it already has a packet: a packet landed
        // here by a previous push never gets a `local` row (it wasn't run
        // here), so checking `list_packets` would report it missing forever.
        let root = self.root.clone();
        let ids = ids.to_vec();
        let unknown: Vec<PacketId> = tokio::task::spawn_blocking(move || {
            ids.into_iter()
                .filter(|id| !Index::metadata_path(&root, id).is_file())
                .collect()
        })
        .await
        .expect("blocking task panicked");
        Ok(unknown)
    }

    async fn list_unknown_files(&self, hashes: &[Hash]) -> Result<Vec<Hash>, DriverError> {
        let Some(store) = self.file_store() else {
            return Err(DriverError::Unsupported);
        };
        Ok(hashes.iter().filter(|h| !store.exists(h)).cloned().collect())
    }

    async fn push_file(&self, src: &Path, hash: &Hash) -> Result<(), DriverError> {
        let Some(store) = self.file_store() else {
            return Err(DriverError::Unsupported);
        };
        store
            .put(src)
            .map_err(|e| DriverError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        let _ = hash;
        Ok(())
    }

    async fn push_metadata(&self, src: &Path, hash: &Hash) -> Result<(), DriverError> {
        let _ = hash;
        // The push engine always names the source file after the packet id
        // it came from (`<root>/.outpack/metadata/<id>`), so the id is
        // recovered from the file name rather than threaded separately.
        let id: PacketId = src
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.parse().ok())
            .ok_or(DriverError::Unsupported)?;
        let dest = Index::metadata_path(&self.root, &id);
        if let Some(dir) = dest.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::copy(src, &dest)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_repo(dir: &Path) {
        let config = Config::new(None, true, false).unwrap();
        fs::create_dir_all(dir.join(".outpack")).unwrap();
        outpack_config::write_config(&config, dir).unwrap();
    }

    #[tokio::test]
    async fn list_packets_on_empty_repository_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        make_repo(dir.path());
        let driver = PathDriver::open(dir.path()).unwrap();
        assert!(driver.list_packets().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fetch_file_from_file_store() {
        let dir = tempfile::tempdir().unwrap();
        make_repo(dir.path());
        let store = FileStore::new(dir.path().join(".outpack").join("files"), outpack_hash::Algorithm::Sha256);
        let src = dir.path().join("content.txt");
        fs::write(&src, b"hello").unwrap();
        let hash = store.put(&src).unwrap();

        let driver = PathDriver::open(dir.path()).unwrap();
        let dest = dir.path().join("out.txt");
        let id: PacketId = outpack_metadata::PacketId::generate_at(chrono::Utc::now(), [1, 2, 3, 4]);
        driver.fetch_file(&id, &hash, &dest).await.unwrap();
        assert_eq!(fs::read(dest).unwrap(), b"hello");
    }
}
