//! The in-memory, lazily-built view over on-disk repository state
//! (`spec.md` §4.f).
//!
//! `Index` mirrors the cache-over-disk-state shape of a
//! [`puffin-cache`](https://…)'s `Cache`: cheap to hold, explicitly
//! invalidated by callers that mutate `.outpack/` directly (packet insert,
//! location pull), never silently refreshed behind their backs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use fs_err as fs;
use indexmap::IndexMap;
use outpack_metadata::{MetadataCore, PacketId, PacketLocation};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("unknown packet '{0}'")]
    UnknownPacket(PacketId),

    #[error("unknown location '{0}'")]
    UnknownLocation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Ordered `id -> PacketLocation` rows for a single location, in the order
/// they were recorded on disk (`spec.md` §4.f).
pub type LocationTable = IndexMap<PacketId, PacketLocation>;

/// The repository's packet metadata and per-location membership tables,
/// rebuilt on demand from `<root>/.outpack/metadata` and
/// `<root>/.outpack/location/<name>`.
#[derive(Debug, Default)]
pub struct Index {
    metadata: BTreeMap<PacketId, MetadataCore>,
    locations: BTreeMap<String, LocationTable>,
}

impl Index {
    /// Build the index by reading every metadata and location file under
    /// `root`. Called lazily by [`Root`](outpack_core) and explicitly by
    /// [`Index::rebuild`].
    pub fn open(root: &Path) -> Result<Self, IndexError> {
        let outpack_dir = root.join(".outpack");
        let mut metadata = BTreeMap::new();
        let metadata_dir = outpack_dir.join("metadata");
        if metadata_dir.is_dir() {
            for entry in fs::read_dir(&metadata_dir)? {
                let entry = entry?;
                if !entry.file_type()?.is_file() {
                    continue;
                }
                let Ok(id) = entry.file_name().to_string_lossy().parse::<PacketId>() else {
                    continue;
                };
                let text = fs::read_to_string(entry.path())?;
                let meta: MetadataCore = serde_json::from_str(&text)?;
                metadata.insert(id, meta);
            }
        }

        let mut locations = BTreeMap::new();
        let location_dir = outpack_dir.join("location");
        if location_dir.is_dir() {
            for name_entry in fs::read_dir(&location_dir)? {
                let name_entry = name_entry?;
                if !name_entry.file_type()?.is_dir() {
                    continue;
                }
                let name = name_entry.file_name().to_string_lossy().into_owned();
                let mut rows: Vec<(PacketId, PacketLocation)> = Vec::new();
                for id_entry in fs::read_dir(name_entry.path())? {
                    let id_entry = id_entry?;
                    if !id_entry.file_type()?.is_file() {
                        continue;
                    }
                    let Ok(id) = id_entry.file_name().to_string_lossy().parse::<PacketId>() else {
                        continue;
                    };
                    let text = fs::read_to_string(id_entry.path())?;
                    let loc: PacketLocation = serde_json::from_str(&text)?;
                    rows.push((id, loc));
                }
                // Recorded order approximates write order; since directory
                // listings aren't guaranteed ordered, sort by recorded time
                // to recover insertion order as best effort.
                rows.sort_by(|a, b| a.1.time.partial_cmp(&b.1.time).unwrap());
                let table: LocationTable = rows.into_iter().collect();
                locations.insert(name, table);
            }
        }

        Ok(Index { metadata, locations })
    }

    /// Rebuild from disk, discarding any cached state.
    pub fn rebuild(&mut self, root: &Path) -> Result<(), IndexError> {
        *self = Index::open(root)?;
        Ok(())
    }

    pub fn metadata(&self, id: &PacketId) -> Option<&MetadataCore> {
        self.metadata.get(id)
    }

    pub fn all_metadata(&self) -> &BTreeMap<PacketId, MetadataCore> {
        &self.metadata
    }

    pub fn location(&self, name: &str) -> Option<&LocationTable> {
        self.locations.get(name)
    }

    pub fn location_names(&self) -> impl Iterator<Item = &str> {
        self.locations.keys().map(String::as_str)
    }

    /// Record a new metadata blob and insert it in memory without a full
    /// rebuild, used by the packet lifecycle and pull engine to avoid
    /// re-scanning disk after every single write.
    pub fn insert_metadata(&mut self, meta: MetadataCore) {
        self.metadata.insert(meta.id.clone(), meta);
    }

    /// Record a location membership row in memory.
    pub fn insert_location(&mut self, name: &str, loc: PacketLocation) {
        self.locations
            .entry(name.to_string())
            .or_default()
            .insert(loc.packet.clone(), loc);
    }

    /// Ids present in the `local` location, lexicographically ordered
    /// (`spec.md` §4.f, `unpacked()`).
    pub fn unpacked(&self) -> Vec<PacketId> {
        self.location(outpack_config::LOCATION_LOCAL)
            .map(|table| {
                let mut ids: Vec<_> = table.keys().cloned().collect();
                ids.sort();
                ids
            })
            .unwrap_or_default()
    }

    /// Path metadata for `id` would be written to, relative to `root`.
    pub fn metadata_path(root: &Path, id: &PacketId) -> PathBuf {
        root.join(".outpack").join("metadata").join(id.as_str())
    }

    /// Path a `PacketLocation` row for `(name, id)` would be written to.
    pub fn location_path(root: &Path, name: &str, id: &PacketId) -> PathBuf {
        root.join(".outpack").join("location").join(name).join(id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outpack_metadata::TimeRange;

    fn sample_meta(id: &str) -> MetadataCore {
        MetadataCore::new(
            id.parse().unwrap(),
            "data",
            Default::default(),
            TimeRange { start: 0.0, end: 1.0 },
            vec![],
            vec![],
            None,
            Default::default(),
        )
    }

    #[test]
    fn opens_empty_repository() {
        let dir = tempfile::tempdir().unwrap();
        let index = Index::open(dir.path()).unwrap();
        assert!(index.all_metadata().is_empty());
        assert!(index.unpacked().is_empty());
    }

    #[test]
    fn reads_metadata_and_location_files_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let meta = sample_meta("20220825-121308-e7665c90");
        let meta_dir = dir.path().join(".outpack").join("metadata");
        fs::create_dir_all(&meta_dir).unwrap();
        fs::write(
            meta_dir.join(meta.id.as_str()),
            serde_json::to_vec(&meta).unwrap(),
        )
        .unwrap();

        let loc_dir = dir.path().join(".outpack").join("location").join("local");
        fs::create_dir_all(&loc_dir).unwrap();
        let loc = PacketLocation {
            packet: meta.id.clone(),
            time: 1.0,
            hash: meta.canonical_hash(outpack_hash::Algorithm::Sha256).unwrap(),
        };
        fs::write(loc_dir.join(meta.id.as_str()), serde_json::to_vec(&loc).unwrap()).unwrap();

        let index = Index::open(dir.path()).unwrap();
        assert_eq!(index.metadata(&meta.id), Some(&meta));
        assert_eq!(index.unpacked(), vec![meta.id.clone()]);
    }

    #[test]
    fn insert_metadata_is_visible_without_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = Index::open(dir.path()).unwrap();
        let meta = sample_meta("20220825-121308-e7665c90");
        index.insert_metadata(meta.clone());
        assert_eq!(index.metadata(&meta.id), Some(&meta));
    }
}
