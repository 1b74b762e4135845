use std::collections::HashSet;
use std::path::{Path, PathBuf};

use fs_err as fs;
use outpack_hash::Hash;
use outpack_index::Index;
use outpack_metadata::{MetadataCore, PacketId};
use tracing::warn;

use crate::StoreError;

/// A file that was found on disk under a candidate packet but whose content
/// no longer matches the hash it was declared under.
///
/// This is a diagnostic, not a fatal condition: `Archive::find_file` keeps
/// searching other candidates after recording one (`spec.md` §4.c, edge
/// case "file present but hash mismatch").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedFile {
    pub packet: PacketId,
    pub path: String,
    pub expected: Hash,
}

/// The human-readable mirror of packet contents, organised as
/// `<root>/<name>/<id>/<path>` (`spec.md` §4.c).
///
/// Unlike the [`FileStore`](crate::FileStore), the archive is not addressed
/// by hash: it exists so that a checked-out repository can be browsed and
/// used directly from the filesystem.
#[derive(Debug, Clone)]
pub struct Archive {
    root: PathBuf,
}

impl Archive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The directory a packet's files are, or would be, checked out under.
    pub fn packet_dir(&self, name: &str, id: &PacketId) -> PathBuf {
        self.root.join(name).join(id.as_str())
    }

    pub fn has_packet(&self, name: &str, id: &PacketId) -> bool {
        self.packet_dir(name, id).is_dir()
    }

    /// Copy every file declared in `meta` from `source_root` into this
    /// archive under `<name>/<id>/<path>`.
    ///
    /// `source_root` is the directory the packet was run in; each declared
    /// file's hash has already been validated by the caller before this is
    /// invoked (`spec.md` §4.h, `Packet::end`).
    pub fn import_packet(
        &self,
        meta: &MetadataCore,
        source_root: &Path,
    ) -> Result<(), StoreError> {
        let dest_dir = self.packet_dir(&meta.name, &meta.id);
        for file in &meta.files {
            let src = source_root.join(&file.path);
            let dest = dest_dir.join(&file.path);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&src, &dest)?;
        }
        Ok(())
    }

    /// Locate a file with the given hash among the archive copies of
    /// `candidates`, falling back to every other packet's own declared file
    /// list for one that happens to hold the same content under its own
    /// path (`spec.md` §4.c, `find_file`).
    ///
    /// Returns the path to a verified copy of the file, plus any rejected
    /// candidates encountered along the way.
    pub fn find_file(
        &self,
        index: &Index,
        hash: &Hash,
        candidates: &[(String, PacketId, String)],
    ) -> Result<(PathBuf, Vec<RejectedFile>), StoreError> {
        let mut rejected = Vec::new();
        let mut tried: HashSet<PacketId> = HashSet::new();

        for (name, id, path) in candidates {
            tried.insert(id.clone());
            let candidate = self.packet_dir(name, id).join(path);
            if !candidate.is_file() {
                continue;
            }
            match outpack_hash::validate_file(&candidate, hash, path.clone()) {
                Ok(()) => return Ok((candidate, rejected)),
                Err(_) => {
                    warn!(packet = %id, path, "archive copy does not match declared hash");
                    rejected.push(RejectedFile {
                        packet: id.clone(),
                        path: path.clone(),
                        expected: hash.clone(),
                    });
                }
            }
        }

        for (id, meta) in index.all_metadata() {
            if tried.contains(id) {
                continue;
            }
            for file in &meta.files {
                if &file.hash != hash {
                    continue;
                }
                let candidate = self.packet_dir(&meta.name, id).join(&file.path);
                if !candidate.is_file() {
                    continue;
                }
                match outpack_hash::validate_file(&candidate, hash, file.path.clone()) {
                    Ok(()) => return Ok((candidate, rejected)),
                    Err(_) => {
                        rejected.push(RejectedFile {
                            packet: id.clone(),
                            path: file.path.clone(),
                            expected: hash.clone(),
                        });
                    }
                }
            }
        }

        Err(StoreError::FileNotFound(hash.clone()))
    }
}
