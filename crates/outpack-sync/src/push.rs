use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use outpack_config::{LOCATION_LOCAL, LOCATION_ORPHAN};
use outpack_hash::Hash;
use outpack_index::Index;
use outpack_location::LocationDriver;
use outpack_metadata::PacketId;
use outpack_store::{Archive, FileStore};
use tracing::info;

use crate::SyncError;

fn is_reserved(name: &str) -> bool {
    name == LOCATION_LOCAL || name == LOCATION_ORPHAN
}

/// The set of packets and files a push would transfer, computed without
/// moving any bytes (`spec.md` §4.k, "Plan build").
#[derive(Debug, Clone, Default)]
pub struct PushPlan {
    pub packets: Vec<PacketId>,
    pub files: Vec<Hash>,
}

/// Push `ids` (and their dependency closure) to `target`, uploading every
/// file the target doesn't already have before uploading packet metadata,
/// in packet order (`spec.md` §4.k, §5 "Ordering").
#[allow(clippy::too_many_arguments)]
pub async fn push(
    root: &Path,
    index: &Index,
    hash_algorithm: outpack_hash::Algorithm,
    file_store: Option<&FileStore>,
    archive: Option<&Archive>,
    drivers: &HashMap<String, Box<dyn LocationDriver>>,
    target: &str,
    ids: &[PacketId],
) -> Result<PushPlan, SyncError> {
    if is_reserved(target) {
        return Err(SyncError::InvalidPushTarget(target.to_string()));
    }
    let driver = drivers
        .get(target)
        .ok_or_else(|| SyncError::UnknownLocation(target.to_string()))?;

    let mut closure: BTreeSet<PacketId> = BTreeSet::new();
    let mut stack: Vec<PacketId> = ids.to_vec();
    while let Some(id) = stack.pop() {
        if !closure.insert(id.clone()) {
            continue;
        }
        if let Some(meta) = index.metadata(&id) {
            for dep in &meta.depends {
                stack.push(dep.packet.clone());
            }
        }
    }
    let closure: Vec<PacketId> = closure.into_iter().collect();

    let missing_packets = driver.list_unknown_packets(&closure).await?;

    let mut missing_hashes: BTreeSet<Hash> = BTreeSet::new();
    for id in &missing_packets {
        if let Some(meta) = index.metadata(id) {
            for file in &meta.files {
                missing_hashes.insert(file.hash.clone());
            }
        }
    }
    let missing_hashes: Vec<Hash> = missing_hashes.into_iter().collect();
    let missing_files = driver.list_unknown_files(&missing_hashes).await?;

    let mut missing_packets = missing_packets;
    missing_packets.sort();

    for hash in &missing_files {
        let candidates: Vec<(String, PacketId, String)> = missing_packets
            .iter()
            .filter_map(|id| {
                let meta = index.metadata(id)?;
                meta.files
                    .iter()
                    .find(|f| &f.hash == hash)
                    .map(|f| (meta.name.clone(), id.clone(), f.path.clone()))
            })
            .collect();

        let source = find_source(index, file_store, archive, hash, &candidates)?;
        driver.push_file(&source, hash).await?;
    }

    for id in &missing_packets {
        let metadata_path = Index::metadata_path(root, id);
        let hash = index
            .metadata(id)
            .expect("packet in push plan must have local metadata")
            .canonical_hash(hash_algorithm)?;
        driver.push_metadata(&metadata_path, &hash).await?;
    }

    info!(location = target, packets = missing_packets.len(), files = missing_files.len(), "pushed");

    Ok(PushPlan {
        packets: missing_packets,
        files: missing_files,
    })
}

/// Locate a local copy of `hash`, preferring the `FileStore` and falling
/// back to the `Archive`'s candidate search (`spec.md` §4.g,
/// `find_file_by_hash`).
fn find_source(
    index: &Index,
    file_store: Option<&FileStore>,
    archive: Option<&Archive>,
    hash: &Hash,
    candidates: &[(String, PacketId, String)],
) -> Result<std::path::PathBuf, SyncError> {
    if let Some(store) = file_store {
        if store.exists(hash) {
            return Ok(store.filename(hash));
        }
    }
    let Some(archive) = archive else {
        return Err(SyncError::Store(outpack_store::StoreError::FileNotFound(
            hash.clone(),
        )));
    };
    let (path, _rejected) = archive.find_file(index, hash, candidates)?;
    Ok(path)
}
