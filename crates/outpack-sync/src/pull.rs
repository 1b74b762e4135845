use std::collections::{BTreeSet, HashMap};
use std::io::Write;
use std::path::Path;

use fs_err as fs;
use outpack_config::{Config, LOCATION_LOCAL, LOCATION_ORPHAN};
use outpack_index::Index;
use outpack_location::LocationDriver;
use outpack_metadata::{MetadataCore, PacketId, PacketLocation};
use outpack_store::{Archive, FileStore};
use tracing::{debug, info};

use crate::SyncError;

fn is_reserved(name: &str) -> bool {
    name == LOCATION_LOCAL || name == LOCATION_ORPHAN
}

/// Write `bytes` to `path` via a temp file in the same directory followed
/// by a rename (`spec.md` §5, "Atomicity").
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), SyncError> {
    let dir = path.parent().expect("always has a parent under .outpack");
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.persist(path).map_err(|e| SyncError::Io(e.error))?;
    Ok(())
}

/// Pull metadata from each named location into `index`, persisting new
/// metadata blobs and membership rows under `root` (`spec.md` §4.j, "Pull
/// metadata").
///
/// Locations are processed one at a time; a location whose cross-check
/// fails aborts the whole call immediately, leaving state from locations
/// processed earlier in this same call persisted (they already passed
/// their own cross-check) and the failing location's state untouched.
pub async fn pull_metadata(
    root: &Path,
    config: &Config,
    index: &mut Index,
    drivers: &HashMap<String, Box<dyn LocationDriver>>,
    locations: &[String],
) -> Result<(), SyncError> {
    for name in locations {
        if is_reserved(name) {
            continue;
        }
        let driver = drivers
            .get(name)
            .ok_or_else(|| SyncError::UnknownLocation(name.clone()))?;

        let remote = driver.list_packets().await?;
        debug!(location = %name, count = remote.len(), "listed remote packets");

        // Cross-check first: a packet already known locally must agree on
        // its metadata hash with every location that claims it.
        let mut conflicts = Vec::new();
        for (id, loc) in &remote {
            if let Some(existing) = index.metadata(id) {
                let existing_hash = existing
                    .canonical_hash(config.core.hash_algorithm)
                    .unwrap_or_else(|_| loc.hash.clone());
                if existing_hash != loc.hash {
                    conflicts.push(id.clone());
                }
            }
        }
        if !conflicts.is_empty() {
            return Err(SyncError::ConflictingMetadata {
                location: name.clone(),
                ids: conflicts,
            });
        }

        let new_ids: Vec<PacketId> = remote
            .keys()
            .filter(|id| index.metadata(id).is_none())
            .cloned()
            .collect();

        if !new_ids.is_empty() {
            let fetched = driver.metadata(&new_ids).await?;
            for id in &new_ids {
                let text = fetched
                    .get(id)
                    .expect("driver promised metadata for every requested id");
                let reported_hash = &remote[id].hash;
                outpack_hash::validate_string(text, reported_hash, format!("metadata for '{id}'"))
                    .map_err(|_| SyncError::MetadataHashMismatch {
                        id: id.clone(),
                        location: name.clone(),
                    })?;

                write_atomic(&Index::metadata_path(root, id), text.as_bytes())?;
                let meta: MetadataCore = serde_json::from_str(text)?;
                index.insert_metadata(meta);
            }
        }

        for (id, loc) in &remote {
            let already_known = index
                .location(name)
                .is_some_and(|table| table.contains_key(id));
            if !already_known {
                write_atomic(
                    &Index::location_path(root, name, id),
                    &serde_json::to_vec(loc)?,
                )?;
                index.insert_location(name, loc.clone());
            }
        }
        info!(location = %name, new = new_ids.len(), "pulled metadata");
    }
    Ok(())
}

/// Of the dependency closure of `targets`, which locations claim each id,
/// preferring `priority` (caller-filtered locations, in order) before
/// falling back to any other non-reserved location.
fn dependency_closure(index: &Index, targets: &[PacketId]) -> BTreeSet<PacketId> {
    let mut closure: BTreeSet<PacketId> = BTreeSet::new();
    let mut stack: Vec<PacketId> = targets.to_vec();
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
    closure
}

fn choose_location<'a>(
    index: &Index,
    id: &PacketId,
    priority: &'a [String],
) -> Option<&'a str> {
    for name in priority {
        if index.location(name).is_some_and(|t| t.contains_key(id)) {
            return Some(name.as_str());
        }
    }
    None
}

/// The pre-fetch tally reported to the caller before any bytes move
/// (`spec.md` §4.j, "user-facing tally").
#[derive(Debug, Clone, Copy, Default)]
pub struct PullReport {
    pub files_already_present: usize,
    pub files_to_fetch: usize,
    pub bytes_to_fetch: u64,
}

/// Pull one or more packets (and, if recursive, their full dependency
/// closure) into the local repository (`spec.md` §4.j, "Pull packet(s)").
#[allow(clippy::too_many_arguments)]
pub async fn pull_packets(
    root: &Path,
    config: &Config,
    index: &mut Index,
    drivers: &HashMap<String, Box<dyn LocationDriver>>,
    ids: &[PacketId],
    recursive: Option<bool>,
    location_filter: Option<&[String]>,
    file_store: Option<&FileStore>,
    archive: Option<&Archive>,
) -> Result<Vec<PacketId>, SyncError> {
    let recursive = match recursive {
        Some(false) if config.core.require_complete_tree => {
            return Err(SyncError::RecursionRequired)
        }
        Some(r) => r,
        None => config.core.require_complete_tree,
    };

    let closure: BTreeSet<PacketId> = if recursive {
        dependency_closure(index, ids)
    } else {
        ids.iter().cloned().collect()
    };

    let priority: Vec<String> = {
        let mut names: Vec<String> = location_filter.map(<[String]>::to_vec).unwrap_or_default();
        let mut rest: Vec<String> = index
            .location_names()
            .filter(|n| !is_reserved(n) && !names.contains(&(*n).to_string()))
            .map(std::string::ToString::to_string)
            .collect();
        rest.sort();
        names.append(&mut rest);
        names
    };

    let mut plan: Vec<(PacketId, String)> = Vec::new();
    let mut missing_dependencies: Vec<PacketId> = Vec::new();
    for id in &closure {
        if index.unpacked().contains(id) {
            continue;
        }
        match choose_location(index, id, &priority) {
            Some(loc) => plan.push((id.clone(), loc.to_string())),
            None if ids.contains(id) => {
                let location_hint = priority.first().cloned().unwrap_or_default();
                return Err(SyncError::PacketNotFound(id.clone(), location_hint));
            }
            None => missing_dependencies.push(id.clone()),
        }
    }
    if !missing_dependencies.is_empty() {
        let location_hint = priority.first().cloned().unwrap_or_default();
        return Err(SyncError::MissingDependencies {
            requested: ids.to_vec(),
            missing: missing_dependencies,
            location: location_hint,
        });
    }
    plan.sort_by(|a, b| a.0.cmp(&b.0));

    let mut report = PullReport::default();
    if let Some(store) = file_store {
        for (id, _) in &plan {
            let Some(meta) = index.metadata(id) else { continue };
            for file in &meta.files {
                if store.exists(&file.hash) {
                    report.files_already_present += 1;
                } else {
                    report.files_to_fetch += 1;
                    report.bytes_to_fetch += file.size;
                }
            }
        }
    }
    debug!(?report, "pull tally computed");

    let mut newly_unpacked = Vec::new();
    for (id, location) in &plan {
        let meta = index
            .metadata(id)
            .cloned()
            .ok_or_else(|| SyncError::PacketNotFound(id.clone(), location.clone()))?;
        let driver = drivers
            .get(location)
            .ok_or_else(|| SyncError::UnknownLocation(location.clone()))?;

        let staging = tempfile::tempdir()?;
        for file in &meta.files {
            let already = file_store.is_some_and(|s| s.exists(&file.hash));
            if already {
                continue;
            }
            let dest = staging.path().join(&file.path);
            driver.fetch_file(id, &file.hash, &dest).await?;
            if let Some(store) = file_store {
                store.put(&dest)?;
            }
        }

        if let Some(archive) = archive {
            // Files already present in the store still need to land in the
            // archive; re-fetch from the store if available, otherwise from
            // wherever we just staged them.
            for file in &meta.files {
                let dest = staging.path().join(&file.path);
                if !dest.is_file() {
                    if let Some(store) = file_store {
                        store.get(&file.hash, &dest, false)?;
                    }
                }
            }
            archive.import_packet(&meta, staging.path())?;
        }

        let local_row = PacketLocation {
            packet: id.clone(),
            time: meta.time.end,
            hash: meta.canonical_hash(config.core.hash_algorithm)?,
        };
        write_atomic(
            &Index::location_path(root, LOCATION_LOCAL, id),
            &serde_json::to_vec(&local_row)?,
        )?;
        index.insert_location(LOCATION_LOCAL, local_row);
        newly_unpacked.push(id.clone());
    }

    Ok(newly_unpacked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use outpack_config::{Config, LocationKind};
    use outpack_hash::Algorithm;
    use outpack_location::PathDriver;
    use outpack_metadata::{PacketFile, TimeRange};
    use std::collections::HashMap as StdHashMap;

    fn init_repo(root: &Path) -> Config {
        fs::create_dir_all(root.join(".outpack")).unwrap();
        let config = Config::new(None, true, false).unwrap();
        outpack_config::write_config(&config, root).unwrap();
        config
    }

    fn write_packet(root: &Path, content: &[u8]) -> PacketId {
        let store = FileStore::new(root.join(".outpack").join("files"), Algorithm::Sha256);
        let src = tempfile::NamedTempFile::new().unwrap();
        fs::write(src.path(), content).unwrap();
        let hash = store.put(src.path()).unwrap();

        let id = PacketId::generate(chrono::Utc::now());
        let meta = MetadataCore::new(
            id.clone(),
            "data",
            Default::default(),
            TimeRange { start: 0.0, end: 1.0 },
            vec![PacketFile { path: "data".into(), hash: hash.clone(), size: content.len() as u64 }],
            vec![],
            None,
            Default::default(),
        );
        write_atomic(
            &Index::metadata_path(root, &id),
            &serde_json::to_vec(&meta).unwrap(),
        )
        .unwrap();
        let loc = PacketLocation {
            packet: id.clone(),
            time: 1.0,
            hash: meta.canonical_hash(Algorithm::Sha256).unwrap(),
        };
        write_atomic(
            &Index::location_path(root, LOCATION_LOCAL, &id),
            &serde_json::to_vec(&loc).unwrap(),
        )
        .unwrap();
        id
    }

    #[tokio::test]
    async fn pull_metadata_replicates_location_table() {
        let up_dir = tempfile::tempdir().unwrap();
        init_repo(up_dir.path());
        let ids: Vec<_> = (0..3).map(|i| write_packet(up_dir.path(), format!("content-{i}").as_bytes())).collect();

        let dn_dir = tempfile::tempdir().unwrap();
        let mut dn_config = init_repo(dn_dir.path());
        dn_config
            .add_location("up", LocationKind::parse(&up_dir.path().to_string_lossy()).unwrap())
            .unwrap();
        outpack_config::write_config(&dn_config, dn_dir.path()).unwrap();

        let mut dn_index = Index::open(dn_dir.path()).unwrap();
        let mut drivers: StdHashMap<String, Box<dyn LocationDriver>> = StdHashMap::new();
        drivers.insert("up".to_string(), Box::new(PathDriver::open(up_dir.path()).unwrap()));

        pull_metadata(dn_dir.path(), &dn_config, &mut dn_index, &drivers, &["up".to_string()])
            .await
            .unwrap_or_else(|e| panic!("{e}"));

        assert_eq!(dn_index.all_metadata().len(), 3);
        assert_eq!(dn_index.location("up").unwrap().len(), 3);
        assert!(dn_index.location("local").is_none());
        for id in &ids {
            assert!(dn_index.metadata(id).is_some());
        }
    }
}
