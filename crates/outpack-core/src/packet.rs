//! The packet authoring lifecycle: stage, accumulate, finalize
//! (`spec.md` §4.h), grounded on the teacher's stage-then-build pattern in
//! `puffin-distribution/src/source/mod.rs` and `puffin-build`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use outpack_hash::Hash;
use outpack_metadata::{
    Dependency, FileMapping, GitInfo, MetadataCore, PacketFile, PacketId, ParameterValue, TimeRange,
};
use tracing::debug;

use crate::error::{Error, Result};
use crate::root::Root;
use crate::search::{search_unique, Universe};

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before the epoch")
        .as_secs_f64()
}

/// Paths excluded when walking the staging directory to compute the final
/// file list: build-artifact directories and dotfiles, generalizing
/// `original_source/src/outpack/util.py::all_normal_files`'s `__pycache__`
/// exclusion to the Rust ecosystem's own convention (`spec.md` §4.h
/// supplement).
fn is_transient(component: &std::path::Component<'_>) -> bool {
    match component.as_os_str().to_str() {
        Some("target" | ".git") => true,
        Some(s) => s.starts_with('.'),
        None => false,
    }
}

fn walk_staging(staging: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in walkdir::WalkDir::new(staging).into_iter().filter_entry(|e| {
        let rel = e.path().strip_prefix(staging).unwrap_or(e.path());
        !rel.components().any(|c| is_transient(&c))
    }) {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.file_type().is_file() {
            out.push(entry.path().strip_prefix(staging).unwrap().to_path_buf());
        }
    }
    out.sort();
    Ok(out)
}

/// A packet's run in progress: accumulates declared outputs, dependencies
/// and custom metadata until `end()` is called.
pub struct Packet<'a> {
    root: &'a mut Root,
    staging_dir: PathBuf,
    name: String,
    id: PacketId,
    start_time: f64,
    parameters: BTreeMap<String, ParameterValue>,
    depends: Vec<Dependency>,
    custom: BTreeMap<String, serde_json::Value>,
    immutable: BTreeMap<String, Hash>,
    git: Option<GitInfo>,
    ended: bool,
}

impl<'a> Packet<'a> {
    pub fn new(
        root: &'a mut Root,
        staging_dir: impl Into<PathBuf>,
        name: impl Into<String>,
        id: Option<PacketId>,
        parameters: BTreeMap<String, ParameterValue>,
    ) -> Self {
        let now = now_secs();
        Self {
            root,
            staging_dir: staging_dir.into(),
            name: name.into(),
            id: id.unwrap_or_else(|| PacketId::generate(chrono::Utc::now())),
            start_time: now,
            parameters,
            depends: Vec::new(),
            custom: BTreeMap::new(),
            immutable: BTreeMap::new(),
            git: None,
            ended: false,
        }
    }

    pub fn id(&self) -> &PacketId {
        &self.id
    }

    pub fn set_git(&mut self, git: GitInfo) {
        self.git = Some(git);
    }

    /// Resolve `query` against the local index and copy the dependency's
    /// files into the staging area honoring the `here -> there` mapping
    /// (`spec.md` §4.h, `use_dependency`). Uses [`search_unique`] rather than
    /// plain `search`: declaring a dependency on a query that resolves to
    /// more than one packet is an authoring mistake that should fail
    /// outright, not silently pick the lexicographic max.
    ///
    /// Open question carried forward unresolved upstream: whether this
    /// should also search remote-known packets rather than local only
    /// (`spec.md` §9); this implementation matches the source's local-only
    /// behavior.
    pub fn use_dependency(&mut self, query: &str, files: Vec<FileMapping>) -> Result<()> {
        let found = search_unique(self.root.index(), query, Universe::Local)?;
        let meta = self
            .root
            .index()
            .metadata(&found)
            .expect("search only returns ids present in the index")
            .clone();

        for mapping in &files {
            let source_file = meta
                .files
                .iter()
                .find(|f| f.path == mapping.there)
                .ok_or_else(|| Error::UnknownPacketFile(found.clone(), mapping.there.clone()))?;
            let source = self.root.find_file_by_hash(&source_file.hash, &[found.clone()])?;
            let dest = self.staging_dir.join(&mapping.here);
            if let Some(parent) = dest.parent() {
                fs_err::create_dir_all(parent)?;
            }
            fs_err::copy(source, dest)?;
        }

        self.depends.push(Dependency {
            packet: found,
            query: query.to_string(),
            files,
        });
        Ok(())
    }

    /// Record a namespaced custom metadata blob. Each namespace may be set
    /// at most once (`spec.md` §4.h).
    pub fn add_custom(&mut self, namespace: &str, value: serde_json::Value) -> Result<()> {
        if self.custom.contains_key(namespace) {
            return Err(Error::DuplicateCustomKey(namespace.to_string()));
        }
        self.custom.insert(namespace.to_string(), value);
        Ok(())
    }

    /// Mark a staging-relative path as immutable, recording its hash at
    /// this moment (`spec.md` §4.h).
    pub fn mark_immutable(&mut self, path: &str) -> Result<()> {
        let full = self.staging_dir.join(path);
        let hash = outpack_hash::hash_file(self.root.config().core.hash_algorithm, &full)?;
        self.immutable.insert(path.to_string(), hash);
        Ok(())
    }

    /// Finalize the packet (`spec.md` §4.h, `end`).
    ///
    /// `insert = false` is a cancellation: a sentinel is written to the
    /// staging area but the root is not mutated.
    pub fn end(mut self, insert: bool) -> Result<PacketId> {
        if self.ended {
            return Err(Error::PacketAlreadyEnded);
        }
        self.ended = true;

        for (path, expected) in &self.immutable {
            let full = self.staging_dir.join(path);
            outpack_hash::validate_file(&full, expected, path.clone()).map_err(|_| {
                Error::ImmutableFileChanged {
                    path: path.clone(),
                }
            })?;
        }

        if !insert {
            fs_err::write(self.staging_dir.join(".outpack_cancelled"), b"")?;
            return Ok(self.id);
        }

        let paths = walk_staging(&self.staging_dir)?;
        let algorithm = self.root.config().core.hash_algorithm;
        let mut files = Vec::with_capacity(paths.len());
        for relative in &paths {
            let full = self.staging_dir.join(relative);
            let hash = outpack_hash::hash_file(algorithm, &full)?;
            let size = fs_err::metadata(&full)?.len();
            files.push(PacketFile {
                path: relative.to_string_lossy().replace('\\', "/"),
                hash,
                size,
            });
        }

        let end_time = now_secs();
        let meta = MetadataCore::new(
            self.id.clone(),
            self.name.clone(),
            self.parameters.clone(),
            TimeRange {
                start: self.start_time,
                end: end_time,
            },
            files,
            self.depends.clone(),
            self.git.clone(),
            self.custom.clone(),
        );

        if let Some(store) = self.root.file_store() {
            for relative in &paths {
                store.put(&self.staging_dir.join(relative))?;
            }
        }
        if let Some(archive) = self.root.archive() {
            archive.import_packet(&meta, &self.staging_dir)?;
        }

        fs_err::create_dir_all(self.root.path().join(".outpack").join("metadata"))?;
        fs_err::write(
            outpack_index::Index::metadata_path(self.root.path(), &self.id),
            outpack_metadata::to_canonical_json(&meta)?,
        )?;

        let local_row = outpack_metadata::PacketLocation {
            packet: self.id.clone(),
            time: end_time,
            hash: meta.canonical_hash(algorithm)?,
        };
        fs_err::create_dir_all(
            self.root
                .path()
                .join(".outpack")
                .join("location")
                .join(outpack_config::LOCATION_LOCAL),
        )?;
        fs_err::write(
            outpack_index::Index::location_path(self.root.path(), outpack_config::LOCATION_LOCAL, &self.id),
            serde_json::to_vec(&local_row)?,
        )?;

        self.root.index_mut().insert_metadata(meta);
        self.root
            .index_mut()
            .insert_location(outpack_config::LOCATION_LOCAL, local_row);
        debug!(id = %self.id, "packet finalized");

        Ok(self.id)
    }
}
