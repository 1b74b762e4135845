use std::path::{Path, PathBuf};

use fs_err as fs;
use outpack_hash::{Algorithm, Hash};
use tracing::trace;

use crate::StoreError;

/// A content-addressed blob store keyed by hash.
///
/// Layout: `<root>/<aa>/<rest>` where `aa` is the first two hex characters
/// of the digest, bounding per-directory fan-out (`spec.md` §4.b).
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    algorithm: Algorithm,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>, algorithm: Algorithm) -> Self {
        Self {
            root: root.into(),
            algorithm,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The path a blob with the given hash would live at, whether or not it
    /// exists yet.
    pub fn filename(&self, hash: &Hash) -> PathBuf {
        self.root
            .join(hash.fan_out_prefix())
            .join(hash.fan_out_rest())
    }

    pub fn exists(&self, hash: &Hash) -> bool {
        self.filename(hash).is_file()
    }

    /// Hash `path` and move-or-copy it into its content-addressed slot.
    ///
    /// Idempotent: a second `put` of the same content is a no-op write (the
    /// slot is simply overwritten by an identical file). Concurrent `put`s
    /// of the same hash are safe because the final write always goes
    /// through a temp file in the destination directory followed by a
    /// rename (`spec.md` §5, "Atomicity").
    pub fn put(&self, path: &Path) -> Result<Hash, StoreError> {
        let hash = outpack_hash::hash_file(self.algorithm, path)?;
        if self.exists(&hash) {
            return Ok(hash);
        }
        let dest = self.filename(&hash);
        let dir = dest.parent().expect("fan-out directory always present");
        fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        match fs::hard_link(path, tmp.path()) {
            Ok(()) => {}
            Err(_) => {
                // Cross-device link, or hardlinks unsupported: fall back to copy.
                drop(tmp);
                tmp = tempfile::NamedTempFile::new_in(dir)?;
                fs::copy(path, tmp.path())?;
            }
        }
        match tmp.persist(&dest) {
            Ok(_) => {}
            Err(e) if dest.is_file() => {
                // Another `put` of the same content won the race; that's fine.
                trace!(hash = %hash, "lost race to persist identical blob");
                drop(e);
            }
            Err(e) => return Err(e.error.into()),
        }
        Ok(hash)
    }

    /// Copy the blob for `hash` to `dest`.
    pub fn get(&self, hash: &Hash, dest: &Path, overwrite: bool) -> Result<(), StoreError> {
        let src = self.filename(hash);
        if !src.is_file() {
            return Err(StoreError::FileNotFound(hash.clone()));
        }
        if dest.exists() && !overwrite {
            return Ok(());
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&src, dest)?;
        Ok(())
    }

    /// List every hash present in the store.
    pub fn ls(&self) -> Result<Vec<Hash>, StoreError> {
        let mut hashes = Vec::new();
        if !self.root.is_dir() {
            return Ok(hashes);
        }
        for prefix_entry in fs::read_dir(&self.root)? {
            let prefix_entry = prefix_entry?;
            if !prefix_entry.file_type()?.is_dir() {
                continue;
            }
            let prefix = prefix_entry.file_name().to_string_lossy().into_owned();
            for rest_entry in fs::read_dir(prefix_entry.path())? {
                let rest_entry = rest_entry?;
                let rest = rest_entry.file_name().to_string_lossy().into_owned();
                if let Ok(hash) = format!("{}:{prefix}{rest}", self.algorithm).parse() {
                    hashes.push(hash);
                }
            }
        }
        hashes.sort();
        Ok(hashes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &Path) -> FileStore {
        FileStore::new(dir.join("files"), Algorithm::Sha256)
    }

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let src = dir.path().join("a.txt");
        fs::write(&src, b"hello").unwrap();

        let hash = store.put(&src).unwrap();
        assert!(store.exists(&hash));

        let dest = dir.path().join("out.txt");
        store.get(&hash, &dest, false).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"hello");
    }

    #[test]
    fn put_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let src = dir.path().join("a.txt");
        fs::write(&src, b"hello").unwrap();

        let hash1 = store.put(&src).unwrap();
        let hash2 = store.put(&src).unwrap();
        assert_eq!(hash1, hash2);
    }

    #[test]
    fn get_missing_hash_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let hash = outpack_hash::hash_bytes(Algorithm::Sha256, b"nope");
        let err = store.get(&hash, &dir.path().join("out"), false).unwrap_err();
        assert!(matches!(err, StoreError::FileNotFound(_)));
    }

    #[test]
    fn ls_lists_stored_hashes() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let src1 = dir.path().join("a.txt");
        let src2 = dir.path().join("b.txt");
        fs::write(&src1, b"hello").unwrap();
        fs::write(&src2, b"world").unwrap();
        let h1 = store.put(&src1).unwrap();
        let h2 = store.put(&src2).unwrap();

        let mut expected = vec![h1, h2];
        expected.sort();
        assert_eq!(store.ls().unwrap(), expected);
    }
}
