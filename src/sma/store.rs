//! Content-addressed on-disk cache of SMA artifacts.
//!
//! One `.sma` file per predicate key. Writes go to a temp file in the same
//! directory and land with an atomic rename, so a concurrent reader never
//! observes a partial artifact and the last writer for a key wins.

use std::fs;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::warn;

use super::{format, Sma};
use crate::error::{Result, SmaqError};

#[derive(Debug, Clone)]
pub struct SmaStore {
    base_dir: PathBuf,
}

impl SmaStore {
    /// Open (creating if needed) an artifact store rooted at `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir).map_err(|source| SmaqError::StoreWrite {
            path: base_dir.clone(),
            source,
        })?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn artifact_path(&self, key: &str) -> PathBuf {
        self.base_dir.join(format!("{key}.sma"))
    }

    /// Return the artifact for `key` if present and decodable.
    ///
    /// A corrupt artifact is deleted and reported absent; the caller falls
    /// back to a full scan and a later build replaces it.
    pub fn lookup(&self, key: &str) -> Option<Sma> {
        let path = self.artifact_path(key);
        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to open index artifact");
                return None;
            }
        };
        match format::decode(BufReader::new(file)) {
            Ok(sma) => Some(sma),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "corrupt index artifact, removing");
                let _ = fs::remove_file(&path);
                None
            }
        }
    }

    /// Atomically write the artifact for `key`, replacing any prior one.
    pub fn put(&self, key: &str, sma: &Sma) -> Result<()> {
        let path = self.artifact_path(key);
        let store_write = |source: io::Error| SmaqError::StoreWrite {
            path: path.clone(),
            source,
        };

        let mut tmp = NamedTempFile::new_in(&self.base_dir).map_err(store_write)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            format::encode(sma, &mut writer).map_err(store_write)?;
            writer.flush().map_err(store_write)?;
        }
        tmp.persist(&path).map_err(|err| SmaqError::StoreWrite {
            path: path.clone(),
            source: err.error,
        })?;
        Ok(())
    }

    /// Delete the artifact for `key`. Returns whether one existed; a missing
    /// artifact is not an error.
    pub fn remove(&self, key: &str) -> bool {
        let path = self.artifact_path(key);
        match fs::remove_file(&path) {
            Ok(()) => true,
            Err(err) if err.kind() == io::ErrorKind::NotFound => false,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to remove index artifact");
                false
            }
        }
    }

    /// All keys with an artifact on disk, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.base_dir).map_err(|source| SmaqError::StoreRead {
            path: self.base_dir.clone(),
            source,
        })?;
        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| SmaqError::StoreRead {
                path: self.base_dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("sma") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    keys.push(stem.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Remove every artifact, returning how many were deleted.
    pub fn clear(&self) -> Result<usize> {
        let keys = self.list()?;
        let mut removed = 0;
        for key in keys {
            if self.remove(&key) {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
