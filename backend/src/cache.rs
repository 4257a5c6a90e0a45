use std::{
    fmt,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use chrono::{Local, NaiveDate};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::models::TrackPoint;

const CACHE_EXTENSION: &str = "json";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache i/o error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// FNV-1a, 64 bit. Stable across builds and toolchains, which matters
/// because keys name files that outlive the process.
pub fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:016x}", fnv1a64(bytes))
}

/// Cache key for one corridor query. Every input that changes the query
/// result is part of the key, so the key doubles as the file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn file_name(&self) -> String {
        format!("{}.{CACHE_EXTENSION}", self.0)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One file per key under `dir`, holding the provider response verbatim.
#[derive(Debug, Clone)]
pub struct QueryCache {
    dir: PathBuf,
}

impl QueryCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Key for a query issued today (local calendar date).
    pub fn make_key(path: &[TrackPoint], config_hash: &str, radius_m: f64) -> CacheKey {
        Self::make_key_on(path, config_hash, radius_m, Local::now().date_naive())
    }

    pub fn make_key_on(
        path: &[TrackPoint],
        config_hash: &str,
        radius_m: f64,
        day: NaiveDate,
    ) -> CacheKey {
        let serialized = path
            .iter()
            .map(|p| format!("{:?} {:?}", p.lat, p.lon))
            .collect::<Vec<_>>()
            .join(",");
        CacheKey(format!(
            "{}_{}_{}_{}",
            content_hash(serialized.as_bytes()),
            config_hash,
            radius_m,
            day.format("%Y-%m-%d")
        ))
    }

    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// `None` on a miss. Read failures other than a missing file are logged
    /// and reported as a miss too.
    pub fn get(&self, key: &CacheKey) -> Option<Vec<u8>> {
        let path = self.entry_path(key);
        match fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => {
                tracing::warn!("ignoring unreadable cache entry {}: {}", path.display(), err);
                None
            }
        }
    }

    /// Writes through a temporary file in the cache directory and renames it
    /// into place, so readers never observe a partial entry.
    pub fn put(&self, key: &CacheKey, bytes: &[u8]) -> Result<(), CacheError> {
        let io_err = |source| CacheError::Io {
            path: self.dir.clone(),
            source,
        };
        fs::create_dir_all(&self.dir).map_err(io_err)?;

        let mut file = NamedTempFile::new_in(&self.dir).map_err(io_err)?;
        file.write_all(bytes).map_err(io_err)?;
        file.flush().map_err(io_err)?;

        let target = self.entry_path(key);
        file.persist(&target).map_err(|err| CacheError::Io {
            path: target.clone(),
            source: err.error,
        })?;
        tracing::debug!("cached {} bytes under {}", bytes.len(), target.display());
        Ok(())
    }

    /// Deletes entries last modified more than `max_age` ago and returns how
    /// many were removed. Keys never repeat across days, so this is the only
    /// thing that bounds the directory's growth.
    pub fn sweep_older_than(&self, max_age: Duration) -> Result<usize, CacheError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(source) => {
                return Err(CacheError::Io {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let now = SystemTime::now();
        let mut removed = 0;
        for entry in entries {
            let entry = entry.map_err(|source| CacheError::Io {
                path: self.dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(CACHE_EXTENSION) {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|meta| meta.modified())
                .map_err(|source| CacheError::Io {
                    path: path.clone(),
                    source,
                })?;
            let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
            if age > max_age {
                fs::remove_file(&path).map_err(|source| CacheError::Io {
                    path: path.clone(),
                    source,
                })?;
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::info!("swept {} stale cache entries from {}", removed, self.dir.display());
        }
        Ok(removed)
    }
}
