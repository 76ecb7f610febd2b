// Blob store seam and a directory-backed implementation

use anyhow::Result;
use async_trait::async_trait;
use log::debug;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// An archive found in the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub location: PathBuf,
}

/// Exclusive right to fill one key
#[derive(Debug, Clone)]
pub struct Reservation {
    pub key: String,
    lock: PathBuf,
}

/// Generic blob cache keyed by strings.
///
/// `reserve` returns `None` when the key is already taken, which callers
/// treat as "someone else saved this already".
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Exact `key` first, then the newest entry matching a restore prefix
    async fn lookup(&self, key: &str, restore_keys: &[String]) -> Result<Option<CacheEntry>>;

    async fn download(&self, entry: &CacheEntry, dest: &Path) -> Result<()>;

    async fn reserve(&self, key: &str) -> Result<Option<Reservation>>;

    async fn upload(&self, reservation: Reservation, archive: &Path) -> Result<()>;

    /// Give a reservation back without uploading
    async fn release(&self, reservation: Reservation) -> Result<()>;
}

/// Compute the SHA-256 hex digest used to name stored blobs
pub fn key_digest(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Stores archives as `<sha256(key)>.tgz` next to a `.key` file holding the
/// original key, so prefix lookups can scan keys without decoding names.
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn archive_path(&self, digest: &str) -> PathBuf {
        self.root.join(format!("{}.tgz", digest))
    }

    fn key_path(&self, digest: &str) -> PathBuf {
        self.root.join(format!("{}.key", digest))
    }

    fn lock_path(&self, digest: &str) -> PathBuf {
        self.root.join(format!("{}.lock", digest))
    }

    fn newest_with_prefix(&self, prefix: &str) -> Result<Option<CacheEntry>> {
        if !self.root.exists() {
            return Ok(None);
        }

        let mut best: Option<(SystemTime, CacheEntry)> = None;
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) != Some("key") {
                continue;
            }
            let key = fs::read_to_string(&path)?;
            if !key.starts_with(prefix) {
                continue;
            }
            let archive = path.with_extension("tgz");
            let Ok(modified) = fs::metadata(&archive).and_then(|m| m.modified()) else {
                continue;
            };
            if best.as_ref().is_none_or(|(time, _)| modified > *time) {
                best = Some((
                    modified,
                    CacheEntry {
                        key,
                        location: archive,
                    },
                ));
            }
        }
        Ok(best.map(|(_, entry)| entry))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn lookup(&self, key: &str, restore_keys: &[String]) -> Result<Option<CacheEntry>> {
        let exact = self.archive_path(&key_digest(key));
        if exact.is_file() {
            return Ok(Some(CacheEntry {
                key: key.to_string(),
                location: exact,
            }));
        }

        for prefix in restore_keys {
            if let Some(entry) = self.newest_with_prefix(prefix)? {
                debug!("Cache prefix '{}' matched key '{}'", prefix, entry.key);
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    async fn download(&self, entry: &CacheEntry, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&entry.location, dest)?;
        Ok(())
    }

    async fn reserve(&self, key: &str) -> Result<Option<Reservation>> {
        fs::create_dir_all(&self.root)?;
        let digest = key_digest(key);
        if self.archive_path(&digest).exists() {
            return Ok(None);
        }

        let lock = self.lock_path(&digest);
        match fs::OpenOptions::new().write(true).create_new(true).open(&lock) {
            Ok(_) => Ok(Some(Reservation {
                key: key.to_string(),
                lock,
            })),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn upload(&self, reservation: Reservation, archive: &Path) -> Result<()> {
        let digest = key_digest(&reservation.key);
        let target = self.archive_path(&digest);
        let partial = target.with_extension("tgz.partial");

        let stored = fs::copy(archive, &partial)
            .and_then(|_| fs::rename(&partial, &target))
            .and_then(|_| fs::write(self.key_path(&digest), &reservation.key));
        if stored.is_err() {
            let _ = fs::remove_file(&partial);
        }
        self.release(reservation).await?;
        stored?;
        Ok(())
    }

    async fn release(&self, reservation: Reservation) -> Result<()> {
        match fs::remove_file(&reservation.lock) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}
