// Cache layer: archive a file or directory into the blob store and back

pub mod store;

pub use store::{BlobStore, LocalBlobStore};

use crate::constants;
use crate::installer::{DownloadPolicy, VimType};
use crate::platform::Platform;
use crate::version::FixedVersion;
use anyhow::Result;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use log::{debug, info, warn};
use std::fs::{self, File};
use std::path::Path;

/// What happened to a save request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// Another run holds or already filled this key
    AlreadyReserved,
    /// Archive size in bytes exceeded the ceiling
    TooLarge(u64),
}

/// Composite key for a finished installation.
///
/// Equal inputs always give the same key and every input is a distinct
/// dash-separated field, so different inputs never collide.
pub fn make_key(
    platform: Platform,
    vim_type: VimType,
    is_gui: bool,
    download: DownloadPolicy,
    version: &FixedVersion,
) -> String {
    format!(
        "{}-{}-{}-{}-{}-{}",
        constants::CACHE_KEY_VERSION,
        platform,
        vim_type,
        if is_gui { "gui" } else { "cui" },
        download,
        version
    )
}

fn pack(target: &Path, archive: &Path) -> Result<()> {
    let name = target
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("Cannot archive {}", target.display()))?;
    if let Some(parent) = archive.parent() {
        fs::create_dir_all(parent)?;
    }

    let encoder = GzEncoder::new(File::create(archive)?, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);
    if target.is_dir() {
        builder.append_dir_all(name, target)?;
    } else {
        builder.append_path_with_name(target, name)?;
    }
    builder.into_inner()?.finish()?;
    Ok(())
}

fn unpack(archive: &Path, target: &Path) -> Result<()> {
    let parent = target
        .parent()
        .ok_or_else(|| anyhow::anyhow!("Cannot restore into {}", target.display()))?;
    fs::create_dir_all(parent)?;
    let mut archive = tar::Archive::new(GzDecoder::new(File::open(archive)?));
    archive.unpack(parent)?;
    Ok(())
}

/// Restore `target` (a file or directory) from the store.
///
/// Returns the key that matched, or `None` on a miss.
pub async fn restore_path(
    store: &dyn BlobStore,
    target: &Path,
    key: &str,
    restore_keys: &[String],
    temp_dir: &Path,
) -> Result<Option<String>> {
    let Some(entry) = store.lookup(key, restore_keys).await? else {
        return Ok(None);
    };

    let archive = temp_dir.join(format!("restore-{}.tgz", store::key_digest(&entry.key)));
    store.download(&entry, &archive).await?;
    unpack(&archive, target)?;
    fs::remove_file(&archive)?;
    Ok(Some(entry.key))
}

/// Save `target` under `key`, refusing archives above `size_limit`.
pub async fn save_path(
    store: &dyn BlobStore,
    target: &Path,
    key: &str,
    temp_dir: &Path,
    size_limit: u64,
) -> Result<SaveOutcome> {
    let Some(reservation) = store.reserve(key).await? else {
        debug!("Unable to reserve cache key: {}", key);
        return Ok(SaveOutcome::AlreadyReserved);
    };

    let archive = temp_dir.join(format!("save-{}.tgz", store::key_digest(key)));
    if let Err(e) = pack(target, &archive) {
        store.release(reservation).await?;
        return Err(e);
    }

    let size = match fs::metadata(&archive) {
        Ok(metadata) => metadata.len(),
        Err(e) => {
            store.release(reservation).await?;
            return Err(e.into());
        }
    };
    debug!("Cache Key: {}", key);
    debug!("Archive Size: {}", size);
    if size > size_limit {
        store.release(reservation).await?;
        fs::remove_file(&archive)?;
        return Ok(SaveOutcome::TooLarge(size));
    }

    // A failed upload must not leave the key reserved for later runs
    if let Err(e) = store.upload(reservation.clone(), &archive).await {
        let _ = fs::remove_file(&archive);
        store.release(reservation).await?;
        return Err(e);
    }
    fs::remove_file(&archive)?;
    Ok(SaveOutcome::Saved)
}

/// Restore a previous installation into `install_dir`
pub async fn restore_install(
    store: &dyn BlobStore,
    key: &str,
    install_dir: &Path,
    temp_dir: &Path,
) -> Result<bool> {
    match restore_path(store, install_dir, key, &[], temp_dir).await? {
        Some(_) => {
            info!("Cache found for: {}", key);
            Ok(true)
        }
        None => {
            info!("Cache not found for: {}", key);
            Ok(false)
        }
    }
}

/// Save an installation. Conflicts and oversized archives are not errors.
pub async fn save_install(
    store: &dyn BlobStore,
    key: &str,
    install_dir: &Path,
    temp_dir: &Path,
) -> Result<SaveOutcome> {
    let outcome = save_path(store, install_dir, key, temp_dir, constants::CACHE_SIZE_LIMIT).await?;
    match outcome {
        SaveOutcome::Saved => info!("Cache saved with key: {}", key),
        SaveOutcome::AlreadyReserved => debug!("Cache already exists: {}", key),
        SaveOutcome::TooLarge(size) => warn!(
            "Cache size of ~{} MB ({} B) is over the {}MB limit, not saving cache.",
            size / (1024 * 1024),
            size,
            constants::CACHE_SIZE_LIMIT / (1024 * 1024)
        ),
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::{CacheEntry, Reservation};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    /// Local store whose first upload fails without touching the lock
    struct FailingFirstUpload {
        inner: LocalBlobStore,
        failed: AtomicBool,
    }

    #[async_trait]
    impl BlobStore for FailingFirstUpload {
        async fn lookup(&self, key: &str, restore_keys: &[String]) -> Result<Option<CacheEntry>> {
            self.inner.lookup(key, restore_keys).await
        }

        async fn download(&self, entry: &CacheEntry, dest: &Path) -> Result<()> {
            self.inner.download(entry, dest).await
        }

        async fn reserve(&self, key: &str) -> Result<Option<Reservation>> {
            self.inner.reserve(key).await
        }

        async fn upload(&self, reservation: Reservation, archive: &Path) -> Result<()> {
            if !self.failed.swap(true, Ordering::SeqCst) {
                anyhow::bail!("Upload rejected");
            }
            self.inner.upload(reservation, archive).await
        }

        async fn release(&self, reservation: Reservation) -> Result<()> {
            self.inner.release(reservation).await
        }
    }

    fn fixed(v: &str) -> FixedVersion {
        FixedVersion::new(v)
    }

    #[test]
    fn test_make_key_layout() {
        let key = make_key(
            Platform::Linux,
            VimType::Neovim,
            false,
            DownloadPolicy::Never,
            &fixed("v0.9.5"),
        );
        assert_eq!(key, "1.0.6-linux-neovim-cui-never-v0.9.5");
    }

    #[test]
    fn test_make_key_is_unique_per_input() {
        let mut keys = HashSet::new();
        let mut count = 0;
        for platform in [Platform::Linux, Platform::MacOs, Platform::Windows] {
            for vim_type in [VimType::Vim, VimType::Neovim, VimType::MacVim] {
                for gui in [true, false] {
                    for download in [
                        DownloadPolicy::Always,
                        DownloadPolicy::Available,
                        DownloadPolicy::Never,
                    ] {
                        for version in ["v8.2.0012", "v9.0.0000", "abc123"] {
                            let key = make_key(platform, vim_type, gui, download, &fixed(version));
                            assert_eq!(
                                key,
                                make_key(platform, vim_type, gui, download, &fixed(version))
                            );
                            keys.insert(key);
                            count += 1;
                        }
                    }
                }
            }
        }
        assert_eq!(keys.len(), count);
    }

    #[tokio::test]
    async fn test_save_and_restore_directory() {
        let temp = TempDir::new().unwrap();
        let store = LocalBlobStore::new(temp.path().join("store"));
        let install = temp.path().join("vim");
        fs::create_dir_all(install.join("bin")).unwrap();
        fs::write(install.join("bin").join("vim"), "#!/bin/sh\n").unwrap();

        let outcome = save_install(&store, "key-1", &install, temp.path()).await.unwrap();
        assert_eq!(outcome, SaveOutcome::Saved);

        fs::remove_dir_all(&install).unwrap();
        assert!(restore_install(&store, "key-1", &install, temp.path()).await.unwrap());
        assert_eq!(
            fs::read_to_string(install.join("bin").join("vim")).unwrap(),
            "#!/bin/sh\n"
        );

        assert!(!restore_install(&store, "key-2", &install, temp.path()).await.unwrap());
    }

    #[tokio::test]
    async fn test_second_save_is_benign() {
        let temp = TempDir::new().unwrap();
        let store = LocalBlobStore::new(temp.path().join("store"));
        let file = temp.path().join("release-cache-vim.json");
        fs::write(&file, "{}").unwrap();

        assert_eq!(
            save_install(&store, "k", &file, temp.path()).await.unwrap(),
            SaveOutcome::Saved
        );
        assert_eq!(
            save_install(&store, "k", &file, temp.path()).await.unwrap(),
            SaveOutcome::AlreadyReserved
        );
    }

    #[tokio::test]
    async fn test_oversized_archive_is_rejected_and_key_released() {
        let temp = TempDir::new().unwrap();
        let store = LocalBlobStore::new(temp.path().join("store"));
        let file = temp.path().join("payload");
        fs::write(&file, "some content").unwrap();

        let outcome = save_path(&store, &file, "k", temp.path(), 1).await.unwrap();
        assert!(matches!(outcome, SaveOutcome::TooLarge(size) if size > 1));
        assert!(store.lookup("k", &[]).await.unwrap().is_none());

        let outcome = save_path(&store, &file, "k", temp.path(), u64::MAX)
            .await
            .unwrap();
        assert_eq!(outcome, SaveOutcome::Saved);
    }

    #[tokio::test]
    async fn test_failed_upload_releases_key() {
        let temp = TempDir::new().unwrap();
        let store = FailingFirstUpload {
            inner: LocalBlobStore::new(temp.path().join("store")),
            failed: AtomicBool::new(false),
        };
        let file = temp.path().join("payload");
        fs::write(&file, "some content").unwrap();

        let err = save_path(&store, &file, "k", temp.path(), u64::MAX)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Upload rejected"));
        assert!(store.lookup("k", &[]).await.unwrap().is_none());
        assert!(!temp.path().join(format!("save-{}.tgz", store::key_digest("k"))).exists());

        let outcome = save_path(&store, &file, "k", temp.path(), u64::MAX)
            .await
            .unwrap();
        assert_eq!(outcome, SaveOutcome::Saved);
    }
}
