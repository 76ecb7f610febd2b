// Release catalog: paginated fetch merged into a persisted, cached history

use super::{ReleaseApi, ReleaseEntry, Repository};
use crate::cache::{self, BlobStore, SaveOutcome};
use crate::constants;
use crate::version::{Semver, to_semver};
use anyhow::Result;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Maps a release to the version string it represents. Usually the tag,
/// but some providers publish the real version only in the release notes.
pub type VersionOf = fn(&ReleaseEntry) -> String;

pub fn tag_version(release: &ReleaseEntry) -> String {
    release.tag_name.clone()
}

/// Releases of one repository, newest first, unique by tag name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleaseCatalog {
    entries: Vec<ReleaseEntry>,
}

impl ReleaseCatalog {
    /// Sort newest first by creation time; on duplicate tags the earliest
    /// given entry wins.
    pub fn from_entries(entries: Vec<ReleaseEntry>) -> Self {
        let mut unique: Vec<ReleaseEntry> = Vec::with_capacity(entries.len());
        for entry in entries {
            if !unique.iter().any(|e| e.tag_name == entry.tag_name) {
                unique.push(entry);
            }
        }
        unique.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Self { entries: unique }
    }

    /// Newest entry including drafts and pre-releases
    pub fn head(&self) -> Option<&ReleaseEntry> {
        self.entries.first()
    }

    /// Newest entry that is neither a draft nor a pre-release
    pub fn latest(&self) -> Option<&ReleaseEntry> {
        self.entries.iter().find(|e| e.is_stable())
    }

    pub fn get(&self, tag: &str) -> Option<&ReleaseEntry> {
        self.entries.iter().find(|e| e.tag_name == tag)
    }

    pub fn entries(&self) -> &[ReleaseEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn remove(&mut self, tag: &str) {
        self.entries.retain(|e| e.tag_name != tag);
    }

    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        let catalog: ReleaseCatalog = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;
        Ok(Some(catalog))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string(self)?)?;
        Ok(())
    }
}

pub fn cache_file(temp_dir: &Path, repo: &Repository) -> PathBuf {
    temp_dir.join(format!("release-cache-{}.json", repo.name))
}

fn restore_prefix(repo: &Repository) -> String {
    format!("releases--{}--", repo)
}

/// Blob key for a catalog; changes whenever a newer release appears
pub fn catalog_key(repo: &Repository, catalog: &ReleaseCatalog) -> String {
    let newest = catalog.head().map(|e| e.created_at.as_str()).unwrap_or("");
    format!("{}{}", restore_prefix(repo), newest)
}

async fn restore_cached(
    store: &dyn BlobStore,
    temp_dir: &Path,
    repo: &Repository,
) -> ReleaseCatalog {
    let path = cache_file(temp_dir, repo);
    let prefix = restore_prefix(repo);
    match cache::restore_path(store, &path, &prefix, std::slice::from_ref(&prefix), temp_dir).await
    {
        Ok(Some(key)) => debug!("Restored release cache {}", key),
        Ok(None) => debug!("No release cache for {}", repo),
        Err(e) => warn!("Failed to restore release cache for {}: {}", repo, e),
    }

    match ReleaseCatalog::load(&path) {
        Ok(catalog) => catalog.unwrap_or_default(),
        Err(e) => {
            warn!("Ignoring unreadable release cache: {}", e);
            ReleaseCatalog::default()
        }
    }
}

async fn persist(
    store: &dyn BlobStore,
    temp_dir: &Path,
    repo: &Repository,
    catalog: &ReleaseCatalog,
) -> Result<()> {
    let path = cache_file(temp_dir, repo);
    if let Err(e) = catalog.save(&path) {
        debug!("Error while writing release cache: {}", e);
        return Ok(());
    }

    let key = catalog_key(repo, catalog);
    match cache::save_path(store, &path, &key, temp_dir, constants::CACHE_SIZE_LIMIT).await {
        Ok(SaveOutcome::Saved) => debug!("Saved release cache {}", key),
        Ok(outcome) => debug!("Release cache not saved ({:?}): {}", outcome, key),
        Err(e) => debug!("Error while caching releases: {}", e),
    }
    Ok(())
}

/// Load the release history of `repo`, fetching only what the cache lacks.
///
/// Paging stops once a known release at the same revision shows up, once a
/// release older than `floor` has been taken, or when the pages run out.
/// Releases without assets are never kept. API failures propagate; cache
/// failures do not.
pub async fn fetch_releases(
    api: &dyn ReleaseApi,
    store: &dyn BlobStore,
    temp_dir: &Path,
    repo: &Repository,
    floor: Option<&Semver>,
    version_of: VersionOf,
) -> Result<ReleaseCatalog> {
    fetch_with_page_size(
        api,
        store,
        temp_dir,
        repo,
        floor,
        version_of,
        constants::RELEASES_PER_PAGE,
    )
    .await
}

async fn fetch_with_page_size(
    api: &dyn ReleaseApi,
    store: &dyn BlobStore,
    temp_dir: &Path,
    repo: &Repository,
    floor: Option<&Semver>,
    version_of: VersionOf,
    per_page: u32,
) -> Result<ReleaseCatalog> {
    let mut cached = restore_cached(store, temp_dir, repo).await;
    debug!("{} cached releases for {}", cached.len(), repo);

    let mut fresh: Vec<ReleaseEntry> = Vec::new();
    let mut page = 1;
    'fetching: loop {
        let batch = api.list_releases(repo, page, per_page).await?;
        let count = batch.len();

        for release in batch {
            if release.assets.is_empty() {
                continue;
            }
            // Listing shifted between pages
            if fresh.iter().any(|r| r.tag_name == release.tag_name) {
                continue;
            }

            match cached.get(&release.tag_name) {
                Some(known) if known.same_revision(&release) => break 'fetching,
                Some(_) => {
                    debug!("Tag {} moved, replacing cached release", release.tag_name);
                    cached.remove(&release.tag_name);
                }
                None => {}
            }

            let below_floor = floor.is_some_and(|floor| {
                to_semver(&version_of(&release)).is_some_and(|version| version < *floor)
            });
            fresh.push(release);
            if below_floor {
                break 'fetching;
            }
        }

        if count < per_page as usize {
            break;
        }
        page += 1;
    }

    if fresh.is_empty() {
        return Ok(cached);
    }

    info!("Fetched {} new releases of {}", fresh.len(), repo);
    let mut merged = fresh;
    merged.extend(cached.entries);
    let catalog = ReleaseCatalog::from_entries(merged);
    persist(store, temp_dir, repo, &catalog).await?;
    Ok(catalog)
}
