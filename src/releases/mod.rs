// Release metadata types and the seam to the hosting API

pub mod catalog;
pub mod github;
pub mod resolver;

pub use catalog::{ReleaseCatalog, fetch_releases};
pub use github::GitHubApi;
pub use resolver::{find_release, perpetuate};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One downloadable file attached to a release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub name: String,
    pub browser_download_url: String,
}

/// One published release as listed by the hosting API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseEntry {
    pub id: u64,
    pub tag_name: String,
    #[serde(default)]
    pub target_commitish: String,
    pub created_at: String,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

impl ReleaseEntry {
    /// Same tag at the same underlying revision.
    ///
    /// Moving tags are recreated as new releases, so a changed id means the
    /// tag now points somewhere else.
    pub fn same_revision(&self, other: &ReleaseEntry) -> bool {
        self.id == other.id && self.target_commitish == other.target_commitish
    }

    pub fn is_stable(&self) -> bool {
        !self.draft && !self.prerelease
    }

    pub fn asset_names(&self) -> Vec<String> {
        self.assets.iter().map(|a| a.name.clone()).collect()
    }
}

/// `owner/name` identity of a hosted repository
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Repository {
    pub owner: String,
    pub name: String,
}

impl Repository {
    pub fn new(owner: &str, name: &str) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
        }
    }

    pub fn clone_url(&self) -> String {
        format!("https://github.com/{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Read-only view of a repository's releases and tags
#[async_trait::async_trait]
pub trait ReleaseApi: Send + Sync {
    /// One page of releases, newest first. Pages are 1-based.
    async fn list_releases(
        &self,
        repo: &Repository,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<ReleaseEntry>>;

    /// Commit hash a tag currently points at, with annotated tags peeled
    async fn tag_commit(&self, repo: &Repository, tag: &str) -> Result<String>;
}
