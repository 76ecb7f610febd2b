// GitHub REST implementation of the release listing API

use super::{ReleaseApi, ReleaseEntry, Repository};
use crate::constants;
use crate::http;
use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct GitObject {
    sha: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct GitRef {
    object: GitObject,
}

#[derive(Debug, Deserialize)]
struct GitTag {
    object: GitObject,
}

pub struct GitHubApi {
    base_url: String,
    token: Option<String>,
}

impl GitHubApi {
    pub fn new(token: Option<String>) -> Self {
        Self::with_base_url(constants::GITHUB_API, token)
    }

    pub fn with_base_url(base_url: &str, token: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        }
    }

    fn repo_url(&self, repo: &Repository) -> String {
        format!("{}/repos/{}/{}", self.base_url, repo.owner, repo.name)
    }
}

#[async_trait::async_trait]
impl ReleaseApi for GitHubApi {
    async fn list_releases(
        &self,
        repo: &Repository,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<ReleaseEntry>> {
        let url = format!(
            "{}/releases?per_page={}&page={}",
            self.repo_url(repo),
            per_page,
            page
        );
        http::fetch_json(&url, self.token.as_deref())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to list releases for '{}': {}", repo, e))
    }

    async fn tag_commit(&self, repo: &Repository, tag: &str) -> Result<String> {
        let url = format!(
            "{}/git/ref/tags/{}",
            self.repo_url(repo),
            urlencoding::encode(tag)
        );
        let git_ref: GitRef = http::fetch_json(&url, self.token.as_deref()).await?;
        if git_ref.object.kind != "tag" {
            return Ok(git_ref.object.sha);
        }

        // Annotated tag: follow the tag object to the commit it wraps
        let url = format!("{}/git/tags/{}", self.repo_url(repo), git_ref.object.sha);
        let git_tag: GitTag = http::fetch_json(&url, self.token.as_deref()).await?;
        Ok(git_tag.object.sha)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_token_is_ignored() {
        let api = GitHubApi::new(Some(String::new()));
        assert!(api.token.is_none());
        let api = GitHubApi::new(Some("abc".to_string()));
        assert_eq!(api.token.as_deref(), Some("abc"));
    }

    #[test]
    fn test_repo_url() {
        let api = GitHubApi::with_base_url("http://localhost:1/", None);
        let repo = Repository::new("vim", "vim-appimage");
        assert_eq!(api.repo_url(&repo), "http://localhost:1/repos/vim/vim-appimage");
    }

    #[test]
    fn test_ref_payload_parses() {
        let json = r#"{"ref": "refs/tags/stable", "object": {"sha": "abc", "type": "commit", "url": "x"}}"#;
        let git_ref: GitRef = serde_json::from_str(json).unwrap();
        assert_eq!(git_ref.object.sha, "abc");
        assert_eq!(git_ref.object.kind, "commit");
    }
}
