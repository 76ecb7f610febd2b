// Release resolver: pick a release for a specifier and pin moving tags

use super::catalog::{ReleaseCatalog, VersionOf};
use super::{ReleaseApi, ReleaseEntry, Repository};
use crate::constants;
use crate::error::SetupError;
use crate::version::{FixedVersion, Semver, to_semver};
use anyhow::Result;
use log::debug;

/// Find the release a specifier refers to.
///
/// - `head`: newest entry, pre-releases included
/// - `latest`: newest stable entry
/// - a semantic version: the oldest release still at or above it. Among
///   releases with equal versions the most recently listed one wins.
/// - anything else: exact tag name
pub fn find_release<'a>(
    catalog: &'a ReleaseCatalog,
    spec: &str,
    version_of: VersionOf,
) -> Result<&'a ReleaseEntry> {
    let found = match spec {
        "head" => catalog.head(),
        "latest" => catalog.latest(),
        _ => match to_semver(spec) {
            Some(wanted) => floor_match(catalog, &wanted, version_of),
            None => catalog.get(spec),
        },
    };
    found.ok_or_else(|| SetupError::ReleaseNotFound(spec.to_string()).into())
}

fn floor_match<'a>(
    catalog: &'a ReleaseCatalog,
    wanted: &Semver,
    version_of: VersionOf,
) -> Option<&'a ReleaseEntry> {
    let mut candidate: Option<(&ReleaseEntry, Semver)> = None;
    for release in catalog.entries() {
        let Some(version) = to_semver(&version_of(release)) else {
            continue;
        };
        if version < *wanted {
            break;
        }
        let same_as_candidate = candidate.as_ref().is_some_and(|(_, best)| *best == version);
        if !same_as_candidate {
            candidate = Some((release, version));
        }
    }
    candidate.map(|(release, _)| release)
}

/// Turn a chosen release into a fixed version.
///
/// Numbered releases are already fixed. A symbolic tag is matched by commit
/// against the newest numbered releases; with no match the commit hash
/// itself is the version.
pub async fn perpetuate(
    api: &dyn ReleaseApi,
    repo: &Repository,
    release: &ReleaseEntry,
    version_of: VersionOf,
) -> Result<FixedVersion> {
    let version = version_of(release);
    if to_semver(&version).is_some() {
        return Ok(FixedVersion::new(version));
    }

    let target = api.tag_commit(repo, &release.tag_name).await?;
    debug!("Tag {} points at {}", release.tag_name, target);

    let window = api
        .list_releases(repo, 1, constants::PERPETUATE_WINDOW)
        .await?;
    for candidate in window {
        if to_semver(&candidate.tag_name).is_none() {
            continue;
        }
        let sha = api.tag_commit(repo, &candidate.tag_name).await?;
        if sha == target {
            debug!("{} is {}", release.tag_name, candidate.tag_name);
            return Ok(FixedVersion::new(candidate.tag_name));
        }
    }

    Ok(FixedVersion::new(target))
}
