// Config module for shared path configuration

use crate::constants;
use std::path::PathBuf;

/// Scratch root for clones, downloads, release caches and the install itself.
///
/// `SETUP_VIM_TEMP` wins, then the runner's `RUNNER_TEMP`, then `~/tmp`.
pub fn temp_dir() -> anyhow::Result<PathBuf> {
    if let Ok(dir) = std::env::var("SETUP_VIM_TEMP") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(dir) = std::env::var("RUNNER_TEMP") {
        return Ok(PathBuf::from(dir));
    }
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| anyhow::anyhow!("$HOME could not detect."))?;
    Ok(PathBuf::from(home).join("tmp"))
}

pub fn install_path() -> anyhow::Result<PathBuf> {
    Ok(temp_dir()?.join(constants::INSTALL_DIR))
}

pub fn state_path() -> anyhow::Result<PathBuf> {
    Ok(temp_dir()?.join(constants::STATE_FILE))
}

/// Root of the blob store holding install and release caches.
///
/// The `<temp>/cache` default lives under the runner's scratch space and is
/// wiped with it, so entries only outlive a job when `SETUP_VIM_CACHE_DIR`
/// points at a directory that persists between runs.
pub fn cache_dir() -> anyhow::Result<PathBuf> {
    if let Ok(dir) = std::env::var("SETUP_VIM_CACHE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    Ok(temp_dir()?.join("cache"))
}
