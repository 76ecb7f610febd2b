// State module for handing a fresh build from `install` to `post`

use crate::installer::{DownloadPolicy, VimType};
use crate::platform::Platform;
use crate::version::FixedVersion;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What `post` needs to save the cache of a fresh build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallState {
    pub version: FixedVersion,
    pub install_path: PathBuf,
    pub vim_type: VimType,
    pub gui: bool,
    pub download: DownloadPolicy,
}

impl InstallState {
    /// Missing file means there is nothing to save.
    pub fn load(path: &Path) -> anyhow::Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(path)?;
        Ok(Some(toml::from_str(&text)?))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let text = toml::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    pub fn remove(path: &Path) -> anyhow::Result<()> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    pub fn cache_key(&self, platform: Platform) -> String {
        crate::cache::make_key(platform, self.vim_type, self.gui, self.download, &self.version)
    }
}
