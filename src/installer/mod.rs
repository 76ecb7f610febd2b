// Installer strategies and the selection table that picks one

pub mod build;
pub mod download;
pub mod extract;
pub mod patch;

pub use build::{BuildInstaller, BuildRecipe};
pub use download::{ReleaseFlavor, ReleasesInstaller};

use crate::cache::BlobStore;
use crate::error::SetupError;
use crate::platform::{Arch, Platform};
use crate::releases::{ReleaseApi, ReleaseEntry};
use crate::version::FixedVersion;
use anyhow::Result;
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

lazy_static! {
    static ref MAJOR_MINOR: Regex = Regex::new(r"^v(\d+)\.(\d+)").expect("major.minor pattern");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VimType {
    Vim,
    Neovim,
    MacVim,
}

impl FromStr for VimType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "vim" => Ok(VimType::Vim),
            "neovim" => Ok(VimType::Neovim),
            "macvim" => Ok(VimType::MacVim),
            _ => Err(SetupError::config(format!("Invalid vim_type: {}", s)).into()),
        }
    }
}

impl fmt::Display for VimType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VimType::Vim => "vim",
            VimType::Neovim => "neovim",
            VimType::MacVim => "macvim",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadPolicy {
    Always,
    Available,
    Never,
}

impl FromStr for DownloadPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "always" => Ok(DownloadPolicy::Always),
            "available" => Ok(DownloadPolicy::Available),
            "never" => Ok(DownloadPolicy::Never),
            _ => Err(SetupError::config(format!("Invalid download parameter: {}", s)).into()),
        }
    }
}

impl fmt::Display for DownloadPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DownloadPolicy::Always => "always",
            DownloadPolicy::Available => "available",
            DownloadPolicy::Never => "never",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallType {
    Build,
    Download,
}

impl fmt::Display for InstallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InstallType::Build => "build",
            InstallType::Download => "download",
        })
    }
}

/// What a fixed version was resolved from
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedSource {
    /// A published release; its assets are what gets installed
    Release(ReleaseEntry),
    /// A git ref, with the checkout made while resolving when there was one
    Git {
        git_ref: String,
        checkout: Option<PathBuf>,
    },
}

/// Outcome of `resolve_version`, handed unchanged to `install`
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub version: FixedVersion,
    pub source: ResolvedSource,
}

/// Shared inputs for every installer in one run
#[derive(Clone)]
pub struct InstallContext {
    pub install_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub is_gui: bool,
    pub arch: Arch,
    pub api: Arc<dyn ReleaseApi>,
    pub store: Arc<dyn BlobStore>,
}

#[async_trait::async_trait]
pub trait Installer: Send + Sync {
    fn install_type(&self) -> InstallType;

    fn install_dir(&self) -> &Path;

    /// Whether this strategy can produce `spec` at all
    fn can_install(&self, _spec: &str) -> bool {
        true
    }

    async fn resolve_version(&self, spec: &str) -> Result<Resolution>;

    async fn install(&self, resolution: &Resolution) -> Result<()>;

    /// Directory holding the executable
    fn path(&self, version: &FixedVersion) -> Result<PathBuf>;

    fn executable_name(&self) -> Result<String>;

    /// Environment variables later steps need after `install`
    fn exports(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

/// `vimXY` directory name used by Windows Vim for a `vX.Y...` version
pub fn vim_dir(version: &FixedVersion) -> String {
    match MAJOR_MINOR.captures(version.as_str()) {
        Some(captures) => format!("vim{}{}", &captures[1], &captures[2]),
        None => "runtime".to_string(),
    }
}

fn release_flavor(platform: Platform, vim_type: VimType) -> Result<ReleaseFlavor> {
    match (platform, vim_type) {
        (Platform::Linux, VimType::Vim) => Ok(ReleaseFlavor::LinuxVim),
        (Platform::Linux, VimType::Neovim) => Ok(ReleaseFlavor::LinuxNeovim),
        (Platform::MacOs, VimType::Vim) => {
            Err(SetupError::unavailable("Download is not supported with MacOS/Vim").into())
        }
        (Platform::MacOs, VimType::Neovim) => Ok(ReleaseFlavor::MacosNeovim),
        (Platform::MacOs, VimType::MacVim) => Ok(ReleaseFlavor::MacVim),
        (Platform::Windows, VimType::Vim) => Ok(ReleaseFlavor::WindowsVim),
        (Platform::Windows, VimType::Neovim) => Ok(ReleaseFlavor::WindowsNeovim),
        (platform, vim_type) => Err(unsupported(platform, vim_type)),
    }
}

fn build_recipe(platform: Platform, vim_type: VimType) -> Result<BuildRecipe> {
    match (platform, vim_type) {
        (Platform::Linux | Platform::MacOs, VimType::Vim) => Ok(BuildRecipe::UnixVim),
        (Platform::Linux, VimType::Neovim) => Ok(BuildRecipe::LinuxNeovim),
        (Platform::MacOs, VimType::Neovim) => Ok(BuildRecipe::MacosNeovim),
        (Platform::MacOs, VimType::MacVim) => Ok(BuildRecipe::MacVim),
        (Platform::Windows, VimType::Vim) => Ok(BuildRecipe::WindowsVim),
        (platform, vim_type) => Err(unsupported(platform, vim_type)),
    }
}

fn unsupported(platform: Platform, vim_type: VimType) -> anyhow::Error {
    let os = match platform {
        Platform::Linux => "Linux",
        Platform::MacOs => "MacOS",
        Platform::Windows => "Windows",
    };
    SetupError::config(format!("Unsupported vim_type in {}: {}", os, vim_type)).into()
}

fn installer_for(
    platform: Platform,
    vim_type: VimType,
    install_type: InstallType,
    ctx: &InstallContext,
) -> Result<Box<dyn Installer>> {
    if platform == Platform::MacOs && ctx.is_gui {
        return Err(SetupError::config("GUI is not supported in MacOS").into());
    }

    match install_type {
        InstallType::Download => {
            let flavor = release_flavor(platform, vim_type)?;
            Ok(Box::new(ReleasesInstaller::new(flavor, ctx.clone())))
        }
        InstallType::Build => {
            let recipe = build_recipe(platform, vim_type)?;
            Ok(Box::new(BuildInstaller::new(recipe, platform, ctx.clone())))
        }
    }
}

/// Pick the installer for one run.
///
/// `available` tries the download strategy first and builds instead only
/// when downloading does not apply to this combination or version. Any
/// other error is returned as is.
pub fn select(
    platform: Platform,
    vim_type: VimType,
    policy: DownloadPolicy,
    spec: &str,
    ctx: &InstallContext,
) -> Result<Box<dyn Installer>> {
    match policy {
        DownloadPolicy::Always => installer_for(platform, vim_type, InstallType::Download, ctx),
        DownloadPolicy::Never => installer_for(platform, vim_type, InstallType::Build, ctx),
        DownloadPolicy::Available => {
            let attempt = installer_for(platform, vim_type, InstallType::Download, ctx)
                .and_then(|installer| {
                    if installer.can_install(spec) {
                        Ok(installer)
                    } else {
                        Err(SetupError::unavailable(format!("No release asset for {}", spec)).into())
                    }
                });
            match attempt {
                Err(e) if SetupError::is_unavailable(&e) => {
                    debug!("{}, building from source", e);
                    installer_for(platform, vim_type, InstallType::Build, ctx)
                }
                other => other,
            }
        }
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use crate::cache::LocalBlobStore;
    use crate::releases::testing::FakeApi;

    pub fn context(root: &Path, is_gui: bool, api: FakeApi) -> InstallContext {
        InstallContext {
            install_dir: root.join("vim"),
            temp_dir: root.to_path_buf(),
            is_gui,
            arch: Arch::X86_64,
            api: Arc::new(api),
            store: Arc::new(LocalBlobStore::new(root.join("cache"))),
        }
    }
}
