// Release download installers

use super::extract;
use super::{InstallContext, InstallType, Installer, Resolution, ResolvedSource, vim_dir};
use crate::error::SetupError;
use crate::exec;
use crate::http;
use crate::releases::catalog::{VersionOf, tag_version};
use crate::releases::{Asset, ReleaseEntry, Repository, fetch_releases, find_release, perpetuate};
use crate::version::{FixedVersion, Semver, compare, to_semver};
use anyhow::Result;
use lazy_static::lazy_static;
use log::{debug, info};
use regex::Regex;
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

lazy_static! {
    static ref MACVIM_BODY_VERSION: Regex =
        Regex::new(r"(?i)(?:Vim\s+patch|Updated\s+to\s+Vim)\s*(\d+\.\d+\.\d+)")
            .expect("macvim release body pattern");
}

const APPIMAGE_PRELOAD: &str = "/lib/x86_64-linux-gnu/libgmodule-2.0.so";
const MACVIM_VOLUME: &str = "/Volumes/MacVim";

/// MacVim tags are release numbers; the Vim version is in the notes
pub fn macvim_body_version(release: &ReleaseEntry) -> String {
    release
        .body
        .as_deref()
        .and_then(|body| MACVIM_BODY_VERSION.captures(body))
        .map(|captures| captures[1].to_string())
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseFlavor {
    LinuxVim,
    WindowsVim,
    LinuxNeovim,
    MacosNeovim,
    WindowsNeovim,
    MacVim,
}

impl ReleaseFlavor {
    pub fn repository(&self) -> Repository {
        match self {
            ReleaseFlavor::LinuxVim => Repository::new("vim", "vim-appimage"),
            ReleaseFlavor::WindowsVim => Repository::new("vim", "vim-win32-installer"),
            ReleaseFlavor::LinuxNeovim
            | ReleaseFlavor::MacosNeovim
            | ReleaseFlavor::WindowsNeovim => Repository::new("neovim", "neovim"),
            ReleaseFlavor::MacVim => Repository::new("macvim-dev", "macvim"),
        }
    }

    /// Oldest version published with usable assets
    pub fn floor(&self) -> Option<Semver> {
        let floor = match self {
            ReleaseFlavor::LinuxVim => "v8.1.1239",
            ReleaseFlavor::WindowsVim => "v8.0.0",
            ReleaseFlavor::LinuxNeovim
            | ReleaseFlavor::MacosNeovim
            | ReleaseFlavor::WindowsNeovim => "v0.3.0",
            ReleaseFlavor::MacVim => return None,
        };
        Semver::parse(floor)
    }

    pub fn version_of(&self) -> VersionOf {
        match self {
            ReleaseFlavor::MacVim => macvim_body_version,
            _ => tag_version,
        }
    }

    /// Asset name patterns in order of preference
    pub fn asset_patterns(&self, arch: crate::platform::Arch, is_gui: bool) -> Vec<String> {
        match self {
            ReleaseFlavor::LinuxVim => {
                let preferred = if is_gui { r"^GVim.*\.AppImage$" } else { r"^Vim.*\.AppImage$" };
                vec![preferred.to_string(), r"\.AppImage$".to_string()]
            }
            ReleaseFlavor::WindowsVim => vec![format!(
                r"^gvim_.*_{}(?:_signed)?\.zip$",
                arch.windows_name()
            )],
            ReleaseFlavor::LinuxNeovim => {
                let mut patterns = vec![format!(r"^nvim-linux-{}\.tar\.gz$", arch.neovim_name())];
                if arch.neovim_name() == "x86_64" {
                    patterns.push(r"^nvim-linux64\.tar\.gz$".to_string());
                }
                patterns
            }
            ReleaseFlavor::MacosNeovim => vec![
                format!(r"^nvim-macos-{}\.tar\.gz$", arch.neovim_name()),
                r"^nvim-macos\.tar\.gz$".to_string(),
            ],
            ReleaseFlavor::WindowsNeovim => vec![r"^nvim-win64\.zip$".to_string()],
            ReleaseFlavor::MacVim => vec![r"^MacVim.*\.dmg$".to_string()],
        }
    }
}

pub struct ReleasesInstaller {
    flavor: ReleaseFlavor,
    ctx: InstallContext,
}

impl ReleasesInstaller {
    pub fn new(flavor: ReleaseFlavor, ctx: InstallContext) -> Self {
        Self { flavor, ctx }
    }

    /// First asset matching the most preferred pattern
    pub fn select_asset<'a>(&self, release: &'a ReleaseEntry) -> Result<&'a Asset> {
        let patterns = self.flavor.asset_patterns(self.ctx.arch, self.ctx.is_gui);
        for pattern in &patterns {
            let re = Regex::new(pattern)?;
            if let Some(asset) = release.assets.iter().find(|a| re.is_match(&a.name)) {
                return Ok(asset);
            }
        }
        Err(SetupError::AssetNotFound {
            patterns: patterns.join("|"),
            assets: release.asset_names(),
        }
        .into())
    }

    fn download_path(&self, version: &FixedVersion, asset: &Asset) -> PathBuf {
        let repo = self.flavor.repository();
        self.ctx
            .temp_dir
            .join(repo.owner)
            .join(repo.name)
            .join(version.as_str())
            .join(&asset.name)
    }

    async fn install_windows_vim(&self, archive: &Path, version: &FixedVersion) -> Result<()> {
        let staging = self.ctx.temp_dir.join("tmpinst");
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        extract::extract_zip(archive, &staging)?;

        let exe = format!("{}.exe", self.executable_name()?);
        let nested = format!("vim/{}", vim_dir(version));
        let found = ["", nested.as_str()]
            .into_iter()
            .map(|candidate| staging.join(candidate))
            .find(|dir| dir.join(&exe).is_file())
            .ok_or_else(|| anyhow::anyhow!("Installed executable not found: {}", exe))?;

        let target = self.path(version)?;
        fs::create_dir_all(&self.ctx.install_dir)?;
        if target.exists() {
            fs::remove_dir_all(&target)?;
        }
        fs::rename(&found, &target)?;
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        Ok(())
    }

    async fn install_macvim(&self, dmg: &Path) -> Result<()> {
        let dmg = dmg.to_string_lossy().into_owned();
        exec::run(
            "hdiutil",
            &["attach", "-quiet", "-mountpoint", MACVIM_VOLUME, dmg.as_str()],
            None,
            &[],
        )
        .await?;

        fs::create_dir_all(&self.ctx.install_dir)?;
        let mut options = fs_extra::dir::CopyOptions::new();
        options.overwrite = true;
        let copied = fs_extra::dir::copy(
            Path::new(MACVIM_VOLUME).join("MacVim.app"),
            &self.ctx.install_dir,
            &options,
        );

        exec::run("hdiutil", &["detach", MACVIM_VOLUME], None, &[]).await?;
        copied?;
        Ok(())
    }

    fn macvim_contents(&self) -> PathBuf {
        self.ctx.install_dir.join("MacVim.app").join("Contents")
    }

    /// Bundle layout: `Contents/bin/vim`, or `Contents/MacOS/Vim` before 8.2
    fn macvim_executable(&self) -> Result<(PathBuf, &'static str)> {
        let contents = self.macvim_contents();
        let bin = contents.join("bin");
        if bin.join("vim").is_file() {
            return Ok((bin, "vim"));
        }
        let legacy = contents.join("MacOS");
        if legacy.join("Vim").is_file() {
            return Ok((legacy, "Vim"));
        }
        Err(SetupError::ExecutableNotFound.into())
    }
}

#[async_trait::async_trait]
impl Installer for ReleasesInstaller {
    fn install_type(&self) -> InstallType {
        InstallType::Download
    }

    fn install_dir(&self) -> &Path {
        &self.ctx.install_dir
    }

    fn can_install(&self, spec: &str) -> bool {
        match (to_semver(spec), self.flavor.floor()) {
            (Some(wanted), Some(floor)) => compare(&wanted, &floor) != Ordering::Less,
            _ => true,
        }
    }

    async fn resolve_version(&self, spec: &str) -> Result<Resolution> {
        let repo = self.flavor.repository();
        let floor = self.flavor.floor();
        let version_of = self.flavor.version_of();

        let catalog = fetch_releases(
            self.ctx.api.as_ref(),
            self.ctx.store.as_ref(),
            &self.ctx.temp_dir,
            &repo,
            floor.as_ref(),
            version_of,
        )
        .await?;
        debug!("{} releases known for {}", catalog.len(), repo);

        let release = find_release(&catalog, spec, version_of)?.clone();
        let version = perpetuate(self.ctx.api.as_ref(), &repo, &release, version_of).await?;
        info!("{} {} resolved to {}", repo, spec, version);
        Ok(Resolution {
            version,
            source: ResolvedSource::Release(release),
        })
    }

    async fn install(&self, resolution: &Resolution) -> Result<()> {
        let ResolvedSource::Release(release) = &resolution.source else {
            return Err(SetupError::UnknownVersion(resolution.version.to_string()).into());
        };

        let asset = self.select_asset(release)?;
        let archive = self.download_path(&resolution.version, asset);
        http::download_to_file(&asset.browser_download_url, &archive).await?;

        match self.flavor {
            ReleaseFlavor::LinuxVim => {
                exec::run("sudo", &["apt-get", "update"], None, &[]).await?;
                exec::run("sudo", &["apt-get", "install", "-y", "libfuse2"], None, &[]).await?;
                extract::unpack(&archive, &self.ctx.install_dir, &self.executable_name()?)
            }
            ReleaseFlavor::WindowsVim => {
                self.install_windows_vim(&archive, &resolution.version)
                    .await
            }
            ReleaseFlavor::LinuxNeovim
            | ReleaseFlavor::MacosNeovim
            | ReleaseFlavor::WindowsNeovim => {
                extract::unpack(&archive, &self.ctx.install_dir, &self.executable_name()?)
            }
            ReleaseFlavor::MacVim => self.install_macvim(&archive).await,
        }
    }

    fn path(&self, version: &FixedVersion) -> Result<PathBuf> {
        let dir = &self.ctx.install_dir;
        match self.flavor {
            ReleaseFlavor::WindowsVim => Ok(dir.join(vim_dir(version))),
            ReleaseFlavor::MacVim => self.macvim_executable().map(|(path, _)| path),
            _ => Ok(dir.join("bin")),
        }
    }

    fn executable_name(&self) -> Result<String> {
        let gui = self.ctx.is_gui;
        let name = match self.flavor {
            ReleaseFlavor::LinuxVim | ReleaseFlavor::WindowsVim if gui => "gvim",
            ReleaseFlavor::LinuxVim | ReleaseFlavor::WindowsVim => "vim",
            ReleaseFlavor::WindowsNeovim if gui => "nvim-qt",
            ReleaseFlavor::LinuxNeovim
            | ReleaseFlavor::MacosNeovim
            | ReleaseFlavor::WindowsNeovim => "nvim",
            ReleaseFlavor::MacVim => self.macvim_executable()?.1,
        };
        Ok(name.to_string())
    }

    fn exports(&self) -> Vec<(String, String)> {
        match self.flavor {
            ReleaseFlavor::LinuxVim => {
                vec![("LD_PRELOAD".to_string(), APPIMAGE_PRELOAD.to_string())]
            }
            _ => Vec::new(),
        }
    }
}
