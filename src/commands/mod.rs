// Commands shared by the install, post and resolve entry points

pub mod install;
pub mod post;
pub mod resolve;

use crate::cache::LocalBlobStore;
use crate::cli::InstallArgs;
use crate::config;
use crate::error::SetupError;
use crate::installer::{self, DownloadPolicy, InstallContext, Installer, VimType};
use crate::platform::{Arch, Platform};
use crate::releases::GitHubApi;
use crate::version::normalize;
use anyhow::Result;
use std::sync::Arc;

/// Validated inputs of one run
#[derive(Debug, Clone)]
pub struct Request {
    pub vim_type: VimType,
    pub spec: String,
    pub is_gui: bool,
    pub download: DownloadPolicy,
    pub arch: Arch,
    pub cache: String,
    pub token: Option<String>,
}

impl Request {
    pub fn from_args(args: &InstallArgs) -> Result<Self> {
        let vim_type: VimType = args.vim_type.parse()?;
        let download: DownloadPolicy = args.download.parse()?;
        let spec = args.vim_version.trim();
        if spec.is_empty()
            || spec.chars().any(char::is_whitespace)
            || !normalize(spec).is_resolvable()
        {
            return Err(SetupError::config(format!("Invalid vim_version: '{}'", args.vim_version)).into());
        }

        Ok(Self {
            vim_type,
            spec: spec.to_string(),
            is_gui: args.is_gui(),
            download,
            arch: Arch::from_hint(args.arch.as_deref()),
            cache: args.cache.trim().to_string(),
            token: args.token(),
        })
    }

    pub fn context(&self) -> Result<InstallContext> {
        Ok(InstallContext {
            install_dir: config::install_path()?,
            temp_dir: config::temp_dir()?,
            is_gui: self.is_gui,
            arch: self.arch,
            api: Arc::new(GitHubApi::new(self.token.clone())),
            store: Arc::new(LocalBlobStore::new(config::cache_dir()?)),
        })
    }

    pub fn installer(&self, platform: Platform, ctx: &InstallContext) -> Result<Box<dyn Installer>> {
        installer::select(platform, self.vim_type, self.download, &self.spec, ctx)
    }
}
