// Install command: resolve, install or restore, then report outputs

use super::Request;
use crate::cache::{self, SaveOutcome};
use crate::cli::InstallArgs;
use crate::constants;
use crate::installer::{InstallContext, InstallType, Installer, Resolution};
use crate::outputs::Outputs;
use crate::platform::Platform;
use crate::state::InstallState;
use crate::ui;
use anyhow::Result;
use log::{debug, info};
use std::fs;

pub async fn install(args: &InstallArgs) -> Result<()> {
    let request = Request::from_args(args)?;
    let platform = Platform::current()?;
    let ctx = request.context()?;
    let installer = request.installer(platform, &ctx)?;

    let pb = ui::spinner(&format!("Resolving {} {}", request.vim_type, request.spec));
    let resolution = match installer.resolve_version(&request.spec).await {
        Ok(resolution) => resolution,
        Err(e) => {
            ui::finish_spinner_error(&pb, &format!("Failed to resolve {}", request.spec));
            return Err(e);
        }
    };
    ui::finish_spinner_resolved(&pb, &request.vim_type.to_string(), resolution.version.as_str());
    info!("Vim version: {}", resolution.version);

    let report = run_install(&request, platform, &ctx, installer.as_ref(), &resolution).await?;

    let outputs = Outputs::from_env();
    outputs.add_path(&installer.path(&resolution.version)?)?;
    if report.installed {
        for (name, value) in installer.exports() {
            outputs.export_var(&name, &value)?;
        }
    }
    outputs.set_output("actual_vim_version", resolution.version.as_str())?;
    outputs.set_output("executable", &installer.executable_name()?)?;
    outputs.set_output("install_type", &installer.install_type().to_string())?;
    outputs.set_output("install_path", &installer.install_dir().to_string_lossy())?;
    outputs.set_output("cache_hit", if report.cache_hit { "true" } else { "false" })?;

    ui::success(&format!(
        "{} {} ready ({})",
        request.vim_type,
        resolution.version,
        installer.install_type()
    ));
    Ok(())
}

#[derive(Debug, Default, PartialEq)]
struct InstallReport {
    installed: bool,
    cache_hit: bool,
}

/// Install unless the directory already exists; builds go through the cache
async fn run_install(
    request: &Request,
    platform: Platform,
    ctx: &InstallContext,
    installer: &dyn Installer,
    resolution: &Resolution,
) -> Result<InstallReport> {
    let install_dir = installer.install_dir();
    // Only the directory is checked, not which version it holds
    if install_dir.is_dir() {
        info!("{} already exists, skipping install", install_dir.display());
        return Ok(InstallReport::default());
    }
    fs::create_dir_all(install_dir)?;

    let key = cache::make_key(
        platform,
        request.vim_type,
        request.is_gui,
        request.download,
        &resolution.version,
    );
    let use_cache = installer.install_type() == InstallType::Build && request.cache == "true";

    if use_cache {
        if cache::restore_install(ctx.store.as_ref(), &key, install_dir, &ctx.temp_dir).await? {
            return Ok(InstallReport {
                installed: false,
                cache_hit: true,
            });
        }
        installer.install(resolution).await?;
        InstallState {
            version: resolution.version.clone(),
            install_path: install_dir.to_path_buf(),
            vim_type: request.vim_type,
            gui: request.is_gui,
            download: request.download,
        }
        .save(&ctx.temp_dir.join(constants::STATE_FILE))?;
    } else {
        info!("Cache disabled");
        installer.install(resolution).await?;

        // Saved right away so a following step can restore it
        if request.cache == "test" {
            let outcome =
                cache::save_install(ctx.store.as_ref(), &key, install_dir, &ctx.temp_dir).await?;
            if outcome == SaveOutcome::AlreadyReserved {
                debug!("Reserve conflict for {}", key);
            }
        }
    }

    Ok(InstallReport {
        installed: true,
        cache_hit: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::installer::testing;
    use crate::installer::{DownloadPolicy, ResolvedSource, VimType};
    use crate::platform::Arch;
    use crate::releases::testing::FakeApi;
    use crate::version::FixedVersion;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Installer that writes a marker file instead of building
    struct MarkerInstaller {
        install_type: InstallType,
        dir: PathBuf,
        installs: Mutex<u32>,
    }

    impl MarkerInstaller {
        fn new(install_type: InstallType, dir: &Path) -> Self {
            Self {
                install_type,
                dir: dir.to_path_buf(),
                installs: Mutex::new(0),
            }
        }

        fn installs(&self) -> u32 {
            *self.installs.lock().unwrap()
        }
    }

    #[async_trait::async_trait]
    impl Installer for MarkerInstaller {
        fn install_type(&self) -> InstallType {
            self.install_type
        }

        fn install_dir(&self) -> &Path {
            &self.dir
        }

        async fn resolve_version(&self, spec: &str) -> Result<Resolution> {
            Ok(resolution(spec))
        }

        async fn install(&self, resolution: &Resolution) -> Result<()> {
            *self.installs.lock().unwrap() += 1;
            fs::create_dir_all(self.dir.join("bin"))?;
            fs::write(self.dir.join("bin").join("vim"), resolution.version.as_str())?;
            Ok(())
        }

        fn path(&self, _version: &FixedVersion) -> Result<PathBuf> {
            Ok(self.dir.join("bin"))
        }

        fn executable_name(&self) -> Result<String> {
            Ok("vim".to_string())
        }
    }

    fn resolution(version: &str) -> Resolution {
        Resolution {
            version: FixedVersion::new(version),
            source: ResolvedSource::Git {
                git_ref: version.to_string(),
                checkout: None,
            },
        }
    }

    fn request(cache: &str) -> Request {
        Request {
            vim_type: VimType::Vim,
            spec: "v9.0.0000".to_string(),
            is_gui: false,
            download: DownloadPolicy::Never,
            arch: Arch::X86_64,
            cache: cache.to_string(),
            token: None,
        }
    }

    #[tokio::test]
    async fn test_existing_install_dir_is_reused() {
        let temp = TempDir::new().unwrap();
        let ctx = testing::context(temp.path(), false, FakeApi::default());
        fs::create_dir_all(&ctx.install_dir).unwrap();
        let installer = MarkerInstaller::new(InstallType::Build, &ctx.install_dir);

        let report = run_install(
            &request("false"),
            Platform::Linux,
            &ctx,
            &installer,
            &resolution("v9.0.0000"),
        )
        .await
        .unwrap();

        assert_eq!(report, InstallReport::default());
        assert_eq!(installer.installs(), 0);
    }

    #[tokio::test]
    async fn test_cache_test_mode_saves_then_restores() {
        let temp = TempDir::new().unwrap();
        let ctx = testing::context(temp.path(), false, FakeApi::default());
        let installer = MarkerInstaller::new(InstallType::Build, &ctx.install_dir);
        let version = resolution("v9.0.0000");

        let first = run_install(&request("test"), Platform::Linux, &ctx, &installer, &version)
            .await
            .unwrap();
        assert!(first.installed);
        assert!(!first.cache_hit);

        fs::remove_dir_all(&ctx.install_dir).unwrap();
        let second = run_install(&request("true"), Platform::Linux, &ctx, &installer, &version)
            .await
            .unwrap();
        assert!(second.cache_hit);
        assert_eq!(installer.installs(), 1);
        assert_eq!(
            fs::read_to_string(ctx.install_dir.join("bin").join("vim")).unwrap(),
            "v9.0.0000"
        );
    }

    #[tokio::test]
    async fn test_downloads_never_touch_the_cache() {
        let temp = TempDir::new().unwrap();
        let ctx = testing::context(temp.path(), false, FakeApi::default());
        let installer = MarkerInstaller::new(InstallType::Download, &ctx.install_dir);

        let report = run_install(
            &request("true"),
            Platform::Linux,
            &ctx,
            &installer,
            &resolution("v9.0.0000"),
        )
        .await
        .unwrap();

        assert!(report.installed);
        assert!(!temp.path().join("cache").exists());
    }
}
