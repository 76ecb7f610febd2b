// Build-from-source installers

use super::patch::{self, Checkout};
use super::{InstallContext, InstallType, Installer, Resolution, ResolvedSource, vim_dir};
use crate::constants;
use crate::error::SetupError;
use crate::exec;
use crate::platform::Platform;
use crate::releases::Repository;
use crate::version::FixedVersion;
use anyhow::Result;
use lazy_static::lazy_static;
use log::{debug, info};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

lazy_static! {
    static ref FIXED_VERSION: Regex = Regex::new(r"^v\d").expect("fixed version pattern");
    static ref MACVIM_PATCH: Regex =
        Regex::new(r"Vim\s+patch\s+v?(\d+\.\d+\.\d+)").expect("macvim patch pattern");
    static ref CORE_SERVICES_FLAGS: Regex =
        Regex::new(r"\$\{CMAKE_EXE_LINKER_FLAGS\} -framework CoreServices")
            .expect("linker flags pattern");
    static ref CORE_SERVICES_TARGET: Regex =
        Regex::new(r#"target_link_libraries\((\w+) PRIVATE "-framework CoreServices"\)"#)
            .expect("link target pattern");
}

/// Xcode used for macOS builds; newer ones break old Vim sources
const DEVELOPER_DIR: &str = "/Applications/Xcode_11.7.app/Contents/Developer";

/// A tag like `v8.2.0012` is used as is; anything else needs a checkout
pub fn is_fixed_version(spec: &str) -> bool {
    FIXED_VERSION.is_match(spec)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildRecipe {
    UnixVim,
    WindowsVim,
    LinuxNeovim,
    MacosNeovim,
    MacVim,
}

impl BuildRecipe {
    pub fn repository(&self) -> Repository {
        match self {
            BuildRecipe::UnixVim | BuildRecipe::WindowsVim => Repository::new("vim", "vim"),
            BuildRecipe::LinuxNeovim | BuildRecipe::MacosNeovim => {
                Repository::new("neovim", "neovim")
            }
            BuildRecipe::MacVim => Repository::new("macvim-dev", "macvim"),
        }
    }
}

pub struct BuildInstaller {
    recipe: BuildRecipe,
    platform: Platform,
    ctx: InstallContext,
}

impl BuildInstaller {
    pub fn new(recipe: BuildRecipe, platform: Platform, ctx: InstallContext) -> Self {
        Self {
            recipe,
            platform,
            ctx,
        }
    }

    fn checkout_path(&self, git_ref: &str) -> PathBuf {
        self.ctx
            .temp_dir
            .join("repos")
            .join(self.recipe.repository().name)
            .join(git_ref.replace(['/', '\\'], "_"))
    }

    fn install_prefix(&self) -> String {
        self.ctx.install_dir.to_string_lossy().into_owned()
    }

    fn toolchain_env(&self) -> Vec<(&'static str, &'static str)> {
        if self.platform != Platform::MacOs {
            return Vec::new();
        }
        let mut env = vec![("DEVELOPER_DIR", DEVELOPER_DIR)];
        if self.recipe == BuildRecipe::UnixVim {
            // sed: RE error: illegal byte sequence
            env.push(("LC_ALL", "C"));
        }
        env
    }

    /// Fixed version of a checkout and the ref to install it from
    async fn describe_checkout(&self, repo_path: &Path) -> Result<(String, String)> {
        let describe = exec::git(&["describe", "--tags", "--always"], Some(repo_path)).await?;

        if self.recipe == BuildRecipe::MacVim {
            let log = exec::git(&["log", "-1", "--format=format:%B"], Some(repo_path)).await?;
            if let Some(version) = macvim_version_from_log(&log) {
                return Ok((version, describe));
            }
        }

        if is_fixed_version(&describe) {
            return Ok((describe.clone(), describe));
        }
        let head = exec::git(&["rev-parse", "HEAD"], Some(repo_path)).await?;
        Ok((head.clone(), head))
    }

    async fn build_unix_vim(&self, repo_path: &Path) -> Result<()> {
        let env = self.toolchain_env();
        let prefix = format!("--prefix={}", self.install_prefix());
        let mut args = vec![prefix.as_str(), "--with-features=huge"];
        if self.ctx.is_gui {
            apt_install(&["libxmu-dev", "libgtk-3-dev", "libxpm-dev"]).await?;
            args.extend(["--enable-gui=gtk3", "--enable-fail-if-missing"]);
        }
        exec::run("./configure", &args, Some(repo_path), &env).await?;
        exec::run("make", &[], Some(repo_path), &env).await?;
        exec::run("make", &["install"], Some(repo_path), &env).await
    }

    async fn build_windows_vim(&self, repo_path: &Path, version: &FixedVersion) -> Result<()> {
        let src = repo_path.join("src");
        let vs_path = exec::output(
            "vswhere",
            &["-products", "*", "-latest", "-property", "installationPath"],
            None,
            &[],
        )
        .await?;
        let script = install_bat(&vs_path, self.ctx.arch.windows_name(), self.ctx.is_gui);
        let bat = src.join("install.bat");
        fs::write(&bat, script)?;
        let bat = bat.to_string_lossy().into_owned();
        exec::run("cmd.exe", &["/c", bat.as_str()], Some(&src), &[]).await?;

        let target = self.path(version)?;
        fs::create_dir_all(&target)?;
        let mut options = fs_extra::dir::CopyOptions::new();
        options.overwrite = true;
        options.content_only = true;
        fs_extra::dir::copy(repo_path.join("runtime"), &target, &options)?;
        Ok(())
    }

    async fn build_linux_neovim(&self, repo_path: &Path) -> Result<()> {
        let mut packages = vec![
            "ninja-build", "gettext", "libtool", "libtool-bin", "autoconf", "automake", "cmake",
            "g++", "pkg-config", "unzip",
        ];
        let mut args = vec![
            "CMAKE_BUILD_TYPE=RelWithDebInfo".to_string(),
            format!("CMAKE_INSTALL_PREFIX={}", self.install_prefix()),
        ];

        // v0.2.x luarocks layout; not a strict check
        if file_contains(
            &repo_path.join("third-party/cmake/BuildLuarocks.cmake"),
            "luacheck-scm-1.rockspec",
        ) {
            packages.extend([
                "libuv1-dev", "libmsgpack-dev", "libtermkey-dev", "lua5.2", "lua-lpeg",
                "lua-mpack", "lua-bitop", "libluajit-5.1-dev", "gperf",
            ]);
            args.push(
                "DEPS_CMAKE_FLAGS=-DUSE_BUNDLED=OFF -DUSE_BUNDLED_LIBVTERM=ON -DUSE_BUNDLED_UNIBILIUM=ON"
                    .to_string(),
            );
        }

        if file_contains(&repo_path.join("cmake.deps/CMakeLists.txt"), "USE_BUNDLED_LUAROCKS") {
            packages.extend(["lua5.1", "lua-lpeg", "lua-bitop", "lua-mpack"]);
            args.push("DEPS_CMAKE_FLAGS=-DUSE_BUNDLED_DEPS=ON -DUSE_BUNDLED_LUAROCKS=OFF".to_string());
        }

        // The runner's newer CMake cannot build old Neovim; fall back to apt's
        exec::run("sudo", &["rm", "-f", "/usr/local/bin/cmake"], None, &[]).await?;
        apt_install(&packages).await?;

        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        exec::run("make", &args, Some(repo_path), &[]).await?;
        exec::run("make", &["install"], Some(repo_path), &[]).await
    }

    async fn build_macos_neovim(&self, repo_path: &Path) -> Result<()> {
        let env = self.toolchain_env();
        exec::run("brew", &["install", "ninja", "libtool", "automake"], None, &[]).await?;

        let cmake_lists = repo_path.join("src/nvim/CMakeLists.txt");
        let content = fs::read_to_string(&cmake_lists)?;
        if let Some(patched) = add_no_deduplicate(&content) {
            fs::write(&cmake_lists, patched)?;
        }

        let prefix = format!("CMAKE_EXTRA_FLAGS=-DCMAKE_INSTALL_PREFIX={}", self.install_prefix());
        exec::run(
            "make",
            &[
                "CMAKE_BUILD_TYPE=RelWithDebInfo",
                "MACOSX_DEPLOYMENT_TARGET=10.14",
                prefix.as_str(),
            ],
            Some(repo_path),
            &env,
        )
        .await?;
        exec::run("make", &["install"], Some(repo_path), &env).await
    }

    async fn build_macvim(&self, repo_path: &Path) -> Result<()> {
        let env = self.toolchain_env();
        let src = repo_path.join("src");
        exec::run("./configure", &[], Some(&src), &env).await?;

        let makefile = src.join("po").join("Makefile");
        if let Ok(content) = fs::read_to_string(&makefile) {
            if let Some(patched) = fix_po_makefile(&content) {
                fs::write(&makefile, patched)?;
            }
        }

        exec::run("make", &[], Some(&src), &env).await?;
        fs::create_dir_all(&self.ctx.install_dir)?;
        let app = src.join("MacVim").join("build").join("Release").join("MacVim.app");
        let mut options = fs_extra::dir::CopyOptions::new();
        options.overwrite = true;
        fs_extra::dir::copy(app, &self.ctx.install_dir, &options)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Installer for BuildInstaller {
    fn install_type(&self) -> InstallType {
        InstallType::Build
    }

    fn install_dir(&self) -> &Path {
        &self.ctx.install_dir
    }

    async fn resolve_version(&self, spec: &str) -> Result<Resolution> {
        let git_ref = if spec == "head" { "master" } else { spec };

        if is_fixed_version(git_ref) {
            return Ok(Resolution {
                version: FixedVersion::new(git_ref),
                source: ResolvedSource::Git {
                    git_ref: git_ref.to_string(),
                    checkout: None,
                },
            });
        }

        let repo = self.recipe.repository();
        let repo_path = self.checkout_path(git_ref);
        info!("Cloning {} at {}", repo, git_ref);
        exec::git_clone(
            &repo.clone_url(),
            git_ref,
            &repo_path,
            Some(constants::RESOLVE_CLONE_DEPTH),
        )
        .await?;

        let (version, install_ref) = self.describe_checkout(&repo_path).await?;
        debug!("{} at {} is {}", repo, git_ref, version);
        Ok(Resolution {
            version: FixedVersion::new(version),
            source: ResolvedSource::Git {
                git_ref: install_ref,
                checkout: Some(repo_path),
            },
        })
    }

    async fn install(&self, resolution: &Resolution) -> Result<()> {
        let ResolvedSource::Git { git_ref, checkout } = &resolution.source else {
            return Err(SetupError::UnknownVersion(resolution.version.to_string()).into());
        };

        let repo = self.recipe.repository();
        let repo_path = checkout
            .clone()
            .unwrap_or_else(|| self.checkout_path(git_ref));
        exec::git_clone(&repo.clone_url(), git_ref, &repo_path, Some(1)).await?;

        if matches!(self.recipe, BuildRecipe::UnixVim | BuildRecipe::WindowsVim) {
            patch::backport(&Checkout::new(&repo_path), self.platform, &resolution.version)
                .await?;
        }

        info!("Building {} {}", repo, resolution.version);
        match self.recipe {
            BuildRecipe::UnixVim => self.build_unix_vim(&repo_path).await,
            BuildRecipe::WindowsVim => {
                self.build_windows_vim(&repo_path, &resolution.version)
                    .await
            }
            BuildRecipe::LinuxNeovim => self.build_linux_neovim(&repo_path).await,
            BuildRecipe::MacosNeovim => self.build_macos_neovim(&repo_path).await,
            BuildRecipe::MacVim => self.build_macvim(&repo_path).await,
        }
    }

    fn path(&self, version: &FixedVersion) -> Result<PathBuf> {
        let dir = &self.ctx.install_dir;
        Ok(match self.recipe {
            BuildRecipe::WindowsVim => dir.join(vim_dir(version)),
            BuildRecipe::MacVim => dir.join("MacVim.app").join("Contents").join("bin"),
            _ => dir.join("bin"),
        })
    }

    fn executable_name(&self) -> Result<String> {
        let name = match self.recipe {
            BuildRecipe::UnixVim | BuildRecipe::WindowsVim if self.ctx.is_gui => "gvim",
            BuildRecipe::UnixVim | BuildRecipe::WindowsVim | BuildRecipe::MacVim => "vim",
            BuildRecipe::LinuxNeovim | BuildRecipe::MacosNeovim => "nvim",
        };
        Ok(name.to_string())
    }
}

async fn apt_install(packages: &[&str]) -> Result<()> {
    exec::run("sudo", &["apt-get", "update"], None, &[]).await?;
    let mut args = vec!["apt-get", "install", "-y"];
    args.extend_from_slice(packages);
    exec::run("sudo", &args, None, &[]).await
}

fn file_contains(path: &Path, needle: &str) -> bool {
    fs::read_to_string(path).is_ok_and(|content| content.contains(needle))
}

/// Version from MacVim's "Vim patch x.y.z" commit messages, as `vx.y.z`
pub fn macvim_version_from_log(log: &str) -> Option<String> {
    MACVIM_PATCH
        .captures(log)
        .map(|captures| format!("v{}", &captures[1]))
}

/// Link Neovim with `-Wl,-no_deduplicate` on macOS
pub fn add_no_deduplicate(content: &str) -> Option<String> {
    if content.contains("-Wl,-no_deduplicate") {
        return None;
    }
    let patched = if CORE_SERVICES_FLAGS.is_match(content) {
        CORE_SERVICES_FLAGS
            .replace(content, "$0 -Wl,-no_deduplicate")
            .into_owned()
    } else {
        CORE_SERVICES_TARGET
            .replace(
                content,
                "$0\n  target_link_options(${1} PRIVATE \"-Wl,-no_deduplicate\")",
            )
            .into_owned()
    };
    (patched != content).then_some(patched)
}

/// Run po/Makefile's sed calls with LC_CTYPE=C
pub fn fix_po_makefile(content: &str) -> Option<String> {
    let patched = content.replace("\tsed", "\tLC_CTYPE=C sed");
    (patched != content).then_some(patched)
}

fn install_bat(vs_path: &str, arch: &str, is_gui: bool) -> String {
    let gui_options = if is_gui {
        "GUI=yes OLE=yes DIRECTX=yes"
    } else {
        "GUI=no OLE=no DIRECTX=no"
    };
    let vcvarsall = format!("{}\\VC\\Auxiliary\\Build\\vcvarsall.bat", vs_path);
    format!(
        r#"
call "{vcvarsall}" {arch}

rem Suppress progress animation
sed -e "s/@<<$/@<< | sed -e 's#.*\\r.*##'/" Make_mvc.mak > Make_mvc2.mak

nmake -nologo -f Make_mvc2.mak {gui_options} FEATURES=HUGE IME=yes MBYTE=yes ICONV=yes DEBUG=no TERMINAL=yes

copy /Y ..\README.txt ..\runtime
copy /Y ..\vimtutor.bat ..\runtime
copy /Y *.exe ..\runtime
copy /Y tee\*.exe ..\runtime
copy /Y xxd\*.exe ..\runtime
"#
    )
}
