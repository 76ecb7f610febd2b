// CLI module for handling command-line interface

use crate::constants;
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "setup-vim")]
#[command(version)]
#[command(about = "Install a Vim, Neovim or MacVim version from a release or from source")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve, install (or restore from cache) and report outputs
    Install(InstallArgs),
    /// Save the cache of a build made by `install`
    Post,
    /// Print the fixed version a specifier resolves to
    Resolve(InstallArgs),
}

#[derive(Args, Debug, Clone)]
pub struct InstallArgs {
    /// vim, neovim or macvim
    #[arg(long, env = "INPUT_VIM_TYPE", default_value = constants::DEFAULT_VIM_TYPE)]
    pub vim_type: String,

    /// head, latest, stable, nightly, a tag or a version floor
    #[arg(long, env = "INPUT_VIM_VERSION", default_value = constants::DEFAULT_VIM_VERSION)]
    pub vim_version: String,

    /// yes or no
    #[arg(long, env = "INPUT_GUI", default_value = "no")]
    pub gui: String,

    /// always, available or never
    #[arg(long, env = "INPUT_DOWNLOAD", default_value = constants::DEFAULT_DOWNLOAD)]
    pub download: String,

    #[arg(long, env = "INPUT_ARCH")]
    pub arch: Option<String>,

    /// true, false or test. Entries go to SETUP_VIM_CACHE_DIR, which must
    /// persist between jobs for a later run to restore them.
    #[arg(long, env = "INPUT_CACHE", default_value = "true")]
    pub cache: String,

    #[arg(long, env = "INPUT_GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,
}

impl InstallArgs {
    pub fn is_gui(&self) -> bool {
        self.gui.trim() == "yes"
    }

    /// Explicit token, else the runner's `GITHUB_TOKEN`
    pub fn token(&self) -> Option<String> {
        self.github_token
            .clone()
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
            .filter(|token| !token.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_flags() {
        let cli = Cli::try_parse_from([
            "setup-vim",
            "install",
            "--vim-type",
            "neovim",
            "--vim-version",
            "stable",
            "--gui",
            "yes",
            "--download",
            "never",
        ])
        .unwrap();
        let Commands::Install(args) = cli.command else {
            panic!("expected install");
        };
        assert_eq!(args.vim_type, "neovim");
        assert_eq!(args.vim_version, "stable");
        assert!(args.is_gui());
        assert_eq!(args.download, "never");
        assert_eq!(args.cache, "true");
    }

    #[test]
    fn test_post_takes_no_arguments() {
        assert!(matches!(
            Cli::try_parse_from(["setup-vim", "post"]).unwrap().command,
            Commands::Post
        ));
        assert!(Cli::try_parse_from(["setup-vim", "post", "--vim-type", "vim"]).is_err());
    }
}
