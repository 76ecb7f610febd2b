// Outputs module for the GitHub Actions file protocol

use crate::ui;
use log::debug;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Where step outputs, PATH additions and exported variables go.
///
/// Each target is a file the runner reads after the step. Targets that are
/// not configured are printed instead.
#[derive(Debug, Clone, Default)]
pub struct Outputs {
    output_file: Option<PathBuf>,
    path_file: Option<PathBuf>,
    env_file: Option<PathBuf>,
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var_os(name)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

fn append_line(file: &Path, line: &str) -> anyhow::Result<()> {
    let mut handle = OpenOptions::new().create(true).append(true).open(file)?;
    writeln!(handle, "{}", line)?;
    Ok(())
}

impl Outputs {
    pub fn from_env() -> Self {
        Self {
            output_file: env_path("GITHUB_OUTPUT"),
            path_file: env_path("GITHUB_PATH"),
            env_file: env_path("GITHUB_ENV"),
        }
    }

    pub fn set_output(&self, name: &str, value: &str) -> anyhow::Result<()> {
        debug!("Output {}={}", name, value);
        match &self.output_file {
            Some(file) => append_line(file, &format!("{}={}", name, value)),
            None => {
                ui::status(&format!("{}:", name), value);
                Ok(())
            }
        }
    }

    pub fn add_path(&self, dir: &Path) -> anyhow::Result<()> {
        let dir = dir.to_string_lossy();
        match &self.path_file {
            Some(file) => append_line(file, &dir),
            None => {
                ui::status("path:", &dir);
                Ok(())
            }
        }
    }

    pub fn export_var(&self, name: &str, value: &str) -> anyhow::Result<()> {
        match &self.env_file {
            Some(file) => append_line(file, &format!("{}={}", name, value)),
            None => {
                ui::status("export:", &format!("{}={}", name, value));
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_values_are_appended_to_runner_files() {
        let temp = TempDir::new().unwrap();
        let outputs = Outputs {
            output_file: Some(temp.path().join("output")),
            path_file: Some(temp.path().join("path")),
            env_file: Some(temp.path().join("env")),
        };

        outputs.set_output("executable", "nvim").unwrap();
        outputs.set_output("cache_hit", "false").unwrap();
        outputs.add_path(Path::new("/tmp/vim/bin")).unwrap();
        outputs.export_var("LD_PRELOAD", "/lib/libgmodule.so").unwrap();

        assert_eq!(
            std::fs::read_to_string(temp.path().join("output")).unwrap(),
            "executable=nvim\ncache_hit=false\n"
        );
        assert_eq!(
            std::fs::read_to_string(temp.path().join("path")).unwrap(),
            "/tmp/vim/bin\n"
        );
        assert_eq!(
            std::fs::read_to_string(temp.path().join("env")).unwrap(),
            "LD_PRELOAD=/lib/libgmodule.so\n"
        );
    }

    #[test]
    fn test_unconfigured_targets_do_not_fail() {
        let outputs = Outputs::default();
        outputs.set_output("install_type", "build").unwrap();
        outputs.add_path(Path::new("/opt/vim/bin")).unwrap();
    }
}
