// Subprocess helpers for git and the native build tools

use anyhow::Result;
use log::debug;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Environment overrides applied to one invocation only
pub type EnvOverrides<'a> = &'a [(&'a str, &'a str)];

fn command(program: &str, args: &[&str], cwd: Option<&Path>, env: EnvOverrides<'_>) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    for (key, value) in env {
        cmd.env(key, value);
    }
    cmd
}

fn describe(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

/// Run a command with inherited stdio, failing on a non-zero exit
pub async fn run(
    program: &str,
    args: &[&str],
    cwd: Option<&Path>,
    env: EnvOverrides<'_>,
) -> Result<()> {
    debug!("Running: {}", describe(program, args));
    let status = command(program, args, cwd, env)
        .stdin(Stdio::null())
        .status()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start '{}': {}", program, e))?;

    if !status.success() {
        anyhow::bail!("Command '{}' failed with {}", describe(program, args), status);
    }
    Ok(())
}

/// Run a command and return its trimmed stdout
pub async fn output(
    program: &str,
    args: &[&str],
    cwd: Option<&Path>,
    env: EnvOverrides<'_>,
) -> Result<String> {
    debug!("Running: {}", describe(program, args));
    let out = command(program, args, cwd, env)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start '{}': {}", program, e))?;

    if !out.status.success() {
        anyhow::bail!(
            "Command '{}' failed with {}: {}",
            describe(program, args),
            out.status,
            String::from_utf8_lossy(&out.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
}

/// Run git without ever prompting for credentials
pub async fn git(args: &[&str], cwd: Option<&Path>) -> Result<String> {
    output("git", args, cwd, &[("GIT_TERMINAL_PROMPT", "0")]).await
}

/// Clone `url` at branch or tag `git_ref` into `dest`.
///
/// Does nothing when `dest` already exists. `depth` of `None` fetches the
/// full history.
pub async fn git_clone(url: &str, git_ref: &str, dest: &Path, depth: Option<u32>) -> Result<()> {
    if dest.exists() {
        debug!("{} already cloned", dest.display());
        return Ok(());
    }
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let depth = depth.map(|d| d.to_string());
    let dest = dest.to_string_lossy().into_owned();
    let mut args = vec!["-c", "advice.detachedHead=false", "clone", "--quiet"];
    if let Some(depth) = depth.as_deref() {
        args.extend(["--depth", depth]);
    }
    args.extend(["--branch", git_ref, url, dest.as_str()]);
    run("git", &args, None, &[("GIT_TERMINAL_PROMPT", "0")]).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_describe() {
        assert_eq!(describe("make", &[]), "make");
        assert_eq!(describe("make", &["install"]), "make install");
    }

    #[tokio::test]
    async fn test_clone_into_existing_dir_is_noop() {
        let temp = TempDir::new().unwrap();
        git_clone("https://invalid.invalid/repo", "master", temp.path(), Some(1))
            .await
            .unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_applies_env_overrides() {
        let out = output("sh", &["-c", "echo $SETUP_VIM_PROBE"], None, &[("SETUP_VIM_PROBE", "C")])
            .await
            .unwrap();
        assert_eq!(out, "C");
        assert!(std::env::var("SETUP_VIM_PROBE").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_reports_failure() {
        let err = run("sh", &["-c", "exit 3"], None, &[]).await.unwrap_err();
        assert!(err.to_string().contains("sh -c exit 3"));
    }
}
