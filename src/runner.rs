use anyhow::{Context, Result};
use orchestrator::EnvVars;
use std::path::Path;
use std::process::{Command, Stdio};

/// Build a command that sees exactly `env` as its environment
fn command(cmd: &str, args: &[&str], dir: &Path, env: &EnvVars) -> Command {
    let mut command = Command::new(cmd);
    command.args(args).current_dir(dir).env_clear().envs(env);
    command
}

fn describe(cmd: &str, args: &[&str]) -> String {
    format!("{} {}", cmd, args.join(" "))
}

/// Run a command in `dir` and inherit stdio (shows output in real-time)
///
/// A non-zero exit status is an error.
pub fn run_in(cmd: &str, args: &[&str], dir: &Path, env: &EnvVars) -> Result<()> {
    log::debug!("Running {} in {}", describe(cmd, args), dir.display());
    let status = command(cmd, args, dir, env)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .with_context(|| format!("Failed to execute: {}", describe(cmd, args)))?;

    if !status.success() {
        anyhow::bail!("{} exited with {}", describe(cmd, args), status);
    }
    Ok(())
}

/// Run a command in `dir` and capture its output
pub fn capture_in(cmd: &str, args: &[&str], dir: &Path, env: &EnvVars) -> Result<String> {
    let output = command(cmd, args, dir, env)
        .output()
        .with_context(|| format!("Failed to execute: {}", describe(cmd, args)))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("Command failed: {}", stderr.trim())
    }
}

/// Run a command with the inherited environment and capture output
pub fn run_capture(cmd: &str, args: &[&str], dir: &Path) -> Result<String> {
    let output = Command::new(cmd)
        .args(args)
        .current_dir(dir)
        .output()
        .with_context(|| format!("Failed to execute: {}", describe(cmd, args)))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("Command failed: {}", stderr.trim())
    }
}

/// Check if a command exists on the `PATH` of `env`
pub fn command_exists(cmd: &str, env: &EnvVars) -> bool {
    env.get("PATH").is_some_and(|path| {
        std::env::split_paths(path).any(|dir| dir.join(cmd).is_file())
    })
}
