//! Git module sources
//!
//! `git::<uri>//<location>?commit=|tag=|branch=` paths are cloned once per
//! resolved commit into the cache directory and reused afterwards.

use crate::runner;
use anyhow::{Context, Result, bail};
use orchestrator::{ModulePath, SourceFetcher};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Cache directory name under the environment root
pub const CACHE_DIR: &str = ".runway_cache";

const REF_OPTIONS: [&str; 3] = ["commit", "tag", "branch"];

static CLONE_SEQ: AtomicUsize = AtomicUsize::new(0);

/// Fetches `git::` module sources into a local cache
#[derive(Debug, Clone)]
pub struct GitSource {
    cache_dir: PathBuf,
}

impl GitSource {
    pub fn new(env_root: &Path) -> Self {
        Self {
            cache_dir: env_root.join(CACHE_DIR),
        }
    }

    fn clone_into(&self, uri: &str, git_ref: &str, dest: &Path) -> Result<()> {
        fs::create_dir_all(&self.cache_dir)
            .with_context(|| format!("Could not create {}", self.cache_dir.display()))?;

        let seq = CLONE_SEQ.fetch_add(1, Ordering::Relaxed);
        let staging = self
            .cache_dir
            .join(format!(".clone-{}-{seq}", std::process::id()));
        let staging_str = staging.to_string_lossy().into_owned();

        log::info!("Cloning {uri} at {git_ref}");
        let cloned = runner::run_capture("git", &["clone", "--quiet", uri, staging_str.as_str()], &self.cache_dir)
            .and_then(|_| runner::run_capture("git", &["checkout", "--quiet", git_ref], &staging));
        if let Err(e) = cloned {
            let _ = fs::remove_dir_all(&staging);
            return Err(e).with_context(|| format!("Could not clone {uri} at {git_ref}"));
        }

        // Another worker may have finished the same checkout first
        if let Err(e) = fs::rename(&staging, dest) {
            let _ = fs::remove_dir_all(&staging);
            if !dest.is_dir() {
                return Err(e).with_context(|| format!("Could not move checkout to {}", dest.display()));
            }
        }
        Ok(())
    }
}

impl SourceFetcher for GitSource {
    fn fetch(&self, path: &ModulePath) -> Result<PathBuf> {
        if path.source != "git" {
            bail!("unsupported module source \"{}\"", path.source);
        }

        let git_ref = determine_ref(path, ls_remote)?;
        let dest = self
            .cache_dir
            .join(format!("{}_{git_ref}", sanitize_git_path(&path.uri)));

        if dest.is_dir() {
            log::debug!("Using cached checkout {}", dest.display());
        } else {
            self.clone_into(&path.uri, &git_ref, &dest)?;
        }
        Ok(dest.join(&path.location))
    }
}

/// Pick the ref to check out: `commit`, `tag`, or the commit behind
/// `branch` (or `HEAD`) as reported by `ls_remote`
fn determine_ref(
    path: &ModulePath,
    ls_remote: impl Fn(&str, &str) -> Result<String>,
) -> Result<String> {
    let option = |key: &str| path.options.get(key).filter(|v| !v.is_empty());

    if REF_OPTIONS.iter().filter(|&&key| option(key).is_some()).count() > 1 {
        bail!(
            "Fetching remote git sources failed: conflicting revisions (e.g. 'commit', 'tag', 'branch') specified for a package source"
        );
    }

    if let Some(commit) = option("commit") {
        return Ok(commit.clone());
    }
    if let Some(tag) = option("tag") {
        return Ok(tag.clone());
    }
    let remote_ref = option("branch").map_or_else(|| "HEAD".to_string(), |b| format!("refs/heads/{b}"));
    ls_remote(&path.uri, &remote_ref)
}

fn ls_remote(uri: &str, remote_ref: &str) -> Result<String> {
    log::debug!("Invoking git to retrieve commit id for repo {uri}...");
    let output = runner::run_capture("git", &["ls-remote", uri, remote_ref], Path::new("."))?;
    parse_ls_remote(&output).with_context(|| format!("Ref \"{remote_ref}\" not found for repo {uri}."))
}

fn parse_ls_remote(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.split_once('\t'))
        .map(|(commit, _)| commit.trim().to_string())
        .filter(|commit| !commit.is_empty())
}

/// Directory-safe name for a repository uri
fn sanitize_git_path(uri: &str) -> String {
    let last = uri.rsplit("//").next().unwrap_or(uri);
    let name = last.strip_suffix(".git").map_or(uri, |stripped| stripped);
    name.replace(['@', '/', ':'], "_")
}
