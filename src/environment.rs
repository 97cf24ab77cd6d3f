use crate::runner;
use std::path::Path;

/// Variable that pins the environment name
pub const DEPLOY_ENVIRONMENT: &str = "DEPLOY_ENVIRONMENT";

/// Branch prefix stripped when deriving the environment from git
pub const BRANCH_PREFIX: &str = "ENV-";

/// Determine the environment name for a run
///
/// `DEPLOY_ENVIRONMENT` wins, then the current git branch (unless
/// `ignore_git_branch`), then the name of the environment root directory.
pub fn env_name(env_root: &Path, deploy_environment: Option<&str>, ignore_git_branch: bool) -> String {
    let branch = if ignore_git_branch || deploy_environment.is_some_and(|e| !e.is_empty()) {
        None
    } else {
        git_branch(env_root)
    };
    resolve(env_root, deploy_environment, branch.as_deref())
}

fn resolve(env_root: &Path, deploy_environment: Option<&str>, branch: Option<&str>) -> String {
    if let Some(name) = deploy_environment.filter(|e| !e.is_empty()) {
        log::info!("Deploy environment set to \"{name}\" from {DEPLOY_ENVIRONMENT}");
        return name.to_string();
    }

    if let Some(branch) = branch.filter(|b| !b.is_empty() && *b != "HEAD") {
        let name = branch.strip_prefix(BRANCH_PREFIX).unwrap_or(branch);
        log::info!("Deploy environment \"{name}\" derived from git branch \"{branch}\"");
        return name.to_string();
    }

    let name = env_root
        .canonicalize()
        .ok()
        .as_deref()
        .and_then(Path::file_name)
        .or_else(|| env_root.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    log::info!("Deploy environment \"{name}\" derived from directory name");
    name
}

fn git_branch(env_root: &Path) -> Option<String> {
    match runner::run_capture("git", &["rev-parse", "--abbrev-ref", "HEAD"], env_root) {
        Ok(branch) => Some(branch),
        Err(e) => {
            log::debug!("Not using git branch for environment name: {e}");
            None
        }
    }
}
