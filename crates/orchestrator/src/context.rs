//! Run-scoped execution state
//!
//! One [`Context`] is created per run and threaded through the engine by
//! reference along the serial path. Parallel branches and module-local
//! overrides work on a [`Context::fork`], so no branch ever observes
//! another branch's overlay changes.

use crate::model::EnvVars;
use std::fmt;
use std::path::PathBuf;

/// Credential variables saved and restored around role assumption
pub const IAM_ENV_VARS: [&str; 3] = [
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
    "AWS_SESSION_TOKEN",
];

/// Region used before any region has been selected
pub const DEFAULT_REGION: &str = "us-east-1";

/// Lifecycle command being run against every selected module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Plan,
    Deploy,
    Destroy,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Deploy => "deploy",
            Self::Destroy => "destroy",
        }
    }

    /// Destructive commands run in reverse order and ask before acting
    pub fn is_destructive(self) -> bool {
        matches!(self, Self::Destroy)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable state for one orchestration run
#[derive(Debug, Clone)]
pub struct Context {
    pub env_name: String,
    pub env_region: Option<String>,
    pub env_root: PathBuf,
    pub command: Command,
    pub env_vars: EnvVars,
    saved_iam_env_vars: Option<EnvVars>,
}

impl Context {
    pub fn new(
        env_name: impl Into<String>,
        env_root: impl Into<PathBuf>,
        command: Command,
        env_vars: EnvVars,
    ) -> Self {
        Self {
            env_name: env_name.into(),
            env_region: None,
            env_root: env_root.into(),
            command,
            env_vars,
            saved_iam_env_vars: None,
        }
    }

    /// Non-interactive mode, toggled by a non-empty `CI` variable
    pub fn is_ci(&self) -> bool {
        self.env_vars.get("CI").is_some_and(|value| !value.is_empty())
    }

    /// Independent copy for a branch that must not leak changes back
    pub fn fork(&self) -> Self {
        self.clone()
    }

    /// Current region, or the default before region iteration starts
    pub fn region(&self) -> &str {
        self.env_region.as_deref().unwrap_or(DEFAULT_REGION)
    }

    /// Point the context (and the AWS region variables) at `region`
    pub fn set_region(&mut self, region: &str) {
        self.env_region = Some(region.to_string());
        self.env_vars
            .insert("AWS_DEFAULT_REGION".to_string(), region.to_string());
        self.env_vars
            .insert("AWS_REGION".to_string(), region.to_string());
    }

    /// Merge an overlay into the variables; overlay values win
    pub fn merge_env_vars(&mut self, overlay: &EnvVars) {
        self.env_vars
            .extend(overlay.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    /// Snapshot the current credential variables before assuming a role
    pub fn save_existing_iam_env_vars(&mut self) {
        let saved = IAM_ENV_VARS
            .iter()
            .filter_map(|key| {
                self.env_vars
                    .get(*key)
                    .map(|value| ((*key).to_string(), value.clone()))
            })
            .collect();
        self.saved_iam_env_vars = Some(saved);
    }

    /// Put back the snapshot taken by [`Self::save_existing_iam_env_vars`]
    ///
    /// Credential variables that did not exist at snapshot time are removed.
    pub fn restore_existing_iam_env_vars(&mut self) {
        let Some(saved) = self.saved_iam_env_vars.take() else {
            log::debug!("No saved credentials to restore");
            return;
        };
        for key in IAM_ENV_VARS {
            match saved.get(key) {
                Some(value) => {
                    self.env_vars.insert(key.to_string(), value.clone());
                }
                None => {
                    self.env_vars.remove(key);
                }
            }
        }
    }
}
