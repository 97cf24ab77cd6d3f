//! Credential broker
//!
//! The [`CredentialProvider`] trait is the seam to the cloud provider:
//! the binary talks to STS/IAM, tests substitute a fake.

use crate::context::Context;
use crate::error::{Error, Result};
use crate::model::{AssumeRoleConfig, EnvVars};
use std::fmt;

/// Session name used when the config does not give one
pub const DEFAULT_SESSION_NAME: &str = "runway";

/// Parameters for a single role assumption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssumeRoleRequest {
    pub role_arn: String,
    pub session_name: String,
    pub duration_seconds: Option<u64>,
    pub region: String,
}

/// Explicit credentials taken from a variable overlay
///
/// When set, providers build their client from these instead of the
/// ambient credential chain, which is what allows role chaining.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct BaseCredentials {
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
}

impl BaseCredentials {
    pub fn from_env_vars(env_vars: &EnvVars) -> Self {
        let get = |key: &str| env_vars.get(key).filter(|v| !v.is_empty()).cloned();
        Self {
            access_key_id: get("AWS_ACCESS_KEY_ID"),
            secret_access_key: get("AWS_SECRET_ACCESS_KEY"),
            session_token: get("AWS_SESSION_TOKEN"),
        }
    }

    /// The credentials that are set, as environment variable pairs
    pub fn env_pairs(&self) -> Vec<(&'static str, &str)> {
        [
            ("AWS_ACCESS_KEY_ID", &self.access_key_id),
            ("AWS_SECRET_ACCESS_KEY", &self.secret_access_key),
            ("AWS_SESSION_TOKEN", &self.session_token),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.as_deref().map(|v| (key, v)))
        .collect()
    }
}

impl fmt::Debug for BaseCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &self.secret_access_key.as_ref().map(|_| "***"))
            .field("session_token", &self.session_token.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Temporary credentials returned by role assumption
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
}

impl Credentials {
    pub fn into_env_vars(self) -> EnvVars {
        EnvVars::from([
            ("AWS_ACCESS_KEY_ID".to_string(), self.access_key_id),
            ("AWS_SECRET_ACCESS_KEY".to_string(), self.secret_access_key),
            ("AWS_SESSION_TOKEN".to_string(), self.session_token),
        ])
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .finish_non_exhaustive()
    }
}

/// Provider for role assumption and identity checks
///
/// Implementations are shared across worker threads.
pub trait CredentialProvider: Send + Sync {
    /// Exchange `base` (or ambient) credentials for the requested role
    fn assume_role(
        &self,
        request: &AssumeRoleRequest,
        base: &BaseCredentials,
    ) -> anyhow::Result<Credentials>;

    /// Account id of the current caller, if the identity reports one
    fn caller_account_id(&self, region: &str, base: &BaseCredentials)
    -> anyhow::Result<Option<String>>;

    /// Every alias of the current account (all pages)
    fn account_aliases(&self, region: &str, base: &BaseCredentials) -> anyhow::Result<Vec<String>>;
}

/// Assume `role_arn` and return the credential variables
///
/// Failures are never retried: they point at misconfiguration.
pub fn assume_role(
    provider: &dyn CredentialProvider,
    role_arn: &str,
    session_name: Option<&str>,
    duration_seconds: Option<u64>,
    region: &str,
    env_vars: &EnvVars,
) -> Result<EnvVars> {
    let request = AssumeRoleRequest {
        role_arn: role_arn.to_string(),
        session_name: session_name.unwrap_or(DEFAULT_SESSION_NAME).to_string(),
        duration_seconds,
        region: region.to_string(),
    };
    log::info!("Assuming role {role_arn}...");
    provider
        .assume_role(&request, &BaseCredentials::from_env_vars(env_vars))
        .map(Credentials::into_env_vars)
        .map_err(|source| Error::AssumeRole {
            arn: role_arn.to_string(),
            source,
        })
}

/// Assume the deployment's role for the current environment
///
/// Takes a credential snapshot first when the config asks for reversion.
/// No role for the environment is not an error.
pub fn pre_deploy_assume_role(
    provider: &dyn CredentialProvider,
    config: &AssumeRoleConfig,
    ctx: &mut Context,
) -> Result<()> {
    if config.post_deploy_env_revert {
        ctx.save_existing_iam_env_vars();
    }

    let Some(role) = config.resolve(&ctx.env_name) else {
        log::info!(
            "Skipping iam:AssumeRole; no role found for environment {}...",
            ctx.env_name
        );
        return Ok(());
    };

    let credentials = assume_role(
        provider,
        &role.arn,
        config.session_name.as_deref(),
        role.duration,
        ctx.region(),
        &ctx.env_vars,
    )?;
    ctx.merge_env_vars(&credentials);
    Ok(())
}

/// Revert to the credentials saved before assumption, if requested
pub fn post_deploy_assume_role(config: &AssumeRoleConfig, ctx: &mut Context) {
    if config.post_deploy_env_revert {
        ctx.restore_existing_iam_env_vars();
    }
}
