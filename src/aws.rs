//! Credential provider backed by the AWS CLI

use crate::runner;
use anyhow::{Context, Result};
use orchestrator::{AssumeRoleRequest, BaseCredentials, CredentialProvider, Credentials, EnvVars};
use serde::Deserialize;
use std::path::Path;

const AWS: &str = "aws";
const ALIAS_PAGE_SIZE: &str = "100";

/// Talks to STS and IAM through the `aws` command
#[derive(Debug, Default, Clone, Copy)]
pub struct AwsCli;

impl AwsCli {
    /// Run `aws` with JSON output, explicit credentials and region
    fn call<T: for<'de> Deserialize<'de>>(
        &self,
        args: &[&str],
        region: &str,
        base: &BaseCredentials,
    ) -> Result<T> {
        let mut env: EnvVars = std::env::vars().collect();
        env.extend(
            base.env_pairs()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        );
        env.insert("AWS_DEFAULT_REGION".into(), region.to_string());
        env.insert("AWS_REGION".into(), region.to_string());

        let mut full_args = args.to_vec();
        full_args.extend(["--output", "json"]);
        let output = runner::capture_in(AWS, &full_args, Path::new("."), &env)?;
        serde_json::from_str(&output)
            .with_context(|| format!("Unexpected output from aws {}", args.join(" ")))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AssumeRoleResponse {
    credentials: RawCredentials,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CallerIdentity {
    account: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AccountAliasesPage {
    #[serde(default)]
    account_aliases: Vec<String>,
    next_token: Option<String>,
}

impl CredentialProvider for AwsCli {
    fn assume_role(
        &self,
        request: &AssumeRoleRequest,
        base: &BaseCredentials,
    ) -> Result<Credentials> {
        let duration = request.duration_seconds.map(|d| d.to_string());
        let mut args = vec![
            "sts",
            "assume-role",
            "--role-arn",
            request.role_arn.as_str(),
            "--role-session-name",
            request.session_name.as_str(),
        ];
        if let Some(duration) = duration.as_deref() {
            args.extend(["--duration-seconds", duration]);
        }

        let response: AssumeRoleResponse = self.call(&args, &request.region, base)?;
        Ok(Credentials {
            access_key_id: response.credentials.access_key_id,
            secret_access_key: response.credentials.secret_access_key,
            session_token: response.credentials.session_token,
        })
    }

    fn caller_account_id(&self, region: &str, base: &BaseCredentials) -> Result<Option<String>> {
        let identity: CallerIdentity = self.call(&["sts", "get-caller-identity"], region, base)?;
        Ok(identity.account)
    }

    fn account_aliases(&self, region: &str, base: &BaseCredentials) -> Result<Vec<String>> {
        let mut aliases = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let mut args = vec!["iam", "list-account-aliases", "--max-items", ALIAS_PAGE_SIZE];
            if let Some(token) = token.as_deref() {
                args.extend(["--starting-token", token]);
            }
            let page: AccountAliasesPage = self.call(&args, region, base)?;
            aliases.extend(page.account_aliases);
            match page.next_token {
                Some(next) if !next.is_empty() => token = Some(next),
                _ => return Ok(aliases),
            }
        }
    }
}
