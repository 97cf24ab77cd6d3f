//! Account validation
//!
//! Confirms the active credentials belong to the account a deployment
//! declares before any of its modules run.

use crate::context::Context;
use crate::credentials::{BaseCredentials, CredentialProvider};
use crate::error::{Error, Result};
use crate::model::Deployment;

/// Check the declared account id, then the declared alias
pub fn validate_account_credentials(
    provider: &dyn CredentialProvider,
    deployment: &Deployment,
    ctx: &Context,
) -> Result<()> {
    let region = ctx
        .env_vars
        .get("AWS_DEFAULT_REGION")
        .map_or_else(|| ctx.region(), String::as_str);
    let base = BaseCredentials::from_env_vars(&ctx.env_vars);

    if let Some(account_id) = deployment
        .account_id
        .as_ref()
        .and_then(|id| id.resolve(&ctx.env_name))
    {
        validate_account_id(provider, account_id, region, &base)?;
    }

    if let Some(account_alias) = deployment
        .account_alias
        .as_ref()
        .and_then(|alias| alias.resolve(&ctx.env_name))
    {
        validate_account_alias(provider, account_alias, region, &base)?;
    }

    Ok(())
}

fn validate_account_id(
    provider: &dyn CredentialProvider,
    account_id: &str,
    region: &str,
    base: &BaseCredentials,
) -> Result<()> {
    let current = provider
        .caller_account_id(region, base)
        .map_err(|source| Error::CredentialLookup {
            what: "caller identity",
            source,
        })?;

    match current {
        Some(actual) if actual == account_id => {
            log::info!("Verified current AWS account matches required account id {account_id}.");
            Ok(())
        }
        Some(actual) => {
            log::error!(
                "Current AWS account {actual} does not match required account {account_id} in Runway config."
            );
            Err(Error::AccountIdMismatch {
                expected: account_id.to_string(),
                actual,
            })
        }
        None => {
            log::error!("Error checking current account ID");
            Err(Error::AccountIdUnavailable)
        }
    }
}

fn validate_account_alias(
    provider: &dyn CredentialProvider,
    account_alias: &str,
    region: &str,
    base: &BaseCredentials,
) -> Result<()> {
    let aliases = provider
        .account_aliases(region, base)
        .map_err(|source| Error::CredentialLookup {
            what: "account aliases",
            source,
        })?;

    if aliases.iter().any(|alias| alias == account_alias) {
        log::info!("Verified current AWS account alias matches required alias {account_alias}.");
        Ok(())
    } else {
        log::error!(
            "Current AWS account aliases \"{}\" do not match required account alias {account_alias} in Runway config.",
            aliases.join(",")
        );
        Err(Error::AccountAliasMismatch {
            expected: account_alias.to_string(),
            actual: aliases,
        })
    }
}
