//! Error types for the orchestrator crate

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort an orchestration run
///
/// Every variant is fatal except [`Error::Cancelled`], which callers
/// report as a clean exit.
#[derive(Error, Debug)]
pub enum Error {
    /// Deployment has no modules configured
    #[error("no modules configured in deployment \"{0}\"")]
    NoModules(String),

    /// Deployment has neither serial nor parallel regions
    #[error("no region configured for deployment \"{0}\"")]
    NoRegions(String),

    /// Configuration could not be turned into deployments
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operator input did not name a menu entry
    #[error("please select a valid number (or \"all\"), got \"{0}\"")]
    InvalidSelection(String),

    /// Operator declined to proceed
    #[error("cancelled by operator")]
    Cancelled,

    /// No driver matched the module directory
    #[error("no module class found for {}", .0.display())]
    NoDriver(PathBuf),

    /// Explicit class override names no known driver
    #[error("unknown module class \"{0}\"")]
    UnknownDriverClass(String),

    /// Driver does not implement the requested lifecycle command
    #[error("'{driver}' is missing method '{command}' (module {module})")]
    UnsupportedCommand {
        driver: &'static str,
        command: String,
        module: String,
    },

    /// Caller identity does not belong to the expected account
    #[error("current AWS account {actual} does not match required account {expected}")]
    AccountIdMismatch { expected: String, actual: String },

    /// Caller identity lookup returned no account
    #[error("error checking current account ID")]
    AccountIdUnavailable,

    /// Expected alias is not among the account's aliases
    #[error(
        "current AWS account aliases \"{}\" do not match required account alias {expected}",
        .actual.join(",")
    )]
    AccountAliasMismatch {
        expected: String,
        actual: Vec<String>,
    },

    /// Role assumption failed
    #[error("failed to assume role {arn}: {source}")]
    AssumeRole {
        arn: String,
        #[source]
        source: anyhow::Error,
    },

    /// Identity or alias lookup failed
    #[error("failed to look up {what}: {source}")]
    CredentialLookup {
        what: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// Remote module source could not be fetched
    #[error("failed to fetch module source {path}: {source}")]
    Source {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    /// Driver failed while running a lifecycle command
    #[error("{command} failed for module {module} in {region}: {source}")]
    Driver {
        module: String,
        command: String,
        region: String,
        #[source]
        source: anyhow::Error,
    },

    /// Module option file could not be parsed
    #[error("invalid module options file {}: {source}", .path.display())]
    ModuleOptions {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Worker pool could not be created
    #[error("failed to create worker pool: {0}")]
    ThreadPool(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for orchestrator operations
pub type Result<T> = std::result::Result<T, Error>;
