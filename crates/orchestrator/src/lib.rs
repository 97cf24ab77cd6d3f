//! # Orchestrator
//!
//! Deployment orchestration for infrastructure modules.
//!
//! A run takes a list of [`Deployment`]s (ordered groups of [`Module`]s
//! targeting one or more regions), narrows them to what the operator asked
//! for, establishes credentials per region and invokes one lifecycle
//! command (`plan`, `deploy` or `destroy`) on every selected module.
//!
//! ## Core Concepts
//!
//! - **Selection**: tags, CI mode and menu answers decide what runs
//! - **Context**: run-scoped state, forked wherever execution diverges
//! - **Engine**: deployments → regions → modules, sequential or parallel
//! - **Reversal**: destroy runs everything backwards
//!
//! ## Example
//!
//! ```ignore
//! use orchestrator::{Command, Context, Engine, ExecuteOptions, LocalOnly};
//!
//! let mut ctx = Context::new("dev", env_root, Command::Deploy, std::env::vars().collect());
//! let engine = Engine::new(&aws, &drivers, &LocalOnly, ExecuteOptions::default())?;
//! engine.execute(deployments, &mut ctx, &mut prompt)?;
//! ```
//!
//! ## Provider Traits
//!
//! Everything that touches the outside world is injected:
//!
//! - [`CredentialProvider`]: role assumption, caller identity, account aliases
//! - [`DriverFactory`] / [`ModuleDriver`]: the infrastructure tools
//! - [`SourceFetcher`]: remote module sources
//! - [`Prompt`]: operator menus and confirmations

pub mod account;
pub mod context;
pub mod credentials;
pub mod driver;
pub mod error;
pub mod executor;
pub mod model;
pub mod options;
pub mod reversal;
pub mod selection;
pub mod source;

// Re-export main types at crate root
pub use account::validate_account_credentials;
pub use context::{Command, Context, DEFAULT_REGION, IAM_ENV_VARS};
pub use credentials::{
    AssumeRoleRequest, BaseCredentials, CredentialProvider, Credentials, DEFAULT_SESSION_NAME,
    assume_role, post_deploy_assume_role, pre_deploy_assume_role,
};
pub use driver::{DriverFactory, DriverKind, ModuleDriver, Unsupported, invoke};
pub use error::{Error, Result};
pub use executor::{Engine, ExecuteOptions};
pub use model::{
    ALL_ENVIRONMENTS, AssumeRoleConfig, Deployment, EnvScoped, EnvVarValue, EnvVars,
    EnvVarsConfig, Module, RoleSpec, scalar_string,
};
pub use options::{MODULE_OPTIONS_FILE, effective_options, environment_config, merge_mappings};
pub use reversal::reverse_deployments;
pub use selection::{Choice, Menu, Prompt, select_deployments, select_modules};
pub use source::{LocalOnly, ModulePath, SourceFetcher, is_current_dir, resolve_module_root};
