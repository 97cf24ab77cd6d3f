//! Concrete module drivers
//!
//! Each driver is a thin wrapper over one tool's CLI. Commands run with
//! the module directory as working directory and the context overlay as
//! their whole environment.

mod cdk;
mod cloudformation;
mod k8s;
mod serverless;
mod terraform;

use crate::runner;
use anyhow::Result;
use orchestrator::{Context, DriverFactory, DriverKind, EnvVars, ModuleDriver, environment_config};
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};

pub use cdk::Cdk;
pub use cloudformation::CloudFormation;
pub use k8s::Kubernetes;
pub use serverless::Serverless;
pub use terraform::Terraform;

/// Everything a driver needs to act on one module in one region
#[derive(Debug, Clone)]
pub struct ModuleSettings {
    pub name: String,
    pub root: PathBuf,
    pub env_name: String,
    pub region: String,
    pub env_vars: EnvVars,
    pub options: Mapping,
}

impl ModuleSettings {
    pub fn new(ctx: &Context, root: &Path, options: &Mapping) -> Self {
        let name = options
            .get("name")
            .and_then(Value::as_str)
            .map_or_else(|| root.display().to_string(), ToString::to_string);
        Self {
            name,
            root: root.to_path_buf(),
            env_name: ctx.env_name.clone(),
            region: ctx.region().to_string(),
            env_vars: ctx.env_vars.clone(),
            options: options.clone(),
        }
    }

    /// `environments.<env>` from the merged options
    pub fn environment_config(&self) -> Option<&Value> {
        environment_config(&self.options, &self.env_name)
    }

    /// Whether this module is turned off for the current environment
    ///
    /// A missing entry, `false` or null skips the module.
    pub fn skipped(&self) -> bool {
        let skip = match self.environment_config() {
            None | Some(Value::Null) | Some(Value::Bool(false)) => true,
            Some(_) => false,
        };
        if skip {
            log::info!(
                "Skipping {}; environment \"{}\" is not defined for this module",
                self.name,
                self.env_name
            );
        }
        skip
    }

    /// `KEY=VALUE` pairs of a mapping-shaped environment config
    pub fn environment_values(&self) -> Vec<(String, String)> {
        self.environment_config()
            .and_then(Value::as_mapping)
            .map(|values| {
                values
                    .iter()
                    .filter_map(|(k, v)| Some((orchestrator::scalar_string(k)?, render(v))))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Option value by key
    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    /// Run a tool in the module directory with the overlay environment
    pub fn run(&self, cmd: &str, args: &[&str]) -> Result<()> {
        if !runner::command_exists(cmd, &self.env_vars) {
            anyhow::bail!("{cmd} not found on PATH; it is required to run {}", self.name);
        }
        runner::run_in(cmd, args, &self.root, &self.env_vars)
    }

    /// Run a tool in the module directory and capture its output
    pub fn capture(&self, cmd: &str, args: &[&str]) -> Result<String> {
        runner::capture_in(cmd, args, &self.root, &self.env_vars)
    }
}

fn render(value: &Value) -> String {
    orchestrator::scalar_string(value).unwrap_or_else(|| {
        serde_json::to_string(value).unwrap_or_default()
    })
}

/// The closed set of drivers this binary ships
#[derive(Debug, Default, Clone, Copy)]
pub struct Registry;

impl DriverFactory for Registry {
    fn create(
        &self,
        kind: DriverKind,
        ctx: &Context,
        module_root: &Path,
        options: &Mapping,
    ) -> Result<Box<dyn ModuleDriver>> {
        let settings = ModuleSettings::new(ctx, module_root, options);
        log::debug!("Using {kind} driver for {}", settings.name);
        Ok(match kind {
            DriverKind::Serverless => Box::new(Serverless::new(settings)),
            DriverKind::Terraform => Box::new(Terraform::new(settings)),
            DriverKind::Cdk => Box::new(Cdk::new(settings)),
            DriverKind::Kubernetes => Box::new(Kubernetes::new(settings)),
            DriverKind::CloudFormation => Box::new(CloudFormation::new(settings)),
        })
    }
}
