//! Deployment and module definitions
//!
//! These are the validated, in-memory forms of a runway config. Nothing
//! here is persisted between runs.

use crate::error::{Error, Result};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// Environment variable overlay (keys unique, last write wins)
pub type EnvVars = BTreeMap<String, String>;

/// Scope key applied to every environment in `env_vars` blocks
pub const ALL_ENVIRONMENTS: &str = "*";

/// A named, ordered collection of modules targeting one or more regions
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Deployment {
    pub name: String,
    pub modules: Vec<Module>,
    pub regions: Vec<String>,
    pub parallel_regions: Vec<String>,
    pub account_id: Option<EnvScoped>,
    pub account_alias: Option<EnvScoped>,
    pub assume_role: Option<AssumeRoleConfig>,
    pub env_vars: EnvVarsConfig,
    pub environments: Mapping,
    pub module_options: Mapping,
}

impl Deployment {
    /// Create a deployment with modules and serial regions
    pub fn new(name: impl Into<String>, modules: Vec<Module>, regions: &[&str]) -> Self {
        Self {
            name: name.into(),
            modules,
            regions: regions.iter().map(ToString::to_string).collect(),
            ..Self::default()
        }
    }

    /// Default name for the deployment at `index` (zero-based)
    pub fn default_name(index: usize) -> String {
        format!("deployment_{}", index + 1)
    }

    /// Whether any region source (serial or parallel) is configured
    pub fn has_regions(&self) -> bool {
        !self.regions.is_empty() || !self.parallel_regions.is_empty()
    }

    /// Whether an account id or alias constraint is declared
    pub fn has_account_constraint(&self) -> bool {
        self.account_id.is_some() || self.account_alias.is_some()
    }
}

/// A deployable unit, or a group of child modules
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    pub name: String,
    pub path: String,
    pub class_path: Option<String>,
    pub environments: Mapping,
    pub env_vars: EnvVarsConfig,
    pub options: Mapping,
    pub tags: Vec<String>,
    pub child_modules: Vec<Module>,
    /// Declared as a bare path string, so it cannot carry tags
    pub bare: bool,
}

impl Module {
    /// A structured module definition at `path`
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            name: path.clone(),
            path,
            ..Self::default()
        }
    }

    /// A module declared only as a path string
    pub fn bare(path: impl Into<String>) -> Self {
        Self {
            bare: true,
            ..Self::new(path)
        }
    }

    /// A group whose children may run in parallel
    pub fn group(child_modules: Vec<Module>) -> Self {
        let path = format!(
            "[{}]",
            child_modules
                .iter()
                .map(|m| m.path.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Self {
            name: "parallel_parent".to_string(),
            path,
            child_modules,
            ..Self::default()
        }
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(ToString::to_string).collect();
        self
    }

    pub fn is_group(&self) -> bool {
        !self.child_modules.is_empty()
    }

    /// Whether every queried tag is declared on this module
    pub fn matches_tags(&self, query: &[String]) -> bool {
        query.iter().all(|tag| self.tags.contains(tag))
    }
}

/// A value given either for all environments or per environment name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvScoped {
    All(String),
    PerEnvironment(BTreeMap<String, String>),
}

impl EnvScoped {
    /// Value for `env_name`, if one is declared and non-empty
    pub fn resolve(&self, env_name: &str) -> Option<&str> {
        let value = match self {
            Self::All(value) => Some(value.as_str()),
            Self::PerEnvironment(values) => values.get(env_name).map(String::as_str),
        };
        value.filter(|v| !v.is_empty())
    }
}

/// A role to assume, with an optional session duration in seconds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSpec {
    pub arn: String,
    pub duration: Option<u64>,
}

impl RoleSpec {
    pub fn new(arn: impl Into<String>) -> Self {
        Self {
            arn: arn.into(),
            duration: None,
        }
    }
}

/// Deployment-level `assume_role` configuration
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AssumeRoleConfig {
    /// Role used for every environment (`arn:` key or a bare ARN)
    pub global: Option<RoleSpec>,
    /// Roles keyed by environment name
    pub environments: BTreeMap<String, RoleSpec>,
    pub session_name: Option<String>,
    /// Restore the pre-assumption credentials once the region completes
    pub post_deploy_env_revert: bool,
}

impl AssumeRoleConfig {
    /// A single role for all environments, without reversion
    pub fn arn(arn: impl Into<String>) -> Self {
        Self {
            global: Some(RoleSpec::new(arn)),
            ..Self::default()
        }
    }

    /// The one role that applies to `env_name`, if any
    pub fn resolve(&self, env_name: &str) -> Option<&RoleSpec> {
        self.global
            .as_ref()
            .or_else(|| self.environments.get(env_name))
            .filter(|role| !role.arn.is_empty())
    }
}

/// A single `env_vars` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvVarValue {
    Literal(String),
    /// Joined as a path under the environment root
    PathComponents(Vec<String>),
}

impl EnvVarValue {
    fn render(&self, env_root: &Path) -> String {
        match self {
            Self::Literal(value) => value.clone(),
            Self::PathComponents(parts) => parts
                .iter()
                .fold(env_root.to_path_buf(), |path, part| path.join(part))
                .to_string_lossy()
                .into_owned(),
        }
    }
}

/// Environment variable overrides keyed by environment name (or `*`)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EnvVarsConfig(pub BTreeMap<String, BTreeMap<String, EnvVarValue>>);

impl EnvVarsConfig {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Read an `env_vars` block: `{env: {NAME: value | [path, parts]}}`
    pub fn from_value(value: &Value) -> Result<Self> {
        let invalid = |what: String| Error::InvalidConfig(format!("env_vars: {what}"));
        let Value::Mapping(scopes) = value else {
            return Err(invalid("expected a mapping of environment names".into()));
        };

        let mut config = BTreeMap::new();
        for (scope, vars) in scopes {
            let scope = scalar_string(scope).ok_or_else(|| invalid(format!("bad key {scope:?}")))?;
            let vars = match vars {
                Value::Mapping(vars) => vars,
                Value::Null => continue,
                _ => return Err(invalid(format!("\"{scope}\" must be a mapping"))),
            };

            let mut entries = BTreeMap::new();
            for (name, raw) in vars {
                let name =
                    scalar_string(name).ok_or_else(|| invalid(format!("bad name {name:?}")))?;
                let value = match raw {
                    Value::Sequence(parts) => EnvVarValue::PathComponents(
                        parts
                            .iter()
                            .map(|part| {
                                scalar_string(part)
                                    .ok_or_else(|| invalid(format!("bad path part in {name}")))
                            })
                            .collect::<Result<_>>()?,
                    ),
                    other => EnvVarValue::Literal(
                        scalar_string(other).ok_or_else(|| invalid(format!("bad value for {name}")))?,
                    ),
                };
                entries.insert(name, value);
            }
            config.insert(scope, entries);
        }
        Ok(Self(config))
    }

    /// Flatten to the overrides for `env_name`
    ///
    /// Entries under `*` apply to every environment; environment-specific
    /// entries win over them.
    pub fn resolve(&self, env_name: &str, env_root: &Path) -> EnvVars {
        let mut resolved = EnvVars::new();
        for scope in [ALL_ENVIRONMENTS, env_name] {
            if let Some(vars) = self.0.get(scope) {
                for (key, value) in vars {
                    resolved.insert(key.clone(), value.render(env_root));
                }
            }
        }
        resolved
    }
}

/// Render a YAML scalar as a string (numbers and booleans included)
pub fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
