use anyhow::{Context, Result, bail};
use orchestrator::{
    AssumeRoleConfig, Deployment, EnvScoped, EnvVarsConfig, Module, RoleSpec, scalar_string,
};
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// File names searched for in the working directory, in order
pub const CONFIG_FILE_NAMES: [&str; 2] = ["runway.yml", "runway.yaml"];

/// A loaded runway config file
#[derive(Debug)]
pub struct RunwayConfig {
    pub path: PathBuf,
    pub deployments: Vec<Deployment>,
    pub ignore_git_branch: bool,
}

impl RunwayConfig {
    /// Load `path`, or the config file found in `dir`
    pub fn load(path: Option<&Path>, dir: &Path) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => find_config_file(dir)?,
        };
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Runway config file was not found (looking for {})", path.display()))?;
        let (deployments, ignore_git_branch) =
            parse(&content).with_context(|| format!("Invalid config in {}", path.display()))?;

        Ok(Self {
            path,
            deployments,
            ignore_git_branch,
        })
    }

    /// Directory holding the config; module paths are relative to it
    pub fn env_root(&self) -> PathBuf {
        self.path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
    }
}

/// Find `runway.yml` or `runway.yaml` in `dir`
pub fn find_config_file(dir: &Path) -> Result<PathBuf> {
    CONFIG_FILE_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
        .with_context(|| {
            format!(
                "Runway config file was not found. Looking for one of {} in {}",
                CONFIG_FILE_NAMES.join(", "),
                dir.display()
            )
        })
}

// ============================================================================
// File format
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawConfig {
    deployments: Option<Vec<RawDeployment>>,
    #[serde(default, alias = "ignore-git-branch")]
    ignore_git_branch: bool,
    #[serde(flatten)]
    unknown: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RawDeployment {
    name: Option<String>,
    modules: Option<Vec<RawModule>>,
    #[serde(default)]
    current_dir: bool,
    regions: Option<RawRegions>,
    #[serde(default, alias = "parallel-regions")]
    parallel_regions: Vec<String>,
    #[serde(alias = "account-id")]
    account_id: Option<Value>,
    #[serde(alias = "account-alias")]
    account_alias: Option<Value>,
    #[serde(alias = "assume-role")]
    assume_role: Option<Value>,
    #[serde(alias = "env-vars")]
    env_vars: Option<Value>,
    #[serde(default)]
    environments: Mapping,
    #[serde(default, alias = "module-options")]
    module_options: Mapping,
    #[serde(flatten)]
    unknown: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawRegions {
    List(Vec<RawRegion>),
    Parallel { parallel: Vec<String> },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawRegion {
    Name(String),
    Parallel { parallel: Vec<String> },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawModule {
    Path(String),
    Parallel {
        parallel: Vec<RawModule>,
        #[serde(flatten)]
        unknown: BTreeMap<String, Value>,
    },
    Definition(RawModuleDefinition),
}

#[derive(Debug, Deserialize)]
struct RawModuleDefinition {
    name: Option<String>,
    path: String,
    class_path: Option<String>,
    #[serde(default)]
    environments: Mapping,
    #[serde(alias = "env-vars")]
    env_vars: Option<Value>,
    #[serde(default)]
    options: Mapping,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(flatten)]
    unknown: BTreeMap<String, Value>,
}

// ============================================================================
// Validation
// ============================================================================

/// Parse config text into deployments and the `ignore_git_branch` flag
pub fn parse(content: &str) -> Result<(Vec<Deployment>, bool)> {
    let raw: RawConfig = serde_yaml::from_str(content).context("Invalid runway config format")?;

    warn_unknown("runway file", &raw.unknown, &["tests"]);

    let Some(deployments) = raw.deployments else {
        bail!("No deployments have been defined in your Runway config");
    };

    let deployments = deployments
        .into_iter()
        .enumerate()
        .map(|(i, raw)| deployment(i, raw))
        .collect::<Result<Vec<_>>>()?;

    Ok((deployments, raw.ignore_git_branch))
}

fn deployment(index: usize, raw: RawDeployment) -> Result<Deployment> {
    let name = raw
        .name
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| Deployment::default_name(index));

    warn_unknown(&format!("deployment {name}"), &raw.unknown, &[]);

    let modules = if raw.current_dir {
        log::warn!(
            "DEPRECATION WARNING: The \"current_dir\" option has been deprecated in favor of a \"./\" module definition. Please update your config."
        );
        vec![Module::bare("./")]
    } else {
        match raw.modules {
            Some(modules) if !modules.is_empty() => modules_from(modules)?,
            _ => bail!("No modules have been defined in your Runway deployment \"{name}\""),
        }
    };

    let (mut regions, mut parallel_regions) = (Vec::new(), Vec::new());
    match raw.regions {
        Some(RawRegions::Parallel { parallel }) => parallel_regions = parallel,
        Some(RawRegions::List(list)) => {
            for region in list {
                match region {
                    RawRegion::Name(name) => regions.push(name),
                    RawRegion::Parallel { parallel } => parallel_regions.extend(parallel),
                }
            }
        }
        None => {}
    }
    if !raw.parallel_regions.is_empty() {
        if !regions.is_empty() || !parallel_regions.is_empty() {
            bail!(
                "Found \"regions\" and \"parallel_regions\" in deployment \"{name}\"; only one can be defined"
            );
        }
        parallel_regions = raw.parallel_regions;
    }

    Ok(Deployment {
        account_id: raw.account_id.as_ref().map(env_scoped).transpose()?,
        account_alias: raw.account_alias.as_ref().map(env_scoped).transpose()?,
        assume_role: raw.assume_role.as_ref().map(assume_role).transpose()?.flatten(),
        env_vars: env_vars(raw.env_vars.as_ref())?,
        environments: raw.environments,
        module_options: raw.module_options,
        name,
        modules,
        regions,
        parallel_regions,
    })
}

fn modules_from(raw: Vec<RawModule>) -> Result<Vec<Module>> {
    raw.into_iter().map(module).collect()
}

fn module(raw: RawModule) -> Result<Module> {
    match raw {
        RawModule::Path(path) => Ok(Module::bare(path)),
        RawModule::Parallel { parallel, unknown } => {
            if !unknown.is_empty() {
                log::warn!(
                    "Invalid keys found in parallel module config have been ignored: {}",
                    unknown.keys().cloned().collect::<Vec<_>>().join(", ")
                );
            }
            Ok(Module::group(modules_from(parallel)?))
        }
        RawModule::Definition(def) => {
            let name = def.name.unwrap_or_else(|| def.path.clone());
            warn_unknown(&format!("module {name}"), &def.unknown, &[]);
            Ok(Module {
                env_vars: env_vars(def.env_vars.as_ref())?,
                name,
                path: def.path,
                class_path: def.class_path,
                environments: def.environments,
                options: def.options,
                tags: def.tags,
                child_modules: Vec::new(),
                bare: false,
            })
        }
    }
}

fn env_vars(value: Option<&Value>) -> Result<EnvVarsConfig> {
    match value {
        None | Some(Value::Null) => Ok(EnvVarsConfig::default()),
        Some(value) => Ok(EnvVarsConfig::from_value(value)?),
    }
}

/// `123456789012`, `"alias"` or `{env: value}`
fn env_scoped(value: &Value) -> Result<EnvScoped> {
    if let Some(value) = scalar_string(value) {
        return Ok(EnvScoped::All(value));
    }
    let Value::Mapping(map) = value else {
        bail!("expected a value or a mapping of environment names, got {value:?}");
    };
    map.iter()
        .map(|(env, value)| {
            let env = scalar_string(env).context("environment names must be strings")?;
            let value = scalar_string(value)
                .with_context(|| format!("value for environment {env} must be a string"))?;
            Ok((env, value))
        })
        .collect::<Result<BTreeMap<_, _>>>()
        .map(EnvScoped::PerEnvironment)
}

/// `arn`, `{arn, duration, session_name, post_deploy_env_revert}` or
/// `{env: arn | {arn, duration}}`
fn assume_role(value: &Value) -> Result<Option<AssumeRoleConfig>> {
    match value {
        Value::Null => Ok(None),
        Value::String(arn) if arn.is_empty() => Ok(None),
        Value::String(arn) => Ok(Some(AssumeRoleConfig::arn(arn.clone()))),
        Value::Mapping(map) if map.is_empty() => Ok(None),
        Value::Mapping(map) => {
            let mut config = AssumeRoleConfig::default();
            let mut global_duration = None;
            for (key, value) in map {
                let key = scalar_string(key).context("assume_role keys must be strings")?;
                match key.as_str() {
                    "arn" => {
                        let arn = scalar_string(value).context("assume_role.arn must be a string")?;
                        config.global = Some(RoleSpec::new(arn));
                    }
                    "duration" => global_duration = Some(duration(value)?),
                    "session_name" | "session-name" => config.session_name = scalar_string(value),
                    "post_deploy_env_revert" | "post-deploy-env-revert" => {
                        config.post_deploy_env_revert = value.as_bool().unwrap_or(false);
                    }
                    env => {
                        config
                            .environments
                            .insert(env.to_string(), role_spec(env, value)?);
                    }
                }
            }
            if let Some(global) = config.global.as_mut() {
                global.duration = global_duration;
            }
            Ok(Some(config))
        }
        other => bail!("invalid assume_role value: {other:?}"),
    }
}

fn role_spec(env: &str, value: &Value) -> Result<RoleSpec> {
    if let Some(arn) = value.as_str() {
        return Ok(RoleSpec::new(arn));
    }
    let map = value
        .as_mapping()
        .with_context(|| format!("assume_role.{env} must be an ARN or {{arn, duration}}"))?;
    let arn = map
        .get("arn")
        .and_then(Value::as_str)
        .with_context(|| format!("assume_role.{env}.arn is required"))?;
    Ok(RoleSpec {
        arn: arn.to_string(),
        duration: map.get("duration").map(duration).transpose()?,
    })
}

fn duration(value: &Value) -> Result<u64> {
    match value {
        Value::Number(n) => n.as_u64().context("duration must be a positive number of seconds"),
        Value::String(s) => s.parse().context("duration must be a number of seconds"),
        _ => bail!("duration must be a number of seconds"),
    }
}

fn warn_unknown(what: &str, unknown: &BTreeMap<String, Value>, ignored: &[&str]) {
    let keys: Vec<&str> = unknown
        .keys()
        .map(String::as_str)
        .filter(|k| !ignored.contains(k))
        .collect();
    if !keys.is_empty() {
        log::warn!(
            "Invalid keys found in {what} have been ignored: {}",
            keys.join(", ")
        );
    }
}
