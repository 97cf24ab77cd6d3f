//! Effective module options
//!
//! A leaf module's options are layered from three sources, later layers
//! winning: the deployment's defaults, the module's `runway.module.yml`,
//! and the fields written inline on the module.

use crate::error::{Error, Result};
use crate::model::{Deployment, Module};
use serde_yaml::{Mapping, Value};
use std::path::Path;

/// Option file read from a module directory
pub const MODULE_OPTIONS_FILE: &str = "runway.module.yml";

/// Deep-merge `overlay` into `base`
///
/// Mappings merge key by key, sequences concatenate, and any other
/// overlay value replaces the base value.
pub fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base), Value::Mapping(overlay)) => merge_mappings(base, overlay),
        (Value::Sequence(base), Value::Sequence(overlay)) => base.extend(overlay),
        (base, overlay) => *base = overlay,
    }
}

/// Deep-merge one mapping into another, see [`merge_values`]
pub fn merge_mappings(base: &mut Mapping, overlay: Mapping) {
    for (key, value) in overlay {
        match base.get_mut(&key) {
            Some(existing) => merge_values(existing, value),
            None => {
                base.insert(key, value);
            }
        }
    }
}

/// Read the module option file, if the module directory has one
pub fn load_module_options_file(module_root: &Path) -> Result<Option<Mapping>> {
    let path = module_root.join(MODULE_OPTIONS_FILE);
    if !path.is_file() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(&path)?;
    let value: Value =
        serde_yaml::from_str(&content).map_err(|source| Error::ModuleOptions {
            path: path.clone(),
            source,
        })?;

    match value {
        Value::Mapping(mapping) => Ok(Some(mapping)),
        Value::Null => Ok(None),
        _ => Err(Error::InvalidConfig(format!(
            "{} must contain a mapping",
            path.display()
        ))),
    }
}

/// Merge deployment defaults, the option file and inline module fields
pub fn effective_options(
    deployment: &Deployment,
    module: &Module,
    module_root: &Path,
) -> Result<Mapping> {
    let mut merged = Mapping::new();
    merged.insert(
        "environments".into(),
        Value::Mapping(deployment.environments.clone()),
    );
    merged.insert(
        "options".into(),
        Value::Mapping(deployment.module_options.clone()),
    );

    if let Some(file) = load_module_options_file(module_root)? {
        log::debug!("Merging {MODULE_OPTIONS_FILE} for module {}", module.name);
        merge_mappings(&mut merged, file);
    }

    merge_mappings(&mut merged, inline_fields(module));
    Ok(merged)
}

/// Class path override carried by a merged option mapping
pub fn class_path(options: &Mapping) -> Option<&str> {
    options.get("class_path").and_then(Value::as_str)
}

/// Environment config for `env_name` out of merged options
pub fn environment_config<'a>(options: &'a Mapping, env_name: &str) -> Option<&'a Value> {
    options
        .get("environments")
        .and_then(Value::as_mapping)
        .and_then(|envs| envs.get(env_name))
}

fn inline_fields(module: &Module) -> Mapping {
    let mut fields = Mapping::new();
    fields.insert("name".into(), module.name.clone().into());
    fields.insert("path".into(), module.path.clone().into());
    if let Some(class_path) = &module.class_path {
        fields.insert("class_path".into(), class_path.clone().into());
    }
    if !module.environments.is_empty() {
        fields.insert(
            "environments".into(),
            Value::Mapping(module.environments.clone()),
        );
    }
    if !module.options.is_empty() {
        fields.insert("options".into(), Value::Mapping(module.options.clone()));
    }
    if !module.tags.is_empty() {
        fields.insert(
            "tags".into(),
            Value::Sequence(module.tags.iter().cloned().map(Value::from).collect()),
        );
    }
    fields
}
