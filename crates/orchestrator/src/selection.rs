//! Deployment and module selection
//!
//! Turns operator intent (tags, CI mode, menu answers) into the ordered
//! subset of deployments and modules to run. Interaction goes through the
//! [`Prompt`] trait so the rules can be exercised with scripted answers.

use crate::context::Command;
use crate::error::{Error, Result};
use crate::model::{Deployment, Module};
use serde_yaml::Value;

const DESTROY_NOTE: &str =
    "(Operating in destroy mode -- \"all\" will destroy all deployments in reverse order)";

/// Operator answer to a numbered menu
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    /// Zero-based position of the chosen entry
    Index(usize),
    All,
}

impl Choice {
    /// Parse raw menu input (`1`-based number or `all`)
    pub fn parse(input: &str, count: usize) -> Result<Self> {
        let input = input.trim();
        if input == "all" {
            return Ok(Self::All);
        }
        if input.is_empty() || !input.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidSelection(input.to_string()));
        }
        match input.parse::<usize>() {
            Ok(n) if (1..=count).contains(&n) => Ok(Self::Index(n - 1)),
            _ => Err(Error::InvalidSelection(input.to_string())),
        }
    }
}

/// A numbered menu shown to the operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Menu {
    pub title: String,
    pub entries: Vec<String>,
    /// Extra line shown below the entries
    pub note: Option<String>,
    /// What is being picked ("deployment", "module")
    pub item: &'static str,
}

impl Menu {
    pub fn prompt_text(&self) -> String {
        format!("Enter number of {} to run (or \"all\")", self.item)
    }
}

/// Interactive surface used by selection and destroy confirmation
pub trait Prompt {
    /// Ask the operator to pick one entry, or all of them
    fn choose_one(&mut self, menu: &Menu) -> Result<Choice>;

    /// Ask a yes/no question
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// Pick which deployments to run
///
/// CI mode or a tag query selects every deployment; module-level
/// filtering happens later in [`select_modules`].
pub fn select_deployments(
    deployments: Vec<Deployment>,
    tags: &[String],
    command: Command,
    ci: bool,
    prompt: &mut dyn Prompt,
) -> Result<Vec<Deployment>> {
    if ci || !tags.is_empty() || deployments.len() <= 1 {
        return Ok(deployments);
    }

    let menu = Menu {
        title: "Configured deployments:".to_string(),
        entries: deployments.iter().map(deployment_menu_entry).collect(),
        note: command.is_destructive().then(|| DESTROY_NOTE.to_string()),
        item: "deployment",
    };

    match prompt.choose_one(&menu)? {
        Choice::All => Ok(deployments),
        Choice::Index(index) => {
            let selected = deployments
                .into_iter()
                .nth(index)
                .ok_or_else(|| Error::InvalidSelection((index + 1).to_string()))?;
            log::debug!("Selected deployment is {}...", selected.name);
            Ok(vec![selected])
        }
    }
}

/// Narrow a deployment's modules to the ones the operator wants
pub fn select_modules(
    mut deployment: Deployment,
    tags: &[String],
    command: Command,
    ci: bool,
    env_name: &str,
    prompt: &mut dyn Prompt,
) -> Result<Deployment> {
    if ci && tags.is_empty() {
        return Ok(deployment);
    }

    if deployment.modules.is_empty() {
        log::error!("No modules configured in deployment \"{}\"", deployment.name);
        return Err(Error::NoModules(deployment.name));
    }

    if !tags.is_empty() {
        deployment.modules = filter_by_tags(&deployment.name, deployment.modules, tags);
        return Ok(deployment);
    }

    if deployment.modules.len() == 1 {
        if command.is_destructive() {
            log::info!(
                "(only one deployment detected; all modules automatically selected for termination)"
            );
            if !ci && !prompt.confirm("Proceed?")? {
                return Err(Error::Cancelled);
            }
        }
        return Ok(deployment);
    }

    let menu = Menu {
        title: format!("Configured modules in deployment '{}':", deployment.name),
        entries: deployment
            .modules
            .iter()
            .map(|module| module_menu_entry(module, env_name))
            .collect(),
        note: command.is_destructive().then(|| DESTROY_NOTE.to_string()),
        item: "module",
    };

    let index = match prompt.choose_one(&menu)? {
        Choice::All => return Ok(deployment),
        Choice::Index(index) => index,
    };
    let selected = deployment
        .modules
        .into_iter()
        .nth(index)
        .ok_or_else(|| Error::InvalidSelection((index + 1).to_string()))?;

    if selected.is_group() {
        deployment.modules = selected.child_modules;
        deployment.name = format!("{}_parallel_modules_{}", deployment.name, index + 1);
        return select_modules(deployment, tags, command, ci, env_name, prompt);
    }

    deployment.modules = vec![selected];
    Ok(deployment)
}

/// Keep modules whose tags cover the query
///
/// Groups keep only matching children and are dropped when none match.
/// Bare-string modules cannot carry tags and are skipped with a warning.
fn filter_by_tags(deployment_name: &str, modules: Vec<Module>, tags: &[String]) -> Vec<Module> {
    let mut kept = Vec::new();
    for mut module in modules {
        if module.bare {
            log::warn!(
                "Module \"{deployment_name}.{}\" is defined as a string which cannot be used with \
                 the \"--tag\" option so it has been skipped. Please update this module definition \
                 to a dict to use \"--tag\".",
                module.path
            );
            continue;
        }
        if module.is_group() {
            module
                .child_modules
                .retain(|child| !child.bare && child.matches_tags(tags));
            if module.is_group() {
                kept.push(module);
            }
        } else if module.matches_tags(tags) {
            kept.push(module);
        }
    }
    kept
}

/// `path (environment config)` or just `path`
pub fn module_menu_entry(module: &Module, env_name: &str) -> String {
    match module.environments.get(env_name) {
        Some(config) if !is_empty_value(config) => {
            format!("{} ({})", module.path, display_value(config))
        }
        _ => module.path.clone(),
    }
}

/// `name - path, path (region, region)`
pub fn deployment_menu_entry(deployment: &Deployment) -> String {
    let paths = deployment
        .modules
        .iter()
        .map(|module| module.path.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "{} - {} ({})",
        deployment.name,
        paths,
        deployment.regions.join(", ")
    )
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => true,
        Value::String(s) => s.is_empty(),
        Value::Sequence(seq) => seq.is_empty(),
        Value::Mapping(map) => map.is_empty(),
        _ => false,
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_else(|_| format!("{other:?}")),
    }
}
