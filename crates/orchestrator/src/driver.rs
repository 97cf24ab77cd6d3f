//! Module driver contract and registry
//!
//! A driver wraps one infrastructure tool. The set of kinds is closed:
//! [`DriverKind`] names every supported tool and the binary supplies a
//! [`DriverFactory`] that builds the concrete driver for a kind.

use crate::context::{Command, Context};
use crate::error::{Error, Result};
use serde_yaml::Mapping;
use std::fmt;
use std::path::Path;
use walkdir::WalkDir;

/// Marker returned by lifecycle methods a driver does not implement
#[derive(Debug, thiserror::Error)]
#[error("command not supported by this driver")]
pub struct Unsupported;

/// Lifecycle methods of one module, bound to its directory and context
pub trait ModuleDriver {
    /// Driver name used in messages
    fn name(&self) -> &'static str;

    fn plan(&self) -> anyhow::Result<()> {
        Err(Unsupported.into())
    }

    fn deploy(&self) -> anyhow::Result<()> {
        Err(Unsupported.into())
    }

    fn destroy(&self) -> anyhow::Result<()> {
        Err(Unsupported.into())
    }
}

/// Supported infrastructure tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverKind {
    Serverless,
    Terraform,
    Cdk,
    Kubernetes,
    CloudFormation,
}

impl DriverKind {
    pub const ALL: [Self; 5] = [
        Self::Serverless,
        Self::Terraform,
        Self::Cdk,
        Self::Kubernetes,
        Self::CloudFormation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Serverless => "serverless",
            Self::Terraform => "terraform",
            Self::Cdk => "cdk",
            Self::Kubernetes => "k8s",
            Self::CloudFormation => "cloudformation",
        }
    }

    /// Resolve an explicit `class_path` override
    ///
    /// Only the last dotted segment matters, so both `terraform` and
    /// `runway.module.terraform.Terraform` name the Terraform driver.
    pub fn from_class_path(class_path: &str) -> Result<Self> {
        let name = class_path
            .rsplit('.')
            .next()
            .unwrap_or(class_path)
            .to_ascii_lowercase();
        match name.as_str() {
            "serverless" | "sls" => Ok(Self::Serverless),
            "terraform" | "tf" => Ok(Self::Terraform),
            "clouddevelopmentkit" | "cdk" => Ok(Self::Cdk),
            "k8s" | "kubernetes" => Ok(Self::Kubernetes),
            "cloudformation" | "cfn" => Ok(Self::CloudFormation),
            _ => Err(Error::UnknownDriverClass(class_path.to_string())),
        }
    }

    /// Kind indicated by the directory name suffix
    pub fn from_suffix(module_root: &Path) -> Option<Self> {
        let name = module_root.file_name()?.to_str()?;
        [
            (".sls", Self::Serverless),
            (".tf", Self::Terraform),
            (".cdk", Self::Cdk),
            (".k8s", Self::Kubernetes),
            (".cfn", Self::CloudFormation),
        ]
        .into_iter()
        .find_map(|(suffix, kind)| name.ends_with(suffix).then_some(kind))
    }

    /// Kind indicated by marker files inside the directory
    pub fn autodetect(module_root: &Path) -> Option<Self> {
        let has = |file: &str| module_root.join(file).is_file();

        if (has("serverless.yml") || has("serverless.js")) && has("package.json") {
            Some(Self::Serverless)
        } else if has_extension(module_root, &["tf"]) {
            Some(Self::Terraform)
        } else if has("cdk.json") && has("package.json") {
            Some(Self::Cdk)
        } else if module_root.join("overlays").is_dir() && has_kustomization(module_root) {
            Some(Self::Kubernetes)
        } else if has_extension(module_root, &["env", "yaml", "yml"]) {
            Some(Self::CloudFormation)
        } else {
            None
        }
    }

    /// Explicit override, then suffix, then marker files
    pub fn determine(module_root: &Path, class_path: Option<&str>) -> Result<Self> {
        if let Some(class_path) = class_path {
            return Self::from_class_path(class_path);
        }
        Self::from_suffix(module_root)
            .or_else(|| Self::autodetect(module_root))
            .ok_or_else(|| {
                log::error!("No module class found for {}", module_root.display());
                Error::NoDriver(module_root.to_path_buf())
            })
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn has_extension(dir: &Path, extensions: &[&str]) -> bool {
    std::fs::read_dir(dir).is_ok_and(|entries| {
        entries.flatten().any(|entry| {
            entry.path().is_file()
                && entry
                    .path()
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| extensions.contains(&ext))
        })
    })
}

fn has_kustomization(dir: &Path) -> bool {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .any(|entry| entry.file_type().is_file() && entry.file_name() == "kustomization.yaml")
}

/// Builds concrete drivers; shared across worker threads
pub trait DriverFactory: Send + Sync {
    fn create(
        &self,
        kind: DriverKind,
        ctx: &Context,
        module_root: &Path,
        options: &Mapping,
    ) -> anyhow::Result<Box<dyn ModuleDriver>>;
}

/// Run `command` on `driver`, attaching module and region to failures
pub fn invoke(driver: &dyn ModuleDriver, command: Command, module: &str, region: &str) -> Result<()> {
    let outcome = match command {
        Command::Plan => driver.plan(),
        Command::Deploy => driver.deploy(),
        Command::Destroy => driver.destroy(),
    };

    outcome.map_err(|source| {
        if source.is::<Unsupported>() {
            log::error!("'{}' is missing method '{command}'", driver.name());
            Error::UnsupportedCommand {
                driver: driver.name(),
                command: command.to_string(),
                module: module.to_string(),
            }
        } else {
            Error::Driver {
                module: module.to_string(),
                command: command.to_string(),
                region: region.to_string(),
                source,
            }
        }
    })
}
