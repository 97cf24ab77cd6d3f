use super::ModuleSettings;
use anyhow::Result;
use orchestrator::{MODULE_OPTIONS_FILE, ModuleDriver};
use std::fs;

const STACKER: &str = "stacker";

/// CloudFormation stacks managed by Stacker config files
///
/// Every YAML file in the module directory is a Stacker config, combined
/// with the environment file `<env>-<region>.env` or `<env>.env`.
#[derive(Debug)]
pub struct CloudFormation {
    settings: ModuleSettings,
}

impl CloudFormation {
    pub fn new(settings: ModuleSettings) -> Self {
        Self { settings }
    }

    fn env_file(&self) -> Option<String> {
        let s = &self.settings;
        [
            format!("{}-{}.env", s.env_name, s.region),
            format!("{}.env", s.env_name),
        ]
        .into_iter()
        .find(|name| s.root.join(name).is_file())
    }

    /// Stacker configs in file name order
    fn config_files(&self) -> Result<Vec<String>> {
        let mut files: Vec<String> = fs::read_dir(&self.settings.root)?
            .flatten()
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| entry.file_name().to_str().map(ToString::to_string))
            .filter(|name| {
                !name.starts_with('.')
                    && name != MODULE_OPTIONS_FILE
                    && (name.ends_with(".yaml") || name.ends_with(".yml"))
            })
            .collect();
        files.sort();
        Ok(files)
    }

    fn execute(&self, action: &str, reverse: bool) -> Result<()> {
        let Some(env_file) = self.env_file() else {
            log::info!(
                "Skipping {}; no environment file for \"{}\" in {}",
                self.settings.name,
                self.settings.env_name,
                self.settings.region
            );
            return Ok(());
        };

        let mut configs = self.config_files()?;
        if reverse {
            configs.reverse();
        }
        for config in &configs {
            log::info!("{action} {config} ({env_file})");
            let mut args = vec![action, "--region", self.settings.region.as_str()];
            if action == "destroy" {
                args.push("--force");
            }
            args.extend([env_file.as_str(), config.as_str()]);
            self.settings.run(STACKER, &args)?;
        }
        Ok(())
    }
}

impl ModuleDriver for CloudFormation {
    fn name(&self) -> &'static str {
        "cloudformation"
    }

    fn plan(&self) -> Result<()> {
        self.execute("diff", false)
    }

    fn deploy(&self) -> Result<()> {
        self.execute("build", false)
    }

    fn destroy(&self) -> Result<()> {
        self.execute("destroy", true)
    }
}
