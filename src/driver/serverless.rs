use super::ModuleSettings;
use anyhow::Result;
use orchestrator::ModuleDriver;

/// Serverless Framework module; deploys a stage named after the environment
///
/// The framework has no dry-run, so `plan` is left unsupported.
#[derive(Debug)]
pub struct Serverless {
    settings: ModuleSettings,
}

impl Serverless {
    pub fn new(settings: ModuleSettings) -> Self {
        Self { settings }
    }

    /// Per-stage config file, if present
    fn config_file(&self) -> Option<String> {
        let s = &self.settings;
        ["yml", "json"]
            .into_iter()
            .flat_map(|ext| {
                [
                    format!("{}-{}.{ext}", s.env_name, s.region),
                    format!("config-{}-{}.{ext}", s.env_name, s.region),
                    format!("{}.{ext}", s.env_name),
                    format!("config-{}.{ext}", s.env_name),
                ]
            })
            .find(|name| s.root.join(name).is_file())
    }

    fn command_args(&self, subcommand: &str) -> Vec<String> {
        let s = &self.settings;
        vec![
            "--no-install".into(),
            "sls".into(),
            subcommand.into(),
            "--stage".into(),
            s.env_name.clone(),
            "--region".into(),
            s.region.clone(),
        ]
    }

    fn execute(&self, subcommand: &str) -> Result<()> {
        if self.config_file().is_none() && self.settings.skipped() {
            return Ok(());
        }
        if !self.settings.root.join("node_modules").is_dir() {
            log::info!("Installing dependencies for {}", self.settings.name);
            self.settings.run("npm", &["install"])?;
        }

        let args = self.command_args(subcommand);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.settings.run("npx", &args)
    }
}

impl ModuleDriver for Serverless {
    fn name(&self) -> &'static str {
        "serverless"
    }

    fn deploy(&self) -> Result<()> {
        self.execute("deploy")
    }

    fn destroy(&self) -> Result<()> {
        self.execute("remove")
    }
}
