use super::ModuleSettings;
use anyhow::Result;
use orchestrator::ModuleDriver;

/// AWS CDK app, driven through `npx cdk`
#[derive(Debug)]
pub struct Cdk {
    settings: ModuleSettings,
}

impl Cdk {
    pub fn new(settings: ModuleSettings) -> Self {
        Self { settings }
    }

    fn command_args(&self, subcommand: &str) -> Vec<String> {
        let mut args = vec![
            "--no-install".to_string(),
            "cdk".to_string(),
            subcommand.to_string(),
            "--context".to_string(),
            format!("environment={}", self.settings.env_name),
        ];
        for (key, value) in self.settings.environment_values() {
            args.push("--context".into());
            args.push(format!("{key}={value}"));
        }
        match subcommand {
            "deploy" => args.extend(["--require-approval".to_string(), "never".to_string()]),
            "destroy" => args.push("--force".to_string()),
            _ => {}
        }
        args
    }

    fn execute(&self, subcommand: &str) -> Result<()> {
        if self.settings.skipped() {
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

impl ModuleDriver for Cdk {
    fn name(&self) -> &'static str {
        "cdk"
    }

    fn plan(&self) -> Result<()> {
        self.execute("diff")
    }

    fn deploy(&self) -> Result<()> {
        self.execute("deploy")
    }

    fn destroy(&self) -> Result<()> {
        self.execute("destroy")
    }
}
