use super::ModuleSettings;
use anyhow::Result;
use orchestrator::ModuleDriver;
use serde_yaml::Value;

const TERRAFORM: &str = "terraform";

/// Terraform module: one workspace per environment
#[derive(Debug)]
pub struct Terraform {
    settings: ModuleSettings,
}

impl Terraform {
    pub fn new(settings: ModuleSettings) -> Self {
        Self { settings }
    }

    /// `<env>-<region>.tfvars`, else `<env>.tfvars`
    fn var_file(&self) -> Option<String> {
        let s = &self.settings;
        [
            format!("{}-{}.tfvars", s.env_name, s.region),
            format!("{}.tfvars", s.env_name),
        ]
        .into_iter()
        .find(|name| s.root.join(name).is_file())
    }

    fn command_args(&self, subcommand: &str) -> Vec<String> {
        let mut args = vec![subcommand.to_string()];
        if subcommand != "plan" && self.settings.env_vars.get("CI").is_some_and(|v| !v.is_empty()) {
            args.push("-auto-approve".into());
        }
        if let Some(Value::Sequence(extra)) = self.settings.option("args") {
            args.extend(extra.iter().filter_map(orchestrator::scalar_string));
        }
        if let Some(file) = self.var_file() {
            args.push(format!("-var-file={file}"));
        }
        for (key, value) in self.settings.environment_values() {
            args.push("-var".into());
            args.push(format!("{key}={value}"));
        }
        args
    }

    fn select_workspace(&self) -> Result<()> {
        let env = self.settings.env_name.as_str();
        let current = self.settings.capture(TERRAFORM, &["workspace", "show"])?;
        if current == env {
            return Ok(());
        }
        log::info!("Switching terraform workspace to {env}");
        if self.settings.run(TERRAFORM, &["workspace", "select", env]).is_err() {
            self.settings.run(TERRAFORM, &["workspace", "new", env])?;
        }
        Ok(())
    }

    fn execute(&self, subcommand: &str) -> Result<()> {
        if self.var_file().is_none() && self.settings.skipped() {
            return Ok(());
        }
        self.settings.run(TERRAFORM, &["init", "-input=false"])?;
        self.select_workspace()?;

        let args = self.command_args(subcommand);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.settings.run(TERRAFORM, &args)
    }
}

impl ModuleDriver for Terraform {
    fn name(&self) -> &'static str {
        "terraform"
    }

    fn plan(&self) -> Result<()> {
        self.execute("plan")
    }

    fn deploy(&self) -> Result<()> {
        self.execute("apply")
    }

    fn destroy(&self) -> Result<()> {
        self.execute("destroy")
    }
}
