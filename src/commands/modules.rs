//! `plan`, `deploy` and `destroy`
//!
//! Loads the config, builds the run context and hands everything to the
//! orchestrator engine with the real collaborators plugged in.

use anyhow::{Context as AnyhowContext, Result};
use orchestrator::{Command, Context as RunContext, Engine, EnvVars, ExecuteOptions};
use std::path::Path;

use crate::Context;
use crate::aws::AwsCli;
use crate::cli::RunArgs;
use crate::config::RunwayConfig;
use crate::driver::Registry;
use crate::environment::{self, DEPLOY_ENVIRONMENT};
use crate::git::GitSource;
use crate::prompt::TerminalPrompt;
use crate::ui;

/// Variable exported to every module with the config file path
pub const RUNWAYCONFIG: &str = "RUNWAYCONFIG";

pub fn run(ctx: &Context, command: Command, args: RunArgs) -> Result<()> {
    let cwd = std::env::current_dir().context("Could not determine current directory")?;
    let config = RunwayConfig::load(args.config.as_deref(), &cwd)?;
    let env_root = config.env_root();

    let mut run_ctx = run_context(command, &config, &env_root, std::env::vars().collect());

    if !ctx.quiet {
        ui::header(&format!("runway {command}"));
        ui::kv("Config", &config.path.display().to_string());
        ui::kv("Environment", &run_ctx.env_name);
        if !args.tags.is_empty() {
            ui::kv("Tags", &args.tags.join(", "));
        }
        if run_ctx.is_ci() {
            ui::info("CI mode: no prompts");
        }
    }

    let mut options = ExecuteOptions {
        tags: args.tags,
        ..ExecuteOptions::default()
    };
    if let Some(n) = args.max_concurrency {
        options.max_concurrency = usize::from(n);
    }

    let aws = AwsCli;
    let drivers = Registry;
    let sources = GitSource::new(&env_root);
    let engine = Engine::new(&aws, &drivers, &sources, options)?;
    engine.execute(config.deployments, &mut run_ctx, &mut TerminalPrompt)?;

    if !ctx.quiet {
        ui::success(&format!("{command} complete"));
    }
    Ok(())
}

/// Context for one run: process environment plus `RUNWAYCONFIG`
fn run_context(command: Command, config: &RunwayConfig, env_root: &Path, mut env_vars: EnvVars) -> RunContext {
    let env_name = environment::env_name(
        env_root,
        env_vars.get(DEPLOY_ENVIRONMENT).map(String::as_str),
        config.ignore_git_branch,
    );
    env_vars.insert(RUNWAYCONFIG.to_string(), config.path.display().to_string());
    RunContext::new(env_name, env_root, command, env_vars)
}
