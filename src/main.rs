mod aws;
mod cli;
mod commands;
mod config;
mod driver;
mod environment;
mod git;
mod prompt;
mod runner;
mod ui;

use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::process::ExitCode;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Module progress is reported through info-level logs
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Warn
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    let result = match cli.command {
        Command::Plan(args) => commands::modules::run(&ctx, orchestrator::Command::Plan, args),
        Command::Deploy(args) => commands::modules::run(&ctx, orchestrator::Command::Deploy, args),
        Command::Destroy(args) => commands::modules::run(&ctx, orchestrator::Command::Destroy, args),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "runway", &mut io::stdout());
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if matches!(e.downcast_ref::<orchestrator::Error>(), Some(orchestrator::Error::Cancelled)) => {
            ui::warn("Aborted; nothing was changed");
            ExitCode::SUCCESS
        }
        Err(e) => {
            if ctx.verbose > 0 {
                ui::error(&format!("{e:?}"));
            } else {
                ui::error(&format!("{e:#}"));
            }
            ExitCode::FAILURE
        }
    }
}
