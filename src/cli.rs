use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "runway")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Plan, deploy and destroy infrastructure modules across regions", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show what each selected module would change
    Plan(RunArgs),

    /// Deploy the selected modules
    Deploy(RunArgs),

    /// Destroy the selected modules (in reverse order)
    Destroy(RunArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Only run modules carrying this tag (repeatable; all must match)
    #[arg(long = "tag", value_name = "TAG")]
    pub tags: Vec<String>,

    /// Config file (defaults to runway.yml or runway.yaml in the current directory)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Worker threads for parallel regions and modules (1 disables parallelism)
    #[arg(long, env = "RUNWAY_MAX_CONCURRENCY", value_name = "N",
          value_parser = clap::value_parser!(u16).range(1..))]
    pub max_concurrency: Option<u16>,
}
