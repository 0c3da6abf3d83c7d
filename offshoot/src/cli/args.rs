//! CLI argument definitions.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use offshoot::{OptionOverrides, Strategy};

/// Offshoot - run jobs inline, as concurrent tasks, or in isolated processes
#[derive(Parser, Debug)]
#[command(name = "offshoot")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (default: <config dir>/offshoot/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log more (repeat for trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a registered job
    Run(RunArgs),

    /// List registered jobs
    Jobs,

    /// Print the effective configuration
    Config,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Job name (see `offshoot jobs`)
    pub job: String,

    /// JSON payload passed to the job
    #[arg(long)]
    pub payload: Option<String>,

    /// Execution strategy (default from configuration, then the platform)
    #[arg(short, long, value_enum)]
    pub strategy: Option<Strategy>,

    /// Priority hint in niceness units; lower is more favoured
    #[arg(
        short,
        long,
        allow_negative_numbers = true,
        value_parser = clap::value_parser!(i32).range(-20..=19)
    )]
    pub priority: Option<i32>,

    /// Terminate the isolated process when offshoot exits
    #[arg(long)]
    pub kill_on_exit: bool,

    /// Process title or thread name for the execution
    #[arg(short, long)]
    pub name: Option<String>,

    /// Number of copies to start
    #[arg(short, long, default_value_t = 1)]
    pub count: usize,

    /// Print handles and return without waiting
    #[arg(long)]
    pub detach: bool,
}

impl RunArgs {
    /// Per-call overrides; flags left off fall through to the defaults.
    pub fn overrides(&self) -> OptionOverrides {
        OptionOverrides {
            strategy: self.strategy,
            priority_hint: self.priority,
            kill_on_exit: self.kill_on_exit.then_some(true),
            display_name: self.name.clone(),
        }
    }
}
