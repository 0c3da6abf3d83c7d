//! Offshoot - run jobs inline, as concurrent tasks, or in isolated processes.
//!
//! The binary is also the default isolated-process entry point: when launched
//! with a child ticket in its environment it runs that one job and exits
//! before any arguments are parsed.

mod cli;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;

use offshoot::config::{OffshootConfig, CONFIG_ENV};
use offshoot::{child, logging, signals, JobCatalog, Spawner};

use cli::{execute, Cli};

fn main() -> Result<()> {
    // Before any thread exists: reading the ticket clears it from the environment.
    let ticket = child::take_ticket();

    // Entered, not blocked on: jobs may drive futures with `Handle::block_on`.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the Tokio runtime")?;
    let _entered = runtime.enter();

    if let Some(ticket) = ticket {
        let config = OffshootConfig::load(None)?;
        logging::init_logging(&config.logging, 0, false)?;
        child::run_isolated(&build_spawner(&config, None), ticket);
    }

    let cli = Cli::parse();
    let config = OffshootConfig::load(cli.config.as_deref())?;
    logging::init_logging(&config.logging, cli.verbose, cli.quiet)?;
    let spawner = build_spawner(&config, cli.config.as_deref());

    let result = {
        let _shutdown = spawner.install_shutdown_hook();
        let hook = spawner.shutdown_hook().clone();
        signals::on_termination(move |_| {
            hook.fire();
            logging::flush();
        })
        .context("failed to install the termination handler")?;
        execute(cli, &spawner, &config, &runtime)
    };
    logging::flush();
    result
}

fn build_spawner(config: &OffshootConfig, config_path: Option<&Path>) -> Spawner {
    let mut builder = Spawner::builder()
        .catalog(JobCatalog::with_builtins())
        .task_priority(config.spawn.task_priority);
    // Children load the same file as their parent.
    if let Some(path) = config_path {
        builder = builder.child_env(CONFIG_ENV, path.to_string_lossy());
    }

    let spawner = builder.build();
    spawner.set_defaults(&config.spawn.overrides());
    spawner.catalog().install_fan_out(spawner.clone());
    spawner
}
