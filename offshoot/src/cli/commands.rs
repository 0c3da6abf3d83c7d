//! CLI command execution.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use tokio::runtime::Runtime;

use offshoot::config::OffshootConfig;
use offshoot::{Job, SpawnHandle, Spawner};

use super::args::{Cli, Commands, RunArgs};

/// Run the parsed command.
pub fn execute(cli: Cli, spawner: &Spawner, config: &OffshootConfig, runtime: &Runtime) -> Result<()> {
    match cli.command {
        Commands::Run(args) => run_job(&args, spawner, runtime),
        Commands::Jobs => {
            for name in spawner.catalog().names() {
                println!("{name}");
            }
            Ok(())
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

fn run_job(args: &RunArgs, spawner: &Spawner, runtime: &Runtime) -> Result<()> {
    if args.count == 0 {
        bail!("--count must be at least 1");
    }
    let payload = match &args.payload {
        Some(raw) => serde_json::from_str(raw).context("--payload is not valid JSON")?,
        None => Value::Null,
    };
    let job = Job::new(&args.job).payload(payload);
    let overrides = args.overrides();

    let mut handles: Vec<SpawnHandle> = Vec::with_capacity(args.count);
    for _ in 0..args.count {
        let handle = spawner
            .spawn(&overrides, job.clone())
            .with_context(|| format!("failed to start job '{}'", args.job))?;
        handles.push(handle);
    }

    if args.detach {
        for handle in &handles {
            println!("{}\t{}\tstarted", handle.id(), handle.label());
        }
        return Ok(());
    }

    let outcomes = runtime.block_on(spawner.wait(&handles));
    for (handle, outcome) in handles.iter().zip(&outcomes) {
        println!("{}\t{}\t{outcome}", handle.id(), handle.label());
    }

    let failed = outcomes.iter().filter(|o| !o.is_success()).count();
    if failed > 0 {
        bail!("{failed} of {} executions did not succeed", outcomes.len());
    }
    Ok(())
}
