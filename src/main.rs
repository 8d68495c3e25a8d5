//! taskpool - CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::Rng;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use taskpool::util::config::{load_config, load_user_config, RegistryConfig};
use taskpool::util::logger;
use taskpool::{TaskRegistry, NAME, VERSION};

/// In-memory registry of background tasks running on a bounded worker pool
#[derive(Parser, Debug)]
#[command(name = "taskpool")]
#[command(version = VERSION)]
#[command(about = NAME, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to the user config, if present)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Submit a batch of sleeping tasks and print the resulting task list
    Demo {
        /// Number of tasks to submit
        #[arg(short, long, default_value_t = 8)]
        tasks: usize,

        /// Make every N-th task fail (0 disables failures)
        #[arg(long, default_value_t = 0)]
        fail_every: usize,

        /// Upper bound for each task's simulated work, in milliseconds
        #[arg(long, default_value_t = 200)]
        max_millis: u64,

        /// Context attached to every task
        #[arg(long, default_value = "demo")]
        context: String,
    },

    /// Print the effective configuration as TOML
    Config,

    /// Print version information
    Version,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.verbose {
        logger::init_debug();
        eprintln!("taskpool version: {}", VERSION);
        eprintln!("Host: {}", std::env::consts::OS);
    } else {
        logger::init();
    }

    match args.command {
        Commands::Demo {
            tasks,
            fail_every,
            max_millis,
            context,
        } => {
            let config = resolve_config(args.config.as_ref())?;
            run_demo(config, tasks, fail_every, max_millis, context)?;
        }
        Commands::Config => {
            let config = resolve_config(args.config.as_ref())?;
            let rendered = config
                .to_toml_string()
                .context("Failed to render configuration")?;
            print!("{}", rendered);
        }
        Commands::Version => {
            println!("{} {}", NAME, VERSION);
        }
    }

    Ok(())
}

/// Load the configuration file (explicit or user-level) and apply environment
/// overrides.
fn resolve_config(path: Option<&PathBuf>) -> Result<RegistryConfig> {
    let mut config = match path {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => load_user_config().context("Failed to load user config")?,
    };
    config
        .apply_env_overrides()
        .context("Invalid environment override")?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn run_demo(
    config: RegistryConfig,
    tasks: usize,
    fail_every: usize,
    max_millis: u64,
    context: String,
) -> Result<()> {
    let registry: TaskRegistry<String> =
        TaskRegistry::with_config(config).context("Failed to create task registry")?;

    let mut rng = rand::rng();
    let mut handles = Vec::with_capacity(tasks);
    for n in 1..=tasks {
        let millis = rng.random_range(0..=max_millis);
        let fails = fail_every > 0 && n % fail_every == 0;
        let work = move || -> Result<()> {
            thread::sleep(Duration::from_millis(millis));
            if fails {
                anyhow::bail!("simulated failure after {}ms", millis);
            }
            Ok(())
        };
        let task = registry
            .submit(work, format!("sleep-{}", n), context.clone(), Some(n as u64))
            .context("Failed to submit task")?;
        handles.push(task);
    }

    let patience = Duration::from_millis(max_millis) + Duration::from_secs(30);
    for task in &handles {
        if !task.wait(patience) {
            anyhow::bail!("Task {} did not finish in time", task.id());
        }
    }

    let summaries = registry.summaries();
    let json =
        serde_json::to_string_pretty(&summaries).context("Failed to serialize task list")?;
    println!("{}", json);

    registry.shutdown();
    Ok(())
}
