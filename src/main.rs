mod cli;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kirok_gen=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Generate {
            snapshot,
            out,
            force,
            use_log,
        } => {
            cli::generate(&snapshot, config, &out, force, use_log)?;
        }
        Commands::Check { snapshot } => {
            if !cli::check(&snapshot, config)? {
                std::process::exit(1);
            }
        }
        Commands::Manifest { snapshot, out } => {
            cli::manifest(&snapshot, config, out.as_deref())?;
        }
        Commands::Inspect { snapshot } => {
            cli::inspect(&snapshot, config)?;
        }
        Commands::Describe { manifest } => {
            cli::describe(&manifest)?;
        }
    }

    Ok(())
}
