mod cli;
mod commands;
mod config;
mod storage;

use crate::cli::{Command, ConfigCommand};
use clap::Parser;
use color_eyre::Result;
use fsvault_storage::keys::generate_secret;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Entry point wiring the CLI to the datastore.
fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = cli::Cli::parse();
    let config = config::load()?;
    init_tracing(cli.debug || config.debug);

    match cli.command {
        Command::Keygen => println!("{}", generate_secret()),
        Command::Config(ConfigCommand::Init) => init_config(&config)?,
        cmd => {
            let vault = storage::vault_from_config(&config)?;
            let mut stdout = std::io::stdout().lock();
            commands::handle(cmd, &vault, &mut stdout)?;
        }
    }

    Ok(())
}

fn init_tracing(debug: bool) {
    // Respect user-provided filters; the debug toggle only changes the default.
    let default_level = if debug { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn init_config(config: &config::Config) -> Result<()> {
    let path = config::write_default_if_missing(config)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}
