//! streamout CLI
//!
//! Command-line front end for the chunked audio output engine.

use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use log::info;

use streamout::cli::{commands, Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level)).init();

    info!("streamout v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Some(cmd) => handle_command(cmd, cli.config.as_deref()),
        None => {
            println!("streamout v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

fn handle_command(cmd: Commands, config_path: Option<&std::path::Path>) -> Result<()> {
    match cmd {
        Commands::Probe { primary_capacity } => {
            let config = commands::load_config(config_path)?;
            commands::probe(&config, primary_capacity)
        }
        Commands::Play {
            input,
            realtime,
            primary_capacity,
        } => {
            let config = commands::load_config(config_path)?;
            commands::play(&config, &input, realtime, primary_capacity)
        }
        Commands::InitConfig { path } => commands::init_config(&path),
    }
}
