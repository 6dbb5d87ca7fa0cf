mod config;
mod database;
mod entities;
mod http_server;
mod logging;
mod matching;
mod ports;
mod providers;
mod services;
#[cfg(test)]
mod test_utils;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::{Result, eyre::Context};

use crate::{
    config::Config,
    database::Database,
    http_server::app::{self, HttpServerConfig},
    logging::{init_tracing, setup_logging},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The config file to use
    #[arg(short, long, env = "TUNEBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Console log level (default: info)
    #[arg(long, default_value = "info", global = true, env = "LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// File log level (default: debug)
    #[arg(long, default_value = "debug", global = true)]
    log_file_level: log::LevelFilter,

    /// Path to log file
    #[arg(long, env = "TUNEBRIDGE_LOG_FILE", global = true)]
    log_file: Option<PathBuf>,

    /// Use the tracing subscriber with this filter instead of plain logging
    #[arg(long, global = true, env = "TUNEBRIDGE_TRACING")]
    tracing_filter: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        /// The port to run the server on
        #[arg(short, long, default_value = "3000", env = "TUNEBRIDGE_HTTP_PORT")]
        port: u16,
    },
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Create a default config file, if it doesn't exist
    CreateDefault,
    /// Print the path to the config file
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    match &args.tracing_filter {
        Some(filter) => init_tracing(filter)?,
        None => setup_logging(args.log_level, args.log_file.clone(), args.log_file_level)?,
    }

    log::debug!("Tunebridge starting");

    match args.command {
        Commands::Config(config_commands) => match config_commands {
            ConfigCommands::CreateDefault => {
                log::debug!("Creating default config");
                Config::create_default()?;
                log::info!("Default config created successfully");
            }
            ConfigCommands::Path => match Config::config_path() {
                Some(path) => println!("{}", path.display()),
                None => println!("No default config path found"),
            },
        },
        Commands::Serve { port } => {
            log::debug!("Loading configuration");
            let config = {
                if let Some(config) = args.config {
                    Config::from_file(&config)
                } else {
                    Config::load()
                }
            }
            .with_context(|| "Failed to load tunebridge config")?;

            log::debug!("Opening database at: {}", config.database_path().display());
            let database = Database::open(&config.database_path()).await?;

            log::info!("Starting HTTP server on port: {}", port);
            app::start(HttpServerConfig {
                port,
                database,
                config,
            })
            .await?;
        }
    }

    Ok(())
}
