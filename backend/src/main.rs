// dirstore entrypoint
//!
//! Loads the configuration, installs logging and hands over to the
//! selected subcommand.

use anyhow::Result;
use clap::Parser;
use dirstore_configs::BackendConfig;
use dirstore_server::cli::{Cli, Command};
use dirstore_server::commands::{import_ldif, index_status, rebuild_index};
use dirstore_server::logging;
use log::info;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match BackendConfig::from_file(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("FATAL: Failed to load {}: {}", cli.config.display(), e);
            std::process::exit(1);
        }
    };
    if let Some(level) = &cli.log_level {
        config.logging.level = level.to_lowercase();
        config.validate()?;
    }

    // Logging before any other side effects
    let log_path = logging::log_file_path(&config.logging.logs_path);
    logging::init_logging(
        &config.logging.level,
        &log_path,
        config.logging.log_to_console,
        Some(&config.logging.targets),
        &config.logging.format,
    )?;

    info!("dirstore v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Config: {}  Engine: {:?}  Data: {}",
        cli.config.display(),
        config.storage.engine,
        config.storage.data_path
    );

    match &cli.command {
        Command::ImportLdif(args) => {
            let result = import_ldif::execute(&config, args)?;
            println!("{}", import_ldif::summary(&result));
        }
        Command::IndexStatus(args) => {
            let report = index_status::execute(&config, args)?;
            print!("{}", report);
            if args.json {
                println!();
            }
        }
        Command::RebuildIndex(args) => {
            let result = rebuild_index::execute(&config, args)?;
            println!("{}", rebuild_index::summary(&result));
        }
    }

    Ok(())
}
