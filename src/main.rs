//! radsdk - Driver toolkit for USB radiation spectrometers
//!
//! Replays captured device streams through the protocol processors,
//! acquires from serial-attached devices and lists the models the SDK
//! recognises.
//!
//! # Architecture
//!
//! Bytes from a transport (serial port, or an in-memory loopback for
//! replays) go to the processor for the device's protocol family:
//! - **D3** - length-prefixed records carrying gamma and neutron data for
//!   two detectors on one link
//! - **Interval** - fixed-size reports of single events from one detector
//!
//! Processors turn the stream into per-detector count events, which the
//! driver context accumulates into spectra.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use radsdk_device::ContextConfig;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let config = match cli.config.as_deref() {
        Some(path) => match ContextConfig::from_file(path) {
            Ok(config) => {
                log::info!("Loaded configuration from {}", path.display());
                config
            }
            Err(e) => {
                eprintln!("Failed to load configuration: {}", e);
                std::process::exit(1);
            }
        },
        None => ContextConfig::default(),
    };

    let result = match cli.command {
        Commands::Replay {
            protocol,
            input,
            chunk,
            top,
        } => commands::replay::run(&config, protocol, &input, chunk, top),
        #[cfg(feature = "serial")]
        Commands::Acquire {
            port,
            baud,
            protocol,
            duration_ms,
            top,
        } => commands::acquire::run(&config, protocol, &port, baud, duration_ms, top),
        Commands::Models => {
            commands::list_models();
            Ok(())
        }
        Commands::Config => commands::config::show(&config),
    };

    result
}
