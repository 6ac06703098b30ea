//! CLI argument parsing

use clap::{Parser, Subcommand, ValueEnum};
use radsdk_device::ProtocolFamily;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "radsdk")]
#[command(author, version, about = "Radiation spectrometer driver toolkit", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Context configuration file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Wire protocol of the stream being processed
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Protocol {
    /// Length-prefixed D3 records (gamma + neutron)
    D3,
    /// Fixed-size interval count reports (single detector)
    Interval,
}

impl Protocol {
    pub fn family(self) -> ProtocolFamily {
        match self {
            Protocol::D3 => ProtocolFamily::D3,
            Protocol::Interval => ProtocolFamily::Interval,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Feed a captured byte stream through a processor and summarise it
    Replay {
        /// Protocol the capture was recorded in
        #[arg(short, long, value_enum)]
        protocol: Protocol,

        /// Raw capture file
        #[arg(short, long)]
        input: PathBuf,

        /// Bytes handed to the processor per read
        #[arg(long, default_value_t = 64)]
        chunk: usize,

        /// Number of busiest channels to print per detector
        #[arg(long, default_value_t = 10)]
        top: usize,
    },

    /// Acquire from a spectrometer on a serial port
    #[cfg(feature = "serial")]
    Acquire {
        /// Serial port path (e.g. /dev/ttyACM0)
        #[arg(short, long)]
        port: String,

        /// Baud rate (default 115200)
        #[arg(short, long)]
        baud: Option<u32>,

        /// Protocol the device speaks
        #[arg(long, value_enum)]
        protocol: Protocol,

        /// Real time to acquire for, in milliseconds
        #[arg(short, long, default_value_t = 10_000)]
        duration_ms: u32,

        /// Number of busiest channels to print per detector
        #[arg(long, default_value_t = 10)]
        top: usize,
    },

    /// List recognised spectrometer models
    Models,

    /// Print the effective configuration
    Config,
}
