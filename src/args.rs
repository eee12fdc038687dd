//! CLI argument parsing, mirroring the teacher's `clap` derive style
//! (`cli/args.rs`).

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "sdplc", author, version, about = "Simulated PLC over Modbus and OPC UA", long_about = None)]
pub struct Args {
    /// Path to the YAML configuration file (spec.md §6).
    #[arg(long, short = 'c')]
    pub config: String,

    /// Bind address for the optional HTTP control surface, e.g. 127.0.0.1:9000.
    #[arg(long)]
    pub http: Option<String>,

    /// Override SDPLC_LOG_FILE: also write logs to this file.
    #[arg(long)]
    pub log_file: Option<String>,
}
