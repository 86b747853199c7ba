// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! HPT CLI
//!
//! Command-line interface for the HPT shared-memory tunnel.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

/// HPT - point-to-point tunnel over a shared-memory ring transport
#[derive(Parser)]
#[command(name = "hpt")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (defaults apply when omitted)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Push packets through an echo loopback and report throughput
    Bench {
        /// Ring capacity (slots per direction)
        #[arg(long, default_value_t = 1024)]
        capacity: usize,

        /// Number of packets to send
        #[arg(short, long, default_value_t = 100_000)]
        packets: usize,

        /// Packet size in bytes
        #[arg(short, long, default_value_t = 1024)]
        size: usize,
    },

    /// Print the region layout for a capacity
    Layout {
        /// Ring capacity (slots per direction)
        #[arg(long)]
        capacity: usize,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        file: String,
    },

    /// Bring up the configured endpoints and print their statistics
    Stats,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = cli.config.as_deref();

    match cli.command {
        Commands::Bench {
            capacity,
            packets,
            size,
        } => commands::bench::execute(config, capacity, packets, size).await,
        Commands::Layout { capacity, json } => commands::layout::execute(capacity, json),
        Commands::Validate { file } => commands::validate::execute(&file),
        Commands::Stats => commands::stats::execute(config),
    }
}
