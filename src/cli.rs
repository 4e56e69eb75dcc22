use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// MLM network and commission engine: place members, aggregate period
/// volume, calculate commissions, ranks and bonuses, and post earnings
/// to wallets.
#[derive(Parser)]
#[command(name = "mlm-engine", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Output the JSON schema for platform configs
    Schema,

    /// Output an example platform config JSON to stdout
    Example {
        /// Plan flavor: binary (default) or unilevel
        #[arg(long, default_value = "binary")]
        network: String,
    },

    /// Validate a platform config JSON file
    Validate {
        /// Path to the platform config JSON file
        file: PathBuf,
    },

    /// Generate a seeded demo platform: config, network, and order history
    Simulate {
        /// Output directory for config.json, network.json and orders.csv
        #[arg(long, short = 'o', default_value = "demo")]
        out_dir: PathBuf,

        /// Number of members to place
        #[arg(long, default_value = "200")]
        members: u32,

        /// Number of monthly periods of order history
        #[arg(long, default_value = "3")]
        periods: u32,

        /// Random seed; the same seed reproduces the same data
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Network type: binary, trinity, or unilevel
        #[arg(long, default_value = "binary")]
        network: String,
    },

    /// Run one commission period end to end
    RunPeriod {
        /// Path to the platform config JSON file
        config: PathBuf,

        /// Path to the network JSON file (updated in place after the run)
        #[arg(long, default_value = "network.json")]
        network: PathBuf,

        /// SQLite database for commissions, wallets, and run locks
        #[arg(long, default_value = "mlm.db")]
        db: PathBuf,

        /// Orders file, .csv or .json
        #[arg(long)]
        orders: PathBuf,

        /// Period key, e.g. 2025-08, 2025-W34, or 2025-08-26
        #[arg(long)]
        period: Option<String>,

        /// Run the period containing this date (YYYY-MM-DD); ignored when
        /// --period is set
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Show member and volume statistics for a network file
    Stats {
        /// Path to the network JSON file
        network: PathBuf,
    },

    /// Summarize stored commissions for one period
    Summary {
        /// SQLite database path
        db: PathBuf,

        /// Platform identifier
        platform: String,

        /// Period key
        period: String,
    },

    /// Recompute wallet balances from the ledger and report drift
    Reconcile {
        /// SQLite database path
        db: PathBuf,

        /// Platform identifier
        platform: String,
    },
}
