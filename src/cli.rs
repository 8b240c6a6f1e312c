use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// One-shot access to the PumpScope relay, fallback chain and aggregator
#[derive(Parser, Debug)]
#[command(name = "pumpscope")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (TOML)
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch every dataset for a token address
    Aggregate {
        #[arg(required = true)]
        address: String,
    },

    /// Load a URL in a headless browser and print the captured JSON
    Relay {
        #[arg(required = true)]
        url: String,

        /// Label echoed back with the response
        #[arg(long)]
        data_type: Option<String>,
    },

    /// GET a URL through the direct/CORS-proxy fallback chain
    Fetch {
        #[arg(required = true)]
        url: String,
    },
}
