use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "dfr",
    about = "DFR: deterministic failure reports for declarative architecture plans",
    version
)]
pub struct Cli {
    /// Path to dfr.toml (defaults to ./dfr.toml when present)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Path to the reports JSONL store (overrides config)
    #[arg(long, global = true)]
    pub store: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate a plan and print its failure report
    Validate {
        /// Path to the plan JSON document
        plan: String,

        /// Evaluate without reading or writing the report store
        #[arg(long)]
        no_cache: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print a plan's content fingerprint
    Fingerprint {
        /// Path to the plan JSON document
        plan: String,

        /// Also print the canonical form
        #[arg(long)]
        canonical: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List stored reports for a fingerprint across engine versions
    History {
        /// 64-character lowercase hex fingerprint
        fingerprint: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Summarize stored reports
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the engine version and its ordered rule set
    Rules {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
