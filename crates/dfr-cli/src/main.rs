//! DFR CLI: the `dfr` command.

mod cli;
mod commands;
mod config;
mod logging;
mod support;

use clap::Parser;
use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    let config = support::load_config_or_exit(cli.config.as_deref(), cli.store.as_deref());
    logging::init(&config.log);

    match cli.command {
        Commands::Validate {
            plan,
            no_cache,
            json,
        } => commands::validate::run(&config, plan, no_cache, json),

        Commands::Fingerprint {
            plan,
            canonical,
            json,
        } => commands::fingerprint::run(plan, canonical, json),

        Commands::History { fingerprint, json } => {
            commands::history::run(&config, fingerprint, json)
        }

        Commands::Stats { json } => commands::stats::run(&config, json),

        Commands::Rules { json } => commands::rules::run(json),
    }
}
