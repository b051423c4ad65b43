mod cli;
mod db;
mod error;
mod fmt;
mod form;
mod http;
mod ledger;
mod models;
mod navigator;
mod notify;
mod runner;
mod settings;
mod statement;
#[cfg(test)]
mod testing;

use std::io::Write;

use clap::Parser;

use cli::{Cli, Commands};

fn init_logging(level: log::LevelFilter) {
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format(|buf, record| writeln!(buf, "{}: {}", record.level(), record.args()))
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_level());

    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => cli::run::run(&cli.config, cli.database.as_deref(), cli.dry_run),
        Commands::Accounts => cli::accounts::list(&cli.config, cli.database.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
