pub mod accounts;
pub mod run;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use crate::settings::{default_database_path, Settings};

#[derive(Parser)]
#[command(name = "kontowatch", about = "Scrape online-banking turnovers and mail what is new.")]
pub struct Cli {
    /// YAML file with the accounts to check
    #[arg(short, long)]
    pub config: PathBuf,

    /// Log debug output
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long)]
    pub quiet: bool,

    /// SQLite database (default: `database` from the config, else ~/.db_accounts)
    #[arg(long)]
    pub database: Option<PathBuf>,

    /// Print notifications instead of mailing them
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check every enabled account and send notifications (default).
    Run,
    /// List stored accounts with their latest balance.
    Accounts,
}

impl Cli {
    pub fn log_level(&self) -> log::LevelFilter {
        if self.verbose {
            log::LevelFilter::Debug
        } else if self.quiet {
            log::LevelFilter::Error
        } else {
            log::LevelFilter::Info
        }
    }
}

/// `--database` wins over the config file, which wins over the default.
pub(crate) fn database_path(flag: Option<&Path>, settings: &Settings) -> PathBuf {
    flag.map(Path::to_path_buf)
        .or_else(|| settings.database.clone())
        .unwrap_or_else(default_database_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(database: Option<&str>) -> Settings {
        Settings {
            sender_address: "bank@example.org".to_string(),
            smtp_host: "localhost".to_string(),
            database: database.map(PathBuf::from),
            accounts: Vec::new(),
        }
    }

    #[test]
    fn test_database_flag_overrides_config() {
        let path = database_path(Some(Path::new("/tmp/flag.db")), &settings(Some("/tmp/config.db")));
        assert_eq!(path, PathBuf::from("/tmp/flag.db"));
    }

    #[test]
    fn test_database_from_config_then_default() {
        assert_eq!(database_path(None, &settings(Some("/tmp/config.db"))), PathBuf::from("/tmp/config.db"));
        assert_eq!(database_path(None, &settings(None)), default_database_path());
    }

    #[test]
    fn test_log_level_from_flags() {
        let cli = Cli::try_parse_from(["kontowatch", "-c", "x.yml", "-v"]).unwrap();
        assert_eq!(cli.log_level(), log::LevelFilter::Debug);
        let cli = Cli::try_parse_from(["kontowatch", "-c", "x.yml", "--quiet", "accounts"]).unwrap();
        assert_eq!(cli.log_level(), log::LevelFilter::Error);
        assert!(matches!(cli.command, Some(Commands::Accounts)));
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["kontowatch", "-c", "x.yml", "-v", "-q"]).is_err());
    }
}
