use std::path::Path;

use colored::Colorize;
use url::Url;

use crate::cli::database_path;
use crate::error::{KontoError, Result};
use crate::http::BankSession;
use crate::ledger::Ledger;
use crate::navigator::HOME_URL;
use crate::notify::{SmtpMailer, StdoutMailer};
use crate::runner::{run_accounts, RunReport};
use crate::settings::load_settings;

pub fn run(config: &Path, database: Option<&Path>, dry_run: bool) -> Result<()> {
    let settings = load_settings(config)?;
    let mut ledger = Ledger::open(&database_path(database, &settings))?;
    let home = Url::parse(HOME_URL)?;

    let report = if dry_run {
        run_accounts(&settings, &mut ledger, BankSession::new, &StdoutMailer, &home)?
    } else {
        let mailer = SmtpMailer::new(&settings.smtp_host);
        run_accounts(&settings, &mut ledger, BankSession::new, &mailer, &home)?
    };

    print_summary(&report);
    if report.has_failures() {
        return Err(KontoError::AccountsFailed(report.failed.len()));
    }
    Ok(())
}

fn print_summary(report: &RunReport) {
    for name in &report.processed {
        println!("{} {name}", "ok".green().bold());
    }
    for name in &report.failed {
        println!("{} {name}", "failed".red().bold());
    }
    for name in &report.skipped {
        println!("{} {name}", "disabled".dimmed());
    }
}
