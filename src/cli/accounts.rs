use std::path::Path;

use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::cli::database_path;
use crate::error::Result;
use crate::fmt::money;
use crate::ledger::{AccountSummary, Ledger};
use crate::settings::load_settings;

pub fn list(config: &Path, database: Option<&Path>) -> Result<()> {
    let settings = load_settings(config)?;
    let ledger = Ledger::open(&database_path(database, &settings))?;
    let accounts = ledger.accounts()?;
    if accounts.is_empty() {
        println!("No accounts stored yet.");
        return Ok(());
    }
    println!("Accounts\n{}", accounts_table(&accounts));
    Ok(())
}

fn accounts_table(accounts: &[AccountSummary]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Name", "Branch", "Account", "Sub", "Balance", "As of", "Bookings"]);
    for summary in accounts {
        let a = &summary.account;
        let (balance, as_of) = match &summary.latest_balance {
            Some(b) if b.amount.is_sign_negative() => {
                (money(b.amount, &b.currency).red().to_string(), b.observed_at.clone())
            }
            Some(b) => (money(b.amount, &b.currency).green().to_string(), b.observed_at.clone()),
            None => ("-".to_string(), String::new()),
        };
        table.add_row(vec![
            Cell::new(&a.name),
            Cell::new(a.branch_code),
            Cell::new(a.account_number),
            Cell::new(format!("{:02}", a.sub_account)),
            Cell::new(balance),
            Cell::new(as_of),
            Cell::new(summary.transaction_count),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    #[test]
    fn test_table_lists_each_account() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = Ledger::open(&dir.path().join("test.db")).unwrap();
        let id = ledger.resolve_account("giro", 1234567, 0, 100).unwrap();
        ledger.resolve_account("savings", 7654321, 1, 100).unwrap();
        ledger
            .record_balance(id, Decimal::from_str("1234.56").unwrap(), "EUR")
            .unwrap();

        colored::control::set_override(false);
        let rendered = accounts_table(&ledger.accounts().unwrap()).to_string();
        assert!(rendered.contains("giro"));
        assert!(rendered.contains("1.234,56 EUR"));
        assert!(rendered.contains("savings"));
        assert!(rendered.contains("01"));
    }
}
