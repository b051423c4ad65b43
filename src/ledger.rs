use std::path::Path;
use std::str::FromStr;

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};
use rust_decimal::Decimal;

use crate::db::{get_connection, init_db};
use crate::error::{KontoError, Result};
use crate::models::{BalanceSnapshot, ParsedTransaction, StoredAccount, Transaction};

const TRANSACTION_COLUMNS: &str = "id, account_id, booking_date, value_date, purpose, purpose2, iban, bic, \
     customer_reference, mandate_reference, creditor_id, amount, currency";

/// Registry row plus what the `accounts` listing shows next to it.
#[derive(Debug, Clone)]
pub struct AccountSummary {
    pub account: StoredAccount,
    pub latest_balance: Option<BalanceSnapshot>,
    pub transaction_count: i64,
}

/// Accounts, balance history, deduplicated bookings and notification watermarks.
pub struct Ledger {
    conn: Connection,
}

fn decimal_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let raw: String = row.get(idx)?;
    Decimal::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn transaction_from_row(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: row.get(0)?,
        account_id: row.get(1)?,
        booking: ParsedTransaction {
            booking_date: row.get(2)?,
            value_date: row.get(3)?,
            purpose: row.get(4)?,
            purpose2: row.get(5)?,
            iban: row.get(6)?,
            bic: row.get(7)?,
            customer_reference: row.get(8)?,
            mandate_reference: row.get(9)?,
            creditor_id: row.get(10)?,
            amount: decimal_column(row, 11)?,
            currency: row.get(12)?,
        },
    })
}

fn balance_from_row(row: &Row<'_>) -> rusqlite::Result<BalanceSnapshot> {
    Ok(BalanceSnapshot {
        id: row.get(0)?,
        account_id: row.get(1)?,
        amount: decimal_column(row, 2)?,
        currency: row.get(3)?,
        observed_at: row.get(4)?,
    })
}

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<StoredAccount> {
    Ok(StoredAccount {
        id: row.get(0)?,
        name: row.get(1)?,
        account_number: row.get(2)?,
        sub_account: row.get(3)?,
        branch_code: row.get(4)?,
    })
}

fn transactions_after(conn: &Connection, account_id: i64, after_id: i64) -> Result<Vec<Transaction>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE account_id = ?1 AND id > ?2 ORDER BY id ASC"
    ))?;
    let rows = stmt
        .query_map(rusqlite::params![account_id, after_id], transaction_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

impl Ledger {
    pub fn open(db_path: &Path) -> Result<Self> {
        log::debug!("opening ledger {}", db_path.display());
        Self::from_connection(get_connection(db_path)?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self { conn })
    }

    /// Look up an account by name, registering it on first sight. The numeric
    /// identity of a known name must match what was stored.
    pub fn resolve_account(
        &mut self,
        name: &str,
        account_number: i64,
        sub_account: i64,
        branch_code: i64,
    ) -> Result<i64> {
        log::debug!("Loading account: {name} ({branch_code}/{account_number}/{sub_account})");
        let tx = self.conn.transaction()?;
        let existing = tx
            .query_row(
                "SELECT id, name, account_number, sub_account, branch_code FROM accounts WHERE name = ?1",
                [name],
                account_from_row,
            )
            .optional()?;

        let stored = match existing {
            Some(stored) => stored,
            None => {
                tx.execute(
                    "INSERT INTO accounts (name, account_number, sub_account, branch_code) VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![name, account_number, sub_account, branch_code],
                )?;
                let id = tx.last_insert_rowid();
                tx.commit()?;
                return Ok(id);
            }
        };

        let checks = [
            ("account number", stored.account_number, account_number),
            ("sub account", stored.sub_account, sub_account),
            ("branch code", stored.branch_code, branch_code),
        ];
        for (field, stored_value, configured) in checks {
            if stored_value != configured {
                return Err(KontoError::AccountIdentityMismatch {
                    name: name.to_string(),
                    field,
                    stored: stored_value,
                    configured,
                });
            }
        }
        Ok(stored.id)
    }

    pub fn record_balance(&mut self, account_id: i64, amount: Decimal, currency: &str) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO balances (account_id, amount, currency) VALUES (?1, ?2, ?3)",
            rusqlite::params![account_id, amount.to_string(), currency],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Insert every booking not already stored, in the given order. Returns how many were new.
    pub fn record_transactions(&mut self, account_id: i64, bookings: &[ParsedTransaction]) -> Result<usize> {
        let mut inserted = 0usize;
        for t in bookings {
            let tx = self.conn.transaction()?;
            let amount = t.amount.to_string();
            let matches: i64 = tx.query_row(
                "SELECT count(*) FROM transactions \
                 WHERE account_id = ?1 AND booking_date = ?2 AND value_date = ?3 AND purpose = ?4 \
                   AND purpose2 = ?5 AND iban = ?6 AND bic = ?7 AND customer_reference = ?8 \
                   AND mandate_reference = ?9 AND creditor_id = ?10 AND amount = ?11 AND currency = ?12",
                rusqlite::params![
                    account_id,
                    t.booking_date,
                    t.value_date,
                    t.purpose,
                    t.purpose2,
                    t.iban,
                    t.bic,
                    t.customer_reference,
                    t.mandate_reference,
                    t.creditor_id,
                    amount,
                    t.currency,
                ],
                |row| row.get(0),
            )?;
            match matches {
                0 => {
                    tx.execute(
                        "INSERT INTO transactions (account_id, booking_date, value_date, purpose, purpose2, iban, bic, \
                         customer_reference, mandate_reference, creditor_id, amount, currency) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                        rusqlite::params![
                            account_id,
                            t.booking_date,
                            t.value_date,
                            t.purpose,
                            t.purpose2,
                            t.iban,
                            t.bic,
                            t.customer_reference,
                            t.mandate_reference,
                            t.creditor_id,
                            amount,
                            t.currency,
                        ],
                    )?;
                    tx.commit()?;
                    inserted += 1;
                    log::debug!(
                        "Write booking entry: {}/{}: {} {} ({})",
                        t.booking_date,
                        t.value_date,
                        t.amount,
                        t.currency,
                        t.purpose
                    );
                }
                1 => {}
                count => {
                    return Err(KontoError::DuplicateTransactionInStore {
                        account_id,
                        count: count as usize,
                    })
                }
            }
        }
        Ok(inserted)
    }

    /// Bookings the user has not been told about yet; advances the watermark past them.
    ///
    /// Without a watermark the whole history is returned and the watermark is
    /// created at its newest entry.
    pub fn unseen_transactions(&mut self, account_id: i64) -> Result<Vec<Transaction>> {
        let tx = self.conn.transaction()?;
        let last_seen: Option<i64> = tx
            .query_row(
                "SELECT last_seen_transaction FROM watermarks WHERE account_id = ?1",
                [account_id],
                |row| row.get(0),
            )
            .optional()?;

        let unseen = transactions_after(&tx, account_id, last_seen.unwrap_or(0))?;
        if let Some(newest) = unseen.last() {
            match last_seen {
                None => {
                    tx.execute(
                        "INSERT INTO watermarks (account_id, last_seen_transaction) VALUES (?1, ?2)",
                        rusqlite::params![account_id, newest.id],
                    )?;
                }
                Some(_) => {
                    tx.execute(
                        "UPDATE watermarks SET last_seen_transaction = ?1, updated_at = datetime('now') \
                         WHERE account_id = ?2 AND last_seen_transaction < ?1",
                        rusqlite::params![newest.id, account_id],
                    )?;
                }
            }
        }
        tx.commit()?;
        Ok(unseen)
    }

    pub fn latest_balance(&self, account_id: i64) -> Result<Option<BalanceSnapshot>> {
        let balance = self
            .conn
            .query_row(
                "SELECT id, account_id, amount, currency, observed_at FROM balances \
                 WHERE account_id = ?1 ORDER BY id DESC LIMIT 1",
                [account_id],
                balance_from_row,
            )
            .optional()?;
        Ok(balance)
    }

    #[cfg(test)]
    pub(crate) fn watermark(&self, account_id: i64) -> Result<Option<i64>> {
        let id = self
            .conn
            .query_row(
                "SELECT last_seen_transaction FROM watermarks WHERE account_id = ?1",
                [account_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    pub fn accounts(&self) -> Result<Vec<AccountSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, account_number, sub_account, branch_code FROM accounts ORDER BY name",
        )?;
        let accounts = stmt
            .query_map([], account_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut summaries = Vec::with_capacity(accounts.len());
        for account in accounts {
            let latest_balance = self.latest_balance(account.id)?;
            let transaction_count: i64 = self.conn.query_row(
                "SELECT count(*) FROM transactions WHERE account_id = ?1",
                [account.id],
                |r| r.get(0),
            )?;
            summaries.push(AccountSummary {
                account,
                latest_balance,
                transaction_count,
            });
        }
        Ok(summaries)
    }

    #[cfg(test)]
    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }
}
