use url::Url;

use crate::error::Result;
use crate::http::Fetch;
use crate::ledger::Ledger;
use crate::navigator::retrieve_turnover_export;
use crate::notify::{compose, Mailer};
use crate::settings::{AccountConfig, Settings};
use crate::statement::parse_turnover_export;

/// What happened to each configured account during one run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunReport {
    pub processed: Vec<String>,
    pub failed: Vec<String>,
    pub skipped: Vec<String>,
}

impl RunReport {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Outcome of a single account that did not error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AccountOutcome {
    Notified { new_bookings: usize },
    /// No balance has ever been stored, so there is nothing to report.
    NoBalance,
}

/// Process every enabled account in configuration order.
///
/// Errors local to one account are logged and the next account is tried.
/// Errors that mean the store itself is untrustworthy end the run.
pub fn run_accounts<S, F, M>(
    settings: &Settings,
    ledger: &mut Ledger,
    mut new_session: S,
    mailer: &M,
    home: &Url,
) -> Result<RunReport>
where
    S: FnMut() -> Result<F>,
    F: Fetch,
    M: Mailer,
{
    let mut report = RunReport::default();
    for account in &settings.accounts {
        if !account.enabled {
            log::debug!("skipping disabled account {}", account.name);
            report.skipped.push(account.name.clone());
            continue;
        }
        log::info!("Account: {}", account.name);

        let outcome = new_session().and_then(|session| {
            process_account(account, &settings.sender_address, ledger, &session, mailer, home)
        });
        match outcome {
            Ok(AccountOutcome::Notified { new_bookings }) => {
                log::info!("{}: notified about {new_bookings} new booking(s)", account.name);
                report.processed.push(account.name.clone());
            }
            Ok(AccountOutcome::NoBalance) => {
                log::info!("{}: no balance recorded, nothing to send", account.name);
                report.processed.push(account.name.clone());
            }
            Err(e) if e.is_run_fatal() => {
                log::error!("{}: {e}", account.name);
                return Err(e);
            }
            Err(e) => {
                log::error!("{}: {e}", account.name);
                report.failed.push(account.name.clone());
            }
        }
    }
    Ok(report)
}

/// Scrape one account, store what was found and mail the unseen bookings.
pub fn process_account<F: Fetch, M: Mailer>(
    account: &AccountConfig,
    sender: &str,
    ledger: &mut Ledger,
    fetch: &F,
    mailer: &M,
    home: &Url,
) -> Result<AccountOutcome> {
    let account_id = ledger.resolve_account(
        &account.name,
        account.account_number,
        account.sub_account,
        account.branch_code,
    )?;

    let export = retrieve_turnover_export(fetch, home, account)?;
    let snapshot = parse_turnover_export(&export.page.body)?;
    log::debug!(
        "{}: {} booking(s) in export from {}",
        account.name,
        snapshot.transactions.len(),
        export.accounts_url
    );

    ledger.record_balance(account_id, snapshot.balance, &snapshot.currency)?;
    let inserted = ledger.record_transactions(account_id, &snapshot.transactions)?;
    log::debug!("{}: {inserted} booking(s) stored", account.name);

    let Some(balance) = ledger.latest_balance(account_id)? else {
        return Ok(AccountOutcome::NoBalance);
    };
    let unseen = ledger.unseen_transactions(account_id)?;
    let notification = compose(account, sender, &balance, &unseen);
    mailer.send(&notification)?;
    Ok(AccountOutcome::Notified {
        new_bookings: unseen.len(),
    })
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::error::KontoError;
    use crate::notify::Notification;
    use crate::testing::*;

    #[derive(Default)]
    struct RecordingMailer {
        sent: RefCell<Vec<Notification>>,
        fail: bool,
    }

    impl Mailer for RecordingMailer {
        fn send(&self, notification: &Notification) -> Result<()> {
            if self.fail {
                return Err(KontoError::Mail("relay refused".to_string()));
            }
            self.sent.borrow_mut().push(notification.clone());
            Ok(())
        }
    }

    fn test_ledger() -> (tempfile::TempDir, Ledger) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::open(&dir.path().join("test.db")).unwrap();
        (dir, ledger)
    }

    fn settings(accounts: Vec<AccountConfig>) -> Settings {
        Settings {
            sender_address: "bank@example.org".to_string(),
            smtp_host: "localhost".to_string(),
            database: None,
            accounts,
        }
    }

    fn two_bookings() -> String {
        booking_row("02.10.2026", "Miete", "-800,00", "") + &booking_row("05.10.2026", "Gehalt", "", "2500.00")
    }

    #[test]
    fn test_first_run_mails_every_booking() {
        let (_dir, mut ledger) = test_ledger();
        let mailer = RecordingMailer::default();
        let cfg = settings(vec![account("giro", 1234567)]);

        let report = run_accounts(&cfg, &mut ledger, || Ok(FakeBank::with_export(&two_bookings())), &mailer, &home_url())
            .unwrap();
        assert_eq!(report.processed, vec!["giro"]);
        assert!(!report.has_failures());

        let sent = mailer.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Konto Informationen: giro (100/1234567/0)");
        assert!(sent[0].body.contains("Kontostand: 1000.00 EUR"));
        assert!(sent[0].body.contains("Betrag: -800.00 EUR"));
        assert!(sent[0].body.contains("Betrag: 2500.00 EUR"));
    }

    #[test]
    fn test_second_run_sends_balance_without_bookings() {
        let (_dir, mut ledger) = test_ledger();
        let mailer = RecordingMailer::default();
        let cfg = settings(vec![account("giro", 1234567)]);
        for _ in 0..2 {
            run_accounts(&cfg, &mut ledger, || Ok(FakeBank::with_export(&two_bookings())), &mailer, &home_url())
                .unwrap();
        }
        let sent = mailer.sent.borrow();
        assert_eq!(sent.len(), 2);
        assert!(sent[1].body.contains("Kontostand"));
        assert!(!sent[1].body.contains("Betrag"));
    }

    #[test]
    fn test_new_booking_is_reported_once() {
        let (_dir, mut ledger) = test_ledger();
        let mailer = RecordingMailer::default();
        let cfg = settings(vec![account("giro", 1234567)]);
        run_accounts(&cfg, &mut ledger, || Ok(FakeBank::with_export(&two_bookings())), &mailer, &home_url()).unwrap();

        let more = two_bookings() + &booking_row("07.10.2026", "Strom", "-60,00", "");
        run_accounts(&cfg, &mut ledger, || Ok(FakeBank::with_export(&more)), &mailer, &home_url()).unwrap();

        let sent = mailer.sent.borrow();
        assert_eq!(sent[1].body.matches("Betrag").count(), 1);
        assert!(sent[1].body.contains("Betrag: -60.00 EUR"));
    }

    #[test]
    fn test_disabled_account_is_skipped() {
        let (_dir, mut ledger) = test_ledger();
        let mailer = RecordingMailer::default();
        let mut off = account("savings", 7654321);
        off.enabled = false;
        let cfg = settings(vec![off]);

        let mut sessions = 0;
        let report = run_accounts(
            &cfg,
            &mut ledger,
            || {
                sessions += 1;
                Ok(FakeBank::with_export(""))
            },
            &mailer,
            &home_url(),
        )
        .unwrap();
        assert_eq!(report.skipped, vec!["savings"]);
        assert_eq!(sessions, 0);
        assert!(ledger.accounts().unwrap().is_empty());
    }

    #[test]
    fn test_failing_account_does_not_stop_the_next() {
        let (_dir, mut ledger) = test_ledger();
        let mailer = RecordingMailer::default();
        let cfg = settings(vec![account("broken", 1), account("giro", 1234567)]);

        let mut calls = 0;
        let report = run_accounts(
            &cfg,
            &mut ledger,
            || {
                calls += 1;
                let mut bank = FakeBank::with_export(&two_bookings());
                if calls == 1 {
                    bank.pages.remove(PORTAL);
                }
                Ok(bank)
            },
            &mailer,
            &home_url(),
        )
        .unwrap();
        assert_eq!(report.failed, vec!["broken"]);
        assert_eq!(report.processed, vec!["giro"]);
        assert!(report.has_failures());
        assert_eq!(mailer.sent.borrow().len(), 1);
    }

    #[test]
    fn test_identity_mismatch_only_fails_that_account() {
        let (_dir, mut ledger) = test_ledger();
        ledger.resolve_account("giro", 999, 0, 100).unwrap();
        let mailer = RecordingMailer::default();
        let cfg = settings(vec![account("giro", 1234567), account("savings", 7654321)]);

        let report = run_accounts(&cfg, &mut ledger, || Ok(FakeBank::with_export(&two_bookings())), &mailer, &home_url())
            .unwrap();
        assert_eq!(report.failed, vec!["giro"]);
        assert_eq!(report.processed, vec!["savings"]);
    }

    #[test]
    fn test_duplicate_rows_in_store_end_the_run() {
        let (_dir, mut ledger) = test_ledger();
        let id = ledger.resolve_account("giro", 1234567, 0, 100).unwrap();
        for _ in 0..2 {
            ledger
                .conn()
                .execute(
                    "INSERT INTO transactions (account_id, booking_date, value_date, purpose, amount, currency)
                     VALUES (?1, '02.10.2026', '02.10.2026', 'Miete', '-800.00', 'EUR')",
                    [id],
                )
                .unwrap();
        }
        let mailer = RecordingMailer::default();
        let cfg = settings(vec![account("giro", 1234567), account("savings", 7654321)]);

        let err = run_accounts(&cfg, &mut ledger, || Ok(FakeBank::with_export(&two_bookings())), &mailer, &home_url())
            .unwrap_err();
        assert!(matches!(err, KontoError::DuplicateTransactionInStore { count: 2, .. }));
        assert!(mailer.sent.borrow().is_empty());
        assert_eq!(ledger.accounts().unwrap().len(), 1);
    }

    #[test]
    fn test_mail_failure_still_advances_watermark() {
        let (_dir, mut ledger) = test_ledger();
        let mailer = RecordingMailer {
            fail: true,
            ..Default::default()
        };
        let cfg = settings(vec![account("giro", 1234567)]);

        let report = run_accounts(&cfg, &mut ledger, || Ok(FakeBank::with_export(&two_bookings())), &mailer, &home_url())
            .unwrap();
        assert_eq!(report.failed, vec!["giro"]);
        let id = ledger.resolve_account("giro", 1234567, 0, 100).unwrap();
        assert!(ledger.watermark(id).unwrap().is_some());
    }

    #[test]
    fn test_session_setup_failure_is_account_local() {
        let (_dir, mut ledger) = test_ledger();
        let mailer = RecordingMailer::default();
        let cfg = settings(vec![account("giro", 1234567)]);
        let report = run_accounts(
            &cfg,
            &mut ledger,
            || -> Result<FakeBank> { Err(KontoError::EmptyResponse(HOME.to_string())) },
            &mailer,
            &home_url(),
        )
        .unwrap();
        assert_eq!(report.failed, vec!["giro"]);
    }
}
