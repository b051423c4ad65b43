use std::fmt::Write;

use chrono::{Local, NaiveDateTime};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::{Message, SmtpTransport, Transport};

use crate::error::{KontoError, Result};
use crate::models::{BalanceSnapshot, Transaction};
use crate::settings::AccountConfig;

/// A rendered summary mail, ready to hand to a [`Mailer`].
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

pub trait Mailer {
    fn send(&self, notification: &Notification) -> Result<()>;
}

/// Plain SMTP to a local relay.
pub struct SmtpMailer {
    transport: SmtpTransport,
}

impl SmtpMailer {
    pub fn new(host: &str) -> Self {
        Self {
            transport: SmtpTransport::builder_dangerous(host).build(),
        }
    }
}

fn mailbox(address: &str) -> Result<Mailbox> {
    address
        .parse()
        .map_err(|e| KontoError::Mail(format!("invalid address '{address}': {e}")))
}

impl Mailer for SmtpMailer {
    fn send(&self, notification: &Notification) -> Result<()> {
        if notification.to.is_empty() {
            return Err(KontoError::Mail("no recipients".to_string()));
        }
        let mut builder = Message::builder()
            .from(mailbox(&notification.from)?)
            .subject(notification.subject.clone())
            .header(ContentType::TEXT_PLAIN);
        for recipient in &notification.to {
            builder = builder.to(mailbox(recipient)?);
        }
        let message = builder
            .body(notification.body.clone())
            .map_err(|e| KontoError::Mail(e.to_string()))?;

        self.transport
            .send(&message)
            .map_err(|e| KontoError::Mail(e.to_string()))?;
        log::debug!("mail sent to {}", notification.to.join(", "));
        Ok(())
    }
}

/// Prints notifications instead of sending them (`--dry-run`).
pub struct StdoutMailer;

impl Mailer for StdoutMailer {
    fn send(&self, notification: &Notification) -> Result<()> {
        println!("From: {}", notification.from);
        println!("To: {}", notification.to.join(", "));
        println!("Subject: {}", notification.subject);
        println!();
        println!("{}", notification.body);
        Ok(())
    }
}

/// SQLite stores UTC; show the reader local time.
fn observed_local(observed_at: &str) -> String {
    match NaiveDateTime::parse_from_str(observed_at, "%Y-%m-%d %H:%M:%S") {
        Ok(utc) => utc
            .and_utc()
            .with_timezone(&Local)
            .format("%d.%m.%Y %H:%M:%S")
            .to_string(),
        Err(_) => observed_at.to_string(),
    }
}

pub fn subject(account: &AccountConfig) -> String {
    format!(
        "Konto Informationen: {} ({}/{}/{})",
        account.name, account.branch_code, account.account_number, account.sub_account
    )
}

pub fn render_body(balance: &BalanceSnapshot, unseen: &[Transaction]) -> String {
    let mut body = String::new();
    // Writing to a String cannot fail.
    let _ = writeln!(body, "Datum: {}", observed_local(&balance.observed_at));
    let _ = writeln!(body, "Kontostand: {} {}", balance.amount, balance.currency);
    body.push_str("\n\n");

    for t in unseen {
        let b = &t.booking;
        let _ = writeln!(body, "{:>18}: {} {}", "Betrag", b.amount, b.currency);
        let _ = writeln!(body, "{:>18}: {}", "Buchungsdatum", b.booking_date);
        let _ = writeln!(body, "{:>18}: {}", "Wertstellungsdatum", b.value_date);
        let _ = writeln!(body, "{:>18}: {}", "Verwendungszweck", b.purpose);
        if !b.purpose2.is_empty() {
            let _ = writeln!(body, "{:>18}: {}", "Verwendungszweck", b.purpose2);
        }
        body.push_str("\n\n");
    }
    body
}

pub fn compose(
    account: &AccountConfig,
    sender: &str,
    balance: &BalanceSnapshot,
    unseen: &[Transaction],
) -> Notification {
    Notification {
        from: sender.to_string(),
        to: account.recipients.clone(),
        subject: subject(account),
        body: render_body(balance, unseen),
    }
}
