use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use rust_decimal::Decimal;
use scraper::{ElementRef, Html, Selector};

use crate::error::{KontoError, Result};
use crate::models::{AccountSnapshot, ParsedTransaction};

const BALANCE_LABEL: &str = "Aktueller Kontostand";

/// The booked turnovers sit between these two HTML comments.
const REGION_START: &str = "Display bookedTurnovers";
const REGION_END: &str = "If there are no turnovers existent";

fn date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9.]+$").expect("invalid date regex"))
}

fn amount_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9.,\-]+$").expect("invalid amount regex"))
}

fn creditor_label_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^Gl.*ubiger ID$").expect("invalid creditor label regex"))
}

fn selector(css: &'static str, cell: &'static OnceLock<Selector>) -> &'static Selector {
    cell.get_or_init(|| Selector::parse(css).expect("invalid selector"))
}

fn any_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    selector("*", &SEL)
}

fn balance_amount_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    selector(".balance strong", &SEL)
}

/// German number rendering to a plain decimal: "1.234,56" -> "1234.56".
pub fn fix_punctuation(amount: &str) -> String {
    amount.replace('.', "").replace(',', ".")
}

fn parse_decimal(raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw).map_err(|_| KontoError::InvalidAmount(raw.to_string()))
}

/// Collapse sequences of whitespace into a single space and trim.
fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn cell_text(cell: ElementRef<'_>) -> String {
    normalize_ws(&cell.text().collect::<String>())
}

/// Text of a cell without the text of links inside it (the direct debit return link).
fn text_outside_links(cell: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in cell.descendants() {
        let Some(text) = node.value().as_text() else { continue };
        let in_link = node
            .ancestors()
            .take_while(|a| a.id() != cell.id())
            .any(|a| a.value().as_element().is_some_and(|e| e.name() == "a"));
        if !in_link {
            out.push_str(text);
        }
    }
    out.trim().to_string()
}

fn own_text(element: ElementRef<'_>) -> String {
    element
        .children()
        .filter_map(|n| n.value().as_text().map(|t| t.to_string()))
        .collect::<String>()
}

fn next_cell(cell: ElementRef<'_>) -> Option<ElementRef<'_>> {
    cell.next_siblings()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == "td")
}

/// Which column a cell belongs to, from its `headers` attribute.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Column {
    Entry,
    Value,
    Purpose,
    Debit,
    Credit,
    Currency,
}

fn column(cell: ElementRef<'_>) -> Option<Column> {
    let headers = cell.value().attr("headers")?;
    headers.split_whitespace().find_map(|h| match h {
        "bTentry" => Some(Column::Entry),
        "bTvalue" => Some(Column::Value),
        "bTpurpose" => Some(Column::Purpose),
        "bTdebit" => Some(Column::Debit),
        "bTcredit" => Some(Column::Credit),
        "bTcurrency" => Some(Column::Currency),
        _ => None,
    })
}

/// The booking being assembled while scanning cells.
#[derive(Debug, Default)]
struct Pending {
    booking_date: Option<String>,
    value_date: String,
    purpose: String,
    purpose2: String,
    iban: String,
    bic: String,
    customer_reference: String,
    mandate_reference: String,
    creditor_id: String,
    amount: Option<String>,
    currency: Option<String>,
}

impl Pending {
    fn starting(booking_date: String) -> Self {
        Self {
            booking_date: Some(booking_date),
            ..Self::default()
        }
    }

    /// `None` when no booking has started yet.
    fn finish(self) -> Result<Option<ParsedTransaction>> {
        let Some(booking_date) = self.booking_date else {
            return Ok(None);
        };
        let amount = self.amount.filter(|a| !a.is_empty());
        let currency = self.currency.filter(|c| !c.is_empty());
        let (Some(amount), Some(currency)) = (amount, currency) else {
            return Err(KontoError::IncompleteTransactionRecord { booking_date });
        };
        let amount = parse_decimal(&amount)?;

        log::debug!(
            "Found booking entry: {booking_date}/{}: {amount} {currency} ({})",
            self.value_date,
            self.purpose
        );
        Ok(Some(ParsedTransaction {
            booking_date,
            value_date: self.value_date,
            purpose: self.purpose,
            purpose2: self.purpose2,
            iban: self.iban,
            bic: self.bic,
            customer_reference: self.customer_reference,
            mandate_reference: self.mandate_reference,
            creditor_id: self.creditor_id,
            amount,
            currency,
        }))
    }

    fn read_cell(&mut self, col: Column, cell: ElementRef<'_>) {
        match col {
            Column::Entry => {}
            Column::Value => {
                let text = cell_text(cell);
                if date_re().is_match(&text) {
                    self.value_date = text;
                }
            }
            Column::Purpose => self.purpose = cell_text(cell),
            Column::Debit => {
                let text = text_outside_links(cell);
                if amount_re().is_match(&text) {
                    self.amount = Some(fix_punctuation(&text));
                }
            }
            Column::Credit => {
                let text = text_outside_links(cell);
                if amount_re().is_match(&text) {
                    self.amount = Some(text);
                }
            }
            Column::Currency => self.currency = Some(cell_text(cell)),
        }
    }

    fn read_detail(&mut self, label: &str, value: String) {
        let slot = match label {
            "Verwendungszweck" => &mut self.purpose2,
            "IBAN" => &mut self.iban,
            "BIC" => &mut self.bic,
            "Kundenreferenz" => &mut self.customer_reference,
            "Mandatsreferenz" => &mut self.mandate_reference,
            _ if creditor_label_re().is_match(label) => &mut self.creditor_id,
            _ => return,
        };
        *slot = value;
    }
}

/// Parse the turnover export: booked transactions in page order plus the current balance.
pub fn parse_turnover_export(html: &str) -> Result<AccountSnapshot> {
    let transactions = parse_bookings(html)?;
    let (balance, currency) = parse_balance(html)?;
    log::debug!("Current account balance: {balance} {currency}");
    Ok(AccountSnapshot {
        balance,
        currency,
        transactions,
    })
}

/// Table cells between the region comments, in document order.
///
/// The comments may sit inside the table itself, so the region is found on the
/// parsed tree rather than cut out of the markup.
fn region_cells(doc: &Html) -> Result<Vec<ElementRef<'_>>> {
    let mut started = false;
    let mut has_table = false;
    let mut cells = Vec::new();
    for node in doc.tree.root().descendants() {
        if let Some(comment) = node.value().as_comment() {
            let text = comment.trim_start();
            if !started && text.starts_with(REGION_START) {
                started = true;
                has_table = node
                    .ancestors()
                    .any(|a| a.value().as_element().is_some_and(|e| e.name() == "table"));
            } else if started && text.starts_with(REGION_END) {
                return if has_table {
                    Ok(cells)
                } else {
                    Err(KontoError::NoTransactionsFound)
                };
            }
            continue;
        }
        if !started {
            continue;
        }
        let Some(element) = ElementRef::wrap(node) else { continue };
        match element.value().name() {
            "table" | "tbody" | "tr" => has_table = true,
            "td" => {
                has_table = true;
                cells.push(element);
            }
            _ => {}
        }
    }
    Err(KontoError::NoTransactionsFound)
}

pub fn parse_bookings(html: &str) -> Result<Vec<ParsedTransaction>> {
    let doc = Html::parse_document(html);
    let cells = region_cells(&doc)?;

    // Rows wrap irregularly: a booking-date cell opens the next booking,
    // detail label/value pairs may sit in nested tables of the same booking.
    let mut bookings = Vec::new();
    let mut pending = Pending::default();
    for cell in cells {
        match column(cell) {
            Some(Column::Entry) => {
                let date = cell_text(cell);
                if !date_re().is_match(&date) {
                    continue;
                }
                let done = std::mem::replace(&mut pending, Pending::starting(date));
                if let Some(t) = done.finish()? {
                    bookings.push(t);
                }
            }
            Some(col) => pending.read_cell(col, cell),
            None => {
                let label = cell_text(cell);
                if let Some(value) = next_cell(cell) {
                    pending.read_detail(&label, cell_text(value));
                }
            }
        }
    }
    if let Some(t) = pending.finish()? {
        bookings.push(t);
    }
    Ok(bookings)
}

pub fn parse_balance(html: &str) -> Result<(Decimal, String)> {
    let doc = Html::parse_document(html);
    let label = doc
        .select(any_selector())
        .find(|e| own_text(*e).trim() == BALANCE_LABEL)
        .ok_or(KontoError::BalanceNotFound)?;

    // The nearest enclosing element that also holds the balance figure.
    let (region, figure) = label
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find_map(|a| a.select(balance_amount_selector()).next().map(|s| (a, s)))
        .ok_or(KontoError::BalanceNotFound)?;

    let raw = cell_text(figure);
    if !amount_re().is_match(&raw) {
        return Err(KontoError::BalanceNotFound);
    }
    let balance = parse_decimal(&fix_punctuation(&raw))?;

    // The currency is the first acronym after the figure.
    let currency = region
        .descendants()
        .skip_while(|n| n.id() != figure.id())
        .filter_map(ElementRef::wrap)
        .filter(|e| e.value().name() == "acronym")
        .map(cell_text)
        .find(|c| !c.is_empty())
        .ok_or(KontoError::BalanceCurrencyNotFound)?;

    Ok((balance, currency))
}
