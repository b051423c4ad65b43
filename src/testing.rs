//! Canned bank pages and an in-memory [`Fetch`] for tests.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

use url::Url;
use zeroize::Zeroizing;

use crate::error::{KontoError, Result};
use crate::http::{Fetch, Page};
use crate::settings::AccountConfig;

pub const HOME: &str = "https://www.bank.example/";
pub const PORTAL: &str = "https://meine.bank.example/trxm/db/init.do";
pub const LOGIN: &str = "https://meine.bank.example/trxm/db/login.do";
pub const ACCOUNTS: &str = "https://meine.bank.example/trxm/db/accounts.do";
pub const EXPORT: &str = "https://meine.bank.example/trxm/db/turnovers.do";

/// Serves canned pages by URL and records every POST.
pub struct FakeBank {
    pub pages: HashMap<String, String>,
    pub posts: RefCell<Vec<(String, BTreeMap<String, String>)>>,
}

impl FakeBank {
    pub fn new(pages: &[(&str, String)]) -> Self {
        Self {
            pages: pages.iter().map(|(u, b)| (u.to_string(), b.clone())).collect(),
            posts: RefCell::new(Vec::new()),
        }
    }

    /// A site where the whole walk succeeds and the export holds `bookings`.
    pub fn with_export(bookings: &str) -> Self {
        Self::new(&[
            (HOME, home_page()),
            (PORTAL, portal_page()),
            (LOGIN, login_response()),
            (ACCOUNTS, accounts_page()),
            (EXPORT, export_page(bookings)),
        ])
    }

    fn serve(&self, url: &Url) -> Result<Page> {
        match self.pages.get(url.as_str()) {
            Some(body) => Ok(Page {
                url: url.clone(),
                body: body.clone(),
            }),
            None => Err(KontoError::HttpStatus {
                status: 404,
                reason: "Not Found".to_string(),
                url: url.to_string(),
            }),
        }
    }
}

impl Fetch for FakeBank {
    fn get(&self, url: &Url) -> Result<Page> {
        self.serve(url)
    }

    fn post_form(&self, url: &Url, fields: &BTreeMap<String, String>) -> Result<Page> {
        self.posts.borrow_mut().push((url.to_string(), fields.clone()));
        self.serve(url)
    }
}

pub fn home_url() -> Url {
    Url::parse(HOME).unwrap()
}

pub fn account(name: &str, account_number: i64) -> AccountConfig {
    AccountConfig {
        name: name.to_string(),
        account_number,
        sub_account: 0,
        branch_code: 100,
        password: Zeroizing::new("12345".to_string()),
        recipients: vec!["me@example.org".to_string()],
        enabled: true,
    }
}

pub fn home_page() -> String {
    format!(
        r#"<html><body>
        <a href="/privatkunden">Privatkunden</a>
        <a title="Zum Online Banking" href="{PORTAL}" class="login">Online-Banking</a>
        <a title="Zum Online Banking" href="{PORTAL}">Online-Banking</a>
        </body></html>"#
    )
}

pub fn portal_page() -> String {
    r#"<html><body>
        <div id="cookieConsentBox"><div class="inner"><form action="/consent"><input type="hidden" name="ok" value="1"></form></div></div>
        <form id="loginForm" method="post" action="login.do">
          <input type="hidden" name="token" value="t0k3n">
          <input type="text" name="branch" value="">
          <input type="text" name="account" value="">
          <input type="text" name="subaccount" value="">
          <input type="password" name="pin" value="">
        </form>
    </body></html>"#
        .to_string()
}

pub fn login_response() -> String {
    r#"<html><body><ul>
        <li><a href="overview.do">Finanzübersicht</a></li>
        <li><a href="accounts.do"> Konten </a></li>
    </ul></body></html>"#
        .to_string()
}

pub fn accounts_page() -> String {
    r#"<html><body>
        <form id="search" action="/search"><input type="text" name="q" value=""></form>
        <form id="accountTurnoversForm" method="post" action="turnovers.do">
          <input type="hidden" name="sessionKey" value="abc">
          <input type="radio" name="period" value="dynamicRange" checked>
          <input type="radio" name="period" value="fixedRange">
          <select name="periodDays"><option value="30">30</option></select>
          <select name="subaccountAndCurrency"><option value="00EUR" selected>00</option></select>
        </form>
    </body></html>"#
        .to_string()
}

/// One booked-turnover table row.
pub fn booking_row(date: &str, purpose: &str, debit: &str, credit: &str) -> String {
    format!(
        r#"<tr>
          <td headers="bTentry">{date}</td>
          <td headers="bTvalue">{date}</td>
          <td headers="bTpurpose">{purpose}</td>
          <td headers="bTdebit">{debit}</td>
          <td headers="bTcredit">{credit}</td>
          <td headers="bTcurrency">EUR</td>
        </tr>"#
    )
}

pub fn export_page(rows: &str) -> String {
    format!(
        r#"<html><body>
        <table><tr><th>Aktueller Kontostand</th>
          <td class="balance credit"><strong>1.000,00</strong></td>
          <td><strong><acronym title="Euro">EUR</acronym></strong></td></tr></table>
        <!-- Display bookedTurnovers -->
        <table class="bookings">
          <tr class="headline"><th id="bTentry">Buchungstag</th></tr>
          {rows}
        </table>
        <!-- If there are no turnovers existent, an info message is shown above -->
        </body></html>"#
    )
}
