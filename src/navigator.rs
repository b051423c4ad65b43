use std::sync::OnceLock;

use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use crate::error::{KontoError, NavigationStep, Result};
use crate::form::{extract_form, extract_form_data, form_selector, FormData};
use crate::http::{Fetch, Page};
use crate::settings::AccountConfig;

pub const HOME_URL: &str = "https://www.deutsche-bank.de/";

/// Links longer than this are not the portal entry point.
const MAX_PORTAL_LINK_LEN: usize = 100;
/// Every portal URL lives below this path segment.
const PORTAL_PATH_MARKER: &str = "trxm";
const LOGIN_FIELDS: &[&str] = &["branch", "account", "subaccount", "pin"];
const EXPORT_FIELDS: &[&str] = &["period", "periodDays"];
const TURNOVER_FORM_ID: &str = "accountTurnoversForm";
const EXPORT_WINDOW_DAYS: u32 = 85;

/// The raw turnover export and where the walk ended up.
#[derive(Debug, Clone)]
pub struct TurnoverExport {
    pub page: Page,
    pub accounts_url: Url,
}

fn anchor_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("a[href]").expect("invalid anchor selector"))
}

fn turnover_form_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| {
        Selector::parse(&format!("form#{TURNOVER_FORM_ID}")).expect("invalid turnover form selector")
    })
}

fn online_banking_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)online.banking").expect("invalid online banking regex"))
}

fn cookie_consent_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)<div id="cookieConsentBox">.+?<form.*?</form>.*?</div>.*?</div>"#)
            .expect("invalid cookie consent regex")
    })
}

/// Remove the cookie consent overlay; it carries a second `<form>`.
pub fn remove_cookie_consent_box(html: &str) -> String {
    cookie_consent_re().replace_all(html, "").into_owned()
}

/// Walk home page -> portal -> login -> accounts -> export for one account.
pub fn retrieve_turnover_export<F: Fetch>(
    fetch: &F,
    home: &Url,
    account: &AccountConfig,
) -> Result<TurnoverExport> {
    let home_page = fetch.get(home)?;
    let portal_url = find_portal_link(&home_page)?;
    log::debug!("next link (2): {portal_url}");

    let portal_page = fetch.get(&portal_url)?;
    let mut login = login_form(&portal_page)?;
    log::debug!("next link (3): {}", login.action);

    for &field in LOGIN_FIELDS {
        if !login.has_field(field) {
            return Err(KontoError::MissingFormField {
                step: NavigationStep::Login,
                field,
            });
        }
    }
    login.set("branch", account.branch_code.to_string());
    login.set("account", account.account_number.to_string());
    login.set("subaccount", account.sub_account_padded());
    login.set("pin", account.password.as_str());

    let logged_in = fetch.post_form(&login.action, &login.fields)?;
    let accounts_url = find_accounts_link(&logged_in)?;
    log::debug!("next link (4): {accounts_url}");

    let accounts_page = fetch.get(&accounts_url)?;
    let mut export = turnover_form(&accounts_page)?;
    log::debug!("next link (5): {}", export.action);

    for &field in EXPORT_FIELDS {
        if !export.has_field(field) {
            return Err(KontoError::MissingFormField {
                step: NavigationStep::TurnoverExport,
                field,
            });
        }
    }
    export.set("periodDays", EXPORT_WINDOW_DAYS.to_string());
    export.set("period", "fixedRange");
    export.set("subaccountAndCurrency", account.sub_account_padded());

    let page = fetch.post_form(&export.action, &export.fields)?;
    Ok(TurnoverExport { page, accounts_url })
}

fn find_portal_link(page: &Page) -> Result<Url> {
    const TARGET: &str = "Online Banking";
    let doc = Html::parse_document(&page.body);

    let mut found: Vec<Url> = Vec::new();
    for anchor in doc.select(anchor_selector()) {
        let title = anchor.value().attr("title").unwrap_or("");
        let text: String = anchor.text().collect();
        if !online_banking_re().is_match(title) && !online_banking_re().is_match(&text) {
            continue;
        }
        let Some(href) = anchor.value().attr("href") else { continue };
        let Ok(url) = page.url.join(href.trim()) else { continue };
        if url.scheme() != "https" || !url.as_str().contains(PORTAL_PATH_MARKER) {
            continue;
        }
        if !found.contains(&url) {
            found.push(url);
        }
    }

    match found.len() {
        0 => Err(KontoError::NavigationLinkNotFound {
            step: NavigationStep::HomePage,
            target: TARGET,
        }),
        1 => {
            let url = found.remove(0);
            let len = url.as_str().len();
            if len > MAX_PORTAL_LINK_LEN {
                return Err(KontoError::NavigationLinkTooLong {
                    step: NavigationStep::HomePage,
                    target: TARGET,
                    len,
                });
            }
            Ok(url)
        }
        count => Err(KontoError::AmbiguousNavigationLink {
            step: NavigationStep::HomePage,
            target: TARGET,
            count,
        }),
    }
}

fn login_form(page: &Page) -> Result<FormData> {
    let cleaned = remove_cookie_consent_box(&page.body);
    let doc = Html::parse_document(&cleaned);
    let forms: Vec<_> = doc.select(form_selector()).collect();
    match forms.as_slice() {
        [] => Err(KontoError::FormNotFound {
            step: NavigationStep::BankingPortal,
            target: "login form",
        }),
        [_] => extract_form_data(&cleaned, &page.url),
        _ => Err(KontoError::UnexpectedMultipleForms {
            step: NavigationStep::BankingPortal,
            count: forms.len(),
        }),
    }
}

fn find_accounts_link(page: &Page) -> Result<Url> {
    let doc = Html::parse_document(&page.body);
    let href = doc
        .select(anchor_selector())
        .find(|a| a.text().collect::<String>().trim() == "Konten")
        .and_then(|a| a.value().attr("href"))
        .ok_or(KontoError::NavigationLinkNotFound {
            step: NavigationStep::AccountsPage,
            target: "'Konten'",
        })?;
    Ok(page.url.join(href.trim())?)
}

fn turnover_form(page: &Page) -> Result<FormData> {
    let doc = Html::parse_document(&page.body);
    let form = doc
        .select(turnover_form_selector())
        .next()
        .ok_or(KontoError::FormNotFound {
            step: NavigationStep::AccountsPage,
            target: "turnover form",
        })?;
    extract_form(form, &page.url)
}
