use std::fmt;

use thiserror::Error;

/// One round trip of the login/export walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationStep {
    HomePage,
    BankingPortal,
    Login,
    AccountsPage,
    TurnoverExport,
}

impl fmt::Display for NavigationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::HomePage => "home page",
            Self::BankingPortal => "online banking portal",
            Self::Login => "login",
            Self::AccountsPage => "accounts page",
            Self::TurnoverExport => "turnover export",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum KontoError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config file is not valid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Missing '{field}' in entry: {account}")]
    ConfigMissingField { account: String, field: &'static str },

    #[error("'enabled' is invalid, in entry: {account}")]
    ConfigInvalidEnabled { account: String },

    #[error("Invalid '{field}' in entry: {account}")]
    ConfigInvalidField { account: String, field: &'static str },

    #[error("Missing 'sender_address' in config file")]
    ConfigMissingSender,

    #[error("Config file has no 'accounts' section")]
    ConfigNoAccounts,

    #[error("Config file {0} must not be group or world readable")]
    ConfigPermissions(String),

    #[error("{step}: can't identify link to {target}")]
    NavigationLinkNotFound { step: NavigationStep, target: &'static str },

    #[error("{step}: found {count} different links to {target}")]
    AmbiguousNavigationLink {
        step: NavigationStep,
        target: &'static str,
        count: usize,
    },

    #[error("{step}: link to {target} is too long ({len} characters)")]
    NavigationLinkTooLong {
        step: NavigationStep,
        target: &'static str,
        len: usize,
    },

    #[error("{step}: found {count} forms, expected exactly one")]
    UnexpectedMultipleForms { step: NavigationStep, count: usize },

    #[error("{step}: can't find {target}")]
    FormNotFound { step: NavigationStep, target: &'static str },

    #[error("{step}: missing '{field}' in form")]
    MissingFormField { step: NavigationStep, field: &'static str },

    #[error("Can't extract action field from form")]
    FormActionNotFound,

    #[error("Found select field ({0}), but no option field")]
    SelectWithoutOptions(String),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Missing bookings in retrieved data")]
    NoTransactionsFound,

    #[error("Could not extract currency or amount for booking of {booking_date}")]
    IncompleteTransactionRecord { booking_date: String },

    #[error("Missing current amount in retrieved data")]
    BalanceNotFound,

    #[error("Missing current amount currency in retrieved data")]
    BalanceCurrencyNotFound,

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("HTTPError = {status} ({reason}) for {url}")]
    HttpStatus {
        status: u16,
        reason: String,
        url: String,
    },

    #[error("Failed to download {0}: empty response")]
    EmptyResponse(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{field} for account {name} does not match (stored {stored}, configured {configured})")]
    AccountIdentityMismatch {
        name: String,
        field: &'static str,
        stored: i64,
        configured: i64,
    },

    #[error("Found account booking statement {count} times in the database (account id {account_id})")]
    DuplicateTransactionInStore { account_id: i64, count: usize },

    #[error("Unable to send email: {0}")]
    Mail(String),

    #[error("{0} account(s) failed, see log")]
    AccountsFailed(usize),
}

impl KontoError {
    /// Errors after which the store can no longer be trusted for any account.
    pub fn is_run_fatal(&self) -> bool {
        matches!(self, Self::DuplicateTransactionInStore { .. } | Self::Db(_))
    }
}

pub type Result<T> = std::result::Result<T, KontoError>;
