use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use zeroize::Zeroizing;

use crate::error::{KontoError, Result};

const REQUIRED_ACCOUNT_FIELDS: &[&str] = &[
    "account_number",
    "sub_account",
    "branch_code",
    "password",
    "recipients",
    "enabled",
];

#[derive(Debug)]
pub struct Settings {
    pub sender_address: String,
    pub smtp_host: String,
    pub database: Option<PathBuf>,
    /// In document order.
    pub accounts: Vec<AccountConfig>,
}

#[derive(Debug)]
pub struct AccountConfig {
    pub name: String,
    pub account_number: i64,
    pub sub_account: i64,
    pub branch_code: i64,
    pub password: Zeroizing<String>,
    pub recipients: Vec<String>,
    pub enabled: bool,
}

impl AccountConfig {
    /// The sub-account as the login and export forms expect it.
    pub fn sub_account_padded(&self) -> String {
        format!("{:02}", self.sub_account)
    }
}

#[derive(Deserialize)]
struct RawAccount {
    account_number: i64,
    sub_account: i64,
    branch_code: i64,
    password: ScalarString,
    recipients: Recipients,
    enabled: bool,
}

/// PINs are often written unquoted in YAML and arrive as numbers.
#[derive(Deserialize)]
#[serde(untagged)]
enum ScalarString {
    Text(String),
    Number(u64),
}

impl ScalarString {
    fn into_string(self) -> String {
        match self {
            Self::Text(s) => s,
            Self::Number(n) => n.to_string(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Recipients {
    Joined(String),
    List(Vec<String>),
}

impl Recipients {
    fn into_vec(self) -> Vec<String> {
        let parts = match self {
            Self::Joined(s) => s.split(',').map(str::to_string).collect(),
            Self::List(list) => list,
        };
        parts
            .into_iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect()
    }
}

pub fn default_database_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".db_accounts")
}

pub fn shellexpand_path(path: &str) -> PathBuf {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return PathBuf::from(path.replacen('~', &home.to_string_lossy(), 1));
        }
    }
    PathBuf::from(path)
}

/// The config file holds PINs; refuse it when others can read it.
#[cfg(unix)]
fn check_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = std::fs::metadata(path)?.permissions().mode();
    if mode & 0o044 != 0 {
        return Err(KontoError::ConfigPermissions(path.display().to_string()));
    }
    Ok(())
}

#[cfg(not(unix))]
fn check_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

pub fn load_settings(path: &Path) -> Result<Settings> {
    log::debug!("config file: {}", path.display());
    check_permissions(path)?;
    let content = std::fs::read_to_string(path)?;
    parse_settings(&content)
}

pub fn parse_settings(content: &str) -> Result<Settings> {
    let root: Mapping = serde_yaml::from_str(content)?;

    let accounts = match root.get("accounts") {
        Some(Value::Mapping(accounts)) => accounts,
        _ => return Err(KontoError::ConfigNoAccounts),
    };

    // Report every broken entry, then fail with the first.
    let mut errors = Vec::new();
    let mut parsed = Vec::new();
    for (key, entry) in accounts {
        let name = account_name(key);
        match parse_account(&name, entry) {
            Ok(account) => parsed.push(account),
            Err(problems) => {
                for e in problems {
                    log::error!("{e}");
                    errors.push(e);
                }
            }
        }
    }
    if let Some(first) = errors.into_iter().next() {
        return Err(first);
    }

    let sender_address = match root.get("sender_address") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        _ => return Err(KontoError::ConfigMissingSender),
    };
    let smtp_host = match root.get("smtp_host") {
        Some(Value::String(s)) => s.clone(),
        _ => "localhost".to_string(),
    };
    let database = match root.get("database") {
        Some(Value::String(s)) => Some(shellexpand_path(s)),
        _ => None,
    };

    Ok(Settings {
        sender_address,
        smtp_host,
        database,
        accounts: parsed,
    })
}

fn account_name(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

/// Every problem of one entry, so a single run reports all of them.
fn parse_account(name: &str, entry: &Value) -> std::result::Result<AccountConfig, Vec<KontoError>> {
    let missing = |field: &'static str| KontoError::ConfigMissingField {
        account: name.to_string(),
        field,
    };
    let Value::Mapping(fields) = entry else {
        return Err(REQUIRED_ACCOUNT_FIELDS.iter().map(|&f| missing(f)).collect());
    };

    let mut problems: Vec<KontoError> = REQUIRED_ACCOUNT_FIELDS
        .iter()
        .filter(|&&field| !fields.contains_key(field))
        .map(|&field| missing(field))
        .collect();
    if fields.contains_key("enabled") && !matches!(fields.get("enabled"), Some(Value::Bool(_))) {
        problems.push(KontoError::ConfigInvalidEnabled {
            account: name.to_string(),
        });
    }
    if !problems.is_empty() {
        return Err(problems);
    }

    let raw: RawAccount = serde_yaml::from_value(entry.clone()).map_err(|e| {
        log::debug!("account {name}: {e}");
        KontoError::ConfigInvalidField {
            account: name.to_string(),
            field: first_invalid_field(fields),
        }
    })
    .map_err(|e| vec![e])?;

    Ok(AccountConfig {
        name: name.to_string(),
        account_number: raw.account_number,
        sub_account: raw.sub_account,
        branch_code: raw.branch_code,
        password: Zeroizing::new(raw.password.into_string()),
        recipients: raw.recipients.into_vec(),
        enabled: raw.enabled,
    })
}

fn first_invalid_field(fields: &Mapping) -> &'static str {
    for &field in &["account_number", "sub_account", "branch_code"] {
        if !matches!(fields.get(field), Some(Value::Number(n)) if n.is_i64()) {
            return field;
        }
    }
    if !matches!(fields.get("password"), Some(Value::String(_) | Value::Number(_))) {
        return "password";
    }
    "recipients"
}
