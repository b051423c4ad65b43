use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE};
use reqwest::StatusCode;
use url::Url;

use crate::error::{KontoError, Result};
use crate::fmt::human_size;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:128.0) Gecko/20100101 Firefox/128.0";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A fetched document and the URL it was finally served from.
#[derive(Debug, Clone)]
pub struct Page {
    pub url: Url,
    pub body: String,
}

/// A cookie-preserving browser session.
pub trait Fetch {
    fn get(&self, url: &Url) -> Result<Page>;
    fn post_form(&self, url: &Url, fields: &BTreeMap<String, String>) -> Result<Page>;
}

/// One online-banking session: its own cookie jar, German content.
pub struct BankSession {
    http: Client,
}

impl BankSession {
    pub fn new() -> Result<Self> {
        let mut headers = HeaderMap::new();
        // German rendering is the only one with all functionality
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("de"));

        let http = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .cookie_store(true)
            .gzip(true)
            .deflate(true)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { http })
    }

    fn finish(&self, response: reqwest::blocking::Response) -> Result<Page> {
        let status = response.status();
        let url = response.url().clone();
        if status != StatusCode::OK {
            return Err(KontoError::HttpStatus {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("unknown status").to_string(),
                url: url.to_string(),
            });
        }
        let body = response.text()?;
        if body.is_empty() {
            return Err(KontoError::EmptyResponse(url.to_string()));
        }
        log::debug!("fetched {}", human_size(body.len()));
        Ok(Page { url, body })
    }
}

impl Fetch for BankSession {
    fn get(&self, url: &Url) -> Result<Page> {
        let response = self.http.get(url.clone()).send()?;
        self.finish(response)
    }

    fn post_form(&self, url: &Url, fields: &BTreeMap<String, String>) -> Result<Page> {
        let response = self.http.post(url.clone()).form(fields).send()?;
        self.finish(response)
    }
}
