//! Blocking HTTP client for the schema endpoints. Calls are made from
//! short-lived worker threads; the GUI receives the single result through a
//! channel (see [`spawn_fetch`] / [`spawn_save`]).

use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;
use url::Url;

use crate::schema_utils::schema::{SchemaDocument, TableUpdate};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid schema endpoint: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server answered HTTP {0}")]
    Status(u16),
    #[error("invalid schema document: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("invalid schema endpoint: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("table no longer exists on the server")]
    NotFound,
    #[error("schema was changed by someone else; reload before saving")]
    Conflict,
    #[error("server rejected the update: {0}")]
    Rejected(String),
    #[error("invalid response: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Clone, Debug)]
pub struct SchemaClient {
    base: Url,
    api_key: Option<String>,
    http: reqwest::blocking::Client,
}

impl SchemaClient {
    pub fn new(endpoint: &str, api_key: Option<String>) -> Result<Self, FetchError> {
        let mut base = Url::parse(endpoint.trim())?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { base, api_key, http })
    }

    pub fn schema_url(&self) -> Result<Url, url::ParseError> {
        self.base.join("api/schema")
    }

    pub fn table_url(&self, table: &str) -> Result<Url, url::ParseError> {
        let mut url = self.base.join("api/table/")?;
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .push(table);
        Ok(url)
    }

    fn with_key(&self, req: reqwest::blocking::RequestBuilder) -> reqwest::blocking::RequestBuilder {
        match &self.api_key {
            Some(k) => req.header("X-API-Key", k),
            None => req,
        }
    }

    pub fn fetch_schema(&self) -> Result<SchemaDocument, FetchError> {
        let url = self.schema_url()?;
        log::info!("fetching schema from {}", url);
        let resp = self.with_key(self.http.get(url)).send()?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let body = resp.text()?;
        Ok(SchemaDocument::from_json(&body)?)
    }

    /// `PUT /api/table/{original}`; the server answers with the whole
    /// updated document.
    pub fn save_table(&self, original: &str, update: &TableUpdate) -> Result<SchemaDocument, SaveError> {
        let url = self.table_url(original)?;
        log::info!("saving table {} as {} (base revision {})", original, update.name, update.base_revision);
        let resp = self.with_key(self.http.put(url)).json(update).send()?;
        match resp.status() {
            s if s.is_success() => {
                let body = resp.text()?;
                Ok(SchemaDocument::from_json(&body)?)
            }
            StatusCode::NOT_FOUND => Err(SaveError::NotFound),
            StatusCode::CONFLICT => Err(SaveError::Conflict),
            s => {
                let msg = resp.text().unwrap_or_default();
                Err(SaveError::Rejected(if msg.is_empty() { format!("HTTP {}", s.as_u16()) } else { msg }))
            }
        }
    }
}

/// Run one schema fetch on a worker thread.
pub fn spawn_fetch(endpoint: String, api_key: Option<String>) -> Receiver<Result<SchemaDocument, FetchError>> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let res = SchemaClient::new(&endpoint, api_key).and_then(|c| c.fetch_schema());
        if let Err(e) = &res {
            log::error!("schema fetch failed: {}", e);
        }
        let _ = tx.send(res);
    });
    rx
}

/// Run one table update on a worker thread.
pub fn spawn_save(
    endpoint: String,
    api_key: Option<String>,
    original: String,
    update: TableUpdate,
) -> Receiver<Result<SchemaDocument, SaveError>> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let res = match SchemaClient::new(&endpoint, api_key) {
            Ok(c) => c.save_table(&original, &update),
            Err(FetchError::InvalidUrl(e)) => Err(SaveError::InvalidUrl(e)),
            Err(FetchError::Http(e)) => Err(SaveError::Http(e)),
            Err(e) => Err(SaveError::Rejected(e.to_string())),
        };
        if let Err(e) = &res {
            log::warn!("save of table {} failed: {}", original, e);
        }
        let _ = tx.send(res);
    });
    rx
}
