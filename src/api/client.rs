//! HTTP client for the FAC REST API.
//!
//! Every request is a GET with `Accept: application/json` and the API key in
//! `X-Api-Key`. Filters, `limit` and `offset` travel in the query string.

use crate::api::fetcher::{Page, PageRequest, PageSource};
use crate::error::{Error, FetchError, Result};
use futures::future::BoxFuture;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Url;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Header carrying the api.data.gov key.
pub const API_KEY_HEADER: &str = "X-Api-Key";

/// Configuration for the HTTP client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
    /// Where the key was expected to come from, for error messages.
    pub key_file: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.fac.gov".to_string(),
            api_key: None,
            timeout_seconds: 120,
            key_file: ".key".to_string(),
        }
    }
}

/// FAC API client.
pub struct FacClient {
    config: ClientConfig,
    http_client: reqwest::Client,
}

impl FacClient {
    /// Build a client with the configured timeout.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .default_headers(headers)
            .user_agent(concat!("facaudit/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Transport {
                url: config.base_url.clone(),
                source: Box::new(e),
            })?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Full request URL for one page.
    pub fn page_url(&self, request: &PageRequest<'_>) -> Result<Url> {
        build_page_url(&self.config.base_url, request)
    }

    async fn get_page(&self, request: PageRequest<'_>) -> Result<Page> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| Error::MissingApiKey {
                key_file: self.config.key_file.clone(),
            })?;

        let url = self.page_url(&request)?;
        let url_text = url.to_string();
        debug!("GET {}", url_text);

        let response = self
            .http_client
            .get(url)
            .header(API_KEY_HEADER, api_key)
            .send()
            .await
            .map_err(|e| Error::Transport {
                url: url_text.clone(),
                source: Box::new(e),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| Error::Transport {
            url: url_text.clone(),
            source: Box::new(e),
        })?;

        if !status.is_success() {
            return Err(FetchError {
                url: url_text,
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let rows: Vec<Value> =
            serde_json::from_str(&body).map_err(|e| Error::parse(url_text.clone(), &body, e))?;

        Ok(Page {
            url: url_text,
            rows,
        })
    }
}

impl PageSource for FacClient {
    fn fetch_page<'a>(&'a self, request: PageRequest<'a>) -> BoxFuture<'a, Result<Page>> {
        Box::pin(self.get_page(request))
    }
}

/// `<base>/<endpoint>?<filters>&limit=<n>&offset=<n>`.
pub fn build_page_url(base_url: &str, request: &PageRequest<'_>) -> Result<Url> {
    let raw = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        request.endpoint.trim_start_matches('/')
    );
    let limit = request.limit.to_string();
    let offset = request.offset.to_string();

    let params = request
        .filters
        .pairs()
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .chain([("limit", limit.as_str()), ("offset", offset.as_str())]);

    Url::parse_with_params(&raw, params).map_err(|e| Error::Endpoint {
        url: raw.clone(),
        reason: e.to_string(),
    })
}
