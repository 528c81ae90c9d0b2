//! Offset/limit pagination over a FAC endpoint.
//!
//! The fetcher asks its [`PageSource`] for `page_size` rows at a time,
//! starting at offset 0, until a page comes back empty.

use crate::error::{Error, Result};
use futures::future::BoxFuture;
use indicatif::{ProgressBar, ProgressStyle};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Equality filters sent as `field=eq.value` query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterParams {
    pairs: Vec<(String, String)>,
}

impl FilterParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field` to equal `value`.
    pub fn filter(mut self, field: impl Into<String>, value: impl AsRef<str>) -> Self {
        self.pairs
            .push((field.into(), format!("eq.{}", value.as_ref())));
        self
    }

    /// Add an equality filter only when `value` is set.
    pub fn filter_opt(self, field: impl Into<String>, value: Option<impl AsRef<str>>) -> Self {
        match value {
            Some(value) => self.filter(field, value),
            None => self,
        }
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// One page request.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest<'a> {
    pub endpoint: &'a str,
    pub filters: &'a FilterParams,
    pub limit: usize,
    pub offset: usize,
}

/// Rows returned for one page, with the URL they came from.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub url: String,
    pub rows: Vec<Value>,
}

/// Something that can answer page requests: the HTTP client in production,
/// an in-memory table in tests.
pub trait PageSource {
    fn fetch_page<'a>(&'a self, request: PageRequest<'a>) -> BoxFuture<'a, Result<Page>>;
}

impl<S: PageSource + ?Sized> PageSource for &S {
    fn fetch_page<'a>(&'a self, request: PageRequest<'a>) -> BoxFuture<'a, Result<Page>> {
        (**self).fetch_page(request)
    }
}

/// Retry policy for transport failures. HTTP status failures are never retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based): base * 2^attempt, capped.
    pub fn delay(&self, attempt: usize) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16) as u32);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Paginated fetcher over a [`PageSource`].
pub struct Fetcher<S> {
    source: S,
    page_size: usize,
    retry: RetryPolicy,
    show_progress: bool,
}

impl<S: PageSource> Fetcher<S> {
    /// Create a fetcher. A `page_size` of zero is treated as one.
    pub fn new(source: S, page_size: usize) -> Self {
        Self {
            source,
            page_size: page_size.max(1),
            retry: RetryPolicy::default(),
            show_progress: false,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Fetch every record of `endpoint` matching `filters`.
    ///
    /// Pages are requested sequentially until one comes back empty. Any
    /// error aborts the whole fetch; nothing fetched so far is returned.
    pub async fn fetch<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        filters: &FilterParams,
    ) -> Result<Vec<T>> {
        if filters.is_empty() {
            debug!("Fetching all of {}", endpoint);
        } else {
            debug!("Fetching {} with filters {:?}", endpoint, filters.pairs());
        }
        let progress = self.progress_bar(endpoint);
        let mut pages: Vec<Vec<T>> = Vec::new();
        let mut total = 0usize;
        let mut offset = 0usize;

        loop {
            let request = PageRequest {
                endpoint,
                filters,
                limit: self.page_size,
                offset,
            };
            let page = self.fetch_page_with_retry(request).await.inspect_err(|_| {
                progress.abandon();
            })?;

            if page.rows.is_empty() {
                debug!("Empty page from {}, done", page.url);
                break;
            }

            if page.rows.len() > self.page_size {
                warn!(
                    "{} returned {} rows for a page size of {}",
                    page.url,
                    page.rows.len(),
                    self.page_size
                );
            }

            let batch = decode_rows::<T>(&page)?;
            total += batch.len();
            debug!("Fetched {} records at offset {} ({} so far)", batch.len(), offset, total);
            pages.push(batch);
            offset += self.page_size;

            progress.set_message(format!("{}: {} records", endpoint, total));
        }

        progress.finish_and_clear();

        let mut records = Vec::with_capacity(total);
        for batch in pages {
            records.extend(batch);
        }
        info!("Fetched {} {} records in total", records.len(), endpoint);
        Ok(records)
    }

    async fn fetch_page_with_retry(&self, request: PageRequest<'_>) -> Result<Page> {
        let mut attempt = 0;
        loop {
            match self.source.fetch_page(request).await {
                Ok(page) => return Ok(page),
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay(attempt);
                    warn!(
                        "{}, retrying after {:?} (attempt {}/{})",
                        e,
                        delay,
                        attempt + 1,
                        self.retry.max_retries
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn progress_bar(&self, endpoint: &str) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new_spinner();
        if let Ok(style) =
            ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")
        {
            pb.set_style(style);
        }
        pb.set_message(format!("{}: fetching", endpoint));
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    }
}

fn decode_rows<T: DeserializeOwned>(page: &Page) -> Result<Vec<T>> {
    page.rows
        .iter()
        .enumerate()
        .map(|(idx, row)| {
            T::deserialize(row).map_err(|e| {
                Error::parse(format!("row {} of {}", idx, page.url), &row.to_string(), e)
            })
        })
        .collect()
}
