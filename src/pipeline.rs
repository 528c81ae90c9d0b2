//! Dataset loading: snapshot reuse or paginated fetch, per dataset.

use crate::api::{award_filters, general_filters, FilterParams, Fetcher, PageSource};
use crate::cache::SnapshotStore;
use crate::error::Result;
use crate::models::{AwardRecord, GeneralRecord};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

/// Snapshot name of the general dataset.
pub const GENERAL_DATASET: &str = "general";
/// Snapshot name of the award dataset.
pub const AWARDS_DATASET: &str = "federal_awards";

/// Endpoint paths relative to the API base URL.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub general: String,
    pub awards: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            general: GENERAL_DATASET.to_string(),
            awards: AWARDS_DATASET.to_string(),
        }
    }
}

/// What to load.
#[derive(Debug, Clone, Default)]
pub struct DatasetQuery {
    pub auditor_ein: Option<String>,
    pub audit_year: Option<String>,
    pub force_refresh: bool,
}

impl DatasetQuery {
    fn has_filters(&self) -> bool {
        self.auditor_ein.is_some() || self.audit_year.is_some()
    }
}

/// Both datasets, ready to merge.
#[derive(Debug, Clone, Default)]
pub struct Datasets {
    pub general: Vec<GeneralRecord>,
    pub awards: Vec<AwardRecord>,
}

/// Loads datasets through the snapshot store, fetching when needed.
pub struct Pipeline<S> {
    fetcher: Fetcher<S>,
    store: SnapshotStore,
    endpoints: Endpoints,
    refetch_on_corrupt: bool,
}

impl<S: PageSource> Pipeline<S> {
    pub fn new(fetcher: Fetcher<S>, store: SnapshotStore, endpoints: Endpoints) -> Self {
        Self {
            fetcher,
            store,
            endpoints,
            refetch_on_corrupt: true,
        }
    }

    /// Whether a malformed snapshot is replaced by a fresh fetch (default)
    /// or reported as an error.
    pub fn refetch_on_corrupt(mut self, enabled: bool) -> Self {
        self.refetch_on_corrupt = enabled;
        self
    }

    /// Load the general dataset, then the award dataset.
    ///
    /// The first error aborts; the second dataset is not attempted.
    pub async fn load(&self, query: &DatasetQuery) -> Result<Datasets> {
        if query.has_filters() && !query.force_refresh {
            let cached = [GENERAL_DATASET, AWARDS_DATASET]
                .iter()
                .any(|name| self.store.exists(name));
            if cached {
                info!("Snapshots are not keyed by filters; use --force-refresh to apply new filters");
            }
        }

        let general = self
            .load_dataset(
                GENERAL_DATASET,
                &self.endpoints.general,
                &general_filters(query.auditor_ein.as_deref()),
                query.force_refresh,
            )
            .await?;

        let awards = self
            .load_dataset(
                AWARDS_DATASET,
                &self.endpoints.awards,
                &award_filters(query.audit_year.as_deref()),
                query.force_refresh,
            )
            .await?;

        Ok(Datasets { general, awards })
    }

    async fn load_dataset<T>(
        &self,
        name: &str,
        endpoint: &str,
        filters: &FilterParams,
        force_refresh: bool,
    ) -> Result<Vec<T>>
    where
        T: Serialize + DeserializeOwned,
    {
        let result = self
            .store
            .get_dataset(name, || self.fetcher.fetch(endpoint, filters), force_refresh)
            .await;

        match result {
            Err(e)
                if e.is_parse()
                    && self.refetch_on_corrupt
                    && !force_refresh
                    && self.store.exists(name) =>
            {
                warn!("{}", e);
                warn!("Snapshot for {} is unusable, fetching it again", name);
                self.store
                    .get_dataset(name, || self.fetcher.fetch(endpoint, filters), true)
                    .await
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fetcher::{Page, PageRequest};
    use crate::api::RetryPolicy;
    use crate::error::{Error, FetchError};
    use futures::future::BoxFuture;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serves fixed rows per endpoint and records every request URL.
    #[derive(Default)]
    struct FakeApi {
        tables: HashMap<String, Vec<Value>>,
        failing: Option<String>,
        requests: Mutex<Vec<String>>,
    }

    impl FakeApi {
        fn with_table(mut self, endpoint: &str, rows: Value) -> Self {
            let rows = rows.as_array().cloned().unwrap_or_default();
            self.tables.insert(endpoint.to_string(), rows);
            self
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl PageSource for FakeApi {
        fn fetch_page<'a>(&'a self, request: PageRequest<'a>) -> BoxFuture<'a, Result<Page>> {
            Box::pin(async move {
                let query: Vec<String> = request
                    .filters
                    .pairs()
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect();
                let url = format!(
                    "fake://{}?{}&limit={}&offset={}",
                    request.endpoint,
                    query.join("&"),
                    request.limit,
                    request.offset
                );
                self.requests.lock().unwrap().push(url.clone());

                if self.failing.as_deref() == Some(request.endpoint) {
                    return Err(FetchError {
                        url,
                        status: 503,
                        body: "unavailable".to_string(),
                    }
                    .into());
                }

                let rows = self
                    .tables
                    .get(request.endpoint)
                    .map(|rows| {
                        rows.iter()
                            .skip(request.offset)
                            .take(request.limit)
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(Page { url, rows })
            })
        }
    }

    fn fake_api() -> FakeApi {
        FakeApi::default()
            .with_table(
                "general",
                json!([
                    { "report_id": 1, "auditor_ein": "A" },
                    { "report_id": 2, "auditor_ein": "B" }
                ]),
            )
            .with_table(
                "federal_awards",
                json!([
                    { "report_id": 1, "federal_program_name": "P", "federal_agency_prefix": "10",
                      "federal_award_extension": "001", "amount_expended": 100, "findings_count": 0 },
                    { "report_id": 1, "federal_program_name": "P", "federal_agency_prefix": "10",
                      "federal_award_extension": "001", "amount_expended": 50, "findings_count": 2 }
                ]),
            )
    }

    fn pipeline<'a>(api: &'a FakeApi, dir: &TempDir) -> Pipeline<&'a FakeApi> {
        Pipeline::new(
            Fetcher::new(api, 1).with_retry(RetryPolicy::none()),
            SnapshotStore::new(dir.path()),
            Endpoints::default(),
        )
    }

    #[tokio::test]
    async fn test_first_run_fetches_and_persists() {
        let dir = TempDir::new().unwrap();
        let api = fake_api();

        let data = pipeline(&api, &dir).load(&DatasetQuery::default()).await.unwrap();

        assert_eq!(data.general.len(), 2);
        assert_eq!(data.awards.len(), 2);
        // general: 2 rows / page size 1 -> 3 requests; awards: 2 -> 3
        assert_eq!(api.requests().len(), 6);
        assert!(dir.path().join("general_data.json").exists());
        assert!(dir.path().join("federal_awards_data.json").exists());
    }

    #[tokio::test]
    async fn test_second_run_reuses_snapshots() {
        let dir = TempDir::new().unwrap();
        let api = fake_api();
        let first = pipeline(&api, &dir).load(&DatasetQuery::default()).await.unwrap();
        let before = api.requests().len();

        let second = pipeline(&api, &dir).load(&DatasetQuery::default()).await.unwrap();

        assert_eq!(api.requests().len(), before);
        assert_eq!(first.general, second.general);
        assert_eq!(first.awards, second.awards);
    }

    #[tokio::test]
    async fn test_force_refresh_fetches_again_with_filters() {
        let dir = TempDir::new().unwrap();
        let api = fake_api();
        pipeline(&api, &dir).load(&DatasetQuery::default()).await.unwrap();
        let before = api.requests().len();

        let query = DatasetQuery {
            auditor_ein: Some("A".to_string()),
            audit_year: Some("2023".to_string()),
            force_refresh: true,
        };
        pipeline(&api, &dir).load(&query).await.unwrap();

        let requests = api.requests();
        assert!(requests.len() > before);
        assert!(requests[before].starts_with("fake://general?auditor_ein=eq.A&limit=1&offset=0"));
        assert!(requests
            .iter()
            .skip(before)
            .any(|url| url.starts_with("fake://federal_awards?is_major=eq.Y&audit_year=eq.2023")));
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_refetched() {
        let dir = TempDir::new().unwrap();
        let api = fake_api();
        std::fs::write(dir.path().join("general_data.json"), "[{\"report_id\": ").unwrap();

        let data = pipeline(&api, &dir).load(&DatasetQuery::default()).await.unwrap();

        assert_eq!(data.general.len(), 2);
        let healed: Vec<GeneralRecord> = SnapshotStore::new(dir.path()).load("general").unwrap();
        assert_eq!(healed, data.general);
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_fatal_when_refetch_disabled() {
        let dir = TempDir::new().unwrap();
        let api = fake_api();
        std::fs::write(dir.path().join("general_data.json"), "not json").unwrap();

        let err = pipeline(&api, &dir)
            .refetch_on_corrupt(false)
            .load(&DatasetQuery::default())
            .await
            .unwrap_err();

        assert!(err.is_parse());
        assert!(api.requests().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_error_aborts_before_second_dataset() {
        let dir = TempDir::new().unwrap();
        let mut api = fake_api();
        api.failing = Some("general".to_string());

        let err = pipeline(&api, &dir)
            .load(&DatasetQuery::default())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Fetch(FetchError { status: 503, .. })));
        assert_eq!(api.requests().len(), 1);
        assert!(!dir.path().join("general_data.json").exists());
        assert!(!dir.path().join("federal_awards_data.json").exists());
    }
}
