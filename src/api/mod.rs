//! FAC API access.
//!
//! This module provides the paginated fetcher and the HTTP page source it
//! runs against in production.

pub mod client;
pub mod fetcher;

pub use client::{ClientConfig, FacClient};
pub use fetcher::{FilterParams, Fetcher, PageSource, RetryPolicy};

/// Filters for the `general` endpoint.
pub fn general_filters(auditor_ein: Option<&str>) -> FilterParams {
    FilterParams::new().filter_opt("auditor_ein", auditor_ein)
}

/// Filters for the `federal_awards` endpoint. Only major programs are fetched.
pub fn award_filters(audit_year: Option<&str>) -> FilterParams {
    FilterParams::new()
        .filter("is_major", "Y")
        .filter_opt("audit_year", audit_year)
}
