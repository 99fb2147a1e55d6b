//! # Platform Collectors
//!
//! Traits for the four SAST platform endpoints the pipeline reads from,
//! plus the CxOne HTTP implementation.
//!
//! Every collection endpoint is offset-paginated and reports a total count
//! alongside each page; `fetch_all_pages` drains one to completion.

pub mod cxone;

pub use cxone::{AuthGrant, CxOneClient, CxOneSettings};

use chrono::NaiveDateTime;

use crate::model::{Finding, Project, ScanRecord, ScanSummary};

/// One page of a paginated collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Total number of items across all pages, as reported upstream
    pub total_count: usize,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total_count: usize) -> Self {
        Self { items, total_count }
    }
}

/// Lists scans created within a window
pub trait ScanLister {
    fn list_scans(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
        offset: usize,
        limit: usize,
    ) -> Result<Page<ScanRecord>, UpstreamError>;
}

/// Lists findings of one scan, filtered by state
pub trait FindingLister {
    fn list_findings(
        &self,
        scan_id: &str,
        state: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Page<Finding>, UpstreamError>;
}

/// Pre-aggregated per-query counters, queries always included
pub trait ScanSummaryProvider {
    fn summarize(&self, scan_ids: &[String]) -> Result<Vec<ScanSummary>, UpstreamError>;
}

/// Lists projects, optionally restricted to the given ids
pub trait ProjectLister {
    fn list_projects(
        &self,
        ids: &[String],
        offset: usize,
        limit: usize,
    ) -> Result<Page<Project>, UpstreamError>;
}

/// Everything the pipeline needs from the platform
pub trait SastPlatform: ScanLister + FindingLister + ScanSummaryProvider + ProjectLister {}

impl<T> SastPlatform for T where T: ScanLister + FindingLister + ScanSummaryProvider + ProjectLister {}

/// Request pages until the cumulative count reaches the reported total.
///
/// The total is re-read from every page. An empty page ends the loop early
/// so a shrinking collection cannot spin forever.
pub fn fetch_all_pages<T, F>(limit: usize, mut fetch: F) -> Result<Vec<T>, UpstreamError>
where
    F: FnMut(usize, usize) -> Result<Page<T>, UpstreamError>,
{
    let mut items = Vec::new();
    let mut offset = 0;

    loop {
        let page = fetch(offset, limit)?;
        let total = page.total_count;
        let received = page.items.len();
        items.extend(page.items);
        offset += received;

        if received == 0 || items.len() >= total {
            if received == 0 && items.len() < total {
                log::warn!(
                    "Collection ended early: received {} of {} reported item(s)",
                    items.len(),
                    total
                );
            }
            break;
        }
    }

    Ok(items)
}

/// Errors from the platform API
///
/// Any of these means the upstream was unavailable for that call. They are
/// never retried here.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("{url} returned HTTP {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("invalid client configuration: {0}")]
    Config(String),
}
