//! Finding classification
//!
//! Reduces the findings of one scan to per-query counters. Enumerating
//! findings gives exact to-verify counts but gets expensive, so it only runs
//! up to `FINDING_CEILING` findings; beyond that, or when enumeration yields
//! nothing countable, the pre-aggregated scan summary is used instead.

use std::collections::HashMap;

use crate::collectors::{fetch_all_pages, FindingLister, ScanSummaryProvider, UpstreamError};
use crate::model::{Finding, QueryCounter, TO_VERIFY_STATE};

/// Largest finding total still counted one by one
pub const FINDING_CEILING: usize = 1000;

/// Page size for the findings endpoint
pub const FINDING_PAGE_LIMIT: usize = 100;

/// Where a scan's counters came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterSource {
    /// The scan has no to-verify findings
    Empty,
    /// Counted from individual findings
    Findings,
    /// Taken from the scan summary endpoint
    Summary,
}

/// Counters for one scan with their source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub source: CounterSource,
    pub counters: Vec<QueryCounter>,
}

/// Classify the findings of `scan_id`
pub fn classify_scan<P>(platform: &P, scan_id: &str) -> Result<Classification, UpstreamError>
where
    P: FindingLister + ScanSummaryProvider + ?Sized,
{
    let first = platform.list_findings(scan_id, TO_VERIFY_STATE, 0, FINDING_PAGE_LIMIT)?;
    let total = first.total_count;

    if total == 0 {
        log::debug!("Scan {} has no to-verify findings", scan_id);
        return Ok(Classification {
            source: CounterSource::Empty,
            counters: Vec::new(),
        });
    }

    if total <= FINDING_CEILING {
        let mut first_page = Some(first);
        let findings = fetch_all_pages(FINDING_PAGE_LIMIT, |offset, limit| {
            match first_page.take() {
                Some(page) => Ok(page),
                None => platform.list_findings(scan_id, TO_VERIFY_STATE, offset, limit),
            }
        })?;

        let counters = count_to_verify(&findings);
        if !counters.is_empty() {
            log::debug!(
                "Scan {}: {} finding(s) counted into {} query counter(s)",
                scan_id,
                findings.len(),
                counters.len()
            );
            return Ok(Classification {
                source: CounterSource::Findings,
                counters,
            });
        }
        log::debug!(
            "Scan {}: no countable findings among {}, using scan summary",
            scan_id,
            findings.len()
        );
    } else {
        log::debug!(
            "Scan {}: {} findings exceed the ceiling of {}, using scan summary",
            scan_id,
            total,
            FINDING_CEILING
        );
    }

    let counters = summary_counters(platform, scan_id)?;
    Ok(Classification {
        source: CounterSource::Summary,
        counters,
    })
}

/// Group findings by query id, counting only to-verify findings
///
/// The first finding seen for a query supplies its name and severity.
pub fn count_to_verify(findings: &[Finding]) -> Vec<QueryCounter> {
    let mut counters: Vec<QueryCounter> = Vec::new();
    let mut slots: HashMap<&str, usize> = HashMap::new();

    for finding in findings.iter().filter(|f| f.state == TO_VERIFY_STATE) {
        match slots.get(finding.query_id.as_str()) {
            Some(&slot) => counters[slot].count += 1,
            None => {
                slots.insert(finding.query_id.as_str(), counters.len());
                counters.push(QueryCounter {
                    query_id: finding.query_id.clone(),
                    query_name: finding.query_name.clone(),
                    severity: finding.severity.clone(),
                    count: 1,
                });
            }
        }
    }

    counters
}

fn summary_counters<P>(platform: &P, scan_id: &str) -> Result<Vec<QueryCounter>, UpstreamError>
where
    P: ScanSummaryProvider + ?Sized,
{
    let summaries = platform.summarize(&[scan_id.to_string()])?;
    let summary = summaries
        .iter()
        .find(|s| s.scan_id == scan_id)
        .or_else(|| summaries.first());

    match summary {
        Some(summary) => Ok(summary.query_counters.clone()),
        None => {
            log::debug!("Scan {}: summary endpoint returned nothing", scan_id);
            Ok(Vec::new())
        }
    }
}
