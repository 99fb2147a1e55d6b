//! # Analysis API
//!
//! High-level entry point that runs the whole aggregation pipeline against a
//! `SastPlatform` and fills an `AggregationStore`.
//!
//! ```text
//! discover_scans ──► dedup ──► branch filter ──► LatestScanSelection
//!                                                      │
//!              ┌───────────── per project ─────────────┘
//!              ▼
//!      classify_scan ──► CounterFilter ──► AggregationStore::upsert_all
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use analysis_kit::analysis_api::{run_analysis, AnalysisOptions};
//! use analysis_kit::store::AggregationStore;
//!
//! let mut store = AggregationStore::in_memory()?;
//! let report = run_analysis(&client, &options, &mut store)?;
//! for skipped in report.skipped() {
//!     println!("{}: {:?}", skipped.project_id, skipped.status);
//! }
//! ```
//!
//! Scan discovery failing is fatal. Anything that goes wrong for a single
//! project is recorded in its `ProjectOutcome` and the loop moves on.

use serde::Serialize;

use crate::classifier::{classify_scan, CounterSource};
use crate::collectors::{SastPlatform, UpstreamError};
use crate::discovery::{discover_scans, project_names, DEFAULT_PAGE_LIMIT};
use crate::filter::{BranchFilter, CounterFilter};
use crate::latest::{dedup_scans, retain_branches, LatestScanSelection};
use crate::model::ScanRecord;
use crate::range::TimeRange;
use crate::store::{AggregationRow, AggregationStore};

/// Inputs of one analysis run
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    pub range: TimeRange,
    pub counters: CounterFilter,
    pub branches: BranchFilter,
    pub page_limit: usize,
}

impl AnalysisOptions {
    pub fn new(range: TimeRange) -> Self {
        Self {
            range,
            counters: CounterFilter::default(),
            branches: BranchFilter::Unrestricted,
            page_limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

/// What happened to one selected project
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectOutcome {
    pub project_id: String,
    pub project_name: String,
    pub branch: String,
    pub scan_id: String,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Aggregated {
        source: String,
        counters_fetched: usize,
        rows_written: usize,
    },
    Skipped {
        reason: String,
    },
}

impl ProjectOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self.status, OutcomeStatus::Skipped { .. })
    }
}

/// Summary of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub range: TimeRange,
    pub scans_discovered: usize,
    pub projects_selected: usize,
    pub outcomes: Vec<ProjectOutcome>,
}

impl RunReport {
    pub fn skipped(&self) -> impl Iterator<Item = &ProjectOutcome> {
        self.outcomes.iter().filter(|o| o.is_skipped())
    }

    pub fn rows_written(&self) -> usize {
        self.outcomes
            .iter()
            .map(|o| match o.status {
                OutcomeStatus::Aggregated { rows_written, .. } => rows_written,
                OutcomeStatus::Skipped { .. } => 0,
            })
            .sum()
    }
}

/// Run discovery, selection, classification and aggregation
pub fn run_analysis<P>(
    platform: &P,
    options: &AnalysisOptions,
    store: &mut AggregationStore,
) -> Result<RunReport, AnalysisError>
where
    P: SastPlatform + ?Sized,
{
    let scans = discover_scans(platform, &options.range, options.page_limit)
        .map_err(AnalysisError::ScanDiscovery)?;
    let scans_discovered = scans.len();

    let mut candidates = dedup_scans(scans);
    if let BranchFilter::Only(accepted) = &options.branches {
        candidates = retain_branches(candidates, accepted);
        log::info!("{} scan(s) on accepted branches", candidates.len());
    }

    let selection = LatestScanSelection::from_scans(candidates);
    log::info!(
        "Number of projects within the date range: {}",
        selection.len()
    );

    let names = match project_names(platform, &selection.project_ids(), options.page_limit) {
        Ok(names) => names,
        Err(e) => {
            log::warn!("Failed to resolve project names, using ids instead: {}", e);
            Default::default()
        }
    };

    let mut outcomes = Vec::with_capacity(selection.len());
    for scan in selection.iter() {
        let project_name = names
            .get(&scan.project_id)
            .cloned()
            .unwrap_or_else(|| scan.project_id.clone());
        let status = aggregate_project(platform, options, store, scan, &project_name);

        match &status {
            OutcomeStatus::Aggregated { rows_written, .. } => log::info!(
                "Finished project {} ({}), branch {}: {} row(s) written",
                project_name,
                scan.project_id,
                scan.branch,
                rows_written
            ),
            OutcomeStatus::Skipped { reason } => log::warn!(
                "Skipped project {} ({}), branch {}: {}",
                project_name,
                scan.project_id,
                scan.branch,
                reason
            ),
        }

        outcomes.push(ProjectOutcome {
            project_id: scan.project_id.clone(),
            project_name,
            branch: scan.branch.clone(),
            scan_id: scan.scan_id.clone(),
            status,
        });
    }

    Ok(RunReport {
        range: options.range,
        scans_discovered,
        projects_selected: selection.len(),
        outcomes,
    })
}

fn aggregate_project<P>(
    platform: &P,
    options: &AnalysisOptions,
    store: &mut AggregationStore,
    scan: &ScanRecord,
    project_name: &str,
) -> OutcomeStatus
where
    P: SastPlatform + ?Sized,
{
    log::info!(
        "Fetching counters for project {} (scan {})",
        scan.project_id,
        scan.scan_id
    );

    let classification = match classify_scan(platform, &scan.scan_id) {
        Ok(classification) => classification,
        Err(e) => {
            return OutcomeStatus::Skipped {
                reason: e.to_string(),
            }
        }
    };
    let counters_fetched = classification.counters.len();

    let rows: Vec<AggregationRow> = options
        .counters
        .apply(classification.counters)
        .into_iter()
        .map(|counter| AggregationRow {
            project_id: scan.project_id.clone(),
            project_name: project_name.to_string(),
            branch: scan.branch.clone(),
            scan_id: scan.scan_id.clone(),
            query_name: counter.query_name,
            severity: counter.severity.to_lowercase(),
            quantity: counter.count,
        })
        .collect();

    match store.upsert_all(&rows) {
        Ok(rows_written) => OutcomeStatus::Aggregated {
            source: source_name(classification.source).to_string(),
            counters_fetched,
            rows_written,
        },
        Err(e) => OutcomeStatus::Skipped {
            reason: e.to_string(),
        },
    }
}

fn source_name(source: CounterSource) -> &'static str {
    match source {
        CounterSource::Empty => "empty",
        CounterSource::Findings => "findings",
        CounterSource::Summary => "summary",
    }
}

/// Errors that abort a run
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("scan discovery failed: {0}")]
    ScanDiscovery(#[source] UpstreamError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{parse_names, parse_severities};
    use crate::model::Severity;
    use crate::pivot::{build_pivot, PivotLayout};
    use crate::range::{RangeKind, RangeSpec};
    use crate::testing::{counter, scan, FakePlatform};
    use chrono::NaiveDateTime;

    fn options() -> AnalysisOptions {
        let now =
            NaiveDateTime::parse_from_str("2024-01-31 09:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        AnalysisOptions::new(RangeSpec::named(RangeKind::PastMonth).resolve(now).unwrap())
    }

    fn platform() -> FakePlatform {
        let mut platform = FakePlatform::default();
        platform.scans = vec![
            scan("s1", "P1", "master", "2024-01-10T00:00:00.000Z"),
            scan("s2", "P1", "master", "2024-01-20T00:00:00.000Z"),
            scan("s3", "P2", "develop", "2024-01-15T00:00:00.000Z"),
            scan("s2", "P1", "master", "2024-01-20T00:00:00.000Z"),
        ];
        platform.add_project("P1", "payments");
        platform.add_project("P2", "billing");
        platform.add_findings("s2", "SQL_Injection", "HIGH", 5);
        platform.add_findings("s2", "Stored_XSS", "HIGH", 3);
        platform.add_findings("s3", "Weak_Hash", "LOW", 2000);
        platform.summaries.insert(
            "s3".to_string(),
            vec![
                counter("Weak_Hash", "Low", 1800),
                counter("No Results", "Low", 0),
            ],
        );
        platform
    }

    #[test]
    fn test_run_aggregates_latest_scans() {
        let platform = platform();
        let mut store = AggregationStore::in_memory().unwrap();

        let report = run_analysis(&platform, &options(), &mut store).unwrap();

        assert_eq!(report.scans_discovered, 4);
        assert_eq!(report.projects_selected, 2);
        assert_eq!(report.skipped().count(), 0);
        assert_eq!(report.rows_written(), 3);
        assert_eq!(report.outcomes[0].scan_id, "s2");
        assert_eq!(report.outcomes[0].project_name, "payments");
        assert!(matches!(
            report.outcomes[1].status,
            OutcomeStatus::Aggregated { ref source, .. } if source == "summary"
        ));

        let high = store.rows_for_severity("high").unwrap();
        assert_eq!(high.len(), 2);
        assert!(high.iter().all(|r| r.scan_id == "s2"));
        assert_eq!(store.rows_for_severity("low").unwrap()[0].quantity, 1800);
    }

    #[test]
    fn test_failed_project_is_skipped_not_fatal() {
        let mut platform = platform();
        platform.failing_scan_ids.insert("s2".to_string());
        let mut store = AggregationStore::in_memory().unwrap();

        let report = run_analysis(&platform, &options(), &mut store).unwrap();

        let skipped: Vec<&str> = report.skipped().map(|o| o.project_id.as_str()).collect();
        assert_eq!(skipped, vec!["P1"]);
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_outcome_serializes_status_inline() {
        let outcome = ProjectOutcome {
            project_id: "P1".to_string(),
            project_name: "payments".to_string(),
            branch: "master".to_string(),
            scan_id: "s2".to_string(),
            status: OutcomeStatus::Skipped {
                reason: "HTTP 503".to_string(),
            },
        };
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["status"], "skipped");
        assert_eq!(value["reason"], "HTTP 503");
        assert_eq!(value["project_id"], "P1");
    }

    #[test]
    fn test_discovery_failure_is_fatal() {
        let platform = FakePlatform {
            fail_scans: true,
            ..FakePlatform::default()
        };
        let mut store = AggregationStore::in_memory().unwrap();
        let err = run_analysis(&platform, &options(), &mut store).unwrap_err();
        assert!(matches!(err, AnalysisError::ScanDiscovery(_)));
    }

    #[test]
    fn test_project_name_failure_falls_back_to_id() {
        let mut platform = platform();
        platform.fail_projects = true;
        let mut store = AggregationStore::in_memory().unwrap();

        let report = run_analysis(&platform, &options(), &mut store).unwrap();
        assert_eq!(report.outcomes[0].project_name, "P1");
    }

    #[test]
    fn test_filters_and_branches_applied() {
        let platform = platform();
        let mut store = AggregationStore::in_memory().unwrap();
        let mut options = options();
        options.counters = CounterFilter {
            queries: parse_names("SQL_Injection,Weak_Hash"),
            severities: parse_severities("high").unwrap(),
        };
        options.branches = parse_names("master");

        let report = run_analysis(&platform, &options, &mut store).unwrap();

        assert_eq!(report.projects_selected, 1);
        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.query_names("high").unwrap(), vec!["SQL_Injection"]);
    }

    #[test]
    fn test_rerun_overwrites_instead_of_summing() {
        let platform = platform();
        let mut store = AggregationStore::in_memory().unwrap();
        run_analysis(&platform, &options(), &mut store).unwrap();
        run_analysis(&platform, &options(), &mut store).unwrap();

        let grid = build_pivot(&store, &[Severity::High], &PivotLayout::default()).unwrap();
        assert_eq!(grid.rows.len(), 1);
        assert_eq!(grid.rows[0].totals[0].value, 8);
    }

    #[test]
    fn test_no_scans_gives_empty_report() {
        let platform = FakePlatform::default();
        let mut store = AggregationStore::in_memory().unwrap();
        let report = run_analysis(&platform, &options(), &mut store).unwrap();
        assert!(report.outcomes.is_empty());
        assert!(store.is_empty().unwrap());
    }
}
