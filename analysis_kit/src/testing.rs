//! In-memory platform used by unit tests

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::collectors::{
    FindingLister, Page, ProjectLister, ScanLister, ScanSummaryProvider, UpstreamError,
};
use crate::model::{Finding, Project, QueryCounter, ScanRecord, ScanSummary, TO_VERIFY_STATE};

pub fn timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .expect("valid RFC 3339 timestamp")
        .with_timezone(&Utc)
}

pub fn scan(scan_id: &str, project_id: &str, branch: &str, created_at: &str) -> ScanRecord {
    ScanRecord {
        scan_id: scan_id.to_string(),
        project_id: project_id.to_string(),
        branch: branch.to_string(),
        created_at: timestamp(created_at),
        updated_at: timestamp(created_at),
    }
}

pub fn finding(query_id: &str, query_name: &str, severity: &str, state: &str) -> Finding {
    Finding {
        query_id: query_id.to_string(),
        query_name: query_name.to_string(),
        severity: severity.to_string(),
        state: state.to_string(),
    }
}

pub fn counter(query_name: &str, severity: &str, count: u64) -> QueryCounter {
    QueryCounter {
        query_id: format!("q-{}", query_name),
        query_name: query_name.to_string(),
        severity: severity.to_string(),
        count,
    }
}

/// Platform backed by plain collections
#[derive(Default)]
pub struct FakePlatform {
    pub scans: Vec<ScanRecord>,
    pub findings: HashMap<String, Vec<Finding>>,
    pub summaries: HashMap<String, Vec<QueryCounter>>,
    pub projects: Vec<Project>,
    pub fail_scans: bool,
    pub fail_projects: bool,
    pub failing_scan_ids: HashSet<String>,
    /// Return findings in every state, as a server ignoring `state` would
    pub ignore_state_filter: bool,
    pub scan_page_requests: Cell<usize>,
    pub finding_page_requests: Cell<usize>,
    pub summary_calls: RefCell<Vec<String>>,
}

impl FakePlatform {
    pub fn add_project(&mut self, id: &str, name: &str) {
        self.projects.push(Project {
            id: id.to_string(),
            name: name.to_string(),
        });
    }

    /// Add `count` to-verify findings for one query
    pub fn add_findings(&mut self, scan_id: &str, query_name: &str, severity: &str, count: usize) {
        let entry = self.findings.entry(scan_id.to_string()).or_default();
        for _ in 0..count {
            entry.push(finding(
                &format!("q-{}", query_name),
                query_name,
                severity,
                TO_VERIFY_STATE,
            ));
        }
    }

    fn unavailable(&self, what: &str) -> UpstreamError {
        UpstreamError::Transport {
            url: format!("fake://{}", what),
            message: "connection refused".to_string(),
        }
    }
}

fn page<T: Clone>(items: &[T], offset: usize, limit: usize) -> Page<T> {
    let start = offset.min(items.len());
    let end = (offset + limit).min(items.len());
    Page::new(items[start..end].to_vec(), items.len())
}

impl ScanLister for FakePlatform {
    fn list_scans(
        &self,
        _from: NaiveDateTime,
        _to: NaiveDateTime,
        offset: usize,
        limit: usize,
    ) -> Result<Page<ScanRecord>, UpstreamError> {
        if self.fail_scans {
            return Err(self.unavailable("scans"));
        }
        self.scan_page_requests.set(self.scan_page_requests.get() + 1);
        Ok(page(&self.scans, offset, limit))
    }
}

impl FindingLister for FakePlatform {
    fn list_findings(
        &self,
        scan_id: &str,
        state: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Page<Finding>, UpstreamError> {
        if self.failing_scan_ids.contains(scan_id) {
            return Err(self.unavailable("sast-results"));
        }
        self.finding_page_requests
            .set(self.finding_page_requests.get() + 1);
        let matching: Vec<Finding> = self
            .findings
            .get(scan_id)
            .map(|all| {
                all.iter()
                    .filter(|f| self.ignore_state_filter || f.state == state)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(page(&matching, offset, limit))
    }
}

impl ScanSummaryProvider for FakePlatform {
    fn summarize(&self, scan_ids: &[String]) -> Result<Vec<ScanSummary>, UpstreamError> {
        self.summary_calls.borrow_mut().extend(scan_ids.iter().cloned());
        Ok(scan_ids
            .iter()
            .filter_map(|id| {
                self.summaries.get(id).map(|counters| ScanSummary {
                    scan_id: id.clone(),
                    query_counters: counters.clone(),
                })
            })
            .collect())
    }
}

impl ProjectLister for FakePlatform {
    fn list_projects(
        &self,
        ids: &[String],
        offset: usize,
        limit: usize,
    ) -> Result<Page<Project>, UpstreamError> {
        if self.fail_projects {
            return Err(self.unavailable("projects"));
        }
        let matching: Vec<Project> = self
            .projects
            .iter()
            .filter(|p| ids.is_empty() || ids.contains(&p.id))
            .cloned()
            .collect();
        Ok(page(&matching, offset, limit))
    }
}
