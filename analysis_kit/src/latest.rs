//! Latest-scan-per-project selection

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::model::ScanRecord;

/// One authoritative scan per project
///
/// For every project present, no input scan of the same project has a
/// strictly later `created_at`. Equal timestamps keep the first scan seen.
/// Iteration follows the order in which projects were first seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LatestScanSelection {
    scans: Vec<ScanRecord>,
    index: HashMap<String, usize>,
}

impl LatestScanSelection {
    /// Reduce `scans` in a single pass
    pub fn from_scans<I>(scans: I) -> Self
    where
        I: IntoIterator<Item = ScanRecord>,
    {
        let mut selection = Self::default();
        for scan in scans {
            selection.offer(scan);
        }
        selection
    }

    fn offer(&mut self, scan: ScanRecord) {
        match self.index.get(&scan.project_id) {
            Some(&slot) => {
                if scan.created_at > self.scans[slot].created_at {
                    self.scans[slot] = scan;
                }
            }
            None => {
                self.index.insert(scan.project_id.clone(), self.scans.len());
                self.scans.push(scan);
            }
        }
    }

    pub fn get(&self, project_id: &str) -> Option<&ScanRecord> {
        self.index.get(project_id).map(|&slot| &self.scans[slot])
    }

    pub fn len(&self) -> usize {
        self.scans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scans.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScanRecord> {
        self.scans.iter()
    }

    pub fn project_ids(&self) -> Vec<String> {
        self.scans.iter().map(|s| s.project_id.clone()).collect()
    }
}

/// Drop repeated (scan id, project id, branch, created at) tuples, keeping
/// the first occurrence and the input order
pub fn dedup_scans(scans: Vec<ScanRecord>) -> Vec<ScanRecord> {
    let mut seen: HashSet<(String, String, String, DateTime<Utc>)> = HashSet::new();
    scans
        .into_iter()
        .filter(|scan| {
            seen.insert((
                scan.scan_id.clone(),
                scan.project_id.clone(),
                scan.branch.clone(),
                scan.created_at,
            ))
        })
        .collect()
}

/// Keep only scans on one of the accepted branches
pub fn retain_branches(scans: Vec<ScanRecord>, accepted: &HashSet<String>) -> Vec<ScanRecord> {
    scans
        .into_iter()
        .filter(|scan| accepted.contains(&scan.branch))
        .collect()
}
