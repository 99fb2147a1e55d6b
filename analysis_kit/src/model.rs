//! Core data types shared by every pipeline stage
//!
//! Records coming from the platform (`ScanRecord`, `Finding`, `Project`),
//! the derived `QueryCounter`, and the `Severity` scale.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Finding state that counts towards a query counter
pub const TO_VERIFY_STATE: &str = "TO_VERIFY";

/// Query name the platform uses for an empty summary entry
pub const NO_RESULTS_QUERY: &str = "No Results";

/// One scan execution as listed by the platform
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanRecord {
    pub scan_id: String,
    pub project_id: String,
    pub branch: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One reported issue instance within a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub query_id: String,
    pub query_name: String,
    pub severity: String,
    pub state: String,
}

/// Project id and display name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub id: String,
    pub name: String,
}

/// Number of findings for one query within one scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryCounter {
    pub query_id: String,
    pub query_name: String,
    pub severity: String,
    pub count: u64,
}

/// Pre-aggregated counters for one scan, as reported by the summary endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    pub scan_id: String,
    pub query_counters: Vec<QueryCounter>,
}

/// Severity scale of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    /// Every known severity, most severe first
    pub const ALL: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Info,
    ];

    /// Lowercase name, as stored in the aggregation table
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for a severity name outside the known scale
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown severity '{0}', expected one of: critical, high, medium, low, info")]
pub struct UnknownSeverity(pub String);

impl FromStr for Severity {
    type Err = UnknownSeverity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "critical" => Ok(Severity::Critical),
            "high" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" => Ok(Severity::Low),
            "info" => Ok(Severity::Info),
            _ => Err(UnknownSeverity(s.trim().to_string())),
        }
    }
}
