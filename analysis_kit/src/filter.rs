//! Severity, query and branch allowlists

use std::collections::HashSet;

use crate::model::{QueryCounter, Severity, UnknownSeverity, NO_RESULTS_QUERY};

/// Sentinel accepted in place of a list, meaning "no restriction"
pub const ALL_SENTINEL: &str = "ALL";

/// Either everything passes or only the listed names do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Allowlist<T: Eq + std::hash::Hash> {
    Unrestricted,
    Only(HashSet<T>),
}

impl<T: Eq + std::hash::Hash> Allowlist<T> {
    pub fn allows(&self, value: &T) -> bool {
        match self {
            Allowlist::Unrestricted => true,
            Allowlist::Only(set) => set.contains(value),
        }
    }
}

/// Exact-match query names
pub type QueryFilter = Allowlist<String>;

/// Known severities
pub type SeverityFilter = Allowlist<Severity>;

/// Exact-match branch names
pub type BranchFilter = Allowlist<String>;

/// Parse a comma-separated list of names, or `ALL`
pub fn parse_names(value: &str) -> Allowlist<String> {
    if value.trim() == ALL_SENTINEL {
        return Allowlist::Unrestricted;
    }
    Allowlist::Only(
        value
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

/// Parse a comma-separated, case-insensitive list of severities, or `ALL`
pub fn parse_severities(value: &str) -> Result<SeverityFilter, UnknownSeverity> {
    if value.trim() == ALL_SENTINEL {
        return Ok(Allowlist::Unrestricted);
    }
    value
        .split(',')
        .filter(|item| !item.trim().is_empty())
        .map(str::parse::<Severity>)
        .collect::<Result<HashSet<_>, _>>()
        .map(Allowlist::Only)
}

impl SeverityFilter {
    /// Severities to render, most severe first
    pub fn render_order(&self) -> Vec<Severity> {
        Severity::ALL
            .iter()
            .copied()
            .filter(|severity| self.allows(severity))
            .collect()
    }

    /// Check a raw severity string from the platform
    pub fn allows_name(&self, severity: &str) -> bool {
        match self {
            Allowlist::Unrestricted => true,
            Allowlist::Only(_) => severity
                .parse::<Severity>()
                .map(|parsed| self.allows(&parsed))
                .unwrap_or(false),
        }
    }
}

/// Query and severity criteria applied before persisting counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterFilter {
    pub queries: QueryFilter,
    pub severities: SeverityFilter,
}

impl Default for CounterFilter {
    fn default() -> Self {
        Self {
            queries: Allowlist::Unrestricted,
            severities: Allowlist::Unrestricted,
        }
    }
}

impl CounterFilter {
    pub fn accepts(&self, counter: &QueryCounter) -> bool {
        counter.query_name != NO_RESULTS_QUERY
            && self.queries.allows(&counter.query_name)
            && self.severities.allows_name(&counter.severity)
    }

    /// Keep the accepted counters, preserving their order
    pub fn apply(&self, counters: Vec<QueryCounter>) -> Vec<QueryCounter> {
        counters.into_iter().filter(|c| self.accepts(c)).collect()
    }
}
