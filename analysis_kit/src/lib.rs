//! # Analysis Kit
//!
//! Building blocks for SAST data analysis against Checkmarx One.
//! Finds the latest scan of every project in a time window, reduces its
//! to-verify findings to per-query counts and lays them out as a
//! severity-grouped pivot.
//!
//! ## Modules
//!
//! - `range` - Named and custom time windows
//! - `collectors` - Platform traits and the CxOne HTTP client
//! - `discovery` - Scan listing and project name lookup
//! - `latest` - Latest-scan-per-project selection
//! - `classifier` - Findings to query counters, with summary fallback
//! - `filter` - Query, severity and branch allowlists
//! - `store` - In-memory SQLite aggregation table
//! - `pivot` - Pivot grid and the sink trait
//! - `analysis_api` - High-level pipeline entry point
//!
//! ## Usage
//!
//! ```rust,ignore
//! use analysis_kit::analysis_api::{run_analysis, AnalysisOptions};
//! use analysis_kit::collectors::{CxOneClient, CxOneSettings};
//! use analysis_kit::model::Severity;
//! use analysis_kit::pivot::{build_pivot, PivotLayout};
//! use analysis_kit::range::{RangeKind, RangeSpec};
//! use analysis_kit::store::AggregationStore;
//!
//! let range = RangeSpec::named(RangeKind::PastWeek).resolve(now)?;
//! let client = CxOneClient::new(&settings)?;
//! let mut store = AggregationStore::in_memory()?;
//!
//! let report = run_analysis(&client, &AnalysisOptions::new(range), &mut store)?;
//! let grid = build_pivot(&store, &Severity::ALL, &PivotLayout::default())?;
//! ```

pub mod analysis_api;
pub mod classifier;
pub mod collectors;
pub mod discovery;
pub mod filter;
pub mod latest;
pub mod model;
pub mod pivot;
pub mod range;
pub mod store;

#[cfg(test)]
mod testing;
