//! Pivot report builder
//!
//! Lays the aggregation store out as a two-level header grid:
//!
//! ```text
//!            | Branch | URL |      high       | high total |  medium  | medium total
//!            |        |     | SQLi   | XSS    |            | Weak_... |
//! -----------+--------+-----+--------+--------+------------+----------+-------------
//! payments   | master | ... |   5    |   3    | =SUM(D3:E3)|          |
//! ```
//!
//! Rows are keyed by (project id, branch) in the order they are first met
//! while walking severities. Each severity with at least one query gets a
//! contiguous block of query columns followed by a total column.

use std::collections::HashMap;

use serde::Serialize;

use crate::model::Severity;
use crate::store::{AggregationStore, StoreError};

/// Header rows above the data
pub const HEADER_ROWS: u32 = 2;

/// Layout options for the grid
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PivotLayout {
    /// Base url for per-row deep links; adds a `URL` column when set
    pub url_base: Option<String>,
}

impl PivotLayout {
    fn leading_columns(&self) -> u16 {
        if self.url_base.is_some() {
            3
        } else {
            2
        }
    }
}

/// Columns of one severity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeverityBlock {
    pub severity: String,
    pub first_column: u16,
    pub queries: Vec<String>,
}

impl SeverityBlock {
    /// A block without queries still occupies `first_column`
    pub fn last_query_column(&self) -> u16 {
        let extra = u16::try_from(self.queries.len().saturating_sub(1)).unwrap_or(u16::MAX);
        self.first_column.saturating_add(extra)
    }

    pub fn total_column(&self) -> u16 {
        self.last_query_column().saturating_add(1)
    }

    pub fn total_header(&self) -> String {
        format!("{} total", self.severity)
    }

    fn column_of(&self, query_name: &str) -> Option<u16> {
        self.queries
            .iter()
            .position(|q| q == query_name)
            .map(|i| self.first_column + i as u16)
    }
}

/// Per-severity total for one row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TotalCell {
    pub column: u16,
    /// Spreadsheet formula over the block's query cells
    pub formula: String,
    /// Same sum, precomputed for sinks without formulas
    pub value: u64,
}

/// One project/branch line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PivotRow {
    pub row: u32,
    pub project_id: String,
    pub project_name: String,
    pub branch: String,
    pub url: Option<String>,
    /// (column, quantity)
    pub cells: Vec<(u16, u64)>,
    pub totals: Vec<TotalCell>,
}

impl PivotRow {
    pub fn value_at(&self, column: u16) -> Option<u64> {
        self.cells
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, v)| *v)
    }

    pub fn total_at(&self, column: u16) -> Option<&TotalCell> {
        self.totals.iter().find(|t| t.column == column)
    }
}

/// Finalized grid handed to a sink
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PivotGrid {
    /// Headers of the fixed columns; the first (project) header is blank
    pub leading_headers: Vec<String>,
    pub blocks: Vec<SeverityBlock>,
    pub rows: Vec<PivotRow>,
}

impl PivotGrid {
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Number of columns including the fixed ones
    pub fn width(&self) -> u16 {
        self.blocks
            .last()
            .map(|b| b.total_column() + 1)
            .unwrap_or(self.leading_headers.len() as u16)
    }
}

/// Consumer of a finished grid
pub trait TabularSink {
    fn write_grid(&mut self, grid: &PivotGrid) -> Result<(), SinkError>;
}

/// Errors raised by sinks
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to write {format} report: {message}")]
    Format {
        format: &'static str,
        message: String,
    },
}

/// Build the grid for `severities`, in the given order
pub fn build_pivot(
    store: &AggregationStore,
    severities: &[Severity],
    layout: &PivotLayout,
) -> Result<PivotGrid, StoreError> {
    let mut grid = PivotGrid {
        leading_headers: leading_headers(layout),
        ..PivotGrid::default()
    };
    let mut row_slots: HashMap<(String, String), usize> = HashMap::new();
    let mut next_column = layout.leading_columns();

    for severity in severities {
        let queries = store.query_names(severity.as_str())?;
        if queries.is_empty() {
            log::info!("No queries found for severity {}", severity);
            continue;
        }
        log::info!("Writing severity {} ({} queries)", severity, queries.len());

        let block = SeverityBlock {
            severity: severity.as_str().to_string(),
            first_column: next_column,
            queries,
        };
        next_column = block.total_column() + 1;

        for record in store.rows_for_severity(severity.as_str())? {
            let key = (record.project_id.clone(), record.branch.clone());
            let slot = match row_slots.get(&key) {
                Some(&slot) => slot,
                None => {
                    let slot = grid.rows.len();
                    row_slots.insert(key, slot);
                    grid.rows.push(PivotRow {
                        row: HEADER_ROWS + slot as u32,
                        url: layout.url_base.as_deref().map(|base| {
                            deep_link(base, &record.project_id, &record.scan_id)
                        }),
                        project_id: record.project_id.clone(),
                        project_name: record.project_name.clone(),
                        branch: record.branch.clone(),
                        cells: Vec::new(),
                        totals: Vec::new(),
                    });
                    slot
                }
            };

            if let Some(column) = block.column_of(&record.query_name) {
                grid.rows[slot].cells.push((column, record.quantity));
            }
        }

        for row in grid.rows.iter_mut() {
            let values: Vec<u64> = (block.first_column..=block.last_query_column())
                .filter_map(|column| row.value_at(column))
                .collect();
            if values.is_empty() {
                continue;
            }
            row.totals.push(TotalCell {
                column: block.total_column(),
                formula: sum_formula(row.row, block.first_column, block.last_query_column()),
                value: values.iter().sum(),
            });
        }

        grid.blocks.push(block);
    }

    Ok(grid)
}

fn leading_headers(layout: &PivotLayout) -> Vec<String> {
    let mut headers = vec![String::new(), "Branch".to_string()];
    if layout.url_base.is_some() {
        headers.push("URL".to_string());
    }
    headers
}

/// Link to the scan's results in the platform UI
pub fn deep_link(base: &str, project_id: &str, scan_id: &str) -> String {
    format!(
        "{}/sast-results/{}/{}",
        base.trim_end_matches('/'),
        project_id,
        scan_id
    )
}

/// `=SUM(D3:F3)` for zero-based `row` and columns
pub fn sum_formula(row: u32, first_column: u16, last_column: u16) -> String {
    format!(
        "=SUM({}{}:{}{})",
        column_name(first_column),
        row + 1,
        column_name(last_column),
        row + 1
    )
}

/// Spreadsheet column letters for a zero-based index (0 = A, 26 = AA)
pub fn column_name(column: u16) -> String {
    let mut n = u32::from(column) + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        letters.push((b'A' + rem) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}
