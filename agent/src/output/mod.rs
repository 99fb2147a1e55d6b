//! Output generation module
//!
//! Provides the report sinks and the run summary:
//! - Spreadsheet (`Pivot.xlsx`)
//! - Console (text table)
//! - JSON run summary
//!
//! ```text
//! AggregationStore ──► build_pivot() ──► PivotGrid
//!                                           ├── XlsxSink     (--format xlsx)
//!                                           └── ConsoleSink  (--format console)
//! RunReport ──► build_summary() ──► --summary-json
//! ```

mod console;
mod summary;
mod xlsx;

pub use console::{print_run_summary, ConsoleSink};
pub use summary::build_summary;
pub use xlsx::XlsxSink;

use std::path::Path;

use analysis_kit::pivot::{PivotGrid, SinkError, TabularSink};

use crate::config::OutputFormat;

/// Write the grid in the requested format
///
/// `path` is only used by file formats.
pub fn write_report(grid: &PivotGrid, format: OutputFormat, path: &Path) -> Result<(), OutputError> {
    let mut sink: Box<dyn TabularSink> = match format {
        OutputFormat::Xlsx => Box::new(XlsxSink::new(path)),
        OutputFormat::Console => Box::new(ConsoleSink::stdout()),
    };
    sink.write_grid(grid).map_err(OutputError::Sink)
}

/// Serialize `summary` and write it to `path`
pub fn write_summary(summary: &serde_json::Value, path: &Path) -> Result<(), OutputError> {
    let json = serde_json::to_string_pretty(summary)
        .map_err(|e| OutputError::Serialization(e.to_string()))?;
    std::fs::write(path, json).map_err(|e| OutputError::WriteFile(path.display().to_string(), e))
}

// ============================================================================
// Errors
// ============================================================================

/// Errors that can occur during output generation
#[derive(Debug)]
pub enum OutputError {
    /// Sink failed to write the grid
    Sink(SinkError),
    /// Failed to serialize the summary
    Serialization(String),
    /// Failed to write the summary file
    WriteFile(String, std::io::Error),
}

impl std::fmt::Display for OutputError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputError::Sink(e) => write!(f, "Failed to write report: {}", e),
            OutputError::Serialization(msg) => write!(f, "Failed to serialize summary: {}", msg),
            OutputError::WriteFile(path, e) => write!(f, "Failed to write {}: {}", path, e),
        }
    }
}

impl std::error::Error for OutputError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OutputError::Sink(e) => Some(e),
            OutputError::Serialization(_) => None,
            OutputError::WriteFile(_, e) => Some(e),
        }
    }
}
