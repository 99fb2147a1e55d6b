//! Summary builder
//!
//! Builds the JSON run summary written by `--summary-json`.

use std::path::Path;

use analysis_kit::analysis_api::RunReport;

/// Build the run summary; `report` is `None` when the analysis aborted
pub fn build_summary(
    report: Option<&RunReport>,
    report_path: Option<&Path>,
    exit_code: i32,
) -> serde_json::Value {
    let analysis = match report {
        Some(report) => serde_json::json!({
            "range": {
                "start": report.range.start.to_string(),
                "end": report.range.end.to_string()
            },
            "scans_discovered": report.scans_discovered,
            "projects_selected": report.projects_selected,
            "projects_skipped": report.skipped().count(),
            "rows_written": report.rows_written(),
            "projects": report.outcomes
        }),
        None => serde_json::Value::Null,
    };

    serde_json::json!({
        "agent": {
            "name": "data_analysis",
            "version": env!("CARGO_PKG_VERSION")
        },
        "report": report_path.map(|p| p.display().to_string()),
        "exit_code": exit_code,
        "analysis": analysis
    })
}
