//! Console output formatting
//!
//! Renders the pivot grid as a plain text table and prints the run summary.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use analysis_kit::analysis_api::{OutcomeStatus, RunReport};
use analysis_kit::pivot::{PivotGrid, SinkError, TabularSink};

const RULE: &str =
    "────────────────────────────────────────────────────────────────────────────────";

/// Text table sink over any writer
pub struct ConsoleSink<W: Write> {
    out: W,
}

impl ConsoleSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> TabularSink for ConsoleSink<W> {
    fn write_grid(&mut self, grid: &PivotGrid) -> Result<(), SinkError> {
        if grid.is_empty() {
            writeln!(self.out, "No findings to report.")?;
            return Ok(());
        }

        let table = render_table(grid);
        let widths = column_widths(&table);
        for (index, line) in table.iter().enumerate() {
            let cells: Vec<String> = line
                .iter()
                .zip(&widths)
                .map(|(cell, width)| format!("{:<width$}", cell, width = width))
                .collect();
            writeln!(self.out, "{}", cells.join(" | ").trim_end())?;
            if index == 1 {
                let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
                writeln!(self.out, "{}", rule.join("-+-"))?;
            }
        }
        self.out.flush()?;
        Ok(())
    }
}

/// Two header lines followed by one line per row, all `grid.width()` wide
fn render_table(grid: &PivotGrid) -> Vec<Vec<String>> {
    let width = grid.width() as usize;
    let mut severities = vec![String::new(); width];
    let mut queries = vec![String::new(); width];

    for (column, title) in grid.leading_headers.iter().enumerate() {
        severities[column] = title.clone();
    }
    for block in &grid.blocks {
        severities[block.first_column as usize] = block.severity.clone();
        for (offset, query) in block.queries.iter().enumerate() {
            queries[block.first_column as usize + offset] = query.clone();
        }
        severities[block.total_column() as usize] = block.total_header();
    }

    let mut table = vec![severities, queries];
    for row in &grid.rows {
        let mut line = vec![String::new(); width];
        line[0] = row.project_name.clone();
        line[1] = row.branch.clone();
        if let Some(url) = &row.url {
            line[2] = url.clone();
        }
        for &(column, quantity) in &row.cells {
            line[column as usize] = quantity.to_string();
        }
        for total in &row.totals {
            line[total.column as usize] = total.value.to_string();
        }
        table.push(line);
    }
    table
}

fn column_widths(table: &[Vec<String>]) -> Vec<usize> {
    let columns = table.first().map(Vec::len).unwrap_or(0);
    (0..columns)
        .map(|c| {
            table
                .iter()
                .map(|line| line[c].chars().count())
                .max()
                .unwrap_or(0)
        })
        .collect()
}

/// Print processed and skipped projects, then where the report went
pub fn print_run_summary(report: &RunReport, report_path: Option<&Path>, duration: Duration) {
    let processed = report.outcomes.len() - report.skipped().count();

    println!();
    println!("{}", RULE);
    println!("  Range:        {}", report.range);
    println!("  Scans:        {}", report.scans_discovered);
    println!("  Projects:     {} processed, {} skipped", processed, report.skipped().count());
    println!("  Rows:         {}", report.rows_written());
    for outcome in report.skipped() {
        if let OutcomeStatus::Skipped { reason } = &outcome.status {
            println!(
                "    \x1b[33m!\x1b[0m {} ({}): {}",
                outcome.project_name, outcome.branch, reason
            );
        }
    }
    println!("  Duration:     {:.2}s", duration.as_secs_f64());
    if let Some(path) = report_path {
        println!("  Report:       {}", path.display());
    }
    println!("{}", RULE);
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_kit::pivot::{PivotRow, SeverityBlock, TotalCell};

    fn grid() -> PivotGrid {
        PivotGrid {
            leading_headers: vec![String::new(), "Branch".to_string()],
            blocks: vec![SeverityBlock {
                severity: "high".to_string(),
                first_column: 2,
                queries: vec!["SQLi".to_string(), "XSS".to_string()],
            }],
            rows: vec![
                PivotRow {
                    row: 2,
                    project_id: "P1".to_string(),
                    project_name: "payments".to_string(),
                    branch: "master".to_string(),
                    url: None,
                    cells: vec![(2, 5), (3, 3)],
                    totals: vec![TotalCell {
                        column: 4,
                        formula: "=SUM(C3:D3)".to_string(),
                        value: 8,
                    }],
                },
                PivotRow {
                    row: 3,
                    project_id: "P2".to_string(),
                    project_name: "billing".to_string(),
                    branch: "develop".to_string(),
                    url: None,
                    cells: vec![(3, 1)],
                    totals: vec![TotalCell {
                        column: 4,
                        formula: "=SUM(C4:D4)".to_string(),
                        value: 1,
                    }],
                },
            ],
        }
    }

    fn render(grid: &PivotGrid) -> String {
        let mut sink = ConsoleSink::new(Vec::new());
        sink.write_grid(grid).unwrap();
        String::from_utf8(sink.into_inner()).unwrap()
    }

    #[test]
    fn test_table_layout() {
        let text = render(&grid());
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 5);
        assert!(lines[0].contains("Branch"));
        assert!(lines[0].contains("high total"));
        assert!(lines[1].contains("SQLi"));
        assert!(lines[2].starts_with("---"));
        assert!(lines[3].starts_with("payments"));
        assert!(lines[3].trim_end().ends_with('8'));
        assert!(lines[4].starts_with("billing "));
    }

    #[test]
    fn test_columns_are_aligned() {
        let text = render(&grid());
        let positions: Vec<Option<usize>> = text
            .lines()
            .filter(|l| !l.starts_with('-'))
            .map(|l| l.find(" | "))
            .collect();
        assert!(positions.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_empty_grid_message() {
        let text = render(&PivotGrid::default());
        assert_eq!(text.trim(), "No findings to report.");
    }
}
