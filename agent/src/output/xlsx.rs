//! Spreadsheet sink
//!
//! Writes the pivot grid with `rust_xlsxwriter`: merged two-row headers,
//! frozen leading columns, and totals as live `SUM` formulas carrying their
//! precomputed value as the cached result.

use std::path::PathBuf;

use analysis_kit::pivot::{PivotGrid, SinkError, TabularSink, HEADER_ROWS};
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Formula, Workbook, Worksheet, XlsxError};

const DEFAULT_ROW_HEIGHT: f64 = 20.0;

/// Writes `Pivot.xlsx`-style workbooks
pub struct XlsxSink {
    path: PathBuf,
}

impl XlsxSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TabularSink for XlsxSink {
    fn write_grid(&mut self, grid: &PivotGrid) -> Result<(), SinkError> {
        log::info!("Creating {}", self.path.display());
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        fill_worksheet(worksheet, grid).map_err(xlsx_error)?;
        workbook.save(&self.path).map_err(xlsx_error)?;
        log::info!("Finished writing {}", self.path.display());
        Ok(())
    }
}

fn header_format() -> Format {
    Format::new()
        .set_align(FormatAlign::Left)
        .set_text_wrap()
        .set_border(FormatBorder::Thin)
        .set_border_color(Color::RGB(0xA0A0A0))
        .set_background_color(Color::RGB(0xF0F0F0))
}

fn fill_worksheet(worksheet: &mut Worksheet, grid: &PivotGrid) -> Result<(), XlsxError> {
    let header = header_format();
    worksheet.set_default_row_height(DEFAULT_ROW_HEIGHT);

    let leading = grid.leading_headers.len() as u16;
    worksheet.set_freeze_panes(0, leading)?;
    for (column, title) in grid.leading_headers.iter().enumerate() {
        let column = column as u16;
        worksheet.merge_range(0, column, 1, column, title, &header)?;
    }

    for block in &grid.blocks {
        let first = block.first_column;
        let last = block.last_query_column();
        if first == last {
            worksheet.write_string_with_format(0, first, &block.severity, &header)?;
        } else {
            worksheet.merge_range(0, first, 0, last, &block.severity, &header)?;
        }
        for (offset, query) in block.queries.iter().enumerate() {
            worksheet.write_string_with_format(1, first + offset as u16, query, &header)?;
        }
        let total = block.total_column();
        worksheet.merge_range(0, total, HEADER_ROWS - 1, total, &block.total_header(), &header)?;
    }

    for row in &grid.rows {
        worksheet.write_string_with_format(row.row, 0, &row.project_name, &header)?;
        worksheet.write_string_with_format(row.row, 1, &row.branch, &header)?;
        if let Some(url) = &row.url {
            worksheet.write_string_with_format(row.row, 2, url, &header)?;
        }
        for &(column, quantity) in &row.cells {
            worksheet.write_number(row.row, column, quantity as f64)?;
        }
        for total in &row.totals {
            let formula = Formula::new(&total.formula).set_result(total.value.to_string());
            worksheet.write_formula(row.row, total.column, formula)?;
        }
    }

    worksheet.autofit();
    Ok(())
}

fn xlsx_error(e: XlsxError) -> SinkError {
    SinkError::Format {
        format: "xlsx",
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_kit::pivot::{PivotRow, SeverityBlock, TotalCell};

    fn grid() -> PivotGrid {
        PivotGrid {
            leading_headers: vec![String::new(), "Branch".to_string(), "URL".to_string()],
            blocks: vec![
                SeverityBlock {
                    severity: "high".to_string(),
                    first_column: 3,
                    queries: vec!["SQLi".to_string(), "XSS".to_string()],
                },
                SeverityBlock {
                    severity: "low".to_string(),
                    first_column: 6,
                    queries: vec!["Weak_Hash".to_string()],
                },
            ],
            rows: vec![PivotRow {
                row: 2,
                project_id: "P1".to_string(),
                project_name: "payments".to_string(),
                branch: "master".to_string(),
                url: Some("https://ast.example.net/sast-results/P1/s1".to_string()),
                cells: vec![(3, 5), (4, 3), (6, 1)],
                totals: vec![
                    TotalCell {
                        column: 5,
                        formula: "=SUM(D3:E3)".to_string(),
                        value: 8,
                    },
                    TotalCell {
                        column: 7,
                        formula: "=SUM(G3:G3)".to_string(),
                        value: 1,
                    },
                ],
            }],
        }
    }

    #[test]
    fn test_writes_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Pivot.xlsx");
        let mut sink = XlsxSink::new(&path);

        sink.write_grid(&grid()).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        // xlsx is a zip container
        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn test_empty_grid_still_writes_headers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.xlsx");
        let empty = PivotGrid {
            leading_headers: vec![String::new(), "Branch".to_string()],
            ..PivotGrid::default()
        };

        XlsxSink::new(&path).write_grid(&empty).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_unwritable_path_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("Pivot.xlsx");
        let err = XlsxSink::new(&path).write_grid(&grid()).unwrap_err();
        assert!(matches!(err, SinkError::Format { format: "xlsx", .. }));
    }
}
