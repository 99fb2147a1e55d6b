//! Core run logic
//!
//! Drives one analysis: aggregate, build the pivot, write the report and
//! the optional JSON summary. The report is written from whatever was
//! aggregated, even when scan discovery fails.

use std::time::Instant;

use analysis_kit::analysis_api::{run_analysis, AnalysisOptions, RunReport};
use analysis_kit::collectors::{CxOneClient, SastPlatform, UpstreamError};
use analysis_kit::pivot::{build_pivot, PivotLayout};
use analysis_kit::store::{AggregationStore, StoreError};

use crate::config::{AnalysisConfig, OutputFormat, RunSummary};
use crate::output;

/// Run against the CxOne tenant named in `config`
pub fn run(config: &AnalysisConfig) -> Result<i32, RunError> {
    let client = CxOneClient::new(&config.settings).map_err(RunError::Client)?;
    let url_base = client.server().to_string();
    execute(&client, Some(url_base), config)
}

/// Run against any platform; `url_base` adds the URL column when set
pub fn execute<P>(
    platform: &P,
    url_base: Option<String>,
    config: &AnalysisConfig,
) -> Result<i32, RunError>
where
    P: SastPlatform + ?Sized,
{
    let start = Instant::now();

    log::info!("Starting analysis over {}", config.range);
    if !config.quiet {
        println!();
        println!("CxOne Data Analysis v{}", env!("CARGO_PKG_VERSION"));
        println!("Analyzing scans created within {}...", config.range);
        println!();
    }

    let mut store = AggregationStore::in_memory().map_err(RunError::Store)?;
    let report = analyze(platform, config, &mut store);

    let layout = PivotLayout { url_base };
    let grid = build_pivot(&store, &config.severities, &layout).map_err(RunError::Pivot)?;
    output::write_report(&grid, config.format, &config.report_path)
        .map_err(RunError::Output)?;

    let summary = summarize(report.as_ref(), start);
    let exit_code = summary.exit_code();
    let report_path = match config.format {
        OutputFormat::Xlsx => Some(config.report_path.as_path()),
        OutputFormat::Console => None,
    };

    if let Some(path) = &config.summary_json {
        let json = output::build_summary(report.as_ref(), report_path, exit_code);
        output::write_summary(&json, path).map_err(RunError::Output)?;
        log::info!("Run summary written to {}", path.display());
    }

    if !config.quiet {
        if let Some(report) = &report {
            output::print_run_summary(report, report_path, summary.duration);
        }
    }

    log::info!(
        "Analysis completed: {} processed, {} skipped, exit code {}",
        summary.processed,
        summary.skipped,
        exit_code
    );
    Ok(exit_code)
}

fn analyze<P>(platform: &P, config: &AnalysisConfig, store: &mut AggregationStore) -> Option<RunReport>
where
    P: SastPlatform + ?Sized,
{
    let options = AnalysisOptions {
        counters: config.counters.clone(),
        branches: config.branches.clone(),
        ..AnalysisOptions::new(config.range)
    };

    match run_analysis(platform, &options, store) {
        Ok(report) => Some(report),
        Err(e) => {
            log::error!("Analysis failed, writing report from partial data: {}", e);
            None
        }
    }
}

fn summarize(report: Option<&RunReport>, start: Instant) -> RunSummary {
    match report {
        Some(report) => {
            let skipped = report.skipped().count();
            RunSummary {
                processed: report.outcomes.len() - skipped,
                skipped,
                analysis_failed: false,
                duration: start.elapsed(),
            }
        }
        None => RunSummary {
            analysis_failed: true,
            duration: start.elapsed(),
            ..RunSummary::default()
        },
    }
}

/// Errors that stop a run before the report is written
#[derive(Debug)]
pub enum RunError {
    /// Connection settings incomplete or unusable
    Client(UpstreamError),
    /// Failed to open the staging store
    Store(StoreError),
    /// Failed to read the store back into a grid
    Pivot(StoreError),
    /// Failed to write the report or summary
    Output(output::OutputError),
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunError::Client(e) => write!(f, "CxOne client setup failed: {}", e),
            RunError::Store(e) => write!(f, "Store setup failed: {}", e),
            RunError::Pivot(e) => write!(f, "Pivot generation failed: {}", e),
            RunError::Output(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RunError::Client(e) => Some(e),
            RunError::Store(e) => Some(e),
            RunError::Pivot(e) => Some(e),
            RunError::Output(e) => Some(e),
        }
    }
}
