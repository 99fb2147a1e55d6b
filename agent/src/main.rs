//! # CxOne Data Analysis
//!
//! Pivot report of to-verify SAST findings across Checkmarx One projects.
//!
//! ## Usage
//!
//! ```bash
//! # Last week, every severity, report in the current directory
//! data_analysis --config cxone.toml --range-type PAST_WEEK
//!
//! # Custom window, two severities, report into a directory
//! data_analysis --config cxone.toml \
//!     --date-from 2023-06-01-0-0-0 --date-to 2023-06-30-0-0-0 \
//!     --severities high,medium --report-file-path reports/
//!
//! # Print the pivot instead of writing a workbook
//! data_analysis --config cxone.toml --range-type PAST_DAY --format console
//! ```
//!
//! ## Output Formats
//!
//! - **xlsx** (default): `Pivot.xlsx` with merged headers and `SUM` totals
//! - **console**: the same pivot as a text table
//!
//! `--summary-json <file>` additionally writes the run summary as JSON.

mod cli;
mod config;
mod output;
mod runner;

use clap::Parser;

use cli::Cli;
use config::AnalysisConfig;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let now = chrono::Utc::now().naive_utc();

    let exit_code = match AnalysisConfig::from_cli(&cli, now) {
        Ok(config) => match runner::run(&config) {
            Ok(code) => code,
            Err(e) => {
                log::error!("{}", e);
                eprintln!("Error: {}", e);
                2
            }
        },
        Err(e) => {
            eprintln!("Error: {}", e);
            2
        }
    };

    std::process::exit(exit_code);
}
