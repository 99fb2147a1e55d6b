//! Command-line interface parsing
//!
//! Long flags are kebab-case. The underscore spellings used by older
//! wrapper scripts (`--range_type`, `--cxone_server`, ...) are accepted as
//! aliases.

use std::path::PathBuf;

use clap::Parser;

use crate::config::OutputFormat;

/// Pivot report of to-verify SAST findings across CxOne projects
#[derive(Debug, Clone, Parser)]
#[command(name = "data_analysis", version, about)]
#[command(after_help = "EXIT CODES:\n    \
    0    Report written, every project aggregated\n    \
    1    Report written, some projects skipped or analysis failed\n    \
    2    Configuration error or report not written")]
pub struct Cli {
    /// TOML file with a [cxone] connection table
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// CxOne IAM url
    #[arg(long, alias = "cxone_access_control_url", value_name = "URL")]
    pub cxone_access_control_url: Option<String>,

    /// CxOne server url, also the base of the report's URL column
    #[arg(long, alias = "cxone_server", value_name = "URL")]
    pub cxone_server: Option<String>,

    #[arg(long, alias = "cxone_tenant_name", value_name = "NAME")]
    pub cxone_tenant_name: Option<String>,

    /// refresh_token or client_credentials
    #[arg(long, alias = "cxone_grant_type", value_name = "GRANT")]
    pub cxone_grant_type: Option<String>,

    /// CxOne API key
    #[arg(long, alias = "cxone_refresh_token", value_name = "TOKEN")]
    pub cxone_refresh_token: Option<String>,

    #[arg(long, alias = "cxone_client_id", value_name = "ID")]
    pub cxone_client_id: Option<String>,

    #[arg(long, alias = "cxone_client_secret", value_name = "SECRET")]
    pub cxone_client_secret: Option<String>,

    /// Proxy url
    #[arg(long, alias = "cxone_proxy", value_name = "URL")]
    pub cxone_proxy: Option<String>,

    /// ALL, PAST_DAY, PAST_WEEK, PAST_MONTH, PAST_3_MONTH, PAST_YEAR or CUSTOM
    #[arg(long, alias = "range_type", default_value = "CUSTOM")]
    pub range_type: String,

    /// Example: 2023-06-01-0-0-0
    #[arg(long, alias = "date_from")]
    pub date_from: Option<String>,

    /// Example: 2023-06-30-0-0-0
    #[arg(long, alias = "date_to")]
    pub date_to: Option<String>,

    /// Example: Code_Injection,Stored_XSS
    #[arg(long, default_value = "ALL")]
    pub queries: String,

    /// Example: Critical,High,Medium,Low,Info
    #[arg(long, default_value = "ALL")]
    pub severities: String,

    /// Example: master,develop
    #[arg(long, default_value = "ALL")]
    pub branches: String,

    /// Report file, or a directory to write Pivot.xlsx into
    #[arg(long, alias = "report_file_path", value_name = "PATH")]
    pub report_file_path: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Xlsx)]
    pub format: OutputFormat,

    /// Also write the run summary as JSON
    #[arg(long, alias = "summary_json", value_name = "FILE")]
    pub summary_json: Option<PathBuf>,

    /// Suppress console output
    #[arg(short, long)]
    pub quiet: bool,
}
