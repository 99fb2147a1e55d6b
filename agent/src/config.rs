//! Configuration types for the analysis agent
//!
//! Turns parsed command-line arguments, plus an optional TOML file with a
//! `[cxone]` table, into a validated `AnalysisConfig`. Everything here runs
//! before the first network call.

use std::path::{Path, PathBuf};

use analysis_kit::collectors::CxOneSettings;
use analysis_kit::filter::{parse_names, parse_severities, BranchFilter, CounterFilter};
use analysis_kit::model::{Severity, UnknownSeverity};
use analysis_kit::range::{RangeError, RangeKind, RangeSpec, TimeRange};
use chrono::NaiveDateTime;
use serde::Deserialize;

use crate::cli::Cli;

/// File name used when no report path, or a directory, is given
pub const DEFAULT_REPORT_NAME: &str = "Pivot.xlsx";

/// Output format for the pivot report
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Spreadsheet with merged headers and live totals
    Xlsx,
    /// Plain text table on stdout
    Console,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Xlsx => write!(f, "xlsx"),
            OutputFormat::Console => write!(f, "console"),
        }
    }
}

/// Validated configuration for one run
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub settings: CxOneSettings,
    pub range: TimeRange,
    pub counters: CounterFilter,
    pub branches: BranchFilter,
    /// Severities to lay out, most severe first
    pub severities: Vec<Severity>,
    pub report_path: PathBuf,
    pub format: OutputFormat,
    pub summary_json: Option<PathBuf>,
    pub quiet: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    cxone: CxOneSettings,
}

impl AnalysisConfig {
    /// Build the configuration, resolving the range against `now` (UTC)
    pub fn from_cli(cli: &Cli, now: NaiveDateTime) -> Result<Self, ConfigError> {
        let from_file = match &cli.config {
            Some(path) => load_settings(path)?,
            None => CxOneSettings::default(),
        };
        let settings = cli_settings(cli).or(from_file);

        let kind: RangeKind = cli.range_type.parse().map_err(ConfigError::Range)?;
        let range_spec = RangeSpec {
            kind,
            date_from: cli.date_from.clone(),
            date_to: cli.date_to.clone(),
        };
        let range = range_spec.resolve(now).map_err(ConfigError::Range)?;

        let severity_filter = parse_severities(&cli.severities).map_err(ConfigError::Severity)?;
        let severities = severity_filter.render_order();
        if severities.is_empty() {
            return Err(ConfigError::Invalid(
                "--severities must name at least one severity".to_string(),
            ));
        }

        Ok(Self {
            settings,
            range,
            counters: CounterFilter {
                queries: parse_names(&cli.queries),
                severities: severity_filter,
            },
            branches: parse_names(&cli.branches),
            severities,
            report_path: resolve_report_path(cli.report_file_path.as_deref()),
            format: cli.format,
            summary_json: cli.summary_json.clone(),
            quiet: cli.quiet,
        })
    }
}

fn cli_settings(cli: &Cli) -> CxOneSettings {
    CxOneSettings {
        access_control_url: cli.cxone_access_control_url.clone(),
        server: cli.cxone_server.clone(),
        tenant_name: cli.cxone_tenant_name.clone(),
        grant_type: cli.cxone_grant_type.clone(),
        refresh_token: cli.cxone_refresh_token.clone(),
        client_id: cli.cxone_client_id.clone(),
        client_secret: cli.cxone_client_secret.clone(),
        proxy: cli.cxone_proxy.clone(),
    }
}

fn load_settings(path: &Path) -> Result<CxOneSettings, ConfigError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
    let file: ConfigFile = toml::from_str(&text)
        .map_err(|e| ConfigError::ParseFile(path.display().to_string(), e))?;
    log::debug!("Loaded connection settings from {}", path.display());
    Ok(file.cxone)
}

/// `./Pivot.xlsx` by default, `<dir>/Pivot.xlsx` for an existing directory
pub fn resolve_report_path(path: Option<&Path>) -> PathBuf {
    match path {
        None => PathBuf::from(".").join(DEFAULT_REPORT_NAME),
        Some(dir) if dir.is_dir() => dir.join(DEFAULT_REPORT_NAME),
        Some(file) => file.to_path_buf(),
    }
}

/// Result of a run
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Projects aggregated
    pub processed: usize,

    /// Projects skipped because of an upstream or store failure
    pub skipped: usize,

    /// Scan discovery or store setup failed
    pub analysis_failed: bool,

    pub duration: std::time::Duration,
}

impl RunSummary {
    /// Get the exit code based on results
    pub fn exit_code(&self) -> i32 {
        if self.analysis_failed || self.skipped > 0 {
            1
        } else {
            0
        }
    }
}

/// Errors raised while building the configuration
#[derive(Debug)]
pub enum ConfigError {
    Range(RangeError),
    Severity(UnknownSeverity),
    ReadFile(String, std::io::Error),
    ParseFile(String, toml::de::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Range(e) => write!(f, "{}", e),
            ConfigError::Severity(e) => write!(f, "{}", e),
            ConfigError::ReadFile(path, e) => write!(f, "Failed to read {}: {}", path, e),
            ConfigError::ParseFile(path, e) => write!(f, "Failed to parse {}: {}", path, e),
            ConfigError::Invalid(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Range(e) => Some(e),
            ConfigError::Severity(e) => Some(e),
            ConfigError::ReadFile(_, e) => Some(e),
            ConfigError::ParseFile(_, e) => Some(e),
            ConfigError::Invalid(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    fn now() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2024-03-10 12:00:00", "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn parse(args: &[&str]) -> Cli {
        let mut full = vec!["data_analysis"];
        full.extend_from_slice(args);
        Cli::try_parse_from(full).unwrap()
    }

    #[test]
    fn test_named_range_and_defaults() {
        let config = AnalysisConfig::from_cli(&parse(&["--range-type", "PAST_DAY"]), now()).unwrap();
        assert_eq!(config.range.start.to_string(), "2024-03-09 00:00:00");
        assert_eq!(config.severities, Severity::ALL.to_vec());
        assert_eq!(config.branches, BranchFilter::Unrestricted);
        assert_eq!(config.report_path, PathBuf::from("./Pivot.xlsx"));
    }

    #[test]
    fn test_custom_range_requires_dates() {
        let err = AnalysisConfig::from_cli(&parse(&[]), now()).unwrap_err();
        assert!(matches!(err, ConfigError::Range(RangeError::InvalidRange(_))));
    }

    #[test]
    fn test_unknown_range_and_severity_rejected() {
        let err = AnalysisConfig::from_cli(&parse(&["--range-type", "LAST_DECADE"]), now())
            .unwrap_err();
        assert!(matches!(err, ConfigError::Range(_)));

        let err = AnalysisConfig::from_cli(
            &parse(&["--range-type", "ALL", "--severities", "high,urgent"]),
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Severity(_)));
    }

    #[test]
    fn test_severities_render_in_canonical_order() {
        let config = AnalysisConfig::from_cli(
            &parse(&["--range-type", "ALL", "--severities", "Low,CRITICAL"]),
            now(),
        )
        .unwrap();
        assert_eq!(config.severities, vec![Severity::Critical, Severity::Low]);
    }

    #[test]
    fn test_report_path_directory_gets_default_name() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            resolve_report_path(Some(dir.path())),
            dir.path().join("Pivot.xlsx")
        );
        let file = dir.path().join("custom.xlsx");
        assert_eq!(resolve_report_path(Some(&file)), file);
    }

    #[test]
    fn test_config_file_merged_under_cli() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[cxone]\nserver = \"https://file.example.net\"\ntenant_name = \"acme\""
        )
        .unwrap();
        let path = file.path().to_string_lossy().to_string();

        let cli = parse(&[
            "--config",
            &path,
            "--range-type",
            "ALL",
            "--cxone-server",
            "https://cli.example.net",
        ]);
        let config = AnalysisConfig::from_cli(&cli, now()).unwrap();

        assert_eq!(config.settings.server.as_deref(), Some("https://cli.example.net"));
        assert_eq!(config.settings.tenant_name.as_deref(), Some("acme"));
    }

    #[test]
    fn test_bad_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[cxone\nserver = 1").unwrap();
        let path = file.path().to_string_lossy().to_string();

        let err = AnalysisConfig::from_cli(&parse(&["--config", &path, "--range-type", "ALL"]), now())
            .unwrap_err();
        assert!(matches!(err, ConfigError::ParseFile(..)));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(RunSummary::default().exit_code(), 0);
        let skipped = RunSummary {
            processed: 3,
            skipped: 1,
            ..RunSummary::default()
        };
        assert_eq!(skipped.exit_code(), 1);
        let failed = RunSummary {
            analysis_failed: true,
            ..RunSummary::default()
        };
        assert_eq!(failed.exit_code(), 1);
    }
}
