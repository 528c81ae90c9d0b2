//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

/// facaudit - Federal Audit Clearinghouse program report builder
///
/// Downloads audit report metadata and major-program award records from the
/// FAC API, merges them per report and ranks the most common federal
/// programs. Fetched data is kept as local snapshots and reused on the next
/// run unless --force-refresh is given.
///
/// Examples:
///   facaudit
///   facaudit --audit-year 2023 --force-refresh
///   facaudit --auditor-ein 12-3456789 --export-csv --export-json
///   facaudit --export-snapshots-csv
///   facaudit --summary-source awards --top 50
///   facaudit --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Only fetch reports signed by this auditor EIN
    ///
    /// Nine digits; dashes are accepted and stripped.
    #[arg(long, value_name = "EIN")]
    pub auditor_ein: Option<String>,

    /// Only fetch awards from this audit year
    #[arg(long, value_name = "YEAR")]
    pub audit_year: Option<String>,

    /// Ignore existing snapshots and fetch everything again
    #[arg(long)]
    pub force_refresh: bool,

    /// Write the merged table as CSV
    #[arg(long)]
    pub export_csv: bool,

    /// Write the merged table as JSON
    #[arg(long)]
    pub export_json: bool,

    /// Also write each dataset snapshot on its own as CSV
    ///
    /// Produces `general_data.csv` and `federal_awards_data.csv` in the
    /// output directory.
    #[arg(long)]
    pub export_snapshots_csv: bool,

    /// Rows the program summary is computed from
    ///
    /// `merged` counts merged rows (reports without awards form the empty
    /// program group); `awards` counts award records directly.
    #[arg(long, default_value = "merged", value_name = "SOURCE")]
    pub summary_source: SummarySource,

    /// Number of programs kept in the summary
    ///
    /// Default: from config or 500.
    #[arg(long, value_name = "N")]
    pub top: Option<usize>,

    /// Records requested per page
    ///
    /// Default: from config or 4999.
    #[arg(long, value_name = "N")]
    pub page_size: Option<usize>,

    /// Request timeout in seconds
    ///
    /// Default: from config or 120s.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Directory holding the dataset snapshots
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Directory the exports and the summary CSV are written to
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// api.data.gov key
    ///
    /// Falls back to the key file named in the config (`.key` by default).
    #[arg(long, env = "FAC_API_KEY", value_name = "KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// FAC API base URL
    #[arg(long, env = "FAC_API_URL", value_name = "URL")]
    pub base_url: Option<String>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .facaudit.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .facaudit.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Input of the program summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SummarySource {
    /// Merged rows (default)
    #[default]
    Merged,
    /// Award records
    Awards,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if let Some(ref year) = self.audit_year {
            if year.len() != 4 || !year.chars().all(|c| c.is_ascii_digit()) {
                return Err(format!("Audit year must be four digits, got '{}'", year));
            }
        }

        if let Some(ref ein) = self.auditor_ein {
            let digits = normalize_ein(ein);
            let valid_chars = ein.chars().all(|c| c.is_ascii_digit() || c == '-');
            if !valid_chars || digits.len() != 9 {
                return Err(format!("Auditor EIN must be nine digits, got '{}'", ein));
            }
        }

        if self.top == Some(0) {
            return Err("Top must be at least 1".to_string());
        }

        if self.page_size == Some(0) {
            return Err("Page size must be at least 1".to_string());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        if let Some(ref url) = self.base_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Base URL must start with 'http://' or 'https://'".to_string());
            }
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        Ok(())
    }

    /// The auditor EIN filter value, dashes removed.
    pub fn auditor_ein_filter(&self) -> Option<String> {
        self.auditor_ein.as_deref().map(normalize_ein)
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

fn normalize_ein(ein: &str) -> String {
    ein.chars().filter(|c| *c != '-').collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            auditor_ein: None,
            audit_year: None,
            force_refresh: false,
            export_csv: false,
            export_json: false,
            export_snapshots_csv: false,
            summary_source: SummarySource::Merged,
            top: None,
            page_size: None,
            timeout: None,
            cache_dir: None,
            output_dir: None,
            api_key: None,
            base_url: None,
            config: None,
            verbose: false,
            quiet: false,
            init_config: false,
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(make_args().validate().is_ok());
    }

    #[test]
    fn test_parse_from_command_line() {
        let args = Args::try_parse_from([
            "facaudit",
            "--audit-year",
            "2023",
            "--summary-source",
            "awards",
            "--export-csv",
            "--top",
            "25",
            "--export-snapshots-csv",
        ])
        .unwrap();

        assert_eq!(args.audit_year.as_deref(), Some("2023"));
        assert_eq!(args.summary_source, SummarySource::Awards);
        assert!(args.export_csv);
        assert!(!args.export_json);
        assert_eq!(args.top, Some(25));
        assert!(args.export_snapshots_csv);
    }

    #[test]
    fn test_validation_audit_year() {
        let mut args = make_args();
        args.audit_year = Some("2023".to_string());
        assert!(args.validate().is_ok());

        args.audit_year = Some("23".to_string());
        assert!(args.validate().is_err());

        args.audit_year = Some("20x3".to_string());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_auditor_ein() {
        let mut args = make_args();
        args.auditor_ein = Some("12-3456789".to_string());
        assert!(args.validate().is_ok());
        assert_eq!(args.auditor_ein_filter().as_deref(), Some("123456789"));

        args.auditor_ein = Some("12345".to_string());
        assert!(args.validate().is_err());

        args.auditor_ein = Some("12345678A".to_string());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_zero_values() {
        let mut args = make_args();
        args.top = Some(0);
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.page_size = Some(0);
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.timeout = Some(0);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_invalid_url() {
        let mut args = make_args();
        args.base_url = Some("ftp://api.fac.gov".to_string());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_init_config_skips_validation() {
        let mut args = make_args();
        args.init_config = true;
        args.audit_year = Some("bad".to_string());
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
