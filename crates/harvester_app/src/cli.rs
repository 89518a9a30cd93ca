//! Command line and environment configuration for the harvester binary.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::{Days, Local, NaiveDate};
use clap::Parser;
use harvester_engine::{FetchSettings, HarvestSettings, StorageSettings};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "harvester",
    about = "Collect one day of listing records and store their documents"
)]
pub struct Cli {
    /// Start date to collect, YYYY-MM-DD (defaults to yesterday)
    pub date: Option<NaiveDate>,

    /// Listing page the scan starts from
    #[arg(long, env = "LISTING_URL", default_value = "https://bidplus.gem.gov.in/all-bids")]
    pub listing_url: String,

    /// Pages to scan before the date cut-off may stop the run
    #[arg(long, env = "MIN_PAGES", default_value_t = 1200)]
    pub min_pages: u32,

    /// Hard page ceiling
    #[arg(long, env = "MAX_PAGES", default_value_t = 5000)]
    pub max_pages: u32,

    /// Milliseconds allowed for a page load or transition
    #[arg(long, env = "PAGE_LOAD_TIMEOUT", default_value_t = 30_000)]
    pub page_load_timeout_ms: u64,

    /// Consecutive failed navigations tolerated before aborting
    #[arg(long, env = "CONSECUTIVE_NAV_FAILURES_BEFORE_ABORT", default_value_t = 6)]
    pub nav_failure_threshold: u32,

    /// Browser sessions to try before giving up
    #[arg(long, env = "BROWSER_RESTART_ATTEMPTS", default_value_t = 3)]
    pub restart_attempts: u32,

    /// Seconds to pause after each upload
    #[arg(long, env = "PER_UPLOAD_DELAY", default_value_t = 0.5)]
    pub per_upload_delay_secs: f64,

    /// Seconds allowed for an existence probe
    #[arg(long, env = "HEAD_TIMEOUT", default_value_t = 15)]
    pub head_timeout_secs: u64,

    /// Seconds allowed for a document upload
    #[arg(long, env = "PDF_UPLOAD_TIMEOUT", default_value_t = 60)]
    pub upload_timeout_secs: u64,

    /// Seconds allowed for the run document upload
    #[arg(long, env = "JSON_UPLOAD_TIMEOUT", default_value_t = 30)]
    pub json_timeout_secs: u64,

    /// Object storage base URL
    #[arg(long, env = "SUPABASE_URL")]
    pub storage_url: Option<String>,

    /// Object storage service key
    #[arg(long, env = "SUPABASE_SERVICE_ROLE_KEY", hide_env_values = true)]
    pub storage_key: Option<String>,

    /// Object storage bucket
    #[arg(long, env = "SUPABASE_BUCKET_NAME", default_value = "gem-pdfs")]
    pub bucket: String,

    /// Directory for run documents, logs and failure snapshots
    #[arg(long, env = "DAILY_DATA_DIR", default_value = "daily_data")]
    pub data_dir: PathBuf,

    /// Listing markup profile (RON); built-in defaults when omitted
    #[arg(long)]
    pub profile: Option<PathBuf>,

    /// Log level: error, warn, info, debug or trace
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Also write logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Show the browser window
    #[arg(long, default_value_t = false)]
    pub headful: bool,
}

impl Cli {
    /// The day to collect, falling back to yesterday on the local clock.
    pub fn target_date(&self) -> NaiveDate {
        self.date.unwrap_or_else(|| {
            let today = Local::now().date_naive();
            today.checked_sub_days(Days::new(1)).unwrap_or(today)
        })
    }

    pub fn build_settings(&self) -> Result<HarvestSettings> {
        if self.min_pages == 0 {
            bail!("--min-pages must be at least 1");
        }
        if self.max_pages < self.min_pages {
            bail!(
                "--max-pages ({}) is below --min-pages ({})",
                self.max_pages,
                self.min_pages
            );
        }
        Ok(HarvestSettings {
            listing_url: self.listing_url.clone(),
            page_load_timeout: Duration::from_millis(self.page_load_timeout_ms),
            min_pages: self.min_pages,
            max_pages: self.max_pages,
            nav_failure_threshold: self.nav_failure_threshold,
            restart_attempts: self.restart_attempts,
            ..HarvestSettings::with_data_dir(self.data_dir.clone())
        })
    }

    /// Storage settings, or `None` when credentials are not configured.
    pub fn build_storage(&self) -> Result<Option<StorageSettings>> {
        let (url, key) = match (&self.storage_url, &self.storage_key) {
            (Some(url), Some(key)) if !url.trim().is_empty() && !key.trim().is_empty() => {
                (url, key)
            }
            (None, None) => return Ok(None),
            _ => bail!("SUPABASE_URL and SUPABASE_SERVICE_ROLE_KEY must be set together"),
        };
        if !self.per_upload_delay_secs.is_finite() || self.per_upload_delay_secs < 0.0 {
            bail!("--per-upload-delay-secs must be a non-negative number");
        }
        Ok(Some(StorageSettings {
            probe_timeout: Duration::from_secs(self.head_timeout_secs),
            upload_timeout: Duration::from_secs(self.upload_timeout_secs),
            json_timeout: Duration::from_secs(self.json_timeout_secs),
            politeness_delay: Duration::from_secs_f64(self.per_upload_delay_secs),
            ..StorageSettings::new(url.trim(), self.bucket.clone(), key.trim())
        }))
    }

    pub fn build_fetch(&self) -> FetchSettings {
        FetchSettings {
            request_timeout: Duration::from_secs(self.upload_timeout_secs),
            ..FetchSettings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["harvester"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn positional_date_and_limits_map_to_settings() {
        let cli = parse(&[
            "2025-12-01",
            "--min-pages",
            "3",
            "--max-pages",
            "9",
            "--page-load-timeout-ms",
            "1500",
            "--data-dir",
            "/tmp/harvest",
        ]);

        assert_eq!(cli.target_date(), NaiveDate::from_ymd_opt(2025, 12, 1).unwrap());
        let settings = cli.build_settings().unwrap();
        assert_eq!(settings.min_pages, 3);
        assert_eq!(settings.max_pages, 9);
        assert_eq!(settings.page_load_timeout, Duration::from_millis(1500));
        assert_eq!(settings.tmp_dir, PathBuf::from("/tmp/harvest/tmp"));
        assert_eq!(settings.diagnostics_dir, PathBuf::from("/tmp/harvest/failures"));
    }

    #[test]
    fn missing_date_means_yesterday() {
        let cli = parse(&[]);
        let yesterday = Local::now().date_naive() - Days::new(1);
        assert_eq!(cli.target_date(), yesterday);
    }

    #[test]
    fn malformed_date_is_rejected() {
        assert!(Cli::try_parse_from(["harvester", "01-12-2025"]).is_err());
    }

    #[test]
    fn inverted_page_limits_are_rejected() {
        let cli = parse(&["--min-pages", "10", "--max-pages", "5"]);
        assert!(cli.build_settings().is_err());
    }

    #[test]
    fn storage_needs_both_credentials() {
        let cli = parse(&["--storage-url", "https://store.test"]);
        assert!(cli.build_storage().is_err());
    }

    #[test]
    fn storage_settings_carry_timeouts_and_delay() {
        let cli = parse(&[
            "--storage-url",
            "https://store.test ",
            "--storage-key",
            "secret",
            "--bucket",
            "docs",
            "--head-timeout-secs",
            "4",
            "--per-upload-delay-secs",
            "0.25",
        ]);

        let storage = cli.build_storage().unwrap().unwrap();
        assert_eq!(storage.base_url, "https://store.test");
        assert_eq!(storage.bucket, "docs");
        assert_eq!(storage.probe_timeout, Duration::from_secs(4));
        assert_eq!(storage.politeness_delay, Duration::from_millis(250));
        assert_eq!(storage.max_attempts, 3);
    }
}
