use std::path::PathBuf;
use std::time::Duration;

use harvester_core::LoopLimits;

/// Knobs for one supervised collection run.
#[derive(Debug, Clone)]
pub struct HarvestSettings {
    pub listing_url: String,
    pub page_load_timeout: Duration,
    pub min_pages: u32,
    pub max_pages: u32,
    pub nav_failure_threshold: u32,
    /// Pause before retrying a navigation that did not verify.
    pub nav_retry_delay: Duration,
    /// Pause between initiating navigation and verifying it.
    pub nav_settle_delay: Duration,
    pub verify_poll_interval: Duration,
    /// Wait after the verifier's last-resort reload before re-reading the URL.
    pub verify_reload_settle: Duration,
    pub restart_attempts: u32,
    pub restart_backoff_base: Duration,
    pub parse_failure_sample_limit: usize,
    /// Compacted run documents land here.
    pub data_dir: PathBuf,
    /// Per-run NDJSON logs.
    pub tmp_dir: PathBuf,
    /// Failure snapshots (HTML and screenshots).
    pub diagnostics_dir: PathBuf,
    pub file_prefix: String,
    pub user_agent: String,
}

impl HarvestSettings {
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            tmp_dir: data_dir.join("tmp"),
            diagnostics_dir: data_dir.join("failures"),
            data_dir,
            ..Self::default()
        }
    }

    pub fn limits(&self) -> LoopLimits {
        LoopLimits {
            min_pages: self.min_pages,
            max_pages: self.max_pages,
            nav_failure_threshold: self.nav_failure_threshold,
        }
    }
}

impl Default for HarvestSettings {
    fn default() -> Self {
        let data_dir = PathBuf::from("daily_data");
        Self {
            listing_url: "https://bidplus.gem.gov.in/all-bids".to_string(),
            page_load_timeout: Duration::from_secs(30),
            min_pages: 1200,
            max_pages: 5000,
            nav_failure_threshold: 6,
            nav_retry_delay: Duration::from_secs(1),
            nav_settle_delay: Duration::from_millis(500),
            verify_poll_interval: Duration::from_millis(500),
            verify_reload_settle: Duration::from_secs(1),
            restart_attempts: 3,
            restart_backoff_base: Duration::from_secs(1),
            parse_failure_sample_limit: harvester_core::DEFAULT_SAMPLE_LIMIT,
            tmp_dir: data_dir.join("tmp"),
            diagnostics_dir: data_dir.join("failures"),
            data_dir,
            file_prefix: "gem_bids".to_string(),
            user_agent: crate::fetch::DEFAULT_USER_AGENT.to_string(),
        }
    }
}
