use std::path::PathBuf;
use std::time::Duration;

use engine_logging::{engine_debug, engine_warn};
use tokio::time::Instant;

use crate::diagnostics::capture_failure_snapshot;
use crate::page::ListingPage;

const SNAPSHOT_STEM: &str = "page_failure";

/// Trimmed text of the first record on the page, if any.
pub async fn first_identifier(page: &dyn ListingPage, record_selector: &str) -> Option<String> {
    match page.inner_text(record_selector, 0).await {
        Ok(text) => text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty()),
        Err(err) => {
            engine_debug!("Could not read first identifier: {}", err);
            None
        }
    }
}

/// Confirms that a navigation produced new content.
#[derive(Debug, Clone)]
pub struct PageChangeVerifier {
    record_selector: String,
    poll_interval: Duration,
    reload_timeout: Duration,
    reload_settle: Duration,
    diagnostics_dir: PathBuf,
}

impl PageChangeVerifier {
    pub fn new(
        record_selector: impl Into<String>,
        poll_interval: Duration,
        reload_timeout: Duration,
        reload_settle: Duration,
        diagnostics_dir: PathBuf,
    ) -> Self {
        Self {
            record_selector: record_selector.into(),
            poll_interval,
            reload_timeout,
            reload_settle,
            diagnostics_dir,
        }
    }

    /// Polls until the URL changes or the first record differs from
    /// `prev_first`. On timeout it saves a snapshot, reloads once and reports
    /// whether the URL changed after that.
    pub async fn await_transition(
        &self,
        page: &dyn ListingPage,
        prev_url: &str,
        prev_first: Option<&str>,
        timeout: Duration,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.has_changed(page, prev_url, prev_first).await {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }

        engine_warn!(
            "No page transition within {:?} (url {}, first record {:?})",
            timeout,
            prev_url,
            prev_first
        );
        capture_failure_snapshot(page, &self.diagnostics_dir, SNAPSHOT_STEM).await;

        if let Err(err) = page.reload(self.reload_timeout).await {
            engine_warn!("Reload after failed transition errored: {}", err);
            return false;
        }
        tokio::time::sleep(self.reload_settle).await;
        match page.url().await {
            Ok(url) => url != prev_url,
            Err(err) => {
                engine_warn!("Could not read URL after reload: {}", err);
                false
            }
        }
    }

    async fn has_changed(
        &self,
        page: &dyn ListingPage,
        prev_url: &str,
        prev_first: Option<&str>,
    ) -> bool {
        match page.url().await {
            Ok(url) if url != prev_url => return true,
            Ok(_) => {}
            Err(err) => engine_debug!("Could not read URL while verifying: {}", err),
        }
        let current = first_identifier(page, &self.record_selector).await;
        match (prev_first, current.as_deref()) {
            (None, Some(_)) => true,
            (Some(prev), Some(now)) => prev != now,
            _ => false,
        }
    }
}
