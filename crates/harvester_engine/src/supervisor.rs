use std::time::Duration;

use chrono::NaiveDate;
use engine_logging::{engine_error, engine_info, engine_warn};
use harvester_core::RunStats;

use crate::collect::CollectionLoop;
use crate::error::HarvestError;
use crate::page::BrowserSession;
use crate::progress::ProgressSink;
use crate::{RunProgress, Stage};

/// Runs the collection loop in a fresh browser session, restarting from
/// scratch with exponential backoff when an attempt fails.
pub struct RestartSupervisor<'a> {
    session: &'a dyn BrowserSession,
    collection: &'a CollectionLoop,
    progress: &'a dyn ProgressSink,
}

impl<'a> RestartSupervisor<'a> {
    pub fn new(
        session: &'a dyn BrowserSession,
        collection: &'a CollectionLoop,
        progress: &'a dyn ProgressSink,
    ) -> Self {
        Self {
            session,
            collection,
            progress,
        }
    }

    /// Pause before the attempt that follows `failed_attempts` failures.
    pub fn backoff(base: Duration, failed_attempts: u32) -> Duration {
        base * 2u32.saturating_pow(failed_attempts.saturating_sub(1))
    }

    pub async fn run_with_retries(&self, target_date: NaiveDate) -> Result<RunStats, HarvestError> {
        let settings = self.collection.settings();
        let attempts = settings.restart_attempts.max(1);
        let mut last_error = String::new();
        let mut last_stats = None;

        for attempt in 1..=attempts {
            if attempt > 1 {
                let wait = Self::backoff(settings.restart_backoff_base, attempt - 1);
                engine_info!("Restarting browser in {:?} (attempt {}/{})", wait, attempt, attempts);
                self.progress.emit(RunProgress {
                    attempt,
                    stage: Stage::Restarting,
                    page_number: 0,
                    accepted: 0,
                });
                tokio::time::sleep(wait).await;
            }

            let page = match self.session.open().await {
                Ok(page) => page,
                Err(err) => {
                    engine_error!("Attempt {}: could not open browser: {}", attempt, err);
                    self.session.close().await;
                    last_error = err.to_string();
                    continue;
                }
            };

            let result = self
                .collection
                .run(page.as_ref(), target_date, attempt, self.progress)
                .await;
            drop(page);
            self.session.close().await;

            match result {
                Ok(stats) => return Ok(stats),
                Err(failure) => {
                    engine_error!("Attempt {} failed: {}", attempt, failure.error);
                    last_error = failure.error.to_string();
                    last_stats = Some(failure.stats);
                }
            }
        }

        engine_warn!("Giving up after {} attempts", attempts);
        Err(HarvestError::RestartsExhausted {
            attempts,
            last_error,
            stats: last_stats,
        })
    }
}
