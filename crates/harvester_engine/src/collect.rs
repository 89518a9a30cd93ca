//! Executes one collection attempt against an open listing page.
//!
//! Stop and navigation decisions come from [`harvester_core::update`]; this
//! module performs the effects it asks for and feeds the results back in.
use std::collections::VecDeque;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use engine_logging::{engine_debug, engine_info, engine_warn};
use harvester_core::{
    update, CollectionRun, Effect, ListingProfile, LoopState, Msg, PersistedRecord,
    RecordNormalizer, RunOutcome, RunStats, Verdict,
};
use url::Url;

use crate::dedup::{self, DedupPersistence};
use crate::diagnostics::capture_parse_failure_sample;
use crate::error::{AttemptFailure, HarvestError};
use crate::filename::artifact_object_key;
use crate::navigate::{script_click_text, NavigationController};
use crate::page::{click_first_matching, DriverError, ListingPage};
use crate::progress::ProgressSink;
use crate::settings::HarvestSettings;
use crate::upload::ArtifactPipeline;
use crate::verify::{first_identifier, PageChangeVerifier};
use crate::{RunProgress, Stage};

/// Elements that may carry the sort option once the sort menu is open.
pub const SORT_OPTION_SELECTOR: &str = "a, button, li";

pub struct CollectionLoop {
    settings: HarvestSettings,
    profile: ListingProfile,
    listing_url: Url,
    normalizer: RecordNormalizer,
    navigator: NavigationController,
    verifier: PageChangeVerifier,
    artifacts: Arc<dyn ArtifactPipeline>,
}

struct Attempt<'a> {
    page: &'a dyn ListingPage,
    run: CollectionRun,
    persistence: DedupPersistence,
    progress: &'a dyn ProgressSink,
    number: u32,
    parse_sample_written: bool,
}

impl Attempt<'_> {
    fn report(&self, stage: Stage, page_number: u32) {
        self.progress.emit(RunProgress {
            attempt: self.number,
            stage,
            page_number,
            accepted: self.run.accepted_count(),
        });
    }
}

impl CollectionLoop {
    pub fn new(
        settings: HarvestSettings,
        profile: ListingProfile,
        artifacts: Arc<dyn ArtifactPipeline>,
    ) -> Result<Self, HarvestError> {
        let listing_url =
            Url::parse(&settings.listing_url).map_err(|err| HarvestError::InvalidListingUrl {
                url: settings.listing_url.clone(),
                reason: err.to_string(),
            })?;
        let normalizer = RecordNormalizer::new(listing_url.clone(), &profile);
        let navigator =
            NavigationController::new(listing_url.clone(), &profile, settings.page_load_timeout);
        let verifier = PageChangeVerifier::new(
            profile.record_selector.clone(),
            settings.verify_poll_interval,
            settings.page_load_timeout,
            settings.verify_reload_settle,
            settings.diagnostics_dir.clone(),
        );
        Ok(Self {
            settings,
            profile,
            listing_url,
            normalizer,
            navigator,
            verifier,
            artifacts,
        })
    }

    pub fn settings(&self) -> &HarvestSettings {
        &self.settings
    }

    pub fn log_path(&self, target_date: NaiveDate) -> PathBuf {
        dedup::log_path(
            &self.settings.tmp_dir,
            &self.settings.file_prefix,
            target_date,
        )
    }

    /// Runs one attempt to completion. Failures carry the statistics gathered
    /// so far; accepted records stay in the NDJSON log either way.
    pub async fn run(
        &self,
        page: &dyn ListingPage,
        target_date: NaiveDate,
        attempt: u32,
        progress: &dyn ProgressSink,
    ) -> Result<RunStats, AttemptFailure> {
        let log_path = self.log_path(target_date);
        let run = CollectionRun::with_sample_limit(
            target_date,
            self.settings.parse_failure_sample_limit,
        );
        let persistence = match DedupPersistence::open(log_path.clone()) {
            Ok(persistence) => persistence,
            Err(err) => {
                return Err(AttemptFailure {
                    error: err.into(),
                    stats: run.stats(RunOutcome::Incomplete, Some(log_path)),
                })
            }
        };

        let mut attempt = Attempt {
            page,
            run,
            persistence,
            progress,
            number: attempt,
            parse_sample_written: false,
        };
        let result = self.drive(&mut attempt).await;
        match result {
            Ok(outcome) => {
                let stats = attempt.run.stats(outcome, Some(log_path));
                engine_info!(
                    "Attempt {} finished: {:?}, {} pages, {} accepted, {} parse failures",
                    attempt.number,
                    stats.outcome,
                    stats.pages_scanned,
                    stats.accepted_count,
                    stats.parse_failure_count
                );
                Ok(stats)
            }
            Err(error) => Err(AttemptFailure {
                error,
                stats: attempt.run.stats(RunOutcome::Incomplete, Some(log_path)),
            }),
        }
    }

    async fn drive(&self, attempt: &mut Attempt<'_>) -> Result<RunOutcome, HarvestError> {
        attempt.report(Stage::OpeningSession, 0);
        self.open_listing(attempt.page).await?;

        attempt.report(Stage::Sorting, 0);
        if !self.sort_latest_first(attempt.page).await {
            engine_warn!("Could not apply latest-first sort; scanning in default order");
        }
        self.wait_for_records(attempt.page).await?;

        let (mut state, effects) = update(LoopState::new(self.settings.limits()), Msg::Started);
        let mut queue: VecDeque<Effect> = effects.into();

        while let Some(effect) = queue.pop_front() {
            let msg = match effect {
                Effect::ScanPage { page_number } => {
                    attempt.report(Stage::Scanning, page_number);
                    let passed_target_date = self.scan_page(attempt, page_number).await?;
                    Msg::PageScanned { passed_target_date }
                }
                Effect::Navigate { from_page } => {
                    attempt.report(Stage::Navigating, from_page);
                    let advanced = self.navigate(attempt.page, from_page).await?;
                    Msg::NavigationSettled { advanced }
                }
                Effect::RetryNavigation {
                    from_page,
                    failures,
                } => {
                    engine_warn!(
                        "Navigation from page {} failed ({} consecutive); retrying",
                        from_page,
                        failures
                    );
                    attempt.report(Stage::RetryingNavigation, from_page);
                    tokio::time::sleep(self.settings.nav_retry_delay).await;
                    let advanced = self.navigate(attempt.page, from_page).await?;
                    Msg::NavigationSettled { advanced }
                }
                Effect::Finish(outcome) => {
                    if let RunOutcome::Aborted(reason) = outcome {
                        engine_warn!("Collection aborted: {:?}", reason);
                    }
                    return Ok(outcome);
                }
            };
            let (next, effects) = update(state, msg);
            state = next;
            queue.extend(effects);
        }

        Ok(RunOutcome::Incomplete)
    }

    /// Loads the listing, retrying once with a reload and a fresh `goto`.
    async fn open_listing(&self, page: &dyn ListingPage) -> Result<(), HarvestError> {
        let url = self.listing_url.as_str();
        let timeout = self.settings.page_load_timeout;
        engine_info!("Opening listing {}", url);

        if let Err(first) = page.goto(url, timeout).await {
            engine_warn!("Initial load failed ({}); reloading and retrying", first);
            if let Err(err) = page.reload(timeout).await {
                engine_debug!("Reload after failed load errored: {}", err);
            }
            page.goto(url, timeout)
                .await
                .map_err(|err| HarvestError::InitialLoad(err.to_string()))?;
        }
        self.wait_for_records(page).await
    }

    async fn wait_for_records(&self, page: &dyn ListingPage) -> Result<(), HarvestError> {
        let selector = &self.profile.record_selector;
        if page
            .wait_for_selector(selector, self.settings.page_load_timeout)
            .await?
        {
            Ok(())
        } else {
            Err(HarvestError::InitialLoad(format!(
                "no {selector} elements within {:?}",
                self.settings.page_load_timeout
            )))
        }
    }

    /// Opens the sort menu and picks the latest-first option, falling back to
    /// script clicks for either step.
    pub async fn sort_latest_first(&self, page: &dyn ListingPage) -> bool {
        let control = &self.profile.sort_control;
        let opened = match click_first_matching(page, &control.css, control.text.as_deref()).await {
            Ok(true) => true,
            _ => match &control.text {
                Some(text) => script_click_text(page, text).await.unwrap_or(false),
                None => false,
            },
        };
        if !opened {
            return false;
        }

        let option = &self.profile.sort_option_text;
        let chosen = match click_first_matching(page, SORT_OPTION_SELECTOR, Some(option)).await {
            Ok(true) => true,
            _ => script_click_text(page, option).await.unwrap_or(false),
        };
        if chosen {
            engine_info!("Sorted listing by \"{}\"", option);
            tokio::time::sleep(self.settings.nav_settle_delay).await;
        }
        chosen
    }

    /// Scans every record on the current page. Returns whether a record older
    /// than the target date was seen.
    async fn scan_page(
        &self,
        attempt: &mut Attempt<'_>,
        page_number: u32,
    ) -> Result<bool, HarvestError> {
        let page = attempt.page;
        let selector = &self.profile.record_selector;
        attempt.run.record_page_scanned(page_number);
        let failures_before = attempt.run.parse_failure_count();

        let count = page.count(selector).await?;
        engine_debug!("Page {}: {} record elements", page_number, count);

        let mut passed_target_date = false;
        for index in 0..count {
            let identifier = card_read(page_number, index, "identifier", || {
                page.inner_text(selector, index)
            })
            .await;
            let Some(Some(identifier)) = identifier else {
                continue;
            };
            let identifier = identifier.trim();
            if !self.normalizer.is_genuine_identifier(identifier) {
                continue;
            }
            let href = card_read(page_number, index, "href", || {
                page.attribute(selector, index, "href")
            })
            .await;
            let Some(href) = href else {
                continue;
            };
            let href = href.unwrap_or_default();
            let card_text = self
                .card_text(page, page_number, index)
                .await
                .unwrap_or_else(|| identifier.to_string());
            if self.normalizer.is_excluded(&card_text) {
                engine_debug!("Skipping excluded card {}", identifier);
                continue;
            }

            let candidate = self
                .normalizer
                .candidate(page_number, identifier, &href, &card_text);
            match attempt.run.assess(&candidate) {
                Verdict::Accept => {
                    let key = artifact_object_key(
                        &self.profile,
                        attempt.run.target_date(),
                        &candidate.identifier,
                    );
                    let artifact = self.artifacts.store(&candidate, &key).await;
                    attempt.run.record_artifact(&artifact);
                    engine_info!(
                        "Page {}: accepted {} (artifact uploaded: {})",
                        page_number,
                        candidate.identifier,
                        artifact.uploaded
                    );
                    attempt
                        .persistence
                        .accept(&PersistedRecord::new(candidate, artifact))?;
                }
                Verdict::PassedTarget => {
                    engine_info!(
                        "Page {}: {} starts before {}; target date passed",
                        page_number,
                        candidate.identifier,
                        attempt.run.target_date()
                    );
                    passed_target_date = true;
                    break;
                }
                Verdict::ParseFailure => {
                    engine_debug!(
                        "Page {}: no start date for {}",
                        page_number,
                        candidate.identifier
                    )
                }
                Verdict::Newer | Verdict::Duplicate => {}
            }
        }

        if attempt.run.parse_failure_count() > failures_before && !attempt.parse_sample_written {
            attempt.parse_sample_written =
                capture_parse_failure_sample(page, &self.settings.diagnostics_dir)
                    .await
                    .is_some();
        }
        Ok(passed_target_date)
    }

    /// Text of the first ancestor that looks like a whole card, or of the
    /// outermost ancestor reached when none does. A failed read ends the walk.
    async fn card_text(
        &self,
        page: &dyn ListingPage,
        page_number: u32,
        index: usize,
    ) -> Option<String> {
        let selector = &self.profile.record_selector;
        let mut last = None;
        for depth in 1..=self.profile.max_card_depth {
            let text = card_read(page_number, index, "container", || {
                page.ancestor_text(selector, index, depth)
            })
            .await;
            let Some(Some(text)) = text else {
                break;
            };
            let upper = text.to_uppercase();
            if self
                .profile
                .card_markers
                .iter()
                .any(|marker| upper.contains(marker.as_str()))
            {
                return Some(text);
            }
            last = Some(text);
        }
        last
    }

    /// Advances the page and verifies the transition.
    async fn navigate(
        &self,
        page: &dyn ListingPage,
        from_page: u32,
    ) -> Result<bool, HarvestError> {
        let prev_url = page.url().await?;
        let prev_first = first_identifier(page, &self.profile.record_selector).await;

        if !self.navigator.advance(page, from_page).await {
            return Ok(false);
        }
        tokio::time::sleep(self.settings.nav_settle_delay).await;

        Ok(self
            .verifier
            .await_transition(
                page,
                &prev_url,
                prev_first.as_deref(),
                self.settings.page_load_timeout,
            )
            .await)
    }
}

/// One driver read for a single card, tried twice. `None` after the second
/// failure; the caller skips the card or falls back.
async fn card_read<T, F, Fut>(page_number: u32, index: usize, what: &str, read: F) -> Option<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, DriverError>>,
{
    match read().await {
        Ok(value) => return Some(value),
        Err(err) => engine_debug!(
            "Page {}: {} read of card {} failed, retrying: {}",
            page_number,
            what,
            index,
            err
        ),
    }
    match read().await {
        Ok(value) => Some(value),
        Err(err) => {
            engine_warn!(
                "Page {}: giving up on {} of card {}: {}",
                page_number,
                what,
                index,
                err
            );
            None
        }
    }
}
