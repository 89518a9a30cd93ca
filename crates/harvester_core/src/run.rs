use std::collections::HashSet;
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::record::{ArtifactStatus, RecordCandidate};

pub const DEFAULT_SAMPLE_LIMIT: usize = 3;
/// Raw text kept per parse-failure sample, in characters.
pub const SAMPLE_TEXT_LIMIT: usize = 400;

/// What the stop policy makes of one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Start date equals the target date and the identifier is new.
    Accept,
    /// Start date is strictly older than the target date.
    PassedTarget,
    /// Start date is newer than the target date.
    Newer,
    Duplicate,
    /// No start date could be parsed; counted and sampled.
    ParseFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbortReason {
    NavigationFailures { consecutive: u32 },
    MaxPages { max_pages: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    /// Passed the target date after scanning at least `min_pages`.
    Done,
    Aborted(AbortReason),
    /// The attempt failed before reaching a terminal state.
    Incomplete,
}

/// Aggregate statistics reported for every run, including failed ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub target_date: NaiveDate,
    pub pages_scanned: u32,
    pub seen_count: usize,
    pub accepted_count: usize,
    pub artifacts_uploaded: usize,
    pub artifacts_skipped: usize,
    pub artifacts_failed: usize,
    pub parse_failure_count: usize,
    pub parse_failure_samples: Vec<String>,
    pub outcome: RunOutcome,
    pub log_path: Option<PathBuf>,
}

/// Per-run bookkeeping owned by the collection loop.
#[derive(Debug, Clone)]
pub struct CollectionRun {
    target_date: NaiveDate,
    seen: HashSet<String>,
    parse_failure_count: usize,
    parse_failure_samples: Vec<String>,
    sample_limit: usize,
    pages_scanned: u32,
    accepted_count: usize,
    artifacts_uploaded: usize,
    artifacts_skipped: usize,
    artifacts_failed: usize,
}

impl CollectionRun {
    pub fn new(target_date: NaiveDate) -> Self {
        Self::with_sample_limit(target_date, DEFAULT_SAMPLE_LIMIT)
    }

    pub fn with_sample_limit(target_date: NaiveDate, sample_limit: usize) -> Self {
        Self {
            target_date,
            seen: HashSet::new(),
            parse_failure_count: 0,
            parse_failure_samples: Vec::new(),
            sample_limit,
            pages_scanned: 0,
            accepted_count: 0,
            artifacts_uploaded: 0,
            artifacts_skipped: 0,
            artifacts_failed: 0,
        }
    }

    pub fn target_date(&self) -> NaiveDate {
        self.target_date
    }

    pub fn parse_failure_count(&self) -> usize {
        self.parse_failure_count
    }

    pub fn parse_failure_samples(&self) -> &[String] {
        &self.parse_failure_samples
    }

    pub fn accepted_count(&self) -> usize {
        self.accepted_count
    }

    pub fn has_seen(&self, identifier: &str) -> bool {
        self.seen.contains(identifier)
    }

    /// Applies the date window to `candidate`. An `Accept` verdict claims the
    /// identifier, so a second candidate with the same identifier is a
    /// `Duplicate`.
    pub fn assess(&mut self, candidate: &RecordCandidate) -> Verdict {
        let Some(start) = candidate.start_datetime else {
            self.record_parse_failure(&candidate.raw_text);
            return Verdict::ParseFailure;
        };

        let date = start.date();
        if date < self.target_date {
            return Verdict::PassedTarget;
        }
        if date > self.target_date {
            return Verdict::Newer;
        }
        if !self.seen.insert(candidate.identifier.clone()) {
            return Verdict::Duplicate;
        }
        self.accepted_count += 1;
        Verdict::Accept
    }

    pub fn record_parse_failure(&mut self, raw_text: &str) {
        self.parse_failure_count += 1;
        if self.parse_failure_samples.len() < self.sample_limit {
            self.parse_failure_samples
                .push(raw_text.chars().take(SAMPLE_TEXT_LIMIT).collect());
        }
    }

    pub fn record_page_scanned(&mut self, page_number: u32) {
        self.pages_scanned = self.pages_scanned.max(page_number);
    }

    pub fn record_artifact(&mut self, status: &ArtifactStatus) {
        if status.uploaded {
            self.artifacts_uploaded += 1;
        } else if status.content_hash.is_some() {
            self.artifacts_skipped += 1;
        } else {
            self.artifacts_failed += 1;
        }
    }

    pub fn stats(&self, outcome: RunOutcome, log_path: Option<PathBuf>) -> RunStats {
        RunStats {
            target_date: self.target_date,
            pages_scanned: self.pages_scanned,
            seen_count: self.seen.len(),
            accepted_count: self.accepted_count,
            artifacts_uploaded: self.artifacts_uploaded,
            artifacts_skipped: self.artifacts_skipped,
            artifacts_failed: self.artifacts_failed,
            parse_failure_count: self.parse_failure_count,
            parse_failure_samples: self.parse_failure_samples.clone(),
            outcome,
            log_path,
        }
    }
}
