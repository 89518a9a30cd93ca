use std::fmt;
use std::path::PathBuf;

use harvester_core::RunStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    OpeningSession,
    Sorting,
    Scanning,
    Navigating,
    RetryingNavigation,
    Restarting,
    Compacting,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunProgress {
    pub attempt: u32,
    pub stage: Stage,
    pub page_number: u32,
    pub accepted: usize,
}

/// Final result of a supervised run after compaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub stats: RunStats,
    pub record_count: usize,
    pub output_path: PathBuf,
    /// Storage key of the uploaded run document, when the upload succeeded.
    pub summary_object: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Progress(RunProgress),
    RunCompleted {
        result: Result<RunReport, RunFailure>,
    },
}

/// A run that gave up, with the best statistics available at that point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFailure {
    pub message: String,
    pub partial: Option<RunStats>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutput {
    pub bytes: Vec<u8>,
    pub metadata: FetchMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchMetadata {
    pub original_url: String,
    pub final_url: String,
    pub content_type: Option<String>,
    pub byte_len: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchError {
    pub(crate) fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for FetchError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    HttpStatus(u16),
    Timeout,
    RedirectLimitExceeded,
    TooLarge { max_bytes: u64, actual: Option<u64> },
    UnsupportedContentType { content_type: String },
    /// The body did not start with the configured signature.
    SignatureMismatch,
    Network,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::RedirectLimitExceeded => write!(f, "redirect limit exceeded"),
            FailureKind::TooLarge { max_bytes, actual } => {
                write!(f, "response too large (max {max_bytes}, actual {actual:?})")
            }
            FailureKind::UnsupportedContentType { content_type } => {
                write!(f, "unsupported content type {content_type}")
            }
            FailureKind::SignatureMismatch => write!(f, "unexpected body"),
            FailureKind::Network => write!(f, "network error"),
        }
    }
}
