//! Harvester engine: browser-driven collection, persistence and artifact
//! storage around the pure state machine in `harvester_core`.
#[cfg(feature = "chromium")]
mod chromium;
mod collect;
mod dedup;
mod diagnostics;
mod engine;
mod error;
mod fetch;
mod filename;
mod navigate;
mod page;
mod persist;
mod progress;
mod settings;
mod storage;
mod supervisor;
mod types;
mod upload;
mod verify;

#[cfg(feature = "chromium")]
pub use chromium::{ChromiumSession, ChromiumSettings};
pub use collect::{CollectionLoop, SORT_OPTION_SELECTOR};
pub use dedup::{
    compact, document_filename, finalize, log_path, CompactedDocument, Compaction,
    DedupPersistence, Finalized,
};
pub use diagnostics::{capture_failure_snapshot, capture_parse_failure_sample, Snapshot};
pub use engine::{run_harvest, EngineHandle, HarvestJob, HarvestServices};
pub use error::{AttemptFailure, HarvestError};
pub use fetch::{FetchSettings, Fetcher, ReqwestFetcher, DEFAULT_USER_AGENT};
pub use filename::{artifact_object_key, snapshot_stem, summary_object_key};
pub use navigate::{
    NavStrategy, NavigationController, NextControl, NumberedLink, Reload, ScriptClick,
    ScriptHref,
};
pub use page::{BrowserSession, DriverError, ListingPage};
pub use persist::{ensure_output_dir, AtomicFileWriter, PersistError};
pub use progress::{ChannelProgressSink, NoProgress, ProgressSink};
pub use settings::HarvestSettings;
pub use storage::{StorageClient, StorageError, StorageSettings, CONTENT_HASH_HEADER};
pub use supervisor::RestartSupervisor;
pub use types::{
    EngineEvent, FailureKind, FetchError, FetchMetadata, FetchOutput, RunFailure, RunProgress,
    RunReport, Stage,
};
pub use upload::{content_hash, ArtifactPipeline, ArtifactUploader, FetchAndUpload, UploadOutcome};
pub use verify::{first_identifier, PageChangeVerifier};
