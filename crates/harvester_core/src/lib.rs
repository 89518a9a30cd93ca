//! Harvester core: record model, card normalization and the pure
//! stop-policy state machine that drives a collection run.
mod effect;
mod msg;
mod normalize;
mod profile;
mod record;
mod run;
mod state;
mod update;

pub use effect::Effect;
pub use msg::Msg;
pub use normalize::{
    collapse_whitespace, parse_end_datetime, parse_extra_fields, parse_labeled_datetime,
    parse_start_datetime, RecordNormalizer, END_LABEL, START_LABEL,
};
pub use profile::{ControlSelector, ListingProfile};
pub use record::{ArtifactStatus, AuxFields, PersistedRecord, RecordCandidate};
pub use run::{
    AbortReason, CollectionRun, RunOutcome, RunStats, Verdict, DEFAULT_SAMPLE_LIMIT,
    SAMPLE_TEXT_LIMIT,
};
pub use state::{LoopLimits, LoopState, Phase};
pub use update::update;
