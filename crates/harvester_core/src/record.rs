use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Optional metadata parsed from a listing card next to the dates.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuxFields {
    pub item: Option<String>,
    pub quantity: Option<u64>,
    pub department: Option<String>,
}

/// One record element as encountered on a listing page. Not persisted
/// unless it is accepted by the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCandidate {
    #[serde(rename = "page")]
    pub page_number: u32,
    pub identifier: String,
    pub detail_url: String,
    pub raw_text: String,
    pub start_datetime: Option<NaiveDateTime>,
    pub end_datetime: Option<NaiveDateTime>,
    #[serde(flatten)]
    pub aux: AuxFields,
}

/// Where the artifact behind a record ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactStatus {
    #[serde(rename = "artifact_storage_path")]
    pub storage_path: String,
    #[serde(rename = "artifact_content_hash")]
    pub content_hash: Option<String>,
    #[serde(rename = "artifact_uploaded")]
    pub uploaded: bool,
    #[serde(rename = "artifact_public_url")]
    pub public_url: Option<String>,
}

impl ArtifactStatus {
    /// Status for an artifact that could not be fetched or stored.
    pub fn failed(storage_path: impl Into<String>, public_url: Option<String>) -> Self {
        Self {
            storage_path: storage_path.into(),
            content_hash: None,
            uploaded: false,
            public_url,
        }
    }
}

/// An accepted candidate plus its artifact status. One NDJSON line each.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRecord {
    #[serde(flatten)]
    pub candidate: RecordCandidate,
    #[serde(flatten)]
    pub artifact: ArtifactStatus,
}

impl PersistedRecord {
    pub fn new(candidate: RecordCandidate, artifact: ArtifactStatus) -> Self {
        Self {
            candidate,
            artifact,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.candidate.identifier
    }
}
