use std::sync::Arc;

use engine_logging::{engine_debug, engine_info, engine_warn};
use harvester_core::{ArtifactStatus, RecordCandidate};
use sha2::{Digest, Sha256};

use crate::fetch::Fetcher;
use crate::storage::{StorageClient, StorageError};

const ARTIFACT_CONTENT_TYPE: &str = "application/pdf";
const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    /// `false` when the stored object already carried the same hash.
    pub uploaded: bool,
    pub content_hash: String,
}

/// Lower-case hex SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Content-addressed, idempotent artifact uploads.
#[derive(Debug, Clone)]
pub struct ArtifactUploader {
    storage: Arc<StorageClient>,
}

impl ArtifactUploader {
    pub fn new(storage: Arc<StorageClient>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &StorageClient {
        &self.storage
    }

    /// Stores `bytes` at `object_key` unless an object with the same content
    /// hash is already there.
    pub async fn upload(
        &self,
        bytes: &[u8],
        object_key: &str,
    ) -> Result<UploadOutcome, StorageError> {
        let hash = content_hash(bytes);

        if let Some(existing) = self.storage.probe_hash(object_key).await {
            if existing.eq_ignore_ascii_case(&hash) {
                engine_info!(
                    "Skipping upload for {}; content hash matches existing object",
                    object_key
                );
                return Ok(UploadOutcome {
                    uploaded: false,
                    content_hash: hash,
                });
            }
            engine_debug!("Stored hash differs for {}; overwriting", object_key);
        }

        let settings = self.storage.settings();
        self.storage
            .upsert(
                object_key,
                bytes,
                ARTIFACT_CONTENT_TYPE,
                Some(&hash),
                settings.upload_timeout,
            )
            .await?;
        tokio::time::sleep(settings.politeness_delay).await;

        Ok(UploadOutcome {
            uploaded: true,
            content_hash: hash,
        })
    }

    /// Upserts a JSON document without the hash probe.
    pub async fn upload_json(&self, bytes: &[u8], object_key: &str) -> Result<(), StorageError> {
        let timeout = self.storage.settings().json_timeout;
        self.storage
            .upsert(object_key, bytes, JSON_CONTENT_TYPE, None, timeout)
            .await
    }
}

/// Turns an accepted candidate into a stored artifact. Failures are folded
/// into the returned status so the record is still persisted.
#[async_trait::async_trait]
pub trait ArtifactPipeline: Send + Sync {
    async fn store(&self, candidate: &RecordCandidate, object_key: &str) -> ArtifactStatus;
}

/// Downloads the detail URL and hands the bytes to an [`ArtifactUploader`].
pub struct FetchAndUpload {
    fetcher: Arc<dyn Fetcher>,
    uploader: ArtifactUploader,
}

impl FetchAndUpload {
    pub fn new(fetcher: Arc<dyn Fetcher>, uploader: ArtifactUploader) -> Self {
        Self { fetcher, uploader }
    }
}

#[async_trait::async_trait]
impl ArtifactPipeline for FetchAndUpload {
    async fn store(&self, candidate: &RecordCandidate, object_key: &str) -> ArtifactStatus {
        let public_url = Some(self.uploader.storage().public_url(object_key));

        let fetched = match self.fetcher.fetch(&candidate.detail_url).await {
            Ok(fetched) => fetched,
            Err(err) => {
                engine_warn!("Download failed for {}: {}", candidate.identifier, err);
                return ArtifactStatus::failed(object_key, public_url);
            }
        };

        match self.uploader.upload(&fetched.bytes, object_key).await {
            Ok(outcome) => ArtifactStatus {
                storage_path: object_key.to_string(),
                content_hash: Some(outcome.content_hash),
                uploaded: outcome.uploaded,
                public_url,
            },
            Err(err) => {
                engine_warn!("Upload failed for {}: {}", candidate.identifier, err);
                ArtifactStatus::failed(object_key, public_url)
            }
        }
    }
}
