use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Instant;

use chrono::NaiveDate;
use engine_logging::{engine_info, engine_warn};
use harvester_core::ListingProfile;

use crate::collect::CollectionLoop;
use crate::dedup::{document_filename, finalize};
use crate::error::HarvestError;
use crate::filename::summary_object_key;
use crate::page::BrowserSession;
use crate::persist::AtomicFileWriter;
use crate::progress::{ChannelProgressSink, ProgressSink};
use crate::settings::HarvestSettings;
use crate::supervisor::RestartSupervisor;
use crate::upload::{ArtifactPipeline, ArtifactUploader};
use crate::{EngineEvent, RunFailure, RunProgress, RunReport, Stage};

/// Everything needed for one dated harvest.
#[derive(Debug, Clone)]
pub struct HarvestJob {
    pub target_date: NaiveDate,
    pub settings: HarvestSettings,
    pub profile: ListingProfile,
}

/// IO collaborators of a harvest.
#[derive(Clone)]
pub struct HarvestServices {
    pub session: Arc<dyn BrowserSession>,
    pub artifacts: Arc<dyn ArtifactPipeline>,
    /// Uploads the run document when present.
    pub summary_uploader: Option<ArtifactUploader>,
}

/// Supervised collection, compaction into the run document and the
/// run-document upload.
pub async fn run_harvest(
    job: &HarvestJob,
    services: &HarvestServices,
    progress: &dyn ProgressSink,
) -> Result<RunReport, HarvestError> {
    let started = Instant::now();
    engine_info!("Harvesting records for {}", job.target_date);

    let collection = CollectionLoop::new(
        job.settings.clone(),
        job.profile.clone(),
        services.artifacts.clone(),
    )?;
    let stats = RestartSupervisor::new(services.session.as_ref(), &collection, progress)
        .run_with_retries(job.target_date)
        .await?;

    progress.emit(RunProgress {
        attempt: 0,
        stage: Stage::Compacting,
        page_number: stats.pages_scanned,
        accepted: stats.accepted_count,
    });
    let filename = document_filename(&job.settings.file_prefix, job.target_date);
    let writer = AtomicFileWriter::new(job.settings.data_dir.clone());
    let finalized = finalize(&collection.log_path(job.target_date), &writer, &filename)?;

    let mut summary_object = None;
    if let Some(uploader) = &services.summary_uploader {
        let key = summary_object_key(&filename);
        match std::fs::read(&finalized.output_path) {
            Ok(bytes) => match uploader.upload_json(&bytes, &key).await {
                Ok(()) => {
                    engine_info!("Uploaded run document to {}", key);
                    summary_object = Some(key);
                }
                Err(err) => engine_warn!("Run document upload failed: {}", err),
            },
            Err(err) => engine_warn!("Could not read run document for upload: {}", err),
        }
    }

    progress.emit(RunProgress {
        attempt: 0,
        stage: Stage::Done,
        page_number: stats.pages_scanned,
        accepted: stats.accepted_count,
    });
    engine_info!(
        "Harvest for {} finished in {:.1}s: {} records",
        job.target_date,
        started.elapsed().as_secs_f64(),
        finalized.document.record_count
    );

    Ok(RunReport {
        record_count: finalized.document.record_count,
        output_path: finalized.output_path,
        summary_object,
        stats,
    })
}

impl From<HarvestError> for RunFailure {
    fn from(err: HarvestError) -> Self {
        Self {
            message: err.to_string(),
            partial: err.partial_stats().cloned(),
        }
    }
}

/// Runs one harvest on a background tokio runtime and reports over a channel.
pub struct EngineHandle {
    event_rx: mpsc::Receiver<EngineEvent>,
    worker: Option<thread::JoinHandle<()>>,
}

impl EngineHandle {
    pub fn start(job: HarvestJob, services: HarvestServices) -> Self {
        let (event_tx, event_rx) = mpsc::channel();

        let worker = thread::spawn(move || {
            let result = match tokio::runtime::Runtime::new() {
                Ok(runtime) => {
                    let sink = ChannelProgressSink::new(event_tx.clone());
                    runtime
                        .block_on(run_harvest(&job, &services, &sink))
                        .map_err(RunFailure::from)
                }
                Err(err) => Err(RunFailure {
                    message: format!("tokio runtime: {err}"),
                    partial: None,
                }),
            };
            let _ = event_tx.send(EngineEvent::RunCompleted { result });
        });

        Self {
            event_rx,
            worker: Some(worker),
        }
    }

    pub fn try_recv(&self) -> Option<EngineEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Blocks for the next event; `None` once the worker is gone.
    pub fn recv(&self) -> Option<EngineEvent> {
        self.event_rx.recv().ok()
    }

    pub fn join(mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
