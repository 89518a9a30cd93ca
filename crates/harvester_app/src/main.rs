mod cli;
mod logging;
mod profile;

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use engine_logging::{engine_error, engine_info};
use harvester_core::RunStats;
use harvester_engine::{
    ArtifactUploader, BrowserSession, EngineEvent, EngineHandle, FetchAndUpload, HarvestJob,
    HarvestServices, HarvestSettings, ReqwestFetcher, RunFailure, RunReport, StorageClient,
};

use crate::cli::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::initialize(
        engine_logging::parse_level(&cli.log_level),
        cli.log_file.as_deref(),
    );

    let target_date = cli.target_date();
    let settings = cli.build_settings()?;
    let profile = profile::load_profile(cli.profile.as_deref())?;
    let storage = cli
        .build_storage()?
        .context("SUPABASE_URL and SUPABASE_SERVICE_ROLE_KEY are required")?;
    let storage = Arc::new(StorageClient::new(storage).context("failed to build storage client")?);
    let fetcher =
        Arc::new(ReqwestFetcher::new(cli.build_fetch()).context("failed to build fetcher")?);
    let session = browser_session(&cli, &settings)?;

    let services = HarvestServices {
        session,
        artifacts: Arc::new(FetchAndUpload::new(
            fetcher,
            ArtifactUploader::new(storage.clone()),
        )),
        summary_uploader: Some(ArtifactUploader::new(storage)),
    };
    let job = HarvestJob {
        target_date,
        settings,
        profile,
    };

    engine_info!("Harvesting records that started on {}", target_date);
    let handle = EngineHandle::start(job, services);
    let result = loop {
        match handle.recv() {
            Some(EngineEvent::Progress(progress)) => engine_info!(
                "attempt {} {:?}: page {}, {} accepted",
                progress.attempt,
                progress.stage,
                progress.page_number,
                progress.accepted
            ),
            Some(EngineEvent::RunCompleted { result }) => break result,
            None => {
                break Err(RunFailure {
                    message: "engine stopped without reporting a result".to_string(),
                    partial: None,
                })
            }
        }
    };
    handle.join();

    match result {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(failure) => {
            if let Some(stats) = &failure.partial {
                print_stats(stats);
            }
            engine_error!("Harvest failed: {}", failure.message);
            Err(anyhow!(failure.message))
        }
    }
}

#[cfg(feature = "chromium")]
fn browser_session(cli: &Cli, settings: &HarvestSettings) -> Result<Arc<dyn BrowserSession>> {
    use harvester_engine::{ChromiumSession, ChromiumSettings};

    Ok(Arc::new(ChromiumSession::new(ChromiumSettings {
        headless: !cli.headful,
        user_agent: settings.user_agent.clone(),
        action_timeout: settings.page_load_timeout,
    })))
}

#[cfg(not(feature = "chromium"))]
fn browser_session(_cli: &Cli, _settings: &HarvestSettings) -> Result<Arc<dyn BrowserSession>> {
    Err(anyhow!(
        "this build has no browser driver; rebuild with `--features chromium`"
    ))
}

fn print_report(report: &RunReport) {
    print_stats(&report.stats);
    println!("unique records:   {}", report.record_count);
    println!("run document:     {}", report.output_path.display());
    if let Some(key) = &report.summary_object {
        println!("uploaded as:      {key}");
    }
}

fn print_stats(stats: &RunStats) {
    println!("target date:      {}", stats.target_date);
    println!("outcome:          {:?}", stats.outcome);
    println!("pages scanned:    {}", stats.pages_scanned);
    println!("records accepted: {}", stats.accepted_count);
    println!(
        "artifacts:        {} uploaded, {} already stored, {} failed",
        stats.artifacts_uploaded, stats.artifacts_skipped, stats.artifacts_failed
    );
    if stats.parse_failure_count > 0 {
        println!("parse failures:   {}", stats.parse_failure_count);
    }
}
