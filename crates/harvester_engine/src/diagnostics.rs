//! Best-effort snapshots of the listing page for post-mortem debugging.
use std::path::{Path, PathBuf};

use chrono::Utc;
use engine_logging::{engine_info, engine_warn};

use crate::filename::snapshot_stem;
use crate::page::ListingPage;
use crate::persist::AtomicFileWriter;

/// Paths written by one snapshot. Either half may be missing if capturing it
/// failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub html: Option<PathBuf>,
    pub screenshot: Option<PathBuf>,
}

/// Writes `{stem}_{timestamp}.html` and `.png` into `dir`. Never fails the
/// caller.
pub async fn capture_failure_snapshot(page: &dyn ListingPage, dir: &Path, stem: &str) -> Snapshot {
    let writer = AtomicFileWriter::new(dir.to_path_buf());
    let base = snapshot_stem(stem, Utc::now());
    let mut snapshot = Snapshot::default();

    match page.content().await {
        Ok(html) => match writer.write(&format!("{base}.html"), &html) {
            Ok(path) => snapshot.html = Some(path),
            Err(err) => engine_warn!("Could not write HTML snapshot: {}", err),
        },
        Err(err) => engine_warn!("Could not read page HTML for snapshot: {}", err),
    }

    match page.screenshot().await {
        Ok(png) => match writer.write(&format!("{base}.png"), &png) {
            Ok(path) => snapshot.screenshot = Some(path),
            Err(err) => engine_warn!("Could not write screenshot: {}", err),
        },
        Err(err) => engine_warn!("Could not take screenshot: {}", err),
    }

    if snapshot.html.is_some() || snapshot.screenshot.is_some() {
        engine_info!("Saved failure snapshot {:?}", snapshot);
    }
    snapshot
}

/// HTML of the current page, kept when cards on it could not be parsed.
pub async fn capture_parse_failure_sample(page: &dyn ListingPage, dir: &Path) -> Option<PathBuf> {
    let html = match page.content().await {
        Ok(html) => html,
        Err(err) => {
            engine_warn!("Could not read page HTML for parse-failure sample: {}", err);
            return None;
        }
    };
    let filename = format!("{}.html", snapshot_stem("parse_failure", Utc::now()));
    match AtomicFileWriter::new(dir.to_path_buf()).write(&filename, &html) {
        Ok(path) => {
            engine_info!("Saved parse-failure sample to {:?}", path);
            Some(path)
        }
        Err(err) => {
            engine_warn!("Could not write parse-failure sample: {}", err);
            None
        }
    }
}
