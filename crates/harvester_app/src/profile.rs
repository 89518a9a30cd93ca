use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use engine_logging::engine_info;
use harvester_core::ListingProfile;

/// Reads a listing profile from a RON file. Fields missing from the file
/// keep their built-in defaults.
pub(crate) fn load_profile(path: Option<&Path>) -> Result<ListingProfile> {
    let Some(path) = path else {
        return Ok(ListingProfile::default());
    };
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read listing profile {:?}", path))?;
    let profile: ListingProfile = ron::from_str(&content)
        .with_context(|| format!("failed to parse listing profile {:?}", path))?;
    engine_info!("Loaded listing profile from {:?}", path);
    Ok(profile)
}
