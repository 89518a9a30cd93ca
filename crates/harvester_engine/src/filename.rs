use chrono::{DateTime, NaiveDate, Utc};
use harvester_core::ListingProfile;

/// Deterministic storage key for the artifact of `identifier`:
/// `{prefix}/{YYYY-MM-DD}/{stem}_{ddmmyy}_{suffix}.{ext}`.
///
/// `GEM/2025/B/6950285` on 2025-12-01 becomes
/// `bids/2025-12-01/GeM_011225_B_6950285.pdf`.
pub fn artifact_object_key(
    profile: &ListingProfile,
    target_date: NaiveDate,
    identifier: &str,
) -> String {
    format!(
        "{}/{}/{}_{}_{}.{}",
        profile.object_prefix.trim_matches('/'),
        target_date.format("%Y-%m-%d"),
        profile.object_stem,
        target_date.format("%d%m%y"),
        identifier_suffix(identifier),
        profile.object_extension
    )
}

/// Last two `/`-separated parts joined by `_`, or the whole identifier with
/// `/` replaced when it has fewer parts.
fn identifier_suffix(identifier: &str) -> String {
    let identifier = identifier.trim();
    let parts: Vec<&str> = identifier.split('/').collect();
    let suffix = if parts.len() >= 2 {
        parts[parts.len() - 2..].join("_")
    } else {
        identifier.replace('/', "_")
    };
    suffix.chars().map(sanitize_char).collect()
}

fn sanitize_char(c: char) -> char {
    if is_forbidden(c) {
        '_'
    } else {
        c
    }
}

fn is_forbidden(c: char) -> bool {
    matches!(c,
        '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0'..='\u{1F}'
    )
}

/// `daily_meta/{filename}`
pub fn summary_object_key(document_filename: &str) -> String {
    format!("daily_meta/{document_filename}")
}

/// `{stem}_{YYYYMMDDTHHMMSSmmmZ}`, shared by the `.html` and `.png` halves of
/// a diagnostics snapshot.
pub fn snapshot_stem(stem: &str, at: DateTime<Utc>) -> String {
    format!("{stem}_{}", at.format("%Y%m%dT%H%M%S%3fZ"))
}
