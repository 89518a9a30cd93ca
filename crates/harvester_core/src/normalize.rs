//! Turns raw listing-card text into typed candidate records.
//!
//! The card text is free-form and its date formatting drifts between
//! deployments of the listing UI, so date parsing walks an ordered list of
//! labelled patterns before falling back to the first date-like token.
use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use url::Url;

use crate::profile::ListingProfile;
use crate::record::{AuxFields, RecordCandidate};

pub const START_LABEL: &str = "Start Date";
pub const END_LABEL: &str = "End Date";

/// Labelled pattern bodies (the label and colon are prepended) and the
/// chrono formats to try on the captured text, in order.
const LABELLED_PATTERNS: &[(&str, &[&str])] = &[
    (
        r"([0-9]{2}-[0-9]{2}-[0-9]{4}\s+[0-9]{1,2}:[0-9]{2}\s+[AP]M)",
        &["%d-%m-%Y %I:%M %p"],
    ),
    (
        r"([0-9]{1,2}-[0-9]{1,2}-[0-9]{4}\s+[0-9]{1,2}:[0-9]{2}\s+[AP]M)",
        &["%d-%m-%Y %I:%M %p"],
    ),
    (
        r"([0-9]{2}-[0-9]{2}-[0-9]{4}\s+[0-9]{2}:[0-9]{2})",
        &["%d-%m-%Y %H:%M"],
    ),
    (
        r"([0-9]{2}/[0-9]{2}/[0-9]{4}\s+[0-9]{1,2}:[0-9]{2}(?:\s*[AP]M)?)",
        &["%d/%m/%Y %I:%M %p", "%d/%m/%Y %H:%M"],
    ),
];

type LabelledTable = Vec<(Regex, &'static [&'static str])>;

static START_PATTERNS: LazyLock<LabelledTable> = LazyLock::new(|| labelled_table(START_LABEL));

static END_PATTERNS: LazyLock<LabelledTable> = LazyLock::new(|| labelled_table(END_LABEL));

fn labelled_table(label: &str) -> LabelledTable {
    let label = regex::escape(label);
    LABELLED_PATTERNS
        .iter()
        .filter_map(|(body, formats)| {
            Regex::new(&format!(r"(?i){label}:\s*{body}"))
                .ok()
                .map(|re| (re, *formats))
        })
        .collect()
}

static GENERIC_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)([0-9]{1,2})[/-]([0-9]{1,2})[/-]([0-9]{4})(?:\s+([0-9]{1,2}):([0-9]{2})(?:\s*([AP]M))?)?",
    )
    .expect("generic date pattern")
});

static ITEMS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Items:\s*(.+?)(?:\s+Quantity:|$)").expect("items pattern"));

static QUANTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Quantity:\s*([\d,]+)").expect("quantity pattern"));

static DEPARTMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Department Name And Address:\s*(.+?)\s*(?:Start Date:|End Date:|$)")
        .expect("department pattern")
});

/// Collapses every whitespace run (including newlines) into one space.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parses the datetime following `label:` in `raw_text`.
pub fn parse_labeled_datetime(raw_text: &str, label: &str) -> Option<NaiveDateTime> {
    let text = collapse_whitespace(raw_text);
    if text.is_empty() {
        return None;
    }

    let labelled = match label {
        START_LABEL => match_labelled(&START_PATTERNS, &text),
        END_LABEL => match_labelled(&END_PATTERNS, &text),
        other => match_labelled(&labelled_table(other), &text),
    };
    labelled.or_else(|| parse_generic_datetime(&text))
}

fn match_labelled(table: &LabelledTable, text: &str) -> Option<NaiveDateTime> {
    for (re, formats) in table {
        let Some(caps) = re.captures(text) else {
            continue;
        };
        let candidate = caps[1].trim();
        for fmt in formats.iter() {
            if let Ok(parsed) = NaiveDateTime::parse_from_str(candidate, fmt) {
                return Some(parsed);
            }
        }
    }
    None
}

pub fn parse_start_datetime(raw_text: &str) -> Option<NaiveDateTime> {
    parse_labeled_datetime(raw_text, START_LABEL)
}

pub fn parse_end_datetime(raw_text: &str) -> Option<NaiveDateTime> {
    parse_labeled_datetime(raw_text, END_LABEL)
}

/// Day-first parse of the first date-like token anywhere in `text`.
fn parse_generic_datetime(text: &str) -> Option<NaiveDateTime> {
    let caps = GENERIC_DATE.captures(text)?;
    let day: u32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let year: i32 = caps[3].parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;

    let time = match (caps.get(4), caps.get(5)) {
        (Some(h), Some(m)) => {
            let mut hour: u32 = h.as_str().parse().ok()?;
            let minute: u32 = m.as_str().parse().ok()?;
            if let Some(meridiem) = caps.get(6) {
                let pm = meridiem.as_str().eq_ignore_ascii_case("pm");
                hour = match (hour, pm) {
                    (12, false) => 0,
                    (12, true) => 12,
                    (h, true) => h + 12,
                    (h, false) => h,
                };
            }
            NaiveTime::from_hms_opt(hour, minute, 0)?
        }
        _ => NaiveTime::MIN,
    };
    Some(date.and_time(time))
}

/// Best-effort item, quantity and department from the card text.
pub fn parse_extra_fields(raw_text: &str) -> AuxFields {
    let joined = raw_text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    let item = ITEMS
        .captures(&joined)
        .map(|c| c[1].trim_matches(|ch| ch == ' ' || ch == '.').to_string())
        .filter(|s| !s.is_empty());
    let quantity = QUANTITY
        .captures(&joined)
        .and_then(|c| c[1].replace(',', "").parse::<u64>().ok());
    let department = DEPARTMENT
        .captures(&joined)
        .map(|c| c[1].trim().to_string())
        .filter(|s| !s.is_empty());

    AuxFields {
        item,
        quantity,
        department,
    }
}

/// Builds [`RecordCandidate`]s and applies the profile's identifier rules.
#[derive(Debug, Clone)]
pub struct RecordNormalizer {
    base_url: Url,
    identifier_marker: String,
    exclusion_marker: Option<String>,
}

impl RecordNormalizer {
    pub fn new(base_url: Url, profile: &ListingProfile) -> Self {
        Self {
            base_url,
            identifier_marker: profile.identifier_marker.clone(),
            exclusion_marker: profile
                .exclusion_marker
                .as_ref()
                .map(|m| m.to_uppercase()),
        }
    }

    /// Whether the link text looks like a real record identifier rather than
    /// an auxiliary entry that shares the same markup.
    pub fn is_genuine_identifier(&self, identifier: &str) -> bool {
        identifier.contains(&self.identifier_marker)
    }

    pub fn is_excluded(&self, raw_text: &str) -> bool {
        match &self.exclusion_marker {
            Some(marker) => raw_text.to_uppercase().contains(marker),
            None => false,
        }
    }

    pub fn resolve_detail_url(&self, href: &str) -> String {
        match self.base_url.join(href.trim()) {
            Ok(url) => url.to_string(),
            Err(_) => href.to_string(),
        }
    }

    pub fn candidate(
        &self,
        page_number: u32,
        identifier: &str,
        href: &str,
        raw_text: &str,
    ) -> RecordCandidate {
        RecordCandidate {
            page_number,
            identifier: identifier.trim().to_string(),
            detail_url: self.resolve_detail_url(href),
            raw_text: raw_text.to_string(),
            start_datetime: parse_start_datetime(raw_text),
            end_datetime: parse_end_datetime(raw_text),
            aux: parse_extra_fields(raw_text),
        }
    }
}
