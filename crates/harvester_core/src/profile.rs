use serde::{Deserialize, Serialize};

/// A CSS selector, optionally narrowed to elements whose visible text
/// contains `text` (case-insensitive).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlSelector {
    pub css: String,
    #[serde(default)]
    pub text: Option<String>,
}

impl ControlSelector {
    pub fn css(css: &str) -> Self {
        Self {
            css: css.to_string(),
            text: None,
        }
    }

    pub fn with_text(css: &str, text: &str) -> Self {
        Self {
            css: css.to_string(),
            text: Some(text.to_string()),
        }
    }

    /// Whether `visible` satisfies the optional text filter.
    pub fn text_matches(&self, visible: &str) -> bool {
        match &self.text {
            Some(wanted) => visible
                .to_lowercase()
                .contains(&wanted.to_lowercase()),
            None => true,
        }
    }
}

/// Markup knowledge about the listing UI. Everything that tends to change
/// when the site is redesigned lives here so it can be swapped from a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingProfile {
    /// Anchor carrying a record's identifier text and detail href.
    pub record_selector: String,
    /// Substring a genuine identifier must contain.
    pub identifier_marker: String,
    /// Cards whose text contains this (case-insensitive) are skipped.
    pub exclusion_marker: Option<String>,
    /// Upper-cased substrings that identify the full card around a record link.
    pub card_markers: Vec<String>,
    pub max_card_depth: usize,
    pub next_controls: Vec<ControlSelector>,
    pub next_tokens: Vec<String>,
    pub sort_control: ControlSelector,
    pub sort_option_text: String,
    pub object_prefix: String,
    pub object_stem: String,
    pub object_extension: String,
}

impl Default for ListingProfile {
    fn default() -> Self {
        Self {
            record_selector: "a.bid_no_hover".to_string(),
            identifier_marker: "/B/".to_string(),
            exclusion_marker: Some("RA NO".to_string()),
            card_markers: vec![
                "ITEMS:".to_string(),
                "START DATE".to_string(),
                "QUANTITY:".to_string(),
            ],
            max_card_depth: 8,
            next_controls: vec![
                ControlSelector::css("a[aria-label='Next']"),
                ControlSelector::css("a.page-link[rel='next']"),
                ControlSelector::css("a[rel='next']"),
                ControlSelector::css("a[title='Next']"),
                ControlSelector::with_text("a", "Next"),
                ControlSelector::with_text("button", "Next"),
            ],
            next_tokens: ["next", "›", "»", "more", "→"]
                .iter()
                .map(|t| t.to_string())
                .collect(),
            sort_control: ControlSelector::with_text("button", "Sort by"),
            sort_option_text: "Bid Start Date: Latest First".to_string(),
            object_prefix: "bids".to_string(),
            object_stem: "GeM".to_string(),
            object_extension: "pdf".to_string(),
        }
    }
}
