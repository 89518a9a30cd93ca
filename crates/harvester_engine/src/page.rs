//! Browser driver capability set.
//!
//! The harvester never talks to a browser directly; it drives whatever sits
//! behind [`ListingPage`]. Elements are addressed by `(selector, index)` so
//! the trait stays object safe and easy to script in tests.
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("no element {selector} at index {index}")]
    ElementMissing { selector: String, index: usize },
    #[error("script failed: {0}")]
    Script(String),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("browser session error: {0}")]
    Session(String),
}

/// One open tab of the listing UI.
#[async_trait::async_trait]
pub trait ListingPage: Send + Sync {
    async fn url(&self) -> Result<String, DriverError>;

    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), DriverError>;

    async fn reload(&self, timeout: Duration) -> Result<(), DriverError>;

    /// Resolves `true` once `selector` matches, `false` on timeout.
    async fn wait_for_selector(&self, selector: &str, timeout: Duration)
        -> Result<bool, DriverError>;

    async fn count(&self, selector: &str) -> Result<usize, DriverError>;

    async fn inner_text(&self, selector: &str, index: usize)
        -> Result<Option<String>, DriverError>;

    async fn attribute(
        &self,
        selector: &str,
        index: usize,
        name: &str,
    ) -> Result<Option<String>, DriverError>;

    async fn click(&self, selector: &str, index: usize) -> Result<(), DriverError>;

    /// Inner text of the `depth`-th ancestor of the element (1 = parent),
    /// `None` when the tree is shallower than that.
    async fn ancestor_text(
        &self,
        selector: &str,
        index: usize,
        depth: usize,
    ) -> Result<Option<String>, DriverError>;

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, DriverError>;

    /// Serialized HTML of the whole document.
    async fn content(&self) -> Result<String, DriverError>;

    /// Full-page PNG.
    async fn screenshot(&self) -> Result<Vec<u8>, DriverError>;
}

/// Opens and tears down the browser behind a run. A restart closes the
/// session and opens a fresh one.
#[async_trait::async_trait]
pub trait BrowserSession: Send + Sync {
    async fn open(&self) -> Result<Box<dyn ListingPage>, DriverError>;

    async fn close(&self);
}

/// Clicks the first element of `selector` whose text contains `text`
/// (case-insensitive), or the first element at all when `text` is `None`.
pub(crate) async fn click_first_matching(
    page: &dyn ListingPage,
    selector: &str,
    text: Option<&str>,
) -> Result<bool, DriverError> {
    let count = page.count(selector).await?;
    let wanted = text.map(str::to_lowercase);
    for index in 0..count {
        if let Some(wanted) = &wanted {
            let visible = page.inner_text(selector, index).await?.unwrap_or_default();
            if !visible.to_lowercase().contains(wanted.as_str()) {
                continue;
            }
        }
        page.click(selector, index).await?;
        return Ok(true);
    }
    Ok(false)
}
