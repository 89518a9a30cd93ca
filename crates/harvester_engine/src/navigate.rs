//! Advancing the listing to its next page.
//!
//! The listing's pager markup is unstable, so several strategies are tried in
//! a fixed order and the first one that initiates a transition wins. Whether
//! the transition actually produced a new page is the verifier's job.
use std::time::Duration;

use engine_logging::{engine_debug, engine_info, engine_warn};
use harvester_core::{ControlSelector, ListingProfile};
use serde_json::Value;
use url::Url;

use crate::page::{DriverError, ListingPage};

#[async_trait::async_trait]
pub trait NavStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(true)` once a transition away from page `current` was initiated.
    async fn attempt(&self, page: &dyn ListingPage, current: u32) -> Result<bool, DriverError>;
}

/// Clicks the pager anchor whose text is the next page number.
#[derive(Debug, Clone)]
pub struct NumberedLink {
    selector: String,
}

impl Default for NumberedLink {
    fn default() -> Self {
        Self {
            selector: "a".to_string(),
        }
    }
}

#[async_trait::async_trait]
impl NavStrategy for NumberedLink {
    fn name(&self) -> &'static str {
        "numbered link"
    }

    async fn attempt(&self, page: &dyn ListingPage, current: u32) -> Result<bool, DriverError> {
        let wanted = (current + 1).to_string();
        let count = page.count(&self.selector).await?;
        for index in 0..count {
            let text = page.inner_text(&self.selector, index).await?;
            if text.as_deref().map(str::trim) == Some(wanted.as_str()) {
                page.click(&self.selector, index).await?;
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Clicks the first enabled "Next" control from the profile.
#[derive(Debug, Clone)]
pub struct NextControl {
    controls: Vec<ControlSelector>,
}

impl NextControl {
    pub fn new(controls: Vec<ControlSelector>) -> Self {
        Self { controls }
    }
}

#[async_trait::async_trait]
impl NavStrategy for NextControl {
    fn name(&self) -> &'static str {
        "next control"
    }

    async fn attempt(&self, page: &dyn ListingPage, _current: u32) -> Result<bool, DriverError> {
        for control in &self.controls {
            let count = page.count(&control.css).await?;
            for index in 0..count {
                if control.text.is_some() {
                    let visible = page.inner_text(&control.css, index).await?.unwrap_or_default();
                    if !control.text_matches(&visible) {
                        continue;
                    }
                }
                if is_disabled(page, &control.css, index).await? {
                    engine_debug!("Skipping disabled next control {}[{}]", control.css, index);
                    continue;
                }
                page.click(&control.css, index).await?;
                return Ok(true);
            }
        }
        Ok(false)
    }
}

async fn is_disabled(
    page: &dyn ListingPage,
    selector: &str,
    index: usize,
) -> Result<bool, DriverError> {
    // A bare `disabled` attribute reads back as "".
    if page.attribute(selector, index, "disabled").await?.is_some() {
        return Ok(true);
    }
    let class = page.attribute(selector, index, "class").await?;
    Ok(class.is_some_and(|class| class.to_lowercase().contains("disabled")))
}

/// Finds a next-page href by script and navigates to it directly.
#[derive(Debug, Clone)]
pub struct ScriptHref {
    listing_url: Url,
    tokens: Vec<String>,
    timeout: Duration,
}

impl ScriptHref {
    pub fn new(listing_url: Url, tokens: Vec<String>, timeout: Duration) -> Self {
        Self {
            listing_url,
            tokens,
            timeout,
        }
    }

    fn script(&self) -> String {
        format!(
            r#"(() => {{
  const tokens = {tokens};
  for (const a of Array.from(document.querySelectorAll('a[href]'))) {{
    const label = (a.getAttribute('aria-label') || '').toLowerCase();
    const rel = (a.getAttribute('rel') || '').toLowerCase();
    const title = (a.getAttribute('title') || '').toLowerCase();
    const text = (a.innerText || '').trim().toLowerCase();
    if (label.includes('next') || rel === 'next' || title.includes('next') || tokens.some(t => text.includes(t))) {{
      const href = a.getAttribute('href');
      if (href && href !== '#' && !href.startsWith('javascript')) return href;
    }}
  }}
  return null;
}})()"#,
            tokens = tokens_literal(&self.tokens)
        )
    }
}

#[async_trait::async_trait]
impl NavStrategy for ScriptHref {
    fn name(&self) -> &'static str {
        "script href"
    }

    async fn attempt(&self, page: &dyn ListingPage, _current: u32) -> Result<bool, DriverError> {
        let href = match page.evaluate(&self.script()).await? {
            Value::String(href) if !href.trim().is_empty() => href,
            _ => return Ok(false),
        };
        let target = self
            .listing_url
            .join(href.trim())
            .map_err(|err| DriverError::Navigation(format!("bad next href {href}: {err}")))?;
        engine_debug!("Navigating to scripted next href {}", target);
        page.goto(target.as_str(), self.timeout).await?;
        Ok(true)
    }
}

/// Clicks, from script, the first anchor whose text matches a next token.
#[derive(Debug, Clone)]
pub struct ScriptClick {
    tokens: Vec<String>,
}

impl ScriptClick {
    pub fn new(tokens: Vec<String>) -> Self {
        Self { tokens }
    }
}

#[async_trait::async_trait]
impl NavStrategy for ScriptClick {
    fn name(&self) -> &'static str {
        "script click"
    }

    async fn attempt(&self, page: &dyn ListingPage, _current: u32) -> Result<bool, DriverError> {
        let script = format!(
            r#"(() => {{
  const tokens = {tokens};
  for (const a of Array.from(document.querySelectorAll('a'))) {{
    const text = (a.innerText || '').trim().toLowerCase();
    if (tokens.some(t => text.includes(t))) {{ a.click(); return true; }}
  }}
  return false;
}})()"#,
            tokens = tokens_literal(&self.tokens)
        );
        Ok(page.evaluate(&script).await? == Value::Bool(true))
    }
}

/// Last resort: reload the current page.
#[derive(Debug, Clone)]
pub struct Reload {
    timeout: Duration,
}

impl Reload {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait::async_trait]
impl NavStrategy for Reload {
    fn name(&self) -> &'static str {
        "reload"
    }

    async fn attempt(&self, page: &dyn ListingPage, _current: u32) -> Result<bool, DriverError> {
        page.reload(self.timeout).await?;
        Ok(true)
    }
}

fn tokens_literal(tokens: &[String]) -> String {
    let lowered: Vec<String> = tokens.iter().map(|t| t.to_lowercase()).collect();
    serde_json::to_string(&lowered).unwrap_or_else(|_| "[]".to_string())
}

/// Clicks, from script, the innermost element whose text contains `text`.
pub(crate) async fn script_click_text(
    page: &dyn ListingPage,
    text: &str,
) -> Result<bool, DriverError> {
    let needle = serde_json::to_string(&text.to_lowercase()).unwrap_or_else(|_| "\"\"".to_string());
    let script = format!(
        r#"(() => {{
  const needle = {needle};
  const hits = Array.from(document.querySelectorAll('body *'))
    .filter(el => (el.innerText || '').toLowerCase().includes(needle));
  const target = hits.find(el => !hits.some(other => other !== el && el.contains(other)));
  if (!target) return false;
  target.click();
  return true;
}})()"#
    );
    Ok(page.evaluate(&script).await? == Value::Bool(true))
}

/// Ordered navigation strategies; the first to initiate a transition wins.
pub struct NavigationController {
    strategies: Vec<Box<dyn NavStrategy>>,
}

impl NavigationController {
    /// The standard order: numbered link, next control, script href,
    /// script click, reload.
    pub fn new(listing_url: Url, profile: &ListingProfile, timeout: Duration) -> Self {
        Self::with_strategies(vec![
            Box::new(NumberedLink::default()),
            Box::new(NextControl::new(profile.next_controls.clone())),
            Box::new(ScriptHref::new(
                listing_url,
                profile.next_tokens.clone(),
                timeout,
            )),
            Box::new(ScriptClick::new(profile.next_tokens.clone())),
            Box::new(Reload::new(timeout)),
        ])
    }

    pub fn with_strategies(strategies: Vec<Box<dyn NavStrategy>>) -> Self {
        Self { strategies }
    }

    /// `true` as soon as a strategy initiates a transition. Does not confirm
    /// that the page changed.
    pub async fn advance(&self, page: &dyn ListingPage, current: u32) -> bool {
        for strategy in &self.strategies {
            match strategy.attempt(page, current).await {
                Ok(true) => {
                    engine_info!("Page {}: advanced via {}", current, strategy.name());
                    return true;
                }
                Ok(false) => {
                    engine_debug!("Page {}: {} found no candidate", current, strategy.name())
                }
                Err(err) => engine_debug!("Page {}: {} failed: {}", current, strategy.name(), err),
            }
        }
        engine_warn!("Page {}: every navigation strategy failed", current);
        false
    }
}
