#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use harvester_core::{ArtifactStatus, RecordCandidate};
use harvester_engine::{ArtifactPipeline, BrowserSession, DriverError, HarvestSettings, ListingPage};
use serde_json::Value;

pub const LISTING_URL: &str = "https://bidplus.test/all-bids";
pub const RECORD_SELECTOR: &str = "a.bid_no_hover";

#[derive(Debug, Clone)]
pub struct Card {
    pub identifier: String,
    pub href: String,
    pub text: String,
}

/// A card whose start date is `start` (`dd-mm-yyyy h:mm AM`).
pub fn card(identifier: &str, start: &str) -> Card {
    Card {
        identifier: identifier.to_string(),
        href: format!("/showbidDocument/{}", identifier.replace('/', "_")),
        text: format!(
            "BID NO: {identifier}\nItems: Office Chair\nQuantity: 1,200\n\
             Department Name And Address: Ministry of Testing\n\
             Start Date: {start}\nEnd Date: 11-12-2025 12:00 PM"
        ),
    }
}

/// A card without any recognisable date.
pub fn undated_card(identifier: &str) -> Card {
    Card {
        identifier: identifier.to_string(),
        href: format!("/showbidDocument/{}", identifier.replace('/', "_")),
        text: format!("BID NO: {identifier}\nItems: Spare Parts\nStart Date: to be announced"),
    }
}

pub fn with_text(mut card: Card, extra: &str) -> Card {
    card.text.push('\n');
    card.text.push_str(extra);
    card
}

#[derive(Debug, Clone, Default)]
pub struct Element {
    pub text: String,
    pub attrs: HashMap<String, String>,
    /// Clicking moves the listing one page forward.
    pub advances: bool,
}

impl Element {
    pub fn text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Self::default()
        }
    }

    pub fn next(text: &str) -> Self {
        Self {
            advances: true,
            ..Self::text(text)
        }
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }
}

#[derive(Default)]
struct State {
    pages: Vec<Vec<Card>>,
    current: usize,
    numbered_pager: bool,
    url_per_page: bool,
    elements: HashMap<String, Vec<Element>>,
    script_href: Option<String>,
    script_click_advances: bool,
    frozen: bool,
    reload_fails: bool,
    goto_failures: u32,
    scan_failures: HashMap<usize, u32>,
    card_read_failures: HashMap<(CardRead, usize), u32>,
    actions: Vec<String>,
}

impl State {
    fn advance(&mut self) {
        if !self.frozen && self.current + 1 < self.pages.len() {
            self.current += 1;
        }
    }

    fn cards(&self) -> &[Card] {
        self.pages.get(self.current).map(Vec::as_slice).unwrap_or(&[])
    }

    fn fail_card_read(&mut self, read: CardRead, index: usize) -> Result<(), DriverError> {
        match self.card_read_failures.get_mut(&(read, index)) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(DriverError::Timeout(Duration::from_millis(5)))
            }
            _ => Ok(()),
        }
    }
}

/// Per-card driver reads that can be scripted to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CardRead {
    Identifier,
    Href,
    Container,
}

/// In-memory listing with a numbered pager. Clones share state.
#[derive(Clone)]
pub struct FakeListing {
    state: Arc<Mutex<State>>,
}

impl FakeListing {
    pub fn new(pages: Vec<Vec<Card>>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                pages,
                numbered_pager: true,
                ..State::default()
            })),
        }
    }

    fn edit(self, f: impl FnOnce(&mut State)) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    pub fn without_pager(self) -> Self {
        self.edit(|s| s.numbered_pager = false)
    }

    pub fn url_per_page(self) -> Self {
        self.edit(|s| s.url_per_page = true)
    }

    pub fn with_element(self, selector: &str, element: Element) -> Self {
        self.edit(|s| {
            s.elements
                .entry(selector.to_string())
                .or_default()
                .push(element)
        })
    }

    pub fn with_script_href(self, href: &str) -> Self {
        let href = href.to_string();
        self.edit(|s| s.script_href = Some(href))
    }

    pub fn with_script_click(self) -> Self {
        self.edit(|s| s.script_click_advances = true)
    }

    /// Navigation actions are accepted but never change the page.
    pub fn frozen(self) -> Self {
        self.edit(|s| s.frozen = true)
    }

    pub fn failing_reload(self) -> Self {
        self.edit(|s| s.reload_fails = true)
    }

    pub fn failing_gotos(self, times: u32) -> Self {
        self.edit(|s| s.goto_failures = times)
    }

    /// Counting records on page `page_number` errors `times` times.
    pub fn failing_scan(self, page_number: usize, times: u32) -> Self {
        self.edit(|s| {
            s.scan_failures.insert(page_number - 1, times);
        })
    }

    /// The `read` of card `index` on every page errors `times` times.
    pub fn failing_card_read(self, read: CardRead, index: usize, times: u32) -> Self {
        self.edit(|s| {
            s.card_read_failures.insert((read, index), times);
        })
    }

    pub fn current_page(&self) -> usize {
        self.state.lock().unwrap().current + 1
    }

    pub fn set_page(&self, page_number: usize) {
        self.state.lock().unwrap().current = page_number - 1;
    }

    pub fn actions(&self) -> Vec<String> {
        self.state.lock().unwrap().actions.clone()
    }
}

#[async_trait::async_trait]
impl ListingPage for FakeListing {
    async fn url(&self) -> Result<String, DriverError> {
        let state = self.state.lock().unwrap();
        if state.url_per_page {
            Ok(format!("{LISTING_URL}?page={}", state.current + 1))
        } else {
            Ok(LISTING_URL.to_string())
        }
    }

    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        state.actions.push(format!("goto {url}"));
        if state.goto_failures > 0 {
            state.goto_failures -= 1;
            return Err(DriverError::Timeout(timeout));
        }
        let page = url
            .split_once("page=")
            .and_then(|(_, n)| n.parse::<usize>().ok())
            .unwrap_or(1);
        state.current = page.saturating_sub(1).min(state.pages.len().saturating_sub(1));
        Ok(())
    }

    async fn reload(&self, _timeout: Duration) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        state.actions.push("reload".to_string());
        if state.reload_fails {
            return Err(DriverError::Navigation("reload failed".into()));
        }
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, _timeout: Duration) -> Result<bool, DriverError> {
        let state = self.state.lock().unwrap();
        if selector == RECORD_SELECTOR {
            return Ok(!state.cards().is_empty());
        }
        Ok(state.elements.get(selector).is_some_and(|e| !e.is_empty()))
    }

    async fn count(&self, selector: &str) -> Result<usize, DriverError> {
        let mut state = self.state.lock().unwrap();
        if selector == RECORD_SELECTOR {
            let current = state.current;
            if let Some(remaining) = state.scan_failures.get_mut(&current) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(DriverError::Session("renderer crashed".into()));
                }
            }
            return Ok(state.cards().len());
        }
        if selector == "a" && state.numbered_pager {
            return Ok(state.pages.len() + 1);
        }
        Ok(state.elements.get(selector).map_or(0, Vec::len))
    }

    async fn inner_text(&self, selector: &str, index: usize) -> Result<Option<String>, DriverError> {
        let mut state = self.state.lock().unwrap();
        if selector == RECORD_SELECTOR {
            state.fail_card_read(CardRead::Identifier, index)?;
            return Ok(state.cards().get(index).map(|c| c.identifier.clone()));
        }
        if selector == "a" && state.numbered_pager {
            let pages = state.pages.len();
            return Ok(match index {
                i if i < pages => Some((i + 1).to_string()),
                i if i == pages => Some("Next".to_string()),
                _ => None,
            });
        }
        Ok(state
            .elements
            .get(selector)
            .and_then(|e| e.get(index))
            .map(|e| e.text.clone()))
    }

    async fn attribute(
        &self,
        selector: &str,
        index: usize,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        let mut state = self.state.lock().unwrap();
        if selector == RECORD_SELECTOR {
            state.fail_card_read(CardRead::Href, index)?;
            return Ok(match name {
                "href" => state.cards().get(index).map(|c| c.href.clone()),
                _ => None,
            });
        }
        Ok(state
            .elements
            .get(selector)
            .and_then(|e| e.get(index))
            .and_then(|e| e.attrs.get(name).cloned()))
    }

    async fn click(&self, selector: &str, index: usize) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        state.actions.push(format!("click {selector}#{index}"));
        let missing = || DriverError::ElementMissing {
            selector: selector.to_string(),
            index,
        };
        if selector == "a" && state.numbered_pager {
            let pages = state.pages.len();
            if index < pages {
                if !state.frozen {
                    state.current = index;
                }
            } else if index == pages {
                state.advance();
            } else {
                return Err(missing());
            }
            return Ok(());
        }
        let advances = state
            .elements
            .get(selector)
            .and_then(|e| e.get(index))
            .map(|e| e.advances)
            .ok_or_else(missing)?;
        if advances {
            state.advance();
        }
        Ok(())
    }

    async fn ancestor_text(
        &self,
        selector: &str,
        index: usize,
        depth: usize,
    ) -> Result<Option<String>, DriverError> {
        let mut state = self.state.lock().unwrap();
        if selector != RECORD_SELECTOR {
            return Ok(None);
        }
        state.fail_card_read(CardRead::Container, index)?;
        let Some(card) = state.cards().get(index) else {
            return Ok(None);
        };
        Ok(match depth {
            1 => Some(format!("BID NO: {}", card.identifier)),
            _ => Some(card.text.clone()),
        })
    }

    async fn evaluate(&self, script: &str) -> Result<Value, DriverError> {
        let mut state = self.state.lock().unwrap();
        if script.contains("needle") {
            state.actions.push("script click text".to_string());
            return Ok(Value::Bool(false));
        }
        if script.contains(".click()") {
            state.actions.push("script click".to_string());
            if state.script_click_advances {
                state.advance();
                return Ok(Value::Bool(true));
            }
            return Ok(Value::Bool(false));
        }
        state.actions.push("script href".to_string());
        Ok(state
            .script_href
            .clone()
            .map(Value::String)
            .unwrap_or(Value::Null))
    }

    async fn content(&self) -> Result<String, DriverError> {
        let state = self.state.lock().unwrap();
        Ok(format!("<html><body>page {}</body></html>", state.current + 1))
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        Ok(b"\x89PNG".to_vec())
    }
}

/// Hands out the same [`FakeListing`] on every open.
pub struct FakeBrowser {
    listing: FakeListing,
    open_failures: AtomicU32,
    opens: AtomicU32,
    closes: AtomicU32,
}

impl FakeBrowser {
    pub fn new(listing: FakeListing) -> Self {
        Self {
            listing,
            open_failures: AtomicU32::new(0),
            opens: AtomicU32::new(0),
            closes: AtomicU32::new(0),
        }
    }

    pub fn failing_opens(self, times: u32) -> Self {
        self.open_failures.store(times, Ordering::SeqCst);
        self
    }

    pub fn listing(&self) -> &FakeListing {
        &self.listing
    }

    pub fn opens(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> u32 {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl BrowserSession for FakeBrowser {
    async fn open(&self) -> Result<Box<dyn ListingPage>, DriverError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .open_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(DriverError::Session("launch failed".into()));
        }
        Ok(Box::new(self.listing.clone()))
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Pretends every artifact was uploaded.
#[derive(Default)]
pub struct RecordingPipeline {
    keys: Mutex<Vec<String>>,
}

impl RecordingPipeline {
    pub fn keys(&self) -> Vec<String> {
        self.keys.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ArtifactPipeline for RecordingPipeline {
    async fn store(&self, candidate: &RecordCandidate, object_key: &str) -> ArtifactStatus {
        self.keys.lock().unwrap().push(object_key.to_string());
        ArtifactStatus {
            storage_path: object_key.to_string(),
            content_hash: Some(format!("hash-{}", candidate.identifier)),
            uploaded: true,
            public_url: None,
        }
    }
}

/// Fast settings rooted at `dir`.
pub fn settings(dir: &Path) -> HarvestSettings {
    HarvestSettings {
        listing_url: LISTING_URL.to_string(),
        page_load_timeout: Duration::from_millis(40),
        min_pages: 1,
        max_pages: 50,
        nav_failure_threshold: 2,
        nav_retry_delay: Duration::from_millis(1),
        nav_settle_delay: Duration::from_millis(1),
        verify_poll_interval: Duration::from_millis(5),
        verify_reload_settle: Duration::from_millis(1),
        restart_attempts: 2,
        restart_backoff_base: Duration::from_millis(1),
        ..HarvestSettings::with_data_dir(dir.to_path_buf())
    }
}
