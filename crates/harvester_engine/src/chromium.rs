//! [`BrowserSession`] on a local Chromium via `chromiumoxide`.
//!
//! Element access goes through small scripts so that elements stay
//! addressable by `(selector, index)` across DOM re-renders.
use std::future::Future;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetUserAgentOverrideParams;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use engine_logging::{engine_debug, engine_info, engine_warn};
use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::page::{BrowserSession, DriverError, ListingPage};

const SELECTOR_POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct ChromiumSettings {
    pub headless: bool,
    pub user_agent: String,
    /// Upper bound for single driver calls that take no explicit timeout.
    pub action_timeout: Duration,
}

impl Default for ChromiumSettings {
    fn default() -> Self {
        Self {
            headless: true,
            user_agent: crate::fetch::DEFAULT_USER_AGENT.to_string(),
            action_timeout: Duration::from_secs(30),
        }
    }
}

struct Running {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl Running {
    async fn shutdown(mut self) {
        if let Err(err) = self.browser.close().await {
            engine_warn!("Browser close failed: {}", err);
        }
        let _ = self.browser.wait().await;
        self.handler.abort();
    }
}

pub struct ChromiumSession {
    settings: ChromiumSettings,
    running: Mutex<Option<Running>>,
}

impl ChromiumSession {
    pub fn new(settings: ChromiumSettings) -> Self {
        Self {
            settings,
            running: Mutex::new(None),
        }
    }

    async fn blank_page(&self, browser: &Browser) -> Result<Page, DriverError> {
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|err| DriverError::Session(err.to_string()))?;
        let user_agent = SetUserAgentOverrideParams::new(self.settings.user_agent.clone());
        page.set_user_agent(user_agent)
            .await
            .map_err(|err| DriverError::Session(err.to_string()))?;
        Ok(page)
    }
}

#[async_trait::async_trait]
impl BrowserSession for ChromiumSession {
    async fn open(&self) -> Result<Box<dyn ListingPage>, DriverError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(DriverError::Session("browser already open".into()));
        }

        let mut builder = BrowserConfig::builder().arg("--no-sandbox");
        if !self.settings.headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(DriverError::Session)?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|err| DriverError::Session(err.to_string()))?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let launched = Running { browser, handler };
        let page = match self.blank_page(&launched.browser).await {
            Ok(page) => page,
            Err(err) => {
                launched.shutdown().await;
                return Err(err);
            }
        };
        engine_info!("Browser session opened (headless: {})", self.settings.headless);

        *running = Some(launched);
        Ok(Box::new(ChromiumPage {
            page,
            action_timeout: self.settings.action_timeout,
        }))
    }

    async fn close(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };
        running.shutdown().await;
        engine_debug!("Browser session closed");
    }
}

struct ChromiumPage {
    page: Page,
    action_timeout: Duration,
}

impl ChromiumPage {
    async fn bounded<T, E, F>(&self, timeout: Duration, fut: F) -> Result<T, DriverError>
    where
        F: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        match tokio::time::timeout(timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(DriverError::Script(err.to_string())),
            Err(_) => Err(DriverError::Timeout(timeout)),
        }
    }

    async fn eval(&self, script: &str) -> Result<Value, DriverError> {
        let result = self
            .bounded(self.action_timeout, self.page.evaluate(script))
            .await?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn eval_element(
        &self,
        selector: &str,
        index: usize,
        body: &str,
    ) -> Result<Value, DriverError> {
        self.eval(&element_script(selector, index, body)).await
    }
}

fn js_string(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| "\"\"".to_string())
}

fn element_script(selector: &str, index: usize, body: &str) -> String {
    format!(
        "(() => {{ const el = document.querySelectorAll({})[{}]; if (!el) return null; {} }})()",
        js_string(selector),
        index,
        body
    )
}

fn optional_string(value: Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text),
        _ => None,
    }
}

#[async_trait::async_trait]
impl ListingPage for ChromiumPage {
    async fn url(&self) -> Result<String, DriverError> {
        let url = self.bounded(self.action_timeout, self.page.url()).await?;
        Ok(url.unwrap_or_default())
    }

    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), DriverError> {
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) => Err(DriverError::Navigation(err.to_string())),
            Err(_) => Err(DriverError::Timeout(timeout)),
        }
    }

    async fn reload(&self, timeout: Duration) -> Result<(), DriverError> {
        match tokio::time::timeout(timeout, self.page.reload()).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) => Err(DriverError::Navigation(err.to_string())),
            Err(_) => Err(DriverError::Timeout(timeout)),
        }
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<bool, DriverError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.count(selector).await? > 0 {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(SELECTOR_POLL).await;
        }
    }

    async fn count(&self, selector: &str) -> Result<usize, DriverError> {
        let value = self
            .eval(&format!(
                "document.querySelectorAll({}).length",
                js_string(selector)
            ))
            .await?;
        Ok(value.as_u64().unwrap_or(0) as usize)
    }

    async fn inner_text(
        &self,
        selector: &str,
        index: usize,
    ) -> Result<Option<String>, DriverError> {
        let value = self
            .eval_element(selector, index, "return el.innerText;")
            .await?;
        Ok(optional_string(value))
    }

    async fn attribute(
        &self,
        selector: &str,
        index: usize,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        let body = format!("return el.getAttribute({});", js_string(name));
        Ok(optional_string(self.eval_element(selector, index, &body).await?))
    }

    async fn click(&self, selector: &str, index: usize) -> Result<(), DriverError> {
        let value = self
            .eval_element(selector, index, "el.scrollIntoView(); el.click(); return true;")
            .await?;
        if value == Value::Bool(true) {
            Ok(())
        } else {
            Err(DriverError::ElementMissing {
                selector: selector.to_string(),
                index,
            })
        }
    }

    async fn ancestor_text(
        &self,
        selector: &str,
        index: usize,
        depth: usize,
    ) -> Result<Option<String>, DriverError> {
        let body = format!(
            "let node = el; for (let i = 0; i < {depth}; i++) {{ node = node.parentElement; if (!node) return null; }} return node.innerText;"
        );
        Ok(optional_string(self.eval_element(selector, index, &body).await?))
    }

    async fn evaluate(&self, script: &str) -> Result<Value, DriverError> {
        self.eval(script).await
    }

    async fn content(&self) -> Result<String, DriverError> {
        self.bounded(self.action_timeout, self.page.content()).await
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        let params = ScreenshotParams::builder().full_page(true).build();
        self.bounded(self.action_timeout, self.page.screenshot(params))
            .await
    }
}
