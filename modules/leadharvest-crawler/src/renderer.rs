//! Renderer seam: the opaque browser-automation capability the crawl engine
//! drives. The production implementation speaks the WebDriver wire protocol;
//! tests use the deterministic simulator in `testing`.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::time::Instant;

use leadharvest_common::HarvestError;
use webdriver_client::{ElementRef, WebDriverClient, WebDriverError, WebDriverSession};

use crate::selectors;

/// Opaque handle to one rendered element. Valid only until the DOM mutates;
/// commands on a detached handle fail with `HarvestError::StaleElement`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardHandle(pub String);

#[async_trait]
pub trait Renderer: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), HarvestError>;

    /// Wait until at least one element matches `selector`, up to `timeout`.
    /// Returns false on timeout; errors only on renderer-level faults.
    async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<bool, HarvestError>;

    /// All currently materialized elements matching `selector`, in render order.
    async fn query_all(&self, selector: &str) -> Result<Vec<CardHandle>, HarvestError>;

    async fn text(&self, handle: &CardHandle) -> Result<String, HarvestError>;

    /// Attribute value, or empty string when absent.
    async fn attribute(&self, handle: &CardHandle, name: &str) -> Result<String, HarvestError>;

    async fn click(&self, handle: &CardHandle) -> Result<(), HarvestError>;

    async fn scroll_into_view(&self, handle: &CardHandle) -> Result<(), HarvestError>;

    /// Scroll the feed container to its current bottom.
    async fn scroll_feed_to_bottom(&self) -> Result<(), HarvestError>;

    /// Full visible page text, used for end-of-results sentinel detection.
    async fn current_page_text(&self) -> Result<String, HarvestError>;

    async fn close(&self) -> Result<(), HarvestError>;
}

/// Creates fresh renderer sessions. The worker supervisor goes through this
/// both at startup and when replacing a crashed session.
#[async_trait]
pub trait RendererFactory: Send + Sync {
    async fn create(&self) -> Result<Box<dyn Renderer>, HarvestError>;
}

// --- WebDriver-backed implementation ---

const POLL_INTERVAL: Duration = Duration::from_millis(250);

fn classify(err: WebDriverError) -> HarvestError {
    if err.is_stale() {
        HarvestError::StaleElement
    } else if err.is_session_gone() {
        HarvestError::RendererCrashed(err.to_string())
    } else if err.is_no_such_element() {
        HarvestError::ElementNotFound(err.to_string())
    } else {
        HarvestError::Navigation(err.to_string())
    }
}

pub struct WebDriverRenderer {
    session: WebDriverSession,
}

impl WebDriverRenderer {
    pub fn new(session: WebDriverSession) -> Self {
        Self { session }
    }

    fn element(handle: &CardHandle) -> ElementRef {
        ElementRef(handle.0.clone())
    }
}

#[async_trait]
impl Renderer for WebDriverRenderer {
    async fn navigate(&self, url: &str) -> Result<(), HarvestError> {
        self.session.navigate(url).await.map_err(classify)
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<bool, HarvestError> {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.query_all(selector).await?.is_empty() {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<CardHandle>, HarvestError> {
        let elements = self
            .session
            .find_elements(selector)
            .await
            .map_err(classify)?;
        Ok(elements.into_iter().map(|e| CardHandle(e.0)).collect())
    }

    async fn text(&self, handle: &CardHandle) -> Result<String, HarvestError> {
        self.session
            .element_text(&Self::element(handle))
            .await
            .map_err(classify)
    }

    async fn attribute(&self, handle: &CardHandle, name: &str) -> Result<String, HarvestError> {
        self.session
            .element_attribute(&Self::element(handle), name)
            .await
            .map_err(classify)
    }

    async fn click(&self, handle: &CardHandle) -> Result<(), HarvestError> {
        self.session
            .click(&Self::element(handle))
            .await
            .map_err(classify)
    }

    async fn scroll_into_view(&self, handle: &CardHandle) -> Result<(), HarvestError> {
        self.session
            .execute(
                "arguments[0].scrollIntoView(true);",
                vec![Self::element(handle).to_json()],
            )
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn scroll_feed_to_bottom(&self) -> Result<(), HarvestError> {
        let script = "const feed = document.querySelector(arguments[0]); \
                      if (feed) feed.scrollTop = feed.scrollHeight;";
        self.session
            .execute(script, vec![json!(selectors::FEED)])
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn current_page_text(&self) -> Result<String, HarvestError> {
        let value = self
            .session
            .execute("return document.body.innerText;", vec![])
            .await
            .map_err(classify)?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn close(&self) -> Result<(), HarvestError> {
        self.session.close().await.map_err(classify)
    }
}

/// Launches headless Chrome sessions through a WebDriver endpoint.
pub struct WebDriverFactory {
    client: WebDriverClient,
    headless: bool,
}

impl WebDriverFactory {
    pub fn new(webdriver_url: &str, headless: bool) -> Self {
        Self {
            client: WebDriverClient::new(webdriver_url),
            headless,
        }
    }
}

#[async_trait]
impl RendererFactory for WebDriverFactory {
    async fn create(&self) -> Result<Box<dyn Renderer>, HarvestError> {
        let mut args = vec![
            "--disable-blink-features=AutomationControlled".to_string(),
            "--no-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--disable-gpu".to_string(),
            "--window-size=1920,1080".to_string(),
        ];
        if self.headless {
            args.push("--headless=new".to_string());
        }

        let capabilities = json!({
            "browserName": "chrome",
            "goog:chromeOptions": { "args": args },
        });

        let session = self
            .client
            .new_session(capabilities)
            .await
            .map_err(|e| HarvestError::RendererStartup(e.to_string()))?;

        Ok(Box::new(WebDriverRenderer::new(session)))
    }
}
