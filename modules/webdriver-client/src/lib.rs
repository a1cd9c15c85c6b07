//! Minimal W3C WebDriver wire-protocol client.
//!
//! Speaks to chromedriver or any Selenium-compatible endpoint over HTTP JSON.
//! Domain-agnostic: callers decide what to navigate to and which selectors
//! matter.

pub mod error;

pub use error::{Result, WebDriverError};

use std::time::Duration;

use serde_json::{json, Value};

/// W3C element identifier key in element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Opaque reference to one element inside a live session. Valid only until the
/// DOM mutates underneath it; commands on a detached element fail with
/// `stale element reference`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementRef(pub String);

impl ElementRef {
    /// Wire representation for passing the element as a script argument.
    pub fn to_json(&self) -> Value {
        json!({ ELEMENT_KEY: self.0 })
    }
}

pub struct WebDriverClient {
    client: reqwest::Client,
    base_url: String,
}

impl WebDriverClient {
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Start a new browser session with the given capabilities object.
    pub async fn new_session(&self, capabilities: Value) -> Result<WebDriverSession> {
        let body = json!({ "capabilities": { "alwaysMatch": capabilities } });
        let value = execute(
            &self.client,
            reqwest::Method::POST,
            &format!("{}/session", self.base_url),
            Some(body),
        )
        .await?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| WebDriverError::Protocol("missing sessionId".to_string()))?
            .to_string();

        Ok(WebDriverSession {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            session_id,
        })
    }
}

/// One live browser session. All commands address this session's id.
pub struct WebDriverSession {
    client: reqwest::Client,
    base_url: String,
    session_id: String,
}

impl WebDriverSession {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}/session/{}{}", self.base_url, self.session_id, path)
    }

    pub async fn navigate(&self, url: &str) -> Result<()> {
        self.post("/url", json!({ "url": url })).await?;
        Ok(())
    }

    /// Find all elements matching a CSS selector. Empty vec when none match.
    pub async fn find_elements(&self, selector: &str) -> Result<Vec<ElementRef>> {
        let value = self
            .post(
                "/elements",
                json!({ "using": "css selector", "value": selector }),
            )
            .await?;

        let refs = value
            .as_array()
            .ok_or_else(|| WebDriverError::Protocol("elements response not an array".to_string()))?
            .iter()
            .filter_map(|e| e.get(ELEMENT_KEY).and_then(Value::as_str))
            .map(|id| ElementRef(id.to_string()))
            .collect();

        Ok(refs)
    }

    pub async fn element_text(&self, element: &ElementRef) -> Result<String> {
        let value = self.get(&format!("/element/{}/text", element.0)).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// Attribute value, or empty string when the attribute is absent.
    pub async fn element_attribute(&self, element: &ElementRef, name: &str) -> Result<String> {
        let value = self
            .get(&format!("/element/{}/attribute/{}", element.0, name))
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    pub async fn click(&self, element: &ElementRef) -> Result<()> {
        self.post(&format!("/element/{}/click", element.0), json!({}))
            .await?;
        Ok(())
    }

    /// Run a synchronous script in the page and return its value.
    pub async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value> {
        self.post("/execute/sync", json!({ "script": script, "args": args }))
            .await
    }

    /// End the session and release all browser resources.
    pub async fn close(&self) -> Result<()> {
        execute(&self.client, reqwest::Method::DELETE, &self.url(""), None).await?;
        Ok(())
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value> {
        execute(
            &self.client,
            reqwest::Method::POST,
            &self.url(path),
            Some(body),
        )
        .await
    }

    async fn get(&self, path: &str) -> Result<Value> {
        execute(&self.client, reqwest::Method::GET, &self.url(path), None).await
    }
}

/// Issue one wire command and unwrap the W3C `value` envelope, mapping error
/// payloads into `WebDriverError::Api`.
async fn execute(
    client: &reqwest::Client,
    method: reqwest::Method,
    url: &str,
    body: Option<Value>,
) -> Result<Value> {
    let mut req = client.request(method, url);
    if let Some(body) = body {
        req = req
            .header("Content-Type", "application/json")
            .json(&body);
    }

    let resp = req.send().await?;
    let status = resp.status();
    let payload: Value = resp
        .json()
        .await
        .map_err(|e| WebDriverError::Protocol(format!("non-JSON response: {e}")))?;

    let value = payload.get("value").cloned().unwrap_or(Value::Null);

    if !status.is_success() {
        let error = value
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        return Err(WebDriverError::Api {
            status: status.as_u16(),
            error,
            message,
        });
    }

    Ok(value)
}
