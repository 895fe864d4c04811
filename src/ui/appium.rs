//! WebDriver-protocol REST adapter for an Appium server.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::driver::{By, Locator, UiDriver, UiElement};
use crate::error::{CapdriverError, Result};

/// All WebDriver responses wrap their payload in `value`.
#[derive(Debug, Deserialize)]
struct WdValue<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct WdRect {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

/// HTTP client for a running WebDriver/Appium session.
#[derive(Debug, Clone)]
pub struct AppiumClient {
    base_url: String,
    session_id: String,
    client: Client,
}

impl AppiumClient {
    /// Attach to an existing session on the server.
    pub fn attach(server_url: &str, session_id: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            base_url: server_url.trim_end_matches('/').to_string(),
            session_id,
            client,
        })
    }

    /// Create a fresh session with the given W3C capabilities.
    pub async fn connect(server_url: &str, capabilities: Value) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        let base_url = server_url.trim_end_matches('/').to_string();

        let body = json!({ "capabilities": { "alwaysMatch": capabilities } });
        let response = client
            .post(format!("{base_url}/session"))
            .json(&body)
            .send()
            .await
            .map_err(|err| CapdriverError::Driver(format!("failed to create session: {err}")))?;
        let response = Self::check(response).await?;

        #[derive(Deserialize)]
        struct NewSession {
            #[serde(rename = "sessionId")]
            session_id: String,
        }
        let session: WdValue<NewSession> = response
            .json()
            .await
            .map_err(|err| CapdriverError::Driver(format!("invalid session response: {err}")))?;

        debug!(session = %session.value.session_id, "created automation session");
        Ok(Self {
            base_url,
            session_id: session.value.session_id,
            client,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn session_url(&self, path: &str) -> String {
        format!("{}/session/{}/{}", self.base_url, self.session_id, path)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CapdriverError::Driver(format!(
                "automation server returned {status}: {body}"
            )));
        }
        Ok(response)
    }

    /// Find the first element matching the locator, as an opaque element id.
    ///
    /// Uses the plural endpoint so "not found" is an empty list rather than
    /// a protocol error.
    async fn find_first(&self, locator: &Locator) -> Result<Option<String>> {
        let body = json!({ "using": strategy(locator.by), "value": locator.value });
        let response = self
            .client
            .post(self.session_url("elements"))
            .json(&body)
            .send()
            .await
            .map_err(|err| CapdriverError::Driver(format!("element lookup failed: {err}")))?;
        let response = Self::check(response).await?;

        let elements: WdValue<Vec<serde_json::Map<String, Value>>> = response
            .json()
            .await
            .map_err(|err| CapdriverError::Driver(format!("invalid elements response: {err}")))?;

        // The element id hides behind a protocol-versioned key; take the
        // first value regardless of which spelling the server uses.
        Ok(elements
            .value
            .into_iter()
            .next()
            .and_then(|entry| entry.values().next().and_then(Value::as_str).map(str::to_string)))
    }

    async fn element_get<T: serde::de::DeserializeOwned>(
        &self,
        element_id: &str,
        leaf: &str,
    ) -> Result<T> {
        let response = self
            .client
            .get(self.session_url(&format!("element/{element_id}/{leaf}")))
            .send()
            .await
            .map_err(|err| CapdriverError::Driver(format!("element {leaf} failed: {err}")))?;
        let response = Self::check(response).await?;
        let value: WdValue<T> = response
            .json()
            .await
            .map_err(|err| CapdriverError::Driver(format!("invalid {leaf} response: {err}")))?;
        Ok(value.value)
    }
}

fn strategy(by: By) -> &'static str {
    match by {
        By::Xpath => "xpath",
        By::Id => "id",
    }
}

#[async_trait]
impl UiDriver for AppiumClient {
    async fn find(&self, locator: &Locator) -> Result<Option<UiElement>> {
        let Some(element_id) = self.find_first(locator).await? else {
            return Ok(None);
        };

        let rect: WdRect = self.element_get(&element_id, "rect").await?;
        let text: String = self.element_get(&element_id, "text").await.unwrap_or_default();

        Ok(Some(UiElement {
            x: rect.x as i64,
            y: rect.y as i64,
            width: rect.width as u32,
            height: rect.height as u32,
            text,
        }))
    }

    async fn click(&self, locator: &Locator) -> Result<bool> {
        let Some(element_id) = self.find_first(locator).await? else {
            debug!(locator = %locator.value, "nothing to click");
            return Ok(false);
        };

        let response = self
            .client
            .post(self.session_url(&format!("element/{element_id}/click")))
            .json(&json!({}))
            .send()
            .await
            .map_err(|err| CapdriverError::Driver(format!("click failed: {err}")))?;
        Self::check(response).await?;
        debug!(locator = %locator.value, "clicked element");
        Ok(true)
    }

    async fn screenshot(&self, locator: &Locator) -> Result<Vec<u8>> {
        let element_id = self.find_first(locator).await?.ok_or_else(|| {
            CapdriverError::Driver(format!("screenshot target not found: {}", locator.value))
        })?;

        let encoded: String = self.element_get(&element_id, "screenshot").await?;
        BASE64
            .decode(encoded.trim_end())
            .map_err(|err| CapdriverError::Driver(format!("invalid screenshot payload: {err}")))
    }

    async fn tap(&self, x: i64, y: i64) -> Result<()> {
        let body = json!({
            "actions": [{
                "type": "pointer",
                "id": "finger",
                "parameters": { "pointerType": "touch" },
                "actions": [
                    { "type": "pointerMove", "duration": 0, "x": x, "y": y, "origin": "viewport" },
                    { "type": "pointerDown", "button": 0 },
                    { "type": "pause", "duration": 50 },
                    { "type": "pointerUp", "button": 0 }
                ]
            }]
        });

        let response = self
            .client
            .post(self.session_url("actions"))
            .json(&body)
            .send()
            .await
            .map_err(|err| CapdriverError::Driver(format!("tap failed: {err}")))?;
        Self::check(response).await?;
        debug!(x, y, "tapped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_strategies_use_protocol_names() {
        assert_eq!(strategy(By::Xpath), "xpath");
        assert_eq!(strategy(By::Id), "id");
    }

    #[test]
    fn server_url_is_normalized() {
        let client = AppiumClient::attach("http://127.0.0.1:4723/", "abc123".into()).unwrap();
        assert_eq!(
            client.session_url("elements"),
            "http://127.0.0.1:4723/session/abc123/elements"
        );
    }
}
