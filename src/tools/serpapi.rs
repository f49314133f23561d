use anyhow::Result;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::config::SearchConfig;
use crate::tools::ToolFailure;

/// Query parameters sent to the provider, in order.
pub type Query = Vec<(&'static str, String)>;

/// Thin client for the SerpApi search endpoint used by the flight and
/// hotel tools.
#[derive(Debug, Clone)]
pub struct SerpApiClient {
    pub cfg: SearchConfig,
    inner: reqwest::Client,
}

impl SerpApiClient {
    pub fn new(cfg: SearchConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()?;
        Ok(Self { cfg, inner })
    }

    fn endpoint(&self) -> String {
        format!("{}/search.json", self.cfg.base_url.trim_end_matches('/'))
    }

    /// Run one search. A payload carrying an `error` field is returned as-is
    /// so the caller can surface the provider's own wording; transport
    /// problems and unreadable bodies become `ToolFailure::Transport`.
    pub async fn search(&self, query: Query) -> Result<Value, ToolFailure> {
        let Some(api_key) = self.cfg.api_key.as_deref().filter(|k| !k.is_empty()) else {
            warn!("search requested without SERPAPI_API_KEY");
            return Err(ToolFailure::Provider(
                "no search API key is configured (set SERPAPI_API_KEY)".to_string(),
            ));
        };

        let engine = query
            .iter()
            .find(|(k, _)| *k == "engine")
            .map(|(_, v)| v.clone())
            .unwrap_or_default();
        debug!(engine=%engine, query=?query, "sending search request");

        let resp = self
            .inner
            .get(self.endpoint())
            .query(&query)
            .query(&[("api_key", api_key)])
            .send()
            .await
            .map_err(|e| {
                let msg = e.without_url().to_string();
                error!(engine=%engine, err=%msg, "search request failed");
                ToolFailure::Transport(msg)
            })?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| {
            let msg = e.without_url().to_string();
            error!(engine=%engine, err=%msg, "reading search response failed");
            ToolFailure::Transport(msg)
        })?;

        let payload = match serde_json::from_str::<Value>(&text) {
            Ok(v) => v,
            Err(e) => {
                error!(engine=%engine, status=%status.as_u16(), err=%e, "search response is not JSON");
                return Err(ToolFailure::Transport(if status.is_success() {
                    format!("malformed response from search provider: {e}")
                } else {
                    format!("search provider returned HTTP {status}")
                }));
            }
        };

        if payload.get("error").is_some() {
            warn!(engine=%engine, status=%status.as_u16(), "search provider reported an error");
            return Ok(payload);
        }
        if !status.is_success() {
            error!(engine=%engine, status=%status.as_u16(), "search non-success status");
            return Err(ToolFailure::Transport(format!(
                "search provider returned HTTP {status}"
            )));
        }
        Ok(payload)
    }
}
