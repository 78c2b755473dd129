//! Signaling endpoint lookup.
//!
//! Asks a local HTTP service which URL a session's audio should be streamed
//! to: `GET {base_url}{path}?cameraId=<id>` answering
//! `{"success": bool, "data": "<url>", "error": "<text>"}`.

use async_trait::async_trait;
use serde::Deserialize;
use talkback_core::SessionId;
use talkback_settings::DiscoverySettings;
use tracing::debug;

use crate::errors::TalkbackError;

/// Discovery service reply body.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct DiscoveryResponse {
    /// Whether the lookup succeeded.
    pub success: bool,
    /// Signaling URL on success.
    pub data: String,
    /// Failure description.
    pub error: String,
}

/// Resolves a session to its signaling URL.
#[async_trait]
pub trait DiscoveryClient: Send + Sync {
    /// Look up the signaling URL for `session_id`.
    async fn resolve(&self, session_id: &SessionId) -> Result<String, TalkbackError>;
}

/// Discovery over HTTP backed by `reqwest`.
pub struct HttpDiscovery {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpDiscovery {
    /// Create a client for the configured discovery service.
    pub fn new(settings: &DiscoverySettings) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(settings.timeout())
                .user_agent(concat!("talkback-agent/", env!("CARGO_PKG_VERSION")))
                .build()
                .unwrap_or_default(),
            endpoint: format!(
                "{}{}",
                settings.base_url.trim_end_matches('/'),
                settings.path
            ),
        }
    }

    /// Full lookup URL without the query string.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl DiscoveryClient for HttpDiscovery {
    async fn resolve(&self, session_id: &SessionId) -> Result<String, TalkbackError> {
        let fail = |reason: String| TalkbackError::Discovery {
            session_id: session_id.to_string(),
            reason,
        };

        if session_id.is_blank() {
            return Err(fail("empty session id".into()));
        }

        debug!(endpoint = %self.endpoint, %session_id, "resolving signaling url");

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("cameraId", session_id.as_str())])
            .send()
            .await
            .map_err(|e| fail(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fail(format!("HTTP {}", status.as_u16())));
        }

        let body: DiscoveryResponse = response
            .json()
            .await
            .map_err(|e| fail(format!("invalid response body: {e}")))?;

        if !body.success {
            let reason = if body.error.is_empty() {
                "lookup unsuccessful".to_string()
            } else {
                body.error
            };
            return Err(fail(reason));
        }
        if body.data.trim().is_empty() {
            return Err(fail("empty signaling url".into()));
        }

        debug!(%session_id, url = %body.data, "signaling url resolved");
        Ok(body.data)
    }
}
