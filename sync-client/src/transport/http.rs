//! HTTP transport for the relay's JSON API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, StatusCode};
use sync_types::{ErrorBody, HealthReport, SyncRequest, SyncResponse, VERSION_REJECTED_CODE};

use super::{SyncTransport, TransportError};

const SYNC_PATH: &str = "/api/sync";
const HEALTH_PATH: &str = "/api/health";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Talks to a relay over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport for the relay at `base_url` (e.g. `http://localhost:3222`).
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TransportError::Unreachable(format!("http client setup: {e}")))?;
        Ok(Self::with_client(client, base_url))
    }

    /// Use a preconfigured reqwest client.
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Relay base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl SyncTransport for HttpTransport {
    async fn health(&self) -> Result<HealthReport, TransportError> {
        let response = self
            .client
            .get(self.url(HEALTH_PATH))
            .send()
            .await
            .map_err(unreachable)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(rate_limited(&response));
        }

        // 503 still carries a report describing what is down.
        match response.json::<HealthReport>().await {
            Ok(report) => Ok(report),
            Err(_) if status.is_success() => Err(TransportError::InvalidResponse(
                "health body is not a health report".into(),
            )),
            Err(_) => Err(TransportError::Rejected {
                status: status.as_u16(),
                message: "health check failed".into(),
            }),
        }
    }

    async fn sync(&self, request: &SyncRequest) -> Result<SyncResponse, TransportError> {
        tracing::debug!(
            envelopes = request.notes.len(),
            url = %self.base_url,
            "sending sync request"
        );

        let response = self
            .client
            .post(self.url(SYNC_PATH))
            .json(request)
            .send()
            .await
            .map_err(unreachable)?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<SyncResponse>()
                .await
                .map_err(|e| TransportError::InvalidResponse(e.to_string()));
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(rate_limited(&response));
        }

        let body = response.json::<ErrorBody>().await.ok();
        let message = body
            .as_ref()
            .map(|b| b.error.clone())
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());

        if body
            .as_ref()
            .and_then(|b| b.code.as_deref())
            .is_some_and(|code| code == VERSION_REJECTED_CODE)
        {
            return Err(TransportError::VersionRejected { message });
        }

        Err(TransportError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

fn unreachable(e: reqwest::Error) -> TransportError {
    TransportError::Unreachable(e.to_string())
}

fn rate_limited(response: &reqwest::Response) -> TransportError {
    let retry_after = response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    TransportError::RateLimited { retry_after }
}
