//! Custom JSON webhook for budget alerts.
//!
//! Each fired alert is POSTed as JSON on a background task. When a shared
//! secret is configured the body is signed with HMAC-SHA256 and the digest
//! sent as `X-Tollgate-Signature: sha256=<hex>`.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, warn};

use tollgate_core::AlertPayload;
use tollgate_telemetry::{AlertListener, ListenerError};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Tollgate-Signature";

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

pub struct WebhookNotifier {
    url: String,
    secret: Option<String>,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, secret: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(DELIVERY_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default webhook client");
                reqwest::Client::new()
            });
        Self {
            url: url.into(),
            secret: secret.filter(|s| !s.is_empty()),
            client,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// `sha256=<hex>` signature of `body`, or `None` without a secret.
    pub fn sign(&self, body: &[u8]) -> Option<String> {
        let secret = self.secret.as_ref()?;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
        mac.update(body);
        Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
    }
}

impl AlertListener for WebhookNotifier {
    fn on_alert(&self, alert: &AlertPayload) -> Result<(), ListenerError> {
        let body = serde_json::to_vec(alert).map_err(|e| ListenerError::Delivery(e.to_string()))?;
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|_| ListenerError::Delivery("no async runtime to deliver webhook".into()))?;

        let mut request = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(signature) = self.sign(&body) {
            request = request.header(SIGNATURE_HEADER, signature);
        }
        let request = request.body(body);
        let url = self.url.clone();
        let severity = alert.severity;

        handle.spawn(async move {
            match request.send().await {
                Ok(resp) if resp.status().is_success() => {
                    debug!(url = %url, %severity, "Budget webhook delivered");
                }
                Ok(resp) => {
                    warn!(url = %url, status = resp.status().as_u16(), "Budget webhook rejected");
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Budget webhook delivery failed");
                }
            }
        });
        Ok(())
    }
}
