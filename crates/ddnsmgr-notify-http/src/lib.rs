// # HTTP Notifier
//
// Delivers the outcome of an update run over HTTP:
//
// - Webhooks: one request per configured target. URL, header values and the
//   body template are rendered with the run's tag values; without a body
//   template the tag values are sent as JSON.
// - Message: the rendered notification template, POSTed as `{"text": …}` to
//   the configured endpoint, or written to the log when none is configured.
//
// Whether anything is sent at all is decided by the engine. Failures are
// returned as errors, the engine logs them and moves on.

use async_trait::async_trait;
use ddnsmgr_core::config::WebhookConfig;
use ddnsmgr_core::traits::Notifier;
use ddnsmgr_core::{Error, Result, TagValues};
use reqwest::Method;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default HTTP timeout for notification requests
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// HTTP webhook and message notifier
#[derive(Debug, Clone)]
pub struct HttpNotifier {
    client: reqwest::Client,
    notify_url: Option<String>,
}

impl HttpNotifier {
    /// Create a notifier; `notify_url` receives the templated message
    pub fn new(notify_url: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self::with_client(client, notify_url)
    }

    /// Create a notifier sharing an existing HTTP client
    pub fn with_client(client: reqwest::Client, notify_url: Option<String>) -> Self {
        Self {
            client,
            notify_url: notify_url.filter(|url| !url.trim().is_empty()),
        }
    }

    /// Fire one webhook
    async fn fire(&self, webhook: &WebhookConfig, payload: &TagValues) -> Result<()> {
        let label = if webhook.name.is_empty() {
            webhook.url.as_str()
        } else {
            webhook.name.as_str()
        };

        let method = Method::from_bytes(webhook.method.trim().to_uppercase().as_bytes())
            .map_err(|_| Error::notify(format!("{}: invalid method {}", label, webhook.method)))?;
        let url = payload.render(&webhook.url);

        let mut request = self.client.request(method, &url);
        for (name, value) in &webhook.headers {
            request = request.header(name.as_str(), payload.render(value));
        }
        request = match &webhook.body {
            Some(template) => request.body(payload.render(template)),
            None => request.json(payload),
        };

        let response = request
            .send()
            .await
            .map_err(|e| Error::notify(format!("{}: request failed: {}", label, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::notify(format!("{}: status {}", label, status)));
        }

        debug!("[DDNS] webhook {} delivered ({})", label, status);
        Ok(())
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn dispatch_webhooks(&self, webhooks: &[WebhookConfig], payload: &TagValues) -> Result<()> {
        let mut errors = Vec::new();
        for webhook in webhooks {
            if let Err(e) = self.fire(webhook, payload).await {
                warn!("[DDNS] {}", e);
                errors.push(e);
            }
        }

        if errors.len() == 1 {
            return Err(errors.remove(0));
        }
        match Error::aggregate(errors) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn send_message(&self, payload: &TagValues, template: &str) -> Result<()> {
        let text = payload.render(template);

        let Some(url) = &self.notify_url else {
            info!("[DDNS] notification: {}", text);
            return Ok(());
        };

        let response = self
            .client
            .post(url)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .map_err(|e| Error::notify(format!("message request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::notify(format!("message endpoint returned {}", status)));
        }
        Ok(())
    }
}
