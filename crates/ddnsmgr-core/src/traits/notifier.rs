// # Notifier Trait
//
// Delivery side of the notification pipeline. Whether anything is sent is
// decided by `notify::dispatch`; implementations only deliver.

use async_trait::async_trait;

use crate::config::WebhookConfig;
use crate::notify::TagValues;

/// Trait for notification transports
///
/// Both methods report failures as errors; the engine logs them and never
/// lets them affect the outcome of a run.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Fire every configured webhook with the run's tag values
    async fn dispatch_webhooks(
        &self,
        webhooks: &[WebhookConfig],
        payload: &TagValues,
    ) -> Result<(), crate::Error>;

    /// Send the templated message
    async fn send_message(&self, payload: &TagValues, template: &str) -> Result<(), crate::Error>;
}
