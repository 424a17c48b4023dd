//! Notification policy
//!
//! After every run the engine hands the outcome to [`dispatch`], which fires
//! webhooks (always, when configured) and the templated message (gated by
//! [`NotifyMode`]). Delivery failures are logged and swallowed.
//!
//! ## Templates
//!
//! Message templates, webhook URLs and webhook bodies may reference any tag
//! listed in [`TAGS`] as `{{tag}}`. Unknown placeholders are left as-is.

use serde::Serialize;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::config::{Config, NotifyMode};
use crate::traits::Notifier;

/// Tags available to templates, with a short description
pub const TAGS: &[(&str, &str)] = &[
    ("ipv4_addr", "Current IPv4 address"),
    ("ipv6_addr", "Current IPv6 address"),
    ("ipv4_domains", "Comma separated IPv4 domains"),
    ("ipv6_domains", "Comma separated IPv6 domains"),
    ("ipv4_changed", "Whether the IPv4 records changed (true/false)"),
    ("ipv6_changed", "Whether the IPv6 records changed (true/false)"),
    ("error", "Error message of the run, empty on success"),
    ("timestamp", "Time the run finished (RFC 3339)"),
];

/// Snapshot of one run, shared by webhooks and the message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagValues {
    pub ipv4_addr: Option<Ipv4Addr>,
    pub ipv6_addr: Option<Ipv6Addr>,
    pub ipv4_domains: Vec<String>,
    pub ipv6_domains: Vec<String>,
    pub ipv4_changed: bool,
    pub ipv6_changed: bool,
    pub error: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl TagValues {
    /// Value of a tag as template text
    pub fn tag(&self, name: &str) -> Option<String> {
        let text = match name {
            "ipv4_addr" => self.ipv4_addr.map(|a| a.to_string()).unwrap_or_default(),
            "ipv6_addr" => self.ipv6_addr.map(|a| a.to_string()).unwrap_or_default(),
            "ipv4_domains" => self.ipv4_domains.join(","),
            "ipv6_domains" => self.ipv6_domains.join(","),
            "ipv4_changed" => self.ipv4_changed.to_string(),
            "ipv6_changed" => self.ipv6_changed.to_string(),
            "error" => self.error.clone().unwrap_or_default(),
            "timestamp" => self.timestamp.to_rfc3339(),
            _ => return None,
        };
        Some(text)
    }

    /// Substitute `{{tag}}` placeholders in `template`
    pub fn render(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else {
                out.push_str(&rest[start..]);
                return out;
            };

            let name = after[..end].trim();
            match self.tag(name) {
                Some(value) => out.push_str(&value),
                None => out.push_str(&rest[start..start + 2 + end + 2]),
            }
            rest = &after[end + 2..];
        }

        out.push_str(rest);
        out
    }
}

/// Run the notification pipeline for a finished run
///
/// `build` is called at most once, and only if something will be sent.
pub async fn dispatch<F>(notifier: &dyn Notifier, config: &Config, has_error: bool, build: F)
where
    F: FnOnce() -> TagValues,
{
    let send_message = config.notify_mode.should_send(has_error);
    if !config.has_webhook() && !send_message {
        return;
    }

    let tags = build();

    if config.has_webhook()
        && let Err(e) = notifier.dispatch_webhooks(&config.webhooks, &tags).await
    {
        tracing::error!("[DDNS] webhook - {}", e);
    }

    if send_message
        && let Err(e) = notifier.send_message(&tags, &config.notify_template).await
    {
        tracing::error!("[DDNS] send message - {}", e);
    }

    if config.notify_mode == NotifyMode::Disabled {
        tracing::trace!("Message notifications disabled");
    }
}
