use std::collections::HashMap;

use async_trait::async_trait;
use tracing::{error, info};

use crate::checker::AppointmentSlot;
use crate::config::AppConfig;
use crate::utils::error::Result;
use crate::utils::format_month_year;

pub mod email;
pub mod log;
pub mod telegram;

pub use email::EmailNotifier;
pub use log::LogNotifier;
pub use telegram::TelegramNotifier;

/// One alert channel. Channels are independent: a broken one must only ever
/// report failure for itself.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    /// Channels without credentials stay registered but disabled.
    fn enabled(&self) -> bool {
        true
    }

    /// Delivers the message. `Ok(false)` and `Err` both count as a failed
    /// delivery for this channel only.
    async fn send(&self, message: &str, slots: &[AppointmentSlot]) -> Result<bool>;
}

/// Broadcasts a result to every configured channel and aggregates outcomes.
pub struct NotificationFanout {
    channels: Vec<Box<dyn Notifier>>,
    post: String,
    target_label: String,
}

impl NotificationFanout {
    pub fn from_config(config: &AppConfig) -> Self {
        let channels: Vec<Box<dyn Notifier>> = vec![
            Box::new(LogNotifier::new()),
            Box::new(TelegramNotifier::from_config(config)),
            Box::new(EmailNotifier::from_config(config)),
        ];
        let enabled = channels.iter().filter(|c| c.enabled()).count();
        info!(enabled, total = channels.len(), "initialized notification channels");

        Self {
            channels,
            post: config.target.consular_post.clone(),
            target_label: format_month_year(config.target.month, config.target.year),
        }
    }

    pub fn with_channels(
        channels: Vec<Box<dyn Notifier>>,
        post: impl Into<String>,
        target_label: impl Into<String>,
    ) -> Self {
        Self {
            channels,
            post: post.into(),
            target_label: target_label.into(),
        }
    }

    /// Sends through every channel, isolating failures. Returns the
    /// per-channel outcome map.
    pub async fn notify(
        &self,
        message: &str,
        slots: &[AppointmentSlot],
    ) -> HashMap<String, bool> {
        let mut results = HashMap::new();

        for channel in &self.channels {
            if !channel.enabled() {
                results.insert(channel.name().to_string(), false);
                continue;
            }

            let outcome = match channel.send(message, slots).await {
                Ok(sent) => sent,
                Err(e) => {
                    error!(channel = channel.name(), error = %e, "notification channel failed");
                    false
                }
            };
            results.insert(channel.name().to_string(), outcome);
        }

        results
    }

    /// True iff at least one channel delivered.
    pub async fn notify_appointments_found(&self, slots: &[AppointmentSlot]) -> bool {
        let message = format!(
            "Found {} available appointment(s) for {} in {}!",
            slots.len(),
            self.post,
            self.target_label
        );
        let results = self.notify(&message, slots).await;
        results.values().any(|&sent| sent)
    }

    /// True iff at least one channel delivered.
    pub async fn notify_error(&self, description: &str) -> bool {
        let message = format!("Visa watcher error: {}", description);
        let results = self.notify(&message, &[]).await;
        results.values().any(|&sent| sent)
    }
}
