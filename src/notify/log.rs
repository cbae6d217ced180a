use async_trait::async_trait;
use tracing::info;

use super::Notifier;
use crate::checker::AppointmentSlot;
use crate::utils::error::Result;

/// Always-on channel that writes alerts to the log. Acts as the delivery of
/// last resort: it cannot fail, so a fully unconfigured setup still records
/// every hit.
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, message: &str, slots: &[AppointmentSlot]) -> Result<bool> {
        info!("{}", "=".repeat(70));
        info!("APPOINTMENT NOTIFICATION");
        info!("{}", message);
        if !slots.is_empty() {
            info!(count = slots.len(), "available dates:");
            for (i, slot) in slots.iter().enumerate() {
                info!("  {}. Date: {}", i + 1, slot.date);
            }
        }
        info!("{}", "=".repeat(70));
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_channel_never_fails() {
        let notifier = LogNotifier::new();
        assert!(notifier.enabled());
        let sent = notifier.send("test", &[]).await.unwrap();
        assert!(sent);
    }
}
