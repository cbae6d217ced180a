use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{error, info};

use super::Notifier;
use crate::checker::AppointmentSlot;
use crate::config::AppConfig;
use crate::utils::error::Result;
use crate::utils::format_month_year;

/// Telegram keeps messages short; anything past this many dates is
/// summarized.
const MAX_LISTED_DATES: usize = 10;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Bot API channel. Enabled only when both the bot token and chat id are
/// configured.
pub struct TelegramNotifier {
    client: Client,
    bot_token: Option<String>,
    chat_id: Option<String>,
    post: String,
    target_label: String,
}

impl TelegramNotifier {
    pub fn from_config(config: &AppConfig) -> Self {
        let notifier = Self {
            client: Client::new(),
            bot_token: config.notifications.telegram.bot_token.clone(),
            chat_id: config.notifications.telegram.chat_id.clone(),
            post: config.target.consular_post.clone(),
            target_label: format_month_year(config.target.month, config.target.year),
        };
        if !notifier.enabled() {
            info!("telegram notifications disabled (no credentials)");
        }
        notifier
    }

    fn format_message(&self, message: &str, slots: &[AppointmentSlot]) -> String {
        let mut text = String::from("\u{1f389} *US Visa Appointment Alert* \u{1f389}\n\n");
        text.push_str(message);
        text.push_str("\n\n");

        if !slots.is_empty() {
            text.push_str(&format!("*Available Dates ({}):*\n", slots.len()));
            for (i, slot) in slots.iter().take(MAX_LISTED_DATES).enumerate() {
                text.push_str(&format!("{}. {}\n", i + 1, slot.date));
            }
            if slots.len() > MAX_LISTED_DATES {
                text.push_str(&format!(
                    "\n... and {} more\n",
                    slots.len() - MAX_LISTED_DATES
                ));
            }
        }

        text.push_str(&format!(
            "\n\u{1f552} Checked at: {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        ));
        text.push_str(&format!("\n\u{1f4cd} Location: {}", self.post));
        text.push_str(&format!("\n\u{1f4c5} Target: {}", self.target_label));
        text
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    fn enabled(&self) -> bool {
        self.bot_token.is_some() && self.chat_id.is_some()
    }

    async fn send(&self, message: &str, slots: &[AppointmentSlot]) -> Result<bool> {
        let (Some(bot_token), Some(chat_id)) = (&self.bot_token, &self.chat_id) else {
            return Ok(false);
        };

        let url = format!("https://api.telegram.org/bot{}/sendMessage", bot_token);
        let payload = json!({
            "chat_id": chat_id,
            "text": self.format_message(message, slots),
            "parse_mode": "Markdown",
        });

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        if response.status().is_success() {
            info!("telegram notification sent");
            Ok(true)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(%status, body = %body, "telegram API error");
            Ok(false)
        }
    }
}
