use async_trait::async_trait;
use lettre::message::{header, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{error, info};

use super::Notifier;
use crate::checker::AppointmentSlot;
use crate::config::AppConfig;
use crate::utils::error::{Result, WatcherError};
use crate::utils::format_month_year;

const MAX_LISTED_DATES: usize = 20;
const DEFAULT_SMTP_SERVER: &str = "smtp.gmail.com";

/// SMTP channel that mails the operator at their own address. Enabled only
/// when the address and an app password are configured.
pub struct EmailNotifier {
    address: Option<String>,
    password: Option<String>,
    smtp_server: String,
    post: String,
    target_label: String,
}

impl EmailNotifier {
    pub fn from_config(config: &AppConfig) -> Self {
        let notifier = Self {
            address: config.notifications.email.address.clone(),
            password: config.notifications.email.password.clone(),
            smtp_server: config
                .notifications
                .email
                .smtp_server
                .clone()
                .unwrap_or_else(|| DEFAULT_SMTP_SERVER.to_string()),
            post: config.target.consular_post.clone(),
            target_label: format_month_year(config.target.month, config.target.year),
        };
        if !notifier.enabled() {
            info!("email notifications disabled (no credentials)");
        }
        notifier
    }

    fn format_subject(&self) -> String {
        format!("\u{1f389} US Visa Appointment Available - {}", self.post)
    }

    fn format_html_body(&self, message: &str, slots: &[AppointmentSlot]) -> String {
        let mut body = String::from("<h2>US Visa Appointment Alert</h2>\n");
        body.push_str(&format!("<p>{}</p>\n", message));

        if !slots.is_empty() {
            body.push_str(&format!("<h3>Available Dates ({}):</h3>\n<ul>\n", slots.len()));
            for slot in slots.iter().take(MAX_LISTED_DATES) {
                body.push_str(&format!("<li>{}</li>\n", slot.date));
            }
            body.push_str("</ul>\n");
            if slots.len() > MAX_LISTED_DATES {
                body.push_str(&format!(
                    "<p>... and {} more</p>\n",
                    slots.len() - MAX_LISTED_DATES
                ));
            }
        }

        body.push_str(&format!(
            "<p><strong>Checked at:</strong> {}</p>\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        ));
        body.push_str(&format!("<p><strong>Location:</strong> {}</p>\n", self.post));
        body.push_str(&format!(
            "<p><strong>Target:</strong> {}</p>\n",
            self.target_label
        ));
        body
    }

    fn format_text_body(&self, message: &str, slots: &[AppointmentSlot]) -> String {
        let mut body = format!("US VISA APPOINTMENT ALERT\n\n{}\n", message);
        if !slots.is_empty() {
            body.push_str(&format!("\nAvailable dates ({}):\n", slots.len()));
            for slot in slots.iter().take(MAX_LISTED_DATES) {
                body.push_str(&format!("  {}\n", slot.date));
            }
        }
        body.push_str(&format!("\nLocation: {}\n", self.post));
        body.push_str(&format!("Target: {}\n", self.target_label));
        body
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn name(&self) -> &str {
        "email"
    }

    fn enabled(&self) -> bool {
        self.address.is_some() && self.password.is_some()
    }

    async fn send(&self, message: &str, slots: &[AppointmentSlot]) -> Result<bool> {
        let (Some(address), Some(password)) = (&self.address, &self.password) else {
            return Ok(false);
        };

        let mailbox: Mailbox = address
            .parse()
            .map_err(|e| WatcherError::Notification {
                channel: "email".to_string(),
                message: format!("invalid address '{}': {}", address, e),
            })?;

        let email = Message::builder()
            .from(mailbox.clone())
            .to(mailbox)
            .subject(self.format_subject())
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_PLAIN)
                            .body(self.format_text_body(message, slots)),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_HTML)
                            .body(self.format_html_body(message, slots)),
                    ),
            )
            .map_err(|e| WatcherError::Notification {
                channel: "email".to_string(),
                message: e.to_string(),
            })?;

        let credentials = Credentials::new(address.clone(), password.clone());
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&self.smtp_server)
            .map_err(|e| WatcherError::Notification {
                channel: "email".to_string(),
                message: format!("SMTP relay setup failed: {}", e),
            })?
            .credentials(credentials)
            .build();

        match mailer.send(email).await {
            Ok(_) => {
                info!("email notification sent");
                Ok(true)
            }
            Err(e) => {
                error!(error = %e, "email delivery failed");
                Ok(false)
            }
        }
    }
}
