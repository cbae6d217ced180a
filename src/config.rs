use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::security::SecurityQuestionBank;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub credentials: CredentialConfig,
    pub security: SecurityAnswerConfig,
    pub target: TargetConfig,
    pub schedule: ScheduleConfig,
    pub notifications: NotificationsConfig,
    pub browser: BrowserConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CredentialConfig {
    pub username: String,
    pub password: String,
}

/// Answers for the security-question knowledge check. Empty strings mean
/// "not configured" and are treated as unknown at match time.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SecurityAnswerConfig {
    pub answer_1: String,
    pub answer_2: String,
    pub answer_3: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub base_url: String,
    pub consular_post: String,
    pub month: u32,
    pub year: i32,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.usvisascheduling.com/".to_string(),
            consular_post: "ISTANBUL".to_string(),
            month: 12,
            year: 2025,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Minimum minutes between checks.
    pub check_interval_min: u64,
    /// Maximum minutes between checks.
    pub check_interval_max: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            check_interval_min: 50,
            check_interval_max: 70,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct NotificationsConfig {
    pub telegram: TelegramConfig,
    pub email: EmailConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EmailConfig {
    pub address: Option<String>,
    pub password: Option<String>,
    pub smtp_server: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub chrome_path: Option<String>,
    pub user_agent: String,
    /// Default per-candidate wait when resolving locators, in seconds.
    pub element_timeout: u64,
    pub page_load_timeout: u64,
    pub save_screenshots: bool,
    pub screenshot_dir: String,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
                         AppleWebKit/537.36 (KHTML, like Gecko) \
                         Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            element_timeout: 15,
            page_load_timeout: 30,
            save_screenshots: true,
            screenshot_dir: "screenshots".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_dir: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: "logs".to_string(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from `VISA_*` environment variables, e.g.
    /// `VISA_CREDENTIALS__USERNAME`, `VISA_TARGET__MONTH`. A `.env` file
    /// is honored when the caller loads it beforehand.
    pub fn from_env() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(
                Environment::with_prefix("VISA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: AppConfig = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.credentials.username.is_empty() || self.credentials.password.is_empty() {
            return Err(ConfigError::Message(
                "credentials.username and credentials.password must be set".into(),
            ));
        }

        if self.security_question_bank().is_empty() {
            return Err(ConfigError::Message(
                "At least one security answer must be set".into(),
            ));
        }

        if !(1..=12).contains(&self.target.month) {
            return Err(ConfigError::Message(
                "target.month must be between 1 and 12".into(),
            ));
        }

        if Url::parse(&self.target.base_url).is_err() {
            return Err(ConfigError::Message("Invalid base URL format".into()));
        }

        if self.schedule.check_interval_min == 0 {
            return Err(ConfigError::Message(
                "schedule.check_interval_min must be greater than 0".into(),
            ));
        }

        if self.schedule.check_interval_min > self.schedule.check_interval_max {
            return Err(ConfigError::Message(
                "schedule.check_interval_min cannot exceed check_interval_max".into(),
            ));
        }

        Ok(())
    }

    /// The configured question→answer pairs, in the order the site's
    /// enrollment flow presents them. The third question's text is a
    /// placeholder until the operator identifies it; its answer is still
    /// reachable through the substring and token-overlap tiers.
    pub fn security_question_bank(&self) -> SecurityQuestionBank {
        SecurityQuestionBank::new(vec![
            (
                "What was your first car?".to_string(),
                self.security.answer_1.clone(),
            ),
            (
                "Where did you meet your spouse?".to_string(),
                self.security.answer_2.clone(),
            ),
            (
                "security_question_3".to_string(),
                self.security.answer_3.clone(),
            ),
        ])
    }
}
