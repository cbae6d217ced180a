use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("No locator matched for {target}")]
    LocatorNotFound { target: String },

    #[error("Calendar state unknown: no displayed month/year label could be classified")]
    CalendarStateUnknown,

    #[error("Target month not reached after {steps} next-month steps")]
    TargetMonthUnreachable { steps: u32 },

    #[error("Challenge not resolved within {seconds}s")]
    ChallengeTimeout { seconds: u64 },

    #[error("Captcha unresolved at deadline")]
    CaptchaUnresolved,

    #[error("Only {answered} security questions answerable, need at least {required}")]
    UnanswerableSecurityQuestions { answered: usize, required: usize },

    #[error("Authentication failed after {attempts} login attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Notification channel {channel} failed: {message}")]
    Notification { channel: String, message: String },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, WatcherError>;
