pub mod auth;
pub mod checker;
pub mod config;
pub mod locator;
pub mod notify;
pub mod scheduler;
pub mod security;
pub mod session;
pub mod utils;

// Re-export commonly used types
pub use checker::{AppointmentChecker, AppointmentSlot, CheckResult};
pub use config::AppConfig;
pub use notify::NotificationFanout;
pub use scheduler::PollingScheduler;
pub use utils::error::{Result, WatcherError};
