// Integration tests for the visa watcher
// These tests drive whole check cycles against a scripted page, no Chrome
// required.

pub mod check_cycle_tests;
pub mod notification_tests;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use visa_watcher::config::{AppConfig, CredentialConfig, SecurityAnswerConfig};
use visa_watcher::session::{ElementSnapshot, Locator, Session, SessionFactory};
use visa_watcher::{Result, WatcherError};

/// Test configuration with credentials and two answerable questions.
pub fn test_config() -> Arc<AppConfig> {
    Arc::new(AppConfig {
        credentials: CredentialConfig {
            username: "applicant@example.com".to_string(),
            password: "hunter2".to_string(),
        },
        security: SecurityAnswerConfig {
            answer_1: "Corolla".to_string(),
            answer_2: "Ankara".to_string(),
            answer_3: String::new(),
        },
        ..AppConfig::default()
    })
}

/// A page scripted entirely in memory. Locators listed in `present` resolve,
/// element listings and attribute reads come from fixed maps, and every
/// interaction is recorded for assertions.
#[derive(Default)]
pub struct ScriptedSession {
    pub present: Mutex<HashSet<String>>,
    pub elements: Mutex<HashMap<String, Vec<ElementSnapshot>>>,
    pub attributes: Mutex<HashMap<String, String>>,
    pub source: Mutex<String>,
    pub select_success: Mutex<HashMap<String, bool>>,
    pub navigations: Mutex<Vec<String>>,
    pub clicked: Mutex<Vec<String>>,
    pub typed: Mutex<Vec<(String, String)>>,
    pub closed: AtomicUsize,
}

impl ScriptedSession {
    pub fn add_present(&self, locator: &Locator) {
        self.present.lock().unwrap().insert(locator.to_string());
    }

    pub fn remove_present(&self, locator: &Locator) {
        self.present.lock().unwrap().remove(&locator.to_string());
    }

    pub fn set_source(&self, html: &str) {
        *self.source.lock().unwrap() = html.to_string();
    }

    pub fn set_elements(&self, locator: &Locator, snapshots: Vec<ElementSnapshot>) {
        self.elements
            .lock()
            .unwrap()
            .insert(locator.to_string(), snapshots);
    }

    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Session for ScriptedSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.navigations.lock().unwrap().push(url.to_string());
        Ok(())
    }

    async fn find(&self, locator: &Locator, _timeout: Duration) -> Result<bool> {
        Ok(self.present.lock().unwrap().contains(&locator.to_string()))
    }

    async fn click(&self, locator: &Locator) -> Result<()> {
        self.clicked.lock().unwrap().push(locator.to_string());
        Ok(())
    }

    async fn type_text(&self, locator: &Locator, text: &str) -> Result<()> {
        self.typed
            .lock()
            .unwrap()
            .push((locator.to_string(), text.to_string()));
        Ok(())
    }

    async fn read_text(&self, _locator: &Locator) -> Result<String> {
        Ok(String::new())
    }

    async fn read_attribute(&self, locator: &Locator, name: &str) -> Result<Option<String>> {
        Ok(self
            .attributes
            .lock()
            .unwrap()
            .get(&format!("{}@{}", locator, name))
            .cloned())
    }

    async fn list_elements(&self, locator: &Locator) -> Result<Vec<ElementSnapshot>> {
        Ok(self
            .elements
            .lock()
            .unwrap()
            .get(&locator.to_string())
            .cloned()
            .unwrap_or_default())
    }

    async fn select_option(&self, locator: &Locator, _option: &str) -> Result<bool> {
        Ok(self
            .select_success
            .lock()
            .unwrap()
            .get(&locator.to_string())
            .copied()
            .unwrap_or(true))
    }

    async fn page_source(&self) -> Result<String> {
        Ok(self.source.lock().unwrap().clone())
    }

    async fn capture_snapshot(&self, _label: &str) {}

    fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Owned handle onto one shared scripted session, so a boxed `dyn Session`
/// can delegate to the `Arc` the test still holds. (An `Arc<ScriptedSession>`
/// cannot implement the foreign `Session` trait directly — orphan rules.)
pub struct SharedScripted(pub Arc<ScriptedSession>);

#[async_trait]
impl Session for SharedScripted {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.0.navigate(url).await
    }

    async fn find(&self, locator: &Locator, timeout: Duration) -> Result<bool> {
        self.0.find(locator, timeout).await
    }

    async fn click(&self, locator: &Locator) -> Result<()> {
        self.0.click(locator).await
    }

    async fn type_text(&self, locator: &Locator, text: &str) -> Result<()> {
        self.0.type_text(locator, text).await
    }

    async fn read_text(&self, locator: &Locator) -> Result<String> {
        self.0.read_text(locator).await
    }

    async fn read_attribute(&self, locator: &Locator, name: &str) -> Result<Option<String>> {
        self.0.read_attribute(locator, name).await
    }

    async fn list_elements(&self, locator: &Locator) -> Result<Vec<ElementSnapshot>> {
        self.0.list_elements(locator).await
    }

    async fn select_option(&self, locator: &Locator, option: &str) -> Result<bool> {
        self.0.select_option(locator, option).await
    }

    async fn page_source(&self) -> Result<String> {
        self.0.page_source().await
    }

    async fn capture_snapshot(&self, label: &str) {
        self.0.capture_snapshot(label).await
    }

    fn close(&self) {
        self.0.close()
    }
}

/// Factory handing out views onto one shared scripted session.
#[derive(Clone, Default)]
pub struct ScriptedFactory {
    pub session: Arc<ScriptedSession>,
    pub fail_acquire: bool,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionFactory for ScriptedFactory {
    async fn acquire(&self) -> Result<Box<dyn Session>> {
        if self.fail_acquire {
            return Err(WatcherError::Session("browser launch failed".to_string()));
        }
        Ok(Box::new(SharedScripted(Arc::clone(&self.session))))
    }
}

/// Marks everything present for a clean run through sign-in, questions,
/// scheduling navigation and the calendar dropdowns.
pub fn prime_happy_path(session: &ScriptedSession) {
    session.add_present(&Locator::css("#signInName"));
    session.add_present(&Locator::css("#password"));
    session.add_present(&Locator::css("#continue"));
    session.add_present(&Locator::xpath("//*[contains(text(), 'Security Question')]"));
    session.add_present(&Locator::xpath("//button[contains(text(), 'Continue')]"));
    session.set_source(
        "<html><body><h1>Security Question</h1>\
         <label>What was your first car?</label>\
         <label>Where did you meet your spouse?</label></body></html>",
    );
    session.set_elements(
        &Locator::xpath("//input[@type='text' or @type='password']"),
        vec![enabled_input(), enabled_input()],
    );

    session.add_present(&Locator::xpath("//a[contains(text(), 'Reschedule Appointment')]"));
    session.add_present(&Locator::css("#consularPost"));
    session.add_present(&Locator::css("select[id*='month'], select[class*='month']"));
    session.add_present(&Locator::css("select[id*='year'], select[class*='year']"));
}

pub fn enabled_input() -> ElementSnapshot {
    ElementSnapshot {
        enabled: true,
        ..ElementSnapshot::default()
    }
}

pub fn date_cell(text: &str, classes: &str, parent_classes: &str) -> ElementSnapshot {
    ElementSnapshot {
        text: text.to_string(),
        classes: classes.to_string(),
        parent_classes: parent_classes.to_string(),
        enabled: true,
    }
}

pub fn date_cells_locator() -> Locator {
    Locator::xpath(
        "//td[not(contains(@class, 'disabled')) and not(contains(@class, 'ui-state-disabled'))]//a",
    )
}
