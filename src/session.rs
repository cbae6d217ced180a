use std::ffi::OsStr;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::BrowserConfig;
use crate::utils::error::{Result, WatcherError};

/// A query descriptor for finding a control in the live page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Css(String),
    XPath(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    pub fn xpath(selector: impl Into<String>) -> Self {
        Locator::XPath(selector.into())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(s) => write!(f, "css:{}", s),
            Locator::XPath(s) => write!(f, "xpath:{}", s),
        }
    }
}

/// A read-only snapshot of one matched element, enough for enabled/disabled
/// inference without holding a live handle.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ElementSnapshot {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub classes: String,
    #[serde(default)]
    pub parent_classes: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// The page capability surface every component interacts with. One session
/// maps to one live browser tab; implementations are exercised strictly
/// sequentially.
#[async_trait]
pub trait Session: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;

    /// True when the locator currently yields an interactable match, polling
    /// until the timeout elapses. Transport failures are errors; a clean
    /// no-match is `Ok(false)`.
    async fn find(&self, locator: &Locator, timeout: Duration) -> Result<bool>;

    async fn click(&self, locator: &Locator) -> Result<()>;

    async fn type_text(&self, locator: &Locator, text: &str) -> Result<()>;

    async fn read_text(&self, locator: &Locator) -> Result<String>;

    async fn read_attribute(&self, locator: &Locator, name: &str) -> Result<Option<String>>;

    async fn list_elements(&self, locator: &Locator) -> Result<Vec<ElementSnapshot>>;

    /// Selects an option on a `<select>` control, matching by visible text,
    /// then value, then case-insensitive containment. Returns whether an
    /// option was selected.
    async fn select_option(&self, locator: &Locator, option: &str) -> Result<bool>;

    /// Full HTML of the current page.
    async fn page_source(&self) -> Result<String>;

    /// Best-effort diagnostic screenshot; failures are logged, never raised.
    async fn capture_snapshot(&self, label: &str);

    /// Releases the underlying browser resources. Called exactly once per
    /// check by the orchestrator.
    fn close(&self);
}

/// Produces one session per check cycle.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn Session>>;
}

/// Production session on a dedicated headless Chrome instance. The browser
/// and its single tab live exactly as long as one check.
pub struct ChromeSession {
    _browser: Browser,
    tab: Arc<Tab>,
    save_screenshots: bool,
    screenshot_dir: String,
}

impl ChromeSession {
    pub fn launch(config: &BrowserConfig) -> Result<Self> {
        let mut launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .sandbox(false)
            .window_size(Some((1920, 1080)))
            .args(vec![
                OsStr::new("--no-sandbox"),
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--disable-gpu"),
                OsStr::new("--disable-extensions"),
                OsStr::new("--disable-blink-features=AutomationControlled"),
            ])
            .build()
            .map_err(|e| WatcherError::Session(format!("Failed to create launch options: {}", e)))?;

        if let Some(chrome_path) = &config.chrome_path {
            launch_options.path = Some(PathBuf::from(chrome_path));
        }

        let browser = Browser::new(launch_options)
            .map_err(|e| WatcherError::Session(format!("Failed to launch browser: {}", e)))?;

        let tab = browser
            .new_tab()
            .map_err(|e| WatcherError::Session(format!("Failed to create tab: {}", e)))?;

        tab.set_user_agent(&config.user_agent, None, None)
            .map_err(|e| WatcherError::Session(format!("Failed to set user agent: {}", e)))?;
        tab.set_default_timeout(Duration::from_secs(config.page_load_timeout));

        Ok(Self {
            _browser: browser,
            tab,
            save_screenshots: config.save_screenshots,
            screenshot_dir: config.screenshot_dir.clone(),
        })
    }

    fn element(&self, locator: &Locator) -> Result<headless_chrome::Element<'_>> {
        let found = match locator {
            Locator::Css(sel) => self.tab.find_element(sel),
            Locator::XPath(sel) => self.tab.find_element_by_xpath(sel),
        };
        found.map_err(|e| WatcherError::Session(format!("Element lookup {} failed: {}", locator, e)))
    }

    fn exists(&self, locator: &Locator) -> bool {
        match locator {
            Locator::Css(sel) => self.tab.find_element(sel).is_ok(),
            Locator::XPath(sel) => self.tab.find_element_by_xpath(sel).is_ok(),
        }
    }

    /// Runs a JS expression and deserializes its `JSON.stringify`'d result.
    fn eval_json<T: serde::de::DeserializeOwned>(&self, expression: &str) -> Result<T> {
        let result = self
            .tab
            .evaluate(expression, false)
            .map_err(|e| WatcherError::Session(format!("Script evaluation failed: {}", e)))?;

        let value = result
            .value
            .ok_or_else(|| WatcherError::Session("Script returned no value".to_string()))?;

        let json = value
            .as_str()
            .ok_or_else(|| WatcherError::Session("Script returned a non-string value".to_string()))?;

        Ok(serde_json::from_str(json)?)
    }

    /// JS fragment that collects the locator's matches into a `nodes` array.
    fn js_collect_nodes(locator: &Locator) -> String {
        match locator {
            Locator::Css(sel) => format!(
                "document.querySelectorAll({}).forEach(el => nodes.push(el));",
                js_string(sel)
            ),
            Locator::XPath(sel) => format!(
                r#"const xp = document.evaluate({}, document, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
                for (let i = 0; i < xp.snapshotLength; i++) nodes.push(xp.snapshotItem(i));"#,
                js_string(sel)
            ),
        }
    }
}

/// Quotes a Rust string as a JS string literal.
fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

const FIND_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[async_trait]
impl Session for ChromeSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.tab
            .navigate_to(url)
            .map_err(|e| WatcherError::Session(format!("Navigation failed: {}", e)))?;
        self.tab
            .wait_until_navigated()
            .map_err(|e| WatcherError::Session(format!("Page load failed: {}", e)))?;
        Ok(())
    }

    async fn find(&self, locator: &Locator, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.exists(locator) {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(FIND_POLL_INTERVAL).await;
        }
    }

    async fn click(&self, locator: &Locator) -> Result<()> {
        self.element(locator)?
            .click()
            .map_err(|e| WatcherError::Session(format!("Click on {} failed: {}", locator, e)))?;
        Ok(())
    }

    async fn type_text(&self, locator: &Locator, text: &str) -> Result<()> {
        let element = self.element(locator)?;
        element
            .click()
            .map_err(|e| WatcherError::Session(format!("Focus on {} failed: {}", locator, e)))?;
        element
            .type_into(text)
            .map_err(|e| WatcherError::Session(format!("Typing into {} failed: {}", locator, e)))?;
        Ok(())
    }

    async fn read_text(&self, locator: &Locator) -> Result<String> {
        self.element(locator)?
            .get_inner_text()
            .map_err(|e| WatcherError::Session(format!("Text read on {} failed: {}", locator, e)))
    }

    async fn read_attribute(&self, locator: &Locator, name: &str) -> Result<Option<String>> {
        let expression = format!(
            r#"(function() {{
                const nodes = [];
                {collect}
                if (nodes.length === 0) return JSON.stringify(null);
                const el = nodes[0];
                if ({attr} === 'value' && el.value !== undefined) return JSON.stringify(el.value);
                return JSON.stringify(el.getAttribute({attr}));
            }})()"#,
            collect = Self::js_collect_nodes(locator),
            attr = js_string(name),
        );
        self.eval_json(&expression)
    }

    async fn list_elements(&self, locator: &Locator) -> Result<Vec<ElementSnapshot>> {
        let expression = format!(
            r#"(function() {{
                const nodes = [];
                {collect}
                return JSON.stringify(nodes.map(el => ({{
                    text: (el.textContent || '').trim(),
                    classes: el.getAttribute('class') || '',
                    parent_classes: el.parentElement ? (el.parentElement.getAttribute('class') || '') : '',
                    enabled: !el.disabled
                }})));
            }})()"#,
            collect = Self::js_collect_nodes(locator),
        );
        self.eval_json(&expression)
    }

    async fn select_option(&self, locator: &Locator, option: &str) -> Result<bool> {
        let expression = format!(
            r#"(function() {{
                const nodes = [];
                {collect}
                const el = nodes[0];
                if (!el || el.tagName !== 'SELECT') return JSON.stringify(false);
                const want = {want};
                const options = Array.from(el.options);
                let idx = options.findIndex(o => o.text.trim() === want);
                if (idx < 0) idx = options.findIndex(o => o.value === want);
                if (idx < 0) idx = options.findIndex(o => o.text.toLowerCase().includes(want.toLowerCase()));
                if (idx < 0) return JSON.stringify(false);
                el.selectedIndex = idx;
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return JSON.stringify(true);
            }})()"#,
            collect = Self::js_collect_nodes(locator),
            want = js_string(option),
        );
        self.eval_json(&expression)
    }

    async fn page_source(&self) -> Result<String> {
        self.tab
            .get_content()
            .map_err(|e| WatcherError::Session(format!("Failed to get page content: {}", e)))
    }

    async fn capture_snapshot(&self, label: &str) {
        if !self.save_screenshots {
            return;
        }

        let data = match self.tab.capture_screenshot(
            headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption::Png,
            None,
            None,
            true,
        ) {
            Ok(data) => data,
            Err(e) => {
                warn!(label, error = %e, "screenshot capture failed");
                return;
            }
        };

        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        let filename = format!("{}_{}_{}.png", label, timestamp, uuid::Uuid::new_v4().simple());
        let path = std::path::Path::new(&self.screenshot_dir).join(&filename);

        if let Err(e) = std::fs::create_dir_all(&self.screenshot_dir) {
            warn!(label, error = %e, "could not create screenshot directory");
            return;
        }
        match std::fs::write(&path, data) {
            Ok(()) => debug!(label, path = %path.display(), "saved screenshot"),
            Err(e) => warn!(label, error = %e, "could not write screenshot"),
        }
    }

    fn close(&self) {
        let _ = self.tab.close(true);
    }
}

/// Launches a fresh Chrome session per check.
pub struct ChromeSessionFactory {
    config: BrowserConfig,
}

impl ChromeSessionFactory {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SessionFactory for ChromeSessionFactory {
    async fn acquire(&self) -> Result<Box<dyn Session>> {
        let session = ChromeSession::launch(&self.config)?;
        Ok(Box::new(session))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_display() {
        assert_eq!(Locator::css(".price").to_string(), "css:.price");
        assert_eq!(
            Locator::xpath("//select[1]").to_string(),
            "xpath://select[1]"
        );
    }

    #[test]
    fn test_js_string_escaping() {
        assert_eq!(js_string("plain"), "\"plain\"");
        assert_eq!(js_string(r#"a"b"#), r#""a\"b""#);
    }

    #[test]
    fn test_element_snapshot_deserialization() {
        // Shape produced by the in-page collection script.
        let json = r#"[{"text":"14","classes":"day","parent_classes":"ui-state-disabled","enabled":true}]"#;
        let snapshots: Vec<ElementSnapshot> = serde_json::from_str(json).unwrap();
        assert_eq!(snapshots[0].text, "14");
        assert_eq!(snapshots[0].parent_classes, "ui-state-disabled");
        assert!(snapshots[0].enabled);
    }

    #[test]
    fn test_element_snapshot_defaults() {
        let json = r#"[{"text":"5"}]"#;
        let snapshots: Vec<ElementSnapshot> = serde_json::from_str(json).unwrap();
        assert!(snapshots[0].enabled);
        assert!(snapshots[0].classes.is_empty());
    }

    #[tokio::test]
    async fn test_fake_session_close_counting() {
        let session = testing::FakeSession::new();
        assert_eq!(session.close_count(), 0);
        session.close();
        assert_eq!(session.close_count(), 1);
    }
}
