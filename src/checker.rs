use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::auth::AuthFlow;
use crate::config::AppConfig;
use crate::locator::LocatorChain;
use crate::security::SecurityQuestionBank;
use crate::session::{ElementSnapshot, Locator, Session, SessionFactory};
use crate::utils::error::{Result, WatcherError};
use crate::utils::{month_abbrev, month_name};

/// Cap on next-month clicks when stepping the calendar manually.
pub const MAX_MONTH_STEPS: u32 = 24;

const PAGE_SETTLE: Duration = Duration::from_secs(3);
const CALENDAR_SETTLE: Duration = Duration::from_secs(2);
const STEP_SETTLE: Duration = Duration::from_secs(1);
const PRESENCE_PROBE: Duration = Duration::from_secs(5);

/// One available date as displayed in the calendar. The class markers are
/// kept only to make disabled/enabled inference auditable in logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentSlot {
    pub date: String,
    pub classes: String,
    pub parent_classes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub success: bool,
    pub appointments_found: bool,
    pub appointments: Vec<AppointmentSlot>,
    pub message: String,
}

impl CheckResult {
    pub fn completed(appointments: Vec<AppointmentSlot>) -> Self {
        let message = if appointments.is_empty() {
            "No appointments available".to_string()
        } else {
            format!("Found {} available appointment(s)", appointments.len())
        };
        Self {
            success: true,
            appointments_found: !appointments.is_empty(),
            appointments,
            message,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            appointments_found: false,
            appointments: Vec::new(),
            message: message.into(),
        }
    }
}

fn scheduling_chain() -> LocatorChain {
    LocatorChain::new(
        "scheduling entry link",
        vec![
            Locator::xpath("//a[contains(text(), 'Reschedule Appointment')]"),
            Locator::xpath("//button[contains(text(), 'Reschedule Appointment')]"),
            Locator::xpath(
                "//a[contains(translate(text(), 'ABCDEFGHIJKLMNOPQRSTUVWXYZ', 'abcdefghijklmnopqrstuvwxyz'), 'reschedule')]",
            ),
            Locator::xpath("//a[contains(text(), 'Schedule Appointment')]"),
            Locator::xpath("//button[contains(text(), 'Schedule Appointment')]"),
            Locator::xpath("//a[contains(text(), 'Continue')]"),
            Locator::xpath("//button[contains(text(), 'Continue')]"),
        ],
    )
}

fn post_dropdown_chain() -> LocatorChain {
    LocatorChain::new(
        "consular post dropdown",
        vec![
            Locator::css("#consularPost"),
            Locator::css("select[name='consularPost']"),
            Locator::css("select[id*='consular'], select[class*='consular']"),
            Locator::xpath("//select"),
        ],
    )
}

fn month_dropdown_chain() -> LocatorChain {
    LocatorChain::new(
        "calendar month dropdown",
        vec![
            Locator::css("select[id*='month'], select[class*='month']"),
            Locator::xpath("//select[option[contains(text(), 'Jan') or contains(text(), 'Feb')]]"),
            Locator::xpath("(//select)[1]"),
        ],
    )
}

fn year_dropdown_chain() -> LocatorChain {
    LocatorChain::new(
        "calendar year dropdown",
        vec![
            Locator::css("select[id*='year'], select[class*='year']"),
            Locator::xpath("//select[option[contains(text(), '20')]]"),
            Locator::xpath("(//select)[2]"),
        ],
    )
}

fn next_month_chain() -> LocatorChain {
    LocatorChain::new(
        "next month control",
        vec![
            Locator::css("button[class*='next']"),
            Locator::css("button[aria-label*='next']"),
            Locator::xpath("//button[contains(text(), '\u{203a}')] | //button[contains(text(), '>')]"),
            Locator::css(".ui-datepicker-next"),
            Locator::css("a[class*='next']"),
        ],
    )
}

fn date_cells_chain() -> LocatorChain {
    LocatorChain::new(
        "available date cells",
        vec![
            Locator::xpath(
                "//td[not(contains(@class, 'disabled')) and not(contains(@class, 'ui-state-disabled'))]//a",
            ),
            Locator::xpath("//td[contains(@class, 'available')]//a"),
            Locator::xpath(
                "//a[contains(@class, 'ui-state-default') and not(contains(@class, 'ui-state-disabled'))]",
            ),
            Locator::xpath("//td[@data-handler='selectDay' and not(contains(@class, 'disabled'))]"),
            Locator::xpath("//td[not(contains(@class, 'disabled'))]//a[contains(@href, '#')]"),
        ],
    )
}

/// Places the calendar header might live; probed in order when reading the
/// currently displayed month.
fn month_label_locators() -> Vec<Locator> {
    vec![
        Locator::css("[class*='month']"),
        Locator::css("[class*='calendar-header']"),
        Locator::xpath("//h3 | //h4 | //h5"),
    ]
}

/// Whether a text fragment plausibly names the displayed calendar month.
fn classify_month_label(text: &str) -> bool {
    let text = text.trim();
    if text.is_empty() || text.len() >= 50 {
        return false;
    }
    let lower = text.to_lowercase();
    let has_month = (1..=12).any(|m| lower.contains(&month_name(m).to_lowercase()));
    let has_year = Regex::new(r"\b20\d{2}\b").unwrap().is_match(text);
    has_month || has_year
}

/// Case-insensitive match of a displayed label against the target month.
fn is_target_month(label: &str, month: u32, year: i32) -> bool {
    let lower = label.to_lowercase();
    lower.contains(&month_name(month).to_lowercase()) && label.contains(&year.to_string())
}

fn is_disabled(snapshot: &ElementSnapshot) -> bool {
    snapshot.classes.to_lowercase().contains("disabled")
        || snapshot.parent_classes.to_lowercase().contains("disabled")
}

/// Runs one complete check cycle: acquire a session, authenticate, walk to
/// the target calendar, read availability, release the session.
pub struct AppointmentChecker {
    config: Arc<AppConfig>,
    factory: Arc<dyn SessionFactory>,
    bank: SecurityQuestionBank,
}

impl AppointmentChecker {
    pub fn new(config: Arc<AppConfig>, factory: Arc<dyn SessionFactory>) -> Self {
        let bank = config.security_question_bank();
        Self {
            config,
            factory,
            bank,
        }
    }

    fn element_timeout(&self) -> Duration {
        Duration::from_secs(self.config.browser.element_timeout)
    }

    /// One cycle. Categorized failures come back as `success = false`
    /// results; only uncategorized faults (session transport, IO) escape as
    /// errors for the caller's backoff handling. The session is released
    /// exactly once on every path.
    pub async fn run_check(&self) -> Result<CheckResult> {
        info!("acquiring browser session");
        let session = self.factory.acquire().await?;

        let outcome = self.run_stages(session.as_ref()).await;
        session.close();

        match outcome {
            Ok(result) => Ok(result),
            Err(err) if is_unexpected(&err) => Err(err),
            Err(err) => {
                warn!(error = %err, "check cycle failed");
                Ok(CheckResult::failure(err.to_string()))
            }
        }
    }

    async fn run_stages(&self, session: &dyn Session) -> Result<CheckResult> {
        let auth = AuthFlow::new(session, &self.config, &self.bank);
        if let Err(err) = auth.authenticate().await {
            return stage_failure(err, "Authentication failed");
        }

        if let Err(err) = self.open_scheduling(session).await {
            return stage_failure(err, "Failed to open the scheduling page");
        }

        if let Err(err) = self.select_consular_post(session).await {
            return stage_failure(err, "Failed to select consular post");
        }

        if let Err(err) = self.navigate_to_target_month(session).await {
            return stage_failure(err, "Failed to navigate to target month");
        }

        let slots = match self.read_availability(session).await {
            Ok(slots) => slots,
            Err(err) => return stage_failure(err, "Failed to read availability"),
        };

        Ok(CheckResult::completed(slots))
    }

    async fn open_scheduling(&self, session: &dyn Session) -> Result<()> {
        session.capture_snapshot("dashboard").await;

        let link = scheduling_chain()
            .resolve(session, self.element_timeout())
            .await?;
        info!(control = %link, "opening scheduling page");
        session.click(&link).await?;
        tokio::time::sleep(PAGE_SETTLE).await;

        session.capture_snapshot("scheduling_page").await;
        Ok(())
    }

    async fn select_consular_post(&self, session: &dyn Session) -> Result<()> {
        let post = &self.config.target.consular_post;
        let dropdown = post_dropdown_chain()
            .resolve(session, self.element_timeout())
            .await?;

        info!(post = %post, "selecting consular post");
        if !session.select_option(&dropdown, post).await? {
            return Err(WatcherError::LocatorNotFound {
                target: format!("consular post option '{}'", post),
            });
        }

        tokio::time::sleep(CALENDAR_SETTLE).await;
        session.capture_snapshot("consular_post_selected").await;
        Ok(())
    }

    async fn navigate_to_target_month(&self, session: &dyn Session) -> Result<()> {
        let month = self.config.target.month;
        let year = self.config.target.year;
        info!(month, year, "navigating calendar");

        if self.try_calendar_dropdowns(session, month, year).await? {
            session.capture_snapshot("calendar_at_target").await;
            return Ok(());
        }

        info!("dropdown navigation unavailable, stepping month by month");
        self.step_to_target_month(session, month, year).await?;
        session.capture_snapshot("calendar_at_target").await;
        Ok(())
    }

    /// Preferred path: month and year `<select>` controls.
    async fn try_calendar_dropdowns(
        &self,
        session: &dyn Session,
        month: u32,
        year: i32,
    ) -> Result<bool> {
        let Some(month_dropdown) = month_dropdown_chain()
            .resolve_optional(session, PRESENCE_PROBE)
            .await?
        else {
            return Ok(false);
        };

        // Widgets render either abbreviated or full month names.
        let mut selected = session
            .select_option(&month_dropdown, month_abbrev(month))
            .await?;
        if !selected {
            selected = session.select_option(&month_dropdown, month_name(month)).await?;
        }
        if !selected {
            warn!(month, "month dropdown present but target month not selectable");
            return Ok(false);
        }
        debug!(month = month_abbrev(month), "month selected");
        tokio::time::sleep(STEP_SETTLE).await;

        let Some(year_dropdown) = year_dropdown_chain()
            .resolve_optional(session, PRESENCE_PROBE)
            .await?
        else {
            warn!("no year dropdown found");
            return Ok(false);
        };
        if !session.select_option(&year_dropdown, &year.to_string()).await? {
            warn!(year, "year dropdown present but target year not selectable");
            return Ok(false);
        }
        debug!(year, "year selected");
        tokio::time::sleep(CALENDAR_SETTLE).await;

        Ok(true)
    }

    /// Fallback path: click "next month" until the displayed header matches,
    /// bounded to keep a drifted header from looping forever.
    async fn step_to_target_month(
        &self,
        session: &dyn Session,
        month: u32,
        year: i32,
    ) -> Result<()> {
        for step in 0..MAX_MONTH_STEPS {
            let label = self.current_month_label(session).await?;
            debug!(step, label = %label, "calendar currently shows");

            if is_target_month(&label, month, year) {
                info!(label = %label, "reached target month");
                return Ok(());
            }

            let next = next_month_chain().resolve(session, PRESENCE_PROBE).await?;
            session.click(&next).await?;
            tokio::time::sleep(STEP_SETTLE).await;
        }

        Err(WatcherError::TargetMonthUnreachable {
            steps: MAX_MONTH_STEPS,
        })
    }

    /// The displayed month/year header text, or `CalendarStateUnknown` when
    /// nothing on the page classifies as one.
    async fn current_month_label(&self, session: &dyn Session) -> Result<String> {
        for candidate in month_label_locators() {
            let elements = session.list_elements(&candidate).await?;
            for element in elements {
                if classify_month_label(&element.text) {
                    return Ok(element.text.trim().to_string());
                }
            }
        }
        Err(WatcherError::CalendarStateUnknown)
    }

    /// Collects non-disabled date cells. An empty calendar month is a valid
    /// outcome, not an error.
    async fn read_availability(&self, session: &dyn Session) -> Result<Vec<AppointmentSlot>> {
        session.capture_snapshot("checking_availability").await;

        let Some(cells) = date_cells_chain()
            .resolve_optional(session, PRESENCE_PROBE)
            .await?
        else {
            info!("no candidate date cells present, treating as no availability");
            return Ok(Vec::new());
        };

        let elements = session.list_elements(&cells).await?;
        let slots: Vec<AppointmentSlot> = elements
            .into_iter()
            .filter_map(|element| {
                let date = element.text.trim().to_string();
                if date.is_empty() || !date.chars().all(|c| c.is_ascii_digit()) {
                    return None;
                }
                if is_disabled(&element) {
                    return None;
                }
                debug!(date = %date, "found available date");
                Some(AppointmentSlot {
                    date,
                    classes: element.classes,
                    parent_classes: element.parent_classes,
                })
            })
            .collect();

        if slots.is_empty() {
            info!("all dates disabled or absent");
        } else {
            info!(count = slots.len(), "found available dates");
            session.capture_snapshot("appointments_found").await;
        }
        Ok(slots)
    }
}

fn stage_failure(err: WatcherError, context: &str) -> Result<CheckResult> {
    if is_unexpected(&err) {
        Err(err)
    } else {
        warn!(error = %err, context, "check stage failed");
        Ok(CheckResult::failure(format!("{}: {}", context, err)))
    }
}

/// Faults that are not part of the categorized taxonomy; the scheduler backs
/// off on these instead of proceeding on the normal cadence.
fn is_unexpected(err: &WatcherError) -> bool {
    matches!(
        err,
        WatcherError::Session(_)
            | WatcherError::Http(_)
            | WatcherError::Io(_)
            | WatcherError::Serialization(_)
            | WatcherError::Config(_)
    )
}
