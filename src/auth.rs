use std::collections::HashSet;
use std::time::Duration;

use scraper::{Html, Selector};
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::locator::LocatorChain;
use crate::security::SecurityQuestionBank;
use crate::session::{ElementSnapshot, Locator, Session};
use crate::utils::error::{Result, WatcherError};

/// Hard ceiling on full sign-in restarts when the presented question set is
/// unanswerable. The site draws 2-of-N questions per attempt, so restarting
/// re-rolls the draw.
pub const MAX_LOGIN_RETRIES: u32 = 10;

/// Questions answered below this count cannot pass the knowledge check.
pub const MIN_ANSWERED_QUESTIONS: usize = 2;

const CHALLENGE_TIMEOUT: Duration = Duration::from_secs(20);
const CAPTCHA_WAIT: Duration = Duration::from_secs(60);
const CAPTCHA_POLL: Duration = Duration::from_secs(5);
const PAGE_SETTLE: Duration = Duration::from_secs(3);
const FIELD_SETTLE: Duration = Duration::from_millis(500);
const WIDGET_SETTLE: Duration = Duration::from_secs(2);
const PRESENCE_PROBE: Duration = Duration::from_secs(2);
const QUESTION_PAGE_WAIT: Duration = Duration::from_secs(15);
const VERIFY_WAIT: Duration = Duration::from_secs(10);

/// All text/password inputs on the page, in document order. Individual
/// fields are addressed positionally through this node-set.
const ANSWER_INPUTS_XPATH: &str = "//input[@type='text' or @type='password']";

/// Page fragments that carry a question mark but are navigation chrome, not
/// security questions.
const BOILERPLATE_PHRASES: &[&str] = &[
    "forgot your password",
    "forgot password",
    "need help",
    "verify you are human",
    "trouble signing in",
];

#[derive(Debug)]
enum AuthState {
    Init,
    Navigate,
    Challenge,
    FillCredentials,
    Captcha,
    Submit,
    SecurityQuestions,
    RetryLogin,
    Verify,
    Done,
    Failed(WatcherError),
}

/// Result of one security-question pass.
#[derive(Debug, PartialEq, Eq)]
pub enum StageOutcome {
    Success,
    Failure(String),
    RetryRequested,
}

fn username_chain() -> LocatorChain {
    LocatorChain::new(
        "username field",
        vec![
            Locator::css("#signInName"),
            Locator::css("input[name='signInName']"),
            Locator::css("input[type='email']"),
        ],
    )
}

fn password_chain() -> LocatorChain {
    LocatorChain::new(
        "password field",
        vec![
            Locator::css("#password"),
            Locator::css("input[name='password']"),
            Locator::css("input[type='password']"),
        ],
    )
}

fn sign_in_chain() -> LocatorChain {
    LocatorChain::new(
        "sign-in button",
        vec![
            Locator::css("#continue"),
            Locator::xpath("//button[contains(text(), 'Sign In')]"),
            Locator::css("button[type='submit']"),
        ],
    )
}

fn captcha_field_chain() -> LocatorChain {
    LocatorChain::new(
        "captcha response field",
        vec![
            Locator::css("#extension_atlasCaptchaResponse"),
            Locator::css("input[id*='Captcha']"),
        ],
    )
}

fn challenge_checkbox_chain() -> LocatorChain {
    LocatorChain::new(
        "challenge consent checkbox",
        vec![
            Locator::css("input[type='checkbox']"),
            Locator::css("#challenge-stage input"),
            Locator::xpath("//input[@type='checkbox']"),
            Locator::css("label input"),
        ],
    )
}

fn question_page_chain() -> LocatorChain {
    LocatorChain::new(
        "security questions page",
        vec![Locator::xpath("//*[contains(text(), 'Security Question')]")],
    )
}

fn error_banner_chain() -> LocatorChain {
    LocatorChain::new("sign-in error banner", vec![Locator::css(".error")])
}

fn continue_chain() -> LocatorChain {
    LocatorChain::new(
        "continue button",
        vec![
            Locator::xpath("//button[contains(text(), 'Continue')]"),
            Locator::xpath("//input[@value='Continue']"),
        ],
    )
}

fn logged_in_chain() -> LocatorChain {
    LocatorChain::new(
        "logged-in indicator",
        vec![
            Locator::xpath("//*[contains(text(), 'Schedule Appointment')]"),
            Locator::xpath("//*[contains(text(), 'Visa Application Home')]"),
            Locator::xpath("//*[contains(text(), 'Manage Applications')]"),
        ],
    )
}

/// Drives the full sign-in sequence against one live session.
pub struct AuthFlow<'a> {
    session: &'a dyn Session,
    config: &'a AppConfig,
    bank: &'a SecurityQuestionBank,
}

impl<'a> AuthFlow<'a> {
    pub fn new(
        session: &'a dyn Session,
        config: &'a AppConfig,
        bank: &'a SecurityQuestionBank,
    ) -> Self {
        Self {
            session,
            config,
            bank,
        }
    }

    fn element_timeout(&self) -> Duration {
        Duration::from_secs(self.config.browser.element_timeout)
    }

    /// Runs the state machine to completion. Transport-level session errors
    /// propagate immediately; flow-level failures surface as typed errors
    /// once the machine reaches its failed state.
    pub async fn authenticate(&self) -> Result<()> {
        let mut restarts: u32 = 0;
        let mut state = AuthState::Init;

        loop {
            state = match state {
                AuthState::Init => AuthState::Navigate,

                AuthState::Navigate => {
                    info!(url = %self.config.target.base_url, "opening sign-in page");
                    self.session.navigate(&self.config.target.base_url).await?;
                    tokio::time::sleep(PAGE_SETTLE).await;
                    AuthState::Challenge
                }

                AuthState::Challenge => {
                    if self.clear_challenge(CHALLENGE_TIMEOUT).await? {
                        AuthState::FillCredentials
                    } else {
                        AuthState::Failed(WatcherError::ChallengeTimeout {
                            seconds: CHALLENGE_TIMEOUT.as_secs(),
                        })
                    }
                }

                AuthState::FillCredentials => {
                    self.fill_credentials().await?;
                    AuthState::Captcha
                }

                AuthState::Captcha => {
                    self.await_captcha().await?;
                    AuthState::Submit
                }

                AuthState::Submit => {
                    self.session.capture_snapshot("before_sign_in").await;
                    let button = sign_in_chain()
                        .resolve(self.session, self.element_timeout())
                        .await?;
                    info!("submitting sign-in form");
                    self.session.click(&button).await?;
                    tokio::time::sleep(PAGE_SETTLE).await;
                    AuthState::SecurityQuestions
                }

                AuthState::SecurityQuestions => match self.answer_security_questions().await? {
                    StageOutcome::Success => AuthState::Verify,
                    StageOutcome::RetryRequested => AuthState::RetryLogin,
                    StageOutcome::Failure(reason) => {
                        AuthState::Failed(WatcherError::Authentication(reason))
                    }
                },

                AuthState::RetryLogin => {
                    restarts += 1;
                    if restarts > MAX_LOGIN_RETRIES {
                        AuthState::Failed(WatcherError::RetriesExhausted {
                            attempts: MAX_LOGIN_RETRIES,
                        })
                    } else {
                        info!(
                            attempt = restarts,
                            max = MAX_LOGIN_RETRIES,
                            "restarting sign-in to draw a new question set"
                        );
                        AuthState::Navigate
                    }
                }

                AuthState::Verify => {
                    self.verify_logged_in().await?;
                    AuthState::Done
                }

                AuthState::Done => {
                    info!("authentication complete");
                    return Ok(());
                }

                AuthState::Failed(err) => {
                    self.session.capture_snapshot("auth_failed").await;
                    return Err(err);
                }
            };
        }
    }

    /// Detects and rides out the anti-bot interstitial. Returns whether the
    /// sign-in form became reachable before the deadline.
    async fn clear_challenge(&self, timeout: Duration) -> Result<bool> {
        let source = self.session.page_source().await?.to_lowercase();
        if !source.contains("verify you are human") && !source.contains("cloudflare") {
            debug!("no anti-bot challenge detected");
            return Ok(true);
        }

        info!("anti-bot challenge detected, attempting consent click");
        self.session.capture_snapshot("challenge_detected").await;
        tokio::time::sleep(WIDGET_SETTLE).await;

        // The consent control moves around between rollouts; the click is
        // best-effort and the real pass signal is the login form appearing.
        if let Some(checkbox) = challenge_checkbox_chain()
            .resolve_optional(self.session, PRESENCE_PROBE)
            .await?
        {
            match self.session.click(&checkbox).await {
                Ok(()) => {
                    info!("clicked challenge consent control");
                    self.session.capture_snapshot("challenge_consent_clicked").await;
                }
                Err(e) => warn!(error = %e, "consent click failed"),
            }
        }

        let total = timeout.as_secs();
        for elapsed in 1..=total {
            tokio::time::sleep(Duration::from_secs(1)).await;

            let source = self.session.page_source().await?;
            if source.contains("signInName") || source.contains("password") {
                info!("anti-bot challenge passed");
                self.session.capture_snapshot("challenge_passed").await;
                return Ok(true);
            }

            if elapsed % 5 == 0 {
                info!(remaining = total - elapsed, "still waiting for challenge to clear");
            }
        }

        self.session.capture_snapshot("challenge_timeout").await;
        Ok(false)
    }

    async fn fill_credentials(&self) -> Result<()> {
        let username_field = username_chain()
            .resolve(self.session, self.element_timeout())
            .await?;
        info!(username = %self.config.credentials.username, "entering username");
        self.session
            .type_text(&username_field, &self.config.credentials.username)
            .await?;
        tokio::time::sleep(FIELD_SETTLE).await;

        let password_field = password_chain()
            .resolve(self.session, self.element_timeout())
            .await?;
        info!("entering password");
        self.session
            .type_text(&password_field, &self.config.credentials.password)
            .await?;
        tokio::time::sleep(FIELD_SETTLE).await;

        Ok(())
    }

    /// Gives an externally-solved captcha its window. Resolution has no
    /// definitive signal, so a filled response field or the page moving on
    /// both count; expiry is a warning, never a failure.
    async fn await_captcha(&self) -> Result<()> {
        let Some(field) = captcha_field_chain()
            .resolve_optional(self.session, PRESENCE_PROBE)
            .await?
        else {
            debug!("no captcha field present");
            return Ok(());
        };

        info!(
            window_secs = CAPTCHA_WAIT.as_secs(),
            "captcha detected, waiting for external resolution"
        );
        self.session.capture_snapshot("captcha_pending").await;

        let polls = CAPTCHA_WAIT.as_secs() / CAPTCHA_POLL.as_secs();
        for _ in 0..polls {
            tokio::time::sleep(CAPTCHA_POLL).await;

            let value = self
                .session
                .read_attribute(&field, "value")
                .await?
                .unwrap_or_default();
            if !value.is_empty() {
                info!("captcha response entered");
                return Ok(());
            }

            if self.session.page_source().await?.contains("Security Question") {
                info!("page moved past the captcha");
                return Ok(());
            }
        }

        warn!(
            "{}; continuing, the flow does not strictly require it",
            WatcherError::CaptchaUnresolved
        );
        Ok(())
    }

    /// One pass over the presented security questions.
    async fn answer_security_questions(&self) -> Result<StageOutcome> {
        match question_page_chain()
            .resolve_optional(self.session, QUESTION_PAGE_WAIT)
            .await?
        {
            Some(_) => debug!("security questions page loaded"),
            None => {
                if let Some(banner) = error_banner_chain()
                    .resolve_optional(self.session, PRESENCE_PROBE)
                    .await?
                {
                    let text = self.session.read_text(&banner).await.unwrap_or_default();
                    self.session.capture_snapshot("sign_in_rejected").await;
                    return Ok(StageOutcome::Failure(format!("Sign-in rejected: {}", text)));
                }
                info!("no security question marker found, checking page content anyway");
            }
        }

        let html = self.session.page_source().await?;
        let questions = extract_question_fragments(&html);
        info!(count = questions.len(), "extracted candidate questions");

        let inputs = self
            .session
            .list_elements(&Locator::xpath(ANSWER_INPUTS_XPATH))
            .await?;
        let plan = plan_answers(&questions, &inputs, self.bank);

        for (input_index, answer) in &plan.fills {
            let field = Locator::xpath(format!("({})[{}]", ANSWER_INPUTS_XPATH, input_index + 1));
            self.session.type_text(&field, answer).await?;
            tokio::time::sleep(FIELD_SETTLE).await;
        }

        if plan.answered >= MIN_ANSWERED_QUESTIONS {
            info!(answered = plan.answered, "submitting security answers");
            self.session.capture_snapshot("security_answers_filled").await;

            let button = continue_chain()
                .resolve(self.session, self.element_timeout())
                .await?;
            self.session.click(&button).await?;
            tokio::time::sleep(PAGE_SETTLE).await;
            return Ok(StageOutcome::Success);
        }

        if plan.unanswerable > 0 {
            warn!(
                answered = plan.answered,
                unanswerable = plan.unanswerable,
                "question set not answerable, requesting sign-in restart"
            );
            return Ok(StageOutcome::RetryRequested);
        }

        self.session.capture_snapshot("security_answers_incomplete").await;
        Ok(StageOutcome::Failure(
            WatcherError::UnanswerableSecurityQuestions {
                answered: plan.answered,
                required: MIN_ANSWERED_QUESTIONS,
            }
            .to_string(),
        ))
    }

    /// Best-effort confirmation only; none of the indicators are guaranteed
    /// to exist on every dashboard variant.
    async fn verify_logged_in(&self) -> Result<()> {
        match logged_in_chain()
            .resolve_optional(self.session, VERIFY_WAIT)
            .await?
        {
            Some(indicator) => {
                if let Ok(text) = self.session.read_text(&indicator).await {
                    info!(indicator = %text.trim(), "confirmed logged-in state");
                }
            }
            None => warn!("could not confirm logged-in state, continuing"),
        }
        Ok(())
    }
}

/// Planned answer placement for one question page.
#[derive(Debug, Default)]
pub(crate) struct AnswerPlan {
    /// (input index in document order, answer text)
    pub fills: Vec<(usize, String)>,
    pub answered: usize,
    pub unanswerable: usize,
}

/// Assigns answers to the enabled input fields in encounter order. Questions
/// without a bank match count as unanswerable and consume no input slot.
pub(crate) fn plan_answers(
    questions: &[String],
    inputs: &[ElementSnapshot],
    bank: &SecurityQuestionBank,
) -> AnswerPlan {
    let enabled_inputs: Vec<usize> = inputs
        .iter()
        .enumerate()
        .filter(|(_, snapshot)| snapshot.enabled)
        .map(|(i, _)| i)
        .collect();

    let mut plan = AnswerPlan::default();
    for question in questions {
        match bank.match_question(question) {
            Some(answer) => {
                if plan.answered < enabled_inputs.len() {
                    plan.fills
                        .push((enabled_inputs[plan.answered], answer.to_string()));
                    plan.answered += 1;
                } else {
                    warn!(question = %question, "no input slot left for answerable question");
                }
            }
            None => {
                warn!(question = %question, "no answer configured for question");
                plan.unanswerable += 1;
            }
        }
    }
    plan
}

/// Pulls question-like text fragments out of the page. Elements carrying a
/// question class/id are preferred; plain labels are the fallback when the
/// markup drops those markers.
pub fn extract_question_fragments(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let primary = Selector::parse("[class*='question'], [id*='question']").unwrap();
    let fallback = Selector::parse("label").unwrap();

    let mut texts: Vec<String> = document.select(&primary).map(joined_text).collect();
    if texts.is_empty() {
        texts = document.select(&fallback).map(joined_text).collect();
    }

    let mut seen = HashSet::new();
    texts
        .into_iter()
        .filter(|t| is_question_like(t))
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

fn joined_text(element: scraper::ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_question_like(text: &str) -> bool {
    if !text.contains('?') || !(10..=200).contains(&text.len()) {
        return false;
    }
    let lower = text.to_lowercase();
    !BOILERPLATE_PHRASES.iter().any(|p| lower.contains(p))
}
