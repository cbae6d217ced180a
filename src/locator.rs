use std::time::Duration;

use tracing::debug;

use crate::session::{Locator, Session};
use crate::utils::error::{Result, WatcherError};

/// An ordered list of query candidates for one logical page control.
///
/// The target site redesigns frequently, so no single selector can be
/// trusted; each chain starts with the most specific known selector and
/// falls back to progressively looser ones. Candidates are evaluated in
/// order, each at most once, and the first interactable match wins.
#[derive(Debug, Clone)]
pub struct LocatorChain {
    target: String,
    candidates: Vec<Locator>,
}

impl LocatorChain {
    pub fn new(target: impl Into<String>, candidates: Vec<Locator>) -> Self {
        Self {
            target: target.into(),
            candidates,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn candidates(&self) -> &[Locator] {
        &self.candidates
    }

    /// Returns the first candidate that currently matches, or
    /// `LocatorNotFound` once the whole chain is exhausted.
    pub async fn resolve(&self, session: &dyn Session, timeout: Duration) -> Result<Locator> {
        for candidate in &self.candidates {
            debug!(target = %self.target, candidate = %candidate, "trying locator candidate");
            if session.find(candidate, timeout).await? {
                debug!(target = %self.target, candidate = %candidate, "locator candidate matched");
                return Ok(candidate.clone());
            }
        }

        Err(WatcherError::LocatorNotFound {
            target: self.target.clone(),
        })
    }

    /// Like `resolve`, but a miss is an `Ok(None)` instead of an error, for
    /// controls that are legitimately absent (captcha input, logged-in
    /// indicators).
    pub async fn resolve_optional(
        &self,
        session: &dyn Session,
        timeout: Duration,
    ) -> Result<Option<Locator>> {
        match self.resolve(session, timeout).await {
            Ok(locator) => Ok(Some(locator)),
            Err(WatcherError::LocatorNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
