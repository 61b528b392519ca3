//! OnePilot login
//!
//! Every run logs in from scratch in a fresh browser context; nothing about
//! a previous session is reused.
//!
//! ```text
//! Start → NavigatingToLogin → FormVisible → Submitting → AuthenticatedLandingReached
//! ```

use std::time::Duration;

use regex::Regex;

use crate::browser::{wait, Locator, Page};
use crate::error::{BrowserError, LoginError};
use crate::types::Credentials;

pub const DEFAULT_BASE_URL: &str = "https://web.onepilot.app";

/// Where the login form lives, how to recognise the authenticated area, and
/// how long each step may take.
#[derive(Debug, Clone)]
pub struct LoginSettings {
    pub base_url: String,
    pub login_path: String,
    pub landing_path: String,
    /// Matched against the page URL after submitting
    pub landing_pattern: Regex,
    pub identity_field: Locator,
    pub secret_field: Locator,
    pub submit: Locator,
    pub navigation_timeout: Duration,
    pub field_timeout: Duration,
    pub submit_timeout: Duration,
    pub landing_timeout: Duration,
}

impl LoginSettings {
    pub fn for_base_url(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            login_path: "/auth/login".to_string(),
            landing_path: "/vehicles".to_string(),
            landing_pattern: landing_pattern(),
            identity_field: Locator::css("#email"),
            secret_field: Locator::css("#password"),
            submit: Locator::css(r#"button[type="submit"]"#),
            navigation_timeout: Duration::from_secs(30),
            field_timeout: Duration::from_secs(15),
            submit_timeout: Duration::from_secs(10),
            landing_timeout: Duration::from_secs(30),
        }
    }

    pub fn login_url(&self) -> String {
        format!("{}{}", self.base_url, self.login_path)
    }

    pub fn landing_url(&self) -> String {
        format!("{}{}", self.base_url, self.landing_path)
    }
}

impl Default for LoginSettings {
    fn default() -> Self {
        Self::for_base_url(DEFAULT_BASE_URL)
    }
}

fn landing_pattern() -> Regex {
    Regex::new(r"(?i)/vehicles").expect("landing pattern is valid")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    Start,
    NavigatingToLogin,
    FormVisible,
    Submitting,
    AuthenticatedLandingReached,
}

/// Performs the login procedure on a live page.
#[derive(Debug, Clone, Default)]
pub struct BrowserSession {
    settings: LoginSettings,
}

impl BrowserSession {
    pub fn new(settings: LoginSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &LoginSettings {
        &self.settings
    }

    /// Log in and leave the page in the authenticated area.
    ///
    /// Fails with [`LoginError::MissingCredentials`] before touching the
    /// page when either credential is blank.
    pub async fn login(&self, page: &dyn Page, credentials: &Credentials) -> Result<(), LoginError> {
        credentials.ensure_present()?;

        let mut state = LoginState::Start;
        let result = self.drive(page, credentials, &mut state).await;
        match &result {
            Ok(()) => tracing::info!(identity = %credentials.identity, "logged in"),
            Err(e) => tracing::warn!(?state, error = %e, "login aborted"),
        }
        result
    }

    async fn drive(
        &self,
        page: &dyn Page,
        credentials: &Credentials,
        state: &mut LoginState,
    ) -> Result<(), LoginError> {
        let s = &self.settings;

        advance(state, LoginState::NavigatingToLogin);
        let login_url = s.login_url();
        page.goto(&login_url, s.navigation_timeout)
            .await
            .map_err(form_not_found)?;

        // An earlier attempt may have logged in after its own wait expired;
        // the app then sends /auth/login straight on to the landing page
        let url = page.url().await?;
        if s.landing_pattern.is_match(&url) {
            tracing::info!(%url, "session already authenticated");
            advance(state, LoginState::AuthenticatedLandingReached);
            return Ok(());
        }

        wait::wait_visible(page, &s.identity_field, s.field_timeout)
            .await
            .map_err(form_not_found)?;
        wait::wait_visible(page, &s.secret_field, s.field_timeout)
            .await
            .map_err(form_not_found)?;
        advance(state, LoginState::FormVisible);

        page.fill(&s.identity_field, &credentials.identity).await?;
        page.fill(&s.secret_field, &credentials.secret).await?;

        // The button exists before client-side validation enables it
        wait::wait_visible(page, &s.submit, s.submit_timeout)
            .await
            .map_err(submit_failed)?;
        wait::wait_enabled(page, &s.submit, s.submit_timeout)
            .await
            .map_err(submit_failed)?;

        advance(state, LoginState::Submitting);
        tokio::try_join!(
            wait::wait_for_url(page, &s.landing_pattern, s.landing_timeout),
            page.click(&s.submit),
        )
        .map_err(submit_failed)?;

        let mut url = page.url().await?;
        if !s.landing_pattern.is_match(&url) {
            tracing::debug!(%url, "not on the landing page yet, navigating there");
            if let Err(e) = page.goto(&s.landing_url(), s.navigation_timeout).await {
                tracing::warn!(error = %e, "corrective navigation failed");
            }
            url = page.url().await?;
            if !s.landing_pattern.is_match(&url) {
                return Err(LoginError::PostLoginVerificationFailed { url });
            }
        }

        advance(state, LoginState::AuthenticatedLandingReached);
        Ok(())
    }
}

fn advance(state: &mut LoginState, next: LoginState) {
    tracing::debug!(from = ?*state, to = ?next, "login state");
    *state = next;
}

fn form_not_found(e: BrowserError) -> LoginError {
    match e {
        BrowserError::Timeout { .. }
        | BrowserError::Navigation { .. }
        | BrowserError::NoElement(_) => LoginError::FormNotFound {
            detail: e.to_string(),
        },
        other => LoginError::Browser(other),
    }
}

fn submit_failed(e: BrowserError) -> LoginError {
    match e {
        BrowserError::Timeout { .. } | BrowserError::NoElement(_) => LoginError::SubmitFailed {
            detail: e.to_string(),
        },
        other => LoginError::Browser(other),
    }
}
