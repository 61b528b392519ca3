//! Bounded retry with exponential backoff
//!
//! Every network or UI step that can fail transiently (timeouts, dropped
//! connections, HTTP 429/5xx) goes through [`with_retry`]. Configuration
//! problems, missing credentials and rejected logins are never retried.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::{BrowserError, ExportError, LoginError, SinkError};

/// Retry policy for one step.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 disables retrying)
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Stretch each delay by a random 0-100%
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// A policy that runs the operation exactly once.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

/// Classifies errors as transient (worth another attempt) or permanent.
pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for BrowserError {
    fn is_retryable(&self) -> bool {
        match self {
            BrowserError::Timeout { .. }
            | BrowserError::Navigation { .. }
            | BrowserError::DownloadCanceled => true,
            BrowserError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::Interrupted
            ),
            // A dead browser or a broken protocol exchange won't heal by itself
            BrowserError::ExecutableNotFound
            | BrowserError::Launch(_)
            | BrowserError::Connection(_)
            | BrowserError::Protocol { .. }
            | BrowserError::Script(_)
            | BrowserError::NoElement(_)
            | BrowserError::Closed => false,
        }
    }
}

impl IsRetryable for LoginError {
    fn is_retryable(&self) -> bool {
        match self {
            LoginError::FormNotFound { .. } | LoginError::SubmitFailed { .. } => true,
            LoginError::Browser(e) => e.is_retryable(),
            LoginError::MissingCredentials | LoginError::PostLoginVerificationFailed { .. } => {
                false
            }
        }
    }
}

impl IsRetryable for ExportError {
    fn is_retryable(&self) -> bool {
        match self {
            ExportError::AnchorNotFound { .. }
            | ExportError::MenuNotFound { .. }
            | ExportError::ExportItemNotFound { .. }
            | ExportError::ExportTimeout { .. } => true,
            ExportError::Browser(e) => e.is_retryable(),
        }
    }
}

impl IsRetryable for SinkError {
    fn is_retryable(&self) -> bool {
        match self {
            SinkError::Transport { source, .. } => source.is_timeout() || source.is_connect(),
            SinkError::RemoteRejected {
                status: Some(status),
                ..
            } => *status == 429 || *status >= 500,
            SinkError::RemoteRejected { status: None, .. }
            | SinkError::MissingTarget
            | SinkError::SheetNotFound(_)
            | SinkError::Auth(_) => false,
        }
    }
}

/// Run `operation` until it succeeds, fails permanently, or the retry budget
/// is spent. The last error is returned unchanged.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, step: &str, mut operation: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!(step, attempts = attempt + 1, "step succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                attempt += 1;
                let wait = if config.jitter { add_jitter(delay) } else { delay };

                tracing::warn!(
                    step,
                    error = %e,
                    attempt,
                    max_retries = config.max_retries,
                    delay_ms = wait.as_millis() as u64,
                    "step failed, retrying"
                );

                tokio::time::sleep(wait).await;

                let next = Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier);
                delay = next.min(config.max_delay);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(step, error = %e, attempts = attempt + 1, "retries exhausted");
                } else {
                    tracing::error!(step, error = %e, "step failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

/// Delay somewhere between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + factor))
}
