//! Bounded polling on top of [`Page`] primitives.
//!
//! Script failures while polling mean the page is mid-navigation and are
//! treated as "not yet". Every helper gives up with
//! [`BrowserError::Timeout`] once its budget is spent.

use std::future::Future;
use std::time::Duration;

use regex::Regex;

use super::{Locator, Page};
use crate::error::{BrowserError, BrowserResult};

pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Poll `probe` until it reports `true`.
pub async fn poll_until<F, Fut>(what: &str, timeout: Duration, mut probe: F) -> BrowserResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = BrowserResult<bool>>,
{
    let poll = async {
        loop {
            match probe().await {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(BrowserError::Script(detail)) => {
                    tracing::trace!(what, %detail, "probe failed, page still changing");
                }
                Err(e) => return Err(e),
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    };
    match tokio::time::timeout(timeout, poll).await {
        Ok(result) => result,
        Err(_) => Err(BrowserError::timeout(what, timeout)),
    }
}

pub async fn wait_visible(page: &dyn Page, locator: &Locator, timeout: Duration) -> BrowserResult<()> {
    poll_until(&locator.to_string(), timeout, || page.is_visible(locator)).await
}

pub async fn wait_enabled(page: &dyn Page, locator: &Locator, timeout: Duration) -> BrowserResult<()> {
    let what = format!("{locator} to be enabled");
    poll_until(&what, timeout, || page.is_enabled(locator)).await
}

/// Wait until the page URL matches `pattern`.
pub async fn wait_for_url(page: &dyn Page, pattern: &Regex, timeout: Duration) -> BrowserResult<()> {
    let what = format!("URL matching {pattern}");
    poll_until(&what, timeout, || async {
        Ok::<_, BrowserError>(pattern.is_match(&page.url().await?))
    })
    .await
}

/// Wait for the element to become visible, then click it, all within
/// `timeout`.
pub async fn click_when_visible(
    page: &dyn Page,
    locator: &Locator,
    timeout: Duration,
) -> BrowserResult<()> {
    let attempt = async {
        wait_visible(page, locator, timeout).await?;
        page.click(locator).await
    };
    match tokio::time::timeout(timeout, attempt).await {
        Ok(result) => result,
        Err(_) => Err(BrowserError::timeout(format!("click on {locator}"), timeout)),
    }
}
