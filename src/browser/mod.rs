//! Browser automation seam
//!
//! The login and export steps talk to a [`Page`]: a small set of awaited UI
//! operations addressed by structured [`Locator`]s. The production driver
//! speaks the Chrome DevTools Protocol ([`chrome::ChromeLauncher`]); tests
//! plug in scripted pages.

pub mod cdp;
pub mod chrome;
mod locator;
mod page;
pub mod wait;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::BrowserResult;

pub use chrome::{ChromeConfig, ChromeLauncher};
pub use locator::{Locator, LocatorChain, TextMatch};
pub use page::CdpPage;

/// One tab inside a live browser context.
///
/// Operations on a locator act on its first match, like a user would.
/// Nothing here waits for elements to appear; see [`wait`] for bounded
/// polling on top of these primitives.
#[async_trait]
pub trait Page: Send + Sync {
    /// Navigate and wait (bounded) until the DOM content is loaded.
    async fn goto(&self, url: &str, timeout: Duration) -> BrowserResult<()>;

    async fn url(&self) -> BrowserResult<String>;

    async fn count(&self, locator: &Locator) -> BrowserResult<usize>;

    async fn is_visible(&self, locator: &Locator) -> BrowserResult<bool>;

    async fn is_enabled(&self, locator: &Locator) -> BrowserResult<bool>;

    async fn attribute(&self, locator: &Locator, name: &str) -> BrowserResult<Option<String>>;

    /// Replace the value of an input with `value`, as typed text.
    async fn fill(&self, locator: &Locator, value: &str) -> BrowserResult<()>;

    async fn click(&self, locator: &Locator) -> BrowserResult<()>;

    /// Next completed download of this context, waiting at most `timeout`.
    /// Downloads that finished before the call are not lost.
    async fn next_download(&self, timeout: Duration) -> BrowserResult<DownloadArtifact>;
}

/// Exclusive ownership of one browser context and its page.
#[async_trait]
pub trait LiveSession: Send + Sync {
    fn page(&self) -> &dyn Page;

    /// Tear the context (and the browser behind it) down.
    async fn close(self: Box<Self>) -> BrowserResult<()>;
}

/// Opens a fresh, cookie-less browser session.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> BrowserResult<Box<dyn LiveSession>>;
}

/// A file the browser finished downloading into its staging directory.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadArtifact {
    /// Where the browser wrote the bytes
    pub path: PathBuf,
    pub url: String,
    pub suggested_filename: String,
}

impl DownloadArtifact {
    /// Lower-cased extension of the suggested file name, if any.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.suggested_filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty())
            .map(str::to_ascii_lowercase)
    }

    /// Move the download to `dest`. Falls back to copy + remove when the
    /// staging directory is on another filesystem.
    pub async fn save_as(&self, dest: &Path) -> std::io::Result<()> {
        if tokio::fs::rename(&self.path, dest).await.is_ok() {
            return Ok(());
        }
        tokio::fs::copy(&self.path, dest).await?;
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            tracing::debug!(path = %self.path.display(), error = %e, "staged download not removed");
        }
        Ok(())
    }
}
