//! Chrome/Chromium process management
//!
//! Each launch gets a throwaway profile directory, so every run starts with
//! no cookies or cached login. Downloads are staged inside that profile and
//! disappear with it; callers persist what they need before closing.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};

use super::cdp::{str_field, CdpConnection};
use super::{BrowserLauncher, CdpPage, LiveSession, Page};
use crate::error::{BrowserError, BrowserResult};

const CANDIDATES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
];

const DEVTOOLS_BANNER: &str = "DevTools listening on ";

#[derive(Debug, Clone)]
pub struct ChromeConfig {
    /// Explicit binary; otherwise the first known name found on PATH
    pub executable: Option<PathBuf>,
    pub headless: bool,
    pub window: (u32, u32),
    pub launch_timeout: Duration,
    pub command_timeout: Duration,
}

impl Default for ChromeConfig {
    fn default() -> Self {
        Self {
            executable: None,
            headless: false,
            window: (1280, 800),
            launch_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(30),
        }
    }
}

impl ChromeConfig {
    fn resolve_executable(&self) -> BrowserResult<PathBuf> {
        if let Some(path) = &self.executable {
            return Ok(path.clone());
        }
        CANDIDATES
            .iter()
            .find_map(|name| which::which(name).ok())
            .ok_or(BrowserError::ExecutableNotFound)
    }

    fn args(&self, profile: &Path) -> Vec<String> {
        let (width, height) = self.window;
        let mut args = vec![
            "--remote-debugging-port=0".to_string(),
            format!("--user-data-dir={}", profile.display()),
            "--no-first-run".to_string(),
            "--no-default-browser-check".to_string(),
            "--no-sandbox".to_string(),
            "--disable-setuid-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
            format!("--window-size={width},{height}"),
        ];
        if self.headless {
            args.push("--headless=new".to_string());
        }
        args.push("about:blank".to_string());
        args
    }
}

/// Launches a local Chrome per session.
#[derive(Debug, Clone, Default)]
pub struct ChromeLauncher {
    config: ChromeConfig,
}

impl ChromeLauncher {
    pub fn new(config: ChromeConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self) -> BrowserResult<Box<dyn LiveSession>> {
        let chrome = Chrome::start(&self.config).await?;
        match chrome.open_page(self.config.window).await {
            Ok(page) => Ok(Box::new(ChromeSession { chrome, page })),
            Err(e) => {
                chrome.shutdown().await;
                Err(e)
            }
        }
    }
}

struct Chrome {
    child: Child,
    connection: Arc<CdpConnection>,
    profile: TempDir,
}

impl Chrome {
    async fn start(config: &ChromeConfig) -> BrowserResult<Self> {
        let executable = config.resolve_executable()?;
        let profile = tempfile::Builder::new()
            .prefix("stock-sync-profile-")
            .tempdir()?;

        let mut child = Command::new(&executable)
            .args(config.args(profile.path()))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BrowserError::Launch(format!("{}: {e}", executable.display())))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| BrowserError::Launch("browser stderr not captured".into()))?;

        let ws_url = match tokio::time::timeout(config.launch_timeout, devtools_endpoint(stderr)).await {
            Ok(found) => found?,
            Err(_) => {
                return Err(BrowserError::timeout(
                    "DevTools endpoint",
                    config.launch_timeout,
                ))
            }
        };

        let connection = CdpConnection::connect(&ws_url, config.command_timeout).await?;
        tracing::info!(
            executable = %executable.display(),
            headless = config.headless,
            "browser started"
        );

        Ok(Self {
            child,
            connection,
            profile,
        })
    }

    async fn open_page(&self, window: (u32, u32)) -> BrowserResult<CdpPage> {
        let created = self
            .connection
            .call(
                "Target.createBrowserContext",
                json!({ "disposeOnDetach": true }),
                None,
            )
            .await?;
        let context_id = str_field(&created, "browserContextId")?;

        let staging = self.profile.path().join("downloads");
        tokio::fs::create_dir_all(&staging).await?;

        CdpPage::open(self.connection.clone(), context_id, staging, window).await
    }

    async fn shutdown(mut self) {
        if let Err(e) = self.connection.call("Browser.close", json!({}), None).await {
            // The socket usually drops before the reply arrives
            tracing::debug!(error = %e, "Browser.close");
        }
        match tokio::time::timeout(Duration::from_secs(5), self.child.wait()).await {
            Ok(_) => {}
            Err(_) => {
                tracing::warn!("browser did not exit, killing it");
                if let Err(e) = self.child.kill().await {
                    tracing::warn!(error = %e, "failed to kill browser");
                }
            }
        }
        tracing::info!("browser closed");
    }
}

/// Read stderr until the DevTools banner, then keep draining it in the
/// background so the browser never blocks on a full pipe.
async fn devtools_endpoint(stderr: ChildStderr) -> BrowserResult<String> {
    let mut lines = BufReader::new(stderr).lines();
    while let Some(line) = lines.next_line().await? {
        if let Some(url) = parse_devtools_banner(&line) {
            tokio::spawn(async move {
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::trace!(target: "chrome", "{line}");
                }
            });
            return Ok(url);
        }
        tracing::trace!(target: "chrome", "{line}");
    }
    Err(BrowserError::Launch(
        "browser exited before DevTools was ready".into(),
    ))
}

fn parse_devtools_banner(line: &str) -> Option<String> {
    line.trim()
        .strip_prefix(DEVTOOLS_BANNER)
        .map(|url| url.trim().to_string())
        .filter(|url| url.starts_with("ws://"))
}

struct ChromeSession {
    chrome: Chrome,
    page: CdpPage,
}

#[async_trait]
impl LiveSession for ChromeSession {
    fn page(&self) -> &dyn Page {
        &self.page
    }

    async fn close(self: Box<Self>) -> BrowserResult<()> {
        let ChromeSession { chrome, page } = *self;
        let disposed = page.dispose().await;
        chrome.shutdown().await;
        disposed
    }
}
