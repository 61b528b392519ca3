//! Vehicle stock export
//!
//! The export lives behind the split button next to "Adicionar veículo":
//! open the split menu, pick "Exportar", optionally pick the Excel format,
//! and wait for the browser to report a finished download. Each step
//! tolerates a couple of DOM variants and has its own time budget.

use std::time::Duration;

use crate::browser::{wait, DownloadArtifact, Locator, LocatorChain, Page, TextMatch};
use crate::error::{BrowserError, ExportError};
use crate::session::DEFAULT_BASE_URL;

#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub landing_url: String,
    pub anchor_label: TextMatch,
    pub toggle_selector: String,
    /// Fallback when the menu is not linked to the anchor by id
    pub open_menu: Locator,
    pub export_label: TextMatch,
    pub format_label: TextMatch,
    pub anchor_timeout: Duration,
    pub step_timeout: Duration,
    pub menu_settle: Duration,
    pub menu_timeout: Duration,
    /// How long to look for a format sub-menu before only waiting
    pub format_probe: Duration,
    pub download_timeout: Duration,
    pub navigation_timeout: Duration,
}

impl ExportSettings {
    pub fn for_base_url(base_url: &str) -> Self {
        Self {
            landing_url: format!("{}/vehicles", base_url.trim_end_matches('/')),
            anchor_label: TextMatch::ci("Adicionar veículo"),
            toggle_selector: "button.dropdown-toggle-split".to_string(),
            open_menu: Locator::css("ul.dropdown-menu.show"),
            export_label: TextMatch::ci("Exportar"),
            format_label: TextMatch::ci("xlsx|excel"),
            anchor_timeout: Duration::from_secs(10),
            step_timeout: Duration::from_secs(5),
            menu_settle: Duration::from_millis(200),
            menu_timeout: Duration::from_secs(2),
            format_probe: Duration::from_secs(2),
            download_timeout: Duration::from_secs(60),
            navigation_timeout: Duration::from_secs(30),
        }
    }

    pub fn anchor(&self) -> Locator {
        Locator::role("button", self.anchor_label.clone())
    }

    pub fn toggle(&self) -> Locator {
        Locator::following_sibling(&self.anchor(), self.toggle_selector.clone())
    }

    /// Menu explicitly labelled by the anchor element.
    pub fn linked_menu(&self, anchor_id: &str) -> Locator {
        let escaped = anchor_id.replace('\\', "\\\\").replace('"', "\\\"");
        Locator::css(format!(r#"ul.dropdown-menu[aria-labelledby="{escaped}"]"#))
    }

    pub fn export_item(&self, menu: &Locator) -> Locator {
        Locator::role("menuitem", self.export_label.clone())
            .within(menu)
            .or(Locator::has_text("a.dropdown-item", self.export_label.clone()).within(menu))
    }

    /// Independent heuristics for the Excel format control, best first.
    pub fn format_controls(&self) -> LocatorChain {
        LocatorChain::new()
            .with(
                "data attribute",
                Locator::css(
                    r#"[data-testid*="xlsx" i], [data-testid*="excel" i], [data-test*="xlsx" i], [data-test*="excel" i]"#,
                ),
            )
            .with("link target", Locator::css(r#"a[href*="xlsx" i]"#))
            .with("menu item", Locator::role("menuitem", self.format_label.clone()))
            .with("button", Locator::role("button", self.format_label.clone()))
            .with("visible text", Locator::text(self.format_label.clone()))
    }
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self::for_base_url(DEFAULT_BASE_URL)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExportWorkflow {
    settings: ExportSettings,
}

impl ExportWorkflow {
    pub fn new(settings: ExportSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    /// Trigger the stock export on an authenticated page and return the
    /// downloaded file.
    pub async fn trigger_export(&self, page: &dyn Page) -> Result<DownloadArtifact, ExportError> {
        let s = &self.settings;

        let anchor = s.anchor();
        wait::wait_visible(page, &anchor, s.anchor_timeout)
            .await
            .map_err(|e| missing(e, |detail| ExportError::AnchorNotFound { detail }))?;
        tracing::debug!(%anchor, "anchor visible");

        wait::click_when_visible(page, &s.toggle(), s.step_timeout)
            .await
            .map_err(|e| missing(e, |detail| ExportError::MenuNotFound { detail }))?;
        tokio::time::sleep(s.menu_settle).await;

        let menu = self.resolve_menu(page, &anchor).await?;

        let item = s.export_item(&menu);
        wait::click_when_visible(page, &item, s.step_timeout)
            .await
            .map_err(|e| missing(e, |detail| ExportError::ExportItemNotFound { detail }))?;
        tracing::debug!("export action clicked");

        self.await_download(page).await
    }

    /// Return to the vehicle list, e.g. before retrying an export.
    pub async fn reset(&self, page: &dyn Page) -> Result<(), ExportError> {
        page.goto(&self.settings.landing_url, self.settings.navigation_timeout)
            .await
            .map_err(ExportError::from)
    }

    async fn resolve_menu(&self, page: &dyn Page, anchor: &Locator) -> Result<Locator, ExportError> {
        let s = &self.settings;

        let mut menus = LocatorChain::new();
        if let Some(id) = page
            .attribute(anchor, "id")
            .await?
            .filter(|id| !id.trim().is_empty())
        {
            menus = menus.with("aria-labelledby", s.linked_menu(&id));
        }
        menus = menus.with("open menu", s.open_menu.clone());

        let (strategy, menu) = menus
            .resolve_within(page, s.menu_timeout)
            .await
            .map_err(|e| missing(e, |detail| ExportError::MenuNotFound { detail }))?;
        tracing::info!(strategy, "options menu resolved");
        Ok(menu.clone())
    }

    /// Wait for the download while, at the same time, clicking a format
    /// choice if one shows up. Some flows download straight away.
    async fn await_download(&self, page: &dyn Page) -> Result<DownloadArtifact, ExportError> {
        let s = &self.settings;
        let formats = s.format_controls();

        let download = page.next_download(s.download_timeout);
        let pick_format = async {
            match formats.resolve_within(page, s.format_probe).await {
                Ok((strategy, control)) => {
                    tracing::debug!(strategy, "format control found");
                    if let Err(e) = wait::click_when_visible(page, control, s.step_timeout).await {
                        tracing::warn!(error = %e, "format click failed, still waiting for the download");
                    }
                }
                Err(e) => tracing::debug!(reason = %e, "no format choice offered"),
            }
        };
        tokio::pin!(download);
        tokio::pin!(pick_format);

        let mut format_done = false;
        let outcome = loop {
            tokio::select! {
                result = &mut download => break result,
                () = &mut pick_format, if !format_done => format_done = true,
            }
        };

        match outcome {
            Ok(artifact) => {
                tracing::info!(file = %artifact.suggested_filename, "export downloaded");
                Ok(artifact)
            }
            Err(e @ BrowserError::Timeout { .. }) => Err(ExportError::ExportTimeout {
                detail: e.to_string(),
            }),
            Err(BrowserError::DownloadCanceled) => Err(ExportError::ExportTimeout {
                detail: "the browser canceled the download".to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

fn missing(e: BrowserError, kind: impl FnOnce(String) -> ExportError) -> ExportError {
    match e {
        BrowserError::Timeout { .. } | BrowserError::NoElement(_) => kind(e.to_string()),
        other => ExportError::Browser(other),
    }
}
