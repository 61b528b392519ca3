//! Shared test doubles: a scripted page, a launcher around it, and an
//! in-memory spreadsheet.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use stock_sync::browser::{BrowserLauncher, DownloadArtifact, LiveSession, Locator, Page};
use stock_sync::error::{BrowserError, BrowserResult, SinkError, SinkResult};
use stock_sync::session::LoginSettings;
use stock_sync::sheets::SpreadsheetApi;
use stock_sync::workflow::ExportSettings;
use stock_sync::TabularGrid;
use tokio::time::Instant;

pub const BASE_URL: &str = "https://app.test";

// ═══════════════════════════════════════════════════════════════════════════
// FAKE PAGE
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub enum Effect {
    Navigate(String),
    /// Land on `url`, then move to `then` after `reads` URL reads
    NavigateBriefly {
        url: String,
        reads: usize,
        then: String,
    },
    Reveal(Locator),
    Download(DownloadArtifact),
}

/// One scripted element. Times are measured from when it appears.
#[derive(Debug, Clone)]
pub struct FakeElement {
    visible_after: Option<Duration>,
    enabled_after: Duration,
    hidden_until_revealed: bool,
    attributes: HashMap<String, String>,
    on_click: Vec<Effect>,
}

impl FakeElement {
    pub fn visible() -> Self {
        Self::visible_after(Duration::ZERO)
    }

    pub fn visible_after(delay: Duration) -> Self {
        Self {
            visible_after: Some(delay),
            enabled_after: Duration::ZERO,
            hidden_until_revealed: false,
            attributes: HashMap::new(),
            on_click: Vec::new(),
        }
    }

    /// In the DOM but never rendered.
    pub fn never_visible() -> Self {
        Self {
            visible_after: None,
            ..Self::visible()
        }
    }

    pub fn disabled_for(mut self, delay: Duration) -> Self {
        self.enabled_after = delay;
        self
    }

    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn on_click(mut self, effect: Effect) -> Self {
        self.on_click.push(effect);
        self
    }

    /// Absent until another element's click reveals it.
    pub fn revealed_by_click(mut self) -> Self {
        self.hidden_until_revealed = true;
        self
    }
}

struct ElementState {
    spec: FakeElement,
    shown_at: Option<Instant>,
}

#[derive(Default)]
struct PageState {
    url: String,
    elements: HashMap<Locator, ElementState>,
    downloads: VecDeque<BrowserResult<DownloadArtifact>>,
    gotos: Vec<String>,
    clicks: Vec<Locator>,
    fills: Vec<(Locator, String)>,
    download_waits: usize,
    goto_error: Option<String>,
    redirects: HashMap<String, String>,
    bounce: Option<(usize, String)>,
}

#[derive(Default)]
pub struct FakePage {
    state: Mutex<PageState>,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn element(&self, locator: Locator, spec: FakeElement) -> &Self {
        let shown_at = (!spec.hidden_until_revealed).then(Instant::now);
        self.state
            .lock()
            .unwrap()
            .elements
            .insert(locator, ElementState { spec, shown_at });
        self
    }

    /// Every navigation fails with this detail.
    pub fn fail_navigation(&self, detail: &str) -> &Self {
        self.state.lock().unwrap().goto_error = Some(detail.to_string());
        self
    }

    /// Navigating to `from` ends up on `to`.
    pub fn redirect(&self, from: &str, to: &str) -> &Self {
        self.state
            .lock()
            .unwrap()
            .redirects
            .insert(from.to_string(), to.to_string());
        self
    }

    pub fn push_download(&self, outcome: BrowserResult<DownloadArtifact>) {
        self.state.lock().unwrap().downloads.push_back(outcome);
    }

    pub fn set_url(&self, url: &str) {
        self.state.lock().unwrap().url = url.to_string();
    }

    pub fn gotos(&self) -> Vec<String> {
        self.state.lock().unwrap().gotos.clone()
    }

    pub fn clicks(&self) -> Vec<Locator> {
        self.state.lock().unwrap().clicks.clone()
    }

    pub fn fills(&self) -> Vec<(Locator, String)> {
        self.state.lock().unwrap().fills.clone()
    }

    pub fn download_waits(&self) -> usize {
        self.state.lock().unwrap().download_waits
    }

    fn with_element<T>(&self, locator: &Locator, f: impl FnOnce(&ElementState, Instant) -> T) -> Option<T> {
        let state = self.state.lock().unwrap();
        state
            .elements
            .get(locator)
            .filter(|el| el.shown_at.is_some())
            .map(|el| f(el, Instant::now()))
    }

    fn visible_now(el: &ElementState, now: Instant) -> bool {
        match (el.shown_at, el.spec.visible_after) {
            (Some(shown), Some(delay)) => now >= shown + delay,
            _ => false,
        }
    }
}

#[async_trait]
impl Page for FakePage {
    async fn goto(&self, url: &str, _timeout: Duration) -> BrowserResult<()> {
        let mut state = self.state.lock().unwrap();
        state.gotos.push(url.to_string());
        if let Some(detail) = &state.goto_error {
            return Err(BrowserError::Navigation {
                url: url.to_string(),
                detail: detail.clone(),
            });
        }
        state.url = state
            .redirects
            .get(url)
            .cloned()
            .unwrap_or_else(|| url.to_string());
        Ok(())
    }

    async fn url(&self) -> BrowserResult<String> {
        let mut state = self.state.lock().unwrap();
        match state.bounce.take() {
            Some((0, then)) => state.url = then,
            Some((reads, then)) => state.bounce = Some((reads - 1, then)),
            None => {}
        }
        Ok(state.url.clone())
    }

    async fn count(&self, locator: &Locator) -> BrowserResult<usize> {
        Ok(self.with_element(locator, |_, _| 1).unwrap_or(0))
    }

    async fn is_visible(&self, locator: &Locator) -> BrowserResult<bool> {
        Ok(self
            .with_element(locator, Self::visible_now)
            .unwrap_or(false))
    }

    async fn is_enabled(&self, locator: &Locator) -> BrowserResult<bool> {
        Ok(self
            .with_element(locator, |el, now| match el.shown_at {
                Some(shown) => now >= shown + el.spec.enabled_after,
                None => false,
            })
            .unwrap_or(false))
    }

    async fn attribute(&self, locator: &Locator, name: &str) -> BrowserResult<Option<String>> {
        Ok(self
            .with_element(locator, |el, _| el.spec.attributes.get(name).cloned())
            .flatten())
    }

    async fn fill(&self, locator: &Locator, value: &str) -> BrowserResult<()> {
        if self.with_element(locator, |_, _| ()).is_none() {
            return Err(BrowserError::NoElement(locator.to_string()));
        }
        self.state
            .lock()
            .unwrap()
            .fills
            .push((locator.clone(), value.to_string()));
        Ok(())
    }

    async fn click(&self, locator: &Locator) -> BrowserResult<()> {
        let effects = self
            .with_element(locator, |el, now| {
                Self::visible_now(el, now).then(|| el.spec.on_click.clone())
            })
            .flatten()
            .ok_or_else(|| BrowserError::NoElement(locator.to_string()))?;

        let mut state = self.state.lock().unwrap();
        state.clicks.push(locator.clone());
        for effect in effects {
            match effect {
                Effect::Navigate(url) => state.url = url,
                Effect::NavigateBriefly { url, reads, then } => {
                    state.url = url;
                    state.bounce = Some((reads, then));
                }
                Effect::Reveal(target) => {
                    if let Some(el) = state.elements.get_mut(&target) {
                        el.shown_at = Some(Instant::now());
                    }
                }
                Effect::Download(artifact) => state.downloads.push_back(Ok(artifact)),
            }
        }
        Ok(())
    }

    async fn next_download(&self, timeout: Duration) -> BrowserResult<DownloadArtifact> {
        self.state.lock().unwrap().download_waits += 1;
        let deadline = Instant::now() + timeout;
        loop {
            let next = self.state.lock().unwrap().downloads.pop_front();
            if let Some(outcome) = next {
                return outcome;
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::timeout("download", timeout));
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SCRIPTED ONEPILOT PAGES
// ═══════════════════════════════════════════════════════════════════════════

pub fn login_settings() -> LoginSettings {
    LoginSettings::for_base_url(BASE_URL)
}

pub fn export_settings() -> ExportSettings {
    ExportSettings::for_base_url(BASE_URL)
}

/// Login form whose submit button lands on the vehicle list.
pub fn add_login_form(page: &FakePage) {
    let s = login_settings();
    page.element(s.identity_field.clone(), FakeElement::visible())
        .element(s.secret_field.clone(), FakeElement::visible())
        .element(
            s.submit.clone(),
            FakeElement::visible()
                .disabled_for(Duration::from_millis(300))
                .on_click(Effect::Navigate(s.landing_url())),
        );
}

/// Which menu the split toggle opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuKind {
    /// `aria-labelledby` points at the anchor's id
    Linked,
    /// No menu is labelled by the anchor; only the generic open-menu class
    OpenOnly,
}

/// Vehicle list with the split button. The export item downloads directly
/// when `artifact` is given.
pub fn add_vehicle_list(page: &FakePage, menu_kind: MenuKind, artifact: Option<DownloadArtifact>) -> Locator {
    let s = export_settings();
    let menu = match menu_kind {
        MenuKind::Linked => s.linked_menu("btn-add-vehicle"),
        MenuKind::OpenOnly => s.open_menu.clone(),
    };

    page.element(
        s.anchor(),
        FakeElement::visible().with_attr("id", "btn-add-vehicle"),
    );
    page.element(
        s.toggle(),
        FakeElement::visible()
            .on_click(Effect::Reveal(menu.clone()))
            .on_click(Effect::Reveal(s.export_item(&menu))),
    );
    page.element(menu.clone(), FakeElement::visible().revealed_by_click());

    let mut item = FakeElement::visible().revealed_by_click();
    if let Some(artifact) = artifact {
        item = item.on_click(Effect::Download(artifact));
    }
    page.element(s.export_item(&menu), item);
    menu
}

/// Write `bytes` where the browser would have staged a download.
pub fn staged_download(dir: &Path, bytes: &[u8], suggested: &str) -> DownloadArtifact {
    let path = dir.join("0f2a9c1e-staged");
    std::fs::write(&path, bytes).unwrap();
    DownloadArtifact {
        path,
        url: format!("{BASE_URL}/api/vehicles/export"),
        suggested_filename: suggested.to_string(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// FAKE LAUNCHER
// ═══════════════════════════════════════════════════════════════════════════

pub struct FakeLauncher {
    page: Arc<FakePage>,
    launches: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl FakeLauncher {
    pub fn new(page: Arc<FakePage>) -> Self {
        Self {
            page,
            launches: Arc::default(),
            closes: Arc::default(),
        }
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

struct FakeSession {
    page: Arc<FakePage>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self) -> BrowserResult<Box<dyn LiveSession>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            page: self.page.clone(),
            closes: self.closes.clone(),
        }))
    }
}

#[async_trait]
impl LiveSession for FakeSession {
    fn page(&self) -> &dyn Page {
        self.page.as_ref()
    }

    async fn close(self: Box<Self>) -> BrowserResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// FAKE SHEETS
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub enum SheetCall {
    Clear(String),
    Update(String, usize),
    Replace(String, usize),
    Titles,
}

#[derive(Default)]
struct SheetsState {
    cells: Vec<Vec<Value>>,
    calls: Vec<SheetCall>,
}

/// In-memory tab. Cells hold the JSON values a RAW write would store.
pub struct FakeSheets {
    titles: Vec<String>,
    state: Mutex<SheetsState>,
    reject_status: Option<u16>,
}

impl FakeSheets {
    pub fn new(title: &str) -> Self {
        Self {
            titles: vec![title.to_string()],
            state: Mutex::default(),
            reject_status: None,
        }
    }

    /// Every call fails with this HTTP status.
    pub fn rejecting(title: &str, status: u16) -> Self {
        Self {
            reject_status: Some(status),
            ..Self::new(title)
        }
    }

    pub fn seed(&self, rows: Vec<Vec<Value>>) {
        self.state.lock().unwrap().cells = rows;
    }

    pub fn calls(&self) -> Vec<SheetCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Observable content: trailing empty cells and rows removed.
    pub fn visible_rows(&self) -> Vec<Vec<Value>> {
        let mut rows: Vec<Vec<Value>> = self
            .state
            .lock()
            .unwrap()
            .cells
            .iter()
            .map(|row| {
                let mut row = row.clone();
                while row.last().is_some_and(is_empty_cell) {
                    row.pop();
                }
                row
            })
            .collect();
        while rows.last().is_some_and(Vec::is_empty) {
            rows.pop();
        }
        rows
    }

    fn check(&self, operation: &'static str) -> SinkResult<()> {
        match self.reject_status {
            Some(status) => Err(SinkError::RemoteRejected {
                operation,
                status: Some(status),
                detail: "The caller does not have permission".to_string(),
            }),
            None => Ok(()),
        }
    }
}

fn is_empty_cell(value: &Value) -> bool {
    value.is_null() || value.as_str() == Some("")
}

#[async_trait]
impl SpreadsheetApi for FakeSheets {
    async fn clear_values(&self, _spreadsheet_id: &str, range: &str) -> SinkResult<()> {
        self.check("values.clear")?;
        let mut state = self.state.lock().unwrap();
        state.calls.push(SheetCall::Clear(range.to_string()));
        state.cells.clear();
        Ok(())
    }

    async fn update_values(
        &self,
        _spreadsheet_id: &str,
        range: &str,
        rows: Vec<Vec<Value>>,
    ) -> SinkResult<()> {
        self.check("values.update")?;
        let mut state = self.state.lock().unwrap();
        state.calls.push(SheetCall::Update(range.to_string(), rows.len()));
        for (r, row) in rows.into_iter().enumerate() {
            if state.cells.len() <= r {
                state.cells.resize(r + 1, Vec::new());
            }
            for (c, value) in row.into_iter().enumerate() {
                let target = &mut state.cells[r];
                if target.len() <= c {
                    target.resize(c + 1, Value::Null);
                }
                target[c] = value;
            }
        }
        Ok(())
    }

    async fn replace_sheet(
        &self,
        _spreadsheet_id: &str,
        sheet_name: &str,
        grid: &TabularGrid,
    ) -> SinkResult<()> {
        self.check("spreadsheets.batchUpdate")?;
        if !self.titles.iter().any(|t| t == sheet_name) {
            return Err(SinkError::SheetNotFound(sheet_name.to_string()));
        }
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(SheetCall::Replace(sheet_name.to_string(), grid.row_count()));
        state.cells = grid.to_json_rows();
        Ok(())
    }

    async fn sheet_titles(&self, _spreadsheet_id: &str) -> SinkResult<Vec<String>> {
        self.check("spreadsheets.get")?;
        self.state.lock().unwrap().calls.push(SheetCall::Titles);
        Ok(self.titles.clone())
    }
}
