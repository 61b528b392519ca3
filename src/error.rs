use std::time::Duration;

use thiserror::Error;

pub type SyncResult<T> = Result<T, SyncError>;
pub type BrowserResult<T> = Result<T, BrowserError>;
pub type SinkResult<T> = Result<T, SinkError>;

/// Terminal error of a run. Each stage contributes its own variant.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("login failed: {0}")]
    Login(#[from] LoginError),

    #[error("export failed: {0}")]
    Export(#[from] ExportError),

    #[error("could not read workbook: {0}")]
    Parse(#[from] ParseError),

    #[error("spreadsheet update failed: {0}")]
    Sink(#[from] SinkError),

    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required setting {name}")]
    Missing { name: &'static str },

    #[error("invalid value for {name}: {detail}")]
    Invalid { name: &'static str, detail: String },

    #[error("service account credentials: {0}")]
    Credentials(String),
}

#[derive(Error, Debug)]
pub enum LoginError {
    #[error("missing ONEPILOT_EMAIL or ONEPILOT_PASSWORD")]
    MissingCredentials,

    #[error("login form not found: {detail}")]
    FormNotFound { detail: String },

    #[error("login submission failed: {detail}")]
    SubmitFailed { detail: String },

    #[error("not in the authenticated area after login (at {url})")]
    PostLoginVerificationFailed { url: String },

    #[error(transparent)]
    Browser(#[from] BrowserError),
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("anchor control not found: {detail}")]
    AnchorNotFound { detail: String },

    #[error("options menu not found: {detail}")]
    MenuNotFound { detail: String },

    #[error("export action not found in menu: {detail}")]
    ExportItemNotFound { detail: String },

    #[error("no download observed: {detail}")]
    ExportTimeout { detail: String },

    #[error(transparent)]
    Browser(#[from] BrowserError),
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("malformed workbook: {0}")]
    Workbook(String),

    #[error("workbook contains no worksheet")]
    NoWorksheet,
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("no spreadsheet identifier configured")]
    MissingTarget,

    #[error("sheet '{0}' does not exist in the spreadsheet")]
    SheetNotFound(String),

    #[error("{operation} rejected{}: {detail}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    RemoteRejected {
        operation: &'static str,
        status: Option<u16>,
        detail: String,
    },

    #[error("{operation} transport error: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("access token: {0}")]
    Auth(String),
}

/// Driver-level failures from the DevTools connection or the browser process.
#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("no Chrome/Chromium executable found (set CHROME_PATH)")]
    ExecutableNotFound,

    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("DevTools connection error: {0}")]
    Connection(String),

    #[error("DevTools call {method} failed: {message}")]
    Protocol { method: String, message: String },

    #[error("page script failed: {0}")]
    Script(String),

    #[error("navigation to {url} failed: {detail}")]
    Navigation { url: String, detail: String },

    #[error("timed out after {}ms waiting for {what}", .after.as_millis())]
    Timeout { what: String, after: Duration },

    #[error("no element matches {0}")]
    NoElement(String),

    #[error("download was canceled")]
    DownloadCanceled,

    #[error("DevTools connection closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BrowserError {
    pub fn timeout(what: impl Into<String>, after: Duration) -> Self {
        BrowserError::Timeout {
            what: what.into(),
            after,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, BrowserError::Timeout { .. })
    }
}
