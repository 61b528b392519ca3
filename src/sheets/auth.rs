//! Service-account credentials and access tokens
//!
//! Credentials come either as a key file path or as inline JSON. Inline
//! material is written once to `<temp-dir>/sa.json` by
//! [`ServiceAccountSource::resolve`], before any client exists.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use gcp_auth::{CustomServiceAccount, TokenProvider};

use crate::error::{ConfigError, SinkError, SinkResult};

pub const SPREADSHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

/// File name inline credentials are materialized to.
pub const INLINE_KEY_FILE: &str = "sa.json";

#[derive(Clone, PartialEq, Eq)]
pub enum ServiceAccountSource {
    File(PathBuf),
    Inline(String),
}

impl std::fmt::Debug for ServiceAccountSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceAccountSource::File(path) => f.debug_tuple("File").field(path).finish(),
            ServiceAccountSource::Inline(_) => f.write_str("Inline(<redacted>)"),
        }
    }
}

impl ServiceAccountSource {
    /// A configured key file wins over inline JSON.
    pub fn from_settings(
        file: Option<PathBuf>,
        inline: Option<String>,
    ) -> Result<Self, ConfigError> {
        match (file, inline) {
            (Some(path), _) if !path.as_os_str().is_empty() => Ok(ServiceAccountSource::File(path)),
            (_, Some(json)) if !json.trim().is_empty() => Ok(ServiceAccountSource::Inline(json)),
            _ => Err(ConfigError::Missing {
                name: "GOOGLE_APPLICATION_CREDENTIALS or GOOGLE_CREDENTIALS_JSON",
            }),
        }
    }

    /// Path of a usable key file.
    pub fn resolve(&self) -> Result<PathBuf, ConfigError> {
        self.resolve_in(&std::env::temp_dir())
    }

    pub fn resolve_in(&self, dir: &Path) -> Result<PathBuf, ConfigError> {
        match self {
            ServiceAccountSource::File(path) => {
                if !path.is_file() {
                    return Err(ConfigError::Credentials(format!(
                        "{} is not a readable file",
                        path.display()
                    )));
                }
                Ok(path.clone())
            }
            ServiceAccountSource::Inline(json) => {
                serde_json::from_str::<serde_json::Value>(json)
                    .map_err(|e| ConfigError::Credentials(format!("inline JSON is invalid: {e}")))?;
                let path = dir.join(INLINE_KEY_FILE);
                write_private(&path, json.as_bytes()).map_err(|e| {
                    ConfigError::Credentials(format!("cannot write {}: {e}", path.display()))
                })?;
                tracing::debug!(path = %path.display(), "inline service account materialized");
                Ok(path)
            }
        }
    }
}

/// Write a fresh file readable by the owner only. Whatever sits at `path`
/// (a stale key, or a link pointing elsewhere) is unlinked first, and the
/// file is created exclusively so it is never written through a link.
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use std::io::Write;

    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Supplies bearer tokens for Sheets requests.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self) -> SinkResult<String>;
}

/// Tokens minted from a service-account key, cached and refreshed by
/// `gcp_auth`.
pub struct ServiceAccountTokens {
    account: CustomServiceAccount,
}

impl ServiceAccountTokens {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let account = CustomServiceAccount::from_file(path)
            .map_err(|e| ConfigError::Credentials(format!("{}: {e}", path.display())))?;
        Ok(Self { account })
    }
}

#[async_trait]
impl AccessTokenSource for ServiceAccountTokens {
    async fn access_token(&self) -> SinkResult<String> {
        let token = self
            .account
            .token(&[SPREADSHEETS_SCOPE])
            .await
            .map_err(|e| SinkError::Auth(e.to_string()))?;
        Ok(token.as_str().to_string())
    }
}

/// A fixed token, for tests and short-lived tokens obtained elsewhere.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl AccessTokenSource for StaticToken {
    async fn access_token(&self) -> SinkResult<String> {
        Ok(self.0.clone())
    }
}
