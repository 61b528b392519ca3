use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;

use super::cdp::{str_field, CdpConnection, CdpEvent};
use super::{wait, DownloadArtifact, Locator, Page};
use crate::error::{BrowserError, BrowserResult};

/// Resolves a serialized [`Locator`] and applies one operation to its first
/// match. Called as `(script)(spec, op)`.
const DOM_SCRIPT: &str = include_str!("dom.js");

type DownloadQueue = mpsc::UnboundedReceiver<BrowserResult<DownloadArtifact>>;

/// A tab attached over a flat DevTools session.
pub struct CdpPage {
    connection: Arc<CdpConnection>,
    context_id: String,
    target_id: String,
    session_id: String,
    downloads: Mutex<DownloadQueue>,
    watcher: JoinHandle<()>,
}

impl CdpPage {
    /// Create a tab in `context_id`, with downloads of the whole context
    /// landing in `staging`.
    pub(crate) async fn open(
        connection: Arc<CdpConnection>,
        context_id: String,
        staging: PathBuf,
        window: (u32, u32),
    ) -> BrowserResult<Self> {
        // Subscribe before enabling download events so none slip by
        let events = connection.subscribe();
        connection
            .call(
                "Browser.setDownloadBehavior",
                json!({
                    "behavior": "allowAndName",
                    "browserContextId": context_id,
                    "downloadPath": staging.to_string_lossy(),
                    "eventsEnabled": true,
                }),
                None,
            )
            .await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = tokio::spawn(watch_downloads(events, DownloadTracker::new(staging), tx));

        let target = connection
            .call(
                "Target.createTarget",
                json!({ "url": "about:blank", "browserContextId": context_id }),
                None,
            )
            .await?;
        let target_id = str_field(&target, "targetId")?;

        let attached = connection
            .call(
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
                None,
            )
            .await?;
        let session_id = str_field(&attached, "sessionId")?;

        let page = Self {
            connection,
            context_id,
            target_id,
            session_id,
            downloads: Mutex::new(rx),
            watcher,
        };

        let (width, height) = window;
        page.send("Page.enable", json!({})).await?;
        page.send(
            "Emulation.setDeviceMetricsOverride",
            json!({ "width": width, "height": height, "deviceScaleFactor": 1, "mobile": false }),
        )
        .await?;

        Ok(page)
    }

    async fn send(&self, method: &str, params: Value) -> BrowserResult<Value> {
        self.connection
            .call(method, params, Some(&self.session_id))
            .await
    }

    async fn evaluate(&self, expression: String) -> BrowserResult<Value> {
        let reply = self
            .send(
                "Runtime.evaluate",
                json!({ "expression": expression, "returnByValue": true, "awaitPromise": true }),
            )
            .await
            .map_err(|e| match e {
                // No execution context while a navigation commits
                BrowserError::Protocol { message, .. } => BrowserError::Script(message),
                other => other,
            })?;

        if let Some(details) = reply.get("exceptionDetails") {
            return Err(BrowserError::Script(exception_text(details)));
        }
        Ok(reply
            .pointer("/result/value")
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn query(&self, locator: &Locator, op: Value) -> BrowserResult<Value> {
        let spec =
            serde_json::to_string(locator).map_err(|e| BrowserError::Script(e.to_string()))?;
        self.evaluate(format!("({DOM_SCRIPT})({spec}, {op})")).await
    }

    async fn mouse(&self, kind: &str, x: f64, y: f64) -> BrowserResult<()> {
        self.send(
            "Input.dispatchMouseEvent",
            json!({ "type": kind, "x": x, "y": y, "button": "left", "clickCount": 1 }),
        )
        .await
        .map(|_| ())
    }

    pub(crate) async fn dispose(&self) -> BrowserResult<()> {
        self.watcher.abort();
        self.connection
            .call(
                "Target.disposeBrowserContext",
                json!({ "browserContextId": self.context_id }),
                None,
            )
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl Page for CdpPage {
    async fn goto(&self, url: &str, timeout: Duration) -> BrowserResult<()> {
        let navigate = async {
            let reply = self.send("Page.navigate", json!({ "url": url })).await?;
            if let Some(error) = reply
                .get("errorText")
                .and_then(Value::as_str)
                .filter(|e| !e.is_empty())
            {
                return Err(BrowserError::Navigation {
                    url: url.to_string(),
                    detail: error.to_string(),
                });
            }
            wait::poll_until("DOM content loaded", timeout, || async {
                let state = self.evaluate("document.readyState".to_string()).await?;
                Ok::<_, BrowserError>(matches!(state.as_str(), Some("interactive" | "complete")))
            })
            .await
        };
        match tokio::time::timeout(timeout, navigate).await {
            Ok(result) => result,
            Err(_) => Err(BrowserError::timeout(format!("navigation to {url}"), timeout)),
        }
    }

    async fn url(&self) -> BrowserResult<String> {
        let info = self
            .connection
            .call(
                "Target.getTargetInfo",
                json!({ "targetId": self.target_id }),
                None,
            )
            .await?;
        info.pointer("/targetInfo/url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| BrowserError::Connection("target info without url".into()))
    }

    async fn count(&self, locator: &Locator) -> BrowserResult<usize> {
        let n = self.query(locator, json!({ "op": "count" })).await?;
        Ok(n.as_u64().unwrap_or(0) as usize)
    }

    async fn is_visible(&self, locator: &Locator) -> BrowserResult<bool> {
        let v = self.query(locator, json!({ "op": "visible" })).await?;
        Ok(v.as_bool().unwrap_or(false))
    }

    async fn is_enabled(&self, locator: &Locator) -> BrowserResult<bool> {
        let v = self.query(locator, json!({ "op": "enabled" })).await?;
        Ok(v.as_bool().unwrap_or(false))
    }

    async fn attribute(&self, locator: &Locator, name: &str) -> BrowserResult<Option<String>> {
        let v = self
            .query(locator, json!({ "op": "attribute", "name": name }))
            .await?;
        Ok(v.as_str().map(str::to_string))
    }

    async fn fill(&self, locator: &Locator, value: &str) -> BrowserResult<()> {
        let focused = self.query(locator, json!({ "op": "focus" })).await?;
        if focused.as_bool() != Some(true) {
            return Err(BrowserError::NoElement(locator.to_string()));
        }
        self.send("Input.insertText", json!({ "text": value }))
            .await
            .map(|_| ())
    }

    async fn click(&self, locator: &Locator) -> BrowserResult<()> {
        let point = self.query(locator, json!({ "op": "point" })).await?;
        let (Some(x), Some(y)) = (
            point.get("x").and_then(Value::as_f64),
            point.get("y").and_then(Value::as_f64),
        ) else {
            return Err(BrowserError::NoElement(locator.to_string()));
        };

        self.mouse("mouseMoved", x, y).await?;
        self.mouse("mousePressed", x, y).await?;
        self.mouse("mouseReleased", x, y).await
    }

    async fn next_download(&self, timeout: Duration) -> BrowserResult<DownloadArtifact> {
        let mut queue = self.downloads.lock().await;
        match tokio::time::timeout(timeout, queue.recv()).await {
            Ok(Some(outcome)) => outcome,
            Ok(None) => Err(BrowserError::Closed),
            Err(_) => Err(BrowserError::timeout("download", timeout)),
        }
    }
}

impl Drop for CdpPage {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

fn exception_text(details: &Value) -> String {
    details
        .pointer("/exception/description")
        .or_else(|| details.get("text"))
        .and_then(Value::as_str)
        .unwrap_or("uncaught exception")
        .to_string()
}

async fn watch_downloads(
    mut events: broadcast::Receiver<CdpEvent>,
    mut tracker: DownloadTracker,
    tx: mpsc::UnboundedSender<BrowserResult<DownloadArtifact>>,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if let Some(outcome) = tracker.on_event(&event) {
                    if tx.send(outcome).is_err() {
                        break;
                    }
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "download watcher fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Pairs `downloadWillBegin` with its terminal `downloadProgress`.
struct DownloadTracker {
    staging: PathBuf,
    started: HashMap<String, (String, String)>,
}

impl DownloadTracker {
    fn new(staging: PathBuf) -> Self {
        Self {
            staging,
            started: HashMap::new(),
        }
    }

    fn on_event(&mut self, event: &CdpEvent) -> Option<BrowserResult<DownloadArtifact>> {
        let param = |name: &str| {
            event
                .params
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        match event.method.as_str() {
            "Browser.downloadWillBegin" => {
                let name = param("suggestedFilename");
                tracing::info!(file = %name, "download started");
                self.started.insert(param("guid"), (param("url"), name));
                None
            }
            "Browser.downloadProgress" => {
                let guid = param("guid");
                match param("state").as_str() {
                    "completed" => {
                        let (url, suggested_filename) = self.started.remove(&guid)?;
                        Some(Ok(DownloadArtifact {
                            path: self.staging.join(&guid),
                            url,
                            suggested_filename,
                        }))
                    }
                    "canceled" => {
                        self.started.remove(&guid);
                        Some(Err(BrowserError::DownloadCanceled))
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }
}
