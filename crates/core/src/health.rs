//! Backend connection status.
//!
//! A tiny probe request tells the trainee whether persona replies will be
//! live or fallbacks. `ConnectionMonitor` repeats it on an interval and
//! publishes the latest result on a watch channel.

use crate::llm_client::{ChatBackend, ChatMessage, ChatRole, CompletionRequest};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// How often the monitor probes the backend.
pub const STATUS_INTERVAL: Duration = Duration::from_secs(30);

const PROBE_TEXT: &str = "Hello";
const PROBE_MAX_TOKENS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionStatus {
    pub is_connected: bool,
    pub model: String,
    pub base_url: String,
    pub last_checked: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Sends one minimal request and reports whether it succeeded.
pub async fn check_connection(backend: &dyn ChatBackend) -> ConnectionStatus {
    let info = backend.info();
    let request = CompletionRequest {
        messages: vec![ChatMessage::new(ChatRole::User, PROBE_TEXT)],
        temperature: None,
        max_tokens: PROBE_MAX_TOKENS,
    };
    let error = match backend.create(request).await {
        Ok(_) => None,
        Err(e) => Some(e.to_string()),
    };
    ConnectionStatus {
        is_connected: error.is_none(),
        model: info.model,
        base_url: info.base_url,
        last_checked: Utc::now(),
        error,
    }
}

pub struct ConnectionMonitor {
    backend: Arc<dyn ChatBackend>,
    status: watch::Sender<Option<ConnectionStatus>>,
    interval: Duration,
}

impl ConnectionMonitor {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        let (status, _) = watch::channel(None);
        Self {
            backend,
            status,
            interval: STATUS_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<ConnectionStatus>> {
        self.status.subscribe()
    }

    /// The most recent probe result, `None` before the first probe finishes.
    pub fn latest(&self) -> Option<ConnectionStatus> {
        self.status.borrow().clone()
    }

    /// Probes now and publishes the result.
    pub async fn check_now(&self) -> ConnectionStatus {
        let status = check_connection(self.backend.as_ref()).await;
        let was_connected = self.latest().map(|s| s.is_connected);
        match (&status.error, was_connected) {
            (None, Some(true)) => {}
            (None, _) => info!(model = %status.model, "Chat backend reachable"),
            (Some(e), _) => warn!(error = %e, model = %status.model, "Chat backend unreachable"),
        }
        self.status.send_replace(Some(status.clone()));
        status
    }

    /// Probes immediately and then on every interval until aborted.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                ticker.tick().await;
                self.check_now().await;
            }
        })
    }
}
