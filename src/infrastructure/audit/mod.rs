//! Security audit log
//!
//! Every event becomes a `tracing` record tagged `audit = true`. When a path
//! is configured the event is also queued for a background writer that
//! appends it to a JSON lines file. The request path never touches the file.
//! Failures are logged and swallowed; auditing never fails a request.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::domain::traits::AuditSink;
use crate::infrastructure::config::AuditConfig;

/// Events waiting for the file writer before new ones are dropped
pub const AUDIT_QUEUE_CAPACITY: usize = 1024;

/// One line of the audit file
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub user_id: i64,
    pub username: String,
    pub action: String,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

pub struct AuditLogger {
    enabled: bool,
    tx: Option<mpsc::Sender<AuditEvent>>,
    dropped: AtomicU64,
    cancel: CancellationToken,
    tasks: TaskTracker,
}

impl AuditLogger {
    /// Logger that only emits tracing events
    pub fn new() -> Self {
        Self {
            enabled: true,
            tx: None,
            dropped: AtomicU64::new(0),
            cancel: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    /// Also append events to `path`, creating parent directories as needed.
    ///
    /// Spawns the writer task, so this must be called inside a tokio runtime.
    pub fn with_file(self, path: impl AsRef<Path>) -> std::io::Result<Self> {
        self.with_file_capacity(path, AUDIT_QUEUE_CAPACITY)
    }

    pub(crate) fn with_file_capacity(mut self, path: impl AsRef<Path>, capacity: usize) -> std::io::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let file = tokio::fs::File::from_std(file);

        let (tx, rx) = mpsc::channel(capacity);
        self.tasks.spawn(write_events(file, rx, self.cancel.clone()));
        self.tx = Some(tx);
        Ok(self)
    }

    /// Build from config. An unopenable file degrades to tracing-only auditing.
    pub fn from_config(config: &AuditConfig) -> Self {
        let logger = Self {
            enabled: config.enabled,
            ..Self::new()
        };
        match (&config.path, config.enabled) {
            (Some(path), true) => match logger.with_file(path) {
                Ok(logger) => logger,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Cannot open audit file, auditing to log only");
                    Self::new()
                }
            },
            _ => logger,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Events discarded because the writer queue was full
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Stop the file writer after it has flushed every queued event
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tasks.close();
        self.tasks.wait().await;
    }

    pub fn log_event(&self, event: AuditEvent) {
        if !self.enabled {
            return;
        }

        let details = event.details.as_ref().map(Value::to_string);
        if event.success {
            info!(
                audit = true,
                user_id = event.user_id,
                username = %event.username,
                action = %event.action,
                error = event.error.as_deref(),
                details = details.as_deref(),
                "Audit event"
            );
        } else {
            warn!(
                audit = true,
                user_id = event.user_id,
                username = %event.username,
                action = %event.action,
                error = event.error.as_deref(),
                details = details.as_deref(),
                "Audit event"
            );
        }

        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(action = %event.action, dropped, "Audit queue full, event not written to file");
            }
            Err(TrySendError::Closed(event)) => {
                debug!(action = %event.action, "Audit writer stopped, event not written to file");
            }
        }
    }

    pub fn log_command(&self, user_id: i64, username: &str, command: &str, success: bool, error: Option<&str>) {
        self.log_event(event(
            user_id,
            username,
            "command_execution",
            success,
            error,
            json!({ "command": command, "event_type": "command" }),
        ));
    }

    pub fn log_callback(&self, user_id: i64, username: &str, callback_data: &str, success: bool, error: Option<&str>) {
        self.log_event(event(
            user_id,
            username,
            "callback_query",
            success,
            error,
            json!({ "callback_data": callback_data, "event_type": "callback" }),
        ));
    }

    pub fn log_registration(
        &self,
        user_id: i64,
        username: &str,
        first_name: &str,
        last_name: &str,
        success: bool,
        error: Option<&str>,
    ) {
        self.log_event(event(
            user_id,
            username,
            "user_registration",
            success,
            error,
            json!({ "first_name": first_name, "last_name": last_name, "event_type": "registration" }),
        ));
    }

    /// Security events are recorded as `security_<kind>`
    pub fn log_security_event(&self, user_id: i64, username: &str, kind: &str, details: Value) {
        let mut details = match details {
            Value::Object(map) => map,
            Value::Null => Default::default(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("value".into(), other);
                map
            }
        };
        details.insert("event_type".into(), Value::from("security"));

        self.log_event(event(
            user_id,
            username,
            &format!("security_{}", kind),
            true,
            None,
            Value::Object(details),
        ));
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}


impl AuditSink for AuditLogger {
    fn record(&self, user_id: i64, action: &str, timestamp: DateTime<Utc>) {
        self.log_security_event(
            user_id,
            "",
            "user_action",
            json!({ "action": action, "timestamp": timestamp }),
        );
    }
}

fn event(user_id: i64, username: &str, action: &str, success: bool, error: Option<&str>, details: Value) -> AuditEvent {
    AuditEvent {
        user_id,
        username: username.to_string(),
        action: action.to_string(),
        timestamp: Utc::now(),
        success,
        error: error.map(str::to_string),
        details: Some(details),
    }
}

/// Single writer: appends queued events until cancelled, then drains the queue
async fn write_events(mut file: tokio::fs::File, mut rx: mpsc::Receiver<AuditEvent>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            event = rx.recv() => match event {
                Some(event) => append(&mut file, &event).await,
                None => break,
            },
            _ = cancel.cancelled() => {
                rx.close();
                while let Some(event) = rx.recv().await {
                    append(&mut file, &event).await;
                }
                break;
            }
        }
    }
    debug!("Audit writer stopped");
}

async fn append(file: &mut tokio::fs::File, event: &AuditEvent) {
    let mut line = match serde_json::to_vec(event) {
        Ok(line) => line,
        Err(e) => {
            warn!(error = %e, "Failed to serialize audit event");
            return;
        }
    };
    line.push(b'\n');
    if let Err(e) = write_line(file, &line).await {
        warn!(error = %e, "Failed to write audit event");
    }
}

async fn write_line(file: &mut tokio::fs::File, line: &[u8]) -> std::io::Result<()> {
    file.write_all(line).await?;
    file.flush().await
}
