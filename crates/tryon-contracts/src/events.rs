use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::lifecycle::RequestLifecycleState;

/// Lifecycle notifications handed to the presentation boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    StateChanged {
        from: RequestLifecycleState,
        to: RequestLifecycleState,
    },
    DescriptionReady {
        description: String,
        degraded: bool,
    },
    TryOnSucceeded {
        display_url: String,
        mime_type: String,
        images: usize,
        model_text: Option<String>,
    },
    TryOnFailed {
        kind: String,
        message: String,
    },
}

pub trait EventSink: Send + Sync {
    fn record(&self, event: &SessionEvent);
}

/// Append-only `events.jsonl` writer.
///
/// Each line carries `type`, `session_id` and `ts`; event fields are merged
/// last so they win on key collisions.
#[derive(Debug, Clone)]
pub struct JsonlEventLog {
    inner: Arc<JsonlEventLogInner>,
}

#[derive(Debug)]
struct JsonlEventLogInner {
    path: PathBuf,
    session_id: String,
    lock: Mutex<()>,
}

impl JsonlEventLog {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(JsonlEventLogInner {
                path: path.into(),
                session_id: session_id.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn append(&self, event: &SessionEvent) -> std::io::Result<Value> {
        let line_value = envelope(&self.inner.session_id, event)?;
        if let Some(parent) = self.inner.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let line = serde_json::to_string(&line_value)?;
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| std::io::Error::other("event log lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        Ok(line_value)
    }
}

impl EventSink for JsonlEventLog {
    fn record(&self, event: &SessionEvent) {
        if let Err(err) = self.append(event) {
            tracing::warn!(path = %self.inner.path.display(), "event log append failed: {err}");
        }
    }
}

/// Keeps enveloped events in memory, for embedding callers and tests.
#[derive(Debug, Default)]
pub struct MemoryEventLog {
    session_id: String,
    events: Mutex<Vec<Value>>,
}

impl MemoryEventLog {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<Value> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn event_types(&self) -> Vec<String> {
        self.events()
            .iter()
            .filter_map(|event| event.get("type").and_then(Value::as_str))
            .map(str::to_string)
            .collect()
    }
}

impl EventSink for MemoryEventLog {
    fn record(&self, event: &SessionEvent) {
        let Ok(value) = envelope(&self.session_id, event) else {
            return;
        };
        if let Ok(mut events) = self.events.lock() {
            events.push(value);
        }
    }
}

fn envelope(session_id: &str, event: &SessionEvent) -> std::io::Result<Value> {
    let mut out = Map::new();
    out.insert(
        "session_id".to_string(),
        Value::String(session_id.to_string()),
    );
    out.insert("ts".to_string(), Value::String(now_utc_iso()));
    if let Value::Object(fields) = serde_json::to_value(event)? {
        for (key, value) in fields {
            out.insert(key, value);
        }
    }
    Ok(Value::Object(out))
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
