use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

/// Append-only structured session log.
///
/// Every event carries `type`, `session_id`, a per-writer `seq` and `ts`;
/// the caller payload is merged after those and may not override them.
/// Lines are compact JSON, written to a `.jsonl` file or kept in memory.
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventWriterInner>,
}

#[derive(Debug)]
enum EventSink {
    File(PathBuf),
    Memory,
    Discard,
}

#[derive(Debug)]
struct EventWriterInner {
    sink: EventSink,
    session_id: String,
    state: Mutex<EventLogState>,
}

#[derive(Debug, Default)]
struct EventLogState {
    next_seq: u64,
    buffered: Vec<Value>,
}

const RESERVED_KEYS: &[&str] = &["type", "session_id", "seq", "ts"];

impl EventWriter {
    pub fn to_file(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self::with_sink(EventSink::File(path.into()), session_id.into())
    }

    pub fn in_memory(session_id: impl Into<String>) -> Self {
        Self::with_sink(EventSink::Memory, session_id.into())
    }

    /// Numbers and stamps events but keeps nothing.
    pub fn discard(session_id: impl Into<String>) -> Self {
        Self::with_sink(EventSink::Discard, session_id.into())
    }

    fn with_sink(sink: EventSink, session_id: String) -> Self {
        Self {
            inner: Arc::new(EventWriterInner {
                sink,
                session_id,
                state: Mutex::new(EventLogState::default()),
            }),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.inner.sink {
            EventSink::File(path) => Some(path.as_path()),
            EventSink::Memory | EventSink::Discard => None,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn emit(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        let mut state = self
            .inner
            .state
            .lock()
            .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?;

        let mut event = Map::new();
        event.insert("type".to_string(), Value::String(event_type.to_string()));
        event.insert(
            "session_id".to_string(),
            Value::String(self.inner.session_id.clone()),
        );
        event.insert("seq".to_string(), Value::Number(state.next_seq.into()));
        event.insert("ts".to_string(), Value::String(now_utc_iso()));
        for (key, value) in payload {
            if RESERVED_KEYS.contains(&key.as_str()) {
                continue;
            }
            event.insert(key, value);
        }
        let event = Value::Object(event);

        match &self.inner.sink {
            EventSink::File(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let line = serde_json::to_string(&event)?;
                let mut file = OpenOptions::new().create(true).append(true).open(path)?;
                file.write_all(line.as_bytes())?;
                file.write_all(b"\n")?;
            }
            EventSink::Memory => state.buffered.push(event.clone()),
            EventSink::Discard => {}
        }
        state.next_seq += 1;

        Ok(event)
    }

    /// Events kept by an in-memory writer, oldest first. Always empty for other sinks.
    pub fn buffered(&self) -> Vec<Value> {
        self.inner
            .state
            .lock()
            .map(|state| state.buffered.clone())
            .unwrap_or_default()
    }

    pub fn buffered_types(&self) -> Vec<String> {
        self.buffered()
            .iter()
            .filter_map(|row| row.get("type").and_then(Value::as_str).map(str::to_string))
            .collect()
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::DateTime;

    use super::*;

    #[test]
    fn emit_writes_compact_jsonl_line() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("logs").join("events.jsonl");
        let writer = EventWriter::to_file(&path, "session-123");

        let mut payload = EventPayload::new();
        payload.insert("style".to_string(), Value::String("Bohemian".to_string()));
        let emitted = writer.emit("style_requested", payload)?;

        let content = fs::read_to_string(&path)?;
        let line = content.lines().next().unwrap_or("");
        let parsed: Value = serde_json::from_str(line)?;

        assert_eq!(parsed, emitted);
        assert_eq!(parsed["type"], Value::String("style_requested".to_string()));
        assert_eq!(
            parsed["session_id"],
            Value::String("session-123".to_string())
        );
        assert_eq!(parsed["seq"], Value::Number(0.into()));
        assert_eq!(parsed["style"], Value::String("Bohemian".to_string()));

        let ts = parsed["ts"].as_str().unwrap_or("");
        DateTime::parse_from_rfc3339(ts)?;
        Ok(())
    }

    #[test]
    fn payload_cannot_override_envelope_keys() -> anyhow::Result<()> {
        let writer = EventWriter::in_memory("session-123");

        let mut payload = EventPayload::new();
        payload.insert("type".to_string(), Value::String("override".to_string()));
        payload.insert("seq".to_string(), Value::Number(99.into()));
        let emitted = writer.emit("image_uploaded", payload)?;

        assert_eq!(emitted["type"], Value::String("image_uploaded".to_string()));
        assert_eq!(emitted["seq"], Value::Number(0.into()));
        Ok(())
    }

    #[test]
    fn emit_appends_lines_with_increasing_seq() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let writer = EventWriter::to_file(&path, "session-123");

        writer.emit("one", EventPayload::new())?;
        writer.clone().emit("two", EventPayload::new())?;

        let content = fs::read_to_string(&path)?;
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: Value = serde_json::from_str(lines[0])?;
        let second: Value = serde_json::from_str(lines[1])?;
        assert_eq!(first["type"], Value::String("one".to_string()));
        assert_eq!(second["type"], Value::String("two".to_string()));
        assert_eq!(second["seq"], Value::Number(1.into()));
        assert!(writer.buffered().is_empty());
        Ok(())
    }

    #[test]
    fn memory_sink_buffers_events_in_order() -> anyhow::Result<()> {
        let writer = EventWriter::in_memory("session-123");
        writer.emit("one", EventPayload::new())?;
        writer.emit("two", EventPayload::new())?;
        assert_eq!(writer.buffered_types(), vec!["one", "two"]);
        assert!(writer.path().is_none());
        Ok(())
    }

    #[test]
    fn discard_sink_keeps_nothing_but_still_sequences() -> anyhow::Result<()> {
        let writer = EventWriter::discard("session-123");
        writer.emit("one", EventPayload::new())?;
        let second = writer.emit("two", EventPayload::new())?;
        assert_eq!(second["seq"], Value::Number(1.into()));
        assert!(writer.buffered().is_empty());
        assert!(writer.path().is_none());
        Ok(())
    }
}
