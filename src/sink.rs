//! Event sinks for normalized records.
//!
//! The orchestrator hands every record to an [`EventSink`] as soon as it is
//! built; the sink's outcome is never consulted.

use std::io::Write;

use serde::Serialize;
use tracing::warn;

use crate::normalize::NormalizedRecord;

/// Default `sourcetype` stamped on written events.
pub const DEFAULT_SOURCETYPE: &str = "dellemc:vmax:rest";

/// Default `index` stamped on written events.
pub const DEFAULT_INDEX: &str = "main";

/// Destination of normalized records.
pub trait EventSink {
    fn emit(&mut self, record: NormalizedRecord);

    /// Pushes buffered events out; called once when a run finishes.
    fn flush(&mut self) {}
}

#[derive(Serialize)]
struct Event<'a> {
    source: &'a str,
    sourcetype: &'a str,
    index: &'a str,
    event: &'a NormalizedRecord,
}

/// Writes one JSON object per line, wrapped in an event envelope:
/// `{"source": "vmax://<host>::<array>", "sourcetype", "index", "event"}`.
pub struct JsonLinesSink<W: Write> {
    writer: W,
    source: String,
    sourcetype: String,
    index: String,
    written: u64,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W, source_host: &str, array_id: &str) -> Self {
        Self {
            writer,
            source: format!("vmax://{}::{}", source_host, array_id),
            sourcetype: DEFAULT_SOURCETYPE.to_string(),
            index: DEFAULT_INDEX.to_string(),
            written: 0,
        }
    }

    pub fn with_sourcetype(mut self, sourcetype: impl Into<String>) -> Self {
        self.sourcetype = sourcetype.into();
        self
    }

    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = index.into();
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Number of events written successfully.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_event(&mut self, record: &NormalizedRecord) -> std::io::Result<()> {
        let event = Event {
            source: &self.source,
            sourcetype: &self.sourcetype,
            index: &self.index,
            event: record,
        };
        serde_json::to_writer(&mut self.writer, &event)?;
        self.writer.write_all(b"\n")
    }
}

impl<W: Write> EventSink for JsonLinesSink<W> {
    fn emit(&mut self, record: NormalizedRecord) {
        match self.write_event(&record) {
            Ok(()) => self.written += 1,
            Err(e) => warn!(
                reporting_level = record.reporting_level().unwrap_or_default(),
                "Failed to write event: {}", e
            ),
        }
    }

    fn flush(&mut self) {
        if let Err(e) = self.writer.flush() {
            warn!("Failed to flush events: {}", e);
        }
    }
}

/// Keeps every emitted record in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<NormalizedRecord>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records whose `reporting_level` equals `level`.
    pub fn with_level(&self, level: &str) -> Vec<&NormalizedRecord> {
        self.records
            .iter()
            .filter(|r| r.reporting_level() == Some(level))
            .collect()
    }
}

impl EventSink for MemorySink {
    fn emit(&mut self, record: NormalizedRecord) {
        self.records.push(record);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;
    use crate::normalize::Normalizer;

    fn record(level: &str) -> NormalizedRecord {
        let source = json!({"reporting_level": level, "PercentBusy": 1.5});
        Normalizer::new("000197600123", 1000).merge([source.as_object().unwrap()], None)
    }

    #[test]
    fn test_json_lines_envelope() {
        let mut sink = JsonLinesSink::new(Vec::new(), "10.0.0.5", "000197600123")
            .with_index("storage")
            .with_sourcetype("custom:type");
        sink.emit(record("Array"));
        sink.emit(record("SRP"));
        sink.flush();
        assert_eq!(sink.written(), 2);
        assert_eq!(sink.source(), "vmax://10.0.0.5::000197600123");

        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<Value> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            json!({
                "source": "vmax://10.0.0.5::000197600123",
                "sourcetype": "custom:type",
                "index": "storage",
                "event": {
                    "reporting_level": "Array",
                    "percent_busy": 1.5,
                    "timestamp": 1000,
                    "array_id": "000197600123"
                }
            })
        );
        assert_eq!(lines[1]["event"]["reporting_level"], "SRP");
    }

    #[test]
    fn test_event_field_order_preserved() {
        let mut sink = JsonLinesSink::new(Vec::new(), "h", "a");
        sink.emit(record("Array"));
        let out = String::from_utf8(sink.into_inner()).unwrap();
        let event_start = out.find("\"event\"").unwrap();
        let level = out[event_start..].find("reporting_level").unwrap();
        let ts = out[event_start..].find("timestamp").unwrap();
        assert!(level < ts);
    }

    struct BrokenWriter;

    impl Write for BrokenWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("disk full"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::Error::other("disk full"))
        }
    }

    #[test]
    fn test_write_failure_is_not_counted() {
        let mut sink = JsonLinesSink::new(BrokenWriter, "h", "a");
        sink.emit(record("Array"));
        sink.flush();
        assert_eq!(sink.written(), 0);
    }

    #[test]
    fn test_memory_sink() {
        let mut sink = MemorySink::new();
        sink.emit(record("Host"));
        sink.emit(record("SRP"));
        sink.emit(record("Host"));
        assert_eq!(sink.records.len(), 3);
        assert_eq!(sink.with_level("Host").len(), 2);
        assert!(sink.with_level("Port").is_empty());
    }
}
