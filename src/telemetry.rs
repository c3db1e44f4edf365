//! Pulse Telemetry
//!
//! Append-only JSONL event log. Each entry carries a microsecond timestamp
//! and the emitting component, so cycles from repeated invocations interleave
//! cleanly in one file.

use crate::errors::*;
use crate::outcome::PulseStatus;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

/// Events emitted over one validation cycle.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PulseEvent {
    ComputePulse {
        device: i32,
        run: usize,
        elapsed_ms: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        tflops: Option<f64>,
    },
    PeerCheck {
        src: i32,
        dst: i32,
        status: PulseStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        bandwidth_gbs: Option<f64>,
    },
    Quarantine {
        reason: String,
        measured_value: f64,
        threshold_value: f64,
        unit: String,
    },
}

#[derive(Clone)]
pub struct TelemetryLogger {
    component: String,
    writer: Arc<Mutex<std::fs::File>>,
}

impl TelemetryLogger {
    pub fn new(component: &str) -> Result<Self> {
        Self::with_path(component, Path::new("telemetry/gpu_pulse.jsonl"))
    }

    pub fn with_path(component: &str, path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            component: component.to_string(),
            writer: Arc::new(Mutex::new(file)),
        })
    }

    /// Append one event. Write failures are reported to stderr rather than
    /// failing the pulse: telemetry never gates a health verdict.
    pub fn log<T: Serialize>(&self, event: T) {
        if let Ok(mut writer) = self.writer.lock() {
            let entry = serde_json::json!({
                "timestamp_us": SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_micros())
                    .unwrap_or_default(),
                "component": self.component,
                "event": event,
            });
            if let Err(err) = writeln!(writer, "{}", entry) {
                eprintln!("telemetry write failed: {}", err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_append_as_jsonl() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("pulse.jsonl");
        let logger = TelemetryLogger::with_path("pulse", &path).expect("logger");

        logger.log(PulseEvent::ComputePulse {
            device: 0,
            run: 1,
            elapsed_ms: 10.5,
            tflops: Some(14.2),
        });
        logger.log(PulseEvent::PeerCheck {
            src: 0,
            dst: 1,
            status: PulseStatus::PeerUnsupported,
            bandwidth_gbs: None,
        });

        let raw = std::fs::read_to_string(&path).expect("read log");
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).expect("valid json");
        assert_eq!(first["component"], "pulse");
        assert_eq!(first["event"]["type"], "compute_pulse");
        assert_eq!(first["event"]["tflops"], 14.2);

        let second: serde_json::Value = serde_json::from_str(lines[1]).expect("valid json");
        assert_eq!(second["event"]["status"], "peer_unsupported");
        assert!(second["event"].get("bandwidth_gbs").is_none());
    }
}
