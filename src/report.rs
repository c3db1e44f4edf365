//! Pulse Report
//!
//! Structured outcome of one validation cycle, streamed as JSON by callers.
//! The measured and threshold values are the literal numbers used to make
//! the quarantine decision, suitable as direct evidence records.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level node verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Healthy,
    Straggler,
}

/// One timed compute pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSample {
    pub run: usize,
    pub elapsed_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tflops: Option<f64>,
}

/// Aggregated compute-pulse result for one device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevicePulse {
    pub device: i32,
    pub runs: Vec<RunSample>,
    pub mean_ms: f64,
    /// Coefficient of variation (σ/μ) across the runs.
    pub cv: f64,
}

/// One measured ring segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkCheck {
    pub src: i32,
    pub dst: i32,
    pub bandwidth_gbs: f64,
}

/// Evidence behind a quarantine verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureEvidence {
    pub reason: String,
    pub measured_value: f64,
    pub threshold_value: f64,
    pub unit: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PulseReport {
    /// RFC 3339 UTC timestamp of the cycle start.
    pub timestamp: String,
    pub hostname: String,
    pub gpu_arch: String,
    /// Active mean-latency ceiling, ms.
    pub threshold_ms: u64,
    pub devices: Vec<DevicePulse>,
    pub links: Vec<LinkCheck>,
    pub verdict: Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureEvidence>,
}

impl PulseReport {
    pub(crate) fn new(gpu_arch: String, threshold: Duration) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            hostname: std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string()),
            gpu_arch,
            threshold_ms: threshold.as_millis() as u64,
            devices: Vec::new(),
            links: Vec::new(),
            verdict: Verdict::Healthy,
            failure: None,
        }
    }

    pub(crate) fn mark_straggler(&mut self, evidence: FailureEvidence) {
        self.verdict = Verdict::Straggler;
        self.failure = Some(evidence);
    }

    /// Worst per-device mean latency in this cycle.
    pub fn worst_mean_ms(&self) -> f64 {
        self.devices.iter().map(|d| d.mean_ms).fold(0.0, f64::max)
    }

    /// Human-readable summary of the cycle.
    pub fn format_summary(&self) -> String {
        let mut lines = vec![
            "GPU Pulse Summary".to_string(),
            "=================".to_string(),
            format!("Host: {} [{}]", self.hostname, self.gpu_arch),
            format!("Threshold: {} ms", self.threshold_ms),
            String::new(),
            "Device Pulses:".to_string(),
        ];

        for device in &self.devices {
            lines.push(format!(
                "  GPU {}: mean={:.2}ms cv={:.3} over {} run(s)",
                device.device,
                device.mean_ms,
                device.cv,
                device.runs.len(),
            ));
        }

        if !self.links.is_empty() {
            lines.push(String::new());
            lines.push("Ring Links:".to_string());
            for link in &self.links {
                lines.push(format!(
                    "  GPU {}->{}: {:.2} GB/s",
                    link.src, link.dst, link.bandwidth_gbs
                ));
            }
        }

        lines.push(String::new());
        match (&self.verdict, &self.failure) {
            (Verdict::Healthy, _) => lines.push("Verdict: HEALTHY".to_string()),
            (Verdict::Straggler, Some(f)) => {
                lines.push("Verdict: STRAGGLER".to_string());
                lines.push(format!(
                    "  {} (measured {:.2} {} against {:.2})",
                    f.reason, f.measured_value, f.unit, f.threshold_value
                ));
            }
            (Verdict::Straggler, None) => lines.push("Verdict: STRAGGLER".to_string()),
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report() -> PulseReport {
        let mut report = PulseReport::new("NVIDIA H100".to_string(), Duration::from_millis(35));
        report.devices.push(DevicePulse {
            device: 0,
            runs: vec![
                RunSample {
                    run: 1,
                    elapsed_ms: 9.8,
                    tflops: Some(14.1),
                },
                RunSample {
                    run: 2,
                    elapsed_ms: 10.2,
                    tflops: Some(13.9),
                },
            ],
            mean_ms: 10.0,
            cv: 0.02,
        });
        report.devices.push(DevicePulse {
            device: 1,
            runs: Vec::new(),
            mean_ms: 12.5,
            cv: 0.01,
        });
        report.links.push(LinkCheck {
            src: 0,
            dst: 1,
            bandwidth_gbs: 42.7,
        });
        report
    }

    #[test]
    fn worst_mean_tracks_the_slowest_device() {
        let report = sample_report();
        assert!((report.worst_mean_ms() - 12.5).abs() < f64::EPSILON);
    }

    #[test]
    fn healthy_summary_lists_devices_and_links() {
        let summary = sample_report().format_summary();
        assert!(summary.contains("GPU 0: mean=10.00ms"));
        assert!(summary.contains("GPU 0->1: 42.70 GB/s"));
        assert!(summary.contains("Verdict: HEALTHY"));
    }

    #[test]
    fn straggler_summary_carries_evidence() {
        let mut report = sample_report();
        report.mark_straggler(FailureEvidence {
            reason: "link GPU 0->1 degraded".to_string(),
            measured_value: 1.2,
            threshold_value: 5.0,
            unit: "gbs".to_string(),
        });

        let summary = report.format_summary();
        assert_eq!(report.verdict, Verdict::Straggler);
        assert!(summary.contains("Verdict: STRAGGLER"));
        assert!(summary.contains("link GPU 0->1 degraded"));
    }

    #[test]
    fn failure_field_is_omitted_from_healthy_json() {
        let json = serde_json::to_string(&sample_report()).expect("serialize");
        assert!(!json.contains("\"failure\""));
        assert!(json.contains("\"verdict\":\"healthy\""));
    }
}
