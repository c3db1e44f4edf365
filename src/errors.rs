//! Pulse Error Types
//!
//! Central error enum for the validation pipeline. Engine-level device
//! failures stay inside the `PulseOutcome` status taxonomy; errors here cover
//! configuration, system checks, and the quarantine-grade pulse failures.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PulseError>;

#[derive(Debug, Error)]
pub enum PulseError {
    /// An underlying CUDA operation failed during orchestration.
    #[error("GPU error: {0}")]
    Gpu(String),

    #[error("config error: {0}")]
    Config(String),

    /// A pre-flight disqualifier fired before any workload ran.
    #[error("pre-flight failure: {0}")]
    Preflight(String),

    /// Mean GEMM latency on a device exceeded the threshold, or the
    /// post-pulse clock check confirmed a power-derated state under load.
    #[error("straggler detected: GPU {device} mean pulse latency {measured:.2}{unit} exceeds {threshold:.2}{unit}")]
    StragglerDetected {
        device: i32,
        measured: f64,
        threshold: f64,
        unit: &'static str,
    },

    /// Mean latency acceptable but the coefficient of variation across runs
    /// exceeded the ceiling. High CV is the primary signature of fail-slow
    /// GPUs: they fail erratically rather than uniformly slowly.
    #[error("straggler detected: GPU {device} high run-to-run variance (cv={measured:.3} > {threshold:.3})")]
    HighVariance {
        device: i32,
        measured: f64,
        threshold: f64,
        unit: &'static str,
    },

    /// Peer bandwidth on a ring segment below the minimum, or peer access
    /// reported unavailable. An interconnect failure that lets GEMM pass but
    /// stalls collective operations is the canonical silent-straggler case.
    #[error("straggler detected: link GPU {src}->{dst} degraded ({measured:.2} GB/s < {threshold:.1} GB/s minimum)")]
    InterconnectDegraded {
        src: i32,
        dst: i32,
        measured: f64,
        threshold: f64,
        unit: &'static str,
    },

    #[error("built without CUDA support: rebuild with --features cuda")]
    CudaUnavailable,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PulseError {
    /// Whether this failure should quarantine the node. Covers all three
    /// straggler modes so callers use a single predicate.
    pub fn is_quarantine(&self) -> bool {
        matches!(
            self,
            PulseError::StragglerDetected { .. }
                | PulseError::HighVariance { .. }
                | PulseError::InterconnectDegraded { .. }
        )
    }

    /// The measured value, threshold, and unit behind a quarantine decision,
    /// for structured evidence logging.
    pub fn evidence(&self) -> Option<(f64, f64, &'static str)> {
        match *self {
            PulseError::StragglerDetected {
                measured,
                threshold,
                unit,
                ..
            }
            | PulseError::HighVariance {
                measured,
                threshold,
                unit,
                ..
            }
            | PulseError::InterconnectDegraded {
                measured,
                threshold,
                unit,
                ..
            } => Some((measured, threshold, unit)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quarantine_predicate_covers_all_straggler_modes() {
        let straggler = PulseError::StragglerDetected {
            device: 0,
            measured: 2500.0,
            threshold: 500.0,
            unit: "ms",
        };
        let variance = PulseError::HighVariance {
            device: 1,
            measured: 0.35,
            threshold: 0.20,
            unit: "cv",
        };
        let link = PulseError::InterconnectDegraded {
            src: 2,
            dst: 3,
            measured: 1.2,
            threshold: 5.0,
            unit: "gbs",
        };

        assert!(straggler.is_quarantine());
        assert!(variance.is_quarantine());
        assert!(link.is_quarantine());
        assert!(!PulseError::Config("bad".into()).is_quarantine());
        assert!(!PulseError::Gpu("boom".into()).is_quarantine());
    }

    #[test]
    fn evidence_carries_decision_numbers() {
        let link = PulseError::InterconnectDegraded {
            src: 2,
            dst: 3,
            measured: 1.2,
            threshold: 5.0,
            unit: "gbs",
        };
        assert_eq!(link.evidence(), Some((1.2, 5.0, "gbs")));
        assert_eq!(PulseError::CudaUnavailable.evidence(), None);
    }
}
