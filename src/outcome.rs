//! Benchmark Outcome Taxonomy
//!
//! The fixed, closed set of status codes shared by the compute pulse and the
//! peer bandwidth probe, with the stable integer mapping used at the caller
//! boundary.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a single benchmark call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PulseStatus {
    /// Measurement completed; the numeric result is valid.
    Ok,

    /// A device or runtime operation failed for a reason other than memory
    /// exhaustion or peer unavailability.
    RuntimeError,

    /// Device memory allocation failed.
    OutOfMemory,

    /// The requested device pair cannot establish peer access. Never
    /// produced by the compute pulse.
    PeerUnsupported,
}

impl PulseStatus {
    /// Stable integer code for the caller boundary.
    pub fn as_code(self) -> i32 {
        match self {
            PulseStatus::Ok => 0,
            PulseStatus::RuntimeError => 1,
            PulseStatus::OutOfMemory => 2,
            PulseStatus::PeerUnsupported => 3,
        }
    }

    /// Inverse of [`as_code`](Self::as_code). Unknown codes are a caller
    /// contract violation and yield `None`, never a silently-ignored case.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(PulseStatus::Ok),
            1 => Some(PulseStatus::RuntimeError),
            2 => Some(PulseStatus::OutOfMemory),
            3 => Some(PulseStatus::PeerUnsupported),
            _ => None,
        }
    }
}

impl fmt::Display for PulseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PulseStatus::Ok => write!(f, "ok"),
            PulseStatus::RuntimeError => write!(f, "runtime_error"),
            PulseStatus::OutOfMemory => write!(f, "out_of_memory"),
            PulseStatus::PeerUnsupported => write!(f, "peer_unsupported"),
        }
    }
}

/// Result of one benchmark call: a status plus a measurement that is present
/// iff the status is `Ok` — TFLOP/s for the compute pulse, GB/s for the peer
/// probe. Created fresh per call; carries no state between calls.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PulseOutcome {
    pub status: PulseStatus,
    pub measurement: Option<f64>,
}

impl PulseOutcome {
    pub fn ok(measurement: f64) -> Self {
        Self {
            status: PulseStatus::Ok,
            measurement: Some(measurement),
        }
    }

    pub fn fail(status: PulseStatus) -> Self {
        debug_assert!(status != PulseStatus::Ok);
        Self {
            status,
            measurement: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == PulseStatus::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_are_stable() {
        assert_eq!(PulseStatus::Ok.as_code(), 0);
        assert_eq!(PulseStatus::RuntimeError.as_code(), 1);
        assert_eq!(PulseStatus::OutOfMemory.as_code(), 2);
        assert_eq!(PulseStatus::PeerUnsupported.as_code(), 3);
    }

    #[test]
    fn from_code_rejects_unknown_values() {
        for code in 0..4 {
            let status = PulseStatus::from_code(code).expect("known code");
            assert_eq!(status.as_code(), code);
        }
        assert_eq!(PulseStatus::from_code(-1), None);
        assert_eq!(PulseStatus::from_code(4), None);
        assert_eq!(PulseStatus::from_code(i32::MAX), None);
    }

    #[test]
    fn ok_outcome_carries_measurement() {
        let outcome = PulseOutcome::ok(14.2);
        assert!(outcome.is_ok());
        assert_eq!(outcome.measurement, Some(14.2));
    }

    #[test]
    fn failed_outcome_has_no_measurement() {
        let outcome = PulseOutcome::fail(PulseStatus::OutOfMemory);
        assert!(!outcome.is_ok());
        assert_eq!(outcome.measurement, None);
    }
}
