//! GPU health pulse: compute and interconnect benchmarks for fleet validation.
//!
//! Exercises every CUDA-visible device with a fixed-size GEMM workload and
//! probes peer-to-peer bandwidth around the device ring, classifying results
//! against calibrated thresholds. A node failing any check is flagged for
//! quarantine before it is scheduled real work.
//!
//! The benchmark engine ([`engine`]) is a small synchronous surface — device
//! inventory, compute pulse, peer probe — usable on its own through the
//! [`PulseOutcome`] status taxonomy; [`run_pulse`] layers the full
//! validation protocol (multi-run statistics, ring sweep, system checks) on
//! top.
//!
//! CUDA support is gated behind the `cuda` feature. Without it the crate
//! still builds and the engine reports every benchmark as unavailable.

pub mod config;
pub mod engine;
pub mod errors;
pub mod outcome;
pub mod pulse;
pub mod report;
pub mod syscheck;
pub mod telemetry;

pub use config::PulseConfig;
pub use engine::{device_count, run_compute_pulse, run_peer_check};
#[cfg(feature = "cuda")]
pub use engine::{enumerate_devices, DeviceInfo};
pub use errors::{PulseError, Result};
pub use outcome::{PulseOutcome, PulseStatus};
pub use pulse::{run_pulse, run_pulse_to_report, run_pulse_with_telemetry};
pub use report::{PulseReport, Verdict};
pub use telemetry::{PulseEvent, TelemetryLogger};
