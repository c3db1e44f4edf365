//! Pulse Benchmark Engine
//!
//! Device inventory plus the two benchmark operations. Every call is
//! synchronous and blocking: device work is enqueued and fully waited on
//! before the call returns, and no allocation or peer-access enablement
//! outlives its originating call, on any exit path.
//!
//! The underlying driver context is process-wide: it initializes lazily on
//! first use and is torn down at process exit. No re-initialization is
//! exposed. Calls targeting distinct devices are independent; serializing
//! access to a single device is the caller's responsibility.
//!
//! Built without the `cuda` feature the surface remains, but `device_count`
//! reports the initialization sentinel and both benchmarks report
//! `RuntimeError`.

#[cfg(feature = "cuda")]
mod compute;
#[cfg(feature = "cuda")]
mod inventory;
#[cfg(feature = "cuda")]
mod kernel;
#[cfg(feature = "cuda")]
mod peer;

#[cfg(feature = "cuda")]
pub use compute::run_compute_pulse;
#[cfg(feature = "cuda")]
pub use inventory::{device_count, enumerate_devices, DeviceInfo};
#[cfg(feature = "cuda")]
pub use peer::run_peer_check;

#[cfg(feature = "cuda")]
pub(crate) use failure::DeviceFailure;

#[cfg(feature = "cuda")]
mod failure {
    use crate::outcome::PulseStatus;
    use cudarc::driver::{sys, DriverError};

    /// A classified device-level failure: the outcome status it maps to plus
    /// the driver detail for the log line. Never crosses the public surface.
    #[derive(Debug)]
    pub(crate) struct DeviceFailure {
        pub status: PulseStatus,
        pub detail: String,
    }

    impl DeviceFailure {
        pub fn runtime(detail: impl Into<String>) -> Self {
            Self {
                status: PulseStatus::RuntimeError,
                detail: detail.into(),
            }
        }

        pub fn peer_unsupported(detail: impl Into<String>) -> Self {
            Self {
                status: PulseStatus::PeerUnsupported,
                detail: detail.into(),
            }
        }

        /// Classify a driver error: memory exhaustion maps to `OutOfMemory`,
        /// everything else to `RuntimeError`.
        pub fn from_driver(context: &str, err: DriverError) -> Self {
            let status = if err.0 == sys::cudaError_enum::CUDA_ERROR_OUT_OF_MEMORY {
                PulseStatus::OutOfMemory
            } else {
                PulseStatus::RuntimeError
            };
            Self {
                status,
                detail: format!("{}: {}", context, err),
            }
        }
    }
}

#[cfg(not(feature = "cuda"))]
mod stub {
    use crate::config::PulseConfig;
    use crate::outcome::{PulseOutcome, PulseStatus};

    /// Initialization sentinel: this build carries no CUDA support.
    pub fn device_count() -> i32 {
        -1
    }

    pub fn run_compute_pulse(device_index: i32, _config: &PulseConfig) -> PulseOutcome {
        println!(
            "[PULSE][COMPUTE] GPU {}: built without CUDA support",
            device_index
        );
        PulseOutcome::fail(PulseStatus::RuntimeError)
    }

    pub fn run_peer_check(
        src_device: i32,
        dst_device: i32,
        _config: &PulseConfig,
    ) -> PulseOutcome {
        println!(
            "[PULSE][P2P] GPU {}->{}: built without CUDA support",
            src_device, dst_device
        );
        PulseOutcome::fail(PulseStatus::RuntimeError)
    }
}

#[cfg(not(feature = "cuda"))]
pub use stub::{device_count, run_compute_pulse, run_peer_check};
