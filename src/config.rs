//! Pulse Workload Configuration
//!
//! Named configuration for the workload shape and health thresholds.
//! Defaults mirror the reference workload: a 2048x2048 single-precision GEMM
//! and a 100 MiB peer transfer. Tests substitute smaller workloads without
//! changing the warm-up + timed-pass protocol.
//!
//! Resolution order for each threshold:
//! 1. Environment override (operator knob, always wins)
//! 2. TOML profile, when one is loaded
//! 3. Built-in default

use crate::errors::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_GEMM_DIM: usize = 2048;
pub const DEFAULT_TRANSFER_BYTES: usize = 100 * 1024 * 1024;
pub const DEFAULT_PULSE_RUNS: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PulseConfig {
    /// Square matrix dimension for the GEMM workload.
    pub gemm_dim: usize,

    /// Peer-to-peer transfer buffer size in bytes.
    pub transfer_bytes: usize,

    /// Timed GEMM passes per device per validation cycle.
    pub pulse_runs: usize,

    /// Mean-latency ceiling per device in milliseconds. `None` selects the
    /// architecture-calibrated value at run time.
    pub straggler_threshold_ms: Option<u64>,

    /// Coefficient-of-variation ceiling across runs on a single device.
    pub max_cv: f64,

    /// Minimum acceptable peer bandwidth on a ring segment, GB/s.
    pub min_p2p_bandwidth_gbs: f64,

    /// Idle temperature ceiling at pre-flight, Celsius.
    pub max_idle_temp_c: i64,

    /// Post-pulse SM clock floor as a fraction of the device maximum.
    pub min_clock_fraction: f64,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            gemm_dim: DEFAULT_GEMM_DIM,
            transfer_bytes: DEFAULT_TRANSFER_BYTES,
            pulse_runs: DEFAULT_PULSE_RUNS,
            straggler_threshold_ms: None,
            max_cv: 0.20,
            min_p2p_bandwidth_gbs: 5.0,
            max_idle_temp_c: 70,
            min_clock_fraction: 0.5,
        }
    }
}

impl PulseConfig {
    /// Built-in defaults with environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply operator overrides from the environment:
    /// `PULSE_THRESHOLD_MS`, `PULSE_CV_MAX`, `P2P_MIN_GBS`, `IDLE_TEMP_MAX`.
    /// Unparseable or non-positive values are ignored.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_u64("PULSE_THRESHOLD_MS") {
            self.straggler_threshold_ms = Some(v);
        }
        if let Some(v) = env_f64("PULSE_CV_MAX") {
            self.max_cv = v;
        }
        if let Some(v) = env_f64("P2P_MIN_GBS") {
            self.min_p2p_bandwidth_gbs = v;
        }
        if let Some(v) = env_i64("IDLE_TEMP_MAX") {
            self.max_idle_temp_c = v;
        }
        self
    }

    /// Load a TOML profile and validate it.
    ///
    /// # Errors
    /// `PulseError::Io` when the file cannot be read, `PulseError::Config`
    /// when it fails to parse or validate.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: PulseConfig = toml::from_str(&raw)
            .map_err(|e| PulseError::Config(format!("failed to parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.gemm_dim == 0 {
            return Err(PulseError::Config("gemm_dim must be > 0".into()));
        }
        if self.transfer_bytes == 0 {
            return Err(PulseError::Config("transfer_bytes must be > 0".into()));
        }
        if self.pulse_runs == 0 {
            return Err(PulseError::Config("pulse_runs must be > 0".into()));
        }
        if self.max_cv <= 0.0 {
            return Err(PulseError::Config("max_cv must be > 0".into()));
        }
        if self.min_p2p_bandwidth_gbs <= 0.0 {
            return Err(PulseError::Config("min_p2p_bandwidth_gbs must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.min_clock_fraction) {
            return Err(PulseError::Config(
                "min_clock_fraction must be within [0, 1]".into(),
            ));
        }
        Ok(())
    }

    /// Floating-point operations in one GEMM pass (2·n³ multiply-adds).
    pub fn gemm_flops(&self) -> f64 {
        2.0 * (self.gemm_dim as f64).powi(3)
    }

    /// The configured straggler ceiling, when one is pinned.
    pub(crate) fn straggler_threshold(&self) -> Option<Duration> {
        self.straggler_threshold_ms.map(Duration::from_millis)
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|v| *v > 0)
}

fn env_i64(key: &str) -> Option<i64> {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .filter(|v| *v > 0)
}

fn env_f64(key: &str) -> Option<f64> {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| *v > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn defaults_match_reference_workload() {
        let config = PulseConfig::default();
        assert_eq!(config.gemm_dim, 2048);
        assert_eq!(config.transfer_bytes, 100 * 1024 * 1024);
        assert_eq!(config.pulse_runs, 5);
        assert_eq!(config.straggler_threshold_ms, None);
        assert!((config.max_cv - 0.20).abs() < f64::EPSILON);
        assert!((config.min_p2p_bandwidth_gbs - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn gemm_flops_counts_multiply_adds() {
        let mut config = PulseConfig::default();
        config.gemm_dim = 4;
        assert!((config.gemm_flops() - 128.0).abs() < f64::EPSILON);
    }

    #[test]
    #[serial]
    fn env_overrides_win() {
        std::env::set_var("PULSE_THRESHOLD_MS", "250");
        std::env::set_var("PULSE_CV_MAX", "0.35");
        std::env::set_var("P2P_MIN_GBS", "12.5");
        std::env::set_var("IDLE_TEMP_MAX", "60");

        let config = PulseConfig::from_env();
        assert_eq!(config.straggler_threshold_ms, Some(250));
        assert!((config.max_cv - 0.35).abs() < f64::EPSILON);
        assert!((config.min_p2p_bandwidth_gbs - 12.5).abs() < f64::EPSILON);
        assert_eq!(config.max_idle_temp_c, 60);

        for key in [
            "PULSE_THRESHOLD_MS",
            "PULSE_CV_MAX",
            "P2P_MIN_GBS",
            "IDLE_TEMP_MAX",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn invalid_env_values_are_ignored() {
        std::env::set_var("PULSE_THRESHOLD_MS", "not-a-number");
        std::env::set_var("PULSE_CV_MAX", "-1.0");

        let config = PulseConfig::from_env();
        assert_eq!(config.straggler_threshold_ms, None);
        assert!((config.max_cv - 0.20).abs() < f64::EPSILON);

        std::env::remove_var("PULSE_THRESHOLD_MS");
        std::env::remove_var("PULSE_CV_MAX");
    }

    #[test]
    fn toml_profile_loads_partial_fields() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "gemm_dim = 512\ntransfer_bytes = 1048576\nmin_p2p_bandwidth_gbs = 8.0"
        )
        .expect("write profile");

        let config = PulseConfig::from_file(file.path()).expect("load profile");
        assert_eq!(config.gemm_dim, 512);
        assert_eq!(config.transfer_bytes, 1048576);
        assert!((config.min_p2p_bandwidth_gbs - 8.0).abs() < f64::EPSILON);
        // Unspecified fields keep their defaults.
        assert_eq!(config.pulse_runs, 5);
    }

    #[test]
    fn toml_profile_rejects_unknown_fields() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "gem_dim = 512").expect("write profile");

        assert!(PulseConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn validate_rejects_degenerate_workloads() {
        let mut config = PulseConfig::default();
        config.gemm_dim = 0;
        assert!(config.validate().is_err());

        let mut config = PulseConfig::default();
        config.pulse_runs = 0;
        assert!(config.validate().is_err());

        let mut config = PulseConfig::default();
        config.min_clock_fraction = 1.5;
        assert!(config.validate().is_err());
    }
}
