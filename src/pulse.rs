//! Pulse Orchestration
//!
//! The full node validation cycle: pre-flight system check, N timed compute
//! pulses per device with mean/CV gating, a peer bandwidth sweep around the
//! device ring, and post-pulse clock validation. The first failing check
//! quarantines the node.

use crate::config::PulseConfig;
use crate::engine;
use crate::errors::*;
use crate::outcome::PulseStatus;
use crate::report::{DevicePulse, FailureEvidence, LinkCheck, PulseReport, RunSample};
use crate::syscheck;
use crate::telemetry::{PulseEvent, TelemetryLogger};
use std::time::{Duration, Instant};

/// Execute the full validation cycle against every visible device:
///
/// 1. Pre-flight: ECC and idle-temperature check on all devices
/// 2. Per device: `pulse_runs` timed GEMM passes, gated on mean latency and
///    coefficient of variation
/// 3. Peer ring `0->1->...->N-1->0`: bandwidth check on every segment
/// 4. Post-pulse: SM clock validation on all devices
///
/// Returns the populated report on a healthy node, or the first
/// quarantine-grade failure. Any device failing any check quarantines the
/// entire node.
pub fn run_pulse(config: &PulseConfig) -> Result<PulseReport> {
    run_pulse_with_telemetry(config, None)
}

/// [`run_pulse`] with per-run events appended to a telemetry log, including
/// the quarantine evidence record when the cycle fails.
pub fn run_pulse_with_telemetry(
    config: &PulseConfig,
    telemetry: Option<&TelemetryLogger>,
) -> Result<PulseReport> {
    let result = pulse_cycle(config, telemetry);

    if let (Err(err), Some(logger)) = (&result, telemetry) {
        if let Some((measured, threshold, unit)) = err.evidence() {
            logger.log(PulseEvent::Quarantine {
                reason: err.to_string(),
                measured_value: measured,
                threshold_value: threshold,
                unit: unit.to_string(),
            });
        }
    }
    result
}

/// Run the cycle and fold the outcome into a report instead of propagating
/// failures: any failing check yields a `Straggler` verdict with the decision
/// evidence attached. Intended for callers that ship the report as-is.
pub fn run_pulse_to_report(config: &PulseConfig) -> PulseReport {
    match run_pulse(config) {
        Ok(report) => report,
        Err(err) => {
            let (measured_value, threshold_value, unit) =
                err.evidence().unwrap_or((0.0, 0.0, ""));
            let mut report = PulseReport::new(syscheck::detect_gpu_name(), resolve_threshold(config));
            report.mark_straggler(FailureEvidence {
                reason: err.to_string(),
                measured_value,
                threshold_value,
                unit: unit.to_string(),
            });
            report
        }
    }
}

fn pulse_cycle(config: &PulseConfig, telemetry: Option<&TelemetryLogger>) -> Result<PulseReport> {
    config.validate()?;
    if cfg!(not(feature = "cuda")) {
        return Err(PulseError::CudaUnavailable);
    }
    syscheck::preflight(config)?;

    let count = engine::device_count();
    if count < 0 {
        return Err(PulseError::Gpu(
            "CUDA driver initialization failed".to_string(),
        ));
    }
    if count == 0 {
        return Err(PulseError::Gpu("no CUDA devices visible".to_string()));
    }

    let threshold = resolve_threshold(config);
    println!(
        "[PULSE] starting validation cycle: {} device(s), threshold {}ms",
        count,
        threshold.as_millis()
    );

    let mut report = PulseReport::new(syscheck::detect_gpu_name(), threshold);

    for device in 0..count {
        report
            .devices
            .push(run_device_pulse(device, config, threshold, telemetry)?);
    }

    // Ring topology 0->1, 1->2, ..., N-1->0: one sweep crosses every link
    // segment, including links that do not involve GPU 0, which a star
    // check from GPU 0 would miss. Single-device nodes have no links.
    if count > 1 {
        for i in 0..count {
            report
                .links
                .push(check_link(i, (i + 1) % count, config, telemetry)?);
        }
    }

    syscheck::validate_clocks(config)?;

    println!(
        "[PULSE] cycle complete: worst mean {:.2}ms across {} device(s)",
        report.worst_mean_ms(),
        count
    );
    Ok(report)
}

/// Active straggler ceiling: pinned configuration value when present,
/// architecture-calibrated otherwise.
fn resolve_threshold(config: &PulseConfig) -> Duration {
    config
        .straggler_threshold()
        .unwrap_or_else(syscheck::calibrated_threshold)
}

/// Run `pulse_runs` timed compute passes on one device and gate the result
/// on mean latency and run-to-run variance.
fn run_device_pulse(
    device: i32,
    config: &PulseConfig,
    threshold: Duration,
    telemetry: Option<&TelemetryLogger>,
) -> Result<DevicePulse> {
    let mut durations = Vec::with_capacity(config.pulse_runs);
    let mut samples = Vec::with_capacity(config.pulse_runs);

    for run in 1..=config.pulse_runs {
        let start = Instant::now();
        let outcome = engine::run_compute_pulse(device, config);
        let elapsed = start.elapsed();

        match outcome.status {
            PulseStatus::Ok => {}
            PulseStatus::OutOfMemory => {
                return Err(PulseError::Gpu(format!(
                    "out of device memory on GPU {} run {}",
                    device, run
                )))
            }
            status => {
                return Err(PulseError::Gpu(format!(
                    "device failure on GPU {} run {} ({})",
                    device, run, status
                )))
            }
        }

        if let Some(logger) = telemetry {
            logger.log(PulseEvent::ComputePulse {
                device,
                run,
                elapsed_ms: elapsed.as_secs_f64() * 1e3,
                tflops: outcome.measurement,
            });
        }

        durations.push(elapsed);
        samples.push(RunSample {
            run,
            elapsed_ms: elapsed.as_secs_f64() * 1e3,
            tflops: outcome.measurement,
        });
    }

    let (mean, cv) = compute_stats(&durations);
    let mean_ms = mean.as_secs_f64() * 1e3;

    if mean > threshold {
        return Err(PulseError::StragglerDetected {
            device,
            measured: mean_ms,
            threshold: threshold.as_millis() as f64,
            unit: "ms",
        });
    }
    if cv > config.max_cv {
        return Err(PulseError::HighVariance {
            device,
            measured: cv,
            threshold: config.max_cv,
            unit: "cv",
        });
    }

    Ok(DevicePulse {
        device,
        runs: samples,
        mean_ms,
        cv,
    })
}

/// Probe one ring segment and gate it on the bandwidth floor. Unsupported
/// peer access and low bandwidth both quarantine: a missing link and a
/// crawling link are the same operational fact.
fn check_link(
    src: i32,
    dst: i32,
    config: &PulseConfig,
    telemetry: Option<&TelemetryLogger>,
) -> Result<LinkCheck> {
    let outcome = engine::run_peer_check(src, dst, config);

    if let Some(logger) = telemetry {
        logger.log(PulseEvent::PeerCheck {
            src,
            dst,
            status: outcome.status,
            bandwidth_gbs: outcome.measurement,
        });
    }

    match outcome.status {
        PulseStatus::Ok => {
            let bandwidth_gbs = outcome.measurement.unwrap_or(0.0);
            if bandwidth_gbs < config.min_p2p_bandwidth_gbs {
                return Err(PulseError::InterconnectDegraded {
                    src,
                    dst,
                    measured: bandwidth_gbs,
                    threshold: config.min_p2p_bandwidth_gbs,
                    unit: "gbs",
                });
            }
            Ok(LinkCheck {
                src,
                dst,
                bandwidth_gbs,
            })
        }
        // Peer access unavailable, or the probe failed outright.
        _ => Err(PulseError::InterconnectDegraded {
            src,
            dst,
            measured: 0.0,
            threshold: config.min_p2p_bandwidth_gbs,
            unit: "gbs",
        }),
    }
}

/// Mean duration and coefficient of variation (σ/μ) across runs.
pub(crate) fn compute_stats(durations: &[Duration]) -> (Duration, f64) {
    if durations.is_empty() {
        return (Duration::ZERO, 0.0);
    }

    let sum: u128 = durations.iter().map(|d| d.as_nanos()).sum();
    let mean_ns = sum / durations.len() as u128;

    let variance = durations
        .iter()
        .map(|d| {
            let delta = d.as_nanos() as f64 - mean_ns as f64;
            delta * delta
        })
        .sum::<f64>()
        / durations.len() as f64;

    let mean = Duration::from_nanos(mean_ns as u64);
    let cv = if mean_ns > 0 {
        variance.sqrt() / mean_ns as f64
    } else {
        0.0
    };
    (mean, cv)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_runs_have_zero_variance() {
        let durations = vec![Duration::from_millis(10); 5];
        let (mean, cv) = compute_stats(&durations);
        assert_eq!(mean, Duration::from_millis(10));
        assert!(cv.abs() < f64::EPSILON);
    }

    #[test]
    fn stats_match_hand_computed_values() {
        let durations = vec![
            Duration::from_millis(8),
            Duration::from_millis(10),
            Duration::from_millis(12),
        ];
        let (mean, cv) = compute_stats(&durations);
        assert_eq!(mean, Duration::from_millis(10));
        // σ = sqrt(((−2)² + 0² + 2²)/3) ms, μ = 10 ms
        let expected_cv = (8.0f64 / 3.0).sqrt() / 10.0;
        assert!((cv - expected_cv).abs() < 1e-9);
    }

    #[test]
    fn fail_slow_pattern_produces_high_cv() {
        // One erratic run among steady ones: acceptable mean, high sigma.
        let durations = vec![
            Duration::from_millis(10),
            Duration::from_millis(10),
            Duration::from_millis(10),
            Duration::from_millis(10),
            Duration::from_millis(40),
        ];
        let (mean, cv) = compute_stats(&durations);
        assert!(mean < Duration::from_millis(20));
        assert!(cv > 0.20, "cv={} should exceed the default ceiling", cv);
    }

    #[test]
    fn empty_input_is_harmless() {
        let (mean, cv) = compute_stats(&[]);
        assert_eq!(mean, Duration::ZERO);
        assert_eq!(cv, 0.0);
    }
}
