//! System-Level Device Checks
//!
//! nvidia-smi queries that bracket the pulse workload: pre-flight hard
//! disqualifiers before any kernel runs, and post-pulse clock validation.
//! Every check degrades to a no-op when nvidia-smi is unavailable, so the
//! pulse still runs on hosts without the tool.

use crate::config::PulseConfig;
use crate::errors::*;
use std::process::Command;
use std::time::Duration;

/// Per-device stats parsed from one nvidia-smi CSV row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct SmiStats {
    sm_clock_mhz: i64,
    max_sm_clock_mhz: i64,
    temp_c: i64,
    ecc_errors: i64,
}

/// Name of GPU 0 as reported by nvidia-smi, or "unknown" when the tool is
/// unavailable.
pub fn detect_gpu_name() -> String {
    let output = Command::new("nvidia-smi")
        .args(["--query-gpu=name", "--format=csv,noheader", "--id=0"])
        .output();

    match output {
        Ok(out) if out.status.success() => {
            let name = String::from_utf8_lossy(&out.stdout).trim().to_string();
            if name.is_empty() {
                "unknown".to_string()
            } else {
                name
            }
        }
        _ => "unknown".to_string(),
    }
}

/// Architecture-calibrated mean-latency ceiling for the default GEMM
/// workload. Thresholds leave roughly 4-5x headroom over nominal FP32 GEMM
/// latency at peak clocks on each architecture, so a healthy device never
/// trips while a derated one does.
pub fn calibrated_threshold() -> Duration {
    threshold_for_name(&detect_gpu_name())
}

fn threshold_for_name(name: &str) -> Duration {
    let name = name.to_uppercase();
    if name.contains("B200") || name.contains("GB200") {
        Duration::from_millis(15)
    } else if name.contains("H100") || name.contains("H200") {
        Duration::from_millis(35)
    } else if name.contains("A100") {
        Duration::from_millis(100)
    } else {
        // Unrecognized or unavailable hardware.
        Duration::from_millis(500)
    }
}

/// Check every visible device for hard disqualifiers before the workload
/// runs:
/// - uncorrectable ECC errors since last boot (memory faults — no pulse
///   needed to quarantine)
/// - idle temperature above the ceiling (thermal recovery incomplete)
///
/// Proceeds silently when nvidia-smi is absent or the devices are not yet
/// visible to it.
pub fn preflight(config: &PulseConfig) -> Result<()> {
    let stats = match query_all_smi() {
        Some(stats) => stats,
        None => return Ok(()),
    };

    for (i, s) in stats.iter().enumerate() {
        if s.ecc_errors > 0 {
            return Err(PulseError::Preflight(format!(
                "GPU {}: {} uncorrectable ECC error(s) since last boot",
                i, s.ecc_errors
            )));
        }
        if s.temp_c > config.max_idle_temp_c {
            return Err(PulseError::Preflight(format!(
                "GPU {}: idle temperature {}C exceeds {}C ceiling",
                i, s.temp_c, config.max_idle_temp_c
            )));
        }
    }
    Ok(())
}

/// Confirm each device held its SM clock under load. A clock still below
/// `min_clock_fraction` of maximum right after the pulse workload means the
/// device is stuck in a power-derated state.
pub fn validate_clocks(config: &PulseConfig) -> Result<()> {
    let stats = match query_all_smi() {
        Some(stats) => stats,
        None => return Ok(()),
    };

    for (i, s) in stats.iter().enumerate() {
        if s.max_sm_clock_mhz == 0 {
            // Driver did not report a maximum clock.
            continue;
        }
        let floor = (s.max_sm_clock_mhz as f64 * config.min_clock_fraction) as i64;
        if s.sm_clock_mhz < floor {
            return Err(PulseError::StragglerDetected {
                device: i as i32,
                measured: s.sm_clock_mhz as f64,
                threshold: floor as f64,
                unit: "mhz",
            });
        }
    }
    Ok(())
}

/// Stats for every visible device, in ascending device order, or `None` when
/// nvidia-smi is unavailable or its output is malformed.
fn query_all_smi() -> Option<Vec<SmiStats>> {
    let output = Command::new("nvidia-smi")
        .args([
            "--query-gpu=clocks.sm,clocks.max.sm,temperature.gpu,ecc.errors.uncorrected.aggregate.total",
            "--format=csv,noheader,nounits",
        ])
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }
    parse_smi_csv(&String::from_utf8_lossy(&output.stdout))
}

fn parse_smi_csv(raw: &str) -> Option<Vec<SmiStats>> {
    let mut result = Vec::new();
    for line in raw.trim().lines() {
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(", ").collect();
        if fields.len() != 4 {
            return None;
        }
        result.push(SmiStats {
            sm_clock_mhz: parse_field(fields[0]),
            max_sm_clock_mhz: parse_field(fields[1]),
            temp_c: parse_field(fields[2]),
            ecc_errors: parse_field(fields[3]),
        });
    }
    Some(result)
}

/// "N/A" and "[N/A]" read as 0, matching fields the driver cannot report.
fn parse_field(s: &str) -> i64 {
    let s = s.trim();
    if s == "N/A" || s == "[N/A]" {
        return 0;
    }
    s.parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_multi_device_csv() {
        let raw = "1980, 1980, 34, 0\n1410, 1980, 41, 0\n";
        let stats = parse_smi_csv(raw).expect("well-formed csv");
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].sm_clock_mhz, 1980);
        assert_eq!(stats[1].sm_clock_mhz, 1410);
        assert_eq!(stats[1].temp_c, 41);
    }

    #[test]
    fn not_available_fields_read_as_zero() {
        let raw = "1980, 1980, 34, [N/A]\n";
        let stats = parse_smi_csv(raw).expect("well-formed csv");
        assert_eq!(stats[0].ecc_errors, 0);
    }

    #[test]
    fn malformed_rows_reject_the_whole_query() {
        assert_eq!(parse_smi_csv("1980, 1980, 34\n"), None);
        assert_eq!(parse_smi_csv("garbage row with, too, many, fields, here"), None);
    }

    #[test]
    fn empty_output_yields_no_devices() {
        let stats = parse_smi_csv("").expect("empty output is well-formed");
        assert!(stats.is_empty());
    }

    #[test]
    fn thresholds_follow_architecture() {
        assert_eq!(threshold_for_name("NVIDIA B200"), Duration::from_millis(15));
        assert_eq!(
            threshold_for_name("NVIDIA GB200 NVL72"),
            Duration::from_millis(15)
        );
        assert_eq!(
            threshold_for_name("NVIDIA H100 80GB HBM3"),
            Duration::from_millis(35)
        );
        assert_eq!(threshold_for_name("NVIDIA H200"), Duration::from_millis(35));
        assert_eq!(
            threshold_for_name("NVIDIA A100-SXM4-80GB"),
            Duration::from_millis(100)
        );
        assert_eq!(
            threshold_for_name("GeForce RTX 4090"),
            Duration::from_millis(500)
        );
        assert_eq!(threshold_for_name("unknown"), Duration::from_millis(500));
    }

    #[test]
    fn threshold_match_is_case_insensitive() {
        assert_eq!(
            threshold_for_name("nvidia h100 pcie"),
            Duration::from_millis(35)
        );
    }
}
