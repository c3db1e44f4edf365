//! Peer Bandwidth Probe
//!
//! Verifies peer-access capability between a device pair, then times a large
//! device-to-device copy over the link. Peer-access enablement is scoped to
//! the call through an RAII guard, so repeated probes never accumulate
//! link-enablement state.

use super::DeviceFailure;
use crate::config::PulseConfig;
use crate::outcome::PulseOutcome;
use cudarc::driver::{sys, CudaDevice, CudaSlice, DevicePtr};
use std::sync::Arc;
use std::time::Instant;

/// Revokes peer access on drop. Enablement that pre-existed the probe
/// (`PEER_ACCESS_ALREADY_ENABLED`) is left in place.
struct PeerAccessGuard {
    src_ctx: sys::CUcontext,
    dst_ctx: sys::CUcontext,
    owned: bool,
}

impl PeerAccessGuard {
    /// Enable access from `src`'s context to the memory of `dst`.
    fn enable(src: &Arc<CudaDevice>, dst: &Arc<CudaDevice>) -> Result<Self, DeviceFailure> {
        let src_ctx = src.cu_primary_ctx();
        let dst_ctx = dst.cu_primary_ctx();

        let rc = unsafe { sys::cuCtxSetCurrent(src_ctx) };
        if rc != sys::cudaError_enum::CUDA_SUCCESS {
            return Err(DeviceFailure::runtime(format!(
                "cuCtxSetCurrent failed: {:?}",
                rc
            )));
        }

        let rc = unsafe { sys::cuCtxEnablePeerAccess(dst_ctx, 0) };
        match rc {
            sys::cudaError_enum::CUDA_SUCCESS => Ok(Self {
                src_ctx,
                dst_ctx,
                owned: true,
            }),
            sys::cudaError_enum::CUDA_ERROR_PEER_ACCESS_ALREADY_ENABLED => Ok(Self {
                src_ctx,
                dst_ctx,
                owned: false,
            }),
            sys::cudaError_enum::CUDA_ERROR_PEER_ACCESS_UNSUPPORTED => Err(
                DeviceFailure::peer_unsupported("peer access enable refused by driver"),
            ),
            other => Err(DeviceFailure::runtime(format!(
                "cuCtxEnablePeerAccess failed: {:?}",
                other
            ))),
        }
    }
}

impl Drop for PeerAccessGuard {
    fn drop(&mut self) {
        if !self.owned {
            return;
        }
        unsafe {
            sys::cuCtxSetCurrent(self.src_ctx);
            sys::cuCtxDisablePeerAccess(self.dst_ctx);
        }
    }
}

/// Probe the peer link from `src_device` to `dst_device`.
///
/// The capability query runs before any allocation: a pair without a peer
/// path returns `PeerUnsupported` immediately. A supported link is measured
/// with one warm-up copy (amortizing link setup and page-table population)
/// and one timed copy of the full buffer; `Ok` outcomes carry unidirectional
/// bandwidth in GB/s.
///
/// A link that is functional but slow still reports `Ok` with the low
/// number; thresholding degraded links is the caller's decision. Passing the
/// same index twice measures local device bandwidth rather than failing.
pub fn run_peer_check(src_device: i32, dst_device: i32, config: &PulseConfig) -> PulseOutcome {
    match peer_check(src_device, dst_device, config) {
        Ok(gbs) => {
            println!(
                "[PULSE][P2P] GPU {}->{}: {:.2} GB/s ({} MiB transfer)",
                src_device,
                dst_device,
                gbs,
                config.transfer_bytes / (1024 * 1024)
            );
            PulseOutcome::ok(gbs)
        }
        Err(failure) => {
            println!(
                "[PULSE][P2P] GPU {}->{}: {} ({})",
                src_device, dst_device, failure.status, failure.detail
            );
            PulseOutcome::fail(failure.status)
        }
    }
}

fn peer_check(src_device: i32, dst_device: i32, config: &PulseConfig) -> Result<f64, DeviceFailure> {
    if src_device < 0 || dst_device < 0 {
        return Err(DeviceFailure::runtime(format!(
            "negative device index in pair ({}, {})",
            src_device, dst_device
        )));
    }

    // Capability gate, before any allocation.
    if src_device != dst_device {
        let mut can_access = 0i32;
        let rc = unsafe { sys::cuDeviceCanAccessPeer(&mut can_access, src_device, dst_device) };
        if rc != sys::cudaError_enum::CUDA_SUCCESS {
            return Err(DeviceFailure::runtime(format!(
                "cuDeviceCanAccessPeer failed: {:?}",
                rc
            )));
        }
        if can_access == 0 {
            return Err(DeviceFailure::peer_unsupported(format!(
                "no peer path from GPU {} to GPU {}",
                src_device, dst_device
            )));
        }
    }

    let src = CudaDevice::new(src_device as usize)
        .map_err(|e| DeviceFailure::from_driver("failed to bind source device", e))?;
    let dst = CudaDevice::new(dst_device as usize)
        .map_err(|e| DeviceFailure::from_driver("failed to bind destination device", e))?;

    // Guard declared before the buffers: locals drop in reverse order, so
    // both buffers are released before peer access is revoked.
    let _guard = if src_device != dst_device {
        Some(PeerAccessGuard::enable(&src, &dst)?)
    } else {
        None
    };

    let bytes = config.transfer_bytes;
    let src_buf = src
        .alloc_zeros::<u8>(bytes)
        .map_err(|e| DeviceFailure::from_driver("failed to allocate source buffer", e))?;
    let dst_buf = dst
        .alloc_zeros::<u8>(bytes)
        .map_err(|e| DeviceFailure::from_driver("failed to allocate destination buffer", e))?;

    // Warm-up copy, untimed.
    copy_peer(&src, &dst, &src_buf, &dst_buf, bytes)?;

    let start = Instant::now();
    copy_peer(&src, &dst, &src_buf, &dst_buf, bytes)?;
    let elapsed = start.elapsed();

    if elapsed.is_zero() {
        return Err(DeviceFailure::runtime("timed copy measured zero elapsed time"));
    }

    Ok(bytes as f64 / elapsed.as_secs_f64() / 1e9)
}

/// One full-buffer peer copy, waited to completion on both devices.
fn copy_peer(
    src: &Arc<CudaDevice>,
    dst: &Arc<CudaDevice>,
    src_buf: &CudaSlice<u8>,
    dst_buf: &CudaSlice<u8>,
    bytes: usize,
) -> Result<(), DeviceFailure> {
    let rc = unsafe {
        sys::cuMemcpyPeer(
            *dst_buf.device_ptr(),
            dst.cu_primary_ctx(),
            *src_buf.device_ptr(),
            src.cu_primary_ctx(),
            bytes,
        )
    };
    if rc != sys::cudaError_enum::CUDA_SUCCESS {
        return Err(DeviceFailure::runtime(format!(
            "cuMemcpyPeer failed: {:?}",
            rc
        )));
    }

    dst.synchronize()
        .map_err(|e| DeviceFailure::from_driver("destination synchronize failed", e))?;
    src.synchronize()
        .map_err(|e| DeviceFailure::from_driver("source synchronize failed", e))?;
    Ok(())
}
