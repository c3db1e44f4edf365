//! Device Inventory
//!
//! Enumerates CUDA-visible devices. `device_count` is the one operation
//! guaranteed to succeed with zero devices present; its first use may
//! trigger lazy driver initialization.

use crate::errors::*;
use cudarc::driver::{sys, CudaDevice};
use serde::Serialize;
use std::fmt;

/// Number of CUDA-visible devices, or -1 when the driver cannot initialize
/// (no driver loaded, no devices attached). Zero devices is a valid count,
/// not an error. Idempotent: repeated calls return the same value at steady
/// state.
pub fn device_count() -> i32 {
    match CudaDevice::count() {
        Ok(n) => n,
        Err(e) => {
            println!("[PULSE][INVENTORY] CUDA initialization failed: {}", e);
            -1
        }
    }
}

/// Detailed information about one CUDA device.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    /// 0-based device ordinal.
    pub id: usize,

    /// Device name as reported by the driver (e.g., "NVIDIA H100 80GB HBM3").
    pub name: String,

    /// Total device memory in bytes.
    pub total_memory_bytes: usize,

    /// Total device memory in MB for display.
    pub total_memory_mb: u64,

    /// Compute capability (e.g., (9, 0) for Hopper).
    pub compute_capability: (i32, i32),

    /// Number of streaming multiprocessors.
    pub sm_count: u32,

    /// PCI bus address, for topology correlation.
    pub pci_bus_id: String,
}

impl DeviceInfo {
    fn query(id: usize, device: &CudaDevice) -> Result<Self> {
        let cu_device = device.cu_device();

        let name = query_name(cu_device)
            .map_err(|rc| PulseError::Gpu(format!("cuDeviceGetName failed for GPU {}: {:?}", id, rc)))?;

        let mut total_memory_bytes = 0usize;
        let rc = unsafe { sys::cuDeviceTotalMem_v2(&mut total_memory_bytes, cu_device) };
        if rc != sys::cudaError_enum::CUDA_SUCCESS {
            return Err(PulseError::Gpu(format!(
                "cuDeviceTotalMem failed for GPU {}: {:?}",
                id, rc
            )));
        }

        let major = query_attribute(
            cu_device,
            sys::CUdevice_attribute::CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MAJOR,
        )?;
        let minor = query_attribute(
            cu_device,
            sys::CUdevice_attribute::CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MINOR,
        )?;
        let sm_count = query_attribute(
            cu_device,
            sys::CUdevice_attribute::CU_DEVICE_ATTRIBUTE_MULTIPROCESSOR_COUNT,
        )?;
        let pci_bus = query_attribute(
            cu_device,
            sys::CUdevice_attribute::CU_DEVICE_ATTRIBUTE_PCI_BUS_ID,
        )?;
        let pci_device = query_attribute(
            cu_device,
            sys::CUdevice_attribute::CU_DEVICE_ATTRIBUTE_PCI_DEVICE_ID,
        )?;

        Ok(Self {
            id,
            name,
            total_memory_bytes,
            total_memory_mb: (total_memory_bytes as u64) / (1024 * 1024),
            compute_capability: (major, minor),
            sm_count: sm_count as u32,
            pci_bus_id: format!("0000:{:02x}:{:02x}.0", pci_bus, pci_device),
        })
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GPU {} [{}]: {} MB, SM={}, CC={}.{}, PCI={}",
            self.id,
            self.name,
            self.total_memory_mb,
            self.sm_count,
            self.compute_capability.0,
            self.compute_capability.1,
            self.pci_bus_id
        )
    }
}

/// Enumerate every visible device in ordinal order.
///
/// # Errors
/// `PulseError::Gpu` when the driver cannot be initialized or a device
/// property query fails.
pub fn enumerate_devices() -> Result<Vec<DeviceInfo>> {
    let count = CudaDevice::count()
        .map_err(|e| PulseError::Gpu(format!("failed to query CUDA device count: {}", e)))?;

    let mut devices = Vec::with_capacity(count as usize);
    for id in 0..count as usize {
        let device = CudaDevice::new(id)
            .map_err(|e| PulseError::Gpu(format!("failed to bind GPU {}: {}", id, e)))?;
        devices.push(DeviceInfo::query(id, &device)?);
    }
    Ok(devices)
}

fn query_name(cu_device: sys::CUdevice) -> std::result::Result<String, sys::CUresult> {
    let mut buf = [0u8; 256];
    let rc = unsafe {
        sys::cuDeviceGetName(
            buf.as_mut_ptr() as *mut std::os::raw::c_char,
            buf.len() as i32,
            cu_device,
        )
    };
    if rc != sys::cudaError_enum::CUDA_SUCCESS {
        return Err(rc);
    }
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    Ok(String::from_utf8_lossy(&buf[..len]).into_owned())
}

fn query_attribute(cu_device: sys::CUdevice, attr: sys::CUdevice_attribute) -> Result<i32> {
    let mut value = 0i32;
    let rc = unsafe { sys::cuDeviceGetAttribute(&mut value, attr, cu_device) };
    if rc != sys::cudaError_enum::CUDA_SUCCESS {
        return Err(PulseError::Gpu(format!(
            "cuDeviceGetAttribute({:?}) failed: {:?}",
            attr, rc
        )));
    }
    Ok(value)
}
