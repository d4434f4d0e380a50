//! CUDA backend (feature `cuda`), grounded on the teacher's
//! `backend::cuda::CUDABackend`: a `cudarc` device handle, PTX-compiled
//! elementwise kernels, and explicit host<->device copy helpers.
//!
//! Parity is intentionally partial, as it is in the teacher: convolution and
//! GEMM stay on the packed CPU kernels (spec's im2col/Winograd paths aren't
//! re-derived for a device GEMM here), while the elementwise activation
//! kernels that dominate layer-count in the spec's layer set run on-device.
//! A tensor's [`DeviceBuffer`] mirror is created lazily and refreshed
//! whenever `Network::compile` or an explicit sync call requests it.

mod kernels;

use std::sync::Arc;

use cudarc::driver::{CudaDevice, CudaSlice};

use crate::errors::{GPError, GPResult};
use crate::types::Device;

use super::Backend;

/// An on-device mirror of a [`crate::tensor::Tensor`]'s data buffer.
#[derive(Clone)]
pub struct DeviceBuffer {
    slice: Arc<CudaSlice<f32>>,
    len: usize,
}

impl std::fmt::Debug for DeviceBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceBuffer").field("len", &self.len).finish()
    }
}

impl DeviceBuffer {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

pub struct CudaBackend {
    device: Arc<CudaDevice>,
    ordinal: usize,
}

impl CudaBackend {
    pub fn new(ordinal: usize) -> GPResult<Self> {
        let device = CudaDevice::new(ordinal)
            .map_err(|e| GPError::AcceleratorAlloc(format!("cudarc device {ordinal}: {e}")))?;
        kernels::load(&device)?;
        Ok(Self { device, ordinal })
    }

    pub fn upload(&self, host: &[f32]) -> GPResult<DeviceBuffer> {
        let slice = self
            .device
            .htod_sync_copy(host)
            .map_err(|e| GPError::AcceleratorAlloc(format!("htod copy: {e}")))?;
        Ok(DeviceBuffer {
            slice: Arc::new(slice),
            len: host.len(),
        })
    }

    pub fn download(&self, buf: &DeviceBuffer) -> GPResult<Vec<f32>> {
        self.device
            .dtoh_sync_copy(&buf.slice)
            .map_err(|e| GPError::AcceleratorAlloc(format!("dtoh copy: {e}")))
    }

    pub fn relu_inplace(&self, buf: &mut DeviceBuffer) -> GPResult<()> {
        let mut owned = (*buf.slice).clone();
        kernels::launch_relu(&self.device, &mut owned)
            .map_err(|e| GPError::AcceleratorAlloc(format!("relu kernel: {e}")))?;
        buf.slice = Arc::new(owned);
        Ok(())
    }

    pub fn sigmoid_inplace(&self, buf: &mut DeviceBuffer) -> GPResult<()> {
        let mut owned = (*buf.slice).clone();
        kernels::launch_sigmoid(&self.device, &mut owned)
            .map_err(|e| GPError::AcceleratorAlloc(format!("sigmoid kernel: {e}")))?;
        buf.slice = Arc::new(owned);
        Ok(())
    }
}

impl Backend for CudaBackend {
    fn device(&self) -> Device {
        Device::Cuda(self.ordinal)
    }

    fn name(&self) -> &'static str {
        "cuda"
    }
}
