//! CPU backend: the only backend guaranteed to be present. All layer
//! forward/backward implementations are written directly against
//! [`crate::kernels`] and [`super::par_batches`]; this type exists mostly as
//! the `Device`/`Backend` marker the teacher's code uses to pick a dispatch
//! path, matching `backend::cpu::CPUBackend` in the teacher crate.

use super::Backend;
use crate::types::Device;

#[derive(Debug, Default, Clone, Copy)]
pub struct CpuBackend;

impl Backend for CpuBackend {
    fn device(&self) -> Device {
        Device::Cpu
    }

    fn name(&self) -> &'static str {
        "cpu"
    }
}
