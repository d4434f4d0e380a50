//! PTX elementwise kernels, compiled once per device and cached by
//! `cudarc`'s module registry. Mirrors the teacher's inline PTX strings in
//! `backend/cuda/mod.rs`.

use std::sync::Arc;

use cudarc::driver::{CudaDevice, CudaSlice, LaunchAsync, LaunchConfig};
use cudarc::nvrtc::compile_ptx;

use crate::errors::{GPError, GPResult};

const RELU_KERNEL: &str = r#"
extern "C" __global__ void relu_kernel(float *x, int n) {
    int i = blockIdx.x * blockDim.x + threadIdx.x;
    if (i < n) { x[i] = x[i] > 0.0f ? x[i] : 0.0f; }
}
"#;

const SIGMOID_KERNEL: &str = r#"
extern "C" __global__ void sigmoid_kernel(float *x, int n) {
    int i = blockIdx.x * blockDim.x + threadIdx.x;
    if (i < n) { x[i] = 1.0f / (1.0f + expf(-x[i])); }
}
"#;

pub fn load(device: &Arc<CudaDevice>) -> GPResult<()> {
    let relu_ptx = compile_ptx(RELU_KERNEL).map_err(|e| GPError::AcceleratorAlloc(format!("nvrtc relu: {e}")))?;
    device
        .load_ptx(relu_ptx, "relu", &["relu_kernel"])
        .map_err(|e| GPError::AcceleratorAlloc(format!("load relu module: {e}")))?;

    let sigmoid_ptx =
        compile_ptx(SIGMOID_KERNEL).map_err(|e| GPError::AcceleratorAlloc(format!("nvrtc sigmoid: {e}")))?;
    device
        .load_ptx(sigmoid_ptx, "sigmoid", &["sigmoid_kernel"])
        .map_err(|e| GPError::AcceleratorAlloc(format!("load sigmoid module: {e}")))?;
    Ok(())
}

fn launch_cfg(n: usize) -> LaunchConfig {
    let block = 256u32;
    let grid = ((n as u32) + block - 1) / block;
    LaunchConfig {
        grid_dim: (grid, 1, 1),
        block_dim: (block, 1, 1),
        shared_mem_bytes: 0,
    }
}

pub fn launch_relu(device: &Arc<CudaDevice>, buf: &mut CudaSlice<f32>) -> GPResult<()> {
    let n = buf.len();
    let f = device
        .get_func("relu", "relu_kernel")
        .ok_or_else(|| GPError::AcceleratorAlloc("relu kernel not loaded".into()))?;
    unsafe { f.launch(launch_cfg(n), (buf, n as i32)) }
        .map_err(|e| GPError::AcceleratorAlloc(format!("relu launch: {e}")))
}

pub fn launch_sigmoid(device: &Arc<CudaDevice>, buf: &mut CudaSlice<f32>) -> GPResult<()> {
    let n = buf.len();
    let f = device
        .get_func("sigmoid", "sigmoid_kernel")
        .ok_or_else(|| GPError::AcceleratorAlloc("sigmoid kernel not loaded".into()))?;
    unsafe { f.launch(launch_cfg(n), (buf, n as i32)) }
        .map_err(|e| GPError::AcceleratorAlloc(format!("sigmoid launch: {e}")))
}
