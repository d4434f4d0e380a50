//! Device dispatch (spec's "Backend" concept): every layer operation runs
//! through a `Backend` implementation chosen once at network compile time.
//!
//! Grounded on the teacher's `backend::Backend` trait (`src/backend/mod.rs`),
//! which exposes one method per fused operation and returns `anyhow::Result`;
//! we keep the one-method-per-op shape but return [`GPResult`] so the whole
//! crate shares a single error type, and batch every method over the leading
//! `N` axis the way `bcnn` layers loop `for (int i = 0; i < batch_size; ++i)`.

pub mod cpu;
#[cfg(feature = "cuda")]
pub mod cuda;

use crate::errors::GPResult;
use crate::kernels::gemm::GemmContext;
use crate::types::Device;

/// Per-network scratch shared by every GEMM/convolution dispatch, sized to
/// the largest layer seen during compile (spec §4.4's shared workspace).
#[derive(Debug, Default)]
pub struct Workspace {
    pub gemm: GemmContext,
    pub im2col_buf: Vec<f32>,
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ensure_im2col(&mut self, len: usize) {
        if self.im2col_buf.len() < len {
            self.im2col_buf.resize(len, 0.0);
        }
    }
}

/// A compute device capable of running the engine's layer set.
///
/// Every method takes the flattened per-image buffers it needs (rather than
/// full `Tensor`s) so the same trait works whether the storage backing them
/// is a host slice or a device-mirrored one: the caller (a layer) is
/// responsible for getting bytes onto the right side of the host/device
/// boundary first.
pub trait Backend: Send + Sync {
    fn device(&self) -> Device;

    fn name(&self) -> &'static str;
}

/// Parallel strategy used by [`cpu::CpuBackend`] to split work across the
/// batch axis. Exposed so layers that need batch-parallel loops (conv,
/// pooling, fully connected) share one dispatch point, matching the
/// teacher's reliance on a single `rayon` entry (`ndarray::Zip::par_for_each`)
/// rather than ad hoc `thread::spawn` calls scattered through layer code.
#[cfg(feature = "rayon")]
pub fn par_batches<T, F>(n: usize, f: F) -> Vec<GPResult<T>>
where
    T: Send,
    F: Fn(usize) -> GPResult<T> + Sync,
{
    use rayon::prelude::*;
    (0..n).into_par_iter().map(f).collect()
}

#[cfg(not(feature = "rayon"))]
pub fn par_batches<T, F>(n: usize, f: F) -> Vec<GPResult<T>>
where
    T: Send,
    F: Fn(usize) -> GPResult<T> + Sync,
{
    (0..n).map(f).collect()
}
