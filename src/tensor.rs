//! The engine's single data type: a named, dense NCHW block of `f32`.
//!
//! Grounded on the teacher's `Tensor` (`src/tensor/mod.rs`), which wraps an
//! `ndarray::ArrayD<f32>` behind a `Storage` enum so CPU and CUDA mirrors
//! share one type. We keep that shape (ndarray-backed storage, an enum for
//! the device mirror) but fix the rank at 4 (NCHW), since the spec's data
//! model is explicitly four-dimensional, and add the optional gradient
//! buffer the spec's C4 calls for.
//!
//! Once a tensor is allocated its `data` buffer is never reallocated --
//! every mutation goes through [`Tensor::set_data`] or [`Tensor::data_mut`],
//! which assign into the existing `Array4` rather than replacing it. This is
//! what the spec means by "after allocation the data pointer is stable for
//! the tensor's lifetime".

use ndarray::{Array4, Axis};
use serde::{Deserialize, Serialize};

use crate::errors::{GPError, GPResult};
use crate::types::Shape4;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tensor {
    name: String,
    #[serde(with = "array4_serde")]
    data: Array4<f32>,
    #[serde(with = "opt_array4_serde")]
    grad: Option<Array4<f32>>,
    /// Present only once the owning network's compile step has mirrored this
    /// tensor to an accelerator device. Never serialized; a device mirror is
    /// re-derived from `data` on demand.
    #[serde(skip)]
    #[cfg(feature = "cuda")]
    device_mirror: Option<crate::backend::cuda::DeviceBuffer>,
}

mod array4_serde {
    use ndarray::Array4;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(a: &Array4<f32>, s: S) -> Result<S::Ok, S::Error> {
        a.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Array4<f32>, D::Error> {
        Array4::<f32>::deserialize(d)
    }
}

mod opt_array4_serde {
    use ndarray::Array4;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(a: &Option<Array4<f32>>, s: S) -> Result<S::Ok, S::Error> {
        a.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Array4<f32>>, D::Error> {
        Option::<Array4<f32>>::deserialize(d)
    }
}

impl Tensor {
    /// Creates a named tensor with zero-filled data and no gradient buffer.
    /// Matches `bcnn_tensor_create` followed immediately by allocation: the
    /// engine has no separate "declared but unallocated" tensor state.
    pub fn zeros(name: impl Into<String>, shape: Shape4) -> Self {
        Self {
            name: name.into(),
            data: Array4::zeros((shape.n, shape.c, shape.h, shape.w)),
            grad: None,
            #[cfg(feature = "cuda")]
            device_mirror: None,
        }
    }

    pub fn from_array(name: impl Into<String>, data: Array4<f32>) -> Self {
        Self {
            name: name.into(),
            data,
            grad: None,
            #[cfg(feature = "cuda")]
            device_mirror: None,
        }
    }

    /// Allocates a gradient buffer of the same shape as `data`, zero-filled.
    /// No-op if already allocated. Called during compile for every
    /// differentiable tensor when the network is in `Mode::Train`.
    pub fn allocate_grad(&mut self) {
        if self.grad.is_none() {
            self.grad = Some(Array4::zeros(self.data.dim()));
        }
    }

    pub fn drop_grad(&mut self) {
        self.grad = None;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> Shape4 {
        let (n, c, h, w) = self.data.dim();
        Shape4::new(n, c, h, w)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &Array4<f32> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Array4<f32> {
        &mut self.data
    }

    pub fn grad(&self) -> Option<&Array4<f32>> {
        self.grad.as_ref()
    }

    pub fn grad_mut(&mut self) -> Option<&mut Array4<f32>> {
        self.grad.as_mut()
    }

    pub fn has_grad(&self) -> bool {
        self.grad.is_some()
    }

    /// Zero-fills the gradient buffer, if present. Called at the start of
    /// forward, per spec §4.4, for every destination tensor of a node, when
    /// the network is training.
    pub fn zero_grad(&mut self) {
        if let Some(g) = self.grad.as_mut() {
            g.fill(0.0);
        }
    }

    pub fn fill(&mut self, value: f32) {
        self.data.fill(value);
    }

    /// Overwrites this tensor's data in place with `new_data`, without
    /// reallocating the backing buffer. Fails if the shape has changed,
    /// which would violate the post-compile shape-freeze invariant.
    pub fn set_data(&mut self, new_data: &Array4<f32>) -> GPResult<()> {
        if new_data.dim() != self.data.dim() {
            let found = new_data.dim();
            return Err(GPError::incompatible_shapes(
                &[self.data.dim().0, self.data.dim().1, self.data.dim().2, self.data.dim().3],
                &[found.0, found.1, found.2, found.3],
            ));
        }
        self.data.assign(new_data);
        Ok(())
    }

    /// Additively accumulates `delta` into the gradient buffer. Backward
    /// passes never overwrite gradients (spec §4.4): this is the only way
    /// layer code is allowed to touch `grad`.
    pub fn accumulate_grad(&mut self, delta: &Array4<f32>) -> GPResult<()> {
        match self.grad.as_mut() {
            Some(g) => {
                if g.dim() != delta.dim() {
                    let found = delta.dim();
                    return Err(GPError::incompatible_shapes(
                        &[g.dim().0, g.dim().1, g.dim().2, g.dim().3],
                        &[found.0, found.1, found.2, found.3],
                    ));
                }
                *g += delta;
                Ok(())
            }
            None => Ok(()), // non-differentiable tensor: silently skip, per spec §4.4
        }
    }

    pub fn as_slice(&self) -> &[f32] {
        self.data
            .as_slice()
            .expect("tensor data is always contiguous C-order")
    }

    pub fn as_slice_mut(&mut self) -> &mut [f32] {
        self.data
            .as_slice_mut()
            .expect("tensor data is always contiguous C-order")
    }

    pub fn grad_as_slice(&self) -> Option<&[f32]> {
        self.grad.as_ref().map(|g| g.as_slice().expect("contiguous"))
    }

    pub fn grad_as_slice_mut(&mut self) -> Option<&mut [f32]> {
        self.grad.as_mut().map(|g| g.as_slice_mut().expect("contiguous"))
    }

    /// View as a 2D (n, c*h*w) matrix, used by fully-connected and softmax.
    pub fn as_2d(&self) -> ndarray::ArrayView2<'_, f32> {
        let (n, c, h, w) = self.data.dim();
        self.data
            .view()
            .into_shape((n, c * h * w))
            .expect("row-major reshape of contiguous data never fails")
    }

    pub fn mean(&self) -> f32 {
        self.data.mean().unwrap_or(0.0)
    }

    /// Sum over the batch axis, keeping the remaining dims -- used by
    /// bias-gradient accumulation (`grad_bias = sum_batch(grad_output)`).
    pub fn sum_batch(&self) -> Array4<f32> {
        self.data.sum_axis(Axis(0)).insert_axis(Axis(0))
    }
}

impl PartialEq for Tensor {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}
