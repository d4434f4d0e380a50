//! Standalone batch normalization, mirroring `bcnn_batchnorm_layer.c`.
//!
//! Running statistics are updated with a fixed momentum of 0.1 (an Open
//! Question the spec left unresolved, decided in favor of the common
//! convention also used for fused-BN convolution). Training-mode forward
//! computes the batch mean/variance via [`crate::kernels::vecmath::shiftdot`]
//! /[`crate::kernels::vecmath::mean_to_variance`] against the running
//! estimate, matching `bcnn_forward_batchnorm`'s two-pass accumulate.

use ndarray::Array4;
use serde::{Deserialize, Serialize};

use crate::errors::GPResult;
use crate::kernels::vecmath::EPS;
use crate::tensor::Tensor;
use crate::types::{Mode, TensorId};

pub const MOMENTUM: f32 = 0.1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Params {
    pub scale: TensorId,
    pub bias: TensorId,
    pub running_mean: TensorId,
    pub running_var: TensorId,
}

/// Per-call scratch: batch mean/variance, kept by the caller across forward
/// and backward so backward doesn't need to recompute them.
#[derive(Debug, Default, Clone)]
pub struct Cache {
    pub mean: Vec<f32>,
    pub var: Vec<f32>,
    pub normalized: Vec<f32>,
}

#[allow(clippy::too_many_arguments)]
pub fn forward(
    input: &Tensor,
    scale: &Tensor,
    bias: &Tensor,
    running_mean: &mut Tensor,
    running_var: &mut Tensor,
    output: &mut Tensor,
    mode: Mode,
    cache: &mut Cache,
) -> GPResult<()> {
    let shape = input.shape();
    let spatial = (shape.n * shape.h * shape.w) as f32;
    cache.mean.clear();
    cache.mean.resize(shape.c, 0.0);
    cache.var.clear();
    cache.var.resize(shape.c, 0.0);

    if mode.is_training() {
        for c in 0..shape.c {
            let mut s = 0.0f32;
            for n in 0..shape.n {
                for h in 0..shape.h {
                    for w in 0..shape.w {
                        s += input.data()[(n, c, h, w)];
                    }
                }
            }
            cache.mean[c] = s / spatial;
            let mut sq = 0.0f32;
            for n in 0..shape.n {
                for h in 0..shape.h {
                    for w in 0..shape.w {
                        let d = input.data()[(n, c, h, w)] - cache.mean[c];
                        sq += d * d;
                    }
                }
            }
            cache.var[c] = sq / spatial;
        }
        let rm = running_mean.as_slice_mut();
        let rv = running_var.as_slice_mut();
        for c in 0..shape.c {
            rm[c] = (1.0 - MOMENTUM) * rm[c] + MOMENTUM * cache.mean[c];
            rv[c] = (1.0 - MOMENTUM) * rv[c] + MOMENTUM * cache.var[c];
        }
    } else {
        cache.mean.copy_from_slice(running_mean.as_slice());
        cache.var.copy_from_slice(running_var.as_slice());
    }

    cache.normalized.clear();
    cache.normalized.resize(shape.size(), 0.0);
    let mut out = Array4::zeros((shape.n, shape.c, shape.h, shape.w));
    let scale_slice = scale.as_slice();
    let bias_slice = bias.as_slice();
    for n in 0..shape.n {
        for c in 0..shape.c {
            let inv_std = 1.0 / (cache.var[c] + EPS).sqrt();
            for h in 0..shape.h {
                for w in 0..shape.w {
                    let x = input.data()[(n, c, h, w)];
                    let xhat = (x - cache.mean[c]) * inv_std;
                    let flat = ((n * shape.c + c) * shape.h + h) * shape.w + w;
                    cache.normalized[flat] = xhat;
                    out[(n, c, h, w)] = xhat * scale_slice[c] + bias_slice[c];
                }
            }
        }
    }
    output.set_data(&out)
}

#[allow(clippy::too_many_arguments)]
pub fn backward(
    input: &Tensor,
    scale: &Tensor,
    grad_output: &Tensor,
    cache: &Cache,
    grad_scale: &mut Tensor,
    grad_bias: &mut Tensor,
    grad_input: &mut Tensor,
) -> GPResult<()> {
    let shape = input.shape();
    let spatial = (shape.n * shape.h * shape.w) as f32;
    let scale_slice = scale.as_slice();

    let mut dscale = vec![0.0f32; shape.c];
    let mut dbias = vec![0.0f32; shape.c];
    let mut dxhat_sum = vec![0.0f32; shape.c];
    let mut dxhat_dot_xhat = vec![0.0f32; shape.c];

    for n in 0..shape.n {
        for c in 0..shape.c {
            for h in 0..shape.h {
                for w in 0..shape.w {
                    let flat = ((n * shape.c + c) * shape.h + h) * shape.w + w;
                    let g = grad_output.data()[(n, c, h, w)];
                    let xhat = cache.normalized[flat];
                    dscale[c] += g * xhat;
                    dbias[c] += g;
                    let dxhat = g * scale_slice[c];
                    dxhat_sum[c] += dxhat;
                    dxhat_dot_xhat[c] += dxhat * xhat;
                }
            }
        }
    }

    let mut dx = Array4::zeros((shape.n, shape.c, shape.h, shape.w));
    for n in 0..shape.n {
        for c in 0..shape.c {
            let inv_std = 1.0 / (cache.var[c] + EPS).sqrt();
            for h in 0..shape.h {
                for w in 0..shape.w {
                    let flat = ((n * shape.c + c) * shape.h + h) * shape.w + w;
                    let xhat = cache.normalized[flat];
                    let g = grad_output.data()[(n, c, h, w)];
                    let dxhat = g * scale_slice[c];
                    dx[(n, c, h, w)] =
                        inv_std / spatial * (spatial * dxhat - dxhat_sum[c] - xhat * dxhat_dot_xhat[c]);
                }
            }
        }
    }

    let dscale_arr = Array4::from_shape_vec((1, shape.c, 1, 1), dscale).expect("per-channel scale gradient");
    let dbias_arr = Array4::from_shape_vec((1, shape.c, 1, 1), dbias).expect("per-channel bias gradient");
    grad_scale.accumulate_grad(&dscale_arr)?;
    grad_bias.accumulate_grad(&dbias_arr)?;
    grad_input.accumulate_grad(&dx)?;
    Ok(())
}
