//! Fully-connected (inner-product) layer.
//!
//! Grounded directly on `bcnn_fc_layer.c`'s forward/backward: forward zeroes
//! `dst`, runs a single GEMM with the weight operand transposed
//! (`dst = src * weights^T`), then adds the bias to every row of the batch
//! via a per-row `axpy` (`bcnn_add_bias`) before applying the activation.
//! Backward undoes the activation in place, accumulates the bias gradient
//! by summing `grad_dst` over the batch axis, then runs two GEMMs for
//! `grad_weights` (`grad_dst^T * src`) and `grad_input` (`grad_dst * weights`),
//! the latter only when the source tensor carries a gradient buffer
//! (`if (src_tensor->grad_data)` in the original).

use ndarray::Array4;
use serde::{Deserialize, Serialize};

use crate::backend::Workspace;
use crate::errors::GPResult;
use crate::kernels::{gemm::gemm, vecmath::axpy};
use crate::tensor::Tensor;
use crate::types::{Activation, TensorId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Params {
    pub in_features: usize,
    pub out_features: usize,
    pub weights: TensorId,
    pub bias: TensorId,
    pub activation: Activation,
}

/// `weights` is `(out_features, in_features)`, `bias` is `(out_features,)`.
pub fn forward(
    params: &Params,
    input: &Tensor,
    weights: &Tensor,
    bias: &Tensor,
    output: &mut Tensor,
    workspace: &mut Workspace,
) -> GPResult<()> {
    let n = input.shape().n;
    let src = input.as_2d();
    let src_slice = src.as_slice().expect("contiguous fc input");

    let mut dst = vec![0.0f32; n * params.out_features];
    gemm(
        &mut workspace.gemm,
        false,
        true,
        n,
        params.out_features,
        params.in_features,
        1.0,
        src_slice,
        weights.as_slice(),
        0.0,
        &mut dst,
    );

    let bias_slice = bias.as_slice();
    for row in dst.chunks_mut(params.out_features) {
        axpy(1.0, bias_slice, row);
    }

    for v in dst.iter_mut() {
        *v = super::activation_scalar(params.activation, *v);
    }

    let out = Array4::from_shape_vec((n, params.out_features, 1, 1), dst)
        .expect("fc output has exactly n * out_features elements");
    output.set_data(&out)
}

#[allow(clippy::too_many_arguments)]
pub fn backward(
    params: &Params,
    input: &Tensor,
    output: &Tensor,
    weights: &Tensor,
    grad_output: &Tensor,
    grad_weights: &mut Tensor,
    grad_bias: &mut Tensor,
    grad_input: Option<&mut Tensor>,
    workspace: &mut Workspace,
) -> GPResult<()> {
    let n = input.shape().n;

    let mut grad_dst: Vec<f32> = output
        .as_slice()
        .iter()
        .zip(grad_output.as_slice().iter())
        .map(|(&y, &g)| g * super::activation_derivative_scalar(params.activation, y))
        .collect();

    let grad_bias_sum = grad_bias.as_slice_mut();
    for row in grad_dst.chunks(params.out_features) {
        axpy(1.0, row, grad_bias_sum);
    }

    let src = input.as_2d();
    let src_slice = src.as_slice().expect("contiguous fc input");

    let mut gw = vec![0.0f32; params.out_features * params.in_features];
    gemm(
        &mut workspace.gemm,
        true,
        false,
        params.out_features,
        params.in_features,
        n,
        1.0,
        &grad_dst,
        src_slice,
        0.0,
        &mut gw,
    );
    let gw_arr = Array4::from_shape_vec((1, params.out_features, 1, params.in_features), gw)
        .expect("fc weight gradient matches weight element count");
    grad_weights.accumulate_grad(&gw_arr)?;

    if let Some(gi) = grad_input {
        let mut gx = vec![0.0f32; n * params.in_features];
        gemm(
            &mut workspace.gemm,
            false,
            false,
            n,
            params.in_features,
            params.out_features,
            1.0,
            &mut grad_dst,
            weights.as_slice(),
            0.0,
            &mut gx,
        );
        let in_shape = input.shape();
        let gx_arr = Array4::from_shape_vec((in_shape.n, in_shape.c, in_shape.h, in_shape.w), gx)
            .expect("fc input gradient matches input element count");
        gi.accumulate_grad(&gx_arr)?;
    }
    Ok(())
}
