//! 2D convolution, with an optional fused batch-norm affine folded into the
//! bias-add step (`bcnn_conv_layer.c`'s `has_bias`/`BCNN_PARAM_CONV_BN` path).
//!
//! Dispatches to the Winograd F(2x2,3x3) kernel for stride-1, pad-1, 3x3
//! filters (`bcnn_conv3x3s1_kernel`'s selection criterion) and falls back to
//! im2col + GEMM otherwise (`bcnn_forward_conv_layer`'s general path). Per
//! spec §4.4, each image in the batch is processed independently so forward
//! parallelizes over `N` via [`crate::backend::par_batches`].

use ndarray::Array4;
use serde::{Deserialize, Serialize};

use crate::backend::{par_batches, Workspace};
use crate::errors::GPResult;
use crate::kernels::conv::{col2im, im2col, winograd_conv3x3};
use crate::kernels::gemm::gemm;
use crate::kernels::vecmath::{add_scalar, variance_normalize, EPS};
use crate::tensor::Tensor;
use crate::types::{Activation, TensorId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FusedBn {
    pub scale: TensorId,
    pub running_mean: TensorId,
    pub running_var: TensorId,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Params {
    pub in_c: usize,
    pub out_c: usize,
    pub kh: usize,
    pub kw: usize,
    pub stride: usize,
    pub pad: usize,
    pub weights: TensorId,
    pub bias: TensorId,
    pub fused_bn: Option<FusedBn>,
    pub activation: Activation,
}

impl Params {
    pub fn output_hw(&self, h: usize, w: usize) -> (usize, usize) {
        let out_h = (h + 2 * self.pad - self.kh) / self.stride + 1;
        let out_w = (w + 2 * self.pad - self.kw) / self.stride + 1;
        (out_h, out_w)
    }

    fn winograd_eligible(&self) -> bool {
        self.kh == 3 && self.kw == 3 && self.stride == 1 && self.pad == 1
    }
}

fn fold_bias(params: &Params, bias: &Tensor, fused: Option<(&Tensor, &Tensor, &Tensor)>) -> Vec<f32> {
    let b = bias.as_slice().to_vec();
    match fused {
        None => b,
        Some((scale, mean, var)) => {
            let scale_s = scale.as_slice();
            let mean_s = mean.as_slice();
            let var_s = var.as_slice();
            (0..params.out_c)
                .map(|c| b[c] - mean_s[c] * scale_s[c] / (var_s[c] + EPS).sqrt())
                .collect()
        }
    }
}

fn fold_weights(params: &Params, weights: &[f32], fused: Option<(&Tensor, &Tensor)>) -> Vec<f32> {
    match fused {
        None => weights.to_vec(),
        Some((scale, var)) => {
            let scale_s = scale.as_slice();
            let var_s = var.as_slice();
            let mut out = weights.to_vec();
            let per_filter = params.in_c * params.kh * params.kw;
            for c in 0..params.out_c {
                let mut row = out[c * per_filter..(c + 1) * per_filter].to_vec();
                variance_normalize(&mut row, var_s[c], scale_s[c]);
                out[c * per_filter..(c + 1) * per_filter].copy_from_slice(&row);
            }
            out
        }
    }
}

pub fn forward(
    params: &Params,
    input: &Tensor,
    weights: &Tensor,
    bias: &Tensor,
    fused: Option<(&Tensor, &Tensor, &Tensor)>,
    output: &mut Tensor,
    workspace: &mut Workspace,
) -> GPResult<()> {
    let shape = input.shape();
    let (out_h, out_w) = params.output_hw(shape.h, shape.w);
    let weights_folded = fold_weights(params, weights.as_slice(), fused.map(|(s, _m, v)| (s, v)));
    let bias_folded = fold_bias(params, bias, fused);

    let per_filter = params.in_c * params.kh * params.kw;
    workspace.ensure_im2col(per_filter * out_h * out_w);

    let results = par_batches(shape.n, |n| -> GPResult<Vec<f32>> {
        let input_img = &input.as_slice()[n * shape.size3d()..(n + 1) * shape.size3d()];
        let mut conv_out = vec![0.0f32; params.out_c * out_h * out_w];

        if params.winograd_eligible() {
            winograd_conv3x3(input_img, params.in_c, shape.h, shape.w, &weights_folded, params.out_c, &mut conv_out);
        } else {
            let mut cols = vec![0.0f32; per_filter * out_h * out_w];
            im2col(
                input_img, params.in_c, shape.h, shape.w, params.kh, params.kw, params.stride, params.stride,
                params.pad, params.pad, out_h, out_w, &mut cols,
            );
            // Each batch item packs its own GEMM scratch: `workspace.gemm` is
            // shared network-wide and this closure may run on any worker
            // thread via par_batches.
            let mut ctx = crate::kernels::gemm::GemmContext::new();
            gemm(&mut ctx, false, false, params.out_c, out_h * out_w, per_filter, 1.0, &weights_folded, &cols, 0.0, &mut conv_out);
        }

        for (c, chunk) in conv_out.chunks_mut(out_h * out_w).enumerate() {
            add_scalar(bias_folded[c], chunk);
        }
        for v in conv_out.iter_mut() {
            *v = super::activation_scalar(params.activation, *v);
        }
        Ok(conv_out)
    });

    let mut out = Array4::zeros((shape.n, params.out_c, out_h, out_w));
    for (n, res) in results.into_iter().enumerate() {
        let data = res?;
        for (c, chunk) in data.chunks(out_h * out_w).enumerate() {
            for (idx, &v) in chunk.iter().enumerate() {
                out[(n, c, idx / out_w, idx % out_w)] = v;
            }
        }
    }
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
    let shape = input.shape();
    let (out_h, out_w) = params.output_hw(shape.h, shape.w);
    let per_filter = params.in_c * params.kh * params.kw;
    workspace.ensure_im2col(per_filter * out_h * out_w);

    let mut gw_total = vec![0.0f32; params.out_c * per_filter];
    let mut gb_total = vec![0.0f32; params.out_c];
    let mut gx_total = Array4::zeros((shape.n, params.in_c, shape.h, shape.w));

    for n in 0..shape.n {
        let input_img = &input.as_slice()[n * shape.size3d()..(n + 1) * shape.size3d()];

        let mut grad_act = vec![0.0f32; params.out_c * out_h * out_w];
        for (c, chunk) in grad_act.chunks_mut(out_h * out_w).enumerate() {
            for (idx, v) in chunk.iter_mut().enumerate() {
                let oy = idx / out_w;
                let ox = idx % out_w;
                let y = output.data()[(n, c, oy, ox)];
                let g = grad_output.data()[(n, c, oy, ox)];
                *v = g * super::activation_derivative_scalar(params.activation, y);
            }
            gb_total[c] += chunk.iter().sum::<f32>();
        }

        let mut cols = vec![0.0f32; per_filter * out_h * out_w];
        im2col(
            input_img, params.in_c, shape.h, shape.w, params.kh, params.kw, params.stride, params.stride,
            params.pad, params.pad, out_h, out_w, &mut cols,
        );
        let mut ctx_gw = crate::kernels::gemm::GemmContext::new();
        gemm(
            &mut ctx_gw, false, true, params.out_c, per_filter, out_h * out_w, 1.0, &grad_act, &cols, 1.0,
            &mut gw_total,
        );

        if grad_input.is_some() {
            let mut grad_cols = vec![0.0f32; per_filter * out_h * out_w];
            let mut ctx_gx = crate::kernels::gemm::GemmContext::new();
            gemm(
                &mut ctx_gx, true, false, per_filter, out_h * out_w, params.out_c, 1.0, weights.as_slice(),
                &grad_act, 0.0, &mut grad_cols,
            );
            let mut grad_img = vec![0.0f32; params.in_c * shape.h * shape.w];
            col2im(
                &grad_cols, params.in_c, shape.h, shape.w, params.kh, params.kw, params.stride, params.stride,
                params.pad, params.pad, out_h, out_w, &mut grad_img,
            );
            for (idx, &v) in grad_img.iter().enumerate() {
                let c = idx / (shape.h * shape.w);
                let rem = idx % (shape.h * shape.w);
                gx_total[(n, c, rem / shape.w, rem % shape.w)] += v;
            }
        }
    }

    let gw_arr = Array4::from_shape_vec((params.out_c, params.in_c, params.kh, params.kw), gw_total)
        .expect("conv weight gradient size");
    let gb_arr = Array4::from_shape_vec((1, params.out_c, 1, 1), gb_total).expect("conv bias gradient size");
    grad_weights.accumulate_grad(&gw_arr)?;
    grad_bias.accumulate_grad(&gb_arr)?;
    if let Some(gi) = grad_input {
        gi.accumulate_grad(&gx_total)?;
    }
    Ok(())
}
