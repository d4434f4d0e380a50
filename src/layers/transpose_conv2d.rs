//! Transposed ("deconvolution") 2D convolution, mirroring
//! `bcnn_transpose_conv2d_layer.c`. Weights are laid out `(in_c, out_c, kh,
//! kw)`: forward scatter-adds each input pixel's contribution into the
//! output, the adjoint of standard convolution's gather. Output size
//! resolves an Open Question the spec left implicit:
//! `out = (in - 1) * stride - 2 * pad + k`.

use ndarray::Array4;
use serde::{Deserialize, Serialize};

use crate::errors::GPResult;
use crate::kernels::vecmath::add_scalar;
use crate::tensor::Tensor;
use crate::types::{Activation, TensorId};

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
    pub activation: Activation,
}

impl Params {
    pub fn output_hw(&self, h: usize, w: usize) -> (usize, usize) {
        (
            (h - 1) * self.stride + self.kh - 2 * self.pad,
            (w - 1) * self.stride + self.kw - 2 * self.pad,
        )
    }
}

pub fn forward(params: &Params, input: &Tensor, weights: &Tensor, bias: &Tensor, output: &mut Tensor) -> GPResult<()> {
    let shape = input.shape();
    let (out_h, out_w) = params.output_hw(shape.h, shape.w);
    let w_slice = weights.as_slice();
    let mut out = Array4::zeros((shape.n, params.out_c, out_h, out_w));

    for n in 0..shape.n {
        for ic in 0..params.in_c {
            for iy in 0..shape.h {
                for ix in 0..shape.w {
                    let x = input.data()[(n, ic, iy, ix)];
                    if x == 0.0 {
                        continue;
                    }
                    for oc in 0..params.out_c {
                        for ky in 0..params.kh {
                            let oy = iy as isize * params.stride as isize + ky as isize - params.pad as isize;
                            if oy < 0 || oy as usize >= out_h {
                                continue;
                            }
                            for kx in 0..params.kw {
                                let ox = ix as isize * params.stride as isize + kx as isize - params.pad as isize;
                                if ox < 0 || ox as usize >= out_w {
                                    continue;
                                }
                                let widx = ((ic * params.out_c + oc) * params.kh + ky) * params.kw + kx;
                                out[(n, oc, oy as usize, ox as usize)] += x * w_slice[widx];
                            }
                        }
                    }
                }
            }
        }
        for oc in 0..params.out_c {
            let b = bias.as_slice()[oc];
            let mut row: Vec<f32> = (0..out_h * out_w).map(|i| out[(n, oc, i / out_w, i % out_w)]).collect();
            add_scalar(b, &mut row);
            for v in row.iter_mut() {
                *v = super::activation_scalar(params.activation, *v);
            }
            for (idx, &v) in row.iter().enumerate() {
                out[(n, oc, idx / out_w, idx % out_w)] = v;
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
) -> GPResult<()> {
    let shape = input.shape();
    let (out_h, out_w) = params.output_hw(shape.h, shape.w);
    let w_slice = weights.as_slice();

    let mut gw = vec![0.0f32; params.in_c * params.out_c * params.kh * params.kw];
    let mut gb = vec![0.0f32; params.out_c];
    let mut gx = Array4::zeros((shape.n, params.in_c, shape.h, shape.w));

    // Gradient w.r.t. the pre-activation output, folding the activation
    // derivative in before distributing it back through the scatter.
    let mut grad_act = Array4::zeros((shape.n, params.out_c, out_h, out_w));
    for n in 0..shape.n {
        for oc in 0..params.out_c {
            for oy in 0..out_h {
                for ox in 0..out_w {
                    let y = output.data()[(n, oc, oy, ox)];
                    let g = grad_output.data()[(n, oc, oy, ox)] * super::activation_derivative_scalar(params.activation, y);
                    grad_act[(n, oc, oy, ox)] = g;
                    gb[oc] += g;
                }
            }
        }
    }

    for n in 0..shape.n {
        for ic in 0..params.in_c {
            for iy in 0..shape.h {
                for ix in 0..shape.w {
                    let x = input.data()[(n, ic, iy, ix)];
                    let mut grad_x = 0.0f32;
                    for oc in 0..params.out_c {
                        for ky in 0..params.kh {
                            let oy = iy as isize * params.stride as isize + ky as isize - params.pad as isize;
                            if oy < 0 || oy as usize >= out_h {
                                continue;
                            }
                            for kx in 0..params.kw {
                                let ox = ix as isize * params.stride as isize + kx as isize - params.pad as isize;
                                if ox < 0 || ox as usize >= out_w {
                                    continue;
                                }
                                let g = grad_act[(n, oc, oy as usize, ox as usize)];
                                let widx = ((ic * params.out_c + oc) * params.kh + ky) * params.kw + kx;
                                gw[widx] += g * x;
                                grad_x += g * w_slice[widx];
                            }
                        }
                    }
                    gx[(n, ic, iy, ix)] += grad_x;
                }
            }
        }
    }

    let gw_arr = Array4::from_shape_vec((1, params.in_c, params.out_c, params.kh * params.kw), gw)
        .expect("transposed-conv weight gradient size");
    let gb_arr = Array4::from_shape_vec((1, params.out_c, 1, 1), gb).expect("transposed-conv bias gradient size");
    grad_weights.accumulate_grad(&gw_arr)?;
    grad_bias.accumulate_grad(&gb_arr)?;
    if let Some(gi) = grad_input {
        gi.accumulate_grad(&gx)?;
    }
    Ok(())
}
