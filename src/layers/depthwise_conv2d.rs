//! Depthwise convolution, mirroring `bcnn_depthwise_conv_layer.c`: each input
//! channel is convolved with its own `kh x kw` filter independently (no
//! cross-channel accumulation), unlike standard `Conv2D`.

use ndarray::Array4;
use serde::{Deserialize, Serialize};

use crate::backend::par_batches;
use crate::errors::GPResult;
use crate::kernels::vecmath::add_scalar;
use crate::tensor::Tensor;
use crate::types::{Activation, TensorId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Params {
    pub channels: usize,
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
        ((h + 2 * self.pad - self.kh) / self.stride + 1, (w + 2 * self.pad - self.kw) / self.stride + 1)
    }
}

pub fn forward(params: &Params, input: &Tensor, weights: &Tensor, bias: &Tensor, output: &mut Tensor) -> GPResult<()> {
    let shape = input.shape();
    let (out_h, out_w) = params.output_hw(shape.h, shape.w);
    let w_slice = weights.as_slice();
    let b_slice = bias.as_slice();

    let results = par_batches(shape.n, |n| -> GPResult<Vec<f32>> {
        let mut out = vec![0.0f32; params.channels * out_h * out_w];
        for c in 0..params.channels {
            let filt = &w_slice[c * params.kh * params.kw..(c + 1) * params.kh * params.kw];
            let out_chan = &mut out[c * out_h * out_w..(c + 1) * out_h * out_w];
            for oy in 0..out_h {
                for ox in 0..out_w {
                    let mut s = 0.0f32;
                    for ky in 0..params.kh {
                        let iy = (oy * params.stride + ky) as isize - params.pad as isize;
                        if iy < 0 || iy as usize >= shape.h {
                            continue;
                        }
                        for kx in 0..params.kw {
                            let ix = (ox * params.stride + kx) as isize - params.pad as isize;
                            if ix < 0 || ix as usize >= shape.w {
                                continue;
                            }
                            s += input.data()[(n, c, iy as usize, ix as usize)] * filt[ky * params.kw + kx];
                        }
                    }
                    out_chan[oy * out_w + ox] = s;
                }
            }
            add_scalar(b_slice[c], out_chan);
            for v in out_chan.iter_mut() {
                *v = super::activation_scalar(params.activation, *v);
            }
        }
        Ok(out)
    });

    let mut out = Array4::zeros((shape.n, params.channels, out_h, out_w));
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
) -> GPResult<()> {
    let shape = input.shape();
    let (out_h, out_w) = params.output_hw(shape.h, shape.w);
    let w_slice = weights.as_slice();

    let mut gw = vec![0.0f32; params.channels * params.kh * params.kw];
    let mut gb = vec![0.0f32; params.channels];
    let mut gx = Array4::zeros((shape.n, params.channels, shape.h, shape.w));

    for n in 0..shape.n {
        for c in 0..params.channels {
            let filt = &w_slice[c * params.kh * params.kw..(c + 1) * params.kh * params.kw];
            for oy in 0..out_h {
                for ox in 0..out_w {
                    let y = output.data()[(n, c, oy, ox)];
                    let g = grad_output.data()[(n, c, oy, ox)] * super::activation_derivative_scalar(params.activation, y);
                    gb[c] += g;
                    for ky in 0..params.kh {
                        let iy = (oy * params.stride + ky) as isize - params.pad as isize;
                        if iy < 0 || iy as usize >= shape.h {
                            continue;
                        }
                        for kx in 0..params.kw {
                            let ix = (ox * params.stride + kx) as isize - params.pad as isize;
                            if ix < 0 || ix as usize >= shape.w {
                                continue;
                            }
                            gw[c * params.kh * params.kw + ky * params.kw + kx] +=
                                g * input.data()[(n, c, iy as usize, ix as usize)];
                            gx[(n, c, iy as usize, ix as usize)] += g * filt[ky * params.kw + kx];
                        }
                    }
                }
            }
        }
    }

    let gw_arr = Array4::from_shape_vec((1, params.channels, 1, params.kh * params.kw), gw)
        .expect("depthwise weight gradient size");
    let gb_arr = Array4::from_shape_vec((1, params.channels, 1, 1), gb).expect("depthwise bias gradient size");
    grad_weights.accumulate_grad(&gw_arr)?;
    grad_bias.accumulate_grad(&gb_arr)?;
    if let Some(gi) = grad_input {
        gi.accumulate_grad(&gx)?;
    }
    Ok(())
}
