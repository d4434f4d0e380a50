//! Local response normalization across channels, mirroring
//! `bcnn_lrn_layer.c`: `y_c = x_c / (k + alpha/n * sum_{c' in window} x_c'^2) ^ beta`.

use ndarray::Array4;
use serde::{Deserialize, Serialize};

use crate::errors::GPResult;
use crate::tensor::Tensor;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Params {
    pub window: usize,
    pub alpha: f32,
    pub beta: f32,
    pub k: f32,
}

fn window_bounds(c: usize, channels: usize, window: usize) -> (usize, usize) {
    let half = window / 2;
    let lo = c.saturating_sub(half);
    let hi = (c + half + 1).min(channels);
    (lo, hi)
}

pub fn forward(params: &Params, input: &Tensor, output: &mut Tensor, scale_cache: &mut Vec<f32>) -> GPResult<()> {
    let shape = input.shape();
    scale_cache.clear();
    scale_cache.resize(shape.size(), 0.0);
    let mut out = Array4::zeros((shape.n, shape.c, shape.h, shape.w));
    for n in 0..shape.n {
        for c in 0..shape.c {
            let (lo, hi) = window_bounds(c, shape.c, params.window);
            for h in 0..shape.h {
                for w in 0..shape.w {
                    let mut sumsq = 0.0f32;
                    for cc in lo..hi {
                        let v = input.data()[(n, cc, h, w)];
                        sumsq += v * v;
                    }
                    let scale = params.k + params.alpha / params.window as f32 * sumsq;
                    let flat = ((n * shape.c + c) * shape.h + h) * shape.w + w;
                    scale_cache[flat] = scale;
                    out[(n, c, h, w)] = input.data()[(n, c, h, w)] * scale.powf(-params.beta);
                }
            }
        }
    }
    output.set_data(&out)
}

pub fn backward(
    params: &Params,
    input: &Tensor,
    output: &Tensor,
    grad_output: &Tensor,
    scale_cache: &[f32],
    grad_input: &mut Tensor,
) -> GPResult<()> {
    let shape = input.shape();
    let mut dx = Array4::zeros((shape.n, shape.c, shape.h, shape.w));
    let ratio = -2.0 * params.alpha * params.beta / params.window as f32;
    for n in 0..shape.n {
        for c in 0..shape.c {
            let (lo, hi) = window_bounds(c, shape.c, params.window);
            for h in 0..shape.h {
                for w in 0..shape.w {
                    let flat = ((n * shape.c + c) * shape.h + h) * shape.w + w;
                    let scale = scale_cache[flat];
                    let g = grad_output.data()[(n, c, h, w)];
                    // direct term
                    dx[(n, c, h, w)] += g * scale.powf(-params.beta);
                    // cross-channel term: every channel in this channel's
                    // own window receives a contribution proportional to
                    // this output's gradient times its own activation.
                    let direct_contrib = g * output.data()[(n, c, h, w)] * ratio / scale;
                    for cc in lo..hi {
                        dx[(n, cc, h, w)] += direct_contrib * input.data()[(n, cc, h, w)];
                    }
                }
            }
        }
    }
    grad_input.accumulate_grad(&dx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Shape4;

    #[test]
    fn single_channel_lrn_reduces_to_simple_scale() {
        let input = Tensor::from_array("x", Array4::from_shape_vec((1, 1, 1, 1), vec![2.0]).unwrap());
        let params = Params {
            window: 1,
            alpha: 1.0,
            beta: 0.5,
            k: 1.0,
        };
        let mut output = Tensor::zeros("y", Shape4::new(1, 1, 1, 1));
        let mut cache = Vec::new();
        forward(&params, &input, &mut output, &mut cache).unwrap();
        let expected = 2.0 / (1.0 + 4.0f32).sqrt();
        assert!((output.as_slice()[0] - expected).abs() < 1e-5);
    }
}
