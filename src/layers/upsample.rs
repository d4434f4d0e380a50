//! Nearest-neighbor spatial upsampling by an integer factor, mirroring
//! `bcnn_upsample_layer.c`. Used ahead of the detection head's multi-scale
//! concat in YOLOv3-style networks.

use ndarray::Array4;
use serde::{Deserialize, Serialize};

use crate::errors::GPResult;
use crate::tensor::Tensor;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Params {
    pub factor: usize,
}

pub fn forward(params: &Params, input: &Tensor, output: &mut Tensor) -> GPResult<()> {
    let shape = input.shape();
    let f = params.factor;
    let mut out = Array4::zeros((shape.n, shape.c, shape.h * f, shape.w * f));
    for n in 0..shape.n {
        for c in 0..shape.c {
            for h in 0..shape.h {
                for w in 0..shape.w {
                    let v = input.data()[(n, c, h, w)];
                    for dy in 0..f {
                        for dx in 0..f {
                            out[(n, c, h * f + dy, w * f + dx)] = v;
                        }
                    }
                }
            }
        }
    }
    output.set_data(&out)
}

pub fn backward(params: &Params, input: &Tensor, grad_output: &Tensor, grad_input: &mut Tensor) -> GPResult<()> {
    let shape = input.shape();
    let f = params.factor;
    let mut dx = Array4::zeros((shape.n, shape.c, shape.h, shape.w));
    for n in 0..shape.n {
        for c in 0..shape.c {
            for h in 0..shape.h {
                for w in 0..shape.w {
                    let mut s = 0.0f32;
                    for dy in 0..f {
                        for dxo in 0..f {
                            s += grad_output.data()[(n, c, h * f + dy, w * f + dxo)];
                        }
                    }
                    dx[(n, c, h, w)] = s;
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
    use ndarray::Array4;

    #[test]
    fn upsample_replicates_each_pixel() {
        let input = Tensor::from_array("x", Array4::from_shape_vec((1, 1, 1, 1), vec![5.0]).unwrap());
        let mut output = Tensor::zeros("y", Shape4::new(1, 1, 2, 2));
        forward(&Params { factor: 2 }, &input, &mut output).unwrap();
        assert_eq!(output.as_slice(), &[5.0, 5.0, 5.0, 5.0]);
    }

    #[test]
    fn backward_sums_replicated_gradients() {
        let input = Tensor::from_array("x", Array4::from_shape_vec((1, 1, 1, 1), vec![5.0]).unwrap());
        let grad_output = Tensor::from_array("gy", Array4::from_shape_vec((1, 1, 2, 2), vec![1.0; 4]).unwrap());
        let mut grad_input = Tensor::zeros("gx", Shape4::new(1, 1, 1, 1));
        grad_input.allocate_grad();
        backward(&Params { factor: 2 }, &input, &grad_output, &mut grad_input).unwrap();
        assert_eq!(grad_input.grad().unwrap().as_slice().unwrap(), &[4.0]);
    }
}
