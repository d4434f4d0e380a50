//! Numerically-stable softmax over the channel axis, mirroring
//! `bcnn_softmax_layer.c`'s max-subtraction trick.

use ndarray::Array4;

use crate::errors::GPResult;
use crate::tensor::Tensor;

pub fn forward(input: &Tensor, output: &mut Tensor) -> GPResult<()> {
    let shape = input.shape();
    let mut out = Array4::zeros((shape.n, shape.c, shape.h, shape.w));
    for n in 0..shape.n {
        for h in 0..shape.h {
            for w in 0..shape.w {
                let mut max_v = f32::NEG_INFINITY;
                for c in 0..shape.c {
                    max_v = max_v.max(input.data()[(n, c, h, w)]);
                }
                let mut sum = 0.0f32;
                for c in 0..shape.c {
                    let e = (input.data()[(n, c, h, w)] - max_v).exp();
                    out[(n, c, h, w)] = e;
                    sum += e;
                }
                for c in 0..shape.c {
                    out[(n, c, h, w)] /= sum;
                }
            }
        }
    }
    output.set_data(&out)
}

/// `grad_input = y * (grad_output - sum_c(grad_output * y))`, the standard
/// softmax-Jacobian contraction.
pub fn backward(output: &Tensor, grad_output: &Tensor, grad_input: &mut Tensor) -> GPResult<()> {
    let shape = output.shape();
    let mut dx = Array4::zeros((shape.n, shape.c, shape.h, shape.w));
    for n in 0..shape.n {
        for h in 0..shape.h {
            for w in 0..shape.w {
                let mut dot = 0.0f32;
                for c in 0..shape.c {
                    dot += output.data()[(n, c, h, w)] * grad_output.data()[(n, c, h, w)];
                }
                for c in 0..shape.c {
                    let y = output.data()[(n, c, h, w)];
                    dx[(n, c, h, w)] = y * (grad_output.data()[(n, c, h, w)] - dot);
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
    fn softmax_rows_sum_to_one() {
        let input = Tensor::from_array("x", Array4::from_shape_vec((1, 3, 1, 1), vec![1.0, 2.0, 3.0]).unwrap());
        let mut output = Tensor::zeros("y", Shape4::new(1, 3, 1, 1));
        forward(&input, &mut output).unwrap();
        let sum: f32 = output.as_slice().iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn softmax_is_shift_invariant() {
        let a = Tensor::from_array("a", Array4::from_shape_vec((1, 3, 1, 1), vec![1.0, 2.0, 3.0]).unwrap());
        let b = Tensor::from_array("b", Array4::from_shape_vec((1, 3, 1, 1), vec![101.0, 102.0, 103.0]).unwrap());
        let mut out_a = Tensor::zeros("ya", Shape4::new(1, 3, 1, 1));
        let mut out_b = Tensor::zeros("yb", Shape4::new(1, 3, 1, 1));
        forward(&a, &mut out_a).unwrap();
        forward(&b, &mut out_b).unwrap();
        for (x, y) in out_a.as_slice().iter().zip(out_b.as_slice().iter()) {
            assert!((x - y).abs() < 1e-5);
        }
    }
}
