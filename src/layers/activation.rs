//! Element-wise activation layer, mirroring `bcnn_activation_layer.c` and
//! the teacher's `activations::{ReLU, Sigmoid}` (promoted here to a single
//! parametrized layer covering all ten `bcnn_activation` variants).

use ndarray::Array4;
use serde::{Deserialize, Serialize};

use crate::errors::GPResult;
use crate::tensor::Tensor;
use crate::types::{Activation, TensorId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Params {
    pub kind: Activation,
    pub clamp_min: f32,
    pub clamp_max: f32,
    /// Per-channel slope tensor, only present for `Activation::Prelu`.
    pub prelu_slope: Option<TensorId>,
}

impl Params {
    pub fn new(kind: Activation) -> Self {
        Self {
            kind,
            clamp_min: 0.0,
            clamp_max: 1.0,
            prelu_slope: None,
        }
    }
}

pub(crate) fn apply(kind: Activation, x: f32, slope: f32, clamp_min: f32, clamp_max: f32) -> f32 {
    match kind {
        Activation::None => x,
        Activation::Tanh => x.tanh(),
        Activation::Relu => x.max(0.0),
        Activation::Ramp => x.max(0.0).min(x + 0.1 * x.min(0.0)).max(x.min(0.0)),
        Activation::Softplus => (1.0 + x.exp()).ln(),
        Activation::LeakyRelu => {
            if x > 0.0 {
                x
            } else {
                0.01 * x
            }
        }
        Activation::Abs => x.abs(),
        Activation::Clamp => x.max(clamp_min).min(clamp_max),
        Activation::Prelu => {
            if x > 0.0 {
                x
            } else {
                slope * x
            }
        }
        Activation::Logistic => 1.0 / (1.0 + (-x).exp()),
    }
}

pub(crate) fn derivative(kind: Activation, y: f32, x: f32, slope: f32, clamp_min: f32, clamp_max: f32) -> f32 {
    match kind {
        Activation::None => 1.0,
        Activation::Tanh => 1.0 - y * y,
        Activation::Relu => {
            if x > 0.0 {
                1.0
            } else {
                0.0
            }
        }
        Activation::Ramp => {
            if x > 0.0 {
                1.0
            } else {
                0.1
            }
        }
        Activation::Softplus => 1.0 / (1.0 + (-x).exp()),
        Activation::LeakyRelu => {
            if x > 0.0 {
                1.0
            } else {
                0.01
            }
        }
        Activation::Abs => {
            if x >= 0.0 {
                1.0
            } else {
                -1.0
            }
        }
        Activation::Clamp => {
            if x > clamp_min && x < clamp_max {
                1.0
            } else {
                0.0
            }
        }
        Activation::Prelu => {
            if x > 0.0 {
                1.0
            } else {
                slope
            }
        }
        Activation::Logistic => y * (1.0 - y),
    }
}

pub fn forward(params: &Params, input: &Tensor, slope: Option<&Tensor>, output: &mut Tensor) -> GPResult<()> {
    let shape = input.shape();
    let slope_data = slope.map(|s| s.as_slice().to_vec());
    let mut out = Array4::zeros((shape.n, shape.c, shape.h, shape.w));
    let hw = shape.h * shape.w;
    for ((n, c, h, w), v) in input.data().indexed_iter() {
        let sl = slope_data.as_ref().map(|s| s[c]).unwrap_or(0.0);
        out[(n, c, h, w)] = apply(params.kind, *v, sl, params.clamp_min, params.clamp_max);
    }
    let _ = hw;
    output.set_data(&out)
}

#[allow(clippy::too_many_arguments)]
pub fn backward(
    params: &Params,
    input: &Tensor,
    output: &Tensor,
    slope: Option<&Tensor>,
    grad_output: &Tensor,
    grad_input: Option<&mut Tensor>,
    grad_slope: Option<&mut Tensor>,
) -> GPResult<()> {
    let slope_data = slope.map(|s| s.as_slice().to_vec());
    let shape = input.shape();
    let mut dx = Array4::zeros((shape.n, shape.c, shape.h, shape.w));
    let mut dslope = vec![0.0f32; shape.c];
    for ((n, c, h, w), xv) in input.data().indexed_iter() {
        let yv = output.data()[(n, c, h, w)];
        let gv = grad_output.data()[(n, c, h, w)];
        let sl = slope_data.as_ref().map(|s| s[c]).unwrap_or(0.0);
        dx[(n, c, h, w)] = gv * derivative(params.kind, yv, *xv, sl, params.clamp_min, params.clamp_max);
        if matches!(params.kind, Activation::Prelu) && *xv <= 0.0 {
            dslope[c] += gv * *xv;
        }
    }
    if let Some(gi) = grad_input {
        gi.accumulate_grad(&dx)?;
    }
    if let Some(gs) = grad_slope {
        let arr = Array4::from_shape_vec((1, shape.c, 1, 1), dslope)
            .expect("prelu slope gradient has exactly c elements");
        gs.accumulate_grad(&arr)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Shape4;

    #[test]
    fn relu_zeroes_negatives() {
        let input = Tensor::from_array(
            "x",
            Array4::from_shape_vec((1, 1, 1, 4), vec![-2.0, -0.5, 0.0, 3.0]).unwrap(),
        );
        let mut output = Tensor::zeros("y", Shape4::new(1, 1, 1, 4));
        forward(&Params::new(Activation::Relu), &input, None, &mut output).unwrap();
        assert_eq!(output.as_slice(), &[0.0, 0.0, 0.0, 3.0]);
    }

    #[test]
    fn logistic_backward_matches_sigmoid_derivative() {
        let input = Tensor::from_array("x", Array4::from_shape_vec((1, 1, 1, 1), vec![0.0]).unwrap());
        let mut output = Tensor::zeros("y", Shape4::new(1, 1, 1, 1));
        let p = Params::new(Activation::Logistic);
        forward(&p, &input, None, &mut output).unwrap();
        assert!((output.as_slice()[0] - 0.5).abs() < 1e-6);

        let mut grad_input = Tensor::zeros("gx", Shape4::new(1, 1, 1, 1));
        grad_input.allocate_grad();
        let grad_output = Tensor::from_array("gy", Array4::from_shape_vec((1, 1, 1, 1), vec![1.0]).unwrap());
        backward(&p, &input, &output, None, &grad_output, Some(&mut grad_input), None).unwrap();
        assert!((grad_input.grad().unwrap()[(0, 0, 0, 0)] - 0.25).abs() < 1e-6);
    }
}
