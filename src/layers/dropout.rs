//! Inverted dropout, mirroring `bcnn_dropout_layer.c`: in `Mode::Train` a
//! Bernoulli mask is drawn and scaled by `1 / (1 - rate)`; in
//! `Mode::Predict`/`Mode::Valid` the layer is the identity (spec edge case).

use ndarray::Array4;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::errors::GPResult;
use crate::tensor::Tensor;
use crate::types::Mode;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Params {
    pub rate: f32,
}

pub fn forward<R: Rng>(params: &Params, input: &Tensor, output: &mut Tensor, mode: Mode, mask: &mut Vec<f32>, rng: &mut R) -> GPResult<()> {
    if !mode.is_training() || params.rate <= 0.0 {
        output.set_data(input.data())?;
        mask.clear();
        return Ok(());
    }
    let scale = 1.0 / (1.0 - params.rate);
    mask.clear();
    mask.resize(input.len(), 0.0);
    for m in mask.iter_mut() {
        *m = if rng.gen::<f32>() < params.rate { 0.0 } else { scale };
    }
    let shape = input.shape();
    let mut out = Array4::zeros((shape.n, shape.c, shape.h, shape.w));
    for (idx, (o, &x)) in out.iter_mut().zip(input.data().iter()).enumerate() {
        *o = x * mask[idx];
    }
    output.set_data(&out)
}

pub fn backward(input: &Tensor, grad_output: &Tensor, mask: &[f32], grad_input: &mut Tensor) -> GPResult<()> {
    let shape = input.shape();
    if mask.is_empty() {
        grad_input.accumulate_grad(grad_output.data())?;
        return Ok(());
    }
    let mut dx = Array4::zeros((shape.n, shape.c, shape.h, shape.w));
    for (idx, (d, &g)) in dx.iter_mut().zip(grad_output.data().iter()).enumerate() {
        *d = g * mask[idx];
    }
    grad_input.accumulate_grad(&dx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Shape4;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn predict_mode_is_identity() {
        let input = Tensor::from_array("x", Array4::from_shape_vec((1, 1, 1, 4), vec![1.0, 2.0, 3.0, 4.0]).unwrap());
        let mut output = Tensor::zeros("y", Shape4::new(1, 1, 1, 4));
        let mut mask = Vec::new();
        let mut rng = StdRng::seed_from_u64(0);
        forward(&Params { rate: 0.5 }, &input, &mut output, Mode::Predict, &mut mask, &mut rng).unwrap();
        assert_eq!(output.as_slice(), input.as_slice());
        assert!(mask.is_empty());
    }

    #[test]
    fn train_mode_scales_surviving_units() {
        let input = Tensor::from_array("x", Array4::from_shape_vec((1, 1, 1, 4), vec![1.0; 4]).unwrap());
        let mut output = Tensor::zeros("y", Shape4::new(1, 1, 1, 4));
        let mut mask = Vec::new();
        let mut rng = StdRng::seed_from_u64(1);
        forward(&Params { rate: 0.5 }, &input, &mut output, Mode::Train, &mut mask, &mut rng).unwrap();
        for (&o, &m) in output.as_slice().iter().zip(mask.iter()) {
            assert!(o == 0.0 || (o - 2.0).abs() < 1e-6);
            assert!(m == 0.0 || (m - 2.0).abs() < 1e-6);
        }
    }
}
