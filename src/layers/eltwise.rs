//! Element-wise addition of two equally-shaped tensors, mirroring
//! `bcnn_eltwise_layer.c` (the `ELTWISE` layer kind, restricted to the `sum`
//! op). Used both standalone and as the residual-add inside detection
//! backbones.

use crate::errors::{GPError, GPResult};
use crate::tensor::Tensor;

pub fn forward(a: &Tensor, b: &Tensor, output: &mut Tensor) -> GPResult<()> {
    if a.shape().as_tuple() != b.shape().as_tuple() {
        return Err(GPError::incompatible_shapes(
            &[a.shape().n, a.shape().c, a.shape().h, a.shape().w],
            &[b.shape().n, b.shape().c, b.shape().h, b.shape().w],
        ));
    }
    let sum = a.data() + b.data();
    output.set_data(&sum)
}

pub fn backward(grad_output: &Tensor, grad_a: &mut Tensor, grad_b: &mut Tensor) -> GPResult<()> {
    grad_a.accumulate_grad(grad_output.data())?;
    grad_b.accumulate_grad(grad_output.data())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Shape4;
    use ndarray::Array4;

    #[test]
    fn forward_sums_elementwise() {
        let a = Tensor::from_array("a", Array4::from_elem((1, 1, 1, 2), 1.0));
        let b = Tensor::from_array("b", Array4::from_elem((1, 1, 1, 2), 2.0));
        let mut out = Tensor::zeros("out", Shape4::new(1, 1, 1, 2));
        forward(&a, &b, &mut out).unwrap();
        assert_eq!(out.as_slice(), &[3.0, 3.0]);
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let a = Tensor::from_array("a", Array4::from_elem((1, 1, 1, 2), 1.0));
        let b = Tensor::from_array("b", Array4::from_elem((1, 1, 1, 3), 2.0));
        let mut out = Tensor::zeros("out", Shape4::new(1, 1, 1, 2));
        assert!(forward(&a, &b, &mut out).is_err());
    }
}
