//! Shape reinterpretation with a fixed element count, mirroring
//! `bcnn_reshape_layer.c`. NCHW data is C-contiguous, so reshape is a pure
//! metadata operation: forward and backward are both plain copies.

use serde::{Deserialize, Serialize};

use crate::errors::{GPError, GPResult};
use crate::tensor::Tensor;
use crate::types::Shape4;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Params {
    pub output_shape: Shape4,
}

pub fn forward(params: &Params, input: &Tensor, output: &mut Tensor) -> GPResult<()> {
    if input.len() != params.output_shape.size() {
        return Err(GPError::InvalidData(format!(
            "reshape element count mismatch: input has {}, target shape has {}",
            input.len(),
            params.output_shape.size()
        )));
    }
    let reshaped = input
        .data()
        .view()
        .to_shape(params.output_shape.as_tuple())
        .map_err(|e| GPError::InternalError(format!("reshape view: {e}")))?
        .to_owned();
    output.set_data(&reshaped)
}

pub fn backward(grad_output: &Tensor, grad_input: &mut Tensor) -> GPResult<()> {
    let target = grad_input.shape().as_tuple();
    let reshaped = grad_output
        .data()
        .view()
        .to_shape(target)
        .map_err(|e| GPError::InternalError(format!("reshape backward view: {e}")))?
        .to_owned();
    grad_input.accumulate_grad(&reshaped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    #[test]
    fn reshape_preserves_element_order() {
        let input = Tensor::from_array("x", Array4::from_shape_vec((1, 2, 2, 1), vec![1.0, 2.0, 3.0, 4.0]).unwrap());
        let params = Params {
            output_shape: Shape4::new(1, 1, 1, 4),
        };
        let mut output = Tensor::zeros("y", params.output_shape);
        forward(&params, &input, &mut output).unwrap();
        assert_eq!(output.as_slice(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn mismatched_element_count_is_rejected() {
        let input = Tensor::from_array("x", Array4::from_shape_vec((1, 2, 2, 1), vec![1.0, 2.0, 3.0, 4.0]).unwrap());
        let params = Params {
            output_shape: Shape4::new(1, 1, 1, 5),
        };
        let mut output = Tensor::zeros("y", Shape4::new(1, 1, 1, 5));
        assert!(forward(&params, &input, &mut output).is_err());
    }
}
