//! Channel-axis concatenation, mirroring `bcnn_concat_layer.c`: N inputs of
//! identical `(n, h, w)` are stacked along the channel axis in declaration
//! order.

use ndarray::{concatenate, Array4, Axis};
use serde::{Deserialize, Serialize};

use crate::errors::{GPError, GPResult};
use crate::tensor::Tensor;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Params;

pub fn forward(inputs: &[&Tensor], output: &mut Tensor) -> GPResult<()> {
    if inputs.is_empty() {
        return Err(GPError::InvalidData("concat requires at least one input".into()));
    }
    let views: Vec<_> = inputs.iter().map(|t| t.data().view()).collect();
    let out = concatenate(Axis(1), &views).map_err(|e| GPError::InternalError(format!("concat: {e}")))?;
    output.set_data(&out)
}

pub fn backward(inputs: &[&Tensor], grad_output: &Tensor, grad_inputs: &mut [&mut Tensor]) -> GPResult<()> {
    let mut offset = 0usize;
    for (input, grad_input) in inputs.iter().zip(grad_inputs.iter_mut()) {
        let c = input.shape().c;
        let slice = grad_output
            .data()
            .slice(ndarray::s![.., offset..offset + c, .., ..])
            .to_owned();
        let slice: Array4<f32> = slice;
        grad_input.accumulate_grad(&slice)?;
        offset += c;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Shape4;
    use ndarray::Array4;

    #[test]
    fn concat_stacks_along_channel_axis() {
        let a = Tensor::from_array("a", Array4::from_elem((1, 2, 1, 1), 1.0));
        let b = Tensor::from_array("b", Array4::from_elem((1, 3, 1, 1), 2.0));
        let mut out = Tensor::zeros("out", Shape4::new(1, 5, 1, 1));
        forward(&[&a, &b], &mut out).unwrap();
        assert_eq!(out.as_slice(), &[1.0, 1.0, 2.0, 2.0, 2.0]);
    }
}
