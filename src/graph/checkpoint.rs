//! Binary checkpoint I/O, byte-exact with `bcnn_write_model`/`bcnn_load_model`.
//!
//! The format carries no shape metadata of its own: the network's tensor
//! table and node list (built the same way both at save and load time) are
//! what assigns meaning to each run of floats. A header of four little-
//! endian values is followed by one parameter block per node, in
//! declaration order, for whichever nodes own parameters.

use std::io::{Read, Write};

use crate::errors::{GPError, GPResult};
use crate::layers::LayerKind;
use crate::types::Activation;

use super::Network;

/// `bcnn_write_model` wrote the fused-batch-norm scale alongside mean/
/// variance; older checkpoints predate that field and only carry the two
/// statistics. `Legacy` reproduces that shorter stream on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Current,
    Legacy,
}

fn write_f32s<W: Write>(w: &mut W, values: &[f32]) -> GPResult<()> {
    for v in values {
        w.write_all(&v.to_le_bytes())?;
    }
    Ok(())
}

fn read_f32s<R: Read>(r: &mut R, len: usize) -> GPResult<Vec<f32>> {
    let mut buf = vec![0u8; len * 4];
    r.read_exact(&mut buf).map_err(|e| {
        GPError::InvalidData(format!("checkpoint truncated while reading {} floats: {}", len, e))
    })?;
    Ok(buf.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect())
}

fn check_len(name: &str, expected: usize, found: usize) -> GPResult<()> {
    if expected != found {
        return Err(GPError::InvalidData(format!(
            "checkpoint tensor {:?}: expected length {}, found {}",
            name, expected, found
        )));
    }
    Ok(())
}

/// Writes `learner.base_lr`, `learner.sgd.momentum`, `learner.sgd.weight_decay`,
/// `learner.seen` as the four-value header, then each parameterized node's
/// bias, weight, and (for conv) fused-batch-norm statistics, in declaration
/// order.
pub fn save<W: Write>(net: &Network, w: &mut W, format: Format) -> GPResult<()> {
    write_f32s(w, &[net.learner.base_lr, net.learner.sgd.momentum, net.learner.sgd.weight_decay])?;
    w.write_all(&(net.learner.seen as i32).to_le_bytes())?;

    for node in &net.nodes {
        match &node.kind {
            LayerKind::Conv2D(p) => {
                write_f32s(w, net.tensor(p.bias).as_slice())?;
                write_f32s(w, net.tensor(p.weights).as_slice())?;
                if let Some(bn) = &p.fused_bn {
                    write_f32s(w, net.tensor(bn.running_mean).as_slice())?;
                    write_f32s(w, net.tensor(bn.running_var).as_slice())?;
                    if format == Format::Current {
                        write_f32s(w, net.tensor(bn.scale).as_slice())?;
                    }
                }
            }
            LayerKind::TransposeConv2D(p) => {
                write_f32s(w, net.tensor(p.bias).as_slice())?;
                write_f32s(w, net.tensor(p.weights).as_slice())?;
            }
            LayerKind::DepthwiseConv2D(p) => {
                write_f32s(w, net.tensor(p.bias).as_slice())?;
                write_f32s(w, net.tensor(p.weights).as_slice())?;
            }
            LayerKind::FullyConnected(p) => {
                write_f32s(w, net.tensor(p.bias).as_slice())?;
                write_f32s(w, net.tensor(p.weights).as_slice())?;
            }
            LayerKind::BatchNorm(p) => {
                write_f32s(w, net.tensor(p.running_mean).as_slice())?;
                write_f32s(w, net.tensor(p.running_var).as_slice())?;
                write_f32s(w, net.tensor(p.scale).as_slice())?;
                write_f32s(w, net.tensor(p.bias).as_slice())?;
            }
            LayerKind::Activation(p) => {
                if p.kind == Activation::Prelu {
                    if let Some(slope) = p.prelu_slope {
                        write_f32s(w, net.tensor(slope).as_slice())?;
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Reads a stream written by [`save`] back into an already-compiled network
/// whose tensor table and node list match the one that wrote it. Fails if
/// any node's declared parameter length doesn't match the tensor already
/// allocated for it.
pub fn load<R: Read>(net: &mut Network, r: &mut R, format: Format) -> GPResult<()> {
    let header = read_f32s(r, 3)?;
    net.learner.base_lr = header[0];
    net.learner.sgd.momentum = header[1];
    net.learner.sgd.weight_decay = header[2];
    let mut seen_buf = [0u8; 4];
    r.read_exact(&mut seen_buf)
        .map_err(|e| GPError::InvalidData(format!("checkpoint truncated reading seen count: {}", e)))?;
    net.learner.seen = i32::from_le_bytes(seen_buf) as usize;

    let node_kinds: Vec<LayerKind> = net.nodes.iter().map(|n| n.kind.clone()).collect();
    for kind in node_kinds {
        match kind {
            LayerKind::Conv2D(p) => {
                let len = net.tensor(p.bias).len();
                let bias = read_f32s(r, len)?;
                check_len("conv2d.bias", len, bias.len())?;
                net.tensor_mut(p.bias).as_slice_mut().copy_from_slice(&bias);

                let len = net.tensor(p.weights).len();
                let weights = read_f32s(r, len)?;
                check_len("conv2d.weights", len, weights.len())?;
                net.tensor_mut(p.weights).as_slice_mut().copy_from_slice(&weights);

                if let Some(bn) = &p.fused_bn {
                    let len = net.tensor(bn.running_mean).len();
                    let mean = read_f32s(r, len)?;
                    check_len("conv2d.bn_mean", len, mean.len())?;
                    net.tensor_mut(bn.running_mean).as_slice_mut().copy_from_slice(&mean);

                    let len = net.tensor(bn.running_var).len();
                    let var = read_f32s(r, len)?;
                    check_len("conv2d.bn_var", len, var.len())?;
                    net.tensor_mut(bn.running_var).as_slice_mut().copy_from_slice(&var);

                    if format == Format::Current {
                        let len = net.tensor(bn.scale).len();
                        let scale = read_f32s(r, len)?;
                        check_len("conv2d.bn_scale", len, scale.len())?;
                        net.tensor_mut(bn.scale).as_slice_mut().copy_from_slice(&scale);
                    }
                }
            }
            LayerKind::TransposeConv2D(p) => {
                load_bias_weights(net, r, p.bias, p.weights, "transpose_conv2d")?;
            }
            LayerKind::DepthwiseConv2D(p) => {
                load_bias_weights(net, r, p.bias, p.weights, "depthwise_conv2d")?;
            }
            LayerKind::FullyConnected(p) => {
                load_bias_weights(net, r, p.bias, p.weights, "fully_connected")?;
            }
            LayerKind::BatchNorm(p) => {
                let len = net.tensor(p.running_mean).len();
                let mean = read_f32s(r, len)?;
                check_len("batchnorm.mean", len, mean.len())?;
                net.tensor_mut(p.running_mean).as_slice_mut().copy_from_slice(&mean);

                let len = net.tensor(p.running_var).len();
                let var = read_f32s(r, len)?;
                check_len("batchnorm.var", len, var.len())?;
                net.tensor_mut(p.running_var).as_slice_mut().copy_from_slice(&var);

                let len = net.tensor(p.scale).len();
                let scale = read_f32s(r, len)?;
                check_len("batchnorm.scale", len, scale.len())?;
                net.tensor_mut(p.scale).as_slice_mut().copy_from_slice(&scale);

                let len = net.tensor(p.bias).len();
                let bias = read_f32s(r, len)?;
                check_len("batchnorm.bias", len, bias.len())?;
                net.tensor_mut(p.bias).as_slice_mut().copy_from_slice(&bias);
            }
            LayerKind::Activation(p) => {
                if p.kind == Activation::Prelu {
                    if let Some(slope) = p.prelu_slope {
                        let len = net.tensor(slope).len();
                        let data = read_f32s(r, len)?;
                        check_len("activation.prelu_slope", len, data.len())?;
                        net.tensor_mut(slope).as_slice_mut().copy_from_slice(&data);
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn load_bias_weights<R: Read>(
    net: &mut Network,
    r: &mut R,
    bias: crate::types::TensorId,
    weights: crate::types::TensorId,
    layer: &str,
) -> GPResult<()> {
    let len = net.tensor(bias).len();
    let data = read_f32s(r, len)?;
    check_len(&format!("{}.bias", layer), len, data.len())?;
    net.tensor_mut(bias).as_slice_mut().copy_from_slice(&data);

    let len = net.tensor(weights).len();
    let data = read_f32s(r, len)?;
    check_len(&format!("{}.weights", layer), len, data.len())?;
    net.tensor_mut(weights).as_slice_mut().copy_from_slice(&data);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Node;
    use crate::layers::fully_connected;
    use crate::tensor::Tensor;
    use crate::types::{Activation, Shape4};

    fn tiny_network() -> Network {
        let mut net = Network::new();
        let input = net.add_tensor(Tensor::zeros("input", Shape4::new(1, 1, 1, 4)));
        let weights = net.add_tensor(Tensor::from_array(
            "fc.weights",
            ndarray::Array4::from_shape_vec((1, 1, 4, 2), vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8]).unwrap(),
        ));
        let bias = net.add_tensor(Tensor::zeros("fc.bias", Shape4::new(1, 1, 1, 2)));
        let output = net.add_tensor(Tensor::zeros("output", Shape4::new(1, 1, 1, 2)));
        net.mark_trainable(weights);
        net.mark_trainable(bias);
        net.add_node(Node::new(
            "fc",
            vec![input],
            vec![output],
            LayerKind::FullyConnected(fully_connected::Params {
                in_features: 4,
                out_features: 2,
                weights,
                bias,
                activation: Activation::None,
            }),
        ))
        .unwrap();
        net
    }

    #[test]
    fn round_trips_header_and_weights() {
        let mut net = tiny_network();
        net.learner.base_lr = 0.05;
        net.learner.sgd.momentum = 0.9;
        net.learner.sgd.weight_decay = 0.0001;
        net.learner.seen = 42;

        let mut buf = Vec::new();
        save(&net, &mut buf, Format::Current).unwrap();

        let mut restored = tiny_network();
        let original_weights = net.tensor(match &net.nodes[0].kind {
            LayerKind::FullyConnected(p) => p.weights,
            _ => unreachable!(),
        });
        let weights_before = original_weights.as_slice().to_vec();

        load(&mut restored, &mut buf.as_slice(), Format::Current).unwrap();

        assert_eq!(restored.learner.base_lr, 0.05);
        assert_eq!(restored.learner.seen, 42);
        let weights_id = match &restored.nodes[0].kind {
            LayerKind::FullyConnected(p) => p.weights,
            _ => unreachable!(),
        };
        assert_eq!(restored.tensor(weights_id).as_slice(), weights_before.as_slice());
    }

    #[test]
    fn rejects_truncated_stream() {
        let net = tiny_network();
        let mut buf = Vec::new();
        save(&net, &mut buf, Format::Current).unwrap();
        buf.truncate(buf.len() - 2);

        let mut restored = tiny_network();
        let err = load(&mut restored, &mut buf.as_slice(), Format::Current);
        assert!(err.is_err());
    }
}
