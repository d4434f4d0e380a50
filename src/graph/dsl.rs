//! Ergonomic network assembly on top of [`Network::add_tensor`] /
//! [`Network::add_node`], mirroring the teacher's `GraphBuilder`: one method
//! per layer kind, each allocating whatever tensors the layer needs, wiring
//! up the node, and handing back the output tensor so calls chain.
//!
//! Unlike the teacher's builder, which stitches together primitive ops
//! (`matmul`, `add`) into composite helpers like `linear`, every method here
//! maps onto exactly one of the engine's seventeen node kinds -- there's no
//! lower layer of primitive ops to compose from.

use ndarray::Array4;
use ndarray_rand::rand_distr::StandardNormal;
use ndarray_rand::RandomExt;

use crate::errors::GPResult;
use crate::graph::node::Node;
use crate::graph::Network;
use crate::layers::*;
use crate::tensor::Tensor;
use crate::types::{Activation, AvgPoolMode, CostKind, Shape4, TensorId};

pub struct NetworkBuilder<'a> {
    net: &'a mut Network,
    counter: usize,
}

impl<'a> NetworkBuilder<'a> {
    pub fn new(net: &'a mut Network) -> Self {
        Self { net, counter: 0 }
    }

    fn name(&mut self, kind: &str) -> String {
        self.counter += 1;
        format!("{}_{}", kind, self.counter)
    }

    /// He-scaled random weights, matching the fan-in normalization every
    /// conv/linear layer in the teacher's `layers::linear` uses.
    fn random_weights(&self, shape: (usize, usize, usize, usize), fan_in: usize) -> Array4<f32> {
        let scale = (2.0 / fan_in.max(1) as f32).sqrt();
        Array4::random(shape, StandardNormal) * scale
    }

    /// Declares a network input: zero-filled, non-trainable.
    pub fn input(&mut self, shape: Shape4) -> TensorId {
        let name = self.name("input");
        self.net.add_tensor(Tensor::zeros(name, shape))
    }

    fn output_tensor(&mut self, kind: &str, shape: Shape4) -> TensorId {
        let name = self.name(kind);
        self.net.add_tensor(Tensor::zeros(name, shape))
    }

    pub fn conv2d(
        &mut self,
        src: TensorId,
        out_c: usize,
        kh: usize,
        kw: usize,
        stride: usize,
        pad: usize,
        activation: Activation,
    ) -> GPResult<TensorId> {
        let in_shape = self.net.tensor(src).shape();
        let weights = self.random_weights((out_c, in_shape.c, kh, kw), in_shape.c * kh * kw);
        let weights_id = self.net.add_tensor(Tensor::from_array(self.name("conv2d.weights"), weights));
        let bias_id = self.net.add_tensor(Tensor::zeros(self.name("conv2d.bias"), Shape4::new(1, out_c, 1, 1)));
        self.net.mark_trainable(weights_id);
        self.net.mark_trainable(bias_id);

        let params = conv2d::Params {
            in_c: in_shape.c,
            out_c,
            kh,
            kw,
            stride,
            pad,
            weights: weights_id,
            bias: bias_id,
            fused_bn: None,
            activation,
        };
        let (out_h, out_w) = params.output_hw(in_shape.h, in_shape.w);
        let dst = self.output_tensor("conv2d.out", Shape4::new(in_shape.n, out_c, out_h, out_w));
        let name = self.name("conv2d");
        self.net.add_node(Node::new(name, vec![src], vec![dst], LayerKind::Conv2D(params)))?;
        Ok(dst)
    }

    pub fn depthwise_conv2d(
        &mut self,
        src: TensorId,
        kh: usize,
        kw: usize,
        stride: usize,
        pad: usize,
        activation: Activation,
    ) -> GPResult<TensorId> {
        let in_shape = self.net.tensor(src).shape();
        let weights = self.random_weights((in_shape.c, 1, kh, kw), kh * kw);
        let weights_id = self.net.add_tensor(Tensor::from_array(self.name("depthwise.weights"), weights));
        let bias_id = self.net.add_tensor(Tensor::zeros(self.name("depthwise.bias"), Shape4::new(1, in_shape.c, 1, 1)));
        self.net.mark_trainable(weights_id);
        self.net.mark_trainable(bias_id);

        let params = depthwise_conv2d::Params {
            channels: in_shape.c,
            kh,
            kw,
            stride,
            pad,
            weights: weights_id,
            bias: bias_id,
            activation,
        };
        let (out_h, out_w) = params.output_hw(in_shape.h, in_shape.w);
        let dst = self.output_tensor("depthwise.out", Shape4::new(in_shape.n, in_shape.c, out_h, out_w));
        let name = self.name("depthwise_conv2d");
        self.net.add_node(Node::new(name, vec![src], vec![dst], LayerKind::DepthwiseConv2D(params)))?;
        Ok(dst)
    }

    pub fn transpose_conv2d(
        &mut self,
        src: TensorId,
        out_c: usize,
        kh: usize,
        kw: usize,
        stride: usize,
        pad: usize,
        activation: Activation,
    ) -> GPResult<TensorId> {
        let in_shape = self.net.tensor(src).shape();
        let weights = self.random_weights((in_shape.c, out_c, kh, kw), in_shape.c * kh * kw);
        let weights_id = self.net.add_tensor(Tensor::from_array(self.name("transpose_conv2d.weights"), weights));
        let bias_id = self.net.add_tensor(Tensor::zeros(self.name("transpose_conv2d.bias"), Shape4::new(1, out_c, 1, 1)));
        self.net.mark_trainable(weights_id);
        self.net.mark_trainable(bias_id);

        let params = transpose_conv2d::Params {
            in_c: in_shape.c,
            out_c,
            kh,
            kw,
            stride,
            pad,
            weights: weights_id,
            bias: bias_id,
            activation,
        };
        let (out_h, out_w) = params.output_hw(in_shape.h, in_shape.w);
        let dst = self.output_tensor("transpose_conv2d.out", Shape4::new(in_shape.n, out_c, out_h, out_w));
        let name = self.name("transpose_conv2d");
        self.net.add_node(Node::new(name, vec![src], vec![dst], LayerKind::TransposeConv2D(params)))?;
        Ok(dst)
    }

    pub fn fully_connected(&mut self, src: TensorId, out_features: usize, activation: Activation) -> GPResult<TensorId> {
        let in_shape = self.net.tensor(src).shape();
        let in_features = in_shape.c * in_shape.h * in_shape.w;
        let weights = self.random_weights((1, out_features, 1, in_features), in_features);
        let weights_id = self.net.add_tensor(Tensor::from_array(self.name("fc.weights"), weights));
        let bias_id = self.net.add_tensor(Tensor::zeros(self.name("fc.bias"), Shape4::new(1, 1, 1, out_features)));
        self.net.mark_trainable(weights_id);
        self.net.mark_trainable(bias_id);

        let params = fully_connected::Params {
            in_features,
            out_features,
            weights: weights_id,
            bias: bias_id,
            activation,
        };
        let dst = self.output_tensor("fc.out", Shape4::new(in_shape.n, 1, 1, out_features));
        let name = self.name("fully_connected");
        self.net.add_node(Node::new(name, vec![src], vec![dst], LayerKind::FullyConnected(params)))?;
        Ok(dst)
    }

    pub fn batchnorm(&mut self, src: TensorId) -> GPResult<TensorId> {
        let in_shape = self.net.tensor(src).shape();
        let c_shape = Shape4::new(1, in_shape.c, 1, 1);
        let scale_id = self.net.add_tensor(Tensor::from_array(self.name("bn.scale"), Array4::from_elem((1, in_shape.c, 1, 1), 1.0)));
        let bias_id = self.net.add_tensor(Tensor::zeros(self.name("bn.bias"), c_shape));
        let mean_id = self.net.add_tensor(Tensor::zeros(self.name("bn.mean"), c_shape));
        let var_id = self.net.add_tensor(Tensor::from_array(self.name("bn.var"), Array4::from_elem((1, in_shape.c, 1, 1), 1.0)));
        self.net.mark_trainable(scale_id);
        self.net.mark_trainable(bias_id);

        let params = batchnorm::Params {
            scale: scale_id,
            bias: bias_id,
            running_mean: mean_id,
            running_var: var_id,
        };
        let dst = self.output_tensor("bn.out", in_shape);
        let name = self.name("batchnorm");
        self.net.add_node(Node::new(name, vec![src], vec![dst], LayerKind::BatchNorm(params)))?;
        Ok(dst)
    }

    pub fn max_pool(&mut self, src: TensorId, size: usize, stride: usize) -> GPResult<TensorId> {
        let in_shape = self.net.tensor(src).shape();
        let params = pooling::MaxPoolParams { size, stride };
        let (out_h, out_w) = params.output_hw(in_shape.h, in_shape.w);
        let dst = self.output_tensor("maxpool.out", Shape4::new(in_shape.n, in_shape.c, out_h, out_w));
        let name = self.name("maxpool");
        self.net.add_node(Node::new(name, vec![src], vec![dst], LayerKind::MaxPool(params)))?;
        Ok(dst)
    }

    pub fn avg_pool_global(&mut self, src: TensorId) -> GPResult<TensorId> {
        let in_shape = self.net.tensor(src).shape();
        let dst = self.output_tensor("avgpool.out", Shape4::new(in_shape.n, in_shape.c, 1, 1));
        let name = self.name("avgpool");
        self.net.add_node(Node::new(name, vec![src], vec![dst], LayerKind::AvgPool(AvgPoolMode::Global)))?;
        Ok(dst)
    }

    pub fn avg_pool_strided(&mut self, src: TensorId, size: usize, stride: usize) -> GPResult<TensorId> {
        let in_shape = self.net.tensor(src).shape();
        let out_h = (in_shape.h - size) / stride + 1;
        let out_w = (in_shape.w - size) / stride + 1;
        let dst = self.output_tensor("avgpool.out", Shape4::new(in_shape.n, in_shape.c, out_h, out_w));
        let name = self.name("avgpool");
        self.net
            .add_node(Node::new(name, vec![src], vec![dst], LayerKind::AvgPool(AvgPoolMode::Strided { size, stride })))?;
        Ok(dst)
    }

    pub fn activation(&mut self, src: TensorId, kind: Activation) -> GPResult<TensorId> {
        let in_shape = self.net.tensor(src).shape();
        let prelu_slope = if kind == Activation::Prelu {
            let slope_id = self.net.add_tensor(Tensor::from_array(
                self.name("prelu.slope"),
                Array4::from_elem((1, in_shape.c, 1, 1), 0.25),
            ));
            self.net.mark_trainable(slope_id);
            Some(slope_id)
        } else {
            None
        };
        let params = activation::Params {
            kind,
            clamp_min: 0.0,
            clamp_max: 1.0,
            prelu_slope,
        };
        let dst = self.output_tensor("activation.out", in_shape);
        let name = self.name("activation");
        self.net.add_node(Node::new(name, vec![src], vec![dst], LayerKind::Activation(params)))?;
        Ok(dst)
    }

    pub fn softmax(&mut self, src: TensorId) -> GPResult<TensorId> {
        let in_shape = self.net.tensor(src).shape();
        let dst = self.output_tensor("softmax.out", in_shape);
        let name = self.name("softmax");
        self.net.add_node(Node::new(name, vec![src], vec![dst], LayerKind::Softmax))?;
        Ok(dst)
    }

    pub fn dropout(&mut self, src: TensorId, rate: f32) -> GPResult<TensorId> {
        let in_shape = self.net.tensor(src).shape();
        let dst = self.output_tensor("dropout.out", in_shape);
        let name = self.name("dropout");
        self.net
            .add_node(Node::new(name, vec![src], vec![dst], LayerKind::Dropout(dropout::Params { rate })))?;
        Ok(dst)
    }

    pub fn concat(&mut self, srcs: &[TensorId]) -> GPResult<TensorId> {
        let first = self.net.tensor(srcs[0]).shape();
        let total_c: usize = srcs.iter().map(|&id| self.net.tensor(id).shape().c).sum();
        let dst = self.output_tensor("concat.out", Shape4::new(first.n, total_c, first.h, first.w));
        let name = self.name("concat");
        self.net.add_node(Node::new(name, srcs.to_vec(), vec![dst], LayerKind::Concat))?;
        Ok(dst)
    }

    pub fn eltwise_add(&mut self, a: TensorId, b: TensorId) -> GPResult<TensorId> {
        let shape = self.net.tensor(a).shape();
        let dst = self.output_tensor("eltwise_add.out", shape);
        let name = self.name("eltwise_add");
        self.net.add_node(Node::new(name, vec![a, b], vec![dst], LayerKind::EltwiseAdd))?;
        Ok(dst)
    }

    pub fn upsample(&mut self, src: TensorId, factor: usize) -> GPResult<TensorId> {
        let in_shape = self.net.tensor(src).shape();
        let dst = self.output_tensor(
            "upsample.out",
            Shape4::new(in_shape.n, in_shape.c, in_shape.h * factor, in_shape.w * factor),
        );
        let name = self.name("upsample");
        self.net
            .add_node(Node::new(name, vec![src], vec![dst], LayerKind::Upsample(upsample::Params { factor })))?;
        Ok(dst)
    }

    pub fn reshape(&mut self, src: TensorId, output_shape: Shape4) -> GPResult<TensorId> {
        let dst = self.output_tensor("reshape.out", output_shape);
        let name = self.name("reshape");
        self.net
            .add_node(Node::new(name, vec![src], vec![dst], LayerKind::Reshape(reshape::Params { output_shape })))?;
        Ok(dst)
    }

    pub fn lrn(&mut self, src: TensorId, window: usize, alpha: f32, beta: f32, k: f32) -> GPResult<TensorId> {
        let in_shape = self.net.tensor(src).shape();
        let dst = self.output_tensor("lrn.out", in_shape);
        let name = self.name("lrn");
        self.net
            .add_node(Node::new(name, vec![src], vec![dst], LayerKind::Lrn(lrn::Params { window, alpha, beta, k })))?;
        Ok(dst)
    }

    /// Wires a Euclidean-loss node; the returned tensor holds the scalar
    /// loss value broadcast across its single element.
    pub fn cost_euclidean(&mut self, pred: TensorId, target: TensorId) -> GPResult<TensorId> {
        let dst = self.output_tensor("cost.out", Shape4::new(1, 1, 1, 1));
        let name = self.name("cost");
        let params = cost::Params {
            kind: CostKind::Euclidean,
            margin: 0.0,
        };
        self.net.add_node(Node::new(name, vec![pred, target], vec![dst], LayerKind::Cost(params)))?;
        Ok(dst)
    }

    pub fn cost_lifted_struct(&mut self, pred: TensorId, labels: TensorId, margin: f32) -> GPResult<TensorId> {
        let dst = self.output_tensor("cost.out", Shape4::new(1, 1, 1, 1));
        let name = self.name("cost");
        let params = cost::Params {
            kind: CostKind::LiftedStruct,
            margin,
        };
        self.net.add_node(Node::new(name, vec![pred, labels], vec![dst], LayerKind::Cost(params)))?;
        Ok(dst)
    }

    pub fn yolo(&mut self, src: TensorId, anchors: Vec<(f32, f32)>, num_classes: usize, image_size: usize) -> GPResult<TensorId> {
        let in_shape = self.net.tensor(src).shape();
        let dst = self.output_tensor("yolo.out", in_shape);
        let name = self.name("yolo");
        let params = yolo::Params {
            anchors,
            num_classes,
            image_size,
        };
        self.net.add_node(Node::new(name, vec![src], vec![dst], LayerKind::Yolo(params)))?;
        Ok(dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Shape4;

    #[test]
    fn builds_a_small_classifier_end_to_end() {
        let mut net = Network::new();
        let (logits, _input) = {
            let mut b = NetworkBuilder::new(&mut net);
            let input = b.input(Shape4::new(2, 1, 8, 8));
            let conv = b.conv2d(input, 4, 3, 3, 1, 1, Activation::Relu).unwrap();
            let pooled = b.max_pool(conv, 2, 2).unwrap();
            let flat = b.reshape(pooled, Shape4::new(2, 1, 1, 4 * 4 * 4)).unwrap();
            let logits = b.fully_connected(flat, 3, Activation::None).unwrap();
            (logits, input)
        };
        net.compile().unwrap();
        assert_eq!(net.tensor(logits).shape().as_tuple(), (2, 1, 1, 3));
    }

    #[test]
    fn concat_sums_channel_dimension() {
        let mut net = Network::new();
        let dst = {
            let mut b = NetworkBuilder::new(&mut net);
            let a = b.input(Shape4::new(1, 2, 4, 4));
            let c = b.input(Shape4::new(1, 3, 4, 4));
            b.concat(&[a, c]).unwrap()
        };
        assert_eq!(net.tensor(dst).shape().c, 5);
    }
}
