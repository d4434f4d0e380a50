//! The engine's layer set (spec C5): one module per layer kind, each
//! exposing plain `forward`/`backward` functions over [`crate::tensor::Tensor`]
//! rather than a shared trait object. `bcnn_node` dispatches through a
//! function-pointer table keyed by `bcnn_layer_type`; [`crate::graph::Network`]
//! does the analogous thing here with a `match` over [`LayerKind`], since a
//! `match` on a closed enum is the idiomatic stand-in once the only
//! consumer of these layers is the engine's own compiled-in graph (no
//! third-party layer registration is in scope, which is what made the
//! teacher's `#[typetag::serde]` trait-object dispatch worth its cost).

pub mod activation;
pub mod batchnorm;
pub mod concat;
pub mod conv2d;
pub mod cost;
pub mod depthwise_conv2d;
pub mod dropout;
pub mod eltwise;
pub mod fully_connected;
pub mod lrn;
pub mod pooling;
pub mod reshape;
pub mod softmax;
pub mod transpose_conv2d;
pub mod upsample;
pub mod yolo;

use serde::{Deserialize, Serialize};

use crate::types::{Activation, AvgPoolMode};

/// One of the engine's seventeen node kinds, holding that layer's
/// hyperparameters and [`crate::types::TensorId`] references to its
/// parameter tensors in the owning network's tensor table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LayerKind {
    Conv2D(conv2d::Params),
    TransposeConv2D(transpose_conv2d::Params),
    DepthwiseConv2D(depthwise_conv2d::Params),
    FullyConnected(fully_connected::Params),
    BatchNorm(batchnorm::Params),
    Lrn(lrn::Params),
    MaxPool(pooling::MaxPoolParams),
    AvgPool(AvgPoolMode),
    Activation(activation::Params),
    Softmax,
    Dropout(dropout::Params),
    Concat,
    EltwiseAdd,
    Upsample(upsample::Params),
    Reshape(reshape::Params),
    Cost(cost::Params),
    Yolo(yolo::Params),
}

impl LayerKind {
    pub fn name(&self) -> &'static str {
        match self {
            LayerKind::Conv2D(_) => "conv2d",
            LayerKind::TransposeConv2D(_) => "transpose_conv2d",
            LayerKind::DepthwiseConv2D(_) => "depthwise_conv2d",
            LayerKind::FullyConnected(_) => "fully_connected",
            LayerKind::BatchNorm(_) => "batchnorm",
            LayerKind::Lrn(_) => "lrn",
            LayerKind::MaxPool(_) => "maxpool",
            LayerKind::AvgPool(_) => "avgpool",
            LayerKind::Activation(_) => "activation",
            LayerKind::Softmax => "softmax",
            LayerKind::Dropout(_) => "dropout",
            LayerKind::Concat => "concat",
            LayerKind::EltwiseAdd => "eltwise_add",
            LayerKind::Upsample(_) => "upsample",
            LayerKind::Reshape(_) => "reshape",
            LayerKind::Cost(_) => "cost",
            LayerKind::Yolo(_) => "yolo",
        }
    }
}

/// Per-node mutable scratch that a layer's backward pass needs but that
/// isn't itself a learned parameter (pooling argmax indices, batch-norm
/// batch statistics, dropout masks, LRN normalizers). Allocated once per
/// node at compile time and reused across every forward/backward call.
#[derive(Debug, Default, Clone)]
pub enum LayerState {
    #[default]
    None,
    MaxPool {
        argmax: Vec<usize>,
    },
    BatchNorm(batchnorm::Cache),
    Dropout {
        mask: Vec<f32>,
    },
    Lrn {
        scale: Vec<f32>,
    },
    /// Cost-layer gradient, computed alongside the loss value during
    /// forward and consumed (applied) by the matching backward call.
    Cost {
        grad: ndarray::Array4<f32>,
    },
}

/// Two-argument activation evaluation shared by every layer that fuses an
/// activation into its own forward pass (conv2d, fully_connected,
/// depthwise/transpose conv). PReLU's per-channel slope and Clamp's bounds
/// aren't available at this call site -- networks that need either wrap a
/// dedicated [`activation::Params`] node around a `None`-activation layer
/// instead of fusing it.
pub(crate) fn activation_scalar(kind: Activation, x: f32) -> f32 {
    activation::apply(kind, x, 0.0, 0.0, 1.0)
}

pub(crate) fn activation_derivative_scalar(kind: Activation, y: f32) -> f32 {
    match kind {
        Activation::Tanh => 1.0 - y * y,
        Activation::Relu => {
            if y > 0.0 {
                1.0
            } else {
                0.0
            }
        }
        Activation::LeakyRelu => {
            if y > 0.0 {
                1.0
            } else {
                0.01
            }
        }
        Activation::Softplus => 1.0 - (-y).exp(),
        Activation::Logistic => y * (1.0 - y),
        Activation::None => 1.0,
        // Ramp/Abs/Clamp/Prelu depend on the pre-activation sign in ways a
        // post-activation value alone can't recover; fused layers that use
        // them should route through the standalone activation layer, whose
        // backward has access to both x and y.
        Activation::Ramp | Activation::Abs | Activation::Clamp | Activation::Prelu => 1.0,
    }
}
