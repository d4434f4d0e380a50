use serde::{Deserialize, Serialize};

/// Index of a tensor in a [`crate::graph::Network`]'s tensor table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct TensorId(pub usize);

/// Index of a node in a [`crate::graph::Network`]'s node list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// Physical device a tensor's data lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Device {
    Cpu,
    #[cfg(feature = "cuda")]
    Cuda(usize),
}

/// Execution mode of a network, mirroring `bcnn_mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Predict,
    Train,
    Valid,
}

impl Mode {
    pub fn is_training(&self) -> bool {
        matches!(self, Mode::Train)
    }
}

/// Padding convention for pooling and convolution-like layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Padding {
    /// Pad so the output matches `ceil(in / stride)`.
    Same,
    /// No padding.
    Valid,
    /// Legacy compatibility padding kept for checkpoint parity with older models.
    Caffe,
}

/// Element-wise activation kinds, mirroring `bcnn_activation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    None,
    Tanh,
    Relu,
    Ramp,
    Softplus,
    /// Leaky ReLU, negative slope fixed at 0.01.
    LeakyRelu,
    Abs,
    Clamp,
    /// Per-channel learned negative slope; owns a parameter tensor of length `c`.
    Prelu,
    Logistic,
}

/// Optimizer family, mirroring `bcnn_optimizer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizerKind {
    Sgd,
    Adam,
}

/// Learning-rate schedule, mirroring `bcnn_lr_decay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LrSchedule {
    Constant,
    Step,
    Inv,
    Exp,
    Poly,
    Sigmoid,
}

/// Cost-layer kind, mirroring `bcnn_loss`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CostKind {
    Euclidean,
    LiftedStruct,
}

/// Avg-pool variant. Global resolves the spec's flagged ambiguity (output is
/// always 1x1); Strided is the supplemented windowed form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AvgPoolMode {
    Global,
    Strided { size: usize, stride: usize },
}

/// A four-dimensional NCHW shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape4 {
    pub n: usize,
    pub c: usize,
    pub h: usize,
    pub w: usize,
}

impl Shape4 {
    pub fn new(n: usize, c: usize, h: usize, w: usize) -> Self {
        Self { n, c, h, w }
    }

    pub fn size(&self) -> usize {
        self.n * self.c * self.h * self.w
    }

    pub fn size3d(&self) -> usize {
        self.c * self.h * self.w
    }

    pub fn as_tuple(&self) -> (usize, usize, usize, usize) {
        (self.n, self.c, self.h, self.w)
    }
}

impl From<(usize, usize, usize, usize)> for Shape4 {
    fn from(t: (usize, usize, usize, usize)) -> Self {
        Shape4::new(t.0, t.1, t.2, t.3)
    }
}
