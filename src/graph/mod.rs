//! The compute graph: a flat tensor table, a flat node list addressed by
//! integer index, and the forward/backward/update traversal discipline.
//! Grounded on `bcnn_net`'s own flat `tensors`/`nodes` vectors (`bcnn_net.c`),
//! generalized from the teacher's recursive, memoized `Graph::execute` (which
//! assumes an acyclic dependency DAG discovered at call time) to the spec's
//! fixed declaration-order traversal: forward runs nodes 0..n, backward runs
//! them n..0, and every destination tensor's gradient is additive across
//! however many nodes write to it.

pub mod checkpoint;
pub mod dsl;
pub mod node;

use ndarray::Array4;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::backend::Workspace;
use crate::errors::{GPError, GPResult};
use crate::layers::*;
use crate::optim::{self, AdamConfig, ParamState, SgdConfig};
use crate::tensor::Tensor;
use crate::types::{CostKind, LrSchedule, Mode, OptimizerKind, TensorId};

pub use node::Node;

/// Optimizer/schedule configuration, mirroring `bcnn_learner`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Learner {
    pub optimizer: OptimizerKind,
    pub schedule: LrSchedule,
    pub base_lr: f32,
    pub gamma: f32,
    pub power: f32,
    pub step_size: usize,
    pub sgd: SgdConfig,
    pub adam: AdamConfig,
    pub seen: usize,
}

impl Default for Learner {
    fn default() -> Self {
        Self {
            optimizer: OptimizerKind::Sgd,
            schedule: LrSchedule::Constant,
            base_lr: 0.01,
            gamma: 0.1,
            power: 1.0,
            step_size: 1000,
            sgd: SgdConfig {
                momentum: 0.9,
                weight_decay: 0.0005,
            },
            adam: AdamConfig::default(),
            seen: 0,
        }
    }
}

impl Learner {
    pub fn current_lr(&self) -> f32 {
        optim::learning_rate(self.schedule, self.base_lr, self.gamma, self.power, self.step_size, self.seen)
    }
}

pub struct Network {
    tensors: Vec<Tensor>,
    nodes: Vec<Node>,
    /// `Some` for every tensor that owns a gradient and an optimizer slot
    /// (weights, biases, batch-norm scale/shift); `None` for activations and
    /// the network's declared inputs.
    param_states: Vec<Option<ParamState>>,
    mode: Mode,
    pub learner: Learner,
    workspace: Workspace,
    rng: StdRng,
}

impl Network {
    pub fn new() -> Self {
        Self {
            tensors: Vec::new(),
            nodes: Vec::new(),
            param_states: Vec::new(),
            mode: Mode::Train,
            learner: Learner::default(),
            workspace: Workspace::new(),
            rng: StdRng::seed_from_u64(0),
        }
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn add_tensor(&mut self, tensor: Tensor) -> TensorId {
        let id = TensorId(self.tensors.len());
        self.tensors.push(tensor);
        self.param_states.push(None);
        id
    }

    /// Marks a previously-added tensor as a trainable parameter: allocates
    /// its gradient buffer and an optimizer slot sized to match.
    pub fn mark_trainable(&mut self, id: TensorId) {
        let state = match self.learner.optimizer {
            OptimizerKind::Sgd => ParamState::new_sgd(self.tensors[id.0].len()),
            OptimizerKind::Adam => ParamState::new_adam(self.tensors[id.0].len()),
        };
        self.tensors[id.0].allocate_grad();
        self.param_states[id.0] = Some(state);
    }

    pub fn add_node(&mut self, node: Node) -> GPResult<()> {
        for &id in node.src.iter().chain(node.dst.iter()) {
            if id.0 >= self.tensors.len() {
                return Err(GPError::InvalidParameter(format!(
                    "node {} references unknown tensor {}",
                    node.name, id.0
                )));
            }
        }
        self.nodes.push(node);
        Ok(())
    }

    pub fn tensor(&self, id: TensorId) -> &Tensor {
        &self.tensors[id.0]
    }

    pub fn tensor_mut(&mut self, id: TensorId) -> &mut Tensor {
        &mut self.tensors[id.0]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Allocates gradient buffers for every node's declared destination
    /// tensors when entering `Mode::Train`, the graph-level analog of a
    /// static shape-verification pass run once at construction time.
    pub fn compile(&mut self) -> GPResult<()> {
        if self.mode.is_training() {
            let dst_ids: Vec<TensorId> = self.nodes.iter().flat_map(|n| n.dst.iter().copied()).collect();
            for id in dst_ids {
                self.tensors[id.0].allocate_grad();
            }
        }
        Ok(())
    }

    fn borrow_many_mut<'a>(tensors: &'a mut [Tensor], ids: &[usize]) -> Vec<&'a mut Tensor> {
        debug_assert!({
            let mut sorted = ids.to_vec();
            sorted.sort_unstable();
            sorted.windows(2).all(|w| w[0] != w[1])
        });
        let ptr = tensors.as_mut_ptr();
        ids.iter().map(|&i| unsafe { &mut *ptr.add(i) }).collect()
    }

    /// A read-only copy of `id`'s current data, for call sites that need a
    /// `&Tensor` to satisfy a layer signature while another argument at the
    /// same call needs `&mut` access to the very same underlying tensor.
    fn data_snapshot(&self, id: TensorId) -> Tensor {
        Tensor::from_array("snapshot", self.tensors[id.0].data().clone())
    }

    /// A read-only copy of `id`'s current gradient (zero-filled if `id`
    /// carries no gradient buffer), wrapped as a `Tensor` so it can be passed
    /// wherever a layer's backward expects a `grad_output: &Tensor`.
    fn grad_snapshot(&self, id: TensorId) -> Tensor {
        let t = &self.tensors[id.0];
        let grad = t.grad().cloned().unwrap_or_else(|| Array4::zeros(t.data().raw_dim()));
        Tensor::from_array("grad_snapshot", grad)
    }

    /// Runs every node in declaration order. Zeroes every differentiable
    /// tensor's gradient first (spec's additive-accumulation discipline
    /// restarts each step), then dispatches each node's forward by `kind`.
    pub fn forward(&mut self, labels: Option<&[usize]>) -> GPResult<()> {
        if self.mode.is_training() {
            for t in self.tensors.iter_mut() {
                t.zero_grad();
            }
        }
        for i in 0..self.nodes.len() {
            self.forward_node(i, labels)?;
        }
        Ok(())
    }

    fn forward_node(&mut self, idx: usize, labels: Option<&[usize]>) -> GPResult<()> {
        let node = &self.nodes[idx];
        let kind = node.kind.clone();
        let src = node.src.clone();
        let dst = node.dst.clone();
        let mode = self.mode;

        match kind {
            LayerKind::Conv2D(p) => {
                let fused_snapshot = p.fused_bn.map(|f| {
                    (
                        self.data_snapshot(f.scale),
                        self.data_snapshot(f.running_mean),
                        self.data_snapshot(f.running_var),
                    )
                });
                let ids = [src[0].0, dst[0].0, p.weights.0, p.bias.0];
                let refs = Self::borrow_many_mut(&mut self.tensors, &ids);
                let (input, output, weights, bias) = (&*refs[0], refs[1], &*refs[2], &*refs[3]);
                let fused = fused_snapshot.as_ref().map(|(s, m, v)| (s, m, v));
                conv2d::forward(&p, input, weights, bias, fused, output, &mut self.workspace)
            }
            LayerKind::TransposeConv2D(p) => {
                let ids = [src[0].0, dst[0].0, p.weights.0, p.bias.0];
                let refs = Self::borrow_many_mut(&mut self.tensors, &ids);
                transpose_conv2d::forward(&p, &*refs[0], &*refs[2], &*refs[3], refs[1])
            }
            LayerKind::DepthwiseConv2D(p) => {
                let ids = [src[0].0, dst[0].0, p.weights.0, p.bias.0];
                let refs = Self::borrow_many_mut(&mut self.tensors, &ids);
                depthwise_conv2d::forward(&p, &*refs[0], &*refs[2], &*refs[3], refs[1])
            }
            LayerKind::FullyConnected(p) => {
                let ids = [src[0].0, dst[0].0, p.weights.0, p.bias.0];
                let refs = Self::borrow_many_mut(&mut self.tensors, &ids);
                fully_connected::forward(&p, &*refs[0], &*refs[2], &*refs[3], refs[1], &mut self.workspace)
            }
            LayerKind::BatchNorm(p) => {
                let ids = [src[0].0, dst[0].0, p.scale.0, p.bias.0, p.running_mean.0, p.running_var.0];
                let mut refs = Self::borrow_many_mut(&mut self.tensors, &ids);
                let mut cache = match std::mem::take(&mut self.nodes[idx].state) {
                    LayerState::BatchNorm(c) => c,
                    _ => batchnorm::Cache::default(),
                };
                let running_var = refs.pop().unwrap();
                let running_mean = refs.pop().unwrap();
                let bias = refs.pop().unwrap();
                let scale = refs.pop().unwrap();
                let output = refs.pop().unwrap();
                let input = refs.pop().unwrap();
                let result = batchnorm::forward(
                    &*input, &*scale, &*bias, running_mean, running_var, output, mode, &mut cache,
                );
                self.nodes[idx].state = LayerState::BatchNorm(cache);
                result
            }
            LayerKind::Lrn(p) => {
                let ids = [src[0].0, dst[0].0];
                let refs = Self::borrow_many_mut(&mut self.tensors, &ids);
                let mut scale = match std::mem::take(&mut self.nodes[idx].state) {
                    LayerState::Lrn { scale } => scale,
                    _ => Vec::new(),
                };
                let result = lrn::forward(&p, &*refs[0], refs[1], &mut scale);
                self.nodes[idx].state = LayerState::Lrn { scale };
                result
            }
            LayerKind::MaxPool(p) => {
                let ids = [src[0].0, dst[0].0];
                let refs = Self::borrow_many_mut(&mut self.tensors, &ids);
                let mut argmax = match std::mem::take(&mut self.nodes[idx].state) {
                    LayerState::MaxPool { argmax } => argmax,
                    _ => Vec::new(),
                };
                let result = pooling::max_forward(&p, &*refs[0], refs[1], &mut argmax);
                self.nodes[idx].state = LayerState::MaxPool { argmax };
                result
            }
            LayerKind::AvgPool(mode_) => {
                let ids = [src[0].0, dst[0].0];
                let refs = Self::borrow_many_mut(&mut self.tensors, &ids);
                pooling::avg_forward(mode_, &*refs[0], refs[1])
            }
            LayerKind::Activation(p) => {
                let mut ids = vec![src[0].0, dst[0].0];
                if let Some(s) = p.prelu_slope {
                    ids.push(s.0);
                }
                let refs = Self::borrow_many_mut(&mut self.tensors, &ids);
                let slope = p.prelu_slope.map(|_| &*refs[2]);
                activation::forward(&p, &*refs[0], slope, refs[1])
            }
            LayerKind::Softmax => {
                let ids = [src[0].0, dst[0].0];
                let refs = Self::borrow_many_mut(&mut self.tensors, &ids);
                softmax::forward(&*refs[0], refs[1])
            }
            LayerKind::Dropout(p) => {
                let ids = [src[0].0, dst[0].0];
                let refs = Self::borrow_many_mut(&mut self.tensors, &ids);
                let mut mask = match std::mem::take(&mut self.nodes[idx].state) {
                    LayerState::Dropout { mask } => mask,
                    _ => Vec::new(),
                };
                let result = dropout::forward(&p, &*refs[0], refs[1], mode, &mut mask, &mut self.rng);
                self.nodes[idx].state = LayerState::Dropout { mask };
                result
            }
            LayerKind::Concat => {
                let mut ids: Vec<usize> = src.iter().map(|t| t.0).collect();
                ids.push(dst[0].0);
                let mut refs = Self::borrow_many_mut(&mut self.tensors, &ids);
                let dst_ref = refs.pop().unwrap();
                let src_refs: Vec<&Tensor> = refs.iter().map(|t| &**t).collect();
                concat::forward(&src_refs, dst_ref)
            }
            LayerKind::EltwiseAdd => {
                let ids = [src[0].0, src[1].0, dst[0].0];
                let refs = Self::borrow_many_mut(&mut self.tensors, &ids);
                eltwise::forward(&*refs[0], &*refs[1], refs[2])
            }
            LayerKind::Upsample(p) => {
                let ids = [src[0].0, dst[0].0];
                let refs = Self::borrow_many_mut(&mut self.tensors, &ids);
                upsample::forward(&p, &*refs[0], refs[1])
            }
            LayerKind::Reshape(p) => {
                let ids = [src[0].0, dst[0].0];
                let refs = Self::borrow_many_mut(&mut self.tensors, &ids);
                reshape::forward(&p, &*refs[0], refs[1])
            }
            LayerKind::Cost(p) => {
                let ids: Vec<usize> = src.iter().chain(dst.iter()).map(|t| t.0).collect();
                let mut refs = Self::borrow_many_mut(&mut self.tensors, &ids);
                let (value, grad) = match p.kind {
                    CostKind::Euclidean => cost::euclidean_forward(refs[0], refs[1]),
                    CostKind::LiftedStruct => {
                        let labels = labels.ok_or_else(|| {
                            GPError::InvalidData("lifted-structured cost requires labels".into())
                        })?;
                        cost::lifted_struct_forward(&p, refs[0], labels)
                    }
                };
                refs[src.len()].fill(value);
                drop(refs);
                self.nodes[idx].state = LayerState::Cost { grad };
                Ok(())
            }
            LayerKind::Yolo(p) => {
                let ids = [src[0].0, dst[0].0];
                let refs = Self::borrow_many_mut(&mut self.tensors, &ids);
                yolo::forward(&p, &*refs[0], refs[1])
            }
        }
    }

    /// Runs every node in reverse declaration order, accumulating gradients
    /// additively into every tensor touched by more than one node.
    pub fn backward(&mut self) -> GPResult<()> {
        for i in (0..self.nodes.len()).rev() {
            self.backward_node(i)?;
        }
        Ok(())
    }

    fn backward_node(&mut self, idx: usize) -> GPResult<()> {
        let node = &self.nodes[idx];
        let kind = node.kind.clone();
        let src = node.src.clone();
        let dst = node.dst.clone();

        match kind {
            LayerKind::Conv2D(p) => {
                let input_snapshot = self.data_snapshot(src[0]);
                let output_snapshot = self.data_snapshot(dst[0]);
                let grad_output_snapshot = self.grad_snapshot(dst[0]);
                let weights_snapshot = self.data_snapshot(p.weights);
                let ids = [src[0].0, p.weights.0, p.bias.0];
                let mut refs = Self::borrow_many_mut(&mut self.tensors, &ids);
                let grad_bias = refs.pop().unwrap();
                let grad_weights = refs.pop().unwrap();
                let grad_input = refs.pop().unwrap();
                conv2d::backward(
                    &p, &input_snapshot, &output_snapshot, &weights_snapshot, &grad_output_snapshot,
                    grad_weights, grad_bias, Some(grad_input), &mut self.workspace,
                )
            }
            LayerKind::TransposeConv2D(p) => {
                let input_snapshot = self.data_snapshot(src[0]);
                let output_snapshot = self.data_snapshot(dst[0]);
                let grad_output_snapshot = self.grad_snapshot(dst[0]);
                let weights_snapshot = self.data_snapshot(p.weights);
                let ids = [src[0].0, p.weights.0, p.bias.0];
                let mut refs = Self::borrow_many_mut(&mut self.tensors, &ids);
                let grad_bias = refs.pop().unwrap();
                let grad_weights = refs.pop().unwrap();
                let grad_input = refs.pop().unwrap();
                transpose_conv2d::backward(
                    &p, &input_snapshot, &output_snapshot, &weights_snapshot, &grad_output_snapshot,
                    grad_weights, grad_bias, Some(grad_input),
                )
            }
            LayerKind::DepthwiseConv2D(p) => {
                let input_snapshot = self.data_snapshot(src[0]);
                let output_snapshot = self.data_snapshot(dst[0]);
                let grad_output_snapshot = self.grad_snapshot(dst[0]);
                let weights_snapshot = self.data_snapshot(p.weights);
                let ids = [src[0].0, p.weights.0, p.bias.0];
                let mut refs = Self::borrow_many_mut(&mut self.tensors, &ids);
                let grad_bias = refs.pop().unwrap();
                let grad_weights = refs.pop().unwrap();
                let grad_input = refs.pop().unwrap();
                depthwise_conv2d::backward(
                    &p, &input_snapshot, &output_snapshot, &weights_snapshot, &grad_output_snapshot,
                    grad_weights, grad_bias, Some(grad_input),
                )
            }
            LayerKind::FullyConnected(p) => {
                let input_snapshot = self.data_snapshot(src[0]);
                let output_snapshot = self.data_snapshot(dst[0]);
                let grad_output_snapshot = self.grad_snapshot(dst[0]);
                let weights_snapshot = self.data_snapshot(p.weights);
                let ids = [src[0].0, p.weights.0, p.bias.0];
                let mut refs = Self::borrow_many_mut(&mut self.tensors, &ids);
                let grad_bias = refs.pop().unwrap();
                let grad_weights = refs.pop().unwrap();
                let grad_input = refs.pop().unwrap();
                fully_connected::backward(
                    &p, &input_snapshot, &output_snapshot, &weights_snapshot, &grad_output_snapshot,
                    grad_weights, grad_bias, Some(grad_input), &mut self.workspace,
                )
            }
            LayerKind::BatchNorm(p) => {
                let input_snapshot = self.data_snapshot(src[0]);
                let scale_snapshot = self.data_snapshot(p.scale);
                let grad_output_snapshot = self.grad_snapshot(dst[0]);
                let cache = match &self.nodes[idx].state {
                    LayerState::BatchNorm(c) => c.clone(),
                    _ => batchnorm::Cache::default(),
                };
                let ids = [src[0].0, p.scale.0, p.bias.0];
                let mut refs = Self::borrow_many_mut(&mut self.tensors, &ids);
                let grad_bias = refs.pop().unwrap();
                let grad_scale = refs.pop().unwrap();
                let grad_input = refs.pop().unwrap();
                batchnorm::backward(
                    &input_snapshot, &scale_snapshot, &grad_output_snapshot, &cache, grad_scale, grad_bias,
                    grad_input,
                )
            }
            LayerKind::Lrn(p) => {
                let input_snapshot = self.data_snapshot(src[0]);
                let output_snapshot = self.data_snapshot(dst[0]);
                let grad_output_snapshot = self.grad_snapshot(dst[0]);
                let scale = match &self.nodes[idx].state {
                    LayerState::Lrn { scale } => scale.clone(),
                    _ => Vec::new(),
                };
                let refs = Self::borrow_many_mut(&mut self.tensors, &[src[0].0]);
                lrn::backward(&p, &input_snapshot, &output_snapshot, &grad_output_snapshot, &scale, refs[0])
            }
            LayerKind::MaxPool(p) => {
                let input_snapshot = self.data_snapshot(src[0]);
                let grad_output_snapshot = self.grad_snapshot(dst[0]);
                let argmax = match &self.nodes[idx].state {
                    LayerState::MaxPool { argmax } => argmax.clone(),
                    _ => Vec::new(),
                };
                let refs = Self::borrow_many_mut(&mut self.tensors, &[src[0].0]);
                pooling::max_backward(&p, &input_snapshot, &grad_output_snapshot, &argmax, refs[0])
            }
            LayerKind::AvgPool(mode_) => {
                let input_snapshot = self.data_snapshot(src[0]);
                let grad_output_snapshot = self.grad_snapshot(dst[0]);
                let refs = Self::borrow_many_mut(&mut self.tensors, &[src[0].0]);
                pooling::avg_backward(mode_, &input_snapshot, &grad_output_snapshot, refs[0])
            }
            LayerKind::Activation(p) => {
                let input_snapshot = self.data_snapshot(src[0]);
                let output_snapshot = self.data_snapshot(dst[0]);
                let grad_output_snapshot = self.grad_snapshot(dst[0]);
                let slope_snapshot = p.prelu_slope.map(|s| self.data_snapshot(s));
                let mut ids = vec![src[0].0];
                if let Some(s) = p.prelu_slope {
                    ids.push(s.0);
                }
                let mut refs = Self::borrow_many_mut(&mut self.tensors, &ids);
                let grad_slope = if ids.len() == 2 { Some(refs.pop().unwrap()) } else { None };
                let grad_input = refs.pop().unwrap();
                activation::backward(
                    &p, &input_snapshot, &output_snapshot, slope_snapshot.as_ref(), &grad_output_snapshot,
                    Some(grad_input), grad_slope,
                )
            }
            LayerKind::Softmax => {
                let output_snapshot = self.data_snapshot(dst[0]);
                let grad_output_snapshot = self.grad_snapshot(dst[0]);
                let refs = Self::borrow_many_mut(&mut self.tensors, &[src[0].0]);
                softmax::backward(&output_snapshot, &grad_output_snapshot, refs[0])
            }
            LayerKind::Dropout(_) => {
                let input_snapshot = self.data_snapshot(src[0]);
                let grad_output_snapshot = self.grad_snapshot(dst[0]);
                let mask = match &self.nodes[idx].state {
                    LayerState::Dropout { mask } => mask.clone(),
                    _ => Vec::new(),
                };
                let refs = Self::borrow_many_mut(&mut self.tensors, &[src[0].0]);
                dropout::backward(&input_snapshot, &grad_output_snapshot, &mask, refs[0])
            }
            LayerKind::Concat => {
                let inputs_owned: Vec<Tensor> = src.iter().map(|&id| self.data_snapshot(id)).collect();
                let input_refs: Vec<&Tensor> = inputs_owned.iter().collect();
                let grad_output_snapshot = self.grad_snapshot(dst[0]);
                let ids: Vec<usize> = src.iter().map(|t| t.0).collect();
                let mut refs = Self::borrow_many_mut(&mut self.tensors, &ids);
                concat::backward(&input_refs, &grad_output_snapshot, &mut refs)
            }
            LayerKind::EltwiseAdd => {
                let grad_output_snapshot = self.grad_snapshot(dst[0]);
                let ids = [src[0].0, src[1].0];
                let refs = Self::borrow_many_mut(&mut self.tensors, &ids);
                let [a, b]: [&mut Tensor; 2] = refs.try_into().unwrap_or_else(|_| unreachable!());
                eltwise::backward(&grad_output_snapshot, a, b)
            }
            LayerKind::Upsample(p) => {
                let input_snapshot = self.data_snapshot(src[0]);
                let grad_output_snapshot = self.grad_snapshot(dst[0]);
                let refs = Self::borrow_many_mut(&mut self.tensors, &[src[0].0]);
                upsample::backward(&p, &input_snapshot, &grad_output_snapshot, refs[0])
            }
            LayerKind::Reshape(_) => {
                let grad_output_snapshot = self.grad_snapshot(dst[0]);
                let refs = Self::borrow_many_mut(&mut self.tensors, &[src[0].0]);
                reshape::backward(&grad_output_snapshot, refs[0])
            }
            LayerKind::Cost(_) => {
                let grad = match &self.nodes[idx].state {
                    LayerState::Cost { grad } => grad.clone(),
                    _ => return Ok(()),
                };
                let refs = Self::borrow_many_mut(&mut self.tensors, &[src[0].0]);
                cost::backward(refs[0], &grad)
            }
            LayerKind::Yolo(p) => {
                let output_snapshot = self.data_snapshot(dst[0]);
                let grad_output_snapshot = self.grad_snapshot(dst[0]);
                let refs = Self::borrow_many_mut(&mut self.tensors, &[src[0].0]);
                yolo::backward(&p, &output_snapshot, &grad_output_snapshot, refs[0])
            }
        }
    }

    /// Applies one optimizer step to every trainable tensor, then advances
    /// the learner's step counter used by the learning-rate schedule.
    pub fn update(&mut self) -> GPResult<()> {
        let lr = self.learner.current_lr();
        let optimizer = self.learner.optimizer;
        for i in 0..self.tensors.len() {
            if self.param_states[i].is_none() {
                continue;
            }
            let grad = match self.tensors[i].grad() {
                Some(g) => g.as_slice().expect("contiguous gradient").to_vec(),
                None => continue,
            };
            let data = self.tensors[i].as_slice_mut();
            let state = self.param_states[i].as_mut().unwrap();
            match optimizer {
                OptimizerKind::Sgd => optim::sgd_step(&self.learner.sgd, lr, data, &grad, state),
                OptimizerKind::Adam => {
                    optim::adam_step(&self.learner.adam, lr, self.learner.seen as u32 + 1, data, &grad, state)
                }
            }
        }
        self.learner.seen += 1;
        Ok(())
    }
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}
