//! The specification's literal end-to-end scenarios (S1-S5 minus the
//! checkpoint round-trip, covered separately in `checkpoint_roundtrip.rs`).

use bcnx::graph::dsl::NetworkBuilder;
use bcnx::graph::node::Node;
use bcnx::layers::{conv2d, yolo, LayerKind};
use bcnx::{Activation, Mode, Network, Shape4, Tensor};
use ndarray::Array4;

fn loss_value(net: &Network, loss: bcnx::types::TensorId) -> f32 {
    net.tensor(loss).data().iter().sum::<f32>() / net.tensor(loss).len() as f32
}

/// S1: an all-zero input through conv -> global-average-pool -> fc ->
/// softmax produces a uniform distribution, independent of the (random)
/// conv/fc weights, since every path multiplies a zero input and starts
/// from a zero bias.
#[test]
fn s1_all_zero_input_yields_uniform_softmax() {
    let mut net = Network::new();
    let (input, sm) = {
        let mut b = NetworkBuilder::new(&mut net);
        let input = b.input(Shape4::new(1, 1, 28, 28));
        let c1 = b.conv2d(input, 8, 3, 3, 1, 1, Activation::Relu).unwrap();
        let gap = b.avg_pool_global(c1).unwrap();
        let flat = b.reshape(gap, Shape4::new(1, 1, 1, 8)).unwrap();
        let fc = b.fully_connected(flat, 10, Activation::None).unwrap();
        let sm = b.softmax(fc).unwrap();
        (input, sm)
    };
    net.compile().unwrap();
    net.set_mode(Mode::Predict);
    net.tensor_mut(input).set_data(&Array4::zeros((1, 1, 28, 28))).unwrap();
    net.forward(None).unwrap();

    for &p in net.tensor(sm).data().iter() {
        assert!((p - 0.1).abs() < 1e-6, "expected uniform 0.1, got {p}");
    }
}

/// S2: one SGD step (lr=0.01, momentum=0, weight decay=0) against a
/// one-hot target strictly decreases the loss on a repeat forward pass with
/// the same input.
#[test]
fn s2_one_sgd_step_strictly_decreases_loss() {
    let mut net = Network::new();
    let (input, target, loss) = {
        let mut b = NetworkBuilder::new(&mut net);
        let input = b.input(Shape4::new(1, 1, 28, 28));
        let c1 = b.conv2d(input, 8, 3, 3, 1, 1, Activation::Relu).unwrap();
        let gap = b.avg_pool_global(c1).unwrap();
        let flat = b.reshape(gap, Shape4::new(1, 1, 1, 8)).unwrap();
        let fc = b.fully_connected(flat, 10, Activation::None).unwrap();
        let sm = b.softmax(fc).unwrap();
        let target = b.input(Shape4::new(1, 1, 1, 10));
        let loss = b.cost_euclidean(sm, target).unwrap();
        (input, target, loss)
    };
    net.compile().unwrap();
    net.set_mode(Mode::Train);
    net.learner.base_lr = 0.01;
    net.learner.sgd.momentum = 0.0;
    net.learner.sgd.weight_decay = 0.0;

    net.tensor_mut(input).set_data(&Array4::zeros((1, 1, 28, 28))).unwrap();
    let mut one_hot = Array4::zeros((1, 1, 1, 10));
    one_hot[(0, 0, 0, 3)] = 1.0;
    net.tensor_mut(target).set_data(&one_hot).unwrap();

    net.forward(None).unwrap();
    let loss_before = loss_value(&net, loss);

    net.backward().unwrap();
    net.update().unwrap();

    net.forward(None).unwrap();
    let loss_after = loss_value(&net, loss);

    assert!(loss_after < loss_before, "loss did not decrease: before={loss_before}, after={loss_after}");
}

/// S3: a 3x3 stride-1 pad-1 convolution with an identity kernel reproduces
/// its input exactly.
#[test]
fn s3_identity_kernel_reproduces_input() {
    let mut net = Network::new();
    let input = net.add_tensor(Tensor::zeros("input", Shape4::new(1, 1, 4, 4)));

    let mut kernel = Array4::zeros((1, 1, 3, 3));
    kernel[(0, 0, 1, 1)] = 1.0;
    let weights = net.add_tensor(Tensor::from_array("weights", kernel));
    let bias = net.add_tensor(Tensor::zeros("bias", Shape4::new(1, 1, 1, 1)));
    let output = net.add_tensor(Tensor::zeros("output", Shape4::new(1, 1, 4, 4)));

    let params = conv2d::Params {
        in_c: 1,
        out_c: 1,
        kh: 3,
        kw: 3,
        stride: 1,
        pad: 1,
        weights,
        bias,
        fused_bn: None,
        activation: Activation::None,
    };
    net.add_node(Node::new("c1", vec![input], vec![output], LayerKind::Conv2D(params))).unwrap();
    net.compile().unwrap();
    net.set_mode(Mode::Predict);

    let ones = Array4::from_elem((1, 1, 4, 4), 1.0);
    net.tensor_mut(input).set_data(&ones).unwrap();
    net.forward(None).unwrap();

    assert_eq!(net.tensor(output).data(), &ones);
}

/// S5: a zero raw YOLO tensor decodes to zero detections at an exact 0.5
/// objectness threshold -- every cell's raw objectness logit is 0, so
/// `sigmoid(0) == 0.5` sits exactly on the threshold and must be dropped.
#[test]
fn s5_zero_input_yolo_head_decodes_to_no_detections_at_threshold() {
    let params = yolo::Params {
        anchors: vec![(10.0, 13.0), (16.0, 30.0), (33.0, 23.0)],
        num_classes: 80,
        image_size: 416,
    };
    let raw = Tensor::zeros("raw", Shape4::new(1, 3 * (5 + 80), 13, 13));
    let detections = yolo::decode(&params, &raw, 0, 0.5);
    assert!(detections.is_empty());
}
