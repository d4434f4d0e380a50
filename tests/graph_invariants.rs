//! Graph-level invariants: compile idempotence, dropout identity in
//! predict mode, and parameter stability across a mode switch with no
//! intervening update.

use bcnx::graph::dsl::NetworkBuilder;
use bcnx::{Activation, Mode, Network, Shape4};
use ndarray::Array4;

fn set_input(net: &mut Network, id: bcnx::types::TensorId, data: Array4<f32>) {
    net.tensor_mut(id).set_data(&data).unwrap();
}

#[test]
fn compile_is_idempotent() {
    let mut net = Network::new();
    let (input, output) = {
        let mut b = NetworkBuilder::new(&mut net);
        let input = b.input(Shape4::new(1, 1, 4, 4));
        let conv = b.conv2d(input, 2, 3, 3, 1, 1, Activation::Relu).unwrap();
        let out = b.max_pool(conv, 2, 2).unwrap();
        (input, out)
    };
    net.compile().unwrap();
    net.compile().unwrap();

    net.set_mode(Mode::Predict);
    set_input(&mut net, input, Array4::from_elem((1, 1, 4, 4), 0.5));
    net.forward(None).unwrap();
    let first = net.tensor(output).data().clone();
    net.forward(None).unwrap();
    let second = net.tensor(output).data().clone();
    assert_eq!(first, second);
}

#[test]
fn dropout_is_identity_in_predict_mode() {
    let mut net = Network::new();
    let (input, output) = {
        let mut b = NetworkBuilder::new(&mut net);
        let input = b.input(Shape4::new(1, 2, 3, 3));
        let out = b.dropout(input, 0.5).unwrap();
        (input, out)
    };
    net.compile().unwrap();
    net.set_mode(Mode::Predict);

    let data = Array4::from_shape_fn((1, 2, 3, 3), |(n, c, h, w)| (n + c + h + w) as f32 + 1.0);
    set_input(&mut net, input, data.clone());
    net.forward(None).unwrap();
    assert_eq!(net.tensor(output).data(), &data);
}

#[test]
fn mode_switch_leaves_parameters_byte_identical() {
    let mut net = Network::new();
    {
        let mut b = NetworkBuilder::new(&mut net);
        let input = b.input(Shape4::new(1, 1, 4, 4));
        b.fully_connected(input, 3, Activation::None).unwrap();
    }
    net.compile().unwrap();

    let weights_id = net_first_fc_weights(&net).expect("network has a fully-connected node");
    let before_w = net.tensor(weights_id).data().clone();

    net.set_mode(Mode::Predict);
    net.set_mode(Mode::Train);

    assert_eq!(net.tensor(weights_id).data(), &before_w);
}

fn net_first_fc_weights(net: &Network) -> Option<bcnx::types::TensorId> {
    use bcnx::layers::LayerKind;
    net.nodes().iter().find_map(|n| match &n.kind {
        LayerKind::FullyConnected(p) => Some(p.weights),
        _ => None,
    })
}
