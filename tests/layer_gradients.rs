//! Central-difference gradient checks across conv, fc, activation and
//! softmax, run end to end through a compiled graph with a scalar loss.

use bcnx::graph::dsl::NetworkBuilder;
use bcnx::{Activation, Mode, Network, Shape4};
use ndarray::Array4;

const EPS: f32 = 1e-3;

fn loss_value(net: &Network, loss: bcnx::types::TensorId) -> f32 {
    net.tensor(loss).data().iter().sum::<f32>() / net.tensor(loss).len() as f32
}

/// Numerically differentiates the compiled network's scalar loss w.r.t.
/// every element of `probe`, and checks it against the analytic gradient
/// `probe` accumulated during `backward`.
fn check_gradient(net: &mut Network, probe: bcnx::types::TensorId, loss: bcnx::types::TensorId) {
    net.forward(None).unwrap();
    net.backward().unwrap();
    let analytic = net.tensor(probe).grad().expect("probe tensor has a gradient buffer").clone();

    let shape = net.tensor(probe).shape();
    for n in 0..shape.n {
        for c in 0..shape.c {
            for h in 0..shape.h {
                for w in 0..shape.w {
                    let original = net.tensor(probe).data()[(n, c, h, w)];

                    net.tensor_mut(probe).data_mut()[(n, c, h, w)] = original + EPS;
                    net.forward(None).unwrap();
                    let plus = loss_value(net, loss);

                    net.tensor_mut(probe).data_mut()[(n, c, h, w)] = original - EPS;
                    net.forward(None).unwrap();
                    let minus = loss_value(net, loss);

                    net.tensor_mut(probe).data_mut()[(n, c, h, w)] = original;

                    let numeric = (plus - minus) / (2.0 * EPS);
                    let expected = analytic[(n, c, h, w)];
                    let rel_err = (numeric - expected).abs() / numeric.abs().max(expected.abs()).max(1e-6);
                    assert!(
                        rel_err < 2e-2,
                        "gradient mismatch at ({n},{c},{h},{w}): numeric={numeric}, analytic={expected}, rel_err={rel_err}"
                    );
                }
            }
        }
    }
}

#[test]
fn fully_connected_and_activation_gradients_match_central_difference() {
    let mut net = Network::new();
    let (input, target, loss) = {
        let mut b = NetworkBuilder::new(&mut net);
        let input = b.input(Shape4::new(1, 1, 1, 4));
        let hidden = b.fully_connected(input, 3, Activation::None).unwrap();
        let activated = b.activation(hidden, Activation::Tanh).unwrap();
        let pred = b.fully_connected(activated, 2, Activation::None).unwrap();
        let target = b.input(Shape4::new(1, 1, 1, 2));
        let loss = b.cost_euclidean(pred, target).unwrap();
        (input, target, loss)
    };
    net.compile().unwrap();
    net.set_mode(Mode::Train);
    net.tensor_mut(input).allocate_grad();

    let input_data = Array4::from_shape_vec((1, 1, 1, 4), vec![0.3, -0.6, 0.9, -0.2]).unwrap();
    net.tensor_mut(input).set_data(&input_data).unwrap();
    let target_data = Array4::from_shape_vec((1, 1, 1, 2), vec![0.1, -0.4]).unwrap();
    net.tensor_mut(target).set_data(&target_data).unwrap();

    check_gradient(&mut net, input, loss);
}

#[test]
fn softmax_gradient_matches_central_difference() {
    let mut net = Network::new();
    let (input, target, loss) = {
        let mut b = NetworkBuilder::new(&mut net);
        let input = b.input(Shape4::new(1, 1, 1, 4));
        let sm = b.softmax(input).unwrap();
        let target = b.input(Shape4::new(1, 1, 1, 4));
        let loss = b.cost_euclidean(sm, target).unwrap();
        (input, target, loss)
    };
    net.compile().unwrap();
    net.set_mode(Mode::Train);
    net.tensor_mut(input).allocate_grad();

    let input_data = Array4::from_shape_vec((1, 1, 1, 4), vec![0.1, 1.5, -0.3, 0.7]).unwrap();
    net.tensor_mut(input).set_data(&input_data).unwrap();
    let target_data = Array4::from_shape_vec((1, 1, 1, 4), vec![0.25, 0.25, 0.25, 0.25]).unwrap();
    net.tensor_mut(target).set_data(&target_data).unwrap();

    check_gradient(&mut net, input, loss);
}

#[test]
fn conv2d_gradient_matches_central_difference() {
    let mut net = Network::new();
    let (input, target, loss) = {
        let mut b = NetworkBuilder::new(&mut net);
        let input = b.input(Shape4::new(1, 1, 4, 4));
        let conv = b.conv2d(input, 2, 3, 3, 1, 1, Activation::Tanh).unwrap();
        let flat = b.reshape(conv, Shape4::new(1, 1, 1, 2 * 4 * 4)).unwrap();
        let target = b.input(Shape4::new(1, 1, 1, 2 * 4 * 4));
        let loss = b.cost_euclidean(flat, target).unwrap();
        (input, target, loss)
    };
    net.compile().unwrap();
    net.set_mode(Mode::Train);
    net.tensor_mut(input).allocate_grad();

    let input_data = Array4::from_shape_fn((1, 1, 4, 4), |(_, _, h, w)| (h as f32 - w as f32) * 0.3);
    net.tensor_mut(input).set_data(&input_data).unwrap();
    let target_data = Array4::zeros((1, 1, 1, 2 * 4 * 4));
    net.tensor_mut(target).set_data(&target_data).unwrap();

    check_gradient(&mut net, input, loss);
}
