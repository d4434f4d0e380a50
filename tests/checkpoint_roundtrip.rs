//! Checkpoint save/load round-trips through two independently-built but
//! structurally identical networks (S4): same random input in, bit-identical
//! forward output out, once the second network's parameters are overwritten
//! by the first's checkpoint.

use bcnx::graph::checkpoint::{load, save, Format};
use bcnx::graph::dsl::NetworkBuilder;
use bcnx::{Activation, Mode, Network, Shape4};
use ndarray::Array4;

fn build() -> (Network, bcnx::types::TensorId, bcnx::types::TensorId) {
    let mut net = Network::new();
    let (input, output) = {
        let mut b = NetworkBuilder::new(&mut net);
        let input = b.input(Shape4::new(1, 1, 6, 6));
        let conv = b.conv2d(input, 2, 3, 3, 1, 1, Activation::Relu).unwrap();
        let pooled = b.max_pool(conv, 2, 2).unwrap();
        let flat = b.reshape(pooled, Shape4::new(1, 1, 1, 2 * 3 * 3)).unwrap();
        let out = b.fully_connected(flat, 4, Activation::None).unwrap();
        (input, out)
    };
    net.compile().unwrap();
    net.set_mode(Mode::Predict);
    (net, input, output)
}

#[test]
fn save_then_load_reproduces_forward_output_bit_identically() {
    let (mut writer, writer_input, writer_output) = build();
    let (mut reader, reader_input, reader_output) = build();

    let probe = Array4::from_shape_fn((1, 1, 6, 6), |(_, _, h, w)| (h as f32 * 6.0 + w as f32) / 36.0 - 0.5);

    writer.tensor_mut(writer_input).set_data(&probe).unwrap();
    writer.forward(None).unwrap();
    let expected = writer.tensor(writer_output).data().clone();

    let mut buf = Vec::new();
    save(&writer, &mut buf, Format::Current).unwrap();
    load(&mut reader, &mut buf.as_slice(), Format::Current).unwrap();

    reader.tensor_mut(reader_input).set_data(&probe).unwrap();
    reader.forward(None).unwrap();
    let actual = reader.tensor(reader_output).data().clone();

    assert_eq!(expected, actual);
}

#[test]
fn learner_header_round_trips() {
    let (mut writer, _, _) = build();
    writer.learner.base_lr = 0.025;
    writer.learner.sgd.momentum = 0.8;
    writer.learner.sgd.weight_decay = 0.0002;
    writer.learner.seen = 777;

    let mut buf = Vec::new();
    save(&writer, &mut buf, Format::Current).unwrap();

    let (mut reader, _, _) = build();
    load(&mut reader, &mut buf.as_slice(), Format::Current).unwrap();

    assert_eq!(reader.learner.base_lr, 0.025);
    assert_eq!(reader.learner.sgd.momentum, 0.8);
    assert_eq!(reader.learner.sgd.weight_decay, 0.0002);
    assert_eq!(reader.learner.seen, 777);
}
