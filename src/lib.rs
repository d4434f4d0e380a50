//! A compact CNN graph-execution engine: CPU GEMM/im2col/Winograd kernels
//! (`kernels`), a device dispatch point (`backend`), a flat node/tensor
//! graph with the seventeen-layer set (`graph`, `layers`), optimizers
//! (`optim`), and checkpoint I/O grounded on `bcnn_net.c`'s flat binary
//! format.
//!
//! Grounded on the teacher crate's module shape (`layers`, `tensor`,
//! `errors`, `optim`) but replaces its recursive `Graph`/`typetag` trait-
//! object dispatch with the fixed-order flat graph `bcnn_net` itself uses --
//! see [`graph::Network`] for the traversal discipline.

pub mod backend;
pub mod errors;
pub mod graph;
pub mod kernels;
pub mod layers;
pub mod logging;
pub mod optim;
pub mod tensor;
pub mod types;

pub use errors::{GPError, GPResult};
pub use graph::{Learner, Network};
pub use graph::dsl::NetworkBuilder;
pub use tensor::Tensor;
pub use types::{Activation, Mode, Shape4};
