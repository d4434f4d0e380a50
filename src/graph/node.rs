//! A single node in the network's flat node list: which tensors it reads,
//! which it writes, and which layer kind interprets them. Mirrors
//! `bcnn_node`'s `src`/`dst` index arrays plus a `bcnn_layer_type` tag,
//! minus the function-pointer table (dispatch lives in
//! [`crate::graph::Network`] instead).

use serde::{Deserialize, Serialize};

use crate::layers::{LayerKind, LayerState};
use crate::types::TensorId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub src: Vec<TensorId>,
    pub dst: Vec<TensorId>,
    pub kind: LayerKind,
    #[serde(skip)]
    pub state: LayerState,
}

impl Node {
    pub fn new(name: impl Into<String>, src: Vec<TensorId>, dst: Vec<TensorId>, kind: LayerKind) -> Self {
        Self {
            name: name.into(),
            src,
            dst,
            kind,
            state: LayerState::None,
        }
    }
}
