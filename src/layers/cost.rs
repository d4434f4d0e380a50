//! Loss layers, mirroring `bcnn_cost_layer.c`'s two `bcnn_loss` kinds.
//!
//! `Euclidean` is the plain half-squared-error used for regression and
//! autoencoder-style networks. `LiftedStruct` is the standard
//! lifted-structured embedding loss (Song et al.) used for metric-learning
//! heads: every positive pair's margin violation is contrasted against a
//! soft-max over all of its negatives, pulling same-label embeddings
//! together and push apart the hardest negatives.

use ndarray::Array4;
use serde::{Deserialize, Serialize};

use crate::errors::GPResult;
use crate::kernels::vecmath::l2_distance;
use crate::tensor::Tensor;
use crate::types::CostKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Params {
    pub kind: CostKind,
    /// Margin used by `LiftedStruct`; ignored for `Euclidean`.
    pub margin: f32,
}

/// `cost = 0.5 * sum((pred - target)^2)`, `grad = pred - target`.
pub fn euclidean_forward(pred: &Tensor, target: &Tensor) -> (f32, Array4<f32>) {
    let diff = pred.data() - target.data();
    let cost = 0.5 * diff.iter().map(|d| d * d).sum::<f32>();
    (cost, diff)
}

/// Lifted-structured loss over a batch of flattened embeddings (one row per
/// batch item, labels supplied out-of-band since the spec's tensor model has
/// no label tensor kind). Returns total cost and the per-embedding gradient.
pub fn lifted_struct_forward(params: &Params, pred: &Tensor, labels: &[usize]) -> (f32, Array4<f32>) {
    let shape = pred.shape();
    let n = shape.n;
    let dim = shape.size3d();
    let rows: Vec<&[f32]> = (0..n)
        .map(|i| &pred.as_slice()[i * dim..(i + 1) * dim])
        .collect();

    let mut dist = vec![0.0f32; n * n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d = l2_distance(rows[i], rows[j]);
            dist[i * n + j] = d;
            dist[j * n + i] = d;
        }
    }

    let mut total = 0.0f32;
    let mut num_pairs = 0usize;
    let mut grad = Array4::zeros((n, shape.c, shape.h, shape.w));
    let mut grad_flat = vec![0.0f32; n * dim];

    for i in 0..n {
        for j in (i + 1)..n {
            if labels[i] != labels[j] {
                continue;
            }
            num_pairs += 1;
            let d_ij = dist[i * n + j].max(1e-8);

            let neg_i: Vec<usize> = (0..n).filter(|&k| labels[k] != labels[i]).collect();
            let neg_j: Vec<usize> = (0..n).filter(|&l| labels[l] != labels[j]).collect();
            let exp_i: Vec<f32> = neg_i.iter().map(|&k| (params.margin - dist[i * n + k]).exp()).collect();
            let exp_j: Vec<f32> = neg_j.iter().map(|&l| (params.margin - dist[j * n + l]).exp()).collect();
            let sum_exp = exp_i.iter().sum::<f32>() + exp_j.iter().sum::<f32>();
            let j_ij = sum_exp.max(1e-8).ln();

            let hinge = (j_ij + d_ij).max(0.0);
            if hinge <= 0.0 {
                continue;
            }
            total += hinge * hinge;

            let grad_scale = 2.0 * hinge;

            // Direct distance term: d(D_ij)/d(emb_i) = (emb_i - emb_j)/D_ij
            for d in 0..dim {
                let delta = (rows[i][d] - rows[j][d]) / d_ij * grad_scale;
                grad_flat[i * dim + d] += delta;
                grad_flat[j * dim + d] -= delta;
            }

            // Soft-max-weighted negative terms.
            for (idx, &k) in neg_i.iter().enumerate() {
                let w = exp_i[idx] / sum_exp * grad_scale;
                let d_ik = dist[i * n + k].max(1e-8);
                for d in 0..dim {
                    let delta = (rows[i][d] - rows[k][d]) / d_ik * w;
                    grad_flat[i * dim + d] -= delta;
                    grad_flat[k * dim + d] += delta;
                }
            }
            for (idx, &l) in neg_j.iter().enumerate() {
                let w = exp_j[idx] / sum_exp * grad_scale;
                let d_jl = dist[j * n + l].max(1e-8);
                for d in 0..dim {
                    let delta = (rows[j][d] - rows[l][d]) / d_jl * w;
                    grad_flat[j * dim + d] -= delta;
                    grad_flat[l * dim + d] += delta;
                }
            }
        }
    }

    let denom = (2 * num_pairs.max(1)) as f32;
    total /= denom;
    for v in grad_flat.iter_mut() {
        *v /= denom;
    }
    for i in 0..n {
        for c in 0..shape.c {
            for h in 0..shape.h {
                for w in 0..shape.w {
                    let flat = (c * shape.h + h) * shape.w + w;
                    grad[(i, c, h, w)] = grad_flat[i * dim + flat];
                }
            }
        }
    }
    (total, grad)
}

pub fn backward(grad_input: &mut Tensor, grad: &Array4<f32>) -> GPResult<()> {
    grad_input.accumulate_grad(grad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    #[test]
    fn euclidean_cost_matches_half_sum_squared_error() {
        let pred = Tensor::from_array("p", Array4::from_shape_vec((1, 1, 1, 2), vec![1.0, 2.0]).unwrap());
        let target = Tensor::from_array("t", Array4::from_shape_vec((1, 1, 1, 2), vec![0.0, 0.0]).unwrap());
        let (cost, grad) = euclidean_forward(&pred, &target);
        assert!((cost - 2.5).abs() < 1e-6);
        assert_eq!(grad.as_slice().unwrap(), &[1.0, 2.0]);
    }

    #[test]
    fn lifted_struct_zero_cost_when_positives_coincide_and_are_far_from_negatives() {
        let pred = Tensor::from_array(
            "p",
            Array4::from_shape_vec((4, 1, 1, 2), vec![0.0, 0.0, 0.0, 0.0, 100.0, 0.0, 100.0, 0.0]).unwrap(),
        );
        let labels = vec![0, 0, 1, 1];
        let params = Params {
            kind: CostKind::LiftedStruct,
            margin: 1.0,
        };
        let (cost, _grad) = lifted_struct_forward(&params, &pred, &labels);
        assert!(cost < 1e-3, "cost was {cost}");
    }
}
