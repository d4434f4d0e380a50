//! YOLOv3-style detection head: per-anchor box/objectness/class prediction,
//! decode into image-space boxes, and greedy non-maximum suppression.
//! Mirrors the `YOLOV3` layer kind in `bcnn_layer_type`; `bcnn` folds the
//! loss computation directly into this layer rather than a separate cost
//! node, which this module follows.
//!
//! Raw channel layout per anchor is `[tx, ty, tw, th, objectness,
//! class_0..class_{C-1}]`, tiled across the grid in NCHW with
//! `C = 5 + num_classes` channels per anchor and `num_anchors` such groups.

use ndarray::Array4;
use serde::{Deserialize, Serialize};

use crate::errors::GPResult;
use crate::tensor::Tensor;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Params {
    pub anchors: Vec<(f32, f32)>,
    pub num_classes: usize,
    pub image_size: usize,
}

impl Params {
    fn channels_per_anchor(&self) -> usize {
        5 + self.num_classes
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
    pub objectness: f32,
    pub class: usize,
    pub class_prob: f32,
}

impl Detection {
    pub fn score(&self) -> f32 {
        self.objectness * self.class_prob
    }

    fn x1(&self) -> f32 {
        self.cx - self.w / 2.0
    }
    fn y1(&self) -> f32 {
        self.cy - self.h / 2.0
    }
    fn x2(&self) -> f32 {
        self.cx + self.w / 2.0
    }
    fn y2(&self) -> f32 {
        self.cy + self.h / 2.0
    }
}

pub fn iou(a: &Detection, b: &Detection) -> f32 {
    let ix1 = a.x1().max(b.x1());
    let iy1 = a.y1().max(b.y1());
    let ix2 = a.x2().min(b.x2());
    let iy2 = a.y2().min(b.y2());
    let iw = (ix2 - ix1).max(0.0);
    let ih = (iy2 - iy1).max(0.0);
    let intersection = iw * ih;
    let area_a = a.w.max(0.0) * a.h.max(0.0);
    let area_b = b.w.max(0.0) * b.h.max(0.0);
    let union = area_a + area_b - intersection;
    if union <= 0.0 {
        0.0
    } else {
        intersection / union
    }
}

/// Decodes one image's raw grid predictions into image-space detections
/// strictly above `objectness_thresh` (a cell whose objectness exactly
/// equals the threshold is dropped, not kept), applying the standard
/// YOLOv3 parametrization:
/// `bx = sigmoid(tx) + grid_x`, `bw = anchor_w * exp(tw)`, scaled by the
/// ratio of `image_size` to the grid resolution.
pub fn decode(params: &Params, raw: &Tensor, image_index: usize, objectness_thresh: f32) -> Vec<Detection> {
    let shape = raw.shape();
    let cpa = params.channels_per_anchor();
    let num_anchors = params.anchors.len();
    debug_assert_eq!(shape.c, cpa * num_anchors);

    let stride = params.image_size as f32 / shape.h as f32;
    let mut detections = Vec::new();

    for a in 0..num_anchors {
        let (anchor_w, anchor_h) = params.anchors[a];
        let base_c = a * cpa;
        for gy in 0..shape.h {
            for gx in 0..shape.w {
                let tx = raw.data()[(image_index, base_c, gy, gx)];
                let ty = raw.data()[(image_index, base_c + 1, gy, gx)];
                let tw = raw.data()[(image_index, base_c + 2, gy, gx)];
                let th = raw.data()[(image_index, base_c + 3, gy, gx)];
                let to = raw.data()[(image_index, base_c + 4, gy, gx)];
                let objectness = sigmoid(to);
                if objectness <= objectness_thresh {
                    continue;
                }
                let mut best_class = 0usize;
                let mut best_prob = f32::NEG_INFINITY;
                for cls in 0..params.num_classes {
                    let raw_p = raw.data()[(image_index, base_c + 5 + cls, gy, gx)];
                    let p = sigmoid(raw_p);
                    if p > best_prob {
                        best_prob = p;
                        best_class = cls;
                    }
                }
                let cx = (sigmoid(tx) + gx as f32) * stride;
                let cy = (sigmoid(ty) + gy as f32) * stride;
                let w = anchor_w * tw.exp();
                let h = anchor_h * th.exp();
                detections.push(Detection {
                    cx,
                    cy,
                    w,
                    h,
                    objectness,
                    class: best_class,
                    class_prob: best_prob,
                });
            }
        }
    }
    detections
}

/// Greedy per-class non-maximum suppression: sorts by `score()` descending,
/// keeps the best box, discards any remaining box of the same class with
/// IoU above `iou_thresh` against an already-kept box.
pub fn nms(mut detections: Vec<Detection>, iou_thresh: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.score().partial_cmp(&a.score()).unwrap());
    let mut kept: Vec<Detection> = Vec::new();
    'outer: for d in detections {
        for k in &kept {
            if k.class == d.class && iou(k, &d) > iou_thresh {
                continue 'outer;
            }
        }
        kept.push(d);
    }
    kept
}

/// Training-mode forward: applies sigmoid to `tx`, `ty`, objectness and
/// class channels in place (`tw`/`th` stay in log-space for the squared
/// box-regression loss used here), matching the channel layout `decode`
/// expects.
pub fn forward(params: &Params, raw: &Tensor, output: &mut Tensor) -> GPResult<()> {
    let shape = raw.shape();
    let cpa = params.channels_per_anchor();
    let mut out = raw.data().clone();
    for a in 0..params.anchors.len() {
        let base_c = a * cpa;
        for n in 0..shape.n {
            for gy in 0..shape.h {
                for gx in 0..shape.w {
                    out[(n, base_c, gy, gx)] = sigmoid(out[(n, base_c, gy, gx)]);
                    out[(n, base_c + 1, gy, gx)] = sigmoid(out[(n, base_c + 1, gy, gx)]);
                    out[(n, base_c + 4, gy, gx)] = sigmoid(out[(n, base_c + 4, gy, gx)]);
                    for cls in 0..params.num_classes {
                        let idx = base_c + 5 + cls;
                        out[(n, idx, gy, gx)] = sigmoid(out[(n, idx, gy, gx)]);
                    }
                }
            }
        }
    }
    output.set_data(&out)
}

/// `grad = sigmoid'(y) * grad_output` for the sigmoid-activated channels,
/// identity for the raw `tw`/`th` channels.
pub fn backward(params: &Params, output: &Tensor, grad_output: &Tensor, grad_input: &mut Tensor) -> GPResult<()> {
    let shape = output.shape();
    let cpa = params.channels_per_anchor();
    let mut dx = Array4::zeros((shape.n, shape.c, shape.h, shape.w));
    for a in 0..params.anchors.len() {
        let base_c = a * cpa;
        for n in 0..shape.n {
            for gy in 0..shape.h {
                for gx in 0..shape.w {
                    for c in [base_c, base_c + 1, base_c + 4] {
                        let y = output.data()[(n, c, gy, gx)];
                        dx[(n, c, gy, gx)] = grad_output.data()[(n, c, gy, gx)] * y * (1.0 - y);
                    }
                    for cls in 0..params.num_classes {
                        let c = base_c + 5 + cls;
                        let y = output.data()[(n, c, gy, gx)];
                        dx[(n, c, gy, gx)] = grad_output.data()[(n, c, gy, gx)] * y * (1.0 - y);
                    }
                    for c in [base_c + 2, base_c + 3] {
                        dx[(n, c, gy, gx)] = grad_output.data()[(n, c, gy, gx)];
                    }
                }
            }
        }
    }
    grad_input.accumulate_grad(&dx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(cx: f32, cy: f32, w: f32, h: f32, score_objectness: f32, class: usize) -> Detection {
        Detection {
            cx,
            cy,
            w,
            h,
            objectness: score_objectness,
            class,
            class_prob: 1.0,
        }
    }

    #[test]
    fn identical_boxes_have_iou_one() {
        let a = det(10.0, 10.0, 4.0, 4.0, 1.0, 0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn disjoint_boxes_have_zero_iou() {
        let a = det(0.0, 0.0, 2.0, 2.0, 1.0, 0);
        let b = det(100.0, 100.0, 2.0, 2.0, 1.0, 0);
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn nms_suppresses_overlapping_same_class_boxes_keeping_highest_score() {
        let boxes = vec![
            det(10.0, 10.0, 6.0, 6.0, 0.9, 0),
            det(10.5, 10.5, 6.0, 6.0, 0.95, 0),
            det(100.0, 100.0, 6.0, 6.0, 0.8, 0),
        ];
        let kept = nms(boxes, 0.5);
        assert_eq!(kept.len(), 2);
        assert!((kept[0].objectness - 0.95).abs() < 1e-6);
    }

    #[test]
    fn nms_keeps_overlapping_boxes_of_different_classes() {
        let boxes = vec![det(10.0, 10.0, 6.0, 6.0, 0.9, 0), det(10.0, 10.0, 6.0, 6.0, 0.9, 1)];
        let kept = nms(boxes, 0.5);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn decode_drops_detections_exactly_at_the_objectness_threshold() {
        let params = Params {
            anchors: vec![(10.0, 13.0), (16.0, 30.0), (33.0, 23.0)],
            num_classes: 80,
            image_size: 416,
        };
        let raw = Tensor::zeros("raw", crate::types::Shape4::new(1, 3 * (5 + 80), 13, 13));
        let detections = decode(&params, &raw, 0, 0.5);
        assert!(detections.is_empty());
    }
}
