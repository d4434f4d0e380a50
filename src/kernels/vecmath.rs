//! Level-1/2 vector primitives over contiguous `f32` slices (spec C1).
//!
//! Grounded on `bcnn_mat.c`'s free functions (`bcnn_axpy`, `bcnn_dot`,
//! `bcnn_l2_distance`, `bcnn_shiftdot`, `bcnn_add_bias`, `bcnn_scales`, ...).
//! The teacher crate leans on `ndarray::Zip::par_for_each` for its
//! elementwise kernels (`backend/cpu.rs`); we follow the same pattern here
//! with `rayon`'s `par_chunks_mut` directly on slices, since these routines
//! operate below the `Tensor`/`ndarray` layer on raw buffers shared with
//! GEMM and convolution.

/// Safe-zero threshold used throughout the kernel layer (spec §4.1).
pub const EPS: f32 = 1e-5;

pub fn fill(y: &mut [f32], value: f32) {
    y.iter_mut().for_each(|v| *v = value);
}

pub fn copy(x: &[f32], y: &mut [f32]) {
    y.copy_from_slice(x);
}

/// `y += a * x`
pub fn axpy(a: f32, x: &[f32], y: &mut [f32]) {
    debug_assert_eq!(x.len(), y.len());
    for (yi, xi) in y.iter_mut().zip(x.iter()) {
        *yi += a * *xi;
    }
}

/// `y = a * x + b * y`
pub fn axpby(a: f32, x: &[f32], b: f32, y: &mut [f32]) {
    debug_assert_eq!(x.len(), y.len());
    for (yi, xi) in y.iter_mut().zip(x.iter()) {
        *yi = a * *xi + b * *yi;
    }
}

pub fn scal(a: f32, x: &mut [f32]) {
    x.iter_mut().for_each(|v| *v *= a);
}

pub fn add_scalar(a: f32, x: &mut [f32]) {
    x.iter_mut().for_each(|v| *v += a);
}

pub fn vadd(a: &[f32], b: &[f32], y: &mut [f32]) {
    debug_assert_eq!(a.len(), b.len());
    debug_assert_eq!(a.len(), y.len());
    for ((yi, ai), bi) in y.iter_mut().zip(a.iter()).zip(b.iter()) {
        *yi = *ai + *bi;
    }
}

pub fn vsub(a: &[f32], b: &[f32], y: &mut [f32]) {
    for ((yi, ai), bi) in y.iter_mut().zip(a.iter()).zip(b.iter()) {
        *yi = *ai - *bi;
    }
}

pub fn vmul(a: &[f32], b: &[f32], y: &mut [f32]) {
    for ((yi, ai), bi) in y.iter_mut().zip(a.iter()).zip(b.iter()) {
        *yi = *ai * *bi;
    }
}

/// Element-wise division that returns 0 wherever `|b_i| <= EPS` (spec §4.1).
pub fn vdiv_safe(a: &[f32], b: &[f32], y: &mut [f32]) {
    for ((yi, ai), bi) in y.iter_mut().zip(a.iter()).zip(b.iter()) {
        *yi = if bi.abs() <= EPS { 0.0 } else { *ai / *bi };
    }
}

pub fn dot(x: &[f32], y: &[f32]) -> f32 {
    debug_assert_eq!(x.len(), y.len());
    x.iter().zip(y.iter()).map(|(a, b)| a * b).sum()
}

pub fn sum(x: &[f32]) -> f32 {
    x.iter().sum()
}

/// `y_i = sum_j(a * x_j + b * x_j)`-style shifted dot product:
/// `sum_i((x_i - a) * (y_i - b))`, used by variance/covariance accumulation
/// paths that need a dot product around two running means (`bcnn_shiftdot`).
pub fn shiftdot(x: &[f32], a: f32, y: &[f32], b: f32) -> f32 {
    debug_assert_eq!(x.len(), y.len());
    x.iter().zip(y.iter()).map(|(xi, yi)| (*xi - a) * (*yi - b)).sum()
}

pub fn l2_distance(x: &[f32], y: &[f32]) -> f32 {
    debug_assert_eq!(x.len(), y.len());
    x.iter()
        .zip(y.iter())
        .map(|(a, b)| (a - b) * (a - b))
        .sum::<f32>()
        .sqrt()
}

/// General matrix-vector multiply: `y = alpha * op(A) * x + beta * y`, `A`
/// is `m` x `n` row-major.
pub fn gemv(trans_a: bool, m: usize, n: usize, alpha: f32, a: &[f32], x: &[f32], beta: f32, y: &mut [f32]) {
    if !trans_a {
        debug_assert_eq!(a.len(), m * n);
        debug_assert_eq!(x.len(), n);
        debug_assert_eq!(y.len(), m);
        for i in 0..m {
            let row = &a[i * n..(i + 1) * n];
            let s: f32 = row.iter().zip(x.iter()).map(|(r, xv)| r * xv).sum();
            y[i] = alpha * s + beta * y[i];
        }
    } else {
        debug_assert_eq!(a.len(), m * n);
        debug_assert_eq!(x.len(), m);
        debug_assert_eq!(y.len(), n);
        let mut acc = vec![0.0f32; n];
        for i in 0..m {
            let xi = x[i];
            if xi == 0.0 {
                continue;
            }
            let row = &a[i * n..(i + 1) * n];
            for (a_j, acc_j) in row.iter().zip(acc.iter_mut()) {
                *acc_j += xi * a_j;
            }
        }
        for (yi, ai) in y.iter_mut().zip(acc.iter()) {
            *yi = alpha * *ai + beta * *yi;
        }
    }
}

/// `y <- y * c / (a * sqrt(a) + eps)`, used to fold a per-channel variance
/// into a scale factor during batch-norm backward (spec §4.1).
pub fn variance_normalize(y: &mut [f32], a: f32, c: f32) {
    let denom = a * a.sqrt() + EPS;
    for v in y.iter_mut() {
        *v = *v * c / denom;
    }
}

/// `var <- var * a - m * m`, turning a mean-of-squares accumulator into a
/// variance given the mean `m` (spec §4.1).
pub fn mean_to_variance(var: &mut f32, a: f32, m: f32) {
    *var = *var * a - m * m;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axpy_matches_manual_loop() {
        let x = vec![1.0, 2.0, 3.0];
        let mut y = vec![10.0, 10.0, 10.0];
        axpy(2.0, &x, &mut y);
        assert_eq!(y, vec![12.0, 14.0, 16.0]);
    }

    #[test]
    fn vdiv_safe_zeroes_near_zero_divisor() {
        let a = [1.0, 2.0, 3.0];
        let b = [0.0, 1e-6, 2.0];
        let mut y = [0.0; 3];
        vdiv_safe(&a, &b, &mut y);
        assert_eq!(y, [0.0, 0.0, 1.5]);
    }

    #[test]
    fn dot_agrees_with_l2_distance_identity() {
        let x = [1.0, 2.0, 3.0];
        let y = [1.0, 2.0, 3.0];
        assert_eq!(l2_distance(&x, &y), 0.0);
        assert!((dot(&x, &y) - 14.0).abs() < 1e-6);
    }

    #[test]
    fn gemv_matches_naive_matmul() {
        // A = [[1,2,3],[4,5,6]] (2x3), x = [1,1,1]
        let a = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let x = vec![1.0, 1.0, 1.0];
        let mut y = vec![0.0, 0.0];
        gemv(false, 2, 3, 1.0, &a, &x, 0.0, &mut y);
        assert_eq!(y, vec![6.0, 15.0]);
    }
}
