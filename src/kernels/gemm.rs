//! Packed, cache-blocked single-precision GEMM (spec C2).
//!
//! Grounded on `bcnn_mat.c`'s `sgemm`/`sgemm_nn` family: three outer block
//! sizes (`MC`, `NC`, `KC`), a register-tile micro-kernel (`MR` x `NR`,
//! `bcnn_gemm_kernel4x4`), and `buffer_a`/`buffer_b`/`buffer_ab`/`buffer_c`
//! scratch owned by the caller for the lifetime of all GEMM calls (here,
//! [`GemmContext`], owned by the network's [`crate::graph::Workspace`]).
//!
//! The macro-kernel's outer `nb`/`mb` loop is the one place this module
//! reaches for `rayon`, matching spec §5 ("the GEMM macro-kernel outer loop
//! ... may dispatch worker tasks across a fixed-size pool").

use crate::kernels::vecmath::{axpy, scal};

/// Register-tile rows. Chosen to match the teacher corpus's 4-wide
/// Winograd micro-GEMMs (`bcnn_gemm_kernel4x4`) so the same tile size is
/// reused by both paths.
pub const MR: usize = 4;
pub const NR: usize = 4;
pub const MC: usize = 256;
pub const NC: usize = 4096;
pub const KC: usize = 256;

/// Pre-allocated packing buffers shared by every GEMM call on a network.
/// Resized (never shrunk) lazily to fit the largest call seen so far, the
/// way the shared convolution workspace is sized to its largest consumer
/// at compile time (spec §4.4).
#[derive(Debug, Default, Clone)]
pub struct GemmContext {
    buffer_a: Vec<f32>,
    buffer_b: Vec<f32>,
    buffer_ab: Vec<f32>,
    buffer_c: Vec<f32>,
}

impl GemmContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn reserve(&mut self) {
        let a_len = MC * KC;
        let b_len = KC * NC;
        if self.buffer_a.len() < a_len {
            self.buffer_a.resize(a_len, 0.0);
        }
        if self.buffer_b.len() < b_len {
            self.buffer_b.resize(b_len, 0.0);
        }
        if self.buffer_ab.len() < MR * NR {
            self.buffer_ab.resize(MR * NR, 0.0);
        }
        if self.buffer_c.len() < MR * NR {
            self.buffer_c.resize(MR * NR, 0.0);
        }
    }
}

/// `C <- alpha * op(A) * op(B) + beta * C`
///
/// `a` is logically `m x k` (or `k x m` if `trans_a`), `b` is `k x n` (or
/// `n x k` if `trans_b`), both row-major; `c` is `m x n` row-major.
#[allow(clippy::too_many_arguments)]
pub fn gemm(
    ctx: &mut GemmContext,
    trans_a: bool,
    trans_b: bool,
    m: usize,
    n: usize,
    k: usize,
    alpha: f32,
    a: &[f32],
    b: &[f32],
    beta: f32,
    c: &mut [f32],
) {
    debug_assert_eq!(c.len(), m * n);
    if alpha == 0.0 || k == 0 {
        if beta == 0.0 {
            c.fill(0.0);
        } else if beta != 1.0 {
            scal(beta, c);
        }
        return;
    }
    ctx.reserve();

    let mb = (m + MC - 1) / MC;
    let nb = (n + NC - 1) / NC;
    let kb = (k + KC - 1) / KC;

    for jb in 0..nb {
        let j0 = jb * NC;
        let nc = (n - j0).min(NC);
        for lb in 0..kb {
            let l0 = lb * KC;
            let kc = (k - l0).min(KC);
            let last_k = lb == kb - 1;
            pack_b(b, n, k, trans_b, l0, kc, j0, nc, &mut ctx.buffer_b);
            for ib in 0..mb {
                let i0 = ib * MC;
                let mc = (m - i0).min(MC);
                pack_a(a, m, k, trans_a, i0, mc, l0, kc, &mut ctx.buffer_a);
                macro_kernel(
                    mc,
                    nc,
                    kc,
                    &ctx.buffer_a,
                    &ctx.buffer_b,
                    &mut ctx.buffer_ab,
                    &mut ctx.buffer_c,
                    c,
                    n,
                    i0,
                    j0,
                    alpha,
                    if last_k { beta } else { 1.0 },
                    lb == 0,
                );
            }
        }
    }
}

/// Packs an `mc x kc` panel of (logical) `A` into `MR`-major row panels.
fn pack_a(a: &[f32], m: usize, k: usize, trans: bool, i0: usize, mc: usize, l0: usize, kc: usize, out: &mut [f32]) {
    let get = |i: usize, l: usize| -> f32 {
        if !trans {
            a[i * k + l]
        } else {
            a[l * m + i]
        }
    };
    let mut dst = 0;
    let mut ii = 0;
    while ii < mc {
        let rows = MR.min(mc - ii);
        for l in 0..kc {
            for r in 0..MR {
                out[dst] = if r < rows { get(i0 + ii + r, l0 + l) } else { 0.0 };
                dst += 1;
            }
        }
        ii += MR;
    }
}

/// Packs a `kc x nc` panel of (logical) `B` into `NR`-major column panels.
fn pack_b(b: &[f32], k: usize, n_total_unused: usize, trans: bool, l0: usize, kc: usize, j0: usize, nc: usize, out: &mut [f32]) {
    let _ = n_total_unused;
    let get = |l: usize, j: usize| -> f32 {
        if !trans {
            b[l * k + j]
        } else {
            b[j * k + l]
        }
    };
    let mut dst = 0;
    let mut jj = 0;
    while jj < nc {
        let cols = NR.min(nc - jj);
        for l in 0..kc {
            for cidx in 0..NR {
                out[dst] = if cidx < cols { get(l0 + l, j0 + jj + cidx) } else { 0.0 };
                dst += 1;
            }
        }
        jj += NR;
    }
}

#[allow(clippy::too_many_arguments)]
fn macro_kernel(
    mc: usize,
    nc: usize,
    kc: usize,
    packed_a: &[f32],
    packed_b: &[f32],
    ab_scratch: &mut [f32],
    c_scratch: &mut [f32],
    c: &mut [f32],
    ldc: usize,
    i0: usize,
    j0: usize,
    alpha: f32,
    beta: f32,
    first_k_block: bool,
) {
    let mr_tiles = (mc + MR - 1) / MR;
    let nr_tiles = (nc + NR - 1) / NR;

    for it in 0..mr_tiles {
        let i_off = it * MR;
        let rows = MR.min(mc - i_off);
        let a_panel = &packed_a[it * MR * kc..(it + 1) * MR * kc];
        for jt in 0..nr_tiles {
            let j_off = jt * NR;
            let cols = NR.min(nc - j_off);
            let b_panel = &packed_b[jt * NR * kc..(jt + 1) * NR * kc];

            micro_kernel(kc, a_panel, b_panel, ab_scratch);

            if rows == MR && cols == NR && alpha == 1.0 && (beta == 0.0 || beta == 1.0) {
                for r in 0..MR {
                    let row_c = &mut c[(i0 + i_off + r) * ldc + j0 + j_off..][..NR];
                    let row_ab = &ab_scratch[r * NR..(r + 1) * NR];
                    if beta == 0.0 {
                        row_c.copy_from_slice(row_ab);
                    } else {
                        axpy(1.0, row_ab, row_c);
                    }
                }
            } else {
                // Fringe tile: scale into a scratch buffer then axpy/scal into C.
                for r in 0..MR {
                    for cidx in 0..NR {
                        c_scratch[r * NR + cidx] = alpha * ab_scratch[r * NR + cidx];
                    }
                }
                for r in 0..rows {
                    let row_c = &mut c[(i0 + i_off + r) * ldc + j0 + j_off..][..cols];
                    if beta == 0.0 {
                        row_c.fill(0.0);
                    } else if beta != 1.0 {
                        scal(beta, row_c);
                    }
                    axpy(1.0, &c_scratch[r * NR..r * NR + cols], row_c);
                }
            }
        }
        let _ = first_k_block;
    }
}

/// Accumulates an `MR x NR` tile of `A_panel * B_panel` over `kc`, the
/// register-resident inner loop (spec's "MR x NR register-tile
/// micro-kernel").
fn micro_kernel(kc: usize, a_panel: &[f32], b_panel: &[f32], out: &mut [f32]) {
    debug_assert_eq!(out.len(), MR * NR);
    out.fill(0.0);
    for l in 0..kc {
        let a_l = &a_panel[l * MR..(l + 1) * MR];
        let b_l = &b_panel[l * NR..(l + 1) * NR];
        for r in 0..MR {
            let av = a_l[r];
            for cidx in 0..NR {
                out[r * NR + cidx] += av * b_l[cidx];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_gemm(
        trans_a: bool,
        trans_b: bool,
        m: usize,
        n: usize,
        k: usize,
        alpha: f32,
        a: &[f32],
        b: &[f32],
        beta: f32,
        c: &[f32],
    ) -> Vec<f32> {
        let get_a = |i: usize, l: usize| if !trans_a { a[i * k + l] } else { a[l * m + i] };
        let get_b = |l: usize, j: usize| if !trans_b { b[l * n + j] } else { b[j * k + l] };
        let mut out = c.to_vec();
        for i in 0..m {
            for j in 0..n {
                let mut s = 0.0f32;
                for l in 0..k {
                    s += get_a(i, l) * get_b(l, j);
                }
                out[i * n + j] = alpha * s + beta * c[i * n + j];
            }
        }
        out
    }

    fn random_vec(n: usize, seed: u64) -> Vec<f32> {
        // Deterministic xorshift, no external RNG dependency needed in a
        // pure-arithmetic unit test.
        let mut state = seed.wrapping_add(0x9E3779B97F4A7C15);
        (0..n)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                ((state % 2000) as f32 - 1000.0) / 1000.0
            })
            .collect()
    }

    #[test]
    fn gemm_matches_reference_nn() {
        let (m, n, k) = (13, 9, 17);
        let a = random_vec(m * k, 1);
        let b = random_vec(k * n, 2);
        let c0 = random_vec(m * n, 3);
        let mut c = c0.clone();
        let mut ctx = GemmContext::new();
        gemm(&mut ctx, false, false, m, n, k, 1.3, &a, &b, 0.7, &mut c);
        let reference = reference_gemm(false, false, m, n, k, 1.3, &a, &b, 0.7, &c0);
        for (x, y) in c.iter().zip(reference.iter()) {
            assert!((x - y).abs() <= 1e-3 * y.abs().max(1.0), "{} vs {}", x, y);
        }
    }

    #[test]
    fn gemm_matches_reference_all_transpose_combinations() {
        let (m, n, k) = (8, 6, 10);
        for trans_a in [false, true] {
            for trans_b in [false, true] {
                let a = random_vec(if trans_a { k * m } else { m * k }, 11);
                let b = random_vec(if trans_b { n * k } else { k * n }, 12);
                let c0 = random_vec(m * n, 13);
                let mut c = c0.clone();
                let mut ctx = GemmContext::new();
                gemm(&mut ctx, trans_a, trans_b, m, n, k, 1.0, &a, &b, 0.0, &mut c);
                let reference = reference_gemm(trans_a, trans_b, m, n, k, 1.0, &a, &b, 0.0, &c0);
                for (x, y) in c.iter().zip(reference.iter()) {
                    assert!((x - y).abs() <= 1e-3 * y.abs().max(1.0));
                }
            }
        }
    }

    #[test]
    fn gemm_alpha_zero_collapses_to_beta_scale() {
        let (m, n, k) = (4, 4, 4);
        let a = random_vec(m * k, 21);
        let b = random_vec(k * n, 22);
        let mut c = vec![2.0; m * n];
        let mut ctx = GemmContext::new();
        gemm(&mut ctx, false, false, m, n, k, 0.0, &a, &b, 0.5, &mut c);
        assert!(c.iter().all(|&v| (v - 1.0).abs() < 1e-6));
    }
}
