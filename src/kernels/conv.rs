//! Convolution primitives: im2col/col2im, Winograd F(2x2,3x3), and NC4HW4
//! packing (spec C3).
//!
//! Grounded on `bcnn_mat.c`'s `bcnn_im2col`/`bcnn_col2im`,
//! `bcnn_conv3x3_convert_{src,dst,weights}`, and
//! `bcnn_nchw_to_nc4hw4`/`bcnn_nc4hw4_to_nchw`. Conv2D dispatches to
//! Winograd for 3x3 stride-1 kernels and falls back to im2col+GEMM
//! otherwise, mirroring the teacher's path-selection in `backend/cpu.rs`.

/// Lays out an `(c, h, w)` single-image input as an im2col matrix of shape
/// `(c*kh*kw, out_h*out_w)`, column-major per output pixel (row-major
/// storage, one row per `(channel, ky, kx)` triple), ready to feed as the
/// right operand of a GEMM with the flattened weight matrix on the left.
#[allow(clippy::too_many_arguments)]
pub fn im2col(
    input: &[f32],
    c: usize,
    h: usize,
    w: usize,
    kh: usize,
    kw: usize,
    stride_h: usize,
    stride_w: usize,
    pad_h: usize,
    pad_w: usize,
    out_h: usize,
    out_w: usize,
    out: &mut [f32],
) {
    debug_assert_eq!(out.len(), c * kh * kw * out_h * out_w);
    let out_size = out_h * out_w;
    for ch in 0..c {
        let channel = &input[ch * h * w..(ch + 1) * h * w];
        for ky in 0..kh {
            for kx in 0..kw {
                let row = ((ch * kh + ky) * kw + kx) * out_size;
                for oy in 0..out_h {
                    let iy = (oy * stride_h + ky) as isize - pad_h as isize;
                    if iy < 0 || iy as usize >= h {
                        for ox in 0..out_w {
                            out[row + oy * out_w + ox] = 0.0;
                        }
                        continue;
                    }
                    let iy = iy as usize;
                    for ox in 0..out_w {
                        let ix = (ox * stride_w + kx) as isize - pad_w as isize;
                        out[row + oy * out_w + ox] = if ix < 0 || ix as usize >= w {
                            0.0
                        } else {
                            channel[iy * w + ix as usize]
                        };
                    }
                }
            }
        }
    }
}

/// Adjoint of [`im2col`]: scatter-accumulates a column matrix of the same
/// shape back into a `(c, h, w)` gradient buffer. `out` must already be
/// zeroed by the caller; contributions from overlapping windows are summed
/// (spec's additive-gradient discipline).
#[allow(clippy::too_many_arguments)]
pub fn col2im(
    cols: &[f32],
    c: usize,
    h: usize,
    w: usize,
    kh: usize,
    kw: usize,
    stride_h: usize,
    stride_w: usize,
    pad_h: usize,
    pad_w: usize,
    out_h: usize,
    out_w: usize,
    out: &mut [f32],
) {
    debug_assert_eq!(out.len(), c * h * w);
    debug_assert_eq!(cols.len(), c * kh * kw * out_h * out_w);
    let out_size = out_h * out_w;
    for ch in 0..c {
        let channel = &mut out[ch * h * w..(ch + 1) * h * w];
        for ky in 0..kh {
            for kx in 0..kw {
                let row = ((ch * kh + ky) * kw + kx) * out_size;
                for oy in 0..out_h {
                    let iy = (oy * stride_h + ky) as isize - pad_h as isize;
                    if iy < 0 || iy as usize >= h {
                        continue;
                    }
                    let iy = iy as usize;
                    for ox in 0..out_w {
                        let ix = (ox * stride_w + kx) as isize - pad_w as isize;
                        if ix < 0 || ix as usize >= w {
                            continue;
                        }
                        channel[iy * w + ix as usize] += cols[row + oy * out_w + ox];
                    }
                }
            }
        }
    }
}

/// Winograd F(2x2, 3x3) transform matrices, fixed at compile time.
mod winograd_f2 {
    // B^T (4x4), source transform
    pub const BT: [[f32; 4]; 4] = [
        [1.0, 0.0, -1.0, 0.0],
        [0.0, 1.0, 1.0, 0.0],
        [0.0, -1.0, 1.0, 0.0],
        [0.0, 1.0, 0.0, -1.0],
    ];
    // G (4x3), weight transform
    pub const G: [[f32; 3]; 4] = [
        [1.0, 0.0, 0.0],
        [0.5, 0.5, 0.5],
        [0.5, -0.5, 0.5],
        [0.0, 0.0, 1.0],
    ];
    // A^T (2x4), destination transform
    pub const AT: [[f32; 4]; 2] = [[1.0, 1.0, 1.0, 0.0], [0.0, 1.0, -1.0, -1.0]];
}

/// Transforms a single 4x4 input tile into Winograd space: `V = B^T d B`.
pub fn winograd_transform_src_tile(tile: &[f32; 16]) -> [f32; 16] {
    let bt = winograd_f2::BT;
    let mut tmp = [0.0f32; 16];
    for i in 0..4 {
        for j in 0..4 {
            let mut s = 0.0;
            for k in 0..4 {
                s += bt[i][k] * tile[k * 4 + j];
            }
            tmp[i * 4 + j] = s;
        }
    }
    let mut out = [0.0f32; 16];
    for i in 0..4 {
        for j in 0..4 {
            let mut s = 0.0;
            for k in 0..4 {
                s += tmp[i * 4 + k] * bt[j][k];
            }
            out[i * 4 + j] = s;
        }
    }
    out
}

/// Transforms a 3x3 weight filter into Winograd space: `U = G g G^T`.
pub fn winograd_transform_weight(filter: &[f32; 9]) -> [f32; 16] {
    let g = winograd_f2::G;
    let mut tmp = [0.0f32; 12]; // 4x3
    for i in 0..4 {
        for j in 0..3 {
            let mut s = 0.0;
            for k in 0..3 {
                s += g[i][k] * filter[k * 3 + j];
            }
            tmp[i * 3 + j] = s;
        }
    }
    let mut out = [0.0f32; 16];
    for i in 0..4 {
        for j in 0..4 {
            let mut s = 0.0;
            for k in 0..3 {
                s += tmp[i * 3 + k] * g[j][k];
            }
            out[i * 4 + j] = s;
        }
    }
    out
}

/// Transforms an elementwise-multiplied 4x4 tile `M = U * V` back into a
/// 2x2 spatial output tile: `Y = A^T M A`.
pub fn winograd_transform_dst_tile(m: &[f32; 16]) -> [f32; 4] {
    let at = winograd_f2::AT;
    let mut tmp = [0.0f32; 8]; // 2x4
    for i in 0..2 {
        for j in 0..4 {
            let mut s = 0.0;
            for k in 0..4 {
                s += at[i][k] * m[k * 4 + j];
            }
            tmp[i * 4 + j] = s;
        }
    }
    let mut out = [0.0f32; 4];
    for i in 0..2 {
        for j in 0..2 {
            let mut s = 0.0;
            for k in 0..4 {
                s += tmp[i * 4 + k] * at[j][k];
            }
            out[i * 2 + j] = s;
        }
    }
    out
}

/// Full F(2x2,3x3) convolution of one `(c, h, w)` input against `(oc, c, 3, 3)`
/// weights, stride 1, with symmetric padding 1 (the only configuration the
/// spec allows Winograd dispatch for). Falls through tile-by-tile, each tile
/// covering a 2x2 output region from a 4x4 (overlapping) input patch.
pub fn winograd_conv3x3(
    input: &[f32],
    c: usize,
    h: usize,
    w: usize,
    weights: &[f32],
    oc: usize,
    out: &mut [f32],
) {
    let out_h = h;
    let out_w = w;
    debug_assert_eq!(weights.len(), oc * c * 9);
    debug_assert_eq!(out.len(), oc * out_h * out_w);
    out.fill(0.0);

    let tiles_h = (out_h + 1) / 2;
    let tiles_w = (out_w + 1) / 2;

    // Pre-transform every weight filter once.
    let mut u = vec![0.0f32; oc * c * 16];
    for o in 0..oc {
        for ch in 0..c {
            let mut filt = [0.0f32; 9];
            filt.copy_from_slice(&weights[(o * c + ch) * 9..(o * c + ch) * 9 + 9]);
            let transformed = winograd_transform_weight(&filt);
            u[(o * c + ch) * 16..(o * c + ch) * 16 + 16].copy_from_slice(&transformed);
        }
    }

    for ty in 0..tiles_h {
        for tx in 0..tiles_w {
            // accumulate per-output-channel M tiles over input channels
            let mut acc = vec![[0.0f32; 16]; oc];
            for ch in 0..c {
                let mut tile = [0.0f32; 16];
                for dy in 0..4usize {
                    let iy = ty as isize * 2 + dy as isize - 1;
                    for dx in 0..4usize {
                        let ix = tx as isize * 2 + dx as isize - 1;
                        tile[dy * 4 + dx] = if iy < 0 || ix < 0 || iy as usize >= h || ix as usize >= w {
                            0.0
                        } else {
                            input[ch * h * w + iy as usize * w + ix as usize]
                        };
                    }
                }
                let v = winograd_transform_src_tile(&tile);
                for o in 0..oc {
                    let uo = &u[(o * c + ch) * 16..(o * c + ch) * 16 + 16];
                    for idx in 0..16 {
                        acc[o][idx] += uo[idx] * v[idx];
                    }
                }
            }
            for o in 0..oc {
                let y_tile = winograd_transform_dst_tile(&acc[o]);
                for dy in 0..2 {
                    let oy = ty * 2 + dy;
                    if oy >= out_h {
                        continue;
                    }
                    for dx in 0..2 {
                        let ox = tx * 2 + dx;
                        if ox >= out_w {
                            continue;
                        }
                        out[o * out_h * out_w + oy * out_w + ox] = y_tile[dy * 2 + dx];
                    }
                }
            }
        }
    }
}

/// Repacks an NCHW buffer into NC4HW4 (channels grouped in blocks of 4,
/// trailing partial group zero-padded), the layout the teacher's CUDA
/// elementwise kernels and accelerator mirrors expect.
pub fn nchw_to_nc4hw4(input: &[f32], c: usize, h: usize, w: usize) -> Vec<f32> {
    let c4 = (c + 3) / 4;
    let mut out = vec![0.0f32; c4 * 4 * h * w];
    for ch in 0..c {
        let group = ch / 4;
        let lane = ch % 4;
        for p in 0..h * w {
            out[(group * h * w + p) * 4 + lane] = input[ch * h * w + p];
        }
    }
    out
}

/// Inverse of [`nchw_to_nc4hw4`]; `c` is the true (unpadded) channel count.
pub fn nc4hw4_to_nchw(input: &[f32], c: usize, h: usize, w: usize) -> Vec<f32> {
    let mut out = vec![0.0f32; c * h * w];
    for ch in 0..c {
        let group = ch / 4;
        let lane = ch % 4;
        for p in 0..h * w {
            out[ch * h * w + p] = input[(group * h * w + p) * 4 + lane];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::gemm::{gemm, GemmContext};

    fn naive_conv(
        input: &[f32],
        c: usize,
        h: usize,
        w: usize,
        weights: &[f32],
        oc: usize,
        kh: usize,
        kw: usize,
        stride: usize,
        pad: usize,
        out_h: usize,
        out_w: usize,
    ) -> Vec<f32> {
        let mut out = vec![0.0f32; oc * out_h * out_w];
        for o in 0..oc {
            for oy in 0..out_h {
                for ox in 0..out_w {
                    let mut s = 0.0f32;
                    for ch in 0..c {
                        for ky in 0..kh {
                            for kx in 0..kw {
                                let iy = (oy * stride + ky) as isize - pad as isize;
                                let ix = (ox * stride + kx) as isize - pad as isize;
                                if iy < 0 || ix < 0 || iy as usize >= h || ix as usize >= w {
                                    continue;
                                }
                                s += input[ch * h * w + iy as usize * w + ix as usize]
                                    * weights[((o * c + ch) * kh + ky) * kw + kx];
                            }
                        }
                    }
                    out[o * out_h * out_w + oy * out_w + ox] = s;
                }
            }
        }
        out
    }

    fn seq(n: usize, scale: f32, offset: f32) -> Vec<f32> {
        (0..n).map(|i| (i as f32) * scale + offset).collect()
    }

    #[test]
    fn im2col_then_gemm_matches_naive_conv() {
        let (c, h, w) = (2, 5, 5);
        let (oc, kh, kw, stride, pad) = (3, 3, 3, 1, 1);
        let out_h = (h + 2 * pad - kh) / stride + 1;
        let out_w = (w + 2 * pad - kw) / stride + 1;

        let input = seq(c * h * w, 0.1, -1.0);
        let weights = seq(oc * c * kh * kw, 0.05, 0.2);

        let mut cols = vec![0.0f32; c * kh * kw * out_h * out_w];
        im2col(&input, c, h, w, kh, kw, stride, stride, pad, pad, out_h, out_w, &mut cols);

        let mut out = vec![0.0f32; oc * out_h * out_w];
        let mut ctx = GemmContext::new();
        gemm(
            &mut ctx,
            false,
            false,
            oc,
            out_h * out_w,
            c * kh * kw,
            1.0,
            &weights,
            &cols,
            0.0,
            &mut out,
        );

        let reference = naive_conv(&input, c, h, w, &weights, oc, kh, kw, stride, pad, out_h, out_w);
        for (a, b) in out.iter().zip(reference.iter()) {
            assert!((a - b).abs() < 1e-3, "{} vs {}", a, b);
        }
    }

    #[test]
    fn col2im_is_adjoint_of_im2col() {
        // <im2col(x), g> == <x, col2im(g)> for random x, g (adjoint test).
        let (c, h, w) = (2, 4, 4);
        let (kh, kw, stride, pad) = (3, 3, 1, 1);
        let out_h = (h + 2 * pad - kh) / stride + 1;
        let out_w = (w + 2 * pad - kw) / stride + 1;

        let x = seq(c * h * w, 0.3, 0.1);
        let mut cols = vec![0.0f32; c * kh * kw * out_h * out_w];
        im2col(&x, c, h, w, kh, kw, stride, stride, pad, pad, out_h, out_w, &mut cols);

        let g = seq(cols.len(), 0.01, -0.05);
        let lhs: f32 = cols.iter().zip(g.iter()).map(|(a, b)| a * b).sum();

        let mut grad_x = vec![0.0f32; c * h * w];
        col2im(&g, c, h, w, kh, kw, stride, stride, pad, pad, out_h, out_w, &mut grad_x);
        let rhs: f32 = x.iter().zip(grad_x.iter()).map(|(a, b)| a * b).sum();

        assert!((lhs - rhs).abs() < 1e-2 * lhs.abs().max(1.0), "{} vs {}", lhs, rhs);
    }

    #[test]
    fn winograd_matches_im2col_gemm_for_3x3_stride1() {
        let (c, h, w) = (3, 6, 6);
        let oc = 2;
        let weights = seq(oc * c * 9, 0.02, -0.1);
        let input = seq(c * h * w, 0.05, 0.0);

        let mut wino_out = vec![0.0f32; oc * h * w];
        winograd_conv3x3(&input, c, h, w, &weights, oc, &mut wino_out);

        let out_h = h;
        let out_w = w;
        let mut cols = vec![0.0f32; c * 9 * out_h * out_w];
        im2col(&input, c, h, w, 3, 3, 1, 1, 1, 1, out_h, out_w, &mut cols);
        let mut gemm_out = vec![0.0f32; oc * out_h * out_w];
        let mut ctx = GemmContext::new();
        gemm(&mut ctx, false, false, oc, out_h * out_w, c * 9, 1.0, &weights, &cols, 0.0, &mut gemm_out);

        for (a, b) in wino_out.iter().zip(gemm_out.iter()) {
            assert!((a - b).abs() < 1e-2 * b.abs().max(1.0), "{} vs {}", a, b);
        }
    }

    #[test]
    fn nc4hw4_round_trips_through_nchw() {
        let (c, h, w) = (5, 2, 3);
        let input = seq(c * h * w, 1.0, 0.0);
        let packed = nchw_to_nc4hw4(&input, c, h, w);
        let unpacked = nc4hw4_to_nchw(&packed, c, h, w);
        assert_eq!(input, unpacked);
    }
}
