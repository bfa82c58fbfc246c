// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vector kernels with SIMD dispatch.
//!
//! `dot` picks AVX2+FMA on x86_64 when the CPU has it, NEON on aarch64, and
//! a portable loop otherwise. `gemm_nt` computes all row-pair dot products of
//! two row-major matrices, which is what the similarity matrix needs.

/// Dot product of two vectors.
#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma") {
            // SAFETY: the required CPU features were detected above.
            return unsafe { dot_avx2(a, b) };
        }
    }
    #[cfg(target_arch = "aarch64")]
    {
        // SAFETY: NEON is part of the aarch64 baseline.
        return unsafe { dot_neon(a, b) };
    }
    #[allow(unreachable_code)]
    dot_portable(a, b)
}

/// L2 norm of a vector.
#[inline]
pub fn norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

/// `out[i * rows_b + j] = dot(a_i, b_j)` for row-major `a` and `b` of width `dim`.
pub fn gemm_nt(a: &[f32], b: &[f32], dim: usize, out: &mut [f32]) {
    if dim == 0 {
        out.fill(0.0);
        return;
    }
    let rows_b = b.len() / dim;
    debug_assert_eq!(out.len(), (a.len() / dim) * rows_b);

    for (a_row, out_row) in a.chunks_exact(dim).zip(out.chunks_exact_mut(rows_b.max(1))) {
        let mut quads = b.chunks_exact(4 * dim);
        let mut j = 0;
        for quad in &mut quads {
            let (b0, rest) = quad.split_at(dim);
            let (b1, rest) = rest.split_at(dim);
            let (b2, b3) = rest.split_at(dim);
            let mut acc = [0.0f32; 4];
            for ((((x, y0), y1), y2), y3) in a_row.iter().zip(b0).zip(b1).zip(b2).zip(b3) {
                acc[0] += x * y0;
                acc[1] += x * y1;
                acc[2] += x * y2;
                acc[3] += x * y3;
            }
            out_row[j..j + 4].copy_from_slice(&acc);
            j += 4;
        }
        for b_row in quads.remainder().chunks_exact(dim) {
            out_row[j] = dot(a_row, b_row);
            j += 1;
        }
    }
}

// Portable fallback

#[inline]
fn dot_portable(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

// AVX2 + FMA (x86_64)

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2,fma")]
unsafe fn dot_avx2(a: &[f32], b: &[f32]) -> f32 {
    use std::arch::x86_64::*;

    let n = a.len().min(b.len());
    let chunks = n / 8;
    let remainder = n % 8;

    let mut sum = _mm256_setzero_ps();
    let a_ptr = a.as_ptr();
    let b_ptr = b.as_ptr();

    for i in 0..chunks {
        let offset = i * 8;
        let va = _mm256_loadu_ps(a_ptr.add(offset));
        let vb = _mm256_loadu_ps(b_ptr.add(offset));
        sum = _mm256_fmadd_ps(va, vb, sum);
    }

    let hi = _mm256_extractf128_ps(sum, 1);
    let lo = _mm256_castps256_ps128(sum);
    let sum128 = _mm_add_ps(lo, hi);
    let sum64 = _mm_add_ps(sum128, _mm_movehl_ps(sum128, sum128));
    let sum32 = _mm_add_ss(sum64, _mm_shuffle_ps(sum64, sum64, 1));
    let mut result = _mm_cvtss_f32(sum32);

    let tail_start = chunks * 8;
    for i in 0..remainder {
        result += a[tail_start + i] * b[tail_start + i];
    }

    result
}

// NEON (aarch64)

#[cfg(target_arch = "aarch64")]
#[target_feature(enable = "neon")]
unsafe fn dot_neon(a: &[f32], b: &[f32]) -> f32 {
    use std::arch::aarch64::*;

    let n = a.len().min(b.len());
    let chunks = n / 4;
    let remainder = n % 4;

    let mut sum = vdupq_n_f32(0.0);
    let a_ptr = a.as_ptr();
    let b_ptr = b.as_ptr();

    for i in 0..chunks {
        let offset = i * 4;
        let va = vld1q_f32(a_ptr.add(offset));
        let vb = vld1q_f32(b_ptr.add(offset));
        sum = vfmaq_f32(sum, va, vb);
    }

    let mut result = vaddvq_f32(sum);

    let tail_start = chunks * 4;
    for i in 0..remainder {
        result += a[tail_start + i] * b[tail_start + i];
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dot_matches_scalar_sum() {
        assert!((dot(&[1.0, 2.0], &[3.0, 4.0]) - 11.0).abs() < 1e-5);

        let a: Vec<f32> = (0..37).map(|i| i as f32 * 0.5).collect();
        let b: Vec<f32> = (0..37).map(|i| (i % 5) as f32).collect();
        let expected: f32 = a.iter().zip(&b).map(|(x, y)| x * y).sum();
        assert!((dot(&a, &b) - expected).abs() < 1e-2);
    }

    #[test]
    fn gemm_covers_blocked_and_tail_rows() {
        let dim = 3;
        let a: Vec<f32> = vec![1.0, 0.0, 2.0, 0.5, 1.0, -1.0];
        let b: Vec<f32> = (0..6 * dim).map(|i| (i % 7) as f32 - 3.0).collect();
        let mut out = vec![0.0; 2 * 6];
        gemm_nt(&a, &b, dim, &mut out);
        for i in 0..2 {
            for j in 0..6 {
                let expected = dot_portable(&a[i * dim..(i + 1) * dim], &b[j * dim..(j + 1) * dim]);
                assert!((out[i * 6 + j] - expected).abs() < 1e-5, "cell ({i}, {j})");
            }
        }
    }
}
