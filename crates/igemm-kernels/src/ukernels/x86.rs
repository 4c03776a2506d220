//! x86_64 kernels with SSE2, SSE4.1 and AVX2 for the `c8` packing layout.
//!
//! All of them widen eight activations and eight weights per column to
//! 16 bits and accumulate with `madd_epi16`, keeping one partial-sum vector
//! per output column until the reduction at the end of a column tile. The
//! output stage multiplies in float, clamps the upper bound in float and
//! lets the saturating packs plus `max_epu8` handle the lower bound.
#![allow(unsafe_op_in_unsafe_fn)]
#![allow(clippy::too_many_arguments)]

use super::{TileShape, load_padded, store_tile};
use crate::indirection::IndirectA;
use crate::packing::packed_bias;
use crate::params::{Fp32SimdParams, Qu8ConvMinmaxParams};
use igemm_common::{IgemmError, Isa, KernelError, Result, round_up};
use std::arch::x86_64::*;

fn unsupported(required: Isa) -> IgemmError {
    KernelError::UnsupportedHardware { required, available: "none".to_string() }.into()
}

// ── SSE2 / SSE4.1: 4 columns ─────────────────────────────────────────────────

#[target_feature(enable = "sse2")]
unsafe fn requantize_x4<const MR: usize>(
    vacc: &[__m128i; MR],
    params: &Fp32SimdParams,
) -> [[u8; 4]; MR] {
    let vscale = _mm_set1_ps(params.scale);
    let vmax = _mm_set1_ps(params.output_max_less_zero_point);
    let vzero_point = _mm_set1_epi16(params.output_zero_point);
    let vmin = _mm_set1_epi8(params.output_min as i8);

    let mut scaled = [_mm_setzero_si128(); MR];
    for (dst, &acc) in scaled.iter_mut().zip(vacc) {
        let v = _mm_mul_ps(_mm_cvtepi32_ps(acc), vscale);
        *dst = _mm_cvtps_epi32(_mm_min_ps(v, vmax));
    }

    let mut out = [[0u8; 4]; MR];
    let mut bytes = [0u8; 16];
    for i in (0..MR).step_by(2) {
        let hi = if i + 1 < MR { scaled[i + 1] } else { scaled[i] };
        let v01 = _mm_adds_epi16(_mm_packs_epi32(scaled[i], hi), vzero_point);
        let vout = _mm_max_epu8(_mm_packus_epi16(v01, v01), vmin);
        _mm_storeu_si128(bytes.as_mut_ptr().cast(), vout);
        out[i].copy_from_slice(&bytes[..4]);
        if i + 1 < MR {
            out[i + 1].copy_from_slice(&bytes[4..8]);
        }
    }
    out
}

#[target_feature(enable = "sse2")]
unsafe fn igemm_4xc8_sse2<const MR: usize>(
    mr: usize,
    nc: usize,
    kc: usize,
    ks: usize,
    a: &IndirectA<'_>,
    w: &[u8],
    c: &mut [u8],
    cm_stride: usize,
    cn_stride: usize,
    tile_size: usize,
    params: &Fp32SimdParams,
) {
    let kc_padded = round_up(kc, 8);
    let vzero = _mm_setzero_si128();
    let vb_zero_point = _mm_set1_epi16(params.kernel_zero_point);

    for (tile, n_start) in (0..nc).step_by(4).enumerate() {
        let wt = &w[tile * tile_size..(tile + 1) * tile_size];
        let mut vacc = [[vzero; 4]; MR];
        for row in vacc.iter_mut() {
            for (j, v) in row.iter_mut().enumerate() {
                *v = _mm_cvtsi32_si128(packed_bias(wt, j));
            }
        }

        let mut wi = 16;
        for p in 0..ks {
            let mut rows = [&[][..]; MR];
            for (i, row) in rows.iter_mut().enumerate() {
                *row = a.row(p * MR + i);
            }
            for k in (0..kc_padded).step_by(8) {
                let mut vxa = [vzero; MR];
                for (v, row) in vxa.iter_mut().zip(&rows) {
                    let block = load_padded::<8>(row, k, kc);
                    *v = _mm_unpacklo_epi8(_mm_loadl_epi64(block.as_ptr().cast()), vzero);
                }

                let vb01 = _mm_loadu_si128(wt[wi..wi + 16].as_ptr().cast());
                let vb23 = _mm_loadu_si128(wt[wi + 16..wi + 32].as_ptr().cast());
                let vxb = [
                    _mm_sub_epi16(_mm_unpacklo_epi8(vb01, vzero), vb_zero_point),
                    _mm_sub_epi16(_mm_unpackhi_epi8(vb01, vzero), vb_zero_point),
                    _mm_sub_epi16(_mm_unpacklo_epi8(vb23, vzero), vb_zero_point),
                    _mm_sub_epi16(_mm_unpackhi_epi8(vb23, vzero), vb_zero_point),
                ];
                for (acc, &xa) in vacc.iter_mut().zip(&vxa) {
                    for (v, &xb) in acc.iter_mut().zip(&vxb) {
                        *v = _mm_add_epi32(*v, _mm_madd_epi16(xa, xb));
                    }
                }
                wi += 32;
            }
        }

        let mut vsum = [vzero; MR];
        for (sum, v) in vsum.iter_mut().zip(&vacc) {
            let v02 = _mm_add_epi32(_mm_unpacklo_epi32(v[0], v[2]), _mm_unpackhi_epi32(v[0], v[2]));
            let v13 = _mm_add_epi32(_mm_unpacklo_epi32(v[1], v[3]), _mm_unpackhi_epi32(v[1], v[3]));
            *sum = _mm_add_epi32(_mm_unpacklo_epi32(v02, v13), _mm_unpackhi_epi32(v02, v13));
        }

        let out = requantize_x4::<MR>(&vsum, params);
        store_tile(c, &out, mr, (nc - n_start).min(4), tile * cn_stride, cm_stride);
    }
}

#[target_feature(enable = "sse4.1")]
unsafe fn igemm_4xc8_sse41<const MR: usize>(
    mr: usize,
    nc: usize,
    kc: usize,
    ks: usize,
    a: &IndirectA<'_>,
    w: &[u8],
    c: &mut [u8],
    cm_stride: usize,
    cn_stride: usize,
    tile_size: usize,
    params: &Fp32SimdParams,
) {
    let kc_padded = round_up(kc, 8);
    let vzero = _mm_setzero_si128();
    let vb_zero_point = _mm_set1_epi16(params.kernel_zero_point);

    for (tile, n_start) in (0..nc).step_by(4).enumerate() {
        let wt = &w[tile * tile_size..(tile + 1) * tile_size];
        let mut vacc = [[vzero; 4]; MR];
        for row in vacc.iter_mut() {
            for (j, v) in row.iter_mut().enumerate() {
                *v = _mm_cvtsi32_si128(packed_bias(wt, j));
            }
        }

        let mut wi = 16;
        for p in 0..ks {
            let mut rows = [&[][..]; MR];
            for (i, row) in rows.iter_mut().enumerate() {
                *row = a.row(p * MR + i);
            }
            for k in (0..kc_padded).step_by(8) {
                let mut vxa = [vzero; MR];
                for (v, row) in vxa.iter_mut().zip(&rows) {
                    let block = load_padded::<8>(row, k, kc);
                    *v = _mm_cvtepu8_epi16(_mm_loadl_epi64(block.as_ptr().cast()));
                }

                let vb01 = _mm_loadu_si128(wt[wi..wi + 16].as_ptr().cast());
                let vb23 = _mm_loadu_si128(wt[wi + 16..wi + 32].as_ptr().cast());
                let vxb = [
                    _mm_sub_epi16(_mm_cvtepu8_epi16(vb01), vb_zero_point),
                    _mm_sub_epi16(_mm_unpackhi_epi8(vb01, vzero), vb_zero_point),
                    _mm_sub_epi16(_mm_cvtepu8_epi16(vb23), vb_zero_point),
                    _mm_sub_epi16(_mm_unpackhi_epi8(vb23, vzero), vb_zero_point),
                ];
                for (acc, &xa) in vacc.iter_mut().zip(&vxa) {
                    for (v, &xb) in acc.iter_mut().zip(&vxb) {
                        *v = _mm_add_epi32(*v, _mm_madd_epi16(xa, xb));
                    }
                }
                wi += 32;
            }
        }

        let mut vsum = [vzero; MR];
        for (sum, v) in vsum.iter_mut().zip(&vacc) {
            *sum = _mm_hadd_epi32(_mm_hadd_epi32(v[0], v[1]), _mm_hadd_epi32(v[2], v[3]));
        }

        let out = requantize_x4::<MR>(&vsum, params);
        store_tile(c, &out, mr, (nc - n_start).min(4), tile * cn_stride, cm_stride);
    }
}

// ── AVX2: 8 columns ──────────────────────────────────────────────────────────

#[target_feature(enable = "avx2")]
unsafe fn igemm_8xc8_avx2<const MR: usize>(
    mr: usize,
    nc: usize,
    kc: usize,
    ks: usize,
    a: &IndirectA<'_>,
    w: &[u8],
    c: &mut [u8],
    cm_stride: usize,
    cn_stride: usize,
    tile_size: usize,
    params: &Fp32SimdParams,
) {
    let kc_padded = round_up(kc, 8);
    let vzero = _mm256_setzero_si256();
    let vb_zero_point = _mm256_set1_epi16(params.kernel_zero_point);

    for (tile, n_start) in (0..nc).step_by(8).enumerate() {
        let wt = &w[tile * tile_size..(tile + 1) * tile_size];
        // Column pair q: low lane holds column 2q, high lane column 2q + 1.
        let mut vacc = [[vzero; 4]; MR];
        for row in vacc.iter_mut() {
            for (q, v) in row.iter_mut().enumerate() {
                let lo = _mm_cvtsi32_si128(packed_bias(wt, 2 * q));
                let hi = _mm_cvtsi32_si128(packed_bias(wt, 2 * q + 1));
                *v = _mm256_inserti128_si256::<1>(_mm256_castsi128_si256(lo), hi);
            }
        }

        let mut wi = 32;
        for p in 0..ks {
            let mut rows = [&[][..]; MR];
            for (i, row) in rows.iter_mut().enumerate() {
                *row = a.row(p * MR + i);
            }
            for k in (0..kc_padded).step_by(8) {
                let mut vxa = [vzero; MR];
                for (v, row) in vxa.iter_mut().zip(&rows) {
                    let block = load_padded::<8>(row, k, kc);
                    let va = _mm_broadcastq_epi64(_mm_loadl_epi64(block.as_ptr().cast()));
                    *v = _mm256_cvtepu8_epi16(va);
                }
                for q in 0..4 {
                    let vb = _mm_loadu_si128(wt[wi + 16 * q..wi + 16 * (q + 1)].as_ptr().cast());
                    let vxb = _mm256_sub_epi16(_mm256_cvtepu8_epi16(vb), vb_zero_point);
                    for (acc, &xa) in vacc.iter_mut().zip(&vxa) {
                        acc[q] = _mm256_add_epi32(acc[q], _mm256_madd_epi16(xa, vxb));
                    }
                }
                wi += 64;
            }
        }

        let vpermute = _mm256_set_epi32(7, 3, 6, 2, 5, 1, 4, 0);
        let vscale = _mm256_set1_ps(params.scale);
        let vmax = _mm256_set1_ps(params.output_max_less_zero_point);
        let mut scaled = [vzero; MR];
        for (dst, v) in scaled.iter_mut().zip(&vacc) {
            let v0213 = _mm256_hadd_epi32(v[0], v[1]);
            let v4657 = _mm256_hadd_epi32(v[2], v[3]);
            let sum = _mm256_permutevar8x32_epi32(_mm256_hadd_epi32(v0213, v4657), vpermute);
            let f = _mm256_min_ps(_mm256_mul_ps(_mm256_cvtepi32_ps(sum), vscale), vmax);
            *dst = _mm256_cvtps_epi32(f);
        }

        let vzero_point = _mm256_set1_epi16(params.output_zero_point);
        let vmin = _mm_set1_epi8(params.output_min as i8);
        let mut out = [[0u8; 8]; MR];
        let mut bytes = [0u8; 16];
        for i in (0..MR).step_by(2) {
            let hi = if i + 1 < MR { scaled[i + 1] } else { scaled[i] };
            let v01 = _mm256_adds_epi16(_mm256_packs_epi32(scaled[i], hi), vzero_point);
            let v01 = _mm256_permute4x64_epi64::<0xD8>(v01);
            let vout = _mm_packus_epi16(_mm256_castsi256_si128(v01), _mm256_extracti128_si256::<1>(v01));
            _mm_storeu_si128(bytes.as_mut_ptr().cast(), _mm_max_epu8(vout, vmin));
            out[i].copy_from_slice(&bytes[..8]);
            if i + 1 < MR {
                out[i + 1].copy_from_slice(&bytes[8..]);
            }
        }
        store_tile(c, &out, mr, (nc - n_start).min(8), tile * cn_stride, cm_stride);
    }
}

// ── Entry points ─────────────────────────────────────────────────────────────

macro_rules! x86_ukernel {
    ($name:ident, $body:ident, $feature:tt, $isa:expr, $mr:literal, $nr:literal) => {
        pub fn $name(
            mr: usize,
            nc: usize,
            kc: usize,
            ks: usize,
            a: &IndirectA<'_>,
            w: &[u8],
            c: &mut [u8],
            cm_stride: usize,
            cn_stride: usize,
            params: &Qu8ConvMinmaxParams,
        ) -> Result<()> {
            let params = params.get::<Fp32SimdParams>()?;
            let shape = TileShape::new($mr, $nr, 8, 1);
            shape.check(mr, nc, kc, ks, a, w, c, cm_stride, cn_stride)?;
            if !is_x86_feature_detected!($feature) {
                return Err(unsupported($isa));
            }

            // Safety: the feature was detected above and every buffer was
            // bounds-checked by `shape.check`.
            unsafe {
                $body::<$mr>(
                    mr,
                    nc,
                    kc,
                    ks,
                    a,
                    w,
                    c,
                    cm_stride,
                    cn_stride,
                    shape.tile_size(ks, kc),
                    params,
                )
            };
            Ok(())
        }
    };
}

x86_ukernel!(qu8_igemm_minmax_fp32_ukernel_1x4c8_sse2, igemm_4xc8_sse2, "sse2", Isa::Sse2, 1, 4);
x86_ukernel!(qu8_igemm_minmax_fp32_ukernel_2x4c8_sse2, igemm_4xc8_sse2, "sse2", Isa::Sse2, 2, 4);
x86_ukernel!(qu8_igemm_minmax_fp32_ukernel_3x4c8_sse41, igemm_4xc8_sse41, "sse4.1", Isa::Sse41, 3, 4);
x86_ukernel!(qu8_igemm_minmax_fp32_ukernel_2x8c8_avx2, igemm_8xc8_avx2, "avx2", Isa::Avx2, 2, 8);
