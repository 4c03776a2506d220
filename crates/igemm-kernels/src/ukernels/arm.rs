//! AArch64 NEON kernels for the `c8` packing layout.
//!
//! Widening multiply-accumulate (`vmlal_s16` / `vmlal_high_s16`) into one
//! partial-sum vector per column, pairwise reduction with `vpaddq_s32`, and
//! the ARMv8 round-to-nearest-even conversion (`vcvtnq_s32_f32`) followed by
//! saturating narrowing.
#![allow(unsafe_op_in_unsafe_fn)]
#![allow(clippy::too_many_arguments)]

use super::{TileShape, load_padded, store_tile};
use crate::indirection::IndirectA;
use crate::packing::packed_bias;
use crate::params::{Fp32SimdParams, Qu8ConvMinmaxParams};
use igemm_common::{Isa, KernelError, Result, round_up};
use std::arch::aarch64::*;

#[target_feature(enable = "neon")]
unsafe fn igemm_8xc8_neon<const MR: usize>(
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
    let vzero = vdupq_n_s32(0);
    let vb_zero_point = vdup_n_u8(params.kernel_zero_point as u8);
    let vscale = vdupq_n_f32(params.scale);
    let voutput_zero_point = vdupq_n_s16(params.output_zero_point);
    let voutput_min = vdup_n_u8(params.output_min);
    let voutput_max = vdup_n_u8(params.output_max);

    for (tile, n_start) in (0..nc).step_by(8).enumerate() {
        let wt = &w[tile * tile_size..(tile + 1) * tile_size];
        let mut vacc = [[vzero; 8]; MR];
        for row in vacc.iter_mut() {
            for (j, v) in row.iter_mut().enumerate() {
                *v = vsetq_lane_s32::<0>(packed_bias(wt, j), vzero);
            }
        }

        let mut wi = 32;
        for p in 0..ks {
            let mut rows = [&[][..]; MR];
            for (i, row) in rows.iter_mut().enumerate() {
                *row = a.row(p * MR + i);
            }
            for k in (0..kc_padded).step_by(8) {
                let mut vxa = [vdupq_n_s16(0); MR];
                for (v, row) in vxa.iter_mut().zip(&rows) {
                    let block = load_padded::<8>(row, k, kc);
                    *v = vreinterpretq_s16_u16(vmovl_u8(vld1_u8(block.as_ptr())));
                }
                for j in 0..8 {
                    let vb = vld1_u8(wt[wi + 8 * j..wi + 8 * (j + 1)].as_ptr());
                    let vxb = vreinterpretq_s16_u16(vsubl_u8(vb, vb_zero_point));
                    for (acc, &xa) in vacc.iter_mut().zip(&vxa) {
                        let sum = vmlal_s16(acc[j], vget_low_s16(xa), vget_low_s16(vxb));
                        acc[j] = vmlal_high_s16(sum, xa, vxb);
                    }
                }
                wi += 64;
            }
        }

        let mut out = [[0u8; 8]; MR];
        for (dst, v) in out.iter_mut().zip(&vacc) {
            let v01 = vpaddq_s32(v[0], v[1]);
            let v23 = vpaddq_s32(v[2], v[3]);
            let v45 = vpaddq_s32(v[4], v[5]);
            let v67 = vpaddq_s32(v[6], v[7]);
            let lo = vcvtnq_s32_f32(vmulq_f32(vcvtq_f32_s32(vpaddq_s32(v01, v23)), vscale));
            let hi = vcvtnq_s32_f32(vmulq_f32(vcvtq_f32_s32(vpaddq_s32(v45, v67)), vscale));

            let v16 = vqaddq_s16(vcombine_s16(vqmovn_s32(lo), vqmovn_s32(hi)), voutput_zero_point);
            let vout = vmin_u8(vmax_u8(vqmovun_s16(v16), voutput_min), voutput_max);
            vst1_u8(dst.as_mut_ptr(), vout);
        }
        store_tile(c, &out, mr, (nc - n_start).min(8), tile * cn_stride, cm_stride);
    }
}

macro_rules! neon_ukernel {
    ($name:ident, $mr:literal) => {
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
            let shape = TileShape::new($mr, 8, 8, 1);
            shape.check(mr, nc, kc, ks, a, w, c, cm_stride, cn_stride)?;
            if !std::arch::is_aarch64_feature_detected!("neon") {
                return Err(KernelError::UnsupportedHardware {
                    required: Isa::NeonV8,
                    available: "none".to_string(),
                }
                .into());
            }

            // Safety: NEON was detected above and every buffer was
            // bounds-checked by `shape.check`.
            unsafe {
                igemm_8xc8_neon::<$mr>(
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

neon_ukernel!(qu8_igemm_minmax_fp32_ukernel_1x8c8_neonv8, 1);
neon_ukernel!(qu8_igemm_minmax_fp32_ukernel_2x8c8_neonv8, 2);
