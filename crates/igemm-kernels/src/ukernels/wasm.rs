//! WebAssembly SIMD128 kernel for the `c2s4` packing layout.
//!
//! The activation vector is rotated by one 32-bit lane between the four
//! `i32x4_dot_i16x8` steps of each 8-wide block, matching the shuffled
//! order [`crate::packing::pack_qu8_conv_goki_w`] writes for `sr = 4`.
#![allow(unsafe_op_in_unsafe_fn)]
#![allow(clippy::too_many_arguments)]

use super::{TileShape, load_padded, store_tile};
use crate::indirection::IndirectA;
use crate::packing::packed_bias;
use crate::params::{Fp32SimdParams, MAGIC_BIAS, MAGIC_BIAS_BITS, Qu8ConvMinmaxParams};
use igemm_common::{Result, round_up};
use std::arch::wasm32::*;

#[target_feature(enable = "simd128")]
unsafe fn igemm_4xc2s4_wasm<const MR: usize>(
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
    let zero_point = i32::from(params.output_zero_point);
    let vb_zero_point = i16x8_splat(params.kernel_zero_point);
    let vscale = f32x4_splat(params.scale);
    let vmagic_bias = f32x4_splat(MAGIC_BIAS);
    let vmagic_min = i32x4_splat((MAGIC_BIAS + (i32::from(params.output_min) - zero_point) as f32).to_bits() as i32);
    let vmagic_bias_less_zero_point = i32x4_splat(MAGIC_BIAS_BITS - zero_point);
    let voutput_max = u8x16_splat(params.output_max);

    for (tile, n_start) in (0..nc).step_by(4).enumerate() {
        let wt = &w[tile * tile_size..(tile + 1) * tile_size];
        let vbias = i32x4(packed_bias(wt, 0), packed_bias(wt, 1), packed_bias(wt, 2), packed_bias(wt, 3));
        let mut vacc = [vbias; MR];

        let mut wi = 16;
        for p in 0..ks {
            let mut rows = [&[][..]; MR];
            for (i, row) in rows.iter_mut().enumerate() {
                *row = a.row(p * MR + i);
            }
            for k in (0..kc_padded).step_by(8) {
                let vb01 = v128_load(wt[wi..wi + 16].as_ptr() as *const v128);
                let vb23 = v128_load(wt[wi + 16..wi + 32].as_ptr() as *const v128);
                let vxb = [
                    i16x8_sub(u16x8_extend_low_u8x16(vb01), vb_zero_point),
                    i16x8_sub(u16x8_extend_high_u8x16(vb01), vb_zero_point),
                    i16x8_sub(u16x8_extend_low_u8x16(vb23), vb_zero_point),
                    i16x8_sub(u16x8_extend_high_u8x16(vb23), vb_zero_point),
                ];
                for (acc, row) in vacc.iter_mut().zip(&rows) {
                    let block = load_padded::<8>(row, k, kc);
                    let mut vxa = u16x8_load_extend_u8x8(block.as_ptr());
                    for (step, &xb) in vxb.iter().enumerate() {
                        if step != 0 {
                            vxa = i32x4_shuffle::<1, 2, 3, 4>(vxa, vxa);
                        }
                        *acc = i32x4_add(*acc, i32x4_dot_i16x8(vxa, xb));
                    }
                }
                wi += 32;
            }
        }

        let mut out = [[0u8; 4]; MR];
        for (dst, &acc) in out.iter_mut().zip(&vacc) {
            let vfpacc = f32x4_add(f32x4_mul(f32x4_convert_i32x4(acc), vscale), vmagic_bias);
            let vacc = i32x4_sub(i32x4_max(vfpacc, vmagic_min), vmagic_bias_less_zero_point);
            let v16 = i16x8_narrow_i32x4(vacc, vacc);
            let vout = u8x16_min(u8x16_narrow_i16x8(v16, v16), voutput_max);
            *dst = u32x4_extract_lane::<0>(vout).to_le_bytes();
        }
        store_tile(c, &out, mr, (nc - n_start).min(4), tile * cn_stride, cm_stride);
    }
}

pub fn qu8_igemm_minmax_fp32_ukernel_3x4c2s4_wasmsimd(
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
    let shape = TileShape::new(3, 4, 2, 4);
    shape.check(mr, nc, kc, ks, a, w, c, cm_stride, cn_stride)?;

    // Safety: simd128 is enabled for the whole build and every buffer was
    // bounds-checked by `shape.check`.
    unsafe {
        igemm_4xc2s4_wasm::<3>(mr, nc, kc, ks, a, w, c, cm_stride, cn_stride, shape.tile_size(ks, kc), params)
    };
    Ok(())
}
