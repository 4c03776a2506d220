//! Portable scalar kernels.
//!
//! One generic body covers every tile shape and packing layout; the output
//! stage is chosen by the params family the kernel is instantiated with.

use super::{Qu8IgemmUkernelFn, TileShape, store_tile};
use crate::indirection::IndirectA;
use crate::packing::packed_bias;
use crate::params::{
    Fp32FmagicParams, Fp32ImagicParams, Fp32LrintfParams, ParamsFamily, Qu8ConvMinmaxParams,
    RndnuParams,
};
use igemm_common::{Result, round_up};

/// Converts one `i32` accumulator into an output byte.
pub(crate) trait ScalarOutputStage: ParamsFamily {
    fn kernel_zero_point(&self) -> i32;
    fn requantize(&self, acc: i32) -> u8;
}

impl ScalarOutputStage for Fp32FmagicParams {
    fn kernel_zero_point(&self) -> i32 {
        self.kernel_zero_point
    }

    #[inline]
    fn requantize(&self, acc: i32) -> u8 {
        let scaled = (acc as f32 * self.scale)
            .max(self.output_min_less_zero_point)
            .min(self.output_max_less_zero_point)
            + self.magic_bias;
        (scaled.to_bits() as i32 - self.magic_bias_less_output_zero_point) as u8
    }
}

impl ScalarOutputStage for Fp32ImagicParams {
    fn kernel_zero_point(&self) -> i32 {
        self.kernel_zero_point
    }

    #[inline]
    fn requantize(&self, acc: i32) -> u8 {
        let biased = (acc as f32 * self.scale + self.magic_bias).to_bits() as i32;
        (biased.max(self.magic_min).min(self.magic_max) - self.magic_bias_less_zero_point) as u8
    }
}

impl ScalarOutputStage for Fp32LrintfParams {
    fn kernel_zero_point(&self) -> i32 {
        self.kernel_zero_point
    }

    #[inline]
    fn requantize(&self, acc: i32) -> u8 {
        let scaled = (acc as f32 * self.scale)
            .max(self.output_min_less_zero_point)
            .min(self.output_max_less_zero_point);
        (scaled.round_ties_even() as i32 + self.output_zero_point) as u8
    }
}

impl ScalarOutputStage for RndnuParams {
    fn kernel_zero_point(&self) -> i32 {
        self.kernel_zero_point
    }

    #[inline]
    fn requantize(&self, acc: i32) -> u8 {
        let out = ((i64::from(acc) * i64::from(self.multiplier) + self.rounding) >> self.shift) as i32;
        (out.max(self.output_min_less_zero_point).min(self.output_max_less_zero_point)
            + self.output_zero_point) as u8
    }
}

#[allow(clippy::too_many_arguments)]
fn igemm_scalar<const MR: usize, const NR: usize, const KR: usize, const SR: usize, P>(
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
) -> Result<()>
where
    P: ScalarOutputStage,
{
    let stage = params.get::<P>()?;
    let shape = TileShape::new(MR, NR, KR, SR);
    shape.check(mr, nc, kc, ks, a, w, c, cm_stride, cn_stride)?;

    let kernel_zero_point = stage.kernel_zero_point();
    let skr = KR * SR;
    let kc_padded = round_up(kc, skr);
    let tile_size = shape.tile_size(ks, kc);

    for (tile, n_start) in (0..nc).step_by(NR).enumerate() {
        let wt = &w[tile * tile_size..(tile + 1) * tile_size];
        let mut acc = [[0i32; NR]; MR];
        for row in acc.iter_mut() {
            for (j, v) in row.iter_mut().enumerate() {
                *v = packed_bias(wt, j);
            }
        }

        let mut wi = NR * size_of::<i32>();
        for p in 0..ks {
            let rows: [&[u8]; MR] = std::array::from_fn(|i| a.row(p * MR + i));
            for kb in (0..kc_padded).step_by(skr) {
                for s in 0..SR {
                    for j in 0..NR {
                        for t in 0..KR {
                            let k = kb + (s * KR + t + j * KR) % skr;
                            let vb = i32::from(wt[wi]) - kernel_zero_point;
                            wi += 1;
                            if k < kc {
                                for (acc_row, a_row) in acc.iter_mut().zip(&rows) {
                                    acc_row[j] = acc_row[j].wrapping_add(i32::from(a_row[k]) * vb);
                                }
                            }
                        }
                    }
                }
            }
        }

        let out: [[u8; NR]; MR] =
            std::array::from_fn(|i| std::array::from_fn(|j| stage.requantize(acc[i][j])));
        store_tile(c, &out, mr, NR.min(nc - n_start), tile * cn_stride, cm_stride);
    }
    Ok(())
}

macro_rules! scalar_ukernels {
    ($($name:ident => ($mr:literal, $nr:literal, $kr:literal, $sr:literal, $stage:ty);)*) => {
        $(
            #[allow(clippy::too_many_arguments)]
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
                igemm_scalar::<$mr, $nr, $kr, $sr, $stage>(
                    mr, nc, kc, ks, a, w, c, cm_stride, cn_stride, params,
                )
            }
        )*
    };
}

scalar_ukernels! {
    qu8_igemm_minmax_fp32_ukernel_1x2_scalar_fmagic => (1, 2, 1, 1, Fp32FmagicParams);
    qu8_igemm_minmax_fp32_ukernel_1x4_scalar_fmagic => (1, 4, 1, 1, Fp32FmagicParams);
    qu8_igemm_minmax_fp32_ukernel_2x2_scalar_fmagic => (2, 2, 1, 1, Fp32FmagicParams);
    qu8_igemm_minmax_fp32_ukernel_2x4_scalar_fmagic => (2, 4, 1, 1, Fp32FmagicParams);
    qu8_igemm_minmax_fp32_ukernel_3x2_scalar_fmagic => (3, 2, 1, 1, Fp32FmagicParams);
    qu8_igemm_minmax_fp32_ukernel_3x4_scalar_fmagic => (3, 4, 1, 1, Fp32FmagicParams);
    qu8_igemm_minmax_fp32_ukernel_4x2_scalar_fmagic => (4, 2, 1, 1, Fp32FmagicParams);
    qu8_igemm_minmax_fp32_ukernel_4x4_scalar_fmagic => (4, 4, 1, 1, Fp32FmagicParams);

    qu8_igemm_minmax_fp32_ukernel_1x2_scalar_imagic => (1, 2, 1, 1, Fp32ImagicParams);
    qu8_igemm_minmax_fp32_ukernel_1x4_scalar_imagic => (1, 4, 1, 1, Fp32ImagicParams);
    qu8_igemm_minmax_fp32_ukernel_2x2_scalar_imagic => (2, 2, 1, 1, Fp32ImagicParams);
    qu8_igemm_minmax_fp32_ukernel_2x4_scalar_imagic => (2, 4, 1, 1, Fp32ImagicParams);
    qu8_igemm_minmax_fp32_ukernel_3x2_scalar_imagic => (3, 2, 1, 1, Fp32ImagicParams);
    qu8_igemm_minmax_fp32_ukernel_3x4_scalar_imagic => (3, 4, 1, 1, Fp32ImagicParams);
    qu8_igemm_minmax_fp32_ukernel_4x2_scalar_imagic => (4, 2, 1, 1, Fp32ImagicParams);
    qu8_igemm_minmax_fp32_ukernel_4x4_scalar_imagic => (4, 4, 1, 1, Fp32ImagicParams);

    qu8_igemm_minmax_fp32_ukernel_1x2_scalar_lrintf => (1, 2, 1, 1, Fp32LrintfParams);
    qu8_igemm_minmax_fp32_ukernel_1x4_scalar_lrintf => (1, 4, 1, 1, Fp32LrintfParams);
    qu8_igemm_minmax_fp32_ukernel_2x2_scalar_lrintf => (2, 2, 1, 1, Fp32LrintfParams);
    qu8_igemm_minmax_fp32_ukernel_2x4_scalar_lrintf => (2, 4, 1, 1, Fp32LrintfParams);
    qu8_igemm_minmax_fp32_ukernel_3x2_scalar_lrintf => (3, 2, 1, 1, Fp32LrintfParams);
    qu8_igemm_minmax_fp32_ukernel_3x4_scalar_lrintf => (3, 4, 1, 1, Fp32LrintfParams);
    qu8_igemm_minmax_fp32_ukernel_4x2_scalar_lrintf => (4, 2, 1, 1, Fp32LrintfParams);
    qu8_igemm_minmax_fp32_ukernel_4x4_scalar_lrintf => (4, 4, 1, 1, Fp32LrintfParams);

    qu8_igemm_minmax_rndnu_ukernel_1x2_scalar => (1, 2, 1, 1, RndnuParams);
    qu8_igemm_minmax_rndnu_ukernel_2x4_scalar => (2, 4, 1, 1, RndnuParams);
    qu8_igemm_minmax_rndnu_ukernel_4x4_scalar => (4, 4, 1, 1, RndnuParams);

    qu8_igemm_minmax_fp32_ukernel_1x4c2_scalar_lrintf => (1, 4, 2, 1, Fp32LrintfParams);
    qu8_igemm_minmax_fp32_ukernel_2x4c8_scalar_lrintf => (2, 4, 8, 1, Fp32LrintfParams);
    qu8_igemm_minmax_fp32_ukernel_3x4c2s4_scalar_lrintf => (3, 4, 2, 4, Fp32LrintfParams);
    qu8_igemm_minmax_fp32_ukernel_4x4c2s4_scalar_lrintf => (4, 4, 2, 4, Fp32LrintfParams);
}

// Compile-time check that the generated kernels coerce to the shared signature.
const _: Qu8IgemmUkernelFn = qu8_igemm_minmax_fp32_ukernel_1x2_scalar_fmagic;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indirection::IndirectRow;
    use crate::packing::{PackingParams, pack_qu8_conv_goki_w, packed_weights_size};
    use crate::params::{
        Qu8QuantizationArgs, init_qu8_conv_minmax_fp32_scalar_fmagic_params,
        init_qu8_conv_minmax_fp32_scalar_lrintf_params, init_qu8_conv_minmax_rndnu_scalar_params,
    };
    use igemm_common::{IgemmError, KernelError};

    fn quantization(scale: f32) -> Qu8QuantizationArgs {
        Qu8QuantizationArgs {
            kernel_zero_point: 0,
            scale,
            output_zero_point: 0,
            output_min: 0,
            output_max: 255,
        }
    }

    #[test]
    fn two_by_two_identity_weights() {
        // A = [[3, 5]], W = identity, bias = [1, 2], scale 1 -> [4, 7].
        let input = [3u8, 5];
        let zero = [0u8; 2];
        let rows = [IndirectRow::Input(0)];
        let a = IndirectA::new(&rows, &input, &zero, 0);

        let weights = [1u8, 0, 0, 1];
        let mut packed = vec![0u8; packed_weights_size(2, 1, 2, 2, 1, 1)];
        let zp = PackingParams { input_zero_point: 0, kernel_zero_point: 0 };
        pack_qu8_conv_goki_w(2, 1, 2, 2, 1, 1, &weights, Some(&[1, 2]), &mut packed, &zp).unwrap();

        let params = init_qu8_conv_minmax_fp32_scalar_lrintf_params(&quantization(0.999_99)).unwrap();
        let mut c = [0u8; 2];
        qu8_igemm_minmax_fp32_ukernel_1x2_scalar_lrintf(1, 2, 2, 1, &a, &packed, &mut c, 2, 2, &params)
            .unwrap();
        assert_eq!(c, [4, 7]);
    }

    #[test]
    fn output_stages_agree_on_ties() {
        let args = Qu8QuantizationArgs {
            kernel_zero_point: 0,
            scale: 0.5,
            output_zero_point: 128,
            output_min: 0,
            output_max: 255,
        };
        let Qu8ConvMinmaxParams::Fp32ScalarFmagic(f) =
            init_qu8_conv_minmax_fp32_scalar_fmagic_params(&args).unwrap()
        else {
            panic!("wrong family")
        };
        let Qu8ConvMinmaxParams::Fp32ScalarLrintf(l) =
            init_qu8_conv_minmax_fp32_scalar_lrintf_params(&args).unwrap()
        else {
            panic!("wrong family")
        };
        for acc in -600..600 {
            assert_eq!(f.requantize(acc), l.requantize(acc), "acc {acc}");
        }
        let Qu8ConvMinmaxParams::RndnuScalar(r) =
            init_qu8_conv_minmax_rndnu_scalar_params(&args).unwrap()
        else {
            panic!("wrong family")
        };
        assert_eq!(r.requantize(5), 131);
        assert_eq!(l.requantize(5), 130);
    }

    #[test]
    fn wrong_params_family_is_rejected() {
        let input = [0u8; 1];
        let rows = [IndirectRow::Input(0)];
        let a = IndirectA::new(&rows, &input, &input, 0);
        let packed = vec![0u8; packed_weights_size(2, 1, 1, 2, 1, 1)];
        let params = init_qu8_conv_minmax_fp32_scalar_lrintf_params(&quantization(0.5)).unwrap();
        let mut c = [0u8; 2];
        let err = qu8_igemm_minmax_fp32_ukernel_1x2_scalar_fmagic(1, 2, 1, 1, &a, &packed, &mut c, 2, 2, &params)
            .unwrap_err();
        assert!(matches!(err, IgemmError::Kernel(KernelError::ParamsMismatch { .. })));
    }

    #[test]
    fn short_output_is_rejected() {
        let input = [0u8; 4];
        let rows = [IndirectRow::Input(0), IndirectRow::Input(1)];
        let a = IndirectA::new(&rows, &input, &input, 0);
        let packed = vec![0u8; packed_weights_size(2, 1, 1, 2, 1, 1)];
        let params = init_qu8_conv_minmax_fp32_scalar_lrintf_params(&quantization(0.5)).unwrap();
        let mut c = [0u8; 3];
        let err = qu8_igemm_minmax_fp32_ukernel_2x2_scalar_lrintf(2, 2, 1, 1, &a, &packed, &mut c, 2, 2, &params)
            .unwrap_err();
        assert!(matches!(
            err,
            IgemmError::Kernel(KernelError::BufferTooSmall { what: "output", required: 4, actual: 3 })
        ));
    }
}
