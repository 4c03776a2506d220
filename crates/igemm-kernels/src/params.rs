//! Requantization parameters consumed by the QU8 IGEMM microkernels.
//!
//! Every kernel family reads its own parameter payload. The payload is
//! derived once from [`Qu8QuantizationArgs`] by the family's init function
//! and handed to the kernel by reference; a kernel given a payload of another
//! family fails with [`KernelError::ParamsMismatch`] instead of guessing.
//!
//! The activation zero point is deliberately absent: it is folded into the
//! packed bias by [`crate::packing::pack_qu8_conv_goki_w`].

use igemm_common::{KernelError, QuantizationError, Result};

/// `12582912.0f32`, i.e. `1.5 * 2^23`. Adding it to a float with magnitude
/// below `2^22` leaves the rounded integer in the low mantissa bits.
pub const MAGIC_BIAS: f32 = 12_582_912.0;

/// Bit pattern of [`MAGIC_BIAS`].
pub const MAGIC_BIAS_BITS: i32 = 0x4B40_0000;

/// Inputs shared by every init function.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Qu8QuantizationArgs {
    pub kernel_zero_point: u8,
    pub scale: f32,
    pub output_zero_point: u8,
    pub output_min: u8,
    pub output_max: u8,
}

/// Float multiply, clamp as float, round with the magic bias.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fp32FmagicParams {
    pub kernel_zero_point: i32,
    pub scale: f32,
    pub output_min_less_zero_point: f32,
    pub output_max_less_zero_point: f32,
    pub magic_bias: f32,
    pub magic_bias_less_output_zero_point: i32,
}

/// Float multiply, round with the magic bias, clamp on the bit pattern.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fp32ImagicParams {
    pub kernel_zero_point: i32,
    pub scale: f32,
    pub magic_bias: f32,
    pub magic_min: i32,
    pub magic_max: i32,
    pub magic_bias_less_zero_point: i32,
}

/// Float multiply, clamp as float, round half to even.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fp32LrintfParams {
    pub kernel_zero_point: i32,
    pub scale: f32,
    pub output_min_less_zero_point: f32,
    pub output_max_less_zero_point: f32,
    pub output_zero_point: i32,
}

/// Lane-friendly layout for the SSE/AVX/NEON/WASM kernels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fp32SimdParams {
    pub kernel_zero_point: i16,
    pub scale: f32,
    pub output_max_less_zero_point: f32,
    pub output_zero_point: i16,
    pub output_min: u8,
    pub output_max: u8,
}

/// Fixed-point multiply with round-half-up ("rndnu").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RndnuParams {
    pub kernel_zero_point: i32,
    pub multiplier: i32,
    pub rounding: i64,
    pub shift: u32,
    pub output_min_less_zero_point: i32,
    pub output_max_less_zero_point: i32,
    pub output_zero_point: i32,
}

/// Parameter payload for one kernel family.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Qu8ConvMinmaxParams {
    Fp32ScalarFmagic(Fp32FmagicParams),
    Fp32ScalarImagic(Fp32ImagicParams),
    Fp32ScalarLrintf(Fp32LrintfParams),
    Fp32Simd(Fp32SimdParams),
    RndnuScalar(RndnuParams),
}

impl Qu8ConvMinmaxParams {
    /// Family tag used in mismatch errors and logs.
    pub fn family(&self) -> &'static str {
        match self {
            Self::Fp32ScalarFmagic(_) => Fp32FmagicParams::FAMILY,
            Self::Fp32ScalarImagic(_) => Fp32ImagicParams::FAMILY,
            Self::Fp32ScalarLrintf(_) => Fp32LrintfParams::FAMILY,
            Self::Fp32Simd(_) => Fp32SimdParams::FAMILY,
            Self::RndnuScalar(_) => RndnuParams::FAMILY,
        }
    }

    /// Borrow the payload of family `P`, or report which family was given.
    pub fn get<P: ParamsFamily>(&self) -> Result<&P> {
        P::extract(self).ok_or_else(|| {
            KernelError::ParamsMismatch { expected: P::FAMILY, found: self.family() }.into()
        })
    }
}

/// A concrete payload type that can be borrowed out of [`Qu8ConvMinmaxParams`].
pub trait ParamsFamily: Sized {
    const FAMILY: &'static str;

    fn extract(params: &Qu8ConvMinmaxParams) -> Option<&Self>;
}

macro_rules! params_family {
    ($ty:ty, $variant:ident, $family:literal) => {
        impl ParamsFamily for $ty {
            const FAMILY: &'static str = $family;

            fn extract(params: &Qu8ConvMinmaxParams) -> Option<&Self> {
                match params {
                    Qu8ConvMinmaxParams::$variant(p) => Some(p),
                    _ => None,
                }
            }
        }
    };
}

params_family!(Fp32FmagicParams, Fp32ScalarFmagic, "fp32_scalar_fmagic");
params_family!(Fp32ImagicParams, Fp32ScalarImagic, "fp32_scalar_imagic");
params_family!(Fp32LrintfParams, Fp32ScalarLrintf, "fp32_scalar_lrintf");
params_family!(Fp32SimdParams, Fp32Simd, "fp32_simd");
params_family!(RndnuParams, RndnuScalar, "rndnu_scalar");

/// Signature shared by every init function.
pub type Qu8InitParamsFn = fn(&Qu8QuantizationArgs) -> Result<Qu8ConvMinmaxParams>;

/// Smallest scale any family accepts (`2^-32`).
const MIN_SCALE: f32 = 1.0 / 4_294_967_296.0;
/// Exclusive upper bound for the fp32 families.
const MAX_FP32_SCALE: f32 = 256.0;

fn validate(args: &Qu8QuantizationArgs, max_scale: f32) -> Result<()> {
    if !args.scale.is_finite() || args.scale <= 0.0 {
        return Err(QuantizationError::InvalidScale { scale: args.scale }.into());
    }
    if args.scale < MIN_SCALE || args.scale >= max_scale {
        return Err(QuantizationError::ScaleOutOfRange {
            scale: args.scale,
            min: MIN_SCALE,
            max: max_scale,
        }
        .into());
    }
    if args.output_min > args.output_max {
        return Err(
            QuantizationError::InvalidRange { min: args.output_min, max: args.output_max }.into()
        );
    }
    Ok(())
}

fn min_less_zero_point(args: &Qu8QuantizationArgs) -> i32 {
    i32::from(args.output_min) - i32::from(args.output_zero_point)
}

fn max_less_zero_point(args: &Qu8QuantizationArgs) -> i32 {
    i32::from(args.output_max) - i32::from(args.output_zero_point)
}

pub fn init_qu8_conv_minmax_fp32_scalar_fmagic_params(
    args: &Qu8QuantizationArgs,
) -> Result<Qu8ConvMinmaxParams> {
    validate(args, MAX_FP32_SCALE)?;
    Ok(Qu8ConvMinmaxParams::Fp32ScalarFmagic(Fp32FmagicParams {
        kernel_zero_point: i32::from(args.kernel_zero_point),
        scale: args.scale,
        output_min_less_zero_point: min_less_zero_point(args) as f32,
        output_max_less_zero_point: max_less_zero_point(args) as f32,
        magic_bias: MAGIC_BIAS,
        magic_bias_less_output_zero_point: MAGIC_BIAS_BITS - i32::from(args.output_zero_point),
    }))
}

pub fn init_qu8_conv_minmax_fp32_scalar_imagic_params(
    args: &Qu8QuantizationArgs,
) -> Result<Qu8ConvMinmaxParams> {
    validate(args, MAX_FP32_SCALE)?;
    let magic_min = (MAGIC_BIAS + min_less_zero_point(args) as f32).to_bits() as i32;
    let magic_max = (MAGIC_BIAS + max_less_zero_point(args) as f32).to_bits() as i32;
    Ok(Qu8ConvMinmaxParams::Fp32ScalarImagic(Fp32ImagicParams {
        kernel_zero_point: i32::from(args.kernel_zero_point),
        scale: args.scale,
        magic_bias: MAGIC_BIAS,
        magic_min,
        magic_max,
        magic_bias_less_zero_point: MAGIC_BIAS_BITS - i32::from(args.output_zero_point),
    }))
}

pub fn init_qu8_conv_minmax_fp32_scalar_lrintf_params(
    args: &Qu8QuantizationArgs,
) -> Result<Qu8ConvMinmaxParams> {
    validate(args, MAX_FP32_SCALE)?;
    Ok(Qu8ConvMinmaxParams::Fp32ScalarLrintf(Fp32LrintfParams {
        kernel_zero_point: i32::from(args.kernel_zero_point),
        scale: args.scale,
        output_min_less_zero_point: min_less_zero_point(args) as f32,
        output_max_less_zero_point: max_less_zero_point(args) as f32,
        output_zero_point: i32::from(args.output_zero_point),
    }))
}

pub fn init_qu8_conv_minmax_fp32_simd_params(
    args: &Qu8QuantizationArgs,
) -> Result<Qu8ConvMinmaxParams> {
    validate(args, MAX_FP32_SCALE)?;
    Ok(Qu8ConvMinmaxParams::Fp32Simd(Fp32SimdParams {
        kernel_zero_point: i16::from(args.kernel_zero_point),
        scale: args.scale,
        output_max_less_zero_point: max_less_zero_point(args) as f32,
        output_zero_point: i16::from(args.output_zero_point),
        output_min: args.output_min,
        output_max: args.output_max,
    }))
}

/// Decompose `scale` into a 24-bit multiplier and a right shift.
///
/// The scale must lie in `[2^-32, 1)` so that the shift lands in `[24, 56)`.
pub fn init_qu8_conv_minmax_rndnu_scalar_params(
    args: &Qu8QuantizationArgs,
) -> Result<Qu8ConvMinmaxParams> {
    validate(args, 1.0)?;
    let (multiplier, shift) = rndnu_multiplier_and_shift(args.scale);
    Ok(Qu8ConvMinmaxParams::RndnuScalar(RndnuParams {
        kernel_zero_point: i32::from(args.kernel_zero_point),
        multiplier,
        rounding: 1i64 << (shift - 1),
        shift,
        output_min_less_zero_point: min_less_zero_point(args),
        output_max_less_zero_point: max_less_zero_point(args),
        output_zero_point: i32::from(args.output_zero_point),
    }))
}

/// Mantissa (with the implicit bit) and shift of a normal positive `scale`.
pub(crate) fn rndnu_multiplier_and_shift(scale: f32) -> (i32, u32) {
    let bits = scale.to_bits();
    let multiplier = ((bits & 0x007F_FFFF) | 0x0080_0000) as i32;
    let shift = (127 + 23) - (bits >> 23);
    (multiplier, shift)
}
