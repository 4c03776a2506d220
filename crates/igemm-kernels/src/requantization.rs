//! Reference requantizers used by the conformance oracle.
//!
//! These are the scalar definitions each kernel family must reproduce bit
//! for bit. The harness never mixes strategies: a variant's
//! [`Requantization`] selects the one reference its output stage matches.

use crate::params::{MAGIC_BIAS, MAGIC_BIAS_BITS, rndnu_multiplier_and_shift};

/// `(accumulator, scale, zero_point, min, max) -> output`.
pub type Qu8RequantizeFn = fn(i32, f32, u8, u8, u8) -> u8;

/// Rounding strategy implemented by a kernel's output stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Requantization {
    /// `lrintf(acc * scale)`; also covers the fmagic and imagic stages.
    Fp32,
    /// Fixed-point multiply, round half up.
    Rndnu,
}

impl Requantization {
    pub fn reference(self) -> Qu8RequantizeFn {
        match self {
            Requantization::Fp32 => requantize_qu8_fp32,
            Requantization::Rndnu => requantize_qu8_rndnu,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Requantization::Fp32 => "fp32",
            Requantization::Rndnu => "rndnu",
        }
    }
}

/// Float multiply, clamp, round half to even, add the zero point.
pub fn requantize_qu8_fp32(input: i32, scale: f32, zero_point: u8, min: u8, max: u8) -> u8 {
    debug_assert!(min <= max);
    let min_less_zero_point = (i32::from(min) - i32::from(zero_point)) as f32;
    let max_less_zero_point = (i32::from(max) - i32::from(zero_point)) as f32;

    let scaled = (input as f32 * scale).max(min_less_zero_point).min(max_less_zero_point);
    (scaled.round_ties_even() as i32 + i32::from(zero_point)) as u8
}

/// Same result as [`requantize_qu8_fp32`], rounded through the float
/// mantissa instead of a rounding instruction.
pub fn requantize_qu8_fp32_magic(input: i32, scale: f32, zero_point: u8, min: u8, max: u8) -> u8 {
    debug_assert!(min <= max);
    let min_less_zero_point = (i32::from(min) - i32::from(zero_point)) as f32;
    let max_less_zero_point = (i32::from(max) - i32::from(zero_point)) as f32;

    let scaled = (input as f32 * scale).max(min_less_zero_point).min(max_less_zero_point);
    let biased = (scaled + MAGIC_BIAS).to_bits() as i32;
    (biased - (MAGIC_BIAS_BITS - i32::from(zero_point))) as u8
}

/// Fixed-point requantization with round-half-up.
///
/// `scale` must lie in `[2^-32, 256)`.
pub fn requantize_qu8_rndnu(input: i32, scale: f32, zero_point: u8, min: u8, max: u8) -> u8 {
    debug_assert!(min <= max);
    debug_assert!(scale >= 1.0 / 4_294_967_296.0 && scale < 256.0);

    let (multiplier, shift) = rndnu_multiplier_and_shift(scale);
    debug_assert!((16..56).contains(&shift));
    let rounding = 1i64 << (shift - 1);

    let output = ((i64::from(input) * i64::from(multiplier) + rounding) >> shift) as i32;
    let output = output
        .max(i32::from(min) - i32::from(zero_point))
        .min(i32::from(max) - i32::from(zero_point));
    (output + i32::from(zero_point)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn fp32_rounds_half_to_even() {
        assert_eq!(requantize_qu8_fp32(5, 0.5, 0, 0, 255), 2);
        assert_eq!(requantize_qu8_fp32(7, 0.5, 0, 0, 255), 4);
        assert_eq!(requantize_qu8_fp32(-5, 0.5, 128, 0, 255), 126);
        assert_eq!(requantize_qu8_fp32(-7, 0.5, 128, 0, 255), 124);
    }

    #[test]
    fn rndnu_rounds_half_up() {
        assert_eq!(requantize_qu8_rndnu(5, 0.5, 0, 0, 255), 3);
        assert_eq!(requantize_qu8_rndnu(7, 0.5, 0, 0, 255), 4);
        assert_eq!(requantize_qu8_rndnu(-5, 0.5, 128, 0, 255), 126);
        assert_eq!(requantize_qu8_rndnu(-7, 0.5, 128, 0, 255), 125);
    }

    #[test]
    fn clamps_to_output_range() {
        for f in [requantize_qu8_fp32, requantize_qu8_fp32_magic, requantize_qu8_rndnu] {
            assert_eq!(f(1_000_000, 0.25, 100, 20, 200), 200);
            assert_eq!(f(-1_000_000, 0.25, 100, 20, 200), 20);
            assert_eq!(f(0, 0.25, 100, 20, 200), 100);
        }
    }

    #[test]
    fn strategy_maps_to_reference() {
        assert_eq!(Requantization::Fp32.reference()(9, 0.5, 0, 0, 255), 4);
        assert_eq!(Requantization::Rndnu.reference()(9, 0.5, 0, 0, 255), 5);
        assert_eq!(Requantization::Rndnu.name(), "rndnu");
    }

    proptest! {
        #[test]
        fn magic_bias_matches_lrintf(
            input in -5_000_000i32..5_000_000,
            scale in 1.0e-6f32..1.0,
            zero_point in any::<u8>(),
            bound_a in any::<u8>(),
            bound_b in any::<u8>(),
        ) {
            let (min, max) = if bound_a <= bound_b { (bound_a, bound_b) } else { (bound_b, bound_a) };
            prop_assert_eq!(
                requantize_qu8_fp32(input, scale, zero_point, min, max),
                requantize_qu8_fp32_magic(input, scale, zero_point, min, max)
            );
        }

        #[test]
        fn rndnu_stays_within_one_of_fp32(
            input in -1_000_000i32..1_000_000,
            scale in 1.0e-4f32..0.99,
            zero_point in any::<u8>(),
        ) {
            let exact = requantize_qu8_fp32(input, scale, zero_point, 0, 255);
            let fixed = requantize_qu8_rndnu(input, scale, zero_point, 0, 255);
            prop_assert!(exact.abs_diff(fixed) <= 1, "fp32 {} vs rndnu {}", exact, fixed);
        }
    }
}
