//! Weight and bias packing for the IGEMM microkernels.
//!
//! Layout per tile of `nr` output channels:
//!
//! ```text
//! [ nr x i32 bias ][ tap 0: kc_padded/kr steps x nr x kr bytes ] ... [ tap ks-1 ]
//! ```
//!
//! `kc_padded = round_up(kc, kr * sr)`. Inside a block of `kr * sr`
//! reduction positions, step `s` stores for column `j` the `kr`-group that
//! starts at `((s + j) * kr) % (kr * sr)`, so kernels with `sr > 1` can
//! rotate the activation vector instead of shuffling weights.

use igemm_common::{KernelError, Result, divide_round_up, round_down, round_up};

/// Zero points folded into the packed bias.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackingParams {
    pub input_zero_point: u8,
    pub kernel_zero_point: u8,
}

/// Bytes of one packed `nr`-column tile.
pub fn packed_tile_size(ks: usize, kc: usize, nr: usize, kr: usize, sr: usize) -> usize {
    nr * (size_of::<i32>() + ks * round_up(kc, kr * sr))
}

/// Exact buffer size [`pack_qu8_conv_goki_w`] writes.
pub fn packed_weights_size(nc: usize, ks: usize, kc: usize, nr: usize, kr: usize, sr: usize) -> usize {
    divide_round_up(nc, nr) * packed_tile_size(ks, kc, nr, kr, sr)
}

/// Pack GOKI weights (`[nc][ks][kc]`) and an optional bias.
///
/// Each bias slot receives `bias[j] + ks * kc * izp * kzp - izp * sum(w[j])`,
/// which turns `sum((a - izp) * (w - kzp))` into `sum(a * (w - kzp))` plus the
/// slot. Padding positions and padding columns hold the kernel zero point.
///
/// The folding is modular: the slot may wrap as long as the kernel's final
/// accumulator fits in `i32`, so kernels accumulate with wrapping adds too.
#[allow(clippy::too_many_arguments)]
pub fn pack_qu8_conv_goki_w(
    nc: usize,
    ks: usize,
    kc: usize,
    nr: usize,
    kr: usize,
    sr: usize,
    weights: &[u8],
    bias: Option<&[i32]>,
    packed: &mut [u8],
    params: &PackingParams,
) -> Result<()> {
    if nr == 0 || kr == 0 || sr == 0 {
        return Err(KernelError::InvalidGeometry {
            reason: format!("packing tile must be non-empty, got nr={nr} kr={kr} sr={sr}"),
        }
        .into());
    }
    check_len("weights", nc * ks * kc, weights.len())?;
    if let Some(bias) = bias {
        check_len("bias", nc, bias.len())?;
    }
    let required = packed_weights_size(nc, ks, kc, nr, kr, sr);
    check_len("packed weights", required, packed.len())?;

    let skr = kr * sr;
    let kc_padded = round_up(kc, skr);
    let izp = i32::from(params.input_zero_point);
    let taps = i32::try_from(ks * kc).map_err(|_| KernelError::InvalidGeometry {
        reason: format!("reduction length ks*kc = {ks}*{kc} does not fit in i32"),
    })?;
    let bias_offset = taps.wrapping_mul(izp).wrapping_mul(i32::from(params.kernel_zero_point));
    let tile_size = packed_tile_size(ks, kc, nr, kr, sr);

    for (tile, out) in packed[..required].chunks_exact_mut(tile_size).enumerate() {
        let nr_block_start = tile * nr;
        let nr_block_size = nr.min(nc - nr_block_start);
        let (bias_bytes, body) = out.split_at_mut(nr * size_of::<i32>());

        let mut slots = vec![bias_offset; nr];
        if let Some(bias) = bias {
            for (slot, &b) in slots.iter_mut().zip(&bias[nr_block_start..nr_block_start + nr_block_size]) {
                *slot = slot.wrapping_add(b);
            }
        }

        body.fill(params.kernel_zero_point);
        let mut pos = 0;
        for ki in 0..ks {
            for kr_block_start in (0..kc_padded).step_by(kr) {
                for (j, slot) in slots.iter_mut().enumerate() {
                    if j >= nr_block_size {
                        pos += kr;
                        continue;
                    }
                    let row = ((nr_block_start + j) * ks + ki) * kc;
                    let mut ksum = 0i32;
                    for t in 0..kr {
                        let kc_idx = round_down(kr_block_start, skr)
                            + (kr_block_start + t + j * kr) % skr;
                        if kc_idx < kc {
                            let kv = weights[row + kc_idx];
                            ksum += i32::from(kv);
                            body[pos + t] = kv;
                        }
                    }
                    *slot = slot.wrapping_sub(ksum * izp);
                    pos += kr;
                }
            }
        }

        for (dst, slot) in bias_bytes.chunks_exact_mut(size_of::<i32>()).zip(&slots) {
            dst.copy_from_slice(&slot.to_ne_bytes());
        }
    }

    log::trace!("packed {nc}x{ks}x{kc} weights into {required} bytes (nr={nr} kr={kr} sr={sr})");
    Ok(())
}

fn check_len(what: &'static str, required: usize, actual: usize) -> Result<()> {
    if actual < required {
        return Err(KernelError::BufferTooSmall { what, required, actual }.into());
    }
    Ok(())
}

/// Read bias slot `j` of a packed tile.
#[inline]
pub(crate) fn packed_bias(tile: &[u8], j: usize) -> i32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&tile[j * 4..j * 4 + 4]);
    i32::from_ne_bytes(bytes)
}
