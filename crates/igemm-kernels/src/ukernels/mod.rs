//! QU8 IGEMM microkernels.
//!
//! Every kernel shares the [`Qu8IgemmUkernelFn`] calling convention:
//!
//! * `mr` rows (at most the kernel's `MR`) and `nc` columns of output are
//!   written, column tile `t` of row `i` starting at
//!   `i * cm_stride + t * cn_stride`;
//! * operand A is read through `MR * ks` indirection rows, `kc` bytes each;
//!   rows past `mr` are still read but their results are discarded;
//! * `w` holds the tiles produced by [`crate::packing::pack_qu8_conv_goki_w`]
//!   with the kernel's `NR`, `KR` and `SR`.

#![allow(clippy::too_many_arguments)]

use crate::indirection::IndirectA;
use crate::packing::packed_tile_size;
use crate::params::Qu8ConvMinmaxParams;
use igemm_common::{KernelError, Result, divide_round_up};

pub mod scalar;

#[cfg(target_arch = "x86_64")]
pub mod x86;

#[cfg(target_arch = "aarch64")]
pub mod arm;

#[cfg(all(target_arch = "wasm32", target_feature = "simd128"))]
pub mod wasm;

/// `(mr, nc, kc, ks, a, w, c, cm_stride, cn_stride, params)`.
pub type Qu8IgemmUkernelFn = fn(
    usize,
    usize,
    usize,
    usize,
    &IndirectA<'_>,
    &[u8],
    &mut [u8],
    usize,
    usize,
    &Qu8ConvMinmaxParams,
) -> Result<()>;

/// Minimum length of an output buffer holding `m x n` values.
pub fn output_len(m: usize, n: usize, nr: usize, cm_stride: usize, cn_stride: usize) -> usize {
    if m == 0 || n == 0 {
        return 0;
    }
    (m - 1) * cm_stride + ((n - 1) / nr) * cn_stride + (n - 1) % nr + 1
}

/// Tile shape a kernel was built for.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TileShape {
    pub mr: usize,
    pub nr: usize,
    pub kr: usize,
    pub sr: usize,
}

impl TileShape {
    pub const fn new(mr: usize, nr: usize, kr: usize, sr: usize) -> Self {
        Self { mr, nr, kr, sr }
    }

    /// Check every buffer a kernel call touches before the hot loop runs.
    pub fn check(
        &self,
        mr: usize,
        nc: usize,
        kc: usize,
        ks: usize,
        a: &IndirectA<'_>,
        w: &[u8],
        c: &[u8],
        cm_stride: usize,
        cn_stride: usize,
    ) -> Result<()> {
        if mr == 0 || mr > self.mr || nc == 0 || kc == 0 || ks == 0 {
            return Err(KernelError::InvalidGeometry {
                reason: format!(
                    "{}x{} kernel called with mr={mr} nc={nc} kc={kc} ks={ks}",
                    self.mr, self.nr
                ),
            }
            .into());
        }
        a.validate(self.mr, ks, kc)?;

        let packed = divide_round_up(nc, self.nr) * packed_tile_size(ks, kc, self.nr, self.kr, self.sr);
        if w.len() < packed {
            return Err(KernelError::BufferTooSmall {
                what: "packed weights",
                required: packed,
                actual: w.len(),
            }
            .into());
        }

        let out = output_len(mr, nc, self.nr, cm_stride, cn_stride);
        if c.len() < out {
            return Err(KernelError::BufferTooSmall { what: "output", required: out, actual: c.len() }.into());
        }
        Ok(())
    }

    pub fn tile_size(&self, ks: usize, kc: usize) -> usize {
        packed_tile_size(ks, kc, self.nr, self.kr, self.sr)
    }
}

/// Copy the first `cols` lanes of each row of `out` into `c`.
#[inline]
pub(crate) fn store_tile<const LANES: usize>(
    c: &mut [u8],
    out: &[[u8; LANES]],
    mr: usize,
    cols: usize,
    base: usize,
    cm_stride: usize,
) {
    for (i, row) in out.iter().take(mr).enumerate() {
        let start = base + i * cm_stride;
        c[start..start + cols].copy_from_slice(&row[..cols]);
    }
}

/// `kc` bytes of `row` starting at `k`, zero padded to `N`.
#[inline]
pub(crate) fn load_padded<const N: usize>(row: &[u8], k: usize, kc: usize) -> [u8; N] {
    let mut block = [0u8; N];
    let len = N.min(kc - k);
    block[..len].copy_from_slice(&row[k..k + len]);
    block
}
