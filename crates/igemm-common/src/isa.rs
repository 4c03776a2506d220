//! Instruction-set tags used to gate microkernel variants.
//!
//! Each kernel variant names the ISA extension it needs. Whether that
//! extension is usable is a runtime question answered by
//! `igemm-device-probe`; this enum only carries the identity.

use std::fmt;

/// Instruction set extension a kernel variant requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[non_exhaustive]
pub enum Isa {
    /// Portable scalar code; always available.
    Scalar,
    /// x86 SSE2 (128-bit).
    Sse2,
    /// x86 SSE4.1 (128-bit).
    Sse41,
    /// x86 AVX2 (256-bit).
    Avx2,
    /// AArch64 NEON with ARMv8 rounding conversions.
    NeonV8,
    /// WebAssembly SIMD128.
    WasmSimd,
}

impl Isa {
    /// Short tag used in variant names (`__sse2`, `__neonv8`, ...).
    pub fn tag(self) -> &'static str {
        match self {
            Isa::Scalar => "scalar",
            Isa::Sse2 => "sse2",
            Isa::Sse41 => "sse41",
            Isa::Avx2 => "avx2",
            Isa::NeonV8 => "neonv8",
            Isa::WasmSimd => "wasmsimd",
        }
    }
}

impl fmt::Display for Isa {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}
