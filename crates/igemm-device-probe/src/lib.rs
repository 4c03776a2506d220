//! Runtime CPU capability probing for microkernel gating.
//!
//! Kernel variants declare the [`Isa`] they need; [`isa_available`] answers
//! whether that ISA can run on this machine right now. Detection is always
//! performed at runtime (`is_x86_feature_detected!` /
//! `is_aarch64_feature_detected!`), never inferred from the compile target
//! alone. WebAssembly has no runtime detection, so SIMD128 is reported
//! exactly when the module was compiled with it.
//!
//! Setting `IGEMM_FORCE_SCALAR=1` hides every SIMD capability, which lets a
//! test run exercise only the portable kernels on any host.

pub use igemm_common::Isa;
use igemm_common::config::force_scalar_from_env;

// ── CPU capabilities ─────────────────────────────────────────────────────────

/// CPU capabilities detected at runtime.
///
/// Obtained by calling [`probe_cpu`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct CpuCapabilities {
    /// Number of logical CPU cores available to the process (always ≥ 1).
    pub core_count: usize,
    /// SSE2 available (`x86`/`x86_64` only).
    pub has_sse2: bool,
    /// SSE4.1 available (`x86`/`x86_64` only).
    pub has_sse41: bool,
    /// AVX2 available (`x86`/`x86_64` only).
    pub has_avx2: bool,
    /// NEON available (`aarch64` only).
    pub has_neon: bool,
    /// WebAssembly SIMD128 compiled in (`wasm32` only).
    pub has_wasm_simd: bool,
}

impl CpuCapabilities {
    /// Capabilities with every SIMD flag cleared.
    pub fn scalar_only(core_count: usize) -> Self {
        Self {
            core_count: core_count.max(1),
            has_sse2: false,
            has_sse41: false,
            has_avx2: false,
            has_neon: false,
            has_wasm_simd: false,
        }
    }

    /// Whether `isa` is usable with these capabilities.
    pub fn supports(&self, isa: Isa) -> bool {
        match isa {
            Isa::Scalar => true,
            Isa::Sse2 => self.has_sse2,
            Isa::Sse41 => self.has_sse41,
            Isa::Avx2 => self.has_avx2,
            Isa::NeonV8 => self.has_neon,
            Isa::WasmSimd => self.has_wasm_simd,
            #[allow(unreachable_patterns)]
            _ => false,
        }
    }

    /// Best ISA supported, for logs and reports.
    pub fn best_isa(&self) -> Isa {
        [Isa::Avx2, Isa::Sse41, Isa::Sse2, Isa::NeonV8, Isa::WasmSimd]
            .into_iter()
            .find(|&isa| self.supports(isa))
            .unwrap_or(Isa::Scalar)
    }
}

/// Probe the current CPU and return its capabilities.
///
/// `core_count` is derived from [`std::thread::available_parallelism`] and is
/// guaranteed to be ≥ 1.
///
/// # Examples
///
/// ```
/// use igemm_device_probe::probe_cpu;
///
/// let caps = probe_cpu();
/// assert!(caps.core_count >= 1);
/// // x86 and ARM flags are mutually exclusive.
/// assert!(!(caps.has_sse2 && caps.has_neon));
/// ```
pub fn probe_cpu() -> CpuCapabilities {
    let core_count = std::thread::available_parallelism().map(std::num::NonZero::get).unwrap_or(1);

    if force_scalar_from_env() {
        log::debug!("IGEMM_FORCE_SCALAR set: reporting scalar-only capabilities");
        return CpuCapabilities::scalar_only(core_count);
    }

    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    let (has_sse2, has_sse41, has_avx2) = (
        std::arch::is_x86_feature_detected!("sse2"),
        std::arch::is_x86_feature_detected!("sse4.1"),
        std::arch::is_x86_feature_detected!("avx2"),
    );
    #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
    let (has_sse2, has_sse41, has_avx2) = (false, false, false);

    #[cfg(target_arch = "aarch64")]
    let has_neon = std::arch::is_aarch64_feature_detected!("neon");
    #[cfg(not(target_arch = "aarch64"))]
    let has_neon = false;

    let has_wasm_simd = cfg!(all(target_arch = "wasm32", target_feature = "simd128"));

    CpuCapabilities { core_count, has_sse2, has_sse41, has_avx2, has_neon, has_wasm_simd }
}

/// Whether kernels built for `isa` can run on this machine.
#[inline]
pub fn isa_available(isa: Isa) -> bool {
    probe_cpu().supports(isa)
}

/// Human-readable capability summary, e.g. `"cores=8 best=avx2"`.
pub fn capability_summary() -> String {
    let caps = probe_cpu();
    format!("cores={} best={}", caps.core_count, caps.best_isa())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_is_always_supported() {
        assert!(CpuCapabilities::scalar_only(1).supports(Isa::Scalar));
        assert!(probe_cpu().supports(Isa::Scalar));
    }

    #[test]
    fn scalar_only_hides_simd() {
        let caps = CpuCapabilities::scalar_only(0);
        assert_eq!(caps.core_count, 1);
        for isa in [Isa::Sse2, Isa::Sse41, Isa::Avx2, Isa::NeonV8, Isa::WasmSimd] {
            assert!(!caps.supports(isa), "{isa} should be hidden");
        }
        assert_eq!(caps.best_isa(), Isa::Scalar);
    }

    #[test]
    fn best_isa_prefers_widest() {
        let caps = CpuCapabilities {
            core_count: 4,
            has_sse2: true,
            has_sse41: true,
            has_avx2: true,
            has_neon: false,
            has_wasm_simd: false,
        };
        assert_eq!(caps.best_isa(), Isa::Avx2);
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn x86_64_baseline_has_sse2() {
        // SSE2 is part of the x86_64 baseline.
        if !force_scalar_from_env() {
            assert!(probe_cpu().has_sse2);
        }
    }
}
