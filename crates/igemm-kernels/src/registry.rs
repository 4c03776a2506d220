//! Table of every QU8 IGEMM kernel variant compiled for the current target.
//!
//! A variant bundles the kernel entry point with everything a caller needs
//! to drive it: its tile (`mr x nr`, packing `kr`/`sr`), the ISA it requires,
//! the init function producing its parameter payload, and the rounding
//! strategy its output stage implements.

use crate::params::{
    Qu8InitParamsFn, init_qu8_conv_minmax_fp32_scalar_fmagic_params,
    init_qu8_conv_minmax_fp32_scalar_imagic_params, init_qu8_conv_minmax_fp32_scalar_lrintf_params,
    init_qu8_conv_minmax_rndnu_scalar_params,
};
use crate::requantization::{Qu8RequantizeFn, Requantization};
use crate::ukernels::{Qu8IgemmUkernelFn, scalar};
use igemm_common::{Isa, KernelError, Result};
use std::sync::OnceLock;

/// One registered kernel.
#[derive(Debug, Clone, Copy)]
pub struct Qu8IgemmVariant {
    pub name: &'static str,
    pub isa: Isa,
    pub mr: usize,
    pub nr: usize,
    pub kr: usize,
    pub sr: usize,
    /// Reduction block the kernel's main loop consumes (`kr * sr`).
    pub k_block: usize,
    pub requantization: Requantization,
    pub ukernel: Qu8IgemmUkernelFn,
    pub init_params: Qu8InitParamsFn,
}

impl Qu8IgemmVariant {
    #[allow(clippy::too_many_arguments)]
    const fn new(
        name: &'static str,
        isa: Isa,
        (mr, nr, kr, sr): (usize, usize, usize, usize),
        requantization: Requantization,
        ukernel: Qu8IgemmUkernelFn,
        init_params: Qu8InitParamsFn,
    ) -> Self {
        Self { name, isa, mr, nr, kr, sr, k_block: kr * sr, requantization, ukernel, init_params }
    }

    /// Whether the host can run this variant right now.
    pub fn is_available(&self) -> bool {
        igemm_device_probe::isa_available(self.isa)
    }

    /// Reference requantizer matching the output stage.
    pub fn requantize(&self) -> Qu8RequantizeFn {
        self.requantization.reference()
    }
}

macro_rules! scalar_variants {
    ($($name:literal => $tile:expr, $req:ident, $ukernel:ident, $init:ident;)*) => {
        [$(Qu8IgemmVariant::new($name, Isa::Scalar, $tile, Requantization::$req, scalar::$ukernel, $init),)*]
    };
}

const SCALAR_VARIANTS: [Qu8IgemmVariant; 31] = scalar_variants! {
    "qu8_igemm_minmax_fp32_ukernel_1x2__scalar_fmagic" => (1, 2, 1, 1), Fp32, qu8_igemm_minmax_fp32_ukernel_1x2_scalar_fmagic, init_qu8_conv_minmax_fp32_scalar_fmagic_params;
    "qu8_igemm_minmax_fp32_ukernel_1x4__scalar_fmagic" => (1, 4, 1, 1), Fp32, qu8_igemm_minmax_fp32_ukernel_1x4_scalar_fmagic, init_qu8_conv_minmax_fp32_scalar_fmagic_params;
    "qu8_igemm_minmax_fp32_ukernel_2x2__scalar_fmagic" => (2, 2, 1, 1), Fp32, qu8_igemm_minmax_fp32_ukernel_2x2_scalar_fmagic, init_qu8_conv_minmax_fp32_scalar_fmagic_params;
    "qu8_igemm_minmax_fp32_ukernel_2x4__scalar_fmagic" => (2, 4, 1, 1), Fp32, qu8_igemm_minmax_fp32_ukernel_2x4_scalar_fmagic, init_qu8_conv_minmax_fp32_scalar_fmagic_params;
    "qu8_igemm_minmax_fp32_ukernel_3x2__scalar_fmagic" => (3, 2, 1, 1), Fp32, qu8_igemm_minmax_fp32_ukernel_3x2_scalar_fmagic, init_qu8_conv_minmax_fp32_scalar_fmagic_params;
    "qu8_igemm_minmax_fp32_ukernel_3x4__scalar_fmagic" => (3, 4, 1, 1), Fp32, qu8_igemm_minmax_fp32_ukernel_3x4_scalar_fmagic, init_qu8_conv_minmax_fp32_scalar_fmagic_params;
    "qu8_igemm_minmax_fp32_ukernel_4x2__scalar_fmagic" => (4, 2, 1, 1), Fp32, qu8_igemm_minmax_fp32_ukernel_4x2_scalar_fmagic, init_qu8_conv_minmax_fp32_scalar_fmagic_params;
    "qu8_igemm_minmax_fp32_ukernel_4x4__scalar_fmagic" => (4, 4, 1, 1), Fp32, qu8_igemm_minmax_fp32_ukernel_4x4_scalar_fmagic, init_qu8_conv_minmax_fp32_scalar_fmagic_params;

    "qu8_igemm_minmax_fp32_ukernel_1x2__scalar_imagic" => (1, 2, 1, 1), Fp32, qu8_igemm_minmax_fp32_ukernel_1x2_scalar_imagic, init_qu8_conv_minmax_fp32_scalar_imagic_params;
    "qu8_igemm_minmax_fp32_ukernel_1x4__scalar_imagic" => (1, 4, 1, 1), Fp32, qu8_igemm_minmax_fp32_ukernel_1x4_scalar_imagic, init_qu8_conv_minmax_fp32_scalar_imagic_params;
    "qu8_igemm_minmax_fp32_ukernel_2x2__scalar_imagic" => (2, 2, 1, 1), Fp32, qu8_igemm_minmax_fp32_ukernel_2x2_scalar_imagic, init_qu8_conv_minmax_fp32_scalar_imagic_params;
    "qu8_igemm_minmax_fp32_ukernel_2x4__scalar_imagic" => (2, 4, 1, 1), Fp32, qu8_igemm_minmax_fp32_ukernel_2x4_scalar_imagic, init_qu8_conv_minmax_fp32_scalar_imagic_params;
    "qu8_igemm_minmax_fp32_ukernel_3x2__scalar_imagic" => (3, 2, 1, 1), Fp32, qu8_igemm_minmax_fp32_ukernel_3x2_scalar_imagic, init_qu8_conv_minmax_fp32_scalar_imagic_params;
    "qu8_igemm_minmax_fp32_ukernel_3x4__scalar_imagic" => (3, 4, 1, 1), Fp32, qu8_igemm_minmax_fp32_ukernel_3x4_scalar_imagic, init_qu8_conv_minmax_fp32_scalar_imagic_params;
    "qu8_igemm_minmax_fp32_ukernel_4x2__scalar_imagic" => (4, 2, 1, 1), Fp32, qu8_igemm_minmax_fp32_ukernel_4x2_scalar_imagic, init_qu8_conv_minmax_fp32_scalar_imagic_params;
    "qu8_igemm_minmax_fp32_ukernel_4x4__scalar_imagic" => (4, 4, 1, 1), Fp32, qu8_igemm_minmax_fp32_ukernel_4x4_scalar_imagic, init_qu8_conv_minmax_fp32_scalar_imagic_params;

    "qu8_igemm_minmax_fp32_ukernel_1x2__scalar_lrintf" => (1, 2, 1, 1), Fp32, qu8_igemm_minmax_fp32_ukernel_1x2_scalar_lrintf, init_qu8_conv_minmax_fp32_scalar_lrintf_params;
    "qu8_igemm_minmax_fp32_ukernel_1x4__scalar_lrintf" => (1, 4, 1, 1), Fp32, qu8_igemm_minmax_fp32_ukernel_1x4_scalar_lrintf, init_qu8_conv_minmax_fp32_scalar_lrintf_params;
    "qu8_igemm_minmax_fp32_ukernel_2x2__scalar_lrintf" => (2, 2, 1, 1), Fp32, qu8_igemm_minmax_fp32_ukernel_2x2_scalar_lrintf, init_qu8_conv_minmax_fp32_scalar_lrintf_params;
    "qu8_igemm_minmax_fp32_ukernel_2x4__scalar_lrintf" => (2, 4, 1, 1), Fp32, qu8_igemm_minmax_fp32_ukernel_2x4_scalar_lrintf, init_qu8_conv_minmax_fp32_scalar_lrintf_params;
    "qu8_igemm_minmax_fp32_ukernel_3x2__scalar_lrintf" => (3, 2, 1, 1), Fp32, qu8_igemm_minmax_fp32_ukernel_3x2_scalar_lrintf, init_qu8_conv_minmax_fp32_scalar_lrintf_params;
    "qu8_igemm_minmax_fp32_ukernel_3x4__scalar_lrintf" => (3, 4, 1, 1), Fp32, qu8_igemm_minmax_fp32_ukernel_3x4_scalar_lrintf, init_qu8_conv_minmax_fp32_scalar_lrintf_params;
    "qu8_igemm_minmax_fp32_ukernel_4x2__scalar_lrintf" => (4, 2, 1, 1), Fp32, qu8_igemm_minmax_fp32_ukernel_4x2_scalar_lrintf, init_qu8_conv_minmax_fp32_scalar_lrintf_params;
    "qu8_igemm_minmax_fp32_ukernel_4x4__scalar_lrintf" => (4, 4, 1, 1), Fp32, qu8_igemm_minmax_fp32_ukernel_4x4_scalar_lrintf, init_qu8_conv_minmax_fp32_scalar_lrintf_params;

    "qu8_igemm_minmax_rndnu_ukernel_1x2__scalar" => (1, 2, 1, 1), Rndnu, qu8_igemm_minmax_rndnu_ukernel_1x2_scalar, init_qu8_conv_minmax_rndnu_scalar_params;
    "qu8_igemm_minmax_rndnu_ukernel_2x4__scalar" => (2, 4, 1, 1), Rndnu, qu8_igemm_minmax_rndnu_ukernel_2x4_scalar, init_qu8_conv_minmax_rndnu_scalar_params;
    "qu8_igemm_minmax_rndnu_ukernel_4x4__scalar" => (4, 4, 1, 1), Rndnu, qu8_igemm_minmax_rndnu_ukernel_4x4_scalar, init_qu8_conv_minmax_rndnu_scalar_params;

    "qu8_igemm_minmax_fp32_ukernel_1x4c2__scalar_lrintf" => (1, 4, 2, 1), Fp32, qu8_igemm_minmax_fp32_ukernel_1x4c2_scalar_lrintf, init_qu8_conv_minmax_fp32_scalar_lrintf_params;
    "qu8_igemm_minmax_fp32_ukernel_2x4c8__scalar_lrintf" => (2, 4, 8, 1), Fp32, qu8_igemm_minmax_fp32_ukernel_2x4c8_scalar_lrintf, init_qu8_conv_minmax_fp32_scalar_lrintf_params;
    "qu8_igemm_minmax_fp32_ukernel_3x4c2s4__scalar_lrintf" => (3, 4, 2, 4), Fp32, qu8_igemm_minmax_fp32_ukernel_3x4c2s4_scalar_lrintf, init_qu8_conv_minmax_fp32_scalar_lrintf_params;
    "qu8_igemm_minmax_fp32_ukernel_4x4c2s4__scalar_lrintf" => (4, 4, 2, 4), Fp32, qu8_igemm_minmax_fp32_ukernel_4x4c2s4_scalar_lrintf, init_qu8_conv_minmax_fp32_scalar_lrintf_params;
};

#[cfg(target_arch = "x86_64")]
fn simd_variants() -> Vec<Qu8IgemmVariant> {
    use crate::params::init_qu8_conv_minmax_fp32_simd_params as init;
    use crate::ukernels::x86;

    vec![
        Qu8IgemmVariant::new(
            "qu8_igemm_minmax_fp32_ukernel_2x8c8__avx2",
            Isa::Avx2,
            (2, 8, 8, 1),
            Requantization::Fp32,
            x86::qu8_igemm_minmax_fp32_ukernel_2x8c8_avx2,
            init,
        ),
        Qu8IgemmVariant::new(
            "qu8_igemm_minmax_fp32_ukernel_3x4c8__sse41",
            Isa::Sse41,
            (3, 4, 8, 1),
            Requantization::Fp32,
            x86::qu8_igemm_minmax_fp32_ukernel_3x4c8_sse41,
            init,
        ),
        Qu8IgemmVariant::new(
            "qu8_igemm_minmax_fp32_ukernel_2x4c8__sse2",
            Isa::Sse2,
            (2, 4, 8, 1),
            Requantization::Fp32,
            x86::qu8_igemm_minmax_fp32_ukernel_2x4c8_sse2,
            init,
        ),
        Qu8IgemmVariant::new(
            "qu8_igemm_minmax_fp32_ukernel_1x4c8__sse2",
            Isa::Sse2,
            (1, 4, 8, 1),
            Requantization::Fp32,
            x86::qu8_igemm_minmax_fp32_ukernel_1x4c8_sse2,
            init,
        ),
    ]
}

#[cfg(target_arch = "aarch64")]
fn simd_variants() -> Vec<Qu8IgemmVariant> {
    use crate::params::init_qu8_conv_minmax_fp32_simd_params as init;
    use crate::ukernels::arm;

    vec![
        Qu8IgemmVariant::new(
            "qu8_igemm_minmax_fp32_ukernel_2x8c8__neonv8_mlal",
            Isa::NeonV8,
            (2, 8, 8, 1),
            Requantization::Fp32,
            arm::qu8_igemm_minmax_fp32_ukernel_2x8c8_neonv8,
            init,
        ),
        Qu8IgemmVariant::new(
            "qu8_igemm_minmax_fp32_ukernel_1x8c8__neonv8_mlal",
            Isa::NeonV8,
            (1, 8, 8, 1),
            Requantization::Fp32,
            arm::qu8_igemm_minmax_fp32_ukernel_1x8c8_neonv8,
            init,
        ),
    ]
}

#[cfg(all(target_arch = "wasm32", target_feature = "simd128"))]
fn simd_variants() -> Vec<Qu8IgemmVariant> {
    vec![Qu8IgemmVariant::new(
        "qu8_igemm_minmax_fp32_ukernel_3x4c2s4__wasmsimd_dot16x2",
        Isa::WasmSimd,
        (3, 4, 2, 4),
        Requantization::Fp32,
        crate::ukernels::wasm::qu8_igemm_minmax_fp32_ukernel_3x4c2s4_wasmsimd,
        crate::params::init_qu8_conv_minmax_fp32_simd_params,
    )]
}

#[cfg(not(any(
    target_arch = "x86_64",
    target_arch = "aarch64",
    all(target_arch = "wasm32", target_feature = "simd128")
)))]
fn simd_variants() -> Vec<Qu8IgemmVariant> {
    Vec::new()
}

/// Kernel registry with cached best-variant selection.
pub struct UkernelRegistry {
    variants: Vec<Qu8IgemmVariant>,
    selected: OnceLock<usize>,
}

impl UkernelRegistry {
    /// Collect every variant built for this target, SIMD variants first in
    /// order of preference and the portable scalar ones last.
    pub fn new() -> Self {
        let mut variants = simd_variants();
        variants.extend_from_slice(&SCALAR_VARIANTS);
        log::debug!("registered {} qu8 igemm variants", variants.len());
        Self { variants, selected: OnceLock::new() }
    }

    /// Process-wide registry.
    pub fn global() -> &'static UkernelRegistry {
        static REGISTRY: OnceLock<UkernelRegistry> = OnceLock::new();
        REGISTRY.get_or_init(UkernelRegistry::new)
    }

    pub fn variants(&self) -> &[Qu8IgemmVariant] {
        &self.variants
    }

    /// Look a variant up by its full name.
    pub fn find(&self, name: &str) -> Result<&Qu8IgemmVariant> {
        self.variants
            .iter()
            .find(|v| v.name == name)
            .ok_or_else(|| KernelError::UnknownVariant { name: name.to_string() }.into())
    }

    /// Names of the variants the host can run.
    pub fn list_available(&self) -> Vec<&'static str> {
        self.variants.iter().filter(|v| v.is_available()).map(|v| v.name).collect()
    }

    /// Select the preferred runnable variant; the choice is cached.
    pub fn select_best(&self) -> Result<&Qu8IgemmVariant> {
        let selected = *self.selected.get_or_init(|| {
            match self.variants.iter().position(Qu8IgemmVariant::is_available) {
                Some(idx) => {
                    log::info!("Selected qu8 igemm variant: {}", self.variants[idx].name);
                    idx
                }
                None => {
                    log::error!("No available qu8 igemm variant found");
                    usize::MAX
                }
            }
        });
        self.variants.get(selected).ok_or_else(|| KernelError::NoProvider.into())
    }
}

impl Default for UkernelRegistry {
    fn default() -> Self {
        Self::new()
    }
}
