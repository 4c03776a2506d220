//! Scenario catalogue × registered kernel variants.
//!
//! Every `(variant, scenario)` pair is its own test, reported as
//! `<variant>::<scenario>`. Variants that are not compiled for this target
//! or cannot run on this CPU are skipped, not failed.

use igemm_kernels::UkernelRegistry;
use igemm_tester::Scenario;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn run_case(name: &str, scenario: Scenario) {
    init_logging();
    let variant = match UkernelRegistry::global().find(name) {
        Ok(variant) => variant,
        Err(err) => {
            log::warn!("{err}");
            eprintln!("Skipping {name} test - variant not registered");
            return;
        }
    };
    if !variant.is_available() {
        eprintln!("Skipping {name} test - {} not available", variant.isa);
        return;
    }
    if let Err(err) = scenario.run(variant) {
        panic!("{}: {err}", scenario.test_name(variant));
    }
}

macro_rules! scenario_tests {
    ($variant:expr) => {
        scenario_tests!(@each $variant;
            k_eq => KEq,
            strided_cn => StridedCn,
            k_eq_subtile => KEqSubtile,
            k_eq_subtile_m => KEqSubtileM,
            k_eq_subtile_n => KEqSubtileN,
            k_lt => KLt,
            k_lt_subtile => KLtSubtile,
            k_gt => KGt,
            k_gt_subtile => KGtSubtile,
            k_div => KDiv,
            k_div_subtile => KDivSubtile,
            n_gt => NGt,
            n_gt_strided_cn => NGtStridedCn,
            n_gt_subtile => NGtSubtile,
            n_div => NDiv,
            n_div_strided_cn => NDivStridedCn,
            n_div_subtile => NDivSubtile,
            small_kernel => SmallKernel,
            small_kernel_subtile => SmallKernelSubtile,
            n_gt_small_kernel => NGtSmallKernel,
            n_div_small_kernel => NDivSmallKernel,
            strided_cm_subtile => StridedCmSubtile,
            a_offset => AOffset,
            zero => Zero,
            qmin => Qmin,
            qmax => Qmax,
            strided_cm => StridedCm,
            no_a_zero_point => NoAZeroPoint,
            no_b_zero_point => NoBZeroPoint,
            no_zero_point => NoZeroPoint,
        );
    };
    (@each $variant:expr; $($test:ident => $scenario:ident),* $(,)?) => {
        $(
            #[test]
            fn $test() {
                super::run_case($variant, igemm_tester::Scenario::$scenario);
            }
        )*
    };
}

macro_rules! variant_tests {
    ($($variant:ident),* $(,)?) => {
        $(
            #[allow(non_snake_case)]
            mod $variant {
                scenario_tests!(stringify!($variant));
            }
        )*
    };
}

variant_tests! {
    qu8_igemm_minmax_fp32_ukernel_1x2__scalar_fmagic,
    qu8_igemm_minmax_fp32_ukernel_1x4__scalar_fmagic,
    qu8_igemm_minmax_fp32_ukernel_2x2__scalar_fmagic,
    qu8_igemm_minmax_fp32_ukernel_2x4__scalar_fmagic,
    qu8_igemm_minmax_fp32_ukernel_3x2__scalar_fmagic,
    qu8_igemm_minmax_fp32_ukernel_3x4__scalar_fmagic,
    qu8_igemm_minmax_fp32_ukernel_4x2__scalar_fmagic,
    qu8_igemm_minmax_fp32_ukernel_4x4__scalar_fmagic,

    qu8_igemm_minmax_fp32_ukernel_1x2__scalar_imagic,
    qu8_igemm_minmax_fp32_ukernel_1x4__scalar_imagic,
    qu8_igemm_minmax_fp32_ukernel_2x2__scalar_imagic,
    qu8_igemm_minmax_fp32_ukernel_2x4__scalar_imagic,
    qu8_igemm_minmax_fp32_ukernel_3x2__scalar_imagic,
    qu8_igemm_minmax_fp32_ukernel_3x4__scalar_imagic,
    qu8_igemm_minmax_fp32_ukernel_4x2__scalar_imagic,
    qu8_igemm_minmax_fp32_ukernel_4x4__scalar_imagic,

    qu8_igemm_minmax_fp32_ukernel_1x2__scalar_lrintf,
    qu8_igemm_minmax_fp32_ukernel_1x4__scalar_lrintf,
    qu8_igemm_minmax_fp32_ukernel_2x2__scalar_lrintf,
    qu8_igemm_minmax_fp32_ukernel_2x4__scalar_lrintf,
    qu8_igemm_minmax_fp32_ukernel_3x2__scalar_lrintf,
    qu8_igemm_minmax_fp32_ukernel_3x4__scalar_lrintf,
    qu8_igemm_minmax_fp32_ukernel_4x2__scalar_lrintf,
    qu8_igemm_minmax_fp32_ukernel_4x4__scalar_lrintf,

    qu8_igemm_minmax_rndnu_ukernel_1x2__scalar,
    qu8_igemm_minmax_rndnu_ukernel_2x4__scalar,
    qu8_igemm_minmax_rndnu_ukernel_4x4__scalar,

    qu8_igemm_minmax_fp32_ukernel_1x4c2__scalar_lrintf,
    qu8_igemm_minmax_fp32_ukernel_2x4c8__scalar_lrintf,
    qu8_igemm_minmax_fp32_ukernel_3x4c2s4__scalar_lrintf,
    qu8_igemm_minmax_fp32_ukernel_4x4c2s4__scalar_lrintf,
}

#[cfg(target_arch = "x86_64")]
variant_tests! {
    qu8_igemm_minmax_fp32_ukernel_1x4c8__sse2,
    qu8_igemm_minmax_fp32_ukernel_2x4c8__sse2,
    qu8_igemm_minmax_fp32_ukernel_3x4c8__sse41,
    qu8_igemm_minmax_fp32_ukernel_2x8c8__avx2,
}

#[cfg(target_arch = "aarch64")]
variant_tests! {
    qu8_igemm_minmax_fp32_ukernel_1x8c8__neonv8_mlal,
    qu8_igemm_minmax_fp32_ukernel_2x8c8__neonv8_mlal,
}

#[cfg(all(target_arch = "wasm32", target_feature = "simd128"))]
variant_tests! {
    qu8_igemm_minmax_fp32_ukernel_3x4c2s4__wasmsimd_dot16x2,
}

#[test]
fn every_registered_variant_has_a_test_module() {
    // Keep the module list above in sync with the registry.
    let listed = include_str!("qu8_igemm_minmax.rs");
    for variant in UkernelRegistry::global().variants() {
        assert!(listed.contains(&format!("    {},", variant.name)), "{} has no test module", variant.name);
    }
}
