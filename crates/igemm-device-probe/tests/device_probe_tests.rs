//! Environment-driven probe behaviour.

use igemm_device_probe::{Isa, capability_summary, isa_available, probe_cpu};
use serial_test::serial;
use temp_env::with_var;

#[test]
#[serial(igemm_env)]
fn force_scalar_hides_every_simd_isa() {
    with_var("IGEMM_FORCE_SCALAR", Some("1"), || {
        let caps = probe_cpu();
        assert!(!caps.has_sse2 && !caps.has_sse41 && !caps.has_avx2);
        assert!(!caps.has_neon && !caps.has_wasm_simd);
        assert!(isa_available(Isa::Scalar));
        assert!(!isa_available(Isa::Sse2));
        assert!(capability_summary().ends_with("best=scalar"));
    });
}

#[test]
#[serial(igemm_env)]
fn probe_is_stable_across_calls() {
    with_var("IGEMM_FORCE_SCALAR", None::<&str>, || {
        assert_eq!(probe_cpu(), probe_cpu());
    });
}

#[test]
#[serial(igemm_env)]
fn architectures_are_mutually_exclusive() {
    with_var("IGEMM_FORCE_SCALAR", None::<&str>, || {
        let caps = probe_cpu();
        assert!(!(caps.has_avx2 && caps.has_neon));
        assert!(!(caps.has_sse2 && caps.has_wasm_simd));
        // AVX2 implies the narrower x86 extensions.
        if caps.has_avx2 {
            assert!(caps.has_sse41 && caps.has_sse2);
        }
    });
}
