//! A 3x4 tile with a single reduction step, small enough to check by hand.

use igemm_kernels::params::Qu8QuantizationArgs;
use igemm_kernels::{IndirectA, IndirectRow, PackingParams, UkernelRegistry, pack_qu8_conv_goki_w, packed_weights_size};
use igemm_tester::{GemmMicrokernelTester, Scenario};

// a - 127 = [3, -7, 0], b - 127 = [1, -1, 10, -10], bias = [0, 10, -10, 100].
const A: [u8; 3] = [130, 120, 127];
const B: [u8; 4] = [128, 126, 137, 117];
const BIAS: [i32; 4] = [0, 10, -10, 100];

// Accumulators span [-80, 170]: range 250 < 256, so the output scale is
// 1 / 1.00001 and the zero point round(127.5 - 45 / 1.00001) = 83.
const EXPECTED: [[u8; 4]; 3] = [
    [86, 90, 103, 153],
    [76, 100, 3, 253],
    [83, 93, 73, 183],
];

#[test]
fn hand_computed_3x4_outputs() {
    let _ = env_logger::builder().is_test(true).try_init();
    let registry = UkernelRegistry::global();
    let zp = PackingParams { input_zero_point: 127, kernel_zero_point: 127 };
    let args = Qu8QuantizationArgs {
        kernel_zero_point: 127,
        scale: 1.0 / 1.00001,
        output_zero_point: 83,
        output_min: 0,
        output_max: 255,
    };
    let rows = [IndirectRow::Input(0), IndirectRow::Input(1), IndirectRow::Input(2)];
    let zero = [127u8];
    let a = IndirectA::new(&rows, &A, &zero, 0);

    for name in [
        "qu8_igemm_minmax_fp32_ukernel_3x4__scalar_fmagic",
        "qu8_igemm_minmax_fp32_ukernel_3x4__scalar_imagic",
        "qu8_igemm_minmax_fp32_ukernel_3x4__scalar_lrintf",
    ] {
        let variant = registry.find(name).unwrap();
        let mut packed = vec![0u8; packed_weights_size(4, 1, 1, variant.nr, variant.kr, variant.sr)];
        pack_qu8_conv_goki_w(4, 1, 1, variant.nr, variant.kr, variant.sr, &B, Some(&BIAS), &mut packed, &zp)
            .unwrap();
        let params = (variant.init_params)(&args).unwrap();

        let mut c = [0u8; 12];
        (variant.ukernel)(3, 4, 1, 1, &a, &packed, &mut c, 4, 4, &params).unwrap();
        for i in 0..3 {
            for j in 0..4 {
                assert_eq!(c[i * 4 + j], EXPECTED[i][j], "{name} at {i}, {j}");
            }
        }
    }
}

#[test]
fn zero_row_yields_bias_only() {
    let registry = UkernelRegistry::global();
    let variant = registry.find("qu8_igemm_minmax_fp32_ukernel_3x4__scalar_lrintf").unwrap();
    let zp = PackingParams { input_zero_point: 127, kernel_zero_point: 127 };
    let mut packed = vec![0u8; packed_weights_size(4, 1, 1, 4, 1, 1)];
    pack_qu8_conv_goki_w(4, 1, 1, 4, 1, 1, &B, Some(&BIAS), &mut packed, &zp).unwrap();
    let params = (variant.init_params)(&Qu8QuantizationArgs {
        kernel_zero_point: 127,
        scale: 1.0 / 1.00001,
        output_zero_point: 83,
        output_min: 0,
        output_max: 255,
    })
    .unwrap();

    // Row 1 reads the zero buffer; the offset must not move it.
    let rows = [IndirectRow::Input(0), IndirectRow::Zero, IndirectRow::Input(2)];
    let zero = [127u8];
    let shifted = [0xA5, 0xA5, A[0], A[1], A[2]];
    let a = IndirectA::new(&rows, &shifted, &zero, 2);
    let mut c = [0u8; 12];
    (variant.ukernel)(3, 4, 1, 1, &a, &packed, &mut c, 4, 4, &params).unwrap();
    assert_eq!(&c[..4], &EXPECTED[0]);
    assert_eq!(&c[4..8], &[83, 93, 73, 183]);
    assert_eq!(&c[8..], &EXPECTED[2]);
}

#[test]
fn seeded_k_eq_passes_for_every_3x4_stage() {
    let registry = UkernelRegistry::global();
    for stage in ["fmagic", "imagic", "lrintf"] {
        let variant = registry.find(&format!("qu8_igemm_minmax_fp32_ukernel_3x4__scalar_{stage}")).unwrap();
        GemmMicrokernelTester::for_variant(variant).m(3).n(4).k(1).seed(0x5EED).test_variant(variant);
        Scenario::KEq.run(variant).unwrap();
    }
}
