//! Property tests over random shapes, strides, offsets and zero points.

use igemm_kernels::params::Qu8QuantizationArgs;
use igemm_kernels::{Qu8IgemmVariant, UkernelRegistry};
use igemm_tester::{FILL_BYTE, GemmMicrokernelTester, Qu8IgemmProblem};
use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

const VARIANTS: [&str; 4] = [
    "qu8_igemm_minmax_fp32_ukernel_4x4__scalar_imagic",
    "qu8_igemm_minmax_rndnu_ukernel_2x4__scalar",
    "qu8_igemm_minmax_fp32_ukernel_2x4c8__scalar_lrintf",
    "qu8_igemm_minmax_fp32_ukernel_3x4c2s4__scalar_lrintf",
];

fn variant(index: usize) -> Qu8IgemmVariant {
    *UkernelRegistry::global().find(VARIANTS[index % VARIANTS.len()]).unwrap()
}

/// Run `problem` and gather its `m x n` outputs densely.
fn dense_output(variant: &Qu8IgemmVariant, problem: &Qu8IgemmProblem) -> Vec<u8> {
    let (scale, zero_point) = problem.output_quantization();
    let params = (variant.init_params)(&Qu8QuantizationArgs {
        kernel_zero_point: 127,
        scale,
        output_zero_point: zero_point,
        output_min: 0,
        output_max: 255,
    })
    .unwrap();
    let mut c = vec![FILL_BYTE; problem.output_len()];
    problem.run(variant.ukernel, &params, &mut c).unwrap();
    let mut out = Vec::with_capacity(problem.m * problem.n);
    for i in 0..problem.m {
        for j in 0..problem.n {
            out.push(c[problem.output_index(i, j)]);
        }
    }
    out
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn kernels_match_reference(
        which in 0usize..4,
        m_frac in 0.0f64..1.0,
        n in 1usize..13,
        k in 1usize..40,
        ks in 1usize..4,
        a_zero_point in any::<u8>(),
        b_zero_point in any::<u8>(),
        seed in any::<u64>(),
    ) {
        let v = variant(which);
        let m = 1 + (m_frac * v.mr as f64) as usize % v.mr;
        let result = GemmMicrokernelTester::for_variant(&v)
            .m(m)
            .n(n)
            .k(k)
            .ks(ks)
            .a_zero_point(a_zero_point)
            .b_zero_point(b_zero_point)
            .iterations(2)
            .seed(seed)
            .try_test_variant(&v);
        prop_assert!(result.is_ok(), "{}: {}", v.name, result.unwrap_err());
    }

    #[test]
    fn outputs_do_not_depend_on_strides(
        which in 0usize..4,
        n in 1usize..10,
        k in 1usize..20,
        extra_cn in 0usize..5,
        extra_cm in 0usize..7,
        seed in any::<u64>(),
    ) {
        let v = variant(which);
        let tester = GemmMicrokernelTester::for_variant(&v).m(v.mr).n(n).k(k);
        let problem = Qu8IgemmProblem::generate(&tester, &mut ChaCha8Rng::seed_from_u64(seed)).unwrap();
        let baseline = dense_output(&v, &problem);

        let mut strided = problem.clone();
        strided.cn_stride = v.nr + extra_cn;
        strided.cm_stride = n.div_ceil(v.nr) * strided.cn_stride + extra_cm;
        prop_assert_eq!(baseline, dense_output(&v, &strided));
    }

    #[test]
    fn a_offset_is_transparent(
        which in 0usize..4,
        k in 1usize..20,
        ks in 1usize..4,
        a_offset in 1usize..64,
        zero_index in proptest::option::of(0usize..4),
        seed in any::<u64>(),
    ) {
        let v = variant(which);
        let mut tester = GemmMicrokernelTester::for_variant(&v).m(v.mr).n(v.nr).k(k).ks(ks);
        if let Some(z) = zero_index {
            tester = tester.zero_index(z % v.mr);
        }
        let plain = Qu8IgemmProblem::generate(&tester, &mut ChaCha8Rng::seed_from_u64(seed)).unwrap();
        let offset = Qu8IgemmProblem::generate(&tester.a_offset(a_offset), &mut ChaCha8Rng::seed_from_u64(seed)).unwrap();
        prop_assert_eq!(&plain.accumulators, &offset.accumulators);
        prop_assert_eq!(dense_output(&v, &plain), dense_output(&v, &offset));
    }

    #[test]
    fn zero_points_of_zero_reduce_to_plain_dot_products(
        n in 1usize..9,
        k in 1usize..16,
        ks in 1usize..3,
        seed in any::<u64>(),
    ) {
        let tester = GemmMicrokernelTester::default().mr(2).nr(4).m(2).n(n).k(k).ks(ks).a_zero_point(0).b_zero_point(0);
        let problem = Qu8IgemmProblem::generate(&tester, &mut ChaCha8Rng::seed_from_u64(seed)).unwrap();
        let a = problem.indirect_a();
        for i in 0..2 {
            for j in 0..n {
                let mut acc = problem.bias[j];
                for tap in 0..ks {
                    let row = a.row(tap * 2 + i);
                    for kk in 0..k {
                        acc += i32::from(row[kk]) * i32::from(problem.weights[(j * ks + tap) * k + kk]);
                    }
                }
                prop_assert_eq!(acc, problem.accumulators[i * n + j]);
            }
        }
    }

    #[test]
    fn clamped_outputs_stay_in_range(
        qmin in 0u8..=127,
        width in 1u8..=128,
        k in 1usize..24,
        seed in any::<u64>(),
    ) {
        let v = variant(0);
        let result = GemmMicrokernelTester::for_variant(&v)
            .m(v.mr)
            .n(v.nr)
            .k(k)
            .qmin(qmin)
            .qmax(qmin + width)
            .iterations(1)
            .seed(seed)
            .try_test_variant(&v);
        prop_assert!(result.is_ok(), "{}", result.unwrap_err());
    }
}
