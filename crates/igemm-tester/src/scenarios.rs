//! The scenario catalogue every kernel variant is run through.
//!
//! Each [`Scenario`] expands into a list of tester configurations derived
//! from the variant's tile and reduction block (`KB`). The shared reduction
//! sweep `k = 1, KB + 2, 2 * KB + 3, ...` up to `5 * KB` appears in most of
//! them; scenarios suffixed `_subtile` also sweep `m <= MR` and/or `n <= NR`
//! with a single iteration per configuration.

use crate::tester::GemmMicrokernelTester;
use igemm_common::{HarnessConfig, Result, next_prime};
use igemm_kernels::Qu8IgemmVariant;
use std::fmt;

/// One generated test case per variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scenario {
    KEq,
    StridedCn,
    KEqSubtile,
    KEqSubtileM,
    KEqSubtileN,
    KLt,
    KLtSubtile,
    KGt,
    KGtSubtile,
    KDiv,
    KDivSubtile,
    NGt,
    NGtStridedCn,
    NGtSubtile,
    NDiv,
    NDivStridedCn,
    NDivSubtile,
    SmallKernel,
    SmallKernelSubtile,
    NGtSmallKernel,
    NDivSmallKernel,
    StridedCmSubtile,
    AOffset,
    Zero,
    Qmin,
    Qmax,
    StridedCm,
    NoAZeroPoint,
    NoBZeroPoint,
    NoZeroPoint,
}

impl Scenario {
    pub const ALL: [Scenario; 30] = [
        Scenario::KEq,
        Scenario::StridedCn,
        Scenario::KEqSubtile,
        Scenario::KEqSubtileM,
        Scenario::KEqSubtileN,
        Scenario::KLt,
        Scenario::KLtSubtile,
        Scenario::KGt,
        Scenario::KGtSubtile,
        Scenario::KDiv,
        Scenario::KDivSubtile,
        Scenario::NGt,
        Scenario::NGtStridedCn,
        Scenario::NGtSubtile,
        Scenario::NDiv,
        Scenario::NDivStridedCn,
        Scenario::NDivSubtile,
        Scenario::SmallKernel,
        Scenario::SmallKernelSubtile,
        Scenario::NGtSmallKernel,
        Scenario::NDivSmallKernel,
        Scenario::StridedCmSubtile,
        Scenario::AOffset,
        Scenario::Zero,
        Scenario::Qmin,
        Scenario::Qmax,
        Scenario::StridedCm,
        Scenario::NoAZeroPoint,
        Scenario::NoBZeroPoint,
        Scenario::NoZeroPoint,
    ];

    /// Plain scenario name, as used for test functions and CLI filters.
    pub fn key(self) -> &'static str {
        match self {
            Scenario::KEq => "k_eq",
            Scenario::StridedCn => "strided_cn",
            Scenario::KEqSubtile => "k_eq_subtile",
            Scenario::KEqSubtileM => "k_eq_subtile_m",
            Scenario::KEqSubtileN => "k_eq_subtile_n",
            Scenario::KLt => "k_lt",
            Scenario::KLtSubtile => "k_lt_subtile",
            Scenario::KGt => "k_gt",
            Scenario::KGtSubtile => "k_gt_subtile",
            Scenario::KDiv => "k_div",
            Scenario::KDivSubtile => "k_div_subtile",
            Scenario::NGt => "n_gt",
            Scenario::NGtStridedCn => "n_gt_strided_cn",
            Scenario::NGtSubtile => "n_gt_subtile",
            Scenario::NDiv => "n_div",
            Scenario::NDivStridedCn => "n_div_strided_cn",
            Scenario::NDivSubtile => "n_div_subtile",
            Scenario::SmallKernel => "small_kernel",
            Scenario::SmallKernelSubtile => "small_kernel_subtile",
            Scenario::NGtSmallKernel => "n_gt_small_kernel",
            Scenario::NDivSmallKernel => "n_div_small_kernel",
            Scenario::StridedCmSubtile => "strided_cm_subtile",
            Scenario::AOffset => "a_offset",
            Scenario::Zero => "zero",
            Scenario::Qmin => "qmin",
            Scenario::Qmax => "qmax",
            Scenario::StridedCm => "strided_cm",
            Scenario::NoAZeroPoint => "no_a_zero_point",
            Scenario::NoBZeroPoint => "no_b_zero_point",
            Scenario::NoZeroPoint => "no_zero_point",
        }
    }

    pub fn from_key(key: &str) -> Option<Scenario> {
        Self::ALL.into_iter().find(|s| s.key() == key)
    }

    /// Reported test name: `<variant>.<scenario>` with the reduction block or
    /// tile width spliced in, e.g. `...__scalar_lrintf.k_eq_8_subtile_m`.
    pub fn test_name(self, variant: &Qu8IgemmVariant) -> String {
        let key = self.key();
        let numbered = [
            ("k_eq", variant.k_block),
            ("k_lt", variant.k_block),
            ("k_gt", variant.k_block),
            ("k_div", variant.k_block),
            ("n_gt", variant.nr),
            ("n_div", variant.nr),
        ];
        for (prefix, number) in numbered {
            if let Some(rest) = key.strip_prefix(prefix) {
                return format!("{}.{prefix}_{number}{rest}", variant.name);
            }
        }
        format!("{}.{key}", variant.name)
    }

    /// Tester configurations this scenario expands to for `variant`.
    pub fn testers(self, variant: &Qu8IgemmVariant) -> Vec<GemmMicrokernelTester> {
        let (mr, nr, kb) = (variant.mr, variant.nr, variant.k_block);
        let base = || GemmMicrokernelTester::for_variant(variant).m(mr).n(nr);
        let grid = |ns: &[usize], ks: &[usize], ms: &[usize]| -> Vec<GemmMicrokernelTester> {
            let mut out = Vec::with_capacity(ns.len() * ks.len() * ms.len());
            for &n in ns {
                for &k in ks {
                    for &m in ms {
                        out.push(base().m(m).n(n).k(k));
                    }
                }
            }
            out
        };
        let once = |testers: Vec<GemmMicrokernelTester>| -> Vec<GemmMicrokernelTester> {
            testers.into_iter().map(|t| t.iterations(1)).collect()
        };

        let k_sweep: Vec<usize> = (1..=5 * kb).step_by(kb + 1).collect();
        let k_lt: Vec<usize> = (1..kb).collect();
        let k_gt: Vec<usize> = (kb + 1..if kb == 1 { 10 } else { 2 * kb }).collect();
        let k_div: Vec<usize> = if kb > 1 { (2 * kb..=10 * kb).step_by(kb).collect() } else { Vec::new() };
        let n_gt: Vec<usize> = (nr + 1..if nr == 1 { 10 } else { 2 * nr }).collect();
        let n_div: Vec<usize> = (2 * nr..=3 * nr).step_by(nr).collect();
        let all_m: Vec<usize> = (1..=mr).collect();
        let all_n: Vec<usize> = (1..=nr).collect();
        let strided = next_prime(nr + 1);
        let a_offset = next_prime(mr * kb * 5 + 1);

        let with = |testers: Vec<GemmMicrokernelTester>, f: fn(GemmMicrokernelTester, usize) -> GemmMicrokernelTester, v: usize| {
            testers.into_iter().map(|t| f(t, v)).collect::<Vec<_>>()
        };

        match self {
            Scenario::KEq => grid(&[nr], &[kb], &[mr]),
            Scenario::StridedCn => with(grid(&[nr], &[kb], &[mr]), GemmMicrokernelTester::cn_stride, strided),
            Scenario::KEqSubtile => once(grid(&all_n, &[kb], &all_m)),
            Scenario::KEqSubtileM => once(grid(&[nr], &[kb], &all_m)),
            Scenario::KEqSubtileN => once(grid(&all_n, &[kb], &[mr])),
            Scenario::KLt => grid(&[nr], &k_lt, &[mr]),
            Scenario::KLtSubtile => once(grid(&all_n, &k_lt, &all_m)),
            Scenario::KGt => grid(&[nr], &k_gt, &[mr]),
            Scenario::KGtSubtile => once(grid(&all_n, &k_gt, &all_m)),
            Scenario::KDiv => grid(&[nr], &k_div, &[mr]),
            Scenario::KDivSubtile => once(grid(&all_n, &k_div, &all_m)),
            Scenario::NGt => grid(&n_gt, &k_sweep, &[mr]),
            Scenario::NGtStridedCn => with(grid(&n_gt, &k_sweep, &[mr]), GemmMicrokernelTester::cn_stride, strided),
            Scenario::NGtSubtile => once(grid(&n_gt, &k_sweep, &all_m)),
            Scenario::NDiv => grid(&n_div, &k_sweep, &[mr]),
            Scenario::NDivStridedCn => with(grid(&n_div, &k_sweep, &[mr]), GemmMicrokernelTester::cn_stride, strided),
            Scenario::NDivSubtile => once(grid(&n_div, &k_sweep, &all_m)),
            Scenario::SmallKernel => with(grid(&[nr], &k_sweep, &[mr]), GemmMicrokernelTester::ks, 3),
            Scenario::SmallKernelSubtile => with(once(grid(&all_n, &k_sweep, &all_m)), GemmMicrokernelTester::ks, 3),
            Scenario::NGtSmallKernel => with(grid(&n_gt, &k_sweep, &[mr]), GemmMicrokernelTester::ks, 3),
            Scenario::NDivSmallKernel => with(grid(&n_div, &k_sweep, &[mr]), GemmMicrokernelTester::ks, 3),
            Scenario::StridedCmSubtile => {
                with(once(grid(&all_n, &k_sweep, &all_m)), GemmMicrokernelTester::cm_stride, strided)
            }
            Scenario::AOffset => {
                let testers = with(grid(&[nr], &k_sweep, &[mr]), GemmMicrokernelTester::ks, 3);
                with(testers, GemmMicrokernelTester::a_offset, a_offset)
            }
            Scenario::Zero => {
                let mut out = Vec::with_capacity(mr * k_sweep.len());
                for mz in 0..mr {
                    for tester in grid(&[nr], &k_sweep, &[mr]) {
                        out.push(tester.ks(3).a_offset(a_offset).zero_index(mz));
                    }
                }
                out
            }
            Scenario::Qmin => vec![base().k(kb).qmin(128)],
            Scenario::Qmax => vec![base().k(kb).qmax(128)],
            Scenario::StridedCm => with(grid(&[nr], &[kb], &[mr]), GemmMicrokernelTester::cm_stride, strided),
            Scenario::NoAZeroPoint => grid(&[nr], &k_sweep, &[mr]).into_iter().map(|t| t.a_zero_point(0)).collect(),
            Scenario::NoBZeroPoint => grid(&[nr], &k_sweep, &[mr]).into_iter().map(|t| t.b_zero_point(0)).collect(),
            Scenario::NoZeroPoint => grid(&[nr], &k_sweep, &[mr])
                .into_iter()
                .map(|t| t.a_zero_point(0).b_zero_point(0))
                .collect(),
        }
    }

    /// Run every configuration, stopping at the first failure.
    pub fn run(self, variant: &Qu8IgemmVariant) -> Result<()> {
        self.run_with(variant, &HarnessConfig::from_env())
    }

    /// [`run`](Self::run) with an explicit harness configuration.
    pub fn run_with(self, variant: &Qu8IgemmVariant, config: &HarnessConfig) -> Result<()> {
        let testers = self.testers(variant);
        log::debug!("{}: {} configurations", self.test_name(variant), testers.len());
        for tester in testers {
            tester.config(config.clone()).try_test_variant(variant)?;
        }
        Ok(())
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}
