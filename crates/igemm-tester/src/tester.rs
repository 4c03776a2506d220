//! Randomized correctness oracle for QU8 IGEMM microkernels.
//!
//! [`GemmMicrokernelTester`] describes one problem (`m x n x k` over `ks`
//! taps, run through an `mr x nr` kernel) and checks a kernel against a
//! scalar reference on freshly generated operands. [`Qu8IgemmProblem`] is the
//! operand set of a single iteration; it is public so property tests and
//! benchmarks can drive kernels through exactly the same setup.

use igemm_common::{HarnessConfig, IgemmError, Result, ValidationError, divide_round_up};
use igemm_kernels::params::{Qu8ConvMinmaxParams, Qu8InitParamsFn, Qu8QuantizationArgs};
use igemm_kernels::{
    IndirectA, IndirectRow, PackingParams, Qu8IgemmUkernelFn, Qu8IgemmVariant, Qu8RequantizeFn,
    output_len, pack_qu8_conv_goki_w, packed_weights_size,
};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::fmt;

/// Fill byte for the arena prefix, the junk row and the output buffer.
pub const FILL_BYTE: u8 = 0xA5;

/// Builder and runner for one kernel test case.
#[derive(Debug, Clone)]
pub struct GemmMicrokernelTester {
    mr: usize,
    nr: usize,
    kr: usize,
    sr: usize,
    m: usize,
    n: usize,
    k: usize,
    ks: usize,
    a_offset: usize,
    zero_index: Option<usize>,
    cm_stride: Option<usize>,
    cn_stride: Option<usize>,
    a_zero_point: u8,
    b_zero_point: u8,
    qmin: u8,
    qmax: u8,
    iterations: usize,
    seed: Option<u64>,
    config: HarnessConfig,
}

impl Default for GemmMicrokernelTester {
    fn default() -> Self {
        Self {
            mr: 1,
            nr: 1,
            kr: 1,
            sr: 1,
            m: 1,
            n: 1,
            k: 1,
            ks: 1,
            a_offset: 0,
            zero_index: None,
            cm_stride: None,
            cn_stride: None,
            a_zero_point: 127,
            b_zero_point: 127,
            qmin: 0,
            qmax: 255,
            iterations: 15,
            seed: None,
            config: HarnessConfig::default(),
        }
    }
}

macro_rules! setters {
    ($($(#[$doc:meta])* $name:ident: $ty:ty;)*) => {
        $(
            $(#[$doc])*
            pub fn $name(mut self, $name: $ty) -> Self {
                self.$name = $name;
                self
            }
        )*
    };
}

impl GemmMicrokernelTester {
    /// Tester with default shape and the harness configuration read from the
    /// environment.
    pub fn new() -> Self {
        Self { config: HarnessConfig::from_env(), ..Self::default() }
    }

    /// Tester preset to the tile of `variant`.
    pub fn for_variant(variant: &Qu8IgemmVariant) -> Self {
        Self::new().mr(variant.mr).nr(variant.nr).kr(variant.kr).sr(variant.sr)
    }

    setters! {
        mr: usize;
        nr: usize;
        kr: usize;
        sr: usize;
        m: usize;
        n: usize;
        k: usize;
        ks: usize;
        /// Byte offset the kernel adds to every non-zero indirection row.
        a_offset: usize;
        a_zero_point: u8;
        b_zero_point: u8;
        qmin: u8;
        qmax: u8;
        iterations: usize;
        /// Replace the environment-derived configuration.
        config: HarnessConfig;
    }

    /// Row whose indirection entry is replaced by the zero buffer for every tap.
    pub fn zero_index(mut self, zero_index: usize) -> Self {
        self.zero_index = Some(zero_index);
        self
    }

    pub fn cm_stride(mut self, cm_stride: usize) -> Self {
        self.cm_stride = Some(cm_stride);
        self
    }

    pub fn cn_stride(mut self, cn_stride: usize) -> Self {
        self.cn_stride = Some(cn_stride);
        self
    }

    /// Fixed PRNG seed; takes precedence over `IGEMM_TEST_SEED`.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn effective_cn_stride(&self) -> usize {
        self.cn_stride.unwrap_or(self.nr)
    }

    fn effective_cm_stride(&self) -> usize {
        self.cm_stride.unwrap_or_else(|| self.effective_cn_stride() * divide_round_up(self.n, self.nr))
    }

    fn effective_iterations(&self) -> usize {
        self.config.iterations.unwrap_or(self.iterations)
    }

    fn validate(&self) -> Result<()> {
        let dims = [("mr", self.mr), ("nr", self.nr), ("kr", self.kr), ("sr", self.sr)];
        let problem = [("m", self.m), ("n", self.n), ("k", self.k), ("ks", self.ks)];
        if let Some((name, _)) = dims.iter().chain(&problem).find(|(_, v)| *v == 0) {
            return Err(IgemmError::Config(format!("{name} must be positive")));
        }
        if self.m > self.mr {
            return Err(IgemmError::Config(format!("m = {} exceeds mr = {}", self.m, self.mr)));
        }
        if let Some(zero_index) = self.zero_index
            && zero_index >= self.mr
        {
            return Err(IgemmError::Config(format!("zero index {zero_index} outside mr = {}", self.mr)));
        }
        let cn_stride = self.effective_cn_stride();
        if cn_stride < self.nr {
            return Err(IgemmError::Config(format!("cn_stride = {cn_stride} is smaller than nr = {}", self.nr)));
        }
        let row_extent = output_len(1, self.n, self.nr, 0, cn_stride);
        if self.m > 1 && self.effective_cm_stride() < row_extent {
            return Err(IgemmError::Config(format!(
                "cm_stride = {} overlaps rows spanning {row_extent} bytes",
                self.effective_cm_stride()
            )));
        }
        if self.qmin > self.qmax {
            return Err(IgemmError::Config(format!("qmin {} > qmax {}", self.qmin, self.qmax)));
        }
        Ok(())
    }

    fn resolve_seed(&self) -> u64 {
        self.seed.or(self.config.seed).unwrap_or_else(|| rand::rng().random())
    }

    /// Run every iteration and report the first disagreement.
    pub fn try_test(
        &self,
        ukernel: Qu8IgemmUkernelFn,
        init_params: Qu8InitParamsFn,
        requantize: Qu8RequantizeFn,
    ) -> Result<()> {
        self.validate()?;
        let seed = self.resolve_seed();
        log::debug!("testing {self} with seed {seed}");
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        for iteration in 0..self.effective_iterations() {
            let problem = Qu8IgemmProblem::generate(self, &mut rng)?;
            let (scale, output_zero_point) = problem.output_quantization();
            log::trace!(
                "iteration {iteration}: scale {scale}, output zero point {output_zero_point}"
            );
            let params = init_params(&Qu8QuantizationArgs {
                kernel_zero_point: self.b_zero_point,
                scale,
                output_zero_point,
                output_min: self.qmin,
                output_max: self.qmax,
            })?;

            let mut c = vec![FILL_BYTE; problem.output_len()];
            problem.run(ukernel, &params, &mut c)?;

            let context = || {
                format!(
                    "Mr x Nr x Kr = {} x {} x {}, M x N x K = {} x {} x {}, ks = {}, \
                     requantization scale = {scale}, output zero point = {output_zero_point}, \
                     seed = {seed}, iteration = {iteration}",
                    self.mr, self.nr, self.kr, self.m, self.n, self.k, self.ks
                )
            };
            for i in 0..self.m {
                for j in 0..self.n {
                    let actual = c[problem.output_index(i, j)];
                    if actual < self.qmin || actual > self.qmax {
                        return Err(ValidationError::OutOfRange {
                            row: i,
                            col: j,
                            value: actual,
                            min: self.qmin,
                            max: self.qmax,
                            context: context(),
                        }
                        .into());
                    }
                    let accumulator = problem.accumulators[i * self.n + j];
                    let expected = requantize(accumulator, scale, output_zero_point, self.qmin, self.qmax);
                    if actual != expected {
                        return Err(ValidationError::Mismatch {
                            row: i,
                            col: j,
                            expected,
                            actual,
                            accumulator,
                            context: context(),
                        }
                        .into());
                    }
                }
            }
        }
        Ok(())
    }

    /// [`try_test`](Self::try_test) with assertion semantics.
    ///
    /// # Panics
    ///
    /// Panics with the error message on any failure.
    pub fn test(&self, ukernel: Qu8IgemmUkernelFn, init_params: Qu8InitParamsFn, requantize: Qu8RequantizeFn) {
        if let Err(err) = self.try_test(ukernel, init_params, requantize) {
            panic!("{err}");
        }
    }

    pub fn try_test_variant(&self, variant: &Qu8IgemmVariant) -> Result<()> {
        self.try_test(variant.ukernel, variant.init_params, variant.requantize())
    }

    /// # Panics
    ///
    /// Panics with the error message on any failure.
    pub fn test_variant(&self, variant: &Qu8IgemmVariant) {
        self.test(variant.ukernel, variant.init_params, variant.requantize());
    }
}

impl fmt::Display for GemmMicrokernelTester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}c{}s{} m={} n={} k={} ks={} a_offset={} cm_stride={} cn_stride={} zp={}/{} q=[{}, {}]",
            self.mr,
            self.nr,
            self.kr,
            self.sr,
            self.m,
            self.n,
            self.k,
            self.ks,
            self.a_offset,
            self.effective_cm_stride(),
            self.effective_cn_stride(),
            self.a_zero_point,
            self.b_zero_point,
            self.qmin,
            self.qmax
        )?;
        if let Some(zero_index) = self.zero_index {
            write!(f, " zero_index={zero_index}")?;
        }
        Ok(())
    }
}

/// Operands, packed weights and reference accumulators of one iteration.
#[derive(Debug, Clone)]
pub struct Qu8IgemmProblem {
    pub mr: usize,
    pub nr: usize,
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub ks: usize,
    pub a_offset: usize,
    pub cm_stride: usize,
    pub cn_stride: usize,
    /// `[a_offset fill bytes][mr rows of k bytes][junk row]`.
    pub input: Vec<u8>,
    /// Padding row, filled with the activation zero point.
    pub zero: Vec<u8>,
    /// `ks * mr` entries, tap-major.
    pub rows: Vec<IndirectRow>,
    /// GOKI weights, `[n][ks][k]`.
    pub weights: Vec<u8>,
    pub bias: Vec<i32>,
    pub packed: Vec<u8>,
    /// Reference accumulators, `[m][n]`.
    pub accumulators: Vec<i32>,
}

impl Qu8IgemmProblem {
    /// Draw fresh operands for `tester` from `rng`.
    pub fn generate(tester: &GemmMicrokernelTester, rng: &mut ChaCha8Rng) -> Result<Self> {
        tester.validate()?;
        let GemmMicrokernelTester { mr, nr, kr, sr, m, n, k, ks, a_offset, .. } = *tester;
        let (a_zero_point, b_zero_point) = (tester.a_zero_point, tester.b_zero_point);

        let activations = random_not_constant(rng, mr * k);
        let mut input = vec![FILL_BYTE; a_offset];
        input.extend_from_slice(&activations);
        input.resize(a_offset + (mr + 1) * k, FILL_BYTE);
        let zero = vec![a_zero_point; k];

        let junk = IndirectRow::Input(mr * k);
        let mut rows: Vec<IndirectRow> = (0..ks * mr).map(|i| IndirectRow::Input((i % mr) * k)).collect();
        rows.shuffle(rng);
        for tap in 0..ks {
            if let Some(zero_index) = tester.zero_index {
                rows[tap * mr + zero_index] = IndirectRow::Zero;
            }
            for row in &mut rows[tap * mr + m..(tap + 1) * mr] {
                *row = junk;
            }
        }

        let weights = random_not_constant(rng, n * ks * k);
        let bias: Vec<i32> = (0..n).map(|_| rng.random_range(-10_000..=10_000)).collect();

        let mut packed = vec![b_zero_point; packed_weights_size(n, ks, k, nr, kr, sr)];
        let packing = PackingParams { input_zero_point: a_zero_point, kernel_zero_point: b_zero_point };
        pack_qu8_conv_goki_w(n, ks, k, nr, kr, sr, &weights, Some(&bias), &mut packed, &packing)?;

        let mut accumulators = vec![0i32; m * n];
        for i in 0..m {
            for j in 0..n {
                let mut acc = bias[j];
                for tap in 0..ks {
                    let row = match rows[tap * mr + i] {
                        IndirectRow::Input(position) => Some(position + a_offset),
                        IndirectRow::Zero => None,
                    };
                    let b = &weights[(j * ks + tap) * k..(j * ks + tap + 1) * k];
                    for (kk, &wv) in b.iter().enumerate() {
                        let av = row.map_or(a_zero_point, |start| input[start + kk]);
                        let term = (i32::from(av) - i32::from(a_zero_point)) * (i32::from(wv) - i32::from(b_zero_point));
                        acc = acc.wrapping_add(term);
                    }
                }
                accumulators[i * n + j] = acc;
            }
        }

        Ok(Self {
            mr,
            nr,
            m,
            n,
            k,
            ks,
            a_offset,
            cm_stride: tester.effective_cm_stride(),
            cn_stride: tester.effective_cn_stride(),
            input,
            zero,
            rows,
            weights,
            bias,
            packed,
            accumulators,
        })
    }

    /// Requantization scale and output zero point that spread the
    /// accumulator range over the full `u8` range.
    pub fn output_quantization(&self) -> (f32, u8) {
        let min = self.accumulators.iter().copied().min().unwrap_or(0);
        let max = self.accumulators.iter().copied().max().unwrap_or(0);
        let range = (i64::from(max) - i64::from(min)) as f64;
        let c_scale = if range >= 256.0 { range / 255.0 } else { 1.00001 };
        let zero_point = (127.5 - 0.5 * (i64::from(min) + i64::from(max)) as f64 / c_scale)
            .round_ties_even()
            .clamp(0.0, 255.0) as u8;
        (1.0 / c_scale as f32, zero_point)
    }

    pub fn indirect_a(&self) -> IndirectA<'_> {
        IndirectA::new(&self.rows, &self.input, &self.zero, self.a_offset)
    }

    /// Bytes the output buffer must hold.
    pub fn output_len(&self) -> usize {
        output_len(self.m, self.n, self.nr, self.cm_stride, self.cn_stride)
    }

    /// Position of element `(i, j)` in the strided output.
    pub fn output_index(&self, i: usize, j: usize) -> usize {
        i * self.cm_stride + (j / self.nr) * self.cn_stride + j % self.nr
    }

    /// Invoke `ukernel` on this problem.
    pub fn run(&self, ukernel: Qu8IgemmUkernelFn, params: &Qu8ConvMinmaxParams, c: &mut [u8]) -> Result<()> {
        ukernel(self.m, self.n, self.k, self.ks, &self.indirect_a(), &self.packed, c, self.cm_stride, self.cn_stride, params)
    }
}

/// `len` random bytes, redrawn while every byte is equal.
fn random_not_constant(rng: &mut ChaCha8Rng, len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    loop {
        rng.fill(bytes.as_mut_slice());
        if len <= 1 || bytes.iter().any(|&b| b != bytes[0]) {
            return bytes;
        }
    }
}
