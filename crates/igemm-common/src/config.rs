//! Harness configuration read from environment variables.
//!
//! | variable | effect |
//! |----------|--------|
//! | `IGEMM_TEST_SEED` | fixed PRNG seed for operand generation |
//! | `IGEMM_TEST_ITERATIONS` | overrides the iteration count of every tester |
//! | `IGEMM_FORCE_SCALAR` | `1`/`true`: report no SIMD support, run portable kernels only |

use std::env;

pub const SEED_ENV: &str = "IGEMM_TEST_SEED";
pub const ITERATIONS_ENV: &str = "IGEMM_TEST_ITERATIONS";
pub const FORCE_SCALAR_ENV: &str = "IGEMM_FORCE_SCALAR";

/// Environment-derived knobs for the conformance harness.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Seed for the operand PRNG; `None` draws one from OS entropy.
    pub seed: Option<u64>,
    /// Iteration count applied to every tester instead of its own.
    pub iterations: Option<usize>,
    /// Hide every SIMD capability from the probe.
    pub force_scalar: bool,
}

impl HarnessConfig {
    /// Read the configuration from the process environment.
    ///
    /// Malformed values are ignored with a warning rather than rejected, so a
    /// stray variable never turns a test run into a configuration failure.
    pub fn from_env() -> Self {
        let seed = parse_var::<u64>(SEED_ENV);
        let iterations = parse_var::<usize>(ITERATIONS_ENV).filter(|&n| {
            if n == 0 {
                log::warn!("{ITERATIONS_ENV}=0 ignored: at least one iteration is required");
            }
            n > 0
        });
        Self { seed, iterations, force_scalar: force_scalar_from_env() }
    }

    /// Overlay explicit values (for example CLI flags) on top of this config.
    pub fn with_overrides(mut self, seed: Option<u64>, iterations: Option<usize>) -> Self {
        if seed.is_some() {
            self.seed = seed;
        }
        if iterations.is_some() {
            self.iterations = iterations;
        }
        self
    }
}

/// Read only `IGEMM_FORCE_SCALAR`; capability probes call this on every check.
pub fn force_scalar_from_env() -> bool {
    env::var(FORCE_SCALAR_ENV).is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("ignoring {name}={raw:?}: not a valid value");
            None
        }
    }
}
