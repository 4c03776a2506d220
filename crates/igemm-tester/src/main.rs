//! `igemm-conformance`: run the scenario catalogue against every registered
//! QU8 IGEMM kernel variant and report one line per test case.

use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use igemm_common::HarnessConfig;
use igemm_device_probe::capability_summary;
use igemm_kernels::UkernelRegistry;
use igemm_tester::{EXIT_FAILURES, EXIT_SUCCESS, Scenario};

/// Conformance runner for QU8 IGEMM microkernels
#[derive(Parser)]
#[command(name = "igemm-conformance")]
#[command(about = "Check QU8 IGEMM microkernels against the scalar reference")]
#[command(version)]
struct Cli {
    /// Only run variants whose name contains this substring
    #[arg(long, value_name = "SUBSTRING")]
    variant: Option<String>,

    /// Only run scenarios whose name contains this substring
    #[arg(long, value_name = "SUBSTRING")]
    scenario: Option<String>,

    /// PRNG seed (overrides IGEMM_TEST_SEED)
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,

    /// Iterations per configuration (overrides IGEMM_TEST_ITERATIONS)
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    iterations: Option<u64>,

    /// List registered variants and exit
    #[arg(long)]
    list: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", default_value = "warn")]
    log_level: String,
}

#[derive(Debug, Default)]
struct Summary {
    passed: usize,
    failed: usize,
    skipped: usize,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli.log_level)?;

    let registry = UkernelRegistry::global();
    let config = HarnessConfig::from_env();
    let preferred = registry.select_best().context("selecting a kernel variant")?;
    println!(
        "{} {}{} preferred={}",
        style("host").bold(),
        capability_summary(),
        if config.force_scalar { " (forced scalar)" } else { "" },
        preferred.name
    );

    if cli.list {
        let available = registry.list_available();
        for variant in registry.variants() {
            let status = if available.contains(&variant.name) {
                style("available").green()
            } else {
                style("unavailable").dim()
            };
            println!(
                "{:<60} {:>8} {}x{}c{}s{} {}",
                variant.name, variant.isa, variant.mr, variant.nr, variant.kr, variant.sr, status
            );
        }
        return Ok(());
    }

    let iterations = cli.iterations.map(usize::try_from).transpose().context("iteration count does not fit usize")?;
    let config = config.with_overrides(cli.seed, iterations);
    let scenarios: Vec<Scenario> = Scenario::ALL
        .into_iter()
        .filter(|s| cli.scenario.as_deref().is_none_or(|f| s.key().contains(f)))
        .collect();

    let mut summary = Summary::default();
    for variant in registry.variants() {
        if cli.variant.as_deref().is_some_and(|f| !variant.name.contains(f)) {
            continue;
        }
        let available = variant.is_available();
        if !available {
            log::warn!("skipping {}: {} not available", variant.name, variant.isa);
        }
        for &scenario in &scenarios {
            let name = scenario.test_name(variant);
            if !available {
                summary.skipped += 1;
                println!("{} {name}", style("SKIP").yellow());
                continue;
            }
            match scenario.run_with(variant, &config) {
                Ok(()) => {
                    summary.passed += 1;
                    println!("{} {name}", style("PASS").green());
                }
                Err(err) => {
                    summary.failed += 1;
                    println!("{} {name}: {err}", style("FAIL").red().bold());
                }
            }
        }
    }

    println!(
        "\n{} passed, {} failed, {} skipped",
        style(summary.passed).green(),
        style(summary.failed).red(),
        style(summary.skipped).yellow()
    );
    if summary.passed + summary.failed + summary.skipped == 0 {
        eprintln!("{}", style("no test cases matched the filters").yellow());
    }

    std::process::exit(if summary.failed == 0 { EXIT_SUCCESS } else { EXIT_FAILURES });
}

fn setup_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .with_context(|| format!("invalid log level: {level}"))?;

    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).compact().init();
    Ok(())
}
