use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use regbench::dff_test::{test_dff, test_dff_readback};
use regbench::prelude::*;
use regbench::Report;

/// Run the one-bit register testbench on the built-in simulator.
#[derive(Parser, Debug)]
#[command(name = "regbench", version, about)]
struct Cli {
    /// Seed for the random stimulus [env: RANDOM_SEED, default: wall clock]
    #[arg(long)]
    seed: Option<u64>,

    /// Run only the named test (repeatable) [env: TESTCASE]
    #[arg(long = "testcase")]
    testcase: Vec<String>,

    /// JUnit XML results file [env: RESULTS_FILE]
    #[arg(long)]
    results: Option<PathBuf>,

    /// Dump a VCD waveform of the run to this file [env: WAVE_FILE]
    #[arg(long)]
    wave: Option<PathBuf>,

    /// Register stages of the simulated device; 1 is a plain flip-flop
    #[arg(long, default_value_t = 1)]
    latency: usize,

    /// Duration of one simulation step (fs, ps, ns, us, ms, sec)
    #[arg(long, default_value = "ns")]
    precision: String,

    /// Abort when simulation time passes this many nanoseconds [env: SIM_TIME_LIMIT_NS]
    #[arg(long)]
    time_limit_ns: Option<u64>,
}

fn run(cli: Cli) -> TbResult<Report> {
    let mut config = Config::from_env()?;
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }
    if !cli.testcase.is_empty() {
        config.testcase = Some(cli.testcase);
    }
    if cli.results.is_some() {
        config.results_file = cli.results;
    }
    if cli.wave.is_some() {
        config.wave_file = cli.wave;
    }
    if cli.time_limit_ns.is_some() {
        config.time_limit_ns = cli.time_limit_ns;
    }

    let precision: TimeUnit = cli.precision.parse()?;
    let kernel = if cli.latency == 1 {
        Kernel::new(Dff::default())?
    } else {
        Kernel::new(ShiftRegister::new("dff", cli.latency)?)?
    }
    .with_precision(precision);

    run_tests(kernel, tests![test_dff, test_dff_readback], &config)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Cli::parse()) {
        Ok(report) if report.passed() => ExitCode::SUCCESS,
        Ok(report) => {
            log::error!(
                "{} test(s) failed, rerun with --seed {}",
                report.failures().count(),
                report.seed
            );
            ExitCode::FAILURE
        }
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_files_are_opt_in() {
        let cli = Cli::parse_from(["regbench"]);
        assert!(cli.results.is_none());
        assert!(cli.wave.is_none());
        assert_eq!(cli.latency, 1);
        assert_eq!(cli.precision, "ns");
    }

    #[test]
    fn output_paths_are_taken_from_flags() {
        let cli = Cli::parse_from([
            "regbench",
            "--results",
            "out/results.xml",
            "--wave",
            "out/dff.vcd",
            "--testcase",
            "test_dff",
            "--testcase",
            "test_dff_readback",
        ]);
        assert_eq!(cli.results, Some(PathBuf::from("out/results.xml")));
        assert_eq!(cli.wave, Some(PathBuf::from("out/dff.vcd")));
        assert_eq!(cli.testcase, ["test_dff", "test_dff_readback"]);
    }
}
