use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{TbError, TbResult};

pub const ENV_SEED: &str = "RANDOM_SEED";
pub const ENV_TESTCASE: &str = "TESTCASE";
pub const ENV_RESULTS: &str = "RESULTS_FILE";
pub const ENV_TIME_LIMIT: &str = "SIM_TIME_LIMIT_NS";
pub const ENV_WAVE: &str = "WAVE_FILE";

/// Settings of a test run.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Seed of the bench's random generator, logged at start for replay.
    pub seed: u64,
    /// Run only these tests; all when `None`.
    pub testcase: Option<Vec<String>>,
    /// Where to write the JUnit XML report, if anywhere.
    pub results_file: Option<PathBuf>,
    pub time_limit_ns: Option<u64>,
    /// Where to dump a VCD waveform of the run, if anywhere.
    pub wave_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Config {
            seed,
            testcase: None,
            results_file: None,
            time_limit_ns: None,
            wave_file: None,
        }
    }
}

impl Config {
    pub fn from_env() -> TbResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any key lookup, `from_env` uses the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> TbResult<Self> {
        let mut config = Config::default();
        if let Some(seed) = lookup(ENV_SEED) {
            config.seed = parse(ENV_SEED, &seed)?;
        }
        if let Some(tests) = lookup(ENV_TESTCASE) {
            let names: Vec<String> = tests
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
            if !names.is_empty() {
                config.testcase = Some(names);
            }
        }
        if let Some(path) = lookup(ENV_RESULTS) {
            if !path.is_empty() {
                config.results_file = Some(PathBuf::from(path));
            }
        }
        if let Some(limit) = lookup(ENV_TIME_LIMIT) {
            config.time_limit_ns = Some(parse(ENV_TIME_LIMIT, &limit)?);
        }
        if let Some(path) = lookup(ENV_WAVE) {
            if !path.is_empty() {
                config.wave_file = Some(PathBuf::from(path));
            }
        }
        Ok(config)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn selects(&self, name: &str) -> bool {
        match &self.testcase {
            Some(names) => names.iter().any(|n| n == name),
            None => true,
        }
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> TbResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| TbError::Config(format!("{}='{}' is not a valid number", key, value)))
}
