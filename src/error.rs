//! Error type shared by the test bench, the triggers and the simulation kernel.

use std::io;

use crate::value::Val;

/// Result of a test, a forked task or any fallible bench operation.
pub type TbResult<T = Val> = Result<T, TbError>;

/// Everything that can go wrong while building or running a test bench.
#[derive(Debug, thiserror::Error)]
pub enum TbError {
    /// A check inside a test did not hold.
    #[error("assertion failed: {0}")]
    Assertion(String),

    /// No simulation object with this full name exists.
    #[error("no simulation object named '{0}'")]
    ObjectNotFound(String),

    /// No simulation object with this handle exists.
    #[error("no simulation object with handle {0}")]
    InvalidHandle(usize),

    /// The object is an output port or a module and cannot be deposited to.
    #[error("object '{0}' is not writable")]
    NotWritable(String),

    /// The object holds X or Z and was read as an integer.
    #[error("object '{name}' holds unresolved value '{value}'")]
    Unresolved { name: String, value: char },

    #[error("invalid logic value: {0}")]
    InvalidValue(String),

    #[error("unknown time unit '{0}'")]
    InvalidTimeUnit(String),

    /// The requested time cannot be expressed in whole simulator steps.
    #[error("can't convert {time} {unit} to simulation steps without rounding (precision: {precision})")]
    TimeRounding {
        time: f64,
        unit: String,
        precision: String,
    },

    /// The testbench wrote a signal while the simulator was in its read-only phase.
    #[error("write to '{0}' during the read-only phase")]
    ReadOnlyWrite(String),

    #[error("callback {0} is not registered")]
    UnknownCallback(usize),

    /// A simulator operation was requested on a thread with no attached simulator.
    #[error("no simulator attached to this thread")]
    NoSimulator,

    /// The awaited task was cancelled before it produced a result.
    #[error("task was cancelled")]
    Cancelled,

    #[error("invalid clock: {0}")]
    InvalidClock(String),

    #[error("invalid device: {0}")]
    InvalidDevice(String),

    /// Too many delta cycles at one time step, usually a combinational loop.
    #[error("delta cycle limit exceeded at step {step} (max {max_deltas} deltas)")]
    DeltaLimit { step: u64, max_deltas: u32 },

    #[error("simulation time limit exceeded: {limit} steps")]
    TimeLimitExceeded { limit: u64 },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("could not write results report: {0}")]
    Report(String),
}

/// Ends the current test as failed unless `cond` holds.
#[macro_export]
macro_rules! check {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::TbError::Assertion(format!($($arg)+)));
        }
    };
}

/// Ends the current test as failed unless both values compare equal.
/// The message is extended with the observed and expected values.
#[macro_export]
macro_rules! check_eq {
    ($observed:expr, $expected:expr, $($arg:tt)+) => {
        match (&$observed, &$expected) {
            (observed, expected) => {
                if observed != expected {
                    return Err($crate::TbError::Assertion(format!(
                        "{}: observed {}, expected {}",
                        format!($($arg)+),
                        observed,
                        expected
                    )));
                }
            }
        }
    };
}
