mod clock;
pub mod config;
pub mod device;
mod error;
pub mod executor;
mod junit;
pub mod kernel;
pub mod prelude;
mod report;
mod signal;
pub mod sim_if;
pub mod test;
pub mod trigger;
pub mod utils;
mod value;
mod wave;

pub use clock::Clock;
pub use config::Config;
pub use error::{TbError, TbResult};
pub use kernel::Kernel;
pub use report::Report;
pub use signal::SimObject;
pub use value::{Logic, Val};

use executor::Task;
use sim_if::{SimIf, TimeUnit, SIM_IF};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time;
use test::{Outcome, TestCase, TestRecord};

struct CurrentTest {
    index: usize,
    task: Arc<Task>,
    started: time::Instant,
    sim_start_ns: f64,
}

#[derive(Default)]
struct RunState {
    records: Vec<TestRecord>,
    current: Option<CurrentTest>,
}

thread_local! {
    static RUN: RefCell<RunState> = RefCell::new(RunState::default());
}

/// Passes the running test, unless it already passed or failed.
pub fn pass_test(msg: &str) {
    finish_test(Outcome::Passed(msg.to_string()));
}

/// Fails the running test, unless it already passed or failed.
pub fn fail_test(msg: &str) {
    finish_test(Outcome::Failed(msg.to_string()));
}

fn finish_test(outcome: Outcome) {
    let Some(current) = RUN.with(|r| r.borrow_mut().current.take()) else {
        return;
    };
    let sim_now_ns = SIM_IF
        .get()
        .map(|s| s.get_sim_time(TimeUnit::Ns))
        .unwrap_or(current.sim_start_ns);
    RUN.with(|r| {
        let mut r = r.borrow_mut();
        if let Some(record) = r.records.get_mut(current.index) {
            SIM_IF.log(&format!(
                "{} {}",
                record.name,
                if outcome.passed() { "passed" } else { "failed" }
            ));
            record.outcome = outcome;
            record.time_secs = current.started.elapsed().as_secs_f64();
            record.sim_time_ns = sim_now_ns - current.sim_start_ns;
        }
    });
    tear_down_test(&current.task);
}

fn tear_down_test(test: &Arc<Task>) {
    trigger::cancel_all_triggers();
    executor::clear_ready_queue();
    test.cancel();
}

/// Chains all tests at simulation start. Each waits for the previous one, so
/// they run in order on the same simulator.
fn start_of_simulation(tests: Vec<TestCase>) -> TbResult<()> {
    let sim_root = SimObject::get_root()?;

    let mut join_handle = None;
    for (index, test) in tests.into_iter().enumerate() {
        let previous = join_handle.take();
        join_handle = Some(Task::spawn_from_future(
            async move {
                // await previous test, if there is one
                if let Some(handle) = previous {
                    let _ = handle.await;
                }
                // spawn next test
                let generator = test.generator;
                let test_handle = Task::spawn_from_future(
                    async move {
                        let result = (generator)(sim_root).await;
                        match result {
                            Ok(val) => finish_test(Outcome::Passed(match val {
                                Val::String(s) => s,
                                Val::None => String::new(),
                            })),
                            Err(e) => finish_test(Outcome::Failed(e.to_string())),
                        }
                        Ok(Val::None)
                    },
                    &test.name,
                );
                if let Some(task) = test_handle.get_task() {
                    let current = CurrentTest {
                        index,
                        task: task.clone(),
                        started: time::Instant::now(),
                        sim_start_ns: SIM_IF.get()?.get_sim_time(TimeUnit::Ns),
                    };
                    RUN.with(|r| r.borrow_mut().current.replace(current));
                }
                SIM_IF.log(&format!("Running {}", test.name));
                // await test execution, cancelled tests resolve with an error
                let _ = test_handle.await;
                Ok(Val::None)
            },
            "test chain",
        ));
    }

    // execute everything scheduled for time zero
    executor::run_once();
    Ok(())
}

fn end_of_simulation(seed: u64, started: time::Instant) -> TbResult<Report> {
    let sim_time_ns = SIM_IF.get()?.get_sim_time(TimeUnit::Ns);
    let records = RUN.with(|r| std::mem::take(&mut r.borrow_mut().records));
    let report = Report {
        records,
        sim_time_ns,
        real_time_secs: started.elapsed().as_secs_f64(),
        seed,
    };
    report.log_summary();
    Ok(report)
}

fn reset_thread_state() {
    trigger::cancel_all_triggers();
    executor::clear_ready_queue();
    RUN.with(|r| *r.borrow_mut() = RunState::default());
}

/// Detaches the kernel and clears bench state when a run ends, even on error.
struct Attached;

impl Drop for Attached {
    fn drop(&mut self) {
        reset_thread_state();
        SIM_IF.detach();
    }
}

/// Runs `tests` in order on `kernel` and reports their results.
///
/// Tests never started (the simulation ended first) are reported as failed.
/// Kernel errors abort the run and are returned unchanged.
pub fn run_tests(kernel: Kernel, tests: Vec<TestCase>, config: &Config) -> TbResult<Report> {
    let started = time::Instant::now();
    let tests: Vec<TestCase> = tests.into_iter().filter(|t| config.selects(&t.name)).collect();
    if tests.is_empty() {
        log::warn!("No tests selected");
    }

    let kernel = match &config.wave_file {
        Some(path) => kernel.with_wave_file(path)?,
        None => kernel,
    };
    let kernel = Rc::new(kernel);
    if let Some(ns) = config.time_limit_ns {
        kernel.set_time_limit(Some(kernel.get_sim_steps(ns as f64, TimeUnit::Ns)?));
    }
    reset_thread_state();
    SIM_IF.attach(kernel.clone());
    let _attached = Attached;

    SIM_IF.log(&format!("Seeding random generator with {}", config.seed));
    utils::seed(config.seed);
    RUN.with(|r| {
        r.borrow_mut().records = tests
            .iter()
            .map(|t| TestRecord {
                name: t.name.clone(),
                outcome: Outcome::Failed("test did not run to completion".to_string()),
                time_secs: 0.0,
                sim_time_ns: 0.0,
            })
            .collect();
    });

    start_of_simulation(tests)?;
    let stats = kernel.run()?;
    log::debug!(
        "Simulation ended at step {} after {} delta cycles",
        stats.final_time_steps,
        stats.deltas
    );

    let report = end_of_simulation(config.seed, started)?;
    if let Some(path) = &config.results_file {
        junit::create_junit_xml(env!("CARGO_PKG_NAME"), &report.records, path)?;
    }
    Ok(report)
}
