use regbench::device::Port;
use regbench::dff_test::{check_latency, test_dff, test_dff_readback};
use regbench::prelude::*;
use regbench::test::Outcome;

fn dff() -> Kernel {
    Kernel::new(Dff::default()).unwrap()
}

fn failure(report: &regbench::Report, name: &str) -> String {
    match &report.get(name).unwrap().outcome {
        Outcome::Failed(msg) => msg.clone(),
        Outcome::Passed(msg) => panic!("{} passed unexpectedly: {}", name, msg),
    }
}

static REGISTER_PORTS: [Port; 3] = [
    Port::input("i_clk"),
    Port::input("i_d"),
    Port::output("o_d"),
];

/// Behaves like a flip-flop for `good_edges` rising edges, then captures the
/// inverted input.
struct FadingDff {
    edges: usize,
    good_edges: usize,
}

impl Device for FadingDff {
    fn name(&self) -> &str {
        "dff"
    }

    fn ports(&self) -> &[Port] {
        &REGISTER_PORTS
    }

    fn clock(&self) -> usize {
        0
    }

    fn rising_edge(&mut self, ports: &[Logic]) -> Vec<(usize, Logic)> {
        self.edges += 1;
        let q = match ports[1] {
            d if self.edges <= self.good_edges => d,
            Logic::Zero => Logic::One,
            Logic::One => Logic::Zero,
            d => d,
        };
        vec![(2, q)]
    }
}

async fn scenario(dut: SimObject) -> TbResult {
    let bits = [0, 1, 1, 0, 1, 0, 0, 1];
    let stimulus = bits
        .iter()
        .map(|&b| Logic::try_from(b as u32))
        .collect::<TbResult<Vec<Logic>>>()?;
    check_latency(dut, stimulus).await
}

async fn gives_up(dut: SimObject) -> TbResult {
    let clk = dut.c("i_clk")?;
    Task::fork(Clock::new(clk, 10, TimeUnit::Us).start(false));
    clk.rising_edge().await?;
    fail_test("gave up after one edge");
    clk.rising_edge().await?;
    Ok(Val::String("unreachable".into()))
}

async fn pokes_output(dut: SimObject) -> TbResult {
    dut.c("o_d")?.set(Logic::One)?;
    Ok(Val::None)
}

async fn writes_in_read_only(dut: SimObject) -> TbResult {
    Trigger::read_only().await?;
    dut.c("i_d")?.set(Logic::One)?;
    Ok(Val::None)
}

async fn hangs(dut: SimObject) -> TbResult {
    let clk = dut.c("i_clk")?;
    Task::fork(Clock::new(clk, 10, TimeUnit::Us).start(false));
    loop {
        clk.rising_edge().await?;
    }
}

async fn waits_for_nothing(dut: SimObject) -> TbResult {
    dut.c("o_d")?.rising_edge().await?;
    Ok(Val::None)
}

#[test]
fn dff_passes_for_any_seed() {
    for seed in [0, 1, 7, 42, 1234, u64::MAX] {
        let config = Config::default().with_seed(seed);
        let report = run_tests(dff(), tests![test_dff], &config).unwrap();
        assert!(report.passed(), "seed {}: {:?}", seed, report.records);
        assert_eq!(report.seed, seed);
    }
}

#[test]
fn dff_runs_eleven_checked_edges() {
    let report = run_tests(dff(), tests![test_dff], &Config::default().with_seed(3)).unwrap();
    let record = report.get("test_dff").unwrap();
    assert_eq!(record.outcome, Outcome::Passed("11 cycles matched".into()));
    // first edge at 5 us, then ten loop edges and the final one, 10 us apart
    assert_eq!(record.sim_time_ns, 115_000.0);
    assert_eq!(report.sim_time_ns, 115_000.0);
}

#[test]
fn fixed_sequence_is_shifted_by_one_cycle() {
    let report = run_tests(dff(), tests![scenario], &Config::default()).unwrap();
    assert!(report.passed(), "{:?}", report.records);
}

#[test]
fn readback_sees_captured_input() {
    let report = run_tests(dff(), tests![test_dff_readback], &Config::default()).unwrap();
    assert!(report.passed(), "{:?}", report.records);
}

#[test]
fn two_stage_register_is_caught() {
    let kernel = Kernel::new(ShiftRegister::new("dff", 2).unwrap()).unwrap();
    let report = run_tests(kernel, tests![test_dff], &Config::default().with_seed(5)).unwrap();
    assert!(!report.passed());
    let msg = failure(&report, "test_dff");
    assert!(msg.contains("o_d mismatch on cycle 0"), "{}", msg);
    assert!(msg.contains("observed x, expected 0"), "{}", msg);
}

#[test]
fn wrong_capture_on_last_edge_is_caught() {
    // the final check sees what the eleventh edge captured
    let kernel = Kernel::new(FadingDff {
        edges: 0,
        good_edges: 10,
    })
    .unwrap();
    let report = run_tests(kernel, tests![test_dff], &Config::default().with_seed(11)).unwrap();
    let msg = failure(&report, "test_dff");
    assert!(msg.contains("o_d mismatch on the last cycle"), "{}", msg);
    assert!(!msg.contains("on cycle"), "{}", msg);
}

#[test]
fn failing_clock_fails_the_test() {
    // 10 us can't be expressed in whole ms steps
    let kernel = dff().with_precision(TimeUnit::Ms);
    let report = run_tests(kernel, tests![test_dff, test_dff_readback], &Config::default()).unwrap();
    let msg = failure(&report, "test_dff");
    assert!(msg.contains("task 'forked' failed"), "{}", msg);
    assert!(msg.contains("10 us to simulation steps without rounding"), "{}", msg);
    assert!(failure(&report, "test_dff_readback").contains("without rounding"));
}

#[test]
fn wave_dump_covers_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("waves").join("dff.vcd");
    let config = Config {
        wave_file: Some(path.clone()),
        ..Config::default()
    };
    let report = run_tests(dff(), tests![test_dff], &config).unwrap();
    assert!(report.passed(), "{:?}", report.records);

    let vcd = std::fs::read_to_string(&path).unwrap();
    assert!(vcd.contains("$scope module dff $end"));
    assert!(vcd.contains("$var wire 1 ! i_clk $end"));
    assert!(vcd.contains("$var wire 1 \" i_d $end"));
    assert!(vcd.contains("$var wire 1 # o_d $end"));
    // first rising clock edge, then the last one the test waited for
    assert!(vcd.contains("\n#5000\n1!\n"), "{}", vcd);
    assert!(vcd.contains("\n#115000\n1!\n"), "{}", vcd);
}

#[test]
fn early_fail_ends_test_and_chain_continues() {
    let report = run_tests(dff(), tests![gives_up, test_dff], &Config::default()).unwrap();
    assert_eq!(failure(&report, "gives_up"), "gave up after one edge");
    assert!(report.get("test_dff").unwrap().outcome.passed());
}

#[test]
fn writing_an_output_fails_the_test() {
    let report = run_tests(dff(), tests![pokes_output, test_dff], &Config::default()).unwrap();
    assert!(failure(&report, "pokes_output").contains("not writable"));
    assert!(report.get("test_dff").unwrap().outcome.passed());
}

#[test]
fn read_only_phase_rejects_writes() {
    let report = run_tests(dff(), tests![writes_in_read_only], &Config::default()).unwrap();
    assert!(failure(&report, "writes_in_read_only").contains("read-only phase"));
}

#[test]
fn time_limit_aborts_the_run() {
    let config = Config {
        time_limit_ns: Some(1_000),
        ..Config::default()
    };
    let err = run_tests(dff(), tests![hangs], &config).unwrap_err();
    assert!(matches!(err, TbError::TimeLimitExceeded { limit: 1_000 }));
}

#[test]
fn test_left_waiting_is_reported_failed() {
    let report = run_tests(dff(), tests![waits_for_nothing], &Config::default()).unwrap();
    assert!(failure(&report, "waits_for_nothing").contains("did not run to completion"));
}

#[test]
fn testcase_filter_selects_tests() {
    let config = Config {
        testcase: Some(vec!["test_dff_readback".to_string()]),
        ..Config::default()
    };
    let report = run_tests(dff(), tests![test_dff, test_dff_readback], &config).unwrap();
    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0].name, "test_dff_readback");
}

#[test]
fn junit_results_list_every_test() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out").join("results.xml");
    let config = Config {
        results_file: Some(path.clone()),
        ..Config::default()
    };
    let kernel = Kernel::new(ShiftRegister::new("dff", 2).unwrap()).unwrap();
    run_tests(kernel, tests![test_dff, pokes_output], &config).unwrap();

    let xml = std::fs::read_to_string(&path).unwrap();
    assert!(xml.contains("test_dff"));
    assert!(xml.contains("pokes_output"));
    assert!(xml.contains("failure"));
}

#[test]
fn finer_precision_keeps_timing() {
    let kernel = dff().with_precision(TimeUnit::Ps);
    let report = run_tests(kernel, tests![test_dff], &Config::default()).unwrap();
    assert!(report.passed());
    assert_eq!(report.sim_time_ns, 115_000.0);
}
