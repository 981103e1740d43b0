use junit_report::{Duration, ReportBuilder, TestCaseBuilder, TestSuiteBuilder};
use std::fs::File;
use std::path::Path;

use crate::error::{TbError, TbResult};
use crate::test::{Outcome, TestRecord};

pub(crate) fn create_junit_xml(suite: &str, records: &[TestRecord], path: &Path) -> TbResult<()> {
    let test_cases: Vec<_> = records
        .iter()
        .map(|t| {
            let duration = Duration::seconds_f64(t.time_secs);
            match &t.outcome {
                Outcome::Passed(_) => TestCaseBuilder::success(&t.name, duration),
                Outcome::Failed(msg) => TestCaseBuilder::failure(&t.name, duration, "failure", msg),
            }
            .build()
        })
        .collect();

    let test_suite = TestSuiteBuilder::new(suite)
        .add_testcases(test_cases)
        .build();
    let report = ReportBuilder::new().add_testsuite(test_suite).build();
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let file = File::create(path)?;
    report
        .write_xml(file)
        .map_err(|e| TbError::Report(e.to_string()))
}
