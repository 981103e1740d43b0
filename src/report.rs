use num_format::{Locale, ToFormattedString};
use prettytable::{format, Cell, Row, Table};

use crate::sim_if::SIM_IF;
use crate::test::TestRecord;

/// Results of one `run_tests` call.
#[derive(Debug, Clone)]
pub struct Report {
    pub records: Vec<TestRecord>,
    pub sim_time_ns: f64,
    pub real_time_secs: f64,
    pub seed: u64,
}

impl Report {
    pub fn passed(&self) -> bool {
        self.records.iter().all(|r| r.outcome.passed())
    }

    pub fn failures(&self) -> impl Iterator<Item = &TestRecord> {
        self.records.iter().filter(|r| !r.outcome.passed())
    }

    pub fn get(&self, name: &str) -> Option<&TestRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    pub fn summary_table(&self) -> Table {
        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
        table.set_titles(Row::new(
            ["TEST", "STATUS", "SIM TIME (ns)", "REAL TIME (s)", "RATIO (ns/s)"]
                .iter()
                .map(|t| Cell::new(t))
                .collect(),
        ));
        for r in self.records.iter() {
            table.add_row(Row::new(vec![
                Cell::new(&r.name),
                Cell::new(if r.outcome.passed() { "PASS" } else { "FAIL" }),
                Cell::new(&format_ns(r.sim_time_ns)),
                Cell::new(&format!("{:.3}", r.time_secs)),
                Cell::new(&format!("{:.2}", ratio(r.sim_time_ns, r.time_secs))),
            ]));
        }
        let failed = self.failures().count();
        table.add_row(Row::new(vec![
            Cell::new(&format!(
                "TESTS={} PASS={} FAIL={}",
                self.records.len(),
                self.records.len() - failed,
                failed
            )),
            Cell::new(""),
            Cell::new(&format_ns(self.sim_time_ns)),
            Cell::new(&format!("{:.3}", self.real_time_secs)),
            Cell::new(&format!("{:.2}", ratio(self.sim_time_ns, self.real_time_secs))),
        ]));
        table
    }

    pub(crate) fn log_summary(&self) {
        for r in self.failures() {
            SIM_IF.log(&format!("{} failed: {}", r.name, r.outcome.message()));
        }
        for line in self.summary_table().to_string().lines() {
            SIM_IF.log(line);
        }
        SIM_IF.log(&format!("Simulation time: {} ns", format_ns(self.sim_time_ns)));
        SIM_IF.log(&format!("Real time: {:.3} s", self.real_time_secs));
        SIM_IF.log(&format!(
            "Simulation speed: {:.3} ns/s",
            ratio(self.sim_time_ns, self.real_time_secs)
        ));
    }
}

fn ratio(sim_ns: f64, secs: f64) -> f64 {
    if secs > 0.0 {
        sim_ns / secs
    } else {
        0.0
    }
}

fn format_ns(ns: f64) -> String {
    (ns.round() as u64).to_formatted_string(&Locale::en)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::Outcome;

    fn record(name: &str, outcome: Outcome) -> TestRecord {
        TestRecord {
            name: name.to_string(),
            outcome,
            time_secs: 0.5,
            sim_time_ns: 115_000.0,
        }
    }

    #[test]
    fn summary_lists_every_test() {
        let report = Report {
            records: vec![
                record("test_dff", Outcome::Passed("ok".into())),
                record("test_other", Outcome::Failed("o_d mismatch".into())),
            ],
            sim_time_ns: 230_000.0,
            real_time_secs: 1.0,
            seed: 1,
        };
        assert!(!report.passed());
        assert_eq!(report.failures().count(), 1);
        assert!(report.get("test_dff").unwrap().outcome.passed());
        let text = report.summary_table().to_string();
        assert!(text.contains("test_dff"));
        assert!(text.contains("FAIL"));
        assert!(text.contains("115,000"));
        assert!(text.contains("TESTS=2 PASS=1 FAIL=1"));
    }

    #[test]
    fn ratio_handles_zero_time() {
        assert_eq!(ratio(10.0, 0.0), 0.0);
        assert_eq!(ratio(10.0, 2.0), 5.0);
    }
}
