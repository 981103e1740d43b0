use futures::future::BoxFuture;
use std::fmt;

use crate::error::TbResult;
use crate::signal::SimObject;

pub type TestFn = fn(SimObject) -> BoxFuture<'static, TbResult>;

/// A named test; the generator receives the root object of the design.
#[derive(Clone)]
pub struct TestCase {
    pub name: String,
    pub generator: TestFn,
}

impl TestCase {
    pub fn new(name: &str, generator: TestFn) -> Self {
        Self {
            name: name.to_string(),
            generator,
        }
    }
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase").field("name", &self.name).finish()
    }
}

/// Builds a `Vec<TestCase>` from async test functions in scope.
#[macro_export]
macro_rules! tests {
    ($( $i:ident ),* $(,)?) => {
        vec![$(
            $crate::test::TestCase::new(stringify!($i), |sim_root| {
                $crate::prelude::FutureExt::boxed($i(sim_root))
            })
        ),*]
    };
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Passed(String),
    Failed(String),
}

impl Outcome {
    pub fn passed(&self) -> bool {
        matches!(self, Outcome::Passed(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Outcome::Passed(m) | Outcome::Failed(m) => m,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TestRecord {
    pub name: String,
    pub outcome: Outcome,
    pub time_secs: f64,
    pub sim_time_ns: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Val;

    async fn noop(_dut: SimObject) -> TbResult {
        Ok(Val::None)
    }

    async fn other(_dut: SimObject) -> TbResult {
        Ok(Val::None)
    }

    #[test]
    fn macro_keeps_order_and_names() {
        let list = tests![noop, other];
        let names: Vec<&str> = list.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["noop", "other"]);
    }

    #[test]
    fn outcome_accessors() {
        assert!(Outcome::Passed("ok".into()).passed());
        let failed = Outcome::Failed("bad".into());
        assert!(!failed.passed());
        assert_eq!(failed.message(), "bad");
    }
}
