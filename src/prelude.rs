pub use crate::clock::Clock;
pub use crate::config::Config;
pub use crate::device::{Device, Dff, ShiftRegister};
pub use crate::error::{TbError, TbResult};
pub use crate::executor::{JoinHandle, Task};
pub use crate::kernel::Kernel;
pub use crate::signal::SimObject;
pub use crate::sim_if::{TimeUnit, SIM_IF};
pub use crate::test::TestCase;
pub use crate::trigger::Trigger;
pub use crate::utils;
pub use crate::value::{Logic, Val};
pub use crate::{check, check_eq, fail_test, pass_test, run_tests, tests};
pub use futures::future::FutureExt;
