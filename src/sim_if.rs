use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use crate::error::{TbError, TbResult};
use crate::value::Logic;

thread_local! {
    static ATTACHED: RefCell<Option<Rc<dyn SimIf>>> = RefCell::new(None);
}

/// Entry point to whichever simulator is attached to the current thread.
pub static SIM_IF: SimIfHandle = SimIfHandle;

pub struct SimIfHandle;

impl SimIfHandle {
    /// Returns the attached simulator. The `Rc` is cloned out so no borrow is
    /// held while the simulator calls back into the bench.
    pub fn get(&self) -> TbResult<Rc<dyn SimIf>> {
        ATTACHED.with(|a| a.borrow().clone()).ok_or(TbError::NoSimulator)
    }

    pub fn is_attached(&self) -> bool {
        ATTACHED.with(|a| a.borrow().is_some())
    }

    pub(crate) fn attach(&self, sim: Rc<dyn SimIf>) {
        ATTACHED.with(|a| a.borrow_mut().replace(sim));
    }

    pub(crate) fn detach(&self) {
        ATTACHED.with(|a| a.borrow_mut().take());
    }

    /// Logs through the attached simulator, or plainly when none is attached.
    pub fn log(&self, msg: &str) {
        match self.get() {
            Ok(sim) => sim.log(msg),
            Err(_) => log::info!("{}", msg),
        }
    }
}

#[derive(Debug, Hash, Clone, Copy, Eq, PartialEq)]
pub enum SimCallback {
    /// Relative delay in steps when registering, absolute time when fired.
    Time(u64),
    /// Value change on the object with this handle.
    Edge(usize),
    ReadWrite,
    ReadOnly,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    /// Single-bit signal.
    Logic,
    /// Module scope, has children but no value.
    Hier,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TimeUnit {
    Fs,
    Ps,
    Ns,
    Us,
    Ms,
    Sec,
}

impl TimeUnit {
    pub fn exponent(self) -> i8 {
        match self {
            TimeUnit::Fs => -15,
            TimeUnit::Ps => -12,
            TimeUnit::Ns => -9,
            TimeUnit::Us => -6,
            TimeUnit::Ms => -3,
            TimeUnit::Sec => 0,
        }
    }

    pub fn from_exponent(exp: i8) -> TbResult<Self> {
        match exp {
            -15 => Ok(TimeUnit::Fs),
            -12 => Ok(TimeUnit::Ps),
            -9 => Ok(TimeUnit::Ns),
            -6 => Ok(TimeUnit::Us),
            -3 => Ok(TimeUnit::Ms),
            0 => Ok(TimeUnit::Sec),
            _ => Err(TbError::InvalidTimeUnit(format!("1e{}", exp))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeUnit::Fs => "fs",
            TimeUnit::Ps => "ps",
            TimeUnit::Ns => "ns",
            TimeUnit::Us => "us",
            TimeUnit::Ms => "ms",
            TimeUnit::Sec => "sec",
        }
    }
}

impl FromStr for TimeUnit {
    type Err = TbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fs" => Ok(TimeUnit::Fs),
            "ps" => Ok(TimeUnit::Ps),
            "ns" => Ok(TimeUnit::Ns),
            "us" => Ok(TimeUnit::Us),
            "ms" => Ok(TimeUnit::Ms),
            "sec" | "s" => Ok(TimeUnit::Sec),
            _ => Err(TbError::InvalidTimeUnit(s.to_string())),
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait SimIf {
    /// Deposits `value`; it takes effect at the next delta cycle.
    fn set_value(&self, handle: usize, value: Logic) -> TbResult<()>;
    fn get_value(&self, handle: usize) -> TbResult<Logic>;
    fn get_handle_by_name(&self, name: &str) -> TbResult<usize>;
    fn get_root_handle(&self) -> TbResult<usize>;
    fn get_full_name(&self, handle: usize) -> TbResult<String>;
    fn get_kind(&self, handle: usize) -> TbResult<ObjectKind>;
    fn get_sim_time_steps(&self) -> u64;
    fn get_sim_precision(&self) -> i8;
    fn register_callback(&self, cb: SimCallback) -> TbResult<usize>;
    fn cancel_callback(&self, cb_hdl: usize) -> TbResult<()>;
    fn log(&self, msg: &str);

    fn get_sim_time(&self, unit: TimeUnit) -> f64 {
        // this function does not preserve precision, so don't use carelessly
        let t = self.get_sim_time_steps() as f64;
        ldexp10(t, self.get_sim_precision() - unit.exponent())
    }

    fn get_sim_steps(&self, time: f64, unit: TimeUnit) -> TbResult<u64> {
        let precision = self.get_sim_precision();
        let steps = ldexp10(time, unit.exponent() - precision);
        if steps % 1.0 == 0.0 && steps >= 0.0 {
            Ok(steps as u64)
        } else {
            Err(TbError::TimeRounding {
                time,
                unit: unit.to_string(),
                precision: TimeUnit::from_exponent(precision)?.to_string(),
            })
        }
    }
}

/// Like `ldexp`, but base 10.
pub(crate) fn ldexp10(frac: f64, exp: i8) -> f64 {
    if exp >= 0 {
        frac * 10_u64.pow(exp as u32) as f64
    } else {
        let div = 10_u64.pow(-exp as u32) as f64;
        frac / div
    }
}
