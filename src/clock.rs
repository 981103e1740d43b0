use crate::error::{TbError, TbResult};
use crate::signal::SimObject;
use crate::sim_if::{TimeUnit, SIM_IF};
use crate::trigger::Trigger;
use crate::value::{Logic, Val};

/// Periodic driver of a clock signal.
#[derive(Clone, Copy, Debug)]
pub struct Clock {
    signal: SimObject,
    period: u64,
    unit: TimeUnit,
}

impl Clock {
    pub fn new(signal: SimObject, period: u64, unit: TimeUnit) -> Self {
        Clock {
            signal,
            period,
            unit,
        }
    }

    /// Toggles the signal forever, beginning with the high half of the period
    /// if `start_high`. Meant to be forked; it ends when the test is torn down.
    #[allow(unreachable_code)]
    pub async fn start(self, start_high: bool) -> TbResult {
        let period = SIM_IF.get()?.get_sim_steps(self.period as f64, self.unit)?;
        if period < 2 {
            return Err(TbError::InvalidClock(format!(
                "period {}{} is shorter than two simulation steps",
                self.period, self.unit
            )));
        }
        let high_t = period / 2;
        let low_t = period - high_t;
        if period % 2 != 0 {
            SIM_IF.log(&format!(
                "Warning: Clock period of {} steps not dividable by 2. High time will be {} steps; low time will be {} steps.",
                period, high_t, low_t
            ));
        }

        let (first, first_t, second, second_t) = if start_high {
            (Logic::One, high_t, Logic::Zero, low_t)
        } else {
            (Logic::Zero, low_t, Logic::One, high_t)
        };
        loop {
            self.signal.set(first)?;
            Trigger::timer_steps(first_t).await?;
            self.signal.set(second)?;
            Trigger::timer_steps(second_t).await?;
        }
        Ok(Val::None)
    }
}
