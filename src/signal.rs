use crate::error::{TbError, TbResult};
use crate::sim_if::{ObjectKind, SIM_IF};
use crate::trigger::Trigger;
use crate::value::{Logic, Val};

/// Handle to a module or signal in the attached simulator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SimObject {
    pub(crate) handle: usize,
    pub(crate) kind: ObjectKind,
}

impl SimObject {
    pub fn handle(&self) -> usize {
        self.handle
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn name(&self) -> TbResult<String> {
        SIM_IF.get()?.get_full_name(self.handle)
    }

    pub fn has_value(&self) -> bool {
        !matches!(self.kind, ObjectKind::Hier)
    }

    pub fn get_root() -> TbResult<Self> {
        let sim = SIM_IF.get()?;
        let handle = sim.get_root_handle()?;
        Self::from_handle(handle)
    }

    pub fn from_handle(handle: usize) -> TbResult<Self> {
        let kind = SIM_IF.get()?.get_kind(handle)?;
        Ok(SimObject { handle, kind })
    }

    pub fn from_name(full_name: &str) -> TbResult<Self> {
        let handle = SIM_IF.get()?.get_handle_by_name(full_name)?;
        Self::from_handle(handle)
    }

    /// Child object by name, e.g. `dut.c("i_clk")`.
    pub fn c(&self, name: &str) -> TbResult<Self> {
        let mut child_name = self.name()?;
        child_name.push('.');
        child_name.push_str(name);
        SimObject::from_name(&child_name)
    }

    pub fn get(&self) -> TbResult<Logic> {
        SIM_IF.get()?.get_value(self.handle)
    }

    /// Deposits `val`. It becomes visible at the next delta cycle.
    pub fn set(&self, val: impl Into<Logic>) -> TbResult<()> {
        SIM_IF.get()?.set_value(self.handle, val.into())
    }

    pub fn u32(&self) -> TbResult<u32> {
        let val = self.get()?;
        val.to_u32().ok_or_else(|| TbError::Unresolved {
            name: self.name().unwrap_or_default(),
            value: val.as_char(),
        })
    }

    pub fn set_u32(&self, val: u32) -> TbResult<()> {
        self.set(Logic::try_from(val)?)
    }

    // convenience functions to get edge triggers for this signal
    pub fn rising_edge(self) -> Trigger {
        Trigger::rising_edge(self)
    }

    /// Rising edge, then the read-only phase where every update of that edge has landed.
    pub async fn rising_edge_ro(self) -> TbResult {
        self.rising_edge().await?;
        Trigger::read_only().await?;
        Ok(Val::None)
    }

    pub async fn rising_edge_rw(self) -> TbResult {
        self.rising_edge().await?;
        Trigger::read_write().await?;
        Ok(Val::None)
    }

    pub fn falling_edge(self) -> Trigger {
        Trigger::falling_edge(self)
    }

    pub fn edge(self) -> Trigger {
        Trigger::edge(self)
    }
}
