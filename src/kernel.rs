//! In-process event-driven simulator hosting one behavioural [`Device`].
//!
//! Every time step runs in three phases:
//!
//! 1. **Active**: pending updates are applied in delta cycles until nothing
//!    changes. In each delta the device samples a rising clock edge, value
//!    change callbacks fire, and everything written in the meantime (register
//!    updates first, then testbench deposits) lands in the next delta.
//! 2. **Read-write**: one-shot callbacks that may still write, followed by
//!    another round of the active phase.
//! 3. **Read-only**: one-shot callbacks that observe the settled values.
//!    Writes are rejected.
//!
//! The kernel then advances to the next timer callback and stops when none
//! are left. Every value change can be dumped to a VCD file on the way.

use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use num_format::{Locale, ToFormattedString};

use crate::device::{Device, Direction};
use crate::error::{TbError, TbResult};
use crate::sim_if::{ObjectKind, SimCallback, SimIf, TimeUnit};
use crate::trigger::{self, EdgeKind};
use crate::value::Logic;
use crate::wave::VcdWriter;

/// Delta cycles allowed within a single time step.
pub const MAX_DELTAS: u32 = 10_000;

struct Object {
    full_name: String,
    kind: ObjectKind,
    value: Logic,
    writable: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Active,
    ReadWrite,
    ReadOnly,
}

struct KernelState {
    now: u64,
    precision: i8,
    phase: Phase,
    objects: Vec<Object>,
    names: HashMap<String, usize>,
    // registered callbacks; timers hold their absolute time
    callbacks: BTreeMap<usize, SimCallback>,
    next_cb: usize,
    timers: BinaryHeap<Reverse<(u64, usize)>>,
    read_write: Vec<usize>,
    read_only: Vec<usize>,
    // one-shots requested during the read-only phase wait for the next step
    deferred: Vec<(usize, SimCallback)>,
    pending: Vec<(usize, Logic)>,
    time_limit: Option<u64>,
    deltas: u64,
}

impl KernelState {
    fn object(&self, handle: usize) -> TbResult<&Object> {
        self.objects.get(handle).ok_or(TbError::InvalidHandle(handle))
    }

    /// Removes and returns the still registered ids of a one-shot list.
    fn take_one_shot(&mut self, phase: Phase) -> Vec<usize> {
        let ids = match phase {
            Phase::ReadWrite => std::mem::take(&mut self.read_write),
            Phase::ReadOnly => std::mem::take(&mut self.read_only),
            Phase::Active => Vec::new(),
        };
        ids.into_iter()
            .filter(|id| self.callbacks.remove(id).is_some())
            .collect()
    }
}

/// Summary of a finished [`Kernel::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub final_time_steps: u64,
    pub deltas: u64,
}

pub struct Kernel {
    state: RefCell<KernelState>,
    device: RefCell<Box<dyn Device>>,
    root: usize,
    // object handle of every device port, indexed like Device::ports()
    port_handles: Vec<usize>,
    clock_handle: usize,
    wave: RefCell<Option<VcdWriter<Box<dyn Write>>>>,
}

impl Kernel {
    pub fn new(device: impl Device + 'static) -> TbResult<Self> {
        let ports = device.ports().to_vec();
        let clock = device.clock();
        let scope = device.name().to_string();
        if scope.is_empty() || scope.contains('.') {
            return Err(TbError::InvalidDevice(format!("bad instance name '{}'", scope)));
        }
        match ports.get(clock) {
            Some(p) if p.direction == Direction::Input => {}
            _ => {
                return Err(TbError::InvalidDevice(format!(
                    "clock port {} of '{}' is not an input",
                    clock, scope
                )))
            }
        }

        let mut objects = vec![Object {
            full_name: scope.clone(),
            kind: ObjectKind::Hier,
            value: Logic::X,
            writable: false,
        }];
        let mut names = HashMap::new();
        names.insert(scope.clone(), 0);
        let mut port_handles = Vec::with_capacity(ports.len());
        for port in ports.iter() {
            let full_name = format!("{}.{}", scope, port.name);
            if names.insert(full_name.clone(), objects.len()).is_some() {
                return Err(TbError::InvalidDevice(format!("duplicate port '{}'", full_name)));
            }
            port_handles.push(objects.len());
            objects.push(Object {
                full_name,
                kind: ObjectKind::Logic,
                value: Logic::X,
                writable: port.direction == Direction::Input,
            });
        }
        let clock_handle = port_handles[clock];

        Ok(Kernel {
            state: RefCell::new(KernelState {
                now: 0,
                precision: TimeUnit::Ns.exponent(),
                phase: Phase::Active,
                objects,
                names,
                callbacks: BTreeMap::new(),
                next_cb: 1,
                timers: BinaryHeap::new(),
                read_write: Vec::new(),
                read_only: Vec::new(),
                deferred: Vec::new(),
                pending: Vec::new(),
                time_limit: None,
                deltas: 0,
            }),
            device: RefCell::new(Box::new(device)),
            root: 0,
            port_handles,
            clock_handle,
            wave: RefCell::new(None),
        })
    }

    /// Sets the duration of one simulation step. Must be chosen before any
    /// time has been requested.
    pub fn with_precision(self, unit: TimeUnit) -> Self {
        self.state.borrow_mut().precision = unit.exponent();
        self
    }

    /// Dumps every port's value changes to `writer` in VCD format.
    pub fn with_wave(self, writer: impl Write + 'static) -> Self {
        *self.wave.borrow_mut() = Some(VcdWriter::new(Box::new(writer)));
        self
    }

    /// [`with_wave`](Kernel::with_wave) into a newly created file.
    pub fn with_wave_file(self, path: &Path) -> TbResult<Self> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        let file = File::create(path)?;
        log::info!("Dumping waveform to {}", path.display());
        Ok(self.with_wave(BufWriter::new(file)))
    }

    /// Aborts [`run`](Kernel::run) once a timer beyond `steps` is due.
    pub fn set_time_limit(&self, steps: Option<u64>) {
        self.state.borrow_mut().time_limit = steps;
    }

    /// Runs until no timer callbacks remain.
    pub fn run(&self) -> TbResult<RunStats> {
        self.begin_wave()?;
        loop {
            self.settle()?;

            let rw = self.begin_phase(Phase::ReadWrite);
            if !rw.is_empty() {
                trigger::react(SimCallback::ReadWrite, None);
                self.state.borrow_mut().phase = Phase::Active;
                continue;
            }

            let ro = self.begin_phase(Phase::ReadOnly);
            if !ro.is_empty() {
                trigger::react(SimCallback::ReadOnly, None);
                self.state.borrow_mut().phase = Phase::Active;
            }

            match self.advance()? {
                Some(due) => {
                    let now = self.state.borrow().now;
                    for _ in due {
                        trigger::react(SimCallback::Time(now), None);
                    }
                }
                None => break,
            }
        }

        if let Some(vcd) = self.wave.borrow_mut().as_mut() {
            vcd.flush()?;
        }
        let st = self.state.borrow();
        if !st.deferred.is_empty() {
            log::debug!("{} callback(s) still waiting for a next time step", st.deferred.len());
        }
        Ok(RunStats {
            final_time_steps: st.now,
            deltas: st.deltas,
        })
    }

    fn begin_wave(&self) -> TbResult<()> {
        let mut wave = self.wave.borrow_mut();
        let Some(vcd) = wave.as_mut() else {
            return Ok(());
        };
        if vcd.started() {
            return Ok(());
        }
        let st = self.state.borrow();
        let scope = &st.objects[self.root].full_name;
        let signals: Vec<(usize, &str, Logic)> = self
            .port_handles
            .iter()
            .map(|&h| {
                let obj = &st.objects[h];
                let name = obj.full_name.rsplit('.').next().unwrap_or(&obj.full_name);
                (h, name, obj.value)
            })
            .collect();
        vcd.write_header(TimeUnit::from_exponent(st.precision)?, scope, &signals)
    }

    fn begin_phase(&self, phase: Phase) -> Vec<usize> {
        let mut st = self.state.borrow_mut();
        let ids = st.take_one_shot(phase);
        if !ids.is_empty() {
            st.phase = phase;
        }
        ids
    }

    /// Moves to the next due timer and returns the callbacks to fire.
    fn advance(&self) -> TbResult<Option<Vec<usize>>> {
        let mut st = self.state.borrow_mut();
        loop {
            let Some(Reverse((time, id))) = st.timers.pop() else {
                return Ok(None);
            };
            if !st.callbacks.contains_key(&id) {
                // cancelled
                continue;
            }
            if let Some(limit) = st.time_limit {
                if time > limit {
                    return Err(TbError::TimeLimitExceeded { limit });
                }
            }
            st.now = time;
            let mut due = vec![id];
            while let Some(Reverse((t, next))) = st.timers.peek().copied() {
                if t != time {
                    break;
                }
                st.timers.pop();
                if st.callbacks.contains_key(&next) {
                    due.push(next);
                }
            }
            for id in due.iter() {
                st.callbacks.remove(id);
            }
            for (id, cb) in std::mem::take(&mut st.deferred) {
                st.callbacks.insert(id, cb);
                match cb {
                    SimCallback::ReadWrite => st.read_write.push(id),
                    _ => st.read_only.push(id),
                }
            }
            return Ok(Some(due));
        }
    }

    /// Runs delta cycles until no updates are pending.
    fn settle(&self) -> TbResult<()> {
        for _ in 0..MAX_DELTAS {
            let changes = {
                let mut st = self.state.borrow_mut();
                let pending = std::mem::take(&mut st.pending);
                if pending.is_empty() {
                    return Ok(());
                }
                st.deltas += 1;
                let mut changes = Vec::new();
                for (handle, value) in pending {
                    let obj = &mut st.objects[handle];
                    if obj.value != value {
                        obj.value = value;
                        changes.push((handle, value));
                    }
                }
                if let Some(vcd) = self.wave.borrow_mut().as_mut() {
                    for &(handle, value) in changes.iter() {
                        vcd.record_change(st.now, handle, value)?;
                    }
                }
                changes
            };

            // a change to 1 is a rising edge, X->1 included
            if changes
                .iter()
                .any(|&(h, v)| h == self.clock_handle && v == Logic::One)
            {
                let mut st = self.state.borrow_mut();
                let sampled: Vec<Logic> = self
                    .port_handles
                    .iter()
                    .map(|&h| st.objects[h].value)
                    .collect();
                let updates = self.device.borrow_mut().rising_edge(&sampled);
                for (port, value) in updates {
                    match self.port_handles.get(port) {
                        Some(&h) => st.pending.push((h, value)),
                        None => {
                            return Err(TbError::InvalidDevice(format!(
                                "update of unknown port {}",
                                port
                            )))
                        }
                    }
                }
            }

            for (handle, value) in changes {
                let ids: Vec<usize> = self
                    .state
                    .borrow()
                    .callbacks
                    .iter()
                    .filter(|(_, cb)| **cb == SimCallback::Edge(handle))
                    .map(|(id, _)| *id)
                    .collect();
                for id in ids {
                    // an earlier reaction may have cancelled it
                    if self.state.borrow().callbacks.contains_key(&id) {
                        trigger::react(SimCallback::Edge(handle), EdgeKind::of_change(value));
                    }
                }
            }
        }
        let step = self.state.borrow().now;
        Err(TbError::DeltaLimit {
            step,
            max_deltas: MAX_DELTAS,
        })
    }
}

impl SimIf for Kernel {
    fn set_value(&self, handle: usize, value: Logic) -> TbResult<()> {
        let mut st = self.state.borrow_mut();
        let obj = st.object(handle)?;
        if !obj.writable {
            return Err(TbError::NotWritable(obj.full_name.clone()));
        }
        if st.phase == Phase::ReadOnly {
            return Err(TbError::ReadOnlyWrite(obj.full_name.clone()));
        }
        log::trace!("deposit {}={}", obj.full_name, value);
        st.pending.push((handle, value));
        Ok(())
    }

    fn get_value(&self, handle: usize) -> TbResult<Logic> {
        let st = self.state.borrow();
        let obj = st.object(handle)?;
        match obj.kind {
            ObjectKind::Logic => Ok(obj.value),
            ObjectKind::Hier => Err(TbError::InvalidValue(format!(
                "'{}' is a scope and has no value",
                obj.full_name
            ))),
        }
    }

    fn get_handle_by_name(&self, name: &str) -> TbResult<usize> {
        self.state
            .borrow()
            .names
            .get(name)
            .copied()
            .ok_or_else(|| TbError::ObjectNotFound(name.to_string()))
    }

    fn get_root_handle(&self) -> TbResult<usize> {
        Ok(self.root)
    }

    fn get_full_name(&self, handle: usize) -> TbResult<String> {
        Ok(self.state.borrow().object(handle)?.full_name.clone())
    }

    fn get_kind(&self, handle: usize) -> TbResult<ObjectKind> {
        Ok(self.state.borrow().object(handle)?.kind)
    }

    fn get_sim_time_steps(&self) -> u64 {
        self.state.borrow().now
    }

    fn get_sim_precision(&self) -> i8 {
        self.state.borrow().precision
    }

    fn register_callback(&self, cb: SimCallback) -> TbResult<usize> {
        let mut st = self.state.borrow_mut();
        let id = st.next_cb;
        st.next_cb += 1;
        match cb {
            SimCallback::Time(delay) => {
                let abs = st.now + delay;
                st.timers.push(Reverse((abs, id)));
                st.callbacks.insert(id, SimCallback::Time(abs));
            }
            SimCallback::Edge(handle) => {
                st.object(handle)?;
                st.callbacks.insert(id, cb);
            }
            SimCallback::ReadWrite | SimCallback::ReadOnly if st.phase == Phase::ReadOnly => {
                st.deferred.push((id, cb));
            }
            SimCallback::ReadWrite => {
                st.callbacks.insert(id, cb);
                st.read_write.push(id);
            }
            SimCallback::ReadOnly => {
                st.callbacks.insert(id, cb);
                st.read_only.push(id);
            }
        }
        Ok(id)
    }

    fn cancel_callback(&self, cb_hdl: usize) -> TbResult<()> {
        let mut st = self.state.borrow_mut();
        if st.callbacks.remove(&cb_hdl).is_some() {
            return Ok(());
        }
        let before = st.deferred.len();
        st.deferred.retain(|(id, _)| *id != cb_hdl);
        if st.deferred.len() < before {
            Ok(())
        } else {
            Err(TbError::UnknownCallback(cb_hdl))
        }
    }

    fn log(&self, msg: &str) {
        log::info!("{} {}", format_ns(self.get_sim_time(TimeUnit::Ns)), msg);
    }
}

/// `1,234.500ns` style timestamp, rounded to whole picoseconds.
fn format_ns(t: f64) -> String {
    let ps = (t * 1000.0).round() as u64;
    format!("{}.{:03}ns", (ps / 1000).to_formatted_string(&Locale::en), ps % 1000)
}
