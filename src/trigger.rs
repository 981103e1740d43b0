use intmap::IntMap;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};

use crate::executor;
use crate::{
    error::TbResult,
    signal::SimObject,
    sim_if::{SimCallback, TimeUnit, SIM_IF},
    value::{Logic, Val},
};

// IntMap specializes on u64 keys and doesn't actually need to calculate a hash
struct TriggerMaps {
    // key is signal handle
    edges: IntMap<CallbackHandles>,
    // key is absolute callback time in steps
    timers: IntMap<CallbackHandles>,
    read_only: CallbackHandles,
    read_write: CallbackHandles,
}

thread_local! {
    static TRIGGERS: RefCell<TriggerMaps> = RefCell::new(TriggerMaps {
        edges: IntMap::new(),
        timers: IntMap::new(),
        read_only: CallbackHandles::default(),
        read_write: CallbackHandles::default(),
    });
}

#[derive(Default)]
struct CallbackHandles {
    handle: Option<usize>,
    callbacks: VecDeque<TrigShared>,
}

#[derive(PartialEq, Clone, Copy, Debug)]
pub enum EdgeKind {
    Any,
    Rising,
    Falling,
}

impl EdgeKind {
    /// Kind of edge produced by a change to `new`. `None` for changes to X or Z,
    /// which only wake `Any` waiters.
    pub fn of_change(new: Logic) -> Option<EdgeKind> {
        match new {
            Logic::One => Some(EdgeKind::Rising),
            Logic::Zero => Some(EdgeKind::Falling),
            _ => None,
        }
    }
}

/// Drops every waiter and cancels the matching simulator callbacks.
pub(crate) fn cancel_all_triggers() {
    let handles = TRIGGERS.with(|t| {
        let mut t = t.borrow_mut();
        let mut handles = Vec::new();
        // wakers are dropped with the maps
        handles.extend(std::mem::take(&mut t.read_only).handle);
        handles.extend(std::mem::take(&mut t.read_write).handle);
        handles.extend(t.timers.drain().filter_map(|(_, cb)| cb.handle));
        handles.extend(t.edges.drain().filter_map(|(_, cb)| cb.handle));
        handles
    });
    if let Ok(sim) = SIM_IF.get() {
        for handle in handles {
            if let Err(e) = sim.cancel_callback(handle) {
                log::warn!("Could not cancel callback {}: {}", handle, e);
            }
        }
    }
}

#[derive(Debug, Clone)]
struct TrigShared {
    waker: Waker,
    // An edge callback fires on any change, the edge kind decides who is woken
    // so an existing callback does not have to be rescheduled.
    edge_kind: EdgeKind,
}

#[derive(Clone, Copy, Debug)]
enum TrigKind {
    Edge(usize, EdgeKind),
    Timer(u64, TimeUnit),
    TimerSteps(u64),
    ReadWrite,
    ReadOnly,
}

/// One-shot future completing when the simulator reaches the described event.
#[derive(Clone, Debug)]
pub struct Trigger {
    kind: TrigKind,
    awaited: bool,
}

impl Trigger {
    fn new(kind: TrigKind) -> Self {
        Trigger {
            kind,
            awaited: false,
        }
    }

    pub fn timer(time: u64, unit: TimeUnit) -> Self {
        Trigger::new(TrigKind::Timer(time, unit))
    }

    pub fn timer_steps(steps: u64) -> Self {
        Trigger::new(TrigKind::TimerSteps(steps))
    }

    pub async fn timer_ro(time: u64, unit: TimeUnit) -> TbResult {
        Trigger::timer(time, unit).await?;
        Trigger::read_only().await?;
        Ok(Val::None)
    }

    pub async fn timer_rw(time: u64, unit: TimeUnit) -> TbResult {
        Trigger::timer(time, unit).await?;
        Trigger::read_write().await?;
        Ok(Val::None)
    }

    pub fn edge(signal: SimObject) -> Self {
        Trigger::new(TrigKind::Edge(signal.handle(), EdgeKind::Any))
    }

    pub fn rising_edge(signal: SimObject) -> Self {
        Trigger::new(TrigKind::Edge(signal.handle(), EdgeKind::Rising))
    }

    pub fn falling_edge(signal: SimObject) -> Self {
        Trigger::new(TrigKind::Edge(signal.handle(), EdgeKind::Falling))
    }

    pub fn read_write() -> Self {
        Trigger::new(TrigKind::ReadWrite)
    }

    pub fn read_only() -> Self {
        Trigger::new(TrigKind::ReadOnly)
    }

    fn register(&self, waker: Waker) -> TbResult<()> {
        let sim = SIM_IF.get()?;
        let mut shared = TrigShared {
            waker,
            edge_kind: EdgeKind::Any,
        };

        match self.kind {
            TrigKind::ReadWrite | TrigKind::ReadOnly => {
                let rw = matches!(self.kind, TrigKind::ReadWrite);
                let needs_cb = TRIGGERS.with(|t| {
                    let mut t = t.borrow_mut();
                    let slot = if rw { &mut t.read_write } else { &mut t.read_only };
                    slot.callbacks.push_back(shared);
                    slot.handle.is_none()
                });
                if needs_cb {
                    let cb = if rw { SimCallback::ReadWrite } else { SimCallback::ReadOnly };
                    let cb_hdl = sim.register_callback(cb)?;
                    TRIGGERS.with(|t| {
                        let mut t = t.borrow_mut();
                        let slot = if rw { &mut t.read_write } else { &mut t.read_only };
                        slot.handle.replace(cb_hdl);
                    });
                }
            }
            TrigKind::Timer(..) | TrigKind::TimerSteps(_) => {
                let steps = match self.kind {
                    TrigKind::Timer(time, unit) => sim.get_sim_steps(time as f64, unit)?,
                    TrigKind::TimerSteps(steps) => steps,
                    _ => unreachable!(),
                };
                // the simulator reports absolute time back, not the delay
                let abs_time = steps + sim.get_sim_time_steps();
                let appended = TRIGGERS.with(|t| match t.borrow_mut().timers.get_mut(abs_time) {
                    Some(callbacks) => {
                        callbacks.callbacks.push_back(shared.clone());
                        true
                    }
                    None => false,
                });
                if !appended {
                    let handle = sim.register_callback(SimCallback::Time(steps))?;
                    let callback = CallbackHandles {
                        handle: Some(handle),
                        callbacks: VecDeque::from([shared]),
                    };
                    TRIGGERS.with(|t| t.borrow_mut().timers.insert(abs_time, callback));
                }
            }
            TrigKind::Edge(sig_hdl, edge_kind) => {
                shared.edge_kind = edge_kind;
                let appended = TRIGGERS.with(|t| match t.borrow_mut().edges.get_mut(sig_hdl as u64) {
                    Some(callbacks) => {
                        callbacks.callbacks.push_back(shared.clone());
                        true
                    }
                    None => false,
                });
                if !appended {
                    let handle = sim.register_callback(SimCallback::Edge(sig_hdl))?;
                    let callback = CallbackHandles {
                        handle: Some(handle),
                        callbacks: VecDeque::from([shared]),
                    };
                    TRIGGERS.with(|t| t.borrow_mut().edges.insert(sig_hdl as u64, callback));
                }
            }
        }
        Ok(())
    }
}

impl Future for Trigger {
    type Output = TbResult<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // A trigger is only registered once, so the second poll means the
        // waker signaled its completion.
        if self.awaited {
            Poll::Ready(Ok(()))
        } else {
            self.awaited = true;
            match self.register(cx.waker().clone()) {
                Ok(()) => Poll::Pending,
                Err(e) => Poll::Ready(Err(e)),
            }
        }
    }
}

/// Called by the simulator when a registered callback fires. Wakes the
/// matching waiters and runs the executor.
///
/// `edge` is only meaningful for `SimCallback::Edge`.
#[inline]
pub fn react(cb: SimCallback, edge: Option<EdgeKind>) {
    let mut to_cancel = None;
    let wake = TRIGGERS.with(|t| {
        let mut t = t.borrow_mut();
        match cb {
            SimCallback::ReadWrite => {
                // one-shot, handle is gone once fired
                t.read_write.handle = None;
                std::mem::take(&mut t.read_write.callbacks)
            }
            SimCallback::ReadOnly => {
                t.read_only.handle = None;
                std::mem::take(&mut t.read_only.callbacks)
            }
            SimCallback::Time(abs) => match t.timers.remove(abs) {
                Some(callbacks) => callbacks.callbacks,
                None => {
                    log::warn!("Did not expect timer callback: t={}", abs);
                    VecDeque::new()
                }
            },
            SimCallback::Edge(sig_hdl) => {
                let Some(mut callbacks) = t.edges.remove(sig_hdl as u64) else {
                    log::warn!("Did not expect edge callback: sig_hdl={}", sig_hdl);
                    return VecDeque::new();
                };
                let (woken, resched): (VecDeque<_>, VecDeque<_>) = callbacks
                    .callbacks
                    .drain(..)
                    .partition(|trig| trig.edge_kind == EdgeKind::Any || Some(trig.edge_kind) == edge);
                if resched.is_empty() {
                    // if no waiters are remaining, cancel
                    to_cancel = callbacks.handle;
                } else {
                    callbacks.callbacks = resched;
                    t.edges.insert(sig_hdl as u64, callbacks);
                }
                woken
            }
        }
    });

    if let Some(handle) = to_cancel {
        if let Ok(sim) = SIM_IF.get() {
            if let Err(e) = sim.cancel_callback(handle) {
                log::warn!("Could not cancel edge callback {}: {}", handle, e);
            }
        }
    }

    if !wake.is_empty() {
        log::trace!("{:?}: waking {} trigger(s)", cb, wake.len());
        for shared in wake {
            shared.waker.wake();
        }
        // execute woken tasks
        executor::run_once();
    }
}
