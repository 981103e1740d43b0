//! Behavioural models of the clocked devices the kernel can host.
//!
//! A [`Device`] only reacts to rising edges of its clock port. It sees the
//! value every port held right before the edge and returns the register
//! updates, which the kernel applies one delta cycle later. Anything woken by
//! the same edge therefore still observes the old register contents.

use std::collections::VecDeque;

use crate::error::{TbError, TbResult};
use crate::value::Logic;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

#[derive(Clone, Copy, Debug)]
pub struct Port {
    pub name: &'static str,
    pub direction: Direction,
}

impl Port {
    pub const fn input(name: &'static str) -> Self {
        Port {
            name,
            direction: Direction::Input,
        }
    }

    pub const fn output(name: &'static str) -> Self {
        Port {
            name,
            direction: Direction::Output,
        }
    }
}

pub trait Device {
    /// Instance name, used as the root scope of all ports.
    fn name(&self) -> &str;
    fn ports(&self) -> &[Port];
    /// Index into `ports()` of the clock input.
    fn clock(&self) -> usize;
    /// Samples `ports` (pre-edge values, indexed like `ports()`) and returns
    /// `(port index, value)` updates.
    fn rising_edge(&mut self, ports: &[Logic]) -> Vec<(usize, Logic)>;
}

static REGISTER_PORTS: [Port; 3] = [
    Port::input("i_clk"),
    Port::input("i_d"),
    Port::output("o_d"),
];
const CLK: usize = 0;
const D: usize = 1;
const Q: usize = 2;

/// One-bit register clocked on the rising edge, without reset.
#[derive(Debug, Clone)]
pub struct Dff {
    name: String,
}

impl Dff {
    pub fn new(name: &str) -> Self {
        Dff {
            name: name.to_string(),
        }
    }
}

impl Default for Dff {
    fn default() -> Self {
        Dff::new("dff")
    }
}

impl Device for Dff {
    fn name(&self) -> &str {
        &self.name
    }

    fn ports(&self) -> &[Port] {
        &REGISTER_PORTS
    }

    fn clock(&self) -> usize {
        CLK
    }

    fn rising_edge(&mut self, ports: &[Logic]) -> Vec<(usize, Logic)> {
        vec![(Q, ports[D])]
    }
}

/// Chain of `depth` one-bit registers with the same ports as [`Dff`].
#[derive(Debug, Clone)]
pub struct ShiftRegister {
    name: String,
    // stages[0] feeds o_d
    stages: VecDeque<Logic>,
}

impl ShiftRegister {
    pub fn new(name: &str, depth: usize) -> TbResult<Self> {
        if depth == 0 {
            return Err(TbError::InvalidDevice(format!(
                "shift register '{}' needs at least one stage",
                name
            )));
        }
        Ok(ShiftRegister {
            name: name.to_string(),
            stages: VecDeque::from(vec![Logic::X; depth]),
        })
    }

    pub fn depth(&self) -> usize {
        self.stages.len()
    }
}

impl Device for ShiftRegister {
    fn name(&self) -> &str {
        &self.name
    }

    fn ports(&self) -> &[Port] {
        &REGISTER_PORTS
    }

    fn clock(&self) -> usize {
        CLK
    }

    fn rising_edge(&mut self, ports: &[Logic]) -> Vec<(usize, Logic)> {
        self.stages.pop_front();
        self.stages.push_back(ports[D]);
        vec![(Q, self.stages[0])]
    }
}
