//! Breakpoints and watchpoints over a [`Testbench`].
//!
//! The debugger advances the clock one edge at a time. After every edge it
//! compares each enabled point's signal with its value before the edge, read
//! through [`Testbench::peek_previous`], and stops on the first point that
//! fires. Breakpoints are checked before watchpoints.
use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Context};

use crate::{error::SimError, utils::bit_of, wiring::Circuit, Testbench};

/// Cycle limit of [`Debugger::continue_until`] when none is given.
pub const DEFAULT_MAX_CYCLES: u64 = 1_000_000;

/// A signal, or a single bit of it: `Out` or `Out[3]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub name: String,
    pub bit: Option<u32>,
}

impl Target {
    pub fn new(name: &str, bit: Option<u32>) -> Self {
        Self {
            name: name.to_string(),
            bit,
        }
    }

    fn read(&self, tb: &mut impl Testbench, before_edge: bool) -> Result<u64, SimError> {
        let word = if before_edge {
            tb.peek_previous(&self.name)?
        } else {
            tb.peek(&self.name)?
        };
        Ok(match self.bit {
            Some(bit) => bit_of(word, bit),
            None => word,
        })
    }
}

impl FromStr for Target {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let Some((name, rest)) = s.split_once('[') else {
            return Ok(Target::new(s, None));
        };
        let index = rest
            .strip_suffix(']')
            .with_context(|| format!("missing `]` in `{s}`"))?;
        let bit: u32 = index
            .parse()
            .with_context(|| format!("invalid bit index `{index}`"))?;
        if name.is_empty() {
            bail!("missing signal name in `{s}`")
        }
        Ok(Target::new(name, Some(bit)))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.bit {
            Some(bit) => write!(f, "{}[{bit}]", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// When a breakpoint fires, given the values before and after an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Change,
    /// The new value equals the given one.
    Value(u64),
    /// 0 to 1
    Rising,
    /// 1 to 0
    Falling,
}

impl Trigger {
    pub fn fires(self, old: u64, new: u64) -> bool {
        match self {
            Trigger::Change => old != new,
            Trigger::Value(value) => new == value,
            Trigger::Rising => old == 0 && new == 1,
            Trigger::Falling => old == 1 && new == 0,
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Change => f.write_str("change"),
            Trigger::Value(value) => write!(f, "== {value}"),
            Trigger::Rising => f.write_str("rising"),
            Trigger::Falling => f.write_str("falling"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointKind {
    Break(Trigger),
    /// Stops on any change, reported as a watchpoint.
    Watch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Point {
    pub id: u32,
    pub target: Target,
    pub kind: PointKind,
    pub enabled: bool,
    /// Deleted after its first hit.
    pub temporary: bool,
    pub hits: u64,
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            PointKind::Break(trigger) => write!(f, "{}: break {} {trigger}", self.id, self.target)?,
            PointKind::Watch => write!(f, "{}: watch {}", self.id, self.target)?,
        }
        write!(f, ", {} hits", self.hits)?;
        if self.temporary {
            f.write_str(", temporary")?;
        }
        if !self.enabled {
            f.write_str(", disabled")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Every requested edge ran without a hit.
    Step,
    Breakpoint(u32),
    Watchpoint(u32),
    /// [`Debugger::continue_until`] ran out of cycles.
    CycleLimit,
}

/// The signal change that stopped execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub target: Target,
    pub old: u64,
    pub new: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopInfo {
    pub reason: StopReason,
    /// Cycle count of the testbench when execution stopped.
    pub cycle: u64,
    pub change: Option<Change>,
}

impl fmt::Display for StopInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cycle = self.cycle;
        match self.reason {
            StopReason::Step => write!(f, "stopped at cycle {cycle}")?,
            StopReason::CycleLimit => write!(f, "no breakpoint hit, stopped at cycle {cycle}")?,
            StopReason::Breakpoint(id) => write!(f, "breakpoint {id} at cycle {cycle}")?,
            StopReason::Watchpoint(id) => write!(f, "watchpoint {id} at cycle {cycle}")?,
        }
        if let Some(change) = &self.change {
            write!(f, ": {} {} -> {}", change.target, change.old, change.new)?;
        }
        Ok(())
    }
}

/// Breakpoints and watchpoints of one debugging session.
///
/// Points are numbered from 1 in one sequence shared by both kinds.
#[derive(Debug)]
pub struct Debugger {
    points: Vec<Point>,
    next_id: u32,
}

impl Default for Debugger {
    fn default() -> Self {
        Self::new()
    }
}

impl Debugger {
    pub fn new() -> Self {
        Self {
            points: Vec::new(),
            next_id: 1,
        }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn add_breakpoint(
        &mut self,
        circuit: &Circuit,
        target: Target,
        trigger: Trigger,
        temporary: bool,
    ) -> Result<u32, SimError> {
        self.add(circuit, target, PointKind::Break(trigger), temporary)
    }

    pub fn add_watchpoint(&mut self, circuit: &Circuit, target: Target) -> Result<u32, SimError> {
        self.add(circuit, target, PointKind::Watch, false)
    }

    fn add(
        &mut self,
        circuit: &Circuit,
        target: Target,
        kind: PointKind,
        temporary: bool,
    ) -> Result<u32, SimError> {
        if circuit.lookup(&target.name).is_none() {
            return Err(SimError::UnknownSignal(target.name));
        }
        if let Some(bit) = target.bit {
            if bit >= u64::BITS {
                return Err(SimError::InvalidRange { lo: bit, hi: bit });
            }
        }
        let id = self.next_id;
        self.next_id += 1;
        tracing::debug!(id, target = %target, ?kind, "add point");
        self.points.push(Point {
            id,
            target,
            kind,
            enabled: true,
            temporary,
            hits: 0,
        });
        Ok(id)
    }

    /// Delete a point. Returns whether it existed.
    pub fn remove(&mut self, id: u32) -> bool {
        let before = self.points.len();
        self.points.retain(|p| p.id != id);
        self.points.len() != before
    }

    /// Returns whether the point exists.
    pub fn set_enabled(&mut self, id: u32, enabled: bool) -> bool {
        match self.points.iter_mut().find(|p| p.id == id) {
            Some(point) => {
                point.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Delete every point and return how many there were.
    pub fn clear(&mut self) -> usize {
        let count = self.points.len();
        self.points.clear();
        count
    }

    /// Advance up to `cycles` edges, stopping early when a point fires.
    pub fn step(&mut self, tb: &mut impl Testbench, cycles: u64) -> StopInfo {
        for _ in 0..cycles {
            tb.step(1);
            if let Some(stop) = self.check(tb) {
                return stop;
            }
        }
        StopInfo {
            reason: StopReason::Step,
            cycle: tb.cycle_count(),
            change: None,
        }
    }

    /// Run until a point fires, giving up after `max_cycles` edges.
    pub fn continue_until(&mut self, tb: &mut impl Testbench, max_cycles: u64) -> StopInfo {
        let stop = self.step(tb, max_cycles);
        match stop.reason {
            StopReason::Step => StopInfo {
                reason: StopReason::CycleLimit,
                ..stop
            },
            _ => stop,
        }
    }

    fn check(&mut self, tb: &mut impl Testbench) -> Option<StopInfo> {
        for watch_pass in [false, true] {
            for i in 0..self.points.len() {
                let point = &self.points[i];
                if !point.enabled || (point.kind == PointKind::Watch) != watch_pass {
                    continue;
                }
                // signals that cannot be read never fire
                let (Ok(old), Ok(new)) = (point.target.read(tb, true), point.target.read(tb, false))
                else {
                    continue;
                };
                let fired = match point.kind {
                    PointKind::Break(trigger) => trigger.fires(old, new),
                    PointKind::Watch => old != new,
                };
                if !fired {
                    continue;
                }

                let point = &mut self.points[i];
                point.hits += 1;
                let reason = match point.kind {
                    PointKind::Break(_) => StopReason::Breakpoint(point.id),
                    PointKind::Watch => StopReason::Watchpoint(point.id),
                };
                let change = Change {
                    target: point.target.clone(),
                    old,
                    new,
                };
                if point.temporary {
                    self.points.remove(i);
                }
                let stop = StopInfo {
                    reason,
                    cycle: tb.cycle_count(),
                    change: Some(change),
                };
                tracing::info!("{stop}");
                return Some(stop);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{load_circuit, Dut};

    #[test]
    fn parse_targets() -> anyhow::Result<()> {
        assert_eq!("Out".parse::<Target>()?, Target::new("Out", None));
        assert_eq!("Out[3]".parse::<Target>()?, Target::new("Out", Some(3)));
        assert_eq!(Target::new("q", Some(0)).to_string(), "q[0]");
        for bad in ["Out[", "Out[x]", "[2]", "Out[1"] {
            assert!(bad.parse::<Target>().is_err(), "{bad}");
        }
        Ok(())
    }

    #[test]
    fn triggers() {
        assert!(Trigger::Change.fires(3, 4));
        assert!(!Trigger::Change.fires(4, 4));
        assert!(Trigger::Value(4).fires(4, 4));
        assert!(Trigger::Rising.fires(0, 1));
        assert!(!Trigger::Rising.fires(1, 1));
        assert!(!Trigger::Rising.fires(0, 2));
        assert!(Trigger::Falling.fires(1, 0));
        assert!(!Trigger::Falling.fires(0, 0));
    }

    #[test]
    fn register_load_hits_change() -> anyhow::Result<()> {
        let mut dut = Dut::new(load_circuit("register16")?);
        let mut dbg = Debugger::new();
        let id = dbg.add_breakpoint(dut.circuit(), "Out".parse()?, Trigger::Change, false)?;

        dut.poke("In", 0xbeef)?;
        dut.poke("clk", 1)?;
        let stop = dbg.continue_until(&mut dut, 100);
        assert_eq!(stop.reason, StopReason::Breakpoint(id));
        assert_eq!(stop.cycle, 1);
        assert_eq!(
            stop.change,
            Some(Change {
                target: Target::new("Out", None),
                old: 0,
                new: 0xbeef
            })
        );

        // holding the clock low keeps the value, so nothing fires
        dut.poke("clk", 0)?;
        dut.poke("In", 0x1234)?;
        let stop = dbg.continue_until(&mut dut, 10);
        assert_eq!(stop.reason, StopReason::CycleLimit);
        assert_eq!(stop.cycle, 11);
        assert_eq!(dbg.points()[0].hits, 1);
        Ok(())
    }

    #[test]
    fn edges_on_a_single_bit() -> anyhow::Result<()> {
        let mut dut = Dut::new(load_circuit("register16")?);
        let mut dbg = Debugger::new();
        let rise = dbg.add_breakpoint(dut.circuit(), "q[0]".parse()?, Trigger::Rising, false)?;
        let fall = dbg.add_breakpoint(dut.circuit(), "q[0]".parse()?, Trigger::Falling, false)?;

        dut.poke("clk", 1)?;
        dut.poke("In", 0b10)?;
        // bit 1 changes, bit 0 does not
        assert_eq!(dbg.step(&mut dut, 2).reason, StopReason::Step);

        dut.poke("In", 0b11)?;
        assert_eq!(dbg.step(&mut dut, 5).reason, StopReason::Breakpoint(rise));
        assert_eq!(dut.cycle_count(), 3);

        dut.poke("In", 0b00)?;
        let stop = dbg.step(&mut dut, 5);
        assert_eq!(stop.reason, StopReason::Breakpoint(fall));
        assert_eq!(stop.change.map(|c| (c.old, c.new)), Some((1, 0)));
        Ok(())
    }

    #[test]
    fn temporary_carry_breakpoint() -> anyhow::Result<()> {
        let mut dut = Dut::new(load_circuit("regadder16")?);
        let mut dbg = Debugger::new();
        let id = dbg.add_breakpoint(dut.circuit(), "c16".parse()?, Trigger::Rising, true)?;

        dut.poke("A", 0xffff)?;
        dut.poke("B", 0x0001)?;
        let stop = dbg.continue_until(&mut dut, 100);
        assert_eq!(stop.reason, StopReason::Breakpoint(id));
        // carry k is registered twice per bit
        assert_eq!(stop.cycle, 32);
        assert!(dbg.points().is_empty());

        let stop = dbg.continue_until(&mut dut, 10);
        assert_eq!(stop.reason, StopReason::CycleLimit);
        Ok(())
    }

    #[test]
    fn value_breakpoint_and_watchpoint_order() -> anyhow::Result<()> {
        let mut dut = Dut::new(load_circuit("regadder16")?);
        let mut dbg = Debugger::new();
        let watch = dbg.add_watchpoint(dut.circuit(), "Sum".parse()?)?;
        let done = dbg.add_breakpoint(dut.circuit(), "Sum".parse()?, Trigger::Value(0x10000), false)?;

        dut.poke("A", 0xffff)?;
        dut.poke("B", 0x0001)?;
        // the sum lanes read registered operands, so they move on the second edge
        let first = dbg.continue_until(&mut dut, 100);
        assert_eq!(first.reason, StopReason::Watchpoint(watch));
        assert_eq!(first.cycle, 2);

        // the value breakpoint wins over the watchpoint once both fire
        dbg.set_enabled(watch, false);
        let stop = dbg.continue_until(&mut dut, 100);
        assert_eq!(stop.reason, StopReason::Breakpoint(done));
        assert_eq!(dut.peek("Sum")?, 0x10000);
        assert!(dbg.set_enabled(watch, true));
        let stop = dbg.step(&mut dut, 1);
        assert_eq!(stop.reason, StopReason::Breakpoint(done));

        assert!(dbg.remove(done));
        assert!(!dbg.remove(done));
        assert_eq!(dbg.points()[0].to_string(), "1: watch Sum, 1 hits");
        assert_eq!(dbg.clear(), 1);
        Ok(())
    }

    #[test]
    fn rejects_unknown_points() -> anyhow::Result<()> {
        let dut = Dut::new(load_circuit("register16")?);
        let mut dbg = Debugger::new();
        assert_eq!(
            dbg.add_watchpoint(dut.circuit(), "Nope".parse()?),
            Err(SimError::UnknownSignal("Nope".into()))
        );
        assert!(dbg
            .add_breakpoint(dut.circuit(), "Out[64]".parse()?, Trigger::Change, false)
            .is_err());
        assert!(dbg.points().is_empty());
        // ids are not reused after a failed add
        assert_eq!(dbg.add_watchpoint(dut.circuit(), "Out".parse()?)?, 1);
        Ok(())
    }
}
