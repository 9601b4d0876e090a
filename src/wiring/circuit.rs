use std::collections::{BTreeMap, HashMap};

use anyhow::{bail, ensure, Context, Result};

use super::{FamilyDef, GateOp, Phase, Source, Tap, Wiring, MAX_LANES};
use crate::utils::{format_lanes, live_mask};

/// A resolved source bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BitRef {
    Const(bool),
    Input { index: usize, bit: u32 },
    Family { index: usize, lane: u32, phase: Phase },
}

/// One source bit broadcast over every lane in `literal`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
    pub source: BitRef,
    pub literal: u64,
}

#[derive(Debug, Clone)]
pub struct Family {
    pub(crate) name: String,
    pub(crate) op: GateOp,
    pub(crate) lanes: u32,
    pub(crate) mask: u64,
    /// Operand A and B. B is empty for unary operators.
    pub(crate) operands: [Vec<Term>; 2],
}

impl Family {
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn op(&self) -> GateOp {
        self.op
    }
    pub fn lanes(&self) -> u32 {
        self.lanes
    }
    /// Live-lane mask; bits above it are always zero.
    pub fn mask(&self) -> u64 {
        self.mask
    }
    pub fn terms(&self, slot: usize) -> &[Term] {
        &self.operands[slot]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub name: String,
    pub width: u32,
}

impl PortInfo {
    /// Largest value the port can hold.
    pub fn max_value(&self) -> u64 {
        live_mask(self.width)
    }
}

#[derive(Debug, Clone)]
pub struct OutputPort {
    pub(crate) info: PortInfo,
    pub(crate) taps: Vec<BitRef>,
}

impl OutputPort {
    pub fn info(&self) -> &PortInfo {
        &self.info
    }
}

/// What a signal name refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalId {
    Input(usize),
    Output(usize),
    Family(usize),
}

/// A validated wiring with every name resolved to an index.
///
/// Circuits are immutable; one circuit can back any number of testbenches.
#[derive(Debug, Clone)]
pub struct Circuit {
    name: String,
    inputs: Vec<PortInfo>,
    outputs: Vec<OutputPort>,
    families: Vec<Family>,
    signals: HashMap<String, SignalId>,
}

impl Circuit {
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn inputs(&self) -> &[PortInfo] {
        &self.inputs
    }
    pub fn outputs(&self) -> &[OutputPort] {
        &self.outputs
    }
    /// Families in evaluation order.
    pub fn families(&self) -> &[Family] {
        &self.families
    }
    pub fn lookup(&self, name: &str) -> Option<SignalId> {
        self.signals.get(name).copied()
    }
}

impl Wiring {
    /// Validate the wiring and compile each operand into per-source lane
    /// literals.
    ///
    /// Undriven operand lanes read zero and are reported with a warning.
    pub fn build(&self) -> Result<Circuit> {
        let mut signals = HashMap::new();
        for (i, port) in self.inputs.iter().enumerate() {
            check_width("input", &port.name, port.width)?;
            declare(&mut signals, &port.name, SignalId::Input(i))?;
        }
        for (i, family) in self.families.iter().enumerate() {
            check_width("family", &family.name, family.lanes)?;
            declare(&mut signals, &family.name, SignalId::Family(i))?;
        }
        for (i, output) in self.outputs.iter().enumerate() {
            check_width("output", &output.name, output.taps.len() as u32)?;
            declare(&mut signals, &output.name, SignalId::Output(i))?;
        }

        let resolver = Resolver {
            wiring: self,
            signals: &signals,
        };
        let families = self
            .families
            .iter()
            .map(|def| {
                resolver
                    .family(def)
                    .with_context(|| format!("invalid family `{}`", def.name))
            })
            .collect::<Result<Vec<_>>>()?;
        let outputs = self
            .outputs
            .iter()
            .map(|def| {
                let taps = def
                    .taps
                    .iter()
                    .map(|tap| resolver.tap(tap))
                    .collect::<Result<Vec<_>>>()
                    .with_context(|| format!("invalid output `{}`", def.name))?;
                Ok(OutputPort {
                    info: PortInfo {
                        name: def.name.clone(),
                        width: taps.len() as u32,
                    },
                    taps,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            circuit = %self.name,
            inputs = self.inputs.len(),
            families = families.len(),
            outputs = outputs.len(),
            "circuit built"
        );

        Ok(Circuit {
            name: self.name.clone(),
            inputs: self
                .inputs
                .iter()
                .map(|p| PortInfo {
                    name: p.name.clone(),
                    width: p.width,
                })
                .collect(),
            outputs,
            families,
            signals,
        })
    }
}

fn check_width(kind: &str, name: &str, width: u32) -> Result<()> {
    ensure!(!name.is_empty(), "{kind} with empty name");
    ensure!(
        (1..=MAX_LANES).contains(&width),
        "{kind} `{name}` has width {width}, expected 1..={MAX_LANES}"
    );
    Ok(())
}

fn declare(signals: &mut HashMap<String, SignalId>, name: &str, id: SignalId) -> Result<()> {
    if signals.insert(name.to_string(), id).is_some() {
        bail!("signal `{name}` is declared more than once")
    }
    Ok(())
}

struct Resolver<'a> {
    wiring: &'a Wiring,
    signals: &'a HashMap<String, SignalId>,
}

impl Resolver<'_> {
    fn input(&self, port: &str, bit: u32) -> Result<BitRef> {
        let index = match self.signals.get(port) {
            Some(SignalId::Input(index)) => *index,
            Some(_) => bail!("`{port}` is not an input"),
            None => bail!("unknown input `{port}`"),
        };
        let width = self.wiring.inputs[index].width;
        ensure!(bit < width, "bit {bit} out of range for input `{port}[{width}]`");
        Ok(BitRef::Input { index, bit })
    }

    fn family_lane(&self, family: &str, lane: u32, phase: Phase) -> Result<BitRef> {
        let index = match self.signals.get(family) {
            Some(SignalId::Family(index)) => *index,
            Some(_) => bail!("`{family}` is not a gate family"),
            None => bail!("unknown family `{family}`"),
        };
        let lanes = self.wiring.families[index].lanes;
        ensure!(lane < lanes, "lane {lane} out of range for family `{family}[{lanes}]`");
        Ok(BitRef::Family { index, lane, phase })
    }

    fn source(&self, source: &Source) -> Result<BitRef> {
        match source {
            Source::Const(value) => Ok(BitRef::Const(*value)),
            Source::Input { port, bit } => self.input(port, *bit),
            Source::Family {
                family,
                lane,
                phase,
            } => self.family_lane(family, *lane, *phase),
        }
    }

    fn tap(&self, tap: &Tap) -> Result<BitRef> {
        match tap {
            Tap::Const(value) => Ok(BitRef::Const(*value)),
            Tap::Input { port, bit } => self.input(port, *bit),
            Tap::Family { family, lane } => self.family_lane(family, *lane, Phase::Current),
        }
    }

    fn family(&self, def: &FamilyDef) -> Result<Family> {
        let arity = def.op.arity();
        let mut driven = [0u64; 2];
        let mut literals: [BTreeMap<BitRef, u64>; 2] = Default::default();

        for sel in &def.selections {
            let slot = sel.operand.index();
            ensure!(slot < arity, "{} takes no operand {}", def.op, sel.operand);
            ensure!(
                sel.lane < def.lanes,
                "destination lane {} out of range for {} lanes",
                sel.lane,
                def.lanes
            );
            let bit = 1u64 << sel.lane;
            ensure!(
                driven[slot] & bit == 0,
                "lane {} of operand {} has multiple drivers",
                sel.lane,
                sel.operand
            );
            driven[slot] |= bit;
            let source = self.source(&sel.source)?;
            *literals[slot].entry(source).or_default() |= bit;
        }

        let mask = live_mask(def.lanes);
        for (slot, driven) in driven.iter().enumerate().take(arity) {
            let undriven = mask & !driven;
            if undriven != 0 {
                tracing::warn!(
                    family = %def.name,
                    operand = slot,
                    lanes = %format_lanes(undriven, def.lanes),
                    "undriven lanes read zero"
                );
            }
        }

        let operands = literals.map(|by_source| {
            by_source
                .into_iter()
                .map(|(source, literal)| Term { source, literal })
                .collect::<Vec<_>>()
        });
        Ok(Family {
            name: def.name.clone(),
            op: def.op,
            lanes: def.lanes,
            mask,
            operands,
        })
    }
}
