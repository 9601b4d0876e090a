//! Compiled wiring of a bit-packed circuit.
//!
//! A [`Wiring`] lists the input ports, the gate families and the outputs of a
//! circuit. Each family packs up to 64 gates of one [`GateOp`] into a word,
//! one gate per lane. Operand bits are gathered by selections: a source bit
//! (constant, input bit, or a lane of some family) routed to one destination
//! lane of operand A or B.
//!
//! A wiring is plain data. [`Wiring::build`] validates it and resolves names
//! into a [`Circuit`] that the evaluator runs.
mod circuit;
mod parse;

use std::path::Path;

use anyhow::{Context, Result};

pub use circuit::{BitRef, Circuit, Family, OutputPort, PortInfo, SignalId, Term};
pub use parse::parse;

/// Maximum number of lanes in one family word, and the widest port.
pub const MAX_LANES: u32 = u64::BITS;

macro_rules! define_ops {
    {
        $( $(#[$doc:meta])* $op:ident = $name:literal, $arity:literal, |$a:pat_param, $b:pat_param| $body:expr; )*
    } => {
        /// Word-wide bitwise operator of a gate family.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[cfg_attr(feature = "serde", serde(rename_all = "UPPERCASE"))]
        pub enum GateOp {
            $( $(#[$doc])* $op, )*
        }

        impl GateOp {
            pub const ALL: &'static [GateOp] = &[$(GateOp::$op),*];

            pub fn name(self) -> &'static str {
                match self {
                    $(GateOp::$op => $name,)*
                }
            }

            /// Number of operands the operator reads.
            pub fn arity(self) -> usize {
                match self {
                    $(GateOp::$op => $arity,)*
                }
            }

            /// Apply the operator to every lane at once. For unary operators
            /// `b` is ignored. The result is not masked.
            #[inline]
            pub fn apply(self, a: u64, b: u64) -> u64 {
                match self {
                    $(GateOp::$op => (|$a: u64, $b: u64| $body)(a, b),)*
                }
            }
        }

        impl std::str::FromStr for GateOp {
            type Err = anyhow::Error;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($name => Ok(GateOp::$op),)*
                    _ => anyhow::bail!("unknown gate type `{s}`"),
                }
            }
        }
    };
}

define_ops! {
    Xor = "XOR", 2, |a, b| a ^ b;
    And = "AND", 2, |a, b| a & b;
    Or = "OR", 2, |a, b| a | b;
    /// Only operand A is read.
    Not = "NOT", 1, |a, _| !a;
    Nand = "NAND", 2, |a, b| !(a & b);
    Nor = "NOR", 2, |a, b| !(a | b);
    Xnor = "XNOR", 2, |a, b| !(a ^ b);
}

impl std::fmt::Display for GateOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Which value of a family a read observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Phase {
    /// The value computed earlier in the same tick. The producer must come
    /// before the reader in family order, otherwise the read is stale.
    #[default]
    Current,
    /// The value committed at the end of the previous tick.
    Previous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Operand {
    A,
    B,
}

impl Operand {
    pub fn index(self) -> usize {
        match self {
            Operand::A => 0,
            Operand::B => 1,
        }
    }
}

impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::A => f.write_str("a"),
            Operand::B => f.write_str("b"),
        }
    }
}

/// Where an operand bit comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Source {
    Const(bool),
    Input {
        port: String,
        bit: u32,
    },
    Family {
        family: String,
        lane: u32,
        #[cfg_attr(feature = "serde", serde(default))]
        phase: Phase,
    },
}

impl Source {
    pub fn input(port: &str, bit: u32) -> Self {
        Source::Input {
            port: port.to_string(),
            bit,
        }
    }

    /// Same-tick read of a family lane.
    pub fn now(family: &str, lane: u32) -> Self {
        Source::Family {
            family: family.to_string(),
            lane,
            phase: Phase::Current,
        }
    }

    /// Previous-tick read of a family lane.
    pub fn prev(family: &str, lane: u32) -> Self {
        Source::Family {
            family: family.to_string(),
            lane,
            phase: Phase::Previous,
        }
    }
}

/// Where an output bit comes from. Family taps read the visible state.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Tap {
    Const(bool),
    Input { port: String, bit: u32 },
    Family { family: String, lane: u32 },
}

impl Tap {
    pub fn input(port: &str, bit: u32) -> Self {
        Tap::Input {
            port: port.to_string(),
            bit,
        }
    }

    pub fn family(family: &str, lane: u32) -> Self {
        Tap::Family {
            family: family.to_string(),
            lane,
        }
    }
}

/// Route `source` into lane `lane` of one operand.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Selection {
    pub operand: Operand,
    pub source: Source,
    pub lane: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FamilyDef {
    pub name: String,
    pub op: GateOp,
    pub lanes: u32,
    #[cfg_attr(feature = "serde", serde(default))]
    pub selections: Vec<Selection>,
}

impl FamilyDef {
    pub fn connect(&mut self, operand: Operand, source: Source, lane: u32) -> &mut Self {
        self.selections.push(Selection {
            operand,
            source,
            lane,
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PortDef {
    pub name: String,
    pub width: u32,
}

/// Output port, tap `i` gives bit `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OutputDef {
    pub name: String,
    pub taps: Vec<Tap>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Wiring {
    pub name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub inputs: Vec<PortDef>,
    /// Evaluation order of the families within a tick.
    #[cfg_attr(feature = "serde", serde(default))]
    pub families: Vec<FamilyDef>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub outputs: Vec<OutputDef>,
}

impl Wiring {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn add_input(&mut self, name: &str, width: u32) {
        self.inputs.push(PortDef {
            name: name.to_string(),
            width,
        })
    }

    /// Append a family. Families are evaluated in the order they are added.
    pub fn add_family(&mut self, name: &str, op: GateOp, lanes: u32) -> &mut FamilyDef {
        self.families.push(FamilyDef {
            name: name.to_string(),
            op,
            lanes,
            selections: Vec::new(),
        });
        let last = self.families.len() - 1;
        &mut self.families[last]
    }

    pub fn family_mut(&mut self, name: &str) -> Option<&mut FamilyDef> {
        self.families.iter_mut().find(|f| f.name == name)
    }

    pub fn add_output(&mut self, name: &str, taps: Vec<Tap>) {
        self.outputs.push(OutputDef {
            name: name.to_string(),
            taps,
        })
    }

    /// Parse the line-oriented text format. See [`parse`].
    pub fn from_text(src: &str) -> Result<Self> {
        parse(src)
    }

    #[cfg(feature = "serde")]
    pub fn from_json(src: &str) -> Result<Self> {
        serde_json::from_str(src).context("fail to parse json wiring")
    }

    #[cfg(feature = "serde")]
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("fail to serialize wiring")
    }

    /// Read a wiring file. `.json` files are accepted with the `serde`
    /// feature, everything else is read as the text format.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("could not read file `{}`", path.display()))?;
        let wiring = match path.extension().and_then(|ext| ext.to_str()) {
            #[cfg(feature = "serde")]
            Some("json") => Self::from_json(&content),
            _ => Self::from_text(&content),
        };
        wiring.with_context(|| format!("could not load wiring `{}`", path.display()))
    }
}
