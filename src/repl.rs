//! Line-oriented testbench shell.
//!
//! ```text
//! > set Cin 1
//! > poke A 0xa
//! > print outputs
//! ```
use std::io::{BufRead, Write};
use std::str::FromStr;

use ansi_term::Colour;
use anyhow::Result;

use crate::{
    debug::{Debugger, StopReason, Target, Trigger, DEFAULT_MAX_CYCLES},
    utils::{format_lanes, parse_literal},
    Testbench,
};

pub const USAGE: &str = "\
commands:
    s | step [n]                  advance the clock n times (default 1)
    set <input> <0|1>             drive a single bit input (also `1 <input>`, `0 <input>`)
    poke <input> <value>          drive an input, decimal or 0x hex
    peek <signal>                 read an input, output or gate family
    eval                          recompute combinational logic
    reset                         zero inputs and state
    p | print outputs|nodes|inputs  show signal values (also po, pn, pi)
    dump <file>                   write a waveform (unsupported)
    break <signal> [trigger]      stop when the signal changes; trigger is
                                  change, rising, falling or a value
    tbreak <signal> [trigger]     breakpoint deleted after its first hit
    watch <signal>                report every change of the signal
    c | continue [max]            run until a breakpoint or watchpoint hits
    delete [id]                   delete one point, or all of them
    enable <id> | disable <id>    switch a point on or off
    info                          list breakpoints and watchpoints
    help                          show this message
    q | quit                      leave the shell
signals may select one bit, as in `Out[3]`";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintTarget {
    Outputs,
    Nodes,
    Inputs,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Step(u32),
    Set(String, u64),
    Poke(String, u64),
    Peek(String),
    Eval,
    Reset,
    Print(PrintTarget),
    Dump(String),
    Break {
        target: Target,
        trigger: Trigger,
        temporary: bool,
    },
    Watch(Target),
    Continue(u64),
    Delete(Option<u32>),
    Enable(u32, bool),
    Info,
    Help,
    Quit,
}

/// A line that is not a valid command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageError(pub String);

impl std::fmt::Display for UsageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for UsageError {}

fn usage(msg: impl Into<String>) -> UsageError {
    UsageError(msg.into())
}

fn print_target(word: &str) -> Result<Command, UsageError> {
    match word.to_ascii_lowercase().as_str() {
        "outputs" => Ok(Command::Print(PrintTarget::Outputs)),
        "nodes" => Ok(Command::Print(PrintTarget::Nodes)),
        "inputs" => Ok(Command::Print(PrintTarget::Inputs)),
        _ => Err(usage("print expects outputs, nodes or inputs")),
    }
}

fn target(word: &str) -> Result<Target, UsageError> {
    word.parse().map_err(|err: anyhow::Error| usage(err.to_string()))
}

fn point_id(word: &str) -> Result<u32, UsageError> {
    word.parse()
        .map_err(|_| usage(format!("`{word}` is not a breakpoint number")))
}

fn breakpoint(name: &str, args: &[&str], temporary: bool) -> Result<Command, UsageError> {
    let trigger = match args {
        [] => Trigger::Change,
        [word] => match word.to_ascii_lowercase().as_str() {
            "change" => Trigger::Change,
            "rising" => Trigger::Rising,
            "falling" => Trigger::Falling,
            value => match parse_literal(value) {
                Some(value) => Trigger::Value(value),
                None => return Err(usage(format!("unknown trigger `{word}`"))),
            },
        },
        ["==", value] => match parse_literal(value) {
            Some(value) => Trigger::Value(value),
            None => return Err(usage(format!("invalid value `{value}`"))),
        },
        _ => return Err(usage("break expects a signal and at most one trigger")),
    };
    Ok(Command::Break {
        target: target(name)?,
        trigger,
        temporary,
    })
}

impl FromStr for Command {
    type Err = UsageError;

    /// Command words and print targets are case insensitive, signal names
    /// are not.
    fn from_str(line: &str) -> Result<Self, UsageError> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((head, args)) = words.split_first() else {
            return Err(usage("empty command"));
        };
        let head = head.to_ascii_lowercase();
        match (head.as_str(), args) {
            ("step" | "s", []) => Ok(Command::Step(1)),
            ("step" | "s", [n]) => match n.parse::<u32>() {
                Ok(n) if n > 0 => Ok(Command::Step(n)),
                _ => Err(usage(format!("step count `{n}` is not a positive integer"))),
            },
            ("set", [name, "0"]) | ("0", [name]) => Ok(Command::Set(name.to_string(), 0)),
            ("set", [name, "1"]) | ("1", [name]) => Ok(Command::Set(name.to_string(), 1)),
            ("set", [_, value]) => Err(usage(format!("set value `{value}` must be 0 or 1"))),
            ("poke", [name, value]) => match parse_literal(value) {
                Some(value) => Ok(Command::Poke(name.to_string(), value)),
                None => Err(usage(format!("invalid value `{value}`"))),
            },
            ("peek", [name]) => Ok(Command::Peek(name.to_string())),
            ("eval", []) => Ok(Command::Eval),
            ("reset", []) => Ok(Command::Reset),
            ("print" | "p", [what]) => print_target(what),
            ("print" | "p", _) => Err(usage("print expects outputs, nodes or inputs")),
            ("po", []) => Ok(Command::Print(PrintTarget::Outputs)),
            ("pn", []) => Ok(Command::Print(PrintTarget::Nodes)),
            ("pi", []) => Ok(Command::Print(PrintTarget::Inputs)),
            ("dump", [file]) => Ok(Command::Dump(file.to_string())),
            ("break" | "b", [name, rest @ ..]) => breakpoint(name, rest, false),
            ("tbreak", [name, rest @ ..]) => breakpoint(name, rest, true),
            ("watch", [name]) => Ok(Command::Watch(target(name)?)),
            ("continue" | "c", []) => Ok(Command::Continue(DEFAULT_MAX_CYCLES)),
            ("continue" | "c", [n]) => match n.parse::<u64>() {
                Ok(n) if n > 0 => Ok(Command::Continue(n)),
                _ => Err(usage(format!("cycle limit `{n}` is not a positive integer"))),
            },
            ("delete", []) => Ok(Command::Delete(None)),
            ("delete", [id]) => Ok(Command::Delete(Some(point_id(id)?))),
            ("enable", [id]) => Ok(Command::Enable(point_id(id)?, true)),
            ("disable", [id]) => Ok(Command::Enable(point_id(id)?, false)),
            ("info", []) => Ok(Command::Info),
            ("help", []) => Ok(Command::Help),
            ("quit" | "q" | "exit", []) => Ok(Command::Quit),
            (cmd, _) => Err(usage(format!("bad arguments for `{cmd}`"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Repl<W: Write> {
    out: W,
    /// Whether to print rich-text output
    color: bool,
    debugger: Debugger,
}

impl<W: Write> Repl<W> {
    pub fn new(out: W, color: bool) -> Self {
        Self {
            out,
            color,
            debugger: Debugger::new(),
        }
    }

    pub fn debugger(&self) -> &Debugger {
        &self.debugger
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn paint(&self, colour: Colour, text: &str) -> String {
        if self.color {
            colour.bold().paint(text).to_string()
        } else {
            text.to_string()
        }
    }

    fn error(&mut self, msg: impl std::fmt::Display) -> Result<()> {
        let tag = self.paint(Colour::Red, "error");
        writeln!(self.out, "{tag}: {msg}")?;
        Ok(())
    }

    /// Run one command line. Blank lines and `#` comments are skipped.
    pub fn execute(&mut self, tb: &mut impl Testbench, line: &str) -> Result<Flow> {
        let line = line.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            return Ok(Flow::Continue);
        }
        let cmd = match line.parse::<Command>() {
            Ok(cmd) => cmd,
            Err(err) => {
                self.error(err)?;
                writeln!(self.out, "{USAGE}")?;
                return Ok(Flow::Continue);
            }
        };
        tracing::debug!(?cmd, "command");

        match cmd {
            Command::Step(n) => {
                let stop = self.debugger.step(tb, n.into());
                if stop.reason != StopReason::Step {
                    let line = self.paint(Colour::Purple, &stop.to_string());
                    writeln!(self.out, "{line}")?;
                }
            }
            Command::Set(name, value) | Command::Poke(name, value) => {
                if let Err(err) = tb.poke(&name, value) {
                    self.error(err)?;
                }
            }
            Command::Peek(name) => match tb.peek(&name) {
                Ok(value) => writeln!(self.out, "{name} = {value} ({value:#x})")?,
                Err(err) => self.error(err)?,
            },
            Command::Eval => tb.eval(),
            Command::Reset => tb.reset(),
            Command::Print(target) => self.print(tb, target)?,
            Command::Dump(file) => {
                if let Err(err) = tb.dump_vcd(&file) {
                    self.error(err)?;
                }
            }
            Command::Break {
                target,
                trigger,
                temporary,
            } => match self.debugger.add_breakpoint(tb.circuit(), target, trigger, temporary) {
                Ok(id) => writeln!(self.out, "breakpoint {id}")?,
                Err(err) => self.error(err)?,
            },
            Command::Watch(target) => match self.debugger.add_watchpoint(tb.circuit(), target) {
                Ok(id) => writeln!(self.out, "watchpoint {id}")?,
                Err(err) => self.error(err)?,
            },
            Command::Continue(max_cycles) => {
                let stop = self.debugger.continue_until(tb, max_cycles);
                let line = self.paint(Colour::Purple, &stop.to_string());
                writeln!(self.out, "{line}")?;
            }
            Command::Delete(None) => {
                let count = self.debugger.clear();
                writeln!(self.out, "deleted {count} points")?;
            }
            Command::Delete(Some(id)) => {
                if !self.debugger.remove(id) {
                    self.error(format!("no breakpoint or watchpoint {id}"))?;
                }
            }
            Command::Enable(id, enabled) => {
                if !self.debugger.set_enabled(id, enabled) {
                    self.error(format!("no breakpoint or watchpoint {id}"))?;
                }
            }
            Command::Info => {
                if self.debugger.points().is_empty() {
                    writeln!(self.out, "no breakpoints or watchpoints")?;
                }
                for point in self.debugger.points() {
                    writeln!(self.out, "{point}")?;
                }
            }
            Command::Help => writeln!(self.out, "{USAGE}")?,
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    fn print(&mut self, tb: &mut impl Testbench, target: PrintTarget) -> Result<()> {
        let circuit = tb.circuit();
        // (name, width, annotation)
        let rows: Vec<(String, u32, String)> = match target {
            PrintTarget::Inputs => circuit
                .inputs()
                .iter()
                .map(|p| (p.name.clone(), p.width, String::new()))
                .collect(),
            PrintTarget::Outputs => circuit
                .outputs()
                .iter()
                .map(|p| (p.info().name.clone(), p.info().width, String::new()))
                .collect(),
            PrintTarget::Nodes => circuit
                .families()
                .iter()
                .map(|f| (f.name().to_string(), f.lanes(), format!("{}", f.op())))
                .collect(),
        };
        let header = self.paint(Colour::Yellow, &format!("cycle {}", tb.cycle_count()));
        writeln!(self.out, "{header}")?;
        for (name, width, note) in rows {
            let value = match tb.peek(&name) {
                Ok(value) => value,
                Err(err) => {
                    self.error(err)?;
                    continue;
                }
            };
            let label = self.paint(Colour::Green, &name);
            let pad = " ".repeat(12usize.saturating_sub(name.len()));
            if note.is_empty() {
                writeln!(self.out, "{label}{pad} {value} ({})", format_lanes(value, width))?;
            } else {
                writeln!(
                    self.out,
                    "{label}{pad} {note:<4} {}",
                    format_lanes(value, width)
                )?;
            }
        }
        Ok(())
    }

    /// Read commands until `quit` or end of input.
    pub fn run(&mut self, tb: &mut impl Testbench, input: impl BufRead, prompt: bool) -> Result<()> {
        if prompt {
            write!(self.out, "> ")?;
            self.out.flush()?;
        }
        for line in input.lines() {
            if self.execute(tb, &line?)? == Flow::Quit {
                break;
            }
            if prompt {
                write!(self.out, "> ")?;
                self.out.flush()?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{circuits, Dut};

    fn adder4() -> Result<Dut> {
        let circuit = circuits::create_wiring("adder4")?.build()?;
        Ok(Dut::new(Arc::new(circuit)))
    }

    fn run(dut: &mut Dut, script: &str) -> Result<String> {
        let mut repl = Repl::new(Vec::new(), false);
        repl.run(dut, script.as_bytes(), false)?;
        Ok(String::from_utf8(repl.into_inner())?)
    }

    #[test]
    fn parse_commands() {
        assert_eq!("step".parse::<Command>(), Ok(Command::Step(1)));
        assert_eq!(" step  3 ".parse::<Command>(), Ok(Command::Step(3)));
        assert_eq!("set A 1".parse::<Command>(), Ok(Command::Set("A".into(), 1)));
        assert_eq!("poke A 0x1f".parse::<Command>(), Ok(Command::Poke("A".into(), 31)));
        assert_eq!(
            "print nodes".parse::<Command>(),
            Ok(Command::Print(PrintTarget::Nodes))
        );
        assert_eq!("exit".parse::<Command>(), Ok(Command::Quit));

        for bad in [
            "step 0",
            "step -1",
            "step x",
            "set A 2",
            "set A",
            "poke A ten",
            "print wires",
            "fly",
            "eval now",
        ] {
            assert!(bad.parse::<Command>().is_err(), "{bad}");
        }
    }

    #[test]
    fn short_and_legacy_forms() {
        assert_eq!("s".parse::<Command>(), Ok(Command::Step(1)));
        assert_eq!("S 4".parse::<Command>(), Ok(Command::Step(4)));
        assert_eq!("q".parse::<Command>(), Ok(Command::Quit));
        assert_eq!("QUIT".parse::<Command>(), Ok(Command::Quit));
        assert_eq!("1 Cin".parse::<Command>(), Ok(Command::Set("Cin".into(), 1)));
        assert_eq!("0 Cin".parse::<Command>(), Ok(Command::Set("Cin".into(), 0)));
        assert_eq!(
            "p Outputs".parse::<Command>(),
            Ok(Command::Print(PrintTarget::Outputs))
        );
        assert_eq!("PN".parse::<Command>(), Ok(Command::Print(PrintTarget::Nodes)));
        assert_eq!("pi".parse::<Command>(), Ok(Command::Print(PrintTarget::Inputs)));
        // signal names keep their case
        assert_eq!("Peek Sum".parse::<Command>(), Ok(Command::Peek("Sum".into())));
        for bad in ["2 Cin", "po x", "p", "1"] {
            assert!(bad.parse::<Command>().is_err(), "{bad}");
        }
    }

    #[test]
    fn parse_debugger_commands() {
        assert_eq!(
            "break Out[3] rising".parse::<Command>(),
            Ok(Command::Break {
                target: Target::new("Out", Some(3)),
                trigger: Trigger::Rising,
                temporary: false,
            })
        );
        assert_eq!(
            "tbreak Sum == 0x10".parse::<Command>(),
            Ok(Command::Break {
                target: Target::new("Sum", None),
                trigger: Trigger::Value(16),
                temporary: true,
            })
        );
        assert_eq!(
            "b q".parse::<Command>(),
            Ok(Command::Break {
                target: Target::new("q", None),
                trigger: Trigger::Change,
                temporary: false,
            })
        );
        assert_eq!("watch q[0]".parse::<Command>(), Ok(Command::Watch(Target::new("q", Some(0)))));
        assert_eq!("c".parse::<Command>(), Ok(Command::Continue(DEFAULT_MAX_CYCLES)));
        assert_eq!("continue 50".parse::<Command>(), Ok(Command::Continue(50)));
        assert_eq!("delete".parse::<Command>(), Ok(Command::Delete(None)));
        assert_eq!("delete 2".parse::<Command>(), Ok(Command::Delete(Some(2))));
        assert_eq!("disable 1".parse::<Command>(), Ok(Command::Enable(1, false)));
        for bad in [
            "break",
            "break Out sideways",
            "break Out[x]",
            "break Out == ten",
            "watch",
            "continue 0",
            "delete one",
            "enable",
        ] {
            assert!(bad.parse::<Command>().is_err(), "{bad}");
        }
    }

    #[test]
    fn register_debug_session() -> Result<()> {
        let mut dut = Dut::new(Arc::new(circuits::create_wiring("register16")?.build()?));
        let mut repl = Repl::new(Vec::new(), false);
        let script = "\
break Out
watch q[15]
poke In 0xbeef
1 clk
continue
step 4
disable 1
poke In 0x1234
s 10
info
delete 7
delete
info
";
        repl.run(&mut dut, script.as_bytes(), false)?;
        assert!(repl.debugger().points().is_empty());
        let out = String::from_utf8(repl.into_inner())?;
        let expected = "\
breakpoint 1
watchpoint 2
breakpoint 1 at cycle 1: Out 0 -> 48879
watchpoint 2 at cycle 6: q[15] 1 -> 0
1: break Out change, 1 hits, disabled
2: watch q[15], 1 hits
error: no breakpoint or watchpoint 7
deleted 2 points
no breakpoints or watchpoints
";
        assert_eq!(out, expected);
        // the watchpoint stopped the second run early
        assert_eq!(dut.cycle_count(), 6);
        Ok(())
    }

    #[test]
    fn adder_session() -> Result<()> {
        let mut dut = adder4()?;
        let out = run(
            &mut dut,
            "poke A 10\npoke B 6\n# carry in stays low\nset Cin 0\npeek Sum\nquit\npeek A\n",
        )?;
        assert_eq!(out, "Sum = 16 (0x10)\n");
        Ok(())
    }

    #[test]
    fn malformed_commands_change_nothing() -> Result<()> {
        let mut dut = adder4()?;
        dut.poke("A", 3)?;
        dut.step(1);
        let before = dut.current_state().clone();
        let out = run(&mut dut, "set A 7\nstep 0\nstep -2\nprint\n")?;
        assert_eq!(out.matches("error").count(), 4);
        assert!(out.contains("commands:"));
        assert_eq!(dut.peek("A")?, 3);
        assert_eq!(dut.current_state(), &before);
        assert_eq!(dut.cycle_count(), 1);
        Ok(())
    }

    #[test]
    fn kernel_errors_are_reported() -> Result<()> {
        let mut dut = adder4()?;
        let out = run(
            &mut dut,
            "set Foo 1\npeek Foo\ndump wave.vcd\neval\nbreak Foo\nwatch Sum[64]\n",
        )?;
        assert!(out.contains("error: unknown signal `Foo`"));
        assert!(out.contains("error: invalid bit range [64..=64]"));
        assert!(out.contains("error: dump_vcd is not supported"));
        Ok(())
    }

    #[test]
    fn print_listing() -> Result<()> {
        let mut dut = adder4()?;
        let out = run(&mut dut, "poke A 5\nstep 2\nprint inputs\nprint outputs\nprint nodes\n")?;
        assert!(out.contains("cycle 2"));
        assert!(out.contains("A            5 (0101)"));
        assert!(out.contains("Sum          5 (00101)"));
        assert!(out.contains("x1           XOR  0101"));
        Ok(())
    }
}
