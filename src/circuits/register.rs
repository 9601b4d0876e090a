use anyhow::{ensure, Result};

use crate::wiring::{GateOp, Operand, Source, Tap, Wiring, MAX_LANES};

/// Clocked register with data input `In[width]`, clock `clk` and output
/// `Out[width]`.
///
/// Each bit is a gated NOR latch. While `clk` is high a clock edge loads
/// `In`, while it is low the stored value is kept.
pub fn register(width: u32) -> Result<Wiring> {
    ensure!(
        (1..=MAX_LANES).contains(&width),
        "register width {width} out of range 1..={MAX_LANES}"
    );
    let mut w = Wiring::new(&format!("register{width}"));
    w.add_input("In", width);
    w.add_input("clk", 1);

    let inv = w.add_family("inv", GateOp::Not, width);
    for i in 0..width {
        inv.connect(Operand::A, Source::input("In", i), i);
    }
    // set = In & clk, reset = !In & clk
    let set = w.add_family("set", GateOp::And, width);
    for i in 0..width {
        set.connect(Operand::A, Source::input("In", i), i)
            .connect(Operand::B, Source::input("clk", 0), i);
    }
    let rst = w.add_family("rst", GateOp::And, width);
    for i in 0..width {
        rst.connect(Operand::A, Source::now("inv", i), i)
            .connect(Operand::B, Source::input("clk", 0), i);
    }
    // q = !(rst | !(set | q'))
    let qbar = w.add_family("qbar", GateOp::Nor, width);
    for i in 0..width {
        qbar.connect(Operand::A, Source::now("set", i), i)
            .connect(Operand::B, Source::prev("q", i), i);
    }
    let q = w.add_family("q", GateOp::Nor, width);
    for i in 0..width {
        q.connect(Operand::A, Source::now("rst", i), i)
            .connect(Operand::B, Source::now("qbar", i), i);
    }

    w.add_output("Out", (0..width).map(|i| Tap::family("q", i)).collect());
    Ok(w)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{Dut, Testbench};

    #[test]
    fn loads_only_while_clocked() -> Result<()> {
        let mut dut = Dut::new(Arc::new(register(16)?.build()?));
        dut.poke("In", 0xbeef)?;
        dut.poke("clk", 1)?;
        dut.step(1);
        assert_eq!(dut.peek("Out")?, 0xbeef);

        dut.poke("clk", 0)?;
        dut.poke("In", 0x1234)?;
        dut.step(3);
        assert_eq!(dut.peek("Out")?, 0xbeef);

        dut.poke("clk", 1)?;
        dut.step(1);
        assert_eq!(dut.peek("Out")?, 0x1234);
        Ok(())
    }

    #[test]
    fn clock_packs_into_one_literal() -> Result<()> {
        let circuit = register(8)?.build()?;
        let set = &circuit.families()[1];
        assert_eq!(set.name(), "set");
        let clk_terms = set.terms(1);
        assert_eq!(clk_terms.len(), 1);
        assert_eq!(clk_terms[0].literal, 0xff);
        Ok(())
    }
}
