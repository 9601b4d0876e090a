use anyhow::{ensure, Result};

use crate::wiring::{GateOp, Operand, Phase, Source, Tap, Wiring, MAX_LANES};

fn read(family: &str, lane: u32, phase: Phase) -> Source {
    Source::Family {
        family: family.to_string(),
        lane,
        phase,
    }
}

/// Ripple-carry adder over inputs `A[width]`, `B[width]` and `Cin`, with
/// output `Sum[width + 1]` (the top bit is the carry out).
///
/// With [`Phase::Current`] every read is same-tick and one evaluation gives
/// the sum. With [`Phase::Previous`] every gate is registered and the sum
/// settles after `2 * width + 2` clock edges.
pub fn ripple_adder(width: u32, phase: Phase) -> Result<Wiring> {
    ensure!(
        (1..MAX_LANES).contains(&width),
        "adder width {width} out of range 1..{MAX_LANES}"
    );
    let name = match phase {
        Phase::Current => format!("adder{width}"),
        Phase::Previous => format!("regadder{width}"),
    };
    let mut w = Wiring::new(&name);
    w.add_input("A", width);
    w.add_input("B", width);
    w.add_input("Cin", 1);

    let half_sum = w.add_family("x1", GateOp::Xor, width);
    for i in 0..width {
        half_sum
            .connect(Operand::A, Source::input("A", i), i)
            .connect(Operand::B, Source::input("B", i), i);
    }
    let generate = w.add_family("g", GateOp::And, width);
    for i in 0..width {
        generate
            .connect(Operand::A, Source::input("A", i), i)
            .connect(Operand::B, Source::input("B", i), i);
    }

    // carry chain, one AND/OR pair per bit
    let carry = |i: u32| {
        if i == 0 {
            Source::input("Cin", 0)
        } else {
            read(&format!("c{i}"), 0, phase)
        }
    };
    for i in 0..width {
        w.add_family(&format!("p{i}"), GateOp::And, 1)
            .connect(Operand::A, read("x1", i, phase), 0)
            .connect(Operand::B, carry(i), 0);
        w.add_family(&format!("c{}", i + 1), GateOp::Or, 1)
            .connect(Operand::A, read("g", i, phase), 0)
            .connect(Operand::B, read(&format!("p{i}"), 0, phase), 0);
    }

    let sum = w.add_family("s", GateOp::Xor, width);
    for i in 0..width {
        sum.connect(Operand::A, read("x1", i, phase), i)
            .connect(Operand::B, carry(i), i);
    }

    let mut taps: Vec<Tap> = (0..width).map(|i| Tap::family("s", i)).collect();
    taps.push(Tap::family(&format!("c{width}"), 0));
    w.add_output("Sum", taps);
    Ok(w)
}
