use super::CircuitState;
use crate::{
    utils::{bit_of, select},
    wiring::{BitRef, Circuit, Family, OutputPort, Phase, Term},
};

/// Read one source bit.
///
/// `cur_state` is the state committed by the last clock edge, `nex_state` is
/// the state being computed in this tick.
#[inline]
fn read_bit(bit: &BitRef, inputs: &[u64], cur_state: &CircuitState, nex_state: &CircuitState) -> u64 {
    match *bit {
        BitRef::Const(value) => value as u64,
        BitRef::Input { index, bit } => bit_of(inputs[index], bit),
        BitRef::Family {
            index,
            lane,
            phase: Phase::Current,
        } => bit_of(nex_state.words[index], lane),
        BitRef::Family {
            index,
            lane,
            phase: Phase::Previous,
        } => bit_of(cur_state.words[index], lane),
    }
}

/// Runs the gate families of one tick.
///
/// The next state starts as a copy of the committed state and every family
/// word is overwritten in order. A same-tick read of a family that has not
/// run yet therefore sees its committed value.
pub struct Propagator<'a> {
    circuit: &'a Circuit,
    inputs: &'a [u64],
    cur_state: &'a CircuitState,
    nex_state: CircuitState,
}

impl<'a> Propagator<'a> {
    pub fn new(circuit: &'a Circuit, inputs: &'a [u64], cur_state: &'a CircuitState) -> Self {
        Self {
            circuit,
            inputs,
            cur_state,
            nex_state: cur_state.clone(),
        }
    }

    /// Build an operand word: each term broadcasts its source bit over the
    /// lanes it feeds.
    pub fn gather(&self, terms: &[Term]) -> u64 {
        terms.iter().fold(0, |word, term| {
            let bit = read_bit(&term.source, self.inputs, self.cur_state, &self.nex_state);
            word | select(bit, term.literal)
        })
    }

    /// New word of `family`, masked to its live lanes.
    pub fn evaluate(&self, family: &Family) -> u64 {
        let a = self.gather(&family.operands[0]);
        let b = self.gather(&family.operands[1]);
        family.op.apply(a, b) & family.mask
    }

    /// Evaluate the family at `index` and store the result in the next state.
    pub fn run_family(&mut self, index: usize) {
        let circuit = self.circuit;
        let family = &circuit.families()[index];
        let word = self.evaluate(family);
        tracing::trace!(family = %family.name, word, "evaluated");
        self.nex_state.words[index] = word;
    }

    pub fn run_all(&mut self) {
        for index in 0..self.circuit.families().len() {
            self.run_family(index);
        }
    }

    pub fn finalize(self) -> CircuitState {
        self.nex_state
    }
}

/// Run every family once on top of `cur_state`.
pub fn tick(circuit: &Circuit, cur_state: &CircuitState, inputs: &[u64]) -> CircuitState {
    let mut propagator = Propagator::new(circuit, inputs, cur_state);
    propagator.run_all();
    propagator.finalize()
}

/// Assemble one output word from `state`; tap `i` gives bit `i`.
pub(crate) fn output_word(port: &OutputPort, state: &CircuitState, inputs: &[u64]) -> u64 {
    port.taps.iter().enumerate().fold(0, |word, (i, tap)| {
        word | read_bit(tap, inputs, state, state) << i
    })
}

/// Assemble the output words from `state`.
pub(crate) fn output_words(circuit: &Circuit, state: &CircuitState, inputs: &[u64], out: &mut Vec<u64>) {
    out.clear();
    out.extend(
        circuit
            .outputs()
            .iter()
            .map(|port| output_word(port, state, inputs)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wiring::{GateOp, Operand, Source, Tap, Wiring};

    fn chain(second_reads: Source) -> anyhow::Result<Circuit> {
        let mut w = Wiring::new("chain");
        w.add_input("A", 1);
        w.add_family("n1", GateOp::Not, 1)
            .connect(Operand::A, Source::input("A", 0), 0);
        w.add_family("n2", GateOp::Not, 1)
            .connect(Operand::A, second_reads, 0);
        w.add_output("Y", vec![Tap::family("n2", 0)]);
        w.build()
    }

    #[test]
    fn current_reads_settle_in_one_tick() -> anyhow::Result<()> {
        let circuit = chain(Source::now("n1", 0))?;
        let state = CircuitState::zeroed(&circuit);
        let next = tick(&circuit, &state, &[1]);
        assert_eq!(next.words(), &[0, 1]);
        let next = tick(&circuit, &state, &[0]);
        assert_eq!(next.words(), &[1, 0]);
        Ok(())
    }

    #[test]
    fn previous_reads_lag_one_tick() -> anyhow::Result<()> {
        let circuit = chain(Source::prev("n1", 0))?;
        let state = CircuitState::zeroed(&circuit);
        let first = tick(&circuit, &state, &[0]);
        // n2 still sees n1 == 0 from before the edge
        assert_eq!(first.words(), &[1, 1]);
        let second = tick(&circuit, &first, &[0]);
        assert_eq!(second.words(), &[1, 0]);
        Ok(())
    }

    #[test]
    fn out_of_order_current_read_is_stale() -> anyhow::Result<()> {
        let mut w = Wiring::new("backwards");
        w.add_input("A", 1);
        w.add_family("late_reader", GateOp::Not, 1)
            .connect(Operand::A, Source::now("producer", 0), 0);
        w.add_family("producer", GateOp::Not, 1)
            .connect(Operand::A, Source::input("A", 0), 0);
        let circuit = w.build()?;
        let state = CircuitState::zeroed(&circuit);
        let next = tick(&circuit, &state, &[0]);
        // producer became 1, but the reader saw the committed 0
        assert_eq!(next.words(), &[1, 1]);
        Ok(())
    }

    #[test]
    fn results_are_masked() -> anyhow::Result<()> {
        let mut w = Wiring::new("wide_not");
        w.add_input("A", 1);
        w.add_family("n", GateOp::Nor, 5);
        w.add_family("full", GateOp::Xnor, 64);
        let circuit = w.build()?;
        let next = tick(&circuit, &CircuitState::zeroed(&circuit), &[0]);
        assert_eq!(next.word(0), 0b11111);
        assert_eq!(next.word(1), u64::MAX);
        Ok(())
    }

    #[test]
    fn gather_broadcasts_sources() -> anyhow::Result<()> {
        let mut w = Wiring::new("gather");
        w.add_input("A", 2);
        w.add_family("o", GateOp::Or, 4)
            .connect(Operand::A, Source::input("A", 0), 0)
            .connect(Operand::A, Source::input("A", 0), 2)
            .connect(Operand::A, Source::input("A", 1), 1)
            .connect(Operand::B, Source::Const(true), 3);
        let circuit = w.build()?;
        let state = CircuitState::zeroed(&circuit);
        let propagator = Propagator::new(&circuit, &[0b01], &state);
        let family = &circuit.families()[0];
        assert_eq!(propagator.gather(family.terms(0)), 0b0101);
        assert_eq!(propagator.gather(family.terms(1)), 0b1000);
        assert_eq!(propagator.evaluate(family), 0b1101);
        Ok(())
    }

    #[test]
    fn outputs_pass_inputs_through() -> anyhow::Result<()> {
        let mut w = Wiring::new("pass");
        w.add_input("A", 2);
        w.add_family("n", GateOp::Not, 1)
            .connect(Operand::A, Source::input("A", 0), 0);
        w.add_output(
            "Y",
            vec![Tap::input("A", 1), Tap::family("n", 0), Tap::Const(true)],
        );
        let circuit = w.build()?;
        let state = tick(&circuit, &CircuitState::zeroed(&circuit), &[0b10]);
        let mut out = Vec::new();
        output_words(&circuit, &state, &[0b10], &mut out);
        assert_eq!(out, vec![0b111]);
        Ok(())
    }
}
